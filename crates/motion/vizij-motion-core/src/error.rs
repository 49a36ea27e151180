//! Error types for the motion matching core.
//!
//! Only genuine failures live here. "No better pose" is [`crate::Winner::NONE`]
//! and "no transition passes" is `None`; neither is an error.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MotionError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MotionError {
    /// A clip's per-frame sample count disagrees with the first clip of its group.
    #[error(
        "clip '{clip}' in group '{group}' has {found} {channel} samples per frame, expected {expected}"
    )]
    SchemaMismatch {
        group: String,
        clip: String,
        channel: &'static str,
        expected: usize,
        found: usize,
    },

    /// A contact/impact state needs more contact points than a clip provides.
    #[error("clip '{clip}' has {found} contact points per frame, state '{state}' needs {required}")]
    InsufficientContactPoints {
        state: String,
        clip: String,
        required: usize,
        found: usize,
    },

    /// Clip data violates a basic invariant (empty, unsorted frames, bad length).
    #[error("invalid clip '{clip}': {reason}")]
    InvalidClip { clip: String, reason: String },

    /// A state was declared without any motion data group or clip.
    #[error("state '{state}' has no clips to play")]
    EmptyState { state: String },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("unknown state '{name}'")]
    UnknownState { name: String },

    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },

    #[error("state '{state}' has no motion data group named '{name}'")]
    UnknownGroup { state: String, name: String },

    #[error("unknown section '{name}'")]
    UnknownSection { name: String },

    #[error("at most {max} sections may be declared")]
    TooManySections { max: usize },

    #[error("parameter '{name}' holds {expected} values, got {found}")]
    ParameterKindMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A type-specific API was used against a state of another kind.
    #[error("state '{state}' is a {found} state, expected {expected}")]
    WrongStateKind {
        state: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("state '{state}' needs {required} contact targets, {found} were provided")]
    MissingContactTargets {
        state: String,
        required: usize,
        found: usize,
    },

    #[error("goal trajectory has {found} points, the database expects {expected}")]
    TrajectoryLength { expected: usize, found: usize },

    /// The animator was updated before `start`.
    #[error("animator has not been started")]
    NotStarted,

    #[error("frame database for state '{state}' has not been built")]
    DatabaseNotBuilt { state: String },

    #[error("frame database for state '{state}' was released more times than it was acquired")]
    DatabaseOverReleased { state: String },

    /// A search batch was dropped before it reported back (worker panic).
    #[error("search batch ended without a result")]
    SearchAborted,

    #[error("failed to build search thread pool: {reason}")]
    ThreadPool { reason: String },
}
