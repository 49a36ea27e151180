//! Vizij Motion Core (engine-agnostic)
//!
//! Motion-matching locomotion: a job-partitioned frame database, squared-distance
//! costs, parallel nearest-neighbour search with a continuity guard, trajectory
//! prediction and a per-character state machine that drives a host blend mixer.
//! Playback, skinning and asset I/O stay with the host.

pub mod animator;
pub mod blend;
pub mod config;
pub mod contact;
pub mod cost;
pub mod data;
pub mod database;
pub mod error;
pub mod graph;
pub mod guard;
pub mod ids;
pub mod outputs;
pub mod params;
pub mod query;
pub mod sampling;
pub mod search;
pub mod sections;
pub mod state;
pub mod store;
pub mod time;
pub mod trajectory;
pub mod transition;

// Re-exports for consumers (hosts and adapters)
pub use animator::Animator;
pub use blend::{BlendController, BlendInput, BlendMixer, ClipRef, SimpleMixer};
pub use config::Config;
pub use contact::{ContactMovement, ContactPattern};
pub use cost::{ContactCostMode, CostChannels, CostConfig, CostWeights};
pub use data::{
    BoneSample, Clip, ClipContact, ContactSample, EventMarker, Frame, MotionDataGroup,
    SectionInterval, TimeRange, TrajectoryPoint,
};
pub use database::{FrameDatabase, Partition};
pub use error::{MotionError, Result};
pub use graph::{AnimationGraph, GraphDesc, StateNode};
pub use guard::{ContinuityGuard, Playback};
pub use ids::{InputHandle, ParamHandle, StateId};
pub use outputs::{MotionEvent, Outputs};
pub use params::{ParamValue, ParameterDesc};
pub use query::Query;
pub use search::{
    aggregate, ClipWindow, JobSystem, SearchKind, SearchPhase, SearchRequest, Winner,
};
pub use sections::{SectionDesc, SectionMask, SectionTable};
pub use state::{
    ContactFeatures, ImpactFeatures, MotionMatchingFeatures, SingleAnimationFeatures, StateDesc,
    StateKind, StatePhase,
};
pub use store::{DatabaseStore, StateDatabase};
pub use trajectory::{
    CastHit, CollisionSettings, CollisionWorld, OrientationMode, PredictionMode,
    TrajectoryPredictor, TrajectorySettings,
};
pub use transition::{CompareOp, ConditionDesc, TransitionDesc, TransitionOptionDesc};
