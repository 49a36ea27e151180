//! Transition gating.
//!
//! Transitions of the current state are evaluated in order, and each
//! transition's options in order. An option passes when its time window (or
//! the exit-time override) passes and every condition holds; the first passing
//! option fires. Nothing passing is a normal outcome, not an error.

use serde::{Deserialize, Serialize};

use crate::data::{MotionDataGroup, TimeRange};
use crate::error::{MotionError, Result};
use crate::ids::{ParamHandle, StateId};
use crate::params::{ParameterTable, ParameterValues};
use crate::sections::SectionTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl CompareOp {
    #[inline]
    pub fn eval<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            CompareOp::Equal => lhs == rhs,
            CompareOp::NotEqual => lhs != rhs,
            CompareOp::Less => lhs < rhs,
            CompareOp::Greater => lhs > rhs,
            CompareOp::LessOrEqual => lhs <= rhs,
            CompareOp::GreaterOrEqual => lhs >= rhs,
        }
    }
}

/// `parameter op value`, by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionDesc<T> {
    pub parameter: String,
    pub op: CompareOp,
    pub value: T,
}

/// Window of one source clip in which an option may fire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionWindowDesc {
    pub clip: String,
    pub range: TimeRange,
}

fn default_blend_time() -> f32 {
    0.25
}

fn default_responsivity() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOptionDesc {
    #[serde(default)]
    pub windows: Vec<OptionWindowDesc>,
    #[serde(default = "default_blend_time")]
    pub blend_time: f32,
    #[serde(default)]
    pub allow_exit_time_override: bool,
    #[serde(default)]
    pub bool_conditions: Vec<ConditionDesc<bool>>,
    #[serde(default)]
    pub int_conditions: Vec<ConditionDesc<i32>>,
    #[serde(default)]
    pub float_conditions: Vec<ConditionDesc<f32>>,
    /// Trajectory cost multiplier for the entry search.
    #[serde(default = "default_responsivity")]
    pub responsivity: f32,
    #[serde(default)]
    pub start_section: Option<String>,
}

impl Default for TransitionOptionDesc {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            blend_time: default_blend_time(),
            allow_exit_time_override: false,
            bool_conditions: Vec::new(),
            int_conditions: Vec::new(),
            float_conditions: Vec::new(),
            responsivity: default_responsivity(),
            start_section: None,
        }
    }
}

/// Directed edge between two states, by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionDesc {
    pub from: String,
    pub to: String,
    pub options: Vec<TransitionOptionDesc>,
}

/// A condition resolved to a parameter slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Condition<T> {
    pub handle: ParamHandle,
    pub op: CompareOp,
    pub value: T,
}

/// Option window checked against the playing clip by name, so it survives
/// group edits in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionWindow {
    pub clip: String,
    pub range: TimeRange,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOption {
    pub windows: Vec<OptionWindow>,
    pub blend_time: f32,
    pub allow_exit_time_override: bool,
    pub bool_conditions: Vec<Condition<bool>>,
    pub int_conditions: Vec<Condition<i32>>,
    pub float_conditions: Vec<Condition<f32>>,
    pub responsivity: f32,
    pub start_section: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    pub options: Vec<TransitionOption>,
}

/// What the evaluator knows about the playing clip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionContext<'a> {
    pub clip: &'a str,
    pub local_time: f32,
    pub exit_time_reached: bool,
}

fn resolve_conditions<T: Copy>(
    descs: &[ConditionDesc<T>],
    params: &ParameterTable,
    kind: &'static str,
) -> Result<Vec<Condition<T>>> {
    descs
        .iter()
        .map(|d| {
            let handle = params.handle(&d.parameter)?;
            let declared = params
                .default_of(handle)
                .map(|v| v.kind_name())
                .unwrap_or(kind);
            if declared != kind {
                return Err(MotionError::ParameterKindMismatch {
                    name: d.parameter.clone(),
                    expected: declared,
                    found: kind,
                });
            }
            Ok(Condition {
                handle,
                op: d.op,
                value: d.value,
            })
        })
        .collect()
}

impl TransitionOption {
    /// Resolve names against the graph. Window clips must exist in some group
    /// of the source state.
    pub fn resolve(
        desc: &TransitionOptionDesc,
        source: &str,
        source_groups: &[MotionDataGroup],
        params: &ParameterTable,
        sections: &SectionTable,
    ) -> Result<Self> {
        let mut windows = Vec::with_capacity(desc.windows.len());
        for w in &desc.windows {
            let known = source_groups
                .iter()
                .any(|g| g.clips.iter().any(|c| c.name == w.clip));
            if !known {
                return Err(MotionError::InvalidClip {
                    clip: w.clip.clone(),
                    reason: format!("transition window names a clip not in state '{source}'"),
                });
            }
            windows.push(OptionWindow {
                clip: w.clip.clone(),
                range: w.range,
            });
        }
        let start_section = desc
            .start_section
            .as_deref()
            .map(|s| sections.index(s))
            .transpose()?;
        Ok(Self {
            windows,
            blend_time: desc.blend_time.max(0.0),
            allow_exit_time_override: desc.allow_exit_time_override,
            bool_conditions: resolve_conditions(&desc.bool_conditions, params, "bool")?,
            int_conditions: resolve_conditions(&desc.int_conditions, params, "int")?,
            float_conditions: resolve_conditions(&desc.float_conditions, params, "float")?,
            responsivity: desc.responsivity,
            start_section,
        })
    }

    /// Window check. Clips without a window of their own pass.
    pub fn time_passes(&self, ctx: &TransitionContext) -> bool {
        let mut own = self
            .windows
            .iter()
            .filter(|w| w.clip == ctx.clip)
            .peekable();
        if own.peek().is_none() {
            return true;
        }
        own.any(|w| w.range.contains(ctx.local_time))
    }

    pub fn conditions_pass(&self, params: &ParameterValues) -> bool {
        self.bool_conditions
            .iter()
            .all(|c| params.get_bool(c.handle).is_some_and(|v| c.op.eval(v, c.value)))
            && self
                .int_conditions
                .iter()
                .all(|c| params.get_int(c.handle).is_some_and(|v| c.op.eval(v, c.value)))
            && self
                .float_conditions
                .iter()
                .all(|c| params.get_float(c.handle).is_some_and(|v| c.op.eval(v, c.value)))
    }

    pub fn passes(&self, ctx: &TransitionContext, params: &ParameterValues) -> bool {
        (self.time_passes(ctx) || (self.allow_exit_time_override && ctx.exit_time_reached))
            && self.conditions_pass(params)
    }
}

/// Index of the first passing option.
pub fn select_option(
    options: &[TransitionOption],
    ctx: &TransitionContext,
    params: &ParameterValues,
) -> Option<usize> {
    options.iter().position(|o| o.passes(ctx, params))
}

/// First `(transition, option)` that fires among `transitions`.
pub fn evaluate(
    transitions: &[Transition],
    ctx: &TransitionContext,
    params: &ParameterValues,
) -> Option<(usize, usize)> {
    transitions
        .iter()
        .enumerate()
        .find_map(|(ti, t)| select_option(&t.options, ctx, params).map(|oi| (ti, oi)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Clip;
    use crate::params::{ParamValue, ParameterDesc};

    fn params() -> ParameterTable {
        ParameterTable::build(&[ParameterDesc {
            name: "speed".into(),
            default: ParamValue::Float(0.0),
        }])
        .unwrap()
    }

    fn option(min_speed: f32) -> TransitionOption {
        let desc = TransitionOptionDesc {
            float_conditions: vec![ConditionDesc {
                parameter: "speed".into(),
                op: CompareOp::GreaterOrEqual,
                value: min_speed,
            }],
            ..Default::default()
        };
        TransitionOption::resolve(&desc, "idle", &[], &params(), &SectionTable::default()).unwrap()
    }

    const CTX: TransitionContext<'static> = TransitionContext {
        clip: "A",
        local_time: 0.5,
        exit_time_reached: false,
    };

    #[test]
    fn compare_ops() {
        assert!(CompareOp::LessOrEqual.eval(1, 1));
        assert!(CompareOp::NotEqual.eval(true, false));
        assert!(!CompareOp::Greater.eval(0.5, 0.5));
    }

    #[test]
    fn first_passing_option_wins() {
        let table = params();
        let mut values = table.values();
        values.set(&table, "speed", ParamValue::Float(1.0)).unwrap();
        let opts = vec![option(0.5), option(5.0), option(0.0)];
        assert_eq!(select_option(&opts, &CTX, &values), Some(0));
        values.set(&table, "speed", ParamValue::Float(0.1)).unwrap();
        assert_eq!(select_option(&opts, &CTX, &values), Some(2));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let desc = TransitionOptionDesc {
            bool_conditions: vec![ConditionDesc {
                parameter: "jump".into(),
                op: CompareOp::Equal,
                value: true,
            }],
            ..Default::default()
        };
        let err = TransitionOption::resolve(&desc, "idle", &[], &params(), &SectionTable::default());
        assert!(matches!(err, Err(MotionError::UnknownParameter { .. })));
    }

    fn windowed(allow_exit_time_override: bool) -> TransitionOption {
        let desc = TransitionOptionDesc {
            windows: vec![OptionWindowDesc {
                clip: "A".into(),
                range: TimeRange::new(0.5, 1.0),
            }],
            allow_exit_time_override,
            ..Default::default()
        };
        let groups = [MotionDataGroup::new(
            "g",
            vec![Clip::new("A", 2.0, false, Vec::new()), Clip::new("B", 2.0, false, Vec::new())],
        )];
        TransitionOption::resolve(&desc, "run", &groups, &params(), &SectionTable::default()).unwrap()
    }

    #[test]
    fn time_window_gates_its_own_clip_only() {
        let option = windowed(false);
        let values = params().values();
        let at = |clip: &'static str, local_time: f32| TransitionContext {
            clip,
            local_time,
            exit_time_reached: false,
        };
        assert!(!option.passes(&at("A", 0.2), &values));
        assert!(option.passes(&at("A", 0.7), &values));
        assert!(!option.passes(&at("A", 1.4), &values));
        // B has no window of its own.
        assert!(option.passes(&at("B", 0.2), &values));
    }

    #[test]
    fn exit_time_overrides_a_closed_window() {
        let values = params().values();
        let ctx = TransitionContext {
            clip: "A",
            local_time: 1.9,
            exit_time_reached: true,
        };
        assert!(!windowed(false).passes(&ctx, &values));
        assert!(windowed(true).passes(&ctx, &values));
        let early = TransitionContext {
            exit_time_reached: false,
            ..ctx
        };
        assert!(!windowed(true).passes(&early, &values));
    }

    #[test]
    fn window_on_unknown_clip_is_rejected() {
        let desc = TransitionOptionDesc {
            windows: vec![OptionWindowDesc {
                clip: "Z".into(),
                range: TimeRange::new(0.0, 1.0),
            }],
            ..Default::default()
        };
        let groups = [MotionDataGroup::new("g", vec![Clip::new("A", 1.0, false, Vec::new())])];
        let err = TransitionOption::resolve(&desc, "run", &groups, &params(), &SectionTable::default());
        assert!(matches!(err, Err(MotionError::InvalidClip { .. })));
    }
}
