//! State kinds and their tuning.

use serde::{Deserialize, Serialize};

use crate::contact::{ContactMovement, ContactPattern};
use crate::cost::CostConfig;
use crate::data::{MotionDataGroup, TimeRange};
use crate::search::ClipWindow;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionMatchingFeatures {
    /// Seconds between periodic searches.
    pub update_interval: f32,
    pub blend_time: f32,
    /// Continuity guard radius in clip seconds.
    pub max_clip_delta_time: f32,
    /// No search is issued while this many inputs are blending.
    pub max_blended_clip_count: usize,
    pub responsivity: f32,
}

impl Default for MotionMatchingFeatures {
    fn default() -> Self {
        Self {
            update_interval: 0.1,
            blend_time: 0.25,
            max_clip_delta_time: 0.1,
            max_blended_clip_count: 4,
            responsivity: 1.0,
        }
    }
}

/// Per-clip window a single-animation entry search may land in, by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipWindowDesc {
    pub clip: String,
    pub range: TimeRange,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleAnimationFeatures {
    /// Search for the entry pose; otherwise start `clip` at time zero.
    pub find_pose: bool,
    pub windows: Vec<ClipWindowDesc>,
    /// Clip played when no search runs, by index in the active group.
    pub clip: usize,
    pub blend_time: f32,
}

impl SingleAnimationFeatures {
    /// Windows naming clips of `group`, resolved to its clip indices.
    pub fn windows_in(&self, group: &MotionDataGroup) -> Vec<ClipWindow> {
        self.windows
            .iter()
            .filter_map(|w| {
                let clip = group.clips.iter().position(|c| c.name == w.clip)?;
                Some(ClipWindow {
                    clip: clip as u32,
                    range: w.range,
                })
            })
            .collect()
    }
}

impl Default for SingleAnimationFeatures {
    fn default() -> Self {
        Self {
            find_pose: true,
            windows: Vec::new(),
            clip: 0,
            blend_time: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactFeatures {
    pub pattern: ContactPattern,
    #[serde(default)]
    pub movement: ContactMovement,
    /// Turn toward the facing the clip expects at its first contact.
    #[serde(default)]
    pub rotate_to_start: bool,
    #[serde(default = "default_blend_time")]
    pub blend_time: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactFeatures {
    #[serde(default)]
    pub movement: ContactMovement,
    #[serde(default)]
    pub rotate_to_start: bool,
    #[serde(default = "default_blend_time")]
    pub blend_time: f32,
}

impl Default for ImpactFeatures {
    fn default() -> Self {
        Self {
            movement: ContactMovement::default(),
            rotate_to_start: false,
            blend_time: default_blend_time(),
        }
    }
}

fn default_blend_time() -> f32 {
    0.25
}

/// Tagged state kind with its feature data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateKind {
    MotionMatching(MotionMatchingFeatures),
    SingleAnimation(SingleAnimationFeatures),
    Contact(ContactFeatures),
    Impact(ImpactFeatures),
}

impl StateKind {
    pub fn name(&self) -> &'static str {
        match self {
            StateKind::MotionMatching(_) => "motion matching",
            StateKind::SingleAnimation(_) => "single animation",
            StateKind::Contact(_) => "contact",
            StateKind::Impact(_) => "impact",
        }
    }

    /// Contact points every clip must carry, if any.
    pub fn contact_requirement(&self) -> Option<usize> {
        match self {
            StateKind::Contact(c) => Some(c.pattern.required_contacts()),
            StateKind::Impact(_) => Some(1),
            _ => None,
        }
    }

    /// Blend time used when the state itself picks a new pose.
    pub fn blend_time(&self) -> f32 {
        match self {
            StateKind::MotionMatching(f) => f.blend_time,
            StateKind::SingleAnimation(f) => f.blend_time,
            StateKind::Contact(f) => f.blend_time,
            StateKind::Impact(f) => f.blend_time,
        }
    }
}

/// Authoring description of one state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDesc {
    pub name: String,
    pub groups: Vec<MotionDataGroup>,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(flatten)]
    pub kind: StateKind,
}

/// Lifecycle phase of the playing state. Leaving a state is reported through
/// [`crate::MotionEvent::StateExited`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatePhase {
    /// Initial entry: clip 0 from time zero, no search.
    #[default]
    Start,
    /// Entered through a transition or an explicit switch.
    Enter,
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_kind_json_is_tagged() {
        let json = r#"{"name":"locomotion","groups":[],"kind":"motion_matching","update_interval":0.2}"#;
        let desc: StateDesc = serde_json::from_str(json).unwrap();
        match desc.kind {
            StateKind::MotionMatching(f) => {
                assert!((f.update_interval - 0.2).abs() < 1e-6);
                assert_eq!(f.max_blended_clip_count, 4);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn contact_requirements() {
        let kind = StateKind::Contact(ContactFeatures {
            pattern: ContactPattern::StartContactLand,
            movement: ContactMovement::LerpPosition,
            rotate_to_start: false,
            blend_time: 0.2,
        });
        assert_eq!(kind.contact_requirement(), Some(3));
        assert_eq!(
            StateKind::Impact(ImpactFeatures::default()).contact_requirement(),
            Some(1)
        );
    }

    #[test]
    fn windows_resolve_by_clip_name_per_group() {
        use crate::data::Clip;
        let features = SingleAnimationFeatures {
            windows: vec![
                ClipWindowDesc {
                    clip: "B".into(),
                    range: TimeRange::new(0.2, 0.4),
                },
                ClipWindowDesc {
                    clip: "X".into(),
                    range: TimeRange::new(0.0, 1.0),
                },
            ],
            ..Default::default()
        };
        let group = MotionDataGroup::new(
            "g",
            vec![Clip::new("A", 1.0, true, Vec::new()), Clip::new("B", 1.0, true, Vec::new())],
        );
        let windows = features.windows_in(&group);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].clip, 1);
        assert!(features.windows_in(&MotionDataGroup::new("empty", Vec::new())).is_empty());
    }
}
