//! Per-tick outputs of an [`crate::Animator`].
//!
//! Poses themselves live in the host's mixer; outputs carry the corrected
//! root and the semantic events of the tick.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::search::SearchPhase;

/// Discrete signals emitted while updating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum MotionEvent {
    StateEntered {
        state: String,
    },
    StateExited {
        state: String,
    },
    /// A search winner was accepted and started blending in.
    PoseSelected {
        state: String,
        group: u32,
        clip: String,
        local_time: f32,
        cost: f32,
    },
    /// The continuity guard kept the current clip playing.
    SearchVetoed {
        clip: String,
        local_time: f32,
    },
    TransitionFired {
        from: String,
        to: String,
        option: usize,
    },
    /// The dominant clip crossed an event marker.
    Marker {
        clip: String,
        name: String,
        time: f32,
    },
    /// A contact state reached the start of contact `index`.
    ContactReached {
        state: String,
        index: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<MotionEvent>,
    pub search_phase: SearchPhase,
    pub root_position: Vec3,
    pub root_rotation: Quat,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            search_phase: SearchPhase::Idle,
            root_position: Vec3::ZERO,
            root_rotation: Quat::IDENTITY,
        }
    }
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn push_event(&mut self, event: MotionEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
