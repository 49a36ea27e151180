//! Per-search input.

use crate::data::{BoneSample, ContactSample, TrajectoryPoint};
use crate::sections::{SectionMask, SectionTable};

/// Current pose and goal trajectory submitted to a search batch.
///
/// Contacts are expressed in the character root's local space, like the
/// contact samples baked into frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub pose: Vec<BoneSample>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub active_section: u32,
    /// Frames must share at least one section with this mask.
    pub allowed_sections: SectionMask,
    pub responsivity: f32,
    pub contacts: Vec<ContactSample>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            pose: Vec::new(),
            trajectory: Vec::new(),
            active_section: 0,
            allowed_sections: SectionMask::ALL,
            responsivity: 1.0,
            contacts: Vec::new(),
        }
    }
}

impl Query {
    pub fn new(pose: Vec<BoneSample>, trajectory: Vec<TrajectoryPoint>) -> Self {
        Self {
            pose,
            trajectory,
            ..Default::default()
        }
    }

    /// Restrict the query to frames compatible with `active`.
    pub fn with_section(mut self, sections: &SectionTable, active: u32) -> Self {
        self.active_section = active;
        self.allowed_sections = sections.allowed(active);
        self
    }

    pub fn with_responsivity(mut self, responsivity: f32) -> Self {
        self.responsivity = responsivity;
        self
    }

    pub fn with_contacts(mut self, contacts: Vec<ContactSample>) -> Self {
        self.contacts = contacts;
        self
    }
}
