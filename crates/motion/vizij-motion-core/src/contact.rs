//! Contact movement patterns.
//!
//! A clip's contact array is ordered `[start?, contact.., land?]`. A pattern
//! says which of those points the caller supplies targets for and how each
//! target lines up with the frame's contact array.

use serde::{Deserialize, Serialize};

/// Which contact points of a clip a contact state matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactPattern {
    StartContact,
    ContactLand,
    StartContactLand,
    StartLand,
    Contact,
}

impl ContactPattern {
    /// Minimum contact points per frame (and targets per entry).
    pub fn required_contacts(self) -> usize {
        match self {
            ContactPattern::StartContact => 2,
            ContactPattern::ContactLand => 2,
            ContactPattern::StartContactLand => 3,
            ContactPattern::StartLand => 2,
            ContactPattern::Contact => 1,
        }
    }

    fn has_land(self) -> bool {
        matches!(
            self,
            ContactPattern::ContactLand | ContactPattern::StartContactLand | ContactPattern::StartLand
        )
    }

    /// Frame contact index matched by target `target` of `targets`, given
    /// `frame_contacts` points per frame. `None` when the frame has no such point.
    pub fn frame_index(self, target: usize, targets: usize, frame_contacts: usize) -> Option<usize> {
        if frame_contacts == 0 || target >= targets {
            return None;
        }
        let index = if self.has_land() && target + 1 == targets {
            frame_contacts - 1
        } else {
            target
        };
        (index < frame_contacts).then_some(index)
    }
}

/// How a contact state closes the gap between the recorded contact and its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactMovement {
    /// Constant-velocity correction until the contact's start time.
    #[default]
    MovePosition,
    /// Time-normalized lerp from where the correction began.
    LerpPosition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn land_maps_to_last_frame_contact() {
        let p = ContactPattern::StartContactLand;
        assert_eq!(p.frame_index(0, 3, 5), Some(0));
        assert_eq!(p.frame_index(1, 3, 5), Some(1));
        assert_eq!(p.frame_index(2, 3, 5), Some(4));
        assert_eq!(ContactPattern::StartLand.frame_index(1, 2, 2), Some(1));
    }

    #[test]
    fn middle_targets_beyond_frame_contacts_are_skipped() {
        assert_eq!(ContactPattern::Contact.frame_index(3, 4, 2), None);
        assert_eq!(ContactPattern::Contact.frame_index(0, 1, 0), None);
    }
}
