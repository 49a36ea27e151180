//! Anti-chatter rule for motion-matching states.
//!
//! A winner that lands in the clip already playing, within
//! `max_clip_delta_time` of where that clip will naturally be, is vetoed
//! unless the clip allows blending into itself. Only same-clip candidates are
//! compared; near-identical poses in other clips are not deduplicated.

use crate::data::Clip;
use crate::search::Winner;
use crate::time::{clip_distance, extrapolate};

/// Where the dominant input is playing right now.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Playback {
    pub group_index: u32,
    pub clip_index: u32,
    pub local_time: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContinuityGuard {
    pub max_clip_delta_time: f32,
}

impl ContinuityGuard {
    pub fn new(max_clip_delta_time: f32) -> Self {
        Self {
            max_clip_delta_time,
        }
    }

    /// Whether `winner` would move playback to where it already is.
    ///
    /// `lookahead` is how far the current clip advances before the winner is
    /// applied (zero when the winner is consumed on the frame it is read).
    pub fn vetoes(&self, winner: &Winner, current: &Playback, clip: &Clip, lookahead: f32) -> bool {
        if winner.is_none()
            || clip.blend_to_yourself
            || winner.group_index != current.group_index
            || winner.clip() != Some(current.clip_index as usize)
        {
            return false;
        }
        let natural = extrapolate(current.local_time, lookahead, clip.length, clip.looping);
        clip_distance(winner.local_time, natural, clip.length, clip.looping)
            <= self.max_clip_delta_time
    }

    /// `winner`, or [`Winner::NONE`] when vetoed.
    pub fn filter(&self, winner: Winner, current: &Playback, clip: &Clip, lookahead: f32) -> Winner {
        if self.vetoes(&winner, current, clip, lookahead) {
            Winner::NONE
        } else {
            winner
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(looping: bool) -> Clip {
        Clip::new("A", 2.0, looping, Vec::new())
    }

    fn winner(clip: i32, t: f32) -> Winner {
        Winner {
            group_index: 0,
            clip_index: clip,
            local_time: t,
            cost: 0.01,
        }
    }

    const AT_ONE: Playback = Playback {
        group_index: 0,
        clip_index: 0,
        local_time: 1.0,
    };

    #[test]
    fn vetoes_same_clip_nearby() {
        let g = ContinuityGuard::new(0.1);
        assert!(g.filter(winner(0, 1.05), &AT_ONE, &clip(false), 0.0).is_none());
    }

    #[test]
    fn allows_far_or_other_clip() {
        let g = ContinuityGuard::new(0.1);
        assert!(!g.vetoes(&winner(0, 1.5), &AT_ONE, &clip(false), 0.0));
        assert!(!g.vetoes(&winner(1, 1.0), &AT_ONE, &clip(false), 0.0));
    }

    #[test]
    fn blend_to_yourself_disables_veto() {
        let mut c = clip(false);
        c.blend_to_yourself = true;
        assert!(!ContinuityGuard::new(0.1).vetoes(&winner(0, 1.05), &AT_ONE, &c, 0.0));
    }

    #[test]
    fn accounts_for_loop_wrap() {
        let g = ContinuityGuard::new(0.1);
        let near_end = Playback {
            local_time: 1.98,
            ..AT_ONE
        };
        assert!(g.vetoes(&winner(0, 0.02), &near_end, &clip(true), 0.0));
        assert!(!g.vetoes(&winner(0, 0.02), &near_end, &clip(false), 0.0));
    }
}
