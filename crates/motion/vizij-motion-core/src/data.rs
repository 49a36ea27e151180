//! Baked motion data: frames, clips and motion data groups.
//!
//! All positions, velocities and orientations are expressed in the clip root's
//! local space at the frame's instant. Frames are immutable once baked; the
//! asset format that produces them is the host's business.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};
use crate::sections::SectionMask;

/// One trajectory sample at a fixed past/future offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Facing direction (unit length for baked data).
    pub orientation: Vec3,
}

impl TrajectoryPoint {
    pub fn new(position: Vec3, velocity: Vec3, orientation: Vec3) -> Self {
        Self {
            position,
            velocity,
            orientation,
        }
    }

    pub fn lerp(&self, other: &TrajectoryPoint, t: f32) -> TrajectoryPoint {
        TrajectoryPoint {
            position: self.position.lerp(other.position, t),
            velocity: self.velocity.lerp(other.velocity, t),
            orientation: self
                .orientation
                .lerp(other.orientation, t)
                .try_normalize()
                .unwrap_or(self.orientation),
        }
    }
}

/// Local position and velocity of one matched bone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneSample {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl BoneSample {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self { position, velocity }
    }

    pub fn lerp(&self, other: &BoneSample, t: f32) -> BoneSample {
        BoneSample {
            position: self.position.lerp(other.position, t),
            velocity: self.velocity.lerp(other.velocity, t),
        }
    }
}

/// A contact point relative to the root (in frames) or in world space (as a target).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactSample {
    pub position: Vec3,
    pub normal: Vec3,
}

impl ContactSample {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }

    pub fn lerp(&self, other: &ContactSample, t: f32) -> ContactSample {
        ContactSample {
            position: self.position.lerp(other.position, t),
            normal: self
                .normal
                .lerp(other.normal, t)
                .try_normalize()
                .unwrap_or(self.normal),
        }
    }
}

/// One sampled instant of a clip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub local_time: f32,
    pub trajectory: Vec<TrajectoryPoint>,
    pub pose: Vec<BoneSample>,
    /// Extra section bits baked into the frame. Interval-derived sections and
    /// `Always` are added when the frame database is built.
    #[serde(default)]
    pub sections: SectionMask,
    /// Contact points of the clip as seen from this frame's root, ordered like
    /// [`Clip::contacts`].
    #[serde(default)]
    pub contacts: Vec<ContactSample>,
}

/// Closed time interval in clip seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f32,
    pub end: f32,
}

impl TimeRange {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, t: f32) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Time intervals of a clip tagged with one named section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionInterval {
    pub section: String,
    pub ranges: Vec<TimeRange>,
}

/// Named time point used to emit events while playing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    pub name: String,
    pub time: f32,
}

/// A contact the clip makes with the environment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipContact {
    pub position: Vec3,
    pub normal: Vec3,
    pub start_time: f32,
    pub end_time: f32,
}

fn default_true() -> bool {
    true
}

/// Ordered frames of one recorded clip plus its metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub name: String,
    /// Length in seconds.
    pub length: f32,
    #[serde(default)]
    pub looping: bool,
    pub frames: Vec<Frame>,
    /// Frames inside these windows never enter the search database.
    #[serde(default)]
    pub never_searching: Vec<TimeRange>,
    /// Frames inside these windows are not candidates, and no periodic search
    /// starts while this clip plays inside them.
    #[serde(default)]
    pub not_searching: Vec<TimeRange>,
    #[serde(default)]
    pub sections: Vec<SectionInterval>,
    #[serde(default)]
    pub events: Vec<EventMarker>,
    #[serde(default)]
    pub contacts: Vec<ClipContact>,
    /// Allow a new winner inside this clip close to where it already plays.
    #[serde(default)]
    pub blend_to_yourself: bool,
    /// Allow this clip to win while it is the one currently playing.
    #[serde(default = "default_true")]
    pub find_in_yourself: bool,
}

impl Clip {
    /// Bare clip with the given frames; metadata left empty.
    pub fn new(name: impl Into<String>, length: f32, looping: bool, frames: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            length,
            looping,
            frames,
            never_searching: Vec::new(),
            not_searching: Vec::new(),
            sections: Vec::new(),
            events: Vec::new(),
            contacts: Vec::new(),
            blend_to_yourself: false,
            find_in_yourself: true,
        }
    }

    /// Validate basic invariants (positive length, non-empty, non-decreasing
    /// frame times, uniform per-frame sample counts).
    pub fn validate_basic(&self) -> Result<()> {
        let invalid = |reason: String| MotionError::InvalidClip {
            clip: self.name.clone(),
            reason,
        };
        if !self.length.is_finite() || self.length <= 0.0 {
            return Err(invalid(format!("length must be > 0, got {}", self.length)));
        }
        let Some(first) = self.frames.first() else {
            return Err(invalid("clip has no frames".into()));
        };
        let mut last = -f32::INFINITY;
        for (i, frame) in self.frames.iter().enumerate() {
            if !frame.local_time.is_finite() || frame.local_time < last {
                return Err(invalid(format!("frame {i} time is not non-decreasing")));
            }
            last = frame.local_time;
            if frame.trajectory.len() != first.trajectory.len()
                || frame.pose.len() != first.pose.len()
                || frame.contacts.len() != first.contacts.len()
            {
                return Err(invalid(format!("frame {i} sample counts differ from frame 0")));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn trajectory_len(&self) -> usize {
        self.frames.first().map_or(0, |f| f.trajectory.len())
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.frames.first().map_or(0, |f| f.pose.len())
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.frames.first().map_or(0, |f| f.contacts.len())
    }

    /// Whether frames at `t` are kept out of the search database.
    pub fn excluded_from_search(&self, t: f32) -> bool {
        self.never_searching.iter().any(|r| r.contains(t))
            || self.not_searching.iter().any(|r| r.contains(t))
    }

    /// Whether a periodic search may start while playing at `t`.
    pub fn search_blocked_at(&self, t: f32) -> bool {
        self.not_searching.iter().any(|r| r.contains(t))
    }

    /// Start time of the first contact, if the clip has any.
    pub fn first_contact_start(&self) -> Option<f32> {
        self.contacts
            .iter()
            .map(|c| c.start_time)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// A named bucket of clips searched together.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionDataGroup {
    pub name: String,
    pub clips: Vec<Clip>,
}

impl MotionDataGroup {
    pub fn new(name: impl Into<String>, clips: Vec<Clip>) -> Self {
        Self {
            name: name.into(),
            clips,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(t: f32) -> Frame {
        Frame {
            local_time: t,
            trajectory: vec![TrajectoryPoint::default(); 2],
            pose: vec![BoneSample::default(); 3],
            ..Default::default()
        }
    }

    #[test]
    fn validate_rejects_unsorted_frames() {
        let clip = Clip::new("c", 1.0, false, vec![frame(0.5), frame(0.1)]);
        assert!(matches!(
            clip.validate_basic(),
            Err(MotionError::InvalidClip { .. })
        ));
    }

    #[test]
    fn validate_rejects_ragged_frames() {
        let mut bad = frame(0.1);
        bad.pose.pop();
        let clip = Clip::new("c", 1.0, false, vec![frame(0.0), bad]);
        assert!(clip.validate_basic().is_err());
    }

    #[test]
    fn search_windows() {
        let mut clip = Clip::new("c", 1.0, false, vec![frame(0.0)]);
        clip.never_searching.push(TimeRange::new(0.0, 0.2));
        clip.not_searching.push(TimeRange::new(0.8, 1.0));
        assert!(clip.excluded_from_search(0.1));
        assert!(clip.excluded_from_search(0.9));
        assert!(!clip.excluded_from_search(0.5));
        assert!(!clip.search_blocked_at(0.1));
        assert!(clip.search_blocked_at(0.9));
    }

    #[test]
    fn clip_json_defaults() {
        let json = r#"{"name":"walk","length":1.0,"frames":[]}"#;
        let clip: Clip = serde_json::from_str(json).unwrap();
        assert!(!clip.looping);
        assert!(clip.find_in_yourself);
        assert!(!clip.blend_to_yourself);
    }
}
