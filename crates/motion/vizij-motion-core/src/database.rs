//! Job-partitioned frame database.
//!
//! All usable frames of a motion data group are flattened into structure-of-
//! arrays partitions, one per search job. A frame's trajectory, pose and
//! contact samples always live in the same partition at the same frame index.

use log::debug;

use crate::data::{BoneSample, ContactSample, MotionDataGroup, TimeRange, TrajectoryPoint};
use crate::error::{MotionError, Result};
use crate::sections::{SectionMask, SectionTable};

/// Number of partitions for `usable` frames: `ceil(usable / max_frames_per_job)`
/// capped at `workers`, at least one.
pub fn partition_count(usable: usize, max_frames_per_job: usize, workers: usize) -> usize {
    let per_job = max_frames_per_job.max(1);
    let wanted = usable.div_ceil(per_job);
    wanted.min(workers.max(1)).max(1)
}

/// Even split of `usable` frames into `count` partitions; the last absorbs the remainder.
pub fn partition_sizes(usable: usize, count: usize) -> Vec<usize> {
    let count = count.max(1);
    let base = usable / count;
    let mut sizes = vec![base; count];
    if let Some(last) = sizes.last_mut() {
        *last += usable % count;
    }
    sizes
}

/// Per-frame sample counts shared by every clip of a group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatabaseLayout {
    pub trajectory_len: usize,
    pub bone_count: usize,
    /// Contacts stored per frame; zero for states that do not match contacts.
    pub contact_count: usize,
}

/// Per-frame metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMeta {
    pub clip: u32,
    pub local_time: f32,
    pub sections: SectionMask,
}

/// One job's slice of the database.
#[derive(Clone, Debug, Default)]
pub struct Partition {
    pub trajectory: Vec<TrajectoryPoint>,
    pub bones: Vec<BoneSample>,
    pub meta: Vec<FrameMeta>,
    pub contacts: Vec<ContactSample>,
}

impl Partition {
    fn with_capacity(frames: usize, layout: &DatabaseLayout) -> Self {
        Self {
            trajectory: Vec::with_capacity(frames * layout.trajectory_len),
            bones: Vec::with_capacity(frames * layout.bone_count),
            meta: Vec::with_capacity(frames),
            contacts: Vec::with_capacity(frames * layout.contact_count),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    #[inline]
    pub fn trajectory_of(&self, frame: usize, layout: &DatabaseLayout) -> &[TrajectoryPoint] {
        let n = layout.trajectory_len;
        &self.trajectory[frame * n..(frame + 1) * n]
    }

    #[inline]
    pub fn pose_of(&self, frame: usize, layout: &DatabaseLayout) -> &[BoneSample] {
        let n = layout.bone_count;
        &self.bones[frame * n..(frame + 1) * n]
    }

    #[inline]
    pub fn contacts_of(&self, frame: usize, layout: &DatabaseLayout) -> &[ContactSample] {
        let n = layout.contact_count;
        &self.contacts[frame * n..(frame + 1) * n]
    }
}

/// Inputs of a database build besides the clips themselves.
#[derive(Clone, Copy, Debug)]
pub struct BuildSettings {
    pub max_frames_per_job: usize,
    pub workers: usize,
}

/// Frame database of one motion data group.
#[derive(Clone, Debug)]
pub struct FrameDatabase {
    pub group_index: u32,
    pub layout: DatabaseLayout,
    pub partitions: Vec<Partition>,
    /// First contact start per clip; `INFINITY` for clips without contacts.
    pub clip_contact_start: Vec<f32>,
    usable_frames: usize,
}

impl FrameDatabase {
    /// Flatten the usable frames of `group` into partitions.
    ///
    /// `contact_requirement` is `Some((state, n))` for states that match
    /// contacts: every clip must then carry the same contact count, at least `n`.
    pub fn build(
        group: &MotionDataGroup,
        group_index: u32,
        sections: &SectionTable,
        settings: BuildSettings,
        contact_requirement: Option<(&str, usize)>,
    ) -> Result<Self> {
        let layout = Self::check_schema(group, contact_requirement)?;

        // (clip, frame) of every usable frame, in clip order.
        let mut usable: Vec<(usize, usize)> = Vec::new();
        let mut clip_masks: Vec<Vec<(SectionMask, &[TimeRange])>> =
            Vec::with_capacity(group.clips.len());
        for clip in &group.clips {
            let mut masks = Vec::with_capacity(clip.sections.len());
            for interval in &clip.sections {
                let idx = sections.index(&interval.section)?;
                masks.push((SectionMask::of(idx), interval.ranges.as_slice()));
            }
            clip_masks.push(masks);
        }
        for (ci, clip) in group.clips.iter().enumerate() {
            for (fi, frame) in clip.frames.iter().enumerate() {
                if !clip.excluded_from_search(frame.local_time) {
                    usable.push((ci, fi));
                }
            }
        }

        let count = partition_count(usable.len(), settings.max_frames_per_job, settings.workers);
        let sizes = partition_sizes(usable.len(), count);
        let mut partitions = Vec::with_capacity(count);
        let mut cursor = 0usize;
        for size in sizes {
            let mut part = Partition::with_capacity(size, &layout);
            for &(ci, fi) in &usable[cursor..cursor + size] {
                let clip = &group.clips[ci];
                let frame = &clip.frames[fi];
                let mut mask = frame.sections.union(SectionMask::ALWAYS);
                for (bit, ranges) in &clip_masks[ci] {
                    if ranges.iter().any(|r| r.contains(frame.local_time)) {
                        mask = mask.union(*bit);
                    }
                }
                part.trajectory.extend_from_slice(&frame.trajectory);
                part.bones.extend_from_slice(&frame.pose);
                part.contacts
                    .extend_from_slice(&frame.contacts[..layout.contact_count]);
                part.meta.push(FrameMeta {
                    clip: ci as u32,
                    local_time: frame.local_time,
                    sections: mask,
                });
            }
            cursor += size;
            partitions.push(part);
        }

        debug!(
            "built frame database for group '{}': {} usable frames in {} partitions",
            group.name,
            usable.len(),
            partitions.len()
        );

        Ok(Self {
            group_index,
            layout,
            partitions,
            clip_contact_start: group
                .clips
                .iter()
                .map(|c| c.first_contact_start().unwrap_or(f32::INFINITY))
                .collect(),
            usable_frames: usable.len(),
        })
    }

    fn check_schema(
        group: &MotionDataGroup,
        contact_requirement: Option<(&str, usize)>,
    ) -> Result<DatabaseLayout> {
        let Some(first) = group.clips.first() else {
            return Ok(DatabaseLayout::default());
        };
        for clip in &group.clips {
            clip.validate_basic()?;
        }
        let mut layout = DatabaseLayout {
            trajectory_len: first.trajectory_len(),
            bone_count: first.bone_count(),
            contact_count: 0,
        };
        let mismatch = |clip: &str, channel: &'static str, expected, found| {
            MotionError::SchemaMismatch {
                group: group.name.clone(),
                clip: clip.to_string(),
                channel,
                expected,
                found,
            }
        };
        for clip in &group.clips[1..] {
            if clip.trajectory_len() != layout.trajectory_len {
                return Err(mismatch(
                    &clip.name,
                    "trajectory",
                    layout.trajectory_len,
                    clip.trajectory_len(),
                ));
            }
            if clip.bone_count() != layout.bone_count {
                return Err(mismatch(
                    &clip.name,
                    "pose",
                    layout.bone_count,
                    clip.bone_count(),
                ));
            }
        }
        if let Some((state, required)) = contact_requirement {
            layout.contact_count = first.contact_count();
            for clip in &group.clips {
                if clip.contact_count() < required {
                    return Err(MotionError::InsufficientContactPoints {
                        state: state.to_string(),
                        clip: clip.name.clone(),
                        required,
                        found: clip.contact_count(),
                    });
                }
                if clip.contact_count() != layout.contact_count {
                    return Err(mismatch(
                        &clip.name,
                        "contact",
                        layout.contact_count,
                        clip.contact_count(),
                    ));
                }
            }
        }
        Ok(layout)
    }

    /// Frames that made it into the database.
    #[inline]
    pub fn usable_frames(&self) -> usize {
        self.usable_frames
    }

    pub fn partition_sizes(&self) -> Vec<usize> {
        self.partitions.iter().map(Partition::len).collect()
    }
}
