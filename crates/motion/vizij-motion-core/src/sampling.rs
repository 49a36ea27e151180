//! Sampling of baked clips at arbitrary local times.
//!
//! Frames are linearly interpolated; looping clips wrap `t` first, others clamp.

use crate::data::{BoneSample, Clip, ContactSample, TrajectoryPoint};
use crate::time::wrap_time;

/// Bracketing frames and blend factor for time `t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSpan {
    pub lo: usize,
    pub hi: usize,
    pub alpha: f32,
}

/// Locate the frames around `t`.
///
/// Returns `None` only for clips without frames.
pub fn frame_span(clip: &Clip, t: f32) -> Option<FrameSpan> {
    let frames = &clip.frames;
    if frames.is_empty() {
        return None;
    }
    let t = wrap_time(t, clip.length, clip.looping);
    // First frame strictly after t.
    let hi = frames.partition_point(|f| f.local_time <= t);
    if hi == 0 {
        return Some(FrameSpan {
            lo: 0,
            hi: 0,
            alpha: 0.0,
        });
    }
    if hi >= frames.len() {
        let last = frames.len() - 1;
        return Some(FrameSpan {
            lo: last,
            hi: last,
            alpha: 0.0,
        });
    }
    let lo = hi - 1;
    let t0 = frames[lo].local_time;
    let t1 = frames[hi].local_time;
    let alpha = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
    Some(FrameSpan { lo, hi, alpha })
}

/// Interpolated pose at `t`, written into `out` (cleared first).
pub fn sample_pose(clip: &Clip, t: f32, out: &mut Vec<BoneSample>) {
    out.clear();
    let Some(span) = frame_span(clip, t) else {
        return;
    };
    let a = &clip.frames[span.lo].pose;
    let b = &clip.frames[span.hi].pose;
    out.extend(a.iter().zip(b).map(|(x, y)| x.lerp(y, span.alpha)));
}

/// Interpolated trajectory at `t`, written into `out` (cleared first).
pub fn sample_trajectory(clip: &Clip, t: f32, out: &mut Vec<TrajectoryPoint>) {
    out.clear();
    let Some(span) = frame_span(clip, t) else {
        return;
    };
    let a = &clip.frames[span.lo].trajectory;
    let b = &clip.frames[span.hi].trajectory;
    out.extend(a.iter().zip(b).map(|(x, y)| x.lerp(y, span.alpha)));
}

/// Interpolated contact `index` as seen from the root at `t`.
pub fn sample_contact(clip: &Clip, t: f32, index: usize) -> Option<ContactSample> {
    let span = frame_span(clip, t)?;
    let a = clip.frames[span.lo].contacts.get(index)?;
    let b = clip.frames[span.hi].contacts.get(index)?;
    Some(a.lerp(b, span.alpha))
}
