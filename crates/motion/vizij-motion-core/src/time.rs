//! Clip-local time math shared by the guard, the reference mixer and marker detection.

/// Floored modulo: the result has the sign of `b`.
pub fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

/// Map an unbounded time into `[0, length]`: wrapped for looping clips, clamped otherwise.
pub fn wrap_time(t: f32, length: f32, looping: bool) -> f32 {
    if length <= 0.0 {
        return 0.0;
    }
    if looping {
        fmod(t, length)
    } else {
        t.clamp(0.0, length)
    }
}

/// Position a clip reaches after playing `dt` more seconds from `t`.
#[inline]
pub fn extrapolate(t: f32, dt: f32, length: f32, looping: bool) -> f32 {
    wrap_time(t + dt, length, looping)
}

/// Absolute distance between two playback positions of the same clip.
/// Looping clips measure the shorter way around the seam.
pub fn clip_distance(a: f32, b: f32, length: f32, looping: bool) -> f32 {
    let d = (a - b).abs();
    if looping && length > 0.0 {
        let d = fmod(d, length);
        d.min(length - d)
    } else {
        d
    }
}

/// Whether `marker` was passed while playback moved from `from` to `to`.
///
/// `from` is exclusive and `to` inclusive. A looping clip that wrapped
/// (`to < from`) covers `(from, length] ∪ [0, to]`.
pub fn crossed(from: f32, to: f32, marker: f32, looping: bool) -> bool {
    if to >= from {
        marker > from && marker <= to
    } else if looping {
        marker > from || marker <= to
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmod_is_floored() {
        assert!((fmod(-0.5, 2.0) - 1.5).abs() < 1e-6);
        assert!((fmod(5.0, 2.0) - 1.0).abs() < 1e-6);
        assert_eq!(fmod(1.0, 0.0), 0.0);
    }

    #[test]
    fn wrap_clamps_or_loops() {
        assert!((wrap_time(2.5, 2.0, true) - 0.5).abs() < 1e-6);
        assert_eq!(wrap_time(2.5, 2.0, false), 2.0);
        assert_eq!(wrap_time(-1.0, 2.0, false), 0.0);
    }

    #[test]
    fn distance_takes_short_way_around_loop_seam() {
        assert!((clip_distance(1.95, 0.05, 2.0, true) - 0.1).abs() < 1e-5);
        assert!((clip_distance(1.95, 0.05, 2.0, false) - 1.9).abs() < 1e-5);
    }

    #[test]
    fn crossing_handles_wrap() {
        assert!(crossed(0.1, 0.3, 0.2, false));
        assert!(!crossed(0.1, 0.3, 0.1, false));
        assert!(crossed(1.9, 0.1, 0.05, true));
        assert!(crossed(1.9, 0.1, 1.95, true));
        assert!(!crossed(1.9, 0.1, 1.0, true));
    }
}
