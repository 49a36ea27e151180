//! Trajectory prediction.
//!
//! Turns a desired velocity into the past/future samples the search matches
//! against. Future samples are kept as offsets from the character so they
//! survive root motion between frames. Smooth mode relaxes each offset toward
//! its goal, faster for near samples than for far ones; constant mode jumps
//! straight to the goal. With a collision world attached every step is
//! capsule-cast and slid along what it hits, while an uncorrected copy keeps
//! the unobstructed prediction for the next frame's smoothing.
//!
//! Output order is past samples (oldest first) followed by future samples
//! (nearest first).

use std::collections::VecDeque;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::data::TrajectoryPoint;

/// Hit reported by a [`CollisionWorld`] cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastHit {
    pub point: Vec3,
    pub normal: Vec3,
}

/// Host physics contract.
pub trait CollisionWorld {
    /// Sweep a capsule with end points `start`/`end` along `direction`.
    fn capsule_cast(
        &self,
        start: Vec3,
        end: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<CastHit>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMode {
    Constant,
    #[default]
    Smooth,
}

/// Facing of predicted samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum OrientationMode {
    /// Face along the horizontal velocity.
    #[default]
    Velocity,
    /// Keep a fixed facing (strafing).
    Fixed(Vec3),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionSettings {
    pub radius: f32,
    pub height: f32,
    pub mask: u32,
}

impl Default for CollisionSettings {
    fn default() -> Self {
        Self {
            radius: 0.3,
            height: 1.8,
            mask: u32::MAX,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectorySettings {
    /// Ages of past samples in seconds, oldest first.
    pub past_times: Vec<f32>,
    /// Offsets of future samples in seconds, ascending.
    pub future_times: Vec<f32>,
    pub max_speed: f32,
    /// Largest velocity change per second a sample may follow.
    pub acceleration: f32,
    pub stiffness: f32,
    /// Relaxation bias of the nearest future sample.
    pub bias_start: f32,
    /// Relaxation bias of the farthest future sample.
    pub bias_end: f32,
    pub sharp_turn_multiplier: f32,
    /// A step counts as a sharp turn once it exceeds the nominal step by this factor.
    pub sharp_turn_threshold: f32,
    pub mode: PredictionMode,
    /// Seconds between two recorded past points.
    pub record_interval: f32,
    pub orientation: OrientationMode,
    pub collision: Option<CollisionSettings>,
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        Self {
            past_times: vec![0.5, 0.25],
            future_times: vec![0.25, 0.5, 0.75, 1.0],
            max_speed: 2.0,
            acceleration: 10.0,
            stiffness: 10.0,
            bias_start: 1.0,
            bias_end: 0.5,
            sharp_turn_multiplier: 2.0,
            sharp_turn_threshold: 1.1,
            mode: PredictionMode::Smooth,
            record_interval: 1.0 / 30.0,
            orientation: OrientationMode::Velocity,
            collision: None,
        }
    }
}

impl TrajectorySettings {
    /// Samples per trajectory.
    pub fn len(&self) -> usize {
        self.past_times.len() + self.future_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.past_times.is_empty() && self.future_times.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct RecordedPoint {
    age: f32,
    point: TrajectoryPoint,
}

/// Ring of past points sampled at a fixed cadence.
#[derive(Clone, Debug)]
pub struct PastRecorder {
    interval: f32,
    max_age: f32,
    since_record: f32,
    /// Newest first.
    points: VecDeque<RecordedPoint>,
}

impl PastRecorder {
    pub fn new(interval: f32, max_age: f32) -> Self {
        Self {
            interval: interval.max(1e-4),
            max_age,
            since_record: 0.0,
            points: VecDeque::new(),
        }
    }

    /// Age every point by `dt` and record `current` when the cadence is due.
    pub fn tick(&mut self, dt: f32, current: TrajectoryPoint) {
        for p in &mut self.points {
            p.age += dt;
        }
        self.since_record += dt;
        if self.points.is_empty() || self.since_record >= self.interval {
            self.points.push_front(RecordedPoint {
                age: 0.0,
                point: current,
            });
            self.since_record = 0.0;
        }
        // One point older than the oldest needed offset stays for interpolation.
        while self.points.len() > 2
            && self.points.get(self.points.len() - 2).is_some_and(|p| p.age >= self.max_age)
        {
            self.points.pop_back();
        }
    }

    /// Point `age` seconds ago; `current` stands in for age zero.
    pub fn sample(&self, age: f32, current: &TrajectoryPoint) -> TrajectoryPoint {
        let mut newer = RecordedPoint {
            age: 0.0,
            point: *current,
        };
        for p in &self.points {
            if p.age >= age {
                let span = p.age - newer.age;
                let t = if span > 1e-6 {
                    (age - newer.age) / span
                } else {
                    0.0
                };
                return newer.point.lerp(&p.point, t.clamp(0.0, 1.0));
            }
            newer = *p;
        }
        newer.point
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.since_record = 0.0;
    }
}

#[derive(Clone, Debug)]
pub struct TrajectoryPredictor {
    settings: TrajectorySettings,
    desired_velocity: Vec3,
    position: Vec3,
    facing: Vec3,
    velocity: Vec3,
    /// Unobstructed future offsets from the character.
    offsets: Vec<Vec3>,
    past: PastRecorder,
    corrected: Vec<TrajectoryPoint>,
    uncorrected: Vec<TrajectoryPoint>,
}

fn horizontal_dir(v: Vec3) -> Option<Vec3> {
    Vec3::new(v.x, 0.0, v.z).try_normalize()
}

impl TrajectoryPredictor {
    pub fn new(settings: TrajectorySettings) -> Self {
        let max_age = settings.past_times.iter().copied().fold(0.0, f32::max);
        let past = PastRecorder::new(settings.record_interval, max_age);
        let n = settings.future_times.len();
        let mut predictor = Self {
            desired_velocity: Vec3::ZERO,
            position: Vec3::ZERO,
            facing: Vec3::Z,
            velocity: Vec3::ZERO,
            offsets: vec![Vec3::ZERO; n],
            past,
            corrected: Vec::new(),
            uncorrected: Vec::new(),
            settings,
        };
        predictor.emit(None);
        predictor
    }

    pub fn settings(&self) -> &TrajectorySettings {
        &self.settings
    }

    /// Teleport the character and forget all history.
    pub fn reset(&mut self, position: Vec3, facing: Vec3) {
        self.position = position;
        self.facing = horizontal_dir(facing).unwrap_or(Vec3::Z);
        self.velocity = Vec3::ZERO;
        self.offsets.iter_mut().for_each(|o| *o = Vec3::ZERO);
        self.past.clear();
        self.emit(None);
    }

    /// Stick-style input: length 1 means full `max_speed`.
    pub fn set_input(&mut self, input: Vec3) {
        self.desired_velocity = input.clamp_length_max(1.0) * self.settings.max_speed;
    }

    /// Desired velocity in world units, capped at `max_speed`.
    pub fn set_desired_velocity(&mut self, velocity: Vec3) {
        self.desired_velocity = velocity.clamp_length_max(self.settings.max_speed);
    }

    pub fn desired_velocity(&self) -> Vec3 {
        self.desired_velocity
    }

    /// Advance one frame with the character now at `position` facing `facing`.
    pub fn update(
        &mut self,
        dt: f32,
        position: Vec3,
        facing: Vec3,
        world: Option<&dyn CollisionWorld>,
    ) {
        if dt > 0.0 {
            self.velocity = (position - self.position) / dt;
        }
        self.position = position;
        if let Some(f) = horizontal_dir(facing) {
            self.facing = f;
        }
        let current = TrajectoryPoint::new(self.position, self.velocity, self.facing);
        self.past.tick(dt.max(0.0), current);

        match self.settings.mode {
            PredictionMode::Constant => {
                for (o, t) in self.offsets.iter_mut().zip(&self.settings.future_times) {
                    *o = self.desired_velocity * *t;
                }
            }
            PredictionMode::Smooth => self.relax(dt.max(0.0)),
        }
        self.emit(world);
    }

    fn relax(&mut self, dt: f32) {
        let s = &self.settings;
        let Some(&last_time) = s.future_times.last() else {
            return;
        };
        let base = 1.0 - (-s.stiffness * dt).exp();
        let mut prev_time = 0.0;
        let mut prev_offset = Vec3::ZERO;
        for (o, &t) in self.offsets.iter_mut().zip(&s.future_times) {
            let step_time = (t - prev_time).max(1e-4);
            let goal = prev_offset + self.desired_velocity * step_time;
            let delta = goal - *o;
            let fraction = if last_time > 0.0 { t / last_time } else { 1.0 };
            let bias = s.bias_start + (s.bias_end - s.bias_start) * fraction * fraction;
            let nominal = s.max_speed * step_time;
            let sharp = if delta.length() > nominal * s.sharp_turn_threshold {
                s.sharp_turn_multiplier
            } else {
                1.0
            };
            let factor = (base * bias * sharp).clamp(0.0, 1.0);
            let max_step = s.acceleration * dt * t;
            *o += (delta * factor).clamp_length_max(max_step.max(0.0));
            prev_time = t;
            prev_offset = *o;
        }
    }

    fn orientation(&self, velocity: Vec3, previous: Vec3) -> Vec3 {
        match self.settings.orientation {
            OrientationMode::Velocity => horizontal_dir(velocity).unwrap_or(previous),
            OrientationMode::Fixed(dir) => horizontal_dir(dir).unwrap_or(previous),
        }
    }

    /// Rebuild both output trajectories from the current offsets.
    fn emit(&mut self, world: Option<&dyn CollisionWorld>) {
        let current = TrajectoryPoint::new(self.position, self.velocity, self.facing);
        let mut uncorrected = Vec::with_capacity(self.settings.len());
        for &age in &self.settings.past_times {
            uncorrected.push(self.past.sample(age, &current));
        }
        let past_len = uncorrected.len();

        let mut prev_time = 0.0;
        let mut prev_offset = Vec3::ZERO;
        let mut prev_facing = self.facing;
        for (o, &t) in self.offsets.iter().zip(&self.settings.future_times) {
            let step_time = (t - prev_time).max(1e-4);
            let velocity = (*o - prev_offset) / step_time;
            let facing = self.orientation(velocity, prev_facing);
            uncorrected.push(TrajectoryPoint::new(self.position + *o, velocity, facing));
            prev_time = t;
            prev_offset = *o;
            prev_facing = facing;
        }

        let mut corrected = uncorrected.clone();
        if let (Some(world), Some(col)) = (world, self.settings.collision) {
            let mut from = self.position;
            let mut prev_time = 0.0;
            let mut prev_unobstructed = self.position;
            for (i, &t) in self.settings.future_times.iter().enumerate() {
                let target = uncorrected[past_len + i].position;
                let delta = target - prev_unobstructed;
                let to = cast_step(world, &col, from, delta);
                let step_time = (t - prev_time).max(1e-4);
                let point = &mut corrected[past_len + i];
                point.velocity = (to - from) / step_time;
                point.position = to;
                point.orientation = uncorrected[past_len + i].orientation;
                from = to;
                prev_unobstructed = target;
                prev_time = t;
            }
        }
        self.uncorrected = uncorrected;
        self.corrected = corrected;
    }

    /// World-space trajectory, collision-corrected when a world was supplied.
    pub fn trajectory(&self) -> &[TrajectoryPoint] {
        &self.corrected
    }

    /// World-space trajectory ignoring collisions.
    pub fn uncorrected(&self) -> &[TrajectoryPoint] {
        &self.uncorrected
    }

    /// Trajectory in the space of a root at `root_position` rotated by `root_rotation`.
    pub fn local_trajectory(&self, root_position: Vec3, root_rotation: Quat) -> Vec<TrajectoryPoint> {
        to_local(&self.corrected, root_position, root_rotation)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

/// Express world-space samples relative to a root.
pub fn to_local(
    points: &[TrajectoryPoint],
    root_position: Vec3,
    root_rotation: Quat,
) -> Vec<TrajectoryPoint> {
    let inv = root_rotation.inverse();
    points
        .iter()
        .map(|p| {
            TrajectoryPoint::new(
                inv * (p.position - root_position),
                inv * p.velocity,
                inv * p.orientation,
            )
        })
        .collect()
}

/// Move from `from` by `delta`, stopping at and sliding along obstacles.
/// The slide is cast a second time so corners do not push through walls.
fn cast_step(world: &dyn CollisionWorld, col: &CollisionSettings, from: Vec3, delta: Vec3) -> Vec3 {
    let (stop, slide) = cast_once(world, col, from, delta);
    match slide {
        Some(rest) => cast_once(world, col, stop, rest).0,
        None => stop,
    }
}

fn cast_once(
    world: &dyn CollisionWorld,
    col: &CollisionSettings,
    from: Vec3,
    delta: Vec3,
) -> (Vec3, Option<Vec3>) {
    let distance = delta.length();
    let Some(dir) = delta.try_normalize() else {
        return (from, None);
    };
    let bottom = from + Vec3::Y * col.radius;
    let top = from + Vec3::Y * (col.height - col.radius).max(col.radius);
    let Some(hit) = world.capsule_cast(bottom, top, col.radius, dir, distance, col.mask) else {
        return (from + delta, None);
    };
    let reach = ((hit.point - from).dot(dir) - col.radius).clamp(0.0, distance);
    let stop = from + dir * reach;
    let rest = delta - dir * reach;
    let normal = hit.normal.try_normalize().unwrap_or(-dir);
    let slide = rest - normal * rest.dot(normal);
    (stop, Some(slide))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_interpolates_between_points() {
        let mut rec = PastRecorder::new(0.1, 0.3);
        let at = |x: f32| TrajectoryPoint::new(Vec3::new(x, 0.0, 0.0), Vec3::ZERO, Vec3::Z);
        rec.tick(0.0, at(0.0));
        rec.tick(0.1, at(1.0));
        let current = at(2.0);
        // newest recorded (x=1) is age 0, oldest (x=0) age 0.1
        let p = rec.sample(0.05, &current);
        assert!((p.position.x - 0.5).abs() < 1e-5);
        let oldest = rec.sample(10.0, &current);
        assert!((oldest.position.x - 0.0).abs() < 1e-5);
    }

    #[test]
    fn recorder_discards_stale_points() {
        let mut rec = PastRecorder::new(0.1, 0.3);
        for i in 0..50 {
            rec.tick(0.1, TrajectoryPoint::new(Vec3::X * i as f32, Vec3::ZERO, Vec3::Z));
        }
        assert!(rec.len() <= 5);
    }

    #[test]
    fn fixed_orientation_strafes() {
        let settings = TrajectorySettings {
            mode: PredictionMode::Constant,
            orientation: OrientationMode::Fixed(Vec3::Z),
            ..Default::default()
        };
        let mut p = TrajectoryPredictor::new(settings);
        p.set_input(Vec3::X);
        p.update(1.0 / 60.0, Vec3::ZERO, Vec3::Z, None);
        assert!(p.trajectory().iter().all(|s| s.orientation.abs_diff_eq(Vec3::Z, 1e-5)));
    }
}
