//! Distance functions used to rank candidate frames.
//!
//! Every cost is a sum of squared Euclidean distances: no square roots, which
//! keeps ranking monotonic and cheap. Lower is better; identical inputs cost 0.

use serde::{Deserialize, Serialize};

use crate::data::{BoneSample, ContactSample, TrajectoryPoint};

/// Which contact attributes take part in contact matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactCostMode {
    Positions,
    Directions,
    #[default]
    PositionsAndDirections,
}

/// Cost channels that can be switched off per state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostChannels {
    pub trajectory_position: bool,
    pub trajectory_velocity: bool,
    pub trajectory_orientation: bool,
    pub pose_position: bool,
    pub pose_velocity: bool,
}

impl Default for CostChannels {
    fn default() -> Self {
        Self {
            trajectory_position: true,
            trajectory_velocity: true,
            trajectory_orientation: true,
            pose_position: true,
            pose_velocity: true,
        }
    }
}

/// Weights of the ranking sum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub trajectory: f32,
    pub pose: f32,
    pub contact: f32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            trajectory: 1.0,
            pose: 1.0,
            contact: 1.0,
        }
    }
}

/// Per-state cost configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub weights: CostWeights,
    pub channels: CostChannels,
    pub contact_mode: ContactCostMode,
}

/// Σ over bones of ‖Δposition‖² + ‖Δvelocity‖².
pub fn pose_cost(a: &[BoneSample], b: &[BoneSample], channels: &CostChannels) -> f32 {
    let mut cost = 0.0;
    for (x, y) in a.iter().zip(b) {
        if channels.pose_position {
            cost += x.position.distance_squared(y.position);
        }
        if channels.pose_velocity {
            cost += x.velocity.distance_squared(y.velocity);
        }
    }
    cost
}

/// Σ over points of ‖Δposition‖² + ‖Δvelocity‖² + ‖Δorientation‖², times `responsivity`.
pub fn trajectory_cost(
    a: &[TrajectoryPoint],
    b: &[TrajectoryPoint],
    responsivity: f32,
    channels: &CostChannels,
) -> f32 {
    let mut cost = 0.0;
    for (x, y) in a.iter().zip(b) {
        if channels.trajectory_position {
            cost += x.position.distance_squared(y.position);
        }
        if channels.trajectory_velocity {
            cost += x.velocity.distance_squared(y.velocity);
        }
        if channels.trajectory_orientation {
            cost += x.orientation.distance_squared(y.orientation);
        }
    }
    cost * responsivity
}

/// Squared distance of one contact pair under `mode`.
#[inline]
pub fn contact_point_cost(a: &ContactSample, b: &ContactSample, mode: ContactCostMode) -> f32 {
    match mode {
        ContactCostMode::Positions => a.position.distance_squared(b.position),
        ContactCostMode::Directions => a.normal.distance_squared(b.normal),
        ContactCostMode::PositionsAndDirections => {
            a.position.distance_squared(b.position) + a.normal.distance_squared(b.normal)
        }
    }
}

/// Σ over index-aligned contact pairs.
pub fn contact_cost(a: &[ContactSample], b: &[ContactSample], mode: ContactCostMode) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| contact_point_cost(x, y, mode))
        .sum()
}

/// Final ranking cost of one candidate.
#[inline]
pub fn ranking_cost(weights: &CostWeights, trajectory: f32, pose: f32, contact: f32) -> f32 {
    weights.trajectory * trajectory + weights.pose * pose + weights.contact * contact
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn bones(seed: f32) -> Vec<BoneSample> {
        (0..4)
            .map(|i| {
                let f = i as f32 + seed;
                BoneSample::new(Vec3::new(f, f * 0.5, -f), Vec3::new(0.1 * f, 0.0, f))
            })
            .collect()
    }

    fn traj(seed: f32) -> Vec<TrajectoryPoint> {
        (0..3)
            .map(|i| {
                let f = i as f32 + seed;
                TrajectoryPoint::new(Vec3::new(0.0, 0.0, f), Vec3::Z * seed, Vec3::Z)
            })
            .collect()
    }

    #[test]
    fn identical_inputs_cost_nothing() {
        let ch = CostChannels::default();
        assert_eq!(pose_cost(&bones(1.0), &bones(1.0), &ch), 0.0);
        assert_eq!(trajectory_cost(&traj(2.0), &traj(2.0), 1.0, &ch), 0.0);
    }

    #[test]
    fn costs_are_symmetric() {
        let ch = CostChannels::default();
        let ab = pose_cost(&bones(0.0), &bones(1.5), &ch);
        let ba = pose_cost(&bones(1.5), &bones(0.0), &ch);
        assert!(ab > 0.0);
        assert!((ab - ba).abs() < 1e-4);
        let ab = trajectory_cost(&traj(0.0), &traj(1.0), 1.0, &ch);
        let ba = trajectory_cost(&traj(1.0), &traj(0.0), 1.0, &ch);
        assert!((ab - ba).abs() < 1e-4);
    }

    #[test]
    fn responsivity_scales_trajectory_term() {
        let ch = CostChannels::default();
        let base = trajectory_cost(&traj(0.0), &traj(1.0), 1.0, &ch);
        let urgent = trajectory_cost(&traj(0.0), &traj(1.0), 2.0, &ch);
        assert!((urgent - 2.0 * base).abs() < 1e-4);
    }

    #[test]
    fn disabled_channels_do_not_contribute() {
        let ch = CostChannels {
            pose_velocity: false,
            ..Default::default()
        };
        let a = [BoneSample::new(Vec3::ZERO, Vec3::ZERO)];
        let b = [BoneSample::new(Vec3::ZERO, Vec3::X)];
        assert_eq!(pose_cost(&a, &b, &ch), 0.0);
    }

    #[test]
    fn contact_modes_select_terms() {
        let a = ContactSample::new(Vec3::ZERO, Vec3::Y);
        let b = ContactSample::new(Vec3::X * 2.0, Vec3::X);
        assert!((contact_point_cost(&a, &b, ContactCostMode::Positions) - 4.0).abs() < 1e-6);
        assert!((contact_point_cost(&a, &b, ContactCostMode::Directions) - 2.0).abs() < 1e-6);
        assert!(
            (contact_point_cost(&a, &b, ContactCostMode::PositionsAndDirections) - 6.0).abs()
                < 1e-6
        );
    }
}
