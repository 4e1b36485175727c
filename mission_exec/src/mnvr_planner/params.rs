//! # Manoeuvre Planner Parameters

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MnvrPlannerParams {
    /// Smallest turn radius the robot can drive.
    ///
    /// Units: meters
    pub min_turn_radius_m: f64,

    /// Settle segments shorter than this are not driven.
    ///
    /// Units: meters
    pub settle_threshold_m: f64,

    /// Manoeuvres shorter than this are not worth driving, the robot is considered to already be
    /// at the target.
    ///
    /// Units: meters
    pub min_move_dist_m: f64,
}

impl Default for MnvrPlannerParams {
    fn default() -> Self {
        Self {
            min_turn_radius_m: 0.05,
            settle_threshold_m: 0.01,
            min_move_dist_m: 0.03,
        }
    }
}
