//! # Mission Sequencer Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SequencerParams {
    /// Target period of one sequencer cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// First mission to run
    pub from_mission: u32,

    /// Last mission to run, the sequencer stops the robot once this mission has finished.
    pub to_mission: u32,

    /// Number of times the controller heartbeat is checked after start before reporting it lost
    pub heartbeat_retries: u32,

    /// Wait between two heartbeat checks.
    ///
    /// Units: seconds
    pub heartbeat_retry_wait_s: f64,

    /// If true the sequencer does not run any missions when the controller heartbeat is lost.
    #[serde(default)]
    pub abort_on_heartbeat_loss: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SequencerParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.01,
            from_mission: 1,
            to_mission: 1,
            heartbeat_retries: 3,
            heartbeat_retry_wait_s: 2.0,
            abort_on_heartbeat_loss: false,
        }
    }
}
