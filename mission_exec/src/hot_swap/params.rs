//! # HotSwap Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::ctrl::MotionLine;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HotSwapParams {
    /// Number of lines in each program slot.
    pub line_max: usize,

    /// Delay between the last write to a slot and its activation.
    ///
    /// Units: seconds
    pub settle_delay_s: f64,

    /// Lines run by the idle thread (thread 1) when the program is initialised.
    #[serde(default = "default_idle_lines")]
    pub idle_lines: Vec<MotionLine>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for HotSwapParams {
    fn default() -> Self {
        Self {
            line_max: 20,
            settle_delay_s: 0.01,
            idle_lines: default_idle_lines(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The idle thread only turns the IR distance sensors on.
fn default_idle_lines() -> Vec<MotionLine> {
    vec![MotionLine::parse("irsensor=1,vel=0:dist<0.2")]
}
