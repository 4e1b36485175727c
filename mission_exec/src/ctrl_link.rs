//! # Controller Link
//!
//! Abstraction over the channel to the real-time motion controller. The link carries the
//! [`CtrlCmd`] text protocol towards the controller, and exposes the parts of the controller's
//! status the mission layer needs (heartbeat, gamepad override, buttons and motion state). Events
//! raised by the controller are delivered into an [`EventLatch`](crate::event_latch::EventLatch)
//! by the link's receive path.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::ctrl::CtrlCmd;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A link to the motion controller.
///
/// There is a single writer to the controller, the
/// [`HotSwap`](crate::hot_swap::HotSwap) transport owns the link.
pub trait CtrlLink: Send {
    /// Send a command to the controller.
    fn send(&mut self, cmd: &CtrlCmd) -> Result<(), CtrlLinkError>;

    /// Process any data received from the controller. Called once per sequencer cycle.
    fn service(&mut self) -> Result<(), CtrlLinkError> {
        Ok(())
    }

    /// Returns true if the controller has been heard from recently.
    fn is_heartbeat_ok(&self) -> bool;

    /// Returns true while the operator has taken manual (gamepad) control.
    fn is_manual(&self) -> bool;

    /// Returns true while the given gamepad button is held down.
    fn is_button_pressed(&self, button: Button) -> bool;

    /// Latest motion state reported by the controller.
    fn motion_status(&self) -> MotionStatus;

    /// Name the robot reports for itself.
    fn robot_name(&self) -> String;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Motion state of the robot as reported by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionStatus {
    /// Forward velocity of the robot.
    ///
    /// Units: meters/second
    pub velocity_ms: f64,

    /// Turn rate of the robot, positive to the left.
    ///
    /// Units: radians/second
    pub turn_rate_rads: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Gamepad buttons which have a meaning to the mission layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    /// Operator start button.
    Green,
    Red,
    Blue,

    /// Request a marker analysis from the vision system.
    Yellow,
}

#[derive(Debug, thiserror::Error)]
pub enum CtrlLinkError {
    #[error("The link is not connected to the controller")]
    NotConnected,

    #[error("Could not send command \"{0}\" to the controller: {1}")]
    SendError(String, std::io::Error),

    #[error("Could not recieve data from the controller: {0}")]
    RecvError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionStatus {
    /// Returns true if the robot is moving slower than both limits.
    pub fn is_still(&self, max_velocity_ms: f64, max_turn_rate_rads: f64) -> bool {
        self.velocity_ms.abs() < max_velocity_ms && self.turn_rate_rads.abs() < max_turn_rate_rads
    }
}
