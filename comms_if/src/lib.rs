//! # Communications interface crate.
//!
//! Provides the interfaces shared between the mission executable and the equipment it talks to:
//! the real-time motion controller and the vision system.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command and data definitions for equipment (motion controller, vision)
pub mod eqpt;
