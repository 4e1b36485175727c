//! # Mission library.
//!
//! This library allows other crates in the workspace (and the tests and benchmarks) to access
//! items defined inside the mission crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Announcer - spoken or logged notifications to the operator
pub mod announcer;

/// Controller link - the channel to the real-time motion controller
pub mod ctrl_link;

/// Event latch - records the events raised by the controller
pub mod event_latch;

/// HotSwap - double buffered program transport to the controller
pub mod hot_swap;

/// Mission log - records mission phase changes
pub mod mission_log;

/// Mission manager - sequences missions and their states
pub mod mission_mgr;

/// Manoeuvre planner - Angle-Line-Angle manoeuvres to a target pose
pub mod mnvr_planner;

/// Executable parameters
pub mod params;

/// Simulated controller and vision system
pub mod sim_ctrl;

/// Vision link - marker observations from the vision system
pub mod vision_link;
