//! # Equipment interfaces

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Motion controller text protocol
pub mod ctrl;

/// Vision system marker observations
pub mod vision;
