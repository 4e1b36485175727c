//! # Vision Marker Observations

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Identifier of a visual marker.
pub type MarkerId = u32;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A marker detected by the vision system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerObservation {
    /// Identifier of the detected marker
    pub id: MarkerId,

    /// Camera frame the marker was detected in
    pub frame_number: u64,

    /// Time at which the frame was captured
    pub timestamp: DateTime<Utc>,

    /// Position of the marker centre in the robot body frame (x forwards, y left).
    ///
    /// Units: meters
    pub position_m_rb: [f64; 2],

    /// Heading, in the robot body frame, a robot must have to face the marker head on. Positive to
    /// the left.
    ///
    /// Units: radians
    pub angle_rad: f64,

    /// True until the observation has been consumed by a reader.
    pub is_new: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MarkerObservation {
    /// Create a new (unread) observation captured now.
    pub fn new(id: MarkerId, frame_number: u64, position_m_rb: [f64; 2], angle_rad: f64) -> Self {
        Self {
            id,
            frame_number,
            timestamp: Utc::now(),
            position_m_rb,
            angle_rad,
            is_new: true,
        }
    }

    /// Consume the "new" flag, returning its value before the call.
    pub fn take_new(&mut self) -> bool {
        std::mem::replace(&mut self.is_new, false)
    }
}
