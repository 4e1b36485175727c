//! # Defines Telemetry Pack for the Mission Sequencer

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::hot_swap::SlotId;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerTm {
    pub mission: u32,
    pub state: u32,
    pub finished: bool,
    pub in_manual: bool,
    pub ctrl_started: bool,
    pub active_slot: SlotId,
    pub num_activations: u64,
}
