//! # Mission Executable Parameters
//!
//! This module provide parameters for the mission executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use util::logger::LoggerParams;

use crate::{
    announcer::AnnouncerParams,
    hot_swap::HotSwapParams,
    mission_mgr::{marker_approach::MarkerApproachParams, SequencerParams},
    mnvr_planner::MnvrPlannerParams,
    sim_ctrl::SimCtrlParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MissionExecParams {
    /// Mission file, relative to the params directory
    pub missions_file: String,

    #[serde(default)]
    pub logging: LoggerParams,

    pub sequencer: SequencerParams,

    pub hot_swap: HotSwapParams,

    pub mnvr_planner: MnvrPlannerParams,

    pub marker_approach: MarkerApproachParams,

    pub announcer: AnnouncerParams,

    pub sim_ctrl: SimCtrlParams,
}
