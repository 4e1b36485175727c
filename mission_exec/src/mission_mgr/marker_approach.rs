//! # Marker approach
//!
//! Sub-mission which finds a visual marker and drives up to it. The robot waits until it is still,
//! asks the vision system to analyse a frame, and then either:
//!
//! - stops if the stop marker is seen,
//! - drives an Angle-Line-Angle manoeuvre to a point in front of the first new marker seen,
//! - or turns a little on the spot and looks again, up to a maximum number of times.
//!
//! The approach runs as a normal [`MissionHandler`], so it can be run on its own or nested inside
//! another mission.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};

use comms_if::eqpt::{
    ctrl::{EventId, MotionLine},
    vision::{MarkerId, MarkerObservation},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{
    io::{MissionIo, DISPLAY_ROW_DETAIL},
    MissionError, MissionHandler, StateId, STATE_ENTRY, STATE_TERMINAL,
};
use crate::{
    hot_swap::ScriptBuffer,
    mnvr_planner::{ManeuverPlan, MnvrLimits, MnvrPlanner, PlanError, Pose},
    vision_link,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MarkerApproachParams {
    /// Marker which ends the approach when seen
    pub stop_marker_id: MarkerId,

    /// Distance from the marker the robot stops at.
    ///
    /// Units: meters
    pub standoff_m: f64,

    /// Sideways offset of the stopping point from the marker, positive to the left.
    ///
    /// Units: meters
    pub lateral_m: f64,

    /// Cruise velocity of the approach.
    ///
    /// Units: meters/second
    pub vel_ms: f64,

    /// Acceleration limit of the approach.
    ///
    /// Units: meters/second^2
    pub acc_mss: f64,

    /// The robot is still when its velocity is below this.
    ///
    /// Units: meters/second
    pub still_velocity_ms: f64,

    /// The robot is still when its turn rate is below this.
    ///
    /// Units: radians/second
    pub still_turn_rate_rads: f64,

    /// Wait after the robot is still before analysing, so that the analysed frame was taken while
    /// still.
    ///
    /// Units: seconds
    pub frame_settle_s: f64,

    /// Number of looks at the surroundings before giving up.
    pub max_search_iterations: u32,

    /// Velocity of the search turn.
    ///
    /// Units: meters/second
    pub search_vel_ms: f64,

    /// Radius of the search turn.
    ///
    /// Units: meters
    pub search_turn_radius_m: f64,

    /// Angle turned between two looks, positive to the left.
    ///
    /// Units: degrees
    pub search_turn_deg: f64,

    /// Time limit of one search turn.
    ///
    /// Units: seconds
    pub search_turn_timeout_s: f64,

    /// Event raised by the approach scripts when they complete.
    pub completion_event: EventId,
}

/// Marker approach sub-mission.
#[derive(Debug, Clone)]
pub struct MarkerApproach {
    params: MarkerApproachParams,
    planner: MnvrPlanner,
    search_count: u32,
    outcome: Option<ApproachOutcome>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How a marker approach ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproachOutcome {
    /// The robot is in front of a marker.
    Reached,

    /// The stop marker was seen.
    StopMarker,

    /// No usable marker was found within the search limit.
    NotFound,
}

/// States of the marker approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachState {
    Announce,
    WaitStill,
    WaitAnalysis,
    SearchTurn,
    SearchWait,
    Approach,
    ApproachWait,
    Done,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MarkerApproachParams {
    fn default() -> Self {
        Self {
            stop_marker_id: 6,
            standoff_m: 0.3,
            lateral_m: 0.0,
            vel_ms: 0.3,
            acc_mss: 1.0,
            still_velocity_ms: 0.001,
            still_turn_rate_rads: 0.01,
            frame_settle_s: 0.035,
            max_search_iterations: 36,
            search_vel_ms: 0.25,
            search_turn_radius_m: 0.15,
            search_turn_deg: 10.0,
            search_turn_timeout_s: 10.0,
            completion_event: 2,
        }
    }
}

impl ApproachState {
    pub fn id(self) -> StateId {
        match self {
            ApproachState::Announce => STATE_ENTRY,
            ApproachState::WaitStill => 11,
            ApproachState::WaitAnalysis => 12,
            ApproachState::SearchTurn => 20,
            ApproachState::SearchWait => 21,
            ApproachState::Approach => 30,
            ApproachState::ApproachWait => 31,
            ApproachState::Done => STATE_TERMINAL,
        }
    }

    pub fn from_id(id: StateId) -> Option<Self> {
        match id {
            STATE_ENTRY => Some(ApproachState::Announce),
            11 => Some(ApproachState::WaitStill),
            12 => Some(ApproachState::WaitAnalysis),
            20 => Some(ApproachState::SearchTurn),
            21 => Some(ApproachState::SearchWait),
            30 => Some(ApproachState::Approach),
            31 => Some(ApproachState::ApproachWait),
            STATE_TERMINAL => Some(ApproachState::Done),
            _ => None,
        }
    }
}

impl MarkerApproach {
    pub fn new(params: MarkerApproachParams, planner: MnvrPlanner) -> Self {
        Self {
            params,
            planner,
            search_count: 0,
            outcome: None,
        }
    }

    /// How the approach ended, `None` while it is running.
    pub fn outcome(&self) -> Option<ApproachOutcome> {
        self.outcome
    }

    /// Number of searches made so far.
    pub fn search_count(&self) -> u32 {
        self.search_count
    }

    /// Pose, in the robot body frame, the robot should stop at to face the marker.
    pub fn standoff_target(&self, obs: &MarkerObservation) -> Pose {
        let h = obs.angle_rad;
        let dx = self.params.standoff_m;
        let dy = self.params.lateral_m;

        Pose::new(
            obs.position_m_rb[0] - (dx * h.cos() - dy * h.sin()),
            obs.position_m_rb[1] - (dx * h.sin() + dy * h.cos()),
            h,
        )
    }

    /// Script for one search turn.
    fn search_script(&self) -> ScriptBuffer {
        let mut script = ScriptBuffer::new();
        script
            .push(
                MotionLine::new()
                    .vel(self.params.search_vel_ms)
                    .turn_radius(self.params.search_turn_radius_m)
                    .until_turn(self.params.search_turn_deg)
                    .until_time(self.params.search_turn_timeout_s),
            )
            .terminate_with_event(self.params.completion_event);
        script
    }

    /// Plan the approach to the first new marker.
    ///
    /// Returns `None` if there is no new marker any more. The observation is only locked while the
    /// plan is made.
    fn plan_approach(&self, io: &MissionIo) -> Option<(MarkerId, Result<ManeuverPlan, PlanError>)> {
        let obs = io.vision.first_new()?;

        let (id, target) = {
            let mut guard = vision_link::lock(&obs);
            guard.take_new();
            (guard.id, self.standoff_target(&guard))
        };

        let limits = MnvrLimits {
            vel_ms: self.params.vel_ms,
            acc_mss: self.params.acc_mss,
            init_vel_ms: 0.0,
            final_vel_ms: 0.0,
        };

        Some((id, self.planner.plan(&Pose::default(), &target, &limits)))
    }

    /// State to go to once a look has not produced anything to approach.
    fn next_search(&mut self) -> ApproachState {
        if self.search_count < self.params.max_search_iterations {
            ApproachState::WaitStill
        } else {
            self.finish(ApproachOutcome::NotFound)
        }
    }

    fn finish(&mut self, outcome: ApproachOutcome) -> ApproachState {
        info!("Marker approach finished: {:?}", outcome);
        self.outcome = Some(outcome);
        ApproachState::Done
    }
}

impl MissionHandler for MarkerApproach {
    fn name(&self) -> &str {
        "marker approach"
    }

    fn step(&mut self, state: &mut StateId, io: &mut MissionIo) -> Result<bool, MissionError> {
        let current = match ApproachState::from_id(*state) {
            Some(s) => s,
            None => {
                warn!("Marker approach has no state {}, ending it", *state);
                ApproachState::Done
            }
        };

        let next = match current {
            ApproachState::Announce => {
                self.search_count = 0;
                self.outcome = None;
                io.say("Looking for marker.");
                io.display(DISPLAY_ROW_DETAIL, "looking for marker");
                ApproachState::WaitStill
            }
            ApproachState::WaitStill => {
                let still = io.link().motion_status().is_still(
                    self.params.still_velocity_ms,
                    self.params.still_turn_rate_rads,
                );

                if still {
                    // Let a frame be taken while still
                    thread::sleep(Duration::from_secs_f64(self.params.frame_settle_s));
                    io.vision.clear_new_flags();
                    io.vision.request_analysis();
                    ApproachState::WaitAnalysis
                } else {
                    ApproachState::WaitStill
                }
            }
            ApproachState::WaitAnalysis => {
                if io.vision.is_analysis_in_progress() {
                    ApproachState::WaitAnalysis
                } else if let Some(obs) = io.vision.get_new_by_id(self.params.stop_marker_id) {
                    vision_link::lock(&obs).take_new();
                    io.display(DISPLAY_ROW_DETAIL, "stop marker found");
                    self.finish(ApproachOutcome::StopMarker)
                } else if io.vision.new_marker_count() > 0 {
                    io.say("Found ArUco marker.");
                    io.display(DISPLAY_ROW_DETAIL, "found marker");
                    ApproachState::Approach
                } else {
                    debug!("No marker seen (search {})", self.search_count);
                    ApproachState::SearchTurn
                }
            }
            ApproachState::SearchTurn => {
                self.search_count += 1;
                io.send_script(&self.search_script())?;
                ApproachState::SearchWait
            }
            ApproachState::SearchWait => {
                if io.is_event_set(self.params.completion_event) {
                    self.next_search()
                } else {
                    ApproachState::SearchWait
                }
            }
            ApproachState::Approach => match self.plan_approach(io) {
                Some((id, Ok(plan))) if self.planner.is_worth_executing(&plan) => {
                    info!(
                        "Approaching marker {} ({:.3} m manoeuvre)",
                        id,
                        plan.movement_distance()
                    );
                    io.display(DISPLAY_ROW_DETAIL, format!("approach marker {}", id));
                    io.send_script(&plan.to_script(self.params.completion_event))?;
                    ApproachState::ApproachWait
                }
                Some((id, Ok(_))) => {
                    info!("Already in front of marker {}", id);
                    self.finish(ApproachOutcome::Reached)
                }
                Some((id, Err(e))) => {
                    warn!("Cannot plan an approach to marker {}: {}", id, e);
                    self.search_count += 1;
                    self.next_search()
                }
                None => {
                    warn!("Marker observation vanished before the approach was planned");
                    self.search_count += 1;
                    self.next_search()
                }
            },
            ApproachState::ApproachWait => {
                if io.is_event_set(self.params.completion_event) {
                    self.finish(ApproachOutcome::Reached)
                } else {
                    ApproachState::ApproachWait
                }
            }
            ApproachState::Done => {
                *state = STATE_TERMINAL;
                return Ok(true);
            }
        };

        *state = next.id();

        Ok(next == ApproachState::Done)
    }
}
