//! # Scripted missions
//!
//! Missions described in a parameter file rather than in code. A mission is an ordered list of
//! segments, each of which is either a controller script or a marker approach:
//!
//! ```toml
//! [[missions]]
//! number = 1
//! name = "follow line to the ramp"
//! wait_for_start_button = true
//! segments = [
//!     { lines = ["vel=0.3,acc=3,edger=0,white=1:dist=0.1", "vel=0.3:dist=1,xl>1"], event = 1 },
//!     { marker_approach = true },
//! ]
//! ```
//!
//! Each script segment is sent to the controller in one go and the mission then waits for the
//! segment's completion event, which is raised by a terminator line added to the script if it
//! does not already end with one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeSet;

use comms_if::eqpt::ctrl::{EventId, MotionLine, EVENT_ALL_STOP, EVENT_CTRL_READY, NUM_EVENTS};
use log::{info, warn};
use serde::Deserialize;

use super::{
    io::{MissionIo, DISPLAY_ROW_DETAIL},
    marker_approach::{MarkerApproach, MarkerApproachParams},
    MissionError, MissionHandler, StateId, STATE_ENTRY, STATE_TERMINAL,
};
use crate::{
    ctrl_link::Button,
    hot_swap::{ScriptBuffer, SlotId},
    mnvr_planner::MnvrPlanner,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// State id of the first segment's send state.
const FIRST_SEGMENT_STATE: StateId = 10;

/// Largest number of segments in a mission, so that segment states stay below the terminal state.
pub const MAX_SEGMENTS: usize = 400;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Contents of a mission file.
#[derive(Debug, Clone, Deserialize)]
pub struct MissionPlan {
    pub missions: Vec<MissionDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionDef {
    /// Number of the mission, missions are run in increasing order
    pub number: u32,

    pub name: String,

    /// Wait for the operator to press the start (green) button before the first segment
    #[serde(default)]
    pub wait_for_start_button: bool,

    pub segments: Vec<SegmentDef>,
}

/// A mission made of scripts and marker approaches.
pub struct ScriptedMission {
    name: String,
    wait_for_start_button: bool,
    segments: Vec<Segment>,

    /// Running marker approach and its state
    approach: Option<(MarkerApproach, StateId)>,
    approach_template: MarkerApproach,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SegmentDef {
    /// Script which raises `event` when complete
    Script { lines: Vec<MotionLine>, event: EventId },

    /// Find a marker and drive up to it, the segment is skipped if `false`
    MarkerApproach { marker_approach: bool },
}

#[derive(Debug, Clone)]
enum Segment {
    Script { script: ScriptBuffer, event: EventId },
    MarkerApproach,
}

/// States of a scripted mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedState {
    Entry,
    WaitStartButton,

    /// Start the segment with the given index
    Send(usize),

    /// Wait for the segment with the given index to complete
    Wait(usize),

    Terminal,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScriptedState {
    pub fn id(self) -> StateId {
        match self {
            ScriptedState::Entry => STATE_ENTRY,
            ScriptedState::WaitStartButton => 1,
            ScriptedState::Send(k) => FIRST_SEGMENT_STATE + 2 * k as StateId,
            ScriptedState::Wait(k) => FIRST_SEGMENT_STATE + 2 * k as StateId + 1,
            ScriptedState::Terminal => STATE_TERMINAL,
        }
    }

    pub fn from_id(id: StateId) -> Option<Self> {
        match id {
            STATE_ENTRY => Some(ScriptedState::Entry),
            1 => Some(ScriptedState::WaitStartButton),
            STATE_TERMINAL => Some(ScriptedState::Terminal),
            i if i >= FIRST_SEGMENT_STATE && i < STATE_TERMINAL => {
                let k = ((i - FIRST_SEGMENT_STATE) / 2) as usize;
                if (i - FIRST_SEGMENT_STATE) % 2 == 0 {
                    Some(ScriptedState::Send(k))
                } else {
                    Some(ScriptedState::Wait(k))
                }
            }
            _ => None,
        }
    }
}

impl ScriptedMission {
    /// Build a mission from its description.
    pub fn from_def(
        def: &MissionDef,
        approach_params: &MarkerApproachParams,
        planner: &MnvrPlanner,
        line_max: usize,
    ) -> Result<Self, MissionError> {
        let mut segments = Vec::new();

        for seg in def.segments.iter() {
            match seg {
                SegmentDef::Script { lines, event } => {
                    check_completion_event(*event)?;

                    let mut script = ScriptBuffer::from(lines.clone());
                    if script.completion_event() != Some(*event) {
                        script.terminate_with_event(*event);
                    }

                    if script.len() > line_max {
                        return Err(MissionError::ScriptTooLong(
                            def.number,
                            script.len(),
                            line_max,
                        ));
                    }

                    segments.push(Segment::Script {
                        script,
                        event: *event,
                    });
                }
                SegmentDef::MarkerApproach { marker_approach } => {
                    if *marker_approach {
                        segments.push(Segment::MarkerApproach);
                    }
                }
            }
        }

        if segments.len() > MAX_SEGMENTS {
            return Err(MissionError::TooManySegments(def.number, segments.len()));
        }

        if segments.iter().any(|s| matches!(s, Segment::MarkerApproach)) {
            check_completion_event(approach_params.completion_event)?;
        }

        Ok(Self {
            name: def.name.clone(),
            wait_for_start_button: def.wait_for_start_button,
            segments,
            approach: None,
            approach_template: MarkerApproach::new(approach_params.clone(), planner.clone()),
        })
    }

    /// State which starts the segment at `index`, or ends the mission if there are no more.
    fn segment_state(&self, index: usize) -> ScriptedState {
        if index < self.segments.len() {
            ScriptedState::Send(index)
        } else {
            ScriptedState::Terminal
        }
    }
}

impl MissionHandler for ScriptedMission {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, state: &mut StateId, io: &mut MissionIo) -> Result<bool, MissionError> {
        let current = match ScriptedState::from_id(*state) {
            Some(s) => s,
            None => {
                warn!("Mission \"{}\" has no state {}, ending it", self.name, *state);
                ScriptedState::Terminal
            }
        };

        let next = match current {
            ScriptedState::Entry => {
                info!("Starting mission \"{}\"", self.name);
                if self.wait_for_start_button {
                    io.say("Press green to start");
                    io.display(DISPLAY_ROW_DETAIL, "press green to start");
                    ScriptedState::WaitStartButton
                } else {
                    io.display(DISPLAY_ROW_DETAIL, self.name.clone());
                    self.segment_state(0)
                }
            }
            ScriptedState::WaitStartButton => {
                if io.link().is_button_pressed(Button::Green) {
                    io.display(DISPLAY_ROW_DETAIL, self.name.clone());
                    self.segment_state(0)
                } else {
                    ScriptedState::WaitStartButton
                }
            }
            ScriptedState::Send(k) => match self.segments.get(k) {
                Some(Segment::Script { script, .. }) => {
                    io.send_script(script)?;
                    ScriptedState::Wait(k)
                }
                Some(Segment::MarkerApproach) => {
                    self.approach = Some((self.approach_template.clone(), STATE_ENTRY));
                    ScriptedState::Wait(k)
                }
                None => ScriptedState::Terminal,
            },
            ScriptedState::Wait(k) => match self.segments.get(k) {
                Some(Segment::Script { event, .. }) => {
                    if io.is_event_set(*event) {
                        self.segment_state(k + 1)
                    } else {
                        ScriptedState::Wait(k)
                    }
                }
                Some(Segment::MarkerApproach) => match self.approach.as_mut() {
                    Some((approach, approach_state)) => {
                        if approach.step(approach_state, io)? {
                            info!(
                                "Mission \"{}\" marker approach ended: {:?}",
                                self.name,
                                approach.outcome()
                            );
                            self.approach = None;
                            self.segment_state(k + 1)
                        } else {
                            ScriptedState::Wait(k)
                        }
                    }
                    // Approach state lost, start it again
                    None => ScriptedState::Send(k),
                },
                None => ScriptedState::Terminal,
            },
            ScriptedState::Terminal => {
                *state = STATE_TERMINAL;
                return Ok(true);
            }
        };

        *state = next.id();

        Ok(false)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the handlers for every mission in `plan`.
pub fn build_missions(
    plan: &MissionPlan,
    approach_params: &MarkerApproachParams,
    planner: &MnvrPlanner,
    line_max: usize,
) -> Result<Vec<(u32, Box<dyn MissionHandler>)>, MissionError> {
    let mut numbers = BTreeSet::new();
    let mut missions: Vec<(u32, Box<dyn MissionHandler>)> = Vec::new();

    for def in plan.missions.iter() {
        if !numbers.insert(def.number) {
            return Err(MissionError::DuplicateMission(def.number));
        }

        missions.push((
            def.number,
            Box::new(ScriptedMission::from_def(
                def,
                approach_params,
                planner,
                line_max,
            )?),
        ));
    }

    Ok(missions)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Completion events must be in range and not used by the controller itself.
fn check_completion_event(event: EventId) -> Result<(), MissionError> {
    if event as usize >= NUM_EVENTS {
        return Err(MissionError::EventOutOfRange(event));
    }

    if event == EVENT_ALL_STOP || event == EVENT_CTRL_READY || SlotId::is_slot_event(event) {
        return Err(MissionError::ReservedEvent(event));
    }

    Ok(())
}
