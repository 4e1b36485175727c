//! # Mission Manager
//!
//! This module implements the [`MissionSequencer`], which runs a series of numbered missions one
//! after the other. Each mission is a [`MissionHandler`], a state machine stepped once per cycle
//! which drives the robot by sending scripts to the controller and waiting for the events those
//! scripts raise.
//!
//! The sequencer itself is in one of three modes:
//!
//! - Waiting for the controller to report it is ready after the `start` command.
//! - Manual - the operator has taken control with the gamepad, missions are paused.
//! - Auto - the current mission is stepped.
//!
//! In every mode the all-stop event ends the run, as does finishing the last mission.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod io;
pub mod marker_approach;
mod params;
pub mod scripted;
pub mod tm;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use comms_if::eqpt::ctrl::{CtrlCmd, EventId, EVENT_ALL_STOP, EVENT_CTRL_READY};
use log::{debug, error, info, warn};

use crate::{ctrl_link::Button, hot_swap::HotSwapError, mission_log::MissionLog};

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use io::MissionIo;
pub use params::SequencerParams;
pub use tm::SequencerTm;

use io::{DISPLAY_ROW_MODE, DISPLAY_ROW_PHASE};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Identifier of a state within a mission.
pub type StateId = u32;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// State every mission starts in.
pub const STATE_ENTRY: StateId = 0;

/// State of a mission which has completed.
pub const STATE_TERMINAL: StateId = 999;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A mission run by the [`MissionSequencer`].
pub trait MissionHandler: Send {
    /// Name of the mission, used in log messages.
    fn name(&self) -> &str;

    /// Perform one step of the mission from `state`, updating `state` to the next state.
    ///
    /// Returns `true` once the mission has finished.
    fn step(&mut self, state: &mut StateId, io: &mut MissionIo) -> Result<bool, MissionError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sequencer state which persists between cycles.
#[derive(Debug, Clone)]
pub struct SequencerContext {
    /// Number of the mission being run
    pub mission: u32,

    /// State within the current mission
    pub state: StateId,

    /// Mission at the last phase report
    pub mission_old: u32,

    /// State at the last phase report
    pub state_old: StateId,

    /// True while the operator has manual control
    pub in_manual: bool,

    /// True once the controller has reported it is ready
    pub ctrl_started: bool,

    finished: bool,
}

/// Runs missions in order.
pub struct MissionSequencer {
    params: SequencerParams,
    ctx: SequencerContext,
    missions: BTreeMap<u32, Box<dyn MissionHandler>>,
    io: MissionIo,
    log: Option<MissionLog>,
    stop: Arc<AtomicBool>,
    analysis_button_held: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by missions.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("Could not send to the controller: {0}")]
    HotSwapError(#[from] HotSwapError),

    #[error("The script does not raise a completion event")]
    NoCompletionEvent,

    #[error("Event {0} is reserved by the controller and cannot be used as a completion event")]
    ReservedEvent(EventId),

    #[error("Event {0} is not a valid event")]
    EventOutOfRange(EventId),

    #[error("Mission {0} is defined more than once")]
    DuplicateMission(u32),

    #[error("Mission {0} has {1} segments, which is more than supported")]
    TooManySegments(u32, usize),

    #[error("Mission {0} has a {1} line script, only {2} lines fit in a slot")]
    ScriptTooLong(u32, usize, usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("The cycle period must be positive, found {0} s")]
    InvalidCyclePeriod(f64),

    #[error("Could not initialise the controller program: {0}")]
    InitError(HotSwapError),

    #[error("Could not start the controller: {0}")]
    StartError(HotSwapError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SequencerContext {
    pub fn new(from_mission: u32) -> Self {
        Self {
            mission: from_mission,
            state: STATE_ENTRY,
            mission_old: from_mission,
            state_old: STATE_ENTRY,
            in_manual: false,
            ctrl_started: false,
            finished: false,
        }
    }

    /// Mark the run as finished. This cannot be undone.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl MissionSequencer {
    pub fn new(params: SequencerParams, io: MissionIo) -> Result<Self, SequencerError> {
        if !(params.cycle_period_s > 0.0) {
            return Err(SequencerError::InvalidCyclePeriod(params.cycle_period_s));
        }

        Ok(Self {
            ctx: SequencerContext::new(params.from_mission),
            params,
            missions: BTreeMap::new(),
            io,
            log: None,
            stop: Arc::new(AtomicBool::new(false)),
            analysis_button_held: false,
        })
    }

    /// Register the handler of mission `number`, replacing any previous one.
    pub fn register(&mut self, number: u32, handler: Box<dyn MissionHandler>) {
        if let Some(old) = self.missions.insert(number, handler) {
            warn!("Mission {} (\"{}\") has been replaced", number, old.name());
        }
    }

    /// Record phase changes into `log`.
    pub fn set_mission_log(&mut self, log: MissionLog) {
        self.log = Some(log);
    }

    /// Flag which stops [`MissionSequencer::run`] when set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Load the mission program onto the controller and start it.
    ///
    /// Once started the controller heartbeat is checked. Losing it is reported but only prevents
    /// missions from running if `abort_on_heartbeat_loss` is set.
    pub fn init(&mut self) -> Result<(), SequencerError> {
        self.io
            .hot_swap
            .init_program()
            .map_err(SequencerError::InitError)?;

        // Anything raised so far belongs to the previous program
        self.io.events.clear_all();

        self.io
            .hot_swap
            .send(&CtrlCmd::Start)
            .map_err(SequencerError::StartError)?;
        self.io.display(DISPLAY_ROW_MODE, "waiting for robot");

        for _ in 0..self.params.heartbeat_retries {
            if self.io.link().is_heartbeat_ok() {
                break;
            }
            thread::sleep(Duration::from_secs_f64(self.params.heartbeat_retry_wait_s));
        }

        if !self.io.link().is_heartbeat_ok() {
            error!("No heartbeat from the controller, the link or the controller is stuck");
            self.io.say("Oops, no usable connection with robot.");
            self.io.display(DISPLAY_ROW_MODE, "Oops: Lost robot!");

            if self.params.abort_on_heartbeat_loss {
                self.ctx.finish();
            }
        }

        info!(
            "Sequencer initialised, running missions {} to {}",
            self.params.from_mission, self.params.to_mission
        );

        Ok(())
    }

    /// Perform one sequencer cycle.
    pub fn step(&mut self) {
        if let Err(e) = self.io.hot_swap.link_mut().service() {
            warn!("Controller link error: {}", e);
        }

        if self.io.link().is_manual() {
            if !self.ctx.in_manual {
                info!("Manual control, missions paused");
                self.io.say("Paused.");
                self.io.display(DISPLAY_ROW_MODE, "GAMEPAD control");
            }
            self.ctx.in_manual = true;
        } else if !self.ctx.ctrl_started {
            if self.io.is_event_set(EVENT_CTRL_READY) {
                info!("Controller ready");
                self.ctx.ctrl_started = true;
                self.io.display(DISPLAY_ROW_MODE, "running AUTO");
            }
        } else {
            if self.ctx.in_manual {
                self.ctx.in_manual = false;
                info!("Manual control ended, missions resuming");
                self.io.say("Mission resuming");
                self.io.display(DISPLAY_ROW_MODE, "running AUTO");
            }

            self.dispatch();
            self.report_phase();
        }

        self.check_analysis_button();

        // Global exits
        if self.io.is_event_set(EVENT_ALL_STOP) {
            info!("All-stop event received");
            self.ctx.finish();
        } else if self.ctx.mission > self.params.to_mission {
            info!("Last mission ({}) complete", self.params.to_mission);
            if let Err(e) = self.io.hot_swap.send(&CtrlCmd::Stop) {
                warn!("Could not stop the controller: {}", e);
            }
            self.ctx.finish();
        }
    }

    /// Run cycles until the missions are finished or the stop flag is set, then stop the robot.
    pub fn run(&mut self) {
        let cycle_period = Duration::from_secs_f64(self.params.cycle_period_s);

        while !self.ctx.is_finished() && !self.stop.load(Ordering::Relaxed) {
            let cycle_start_instant = Instant::now();

            self.step();

            let cycle_dur = Instant::now() - cycle_start_instant;

            match cycle_period.checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                ),
            }
        }

        self.shutdown();
    }

    /// Stop the robot and tell the operator.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.io.hot_swap.send(&CtrlCmd::Stop) {
            warn!("Could not stop the controller: {}", e);
        }

        let name = self.io.link().robot_name();
        self.io.say(&format!("Robot {} finished.", name));
        self.io.display(DISPLAY_ROW_MODE, "finished");
    }

    /// Summary of the sequencer state.
    pub fn status(&self) -> SequencerTm {
        SequencerTm {
            mission: self.ctx.mission,
            state: self.ctx.state,
            finished: self.ctx.is_finished(),
            in_manual: self.ctx.in_manual,
            ctrl_started: self.ctx.ctrl_started,
            active_slot: self.io.hot_swap.active_slot(),
            num_activations: self.io.hot_swap.num_activations(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ctx.is_finished()
    }

    pub fn context(&self) -> &SequencerContext {
        &self.ctx
    }

    pub fn io(&self) -> &MissionIo {
        &self.io
    }

    /// Step the current mission, moving on to the next one when it finishes.
    fn dispatch(&mut self) {
        let mission = self.ctx.mission;

        let handler = match self.missions.get_mut(&mission) {
            Some(h) => h,
            None => {
                info!("No mission {}, all missions complete", mission);
                self.ctx.finish();
                return;
            }
        };

        let ended = match handler.step(&mut self.ctx.state, &mut self.io) {
            Ok(ended) => ended,
            Err(e) => {
                error!("Mission {} (\"{}\") failed: {}", mission, handler.name(), e);
                true
            }
        };

        if ended {
            info!("Mission {} (\"{}\") ended", mission, handler.name());
            self.ctx.mission += 1;
            self.ctx.state = STATE_ENTRY;
        }
    }

    /// Display and log a change of mission or state.
    fn report_phase(&mut self) {
        let ctx = &self.ctx;
        if ctx.mission == ctx.mission_old && ctx.state == ctx.state_old {
            return;
        }

        debug!(
            "Mission {} state {} -> mission {} state {}",
            ctx.mission_old, ctx.state_old, ctx.mission, ctx.state
        );

        let (mission, state, mission_old, state_old) =
            (ctx.mission, ctx.state, ctx.mission_old, ctx.state_old);

        self.io.display(
            DISPLAY_ROW_PHASE,
            format!("mission {} state {}", mission, state),
        );

        if let Some(log) = self.log.as_mut() {
            let now = Utc::now();
            let res = log
                .record(now, mission_old, state_old)
                .and_then(|_| log.record(now, mission, state));
            if let Err(e) = res {
                warn!("Could not write the mission log: {}", e);
            }
        }

        self.ctx.mission_old = mission;
        self.ctx.state_old = state;
    }

    /// The yellow button asks for a marker analysis.
    fn check_analysis_button(&mut self) {
        let held = self.io.link().is_button_pressed(Button::Yellow);

        if held && !self.analysis_button_held && !self.io.vision.is_analysis_in_progress() {
            info!("Marker analysis requested by the operator");
            self.io.vision.request_analysis();
        }

        self.analysis_button_held = held;
    }
}
