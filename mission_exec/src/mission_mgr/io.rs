//! # Mission IO
//!
//! Everything a mission handler can act on: the controller (through the hot swap transport), the
//! controller's events, the vision system and the operator.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use comms_if::eqpt::ctrl::{CtrlCmd, EventId, MotionLine};
use log::{debug, warn};

use super::MissionError;
use crate::{
    announcer::Announcer,
    ctrl_link::CtrlLink,
    event_latch::EventLatch,
    hot_swap::{HotSwap, ScriptBuffer},
    vision_link::VisionLink,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Display row showing the sequencer mode.
pub const DISPLAY_ROW_MODE: u8 = 3;

/// Display row showing the current mission and state.
pub const DISPLAY_ROW_PHASE: u8 = 4;

/// Display row for messages from the running mission.
pub const DISPLAY_ROW_DETAIL: u8 = 5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MissionIo {
    pub hot_swap: HotSwap,
    pub events: Arc<dyn EventLatch>,
    pub vision: Arc<dyn VisionLink>,
    pub announcer: Box<dyn Announcer>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MissionIo {
    pub fn new(
        hot_swap: HotSwap,
        events: Arc<dyn EventLatch>,
        vision: Arc<dyn VisionLink>,
        announcer: Box<dyn Announcer>,
    ) -> Self {
        Self {
            hot_swap,
            events,
            vision,
            announcer,
        }
    }

    /// Load a script into the inactive slot and start it, returning the event the script raises
    /// when it completes.
    ///
    /// Any copy of the completion event still latched from an earlier script is consumed before
    /// the new script is started, so a set event always comes from this script.
    ///
    /// A script cut short by the slot has its last slot line replaced by the terminator, so the
    /// completion event is still raised.
    pub fn send_script(&mut self, script: &ScriptBuffer) -> Result<EventId, MissionError> {
        let event = script
            .completion_event()
            .ok_or(MissionError::NoCompletionEvent)?;

        let report = self.hot_swap.prepare(script.lines())?;
        if report.truncated {
            warn!(
                "Script truncated to {} lines, line {} of slot {:?} now raises event {}",
                report.lines_written, report.lines_written, report.slot, event
            );
            self.hot_swap.send(&CtrlCmd::ModifyLine {
                thread: report.slot.thread_id(),
                line: report.lines_written,
                content: MotionLine::terminator(event),
            })?;
        }
        self.hot_swap.settle();

        if self.events.is_set(event) {
            debug!("Consumed stale event {}", event);
        }

        self.hot_swap.activate()?;

        Ok(event)
    }

    /// Returns true if `event` has been raised since the last check.
    pub fn is_event_set(&self, event: EventId) -> bool {
        self.events.is_set(event)
    }

    /// Show a message on the robot's display. Failures are only logged.
    pub fn display<S: Into<String>>(&mut self, row: u8, text: S) {
        let cmd = CtrlCmd::Display {
            row,
            text: text.into(),
        };

        if let Err(e) = self.hot_swap.send(&cmd) {
            warn!("Could not update display: {}", e);
        }
    }

    /// Announce a message to the operator.
    pub fn say(&mut self, text: &str) {
        self.announcer.say(text);
    }

    pub fn link(&self) -> &dyn CtrlLink {
        self.hot_swap.link()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        announcer::RecordingAnnouncer,
        event_latch::SharedEventLatch,
        hot_swap::{HotSwapParams, SlotId},
        sim_ctrl::{SimCtrl, SimCtrlParams},
        vision_link::SharedVision,
    };

    fn mission_io(line_max: usize) -> (MissionIo, SimCtrl) {
        let events = Arc::new(SharedEventLatch::new());
        let sim = SimCtrl::new(
            &SimCtrlParams {
                complete_after_polls: Some(1),
                ..Default::default()
            },
            events.clone(),
        );

        let hot_swap = HotSwap::new(
            HotSwapParams {
                line_max,
                settle_delay_s: 0.0,
                ..Default::default()
            },
            Box::new(sim.clone()),
        )
        .unwrap();

        let io = MissionIo::new(
            hot_swap,
            events,
            Arc::new(SharedVision::new()),
            Box::new(RecordingAnnouncer::new()),
        );

        (io, sim)
    }

    #[test]
    fn test_truncated_script_still_completes() {
        let (mut io, sim) = mission_io(20);
        io.hot_swap.init_program().unwrap();

        let mut script = ScriptBuffer::new();
        for i in 0..24 {
            script.push(format!("vel=0.1:dist=0.{}", i + 1));
        }
        script.terminate_with_event(7);
        assert_eq!(script.len(), 25);

        assert_eq!(io.send_script(&script).unwrap(), 7);

        let program = sim.thread_program(SlotId::B.thread_id()).unwrap();
        assert_eq!(program.len(), 20);
        assert_eq!(program[18].to_string(), "vel=0.1:dist=0.19");
        assert_eq!(program[19], MotionLine::terminator(7));

        let mut completed = false;
        for _ in 0..5 {
            io.hot_swap.link_mut().service().unwrap();
            if io.is_event_set(7) {
                completed = true;
                break;
            }
        }
        assert!(completed);
    }

    #[test]
    fn test_script_which_fits_is_unchanged() {
        let (mut io, sim) = mission_io(20);
        io.hot_swap.init_program().unwrap();

        let mut script = ScriptBuffer::new();
        script.push("vel=0.2:dist=0.5").terminate_with_event(4);
        io.send_script(&script).unwrap();

        let program = sim.thread_program(SlotId::B.thread_id()).unwrap();
        assert_eq!(program[0].to_string(), "vel=0.2:dist=0.5");
        assert_eq!(program[1], MotionLine::terminator(4));
        assert_eq!(program[2], MotionLine::placeholder());
    }
}
