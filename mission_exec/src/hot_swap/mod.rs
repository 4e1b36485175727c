//! # HotSwap transport
//!
//! The controller holds two program slots, [`SlotId::A`] and [`SlotId::B`]. While one slot is
//! running the other one can be rewritten line by line, and is then switched in by raising its
//! start event. The controller starts the new slot from its first line and stops the old one in the
//! same step, so the robot keeps moving while the next script is loaded.
//!
//! The transport keeps track of which slot is active and guarantees that the active slot is never
//! written to.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod buffer;
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};

use comms_if::eqpt::ctrl::{CtrlCmd, MotionLine};
use log::{debug, trace, warn};
use serde::Serialize;

use crate::ctrl_link::{CtrlLink, CtrlLinkError};

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use buffer::{ScriptBuffer, SlotId};
pub use params::HotSwapParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Double buffered program transport to the controller.
pub struct HotSwap {
    params: HotSwapParams,

    link: Box<dyn CtrlLink>,

    /// Slot currently running on the controller.
    active: SlotId,

    /// Slot which has been written but not yet activated.
    prepared: Option<SlotId>,

    num_activations: u64,
}

/// Summary of a [`HotSwap::prepare`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrepareReport {
    /// Slot the lines were written to
    pub slot: SlotId,

    /// Number of lines written to the slot
    pub lines_written: usize,

    /// True if the script was longer than the slot and has been cut short
    pub truncated: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HotSwapError {
    #[error("The controller link failed: {0}")]
    LinkError(#[from] CtrlLinkError),

    #[error("A program slot must hold at least one line")]
    ZeroCapacity,

    #[error("Cannot activate slot {0:?}, nothing has been prepared in it")]
    NothingPrepared(SlotId),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HotSwap {
    /// Create a new transport over the given link.
    ///
    /// Slot A is considered active until the first activation, so the first script is written to
    /// slot B.
    pub fn new(params: HotSwapParams, link: Box<dyn CtrlLink>) -> Result<Self, HotSwapError> {
        if params.line_max == 0 {
            return Err(HotSwapError::ZeroCapacity);
        }

        Ok(Self {
            params,
            link,
            active: SlotId::A,
            prepared: None,
            num_activations: 0,
        })
    }

    /// Load the initial mission program onto the controller.
    ///
    /// Any previous program is stopped and cleared, then the idle thread and both slot threads
    /// are created. Each slot is filled with `line_max` placeholder lines so that later writes
    /// only ever modify existing lines.
    ///
    /// Events raised while the program is loaded are stale, the caller must clear them once this
    /// returns.
    pub fn init_program(&mut self) -> Result<(), HotSwapError> {
        debug!("Initialising controller program ({} lines per slot)", self.params.line_max);

        self.send(&CtrlCmd::RobotStop)?;
        self.send(&CtrlCmd::ClearProgram)?;

        // Idle thread
        self.send(&CtrlCmd::AddThread {
            thread: 1,
            start_event: None,
            stop_event: None,
        })?;
        for line in self.params.idle_lines.clone() {
            self.send(&CtrlCmd::AddLine(line))?;
        }

        for slot in SlotId::ALL.iter() {
            self.send(&CtrlCmd::AddThread {
                thread: slot.thread_id(),
                start_event: Some(slot.start_event()),
                stop_event: Some(slot.stop_event()),
            })?;

            for _ in 0..self.params.line_max {
                self.send(&CtrlCmd::AddLine(MotionLine::placeholder()))?;
            }
        }

        self.settle();

        self.active = SlotId::A;
        self.prepared = None;

        Ok(())
    }

    /// Write a script into the inactive slot without starting it.
    ///
    /// Lines are written from the first line of the slot until the end of `lines` or the first
    /// empty line. Scripts longer than the slot are truncated to the slot's capacity.
    pub fn prepare(&mut self, lines: &[MotionLine]) -> Result<PrepareReport, HotSwapError> {
        let slot = self.active.other();

        // An empty line ends the script
        let script_len = lines
            .iter()
            .position(|l| l.is_empty())
            .unwrap_or_else(|| lines.len());

        let truncated = script_len > self.params.line_max;
        if truncated {
            warn!(
                "Script of {} lines does not fit in slot {:?} ({} lines), it will be truncated",
                script_len, slot, self.params.line_max
            );
        }

        let num_lines = script_len.min(self.params.line_max);

        for (i, line) in lines[..num_lines].iter().enumerate() {
            self.send(&CtrlCmd::ModifyLine {
                thread: slot.thread_id(),
                line: i + 1,
                content: line.clone(),
            })?;
        }

        debug!("Prepared {} lines in slot {:?}", num_lines, slot);

        self.prepared = Some(slot);

        Ok(PrepareReport {
            slot,
            lines_written: num_lines,
            truncated,
        })
    }

    /// Wait for the controller to process the lines written by [`HotSwap::prepare`].
    pub fn settle(&self) {
        if self.params.settle_delay_s > 0.0 {
            thread::sleep(Duration::from_secs_f64(self.params.settle_delay_s));
        }
    }

    /// Start the prepared slot, which stops the currently active one.
    pub fn activate(&mut self) -> Result<SlotId, HotSwapError> {
        let slot = match self.prepared.take() {
            Some(s) => s,
            None => return Err(HotSwapError::NothingPrepared(self.active.other())),
        };

        self.send(&CtrlCmd::RaiseEvent(slot.start_event()))?;

        self.active = slot;
        self.num_activations += 1;

        debug!("Activated slot {:?} (activation {})", slot, self.num_activations);

        Ok(slot)
    }

    /// Prepare, settle and activate a script in one go.
    pub fn send_and_activate(&mut self, lines: &[MotionLine]) -> Result<PrepareReport, HotSwapError> {
        let report = self.prepare(lines)?;
        self.settle();
        self.activate()?;

        Ok(report)
    }

    /// Send a command which is not part of a slot program to the controller.
    pub fn send(&mut self, cmd: &CtrlCmd) -> Result<(), HotSwapError> {
        trace!("-> {}", cmd);
        Ok(self.link.send(cmd)?)
    }

    /// The slot currently running on the controller.
    pub fn active_slot(&self) -> SlotId {
        self.active
    }

    /// Number of activations since the transport was created.
    pub fn num_activations(&self) -> u64 {
        self.num_activations
    }

    pub fn params(&self) -> &HotSwapParams {
        &self.params
    }

    pub fn link(&self) -> &dyn CtrlLink {
        self.link.as_ref()
    }

    pub fn link_mut(&mut self) -> &mut dyn CtrlLink {
        self.link.as_mut()
    }
}
