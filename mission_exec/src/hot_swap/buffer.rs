//! # Script buffers and controller program slots

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::ctrl::{EventId, MotionLine, ThreadId};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An ordered list of motion lines making up one script, built before being sent to a slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptBuffer {
    lines: Vec<MotionLine>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One of the two program slots on the controller.
///
/// Each slot is a controller thread which is started by its own start event, and stopped by the
/// start event of the other slot, so raising a start event switches the running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotId {
    A,
    B,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SlotId {
    /// Both slots, in initialisation order.
    pub const ALL: [SlotId; 2] = [SlotId::A, SlotId::B];

    /// The opposite slot.
    pub fn other(self) -> Self {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    /// Controller thread holding this slot's program.
    pub fn thread_id(self) -> ThreadId {
        match self {
            SlotId::A => 100,
            SlotId::B => 101,
        }
    }

    /// Event which starts this slot (and stops the other one).
    pub fn start_event(self) -> EventId {
        match self {
            SlotId::A => 30,
            SlotId::B => 31,
        }
    }

    /// Event which stops this slot.
    pub fn stop_event(self) -> EventId {
        self.other().start_event()
    }

    /// Returns true if `event` is used by the slot switching mechanism.
    pub fn is_slot_event(event: EventId) -> bool {
        Self::ALL.iter().any(|s| s.start_event() == event)
    }
}

impl ScriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to the script.
    pub fn push<L: Into<MotionLine>>(&mut self, line: L) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    /// End the script with the standard terminator line, which holds the robot still and raises
    /// `event`.
    pub fn terminate_with_event(&mut self, event: EventId) -> &mut Self {
        self.push(MotionLine::terminator(event))
    }

    /// Event raised by the last line of the script, if any.
    ///
    /// A well formed script ends in a line that raises its completion event, this is what the
    /// mission waits for after activating the script.
    pub fn completion_event(&self) -> Option<EventId> {
        self.lines.last().and_then(|l| l.raised_event())
    }

    pub fn lines(&self) -> &[MotionLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<MotionLine>> for ScriptBuffer {
    fn from(lines: Vec<MotionLine>) -> Self {
        Self { lines }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_slot_mapping() {
        assert_eq!(SlotId::A.other(), SlotId::B);
        assert_eq!(SlotId::B.other(), SlotId::A);

        assert_eq!(SlotId::A.thread_id(), 100);
        assert_eq!(SlotId::B.thread_id(), 101);

        assert_eq!(SlotId::A.start_event(), 30);
        assert_eq!(SlotId::A.stop_event(), 31);
        assert_eq!(SlotId::B.start_event(), 31);
        assert_eq!(SlotId::B.stop_event(), 30);

        assert!(SlotId::is_slot_event(30));
        assert!(!SlotId::is_slot_event(1));
    }

    #[test]
    fn test_completion_event() {
        let mut script = ScriptBuffer::new();
        assert_eq!(script.completion_event(), None);

        script
            .push("vel=0.2,acc=3.0:dist=0.15")
            .push(MotionLine::new().vel(0.3).until_dist(0.5));
        assert_eq!(script.completion_event(), None);

        script.terminate_with_event(1);
        assert_eq!(script.completion_event(), Some(1));
        assert_eq!(script.len(), 3);
        assert_eq!(script.lines()[2].to_string(), "vel=0,event=1:dist=1");
    }
}
