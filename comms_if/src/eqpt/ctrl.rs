//! # Motion Controller Commands
//!
//! The real-time motion controller is driven by a line-oriented text protocol. Each command is a
//! single line, and mission programs are made of [`MotionLine`]s which pair a set of directives
//! (velocity, acceleration, turn radius, line following, ...) with a set of termination conditions
//! (distance, time, turned angle, sensor predicates).
//!
//! This module only renders the protocol, it does not try to understand the micro-language used
//! inside a [`MotionLine`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Identifier of a controller event flag.
pub type EventId = u8;

/// Identifier of a controller mission thread.
pub type ThreadId = u16;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of event flags supported by the controller.
pub const NUM_EVENTS: usize = 34;

/// Event raised by the controller when all motion must stop (also raised by the `stop` command).
pub const EVENT_ALL_STOP: EventId = 0;

/// Event raised by the controller once it has accepted the `start` command and is ready to run.
pub const EVENT_CTRL_READY: EventId = 33;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single line of a controller mission program.
///
/// A line is rendered as `<directives>:<conditions>`, for example `vel=0.3,tr=0.2:turn=80.0`. A
/// line with no directives and no conditions is empty, and marks the end of a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MotionLine {
    directives: Vec<String>,
    conditions: Vec<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command that can be sent to the motion controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CtrlCmd {
    /// Stop any mission program that is running on the controller.
    RobotStop,

    /// Remove every thread and line from the controller's mission program.
    ClearProgram,

    /// Add a new thread to the mission program. Lines added after this go into this thread.
    ///
    /// If events are given the thread is started by `start_event` and stopped by `stop_event`.
    AddThread {
        thread: ThreadId,
        start_event: Option<EventId>,
        stop_event: Option<EventId>,
    },

    /// Append a line to the last added thread.
    AddLine(MotionLine),

    /// Replace the line at the 1-based index `line` of `thread`.
    ModifyLine {
        thread: ThreadId,
        line: usize,
        content: MotionLine,
    },

    /// Raise an event on the controller.
    RaiseEvent(EventId),

    /// Ask the controller to start a controlled run (ready to execute mission threads).
    Start,

    /// Stop the controlled run, the controller raises [`EVENT_ALL_STOP`] in response.
    Stop,

    /// Show a short text on one row of the robot's display.
    Display { row: u8, text: String },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotionLine {
    /// Create a new empty line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a line from its textual form.
    ///
    /// Everything before the first `:` is a directive list, everything after it is a condition
    /// list. Both are comma separated and whitespace around items is removed.
    pub fn parse(text: &str) -> Self {
        let (directives, conditions) = match text.find(':') {
            Some(i) => (&text[..i], &text[i + 1..]),
            None => (text, ""),
        };

        Self {
            directives: split_items(directives),
            conditions: split_items(conditions),
        }
    }

    /// Line used to fill unused program space, holds the robot still for a short time.
    pub fn placeholder() -> Self {
        Self::new().vel(0.0).until_time(0.1)
    }

    /// Standard last line of a script: hold still and raise `event`.
    ///
    /// The distance condition can never be met at zero velocity, so the line (and therefore the
    /// script) never ends on its own.
    pub fn terminator(event: EventId) -> Self {
        Self::new().vel(0.0).event(event).until_dist(1.0)
    }

    /// Returns true if the line has no content, which marks the end of a script.
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.conditions.is_empty()
    }

    /// Returns the event raised by this line, if any.
    pub fn raised_event(&self) -> Option<EventId> {
        self.directives
            .iter()
            .filter_map(|d| d.strip_prefix("event="))
            .find_map(|v| v.trim().parse().ok())
    }

    /// Add a free-form directive.
    pub fn directive<S: Into<String>>(mut self, directive: S) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Add a free-form condition.
    pub fn until<S: Into<String>>(mut self, condition: S) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Set the velocity in m/s.
    pub fn vel(self, vel_ms: f64) -> Self {
        self.directive(format!("vel={}", fmt_num(vel_ms, 3)))
    }

    /// Set the acceleration limit in m/s^2.
    pub fn acc(self, acc_mss: f64) -> Self {
        self.directive(format!("acc={:.1}", acc_mss))
    }

    /// Set the turn radius in meters.
    pub fn turn_radius(self, radius_m: f64) -> Self {
        self.directive(format!("tr={:.3}", radius_m))
    }

    /// Raise `event` when this line is started.
    pub fn event(self, event: EventId) -> Self {
        self.directive(format!("event={}", event))
    }

    /// End the line after the given distance in meters.
    pub fn until_dist(self, dist_m: f64) -> Self {
        self.until(format!("dist={}", fmt_num(dist_m, 3)))
    }

    /// End the line after the given time in seconds.
    pub fn until_time(self, time_s: f64) -> Self {
        self.until(format!("time={}", fmt_num(time_s, 2)))
    }

    /// End the line after turning the given angle in degrees, positive is to the left.
    pub fn until_turn(self, angle_deg: f64) -> Self {
        self.until(format!("turn={:.1}", angle_deg))
    }
}

impl Display for MotionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.directives.join(","))?;

        if !self.conditions.is_empty() {
            write!(f, ":{}", self.conditions.join(","))?;
        }

        Ok(())
    }
}

impl From<&str> for MotionLine {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for MotionLine {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<MotionLine> for String {
    fn from(line: MotionLine) -> Self {
        line.to_string()
    }
}

impl Display for CtrlCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtrlCmd::RobotStop => write!(f, "robot stop"),
            CtrlCmd::ClearProgram => write!(f, "robot <clear"),
            CtrlCmd::AddThread {
                thread,
                start_event,
                stop_event,
            } => {
                write!(f, "robot <add thread={}", thread)?;
                if let Some(e) = start_event {
                    write!(f, ",event={}", e)?;
                }
                if let Some(e) = stop_event {
                    write!(f, " : event={}", e)?;
                }
                Ok(())
            }
            CtrlCmd::AddLine(line) => write!(f, "robot <add {}", line),
            CtrlCmd::ModifyLine {
                thread,
                line,
                content,
            } => write!(f, "<mod {} {} {}", thread, line, content),
            CtrlCmd::RaiseEvent(e) => write!(f, "<event={}", e),
            CtrlCmd::Start => write!(f, "start"),
            CtrlCmd::Stop => write!(f, "stop"),
            CtrlCmd::Display { row, text } => write!(f, "oled {} {}", row, text),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn split_items(s: &str) -> Vec<String> {
    s.split(',')
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

/// Format a number with at most `precision` decimals, dropping trailing zeros (`0.300` -> `0.3`).
fn fmt_num(value: f64, precision: usize) -> String {
    let s = format!("{:.*}", precision, value);

    if s.contains('.') {
        let s = s.trim_end_matches('0').trim_end_matches('.');
        if s == "-0" {
            "0".into()
        } else {
            s.into()
        }
    } else {
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let line = MotionLine::parse("vel=0.3, tr=0.1: turn=-60.0");
        assert_eq!(line.to_string(), "vel=0.3,tr=0.1:turn=-60.0");

        let line = MotionLine::parse(": dist=1");
        assert_eq!(line.to_string(), ":dist=1");

        let line = MotionLine::parse("servo=2, pservo=-850, vservo=200");
        assert_eq!(line.to_string(), "servo=2,pservo=-850,vservo=200");

        assert!(MotionLine::parse("").is_empty());
        assert!(MotionLine::parse("  :  ").is_empty());
    }

    #[test]
    fn test_builder() {
        let line = MotionLine::new().vel(0.25).turn_radius(0.15).until_turn(10.0).until_time(10.0);
        assert_eq!(line.to_string(), "vel=0.25,tr=0.150:turn=10.0,time=10");

        assert_eq!(MotionLine::placeholder().to_string(), "vel=0:time=0.1");
        assert_eq!(MotionLine::terminator(2).to_string(), "vel=0,event=2:dist=1");
    }

    #[test]
    fn test_raised_event() {
        assert_eq!(MotionLine::terminator(7).raised_event(), Some(7));
        assert_eq!(MotionLine::parse("event=1,vel=0.0").raised_event(), Some(1));
        assert_eq!(MotionLine::parse("vel=0.2:dist=1,event=3").raised_event(), None);
    }

    #[test]
    fn test_cmd_wire_format() {
        assert_eq!(
            CtrlCmd::AddThread {
                thread: 100,
                start_event: Some(30),
                stop_event: Some(31)
            }
            .to_string(),
            "robot <add thread=100,event=30 : event=31"
        );
        assert_eq!(
            CtrlCmd::AddThread {
                thread: 1,
                start_event: None,
                stop_event: None
            }
            .to_string(),
            "robot <add thread=1"
        );
        assert_eq!(
            CtrlCmd::ModifyLine {
                thread: 101,
                line: 3,
                content: MotionLine::parse(":dist=0.5")
            }
            .to_string(),
            "<mod 101 3 :dist=0.5"
        );
        assert_eq!(CtrlCmd::RaiseEvent(31).to_string(), "<event=31");
        assert_eq!(
            CtrlCmd::Display {
                row: 4,
                text: "mission 1 state 10".into()
            }
            .to_string(),
            "oled 4 mission 1 state 10"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let line: MotionLine = serde_json::from_str("\"vel=0.5,acc=3:dist=1.65,xl>1\"").unwrap();
        assert_eq!(line.to_string(), "vel=0.5,acc=3:dist=1.65,xl>1");
        assert_eq!(
            serde_json::to_string(&line).unwrap(),
            "\"vel=0.5,acc=3:dist=1.65,xl>1\""
        );
    }
}
