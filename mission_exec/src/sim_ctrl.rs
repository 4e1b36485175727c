//! # Simulated Controller
//!
//! A stand-in for the real-time motion controller, used by the executable when no hardware link is
//! available and by the tests. It keeps a copy of the mission program it has been sent, follows
//! the slot switching events, and reports a script as complete (by raising the events in its
//! lines) a configurable number of polls after the script's slot has been started.
//!
//! A simulated vision thread can also be started, which answers every analysis request with a
//! fixed set of markers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use comms_if::eqpt::{
    ctrl::{CtrlCmd, EventId, MotionLine, ThreadId, EVENT_ALL_STOP, EVENT_CTRL_READY},
    vision::{MarkerId, MarkerObservation},
};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    ctrl_link::{Button, CtrlLink, CtrlLinkError, MotionStatus},
    event_latch::EventLatch,
    vision_link::{SharedVision, VisionLink},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time taken by the simulated vision system to analyse a frame.
const SIM_ANALYSIS_TIME_S: f64 = 0.05;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SimCtrlParams {
    /// Name reported by the simulated robot
    pub robot_name: String,

    /// Number of polls after a slot is started before its script completes. `None` means scripts
    /// never complete on their own.
    pub complete_after_polls: Option<u32>,

    /// Hold the start (green) button down from the start
    #[serde(default)]
    pub press_start_button: bool,

    /// Markers seen by the simulated vision system
    #[serde(default)]
    pub markers: Vec<SimMarker>,
}

/// A marker seen by the simulated vision system, in the robot body frame.
#[derive(Debug, Clone, Deserialize)]
pub struct SimMarker {
    pub id: MarkerId,
    pub position_m_rb: [f64; 2],
    pub angle_rad: f64,
}

/// Handle to a simulated controller.
///
/// Clones share the same controller, so a test can keep a handle while the sequencer owns
/// another.
#[derive(Clone)]
pub struct SimCtrl {
    state: Arc<Mutex<SimCtrlState>>,
    events: Arc<dyn EventLatch>,
}

struct SimCtrlState {
    connected: bool,
    heartbeat_ok: bool,
    manual: bool,
    buttons: HashSet<Button>,
    motion: MotionStatus,
    robot_name: String,

    /// `start` received, readiness not reported yet
    ready_pending: bool,

    threads: BTreeMap<ThreadId, SimThread>,
    last_added: Option<ThreadId>,

    /// Slot thread currently running
    running: Option<ThreadId>,
    complete_after_polls: Option<u32>,
    polls_remaining: Option<u32>,

    sent: Vec<CtrlCmd>,
}

#[derive(Debug, Clone)]
struct SimThread {
    start_event: Option<EventId>,
    lines: Vec<MotionLine>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimCtrlParams {
    fn default() -> Self {
        Self {
            robot_name: String::from("sim"),
            complete_after_polls: Some(2),
            press_start_button: false,
            markers: Vec::new(),
        }
    }
}

impl SimCtrl {
    /// Create a new simulated controller which raises its events into `events`.
    pub fn new(params: &SimCtrlParams, events: Arc<dyn EventLatch>) -> Self {
        let mut buttons = HashSet::new();
        if params.press_start_button {
            buttons.insert(Button::Green);
        }

        Self {
            state: Arc::new(Mutex::new(SimCtrlState {
                connected: true,
                heartbeat_ok: true,
                manual: false,
                buttons,
                motion: MotionStatus::default(),
                robot_name: params.robot_name.clone(),
                ready_pending: false,
                threads: BTreeMap::new(),
                last_added: None,
                running: None,
                complete_after_polls: params.complete_after_polls,
                polls_remaining: None,
                sent: Vec::new(),
            })),
            events,
        }
    }

    /// Every command sent to the controller, oldest first.
    pub fn sent(&self) -> Vec<CtrlCmd> {
        self.state().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    /// The program of the given thread.
    pub fn thread_program(&self, thread: ThreadId) -> Option<Vec<MotionLine>> {
        self.state().threads.get(&thread).map(|t| t.lines.clone())
    }

    /// The slot thread currently running, if any.
    pub fn running_thread(&self) -> Option<ThreadId> {
        self.state().running
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    pub fn set_heartbeat(&self, ok: bool) {
        self.state().heartbeat_ok = ok;
    }

    pub fn set_manual(&self, manual: bool) {
        self.state().manual = manual;
    }

    pub fn set_button(&self, button: Button, pressed: bool) {
        let mut state = self.state();
        if pressed {
            state.buttons.insert(button);
        } else {
            state.buttons.remove(&button);
        }
    }

    pub fn set_motion_status(&self, status: MotionStatus) {
        self.state().motion = status;
    }

    /// Change the number of polls before a started script completes.
    pub fn set_complete_after_polls(&self, polls: Option<u32>) {
        self.state().complete_after_polls = polls;
    }

    fn state(&self) -> MutexGuard<'_, SimCtrlState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

impl SimCtrlState {
    fn raise(&mut self, events: &dyn EventLatch, event: EventId) {
        events.raise(event);

        // Start the thread triggered by this event, which stops the one it replaces
        let started = self
            .threads
            .iter()
            .find(|(_, t)| t.start_event == Some(event))
            .map(|(id, _)| *id);

        if let Some(id) = started {
            self.running = Some(id);
            self.polls_remaining = self.complete_after_polls;
        }
    }

    /// Raise the events of the running script, up to and including the first line which raises
    /// an event.
    fn complete_running(&mut self, events: &dyn EventLatch) {
        let lines = match self.running.and_then(|id| self.threads.get(&id)) {
            Some(t) => t.lines.clone(),
            None => return,
        };

        for line in lines.iter() {
            if let Some(e) = line.raised_event() {
                debug!("Sim script raised event {}", e);
                self.raise(events, e);
                break;
            }
        }

        self.polls_remaining = None;
    }
}

impl CtrlLink for SimCtrl {
    fn send(&mut self, cmd: &CtrlCmd) -> Result<(), CtrlLinkError> {
        let events = self.events.clone();
        let mut state = self.state();

        if !state.connected {
            return Err(CtrlLinkError::NotConnected);
        }

        state.sent.push(cmd.clone());

        match cmd {
            CtrlCmd::RobotStop => {
                state.running = None;
                state.polls_remaining = None;
            }
            CtrlCmd::ClearProgram => {
                state.threads.clear();
                state.last_added = None;
                state.running = None;
                state.polls_remaining = None;
            }
            CtrlCmd::AddThread {
                thread,
                start_event,
                ..
            } => {
                state.threads.insert(
                    *thread,
                    SimThread {
                        start_event: *start_event,
                        lines: Vec::new(),
                    },
                );
                state.last_added = Some(*thread);
            }
            CtrlCmd::AddLine(line) => {
                let target = match state.last_added {
                    Some(t) => state.threads.get_mut(&t),
                    None => None,
                };
                match target {
                    Some(t) => t.lines.push(line.clone()),
                    None => warn!("Sim controller has no thread to add \"{}\" to", line),
                }
            }
            CtrlCmd::ModifyLine {
                thread,
                line,
                content,
            } => match state.threads.get_mut(thread) {
                Some(t) if *line >= 1 && *line <= t.lines.len() => {
                    t.lines[*line - 1] = content.clone();
                }
                _ => warn!("Sim controller has no line {} in thread {}", line, thread),
            },
            CtrlCmd::RaiseEvent(e) => state.raise(events.as_ref(), *e),
            CtrlCmd::Start => state.ready_pending = true,
            CtrlCmd::Stop => {
                state.ready_pending = false;
                state.running = None;
                state.polls_remaining = None;
                events.raise(EVENT_ALL_STOP);
            }
            CtrlCmd::Display { row, text } => debug!("Sim display {}: {}", row, text),
        }

        Ok(())
    }

    fn service(&mut self) -> Result<(), CtrlLinkError> {
        let events = self.events.clone();
        let mut state = self.state();

        if state.ready_pending {
            state.ready_pending = false;
            events.raise(EVENT_CTRL_READY);
        }

        let polls_remaining = state.polls_remaining;
        match polls_remaining {
            Some(0) => state.complete_running(events.as_ref()),
            Some(n) => state.polls_remaining = Some(n - 1),
            None => (),
        }

        Ok(())
    }

    fn is_heartbeat_ok(&self) -> bool {
        let state = self.state();
        state.connected && state.heartbeat_ok
    }

    fn is_manual(&self) -> bool {
        self.state().manual
    }

    fn is_button_pressed(&self, button: Button) -> bool {
        self.state().buttons.contains(&button)
    }

    fn motion_status(&self) -> MotionStatus {
        self.state().motion
    }

    fn robot_name(&self) -> String {
        self.state().robot_name.clone()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Start a simulated vision system, which publishes `markers` in response to every analysis
/// request until `run` is cleared.
pub fn spawn_sim_vision(
    vision: Arc<SharedVision>,
    markers: Vec<SimMarker>,
    run: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut frame_number = 0u64;

        info!("Simulated vision started with {} markers", markers.len());

        while run.load(Ordering::Relaxed) {
            if vision.is_analysis_in_progress() {
                thread::sleep(Duration::from_secs_f64(SIM_ANALYSIS_TIME_S));
                frame_number += 1;

                for m in markers.iter() {
                    vision.publish(MarkerObservation::new(
                        m.id,
                        frame_number,
                        m.position_m_rb,
                        m.angle_rad,
                    ));
                }

                vision.finish_analysis();
            }

            thread::sleep(Duration::from_millis(5));
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_latch::SharedEventLatch;

    fn sim(polls: Option<u32>) -> (SimCtrl, Arc<SharedEventLatch>) {
        let events = Arc::new(SharedEventLatch::new());
        let params = SimCtrlParams {
            complete_after_polls: polls,
            ..Default::default()
        };

        (SimCtrl::new(&params, events.clone()), events)
    }

    fn load_slot(sim: &mut SimCtrl, thread: ThreadId, start: EventId, lines: &[&str]) {
        sim.send(&CtrlCmd::AddThread {
            thread,
            start_event: Some(start),
            stop_event: None,
        })
        .unwrap();
        for l in lines {
            sim.send(&CtrlCmd::AddLine(MotionLine::parse(l))).unwrap();
        }
    }

    #[test]
    fn test_start_raises_ready() {
        let (mut sim, events) = sim(None);

        sim.send(&CtrlCmd::Start).unwrap();
        assert!(!events.is_set(EVENT_CTRL_READY));

        sim.service().unwrap();
        assert!(events.is_set(EVENT_CTRL_READY));
    }

    #[test]
    fn test_script_completion() {
        let (mut sim, events) = sim(Some(1));

        load_slot(&mut sim, 100, 30, &[
            "vel=0.2:dist=0.5",
            "vel=0,event=1:dist=1",
            "vel=0,event=5:dist=1",
        ]);

        sim.send(&CtrlCmd::RaiseEvent(30)).unwrap();
        assert!(events.is_set(30));
        assert_eq!(sim.running_thread(), Some(100));

        sim.service().unwrap();
        assert!(!events.is_set(1));

        sim.service().unwrap();
        assert!(events.is_set(1));

        // The script never gets past its terminator
        sim.service().unwrap();
        assert!(!events.is_set(5));
    }

    #[test]
    fn test_modify_line_range() {
        let (mut sim, _) = sim(None);

        load_slot(&mut sim, 101, 31, &["vel=0:time=0.1", "vel=0:time=0.1"]);

        sim.send(&CtrlCmd::ModifyLine {
            thread: 101,
            line: 2,
            content: MotionLine::parse("vel=0.3:dist=1"),
        })
        .unwrap();
        sim.send(&CtrlCmd::ModifyLine {
            thread: 101,
            line: 3,
            content: MotionLine::parse("vel=0.3:dist=2"),
        })
        .unwrap();

        let program = sim.thread_program(101).unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[1].to_string(), "vel=0.3:dist=1");
    }

    #[test]
    fn test_stop_raises_all_stop() {
        let (mut sim, events) = sim(None);

        sim.send(&CtrlCmd::Stop).unwrap();
        assert!(events.is_set(EVENT_ALL_STOP));
    }

    #[test]
    fn test_disconnected() {
        let (mut sim, _) = sim(None);
        sim.set_connected(false);

        assert!(matches!(sim.send(&CtrlCmd::Start), Err(CtrlLinkError::NotConnected)));
        assert!(!sim.is_heartbeat_ok());
        assert!(sim.sent().is_empty());
    }

    #[test]
    fn test_sim_vision() {
        let vision = Arc::new(SharedVision::new());
        let run = Arc::new(AtomicBool::new(true));

        let jh = spawn_sim_vision(
            vision.clone(),
            vec![SimMarker {
                id: 6,
                position_m_rb: [0.5, 0.0],
                angle_rad: 0.0,
            }],
            run.clone(),
        );

        vision.request_analysis();
        for _ in 0..200 {
            if !vision.is_analysis_in_progress() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        run.store(false, Ordering::Relaxed);
        jh.join().unwrap();

        assert!(!vision.is_analysis_in_progress());
        assert!(vision.get_new_by_id(6).is_some());
    }
}
