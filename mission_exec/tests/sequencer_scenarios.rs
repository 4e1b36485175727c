//! # Mission sequencer scenarios
//!
//! End to end runs of the sequencer and the marker approach against the simulated controller.

use std::sync::Arc;

use comms_if::eqpt::{
    ctrl::{CtrlCmd, EVENT_ALL_STOP},
    vision::MarkerObservation,
};
use mission_lib::{
    announcer::RecordingAnnouncer,
    ctrl_link::Button,
    event_latch::{EventLatch, SharedEventLatch},
    hot_swap::{HotSwap, HotSwapParams, SlotId},
    mission_log::MissionLog,
    mission_mgr::{
        marker_approach::{ApproachOutcome, MarkerApproach, MarkerApproachParams},
        scripted::{self, MissionPlan},
        MissionHandler, MissionIo, MissionSequencer, SequencerParams, StateId, STATE_ENTRY,
    },
    mnvr_planner::MnvrPlanner,
    sim_ctrl::{SimCtrl, SimCtrlParams},
    vision_link::{SharedVision, VisionLink},
};

// ------------------------------------------------------------------------------------------------
// HARNESS
// ------------------------------------------------------------------------------------------------

struct Harness {
    sim: SimCtrl,
    vision: Arc<SharedVision>,
    events: Arc<SharedEventLatch>,
    announcer: RecordingAnnouncer,
}

impl Harness {
    fn new() -> Self {
        let events = Arc::new(SharedEventLatch::new());
        let sim = SimCtrl::new(
            &SimCtrlParams {
                complete_after_polls: Some(1),
                ..Default::default()
            },
            events.clone(),
        );

        Self {
            sim,
            vision: Arc::new(SharedVision::new()),
            events,
            announcer: RecordingAnnouncer::new(),
        }
    }

    fn io(&self) -> MissionIo {
        let hot_swap = HotSwap::new(
            HotSwapParams {
                settle_delay_s: 0.0,
                ..Default::default()
            },
            Box::new(self.sim.clone()),
        )
        .unwrap();

        MissionIo::new(
            hot_swap,
            self.events.clone(),
            self.vision.clone(),
            Box::new(self.announcer.clone()),
        )
    }

    fn sequencer(&self, params: SequencerParams, missions_toml: &str) -> MissionSequencer {
        let plan: MissionPlan = util::params::from_str(missions_toml).unwrap();
        let missions = scripted::build_missions(
            &plan,
            &approach_params(),
            &MnvrPlanner::default(),
            20,
        )
        .unwrap();

        let mut seq = MissionSequencer::new(params, self.io()).unwrap();
        for (number, handler) in missions {
            seq.register(number, handler);
        }

        seq
    }

    /// Step the sequencer until `done` or the cycle limit is reached.
    fn step_until<F>(&self, seq: &mut MissionSequencer, max_cycles: usize, done: F)
    where
        F: Fn(&MissionSequencer) -> bool,
    {
        for _ in 0..max_cycles {
            if done(seq) {
                return;
            }
            seq.step();
        }
        assert!(done(seq), "Condition not met after {} cycles", max_cycles);
    }

    fn sent_text(&self) -> Vec<String> {
        self.sim.sent().iter().map(|c| c.to_string()).collect()
    }
}

fn seq_params(to_mission: u32) -> SequencerParams {
    SequencerParams {
        to_mission,
        heartbeat_retry_wait_s: 0.0,
        ..Default::default()
    }
}

fn approach_params() -> MarkerApproachParams {
    MarkerApproachParams {
        frame_settle_s: 0.0,
        max_search_iterations: 3,
        ..Default::default()
    }
}

const TWO_MISSIONS: &str = r#"
[[missions]]
number = 1
name = "three lines"
segments = [
    { lines = ["vel=0.3,acc=3:dist=0.5", "vel=0.3,tr=0.2:turn=80", "vel=0,event=1:dist=1"], event = 1 },
]

[[missions]]
number = 2
name = "wait"
segments = [
    { lines = ["vel=0:time=100"], event = 3 },
]
"#;

// ------------------------------------------------------------------------------------------------
// SEQUENCER
// ------------------------------------------------------------------------------------------------

#[test]
fn script_completion_advances_mission() {
    let h = Harness::new();
    h.sim.set_complete_after_polls(None);

    let mut seq = h.sequencer(seq_params(2), TWO_MISSIONS);
    seq.init().unwrap();
    h.sim.clear_sent();

    // Ready, then send the script
    h.step_until(&mut seq, 5, |s| s.context().state == 11);

    let sent = h.sent_text();
    let script: Vec<&String> = sent.iter().filter(|s| s.starts_with("<mod")).collect();
    assert_eq!(
        script,
        vec![
            "<mod 101 1 vel=0.3,acc=3:dist=0.5",
            "<mod 101 2 vel=0.3,tr=0.2:turn=80",
            "<mod 101 3 vel=0,event=1:dist=1",
        ]
    );
    assert!(sent.contains(&String::from("<event=31")));
    assert_eq!(seq.status().active_slot, SlotId::B);

    // The mission waits until the controller raises the event
    for _ in 0..10 {
        seq.step();
    }
    assert_eq!(seq.context().mission, 1);
    assert_eq!(seq.context().state, 11);

    // Raise the completion event as the controller would
    h.events.raise(1);
    seq.step();
    assert_eq!(seq.context().state, 999);

    seq.step();
    assert_eq!(seq.context().mission, 2);
    assert_eq!(seq.context().state, STATE_ENTRY);
    assert!(!seq.is_finished());
}

#[test]
fn missions_run_to_completion() {
    let h = Harness::new();
    let missions = r#"
        [[missions]]
        number = 1
        name = "first"
        segments = [
            { lines = ["vel=0.3:dist=0.5"], event = 1 },
            { lines = ["vel=0.2:dist=0.1"], event = 2 },
        ]

        [[missions]]
        number = 2
        name = "second"
        segments = [
            { lines = ["vel=-0.2:dist=0.1"], event = 1 },
        ]
    "#;

    let mut seq = h.sequencer(seq_params(2), missions);
    seq.init().unwrap();
    seq.run();

    assert!(seq.is_finished());
    assert_eq!(seq.context().mission, 3);

    // Slots alternate, B first
    let activations: Vec<CtrlCmd> = h
        .sim
        .sent()
        .into_iter()
        .filter(|c| matches!(c, CtrlCmd::RaiseEvent(_)))
        .collect();
    assert_eq!(
        activations,
        vec![
            CtrlCmd::RaiseEvent(31),
            CtrlCmd::RaiseEvent(30),
            CtrlCmd::RaiseEvent(31)
        ]
    );

    assert_eq!(h.sim.sent().last(), Some(&CtrlCmd::Display {
        row: 3,
        text: String::from("finished")
    }));
    assert!(h.announcer.said().contains(&String::from("Robot sim finished.")));
}

#[test]
fn all_stop_ends_the_run() {
    let h = Harness::new();
    h.sim.set_complete_after_polls(None);

    let mut seq = h.sequencer(seq_params(2), TWO_MISSIONS);
    seq.init().unwrap();
    h.step_until(&mut seq, 5, |s| s.context().state == 11);

    h.events.raise(EVENT_ALL_STOP);
    seq.step();

    assert!(seq.is_finished());
    assert_eq!(seq.context().mission, 1);
}

#[test]
fn start_button_gates_mission() {
    let h = Harness::new();
    let missions = r#"
        [[missions]]
        number = 1
        name = "gated"
        wait_for_start_button = true
        segments = [{ lines = ["vel=0.3:dist=0.5"], event = 1 }]
    "#;

    let mut seq = h.sequencer(seq_params(1), missions);
    seq.init().unwrap();

    for _ in 0..10 {
        seq.step();
    }
    assert_eq!(seq.context().state, 1);
    assert!(h.announcer.said().contains(&String::from("Press green to start")));
    assert_eq!(seq.status().num_activations, 0);

    h.sim.set_button(Button::Green, true);
    h.step_until(&mut seq, 10, |s| s.is_finished());

    assert_eq!(seq.status().num_activations, 1);
}

#[test]
fn heartbeat_loss_continues_by_default() {
    let h = Harness::new();
    h.sim.set_heartbeat(false);

    let mut seq = h.sequencer(seq_params(1), TWO_MISSIONS);
    seq.init().unwrap();

    assert!(!seq.is_finished());
    assert!(h
        .announcer
        .said()
        .contains(&String::from("Oops, no usable connection with robot.")));
    assert!(h.sent_text().contains(&String::from("oled 3 Oops: Lost robot!")));

    // Missions still run
    h.step_until(&mut seq, 10, |s| s.context().state == 11);
}

#[test]
fn heartbeat_loss_aborts_when_configured() {
    let h = Harness::new();
    h.sim.set_heartbeat(false);

    let mut seq = h.sequencer(
        SequencerParams {
            abort_on_heartbeat_loss: true,
            ..seq_params(1)
        },
        TWO_MISSIONS,
    );
    seq.init().unwrap();
    assert!(seq.is_finished());

    h.sim.clear_sent();
    seq.run();

    // No mission was started but the robot is still stopped
    let sent = h.sim.sent();
    assert!(!sent.iter().any(|c| matches!(c, CtrlCmd::ModifyLine { .. })));
    assert_eq!(sent[0], CtrlCmd::Stop);
}

#[test]
fn mission_log_records_phase_changes() {
    let h = Harness::new();
    let path = std::env::temp_dir().join(format!("mission_log_test_{}.txt", std::process::id()));

    let mut seq = h.sequencer(seq_params(1), TWO_MISSIONS);
    seq.set_mission_log(MissionLog::open(&path, 1, 1).unwrap());
    seq.init().unwrap();
    seq.run();

    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let rows: Vec<Vec<&str>> = contents
        .lines()
        .filter(|l| !l.starts_with('%'))
        .map(|l| l.split(' ').collect())
        .collect();

    // Two rows per change, old phase then new phase
    assert!(!rows.is_empty());
    assert_eq!(rows.len() % 2, 0);
    assert_eq!(&rows[0][1..], &["1", "0"]);
    assert_eq!(&rows[1][1..], &["1", "10"]);
    assert!(rows.iter().all(|r| r.len() == 3 && r[0].contains('.')));
}

// ------------------------------------------------------------------------------------------------
// MARKER APPROACH
// ------------------------------------------------------------------------------------------------

/// Run a marker approach on its own, answering analysis requests with `markers`.
fn run_approach(
    h: &Harness,
    markers: &[MarkerObservation],
    max_steps: usize,
) -> (MarkerApproach, MissionIo) {
    let mut io = h.io();
    io.hot_swap.init_program().unwrap();
    h.sim.set_complete_after_polls(Some(0));

    let mut approach = MarkerApproach::new(approach_params(), MnvrPlanner::default());
    let mut state: StateId = STATE_ENTRY;

    for _ in 0..max_steps {
        if approach.step(&mut state, &mut io).unwrap() {
            return (approach, io);
        }

        io.hot_swap.link_mut().service().unwrap();

        // Vision analysis completes within a cycle
        if h.vision.is_analysis_in_progress() {
            for m in markers {
                h.vision.publish(m.clone());
            }
            h.vision.finish_analysis();
        }
    }

    panic!("Marker approach did not finish in {} steps", max_steps);
}

#[test]
fn approach_gives_up_when_nothing_is_seen() {
    let h = Harness::new();

    let (approach, io) = run_approach(&h, &[], 200);

    assert_eq!(approach.outcome(), Some(ApproachOutcome::NotFound));
    assert_eq!(approach.search_count(), 3);
    assert_eq!(io.hot_swap.num_activations(), 3);

    let sent: Vec<String> = h.sim.sent().iter().map(|c| c.to_string()).collect();
    assert!(sent.contains(&String::from("<mod 101 1 vel=0.25,tr=0.150:turn=10.0,time=10")));
    assert!(h.announcer.said().contains(&String::from("Looking for marker.")));
}

#[test]
fn approach_stops_at_stop_marker() {
    let h = Harness::new();

    let (approach, io) = run_approach(
        &h,
        &[
            MarkerObservation::new(3, 0, [1.0, 0.0], 0.0),
            MarkerObservation::new(6, 0, [1.5, 0.2], 0.0),
        ],
        50,
    );

    assert_eq!(approach.outcome(), Some(ApproachOutcome::StopMarker));
    assert_eq!(io.hot_swap.num_activations(), 0);
}

#[test]
fn approach_drives_to_marker() {
    let h = Harness::new();

    let (approach, io) = run_approach(&h, &[MarkerObservation::new(3, 0, [1.2, 0.3], 0.2)], 50);

    assert_eq!(approach.outcome(), Some(ApproachOutcome::Reached));
    assert_eq!(io.hot_swap.num_activations(), 1);
    assert!(h.announcer.said().contains(&String::from("Found ArUco marker.")));
    assert!(h.sent_text().contains(&String::from("oled 5 found marker")));

    // The approach script ends in its completion event
    let sent = h.sim.sent();
    let last_line = sent
        .iter()
        .filter_map(|c| match c {
            CtrlCmd::ModifyLine { content, .. } => Some(content.to_string()),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last_line, "vel=0,event=2:dist=1");
}

#[test]
fn approach_already_at_marker_sends_nothing() {
    let h = Harness::new();

    // Exactly at the stand-off distance
    let (approach, io) = run_approach(&h, &[MarkerObservation::new(3, 0, [0.3, 0.0], 0.0)], 50);

    assert_eq!(approach.outcome(), Some(ApproachOutcome::Reached));
    assert_eq!(io.hot_swap.num_activations(), 0);
}

#[test]
fn approach_as_mission_segment() {
    let h = Harness::new();
    let missions = r#"
        [[missions]]
        number = 1
        name = "find marker"
        segments = [{ marker_approach = true }, { lines = ["vel=0.1:dist=0.1"], event = 1 }]
    "#;

    h.vision.publish(MarkerObservation::new(6, 0, [1.0, 0.0], 0.0));

    let mut seq = h.sequencer(seq_params(1), missions);
    seq.init().unwrap();

    let vision = h.vision.clone();
    for _ in 0..100 {
        if seq.is_finished() {
            break;
        }
        seq.step();
        if vision.is_analysis_in_progress() {
            vision.publish(MarkerObservation::new(6, 1, [1.0, 0.0], 0.0));
            vision.finish_analysis();
        }
    }

    assert!(seq.is_finished());
    // Only the script segment was driven
    assert_eq!(seq.status().num_activations, 1);
}
