//! Main mission executable entry point.
//!
//! # Architecture
//!
//! The executable:
//!
//!     - Initialises the session and logging
//!     - Loads the parameters and the mission file
//!     - Connects to the controller and vision system (currently simulated)
//!     - Runs the mission sequencer on its own thread until all missions are complete, the
//!       controller raises all-stop, or the process is asked to stop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

// Internal
use mission_lib::{
    event_latch::{EventLatch, SharedEventLatch},
    hot_swap::HotSwap,
    mission_log::MissionLog,
    mission_mgr::{scripted, MissionIo, MissionSequencer},
    mnvr_planner::MnvrPlanner,
    params::MissionExecParams,
    sim_ctrl::{self, SimCtrl},
    vision_link::{SharedVision, VisionLink},
};
use util::{
    host,
    logger::logger_init,
    session::Session,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mission_exec", "sessions").wrap_err("Failed to create the session")?;

    // Parameters are needed first as they set the log levels. A single argument is the path to
    // the parameter file.
    let args: Vec<String> = env::args().collect();

    let params: MissionExecParams = match args.len() {
        1 => util::params::load("mission_exec.toml"),
        2 => util::params::load_path(&args[1]),
        n => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                n - 1
            ))
        }
    }
    .wrap_err("Could not load the exec params")?;

    // Initialise logger
    logger_init(&params.logging, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Robobot Mission Executable\n");
    info!(
        "Running on: {}",
        host::get_hostname().unwrap_or_else(|| String::from("unknown host"))
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    debug!("CLI arguments: {:?}", args);

    let mission_plan: scripted::MissionPlan = util::params::load(&params.missions_file)
        .wrap_err_with(|| format!("Could not load the mission file {}", params.missions_file))?;

    info!(
        "Exec parameters loaded, {} missions defined",
        mission_plan.missions.len()
    );

    // ---- INITIALISE MODULES ----

    let planner = MnvrPlanner::new(params.mnvr_planner.clone());

    let missions = scripted::build_missions(
        &mission_plan,
        &params.marker_approach,
        &planner,
        params.hot_swap.line_max,
    )
    .wrap_err("Invalid mission file")?;

    let events = Arc::new(SharedEventLatch::new());
    let vision = Arc::new(SharedVision::new());

    // No hardware link is available yet, so the controller is simulated
    warn!("Using the simulated controller \"{}\"", params.sim_ctrl.robot_name);
    let sim = SimCtrl::new(&params.sim_ctrl, events.clone() as Arc<dyn EventLatch>);

    let vision_run = Arc::new(AtomicBool::new(true));
    let vision_jh = sim_ctrl::spawn_sim_vision(
        vision.clone(),
        params.sim_ctrl.markers.clone(),
        vision_run.clone(),
    );

    let hot_swap = HotSwap::new(params.hot_swap.clone(), Box::new(sim))
        .wrap_err("Failed to initialise the HotSwap transport")?;

    let io = MissionIo::new(
        hot_swap,
        events,
        vision as Arc<dyn VisionLink>,
        params.announcer.build(),
    );

    let mut sequencer = MissionSequencer::new(params.sequencer.clone(), io)
        .wrap_err("Failed to initialise the MissionSequencer")?;

    for (number, handler) in missions {
        sequencer.register(number, handler);
    }

    // The mission log is not essential
    match MissionLog::open(
        &session.mission_log_path,
        params.sequencer.from_mission,
        params.sequencer.to_mission,
    ) {
        Ok(log) => sequencer.set_mission_log(log),
        Err(e) => warn!("Mission log disabled: {}", e),
    }

    info!("Module initialisation complete\n");

    // ---- MISSION THREAD ----

    info!("Starting mission thread\n");

    let mission_jh = thread::spawn(move || -> Result<_, Report> {
        sequencer
            .init()
            .wrap_err("Failed to initialise the MissionSequencer")?;
        sequencer.run();
        Ok(sequencer.status())
    });

    let result = mission_jh
        .join()
        .map_err(|_| eyre!("The mission thread panicked"))?;

    // ---- SHUTDOWN ----

    vision_run.store(false, Ordering::Relaxed);
    if vision_jh.join().is_err() {
        warn!("The simulated vision thread panicked");
    }

    let status = result?;
    match serde_json::to_string(&status) {
        Ok(s) => info!("Final sequencer status: {}", s),
        Err(e) => warn!("Could not serialise the sequencer status: {}", e),
    }

    info!("End of execution");

    Ok(())
}
