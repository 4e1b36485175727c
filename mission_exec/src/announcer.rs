//! # Announcer
//!
//! Operator notifications ("Paused.", "Mission resuming", ...). Announcements are best effort, a
//! failure to announce never affects the mission.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex},
};

use log::{info, warn};
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait Announcer: Send {
    /// Announce a message to the operator.
    fn say(&mut self, text: &str);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Writes announcements to the log only.
#[derive(Debug, Default)]
pub struct LogAnnouncer;

/// Speaks announcements with `espeak`, as well as logging them.
#[derive(Debug)]
pub struct EspeakAnnouncer {
    params: EspeakParams,

    /// Speech processes which may still be running
    speaking: Vec<Child>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakParams {
    /// Voice passed to espeak's `-v` option
    pub voice: String,

    /// Speed in words per minute
    pub speed_wpm: u32,

    /// Amplitude, 0 to 200
    pub amplitude: u32,
}

/// Keeps every announcement, so that tests can check what the operator was told.
#[derive(Debug, Clone, Default)]
pub struct RecordingAnnouncer {
    said: Arc<Mutex<Vec<String>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Announcer selection in the parameter file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum AnnouncerParams {
    Log,
    Espeak(EspeakParams),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AnnouncerParams {
    /// Build the announcer described by these parameters.
    pub fn build(&self) -> Box<dyn Announcer> {
        match self {
            AnnouncerParams::Log => Box::new(LogAnnouncer),
            AnnouncerParams::Espeak(e) => Box::new(EspeakAnnouncer::new(e.clone())),
        }
    }
}

impl Announcer for LogAnnouncer {
    fn say(&mut self, text: &str) {
        info!("Announce: {}", text);
    }
}

impl EspeakAnnouncer {
    pub fn new(params: EspeakParams) -> Self {
        Self {
            params,
            speaking: Vec::new(),
        }
    }
}

impl Announcer for EspeakAnnouncer {
    fn say(&mut self, text: &str) {
        info!("Announce: {}", text);

        reap_finished(&mut self.speaking);

        // Spawn without waiting, speech must not block the mission
        let res = Command::new("espeak")
            .arg(format!("-v{}", self.params.voice))
            .arg(format!("-s{}", self.params.speed_wpm))
            .arg(format!("-a{}", self.params.amplitude))
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match res {
            Ok(child) => self.speaking.push(child),
            Err(e) => warn!("Could not run espeak: {}", e),
        }
    }
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything announced so far.
    pub fn said(&self) -> Vec<String> {
        match self.said.lock() {
            Ok(s) => s.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }
}

impl Announcer for RecordingAnnouncer {
    fn say(&mut self, text: &str) {
        info!("Announce: {}", text);

        match self.said.lock() {
            Ok(mut s) => s.push(text.to_string()),
            Err(e) => e.into_inner().push(text.to_string()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Wait on the children which have exited, keeping those still running.
fn reap_finished(children: &mut Vec<Child>) {
    let mut running = Vec::with_capacity(children.len());

    for mut child in children.drain(..) {
        match child.try_wait() {
            Ok(Some(_)) => (),
            Ok(None) => running.push(child),
            Err(e) => warn!("Could not check on speech process {}: {}", child.id(), e),
        }
    }

    *children = running;
}
