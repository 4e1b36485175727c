//! # Vision Link
//!
//! Access to the marker observations produced by the vision system. The vision system runs on its
//! own thread and updates observations while the mission reads them, so every observation sits
//! behind its own lock. Readers should hold the lock only for as long as they need the pose.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use comms_if::eqpt::vision::{MarkerId, MarkerObservation};
use log::debug;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// An observation shared with the vision system.
pub type SharedObservation = Arc<Mutex<MarkerObservation>>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait VisionLink: Send + Sync {
    /// Ask the vision system to analyse the next camera frame for markers.
    fn request_analysis(&self);

    /// Returns true from a call to `request_analysis` until the analysis has completed.
    fn is_analysis_in_progress(&self) -> bool;

    /// Mark every known observation as already seen.
    fn clear_new_flags(&self);

    /// Number of observations which have not been read yet.
    fn new_marker_count(&self) -> usize;

    /// Get the unread observation of the given marker.
    fn get_new_by_id(&self, id: MarkerId) -> Option<SharedObservation>;

    /// Get the first unread observation.
    fn first_new(&self) -> Option<SharedObservation>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// In-process vision link, shared between the vision thread (which publishes observations) and
/// the mission thread.
#[derive(Debug, Default)]
pub struct SharedVision {
    in_progress: AtomicBool,
    observations: Mutex<Vec<SharedObservation>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SharedVision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an observation from the vision side.
    ///
    /// An existing observation of the same marker is updated in place so that readers holding its
    /// handle see the new data.
    pub fn publish(&self, obs: MarkerObservation) {
        let mut observations = self.observations();

        match observations.iter().find(|o| lock(o).id == obs.id) {
            Some(existing) => *lock(existing) = obs,
            None => observations.push(Arc::new(Mutex::new(obs))),
        }
    }

    /// Mark the pending analysis as complete.
    pub fn finish_analysis(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }

    fn observations(&self) -> MutexGuard<'_, Vec<SharedObservation>> {
        match self.observations.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    fn find_new<F>(&self, pred: F) -> Option<SharedObservation>
    where
        F: Fn(&MarkerObservation) -> bool,
    {
        self.observations()
            .iter()
            .find(|o| {
                let obs = lock(o);
                obs.is_new && pred(&obs)
            })
            .cloned()
    }
}

impl VisionLink for SharedVision {
    fn request_analysis(&self) {
        debug!("Marker analysis requested");
        self.in_progress.store(true, Ordering::SeqCst);
    }

    fn is_analysis_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn clear_new_flags(&self) {
        for o in self.observations().iter() {
            lock(o).is_new = false;
        }
    }

    fn new_marker_count(&self) -> usize {
        self.observations().iter().filter(|o| lock(o).is_new).count()
    }

    fn get_new_by_id(&self, id: MarkerId) -> Option<SharedObservation> {
        self.find_new(|o| o.id == id)
    }

    fn first_new(&self) -> Option<SharedObservation> {
        self.find_new(|_| true)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Lock an observation, recovering the data if another thread panicked while holding it.
pub fn lock(obs: &SharedObservation) -> MutexGuard<'_, MarkerObservation> {
    match obs.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}
