//! Generic logger utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::{collections::BTreeMap, str::FromStr};
use log::{self, info};
use fern;
use colored::{ColoredString, Colorize};
use serde::Deserialize;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// STRUCTURES
// ---------------------------------------------------------------------------

/// Log levels of an executable, read from the `[logging]` table of its
/// parameter file.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerParams {
    /// Level of every target without an override, `info` or more verbose.
    #[serde(default = "default_level")]
    pub level: String,

    /// Level overrides keyed by target, e.g.
    /// `"mission_lib::hot_swap" = "trace"` to record controller traffic.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level less than `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("`{0}` is not a log level")]
    UnknownLevel(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for LoggerParams {
    fn default() -> Self {
        Self {
            level: default_level(),
            targets: BTreeMap::new(),
        }
    }
}

impl LoggerParams {
    /// Level applied to targets without an override.
    pub fn min_level(&self) -> Result<LevelFilter, LoggerInitError> {
        let level = parse_level(&self.level)?;

        if level < log::Level::Info {
            return Err(LoggerInitError::InvalidMinLogLevel(level))
        }

        Ok(level)
    }

    /// Parsed per-target overrides.
    pub fn target_levels(&self) -> Result<Vec<(String, LevelFilter)>, LoggerInitError> {
        self.targets
            .iter()
            .map(|(t, l)| Ok((t.clone(), parse_level(l)?)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
/// 
/// Records are written to stdout and to the session's log file, stamped with
/// the number of seconds since the session epoch.
///
/// # Notes
/// 
/// - The base level must be `info` or more verbose, overrides may be set to
///   any level.
/// 
/// # Safety
/// 
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    params: &LoggerParams, 
    session: &session::Session
) -> Result<(), LoggerInitError> {

    let min_level = params.min_level()?;
    let target_levels = params.target_levels()?;

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    // Setup the logger using fern's builder pattern
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {

            // If debug or trace include the target, otherwise don't include it
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            }
            else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    message
                ))
            }

        })
        .level(min_level);

    let dispatch = target_levels
        .iter()
        .fold(dispatch, |d, (t, l)| d.level_for(t.clone(), *l));

    dispatch
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;
    
    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {:?}", min_level);
    for (target, level) in target_levels.iter() {
        info!("    Log level of {}: {:?}", target, level);
    }
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_level() -> String {
    String::from("info")
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggerInitError> {
    LevelFilter::from_str(level.trim())
        .map_err(|_| LoggerInitError::UnknownLevel(level.to_string()))
}

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}
