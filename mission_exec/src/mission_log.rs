//! # Mission Log
//!
//! Records every change of mission phase as space separated rows of `time mission state`, where
//! time is the unix time in seconds with millisecond resolution. Each change produces two rows,
//! one for the phase being left and one for the phase being entered.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use util::time::format_unix_millis;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MissionLog {
    writer: csv::Writer<Box<dyn Write + Send>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MissionLogError {
    #[error("Could not create the mission log file: {0}")]
    CreateError(io::Error),

    #[error("Could not write the mission log header: {0}")]
    HeaderError(io::Error),

    #[error("Could not write a mission log record: {0}")]
    WriteError(csv::Error),

    #[error("Could not flush the mission log: {0}")]
    FlushError(io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MissionLog {
    /// Create a new log file at `path`, covering missions `from_mission` to `to_mission`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        from_mission: u32,
        to_mission: u32,
    ) -> Result<Self, MissionLogError> {
        let file = File::create(path).map_err(MissionLogError::CreateError)?;

        Self::with_header(Box::new(file), Utc::now(), from_mission, to_mission)
    }

    /// Write the log into any writer, starting with the header comment lines.
    pub fn with_header(
        mut writer: Box<dyn Write + Send>,
        start_time: DateTime<Utc>,
        from_mission: u32,
        to_mission: u32,
    ) -> Result<Self, MissionLogError> {
        writeln!(
            writer,
            "% Mission log started at {}\n\
             % Running missions {} to {}\n\
             % 1 Time (sec)\n\
             % 2 Mission number\n\
             % 3 Mission state",
            format_unix_millis(&start_time),
            from_mission,
            to_mission
        )
        .map_err(MissionLogError::HeaderError)?;

        Ok(Self::from_writer(writer))
    }

    /// Write records into `writer` without any header.
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .delimiter(b' ')
                .has_headers(false)
                .from_writer(writer),
        }
    }

    /// Append a record, the log is flushed after every record.
    pub fn record(
        &mut self,
        time: DateTime<Utc>,
        mission: u32,
        state: u32,
    ) -> Result<(), MissionLogError> {
        self.writer
            .write_record(&[
                format_unix_millis(&time),
                mission.to_string(),
                state.to_string(),
            ])
            .map_err(MissionLogError::WriteError)?;

        self.writer.flush().map_err(MissionLogError::FlushError)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    /// Writer which keeps everything written to it in a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_records() {
        let buf = SharedBuf::default();
        let mut log = MissionLog::with_header(Box::new(buf.clone()), Utc.timestamp(100, 0), 1, 3)
            .unwrap();

        log.record(Utc.timestamp_millis(1_600_000_000_123), 1, 0).unwrap();
        log.record(Utc.timestamp_millis(1_600_000_000_123), 1, 10).unwrap();

        let contents = buf.contents();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines[0], "% Mission log started at 100.000");
        assert_eq!(lines[1], "% Running missions 1 to 3");
        assert!(lines[2..5].iter().all(|l| l.starts_with('%')));
        assert_eq!(lines[5], "1600000000.123 1 0");
        assert_eq!(lines[6], "1600000000.123 1 10");
    }

    #[test]
    fn test_open_failure() {
        assert!(matches!(
            MissionLog::open("/this/path/does/not/exist/log.txt", 1, 1),
            Err(MissionLogError::CreateError(_))
        ));
    }
}
