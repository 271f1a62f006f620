use crate::csv;
use crate::sanitize::CleanRecord;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const COLUMN_COUNT: usize = 24;

/// Flight log header, written once when the log file is created.
pub const COLUMNS: [&str; COLUMN_COUNT] = [
    "<TEAM ID>",
    "<MISSION_TIME>",
    "<PACKET_COUNT>",
    "<MODE>",
    "<STATE>",
    "<ALTITUDE>",
    "<AIR SPEED>",
    "<HS_DEPLOYED>",
    "<PC_DEPLOYED>",
    "<TEMPERATURE>",
    "<VOLTAGE>",
    "<PRESSURE>",
    "<GPS_TIME>",
    "<GPS_ALTITUDE>",
    "<GPS_LATITUDE>",
    "<GPS_LONGITUDE>",
    "<GPS_SATS>",
    "<TILT_X>",
    "<TILT_Y>",
    "<ROT_Z>",
    "<CMD_ECHO>",
    "<MT>",
    "<PID_STATE>",
    "<GOAT>",
];

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to open telemetry log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write telemetry log header: {0}")]
    Header(#[source] std::io::Error),
    #[error("failed to append telemetry row: {0}")]
    Write(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub rows_written: u64,
    pub rows_failed: u64,
    pub header_written: bool,
}

/// Append-only CSV flight log. Every row is flushed as soon as it is written.
#[derive(Debug)]
pub struct TelemetryLog<W: Write = BufWriter<File>> {
    path: PathBuf,
    writer: W,
    stats: LogStats,
}

impl TelemetryLog {
    /// Open (or create) the log in append mode. An empty file gets the header
    /// row before anything else; an existing log is never rewritten.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open { path: path.clone(), source })?;

        let is_empty = file
            .metadata()
            .map_err(|source| LogError::Open { path: path.clone(), source })?
            .len()
            == 0;

        Self::with_writer(path, BufWriter::new(file), is_empty)
    }
}

impl<W: Write> TelemetryLog<W> {
    /// Log into an arbitrary writer. `write_header` should be set when the
    /// destination is empty.
    pub fn with_writer(path: impl Into<PathBuf>, writer: W, write_header: bool) -> Result<Self, LogError> {
        let mut log = Self {
            path: path.into(),
            writer,
            stats: LogStats::default(),
        };

        if write_header {
            csv::write_record(&mut log.writer, COLUMNS)
                .and_then(|()| log.writer.flush())
                .map_err(LogError::Header)?;
            log.stats.header_written = true;
            info!("🗒️  Created flight log {}", log.path.display());
        }

        Ok(log)
    }

    /// Split the record on commas and append it as one row. A failed row is
    /// counted and not retried.
    pub fn append(&mut self, record: &CleanRecord) -> Result<(), LogError> {
        // Blocking write; rows arrive at about 1 Hz.
        let result = csv::write_record(&mut self.writer, record.fields())
            .and_then(|()| self.writer.flush());

        match result {
            Ok(()) => {
                self.stats.rows_written += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.rows_failed += 1;
                Err(LogError::Write(e))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> LogStats {
        self.stats
    }
}

/// Named view of one telemetry line, used for display and JSON output.
/// Fields missing from a short line are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub team_id: String,
    pub mission_time: String,
    pub packet_count: String,
    pub mode: String,
    pub state: String,
    pub altitude: String,
    pub air_speed: String,
    pub hs_deployed: String,
    pub pc_deployed: String,
    pub temperature: String,
    pub voltage: String,
    pub pressure: String,
    pub gps_time: String,
    pub gps_altitude: String,
    pub gps_latitude: String,
    pub gps_longitude: String,
    pub gps_sats: String,
    pub tilt_x: String,
    pub tilt_y: String,
    pub rot_z: String,
    pub cmd_echo: String,
    pub mission_time_echo: String,
    pub pid_state: String,
    pub trailer: String,
}

impl TelemetryFrame {
    pub fn parse(line: &str) -> Self {
        let mut fields = line.split(',').map(str::to_owned);
        let mut next = || fields.next().unwrap_or_default();

        Self {
            team_id: next(),
            mission_time: next(),
            packet_count: next(),
            mode: next(),
            state: next(),
            altitude: next(),
            air_speed: next(),
            hs_deployed: next(),
            pc_deployed: next(),
            temperature: next(),
            voltage: next(),
            pressure: next(),
            gps_time: next(),
            gps_altitude: next(),
            gps_latitude: next(),
            gps_longitude: next(),
            gps_sats: next(),
            tilt_x: next(),
            tilt_y: next(),
            rot_z: next(),
            cmd_echo: next(),
            mission_time_echo: next(),
            pid_state: next(),
            trailer: next(),
        }
    }

    pub fn from_record(record: &CleanRecord) -> Self {
        Self::parse(record.as_str())
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == "S"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::sanitize;

    #[test]
    fn test_frame_parse_full_line() {
        let line = "2078,13:14:02,11,F,ASCENT,120.5,12.1,N,N,24.3,8.1,101.2,13:14:01,121.0,38.1,-76.4,6,1.2,-0.3,15.0,CXON,13:14:02,3,GOAT";
        let frame = TelemetryFrame::parse(line);

        assert_eq!(frame.team_id, "2078");
        assert_eq!(frame.state, "ASCENT");
        assert_eq!(frame.gps_sats, "6");
        assert_eq!(frame.cmd_echo, "CXON");
        assert_eq!(frame.trailer, "GOAT");
        assert!(!frame.is_simulated());
    }

    #[test]
    fn test_frame_parse_short_line() {
        let record = sanitize("2078,00:00:01,1,S,GOAT").unwrap();
        let frame = TelemetryFrame::from_record(&record);

        assert_eq!(frame.mode, "S");
        assert_eq!(frame.state, "GOAT");
        assert!(frame.trailer.is_empty());
        assert!(frame.is_simulated());
    }
}
