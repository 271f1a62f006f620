use crate::csv::{self, CsvError};
use crate::relay::Relay;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{info, warn};

pub const DEFAULT_FIXTURE_PATH: &str = "cansat_2024_simp.csv";
// One replayed row per second, the rate the payload samples at in flight.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

const TRAILER: &str = ",GOAT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub fixture_path: PathBuf,
    pub interval: Duration,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            fixture_path: PathBuf::from(DEFAULT_FIXTURE_PATH),
            interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to open fixture {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read fixture line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("fixture line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: CsvError,
    },
    #[error("fixture line {line} has {found} fields, header has {expected}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("fixture has no data rows")]
    Empty,
    #[error("simulation tick interval must be non-zero")]
    ZeroInterval,
    #[error("fixture loader task failed: {0}")]
    LoadTask(#[source] tokio::task::JoinError),
}

/// Recorded flight data replayed to the payload in simulation mode.
/// Record 0 is the header and is never replayed.
#[derive(Debug, Clone)]
pub struct Fixture {
    records: Vec<Vec<String>>,
}

impl Fixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| FixtureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Parse CSV text. Blank lines are skipped; every record must have as
    /// many fields as the header.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, FixtureError> {
        let mut records: Vec<Vec<String>> = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line.map_err(|source| FixtureError::Read { line: line_number, source })?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                continue;
            }

            let fields = csv::parse_line(line)
                .map_err(|source| FixtureError::Parse { line: line_number, source })?;

            if let Some(header) = records.first() {
                if fields.len() != header.len() {
                    return Err(FixtureError::FieldCount {
                        line: line_number,
                        expected: header.len(),
                        found: fields.len(),
                    });
                }
            }
            records.push(fields);
        }

        if records.len() < 2 {
            return Err(FixtureError::Empty);
        }

        Ok(Self { records })
    }

    pub fn header(&self) -> &[String] {
        &self.records[0]
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn data_rows(&self) -> usize {
        self.records.len() - 1
    }

    /// Wire form of record `index`: fields joined by commas plus the trailer.
    pub fn line(&self, index: usize) -> Option<String> {
        self.records
            .get(index)
            .map(|fields| fields.join(",") + TRAILER)
    }
}

/// Position in the fixture. Starts at record 1 and wraps back to record 1,
/// skipping the header on every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureCursor {
    next: usize,
    len: usize,
    wraps: u32,
}

impl FixtureCursor {
    pub fn new(fixture: &Fixture) -> Self {
        Self::with_len(fixture.record_count())
    }

    pub fn with_len(len: usize) -> Self {
        Self { next: 1, len, wraps: 0 }
    }

    pub fn advance(&mut self) -> usize {
        if self.next >= self.len {
            self.next = 1;
            self.wraps += 1;
        }
        let index = self.next;
        self.next += 1;
        index
    }

    pub fn wraps(&self) -> u32 {
        self.wraps
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectorReport {
    pub generation: u64,
    pub rows_sent: u64,
    pub write_failures: u64,
    pub wraps: u32,
}

/// Replay the fixture into the serial link, one record per tick, until run
/// `generation` is disarmed or superseded. The run flag is checked once per
/// tick, before the write.
pub async fn run_injector(relay: Arc<Relay>, generation: u64) -> Result<InjectorReport, FixtureError> {
    let settings = relay.simulation_settings().clone();
    if settings.interval.is_zero() {
        return Err(FixtureError::ZeroInterval);
    }

    let path = settings.fixture_path.clone();
    let fixture = tokio::task::spawn_blocking(move || Fixture::load(path))
        .await
        .map_err(FixtureError::LoadTask)??;
    info!(
        "🛰️  Simulation run {} replaying {} rows from {}",
        generation,
        fixture.data_rows(),
        settings.fixture_path.display()
    );

    let mut cursor = FixtureCursor::new(&fixture);
    let mut ticker = time::interval_at(Instant::now() + settings.interval, settings.interval);
    let mut report = InjectorReport {
        generation,
        ..InjectorReport::default()
    };

    loop {
        ticker.tick().await;

        if !relay.is_run_current(generation).await {
            break;
        }

        let index = cursor.advance();
        let Some(line) = fixture.line(index) else {
            break;
        };

        match relay.write_serial(line.as_bytes()).await {
            Ok(()) => report.rows_sent += 1,
            Err(e) => {
                report.write_failures += 1;
                warn!("Error sending simulation row {} to serial port: {}", index, e);
            }
        }
    }

    report.wraps = cursor.wraps();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "TEAM_ID,MISSION_TIME,PRESSURE\n2078,00:00:01,101.3\n2078,00:00:02,101.1\n2078,00:00:03,100.8\n";

    #[test]
    fn test_parse_fixture_records() {
        let fixture = Fixture::parse(FIXTURE.as_bytes()).unwrap();

        assert_eq!(fixture.record_count(), 4);
        assert_eq!(fixture.data_rows(), 3);
        assert_eq!(fixture.header()[2], "PRESSURE");
        assert_eq!(fixture.line(1).unwrap(), "2078,00:00:01,101.3,GOAT");
        assert!(fixture.line(4).is_none());
    }

    #[test]
    fn test_parse_handles_crlf_and_blank_lines() {
        let text = "A,B\r\n\r\n1,2\r\n\n3,4\r\n";
        let fixture = Fixture::parse(text.as_bytes()).unwrap();

        assert_eq!(fixture.data_rows(), 2);
        assert_eq!(fixture.line(2).unwrap(), "3,4,GOAT");
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let result = Fixture::parse("A,B,C\n1,2,3\n4,5\n".as_bytes());
        assert!(matches!(
            result,
            Err(FixtureError::FieldCount { line: 3, expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_parse_rejects_header_only() {
        assert!(matches!(Fixture::parse("A,B\n".as_bytes()), Err(FixtureError::Empty)));
        assert!(matches!(Fixture::parse("".as_bytes()), Err(FixtureError::Empty)));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Fixture::load("/nonexistent/groundlink/fixture.csv");
        assert!(matches!(result, Err(FixtureError::Open { .. })));
    }

    #[test]
    fn test_cursor_wraps_to_first_data_row() {
        let mut cursor = FixtureCursor::with_len(4);
        let visited: Vec<usize> = (0..7).map(|_| cursor.advance()).collect();

        assert_eq!(visited, vec![1, 2, 3, 1, 2, 3, 1]);
        assert!(!visited.contains(&0));
        assert_eq!(cursor.wraps(), 2);
    }

    #[test]
    fn test_cursor_single_data_row() {
        let mut cursor = FixtureCursor::with_len(2);
        assert_eq!(cursor.advance(), 1);
        assert_eq!(cursor.advance(), 1);
        assert_eq!(cursor.advance(), 1);
    }
}
