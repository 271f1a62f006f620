use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: &str = "COM5";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_READ_BACKOFF_MS: u64 = 250;

const READ_CHUNK_SIZE: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    /// Pause after a failed read before trying again.
    pub read_backoff: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            read_backoff: Duration::from_millis(DEFAULT_READ_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to clone serial port handle: {0}")]
    Clone(#[source] serialport::Error),
    #[error("failed to spawn serial reader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Both halves of an open port. The reader goes to the reader thread, the
/// writer to the relay.
pub struct SerialLink {
    pub reader: Box<dyn SerialPort>,
    pub writer: Box<dyn SerialPort>,
}

pub fn open_port(settings: &SerialSettings) -> Result<SerialLink, SerialError> {
    let reader = serialport::new(settings.port.as_str(), settings.baud_rate)
        .timeout(settings.timeout)
        .open()
        .map_err(|source| SerialError::Open {
            port: settings.port.clone(),
            source,
        })?;
    let writer = reader.try_clone().map_err(SerialError::Clone)?;

    info!("🔌 Opened serial port {} at {} baud", settings.port, settings.baud_rate);
    Ok(SerialLink { reader, writer })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub bytes_read: u64,
    pub chunks_sent: u64,
    pub read_errors: u64,
}

/// Run the blocking read loop on its own thread, forwarding every chunk to
/// the ingestion task. The thread ends at end of stream or once the
/// receiving side is gone.
pub fn spawn_reader<R>(
    reader: R,
    chunks: mpsc::Sender<Vec<u8>>,
    backoff: Duration,
) -> Result<thread::JoinHandle<ReaderStats>, SerialError>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("serial-reader".into())
        .spawn(move || read_loop(reader, chunks, backoff))
        .map_err(SerialError::Spawn)
}

fn read_loop<R: Read>(mut reader: R, chunks: mpsc::Sender<Vec<u8>>, backoff: Duration) -> ReaderStats {
    let mut stats = ReaderStats::default();
    let mut buf = [0u8; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                info!("Serial stream closed");
                break;
            }
            Ok(n) => {
                stats.bytes_read += n as u64;
                if chunks.blocking_send(buf[..n].to_vec()).is_err() {
                    debug!("Ingestion loop gone, stopping serial reader");
                    break;
                }
                stats.chunks_sent += 1;
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                if chunks.is_closed() {
                    break;
                }
            }
            Err(e) => {
                stats.read_errors += 1;
                warn!("Error reading from serial port: {}", e);
                if chunks.is_closed() {
                    break;
                }
                thread::sleep(backoff);
            }
        }
    }

    stats
}
