use crate::framing::{FrameAssembler, RawPacket};
use crate::relay::Relay;
use crate::sanitize::sanitize_packet;
use crate::telemetry::TelemetryLog;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub bytes: u64,
    pub packets: u64,
    pub records: u64,
    pub invalid_packets: u64,
    pub log_failures: u64,
    pub broadcasts: u64,
    pub overflows: u32,
}

/// The ingestion loop: serial bytes in, framed and sanitized records out to
/// the flight log and the observer.
pub struct Ingestor<W: Write = BufWriter<File>> {
    assembler: FrameAssembler,
    log: TelemetryLog<W>,
    relay: Arc<Relay>,
    stats: IngestStats,
}

impl<W: Write> Ingestor<W> {
    pub fn new(log: TelemetryLog<W>, relay: Arc<Relay>) -> Self {
        Self {
            assembler: FrameAssembler::new(),
            log,
            relay,
            stats: IngestStats::default(),
        }
    }

    /// Consume serial chunks until the reader hangs up.
    pub async fn run(mut self, mut chunks: mpsc::Receiver<Vec<u8>>) -> IngestStats {
        info!("📥 Ingestion loop running, logging to {}", self.log.path().display());

        while let Some(chunk) = chunks.recv().await {
            self.process_chunk(&chunk).await;
        }

        info!("Serial stream ended after {} records", self.stats.records);
        self.stats
    }

    pub async fn process_chunk(&mut self, bytes: &[u8]) {
        self.stats.bytes += bytes.len() as u64;

        let framed: Vec<_> = self.assembler.feed(bytes).collect();
        for result in framed {
            match result {
                Ok(packet) => self.handle_packet(packet).await,
                Err(e) => {
                    self.stats.overflows += 1;
                    warn!("Serial framing reset: {}", e);
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: RawPacket) {
        self.stats.packets += 1;

        let Some(record) = sanitize_packet(&packet) else {
            self.stats.invalid_packets += 1;
            debug!("Dropped {}-byte packet without start marker", packet.len());
            return;
        };
        self.stats.records += 1;

        // Persistence first; the observer is best-effort.
        if let Err(e) = self.log.append(&record) {
            self.stats.log_failures += 1;
            error!("Error writing record to CSV: {}", e);
        }

        info!("📡 TELEMETRY: {}", record);

        if self.relay.broadcast(record.as_str()).await {
            self.stats.broadcasts += 1;
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn log(&self) -> &TelemetryLog<W> {
        &self.log
    }
}
