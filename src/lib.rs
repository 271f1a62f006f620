//! # GroundLink
//!
//! Ground-station relay for a CanSat payload. Telemetry arrives on a serial
//! link as `GOAT`-terminated text packets; the relay frames and cleans them,
//! appends each one to a CSV flight log, and pushes it live to a single
//! WebSocket observer. The observer sends commands back down the same link,
//! including the `SIM` commands that make the relay replay recorded flight
//! data to the payload.
//!
//! ## Quick Start
//!
//! ```rust
//! use groundlink::framing::FrameAssembler;
//! use groundlink::sanitize::sanitize_packet;
//!
//! let mut assembler = FrameAssembler::new();
//! for packet in assembler.feed(b"~}3AA2078,00:01:02,1,F,LAUNCH_PAD,GOAT").flatten() {
//!     if let Some(record) = sanitize_packet(&packet) {
//!         println!("{}", record);
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`framing`] - sentinel-delimited frame assembly
//! - [`sanitize`] - start-marker validation and noise stripping
//! - [`csv`] - row quoting and fixture line parsing
//! - [`telemetry`] - CSV flight log and named telemetry view
//! - [`command`] - simulation command parsing and state machine
//! - [`relay`] - shared relay state: serial writer, observer slot, simulation flags
//! - [`simulation`] - fixture loading and the replay injector
//! - [`ingest`] - the serial ingestion loop
//! - [`serial`] - serial port access and the reader thread
//! - [`observer`] - WebSocket observer endpoint
//! - [`config`] - runtime configuration

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

extern crate alloc;

pub mod command;
pub mod config;
pub mod csv;
pub mod framing;
pub mod ingest;
pub mod observer;
pub mod relay;
pub mod sanitize;
pub mod serial;
pub mod simulation;
pub mod telemetry;

// Re-export main public types for convenience
pub use command::{SimCommand, SimState};
pub use config::RelayConfig;
pub use framing::{FrameAssembler, RawPacket};
pub use ingest::Ingestor;
pub use relay::{Relay, RelayStatus};
pub use sanitize::{sanitize, CleanRecord};
pub use telemetry::TelemetryLog;
