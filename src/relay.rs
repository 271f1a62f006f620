use crate::command::{SimCommand, SimState, Transition};
use crate::simulation::{self, SimulationSettings};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Write half of the serial link to the payload.
pub type SerialWriter = Box<dyn Write + Send>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("serial write failed: {0}")]
    SerialWrite(#[source] std::io::Error),
    #[error("serial write task failed: {0}")]
    WriterTask(#[source] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub enabled: bool,
    pub simulating: bool,
    pub observer_connected: bool,
    pub simulation_runs: u64,
    pub last_simulation_error: Option<String>,
    pub records_broadcast: u64,
    pub records_dropped: u64,
}

/// Registration handed to a freshly upgraded observer connection.
///
/// `outbound` yields every record to push to the observer and ends once the
/// relay lets go of the connection. `closed` fires when a newer observer
/// takes the slot. The connection must fire (or drop) `finished` once it
/// will forward nothing more; the newer observer is not installed before.
#[derive(Debug)]
pub struct ObserverLease {
    pub id: u64,
    pub outbound: mpsc::Receiver<String>,
    pub closed: oneshot::Receiver<()>,
    pub finished: oneshot::Sender<()>,
}

struct ObserverSlot {
    id: u64,
    outbound: mpsc::Sender<String>,
    close: oneshot::Sender<()>,
    finished: oneshot::Receiver<()>,
}

struct Shared {
    observer: Option<ObserverSlot>,
    sim: SimState,
    next_observer_id: u64,
    last_simulation_error: Option<String>,
    records_broadcast: u64,
    records_dropped: u64,
}

/// Process-wide relay state: the single observer slot and the simulation
/// flags behind one async lock, and the serial writer behind its own blocking
/// lock. Serial writes run on the blocking pool and never hold the async lock.
pub struct Relay {
    shared: Mutex<Shared>,
    serial: Arc<std::sync::Mutex<SerialWriter>>,
    simulation: SimulationSettings,
}

impl Relay {
    pub fn new(serial: SerialWriter, simulation: SimulationSettings) -> Arc<Self> {
        Arc::new(Self {
            shared: Mutex::new(Shared {
                observer: None,
                sim: SimState::default(),
                next_observer_id: 1,
                last_simulation_error: None,
                records_broadcast: 0,
                records_dropped: 0,
            }),
            serial: Arc::new(std::sync::Mutex::new(serial)),
            simulation,
        })
    }

    pub fn simulation_settings(&self) -> &SimulationSettings {
        &self.simulation
    }

    /// Write and flush one message on the blocking pool. Concurrent writers
    /// are serialized by the port lock.
    pub async fn write_serial(&self, bytes: &[u8]) -> Result<(), RelayError> {
        let serial = Arc::clone(&self.serial);
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut port = serial.lock().unwrap_or_else(PoisonError::into_inner);
            port.write_all(&bytes)
                .and_then(|()| port.flush())
                .map_err(RelayError::SerialWrite)
        })
        .await
        .map_err(RelayError::WriterTask)?
    }

    /// Take the observer slot. Any previous observer is told to close and
    /// its queue sender is dropped; the new observer is installed only after
    /// the previous connection reports it has stopped forwarding.
    pub async fn attach_observer(&self, queue_depth: usize) -> ObserverLease {
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_depth.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();

        let id = {
            let mut shared = self.shared.lock().await;
            let id = shared.next_observer_id;
            shared.next_observer_id += 1;
            id
        };

        let slot = ObserverSlot {
            id,
            outbound: outbound_tx,
            close: close_tx,
            finished: finished_rx,
        };

        // Another connection may attach while we wait; keep draining until
        // the slot is free.
        loop {
            let previous = {
                let mut shared = self.shared.lock().await;
                match shared.observer.take() {
                    Some(previous) => previous,
                    None => {
                        shared.observer = Some(slot);
                        break;
                    }
                }
            };

            info!("🔁 Observer {} replaced by observer {}", previous.id, id);
            let ObserverSlot {
                outbound,
                close,
                finished,
                ..
            } = previous;
            drop(outbound);
            let _ = close.send(());
            let _ = finished.await;
        }

        ObserverLease {
            id,
            outbound: outbound_rx,
            closed: close_rx,
            finished: finished_tx,
        }
    }

    /// Release the slot if it still belongs to observer `id`.
    pub async fn detach_observer(&self, id: u64) -> bool {
        let mut shared = self.shared.lock().await;
        if shared.observer.as_ref().is_some_and(|slot| slot.id == id) {
            shared.observer = None;
            true
        } else {
            false
        }
    }

    /// Best-effort push of one record to the observer. Never waits: a full
    /// queue drops the record.
    pub async fn broadcast(&self, record: &str) -> bool {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;

        let Some(slot) = shared.observer.as_ref() else {
            return false;
        };

        match slot.outbound.try_send(record.to_owned()) {
            Ok(()) => {
                shared.records_broadcast += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                shared.records_dropped += 1;
                warn!("Observer {} is not keeping up, dropped a record", slot.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Observer {} queue closed, releasing slot", slot.id);
                shared.observer = None;
                false
            }
        }
    }

    /// Handle one inbound observer message: act on simulation commands, then
    /// forward the bytes to the payload unchanged, commands included.
    pub async fn handle_message(self: &Arc<Self>, message: &[u8]) -> Option<JoinHandle<()>> {
        info!("📨 Command received: {}", String::from_utf8_lossy(message));

        let run = match SimCommand::parse_bytes(message) {
            Some(command) => self.apply_command(command).await,
            None => None,
        };

        if let Err(e) = self.write_serial(message).await {
            error!("Error sending to serial port: {}", e);
        }

        run
    }

    /// Apply a simulation command. Returns the injector task when the command
    /// started a new run.
    pub async fn apply_command(self: &Arc<Self>, command: SimCommand) -> Option<JoinHandle<()>> {
        let (transition, state) = {
            let mut shared = self.shared.lock().await;
            let transition = shared.sim.apply(command);
            if let Transition::StartRun { .. } = transition {
                shared.last_simulation_error = None;
            }
            (transition, shared.sim)
        };

        match (command, transition) {
            (_, Transition::StartRun { generation }) => {
                info!("▶️  Simulation run {} starting", generation);
                Some(self.spawn_injector(generation))
            }
            (_, Transition::StopRun) => {
                info!("⏹️  Simulation mode stopped");
                None
            }
            (SimCommand::Enable, Transition::Unchanged) => {
                info!("Simulation mode enabled");
                None
            }
            (SimCommand::Activate, Transition::Unchanged) => {
                if state.simulating {
                    info!("Simulation run {} already active, ignoring activate", state.generation);
                } else {
                    warn!("Simulation activate ignored: simulation mode not enabled");
                }
                None
            }
            (SimCommand::Disable, Transition::Unchanged) => {
                debug!("Simulation disable with no active run");
                None
            }
        }
    }

    /// Supervise one injector run. The run itself is a separate task so a
    /// panic ends up here as a join error and still clears the run flag.
    fn spawn_injector(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            let run = tokio::spawn(simulation::run_injector(Arc::clone(&relay), generation));

            let failure = match run.await {
                Ok(Ok(report)) => {
                    info!(
                        "Simulation run {} finished: {} rows sent, {} wraps",
                        report.generation, report.rows_sent, report.wraps
                    );
                    None
                }
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("injector task ended abnormally: {}", e)),
            };

            if let Some(reason) = failure {
                error!("❌ Simulation run {} failed: {}", generation, reason);
                relay.simulation_failed(generation, reason).await;
            }
        })
    }

    /// Record a run that failed. Live ingestion is unaffected.
    pub async fn simulation_failed(&self, generation: u64, reason: String) {
        let mut shared = self.shared.lock().await;
        if shared.sim.generation == generation {
            shared.sim.simulating = false;
        }
        shared.last_simulation_error = Some(reason);
    }

    pub async fn is_run_current(&self, generation: u64) -> bool {
        self.shared.lock().await.sim.is_current(generation)
    }

    pub async fn sim_state(&self) -> SimState {
        self.shared.lock().await.sim
    }

    pub async fn status(&self) -> RelayStatus {
        let shared = self.shared.lock().await;
        RelayStatus {
            enabled: shared.sim.enabled,
            simulating: shared.sim.simulating,
            observer_connected: shared.observer.is_some(),
            simulation_runs: shared.sim.generation,
            last_simulation_error: shared.last_simulation_error.clone(),
            records_broadcast: shared.records_broadcast,
            records_dropped: shared.records_dropped,
        }
    }
}
