use serde::{Deserialize, Serialize};

pub const SIM_ENABLE: &str = "CMD,2078,SIM,EN,GOAT";
pub const SIM_ACTIVATE: &str = "CMD,2078,SIM,AC,GOAT";
pub const SIM_DISABLE: &str = "CMD,2078,SIM,DS,GOAT";

/// Observer commands the relay acts on itself. Everything else is opaque
/// and only forwarded to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimCommand {
    Enable,
    Activate,
    Disable,
}

impl SimCommand {
    /// Exact match only; no trimming, no case folding.
    pub fn parse(message: &str) -> Option<Self> {
        match message {
            SIM_ENABLE => Some(SimCommand::Enable),
            SIM_ACTIVATE => Some(SimCommand::Activate),
            SIM_DISABLE => Some(SimCommand::Disable),
            _ => None,
        }
    }

    pub fn parse_bytes(message: &[u8]) -> Option<Self> {
        core::str::from_utf8(message).ok().and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimCommand::Enable => SIM_ENABLE,
            SimCommand::Activate => SIM_ACTIVATE,
            SimCommand::Disable => SIM_DISABLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimMode {
    Idle,
    Armed,
    Simulating,
}

/// Simulation flags. `generation` identifies the current injector run so a
/// stale run can tell it has been superseded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimState {
    pub enabled: bool,
    pub simulating: bool,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start a new injector run tagged with this generation.
    StartRun { generation: u64 },
    /// Ask the running injector to stop at its next tick.
    StopRun,
    Unchanged,
}

impl SimState {
    pub fn mode(&self) -> SimMode {
        match (self.enabled, self.simulating) {
            (_, true) => SimMode::Simulating,
            (true, false) => SimMode::Armed,
            (false, false) => SimMode::Idle,
        }
    }

    pub fn apply(&mut self, command: SimCommand) -> Transition {
        match command {
            SimCommand::Enable => {
                self.enabled = true;
                Transition::Unchanged
            }
            SimCommand::Activate => {
                if !self.enabled || self.simulating {
                    return Transition::Unchanged;
                }
                self.simulating = true;
                self.generation = self.generation.wrapping_add(1);
                Transition::StartRun { generation: self.generation }
            }
            SimCommand::Disable => {
                if !self.simulating {
                    return Transition::Unchanged;
                }
                self.simulating = false;
                Transition::StopRun
            }
        }
    }

    /// Whether the injector run tagged `generation` should keep going.
    pub fn is_current(&self, generation: u64) -> bool {
        self.simulating && self.generation == generation
    }
}
