use crate::observer::ObserverSettings;
use crate::serial::SerialSettings;
use crate::simulation::SimulationSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_LOG_PATH: &str = "Flight_2078.csv";
pub const SERIAL_CHANNEL_DEPTH: usize = 32;

/// Everything the relay needs at startup. Defaults match the ground station
/// layout used at the launch site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub serial: SerialSettings,
    pub observer: ObserverSettings,
    pub simulation: SimulationSettings,
    pub log_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            observer: ObserverSettings::default(),
            simulation: SimulationSettings::default(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_matches_ground_station_layout() {
        let config = RelayConfig::default();

        assert_eq!(config.serial.port, "COM5");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.observer.bind_addr, "127.0.0.1:2078");
        assert_eq!(config.observer.path, "/ws");
        assert_eq!(config.simulation.interval, Duration::from_secs(1));
        assert_eq!(config.log_path, PathBuf::from("Flight_2078.csv"));
    }

    #[test]
    fn test_config_serializes_to_json() {
        let json = serde_json::to_value(RelayConfig::default()).unwrap();
        assert_eq!(json["serial"]["baud_rate"], 9600);
        assert_eq!(json["observer"]["queue_depth"], 64);
    }
}
