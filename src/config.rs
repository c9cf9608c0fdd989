//! Simulation configuration constants (spec.md §6), loaded from a TOML file the
//! way `control::config::ControlConfig` loads its TOML config in the teacher repo.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },
}

/// Selects which of the eight pluggable routing protocols (§4.7) a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingProtocolKind {
    Gpsr,
    Dsdv,
    Grad,
    Opar,
    Parrot,
    QRouting,
    QGeo,
    Qldv,
}

/// All microsecond/meter/SI constants named in spec.md §6, grouped by the world
/// they govern. Flat (not nested) so the TOML file reads as one parameter list,
/// matching the teacher's `RadioModuleConfig` flat-struct convention.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    // World
    pub map_length: f64,
    pub map_width: f64,
    pub map_height: f64,
    pub sim_time: u64,
    pub number_of_drones: u32,
    pub static_case: bool,

    // Radio / PHY
    pub transmitting_power: f64,
    pub light_speed: f64,
    pub carrier_frequency: f64,
    pub noise_power: f64,
    pub snr_threshold_db: f64,
    pub path_loss_exponent: f64,
    pub bit_rate: f64,
    pub bandwidth: f64,
    pub sensing_range: f64,

    // Packets
    pub packet_lifetime: u64,
    pub max_ttl: u8,
    pub data_header_bits: u32,
    pub data_payload_bits: u32,
    pub ack_header_bits: u32,
    pub hello_header_bits: u32,
    pub max_queue_size: usize,

    // MAC
    /// `true` selects CSMA/CA (default); `false` selects Pure ALOHA (§4.5).
    pub use_csma_ca: bool,
    pub slot_duration: u64,
    pub sifs_duration: u64,
    pub cw_min: u32,
    pub cw_max: u32,
    pub ack_timeout: u64,
    pub max_retransmission_attempt: u32,

    // Energy
    pub hover_power_watts: f64,
    pub drag_coefficient: f64,
    pub initial_energy: f64,
    pub energy_threshold: f64,

    // Routing
    pub routing_protocol: RoutingProtocolKind,
    pub hello_interval: u64,
    pub hello_jitter: u64,
    pub route_entry_lifetime: u64,

    // Traffic & mobility cadence
    /// Mean Poisson inter-arrival time for `generate_data_packet` (§4.6).
    pub mean_interarrival_micros: u64,
    /// Cadence of the independent mobility/energy-debit tick (§5: "mobility
    /// updates are scheduled at fixed intervals independent of node
    /// activities").
    pub mobility_tick_micros: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }

    /// `DIFS = SIFS + 2*SLOT` per spec.md §6.
    pub fn difs_duration(&self) -> u64 {
        self.sifs_duration + 2 * self.slot_duration
    }

    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        Config {
            map_length: 2000.0,
            map_width: 2000.0,
            map_height: 150.0,
            sim_time: 60_000_000,
            number_of_drones: 10,
            static_case: false,
            use_csma_ca: true,
            transmitting_power: 0.1,
            light_speed: 299_792_458.0,
            carrier_frequency: 2.4e9,
            noise_power: 1e-13,
            snr_threshold_db: -2.0,
            path_loss_exponent: 2.0,
            bit_rate: 11_000_000.0,
            bandwidth: 22_000_000.0,
            sensing_range: 500.0,
            packet_lifetime: 2_000_000,
            max_ttl: 32,
            data_header_bits: 200,
            data_payload_bits: 1000,
            ack_header_bits: 100,
            hello_header_bits: 150,
            max_queue_size: 64,
            slot_duration: 20,
            sifs_duration: 10,
            cw_min: 15,
            cw_max: 1023,
            ack_timeout: 2000,
            max_retransmission_attempt: 5,
            hover_power_watts: 100.0,
            drag_coefficient: 0.5,
            initial_energy: 100_000.0,
            energy_threshold: 500.0,
            routing_protocol: RoutingProtocolKind::Gpsr,
            hello_interval: 1_000_000,
            hello_jitter: 100_000,
            route_entry_lifetime: 5_000_000,
            mean_interarrival_micros: 500_000,
            mobility_tick_micros: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difs_is_sifs_plus_two_slots() {
        let cfg = Config::default_for_tests();
        assert_eq!(cfg.difs_duration(), cfg.sifs_duration + 2 * cfg.slot_duration);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
