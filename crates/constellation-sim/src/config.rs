//! Scenario configuration
//!
//! A scenario is one JSON document. Every field has a default, so `{}` is
//! the 32-satellite demo shell with two ground stations exchanging traffic.

use beam_routing::{ConfigError, ProtocolKind, RoutingConfig};
use link_channel::FreeSpaceLoss;
use orbital_glaf::builder::{GroundLinkPolicy, IslPattern};
use orbital_mechanics::walker::WalkerDelta;
use orbital_mechanics::OrbitalError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid constellation: {0}")]
    Constellation(#[from] OrbitalError),
    #[error("Invalid routing configuration: {0}")]
    Routing(#[from] ConfigError),
    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Duplicate ground station name: {0}")]
    DuplicateStation(String),
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ScenarioError {
    ScenarioError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ScenarioError> {
    Duration::try_from_secs_f64(value).map_err(|_| invalid(field, format!("{} is not a valid duration", value)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl GroundStationConfig {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    pub protocol: ProtocolKind,
    pub update_interval_s: f64,
    pub start_delay_s: f64,
    pub start_jitter_s: f64,
    pub max_neighbors: usize,
    pub seed: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        let defaults = RoutingConfig::default();
        Self {
            protocol: ProtocolKind::default(),
            update_interval_s: defaults.update_interval.as_secs_f64(),
            start_delay_s: defaults.start_delay.as_secs_f64(),
            start_jitter_s: defaults.start_jitter.as_secs_f64(),
            max_neighbors: defaults.max_neighbors,
            seed: defaults.seed,
        }
    }
}

impl RoutingSettings {
    pub fn to_routing_config(&self) -> Result<RoutingConfig, ScenarioError> {
        let config = RoutingConfig {
            update_interval: seconds("routing.update_interval_s", self.update_interval_s)?,
            start_delay: seconds("routing.start_delay_s", self.start_delay_s)?,
            start_jitter: seconds("routing.start_jitter_s", self.start_jitter_s)?,
            max_neighbors: self.max_neighbors,
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Transmit parameters shared by every link of a kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub tx_power_dbm: f64,
    /// `None` disables serialization delay on inter-satellite links.
    pub isl_data_rate_bps: Option<f64>,
    pub ground_data_rate_bps: Option<f64>,
    /// Carrier for free-space loss on ground links; `None` for lossless.
    pub ground_frequency_hz: Option<f64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: 30.0,
            isl_data_rate_bps: Some(100e9),
            ground_data_rate_bps: Some(10e9),
            ground_frequency_hz: Some(FreeSpaceLoss::KA_BAND_HZ),
        }
    }
}

impl LinkConfig {
    /// Slowest data rate accepted for a link.
    pub const MIN_DATA_RATE_BPS: f64 = 1.0;

    /// Propagation delay only: no serialization, no loss.
    pub fn ideal() -> Self {
        Self {
            tx_power_dbm: 30.0,
            isl_data_rate_bps: None,
            ground_data_rate_bps: None,
            ground_frequency_hz: None,
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !self.tx_power_dbm.is_finite() {
            return Err(invalid("link.tx_power_dbm", "must be finite"));
        }
        let rates = [
            ("link.isl_data_rate_bps", self.isl_data_rate_bps),
            ("link.ground_data_rate_bps", self.ground_data_rate_bps),
        ];
        for (field, value) in rates {
            if let Some(v) = value {
                if !(v.is_finite() && v >= Self::MIN_DATA_RATE_BPS) {
                    return Err(invalid(
                        field,
                        format!("{} must be at least {} bps", v, Self::MIN_DATA_RATE_BPS),
                    ));
                }
            }
        }
        if let Some(v) = self.ground_frequency_hz {
            if !(v.is_finite() && v > 0.0) {
                return Err(invalid("link.ground_frequency_hz", format!("{} must be positive", v)));
            }
        }
        Ok(())
    }
}

/// `count` packets from one named node to another, every `interval_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficFlow {
    pub from: String,
    pub to: String,
    #[serde(default = "TrafficFlow::default_start")]
    pub start_s: f64,
    #[serde(default = "TrafficFlow::default_interval")]
    pub interval_s: f64,
    #[serde(default = "TrafficFlow::default_count")]
    pub count: u32,
    #[serde(default = "TrafficFlow::default_size")]
    pub size_bytes: usize,
}

impl TrafficFlow {
    fn default_start() -> f64 {
        1.0
    }

    fn default_interval() -> f64 {
        1.0
    }

    fn default_count() -> u32 {
        10
    }

    fn default_size() -> usize {
        1024
    }

    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            start_s: Self::default_start(),
            interval_s: Self::default_interval(),
            count: Self::default_count(),
            size_bytes: Self::default_size(),
        }
    }

    /// Origination times of every packet in the flow.
    pub fn send_times(&self) -> Result<Vec<Duration>, ScenarioError> {
        let start = seconds("traffic.start_s", self.start_s)?;
        let interval = seconds("traffic.interval_s", self.interval_s)?;
        (0..self.count)
            .map(|i| {
                interval
                    .checked_mul(i)
                    .and_then(|offset| start.checked_add(offset))
                    .ok_or_else(|| invalid("traffic.interval_s", format!("send time of packet {} overflows", i)))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    pub constellation: WalkerDelta,
    pub isl_pattern: IslPattern,
    pub ground_stations: Vec<GroundStationConfig>,
    pub ground_links: GroundLinkPolicy,
    pub routing: RoutingSettings,
    pub link: LinkConfig,
    pub traffic: Vec<TrafficFlow>,
    pub duration_s: f64,
    pub address_base: Ipv4Addr,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "demo".into(),
            constellation: WalkerDelta::demo_shell(),
            isl_pattern: IslPattern::Grid,
            ground_stations: vec![
                GroundStationConfig::new("gs-london", 51.5074, -0.1278),
                GroundStationConfig::new("gs-singapore", 1.3521, 103.8198),
            ],
            ground_links: GroundLinkPolicy::Nearest { count: 2 },
            routing: RoutingSettings::default(),
            link: LinkConfig::default(),
            traffic: vec![TrafficFlow::new("gs-london", "gs-singapore")],
            duration_s: 30.0,
            address_base: Ipv4Addr::new(10, 0, 0, 0),
        }
    }
}

impl ScenarioConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        info!("Loading scenario from {:?}", path);
        let file = File::open(path)?;
        let config: ScenarioConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn duration(&self) -> Result<Duration, ScenarioError> {
        if self.duration_s <= 0.0 {
            return Err(invalid("duration_s", "must be positive"));
        }
        seconds("duration_s", self.duration_s)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.constellation.validate()?;
        self.routing.to_routing_config()?;
        self.link.validate()?;
        self.duration()?;

        let mut names = HashSet::new();
        for station in &self.ground_stations {
            if !(-90.0..=90.0).contains(&station.latitude) || !(-180.0..=180.0).contains(&station.longitude) {
                return Err(invalid(
                    format!("ground_stations.{}", station.name),
                    format!("({}, {}) is not a valid coordinate", station.latitude, station.longitude),
                ));
            }
            if !names.insert(station.name.as_str()) {
                return Err(ScenarioError::DuplicateStation(station.name.clone()));
            }
        }

        if let GroundLinkPolicy::Nearest { count: 0 } = self.ground_links {
            return Err(invalid("ground_links.count", "must be at least 1"));
        }

        for flow in &self.traffic {
            if flow.from == flow.to {
                return Err(invalid("traffic", format!("{} sends to itself", flow.from)));
            }
            if flow.size_bytes == 0 {
                return Err(invalid("traffic.size_bytes", "must be positive"));
            }
            if flow.count > 1 && flow.interval_s <= 0.0 {
                return Err(invalid("traffic.interval_s", "must be positive"));
            }
            flow.send_times()?;
        }
        Ok(())
    }
}
