//! Constellation Simulator
//!
//! Runs packet traffic over a LEO constellation on a discrete-event
//! timeline:
//!
//! - `scheduler`: the event queue every action runs on
//! - `network`: the forwarding engine moving packets hop by hop over the
//!   topology's channels, driven by one router per node
//! - `config` / `scenario`: JSON scenarios and the setup sequence
//! - `stats`: delivery and drop accounting, the run report

use beam_routing::ConfigError;
use orbital_glaf::{GlafError, NodeId};
use thiserror::Error;

pub mod config;
pub mod network;
pub mod packet;
pub mod scenario;
pub mod scheduler;
pub mod stats;

pub use config::{LinkConfig, ScenarioConfig, ScenarioError};
pub use network::{Network, SimEvent};
pub use packet::{Frame, Packet};
pub use scenario::Scenario;
pub use scheduler::{EventId, Scheduled, Simulator};
pub use stats::{DeliveryRecord, DropReason, DropRecord, RunReport, TrafficStats};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Routing configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Topology error: {0}")]
    Topology(#[from] GlafError),
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
