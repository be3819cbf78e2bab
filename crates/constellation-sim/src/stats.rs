//! Traffic accounting and the run report

use crate::Result;
use beam_routing::{NoRouteReason, ProtocolKind};
use chrono::{DateTime, Utc};
use orbital_glaf::TopologyStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Why a packet left the network without reaching its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoRoute(NoRouteReason),
    TtlExpired,
    NoRoutingProtocol,
    /// The channel delivered the frame to nobody.
    LinkDown,
    MalformedFrame,
    /// Serialization time at the link's data rate overflows.
    TxTimeOverflow,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NoRoute(reason) => write!(f, "no_route:{}", reason),
            DropReason::TtlExpired => f.write_str("ttl_expired"),
            DropReason::NoRoutingProtocol => f.write_str("no_routing_protocol"),
            DropReason::LinkDown => f.write_str("link_down"),
            DropReason::MalformedFrame => f.write_str("malformed_frame"),
            DropReason::TxTimeOverflow => f.write_str("tx_time_overflow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub packet_id: u64,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub sent_at_s: f64,
    pub delivered_at_s: f64,
    pub latency_ms: f64,
    pub hops: usize,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropRecord {
    pub packet_id: u64,
    pub at_s: f64,
    pub node: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficStats {
    pub sent: u64,
    pub delivered: u64,
    pub deliveries: Vec<DeliveryRecord>,
    pub drops: Vec<DropRecord>,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_delivery(&mut self, record: DeliveryRecord) {
        self.delivered += 1;
        self.deliveries.push(record);
    }

    pub fn record_drop(&mut self, record: DropRecord) {
        self.drops.push(record);
    }

    pub fn dropped(&self) -> u64 {
        self.drops.len() as u64
    }

    pub fn drops_by_reason(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for drop in &self.drops {
            *counts.entry(drop.reason.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn delivery_ratio(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.sent as f64
    }

    pub fn mean_latency_ms(&self) -> Option<f64> {
        if self.deliveries.is_empty() {
            return None;
        }
        let total: f64 = self.deliveries.iter().map(|d| d.latency_ms).sum();
        Some(total / self.deliveries.len() as f64)
    }

    pub fn max_latency_ms(&self) -> Option<f64> {
        self.deliveries.iter().map(|d| d.latency_ms).reduce(f64::max)
    }

    pub fn mean_hops(&self) -> Option<f64> {
        if self.deliveries.is_empty() {
            return None;
        }
        let total: usize = self.deliveries.iter().map(|d| d.hops).sum();
        Some(total as f64 / self.deliveries.len() as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSummary {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub delivery_ratio: f64,
    pub mean_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub mean_hops: Option<f64>,
    pub drops_by_reason: BTreeMap<String, u64>,
}

impl From<&TrafficStats> for TrafficSummary {
    fn from(stats: &TrafficStats) -> Self {
        Self {
            sent: stats.sent,
            delivered: stats.delivered,
            dropped: stats.dropped(),
            delivery_ratio: stats.delivery_ratio(),
            mean_latency_ms: stats.mean_latency_ms(),
            max_latency_ms: stats.max_latency_ms(),
            mean_hops: stats.mean_hops(),
            drops_by_reason: stats.drops_by_reason(),
        }
    }
}

/// Everything a run produced, written as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub protocol: ProtocolKind,
    pub duration_s: f64,
    pub topology: TopologyStats,
    pub summary: TrafficSummary,
    pub deliveries: Vec<DeliveryRecord>,
    pub drops: Vec<DropRecord>,
}

impl RunReport {
    pub fn new(protocol: ProtocolKind, duration: Duration, topology: TopologyStats, stats: &TrafficStats) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            protocol,
            duration_s: duration.as_secs_f64(),
            topology,
            summary: TrafficSummary::from(stats),
            deliveries: stats.deliveries.clone(),
            drops: stats.drops.clone(),
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
