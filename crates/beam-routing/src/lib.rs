//! Beam Routing Library
//!
//! Per-node routing protocols for the constellation mesh. Two protocols share
//! one interface:
//!
//! - `HybridGreedyRouter`: keeps a small active neighbor set (ring neighbors
//!   plus the nearest linked satellites) and forwards to whichever neighbor
//!   is geometrically closest to the destination
//! - `ShortestPathRouter`: runs Dijkstra over the global inter-satellite
//!   graph weighted by live distances and forwards from a table
//!
//! Both recompute periodically; between epochs their state may be up to one
//! update interval stale.

use orbital_glaf::{AddressRegistry, GlobalGraph, InterfaceId, NodeId, Topology};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod greedy;
pub mod shortest_path;

pub use greedy::{HybridGreedyRouter, NeighborRecord};
pub use shortest_path::{RouteEntry, ShortestPathRouter};

/// Why a packet could not be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoRouteReason {
    /// Registry, graph or table not set up yet.
    Uninitialized,
    UnknownDestination,
    LocalDestination,
    NoActiveNeighbors,
    NoSatelliteLink,
    NoGroundLink,
    Unreachable,
    /// The chosen link has no address to use as gateway.
    Unaddressed,
}

impl fmt::Display for NoRouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoRouteReason::Uninitialized => "uninitialized",
            NoRouteReason::UnknownDestination => "unknown_destination",
            NoRouteReason::LocalDestination => "local_destination",
            NoRouteReason::NoActiveNeighbors => "no_active_neighbors",
            NoRouteReason::NoSatelliteLink => "no_satellite_link",
            NoRouteReason::NoGroundLink => "no_ground_link",
            NoRouteReason::Unreachable => "unreachable",
            NoRouteReason::Unaddressed => "unaddressed",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("No route to {destination}: {reason}")]
    NoRoute {
        destination: Ipv4Addr,
        reason: NoRouteReason,
    },
}

impl RoutingError {
    pub fn no_route(destination: Ipv4Addr, reason: NoRouteReason) -> Self {
        RoutingError::NoRoute {
            destination,
            reason,
        }
    }

    pub fn reason(&self) -> NoRouteReason {
        match self {
            RoutingError::NoRoute { reason, .. } => *reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Setup mistakes. These are fatal for the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Node {node} already runs the {existing} protocol")]
    ProtocolAlreadyInstalled { node: NodeId, existing: ProtocolKind },
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("max_neighbors must be at least 2, got {0}")]
    InvalidMaxNeighbors(usize),
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

// ============================================================================
// Protocol selection and tunables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    #[default]
    Greedy,
    ShortestPath,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Greedy => f.write_str("greedy"),
            ProtocolKind::ShortestPath => f.write_str("shortest-path"),
        }
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(ProtocolKind::Greedy),
            "shortest-path" | "sp" => Ok(ProtocolKind::ShortestPath),
            other => Err(format!("unknown routing protocol: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    pub update_interval: Duration,
    pub start_delay: Duration,
    /// Upper bound of a random extra delay added per node to `start_delay`.
    pub start_jitter: Duration,
    pub max_neighbors: usize,
    /// Seed for the greedy router's anti-stall choice and start jitter.
    pub seed: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(1),
            start_delay: Duration::from_millis(100),
            start_jitter: Duration::ZERO,
            max_neighbors: 6,
            seed: 0,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.update_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "update interval must be positive".into(),
            ));
        }
        if self.max_neighbors < 2 {
            return Err(ConfigError::InvalidMaxNeighbors(self.max_neighbors));
        }
        Ok(())
    }
}

// ============================================================================
// Packets and routes
// ============================================================================

/// Pre-parsed network header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
}

impl PacketHeader {
    pub const DEFAULT_TTL: u8 = 64;
    pub const PROTOCOL_UDP: u8 = 17;

    pub fn new(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Self {
            source,
            destination,
            ttl: Self::DEFAULT_TTL,
            protocol: Self::PROTOCOL_UDP,
        }
    }
}

/// A forwarding decision for one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Addr,
    pub source: Ipv4Addr,
    /// Next hop's address on the outgoing link.
    pub gateway: Ipv4Addr,
    pub interface: InterfaceId,
    pub next_hop: NodeId,
}

/// Outcome of handling an incoming packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Deliver { interface: InterfaceId },
    Forward(Route),
}

/// Read-only view of the shared run state handed to routers.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext<'a> {
    pub now: Duration,
    pub topology: &'a Topology,
    pub registry: &'a AddressRegistry,
    pub graph: &'a GlobalGraph,
}

impl<'a> RoutingContext<'a> {
    pub fn new(
        now: Duration,
        topology: &'a Topology,
        registry: &'a AddressRegistry,
        graph: &'a GlobalGraph,
    ) -> Self {
        Self {
            now,
            topology,
            registry,
            graph,
        }
    }

    pub fn now_s(&self) -> f64 {
        self.now.as_secs_f64()
    }

    pub fn distance(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.topology.distance(a, b, self.now_s())
    }

    /// Builds a route over the direct link `local` -> `remote`.
    ///
    /// With `preserve_source` the header's source is kept unless it is
    /// unspecified; otherwise the outgoing interface's address is used.
    pub fn route_via(
        &self,
        header: &PacketHeader,
        local: InterfaceId,
        remote: InterfaceId,
        next_hop: NodeId,
        preserve_source: bool,
    ) -> Result<Route> {
        let gateway = self
            .topology
            .interface(remote)
            .and_then(|i| i.address)
            .ok_or_else(|| RoutingError::no_route(header.destination, NoRouteReason::Unaddressed))?;
        let outgoing = self.topology.interface(local).and_then(|i| i.address);

        let source = if preserve_source && !header.source.is_unspecified() {
            header.source
        } else {
            outgoing.unwrap_or(header.source)
        };

        Ok(Route {
            destination: header.destination,
            source,
            gateway,
            interface: local,
            next_hop,
        })
    }
}

// ============================================================================
// Protocol interface
// ============================================================================

/// Entry points the network layer calls on the router installed on a node.
pub trait RoutingProtocol: fmt::Debug {
    fn kind(&self) -> ProtocolKind;

    fn node(&self) -> NodeId;

    fn update_interval(&self) -> Duration;

    /// Delay before the first epoch, or `None` if this node never recomputes.
    fn start_delay(&self, ctx: &RoutingContext<'_>) -> Option<Duration>;

    /// One epoch: replace the neighbor set or table from the live topology.
    fn update(&mut self, ctx: &RoutingContext<'_>);

    fn route_output(&mut self, ctx: &RoutingContext<'_>, header: &PacketHeader) -> Result<Route>;

    fn route_input(
        &mut self,
        ctx: &RoutingContext<'_>,
        header: &PacketHeader,
        in_interface: InterfaceId,
    ) -> Result<InputAction> {
        if ctx.topology.owns_address(self.node(), header.destination) {
            return Ok(InputAction::Deliver {
                interface: in_interface,
            });
        }
        self.route_output(ctx, header).map(InputAction::Forward)
    }

    /// Human-readable dump of the current neighbor set or table.
    fn routing_table(&self, ctx: &RoutingContext<'_>) -> String;
}

pub fn create_router(kind: ProtocolKind, node: NodeId, config: &RoutingConfig) -> Box<dyn RoutingProtocol> {
    match kind {
        ProtocolKind::Greedy => Box::new(HybridGreedyRouter::new(node, config)),
        ProtocolKind::ShortestPath => Box::new(ShortestPathRouter::new(node, config)),
    }
}
