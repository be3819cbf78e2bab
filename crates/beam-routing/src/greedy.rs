//! Hybrid greedy/ring router
//!
//! Each epoch rebuilds a bounded active neighbor set from the node's
//! physical inter-satellite links:
//!
//! 1. Ring neighbors (previous/next slot in the node's own plane) are always
//!    admitted when linked, whatever their distance.
//! 2. Remaining linked satellites are admitted nearest first until the set
//!    holds `max_neighbors` entries.
//!
//! Forwarding picks the active neighbor closest to the destination, as long
//! as it is strictly closer than this node. When no neighbor makes progress
//! a random active neighbor is used so packets do not stall at a local
//! minimum; the TTL bounds the resulting walk.

use crate::{
    NoRouteReason, PacketHeader, ProtocolKind, Result, Route, RoutingConfig, RoutingContext,
    RoutingError, RoutingProtocol,
};
use orbital_glaf::{InterfaceId, Neighbor, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, warn};

/// An admitted neighbor and the link used to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborRecord {
    pub peer: NodeId,
    /// Local outgoing interface.
    pub interface: InterfaceId,
    pub peer_interface: InterfaceId,
}

impl From<&Neighbor> for NeighborRecord {
    fn from(neighbor: &Neighbor) -> Self {
        Self {
            peer: neighbor.peer,
            interface: neighbor.local,
            peer_interface: neighbor.remote,
        }
    }
}

#[derive(Debug)]
pub struct HybridGreedyRouter {
    node: NodeId,
    update_interval: Duration,
    start_delay: Duration,
    max_neighbors: usize,
    active: Vec<NeighborRecord>,
    rng: StdRng,
    epochs: u64,
}

impl HybridGreedyRouter {
    pub fn new(node: NodeId, config: &RoutingConfig) -> Self {
        // Distinct, reproducible stream per node
        let seed = config.seed ^ u64::from(node.0).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            node,
            update_interval: config.update_interval,
            start_delay: config.start_delay,
            max_neighbors: config.max_neighbors,
            active: Vec::with_capacity(config.max_neighbors),
            rng: StdRng::seed_from_u64(seed),
            epochs: 0,
        }
    }

    pub fn active_neighbors(&self) -> &[NeighborRecord] {
        &self.active
    }

    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    fn select_neighbors(&self, ctx: &RoutingContext<'_>) -> Vec<NeighborRecord> {
        let topology = ctx.topology;
        let candidates: Vec<Neighbor> = topology
            .neighbors(self.node)
            .into_iter()
            .filter(|n| topology.is_satellite(n.peer))
            .collect();

        let mut active: Vec<NeighborRecord> = Vec::with_capacity(self.max_neighbors);
        let admitted = |set: &[NeighborRecord], peer: NodeId| set.iter().any(|r| r.peer == peer);

        match topology.ring_neighbors(self.node) {
            Some((prev, next)) => {
                for neighbor in &candidates {
                    if (neighbor.peer == prev || neighbor.peer == next)
                        && !admitted(&active, neighbor.peer)
                    {
                        active.push(neighbor.into());
                    }
                }
            }
            None if topology.is_satellite(self.node) => {
                warn!("{} has no orbital plane ring; no neighbors forced", self.node);
            }
            None => {}
        }

        let mut ranked: Vec<(f64, &Neighbor)> = candidates
            .iter()
            .filter(|n| !admitted(&active, n.peer))
            .filter_map(|n| Some((ctx.distance(self.node, n.peer)?, n)))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (_, neighbor) in ranked {
            if active.len() >= self.max_neighbors {
                break;
            }
            if !admitted(&active, neighbor.peer) {
                active.push(neighbor.into());
            }
        }
        active
    }
}

impl RoutingProtocol for HybridGreedyRouter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Greedy
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    fn start_delay(&self, _ctx: &RoutingContext<'_>) -> Option<Duration> {
        Some(self.start_delay)
    }

    fn update(&mut self, ctx: &RoutingContext<'_>) {
        self.active = self.select_neighbors(ctx);
        self.epochs += 1;
        debug!(
            "{} epoch {} at {:.3}s: {} active neighbors",
            self.node,
            self.epochs,
            ctx.now_s(),
            self.active.len()
        );
    }

    fn route_output(&mut self, ctx: &RoutingContext<'_>, header: &PacketHeader) -> Result<Route> {
        let destination = header.destination;
        let no_route = |reason| RoutingError::no_route(destination, reason);

        if !ctx.registry.is_populated() {
            return Err(no_route(NoRouteReason::Uninitialized));
        }
        let target = ctx
            .registry
            .resolve(destination)
            .ok_or_else(|| no_route(NoRouteReason::UnknownDestination))?;
        if target == self.node {
            return Err(no_route(NoRouteReason::LocalDestination));
        }

        // Ground stations are never in the active set, so the last hop goes
        // straight over the downlink when one exists.
        if ctx.topology.is_ground_station(target) {
            if let Some(link) = ctx.topology.link_between(self.node, target) {
                return ctx.route_via(header, link.local, link.remote, target, true);
            }
        }

        let t = ctx.now_s();
        let target_position = ctx
            .topology
            .position(target, t)
            .ok_or_else(|| no_route(NoRouteReason::UnknownDestination))?;
        let own_distance = ctx
            .topology
            .position(self.node, t)
            .map_or(f64::INFINITY, |p| (p - target_position).norm());

        let mut best: Option<&NeighborRecord> = None;
        let mut best_distance = own_distance;
        for record in &self.active {
            let Some(position) = ctx.topology.position(record.peer, t) else {
                continue;
            };
            let distance = (position - target_position).norm();
            if distance < best_distance {
                best_distance = distance;
                best = Some(record);
            }
        }

        let chosen = match best {
            Some(record) => *record,
            None if self.active.is_empty() => {
                warn!("{} has no active neighbors toward {}", self.node, destination);
                return Err(no_route(NoRouteReason::NoActiveNeighbors));
            }
            None => {
                let pick = self.rng.gen_range(0..self.active.len());
                debug!(
                    "{} made no progress toward {}, falling back to random neighbor {}",
                    self.node, destination, self.active[pick].peer
                );
                self.active[pick]
            }
        };

        ctx.route_via(header, chosen.interface, chosen.peer_interface, chosen.peer, true)
    }

    fn routing_table(&self, ctx: &RoutingContext<'_>) -> String {
        let mut out = format!(
            "{} [greedy] {} active neighbors at {:.3}s\n",
            self.node,
            self.active.len(),
            ctx.now_s()
        );
        for record in &self.active {
            let distance_km = ctx.distance(self.node, record.peer).unwrap_or(f64::NAN) / 1000.0;
            let _ = writeln!(
                out,
                "  {:<10} via {:<6} {:>10.1} km",
                record.peer.to_string(),
                record.interface.to_string(),
                distance_km
            );
        }
        out
    }
}
