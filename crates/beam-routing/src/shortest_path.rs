//! Global shortest-path router
//!
//! Every satellite runs Dijkstra over the shared inter-satellite graph once
//! per epoch, weighting each edge with the distance between its endpoints at
//! recomputation time, and keeps only the first hop toward each destination.
//! Ground stations hold no table: they hand packets to the nearest linked
//! satellite, and the satellite nearest to a destination ground station
//! delivers over its downlink.

use crate::{
    NoRouteReason, PacketHeader, ProtocolKind, Result, Route, RoutingConfig, RoutingContext,
    RoutingError, RoutingProtocol,
};
use orbital_glaf::{GlobalGraph, InterfaceId, NodeId, Topology};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, warn};

/// First hop and total cost toward one destination satellite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEntry {
    pub next_hop: NodeId,
    pub interface: InterfaceId,
    pub cost_m: f64,
}

/// Cost and first hop of the cheapest path found from the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathCost {
    pub first_hop: NodeId,
    pub cost_m: f64,
}

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    cost: f64,
    index: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    // Reversed so the max-heap pops the cheapest entry
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra from `source` over `graph`, edges weighted by live distance at `t_s`.
///
/// Returns the first hop and cost for every reachable member other than the
/// source. A source outside the graph reaches nothing.
pub fn shortest_paths(
    graph: &GlobalGraph,
    topology: &Topology,
    source: NodeId,
    t_s: f64,
) -> BTreeMap<NodeId, PathCost> {
    let mut result = BTreeMap::new();
    let Some(src) = graph.index_of(source) else {
        return result;
    };

    let n = graph.len();
    let positions: Vec<_> = (0..n)
        .map(|i| graph.node_at(i).and_then(|node| topology.position(node, t_s)))
        .collect();
    let mut dist = vec![f64::INFINITY; n];
    let mut first: Vec<Option<usize>> = vec![None; n];
    let mut heap = BinaryHeap::new();

    dist[src] = 0.0;
    heap.push(QueueEntry { cost: 0.0, index: src });

    while let Some(QueueEntry { cost, index: u }) = heap.pop() {
        if cost > dist[u] {
            continue;
        }
        let Some(from) = positions[u] else {
            continue;
        };
        for v in graph.neighbor_indices(u) {
            let Some(to) = positions[v] else {
                continue;
            };
            let candidate = cost + (from - to).norm();
            if candidate < dist[v] {
                dist[v] = candidate;
                first[v] = if u == src { Some(v) } else { first[u] };
                heap.push(QueueEntry {
                    cost: candidate,
                    index: v,
                });
            }
        }
    }

    for v in 0..n {
        let (Some(hop), Some(node)) = (first[v], graph.node_at(v)) else {
            continue;
        };
        if let Some(first_hop) = graph.node_at(hop) {
            result.insert(
                node,
                PathCost {
                    first_hop,
                    cost_m: dist[v],
                },
            );
        }
    }
    result
}

#[derive(Debug)]
pub struct ShortestPathRouter {
    node: NodeId,
    update_interval: Duration,
    start_delay: Duration,
    table: BTreeMap<NodeId, RouteEntry>,
    computed: bool,
    epochs: u64,
}

impl ShortestPathRouter {
    pub fn new(node: NodeId, config: &RoutingConfig) -> Self {
        Self {
            node,
            update_interval: config.update_interval,
            start_delay: config.start_delay,
            table: BTreeMap::new(),
            computed: false,
            epochs: 0,
        }
    }

    pub fn table(&self) -> &BTreeMap<NodeId, RouteEntry> {
        &self.table
    }

    pub fn lookup(&self, destination: NodeId) -> Option<&RouteEntry> {
        self.table.get(&destination)
    }

    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    fn forward_to(
        &self,
        ctx: &RoutingContext<'_>,
        header: &PacketHeader,
        satellite: NodeId,
    ) -> Result<Route> {
        let entry = self
            .table
            .get(&satellite)
            .ok_or_else(|| RoutingError::no_route(header.destination, NoRouteReason::Unreachable))?;
        let remote = ctx
            .topology
            .peer_interface(entry.interface)
            .ok_or_else(|| RoutingError::no_route(header.destination, NoRouteReason::Unreachable))?;
        ctx.route_via(header, entry.interface, remote, entry.next_hop, false)
    }

    /// Ground station uplink: the nearest directly linked satellite.
    fn uplink(&self, ctx: &RoutingContext<'_>, header: &PacketHeader) -> Result<Route> {
        let nearest = ctx
            .topology
            .neighbors(self.node)
            .into_iter()
            .filter(|n| ctx.topology.is_satellite(n.peer))
            .filter_map(|n| Some((ctx.distance(self.node, n.peer)?, n)))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match nearest {
            Some((_, link)) => ctx.route_via(header, link.local, link.remote, link.peer, false),
            None => {
                warn!("Ground station {} has no satellite link", self.node);
                Err(RoutingError::no_route(
                    header.destination,
                    NoRouteReason::NoSatelliteLink,
                ))
            }
        }
    }
}

impl RoutingProtocol for ShortestPathRouter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::ShortestPath
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    fn start_delay(&self, ctx: &RoutingContext<'_>) -> Option<Duration> {
        if ctx.topology.is_ground_station(self.node) {
            None
        } else {
            Some(self.start_delay)
        }
    }

    fn update(&mut self, ctx: &RoutingContext<'_>) {
        if !ctx.graph.is_built() || ctx.graph.index_of(self.node).is_none() {
            warn!("{} skipped recomputation: not in a built graph", self.node);
            return;
        }

        let paths = shortest_paths(ctx.graph, ctx.topology, self.node, ctx.now_s());
        let mut table = BTreeMap::new();
        for (destination, path) in paths {
            match ctx.topology.link_between(self.node, path.first_hop) {
                Some(link) => {
                    table.insert(
                        destination,
                        RouteEntry {
                            next_hop: path.first_hop,
                            interface: link.local,
                            cost_m: path.cost_m,
                        },
                    );
                }
                None => warn!("{} has no link to first hop {}", self.node, path.first_hop),
            }
        }

        self.table = table;
        self.computed = true;
        self.epochs += 1;
        debug!(
            "{} epoch {} at {:.3}s: {} destinations reachable",
            self.node,
            self.epochs,
            ctx.now_s(),
            self.table.len()
        );
    }

    fn route_output(&mut self, ctx: &RoutingContext<'_>, header: &PacketHeader) -> Result<Route> {
        let destination = header.destination;
        let no_route = |reason| RoutingError::no_route(destination, reason);

        if !ctx.graph.is_built() || !ctx.registry.is_populated() {
            return Err(no_route(NoRouteReason::Uninitialized));
        }
        let target = ctx
            .registry
            .resolve(destination)
            .ok_or_else(|| no_route(NoRouteReason::UnknownDestination))?;
        if target == self.node {
            return Err(no_route(NoRouteReason::LocalDestination));
        }

        if ctx.topology.is_ground_station(self.node) {
            return self.uplink(ctx, header);
        }
        if !self.computed {
            return Err(no_route(NoRouteReason::Uninitialized));
        }

        if ctx.topology.is_ground_station(target) {
            let t = ctx.now_s();
            let position = ctx
                .topology
                .position(target, t)
                .ok_or_else(|| no_route(NoRouteReason::UnknownDestination))?;
            let closest = ctx
                .graph
                .closest_to(ctx.topology, &position, t)
                .ok_or_else(|| no_route(NoRouteReason::Unreachable))?;

            if closest == self.node {
                let link = ctx
                    .topology
                    .link_between(self.node, target)
                    .ok_or_else(|| no_route(NoRouteReason::NoGroundLink))?;
                return ctx.route_via(header, link.local, link.remote, target, false);
            }
            debug!("{} toward {} via exit satellite {}", self.node, destination, closest);
            return self.forward_to(ctx, header, closest);
        }

        self.forward_to(ctx, header, target)
    }

    fn routing_table(&self, ctx: &RoutingContext<'_>) -> String {
        let mut out = format!(
            "{} [shortest-path] {} entries at {:.3}s\n",
            self.node,
            self.table.len(),
            ctx.now_s()
        );
        for (destination, entry) in &self.table {
            let _ = writeln!(
                out,
                "  {:<10} -> {:<10} via {:<6} {:>10.1} km",
                destination.to_string(),
                entry.next_hop.to_string(),
                entry.interface.to_string(),
                entry.cost_m / 1000.0
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{link, ring_plane, Fixture};
    use orbital_glaf::builder::{add_shell, wire_isl, IslPattern};
    use orbital_mechanics::walker::WalkerDelta;
    use orbital_mechanics::OrbitalElements;
    use petgraph::algo::dijkstra;
    use petgraph::visit::EdgeRef;
    use std::net::Ipv4Addr;

    fn create_router(node: NodeId) -> ShortestPathRouter {
        ShortestPathRouter::new(node, &RoutingConfig::default())
    }

    fn create_test_shell() -> Fixture {
        let mut topology = Topology::new();
        let planes = add_shell(&mut topology, &WalkerDelta::demo_shell(), "sat").unwrap();
        wire_isl(&mut topology, &planes, IslPattern::Grid).unwrap();
        Fixture::new(topology).finish()
    }

    #[test]
    fn test_table_matches_reference_dijkstra() {
        let fixture = create_test_shell();
        let t = 750.0;
        let ctx = fixture.ctx(t);
        let source = NodeId(5);

        let mut router = create_router(source);
        router.update(&ctx);
        assert_eq!(router.table().len(), 31);

        let g = fixture.graph.as_petgraph();
        let start = petgraph::graph::NodeIndex::new(fixture.graph.index_of(source).unwrap());
        let reference = dijkstra(g, start, None, |e| {
            fixture
                .topology
                .distance(g[e.source()], g[e.target()], t)
                .unwrap()
        });

        let direct: Vec<NodeId> = fixture
            .topology
            .neighbors(source)
            .iter()
            .map(|n| n.peer)
            .collect();
        for (index, cost) in reference {
            let node = g[index];
            if node == source {
                continue;
            }
            let entry = router.lookup(node).unwrap();
            assert!((entry.cost_m - cost).abs() < 1e-3, "{}: {} vs {}", node, entry.cost_m, cost);
            assert!(direct.contains(&entry.next_hop));
            // The first hop's own cost plus the rest never beats the optimum
            let hop_cost = router.lookup(entry.next_hop).unwrap().cost_m;
            assert!(hop_cost <= entry.cost_m + 1e-3);
        }
    }

    #[test]
    fn test_first_hop_tracking() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 60.0, 120.0, 180.0, 240.0, 300.0]);
        let fixture = Fixture::new(topology).finish();

        let mut router = create_router(ring[0]);
        router.update(&fixture.ctx(0.0));
        assert_eq!(router.lookup(ring[1]).unwrap().next_hop, ring[1]);
        assert_eq!(router.lookup(ring[2]).unwrap().next_hop, ring[1]);
        assert_eq!(router.lookup(ring[4]).unwrap().next_hop, ring[5]);
        assert!(router.lookup(ring[0]).is_none());
        assert_eq!(router.epochs(), 1);
    }

    #[test]
    fn test_two_ground_stations_one_satellite() {
        let mut topology = Topology::new();
        let sat = topology
            .add_satellite("sat", OrbitalElements::new(550_000.0, 53.0, 0.0, 0.0), 0, 0)
            .unwrap();
        let gs_a = topology.add_ground_station("gs-a", 0.0, 0.0).unwrap();
        let gs_b = topology.add_ground_station("gs-b", 10.0, 10.0).unwrap();
        link(&mut topology, gs_a, sat);
        link(&mut topology, gs_b, sat);
        let fixture = Fixture::new(topology).finish();
        let ctx = fixture.ctx(0.0);

        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(gs_b));

        let mut ground = create_router(gs_a);
        assert_eq!(ground.start_delay(&ctx), None);
        let route = ground.route_output(&ctx, &header).unwrap();
        assert_eq!(route.next_hop, sat);
        assert_eq!(Some(route.source), fixture.topology.primary_address(gs_a));

        let mut satellite = create_router(sat);
        assert!(satellite.start_delay(&ctx).is_some());
        satellite.update(&ctx);
        let route = satellite.route_output(&ctx, &header).unwrap();
        assert_eq!(route.next_hop, gs_b);
        assert_eq!(route.gateway, fixture.address(gs_b));
        let outgoing = fixture.topology.interface(route.interface).unwrap();
        assert_eq!(outgoing.node, sat);
        assert_eq!(outgoing.link, fixture.topology.link_between(sat, gs_b).unwrap().link);
    }

    #[test]
    fn test_ground_destination_via_exit_satellite() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 120.0, 240.0]);
        // Directly beneath sat-0-0 at t = 0
        let gs = topology.add_ground_station("gs", 0.0, 0.0).unwrap();
        link(&mut topology, ring[0], gs);
        let fixture = Fixture::new(topology).finish();
        let ctx = fixture.ctx(0.0);
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(gs));

        let mut router = create_router(ring[1]);
        router.update(&ctx);
        let route = router.route_output(&ctx, &header).unwrap();
        assert_eq!(route.next_hop, ring[0]);
    }

    #[test]
    fn test_exit_satellite_follows_live_positions() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 90.0, 180.0, 270.0]);
        // Beneath sat-0-0 at t = 0 and beneath sat-0-3 a quarter period later
        let gs = topology.add_ground_station("gs", 0.0, 0.0).unwrap();
        link(&mut topology, ring[0], gs);
        link(&mut topology, ring[3], gs);
        let fixture = Fixture::new(topology).finish();
        let quarter = OrbitalElements::new(550_000.0, 53.0, 0.0, 0.0).period_s() / 4.0;
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(gs));

        let mut router = create_router(ring[0]);
        router.update(&fixture.ctx(0.0));

        let route = router.route_output(&fixture.ctx(0.0), &header).unwrap();
        assert_eq!(route.next_hop, gs);

        // Same table, new exit satellite
        let route = router.route_output(&fixture.ctx(quarter), &header).unwrap();
        assert_eq!(route.next_hop, ring[3]);
        assert_eq!(router.epochs(), 1);
    }

    #[test]
    fn test_exit_satellite_without_ground_link() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 120.0, 240.0]);
        let gs = topology.add_ground_station("gs", 0.0, 0.0).unwrap();
        link(&mut topology, ring[1], gs);
        let fixture = Fixture::new(topology).finish();
        let ctx = fixture.ctx(0.0);

        let mut router = create_router(ring[0]);
        router.update(&ctx);
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(gs));
        let err = router.route_output(&ctx, &header).unwrap_err();
        assert_eq!(err.reason(), NoRouteReason::NoGroundLink);
    }

    #[test]
    fn test_disconnected_graph_unreachable() {
        let mut topology = Topology::new();
        let a = ring_plane(&mut topology, 0, &[0.0, 120.0, 240.0]);
        let b = ring_plane(&mut topology, 1, &[0.0, 120.0, 240.0]);
        let fixture = Fixture::new(topology).finish();
        let ctx = fixture.ctx(0.0);

        let mut router = create_router(a[0]);
        router.update(&ctx);
        assert_eq!(router.table().len(), 2);

        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(b[0]));
        let err = router.route_output(&ctx, &header).unwrap_err();
        assert_eq!(err.reason(), NoRouteReason::Unreachable);
    }

    #[test]
    fn test_uninitialized_lookups() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 120.0, 240.0]);

        // Graph never built
        let unbuilt = Fixture::new(topology);
        let mut router = create_router(ring[0]);
        router.update(&unbuilt.ctx(0.0));
        assert_eq!(router.epochs(), 0);
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::new(10, 0, 0, 2));
        let err = router.route_output(&unbuilt.ctx(0.0), &header).unwrap_err();
        assert_eq!(err.reason(), NoRouteReason::Uninitialized);

        // Built but this router never ran an epoch
        let fixture = Fixture::new(unbuilt.topology).finish();
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(ring[1]));
        let err = router.route_output(&fixture.ctx(0.0), &header).unwrap_err();
        assert_eq!(err.reason(), NoRouteReason::Uninitialized);

        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::new(192, 168, 1, 1));
        let err = router.route_output(&fixture.ctx(0.0), &header).unwrap_err();
        assert_eq!(err.reason(), NoRouteReason::UnknownDestination);
    }

    #[test]
    fn test_ground_station_without_uplink() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 120.0, 240.0]);
        let lonely = topology.add_ground_station("lonely", 20.0, 20.0).unwrap();
        let fixture = Fixture::new(topology).finish();

        let mut router = create_router(lonely);
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, fixture.address(ring[0]));
        let err = router.route_output(&fixture.ctx(0.0), &header).unwrap_err();
        assert_eq!(err.reason(), NoRouteReason::NoSatelliteLink);
    }

    #[test]
    fn test_routing_table_dump() {
        let mut topology = Topology::new();
        let ring = ring_plane(&mut topology, 0, &[0.0, 120.0, 240.0]);
        let fixture = Fixture::new(topology).finish();
        let mut router = create_router(ring[0]);
        router.update(&fixture.ctx(0.0));
        let dump = router.routing_table(&fixture.ctx(0.0));
        assert!(dump.starts_with("node-0 [shortest-path] 2 entries"));
        assert!(dump.contains("node-1"));
    }

    #[test]
    fn test_queue_pops_cheapest_first() {
        let mut heap = BinaryHeap::new();
        for (cost, index) in [(3.0, 0), (1.0, 1), (2.0, 2)] {
            heap.push(QueueEntry { cost, index });
        }
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|e| e.index)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }
}
