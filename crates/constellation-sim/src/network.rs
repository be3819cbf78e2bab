//! Network-layer forwarding engine
//!
//! `Network` owns the run: the topology, the address registry and global
//! graph shared by the routers, one router per node, the event queue and
//! the traffic counters. Setup must follow the order
//! wire -> assign addresses -> populate registry -> build graph ->
//! initialize routing; lookups made out of order fail closed.
//!
//! Per packet there is exactly one forwarding attempt per hop. Packets that
//! cannot be routed are dropped and counted, never retried.

use crate::config::LinkConfig;
use crate::packet::{Frame, Packet};
use crate::scheduler::{EventId, Simulator};
use crate::stats::{DeliveryRecord, DropReason, DropRecord, RunReport, TrafficStats};
use crate::{Result, SimError};
use beam_routing::{
    create_router, ConfigError, InputAction, PacketHeader, ProtocolKind, Route, RoutingConfig,
    RoutingContext, RoutingProtocol,
};
use link_channel::header::PROTOCOL_IPV4;
use link_channel::{Delivery, DeliverySink, LinkHeader, MacAddress, Transmission};
use orbital_glaf::builder::assign_addresses;
use orbital_glaf::{AddressRegistry, GlobalGraph, InterfaceId, LinkType, NodeId, Topology};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    RoutingUpdate { node: NodeId },
    Originate { packet: Packet },
    Arrival {
        interface: InterfaceId,
        frame: Frame,
        rx_power_dbm: f64,
    },
}

/// Turns channel deliveries into arrival events on the receiving node.
struct SchedulerSink<'a> {
    simulator: &'a mut Simulator<SimEvent>,
}

impl DeliverySink<Frame> for SchedulerSink<'_> {
    fn schedule_delivery(&mut self, delivery: Delivery, frame: Frame) {
        self.simulator.schedule_with_context(
            NodeId(delivery.context),
            delivery.delay,
            SimEvent::Arrival {
                interface: InterfaceId(delivery.receiver),
                frame,
                rx_power_dbm: delivery.rx_power_dbm,
            },
        );
    }
}

#[derive(Debug)]
pub struct Network {
    topology: Topology,
    registry: AddressRegistry,
    graph: GlobalGraph,
    routing: RoutingConfig,
    link: LinkConfig,
    routers: BTreeMap<NodeId, Box<dyn RoutingProtocol>>,
    timers: HashMap<NodeId, EventId>,
    simulator: Simulator<SimEvent>,
    stats: TrafficStats,
    rng: StdRng,
    next_packet_id: u64,
}

impl Network {
    pub fn new(topology: Topology, routing: RoutingConfig, link: LinkConfig) -> Result<Self> {
        routing.validate()?;
        link.validate()?;
        let rng = StdRng::seed_from_u64(routing.seed);
        Ok(Self {
            topology,
            registry: AddressRegistry::new(),
            graph: GlobalGraph::new(),
            routing,
            link,
            routers: BTreeMap::new(),
            timers: HashMap::new(),
            simulator: Simulator::new(),
            stats: TrafficStats::new(),
            rng,
            next_packet_id: 0,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &GlobalGraph {
        &self.graph
    }

    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.simulator.now()
    }

    pub fn pending_events(&self) -> usize {
        self.simulator.pending()
    }

    pub fn router(&self, node: NodeId) -> Option<&dyn RoutingProtocol> {
        self.routers.get(&node).map(|r| r.as_ref())
    }

    pub fn has_timer(&self, node: NodeId) -> bool {
        self.timers.contains_key(&node)
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    pub fn assign_addresses(&mut self, base: Ipv4Addr) -> Result<usize> {
        Ok(assign_addresses(&mut self.topology, base)?)
    }

    pub fn install_routing(&mut self, node: NodeId, kind: ProtocolKind) -> std::result::Result<(), ConfigError> {
        if self.topology.node(node).is_none() {
            return Err(ConfigError::UnknownNode(node));
        }
        if let Some(existing) = self.routers.get(&node) {
            return Err(ConfigError::ProtocolAlreadyInstalled {
                node,
                existing: existing.kind(),
            });
        }
        self.routers.insert(node, create_router(kind, node, &self.routing));
        Ok(())
    }

    /// Installs `kind` on every node.
    pub fn install_routing_all(&mut self, kind: ProtocolKind) -> std::result::Result<usize, ConfigError> {
        let nodes: Vec<NodeId> = self.topology.nodes().map(|n| n.id).collect();
        for node in &nodes {
            self.install_routing(*node, kind)?;
        }
        info!("Installed {} routing on {} nodes", kind, nodes.len());
        Ok(nodes.len())
    }

    /// Removes the node's router and stops its update timer.
    pub fn uninstall_routing(&mut self, node: NodeId) -> bool {
        if let Some(timer) = self.timers.remove(&node) {
            self.simulator.cancel(timer);
        }
        self.routers.remove(&node).is_some()
    }

    pub fn populate_registry(&mut self) -> usize {
        self.registry.populate(&self.topology)
    }

    /// Registers every satellite, then derives the inter-satellite adjacency.
    pub fn build_graph(&mut self) -> Result<usize> {
        self.graph.clear();
        for satellite in self.topology.satellites() {
            self.graph.register_satellite(satellite.id)?;
        }
        Ok(self.graph.build(&self.topology)?)
    }

    /// Schedules the first epoch of every installed router that recomputes.
    pub fn initialize_routing(&mut self) -> usize {
        let ctx = RoutingContext::new(self.simulator.now(), &self.topology, &self.registry, &self.graph);
        let jitter = self.routing.start_jitter.as_secs_f64();
        let mut started = 0;

        for (node, router) in &self.routers {
            if self.timers.contains_key(node) {
                continue;
            }
            let Some(mut delay) = router.start_delay(&ctx) else {
                continue;
            };
            if jitter > 0.0 {
                delay += Duration::from_secs_f64(self.rng.gen_range(0.0..jitter));
            }
            let timer = self
                .simulator
                .schedule_with_context(*node, delay, SimEvent::RoutingUpdate { node: *node });
            self.timers.insert(*node, timer);
            started += 1;
        }

        info!("Routing initialized: {} update timers started", started);
        started
    }

    // ------------------------------------------------------------------------
    // Traffic
    // ------------------------------------------------------------------------

    /// Schedules a packet from `from` to `destination` at simulated time `at`.
    pub fn send_packet(&mut self, at: Duration, from: NodeId, destination: Ipv4Addr, size_bytes: usize) -> Result<u64> {
        if self.topology.node(from).is_none() {
            return Err(SimError::UnknownNode(from));
        }
        let id = self.next_packet_id;
        self.next_packet_id += 1;

        let at = at.max(self.simulator.now());
        let header = PacketHeader::new(Ipv4Addr::UNSPECIFIED, destination);
        let packet = Packet::new(id, header, size_bytes, from, at);
        self.simulator.schedule_with_context(
            from,
            at - self.simulator.now(),
            SimEvent::Originate { packet },
        );
        Ok(id)
    }

    /// Processes every event due up to `end`. Returns how many ran.
    pub fn run_until(&mut self, end: Duration) -> u64 {
        let before = self.simulator.processed();
        while let Some(scheduled) = self.simulator.pop_until(end) {
            match scheduled.event {
                SimEvent::RoutingUpdate { node } => self.handle_update(node),
                SimEvent::Originate { packet } => self.originate(packet),
                SimEvent::Arrival {
                    interface,
                    frame,
                    rx_power_dbm,
                } => {
                    trace!("Arrival on {} at {:.1} dBm", interface, rx_power_dbm);
                    self.receive(interface, frame)
                }
            }
        }
        self.simulator.advance_to(end);
        self.simulator.processed() - before
    }

    /// Current neighbor set or table of every router.
    pub fn routing_tables(&self) -> String {
        let ctx = RoutingContext::new(self.simulator.now(), &self.topology, &self.registry, &self.graph);
        self.routers
            .values()
            .map(|router| router.routing_table(&ctx))
            .collect()
    }

    pub fn report(&self, protocol: ProtocolKind) -> RunReport {
        RunReport::new(protocol, self.simulator.now(), self.topology.stats(), &self.stats)
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    fn handle_update(&mut self, node: NodeId) {
        let ctx = RoutingContext::new(self.simulator.now(), &self.topology, &self.registry, &self.graph);
        let Some(router) = self.routers.get_mut(&node) else {
            self.timers.remove(&node);
            return;
        };
        router.update(&ctx);
        let interval = router.update_interval();
        let timer = self
            .simulator
            .schedule_with_context(node, interval, SimEvent::RoutingUpdate { node });
        self.timers.insert(node, timer);
    }

    fn originate(&mut self, mut packet: Packet) {
        self.stats.record_sent();
        let Some(node) = packet.origin() else {
            return;
        };

        if self.topology.owns_address(node, packet.header.destination) {
            self.deliver(node, packet);
            return;
        }

        let result = match self.routers.get_mut(&node) {
            Some(router) => {
                let ctx = RoutingContext::new(self.simulator.now(), &self.topology, &self.registry, &self.graph);
                router.route_output(&ctx, &packet.header)
            }
            None => {
                self.drop_packet(node, packet.id, DropReason::NoRoutingProtocol);
                return;
            }
        };

        match result {
            Ok(route) => {
                packet.header.source = route.source;
                self.transmit(node, packet, route);
            }
            Err(err) => self.drop_packet(node, packet.id, DropReason::NoRoute(err.reason())),
        }
    }

    fn receive(&mut self, interface: InterfaceId, frame: Frame) {
        let Some((node, mac)) = self.topology.interface(interface).map(|i| (i.node, i.mac)) else {
            return;
        };
        let link = match frame.link_header() {
            Ok(link) => link,
            Err(err) => {
                warn!("{} received a malformed frame: {}", node, err);
                self.drop_packet(node, frame.packet.id, DropReason::MalformedFrame);
                return;
            }
        };
        if link.destination != mac && !link.destination.is_broadcast() {
            trace!("{} ignoring frame for {}", interface, link.destination);
            return;
        }

        let mut packet = frame.packet;
        packet.path.push(node);

        let result = match self.routers.get_mut(&node) {
            Some(router) => {
                let ctx = RoutingContext::new(self.simulator.now(), &self.topology, &self.registry, &self.graph);
                router.route_input(&ctx, &packet.header, interface)
            }
            None => {
                self.drop_packet(node, packet.id, DropReason::NoRoutingProtocol);
                return;
            }
        };

        match result {
            Ok(InputAction::Deliver { .. }) => self.deliver(node, packet),
            Ok(InputAction::Forward(route)) => {
                if packet.header.ttl <= 1 {
                    self.drop_packet(node, packet.id, DropReason::TtlExpired);
                    return;
                }
                packet.header.ttl -= 1;
                self.transmit(node, packet, route);
            }
            Err(err) => self.drop_packet(node, packet.id, DropReason::NoRoute(err.reason())),
        }
    }

    fn transmit(&mut self, node: NodeId, packet: Packet, route: Route) {
        let packet_id = packet.id;
        let now_s = self.simulator.now().as_secs_f64();

        let sent = {
            let Some(out) = self.topology.interface(route.interface) else {
                self.drop_packet(node, packet_id, DropReason::LinkDown);
                return;
            };
            let Some(link) = self.topology.link(out.link) else {
                self.drop_packet(node, packet_id, DropReason::LinkDown);
                return;
            };

            let destination = self
                .topology
                .interface_by_address(route.gateway)
                .map_or(MacAddress::BROADCAST, |i| i.mac);
            let frame = Frame::new(LinkHeader::new(out.mac, destination, PROTOCOL_IPV4), packet);
            let data_rate = match link.link_type {
                LinkType::InterSatellite => self.link.isl_data_rate_bps,
                _ => self.link.ground_data_rate_bps,
            };
            let Some(tx_time) = frame.tx_time(data_rate) else {
                warn!(
                    "{} cannot serialize packet {} ({} bytes) at {:?} bps",
                    node,
                    packet_id,
                    frame.wire_len(),
                    data_rate
                );
                self.drop_packet(node, packet_id, DropReason::TxTimeOverflow);
                return;
            };

            debug!(
                "{} forwarding packet {} to {} via {}",
                node, packet_id, route.next_hop, route.interface
            );
            let tx = Transmission {
                sender: route.interface.0,
                destination,
                tx_power_dbm: self.link.tx_power_dbm,
                tx_time,
                payload: frame,
            };
            let mut sink = SchedulerSink {
                simulator: &mut self.simulator,
            };
            link.channel.send(now_s, tx, &mut sink)
        };

        match sent {
            Ok(0) => self.drop_packet(node, packet_id, DropReason::LinkDown),
            Ok(_) => {}
            Err(err) => {
                warn!("{} could not transmit on {}: {}", node, route.interface, err);
                self.drop_packet(node, packet_id, DropReason::LinkDown);
            }
        }
    }

    fn deliver(&mut self, node: NodeId, packet: Packet) {
        let now = self.simulator.now();
        let latency = now.saturating_sub(packet.created_at);
        debug!(
            "Packet {} delivered at {} after {} hops in {:?}",
            packet.id,
            node,
            packet.hops(),
            latency
        );
        let record = DeliveryRecord {
            packet_id: packet.id,
            source: packet.header.source,
            destination: packet.header.destination,
            sent_at_s: packet.created_at.as_secs_f64(),
            delivered_at_s: now.as_secs_f64(),
            latency_ms: latency.as_secs_f64() * 1000.0,
            hops: packet.hops(),
            path: packet.path.iter().map(|n| self.node_name(*n)).collect(),
        };
        self.stats.record_delivery(record);
    }

    fn drop_packet(&mut self, node: NodeId, packet_id: u64, reason: DropReason) {
        warn!("{} dropped packet {}: {}", node, packet_id, reason);
        let record = DropRecord {
            packet_id,
            at_s: self.simulator.now().as_secs_f64(),
            node: self.node_name(node),
            reason,
        };
        self.stats.record_drop(record);
    }

    fn node_name(&self, node: NodeId) -> String {
        self.topology
            .node(node)
            .map_or_else(|| node.to_string(), |n| n.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioError;
    use beam_routing::NoRouteReason;
    use link_channel::PointToPointChannel;
    use orbital_mechanics::OrbitalElements;

    fn create_test_topology() -> (Topology, Vec<NodeId>) {
        let mut topology = Topology::new();
        let sats: Vec<NodeId> = [0.0, 120.0, 240.0]
            .iter()
            .enumerate()
            .map(|(slot, phase)| {
                let elements = OrbitalElements::new(550_000.0, 53.0, 0.0, *phase);
                topology
                    .add_satellite(format!("sat-{}", slot), elements, 0, slot as u32)
                    .unwrap()
            })
            .collect();
        for i in 0..3 {
            topology
                .connect(sats[i], sats[(i + 1) % 3], PointToPointChannel::dynamic())
                .unwrap();
        }
        (topology, sats)
    }

    fn create_test_network(topology: Topology) -> Network {
        let mut network = Network::new(topology, RoutingConfig::default(), LinkConfig::ideal()).unwrap();
        network.assign_addresses(Ipv4Addr::new(10, 0, 0, 0)).unwrap();
        network.populate_registry();
        network.build_graph().unwrap();
        network
    }

    #[test]
    fn test_install_errors() {
        let (topology, sats) = create_test_topology();
        let mut network = create_test_network(topology);

        network.install_routing(sats[0], ProtocolKind::Greedy).unwrap();
        assert_eq!(
            network.install_routing(sats[0], ProtocolKind::ShortestPath),
            Err(ConfigError::ProtocolAlreadyInstalled {
                node: sats[0],
                existing: ProtocolKind::Greedy
            })
        );
        assert_eq!(
            network.install_routing(NodeId(99), ProtocolKind::Greedy),
            Err(ConfigError::UnknownNode(NodeId(99)))
        );
    }

    #[test]
    fn test_invalid_routing_config_rejected() {
        let (topology, _) = create_test_topology();
        let config = RoutingConfig {
            max_neighbors: 1,
            ..RoutingConfig::default()
        };
        assert!(matches!(
            Network::new(topology, config, LinkConfig::ideal()),
            Err(SimError::Config(ConfigError::InvalidMaxNeighbors(1)))
        ));
    }

    #[test]
    fn test_ground_stations_never_start_shortest_path_timer() {
        let (mut topology, sats) = create_test_topology();
        let gs = topology.add_ground_station("gs", 0.0, 0.0).unwrap();
        topology.connect(gs, sats[0], PointToPointChannel::dynamic()).unwrap();
        let mut network = create_test_network(topology);

        network.install_routing_all(ProtocolKind::ShortestPath).unwrap();
        assert_eq!(network.initialize_routing(), 3);
        assert!(!network.has_timer(gs));
        // Second call does not double-schedule
        assert_eq!(network.initialize_routing(), 0);
    }

    #[test]
    fn test_periodic_updates_and_uninstall() {
        let (topology, sats) = create_test_topology();
        let mut network = create_test_network(topology);
        network.install_routing_all(ProtocolKind::Greedy).unwrap();
        network.initialize_routing();

        // Epochs at 0.1, 1.1 and 2.1 s on each node
        network.run_until(Duration::from_millis(2500));
        assert_eq!(network.pending_events(), 3);
        assert!(network.routing_tables().contains("node-2 [greedy] 2 active neighbors"));

        assert!(network.uninstall_routing(sats[1]));
        assert!(!network.uninstall_routing(sats[1]));
        assert_eq!(network.pending_events(), 2);
        assert!(network.router(sats[1]).is_none());
    }

    #[test]
    fn test_invalid_link_config_rejected() {
        let (topology, _) = create_test_topology();
        let link = LinkConfig {
            isl_data_rate_bps: Some(1e-300),
            ..LinkConfig::ideal()
        };
        assert!(matches!(
            Network::new(topology, RoutingConfig::default(), link),
            Err(SimError::Scenario(ScenarioError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let (topology, sats) = create_test_topology();
        let link = LinkConfig {
            isl_data_rate_bps: Some(LinkConfig::MIN_DATA_RATE_BPS),
            ..LinkConfig::ideal()
        };
        let mut network = Network::new(topology, RoutingConfig::default(), link).unwrap();
        network.assign_addresses(Ipv4Addr::new(10, 0, 0, 0)).unwrap();
        network.populate_registry();
        network.build_graph().unwrap();
        network.install_routing_all(ProtocolKind::Greedy).unwrap();
        network.initialize_routing();

        let target = network.topology().primary_address(sats[1]).unwrap();
        network
            .send_packet(Duration::from_secs(1), sats[0], target, usize::MAX / 4)
            .unwrap();
        network.run_until(Duration::from_secs(2));

        assert_eq!(network.stats().delivered, 0);
        assert_eq!(network.stats().drops[0].reason, DropReason::TxTimeOverflow);
    }

    #[test]
    fn test_start_jitter_bounds() {
        let (topology, _) = create_test_topology();
        let config = RoutingConfig {
            start_jitter: Duration::from_millis(50),
            seed: 11,
            ..RoutingConfig::default()
        };
        let mut network = Network::new(topology, config, LinkConfig::ideal()).unwrap();
        network.install_routing_all(ProtocolKind::Greedy).unwrap();
        assert_eq!(network.initialize_routing(), 3);

        assert_eq!(network.run_until(Duration::from_millis(99)), 0);
        assert_eq!(network.run_until(Duration::from_millis(150)), 3);
    }

    #[test]
    fn test_local_destination_delivered_in_place() {
        let (topology, sats) = create_test_topology();
        let mut network = create_test_network(topology);
        let own = network.topology().primary_address(sats[0]).unwrap();
        network.send_packet(Duration::from_secs(1), sats[0], own, 64).unwrap();
        network.run_until(Duration::from_secs(2));

        assert_eq!(network.stats().delivered, 1);
        assert_eq!(network.stats().deliveries[0].hops, 0);
        assert_eq!(network.stats().deliveries[0].latency_ms, 0.0);
    }

    #[test]
    fn test_missing_router_drops() {
        let (topology, sats) = create_test_topology();
        let mut network = create_test_network(topology);
        let target = network.topology().primary_address(sats[1]).unwrap();
        network.send_packet(Duration::from_secs(1), sats[0], target, 64).unwrap();
        network.run_until(Duration::from_secs(2));

        assert_eq!(network.stats().sent, 1);
        assert_eq!(network.stats().drops[0].reason, DropReason::NoRoutingProtocol);
        assert!(matches!(
            network.send_packet(Duration::ZERO, NodeId(42), target, 64),
            Err(SimError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_unknown_destination_dropped() {
        let (topology, sats) = create_test_topology();
        let mut network = create_test_network(topology);
        network.install_routing_all(ProtocolKind::Greedy).unwrap();
        network.initialize_routing();
        network
            .send_packet(Duration::from_secs(1), sats[0], Ipv4Addr::new(192, 0, 2, 1), 64)
            .unwrap();
        network.run_until(Duration::from_secs(2));

        assert_eq!(
            network.stats().drops[0].reason,
            DropReason::NoRoute(NoRouteReason::UnknownDestination)
        );
    }

    #[test]
    fn test_ttl_expires_on_greedy_loop() {
        let (mut topology, sats) = create_test_topology();
        // Reachable only through a satellite the ring has no link to
        let island = topology
            .add_satellite("island", OrbitalElements::new(550_000.0, 53.0, 90.0, 0.0), 1, 0)
            .unwrap();
        let gs = topology.add_ground_station("gs", 0.0, 0.0).unwrap();
        topology.connect(gs, island, PointToPointChannel::dynamic()).unwrap();

        let mut network = create_test_network(topology);
        network.install_routing_all(ProtocolKind::Greedy).unwrap();
        network.initialize_routing();
        let target = network.topology().primary_address(gs).unwrap();
        network.send_packet(Duration::from_millis(500), sats[0], target, 64).unwrap();
        network.run_until(Duration::from_secs(10));

        assert_eq!(network.stats().delivered, 0);
        assert_eq!(network.stats().drops.len(), 1);
        assert_eq!(network.stats().drops[0].reason, DropReason::TtlExpired);
    }
}
