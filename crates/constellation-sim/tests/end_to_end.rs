use beam_routing::{ConfigError, ProtocolKind, RoutingConfig};
use constellation_sim::{LinkConfig, Network, Scenario, ScenarioConfig, ScenarioError, SimError};
use link_channel::{Attachment, ChannelError, MacAddress, PointToPointChannel};
use orbital_glaf::{NodeId, Topology};
use orbital_mechanics::{Mobility, OrbitalElements, Vec3, EARTH_RADIUS_M, SPEED_OF_LIGHT};
use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;
use tempfile::NamedTempFile;

const ALTITUDE_M: f64 = 550_000.0;

/// Six satellites 60 degrees apart in one ring, so neighbors sit exactly one
/// orbital radius from each other at all times.
fn create_test_ring() -> (Topology, Vec<NodeId>) {
    let mut topology = Topology::new();
    let sats: Vec<NodeId> = (0..6)
        .map(|slot| {
            let elements = OrbitalElements::new(ALTITUDE_M, 53.0, 0.0, slot as f64 * 60.0);
            topology
                .add_satellite(format!("sat-{}", slot), elements, 0, slot)
                .unwrap()
        })
        .collect();
    for i in 0..6 {
        topology
            .connect(sats[i], sats[(i + 1) % 6], PointToPointChannel::dynamic())
            .unwrap();
    }
    (topology, sats)
}

fn create_test_network(topology: Topology, kind: ProtocolKind, link: LinkConfig) -> Network {
    let mut network = Network::new(topology, RoutingConfig::default(), link).unwrap();
    network.assign_addresses(Ipv4Addr::new(10, 0, 0, 0)).unwrap();
    network.populate_registry();
    network.build_graph().unwrap();
    network.install_routing_all(kind).unwrap();
    network.initialize_routing();
    network
}

fn assert_close_ms(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-5,
        "latency {} ms, expected {} ms",
        actual,
        expected
    );
}

#[test]
fn test_delay_is_sum_of_hop_delays() {
    let hop_ms = (EARTH_RADIUS_M + ALTITUDE_M) / SPEED_OF_LIGHT * 1000.0;

    for kind in [ProtocolKind::Greedy, ProtocolKind::ShortestPath] {
        let (topology, sats) = create_test_ring();
        let mut network = create_test_network(topology, kind, LinkConfig::ideal());
        let destination = network.topology().primary_address(sats[2]).unwrap();
        network.send_packet(Duration::from_secs(1), sats[0], destination, 512).unwrap();
        network.run_until(Duration::from_secs(3));

        let stats = network.stats();
        assert_eq!(stats.delivered, 1, "{} did not deliver", kind);
        let record = &stats.deliveries[0];
        assert_eq!(record.path, vec!["sat-0", "sat-1", "sat-2"]);
        assert_eq!(record.hops, 2);
        assert_close_ms(record.latency_ms, 2.0 * hop_ms);
    }
}

#[test]
fn test_serialization_adds_per_hop() {
    let hop_ms = (EARTH_RADIUS_M + ALTITUDE_M) / SPEED_OF_LIGHT * 1000.0;
    let link = LinkConfig {
        isl_data_rate_bps: Some(1e6),
        ..LinkConfig::ideal()
    };
    let (topology, sats) = create_test_ring();
    let mut network = create_test_network(topology, ProtocolKind::ShortestPath, link);
    let destination = network.topology().primary_address(sats[2]).unwrap();
    // 966 payload + 20 network + 14 link bytes = 8 ms at 1 Mbps
    network.send_packet(Duration::from_secs(1), sats[0], destination, 966).unwrap();
    network.run_until(Duration::from_secs(3));

    let record = &network.stats().deliveries[0];
    assert_close_ms(record.latency_ms, 2.0 * (hop_ms + 8.0));
}

#[test]
fn test_two_ground_stations_through_one_satellite() {
    for kind in [ProtocolKind::Greedy, ProtocolKind::ShortestPath] {
        let mut topology = Topology::new();
        let sat = topology
            .add_satellite("sat", OrbitalElements::new(ALTITUDE_M, 53.0, 0.0, 0.0), 0, 0)
            .unwrap();
        let gs_a = topology.add_ground_station("gs-a", 0.0, 0.0).unwrap();
        let gs_b = topology.add_ground_station("gs-b", 5.0, 5.0).unwrap();
        topology.connect(gs_a, sat, PointToPointChannel::dynamic()).unwrap();
        topology.connect(gs_b, sat, PointToPointChannel::dynamic()).unwrap();

        let mut network = create_test_network(topology, kind, LinkConfig::ideal());
        let destination = network.topology().primary_address(gs_b).unwrap();
        network.send_packet(Duration::from_secs(1), gs_a, destination, 256).unwrap();
        network.run_until(Duration::from_secs(2));

        let stats = network.stats();
        assert_eq!(stats.delivered, 1, "{} did not deliver", kind);
        let record = &stats.deliveries[0];
        assert_eq!(record.path, vec!["gs-a", "sat", "gs-b"]);
        assert_eq!(record.source, network.topology().primary_address(gs_a).unwrap());

        // Each hop is priced with the satellite's position when it is sent
        let topology = network.topology();
        let up_s = topology.distance(gs_a, sat, 1.0).unwrap() / SPEED_OF_LIGHT;
        let down_s = topology.distance(sat, gs_b, 1.0 + up_s).unwrap() / SPEED_OF_LIGHT;
        assert_close_ms(record.latency_ms, (up_s + down_s) * 1000.0);
    }
}

#[test]
fn test_install_time_configuration_errors() {
    let (topology, sats) = create_test_ring();
    let mut network = create_test_network(topology, ProtocolKind::Greedy, LinkConfig::ideal());
    assert_eq!(
        network.install_routing(sats[3], ProtocolKind::ShortestPath),
        Err(ConfigError::ProtocolAlreadyInstalled {
            node: sats[3],
            existing: ProtocolKind::Greedy,
        })
    );

    let mut config = ScenarioConfig::default();
    config.routing.max_neighbors = 1;
    assert!(matches!(
        Scenario::build(config),
        Err(SimError::Scenario(ScenarioError::Routing(ConfigError::InvalidMaxNeighbors(1))))
    ));

    let mut channel = PointToPointChannel::dynamic();
    for interface in 0..2 {
        channel
            .attach(Attachment {
                node: interface,
                interface,
                address: MacAddress::from_index(u64::from(interface) + 1),
                mobility: Mobility::Fixed(Vec3::zeros()),
            })
            .unwrap();
    }
    let third = channel.attach(Attachment {
        node: 2,
        interface: 2,
        address: MacAddress::from_index(3),
        mobility: Mobility::Fixed(Vec3::zeros()),
    });
    assert_eq!(third, Err(ChannelError::Full { capacity: 2 }));
}

#[test]
fn test_scenario_file_round_trip() {
    let json = r#"{
        "name": "file-scenario",
        "constellation": {"total_satellites": 12, "planes": 3, "phasing": 1,
                          "altitude_m": 550000.0, "inclination_deg": 53.0},
        "ground_stations": [
            {"name": "gs-a", "latitude": 0.0, "longitude": 0.0},
            {"name": "gs-b", "latitude": 10.0, "longitude": 30.0}
        ],
        "ground_links": {"policy": "nearest", "count": 2},
        "routing": {"protocol": "shortest-path"},
        "link": {"isl_data_rate_bps": null, "ground_data_rate_bps": null},
        "traffic": [{"from": "gs-a", "to": "gs-b", "start_s": 2.0, "interval_s": 0.5, "count": 6}],
        "duration_s": 8.0
    }"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let config = ScenarioConfig::load(file.path()).unwrap();
    let mut scenario = Scenario::build(config).unwrap();
    let report = scenario.run();
    assert_eq!(report.protocol, ProtocolKind::ShortestPath);
    assert_eq!(report.topology.satellites, 12);
    assert_eq!(report.summary.sent, 6);
    assert_eq!(report.summary.delivered + report.summary.dropped, 6);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write(&path).unwrap();
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["summary"]["sent"], 6);
    assert_eq!(written["topology"]["ground_stations"], 2);
}
