//! Scenario setup and execution
//!
//! Turns a `ScenarioConfig` into a ready-to-run `Network`, performing the
//! setup steps in the only order the routers accept.

use crate::config::{ScenarioConfig, ScenarioError};
use crate::network::Network;
use crate::stats::RunReport;
use crate::Result;
use beam_routing::ProtocolKind;
use link_channel::{FreeSpaceLoss, LossModel};
use orbital_glaf::builder::{add_shell, wire_ground, wire_isl};
use orbital_glaf::Topology;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Prefix of satellite names: `sat-<plane>-<slot>`.
pub const SATELLITE_PREFIX: &str = "sat";

#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
    network: Network,
    duration: Duration,
}

impl Scenario {
    pub fn build(config: ScenarioConfig) -> Result<Self> {
        config.validate()?;
        let duration = config.duration()?;
        let routing = config.routing.to_routing_config()?;

        let mut topology = Topology::new();
        let planes = add_shell(&mut topology, &config.constellation, SATELLITE_PREFIX)?;
        wire_isl(&mut topology, &planes, config.isl_pattern)?;

        let loss = config
            .link
            .ground_frequency_hz
            .map(|hz| Arc::new(FreeSpaceLoss::new(hz)) as Arc<dyn LossModel>);
        for station in &config.ground_stations {
            let id = topology.add_ground_station(station.name.as_str(), station.latitude, station.longitude)?;
            let linked = wire_ground(&mut topology, id, config.ground_links, loss.clone())?;
            info!("Ground station {} linked to {} satellites", station.name, linked);
        }

        let mut network = Network::new(topology, routing, config.link.clone())?;
        network.assign_addresses(config.address_base)?;
        network.populate_registry();
        network.build_graph()?;
        network.install_routing_all(config.routing.protocol)?;
        network.initialize_routing();

        let mut scenario = Self {
            config,
            network,
            duration,
        };
        scenario.schedule_traffic()?;
        Ok(scenario)
    }

    fn schedule_traffic(&mut self) -> Result<()> {
        let mut packets = 0;
        for flow in &self.config.traffic {
            let topology = self.network.topology();
            let from = topology
                .node_by_name(&flow.from)
                .ok_or_else(|| ScenarioError::UnknownNode(flow.from.clone()))?;
            let to = topology
                .node_by_name(&flow.to)
                .ok_or_else(|| ScenarioError::UnknownNode(flow.to.clone()))?;
            let destination = topology.primary_address(to).ok_or_else(|| ScenarioError::InvalidValue {
                field: "traffic.to".into(),
                reason: format!("{} has no links and therefore no address", flow.to),
            })?;

            for at in flow.send_times()? {
                self.network.send_packet(at, from, destination, flow.size_bytes)?;
                packets += 1;
            }
        }
        info!("Scheduled {} packets in {} flows", packets, self.config.traffic.len());
        Ok(())
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.config.routing.protocol
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs to `until`, or to the configured duration if earlier.
    pub fn run_to(&mut self, until: Duration) -> u64 {
        self.network.run_until(until.min(self.duration))
    }

    /// Runs the remaining timeline and reports.
    pub fn run(&mut self) -> RunReport {
        let events = self.network.run_until(self.duration);
        let stats = self.network.stats();
        info!(
            "Scenario {} finished: {} events, {}/{} packets delivered",
            self.config.name, events, stats.delivered, stats.sent
        );
        self.network.report(self.protocol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroundStationConfig, LinkConfig, TrafficFlow};
    use crate::SimError;
    use orbital_glaf::builder::{GroundLinkPolicy, IslPattern};
    use orbital_mechanics::walker::WalkerDelta;

    fn create_test_config(protocol: ProtocolKind) -> ScenarioConfig {
        let mut config = ScenarioConfig {
            constellation: WalkerDelta {
                total_satellites: 12,
                planes: 3,
                phasing: 1,
                altitude_m: 550_000.0,
                inclination_deg: 53.0,
            },
            isl_pattern: IslPattern::Grid,
            ground_stations: vec![
                GroundStationConfig::new("gs-a", 0.0, 0.0),
                GroundStationConfig::new("gs-b", 20.0, 60.0),
            ],
            ground_links: GroundLinkPolicy::Nearest { count: 3 },
            link: LinkConfig::ideal(),
            traffic: vec![TrafficFlow::new("gs-a", "gs-b")],
            duration_s: 15.0,
            ..ScenarioConfig::default()
        };
        config.routing.protocol = protocol;
        config
    }

    #[test]
    fn test_build_follows_setup_order() {
        let scenario = Scenario::build(create_test_config(ProtocolKind::ShortestPath)).unwrap();
        let network = scenario.network();
        assert!(network.registry().is_populated());
        assert!(network.graph().is_built());
        assert_eq!(network.graph().len(), 12);
        assert_eq!(network.topology().stats().gs_links, 6);
        // 12 satellite timers plus 10 packets
        assert_eq!(network.pending_events(), 22);
    }

    #[test]
    fn test_every_packet_accounted_for() {
        for protocol in [ProtocolKind::Greedy, ProtocolKind::ShortestPath] {
            let mut scenario = Scenario::build(create_test_config(protocol)).unwrap();
            let report = scenario.run();
            assert_eq!(report.protocol, protocol);
            assert_eq!(report.summary.sent, 10);
            assert_eq!(report.summary.delivered + report.summary.dropped, 10);
        }
    }

    #[test]
    fn test_unknown_traffic_endpoint() {
        let mut config = create_test_config(ProtocolKind::Greedy);
        config.traffic = vec![TrafficFlow::new("gs-a", "gs-nowhere")];
        assert!(matches!(
            Scenario::build(config),
            Err(SimError::Scenario(ScenarioError::UnknownNode(name))) if name == "gs-nowhere"
        ));
    }

    #[test]
    fn test_run_to_is_clamped() {
        let mut scenario = Scenario::build(create_test_config(ProtocolKind::Greedy)).unwrap();
        scenario.run_to(Duration::from_secs(100));
        assert_eq!(scenario.network().now(), Duration::from_secs(15));
    }
}
