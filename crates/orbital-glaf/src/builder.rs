//! Constellation wiring helpers
//!
//! Creates Walker shells, wires inter-satellite and ground links, and
//! assigns IPv4 addresses link by link.

use crate::{GlafError, NodeId, Result, Topology};
use link_channel::{LossModel, PointToPointChannel};
use orbital_mechanics::walker::WalkerDelta;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

/// Which inter-satellite links to wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IslPattern {
    /// Ring within each plane only.
    Ring,
    /// Ring plus the same slot in the adjacent planes.
    #[default]
    Grid,
    /// Ring plus every satellite to every satellite of every other plane.
    CrossPlaneMesh,
}

/// Which satellites each ground station links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "policy")]
pub enum GroundLinkPolicy {
    #[default]
    AllSatellites,
    /// The `count` satellites closest to the station at setup time.
    Nearest { count: usize },
}

/// Adds every satellite of a Walker shell, returning node ids grouped by plane.
pub fn add_shell(topology: &mut Topology, shell: &WalkerDelta, prefix: &str) -> Result<Vec<Vec<NodeId>>> {
    let layout = shell.elements()?;
    let mut planes = Vec::with_capacity(layout.len());
    for (p, plane) in layout.into_iter().enumerate() {
        let mut members = Vec::with_capacity(plane.len());
        for (s, elements) in plane.into_iter().enumerate() {
            let name = format!("{}-{}-{}", prefix, p, s);
            members.push(topology.add_satellite(name, elements, p as u32, s as u32)?);
        }
        planes.push(members);
    }
    info!(
        "Added Walker shell {}:{}/{}/{} at {:.0} km",
        shell.inclination_deg,
        shell.total_satellites,
        shell.planes,
        shell.phasing,
        shell.altitude_m / 1000.0
    );
    Ok(planes)
}

/// Wires inter-satellite links over light-speed point-to-point channels.
pub fn wire_isl(topology: &mut Topology, planes: &[Vec<NodeId>], pattern: IslPattern) -> Result<usize> {
    let mut links = 0;

    for plane in planes {
        let n = plane.len();
        let ring_links = match n {
            0 | 1 => 0,
            2 => 1,
            _ => n,
        };
        for i in 0..ring_links {
            topology.connect(plane[i], plane[(i + 1) % n], PointToPointChannel::dynamic())?;
            links += 1;
        }
    }

    match pattern {
        IslPattern::Ring => {}
        IslPattern::Grid => {
            let count = planes.len();
            let pairs = match count {
                0 | 1 => 0,
                2 => 1,
                _ => count,
            };
            for p in 0..pairs {
                let (a, b) = (&planes[p], &planes[(p + 1) % count]);
                for slot in 0..a.len().min(b.len()) {
                    topology.connect(a[slot], b[slot], PointToPointChannel::dynamic())?;
                    links += 1;
                }
            }
        }
        IslPattern::CrossPlaneMesh => {
            for p in 0..planes.len() {
                for q in (p + 1)..planes.len() {
                    for a in &planes[p] {
                        for b in &planes[q] {
                            topology.connect(*a, *b, PointToPointChannel::dynamic())?;
                            links += 1;
                        }
                    }
                }
            }
        }
    }

    info!("Wired {} inter-satellite links ({:?})", links, pattern);
    Ok(links)
}

/// Links a ground station to satellites chosen by `policy`.
pub fn wire_ground(
    topology: &mut Topology,
    station: NodeId,
    policy: GroundLinkPolicy,
    loss: Option<Arc<dyn LossModel>>,
) -> Result<usize> {
    if !topology.is_ground_station(station) {
        return Err(GlafError::NotAGroundStation(station));
    }

    let mut satellites: Vec<NodeId> = topology.satellites().map(|n| n.id).collect();
    if let GroundLinkPolicy::Nearest { count } = policy {
        let origin = topology.position(station, 0.0);
        let distance = |id: &NodeId| match (origin, topology.position(*id, 0.0)) {
            (Some(a), Some(b)) => (a - b).norm(),
            _ => f64::INFINITY,
        };
        satellites.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        satellites.truncate(count);
    }

    for satellite in &satellites {
        let mut channel = PointToPointChannel::dynamic();
        if let Some(model) = &loss {
            channel = channel.with_loss(Arc::clone(model));
        }
        topology.connect(station, *satellite, channel)?;
    }
    Ok(satellites.len())
}

/// Assigns one subnet per link, in link order, starting at `base`.
///
/// Each link gets the smallest power-of-two block holding its endpoints plus
/// network and broadcast addresses, so point-to-point links use /30s.
pub fn assign_addresses(topology: &mut Topology, base: Ipv4Addr) -> Result<usize> {
    let mut next = u32::from(base);
    let mut assigned = 0;

    let plan: Vec<Vec<_>> = topology
        .links()
        .map(|link| link.endpoints().map(|(_, interface)| interface).collect())
        .collect();

    for interfaces in plan {
        let block = (interfaces.len() as u32 + 2).next_power_of_two().max(4);
        let network = next
            .checked_next_multiple_of(block)
            .ok_or(GlafError::AddressSpaceExhausted(Ipv4Addr::from(next)))?;
        next = network
            .checked_add(block)
            .ok_or(GlafError::AddressSpaceExhausted(Ipv4Addr::from(network)))?;

        for (host, interface) in interfaces.into_iter().enumerate() {
            topology.set_address(interface, Ipv4Addr::from(network + 1 + host as u32));
            assigned += 1;
        }
    }

    info!("Assigned {} interface addresses from {}", assigned, base);
    Ok(assigned)
}
