//! Topology snapshot export
//!
//! Freezes node positions and link geometry at one simulated instant into a
//! serializable structure for plotting or offline analysis.

use crate::{LinkType, NodeType, Result, Topology, TopologyStats};
use orbital_mechanics::transforms::cartesian_to_geodetic;
use orbital_mechanics::{GeodeticPosition, SPEED_OF_LIGHT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plane: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    pub position_m: [f64; 3],
    pub geodetic: GeodeticPosition,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub id: u32,
    pub link_type: LinkType,
    pub endpoints: Vec<u32>,
    /// Only set for two-endpoint links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<f64>,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub time_s: f64,
    pub nodes: Vec<NodeSnapshot>,
    pub links: Vec<LinkSnapshot>,
    pub stats: TopologyStats,
}

/// Link type to color
fn link_type_to_color(link_type: LinkType) -> String {
    match link_type {
        LinkType::InterSatellite => "#3b82f6".to_string(),    // Blue
        LinkType::SatelliteToGround => "#22c55e".to_string(), // Green
        LinkType::Terrestrial => "#6b7280".to_string(),       // Gray
        LinkType::Shared => "#eab308".to_string(),            // Yellow
    }
}

/// Capture the topology at `time_s`.
pub fn snapshot(topology: &Topology, time_s: f64) -> TopologySnapshot {
    let nodes = topology
        .nodes()
        .map(|node| {
            let position = node.position(time_s);
            let (node_type, plane, slot) = match node.node_type {
                NodeType::Satellite { plane, slot } => ("satellite", Some(plane), Some(slot)),
                NodeType::GroundStation => ("ground_station", None, None),
            };
            NodeSnapshot {
                id: node.id.0,
                name: node.name.clone(),
                node_type: node_type.to_string(),
                plane,
                slot,
                position_m: [position.x, position.y, position.z],
                geodetic: cartesian_to_geodetic(&position),
                addresses: topology
                    .addresses(node.id)
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
            }
        })
        .collect();

    let links = topology
        .links()
        .map(|link| {
            let endpoints: Vec<_> = link.endpoints().map(|(node, _)| node).collect();
            let distance_m = match endpoints.as_slice() {
                [a, b] => topology.distance(*a, *b, time_s),
                _ => None,
            };
            LinkSnapshot {
                id: link.id.0,
                link_type: link.link_type,
                endpoints: endpoints.iter().map(|n| n.0).collect(),
                distance_km: distance_m.map(|d| d / 1000.0),
                delay_ms: distance_m.map(|d| d / SPEED_OF_LIGHT * 1000.0),
                color: link_type_to_color(link.link_type),
            }
        })
        .collect();

    TopologySnapshot {
        time_s,
        nodes,
        links,
        stats: topology.stats(),
    }
}

/// Export a snapshot to pretty JSON
pub fn to_json(snapshot: &TopologySnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}
