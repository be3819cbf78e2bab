//! Orbital GLAF - Graph Layer Analytical Feed
//!
//! Topology and lookup structures for the constellation network:
//!
//! - Constellation topology (satellites + ground stations, their interfaces
//!   and the links wired between them at setup)
//! - Address registry resolving IPv4 addresses to nodes
//! - Global inter-satellite graph shared by shortest-path routers
//! - Wiring helpers and snapshot export

use link_channel::{Attachment, BroadcastChannel, Channel, MacAddress, MacAllocator};
use orbital_mechanics::{Mobility, OrbitalElements, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

pub mod builder;
pub mod export;
pub mod graph;
pub mod registry;

pub use graph::GlobalGraph;
pub use registry::AddressRegistry;

/// GLAF errors
#[derive(Error, Debug)]
pub enum GlafError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Duplicate node name: {0}")]
    DuplicateName(String),
    #[error("Plane {plane} already has a satellite in slot {slot}")]
    DuplicateSlot { plane: u32, slot: u32 },
    #[error("Cannot link node {0} to itself")]
    SelfLink(NodeId),
    #[error("Node {0} is not a satellite")]
    NotASatellite(NodeId),
    #[error("Node {0} is not a ground station")]
    NotAGroundStation(NodeId),
    #[error("Global graph is already built")]
    GraphFrozen,
    #[error("Address space exhausted at {0}")]
    AddressSpaceExhausted(Ipv4Addr),
    #[error("Orbital error: {0}")]
    Orbital(#[from] orbital_mechanics::OrbitalError),
    #[error("Channel error: {0}")]
    Channel(#[from] link_channel::ChannelError),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GlafError>;

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if-{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

// ============================================================================
// Nodes, interfaces, links
// ============================================================================

/// Node kind, fixed at creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    Satellite { plane: u32, slot: u32 },
    GroundStation,
}

/// A node in the constellation
#[derive(Debug, Clone)]
pub struct ConstellationNode {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    pub mobility: Mobility,
    pub interfaces: Vec<InterfaceId>,
}

impl ConstellationNode {
    pub fn is_satellite(&self) -> bool {
        matches!(self.node_type, NodeType::Satellite { .. })
    }

    pub fn is_ground_station(&self) -> bool {
        matches!(self.node_type, NodeType::GroundStation)
    }

    pub fn position(&self, t_s: f64) -> Vec3 {
        self.mobility.position(t_s)
    }
}

/// A network interface bound to exactly one link.
#[derive(Debug, Clone)]
pub struct Interface {
    pub id: InterfaceId,
    pub node: NodeId,
    /// Position within the owning node's interface list.
    pub index: u32,
    pub mac: MacAddress,
    pub address: Option<Ipv4Addr>,
    pub link: LinkId,
}

/// Link types in the constellation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkType {
    /// Inter-satellite link
    InterSatellite,
    /// Satellite to ground station (downlink/uplink)
    SatelliteToGround,
    /// Ground station to ground station
    Terrestrial,
    /// Shared medium with any number of endpoints
    Shared,
}

/// A physical link, wired once at setup.
#[derive(Debug, Clone)]
pub struct ConstellationLink {
    pub id: LinkId,
    pub link_type: LinkType,
    pub channel: Channel,
}

impl ConstellationLink {
    pub fn endpoints(&self) -> impl Iterator<Item = (NodeId, InterfaceId)> + '_ {
        self.channel
            .endpoints()
            .iter()
            .map(|a| (NodeId(a.node), InterfaceId(a.interface)))
    }
}

/// A directly linked peer as seen from one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub peer: NodeId,
    /// Local outgoing interface.
    pub local: InterfaceId,
    /// Peer's interface on the same link.
    pub remote: InterfaceId,
    pub link: LinkId,
}

// ============================================================================
// Topology
// ============================================================================

/// Nodes and the physical links between them.
///
/// The set of links never changes once the run starts; only the distances
/// between endpoints do, as derived from each node's mobility.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<ConstellationNode>,
    interfaces: Vec<Interface>,
    links: Vec<ConstellationLink>,
    /// Plane index -> (slot, node), ordered by slot.
    planes: BTreeMap<u32, Vec<(u32, NodeId)>>,
    names: HashMap<String, NodeId>,
    by_address: HashMap<Ipv4Addr, InterfaceId>,
    macs: MacAllocator,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_satellite(
        &mut self,
        name: impl Into<String>,
        elements: OrbitalElements,
        plane: u32,
        slot: u32,
    ) -> Result<NodeId> {
        let mobility = Mobility::orbital(elements)?;
        let members = self.planes.get(&plane).map(Vec::as_slice).unwrap_or(&[]);
        if members.iter().any(|(s, _)| *s == slot) {
            return Err(GlafError::DuplicateSlot { plane, slot });
        }

        let id = self.add_node(name.into(), NodeType::Satellite { plane, slot }, mobility)?;
        let members = self.planes.entry(plane).or_default();
        let at = members.partition_point(|(s, _)| *s < slot);
        members.insert(at, (slot, id));
        Ok(id)
    }

    pub fn add_ground_station(
        &mut self,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<NodeId> {
        let mobility = Mobility::ground(latitude, longitude)?;
        self.add_node(name.into(), NodeType::GroundStation, mobility)
    }

    fn add_node(&mut self, name: String, node_type: NodeType, mobility: Mobility) -> Result<NodeId> {
        if self.names.contains_key(&name) {
            return Err(GlafError::DuplicateName(name));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.names.insert(name.clone(), id);
        self.nodes.push(ConstellationNode {
            id,
            name,
            node_type,
            mobility,
            interfaces: Vec::new(),
        });
        Ok(id)
    }

    /// Wires a two-endpoint link between `a` and `b` over `channel`.
    pub fn connect(&mut self, a: NodeId, b: NodeId, channel: impl Into<Channel>) -> Result<LinkId> {
        if a == b {
            return Err(GlafError::SelfLink(a));
        }
        let link_type = match (self.node_type(a)?, self.node_type(b)?) {
            (NodeType::Satellite { .. }, NodeType::Satellite { .. }) => LinkType::InterSatellite,
            (NodeType::GroundStation, NodeType::GroundStation) => LinkType::Terrestrial,
            _ => LinkType::SatelliteToGround,
        };
        self.wire(&[a, b], channel.into(), link_type)
    }

    /// Wires a shared medium between all of `members`.
    pub fn connect_shared(&mut self, members: &[NodeId], channel: BroadcastChannel) -> Result<LinkId> {
        for node in members {
            self.node_type(*node)?;
        }
        self.wire(members, Channel::Broadcast(channel), LinkType::Shared)
    }

    fn wire(&mut self, members: &[NodeId], mut channel: Channel, link_type: LinkType) -> Result<LinkId> {
        let link = LinkId(self.links.len() as u32);
        let first_interface = self.interfaces.len() as u32;

        // A rejected attachment must leave the topology untouched.
        let mut macs = self.macs.clone();
        let mut pending = Vec::with_capacity(members.len());
        for (offset, node) in members.iter().enumerate() {
            let interface = first_interface + offset as u32;
            let mac = macs.allocate();
            channel.attach(Attachment {
                node: node.0,
                interface,
                address: mac,
                mobility: self.nodes[node.0 as usize].mobility,
            })?;
            pending.push((*node, InterfaceId(interface), mac));
        }
        self.macs = macs;

        for (node, id, mac) in pending {
            let owner = &mut self.nodes[node.0 as usize];
            owner.interfaces.push(id);
            self.interfaces.push(Interface {
                id,
                node,
                index: owner.interfaces.len() as u32 - 1,
                mac,
                address: None,
                link,
            });
        }
        self.links.push(ConstellationLink {
            id: link,
            link_type,
            channel,
        });
        Ok(link)
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&ConstellationNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node_type(&self, id: NodeId) -> Result<NodeType> {
        self.node(id)
            .map(|n| n.node_type)
            .ok_or(GlafError::NodeNotFound(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConstellationNode> {
        self.nodes.iter()
    }

    pub fn satellites(&self) -> impl Iterator<Item = &ConstellationNode> {
        self.nodes.iter().filter(|n| n.is_satellite())
    }

    pub fn ground_stations(&self) -> impl Iterator<Item = &ConstellationNode> {
        self.nodes.iter().filter(|n| n.is_ground_station())
    }

    pub fn is_satellite(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(ConstellationNode::is_satellite)
    }

    pub fn is_ground_station(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(ConstellationNode::is_ground_station)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.get(id.0 as usize)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn link(&self, id: LinkId) -> Option<&ConstellationLink> {
        self.links.get(id.0 as usize)
    }

    pub fn links(&self) -> impl Iterator<Item = &ConstellationLink> {
        self.links.iter()
    }

    // ------------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------------

    pub fn position(&self, id: NodeId, t_s: f64) -> Option<Vec3> {
        self.node(id).map(|n| n.position(t_s))
    }

    pub fn distance(&self, a: NodeId, b: NodeId, t_s: f64) -> Option<f64> {
        Some((self.position(a, t_s)? - self.position(b, t_s)?).norm())
    }

    // ------------------------------------------------------------------------
    // Adjacency
    // ------------------------------------------------------------------------

    /// Peers reachable over links with exactly two endpoints, in interface order.
    pub fn neighbors(&self, id: NodeId) -> Vec<Neighbor> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        node.interfaces
            .iter()
            .filter_map(|local| {
                let link = self.interface(*local)?.link;
                let peer = self.link(link)?.channel.peer_of(local.0)?;
                Some(Neighbor {
                    peer: NodeId(peer.node),
                    local: *local,
                    remote: InterfaceId(peer.interface),
                    link,
                })
            })
            .collect()
    }

    /// First direct link from `from` to `to`.
    pub fn link_between(&self, from: NodeId, to: NodeId) -> Option<Neighbor> {
        self.neighbors(from).into_iter().find(|n| n.peer == to)
    }

    /// The interface at the far end of a two-endpoint link.
    pub fn peer_interface(&self, id: InterfaceId) -> Option<InterfaceId> {
        let link = self.interface(id)?.link;
        self.link(link)?
            .channel
            .peer_of(id.0)
            .map(|a| InterfaceId(a.interface))
    }

    /// Members of an orbital plane, ordered by slot.
    pub fn plane(&self, plane: u32) -> Vec<NodeId> {
        self.planes
            .get(&plane)
            .map(|members| members.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default()
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Previous and next satellite in the node's own plane ring.
    pub fn ring_neighbors(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        let NodeType::Satellite { plane, .. } = self.node(id)?.node_type else {
            return None;
        };
        let members = self.planes.get(&plane)?;
        let n = members.len();
        if n < 2 {
            return None;
        }
        let idx = members.iter().position(|(_, member)| *member == id)?;
        Some((members[(idx + n - 1) % n].1, members[(idx + 1) % n].1))
    }

    // ------------------------------------------------------------------------
    // Addressing
    // ------------------------------------------------------------------------

    pub(crate) fn set_address(&mut self, id: InterfaceId, address: Ipv4Addr) {
        if let Some(interface) = self.interfaces.get_mut(id.0 as usize) {
            if let Some(previous) = interface.address.replace(address) {
                self.by_address.remove(&previous);
            }
            self.by_address.insert(address, id);
        }
    }

    pub fn addresses(&self, id: NodeId) -> Vec<Ipv4Addr> {
        self.node(id)
            .map(|node| {
                node.interfaces
                    .iter()
                    .filter_map(|i| self.interface(*i)?.address)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lowest-index assigned address on the node.
    pub fn primary_address(&self, id: NodeId) -> Option<Ipv4Addr> {
        self.addresses(id).into_iter().next()
    }

    pub fn owns_address(&self, id: NodeId, address: Ipv4Addr) -> bool {
        self.addresses(id).contains(&address)
    }

    pub fn interface_by_address(&self, address: Ipv4Addr) -> Option<&Interface> {
        self.by_address.get(&address).and_then(|id| self.interface(*id))
    }

    /// Get topology statistics
    pub fn stats(&self) -> TopologyStats {
        let mut isl_links = 0;
        let mut gs_links = 0;
        for link in &self.links {
            match link.link_type {
                LinkType::InterSatellite => isl_links += 1,
                LinkType::SatelliteToGround => gs_links += 1,
                LinkType::Terrestrial | LinkType::Shared => {}
            }
        }

        TopologyStats {
            total_nodes: self.nodes.len(),
            satellites: self.satellites().count(),
            ground_stations: self.ground_stations().count(),
            planes: self.planes.len(),
            total_links: self.links.len(),
            isl_links,
            gs_links,
            addressed_interfaces: self.interfaces.iter().filter(|i| i.address.is_some()).count(),
        }
    }
}

/// Topology statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyStats {
    pub total_nodes: usize,
    pub satellites: usize,
    pub ground_stations: usize,
    pub planes: usize,
    pub total_links: usize,
    pub isl_links: usize,
    pub gs_links: usize,
    pub addressed_interfaces: usize,
}
