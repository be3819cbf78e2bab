//! Global inter-satellite graph
//!
//! Satellites are registered one by one and receive stable indices in
//! registration order. `build` then derives the adjacency from the
//! topology's inter-satellite links; ground links never appear here. Edges
//! carry no weight: callers weight them with live distances at query time.

use crate::{GlafError, LinkId, LinkType, NodeId, Result, Topology};
use orbital_mechanics::Vec3;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct GlobalGraph {
    graph: UnGraph<NodeId, LinkId>,
    index: HashMap<NodeId, NodeIndex>,
    built: bool,
}

impl GlobalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a satellite to the shared node set and returns its index.
    /// Registering the same node twice returns the existing index.
    pub fn register_satellite(&mut self, node: NodeId) -> Result<usize> {
        if let Some(existing) = self.index.get(&node) {
            return Ok(existing.index());
        }
        if self.built {
            return Err(GlafError::GraphFrozen);
        }
        let idx = self.graph.add_node(node);
        self.index.insert(node, idx);
        Ok(idx.index())
    }

    /// (Re)derives the adjacency from the topology's inter-satellite links.
    pub fn build(&mut self, topology: &Topology) -> Result<usize> {
        for node in self.graph.node_weights() {
            if !topology.is_satellite(*node) {
                return Err(GlafError::NotASatellite(*node));
            }
        }

        self.graph.clear_edges();
        for link in topology.links() {
            if link.link_type != LinkType::InterSatellite {
                continue;
            }
            let ends: Vec<NodeId> = link.endpoints().map(|(node, _)| node).collect();
            let [a, b] = ends.as_slice() else {
                continue;
            };
            match (self.index.get(a), self.index.get(b)) {
                (Some(ia), Some(ib)) => {
                    self.graph.add_edge(*ia, *ib, link.id);
                }
                _ => debug!("Skipping {}: endpoint not registered", link.id),
            }
        }

        self.built = true;
        info!(
            "Global graph built: {} satellites, {} inter-satellite edges",
            self.graph.node_count(),
            self.graph.edge_count()
        );
        Ok(self.graph.edge_count())
    }

    /// Drops every node and edge so setup can start over.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.index.clear();
        self.built = false;
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.index.get(&node).map(|idx| idx.index())
    }

    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        self.graph.node_weight(NodeIndex::new(index)).copied()
    }

    /// Registered satellites in index order.
    pub fn members(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_weights().copied()
    }

    pub fn neighbor_indices(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors(NodeIndex::new(index)).map(|n| n.index())
    }

    /// The registered satellite nearest to `target` at `t_s`.
    /// Ties keep the lowest index.
    pub fn closest_to(&self, topology: &Topology, target: &Vec3, t_s: f64) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for node in self.members() {
            let Some(position) = topology.position(node, t_s) else {
                continue;
            };
            let distance = (position - target).norm();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((node, distance));
            }
        }
        best.map(|(node, _)| node)
    }

    /// Underlying petgraph structure, node weights are topology ids.
    pub fn as_petgraph(&self) -> &UnGraph<NodeId, LinkId> {
        &self.graph
    }
}
