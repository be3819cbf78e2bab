//! Address registry
//!
//! Maps every assigned IPv4 interface address to its owning node. Setup code
//! populates it once after address assignment; routers only read it.

use crate::{NodeId, Topology};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct AddressRegistry {
    entries: HashMap<Ipv4Addr, NodeId>,
    populated: bool,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with every addressed interface in `topology`.
    pub fn populate(&mut self, topology: &Topology) -> usize {
        self.entries.clear();
        for interface in topology.interfaces() {
            if let Some(address) = interface.address {
                self.entries.insert(address, interface.node);
            }
        }
        self.populated = true;
        info!("Address registry populated with {} entries", self.entries.len());
        self.entries.len()
    }

    /// Adds a single mapping and marks the registry usable.
    pub fn insert(&mut self, address: Ipv4Addr, node: NodeId) {
        self.entries.insert(address, node);
        self.populated = true;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.populated = false;
    }

    pub fn resolve(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.entries.get(&address).copied()
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
