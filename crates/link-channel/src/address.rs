//! 48-bit link-layer addresses

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);
    pub const LEN: usize = 6;

    /// Address derived from a sequence number, low byte last.
    pub fn from_index(index: u64) -> Self {
        let bytes = index.to_be_bytes();
        let mut out = [0u8; 6];
        out.copy_from_slice(&bytes[2..]);
        MacAddress(out)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Hands out unique addresses in allocation order, starting at 00:00:00:00:00:01.
#[derive(Debug, Clone, Default)]
pub struct MacAllocator {
    next: u64,
}

impl MacAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> MacAddress {
        self.next += 1;
        MacAddress::from_index(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocation() {
        let mut allocator = MacAllocator::new();
        assert_eq!(allocator.allocate().to_string(), "00:00:00:00:00:01");
        assert_eq!(allocator.allocate().to_string(), "00:00:00:00:00:02");
        assert_eq!(MacAddress::from_index(0x0102).to_string(), "00:00:00:00:01:02");
    }

    #[test]
    fn test_broadcast() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(!MacAddress::from_index(7).is_broadcast());
    }
}
