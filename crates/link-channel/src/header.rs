//! Fixed-layout link headers
//!
//! `LinkHeader` is used on shared channels where frames carry both
//! addresses. `PeerHeader` is the single-peer variant for point-to-point
//! channels where the destination is implied. Protocol numbers are
//! big-endian on the wire.

use crate::{ChannelError, MacAddress, Result};
use serde::{Deserialize, Serialize};

/// EtherType-style protocol number for IPv4 payloads.
pub const PROTOCOL_IPV4: u16 = 0x0800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHeader {
    pub source: MacAddress,
    pub destination: MacAddress,
    pub protocol: u16,
}

impl LinkHeader {
    pub const SIZE: usize = 14;

    pub fn new(source: MacAddress, destination: MacAddress, protocol: u16) -> Self {
        Self {
            source,
            destination,
            protocol,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.source.as_bytes());
        buf.extend_from_slice(self.destination.as_bytes());
        buf.extend_from_slice(&self.protocol.to_be_bytes());
    }

    /// Parses a header and returns it with the remaining payload.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < Self::SIZE {
            return Err(ChannelError::Truncated {
                needed: Self::SIZE,
                got: bytes.len(),
            });
        }
        let header = LinkHeader {
            source: read_address(&bytes[0..6]),
            destination: read_address(&bytes[6..12]),
            protocol: u16::from_be_bytes([bytes[12], bytes[13]]),
        };
        Ok((header, &bytes[Self::SIZE..]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHeader {
    pub source: MacAddress,
    pub protocol: u16,
}

impl PeerHeader {
    pub const SIZE: usize = 8;

    pub fn new(source: MacAddress, protocol: u16) -> Self {
        Self { source, protocol }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.source.as_bytes());
        buf.extend_from_slice(&self.protocol.to_be_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < Self::SIZE {
            return Err(ChannelError::Truncated {
                needed: Self::SIZE,
                got: bytes.len(),
            });
        }
        let header = PeerHeader {
            source: read_address(&bytes[0..6]),
            protocol: u16::from_be_bytes([bytes[6], bytes[7]]),
        };
        Ok((header, &bytes[Self::SIZE..]))
    }
}

fn read_address(bytes: &[u8]) -> MacAddress {
    let mut out = [0u8; 6];
    out.copy_from_slice(bytes);
    MacAddress(out)
}
