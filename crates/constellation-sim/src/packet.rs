//! Packets and link-layer frames as they travel between nodes.

use beam_routing::PacketHeader;
use link_channel::{ChannelError, LinkHeader};
use orbital_glaf::NodeId;
use std::time::Duration;

/// Network header overhead counted on the wire.
pub const IPV4_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub id: u64,
    pub header: PacketHeader,
    /// Payload size, excluding headers.
    pub size_bytes: usize,
    pub created_at: Duration,
    /// Nodes visited so far, origin first.
    pub path: Vec<NodeId>,
}

impl Packet {
    pub fn new(id: u64, header: PacketHeader, size_bytes: usize, origin: NodeId, created_at: Duration) -> Self {
        Self {
            id,
            header,
            size_bytes,
            created_at,
            path: vec![origin],
        }
    }

    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub fn origin(&self) -> Option<NodeId> {
        self.path.first().copied()
    }
}

/// A packet behind an encoded link header.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    header: Vec<u8>,
    pub packet: Packet,
}

impl Frame {
    pub fn new(link: LinkHeader, packet: Packet) -> Self {
        let mut header = Vec::with_capacity(LinkHeader::SIZE);
        link.encode(&mut header);
        Self { header, packet }
    }

    pub fn link_header(&self) -> Result<LinkHeader, ChannelError> {
        LinkHeader::decode(&self.header).map(|(header, _)| header)
    }

    /// Bytes on the wire, used for serialization delay.
    pub fn wire_len(&self) -> usize {
        self.header.len() + IPV4_HEADER_LEN + self.packet.size_bytes
    }

    /// Time to clock the frame out at `data_rate_bps`, or `None` when that
    /// time does not fit in a `Duration`.
    pub fn tx_time(&self, data_rate_bps: Option<f64>) -> Option<Duration> {
        match data_rate_bps {
            Some(rate) if rate > 0.0 && rate.is_finite() => {
                Duration::try_from_secs_f64(self.wire_len() as f64 * 8.0 / rate).ok()
            }
            _ => Some(Duration::ZERO),
        }
    }
}
