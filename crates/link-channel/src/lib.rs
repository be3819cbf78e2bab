//! Link Channel
//!
//! Propagation channels connecting node interfaces:
//!
//! - Point-to-point channels with exactly two endpoints
//! - Shared broadcast channels filtered on destination address
//! - Pluggable loss and delay models evaluated on live positions
//! - 48-bit link addresses and fixed-layout link headers

use thiserror::Error;

pub mod address;
pub mod channel;
pub mod header;
pub mod propagation;

pub use address::{MacAddress, MacAllocator};
pub use channel::{
    Attachment, BroadcastChannel, Channel, Delivery, DeliverySink, PointToPointChannel,
    Transmission,
};
pub use header::{LinkHeader, PeerHeader};
pub use propagation::{ConstantSpeedDelay, DelayModel, FixedLoss, FnLoss, FreeSpaceLoss, LossModel};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Channel is full: at most {capacity} endpoints may attach")]
    Full { capacity: usize },
    #[error("Interface {0} is already attached")]
    AlreadyAttached(u32),
    #[error("Interface {0} is not attached to this channel")]
    NotAttached(u32),
    #[error("Propagation speed must be finite and positive, got {0} m/s")]
    InvalidSpeed(f64),
        #[error("Truncated header: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
