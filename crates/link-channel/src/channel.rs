//! Point-to-point and shared propagation channels
//!
//! A channel knows its attached endpoints and how they move. On every send it
//! evaluates loss and delay against the endpoints' live positions and hands
//! one `Delivery` per receiver to a `DeliverySink`, tagged with the
//! receiving node so the event lands on that node's timeline.

use crate::{ChannelError, ConstantSpeedDelay, DelayModel, LossModel, MacAddress, Result};
use orbital_mechanics::Mobility;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// An interface attached to a channel.
///
/// `node` and `interface` are identifiers assigned by the owning topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub node: u32,
    pub interface: u32,
    pub address: MacAddress,
    pub mobility: Mobility,
}

/// One frame handed to a channel.
#[derive(Debug, Clone)]
pub struct Transmission<P> {
    /// Sending interface.
    pub sender: u32,
    pub destination: MacAddress,
    pub tx_power_dbm: f64,
    /// Serialization time added ahead of propagation.
    pub tx_time: Duration,
    pub payload: P,
}

/// A scheduled arrival at one receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Receiving node; the arrival runs in this node's context.
    pub context: u32,
    /// Receiving interface.
    pub receiver: u32,
    pub source: MacAddress,
    pub delay: Duration,
    pub rx_power_dbm: f64,
}

/// Accepts arrivals computed by a channel.
pub trait DeliverySink<P> {
    fn schedule_delivery(&mut self, delivery: Delivery, payload: P);
}

impl<P> DeliverySink<P> for Vec<(Delivery, P)> {
    fn schedule_delivery(&mut self, delivery: Delivery, payload: P) {
        self.push((delivery, payload));
    }
}

/// Loss and delay models shared by both channel flavours.
#[derive(Debug, Clone, Default)]
struct Propagation {
    loss: Option<Arc<dyn LossModel>>,
    delay: Option<Arc<dyn DelayModel>>,
}

impl Propagation {
    fn deliver(
        &self,
        now_s: f64,
        sender: &Attachment,
        receiver: &Attachment,
        tx_power_dbm: f64,
        tx_time: Duration,
    ) -> Delivery {
        let from = sender.mobility.position(now_s);
        let to = receiver.mobility.position(now_s);

        let rx_power_dbm = match &self.loss {
            Some(model) => tx_power_dbm - model.loss_db(&from, &to),
            None => tx_power_dbm,
        };
        let propagation = match &self.delay {
            Some(model) => model.delay(&from, &to),
            None => Duration::ZERO,
        };

        Delivery {
            context: receiver.node,
            receiver: receiver.interface,
            source: sender.address,
            delay: tx_time.saturating_add(propagation),
            rx_power_dbm,
        }
    }
}

// ============================================================================
// Point-to-point
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PointToPointChannel {
    endpoints: Vec<Attachment>,
    propagation: Propagation,
}

impl PointToPointChannel {
    pub const CAPACITY: usize = 2;

    /// A channel with no loss and no delay models.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose delay always tracks the endpoints' distance at light speed.
    pub fn dynamic() -> Self {
        Self::new().with_delay(Arc::new(ConstantSpeedDelay::default()))
    }

    pub fn with_loss(mut self, model: Arc<dyn LossModel>) -> Self {
        self.propagation.loss = Some(model);
        self
    }

    pub fn with_delay(mut self, model: Arc<dyn DelayModel>) -> Self {
        self.propagation.delay = Some(model);
        self
    }

    pub fn attach(&mut self, attachment: Attachment) -> Result<()> {
        if self.endpoints.iter().any(|e| e.interface == attachment.interface) {
            return Err(ChannelError::AlreadyAttached(attachment.interface));
        }
        if self.endpoints.len() >= Self::CAPACITY {
            return Err(ChannelError::Full {
                capacity: Self::CAPACITY,
            });
        }
        self.endpoints.push(attachment);
        Ok(())
    }

    pub fn endpoints(&self) -> &[Attachment] {
        &self.endpoints
    }

    /// Sends to the far endpoint. Returns the number of deliveries scheduled.
    pub fn send<P, S: DeliverySink<P>>(
        &self,
        now_s: f64,
        tx: Transmission<P>,
        sink: &mut S,
    ) -> Result<usize> {
        if self.endpoints.len() < Self::CAPACITY {
            return Ok(0);
        }
        let (sender, receiver) = match self.endpoints.iter().position(|e| e.interface == tx.sender) {
            Some(0) => (&self.endpoints[0], &self.endpoints[1]),
            Some(_) => (&self.endpoints[1], &self.endpoints[0]),
            None => return Err(ChannelError::NotAttached(tx.sender)),
        };

        let delivery = self
            .propagation
            .deliver(now_s, sender, receiver, tx.tx_power_dbm, tx.tx_time);
        trace!(
            "p2p {} -> node {} in {:?} at {:.1} dBm",
            sender.address,
            receiver.node,
            delivery.delay,
            delivery.rx_power_dbm
        );
        sink.schedule_delivery(delivery, tx.payload);
        Ok(1)
    }
}

// ============================================================================
// Broadcast
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BroadcastChannel {
    endpoints: Vec<Attachment>,
    propagation: Propagation,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss(mut self, model: Arc<dyn LossModel>) -> Self {
        self.propagation.loss = Some(model);
        self
    }

    pub fn with_delay(mut self, model: Arc<dyn DelayModel>) -> Self {
        self.propagation.delay = Some(model);
        self
    }

    pub fn attach(&mut self, attachment: Attachment) -> Result<()> {
        if self.endpoints.iter().any(|e| e.interface == attachment.interface) {
            return Err(ChannelError::AlreadyAttached(attachment.interface));
        }
        self.endpoints.push(attachment);
        Ok(())
    }

    pub fn endpoints(&self) -> &[Attachment] {
        &self.endpoints
    }

    /// Delivers to every other endpoint whose address matches the
    /// destination, or to all of them for a broadcast destination.
    pub fn send<P: Clone, S: DeliverySink<P>>(
        &self,
        now_s: f64,
        tx: Transmission<P>,
        sink: &mut S,
    ) -> Result<usize> {
        if self.endpoints.len() < 2 {
            return Ok(0);
        }
        let sender = self
            .endpoints
            .iter()
            .find(|e| e.interface == tx.sender)
            .ok_or(ChannelError::NotAttached(tx.sender))?;

        let mut scheduled = 0;
        for receiver in &self.endpoints {
            if receiver.interface == sender.interface {
                continue;
            }
            if !tx.destination.is_broadcast() && receiver.address != tx.destination {
                continue;
            }
            let delivery = self
                .propagation
                .deliver(now_s, sender, receiver, tx.tx_power_dbm, tx.tx_time);
            sink.schedule_delivery(delivery, tx.payload.clone());
            scheduled += 1;
        }
        trace!("broadcast from {} reached {} receivers", sender.address, scheduled);
        Ok(scheduled)
    }
}

// ============================================================================
// Channel
// ============================================================================

#[derive(Debug, Clone)]
pub enum Channel {
    PointToPoint(PointToPointChannel),
    Broadcast(BroadcastChannel),
}

impl Channel {
    pub fn attach(&mut self, attachment: Attachment) -> Result<()> {
        match self {
            Channel::PointToPoint(channel) => channel.attach(attachment),
            Channel::Broadcast(channel) => channel.attach(attachment),
        }
    }

    pub fn endpoints(&self) -> &[Attachment] {
        match self {
            Channel::PointToPoint(channel) => channel.endpoints(),
            Channel::Broadcast(channel) => channel.endpoints(),
        }
    }

    /// Maximum number of endpoints, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Channel::PointToPoint(_) => Some(PointToPointChannel::CAPACITY),
            Channel::Broadcast(_) => None,
        }
    }

    /// The other endpoint, when exactly two are attached.
    pub fn peer_of(&self, interface: u32) -> Option<&Attachment> {
        match self.endpoints() {
            [a, b] if a.interface == interface => Some(b),
            [a, b] if b.interface == interface => Some(a),
            _ => None,
        }
    }

    pub fn send<P: Clone, S: DeliverySink<P>>(
        &self,
        now_s: f64,
        tx: Transmission<P>,
        sink: &mut S,
    ) -> Result<usize> {
        match self {
            Channel::PointToPoint(channel) => channel.send(now_s, tx, sink),
            Channel::Broadcast(channel) => channel.send(now_s, tx, sink),
        }
    }
}

impl From<PointToPointChannel> for Channel {
    fn from(channel: PointToPointChannel) -> Self {
        Channel::PointToPoint(channel)
    }
}

impl From<BroadcastChannel> for Channel {
    fn from(channel: BroadcastChannel) -> Self {
        Channel::Broadcast(channel)
    }
}
