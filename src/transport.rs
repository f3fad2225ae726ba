//! The boundary between the election core and whatever carries messages between nodes.
//!
//! Outbound, the [`Outbox`] stamps each message with a fresh tick of the node's clock and hands
//! it to a [`Transport`]. Inbound, the [`Inbox`] advances the clock past the sender's timestamp
//! and passes the message on to the coordinator.

use super::clock::LamportClock;
use super::election::ElectionCoordinator;
use super::rpc::Message;
use super::Timestamp;
use async_trait::async_trait;
use log::{debug, trace};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Couldn't reach the peer at all, or it didn't answer in time
    #[error("{target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    /// The peer answered with a failure status
    #[error("{target} rejected the message with status {status}")]
    Rejected { target: String, status: u16 },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Point to point delivery of a message to a peer address.
///
/// A returned error means the message may not have arrived. Callers treat every kind of failure
/// as the peer being unreachable.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, target: &str, message: Message) -> Result<(), TransportError>;
}

/// Outbound side of a node.
pub struct Outbox<T> {
    transport: Arc<T>,
    clock: Arc<LamportClock>,
    permits: Arc<Semaphore>,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            clock: self.clock.clone(),
            permits: self.permits.clone(),
        }
    }
}

impl<T: Transport> Outbox<T> {
    /// At most `max_in_flight` posted messages are being delivered at any time, the rest wait
    /// their turn.
    pub fn new(transport: Arc<T>, clock: Arc<LamportClock>, max_in_flight: usize) -> Self {
        Self {
            transport,
            clock,
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Tick the clock, stamp the message and deliver it.
    pub async fn send(&self, target: &str, message: Message) -> Result<(), TransportError> {
        let ts = self.clock.tick();
        trace!("-> {} {} ts={}", target, message.body.kind(), ts);
        self.transport.send(target, message.stamped(ts)).await
    }

    /// Fire and forget. Delivery happens on its own task and a failure is only logged.
    pub fn post(&self, target: &str, message: Message) {
        let outbox = self.clone();
        let target = target.to_string();
        tokio::spawn(async move {
            let _permit = match outbox.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let kind = message.body.kind().to_string();
            if let Err(err) = outbox.send(&target, message).await {
                debug!("failed to send {} to {}: {}", kind, target, err);
            }
        });
    }
}

/// Inbound side of a node, fed by the transport's server half.
pub struct Inbox<T> {
    clock: Arc<LamportClock>,
    coordinator: ElectionCoordinator<T>,
}

impl<T> Clone for Inbox<T> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<T: Transport> Inbox<T> {
    pub fn new(clock: Arc<LamportClock>, coordinator: ElectionCoordinator<T>) -> Self {
        Self { clock, coordinator }
    }

    /// Advance the clock for the receive event and hand the message to the coordinator. Returns
    /// the local timestamp of the receive.
    pub fn deliver(&self, message: Message) -> Timestamp {
        let local = self.clock.update(message.ts);
        match message.ts {
            Some(remote) => debug!(
                "<- {} from {:?} ts={} clock={}",
                message.body.kind(),
                message.from,
                remote,
                local
            ),
            None => debug!(
                "<- {} from {:?} without ts, clock={}",
                message.body.kind(),
                message.from,
                local
            ),
        }
        self.coordinator.handle_message(message, local);
        local
    }
}
