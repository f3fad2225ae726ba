//! Bully leader election over a fixed set of peers, with Lamport timestamps on every message.

/// Peers are ranked by id, the highest live id wins an election.
pub type NodeId = u64;
/// A Lamport timestamp. Every send ticks the local clock, every receive advances it past the sender's.
pub type Timestamp = u64;

pub mod clock;
pub mod config;
pub mod election;
pub mod heartbeat;
pub mod http;
pub mod node;
pub mod peers;
pub mod rpc;
mod state;
pub mod transport;

pub use clock::LamportClock;
pub use config::{Config, ConfigError};
pub use election::ElectionCoordinator;
pub use heartbeat::{Elector, FailureDetector};
pub use node::{GetStatus, LocalEvent, Node, NodeStatus, StartElection};
pub use peers::PeerDirectory;
pub use rpc::{Body, Message};
pub use transport::{Inbox, Outbox, Transport, TransportError};
