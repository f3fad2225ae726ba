//! The Bully election.
//!
//! A node starts an election by challenging every peer with a higher id. If none of them answers
//! OK within the timeout, the node has the highest live id, takes the leadership and announces
//! it to everyone with COORDINATOR. A node that receives a challenge from a lower id answers OK
//! and then runs its own election, so leadership climbs to the highest live id.
//!
//! Nodes keep no election term. A COORDINATOR always overwrites the known leader, even when it is
//! older than the leader it replaces, and the cluster converges through re-elections triggered by
//! the failure detector.

use super::clock::LamportClock;
use super::config::Config;
use super::peers::PeerDirectory;
use super::rpc::{Body, Message};
use super::state::ElectionState;
use super::transport::{Outbox, Transport};
use super::{NodeId, Timestamp};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ElectionCoordinator<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: ElectionState,
    /// advertised to peers so they can answer
    addr: String,
    peers: PeerDirectory,
    outbox: Outbox<T>,
    clock: Arc<LamportClock>,
    ok_timeout: Duration,
}

impl<T> Clone for ElectionCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> ElectionCoordinator<T> {
    pub fn new(
        config: &Config,
        peers: PeerDirectory,
        outbox: Outbox<T>,
        clock: Arc<LamportClock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: ElectionState::new(config.id),
                addr: config.advertised_addr(),
                peers,
                outbox,
                clock,
                ok_timeout: config.ok_timeout(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.state.own_id()
    }

    pub fn current_leader(&self) -> Option<NodeId> {
        self.inner.state.leader()
    }

    /// Notified on every COORDINATOR processed and every self promotion
    pub fn watch_leader(&self) -> watch::Receiver<Option<NodeId>> {
        self.inner.state.watch_leader()
    }

    /// Whether an election started by this node is running
    pub fn is_electing(&self) -> bool {
        self.inner.state.round_in_flight()
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.inner.peers
    }

    /// Run one election round. Does nothing if this node already has one running.
    ///
    /// Blocks the calling task for at most the OK timeout. Sends go out on their own tasks so a
    /// slow peer never holds up the round.
    pub async fn start_election(&self) {
        let inner = &*self.inner;
        let own_id = self.id();
        let round = match inner.state.try_begin_round() {
            Some(round) => round,
            None => {
                debug!(
                    "[{}][{}] election already running, ignoring",
                    own_id,
                    inner.clock.get()
                );
                return;
            }
        };
        info!("[{}][{}] starting election", own_id, inner.clock.get());

        if inner.peers.higher_than(own_id).next().is_none() {
            info!(
                "[{}][{}] no peer with a higher id, taking leadership",
                own_id,
                inner.clock.get()
            );
            self.become_leader();
            return;
        }

        let ok = round.reset_ok();
        for (_, addr) in inner.peers.higher_than(own_id) {
            inner.outbox.post(
                addr,
                Message::new(
                    own_id,
                    Body::Election {
                        addr: Some(inner.addr.clone()),
                    },
                ),
            );
        }

        if round.wait_for_ok(ok, inner.ok_timeout).await {
            info!(
                "[{}][{}] received OK, waiting for a coordinator",
                own_id,
                inner.clock.get()
            );
            return;
        }
        info!(
            "[{}][{}] no OK received, taking leadership",
            own_id,
            inner.clock.get()
        );
        self.become_leader();
    }

    /// Run an election on its own task
    pub fn spawn_election(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.start_election().await })
    }

    fn become_leader(&self) {
        let inner = &*self.inner;
        let own_id = self.id();
        inner.state.set_leader(own_id);
        for (_, addr) in inner.peers.iter() {
            inner.outbox.post(
                addr,
                Message::new(
                    own_id,
                    Body::Coordinator {
                        leader: Some(own_id),
                        addr: Some(inner.addr.clone()),
                    },
                ),
            );
        }
    }

    /// Apply a received message. `local` is the clock value of the receive event.
    ///
    /// Never waits on the network: replies and follow-up elections run on their own tasks.
    pub fn handle_message(&self, message: Message, local: Timestamp) {
        let inner = &*self.inner;
        let own_id = self.id();
        let from = message.from;
        match message.body {
            Body::Election { addr } => match from {
                Some(from) if from < own_id => {
                    debug!("[{}][{}] ELECTION from {}", own_id, local, from);
                    match addr {
                        Some(addr) => inner.outbox.post(
                            &addr,
                            Message::new(
                                own_id,
                                Body::Ok {
                                    addr: Some(inner.addr.clone()),
                                },
                            ),
                        ),
                        None => debug!(
                            "[{}][{}] ELECTION from {} has no reply address",
                            own_id, local, from
                        ),
                    }
                    self.spawn_election();
                }
                _ => debug!(
                    "[{}][{}] ELECTION from {:?} does not rank below us, not answering",
                    own_id, local, from
                ),
            },
            Body::Ok { .. } => {
                info!("[{}][{}] received OK from {:?}", own_id, local, from);
                inner.state.signal_ok();
            }
            Body::Coordinator { leader, .. } => match leader {
                Some(leader) => {
                    inner.state.set_leader(leader);
                    info!("[{}][{}] new leader {}", own_id, local, leader);
                }
                None => warn!(
                    "[{}][{}] COORDINATOR from {:?} without a valid leader id, ignoring",
                    own_id, local, from
                ),
            },
            Body::Ping { .. } => debug!("[{}][{}] ping from {:?}", own_id, local, from),
            Body::Unknown(kind) => debug!(
                "[{}][{}] dropping message of unknown type {:?} from {:?}",
                own_id, local, kind, from
            ),
        }
    }
}
