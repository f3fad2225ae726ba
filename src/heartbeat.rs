//! Failure detection. Every interval each peer gets a PING, and a single failed probe of the
//! current leader is enough to start a new election. Other peers are probed too so their
//! reachability shows up in the log, but their failure triggers nothing.

use super::clock::LamportClock;
use super::config::Config;
use super::election::ElectionCoordinator;
use super::peers::PeerDirectory;
use super::rpc::{Body, Message};
use super::transport::{Outbox, Transport};
use super::NodeId;
use futures::future::join_all;
use log::{info, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What the failure detector needs from the election.
pub trait Elector: Send + Sync + 'static {
    fn current_leader(&self) -> Option<NodeId>;

    /// Start an election without waiting for it to finish
    fn trigger_election(&self);
}

impl<T: Transport> Elector for ElectionCoordinator<T> {
    fn current_leader(&self) -> Option<NodeId> {
        ElectionCoordinator::current_leader(self)
    }

    fn trigger_election(&self) {
        self.spawn_election();
    }
}

impl<E: Elector> Elector for Arc<E> {
    fn current_leader(&self) -> Option<NodeId> {
        (**self).current_leader()
    }

    fn trigger_election(&self) {
        (**self).trigger_election()
    }
}

pub struct FailureDetector<T, E> {
    own_id: NodeId,
    addr: String,
    peers: PeerDirectory,
    outbox: Outbox<T>,
    elector: E,
    clock: Arc<LamportClock>,
    interval: Duration,
}

impl<T: Transport, E: Elector> FailureDetector<T, E> {
    pub fn new(
        config: &Config,
        peers: PeerDirectory,
        outbox: Outbox<T>,
        elector: E,
        clock: Arc<LamportClock>,
    ) -> Self {
        Self {
            own_id: config.id,
            addr: config.advertised_addr(),
            peers,
            outbox,
            elector,
            clock,
            interval: config.heartbeat_interval(),
        }
    }

    /// Probe every peer once, all in parallel. Returns the ids that didn't answer.
    pub async fn probe_round(&self) -> Vec<NodeId> {
        let probes = self.peers.iter().map(|(id, addr)| async move {
            let ping = Message::new(
                self.own_id,
                Body::Ping {
                    addr: Some(self.addr.clone()),
                },
            );
            (id, addr, self.outbox.send(addr, ping).await)
        });

        let mut unreachable = Vec::new();
        for (id, addr, res) in join_all(probes).await {
            let err = match res {
                Ok(()) => {
                    trace!("[{}][{}] peer {} alive", self.own_id, self.clock.get(), id);
                    continue;
                }
                Err(err) => err,
            };
            info!(
                "[{}][{}] peer {} unreachable at {}: {}",
                self.own_id,
                self.clock.get(),
                id,
                addr,
                err
            );
            unreachable.push(id);
            if self.elector.current_leader() == Some(id) {
                info!(
                    "[{}][{}] leader {} failed, starting election",
                    self.own_id,
                    self.clock.get(),
                    id
                );
                self.elector.trigger_election();
            }
        }
        unreachable
    }

    /// Probe rounds, one per interval, for as long as the returned future is polled. A round
    /// that overruns the interval delays the next one rather than overlapping it.
    pub async fn run(&self) {
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            self.probe_round().await;
        }
    }
}
