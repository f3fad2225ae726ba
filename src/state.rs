use super::NodeId;
use core::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Election state of one node. Shared by every task running on its behalf.
pub struct ElectionState {
    own_id: NodeId,
    /// Last leader we know of. Any COORDINATOR overwrites it, last one in wins
    leader: watch::Sender<Option<NodeId>>,
    /// Held while an election started by this node is running
    in_flight: AtomicBool,
    /// Set when a higher peer answers our ELECTION
    ok: watch::Sender<bool>,
}

/// An election round started by this node. Dropping it lets the next one begin.
pub struct Round<'a> {
    state: &'a ElectionState,
}

impl ElectionState {
    pub fn new(own_id: NodeId) -> Self {
        Self {
            own_id,
            leader: watch::channel(None).0,
            in_flight: AtomicBool::new(false),
            ok: watch::channel(false).0,
        }
    }

    pub fn own_id(&self) -> NodeId {
        self.own_id
    }

    pub fn leader(&self) -> Option<NodeId> {
        *self.leader.borrow()
    }

    /// Returns the leader that was replaced
    pub fn set_leader(&self, leader: NodeId) -> Option<NodeId> {
        self.leader.send_replace(Some(leader))
    }

    pub fn watch_leader(&self) -> watch::Receiver<Option<NodeId>> {
        self.leader.subscribe()
    }

    /// Never waits: if a round is already running this returns `None` and the caller drops its
    /// attempt.
    pub fn try_begin_round(&self) -> Option<Round<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Round { state: self })
    }

    pub fn round_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Safe to call at any time, an OK nobody is waiting for is kept until the next round
    /// resets it.
    pub fn signal_ok(&self) {
        self.ok.send_replace(true);
    }
}

impl Round<'_> {
    /// Forget any OK from earlier rounds and start listening for a new one
    pub fn reset_ok(&self) -> watch::Receiver<bool> {
        self.state.ok.send_replace(false);
        self.state.ok.subscribe()
    }

    /// Whether an OK arrived within `timeout`
    pub async fn wait_for_ok(&self, mut ok: watch::Receiver<bool>, timeout: Duration) -> bool {
        let received = async move { ok.wait_for(|&set| set).await.is_ok() };
        matches!(tokio::time::timeout(timeout, received).await, Ok(true))
    }
}

impl Drop for Round<'_> {
    fn drop(&mut self) {
        self.state.in_flight.store(false, Ordering::Release);
    }
}
