use super::clock::LamportClock;
use super::config::{Config, ConfigError};
use super::election::ElectionCoordinator;
use super::heartbeat::FailureDetector;
use super::transport::{Inbox, Outbox, Transport};
use super::{NodeId, Timestamp};
use actix::{Actor, AsyncContext, Context, Handler, Message, MessageResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A cluster member: its clock, its view of the election and its failure detector.
///
/// Once started it runs a first election after the configured startup delay and keeps probing
/// its peers until the actor stops. Inbound messages don't pass through the actor, the transport
/// hands them straight to the [`Inbox`] so handling is never serialised behind the mailbox.
pub struct Node<T: Transport> {
    config: Arc<Config>,
    clock: Arc<LamportClock>,
    coordinator: ElectionCoordinator<T>,
    detector: Arc<FailureDetector<T, ElectionCoordinator<T>>>,
}

impl<T: Transport> Node<T> {
    pub fn new(config: Config, transport: Arc<T>) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let peers = config.peer_directory()?;
        let clock = Arc::new(LamportClock::new());
        let outbox = Outbox::new(transport, clock.clone(), config.max_in_flight_sends);
        let coordinator =
            ElectionCoordinator::new(&config, peers.clone(), outbox.clone(), clock.clone());
        let detector =
            FailureDetector::new(&config, peers, outbox, coordinator.clone(), clock.clone());
        Ok(Self {
            config: Arc::new(config),
            clock,
            coordinator,
            detector: Arc::new(detector),
        })
    }

    /// Entry point for messages arriving from peers
    pub fn inbox(&self) -> Inbox<T> {
        Inbox::new(self.clock.clone(), self.coordinator.clone())
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.config.id,
            leader: self.coordinator.current_leader(),
            clock: self.clock.get(),
        }
    }
}

impl<T: Transport> Actor for Node<T> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let peers: Vec<NodeId> = self.coordinator.peers().iter().map(|(id, _)| id).collect();
        info!(
            "[{}][{}] starting node at {} with peers {:?}",
            self.config.id,
            self.clock.get(),
            self.config.advertised_addr(),
            peers
        );
        ctx.notify_later(StartElection, self.config.startup_delay());
        let detector = self.detector.clone();
        ctx.spawn(actix::fut::wrap_future(async move { detector.run().await }));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("[{}][{}] node stopped", self.config.id, self.clock.get());
    }
}

/// Start an election now. Dropped if one is already running.
#[derive(Message)]
#[rtype(result = "()")]
pub struct StartElection;

impl<T: Transport> Handler<StartElection> for Node<T> {
    type Result = ();

    fn handle(&mut self, _: StartElection, _ctx: &mut Self::Context) -> Self::Result {
        self.coordinator.spawn_election();
    }
}

#[derive(Message)]
#[rtype(result = "NodeStatus")]
pub struct GetStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub leader: Option<NodeId>,
    pub clock: Timestamp,
}

impl<T: Transport> Handler<GetStatus> for Node<T> {
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _: GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.status())
    }
}

/// Something happened on this node that isn't a message, e.g. an operator command. Ticks the
/// clock and replies with the event's timestamp.
#[derive(Message)]
#[rtype(result = "Timestamp")]
pub struct LocalEvent(pub String);

impl<T: Transport> Handler<LocalEvent> for Node<T> {
    type Result = MessageResult<LocalEvent>;

    fn handle(&mut self, LocalEvent(event): LocalEvent, _ctx: &mut Self::Context) -> Self::Result {
        let ts = self.clock.tick();
        info!("[{}][{}] local event: {}", self.config.id, ts, event);
        MessageResult(ts)
    }
}
