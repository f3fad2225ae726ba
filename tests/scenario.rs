//! Election scenarios between coordinators whose messages are routed by hand, so each step of the
//! protocol can be checked before the next one happens. Timers run on paused tokio time.

use async_trait::async_trait;
use bully::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const OK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Holds on to everything a node sends until the test routes it
#[derive(Default)]
struct Held {
    queue: Mutex<Vec<(String, Message)>>,
}

#[async_trait]
impl Transport for Held {
    async fn send(&self, target: &str, message: Message) -> Result<(), TransportError> {
        self.queue
            .lock()
            .unwrap()
            .push((target.to_string(), message));
        Ok(())
    }
}

struct TestNode {
    addr: String,
    coordinator: ElectionCoordinator<Held>,
    inbox: Inbox<Held>,
    held: Arc<Held>,
    clock: Arc<LamportClock>,
}

fn port(id: NodeId) -> u16 {
    9300 + id as u16
}

fn addr(id: NodeId) -> String {
    format!("http://127.0.0.1:{}", port(id))
}

struct Cluster {
    nodes: BTreeMap<NodeId, TestNode>,
    down: HashSet<NodeId>,
}

impl Cluster {
    fn new(ids: &[NodeId]) -> Cluster {
        let nodes = ids
            .iter()
            .map(|&id| {
                let peers = ids
                    .iter()
                    .filter(|&&peer| peer != id)
                    .map(|&peer| format!("{}:127.0.0.1:{}", peer, port(peer)))
                    .collect::<Vec<_>>()
                    .join(",");
                let config = Config::new(id, "127.0.0.1", port(id))
                    .with_peers(peers)
                    .validate()
                    .unwrap();
                let held = Arc::new(Held::default());
                let clock = Arc::new(LamportClock::new());
                let outbox = Outbox::new(held.clone(), clock.clone(), 16);
                let coordinator = ElectionCoordinator::new(
                    &config,
                    config.peer_directory().unwrap(),
                    outbox,
                    clock.clone(),
                );
                let node = TestNode {
                    addr: config.advertised_addr(),
                    inbox: Inbox::new(clock.clone(), coordinator.clone()),
                    coordinator,
                    held,
                    clock,
                };
                (id, node)
            })
            .collect();
        Cluster {
            nodes,
            down: HashSet::new(),
        }
    }

    fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[&id]
    }

    /// Let every spawned send and election task run as far as it can without time passing
    async fn flush(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Everything `id` has sent since the last call, in send order
    async fn take(&self, id: NodeId) -> Vec<(String, Message)> {
        self.flush().await;
        std::mem::take(&mut *self.node(id).held.queue.lock().unwrap())
    }

    /// Deliver messages to their targets. Messages to nodes that are down are lost.
    fn route(&self, messages: Vec<(String, Message)>) {
        for (target, message) in messages {
            let (id, node) = self
                .nodes
                .iter()
                .find(|(_, node)| node.addr == target)
                .unwrap();
            if self.down.contains(id) {
                continue;
            }
            let sent_at = message.ts.unwrap();
            let received_at = node.inbox.deliver(message);
            // the receive is ordered after the send
            assert!(received_at > sent_at);
        }
    }

    /// Route every node's output until nothing is in flight and no election is running.
    async fn run_until_quiet(&self) {
        for _ in 0..100 {
            let mut moved = 0;
            for &id in self.nodes.keys() {
                let out = self.take(id).await;
                moved += out.len();
                self.route(out);
            }
            let electing = self.nodes.values().any(|n| n.coordinator.is_electing());
            if moved == 0 && !electing {
                return;
            }
            tokio::time::sleep(OK_TIMEOUT / 4).await;
        }
        panic!("cluster never went quiet");
    }

    fn leaders(&self) -> Vec<Option<NodeId>> {
        self.nodes
            .iter()
            .filter(|(id, _)| !self.down.contains(*id))
            .map(|(_, node)| node.coordinator.current_leader())
            .collect()
    }
}

fn kinds(messages: &[(String, Message)]) -> Vec<(&str, &str)> {
    messages
        .iter()
        .map(|(target, message)| (message.body.kind(), target.as_str()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn lowest_node_starts_the_election_step_by_step() {
    let cluster = Cluster::new(&[1, 2, 3]);

    // node 1 challenges every node with a higher id and waits for an answer
    let challenger = cluster.node(1).coordinator.clone();
    let round = tokio::spawn(async move { challenger.start_election().await });
    let out = cluster.take(1).await;
    assert_eq!(
        kinds(&out),
        vec![("ELECTION", addr(2).as_str()), ("ELECTION", addr(3).as_str())]
    );
    for (_, message) in &out {
        assert_eq!(message.from, Some(1));
        assert_eq!(
            message.body,
            Body::Election {
                addr: Some(addr(1))
            }
        );
    }
    assert!(cluster.node(1).coordinator.is_electing());
    cluster.route(out);

    // both answer OK and run their own elections. Node 2 has node 3 above it, node 3 has
    // nobody above it so it takes over at once.
    let out2 = cluster.take(2).await;
    assert_eq!(
        kinds(&out2),
        vec![("OK", addr(1).as_str()), ("ELECTION", addr(3).as_str())]
    );
    let out3 = cluster.take(3).await;
    assert_eq!(
        kinds(&out3),
        vec![
            ("OK", addr(1).as_str()),
            ("COORDINATOR", addr(1).as_str()),
            ("COORDINATOR", addr(2).as_str())
        ]
    );
    assert_eq!(cluster.node(3).coordinator.current_leader(), Some(3));

    // an OK is all node 1 needs to stand down
    cluster.route(out2);
    cluster.route(out3);
    round.await.unwrap();
    assert!(!cluster.node(1).coordinator.is_electing());
    assert_eq!(cluster.leaders(), vec![Some(3); 3]);

    // node 3 answers node 2's challenge and announces itself again
    let out3 = cluster.take(3).await;
    assert_eq!(
        kinds(&out3),
        vec![
            ("OK", addr(2).as_str()),
            ("COORDINATOR", addr(1).as_str()),
            ("COORDINATOR", addr(2).as_str())
        ]
    );
    cluster.route(out3);

    // no one below node 3 ever claims leadership
    tokio::time::sleep(OK_TIMEOUT * 2).await;
    assert!(cluster.take(1).await.is_empty());
    assert!(cluster.take(2).await.is_empty());
    assert_eq!(cluster.leaders(), vec![Some(3); 3]);
}

#[tokio::test(start_paused = true)]
async fn silence_from_above_makes_the_challenger_leader() {
    let mut cluster = Cluster::new(&[1, 2, 3]);
    cluster.down.insert(3);

    let challenger = cluster.node(2).coordinator.clone();
    let round = tokio::spawn(async move { challenger.start_election().await });
    let out = cluster.take(2).await;
    assert_eq!(kinds(&out), vec![("ELECTION", addr(3).as_str())]);
    cluster.route(out);

    // nothing comes back before the timeout
    tokio::time::sleep(OK_TIMEOUT - Duration::from_millis(10)).await;
    assert_eq!(cluster.node(2).coordinator.current_leader(), None);
    round.await.unwrap();
    assert_eq!(cluster.node(2).coordinator.current_leader(), Some(2));

    let out = cluster.take(2).await;
    assert_eq!(
        kinds(&out),
        vec![
            ("COORDINATOR", addr(1).as_str()),
            ("COORDINATOR", addr(3).as_str())
        ]
    );
    cluster.route(out);
    assert_eq!(cluster.leaders(), vec![Some(2), Some(2)]);
}

#[tokio::test(start_paused = true)]
async fn simultaneous_challengers_settle_on_one_leader() {
    let mut cluster = Cluster::new(&[1, 2, 3, 4]);
    cluster.down.insert(4);

    cluster.node(1).coordinator.spawn_election();
    cluster.node(2).coordinator.spawn_election();
    cluster.run_until_quiet().await;

    assert_eq!(cluster.leaders(), vec![Some(3); 3]);
}

#[tokio::test(start_paused = true)]
async fn everyone_starting_at_once_elects_the_highest() {
    let cluster = Cluster::new(&[3, 8, 12, 20]);
    for node in cluster.nodes.values() {
        node.coordinator.spawn_election();
    }
    cluster.run_until_quiet().await;

    assert_eq!(cluster.leaders(), vec![Some(20); 4]);
}

#[tokio::test(start_paused = true)]
async fn clocks_only_move_forward_through_an_election() {
    let cluster = Cluster::new(&[1, 2, 3]);
    let before: Vec<Timestamp> = cluster.nodes.values().map(|n| n.clock.get()).collect();
    assert_eq!(before, vec![0, 0, 0]);

    cluster.node(1).coordinator.spawn_election();
    cluster.run_until_quiet().await;

    // everyone sent or received something
    for node in cluster.nodes.values() {
        assert!(node.clock.get() > 0);
    }
    // node 3 heard node 1's challenge, so it is ahead of node 1's first send
    assert!(cluster.node(3).clock.get() > 1);
}
