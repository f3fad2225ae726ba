//! Nodes talk with four kinds of message. ELECTION is sent by a node to every peer with a higher id
//! to challenge it, OK is the reply of a live higher peer, COORDINATOR announces a new leader to
//! everyone and PING is the failure detector's liveness probe. Every message carries the sender's
//! id and its Lamport timestamp at the time of sending.

use super::{NodeId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message as it travels between nodes.
///
/// Decoding is lenient: ids and timestamps may arrive as numbers or decimal strings, and a value
/// that is neither decodes as absent rather than rejecting the whole message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Wire", into = "Wire")]
pub struct Message {
    /// id of the sender, absent if it sent something non-numeric
    pub from: Option<NodeId>,
    /// sender's clock when the message left, stamped by the outbox
    pub ts: Option<Timestamp>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Challenge to a higher id peer, `addr` is where to send the OK back to
    Election { addr: Option<String> },
    /// A higher id peer is alive and takes over the election
    Ok { addr: Option<String> },
    /// `leader` has won an election. A malformed leader id decodes as `None`
    Coordinator {
        leader: Option<NodeId>,
        addr: Option<String>,
    },
    /// Liveness probe
    Ping { addr: Option<String> },
    /// Any other `type`
    Unknown(String),
}

impl Body {
    pub fn kind(&self) -> &str {
        match self {
            Body::Election { .. } => "ELECTION",
            Body::Ok { .. } => "OK",
            Body::Coordinator { .. } => "COORDINATOR",
            Body::Ping { .. } => "PING",
            Body::Unknown(kind) => kind,
        }
    }
}

impl Message {
    /// An unstamped message from `from`
    pub fn new(from: NodeId, body: Body) -> Self {
        Self {
            from: Some(from),
            ts: None,
            body,
        }
    }

    pub fn stamped(self, ts: Timestamp) -> Self {
        Self { ts: Some(ts), ..self }
    }
}

#[derive(Serialize, Deserialize)]
struct Wire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ts: Option<Value>,
    #[serde(default)]
    payload: Option<WirePayload>,
}

#[derive(Default, Serialize, Deserialize)]
struct WirePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    addr: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leader: Option<Value>,
}

fn numeric(value: Option<Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

impl From<Wire> for Message {
    fn from(wire: Wire) -> Self {
        let payload = wire.payload.unwrap_or_default();
        let addr = text(payload.addr);
        let body = match wire.kind.as_str() {
            "ELECTION" => Body::Election { addr },
            "OK" => Body::Ok { addr },
            "COORDINATOR" => Body::Coordinator {
                leader: numeric(payload.leader),
                addr,
            },
            "PING" => Body::Ping { addr },
            _ => Body::Unknown(wire.kind),
        };
        Message {
            from: numeric(wire.from),
            ts: numeric(wire.ts),
            body,
        }
    }
}

impl From<Message> for Wire {
    fn from(message: Message) -> Self {
        let kind = message.body.kind().to_string();
        let payload = match message.body {
            Body::Election { addr } | Body::Ok { addr } | Body::Ping { addr } => WirePayload {
                addr: addr.map(Value::String),
                leader: None,
            },
            Body::Coordinator { leader, addr } => WirePayload {
                addr: addr.map(Value::String),
                leader: leader.map(|id| Value::String(id.to_string())),
            },
            Body::Unknown(_) => WirePayload::default(),
        };
        Wire {
            kind,
            from: message.from.map(|id| Value::String(id.to_string())),
            ts: message.ts.map(Value::from),
            payload: Some(payload),
        }
    }
}
