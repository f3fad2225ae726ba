//! Node runtime configuration.

use super::peers::PeerDirectory;
use super::NodeId;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error variants related to configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A peer entry isn't of the form `id:host:port` or `id:url`.
    #[error("invalid peer entry {0:?}, expected id:host:port")]
    InvalidPeer(String),

    /// The same id appears twice in the peer list.
    #[error("peer id {0} is listed more than once")]
    DuplicatePeer(NodeId),

    /// The local node is listed among its own peers.
    #[error("peer list contains this node's own id {0}")]
    OwnIdInPeers(NodeId),

    /// A timeout or interval is zero.
    #[error("{0} must be > 0")]
    Zero(&'static str),
}

/// The runtime configuration for a node.
///
/// The OK timeout should comfortably exceed one round trip to the slowest peer, otherwise a node
/// will claim leadership while a higher peer's OK is still in flight. The heartbeat interval
/// bounds how long the cluster keeps following a dead leader.
#[derive(Clone, Debug, Serialize, Deserialize, Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// Id of this node, unique in the cluster. Higher ids win elections
    #[clap(long, env = "BULLY_ID")]
    pub id: NodeId,

    /// Host to listen on, also advertised to peers
    #[clap(long, env = "BULLY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the HTTP endpoint
    #[clap(long, env = "BULLY_PORT")]
    pub port: u16,

    /// Comma separated peers as id:host:port, e.g. 2:localhost:8002,3:localhost:8003
    #[clap(long, env = "BULLY_PEERS", default_value = "")]
    pub peers: String,

    /// How long an election waits for an OK from a higher peer, in milliseconds
    #[clap(long, env = "BULLY_OK_TIMEOUT", default_value = "2000")]
    pub ok_timeout: u64,

    /// Interval between liveness probes of every peer, in milliseconds
    #[clap(long, env = "BULLY_HEARTBEAT_INTERVAL", default_value = "3000")]
    pub heartbeat_interval: u64,

    /// Timeout of a single message delivery, in milliseconds
    #[clap(long, env = "BULLY_RPC_TIMEOUT", default_value = "5000")]
    pub rpc_timeout: u64,

    /// Delay between startup and the first election, in milliseconds
    #[clap(long, env = "BULLY_STARTUP_DELAY", default_value = "500")]
    pub startup_delay: u64,

    /// Upper bound of fire-and-forget sends in flight at once
    #[clap(long, env = "BULLY_MAX_IN_FLIGHT_SENDS", default_value = "64")]
    pub max_in_flight_sends: usize,
}

impl Config {
    /// A config with default timings for node `id` listening on `host:port`.
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            peers: String::new(),
            ok_timeout: 2000,
            heartbeat_interval: 3000,
            rpc_timeout: 5000,
            startup_delay: 500,
            max_in_flight_sends: 64,
        }
    }

    pub fn with_peers(mut self, peers: impl Into<String>) -> Self {
        self.peers = peers.into();
        self
    }

    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.ok_timeout == 0 {
            return Err(ConfigError::Zero("ok_timeout"));
        }
        if self.heartbeat_interval == 0 {
            return Err(ConfigError::Zero("heartbeat_interval"));
        }
        if self.rpc_timeout == 0 {
            return Err(ConfigError::Zero("rpc_timeout"));
        }
        if self.max_in_flight_sends == 0 {
            return Err(ConfigError::Zero("max_in_flight_sends"));
        }
        self.peer_directory()?;
        Ok(self)
    }

    pub fn peer_directory(&self) -> Result<PeerDirectory, ConfigError> {
        PeerDirectory::parse(self.id, &self.peers)
    }

    /// Address peers use to reach this node
    pub fn advertised_addr(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn ok_timeout(&self) -> Duration {
        Duration::from_millis(self.ok_timeout)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_command_line() {
        let config = Config::try_parse_from([
            "bully-node",
            "--id",
            "2",
            "--port",
            "8002",
            "--peers",
            "1:localhost:8001,3:localhost:8003",
            "--ok-timeout",
            "750",
        ])
        .unwrap()
        .validate()
        .unwrap();
        assert_eq!(config.id, 2);
        assert_eq!(config.advertised_addr(), "http://127.0.0.1:8002");
        assert_eq!(config.ok_timeout(), Duration::from_millis(750));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(3));
        let peers = config.peer_directory().unwrap();
        assert_eq!(peers.get(3), Some("http://localhost:8003"));
    }

    #[test]
    fn rejects_bad_peers() {
        let config = Config::new(2, "localhost", 8002).with_peers("2:localhost:8002");
        assert_eq!(config.validate().unwrap_err(), ConfigError::OwnIdInPeers(2));
        let config = Config::new(2, "localhost", 8002).with_peers("localhost:8001");
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidPeer(_)
        ));
    }

    #[test]
    fn rejects_zero_durations() {
        let mut config = Config::new(1, "localhost", 8001);
        config.ok_timeout = 0;
        assert_eq!(config.validate().unwrap_err(), ConfigError::Zero("ok_timeout"));
        let mut config = Config::new(1, "localhost", 8001);
        config.heartbeat_interval = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::Zero("heartbeat_interval")
        );
        let mut config = Config::new(1, "localhost", 8001);
        config.max_in_flight_sends = 0;
        assert!(config.validate().is_err());
    }
}
