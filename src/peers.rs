use super::config::ConfigError;
use super::NodeId;
use std::collections::BTreeMap;

/// The other members of the cluster, by id. Fixed once the node has started.
///
/// Ids are unique and never include the local node's own id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDirectory {
    peers: BTreeMap<NodeId, String>,
}

impl PeerDirectory {
    pub fn new(
        own_id: NodeId,
        peers: impl IntoIterator<Item = (NodeId, String)>,
    ) -> Result<Self, ConfigError> {
        let mut directory = BTreeMap::new();
        for (id, addr) in peers {
            if id == own_id {
                return Err(ConfigError::OwnIdInPeers(id));
            }
            if directory.insert(id, addr).is_some() {
                return Err(ConfigError::DuplicatePeer(id));
            }
        }
        Ok(Self { peers: directory })
    }

    /// Parses a comma separated list of `id:host:port` entries. The address part may also be a
    /// full `http://` or `https://` url, otherwise `http://` is assumed.
    pub fn parse(own_id: NodeId, list: &str) -> Result<Self, ConfigError> {
        let entries = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(own_id, entries)
    }

    pub fn get(&self, id: NodeId) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &str)> {
        self.peers.iter().map(|(&id, addr)| (id, addr.as_str()))
    }

    /// Peers that outrank `id`
    pub fn higher_than(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &str)> {
        self.peers
            .range(id.saturating_add(1)..)
            .filter(move |(peer, _)| **peer > id)
            .map(|(&id, addr)| (id, addr.as_str()))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

fn parse_entry(entry: &str) -> Result<(NodeId, String), ConfigError> {
    let invalid = || ConfigError::InvalidPeer(entry.to_string());
    let (id, addr) = entry.split_once(':').ok_or_else(invalid)?;
    let id = id.trim().parse::<NodeId>().map_err(|_| invalid())?;
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(invalid());
    }
    let addr = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };
    Ok((id, addr.trim_end_matches('/').to_string()))
}
