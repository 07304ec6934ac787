use crate::protocol::PeerEntry;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// How to reach a known peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub host: String,
    pub port: u16,
    pub is_super_peer: bool,
}

impl PeerRecord {
    pub fn new(host: &str, port: u16, is_super_peer: bool) -> PeerRecord {
        PeerRecord {
            host: host.to_string(),
            port,
            is_super_peer,
        }
    }
}

/// Known peers keyed by node id, bounded by `capacity`
///
/// There is no liveness tracking: a stale peer shows up as a failed
/// connection the next time someone tries to reach it.
pub struct PeerDirectory {
    inner: Mutex<HashMap<Uuid, PeerRecord>>,
    capacity: usize,
}

impl PeerDirectory {
    pub fn new(capacity: usize) -> PeerDirectory {
        PeerDirectory {
            inner: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Accept a peer if it is already known or there is room for it.
    /// Returns false when the directory is full.
    pub fn admit(&self, peer_id: Uuid, record: PeerRecord) -> bool {
        match self.inner.lock() {
            Ok(mut peers) => {
                if peers.contains_key(&peer_id) {
                    return true;
                }
                if peers.len() >= self.capacity {
                    return false;
                }
                peers.insert(peer_id, record);
                true
            }
            Err(_) => {
                log::error!("Failed to acquire peer directory lock");
                false
            }
        }
    }

    pub fn remove(&self, peer_id: &Uuid) -> Option<PeerRecord> {
        match self.inner.lock() {
            Ok(mut peers) => peers.remove(peer_id),
            Err(_) => {
                log::error!("Failed to acquire peer directory lock");
                None
            }
        }
    }

    pub fn get(&self, peer_id: &Uuid) -> Option<PeerRecord> {
        match self.inner.lock() {
            Ok(peers) => peers.get(peer_id).cloned(),
            Err(_) => {
                log::error!("Failed to acquire peer directory lock");
                None
            }
        }
    }

    pub fn contains(&self, peer_id: &Uuid) -> bool {
        match self.inner.lock() {
            Ok(peers) => peers.contains_key(peer_id),
            Err(_) => {
                log::error!("Failed to acquire peer directory lock");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(peers) => peers.len(),
            Err(_) => {
                log::error!("Failed to acquire peer directory lock");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Point-in-time copy, safe to iterate while the directory changes
    pub fn snapshot(&self) -> Vec<(Uuid, PeerRecord)> {
        match self.inner.lock() {
            Ok(peers) => peers
                .iter()
                .map(|(id, record)| (*id, record.clone()))
                .collect(),
            Err(_) => {
                log::error!("Failed to acquire peer directory lock");
                Vec::new()
            }
        }
    }

    /// Known super-peers other than `excluded`, in PEER_LIST form
    pub fn super_peers_excluding(&self, excluded: &Uuid) -> Vec<PeerEntry> {
        self.snapshot()
            .into_iter()
            .filter(|(id, record)| record.is_super_peer && id != excluded)
            .map(|(node_id, record)| PeerEntry {
                node_id,
                host: record.host,
                port: record.port,
            })
            .collect()
    }

    pub fn clear(&self) {
        match self.inner.lock() {
            Ok(mut peers) => peers.clear(),
            Err(_) => log::error!("Failed to acquire peer directory lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_respects_capacity() {
        let directory = PeerDirectory::new(2);
        let first = Uuid::new_v4();

        assert!(directory.admit(first, PeerRecord::new("127.0.0.1", 9001, true)));
        assert!(directory.admit(Uuid::new_v4(), PeerRecord::new("127.0.0.1", 9002, false)));
        assert!(directory.is_full());

        // Unknown peers are turned away, known ones are still accepted
        assert!(!directory.admit(Uuid::new_v4(), PeerRecord::new("127.0.0.1", 9003, true)));
        assert!(directory.admit(first, PeerRecord::new("127.0.0.1", 9001, true)));
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_super_peers_excluding() {
        let directory = PeerDirectory::new(10);
        let requester = Uuid::new_v4();
        let super_peer = Uuid::new_v4();
        directory.admit(requester, PeerRecord::new("127.0.0.1", 9001, true));
        directory.admit(super_peer, PeerRecord::new("127.0.0.1", 9002, true));
        directory.admit(Uuid::new_v4(), PeerRecord::new("127.0.0.1", 9003, false));

        let entries = directory.super_peers_excluding(&requester);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].node_id, super_peer);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let directory = PeerDirectory::new(10);
        let peer = Uuid::new_v4();
        directory.admit(peer, PeerRecord::new("127.0.0.1", 9001, true));

        let snapshot = directory.snapshot();
        directory.remove(&peer);

        assert_eq!(snapshot.len(), 1);
        assert!(directory.is_empty());
    }
}
