//! Search routing state
//!
//! `RoutingTable` remembers, per `ping_id`, the connection a PING arrived
//! on so a PONG can be relayed back along the same path. It doubles as
//! the duplicate filter for the flood: the first arrival of a `ping_id`
//! wins and later copies are ignored.
//!
//! `SearchCollector` holds the PONGs answering searches this node issued.

use crate::protocol::{BoardRecord, PongPayload};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Route {
    /// `None` when the inbound socket could not be duplicated
    reverse: Option<TcpStream>,
    arrived_at: Instant,
}

pub struct RoutingTable {
    routes: Mutex<HashMap<Uuid, Route>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> RoutingTable {
        RoutingTable {
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Record the reverse path for `ping_id` unless it was already seen.
    /// Returns false for a duplicate.
    pub fn record_if_new(&self, ping_id: Uuid, reverse: Option<TcpStream>) -> bool {
        match self.routes.lock() {
            Ok(mut routes) => {
                if routes.contains_key(&ping_id) {
                    return false;
                }
                routes.insert(
                    ping_id,
                    Route {
                        reverse,
                        arrived_at: Instant::now(),
                    },
                );
                true
            }
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                false
            }
        }
    }

    pub fn contains(&self, ping_id: &Uuid) -> bool {
        match self.routes.lock() {
            Ok(routes) => routes.contains_key(ping_id),
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                false
            }
        }
    }

    /// A handle on the connection the PING for `ping_id` arrived on
    pub fn reverse_stream(&self, ping_id: &Uuid) -> Option<TcpStream> {
        match self.routes.lock() {
            Ok(routes) => routes
                .get(ping_id)
                .and_then(|route| route.reverse.as_ref())
                .and_then(|stream| stream.try_clone().ok()),
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                None
            }
        }
    }

    /// Drop routes older than `max_age`, releasing their sockets
    pub fn purge_older_than(&self, max_age: Duration) -> usize {
        match self.routes.lock() {
            Ok(mut routes) => {
                let before = routes.len();
                routes.retain(|ping_id, route| {
                    let keep = route.arrived_at.elapsed() < max_age;
                    if !keep {
                        debug!("Routing entry for PING {ping_id} expired");
                    }
                    keep
                });
                before - routes.len()
            }
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                0
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.routes.lock() {
            Ok(routes) => routes.len(),
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One search hit as seen by the node that issued the search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongInfo {
    pub responder_id: Uuid,
    pub board_title: String,
    pub board_id: Uuid,
    pub responder_host: String,
    pub responder_port: u16,
    pub boards: Vec<BoardRecord>,
}

impl From<&PongPayload> for PongInfo {
    fn from(pong: &PongPayload) -> Self {
        PongInfo {
            responder_id: pong.responder_id,
            board_title: pong.title.clone(),
            board_id: pong.board_id,
            responder_host: pong.responder_host.clone(),
            responder_port: pong.responder_port,
            boards: pong.boards.clone(),
        }
    }
}

struct SearchSession {
    opened_at: Instant,
    results: Vec<PongInfo>,
}

/// ( K -> ping_id, V => PONGs received for that search )
pub struct SearchCollector {
    sessions: Mutex<HashMap<Uuid, SearchSession>>,
}

impl Default for SearchCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchCollector {
    pub fn new() -> SearchCollector {
        SearchCollector {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn open(&self, ping_id: Uuid) {
        match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.entry(ping_id).or_insert_with(|| SearchSession {
                    opened_at: Instant::now(),
                    results: Vec::new(),
                });
            }
            Err(_) => log::error!("Failed to acquire search collector lock"),
        }
    }

    pub fn contains(&self, ping_id: &Uuid) -> bool {
        match self.sessions.lock() {
            Ok(sessions) => sessions.contains_key(ping_id),
            Err(_) => {
                log::error!("Failed to acquire search collector lock");
                false
            }
        }
    }

    /// Append a result; false when `ping_id` is not a search of ours
    pub fn append(&self, ping_id: &Uuid, info: PongInfo) -> bool {
        match self.sessions.lock() {
            Ok(mut sessions) => match sessions.get_mut(ping_id) {
                Some(session) => {
                    session.results.push(info);
                    true
                }
                None => false,
            },
            Err(_) => {
                log::error!("Failed to acquire search collector lock");
                false
            }
        }
    }

    pub fn results(&self, ping_id: &Uuid) -> Vec<PongInfo> {
        match self.sessions.lock() {
            Ok(sessions) => sessions
                .get(ping_id)
                .map(|session| session.results.clone())
                .unwrap_or_default(),
            Err(_) => {
                log::error!("Failed to acquire search collector lock");
                Vec::new()
            }
        }
    }

    pub fn all_results(&self) -> Vec<PongInfo> {
        match self.sessions.lock() {
            Ok(sessions) => sessions
                .values()
                .flat_map(|session| session.results.iter().cloned())
                .collect(),
            Err(_) => {
                log::error!("Failed to acquire search collector lock");
                Vec::new()
            }
        }
    }

    /// Forget searches opened more than `max_age` ago
    pub fn purge_older_than(&self, max_age: Duration) -> usize {
        match self.sessions.lock() {
            Ok(mut sessions) => {
                let before = sessions.len();
                sessions.retain(|ping_id, session| {
                    let keep = session.opened_at.elapsed() < max_age;
                    if !keep {
                        debug!("Search {ping_id} expired with {} results", session.results.len());
                    }
                    keep
                });
                before - sessions.len()
            }
            Err(_) => {
                log::error!("Failed to acquire search collector lock");
                0
            }
        }
    }

    /// Distinct `(host, port)` of responders holding a board titled `board_title`
    pub fn responders_for_board(&self, board_title: &str) -> Vec<(String, u16)> {
        let mut responders: Vec<(String, u16)> = self
            .all_results()
            .into_iter()
            .filter(|info| info.board_title == board_title)
            .map(|info| (info.responder_host, info.responder_port))
            .collect();
        responders.sort();
        responders.dedup();
        responders
    }

    /// Board id reported by the responder at `(host, port)` for `board_title`
    pub fn board_id_for(&self, host: &str, port: u16, board_title: &str) -> Option<Uuid> {
        self.all_results()
            .into_iter()
            .find(|info| {
                info.responder_host == host
                    && info.responder_port == port
                    && info.board_title == board_title
            })
            .map(|info| info.board_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pong_info(title: &str, port: u16) -> PongInfo {
        PongInfo {
            responder_id: Uuid::new_v4(),
            board_title: title.to_string(),
            board_id: Uuid::new_v4(),
            responder_host: "127.0.0.1".to_string(),
            responder_port: port,
            boards: Vec::new(),
        }
    }

    #[test]
    fn test_first_arrival_wins() {
        let table = RoutingTable::new();
        let ping_id = Uuid::new_v4();

        assert!(table.record_if_new(ping_id, None));
        assert!(!table.record_if_new(ping_id, None));
        assert_eq!(table.len(), 1);
        assert!(table.reverse_stream(&ping_id).is_none());
    }

    #[test]
    fn test_purge_expired_routes() {
        let table = RoutingTable::new();
        table.record_if_new(Uuid::new_v4(), None);

        assert_eq!(table.purge_older_than(Duration::from_secs(60)), 0);
        assert_eq!(table.purge_older_than(Duration::ZERO), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_append_only_to_open_sessions() {
        let collector = SearchCollector::new();
        let ours = Uuid::new_v4();
        collector.open(ours);

        assert!(collector.append(&ours, pong_info("yolo", 9000)));
        assert!(!collector.append(&Uuid::new_v4(), pong_info("yolo", 9000)));
        assert_eq!(collector.results(&ours).len(), 1);
    }

    #[test]
    fn test_purge_expired_searches() {
        let collector = SearchCollector::new();
        let ping_id = Uuid::new_v4();
        collector.open(ping_id);
        collector.append(&ping_id, pong_info("yolo", 9000));

        assert_eq!(collector.purge_older_than(Duration::from_secs(60)), 0);
        assert_eq!(collector.results(&ping_id).len(), 1);
        assert_eq!(collector.purge_older_than(Duration::ZERO), 1);
        assert!(!collector.contains(&ping_id));
        assert!(!collector.append(&ping_id, pong_info("yolo", 9000)));
    }

    #[test]
    fn test_concurrent_pongs_for_one_session() {
        let collector = Arc::new(SearchCollector::new());
        let ping_id = Uuid::new_v4();
        collector.open(ping_id);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    collector.append(&ping_id, pong_info("yolo", 9000 + i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.results(&ping_id).len(), 10);
    }

    #[test]
    fn test_responders_for_board_are_distinct() {
        let collector = SearchCollector::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        collector.open(first);
        collector.open(second);
        collector.append(&first, pong_info("yolo", 9000));
        collector.append(&second, pong_info("yolo", 9000));
        collector.append(&second, pong_info("other", 9001));

        assert_eq!(
            collector.responders_for_board("yolo"),
            vec![("127.0.0.1".to_string(), 9000)]
        );
    }
}
