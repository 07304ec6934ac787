//! The overlay node
//!
//! A `Node` owns its listening socket, peer directory, routing table,
//! search results and (once it becomes a super-peer) its `Board`. Inbound
//! connections are served by `ConnectionHandler` threads which call back
//! into the node; outbound operations open a short-lived connection per
//! request and block on it in the calling thread.

use crate::board::{Board, ContentStore, DEFAULT_BOARD};
use crate::config::Config;
use crate::error::{OverlayError, Result};
use crate::network::connection_limiter::ConnectionLimiter;
use crate::network::handler::ConnectionHandler;
use crate::network::peer_directory::{PeerDirectory, PeerRecord};
use crate::network::routing::{PongInfo, RoutingTable, SearchCollector};
use crate::protocol::{
    receive_envelope, send_envelope, BoardRecord, ConnectPayload, ContentEntry,
    DataRequestPayload, DataUpdateEntry, Envelope, ErrorPayload, MessageType, MetaEntry,
    NodeIdentity, PeerEntry, PingPayload, PongPayload, StatusPayload, UnregisterPayload,
    CARD_ENTRY_KIND, CONTENT_REQUEST, META_REQUEST,
};
use crate::registry::BoardRegistry;
use crate::utils;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

/// A card whose content was fetched from the peer holding it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCard {
    pub board_id: Option<Uuid>,
    pub board_title: String,
    pub origin_node_id: Uuid,
    pub title: String,
    pub content: String,
}

/// Answer to a content request
#[derive(Debug, Clone, PartialEq)]
pub struct ContentReply {
    pub responder_id: Uuid,
    pub entries: Vec<ContentEntry>,
}

pub struct Node {
    config: Config,
    node_id: Uuid,
    host: String,
    port: u16,
    is_bootstrap: bool,
    is_super: AtomicBool,
    running: AtomicBool,
    board: OnceCell<Board>,
    peers: PeerDirectory,
    routing: RoutingTable,
    searches: SearchCollector,
    content: ContentStore,
    registry: Arc<dyn BoardRegistry>,
    limiter: Arc<ConnectionLimiter>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    maintenance_stop: Mutex<Option<mpsc::Sender<()>>>,
}

impl Node {
    /// Bind `config.host:config.port` and build a node around the listener
    pub fn new(config: Config, registry: Arc<dyn BoardRegistry>) -> Result<Arc<Node>> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).map_err(|e| {
            OverlayError::Network(format!(
                "Failed to bind to {}:{}: {e}",
                config.host, config.port
            ))
        })?;
        Self::with_listener(config, registry, listener)
    }

    /// Build a node around an already bound listener. The advertised port
    /// is the listener's real port, so binding port 0 works.
    pub fn with_listener(
        config: Config,
        registry: Arc<dyn BoardRegistry>,
        listener: TcpListener,
    ) -> Result<Arc<Node>> {
        let local_addr = listener.local_addr()?;
        let host = config.host.clone();
        let port = local_addr.port();
        let is_bootstrap = config.is_bootstrap_addr(&host, port);

        let board = OnceCell::new();
        if is_bootstrap {
            let _ = board.set(Board::new(DEFAULT_BOARD, [""]));
        }

        Ok(Arc::new(Node {
            node_id: Uuid::new_v4(),
            host,
            port,
            is_bootstrap,
            is_super: AtomicBool::new(is_bootstrap),
            running: AtomicBool::new(false),
            board,
            peers: PeerDirectory::new(config.max_total_connections),
            routing: RoutingTable::new(),
            searches: SearchCollector::new(),
            content: ContentStore::new(),
            registry,
            limiter: Arc::new(ConnectionLimiter::new(config.max_inbound_handlers)),
            listener: Mutex::new(Some(listener)),
            local_addr,
            accept_thread: Mutex::new(None),
            maintenance_stop: Mutex::new(None),
            config,
        }))
    }

    /// Spawn the accept loop and the maintenance thread
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire listener lock: {e}")))?
            .take()
            .ok_or_else(|| OverlayError::Network("Node was already started".to_string()))?;

        self.running.store(true, Ordering::SeqCst);
        info!(
            "Node {} listening on {}:{} (bootstrap: {}, super-peer: {})",
            self.node_id,
            self.host,
            self.port,
            self.is_bootstrap,
            self.is_super_peer()
        );

        let node = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("accept-{}", self.port))
            .spawn(move || node.accept_loop(listener))?;
        if let Ok(mut accept_thread) = self.accept_thread.lock() {
            *accept_thread = Some(handle);
        }

        self.spawn_maintenance()
    }

    /// Stop accepting connections and forget known peers. Connections in
    /// flight run to completion.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // The accept loop is parked in accept(); poke it so it sees the flag
        let mut wake = self.local_addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        if let Err(e) = TcpStream::connect_timeout(&wake, self.config.connect_timeout()) {
            warn!("Failed to wake accept loop on {wake}: {e}");
        }

        if let Ok(mut stop) = self.maintenance_stop.lock() {
            stop.take();
        }
        self.peers.clear();
        info!("Node {} stopped", self.node_id);
    }

    /// Block until the accept loop has exited
    pub fn join(&self) {
        let handle = match self.accept_thread.lock() {
            Ok(mut accept_thread) => accept_thread.take(),
            Err(_) => {
                error!("Failed to acquire accept thread lock");
                None
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Accept loop of node {} panicked", self.node_id);
            }
        }
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        for incoming in listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match incoming {
                Ok(stream) => self.serve(stream),
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }
        debug!("Accept loop of node {} finished", self.node_id);
    }

    /// Hand an accepted connection to a handler thread if a slot is free
    fn serve(self: &Arc<Self>, stream: TcpStream) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get peer address: {e}");
                return;
            }
        };

        let permit = match self.limiter.try_acquire(peer_addr) {
            Ok(Some(permit)) => permit,
            Ok(None) => {
                warn!("Rejecting connection from {peer_addr}: handler limit reached");
                return;
            }
            Err(e) => {
                error!("Failed to admit connection from {peer_addr}: {e}");
                return;
            }
        };

        if let Err(e) = utils::configure_stream(&stream, self.config.read_timeout()) {
            warn!("Failed to configure connection from {peer_addr}: {e}");
            return;
        }

        let node = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("conn-{peer_addr}"))
            .spawn(move || {
                let _permit = permit;
                ConnectionHandler::new(node, stream, peer_addr).run();
            });
        if let Err(e) = spawned {
            error!("Failed to spawn handler for {peer_addr}: {e}");
        }
    }

    fn spawn_maintenance(self: &Arc<Self>) -> Result<()> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        if let Ok(mut stop) = self.maintenance_stop.lock() {
            *stop = Some(stop_tx);
        }

        let node = Arc::downgrade(self);
        let interval = self.config.sweep_interval();
        thread::Builder::new()
            .name(format!("maintenance-{}", self.port))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match node.upgrade() {
                        Some(node) => node.run_maintenance(),
                        None => break,
                    },
                    _ => break,
                }
            })?;
        Ok(())
    }

    /// Evict stale card references, expire old search routes and
    /// forget old search results
    pub fn run_maintenance(&self) {
        self.evict_stale_references();
        let purged = self.routing.purge_older_than(self.config.route_max_age());
        if purged > 0 {
            debug!("Purged {purged} expired search routes");
        }
        let expired = self.searches.purge_older_than(self.config.search_max_age());
        if expired > 0 {
            debug!("Forgot {expired} expired searches");
        }
    }

    /// Drop card references older than the configured max age
    pub fn evict_stale_references(&self) -> usize {
        let Some(board) = self.board.get() else {
            return 0;
        };
        match board.evict_older_than(self.config.card_max_age()) {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!("Failed to evict stale card references: {e}");
                0
            }
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_bootstrap(&self) -> bool {
        self.is_bootstrap
    }

    pub fn is_super_peer(&self) -> bool {
        self.is_super.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.get()
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn searches(&self) -> &SearchCollector {
        &self.searches
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn registry(&self) -> &Arc<dyn BoardRegistry> {
        &self.registry
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            node_id: self.node_id,
            host: self.host.clone(),
            port: self.port,
            is_super_peer: self.is_super_peer(),
            is_bootstrap: self.is_bootstrap,
        }
    }

    /// An envelope stamped with this node's current identity
    pub fn envelope<P: Serialize>(&self, kind: MessageType, payload: &P) -> Result<Envelope> {
        Envelope::new(kind, &self.identity(), payload)
    }

    fn open_stream(&self, host: &str, port: u16) -> Result<TcpStream> {
        utils::open_stream(
            host,
            port,
            self.config.connect_timeout(),
            self.config.read_timeout(),
        )
    }

    /// Fire-and-forget: one connection, one frame
    fn send_one_shot(&self, host: &str, port: u16, envelope: &Envelope) -> Result<()> {
        let mut stream = self.open_stream(host, port)?;
        debug!("Sending {} to {host}:{port}", envelope.kind);
        send_envelope(&mut stream, envelope)
    }

    /// One connection, one frame out, one frame back. `None` when the
    /// peer closed without answering.
    fn request(&self, host: &str, port: u16, envelope: &Envelope) -> Result<Option<Envelope>> {
        let mut stream = self.open_stream(host, port)?;
        debug!("Sending {} to {host}:{port}", envelope.kind);
        send_envelope(&mut stream, envelope)?;
        receive_envelope(&mut stream)
    }

    /// CONNECT to `host:port`. Succeeds only on a CONNECT_RESPONSE from a
    /// node other than this one.
    pub fn connect(&self, host: &str, port: u16, add_to_peers: bool) -> bool {
        if host == self.host && port == self.port {
            debug!("Not connecting to own address {host}:{port}");
            return false;
        }

        let payload = ConnectPayload {
            node_id: self.node_id,
            host: self.host.clone(),
            port: self.port,
        };
        let reply = self
            .envelope(MessageType::Connect, &payload)
            .and_then(|envelope| self.request(host, port, &envelope));

        match reply {
            Ok(Some(reply))
                if reply.kind == MessageType::ConnectResponse && reply.node_id != self.node_id =>
            {
                if add_to_peers
                    && !self
                        .peers
                        .admit(reply.node_id, PeerRecord::new(host, port, reply.is_super))
                {
                    warn!("Connected to {host}:{port} but the peer directory is full");
                }
                info!("Connected to peer {} at {host}:{port}", reply.node_id);
                true
            }
            Ok(Some(reply)) => {
                info!("Connection to {host}:{port} refused with {}", reply.kind);
                false
            }
            Ok(None) => {
                info!("Connection to {host}:{port} closed without an answer");
                false
            }
            Err(e) => {
                warn!("Failed to connect to {host}:{port}: {e}");
                false
            }
        }
    }

    /// Join the network through the well-known bootstrap node
    pub fn do_bootstrap(&self) -> bool {
        if self.is_bootstrap {
            return false;
        }
        let (host, port) = (
            self.config.bootstrap_host.clone(),
            self.config.bootstrap_port,
        );
        self.connect(&host, port, true)
    }

    /// Create this node's board and announce it to the bootstrap. Returns
    /// false when the node already had a board, in which case `title` is
    /// only registered with the bootstrap.
    pub fn become_super_peer(&self, title: &str, keywords: BTreeSet<String>) -> bool {
        let created = self.board.set(Board::new(title, keywords.clone())).is_ok();
        if created {
            self.is_super.store(true, Ordering::SeqCst);
            info!("Node {} is now a super-peer for board '{title}'", self.node_id);
        }

        if !self.is_bootstrap {
            match self.register_board_with_bootstrap(title, &keywords) {
                Ok(reply) => info!("Bootstrap answered board registration: {}", reply.status),
                Err(e) => warn!("Failed to register board '{title}' with bootstrap: {e}"),
            }
        }
        created
    }

    pub fn register_board_with_bootstrap(
        &self,
        title: &str,
        keywords: &BTreeSet<String>,
    ) -> Result<StatusPayload> {
        let board_id = match self.board.get() {
            Some(board) if board.get_title() == title => board.get_board_id(),
            _ => Uuid::new_v4(),
        };
        let record = BoardRecord {
            board_id,
            peer_id: self.node_id,
            board_title: title.to_string(),
            keywords: keywords.clone(),
            peer_host: self.host.clone(),
            peer_port: self.port,
            created_at: None,
            status: None,
        };
        let envelope = self.envelope(MessageType::BoardRegister, &record)?;
        self.registry_request(envelope, MessageType::BoardRegisterResponse)
    }

    pub fn unregister_board_with_bootstrap(&self, title: &str) -> Result<StatusPayload> {
        let payload = UnregisterPayload {
            peer_id: self.node_id,
            board_title: title.to_string(),
        };
        let envelope = self.envelope(MessageType::BoardUnregister, &payload)?;
        self.registry_request(envelope, MessageType::BoardUnregisterResponse)
    }

    fn registry_request(&self, envelope: Envelope, expected: MessageType) -> Result<StatusPayload> {
        let (host, port) = (&self.config.bootstrap_host, self.config.bootstrap_port);
        match self.request(host, port, &envelope)? {
            Some(reply) if reply.kind == expected => reply.payload_as(),
            Some(reply) => Err(OverlayError::Validation(format!(
                "Unexpected {} reply to {}",
                reply.kind, envelope.kind
            ))),
            None => Err(OverlayError::Network(format!(
                "Bootstrap closed the connection without answering {}",
                envelope.kind
            ))),
        }
    }

    /// Breadth-first gossip crawl over known super-peers. Returns how many
    /// peers were learned.
    pub fn request_peers(self: &Arc<Self>) -> usize {
        if !self.is_super_peer() {
            debug!("Only super-peers crawl for peers");
            return 0;
        }

        let before = self.peers.len();
        if self.peers.is_empty() && !self.is_bootstrap {
            let (host, port) = (
                self.config.bootstrap_host.clone(),
                self.config.bootstrap_port,
            );
            if let Err(e) = self.fetch_peer_list(&host, port) {
                warn!("Failed to get peers from bootstrap {host}:{port}: {e}");
            }
        }

        let mut visited: HashSet<Uuid> = HashSet::from([self.node_id]);
        let mut queue: VecDeque<(Uuid, PeerRecord)> = self.peers.snapshot().into_iter().collect();

        while let Some((peer_id, record)) = queue.pop_front() {
            if self.peers.is_full() {
                info!("Peer directory full, stopping crawl");
                break;
            }
            if !record.is_super_peer || !visited.insert(peer_id) {
                continue;
            }
            if let Err(e) = self.fetch_peer_list(&record.host, record.port) {
                warn!("Failed to get peers from {peer_id}: {e}");
                continue;
            }
            for (known_id, known) in self.peers.snapshot() {
                if !visited.contains(&known_id) {
                    queue.push_back((known_id, known));
                }
            }
        }

        let learned = self.peers.len().saturating_sub(before);
        info!("Peer crawl finished with {learned} new peers");
        learned
    }

    /// Send GET_PEERS and process the PEER_LIST on the same connection
    fn fetch_peer_list(self: &Arc<Self>, host: &str, port: u16) -> Result<()> {
        let mut stream = self.open_stream(host, port)?;
        let peer_addr = stream.peer_addr()?;
        let envelope = self.envelope(MessageType::GetPeers, &Vec::<PeerEntry>::new())?;
        send_envelope(&mut stream, &envelope)?;
        ConnectionHandler::new(Arc::clone(self), stream, peer_addr).run();
        Ok(())
    }

    /// Flood a PING for `keywords` to every known peer and return the
    /// search id under which PONGs are collected
    pub fn issue_search_request(&self, keywords: BTreeSet<String>) -> Uuid {
        let ping = PingPayload {
            ping_id: Uuid::new_v4(),
            origin_id: self.node_id,
            origin_host: self.host.clone(),
            origin_port: self.port,
            ttl: self.config.search_ttl,
            keywords,
        };
        self.searches.open(ping.ping_id);

        let peers = self.peers.snapshot();
        info!(
            "Issuing search {} for {:?} to {} peers",
            ping.ping_id,
            ping.keywords,
            peers.len()
        );
        for (peer_id, record) in peers {
            if let Err(e) = self.send_ping(&record.host, record.port, &ping) {
                warn!("Failed to send PING to {peer_id}: {e}");
            }
        }
        ping.ping_id
    }

    /// Pass a PING on with one less hop to every peer except `sender`
    pub fn forward_ping(&self, ping: &PingPayload, sender: Uuid) {
        let forwarded = PingPayload {
            ttl: ping.ttl.saturating_sub(1),
            ..ping.clone()
        };
        for (peer_id, record) in self.peers.snapshot() {
            if peer_id == sender {
                continue;
            }
            if let Err(e) = self.send_ping(&record.host, record.port, &forwarded) {
                warn!("Failed to forward PING {} to {peer_id}: {e}", ping.ping_id);
            }
        }
    }

    fn send_ping(&self, host: &str, port: u16, ping: &PingPayload) -> Result<()> {
        let envelope = self.envelope(MessageType::Ping, ping)?;
        self.send_one_shot(host, port, &envelope)
    }

    /// The PONG this node answers `ping` with. Any node holding a board
    /// answers, whatever the keywords; the searcher does the filtering.
    pub fn answer_ping(&self, ping: &PingPayload) -> Option<PongPayload> {
        let board = self.board.get()?;
        let boards = if self.is_bootstrap {
            self.registry.list_boards().unwrap_or_else(|e| {
                warn!("Failed to list registered boards: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Some(PongPayload {
            ping_id: ping.ping_id,
            title: board.get_title(),
            board_id: board.get_board_id(),
            responder_id: self.node_id,
            responder_host: self.host.clone(),
            responder_port: self.port,
            boards,
        })
    }

    /// Deliver a PONG straight to the PING's origin
    pub fn send_pong(&self, ping: &PingPayload, pong: &PongPayload) -> Result<()> {
        let envelope = self.envelope(MessageType::Pong, pong)?;
        self.send_one_shot(&ping.origin_host, ping.origin_port, &envelope)
    }

    pub fn search_results(&self, ping_id: &Uuid) -> Vec<PongInfo> {
        self.searches.results(ping_id)
    }

    /// Announce a card to every super-peer that answered a search with
    /// `board_title`. Returns how many accepted the announcement.
    pub fn announce_card(&self, board_title: &str, card_title: &str) -> usize {
        self.searches
            .responders_for_board(board_title)
            .into_iter()
            .filter(|(host, port)| {
                match self.announce_card_to(host, *port, board_title, card_title) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to announce '{card_title}' to {host}:{port}: {e}");
                        false
                    }
                }
            })
            .count()
    }

    pub fn announce_card_to(
        &self,
        host: &str,
        port: u16,
        board_title: &str,
        card_title: &str,
    ) -> Result<()> {
        let entries = vec![DataUpdateEntry {
            board: board_title.to_string(),
            title: card_title.to_string(),
            kind: CARD_ENTRY_KIND.to_string(),
        }];
        let envelope = self.envelope(MessageType::DataUpdate, &entries)?;
        self.send_one_shot(host, port, &envelope)
    }

    /// Send a DATA_REQUEST (or DATA_PEER_REQUEST) and wait for one reply
    pub fn send_data_request(
        &self,
        host: &str,
        port: u16,
        board: &str,
        kind: &str,
        title: Option<&str>,
        peer_request: bool,
    ) -> Result<Option<Envelope>> {
        let payload = DataRequestPayload {
            board: board.to_string(),
            kind: kind.to_string(),
            title: title.map(str::to_string),
        };
        let message_type = if peer_request {
            MessageType::DataPeerRequest
        } else {
            MessageType::DataRequest
        };
        let envelope = self.envelope(message_type, &payload)?;
        self.request(host, port, &envelope)
    }

    /// Ask a super-peer for the card references of `board_title` and fetch
    /// each card's content from the peer holding it
    pub fn request_board_meta(
        &self,
        host: &str,
        port: u16,
        board_title: &str,
    ) -> Result<Vec<ResolvedCard>> {
        let Some(reply) = self.send_data_request(host, port, board_title, META_REQUEST, None, false)?
        else {
            return Ok(Vec::new());
        };

        match reply.kind {
            MessageType::DataResponse => {
                let entries: Vec<MetaEntry> = reply.payload_as()?;
                let board_id = self.searches.board_id_for(host, port, board_title);
                Ok(self.resolve_meta_data(&entries, board_title, board_id))
            }
            MessageType::Error => {
                let error: ErrorPayload = reply.payload_as()?;
                Err(OverlayError::Validation(error.error))
            }
            other => Err(OverlayError::MalformedMessage(format!(
                "Unexpected {other} reply to meta request"
            ))),
        }
    }

    /// Fetch content for each reference. Unreachable holders are skipped.
    pub fn resolve_meta_data(
        &self,
        entries: &[MetaEntry],
        board_title: &str,
        board_id: Option<Uuid>,
    ) -> Vec<ResolvedCard> {
        let mut resolved = Vec::new();
        for MetaEntry(origin, title, host, port, _) in entries {
            match self.request_content(host, *port, board_title, title) {
                Ok(Some(reply)) => {
                    resolved.extend(
                        reply
                            .entries
                            .into_iter()
                            .filter(|ContentEntry(board, card, _)| {
                                board == board_title && card == title
                            })
                            .map(|ContentEntry(_, card, content)| ResolvedCard {
                                board_id,
                                board_title: board_title.to_string(),
                                origin_node_id: reply.responder_id,
                                title: card,
                                content,
                            }),
                    );
                }
                Ok(None) => debug!("Holder {origin} has no content for '{title}'"),
                Err(e) => warn!("Failed to fetch '{title}' from {host}:{port}: {e}"),
            }
        }
        resolved
    }

    /// Ask the peer at `host:port` directly for a card's content
    pub fn request_content(
        &self,
        host: &str,
        port: u16,
        board: &str,
        title: &str,
    ) -> Result<Option<ContentReply>> {
        let reply = self.send_data_request(host, port, board, CONTENT_REQUEST, Some(title), true)?;
        match reply {
            Some(reply) if reply.kind == MessageType::DataResponse => Ok(Some(ContentReply {
                responder_id: reply.node_id,
                entries: reply.payload_as()?,
            })),
            Some(reply) if reply.kind == MessageType::Error => {
                let error: ErrorPayload = reply.payload_as()?;
                Err(OverlayError::Validation(error.error))
            }
            Some(reply) => {
                debug!("Content request answered with {}", reply.kind);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Store card content locally so peers can fetch it
    pub fn add_content_card(&self, content: &str, title: &str, board: Option<&str>) -> Result<()> {
        self.content.add(content, title, board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::testnet::test_config;

    fn node() -> Arc<Node> {
        Node::new(test_config(), Arc::new(MemoryRegistry::new())).unwrap()
    }

    fn keywords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn ping(words: &[&str]) -> PingPayload {
        PingPayload {
            ping_id: Uuid::new_v4(),
            origin_id: Uuid::new_v4(),
            origin_host: "127.0.0.1".to_string(),
            origin_port: 1,
            ttl: 5,
            keywords: keywords(words),
        }
    }

    #[test]
    fn test_port_resolved_from_listener() {
        let node = node();
        assert_ne!(node.port(), 0);
        assert_eq!(node.port(), node.local_addr().port());
        assert!(!node.is_bootstrap());
        assert!(!node.is_super_peer());
        assert!(node.board().is_none());
    }

    #[test]
    fn test_bootstrap_owns_default_board() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config();
        config.bootstrap_port = listener.local_addr().unwrap().port();

        let node = Node::with_listener(config, Arc::new(MemoryRegistry::new()), listener).unwrap();
        assert!(node.is_bootstrap());
        assert!(node.is_super_peer());
        assert_eq!(node.board().unwrap().get_title(), DEFAULT_BOARD);
    }

    #[test]
    fn test_become_super_peer_once() {
        let node = node();
        assert!(node.become_super_peer("yolo", keywords(&["hello", "world"])));
        assert!(!node.become_super_peer("other", keywords(&["x"])));

        assert!(node.is_super_peer());
        assert_eq!(node.board().unwrap().get_title(), "yolo");
    }

    #[test]
    fn test_answer_ping_requires_board() {
        let node = node();
        assert!(node.answer_ping(&ping(&["world"])).is_none());

        node.become_super_peer("yolo", keywords(&["hello", "world"]));
        let pong = node.answer_ping(&ping(&["world"])).unwrap();
        assert_eq!(pong.title, "yolo");
        assert_eq!(pong.responder_id, node.node_id());
        assert!(pong.boards.is_empty());

        let pong = node.answer_ping(&ping(&["nothing"])).unwrap();
        assert_eq!(pong.title, "yolo");
        assert!(node.answer_ping(&ping(&[])).is_some());
    }

    #[test]
    fn test_connect_to_self_is_refused() {
        let node = node();
        let (host, port) = (node.host().to_string(), node.port());
        assert!(!node.connect(&host, port, true));
        assert!(node.peers().is_empty());
    }

    #[test]
    fn test_bootstrap_unreachable() {
        let node = node();
        assert!(!node.do_bootstrap());
        assert!(node.peers().is_empty());
    }

    #[test]
    fn test_plain_peer_does_not_crawl() {
        let node = node();
        assert_eq!(node.request_peers(), 0);
    }

    #[test]
    fn test_search_without_peers_opens_session() {
        let node = node();
        let ping_id = node.issue_search_request(keywords(&["world"]));
        assert!(node.searches().contains(&ping_id));
        assert!(node.search_results(&ping_id).is_empty());
    }

    #[test]
    fn test_content_too_large_rejected() {
        let node = node();
        let content = "x".repeat(crate::board::MAX_CONTENT_LEN + 1);
        let result = node.add_content_card(&content, "card1", Some("yolo"));
        assert!(matches!(result, Err(OverlayError::ContentTooLarge { .. })));
    }

    #[test]
    fn test_start_twice_fails() {
        let node = node();
        node.start().unwrap();
        assert!(node.is_running());
        assert!(node.start().is_err());
        node.stop();
        node.join();
        assert!(!node.is_running());
    }
}
