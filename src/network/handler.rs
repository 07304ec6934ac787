use crate::error::{OverlayError, Result};
use crate::network::node::Node;
use crate::network::peer_directory::PeerRecord;
use crate::network::routing::PongInfo;
use crate::protocol::{
    decode, read_frame, send_envelope, BoardRecord, ConnectPayload, DataRequestPayload,
    DataUpdateEntry, Envelope, ErrorPayload, MessageType, PeerEntry, PingPayload, PongPayload,
    StatusPayload, UnregisterPayload, CARD_ENTRY_KIND, CONTENT_REQUEST, META_REQUEST,
    STATUS_IGNORED, STATUS_NOT_FOUND, STATUS_REGISTERED, STATUS_UNREGISTERED,
};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Map;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

/// What the loop does after a message has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Serves one connection: read a frame, dispatch it, repeat until the
/// peer goes away or a handler asks to close
pub struct ConnectionHandler {
    node: Arc<Node>,
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl ConnectionHandler {
    pub fn new(node: Arc<Node>, stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            node,
            stream,
            peer_addr,
        }
    }

    pub fn run(mut self) {
        loop {
            let body = match read_frame(&mut self.stream) {
                Ok(Some(body)) => body,
                Ok(None) => {
                    debug!("{} ended the session", self.peer_addr);
                    return;
                }
                Err(e) => {
                    warn!("Connection with {} failed: {e}", self.peer_addr);
                    break;
                }
            };

            let flow = match decode(&body) {
                Ok(envelope) => {
                    debug!(
                        "Received {} from {} ({})",
                        envelope.kind, envelope.node_id, self.peer_addr
                    );
                    self.dispatch(envelope).unwrap_or_else(|e| {
                        error!("Error handling message from {}: {e}", self.peer_addr);
                        Flow::Close
                    })
                }
                Err(e) => {
                    warn!("Dropping malformed message from {}: {e}", self.peer_addr);
                    self.reply_close_quietly();
                    Flow::Close
                }
            };

            if flow == Flow::Close {
                break;
            }
        }

        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<Flow> {
        match envelope.kind {
            MessageType::Connect => self.handle_connect(&envelope),
            MessageType::GetPeers => self.handle_get_peers(&envelope),
            MessageType::PeerList => self.handle_peer_list(&envelope),
            MessageType::Ping => self.handle_ping(&envelope),
            MessageType::Pong => self.handle_pong(&envelope),
            MessageType::DataUpdate => self.handle_data_update(&envelope),
            MessageType::DataRequest => self.handle_data_request(&envelope),
            MessageType::DataPeerRequest => self.handle_data_peer_request(&envelope),
            MessageType::BoardRegister => self.handle_board_register(&envelope),
            MessageType::BoardUnregister => self.handle_board_unregister(&envelope),
            MessageType::ConnectResponse | MessageType::DataResponse => {
                debug!("Unsolicited {} from {}", envelope.kind, self.peer_addr);
                self.reply_close()?;
                Ok(Flow::Close)
            }
            MessageType::BoardRegisterResponse | MessageType::BoardUnregisterResponse => {
                let status = envelope
                    .payload_as::<StatusPayload>()
                    .map(|payload| payload.status)
                    .unwrap_or_default();
                info!("{} from {}: {status}", envelope.kind, self.peer_addr);
                Ok(Flow::Close)
            }
            MessageType::Close => Ok(Flow::Close),
            MessageType::Error | MessageType::Unknown => {
                let reason = envelope
                    .payload_as::<ErrorPayload>()
                    .map(|payload| payload.error)
                    .unwrap_or_default();
                warn!("Peer {} reported an error: {reason}", self.peer_addr);
                self.reply_close()?;
                Ok(Flow::Close)
            }
        }
    }

    fn reply<P: Serialize>(&mut self, kind: MessageType, payload: &P) -> Result<()> {
        let envelope = self.node.envelope(kind, payload)?;
        send_envelope(&mut self.stream, &envelope)
    }

    fn reply_close(&mut self) -> Result<()> {
        self.reply(MessageType::Close, &Map::new())
    }

    fn reply_close_quietly(&mut self) {
        if let Err(e) = self.reply_close() {
            debug!("Failed to send close to {}: {e}", self.peer_addr);
        }
    }

    fn reply_error(&mut self, error: &OverlayError) -> Result<()> {
        let message = match error {
            OverlayError::Validation(msg) | OverlayError::MalformedMessage(msg) => msg.clone(),
            other => other.to_string(),
        };
        self.reply(MessageType::Error, &ErrorPayload { error: message })
    }

    fn handle_connect(&mut self, envelope: &Envelope) -> Result<Flow> {
        let connect: ConnectPayload = envelope.payload_as()?;
        if connect.node_id == self.node.node_id() {
            info!("Refusing CONNECT from this node's own id");
            self.reply_close()?;
            return Ok(Flow::Close);
        }

        let record = PeerRecord::new(&connect.host, connect.port, envelope.is_super);
        if self.node.peers().admit(connect.node_id, record) {
            info!(
                "Peer {} connected from {}:{}",
                connect.node_id, connect.host, connect.port
            );
            self.reply(MessageType::ConnectResponse, &Map::new())?;
            Ok(Flow::Continue)
        } else {
            let refusal = OverlayError::CapacityExceeded {
                capacity: self.node.peers().capacity(),
            };
            warn!("Rejecting CONNECT from {}: {refusal}", connect.node_id);
            self.reply_close()?;
            Ok(Flow::Close)
        }
    }

    fn handle_get_peers(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        if !node.is_super_peer() {
            debug!("Ignoring GET_PEERS: not a super-peer");
            self.reply_close()?;
            return Ok(Flow::Close);
        }

        let requester = envelope.node_id;
        if requester != node.node_id()
            && !node.peers().contains(&requester)
            && node.connect(&envelope.host, envelope.port, false)
        {
            node.peers().admit(
                requester,
                PeerRecord::new(&envelope.host, envelope.port, envelope.is_super),
            );
        }

        let mut candidates = node.peers().super_peers_excluding(&requester);
        if node.is_bootstrap() && requester != node.node_id() {
            candidates.push(PeerEntry {
                node_id: node.node_id(),
                host: node.host().to_string(),
                port: node.port(),
            });
        }
        let sample: Vec<PeerEntry> = candidates
            .choose_multiple(&mut rand::thread_rng(), node.config().max_peer_list)
            .cloned()
            .collect();

        debug!("Sending {} peers to {requester}", sample.len());
        self.reply(MessageType::PeerList, &sample)?;
        Ok(Flow::Continue)
    }

    fn handle_peer_list(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        if !node.is_super_peer() {
            debug!("Ignoring PEER_LIST: not a super-peer");
            return Ok(Flow::Close);
        }

        let entries: Vec<PeerEntry> = envelope.payload_as()?;
        for entry in entries {
            if node.peers().is_full() {
                info!("Peer directory full, ignoring the rest of the peer list");
                break;
            }
            if entry.node_id == node.node_id() || node.peers().contains(&entry.node_id) {
                continue;
            }
            node.connect(&entry.host, entry.port, true);
        }
        Ok(Flow::Close)
    }

    fn handle_ping(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        let ping: PingPayload = envelope.payload_as()?;

        if ping.origin_id == node.node_id() || node.searches().contains(&ping.ping_id) {
            debug!("Ignoring own PING {}", ping.ping_id);
            return Ok(Flow::Continue);
        }

        let reverse = self.stream.try_clone().ok();
        if !node.routing().record_if_new(ping.ping_id, reverse) {
            debug!("Dropping duplicate PING {}", ping.ping_id);
            return Ok(Flow::Continue);
        }

        if let Some(pong) = node.answer_ping(&ping) {
            if let Err(e) = node.send_pong(&ping, &pong) {
                warn!(
                    "Failed to send PONG to {}:{}: {e}",
                    ping.origin_host, ping.origin_port
                );
            }
        }

        if ping.ttl > 1 {
            node.forward_ping(&ping, envelope.node_id);
        }
        Ok(Flow::Continue)
    }

    fn handle_pong(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        let pong: PongPayload = envelope.payload_as()?;

        if node.searches().append(&pong.ping_id, PongInfo::from(&pong)) {
            info!(
                "Search {} answered by {} with board '{}'",
                pong.ping_id, pong.responder_id, pong.title
            );
            if node
                .config()
                .is_bootstrap_addr(&pong.responder_host, pong.responder_port)
            {
                if let Err(e) = node.registry().store_received_boards(&pong.boards) {
                    warn!("Failed to store boards received from bootstrap: {e}");
                }
            }
        } else if let Some(mut reverse) = node.routing().reverse_stream(&pong.ping_id) {
            if let Err(e) = send_envelope(&mut reverse, envelope) {
                warn!("Failed to relay PONG {}: {e}", pong.ping_id);
            }
        } else {
            info!("Dropping undeliverable PONG {}", pong.ping_id);
        }
        Ok(Flow::Continue)
    }

    fn handle_data_update(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        let board = match node.board() {
            Some(board) if node.is_super_peer() => board,
            _ => {
                debug!("Ignoring DATA_UPDATE: no board here");
                return Ok(Flow::Close);
            }
        };

        let entries: Vec<DataUpdateEntry> = envelope.payload_as()?;
        let title = board.get_title();
        for entry in entries {
            if entry.board.is_empty() || entry.title.is_empty() {
                warn!("Skipping incomplete card announcement from {}", envelope.node_id);
                continue;
            }
            if entry.board != title || entry.kind != CARD_ENTRY_KIND {
                debug!("Skipping announcement for board '{}'", entry.board);
                continue;
            }
            board.add_or_refresh_reference(
                envelope.node_id,
                &entry.title,
                &envelope.host,
                envelope.port,
            )?;
            debug!("Card '{}' announced by {}", entry.title, envelope.node_id);
        }
        Ok(Flow::Continue)
    }

    fn handle_data_request(&mut self, envelope: &Envelope) -> Result<Flow> {
        let served = envelope
            .payload_as::<DataRequestPayload>()
            .and_then(|request| self.serve_data_request(&request));
        self.answer_or_report(served)
    }

    fn serve_data_request(&mut self, request: &DataRequestPayload) -> Result<Flow> {
        if request.board.is_empty() {
            return Err(OverlayError::Validation("Missing board title".to_string()));
        }
        if request.kind != META_REQUEST && request.kind != CONTENT_REQUEST {
            return Err(OverlayError::Validation(format!(
                "Unsupported data request type '{}'",
                request.kind
            )));
        }

        let node = Arc::clone(&self.node);
        if !node.is_super_peer() {
            return Err(OverlayError::Validation("Not a super-peer".to_string()));
        }
        let board = node
            .board()
            .ok_or_else(|| OverlayError::Validation("No board on this node".to_string()))?;
        if board.get_title() != request.board {
            return Err(OverlayError::Validation(format!(
                "Board '{}' not found",
                request.board
            )));
        }

        if request.kind == META_REQUEST {
            node.evict_stale_references();
            self.reply(MessageType::DataResponse, &board.meta_entries())?;
            Ok(Flow::Continue)
        } else {
            let title = request.title.as_deref().ok_or_else(|| {
                OverlayError::Validation("Content request without a title".to_string())
            })?;
            self.send_content_card(title)?;
            Ok(Flow::Close)
        }
    }

    fn handle_data_peer_request(&mut self, envelope: &Envelope) -> Result<Flow> {
        let served = envelope
            .payload_as::<DataRequestPayload>()
            .and_then(|request| {
                if request.kind != CONTENT_REQUEST {
                    return Err(OverlayError::Validation(format!(
                        "Peers only serve '{CONTENT_REQUEST}' requests, got '{}'",
                        request.kind
                    )));
                }
                let title = request.title.ok_or_else(|| {
                    OverlayError::Validation("Content request without a title".to_string())
                })?;
                self.send_content_card(&title)?;
                Ok(Flow::Close)
            });
        self.answer_or_report(served)
    }

    /// Echo request-level failures back to the requester, then close
    fn answer_or_report(&mut self, served: Result<Flow>) -> Result<Flow> {
        match served {
            Ok(flow) => Ok(flow),
            Err(e @ (OverlayError::Validation(_) | OverlayError::MalformedMessage(_))) => {
                info!("Rejecting data request from {}: {e}", self.peer_addr);
                self.reply_error(&e)?;
                Ok(Flow::Close)
            }
            Err(e) => Err(e),
        }
    }

    /// Reply with the stored content for `title`; say nothing if unknown
    fn send_content_card(&mut self, title: &str) -> Result<()> {
        match self.node.content().content_entry(title) {
            Some(entry) => self.reply(MessageType::DataResponse, &vec![entry]),
            None => {
                debug!("No content stored for card '{title}'");
                Ok(())
            }
        }
    }

    fn handle_board_register(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        let status = if node.is_bootstrap() {
            let record: BoardRecord = envelope.payload_as()?;
            info!(
                "Registering board '{}' of {}",
                record.board_title, record.peer_id
            );
            node.registry().register_board(record)?;
            STATUS_REGISTERED
        } else {
            STATUS_IGNORED
        };

        self.reply(
            MessageType::BoardRegisterResponse,
            &StatusPayload {
                status: status.to_string(),
            },
        )?;
        Ok(Flow::Continue)
    }

    fn handle_board_unregister(&mut self, envelope: &Envelope) -> Result<Flow> {
        let node = Arc::clone(&self.node);
        let status = if node.is_bootstrap() {
            let request: UnregisterPayload = envelope.payload_as()?;
            if node
                .registry()
                .unregister_board(request.peer_id, &request.board_title)?
            {
                STATUS_UNREGISTERED
            } else {
                STATUS_NOT_FOUND
            }
        } else {
            STATUS_IGNORED
        };

        self.reply(
            MessageType::BoardUnregisterResponse,
            &StatusPayload {
                status: status.to_string(),
            },
        )?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{receive_envelope, NodeIdentity};
    use crate::testnet::spawn_node;
    use std::time::Duration;
    use uuid::Uuid;

    fn stranger() -> NodeIdentity {
        NodeIdentity {
            node_id: Uuid::new_v4(),
            host: "127.0.0.1".to_string(),
            port: 1,
            is_super_peer: false,
            is_bootstrap: false,
        }
    }

    fn exchange<P: Serialize>(node: &Node, kind: MessageType, payload: &P) -> Option<Envelope> {
        let mut stream = TcpStream::connect(node.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let envelope = Envelope::new(kind, &stranger(), payload).unwrap();
        send_envelope(&mut stream, &envelope).unwrap();
        receive_envelope(&mut stream).unwrap()
    }

    #[test]
    fn test_connect_is_answered() {
        let node = spawn_node();
        let me = stranger();
        let payload = ConnectPayload {
            node_id: me.node_id,
            host: me.host.clone(),
            port: me.port,
        };

        let reply = exchange(&node, MessageType::Connect, &payload).unwrap();
        assert_eq!(reply.kind, MessageType::ConnectResponse);
        assert_eq!(reply.node_id, node.node_id());
        node.stop();
    }

    #[test]
    fn test_plain_peer_refuses_get_peers() {
        let node = spawn_node();
        let reply = exchange(&node, MessageType::GetPeers, &Vec::<PeerEntry>::new()).unwrap();
        assert_eq!(reply.kind, MessageType::Close);
        node.stop();
    }

    #[test]
    fn test_meta_request_without_board_is_an_error() {
        let node = spawn_node();
        let request = DataRequestPayload {
            board: "yolo".to_string(),
            kind: META_REQUEST.to_string(),
            title: None,
        };

        let reply = exchange(&node, MessageType::DataRequest, &request).unwrap();
        assert_eq!(reply.kind, MessageType::Error);
        let error: ErrorPayload = reply.payload_as().unwrap();
        assert_eq!(error.error, "Not a super-peer");
        node.stop();
    }

    #[test]
    fn test_unknown_content_gets_no_answer() {
        let node = spawn_node();
        let request = DataRequestPayload {
            board: "yolo".to_string(),
            kind: CONTENT_REQUEST.to_string(),
            title: Some("missing".to_string()),
        };

        assert!(exchange(&node, MessageType::DataPeerRequest, &request).is_none());
        node.stop();
    }

    #[test]
    fn test_registration_ignored_off_bootstrap() {
        let node = spawn_node();
        let payload = UnregisterPayload {
            peer_id: Uuid::new_v4(),
            board_title: "yolo".to_string(),
        };

        let reply = exchange(&node, MessageType::BoardUnregister, &payload).unwrap();
        assert_eq!(reply.kind, MessageType::BoardUnregisterResponse);
        let status: StatusPayload = reply.payload_as().unwrap();
        assert_eq!(status.status, STATUS_IGNORED);
        node.stop();
    }
}
