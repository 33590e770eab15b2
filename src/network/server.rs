//! WebSocket Room Relay
//!
//! Pairs two peers under a room token and forwards every text frame from
//! one peer to the other. The relay never parses game messages.
//!
//! Admission happens during the HTTP upgrade, so rejected peers receive a
//! plain HTTP error instead of a WebSocket that closes immediately.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::network::protocol::{JoinRequest, JoinRequestError, RoomToken};

/// Peers allowed in one room.
pub const ROOM_CAPACITY: usize = 2;

/// Relay server errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Why a connection was refused during the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Path is not the WebSocket endpoint.
    #[error("Not Found")]
    WrongPath,

    /// Missing or invalid room parameter.
    #[error("Room ID is required")]
    RoomRequired,

    /// Joiner named a room nobody created.
    #[error("Room does not exist")]
    RoomNotFound,

    /// Joiner named a room that is not waiting for exactly one peer.
    #[error("Room does not exist or maybe full")]
    RoomFull,

    /// Creator named a room that already has peers.
    #[error("Room already exists")]
    RoomTaken,
}

impl Rejection {
    /// HTTP status sent to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::WrongPath | Rejection::RoomNotFound | Rejection::RoomFull => {
                StatusCode::NOT_FOUND
            }
            Rejection::RoomRequired => StatusCode::BAD_REQUEST,
            Rejection::RoomTaken => StatusCode::CONFLICT,
        }
    }

    fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = self.status();
        response
    }
}

impl From<JoinRequestError> for Rejection {
    fn from(_: JoinRequestError) -> Self {
        Rejection::RoomRequired
    }
}

// =============================================================================
// ROOM REGISTRY
// =============================================================================

type PeerSender = mpsc::Sender<String>;

/// Rooms and the outbound queues of their peers.
///
/// Guarded by a std mutex: critical sections never await, and admission
/// runs inside the synchronous handshake callback.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<BTreeMap<RoomToken, BTreeMap<Uuid, PeerSender>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RoomToken, BTreeMap<Uuid, PeerSender>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a peer to a room if the request is admissible.
    pub fn admit(
        &self,
        request: &JoinRequest,
        peer: Uuid,
        sender: PeerSender,
    ) -> Result<(), Rejection> {
        let mut rooms = self.lock();
        let occupants = rooms.get(&request.room).map_or(0, BTreeMap::len);

        if request.joining {
            if occupants == 0 {
                return Err(Rejection::RoomNotFound);
            }
            if occupants != 1 {
                return Err(Rejection::RoomFull);
            }
        } else if occupants > 0 {
            return Err(Rejection::RoomTaken);
        }

        rooms.entry(request.room.clone()).or_default().insert(peer, sender);
        Ok(())
    }

    /// Remove a peer; empty rooms are deleted.
    pub fn remove(&self, room: &RoomToken, peer: &Uuid) {
        let mut rooms = self.lock();
        if let Some(peers) = rooms.get_mut(room) {
            peers.remove(peer);
            if peers.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Forward a frame to every other peer of the room.
    ///
    /// Peers whose queue is closed or full are dropped from the room.
    /// Returns the number of peers the frame was queued for.
    pub fn forward(&self, room: &RoomToken, from: &Uuid, frame: &str) -> usize {
        let mut rooms = self.lock();
        let Some(peers) = rooms.get_mut(room) else {
            return 0;
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (peer, sender) in peers.iter() {
            if peer == from {
                continue;
            }
            match sender.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping peer {} from room {}: {}", peer, room, e);
                    failed.push(*peer);
                }
            }
        }
        for peer in failed {
            peers.remove(&peer);
        }
        if peers.is_empty() {
            rooms.remove(room);
        }

        delivered
    }

    /// Number of peers in a room.
    pub fn peer_count(&self, room: &RoomToken) -> usize {
        self.lock().get(room).map_or(0, BTreeMap::len)
    }

    /// Number of open rooms.
    pub fn room_count(&self) -> usize {
        self.lock().len()
    }
}

/// Removes the peer from its room when the connection ends.
struct Membership {
    registry: Arc<RoomRegistry>,
    room: RoomToken,
    peer: Uuid,
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.registry.remove(&self.room, &self.peer);
        debug!("Peer {} left room {}", self.peer, self.room);
    }
}

/// Decrements the live connection count when dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Check the upgrade request and register the peer.
fn admit_request(
    registry: &RoomRegistry,
    ws_path: &str,
    request: &Request,
    peer: Uuid,
    sender: PeerSender,
) -> Result<RoomToken, Rejection> {
    let path = request.uri().path();
    let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };
    if path != ws_path {
        return Err(Rejection::WrongPath);
    }

    let join = JoinRequest::from_query(request.uri().query().unwrap_or(""))?;
    registry.admit(&join, peer, sender)?;
    Ok(join.room)
}

// =============================================================================
// SERVER
// =============================================================================

/// The relay server.
pub struct RelayServer {
    /// Server configuration.
    config: RelayConfig,
    /// Bound listener.
    listener: TcpListener,
    /// Rooms.
    rooms: Arc<RoomRegistry>,
    /// Live connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Bind the listener.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            rooms: Arc::new(RoomRegistry::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until [`RelayServer::shutdown`] is called.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), RelayError> {
        info!("Relay listening on {}", self.listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let slot = ConnectionSlot(self.connections.clone());
        let rooms = self.rooms.clone();
        let ws_path = self.config.ws_path.clone();
        let (peer_tx, mut peer_rx) = mpsc::channel::<String>(self.config.peer_buffer.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            let peer = Uuid::new_v4();

            let mut admitted = None;
            let callback = |request: &Request, response: Response| {
                match admit_request(&rooms, &ws_path, request, peer, peer_tx) {
                    Ok(room) => {
                        admitted = Some(room);
                        Ok(response)
                    }
                    Err(rejection) => {
                        info!("Rejected {} ({}): {}", addr, request.uri(), rejection);
                        Err(rejection.into_response())
                    }
                }
            };
            let handshake = accept_hdr_async(stream, callback).await;

            // Registered in the callback; released on every path below.
            let membership = admitted.map(|room| Membership {
                registry: rooms.clone(),
                room,
                peer,
            });

            let ws_stream = match handshake {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };
            let Some(membership) = membership else {
                return;
            };
            info!("Peer {} from {} entered room {}", peer, addr, membership.room);

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            // Frames forwarded by the other peer
            let mut sender_task = tokio::spawn(async move {
                while let Some(text) = peer_rx.recv().await {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let delivered = rooms.forward(&membership.room, &peer, &text);
                                debug!("Relayed frame from {} to {} peer(s)", peer, delivered);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Peer {} disconnected", peer);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for peer {}: {}", peer, e);
                                break;
                            }
                            Some(Ok(_)) => {}
                        }
                    }
                    _ = &mut sender_task => {
                        debug!("Outbound side of peer {} ended", peer);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Dropping the membership closes this peer's queue, which ends
            // the sender task after it flushes and sends a close frame.
            drop(membership);
            if !sender_task.is_finished() {
                let _ = sender_task.await;
            }

            info!("Peer {} cleaned up", peer);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get live connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Room registry.
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }
}
