//! Session Channel Adapter
//!
//! Owns one WebSocket connection to the relay for one session. A background
//! task performs the connect, pumps outbound messages and decodes inbound
//! frames into [`ChannelEvent`]s. Best effort and single shot: no acks, no
//! queueing while disconnected, no reconnection.

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::network::protocol::{JoinRequest, PeerMessage, ProtocolViolation};

/// Lifecycle of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in flight.
    Connecting,
    /// Messages may be sent.
    Open,
    /// Closed by either side.
    Closed,
    /// Transport failure.
    Errored,
}

/// Events delivered to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection established.
    Opened,
    /// Valid message from the peer.
    Message(PeerMessage),
    /// Frame that failed to decode. The stream continues.
    Malformed(ProtocolViolation),
    /// Connection closed by the remote side.
    Closed,
    /// Transport failure.
    Errored(String),
}

/// Send-side errors. Transport failures arrive as [`ChannelEvent::Errored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Send attempted while the connection is not open.
    #[error("not connected")]
    NotConnected,

    /// Outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
}

/// Outbound side the session sends through.
pub trait MessageSink {
    /// Send a message to the peer without waiting.
    fn send(&self, message: PeerMessage) -> Result<(), ChannelError>;
}

/// Cloneable send handle. Does not own the connection.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    outgoing: mpsc::Sender<PeerMessage>,
    state: watch::Receiver<ConnectionState>,
}

impl ChannelHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

impl MessageSink for ChannelHandle {
    fn send(&self, message: PeerMessage) -> Result<(), ChannelError> {
        if self.state() != ConnectionState::Open {
            return Err(ChannelError::NotConnected);
        }
        self.outgoing.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::NotConnected,
        })
    }
}

/// Why the connection task stopped.
enum Exit {
    /// Local close, or the session stopped listening.
    Local,
    /// Peer or relay closed the socket.
    Remote,
    /// Transport error.
    Failed(String),
}

/// One session's connection to the relay.
///
/// Dropping the channel signals the connection task to shut down; prefer
/// [`SessionChannel::close`] to also wait for the socket to be released.
pub struct SessionChannel {
    handle: ChannelHandle,
    events: mpsc::Receiver<ChannelEvent>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionChannel {
    /// Start connecting to the relay. Must be called within a Tokio runtime.
    pub fn connect(config: &ClientConfig, request: JoinRequest) -> Self {
        let url = format!("{}?{}", config.relay_url, request.to_query());
        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let (events_tx, events) = mpsc::channel(config.inbound_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(run_connection(url, outgoing_rx, events_tx, state_tx, shutdown_rx));

        Self {
            handle: ChannelHandle {
                outgoing: outgoing_tx,
                state: state_rx,
            },
            events,
            shutdown_tx,
            task,
        }
    }

    /// Send handle for the session.
    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Next inbound event. `None` once the connection task has finished
    /// and every buffered event was delivered.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Close the connection and wait until the socket is released.
    pub async fn close(mut self) {
        let _ = self.shutdown_tx.send(());
        self.events.close();
        if let Err(e) = (&mut self.task).await {
            warn!("Connection task ended abnormally: {}", e);
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Connection task: connect, pump frames, report the exit reason.
#[instrument(skip_all, fields(url = %url))]
async fn run_connection(
    url: String,
    mut outgoing_rx: mpsc::Receiver<PeerMessage>,
    events_tx: mpsc::Sender<ChannelEvent>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ws_stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!("Failed to connect: {}", e);
                let _ = state_tx.send(ConnectionState::Errored);
                let _ = events_tx.send(ChannelEvent::Errored(e.to_string())).await;
                return;
            }
        },
        _ = shutdown_rx.recv() => {
            debug!("Closed while connecting");
            let _ = state_tx.send(ConnectionState::Closed);
            return;
        }
    };

    info!("WebSocket connected");
    let _ = state_tx.send(ConnectionState::Open);
    if events_tx.send(ChannelEvent::Opened).await.is_err() {
        let _ = state_tx.send(ConnectionState::Closed);
        return;
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let exit = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break Exit::Local,

            outbound = outgoing_rx.recv() => {
                let Some(message) = outbound else {
                    break Exit::Local;
                };
                let text = match message.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Failed to serialize {}: {}", message.kind(), e);
                        continue;
                    }
                };
                debug!("Sending: {}", text);
                if let Err(e) = ws_sender.send(Message::Text(text)).await {
                    break Exit::Failed(e.to_string());
                }
            }

            inbound = ws_receiver.next() => {
                let event = match inbound {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received: {}", text);
                        match PeerMessage::from_json(&text) {
                            Ok(message) => ChannelEvent::Message(message),
                            Err(violation) => ChannelEvent::Malformed(violation),
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        ChannelEvent::Malformed(ProtocolViolation::BinaryFrame(data.len()))
                    }
                    Some(Ok(Message::Close(_))) | None => break Exit::Remote,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break Exit::Failed(e.to_string()),
                };
                if events_tx.send(event).await.is_err() {
                    break Exit::Local;
                }
            }
        }
    };

    match exit {
        Exit::Local => {
            let _ = ws_sender.close().await;
            let _ = state_tx.send(ConnectionState::Closed);
            info!("Connection closed locally");
        }
        Exit::Remote => {
            let _ = state_tx.send(ConnectionState::Closed);
            info!("Connection closed by remote");
            let _ = events_tx.send(ChannelEvent::Closed).await;
        }
        Exit::Failed(detail) => {
            let _ = state_tx.send(ConnectionState::Errored);
            warn!("Connection failed: {}", detail);
            let _ = events_tx.send(ChannelEvent::Errored(detail)).await;
        }
    }
}
