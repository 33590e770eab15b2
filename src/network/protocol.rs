//! Protocol Messages
//!
//! Wire format between the two peers of a room. Messages are JSON text
//! frames tagged by `type`; the relay forwards them without parsing.
//! No versioning, acknowledgements or sequence numbers.

use std::fmt;
use std::str::FromStr;
use rand::Rng;
use serde::{Serialize, Deserialize};
use thiserror::Error;

// =============================================================================
// PEER MESSAGES
// =============================================================================

/// Messages exchanged between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerMessage {
    /// Presence announcement, sent once the connection opens.
    Ready,

    /// The sender claimed a cell.
    MakeMove {
        /// Cell index, 0-8 row-major.
        index: u8,
    },

    /// The sender cleared the board for a new round.
    Restart,
}

impl PeerMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Ready => "ready",
            PeerMessage::MakeMove { .. } => "makeMove",
            PeerMessage::Restart => "restart",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolViolation> {
        serde_json::from_str(s).map_err(|e| ProtocolViolation::Malformed(e.to_string()))
    }
}

/// Inbound frame that is not a valid peer message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Unknown `type` or bad payload.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Binary frames are not part of the protocol.
    #[error("unexpected binary frame ({0} bytes)")]
    BinaryFrame(usize),
}

// =============================================================================
// ROOM TOKENS
// =============================================================================

/// Maximum room token length.
pub const MAX_ROOM_TOKEN_LEN: usize = 64;

/// Opaque room identifier chosen by the creator.
///
/// Restricted to `[A-Za-z0-9_-]` so it can be placed in a query string
/// without escaping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomToken(String);

/// Rejected room token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomTokenError {
    /// Empty token.
    #[error("room token is empty")]
    Empty,

    /// Longer than [`MAX_ROOM_TOKEN_LEN`].
    #[error("room token is longer than 64 characters")]
    TooLong,

    /// Character outside the allowed set.
    #[error("room token contains invalid character {0:?}")]
    InvalidChar(char),
}

impl RoomToken {
    /// Validate and wrap a token.
    pub fn new(token: impl Into<String>) -> Result<Self, RoomTokenError> {
        let token = token.into();
        if token.is_empty() {
            return Err(RoomTokenError::Empty);
        }
        if token.len() > MAX_ROOM_TOKEN_LEN {
            return Err(RoomTokenError::TooLong);
        }
        if let Some(bad) = token
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(RoomTokenError::InvalidChar(bad));
        }
        Ok(Self(token))
    }

    /// Random numeric room number below 10000.
    pub fn random() -> Self {
        let number: u32 = rand::thread_rng().gen_range(0..10_000);
        Self(number.to_string())
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomToken {
    type Err = RoomTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RoomToken {
    type Error = RoomTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomToken> for String {
    fn from(token: RoomToken) -> Self {
        token.0
    }
}

impl fmt::Display for RoomToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CONNECTION PARAMETERS
// =============================================================================

/// Parameters a peer sends when opening the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    /// Room to enter.
    pub room: RoomToken,
    /// `true` for the joiner, `false` for the creator.
    pub joining: bool,
}

/// Invalid connection query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRequestError {
    /// No `room` parameter.
    #[error("Room ID is required")]
    MissingRoom,

    /// `room` present but unusable.
    #[error("invalid room: {0}")]
    InvalidRoom(#[from] RoomTokenError),
}

impl JoinRequest {
    /// Query string for the connection URL: `room=<token>&join=<0|1>`.
    pub fn to_query(&self) -> String {
        format!("room={}&join={}", self.room, if self.joining { "1" } else { "0" })
    }

    /// Parse a connection query. `join` other than `1` means creator.
    pub fn from_query(query: &str) -> Result<Self, JoinRequestError> {
        let mut room = None;
        let mut joining = false;

        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "room" if !value.is_empty() => room = Some(value),
                "join" => joining = value == "1",
                _ => {}
            }
        }

        let room = room.ok_or(JoinRequestError::MissingRoom)?;
        Ok(Self {
            room: RoomToken::new(room)?,
            joining,
        })
    }
}
