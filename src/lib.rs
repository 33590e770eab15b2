//! # Tic-Tac-Toe Session
//!
//! Two-player tic-tac-toe over a WebSocket room relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TIC-TAC-TOE SESSION                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Pure rules (no I/O)                       │
//! │  ├── role.rs     - Player roles and marks                    │
//! │  ├── board.rs    - Board, move validation, outcome           │
//! │  └── turn.rs     - Whose turn it is                          │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - Peer messages, room tokens, join query    │
//! │  ├── channel.rs  - Client WebSocket connection to the relay  │
//! │  ├── session.rs  - Session state machine and status          │
//! │  ├── driver.rs   - Event loop feeding the state machine      │
//! │  └── server.rs   - Room relay                                │
//! │                                                              │
//! │  config.rs       - Defaults and environment overrides        │
//! │  logging.rs      - tracing subscriber setup                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Model
//!
//! There is no authoritative server. Each peer validates the moves it
//! receives against its own board and turn, and discards anything that
//! does not fit. The relay forwards text frames without reading them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod game;
pub mod logging;
pub mod network;

// Re-export commonly used types
pub use config::{ClientConfig, RelayConfig};
pub use game::board::{Board, Cell, IllegalMove, Outcome};
pub use game::role::{role_mark, Mark, Role};
pub use game::turn::{TurnAuthority, TurnState};
pub use network::protocol::{PeerMessage, RoomToken};
pub use network::session::{GameSession, SessionPhase, SessionView, Status};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
