//! Network Layer
//!
//! Room relay, per-session WebSocket channel and the session state machine.
//! Board rules live in `game/`; this layer only moves messages and decides
//! when a move may be applied.

pub mod channel;
pub mod driver;
pub mod protocol;
pub mod server;
pub mod session;

pub use channel::{ChannelError, ChannelEvent, ChannelHandle, ConnectionState, MessageSink, SessionChannel};
pub use driver::{join_room, run_session, DriverExit, SessionObserver};
pub use protocol::{JoinRequest, JoinRequestError, PeerMessage, ProtocolViolation, RoomToken, RoomTokenError};
pub use server::{Rejection, RelayError, RelayServer, RoomRegistry};
pub use session::{project_status, GameSession, LocalInput, SessionEvent, SessionPhase, SessionView, Status};
