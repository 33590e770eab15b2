//! Game Logic Module
//!
//! Pure, synchronous game rules. Nothing here touches the network.
//!
//! ## Module Structure
//!
//! - `role`: Seats and the role-to-mark mapping
//! - `board`: Cells, move application, win/draw evaluation
//! - `turn`: Local turn authority

pub mod role;
pub mod board;
pub mod turn;

// Re-export key types
pub use role::{Role, Mark, role_mark};
pub use board::{Board, Cell, Outcome, IllegalMove, BOARD_CELLS, WINNING_LINES};
pub use turn::{TurnAuthority, TurnState, TurnError};
