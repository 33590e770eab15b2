//! Turn Authority
//!
//! Local view of whose move it is. Kept separate from the board so input
//! can be gated without a round trip to the peer.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::role::Role;

/// Whose move it is from the local client's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnState {
    /// Local input is accepted.
    MyTurn,
    /// Waiting for the peer's move.
    OpponentTurn,
}

impl TurnState {
    /// Starting turn for a role.
    pub fn initial(role: Role) -> Self {
        match role {
            Role::First => TurnState::MyTurn,
            Role::Second => TurnState::OpponentTurn,
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::MyTurn => f.write_str("Your turn"),
            TurnState::OpponentTurn => f.write_str("Opponent's turn"),
        }
    }
}

/// Turn transition attempted from the wrong state.
///
/// Always a logic error in the caller; user input is filtered before it
/// reaches the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnError {
    /// Local move accepted while waiting for the opponent.
    #[error("local move accepted during opponent's turn")]
    NotMyTurn,

    /// Remote move received while it was the local turn.
    #[error("remote move received during local turn")]
    NotOpponentTurn,
}

/// Tracks and flips the local turn.
#[derive(Debug, Clone)]
pub struct TurnAuthority {
    role: Role,
    state: TurnState,
}

impl TurnAuthority {
    /// Create an authority in the role's starting state.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: TurnState::initial(role),
        }
    }

    /// Current turn.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Check if local input may act.
    #[inline]
    pub fn is_my_turn(&self) -> bool {
        self.state == TurnState::MyTurn
    }

    /// MyTurn -> OpponentTurn.
    pub fn on_local_move_accepted(&mut self) -> Result<(), TurnError> {
        match self.state {
            TurnState::MyTurn => {
                self.state = TurnState::OpponentTurn;
                Ok(())
            }
            TurnState::OpponentTurn => Err(TurnError::NotMyTurn),
        }
    }

    /// OpponentTurn -> MyTurn.
    pub fn on_remote_move_received(&mut self) -> Result<(), TurnError> {
        match self.state {
            TurnState::OpponentTurn => {
                self.state = TurnState::MyTurn;
                Ok(())
            }
            TurnState::MyTurn => Err(TurnError::NotOpponentTurn),
        }
    }

    /// Back to the role's starting state.
    pub fn on_restart(&mut self) {
        self.state = TurnState::initial(self.role);
    }
}
