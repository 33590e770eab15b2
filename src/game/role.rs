//! Roles and Marks
//!
//! A role is fixed for the lifetime of a session. Marks are never chosen
//! independently: every placement site goes through [`role_mark`].

use std::fmt;
use serde::{Serialize, Deserialize};

/// Seat assignment for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Room creator. Moves first.
    First,
    /// Room joiner. Moves second.
    Second,
}

impl Role {
    /// Role assigned from the connection's joining flag.
    pub fn from_joining(joining: bool) -> Self {
        if joining {
            Role::Second
        } else {
            Role::First
        }
    }

    /// The other seat.
    #[inline]
    pub fn opponent(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }

    /// Whether this role connects with the joining flag set.
    #[inline]
    pub fn is_joiner(self) -> bool {
        self == Role::Second
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::First => f.write_str("first"),
            Role::Second => f.write_str("second"),
        }
    }
}

/// Symbol placed on a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// Placed by [`Role::First`].
    X,
    /// Placed by [`Role::Second`].
    O,
}

impl Mark {
    /// Role that places this mark.
    #[inline]
    pub fn owner(self) -> Role {
        match self {
            Mark::X => Role::First,
            Mark::O => Role::Second,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => f.write_str("X"),
            Mark::O => f.write_str("O"),
        }
    }
}

/// Mark placed by a role.
#[inline]
pub fn role_mark(role: Role) -> Mark {
    match role {
        Role::First => Mark::X,
        Role::Second => Mark::O,
    }
}
