//! Authenticated identity types.
//!
//! An [`Identity`] is resolved once per connection at handshake time and
//! threaded through the session as a typed value.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Numeric identifier of a user or staff member.
pub type UserId = u64;

/// Role of an authenticated identity.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'librarian'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A library patron. Owns the chats they open.
    User,
    /// A staff member. Claims waiting chats and answers them.
    Librarian,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Librarian => write!(f, "librarian"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "librarian" => Ok(Role::Librarian),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// The authenticated user or staff member behind a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            display_name: display_name.into(),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Librarian
    }
}
