//! Chat, message, and wire frame types for Stacks.
//!
//! These types model conversations between a patron and, once claimed,
//! one librarian: the durable chat thread, its messages, and the JSON
//! frames exchanged with WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::identity::{Identity, Role, UserId};

pub type ChatId = u64;
pub type MessageId = u64;

/// Lifecycle status of a chat.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('waiting', 'active', 'closed'))`
///
/// Transitions are `waiting -> active` (on assignment) and
/// `active -> closed`. `closed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    #[default]
    Waiting,
    Active,
    Closed,
}

impl ChatStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ChatStatus) -> bool {
        matches!(
            (self, next),
            (ChatStatus::Waiting, ChatStatus::Active) | (ChatStatus::Active, ChatStatus::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ChatStatus::Closed
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStatus::Waiting => write!(f, "waiting"),
            ChatStatus::Active => write!(f, "active"),
            ChatStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(ChatStatus::Waiting),
            "active" => Ok(ChatStatus::Active),
            "closed" => Ok(ChatStatus::Closed),
            other => Err(format!("invalid chat status: '{other}'")),
        }
    }
}

/// A persistent conversation between an owner and, once claimed, one staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub owner_id: UserId,
    /// Unassigned until a librarian claims the chat.
    pub staff_id: Option<UserId>,
    pub status: ChatStatus,
    pub title: String,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Identities that receive messages posted into this chat.
    ///
    /// Always the owner, plus the assigned staff member when present.
    /// Never contains duplicates.
    pub fn participants(&self) -> Vec<UserId> {
        let mut ids = vec![self.owner_id];
        if let Some(staff_id) = self.staff_id {
            if staff_id != self.owner_id {
                ids.push(staff_id);
            }
        }
        ids
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.owner_id == user_id || self.staff_id == Some(user_id)
    }
}

/// A message that has not been persisted yet.
///
/// Built by the session from its resolved identity; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Build a message authored by `sender` with a server-assigned timestamp.
    pub fn from_identity(chat_id: ChatId, sender: &Identity, content: String) -> Self {
        Self {
            chat_id,
            sender_id: sender.user_id,
            sender_role: sender.role,
            sender_name: sender.display_name.clone(),
            content,
            created_at: Utc::now(),
        }
    }
}

/// A persisted chat message.
///
/// Serializes to the server -> client wire frame:
/// ```json
/// { "id": 7, "chat_id": 1, "sender_id": 3, "sender_role": "user",
///   "sender_name": "Bob", "content": "hello", "read_at": null,
///   "created_at": "2026-01-01T10:00:00Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub sender_name: String,
    pub content: String,
    /// Set in bulk when another participant fetches history.
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_new(id: MessageId, new: NewMessage) -> Self {
        Self {
            id,
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            sender_role: new.sender_role,
            sender_name: new.sender_name,
            content: new.content,
            read_at: None,
            created_at: new.created_at,
        }
    }
}

/// Client -> server frame, one per logical action.
///
/// An empty `content` announces which chat the client is viewing and is
/// never persisted or routed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientFrame {
    pub chat_id: ChatId,
    #[serde(default)]
    pub content: String,
}

impl ClientFrame {
    pub fn is_selection(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chat(staff_id: Option<UserId>) -> Chat {
        Chat {
            id: 1,
            owner_id: 10,
            staff_id,
            status: ChatStatus::Active,
            title: "Interlibrary loan".to_string(),
            last_activity_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_chat_status_roundtrip() {
        for status in [ChatStatus::Waiting, ChatStatus::Active, ChatStatus::Closed] {
            let parsed: ChatStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_chat_status_transitions() {
        assert!(ChatStatus::Waiting.can_transition_to(ChatStatus::Active));
        assert!(ChatStatus::Active.can_transition_to(ChatStatus::Closed));
        assert!(!ChatStatus::Waiting.can_transition_to(ChatStatus::Closed));
        assert!(!ChatStatus::Closed.can_transition_to(ChatStatus::Active));
        assert!(!ChatStatus::Active.can_transition_to(ChatStatus::Waiting));
        assert!(ChatStatus::Closed.is_terminal());
    }

    #[test]
    fn test_chat_status_default() {
        assert_eq!(ChatStatus::default(), ChatStatus::Waiting);
    }

    #[test]
    fn test_participants_owner_only() {
        assert_eq!(sample_chat(None).participants(), vec![10]);
    }

    #[test]
    fn test_participants_owner_and_staff() {
        let chat = sample_chat(Some(20));
        assert_eq!(chat.participants(), vec![10, 20]);
        assert!(chat.is_participant(20));
        assert!(!chat.is_participant(30));
    }

    #[test]
    fn test_client_frame_selection() {
        let frame: ClientFrame = serde_json::from_str(r#"{"chat_id":1,"content":""}"#).unwrap();
        assert!(frame.is_selection());

        let frame: ClientFrame = serde_json::from_str(r#"{"chat_id":1}"#).unwrap();
        assert!(frame.is_selection());

        let frame: ClientFrame =
            serde_json::from_str(r#"{"chat_id":1,"content":"hello"}"#).unwrap();
        assert!(!frame.is_selection());
    }

    #[test]
    fn test_client_frame_rejects_negative_chat_id() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"chat_id":-1,"content":"x"}"#).is_err());
    }

    #[test]
    fn test_message_wire_shape() {
        let sender = Identity::new(3, Role::User, "Bob");
        let new = NewMessage::from_identity(1, &sender, "hello".to_string());
        let message = Message::from_new(7, new);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["chat_id"], 1);
        assert_eq!(value["sender_id"], 3);
        assert_eq!(value["sender_role"], "user");
        assert_eq!(value["sender_name"], "Bob");
        assert_eq!(value["content"], "hello");
        assert!(value["read_at"].is_null());
        assert!(value["created_at"].is_string());
    }
}
