//! ChatRepository trait definition.
//!
//! Durable store for chats and messages; the source of truth for chat status
//! and participants. Uses native async fn in traits (RPITIT, Rust 2024 edition).

use stacks_types::chat::{Chat, ChatId, ChatStatus, Message, NewMessage};
use stacks_types::error::RepositoryError;
use stacks_types::identity::UserId;

/// Repository trait for chat and message persistence.
///
/// Implementations live in stacks-infra (e.g., `SqliteChatRepository`).
pub trait ChatRepository: Send + Sync {
    /// Create a new chat in `waiting` status, owned by `owner_id`.
    fn create_chat(
        &self,
        owner_id: UserId,
        title: &str,
    ) -> impl std::future::Future<Output = Result<Chat, RepositoryError>> + Send;

    /// Get a chat by its ID.
    fn get_chat(
        &self,
        chat_id: ChatId,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// Write back status, staff assignment, and title of `chat`.
    ///
    /// The update only applies while the stored status still equals
    /// `expected`; otherwise returns `RepositoryError::Conflict`. Returns
    /// `RepositoryError::NotFound` when the chat does not exist.
    fn update_chat(
        &self,
        chat: &Chat,
        expected: ChatStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Chats owned by `owner_id`, most recently active first.
    fn list_chats_for_owner(
        &self,
        owner_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Chat>, RepositoryError>> + Send;

    /// Chats assigned to `staff_id` plus every waiting chat, most recently active first.
    fn list_chats_for_staff(
        &self,
        staff_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Chat>, RepositoryError>> + Send;

    /// Append a message and advance the chat's last-activity timestamp.
    ///
    /// Returns the stored message with its assigned ID. Fails with
    /// `RepositoryError::NotFound` for an unknown chat and
    /// `RepositoryError::Conflict` when the chat is closed.
    fn save_message(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// Messages of a chat in creation order.
    fn list_messages(
        &self,
        chat_id: ChatId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Set `read_at` on every unread message in the chat not sent by `reader_id`.
    ///
    /// Returns the number of messages marked.
    fn mark_read(
        &self,
        chat_id: ChatId,
        reader_id: UserId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
