//! Chat service enforcing chat lifecycle rules.
//!
//! ChatService sits between the REST handlers and the ChatRepository:
//! it opens chats for patrons, lets librarians claim them, closes them,
//! and serves history (marking the reader's incoming messages as read).
//! The real-time hub never calls it; the hub only appends messages.

use std::sync::Arc;

use stacks_types::chat::{Chat, ChatId, ChatStatus, Message};
use stacks_types::error::{ChatError, RepositoryError};
use stacks_types::identity::{Identity, Role};
use tracing::{debug, info};

use crate::chat::repository::ChatRepository;

/// Maximum length of a chat title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Orchestrates chat lifecycle transitions and history access.
///
/// Generic over `ChatRepository` to maintain clean architecture
/// (stacks-core never depends on stacks-infra).
pub struct ChatService<C: ChatRepository> {
    chat_repo: Arc<C>,
}

impl<C: ChatRepository> ChatService<C> {
    /// Create a new chat service over a shared repository.
    pub fn new(chat_repo: Arc<C>) -> Self {
        Self { chat_repo }
    }

    /// Access the chat repository.
    pub fn chat_repo(&self) -> &Arc<C> {
        &self.chat_repo
    }

    /// Open a new chat owned by `owner`. Only patrons open chats.
    pub async fn open_chat(&self, owner: &Identity, title: &str) -> Result<Chat, ChatError> {
        if owner.role != Role::User {
            return Err(ChatError::Forbidden(
                "only patrons can open chats".to_string(),
            ));
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("title must not be empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ChatError::Validation(format!(
                "title exceeds {MAX_TITLE_CHARS} characters"
            )));
        }

        let chat = self.chat_repo.create_chat(owner.user_id, title).await?;
        info!(chat_id = chat.id, owner_id = owner.user_id, "Chat opened");
        Ok(chat)
    }

    /// Get a chat the caller participates in.
    ///
    /// Librarians may also look at waiting chats they could claim.
    pub async fn get_chat(&self, chat_id: ChatId, caller: &Identity) -> Result<Chat, ChatError> {
        let chat = self.load(chat_id).await?;
        let claimable = caller.is_staff() && chat.status == ChatStatus::Waiting;
        if !chat.is_participant(caller.user_id) && !claimable {
            return Err(ChatError::Forbidden(format!(
                "user {} is not a participant of chat {chat_id}",
                caller.user_id
            )));
        }
        Ok(chat)
    }

    /// List the chats visible to `identity`.
    ///
    /// Patrons see the chats they own. Librarians see the chats assigned to
    /// them plus every waiting chat.
    pub async fn chats_for(&self, identity: &Identity) -> Result<Vec<Chat>, ChatError> {
        let chats = match identity.role {
            Role::User => self.chat_repo.list_chats_for_owner(identity.user_id).await?,
            Role::Librarian => self.chat_repo.list_chats_for_staff(identity.user_id).await?,
        };
        Ok(chats)
    }

    /// Assign a librarian to a waiting chat, moving it to `active`.
    pub async fn assign_staff(&self, chat_id: ChatId, staff: &Identity) -> Result<Chat, ChatError> {
        if !staff.is_staff() {
            return Err(ChatError::Forbidden(
                "only librarians can claim chats".to_string(),
            ));
        }

        let mut chat = self.load(chat_id).await?;
        let from = chat.status;
        ensure_transition(from, ChatStatus::Active)?;

        chat.status = ChatStatus::Active;
        chat.staff_id = Some(staff.user_id);
        self.write_back(&chat, from).await?;

        info!(chat_id, staff_id = staff.user_id, "Chat assigned");
        Ok(chat)
    }

    /// Close an active chat. Either participant may close it.
    pub async fn close_chat(&self, chat_id: ChatId, by: &Identity) -> Result<Chat, ChatError> {
        let mut chat = self.load(chat_id).await?;
        if !chat.is_participant(by.user_id) {
            return Err(ChatError::Forbidden(format!(
                "user {} is not a participant of chat {chat_id}",
                by.user_id
            )));
        }
        let from = chat.status;
        ensure_transition(from, ChatStatus::Closed)?;

        chat.status = ChatStatus::Closed;
        self.write_back(&chat, from).await?;

        info!(chat_id, closed_by = by.user_id, "Chat closed");
        Ok(chat)
    }

    /// Fetch a page of history and mark the reader's incoming messages as read.
    ///
    /// The marking happens before the fetch so the returned page already
    /// carries the new `read_at` values.
    pub async fn history(
        &self,
        chat_id: ChatId,
        reader: &Identity,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Message>, ChatError> {
        let chat = self.load(chat_id).await?;
        if !chat.is_participant(reader.user_id) {
            return Err(ChatError::Forbidden(format!(
                "user {} is not a participant of chat {chat_id}",
                reader.user_id
            )));
        }

        let marked = self.chat_repo.mark_read(chat_id, reader.user_id).await?;
        if marked > 0 {
            debug!(chat_id, reader_id = reader.user_id, marked, "Messages marked as read");
        }

        Ok(self.chat_repo.list_messages(chat_id, limit, offset).await?)
    }

    async fn load(&self, chat_id: ChatId) -> Result<Chat, ChatError> {
        self.chat_repo
            .get_chat(chat_id)
            .await?
            .ok_or(ChatError::NotFound)
    }

    /// Persist a transition, turning a lost race into `InvalidTransition`.
    async fn write_back(&self, chat: &Chat, from: ChatStatus) -> Result<(), ChatError> {
        match self.chat_repo.update_chat(chat, from).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict(_)) => Err(ChatError::InvalidTransition {
                from,
                to: chat.status,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn ensure_transition(from: ChatStatus, to: ChatStatus) -> Result<(), ChatError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chat, MockChatRepository};
    use stacks_types::chat::NewMessage;

    fn patron() -> Identity {
        Identity::new(1, Role::User, "Bob")
    }

    fn librarian() -> Identity {
        Identity::new(2, Role::Librarian, "Ada")
    }

    fn service(repo: MockChatRepository) -> (ChatService<MockChatRepository>, Arc<MockChatRepository>) {
        let repo = Arc::new(repo);
        (ChatService::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn open_chat_starts_waiting() {
        let (service, _) = service(MockChatRepository::new());
        let chat = service.open_chat(&patron(), "  Renewals  ").await.unwrap();
        assert_eq!(chat.status, ChatStatus::Waiting);
        assert_eq!(chat.owner_id, 1);
        assert_eq!(chat.title, "Renewals");
        assert!(chat.staff_id.is_none());
    }

    #[tokio::test]
    async fn open_chat_rejects_librarian_and_empty_title() {
        let (service, _) = service(MockChatRepository::new());
        assert!(matches!(
            service.open_chat(&librarian(), "hi").await,
            Err(ChatError::Forbidden(_))
        ));
        assert!(matches!(
            service.open_chat(&patron(), "   ").await,
            Err(ChatError::Validation(_))
        ));
        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(matches!(
            service.open_chat(&patron(), &long).await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn assign_moves_waiting_to_active() {
        let (service, repo) =
            service(MockChatRepository::new().with_chat(chat(5, 1, None, ChatStatus::Waiting)));

        let assigned = service.assign_staff(5, &librarian()).await.unwrap();
        assert_eq!(assigned.status, ChatStatus::Active);
        assert_eq!(assigned.staff_id, Some(2));

        let stored = repo.stored_chat(5).unwrap();
        assert_eq!(stored.status, ChatStatus::Active);
        assert_eq!(stored.staff_id, Some(2));
    }

    #[tokio::test]
    async fn assign_requires_librarian_and_waiting_chat() {
        let (service, _) = service(
            MockChatRepository::new()
                .with_chat(chat(5, 1, None, ChatStatus::Waiting))
                .with_chat(chat(6, 1, Some(3), ChatStatus::Active)),
        );

        assert!(matches!(
            service.assign_staff(5, &patron()).await,
            Err(ChatError::Forbidden(_))
        ));
        assert!(matches!(
            service.assign_staff(6, &librarian()).await,
            Err(ChatError::InvalidTransition {
                from: ChatStatus::Active,
                to: ChatStatus::Active
            })
        ));
        assert!(matches!(
            service.assign_staff(99, &librarian()).await,
            Err(ChatError::NotFound)
        ));
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let (service, _) =
            service(MockChatRepository::new().with_chat(chat(5, 1, Some(2), ChatStatus::Active)));

        let closed = service.close_chat(5, &patron()).await.unwrap();
        assert_eq!(closed.status, ChatStatus::Closed);

        assert!(matches!(
            service.close_chat(5, &librarian()).await,
            Err(ChatError::InvalidTransition {
                from: ChatStatus::Closed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn close_rejects_waiting_chat_and_outsiders() {
        let (service, _) = service(
            MockChatRepository::new()
                .with_chat(chat(5, 1, None, ChatStatus::Waiting))
                .with_chat(chat(6, 1, Some(2), ChatStatus::Active)),
        );
        assert!(matches!(
            service.close_chat(5, &patron()).await,
            Err(ChatError::InvalidTransition { .. })
        ));
        let outsider = Identity::new(9, Role::User, "Eve");
        assert!(matches!(
            service.close_chat(6, &outsider).await,
            Err(ChatError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn history_marks_incoming_messages_read() {
        let (service, repo) =
            service(MockChatRepository::new().with_chat(chat(5, 1, Some(2), ChatStatus::Active)));
        repo.save_message(&NewMessage::from_identity(5, &patron(), "hello".to_string()))
            .await
            .unwrap();
        repo.save_message(&NewMessage::from_identity(5, &librarian(), "hi there".to_string()))
            .await
            .unwrap();

        let history = service.history(5, &patron(), None, None).await.unwrap();
        assert_eq!(history.len(), 2);
        // The patron's own message stays unread; the librarian's reply is read.
        assert!(history[0].read_at.is_none());
        assert!(history[1].read_at.is_some());
    }

    #[tokio::test]
    async fn history_rejects_outsiders() {
        let (service, _) =
            service(MockChatRepository::new().with_chat(chat(5, 1, Some(2), ChatStatus::Active)));
        let outsider = Identity::new(9, Role::Librarian, "Eve");
        assert!(matches!(
            service.history(5, &outsider, None, None).await,
            Err(ChatError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn librarian_can_view_waiting_chat() {
        let (service, _) = service(
            MockChatRepository::new()
                .with_chat(chat(5, 1, None, ChatStatus::Waiting))
                .with_chat(chat(6, 1, Some(3), ChatStatus::Active)),
        );
        assert!(service.get_chat(5, &librarian()).await.is_ok());
        assert!(matches!(
            service.get_chat(6, &librarian()).await,
            Err(ChatError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn chats_for_depends_on_role() {
        let (service, _) = service(
            MockChatRepository::new()
                .with_chat(chat(5, 1, None, ChatStatus::Waiting))
                .with_chat(chat(6, 7, Some(2), ChatStatus::Active))
                .with_chat(chat(7, 7, Some(3), ChatStatus::Active)),
        );

        let mine = service.chats_for(&patron()).await.unwrap();
        assert_eq!(mine.len(), 1);

        let mut staff_view: Vec<ChatId> = service
            .chats_for(&librarian())
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        staff_view.sort();
        assert_eq!(staff_view, vec![5, 6]);
    }
}
