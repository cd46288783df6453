//! In-memory test doubles shared by the hub and chat service tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use stacks_types::chat::{Chat, ChatId, ChatStatus, Message, NewMessage};
use stacks_types::error::RepositoryError;
use stacks_types::identity::UserId;

use crate::chat::repository::ChatRepository;

/// Build a chat fixture.
pub(crate) fn chat(id: ChatId, owner_id: UserId, staff_id: Option<UserId>, status: ChatStatus) -> Chat {
    Chat {
        id,
        owner_id,
        staff_id,
        status,
        title: format!("chat {id}"),
        last_activity_at: Utc::now(),
        created_at: Utc::now(),
    }
}

#[derive(Default)]
struct MockState {
    chats: HashMap<ChatId, Chat>,
    messages: Vec<Message>,
    next_chat_id: ChatId,
    save_calls: usize,
    fail_saves: bool,
}

/// A `ChatRepository` backed by a mutex-guarded map.
#[derive(Default)]
pub(crate) struct MockChatRepository {
    state: Mutex<MockState>,
}

impl MockChatRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_chat(self, chat: Chat) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_chat_id = state.next_chat_id.max(chat.id);
            state.chats.insert(chat.id, chat);
        }
        self
    }

    pub(crate) fn set_fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }

    /// Number of `save_message` calls, including failed ones.
    pub(crate) fn save_calls(&self) -> usize {
        self.state.lock().unwrap().save_calls
    }

    pub(crate) fn stored_messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub(crate) fn stored_chat(&self, chat_id: ChatId) -> Option<Chat> {
        self.state.lock().unwrap().chats.get(&chat_id).cloned()
    }
}

impl ChatRepository for MockChatRepository {
    async fn create_chat(&self, owner_id: UserId, title: &str) -> Result<Chat, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.next_chat_id += 1;
        let mut created = chat(state.next_chat_id, owner_id, None, ChatStatus::Waiting);
        created.title = title.to_string();
        state.chats.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        Ok(self.state.lock().unwrap().chats.get(&chat_id).cloned())
    }

    async fn update_chat(&self, chat: &Chat, expected: ChatStatus) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let stored = state.chats.get_mut(&chat.id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict(format!(
                "chat {} is {}",
                chat.id, stored.status
            )));
        }
        stored.status = chat.status;
        stored.staff_id = chat.staff_id;
        stored.title = chat.title.clone();
        Ok(())
    }

    async fn list_chats_for_owner(&self, owner_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .chats
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_chats_for_staff(&self, staff_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .chats
            .values()
            .filter(|c| c.staff_id == Some(staff_id) || c.status == ChatStatus::Waiting)
            .cloned()
            .collect())
    }

    async fn save_message(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.save_calls += 1;
        if state.fail_saves {
            return Err(RepositoryError::Connection);
        }
        let chat = state
            .chats
            .get_mut(&message.chat_id)
            .ok_or(RepositoryError::NotFound)?;
        if chat.status == ChatStatus::Closed {
            return Err(RepositoryError::Conflict("chat is closed".to_string()));
        }
        chat.last_activity_at = message.created_at;
        let id = state.messages.len() as u64 + 1;
        let stored = Message::from_new(id, message.clone());
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        chat_id: ChatId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .skip(offset.unwrap_or(0).max(0) as usize)
            .take(limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn mark_read(&self, chat_id: ChatId, reader_id: UserId) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut marked = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.chat_id == chat_id && m.sender_id != reader_id && m.read_at.is_none())
        {
            message.read_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }
}
