//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `stacks-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the reader
//! pool and every mutation on the single writer connection.

use chrono::Utc;
use sqlx::Row;
use stacks_core::chat::repository::ChatRepository;
use stacks_types::chat::{Chat, ChatId, ChatStatus, Message, NewMessage};
use stacks_types::error::RepositoryError;
use stacks_types::identity::{Role, UserId};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    id: i64,
    owner_id: i64,
    staff_id: Option<i64>,
    status: String,
    title: String,
    last_activity_at: String,
    created_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            staff_id: row.try_get("staff_id")?,
            status: row.try_get("status")?,
            title: row.try_get("title")?,
            last_activity_at: row.try_get("last_activity_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, RepositoryError> {
        let status: ChatStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(Chat {
            id: self.id as ChatId,
            owner_id: self.owner_id as UserId,
            staff_id: self.staff_id.map(|v| v as UserId),
            status,
            title: self.title,
            last_activity_at: parse_datetime(&self.last_activity_at)?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct MessageRow {
    id: i64,
    chat_id: i64,
    sender_id: i64,
    sender_role: String,
    sender_name: String,
    content: String,
    read_at: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_role: row.try_get("sender_role")?,
            sender_name: row.try_get("sender_name")?,
            content: row.try_get("content")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let sender_role: Role = self
            .sender_role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let read_at = self.read_at.as_deref().map(parse_datetime).transpose()?;

        Ok(Message {
            id: self.id as u64,
            chat_id: self.chat_id as ChatId,
            sender_id: self.sender_id as UserId,
            sender_role,
            sender_name: self.sender_name,
            content: self.content,
            read_at,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn rows_to_chats(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Chat>, RepositoryError> {
    let mut chats = Vec::with_capacity(rows.len());
    for row in rows {
        let chat_row = ChatRow::from_row(row).map_err(query_error)?;
        chats.push(chat_row.into_chat()?);
    }
    Ok(chats)
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_chat(&self, owner_id: UserId, title: &str) -> Result<Chat, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(
            r#"INSERT INTO chats (owner_id, staff_id, status, title, last_activity_at, created_at)
               VALUES (?, NULL, ?, ?, ?, ?)"#,
        )
        .bind(owner_id as i64)
        .bind(ChatStatus::Waiting.to_string())
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        let created_at = parse_datetime(&now)?;
        Ok(Chat {
            id: result.last_insert_rowid() as ChatId,
            owner_id,
            staff_id: None,
            status: ChatStatus::Waiting,
            title: title.to_string(),
            last_activity_at: created_at,
            created_at,
        })
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id as i64)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let chat_row = ChatRow::from_row(&row).map_err(query_error)?;
                Ok(Some(chat_row.into_chat()?))
            }
            None => Ok(None),
        }
    }

    async fn update_chat(&self, chat: &Chat, expected: ChatStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chats
               SET status = ?, staff_id = ?, title = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(chat.status.to_string())
        .bind(chat.staff_id.map(|v| v as i64))
        .bind(&chat.title)
        .bind(chat.id as i64)
        .bind(expected.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM chats WHERE id = ?")
                .bind(chat.id as i64)
                .fetch_optional(&self.pool.writer)
                .await
                .map_err(query_error)?;
            return match current {
                None => Err(RepositoryError::NotFound),
                Some(status) => Err(RepositoryError::Conflict(format!(
                    "chat {} is '{status}', expected '{expected}'",
                    chat.id
                ))),
            };
        }

        Ok(())
    }

    async fn list_chats_for_owner(&self, owner_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chats WHERE owner_id = ? ORDER BY last_activity_at DESC, id DESC",
        )
        .bind(owner_id as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_chats(&rows)
    }

    async fn list_chats_for_staff(&self, staff_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM chats
               WHERE staff_id = ? OR status = 'waiting'
               ORDER BY last_activity_at DESC, id DESC"#,
        )
        .bind(staff_id as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_chats(&rows)
    }

    async fn save_message(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM chats WHERE id = ?")
            .bind(message.chat_id as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;
        match status.as_deref() {
            None => return Err(RepositoryError::NotFound),
            Some("closed") => {
                return Err(RepositoryError::Conflict(format!(
                    "chat {} is closed",
                    message.chat_id
                )));
            }
            Some(_) => {}
        }

        let created_at = format_datetime(&message.created_at);
        let result = sqlx::query(
            r#"INSERT INTO messages (chat_id, sender_id, sender_role, sender_name, content, read_at, created_at)
               VALUES (?, ?, ?, ?, ?, NULL, ?)"#,
        )
        .bind(message.chat_id as i64)
        .bind(message.sender_id as i64)
        .bind(message.sender_role.to_string())
        .bind(&message.sender_name)
        .bind(&message.content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;
        let id = result.last_insert_rowid();

        sqlx::query("UPDATE chats SET last_activity_at = ? WHERE id = ?")
            .bind(&created_at)
            .bind(message.chat_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;

        // Hand back exactly what a later history read will return.
        let mut stored = Message::from_new(id as u64, message.clone());
        stored.created_at = parse_datetime(&created_at)?;
        Ok(stored)
    }

    async fn list_messages(
        &self,
        chat_id: ChatId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM messages WHERE chat_id = ? ORDER BY id ASC");

        // SQLite requires LIMIT before OFFSET; -1 means no limit.
        if limit.is_some() || offset.is_some() {
            sql.push_str(&format!(" LIMIT {}", limit.unwrap_or(-1)));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let rows = sqlx::query(&sql)
            .bind(chat_id as i64)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row = MessageRow::from_row(row).map_err(query_error)?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn mark_read(&self, chat_id: ChatId, reader_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE messages SET read_at = ?
               WHERE chat_id = ? AND sender_id != ? AND read_at IS NULL"#,
        )
        .bind(format_datetime(&Utc::now()))
        .bind(chat_id as i64)
        .bind(reader_id as i64)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected())
    }
}
