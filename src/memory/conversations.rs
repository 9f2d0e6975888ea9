// src/memory/conversations.rs
// Conversation and Message CRUD: create, append, read history, list, delete.

use super::MemoryEngine;
use crate::conversation_log::LogRecord;
use crate::error::{PrometheusError, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl MemoryEngine {
    pub async fn create_conversation(&self, title: Option<String>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let id_for_tx = id.clone();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                    params![id_for_tx, title, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(id)
    }

    /// Appends a message to the Conversation Log first, then mirrors it into
    /// the Store within one transaction, and bumps `conversations.updated_at`.
    /// If `conv_id` does not yet exist, the conversation is created implicitly
    /// (§3: "created explicitly or on first message").
    pub async fn store_message(
        &self,
        conv_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let ts = now_ms();

        let record = LogRecord {
            role: role.as_str().to_string(),
            content: content.to_string(),
            timestamp: ts,
            metadata: metadata.clone(),
        };
        self.log.append_message(conv_id, &record).await?;

        let conv_id_owned = conv_id.to_string();
        let role_str = role.as_str().to_string();
        let content_owned = content.to_string();
        let metadata_json = metadata.map(|m| m.to_string());
        let msg_id = message_id.clone();

        self.store
            .transaction(move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, title, created_at, updated_at)
                     VALUES (?1, NULL, ?2, ?2)
                     ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                    params![conv_id_owned, ts],
                )?;
                conn.execute(
                    "INSERT INTO messages (id, conversation_id, role, content, timestamp, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![msg_id, conv_id_owned, role_str, content_owned, ts, metadata_json],
                )?;
                conn.execute(
                    "INSERT INTO messages_fts (id, conversation_id, content) VALUES (?1, ?2, ?3)",
                    params![msg_id, conv_id_owned, content_owned],
                )?;
                Ok(())
            })
            .await?;

        Ok(message_id)
    }

    /// Returns messages for `conv_id` in enqueue (timestamp ascending) order.
    pub async fn get_conversation_history(
        &self,
        conv_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let conv_id = conv_id.to_string();
        self.store
            .pool()
            .run(move |conn| {
                let sql = match limit {
                    Some(_) => {
                        "SELECT id, conversation_id, role, content, timestamp, metadata
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY timestamp ASC LIMIT ?2"
                    }
                    None => {
                        "SELECT id, conversation_id, role, content, timestamp, metadata
                         FROM messages WHERE conversation_id = ?1
                         ORDER BY timestamp ASC"
                    }
                };
                let mut stmt = conn.prepare(sql)?;
                let map_row = |row: &rusqlite::Row| -> rusqlite::Result<Message> {
                    let role_str: String = row.get(2)?;
                    let metadata_str: Option<String> = row.get(5)?;
                    Ok(Message {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        role: MessageRole::parse(&role_str).unwrap_or(MessageRole::User),
                        content: row.get(3)?,
                        timestamp: row.get(4)?,
                        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
                    })
                };
                let rows = match limit {
                    Some(n) => stmt.query_map(params![conv_id, n as i64], map_row)?,
                    None => stmt.query_map(params![conv_id], map_row)?,
                };
                rows.collect()
            })
            .await
    }

    pub async fn get_all_conversations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationSummary>> {
        self.store
            .pool()
            .run(move |conn| {
                let sql = match limit {
                    Some(_) => {
                        "SELECT id, title, created_at, updated_at FROM conversations
                         ORDER BY updated_at DESC LIMIT ?1"
                    }
                    None => {
                        "SELECT id, title, created_at, updated_at FROM conversations
                         ORDER BY updated_at DESC"
                    }
                };
                let mut stmt = conn.prepare(sql)?;
                let map_row = |row: &rusqlite::Row| -> rusqlite::Result<ConversationSummary> {
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                };
                let rows = match limit {
                    Some(n) => stmt.query_map(params![n as i64], map_row)?,
                    None => stmt.query_map([], map_row)?,
                };
                rows.collect()
            })
            .await
    }

    /// Removes messages, the conversation row, and the on-disk log file
    /// atomically with respect to the Store; the log file is removed after
    /// the Store transaction commits (§3: deletion is atomic for the Store
    /// side; a crash between the two leaves an orphaned log file that the
    /// next `index_files` pass will not re-link since the conversation row
    /// is gone).
    pub async fn delete_conversation(&self, conv_id: &str) -> Result<()> {
        let id = conv_id.to_string();
        let existed: bool = self
            .store
            .pool()
            .run({
                let id = id.clone();
                move |conn| {
                    conn.query_row(
                        "SELECT 1 FROM conversations WHERE id = ?1",
                        params![id],
                        |_| Ok(true),
                    )
                    .optional()
                    .map(|v| v.unwrap_or(false))
                }
            })
            .await?;

        if !existed {
            return Err(PrometheusError::NotFound(format!("conversation {conv_id}")));
        }

        let id_for_tx = id.clone();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    "DELETE FROM messages_fts WHERE conversation_id = ?1",
                    params![id_for_tx],
                )?;
                conn.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id_for_tx])?;
                conn.execute("DELETE FROM conversations WHERE id = ?1", params![id_for_tx])?;
                Ok(())
            })
            .await?;

        self.log.delete_file(&id).await?;
        Ok(())
    }
}
