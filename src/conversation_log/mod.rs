// src/conversation_log/mod.rs
// Durable per-conversation append-only record files, the authority for
// message content. The Store is a derived, searchable mirror of these files.

pub mod watcher;

use crate::error::{PrometheusError, Result};
use crate::store::Store;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// A single line in a `{conversation_id}.log` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub role: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Counters returned by `index_files`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCounters {
    pub total_files: usize,
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub total_messages: usize,
}

/// Append-only conversation log, one file per conversation under `dir`.
///
/// File handles are cached per conversation id behind a mutex so concurrent
/// `append_message` calls for the same conversation serialize cleanly while
/// calls for different conversations proceed independently.
#[derive(Clone)]
pub struct ConversationLog {
    dir: PathBuf,
    handles: Arc<Mutex<HashMap<String, Arc<Mutex<File>>>>>,
}

impl ConversationLog {
    pub async fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            handles: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, conv_id: &str) -> PathBuf {
        self.dir.join(format!("{conv_id}.log"))
    }

    async fn handle_for(&self, conv_id: &str) -> Result<Arc<Mutex<File>>> {
        let mut handles = self.handles.lock().await;
        if let Some(h) = handles.get(conv_id) {
            return Ok(h.clone());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(conv_id))
            .await?;
        let handle = Arc::new(Mutex::new(file));
        handles.insert(conv_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Appends one record as a single JSON line. Each append is one
    /// `write_all` call against an append-mode handle, so concurrent writers
    /// to different files never interleave within a line.
    pub async fn append_message(&self, conv_id: &str, record: &LogRecord) -> Result<()> {
        let handle = self.handle_for(conv_id).await?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = handle.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("log") {
                out.push(path);
            }
        }
        Ok(out)
    }

    /// Removes the on-disk file and drops any cached handle for `conv_id`.
    pub async fn delete_file(&self, conv_id: &str) -> Result<()> {
        self.handles.lock().await.remove(conv_id);
        let path = self.path_for(conv_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PrometheusError::Io(e)),
        }
    }

    pub async fn close(self) -> Result<()> {
        self.handles.lock().await.clear();
        Ok(())
    }

    /// Reconciles the Store against every `.log` file whose mtime or size
    /// changed since the last indexing pass (tracked in `conversation_files`).
    /// Unchanged files are skipped. Parses every line of a changed file and
    /// upserts its records into `conversations`/`messages` within a single
    /// transaction per file.
    pub async fn index_files(&self, store: &Store) -> Result<IndexCounters> {
        let files = self.list_files().await?;
        let mut counters = IndexCounters {
            total_files: files.len(),
            ..Default::default()
        };

        for path in files {
            let conv_id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            let meta = fs::metadata(&path).await?;
            let mtime_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            let size_bytes = meta.len() as i64;

            let known = {
                let conv_id = conv_id.clone();
                store
                    .pool()
                    .run(move |conn| {
                        conn.query_row(
                            "SELECT mtime_ms, size_bytes FROM conversation_files WHERE conversation_id = ?1",
                            rusqlite::params![conv_id],
                            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                        )
                        .optional()
                    })
                    .await?
            };

            if known == Some((mtime_ms, size_bytes)) {
                counters.skipped_files += 1;
                continue;
            }

            let raw = fs::read_to_string(&path).await?;
            let records: Vec<LogRecord> = raw
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect();
            let message_count = records.len();

            let conv_id_tx = conv_id.clone();
            let path_str = path.display().to_string();
            store
                .transaction(move |conn| {
                    let first_ts = records.first().map(|r| r.timestamp).unwrap_or(0);
                    let last_ts = records.last().map(|r| r.timestamp).unwrap_or(first_ts);
                    conn.execute(
                        "INSERT INTO conversations (id, title, created_at, updated_at)
                         VALUES (?1, NULL, ?2, ?3)
                         ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                        rusqlite::params![conv_id_tx, first_ts, last_ts],
                    )?;
                    conn.execute(
                        "DELETE FROM messages WHERE conversation_id = ?1",
                        rusqlite::params![conv_id_tx],
                    )?;
                    conn.execute(
                        "DELETE FROM messages_fts WHERE conversation_id = ?1",
                        rusqlite::params![conv_id_tx],
                    )?;
                    for record in &records {
                        let id = uuid::Uuid::new_v4().to_string();
                        let metadata = record.metadata.as_ref().map(|m| m.to_string());
                        conn.execute(
                            "INSERT INTO messages (id, conversation_id, role, content, timestamp, metadata)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            rusqlite::params![id, conv_id_tx, record.role, record.content, record.timestamp, metadata],
                        )?;
                        conn.execute(
                            "INSERT INTO messages_fts (id, conversation_id, content) VALUES (?1, ?2, ?3)",
                            rusqlite::params![id, conv_id_tx, record.content],
                        )?;
                    }
                    conn.execute(
                        "INSERT INTO conversation_files (conversation_id, path, mtime_ms, size_bytes, indexed_messages)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(conversation_id) DO UPDATE SET
                            path = excluded.path, mtime_ms = excluded.mtime_ms,
                            size_bytes = excluded.size_bytes, indexed_messages = excluded.indexed_messages",
                        rusqlite::params![conv_id_tx, path_str, mtime_ms, size_bytes, message_count as i64],
                    )?;
                    Ok(())
                })
                .await?;

            counters.indexed_files += 1;
            counters.total_messages += message_count;
        }

        Ok(counters)
    }
}
