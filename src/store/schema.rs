// src/store/schema.rs
// Linear migration registry: named, ordered, applied-once-each, rollback-capable.
//
// Unlike the teacher's ad hoc `run_all_migrations` driver (a fixed sequence
// of idempotent function calls with no name or applied-row bookkeeping),
// this registry tracks each migration by name in a `migrations` table so
// `migrations_pending()` and `SchemaAhead` detection are possible.

use rusqlite::Connection;

/// A single migration: a unique name, an `up` step, and an optional `down`.
pub struct Migration {
    pub name: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
    pub down: Option<fn(&Connection) -> rusqlite::Result<()>>,
}

/// The base schema, created unconditionally by migration 0001. Everything
/// after this is additive.
const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_conv_ts ON messages(conversation_id, timestamp);

CREATE TABLE IF NOT EXISTS code_chunks (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    text TEXT NOT NULL,
    symbols TEXT,
    imports TEXT,
    content_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_code_chunks_file ON code_chunks(file_path);

CREATE TABLE IF NOT EXISTS code_chunks_vec (
    id TEXT PRIMARY KEY REFERENCES code_chunks(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dim INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    context TEXT NOT NULL,
    reasoning TEXT NOT NULL,
    alternatives TEXT NOT NULL,
    chosen_option TEXT NOT NULL,
    outcome TEXT,
    lessons_learned TEXT,
    affected_components TEXT
);
CREATE INDEX IF NOT EXISTS idx_decisions_ts ON decisions(timestamp);

CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    problem TEXT NOT NULL,
    solution TEXT NOT NULL,
    example_code TEXT,
    applicability TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS metrics (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    metric_type TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    context TEXT
);
CREATE INDEX IF NOT EXISTS idx_metrics_type_name_ts ON metrics(metric_type, metric_name, timestamp);

CREATE TABLE IF NOT EXISTS migrations (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_files (
    conversation_id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    mtime_ms INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    indexed_messages INTEGER NOT NULL DEFAULT 0
);
"#;

fn up_0001_base(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(BASE_SCHEMA)
}

const FTS_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS code_chunks_fts USING fts5(
    id UNINDEXED, content, symbols, content='', tokenize='porter unicode61'
);
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    id UNINDEXED, conversation_id UNINDEXED, content, content='', tokenize='porter unicode61'
);
"#;

fn up_0002_fts(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(FTS_SCHEMA)
}

fn down_0002_fts(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS code_chunks_fts; DROP TABLE IF EXISTS messages_fts;")
}

const DECISIONS_FTS_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS decisions_fts USING fts5(
    id UNINDEXED, context, reasoning, alternatives, chosen_option, content='', tokenize='porter unicode61'
);
"#;

fn up_0003_decisions_fts(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(DECISIONS_FTS_SCHEMA)
}

fn down_0003_decisions_fts(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS decisions_fts;")
}

/// Returns the full, ordered migration registry. New migrations are always
/// appended; existing entries' `up`/`down` bodies must stay idempotent since
/// `apply_pending` may re-run against a database created by a partial batch
/// that rolled back.
pub fn registry() -> Vec<Migration> {
    vec![
        Migration {
            name: "0001_base_schema",
            up: up_0001_base,
            down: None,
        },
        Migration {
            name: "0002_fts_indexes",
            up: up_0002_fts,
            down: Some(down_0002_fts),
        },
        Migration {
            name: "0003_decisions_fts",
            up: up_0003_decisions_fts,
            down: Some(down_0003_decisions_fts),
        },
    ]
}
