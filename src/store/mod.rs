// src/store/mod.rs
// Embedded store: schema, migrations, and the single transactional boundary
// every Memory Engine write passes through.

pub mod pool;
pub mod schema;

use crate::error::{PrometheusError, Result};
use pool::DatabasePool;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Options controlling how a `Store` is opened.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Vector dimension pinned at database creation. Ignored on subsequent
    /// opens of an existing database (the stored value wins).
    pub embedding_dim: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { embedding_dim: 1536 }
    }
}

/// Handle to the embedded relational store. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Store {
    pool: DatabasePool,
    embedding_dim: usize,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Store {
    /// Opens the database at `path`, creating parent directories as needed,
    /// and applies any pending migrations under a single transaction.
    pub async fn open(path: &Path, opts: StoreOptions) -> Result<Self> {
        let pool = DatabasePool::open(path).map_err(PrometheusError::Anyhow)?;
        let store = Self {
            pool,
            embedding_dim: opts.embedding_dim,
        };
        store.check_schema_not_ahead().await?;
        store.apply_pending().await?;
        store.pin_embedding_dim(opts.embedding_dim).await?;
        Ok(store)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub async fn open_in_memory(name: &str, opts: StoreOptions) -> Result<Self> {
        let pool = DatabasePool::open_in_memory(name).map_err(PrometheusError::Anyhow)?;
        let store = Self {
            pool,
            embedding_dim: opts.embedding_dim,
        };
        store.check_schema_not_ahead().await?;
        store.apply_pending().await?;
        store.pin_embedding_dim(opts.embedding_dim).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    async fn pin_embedding_dim(&self, dim: usize) -> Result<()> {
        self.pool
            .run(move |conn| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT value FROM schema_meta WHERE key = 'embedding_dim'",
                        [],
                        |row| row.get(0),
                    )
                    .ok();
                match existing {
                    Some(v) => {
                        // Row exists: the stored dimension is authoritative for
                        // this database. Mismatches surface as a validation
                        // error to callers that build embeddings, not here.
                        let _ = v;
                        Ok(())
                    }
                    None => conn.execute(
                        "INSERT INTO schema_meta (key, value) VALUES ('embedding_dim', ?1)",
                        rusqlite::params![dim.to_string()],
                    ).map(|_| ()),
                }
            })
            .await
    }

    /// Returns the dimension recorded at creation time, if any database
    /// state exists yet.
    pub async fn stored_embedding_dim(&self) -> Result<Option<usize>> {
        self.pool
            .run(|conn| {
                conn.query_row(
                    "SELECT value FROM schema_meta WHERE key = 'embedding_dim'",
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await
            .map(|opt| opt.and_then(|s| s.parse().ok()))
    }

    /// Runs `work` inside a single atomic transaction boundary. Any error
    /// rolls the whole transaction back.
    pub async fn transaction<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool
            .interact(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let result = work(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await
            .map_err(PrometheusError::Anyhow)
    }

    /// Fails with `SchemaAhead` if the `migrations` table records a name
    /// this binary's registry doesn't know, i.e. the database was created
    /// or migrated by a newer version of this crate.
    async fn check_schema_not_ahead(&self) -> Result<()> {
        let applied = self.applied_migration_names().await?;
        let known: Vec<&'static str> = schema::registry().iter().map(|m| m.name).collect();
        let ahead = applied.iter().any(|name| !known.contains(&name.as_str()));
        if ahead {
            return Err(PrometheusError::SchemaAhead {
                found: applied.len(),
                known: known.len(),
            });
        }
        Ok(())
    }

    /// Names of migrations in the registry that have not yet been applied.
    pub async fn migrations_pending(&self) -> Result<Vec<&'static str>> {
        let applied = self.applied_migration_names().await?;
        Ok(schema::registry()
            .into_iter()
            .filter(|m| !applied.contains(&m.name.to_string()))
            .map(|m| m.name)
            .collect())
    }

    async fn applied_migration_names(&self) -> Result<Vec<String>> {
        self.pool
            .run(|conn| {
                // migrations table may not exist yet on a brand-new database;
                // treat that as "nothing applied" rather than an error.
                let mut stmt = match conn.prepare("SELECT name FROM migrations") {
                    Ok(s) => s,
                    Err(_) => return Ok(Vec::new()),
                };
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect()
            })
            .await
    }

    /// Applies every pending migration, in registry order, each inside its
    /// own transaction. Stops and surfaces `MigrationFailed` on the first
    /// `up` that faults, rolling that migration's transaction back; earlier
    /// migrations in the same call remain committed.
    pub async fn apply_pending(&self) -> Result<usize> {
        let applied = self.applied_migration_names().await?;
        let pending: Vec<(&'static str, fn(&Connection) -> rusqlite::Result<()>)> = schema::registry()
            .into_iter()
            .filter(|m| !applied.contains(&m.name.to_string()))
            .map(|m| (m.name, m.up))
            .collect();

        let count = pending.len();
        for (name, up) in pending {
            let name_owned = name.to_string();
            let applied_at = now_ms();
            let result = self
                .pool
                .interact(move |conn| {
                    let tx = conn.unchecked_transaction()?;
                    up(&tx).map_err(|e| anyhow::anyhow!("{e}"))?;
                    tx.execute(
                        "INSERT INTO migrations (name, applied_at) VALUES (?1, ?2)",
                        rusqlite::params![name_owned, applied_at],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await;

            if let Err(cause) = result {
                return Err(PrometheusError::MigrationFailed {
                    name: name.to_string(),
                    cause: cause.to_string(),
                });
            }
        }
        Ok(count)
    }
}

/// Default path for the conversations directory, derived from the database path.
pub fn conversations_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("conversations")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn apply_pending_is_idempotent() {
        let store = Store::open_in_memory("schema_idempotent", StoreOptions::default())
            .await
            .unwrap();
        assert!(store.migrations_pending().await.unwrap().is_empty());
        let applied_again = store.apply_pending().await.unwrap();
        assert_eq!(applied_again, 0);
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let store = Store::open_in_memory("schema_rollback", StoreOptions::default())
            .await
            .unwrap();
        let result: Result<()> = store
            .transaction(|conn| {
                conn.execute(
                    "INSERT INTO conversations (id, title, created_at, updated_at) VALUES ('c1', NULL, 0, 0)",
                    [],
                )?;
                Err(rusqlite::Error::QueryReturnedNoRows)
            })
            .await;
        assert!(result.is_err());

        let count: i64 = store
            .pool()
            .run(|conn| conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn reopening_a_schema_ahead_database_fails() {
        let store = Store::open_in_memory("schema_ahead", StoreOptions::default())
            .await
            .unwrap();
        store
            .pool()
            .run(|conn| {
                conn.execute(
                    "INSERT INTO migrations (name, applied_at) VALUES ('9999_from_the_future', 0)",
                    [],
                )
            })
            .await
            .unwrap();

        let reopened = Store::open_in_memory("schema_ahead", StoreOptions::default()).await;
        match reopened {
            Err(PrometheusError::SchemaAhead { found, known }) => {
                assert!(found > known);
            }
            other => panic!("expected SchemaAhead, got {other:?}"),
        }
        drop(store);
    }

    #[tokio::test]
    async fn embedding_dim_pinned_on_first_open() {
        let store = Store::open_in_memory("schema_dim", StoreOptions { embedding_dim: 384 })
            .await
            .unwrap();
        assert_eq!(store.stored_embedding_dim().await.unwrap(), Some(384));
    }
}
