// src/store/pool.rs
// Async connection pool over rusqlite + sqlite-vec, using deadpool-sqlite.
//
// Two access patterns, mirroring the teacher's split:
// - `run()` for typed operations that want a `crate::Result`.
// - `interact()` for lower-level callers (migrations, background lanes) that
//   prefer a plain `anyhow::Result`.
//
// Writes retry a bounded number of times on SQLITE_BUSY/SQLITE_LOCKED, since
// WAL mode still serializes writers against each other.

use crate::error::PrometheusError;
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

static SQLITE_VEC_INIT: Once = Once::new();

/// Registers the sqlite-vec extension once per process, before any
/// connections are opened.
#[allow(clippy::missing_transmute_annotations)]
fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init matches the signature sqlite3_auto_extension
        // expects; this is the standard registration pattern for a statically
        // linked SQLite loadable extension.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered");
    });
}

fn is_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(200),
    Duration::from_millis(800),
];

/// Handle to the embedded database. Cheap to clone; wraps an `Arc`-backed
/// pool internally via `deadpool_sqlite::Pool`.
#[derive(Clone, Debug)]
pub struct DatabasePool {
    pool: Pool,
}

impl DatabasePool {
    /// Opens (creating parent directories and the file if needed) and
    /// configures a database at `path`. Enables WAL journaling and foreign
    /// keys on every connection via a post-create hook.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        ensure_sqlite_vec_registered();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let cfg = Config::new(path);
        let pool = cfg
            .builder(Runtime::Tokio1)?
            .post_create(post_create_hook())
            .build()?;

        Ok(Self { pool })
    }

    /// In-memory pool for tests: a shared-cache URI so every connection in
    /// the pool sees the same database state.
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_in_memory(name: &str) -> anyhow::Result<Self> {
        ensure_sqlite_vec_registered();
        let uri = format!("file:{name}?mode=memory&cache=shared");
        let cfg = Config::new(uri);
        let pool = cfg
            .builder(Runtime::Tokio1)?
            .post_create(post_create_hook())
            .build()?;
        Ok(Self { pool })
    }

    /// Run a closure with a pooled connection, converting errors to
    /// `PrometheusError`. Retries a bounded number of times on contention.
    pub async fn run<F, T>(&self, f: F) -> crate::error::Result<T>
    where
        F: Fn(&Connection) -> rusqlite::Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = std::sync::Arc::new(f);
        let mut last_err = None;
        for delay in RETRY_DELAYS {
            let conn = self.pool.get().await.map_err(PrometheusError::from)?;
            let f = f.clone();
            match conn.interact(move |c: &mut Connection| f(&*c)).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) if is_contention(&e) => {
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Ok(Err(e)) => return Err(PrometheusError::Db(e)),
                Err(e) => return Err(PrometheusError::from(e)),
            }
        }
        Err(PrometheusError::Db(last_err.expect("retry loop always records an error before exhausting")))
    }

    /// Lower-level escape hatch returning `anyhow::Result`, for migrations
    /// and background lanes that don't want the typed error enum.
    pub async fn interact<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await?;
        conn.interact(move |c: &mut Connection| f(&*c))
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?
    }
}

fn post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode=WAL; \
                     PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000; \
                     PRAGMA synchronous=NORMAL;",
                )
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}
