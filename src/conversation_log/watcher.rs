// src/conversation_log/watcher.rs
// Debounced filesystem watch over the conversations directory, re-running
// `ConversationLog::index_files` whenever a `.log` file settles.

use super::ConversationLog;
use crate::store::Store;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Debounce window: a burst of writes to the same file collapses into one
/// `index_files` pass after this much quiet time.
const DEBOUNCE_MS: u64 = 500;
/// Upper bound on how long a dirty file can wait even under continuous writes.
const IDLE_CHECK_MS: u64 = 200;

pub struct WatchOptions {
    pub debounce_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { debounce_ms: DEBOUNCE_MS }
    }
}

/// Watches `log.dir()` and keeps the Store reconciled against it. Runs until
/// `shutdown` reports `true`.
pub async fn run(
    log: ConversationLog,
    store: Store,
    opts: WatchOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(256);

    let watcher: Result<RecommendedWatcher, notify::Error> = Watcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let is_relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                if !is_relevant {
                    return;
                }
                for path in event.paths {
                    if path.extension().and_then(|e| e.to_str()) == Some("log") {
                        if let Err(e) = tx.try_send(path) {
                            tracing::debug!("conversation watcher: dropped event: {e}");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("conversation watcher error: {e}"),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    );

    let mut watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("failed to start conversation watcher: {e}");
            return;
        }
    };

    if let Err(e) = watcher.watch(log.dir(), RecursiveMode::NonRecursive) {
        tracing::error!("failed to watch {:?}: {e}", log.dir());
        return;
    }

    let debounce = Duration::from_millis(opts.debounce_ms.max(1));
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            Some(path) = rx.recv() => {
                pending.insert(path, Instant::now());
            }
            _ = tokio::time::sleep(Duration::from_millis(IDLE_CHECK_MS)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }

        let now = Instant::now();
        let ready = pending
            .iter()
            .any(|(_, ts)| now.duration_since(*ts) >= debounce);
        if !ready {
            continue;
        }
        pending.retain(|_, ts| now.duration_since(*ts) < debounce);

        match log.index_files(&store).await {
            Ok(counters) => {
                if counters.indexed_files > 0 {
                    tracing::info!(
                        "conversation watcher: indexed {} file(s), {} message(s)",
                        counters.indexed_files,
                        counters.total_messages
                    );
                }
            }
            Err(e) => tracing::warn!("conversation watcher: index pass failed: {e}"),
        }
    }

    tracing::info!("conversation watcher shutting down");
}
