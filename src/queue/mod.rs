// src/queue/mod.rs
// Named-lane concurrency shaping: each lane is an independent FIFO with a
// bounded number of concurrently running tasks. Modeled on the teacher's
// `background::fast_lane`/`slow_lane` worker-loop shape (owned state,
// notify-driven pump, graceful per-task fault isolation), generalized from
// two hardcoded lanes into a dynamic named-lane table.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

/// Default concurrency applied to a lane with no explicit entry in the table.
const DEFAULT_LANE_CONCURRENCY: usize = 1;
/// Default threshold for the "waited too long" warning when a caller does
/// not supply its own `warn_after_ms`.
const DEFAULT_WARN_AFTER_MS: u64 = 5_000;
/// Poll interval used by `drain_completely` while waiting for a lane to empty.
const DRAIN_POLL_MS: u64 = 20;

#[derive(Debug, Clone, Error)]
pub enum LaneFault {
    #[error("lane cleared")]
    Cleared,
    #[error("lane queue shut down before the task ran")]
    Closed,
}

/// Per-call options for `enqueue`.
#[derive(Default, Clone)]
pub struct EnqueueOptions {
    pub warn_after_ms: Option<u64>,
    pub on_wait: Option<Arc<dyn Fn(u64, usize) + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct LaneStatus {
    pub queue_depth: usize,
    pub active_count: usize,
    pub max_concurrent: usize,
    pub avg_wait_ms: u64,
    pub is_draining: bool,
}

type RunFn = Box<dyn FnOnce(Option<LaneFault>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct Entry {
    enqueued_at: Instant,
    warn_after_ms: Option<u64>,
    on_wait: Option<Arc<dyn Fn(u64, usize) + Send + Sync>>,
    run: RunFn,
}

struct LaneState {
    queue: VecDeque<Entry>,
    active: usize,
    max_concurrent: usize,
    draining: bool,
    wait_samples_ms: VecDeque<u64>,
}

impl LaneState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            active: 0,
            max_concurrent: max_concurrent.max(1),
            draining: false,
            wait_samples_ms: VecDeque::new(),
        }
    }

    fn record_wait(&mut self, waited_ms: u64) {
        self.wait_samples_ms.push_back(waited_ms);
        if self.wait_samples_ms.len() > 100 {
            self.wait_samples_ms.pop_front();
        }
    }

    fn avg_wait_ms(&self) -> u64 {
        if self.wait_samples_ms.is_empty() {
            return 0;
        }
        let sum: u64 = self.wait_samples_ms.iter().sum();
        sum / self.wait_samples_ms.len() as u64
    }
}

/// Process-wide lane table. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct LaneQueue {
    lanes: Arc<Mutex<HashMap<String, LaneState>>>,
    defaults: Arc<HashMap<String, usize>>,
}

impl LaneQueue {
    pub fn new(defaults: HashMap<String, usize>) -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
            defaults: Arc::new(defaults),
        }
    }

    fn default_concurrency(&self, lane: &str) -> usize {
        self.defaults
            .get(lane)
            .copied()
            .unwrap_or(DEFAULT_LANE_CONCURRENCY)
    }

    /// Appends a task to `lane` and triggers a drain. Resolves with the
    /// task's result, or `LaneFault` if the lane was cleared before the
    /// task ran.
    pub async fn enqueue<F, Fut, T>(
        &self,
        lane: &str,
        opts: EnqueueOptions,
        task: F,
    ) -> Result<T, LaneFault>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, LaneFault>>();
        let run: RunFn = Box::new(move |fault| {
            Box::pin(async move {
                let result = match fault {
                    Some(f) => Err(f),
                    None => Ok(task().await),
                };
                let _ = tx.send(result);
            })
        });

        let entry = Entry {
            enqueued_at: Instant::now(),
            warn_after_ms: opts.warn_after_ms,
            on_wait: opts.on_wait,
            run,
        };

        {
            let mut lanes = self.lanes.lock().await;
            let state = lanes
                .entry(lane.to_string())
                .or_insert_with(|| LaneState::new(self.default_concurrency(lane)));
            state.queue.push_back(entry);
        }

        self.trigger_drain(lane).await;
        rx.await.unwrap_or(Err(LaneFault::Closed))
    }

    /// Sets a lane's maximum concurrency (minimum 1) and triggers a drain.
    pub async fn set_lane_concurrency(&self, lane: &str, n: usize) {
        {
            let mut lanes = self.lanes.lock().await;
            let state = lanes
                .entry(lane.to_string())
                .or_insert_with(|| LaneState::new(self.default_concurrency(lane)));
            state.max_concurrent = n.max(1);
        }
        self.trigger_drain(lane).await;
    }

    pub async fn status(&self, lane: &str) -> LaneStatus {
        let lanes = self.lanes.lock().await;
        match lanes.get(lane) {
            Some(state) => LaneStatus {
                queue_depth: state.queue.len(),
                active_count: state.active,
                max_concurrent: state.max_concurrent,
                avg_wait_ms: state.avg_wait_ms(),
                is_draining: state.draining,
            },
            None => LaneStatus {
                max_concurrent: self.default_concurrency(lane),
                ..Default::default()
            },
        }
    }

    /// Resolves once `lane`'s queue is empty and no task is active.
    pub async fn drain_completely(&self, lane: &str) {
        loop {
            let idle = {
                let lanes = self.lanes.lock().await;
                lanes
                    .get(lane)
                    .map(|s| s.queue.is_empty() && s.active == 0)
                    .unwrap_or(true)
            };
            if idle {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(DRAIN_POLL_MS)).await;
        }
    }

    /// Test utility: rejects every pending entry across every lane with
    /// `LaneFault::Cleared`. Active tasks already running are unaffected.
    pub async fn clear_all_lanes(&self) {
        let drained: Vec<Entry> = {
            let mut lanes = self.lanes.lock().await;
            lanes
                .values_mut()
                .flat_map(|state| state.queue.drain(..).collect::<Vec<_>>())
                .collect()
        };
        for entry in drained {
            (entry.run)(Some(LaneFault::Cleared)).await;
        }
    }

    /// Guarded pump trigger: only the first caller while a lane is idle
    /// actually runs the pump loop; concurrent triggers for the same lane
    /// no-op, trusting the running loop (or its completion callbacks) to
    /// pick up newly queued work.
    async fn trigger_drain(&self, lane: &str) {
        let should_run = {
            let mut lanes = self.lanes.lock().await;
            let state = lanes
                .entry(lane.to_string())
                .or_insert_with(|| LaneState::new(self.default_concurrency(lane)));
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };
        if should_run {
            self.pump_loop(lane).await;
        }
    }

    fn pump_loop<'a>(&'a self, lane: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        loop {
            let popped = {
                let mut lanes = self.lanes.lock().await;
                let state = lanes.get_mut(lane).expect("lane present while draining");
                if state.active >= state.max_concurrent || state.queue.is_empty() {
                    state.draining = false;
                    return;
                }
                let entry = state.queue.pop_front();
                if entry.is_some() {
                    state.active += 1;
                }
                let queue_ahead = state.queue.len();
                entry.map(|e| (e, queue_ahead))
            };

            let Some((entry, queue_ahead)) = popped else {
                return;
            };

            let waited_ms = entry.enqueued_at.elapsed().as_millis() as u64;
            let warn_after = entry.warn_after_ms.unwrap_or(DEFAULT_WARN_AFTER_MS);
            if waited_ms >= warn_after {
                match &entry.on_wait {
                    Some(cb) => cb(waited_ms, queue_ahead),
                    None => tracing::warn!(
                        lane,
                        waited_ms,
                        queue_ahead,
                        "lane queue: task waited past warn_after_ms"
                    ),
                }
            }

            let this = self.clone();
            let lane_owned = lane.to_string();
            tokio::spawn(async move {
                (entry.run)(None).await;
                this.on_task_complete(&lane_owned, waited_ms).await;
                this.trigger_drain(&lane_owned).await;
            });
        }
        })
    }

    async fn on_task_complete(&self, lane: &str, waited_ms: u64) {
        let mut lanes = self.lanes.lock().await;
        if let Some(state) = lanes.get_mut(lane) {
            state.active = state.active.saturating_sub(1);
            state.record_wait(waited_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn tasks_run_and_return_results() {
        let queue = LaneQueue::new(HashMap::new());
        let result = queue.enqueue("default", EnqueueOptions::default(), || async { 1 + 1 }).await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn lane_respects_concurrency_cap() {
        let queue = LaneQueue::new(HashMap::new());
        queue.set_lane_concurrency("capped", 1).await;

        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let queue = queue.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue("capped", EnqueueOptions::default(), move || async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_all_lanes_rejects_pending() {
        let queue = LaneQueue::new(HashMap::new());
        queue.set_lane_concurrency("blocked", 1).await;

        // Occupy the single slot so the next enqueue stays pending.
        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("blocked", EnqueueOptions::default(), || async {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("blocked", EnqueueOptions::default(), || async { 7 })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        queue.clear_all_lanes().await;
        let pending_result = pending.await.unwrap();
        assert!(matches!(pending_result, Err(LaneFault::Cleared)));

        blocker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn drain_completely_waits_for_idle() {
        let queue = LaneQueue::new(HashMap::new());
        let h = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue("x", EnqueueOptions::default(), || async {
                        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        queue.drain_completely("x").await;
        let status = queue.status("x").await;
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.active_count, 0);
        h.await.unwrap().unwrap();
    }
}
