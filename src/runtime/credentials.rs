// src/runtime/credentials.rs
// Credential Manager: tracks per-credential health and cooldown. Generalized
// from the teacher's per-provider CircuitBreaker (Closed/Open/HalfOpen) into
// per-credential exponential backoff, since a provider may hold several
// credentials that should fail independently.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const INITIAL_COOLDOWN: Duration = Duration::from_secs(5);
const MAX_COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub provider: String,
    last_used: Option<Instant>,
    last_good: Option<Instant>,
    failure_count: u32,
    success_count: u32,
    cooldown_until: Option<Instant>,
}

impl Credential {
    fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            last_used: None,
            last_good: None,
            failure_count: 0,
            success_count: 0,
            cooldown_until: None,
        }
    }

    pub fn is_cooling_down(&self, now: Instant) -> bool {
        matches!(self.cooldown_until, Some(until) if until > now)
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }
}

/// Opaque handle returned by `acquire`. Carries only the credential's id so
/// callers (and attempt traces) never see the underlying secret value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHandle {
    pub id: String,
    pub provider: String,
}

pub struct CredentialManager {
    credentials: Mutex<HashMap<String, Credential>>,
    round_robin_cursor: Mutex<HashMap<String, usize>>,
    cooldown_base: Duration,
    cooldown_max: Duration,
}

impl CredentialManager {
    pub fn new() -> Self {
        Self::with_cooldown_bounds(INITIAL_COOLDOWN, MAX_COOLDOWN)
    }

    pub fn with_cooldown_bounds(base: Duration, max: Duration) -> Self {
        Self {
            credentials: Mutex::new(HashMap::new()),
            round_robin_cursor: Mutex::new(HashMap::new()),
            cooldown_base: base,
            cooldown_max: max,
        }
    }

    /// Registers a credential id for a provider. Idempotent.
    pub fn register(&self, provider: impl Into<String>, id: impl Into<String>) {
        let provider = provider.into();
        let id = id.into();
        let mut creds = self.credentials.lock().unwrap();
        creds.entry(id.clone()).or_insert_with(|| Credential::new(id, provider));
    }

    /// Returns an available credential for `provider`: `now >= cooldown_until`,
    /// minimum `last_used`, round-robin tie-break among equals.
    pub fn acquire(&self, provider: &str) -> Option<CredentialHandle> {
        let now = Instant::now();
        let mut creds = self.credentials.lock().unwrap();

        let mut candidates: Vec<&mut Credential> = creds
            .values_mut()
            .filter(|c| c.provider == provider && !c.is_cooling_down(now))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by_key(|c| c.last_used.map(|t| t.elapsed()).unwrap_or(Duration::MAX));
        // `sort_by_key` on elapsed-since-use puts the least-recently-used
        // first; ties (e.g. never used) keep insertion order from the map
        // iteration, which is itself not guaranteed to be stable, so we
        // round-robin within the tied group using a per-provider cursor.
        let min_elapsed = candidates[0].last_used.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
        let tied: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.last_used.map(|t| t.elapsed()).unwrap_or(Duration::MAX) == min_elapsed)
            .map(|(i, _)| i)
            .collect();

        let chosen_idx = if tied.len() > 1 {
            let mut cursor = self.round_robin_cursor.lock().unwrap();
            let slot = cursor.entry(provider.to_string()).or_insert(0);
            let picked = tied[*slot % tied.len()];
            *slot = slot.wrapping_add(1);
            picked
        } else {
            tied[0]
        };

        let chosen = &mut candidates[chosen_idx];
        chosen.last_used = Some(now);
        Some(CredentialHandle { id: chosen.id.clone(), provider: chosen.provider.clone() })
    }

    pub fn mark_success(&self, handle: &CredentialHandle) {
        let mut creds = self.credentials.lock().unwrap();
        if let Some(c) = creds.get_mut(&handle.id) {
            c.success_count += 1;
            c.failure_count = 0;
            c.last_good = Some(Instant::now());
            c.cooldown_until = None;
        }
    }

    pub fn mark_failure(&self, handle: &CredentialHandle) {
        let mut creds = self.credentials.lock().unwrap();
        if let Some(c) = creds.get_mut(&handle.id) {
            c.failure_count += 1;
            let backoff = self
                .cooldown_base
                .saturating_mul(1u32.checked_shl(c.failure_count.saturating_sub(1)).unwrap_or(u32::MAX))
                .min(self.cooldown_max);
            c.cooldown_until = Some(Instant::now() + backoff);
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<Credential> {
        self.credentials.lock().unwrap().get(id).cloned()
    }
}

impl Default for CredentialManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_none_without_registration() {
        let mgr = CredentialManager::new();
        assert!(mgr.acquire("openai").is_none());
    }

    #[test]
    fn acquire_returns_registered_credential() {
        let mgr = CredentialManager::new();
        mgr.register("openai", "key-a");
        let h = mgr.acquire("openai").unwrap();
        assert_eq!(h.id, "key-a");
        assert_eq!(h.provider, "openai");
    }

    #[test]
    fn failure_applies_cooldown_and_blocks_reacquisition() {
        let mgr = CredentialManager::new();
        mgr.register("openai", "key-a");
        let h = mgr.acquire("openai").unwrap();
        mgr.mark_failure(&h);
        assert!(mgr.acquire("openai").is_none());
        let snap = mgr.snapshot("key-a").unwrap();
        assert_eq!(snap.failure_count(), 1);
        assert!(snap.cooldown_until().is_some());
    }

    #[test]
    fn success_resets_failure_count_and_cooldown() {
        let mgr = CredentialManager::new();
        mgr.register("openai", "key-a");
        let h = mgr.acquire("openai").unwrap();
        mgr.mark_failure(&h);
        // Cooldown blocks reacquire, so mark success directly on the handle
        // we already hold (mirrors a caller completing an in-flight call).
        mgr.mark_success(&h);
        let snap = mgr.snapshot("key-a").unwrap();
        assert_eq!(snap.failure_count(), 0);
        assert!(snap.cooldown_until().is_none());
    }

    #[test]
    fn round_robins_among_equally_fresh_credentials() {
        let mgr = CredentialManager::new();
        mgr.register("openai", "key-a");
        mgr.register("openai", "key-b");
        let first = mgr.acquire("openai").unwrap();
        // Cool the first one down so the next acquire must pick the other.
        mgr.mark_failure(&first);
        let second = mgr.acquire("openai").unwrap();
        assert_ne!(first.id, second.id);
    }
}
