//! Auth key rotation with round-robin selection and failure cooldown.
//! `ProviderConfig::auth_env_key`
//! carries a single env var name in the common case, but may name several
//! comma-separated env vars to rotate across multiple keys for the same
//! provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use arena_domain::{Error, Result};

const DEFAULT_COOLDOWN_SECS: u64 = 60;

struct KeySlot {
    key: String,
    failed_at: Option<Instant>,
}

/// Thread-safe round-robin key rotator with failure cooldown.
pub struct AuthRotator {
    slots: Mutex<Vec<KeySlot>>,
    index: AtomicUsize,
    cooldown: Duration,
}

/// A key handed out by [`AuthRotator::next_key`].
pub struct KeyEntry {
    pub key: String,
    index: usize,
}

impl AuthRotator {
    fn new(provider_id: &str, keys: Vec<String>, cooldown: Duration) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::ProviderAuth {
                provider: provider_id.into(),
                message: "no API key resolved".into(),
            });
        }
        let slots = keys.into_iter().map(|key| KeySlot { key, failed_at: None }).collect();
        Ok(Self {
            slots: Mutex::new(slots),
            index: AtomicUsize::new(0),
            cooldown,
        })
    }

    /// Resolve `auth_env_key` (comma-separated env var names) into a
    /// rotator. Each name is read eagerly; missing variables are an error.
    pub fn from_env_key(provider_id: &str, auth_env_key: &str) -> Result<Self> {
        let mut resolved = Vec::new();
        for name in auth_env_key.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let val = std::env::var(name).map_err(|_| Error::ProviderAuth {
                provider: provider_id.into(),
                message: format!("environment variable '{name}' not set"),
            })?;
            resolved.push(val);
        }
        Self::new(provider_id, resolved, Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }

    /// Hand out the next healthy key in round-robin order. If every key
    /// is cooling down, returns the least-recently-failed one rather than
    /// blocking.
    pub fn next_key(&self) -> KeyEntry {
        let mut slots = self.slots.lock().unwrap();
        let n = slots.len();
        let start = self.index.fetch_add(1, Ordering::Relaxed) % n;

        for offset in 0..n {
            let i = (start + offset) % n;
            let healthy = slots[i]
                .failed_at
                .map(|t| t.elapsed() >= self.cooldown)
                .unwrap_or(true);
            if healthy {
                return KeyEntry {
                    key: slots[i].key.clone(),
                    index: i,
                };
            }
        }

        // All cooling down: return the one that failed longest ago.
        let oldest = slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.failed_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX))
            .map(|(i, _)| i)
            .unwrap_or(0);
        KeyEntry {
            key: slots[oldest].key.clone(),
            index: oldest,
        }
    }

    /// Mark a previously handed-out key as having just failed, putting it
    /// into cooldown.
    pub fn mark_failed(&self, entry: &KeyEntry) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(entry.index) {
            slot.failed_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robins_across_multiple_keys() {
        std::env::set_var("ARENA_TEST_AUTH_A", "key-a");
        std::env::set_var("ARENA_TEST_AUTH_B", "key-b");
        let rotator = AuthRotator::from_env_key("test", "ARENA_TEST_AUTH_A,ARENA_TEST_AUTH_B").unwrap();
        let first = rotator.next_key().key;
        let second = rotator.next_key().key;
        assert_ne!(first, second);
        std::env::remove_var("ARENA_TEST_AUTH_A");
        std::env::remove_var("ARENA_TEST_AUTH_B");
    }

    #[test]
    fn missing_env_var_errors() {
        let err = AuthRotator::from_env_key("test", "ARENA_TEST_AUTH_MISSING_XYZ").unwrap_err();
        assert!(err.to_string().contains("ARENA_TEST_AUTH_MISSING_XYZ"));
    }

    #[test]
    fn failed_key_is_skipped_until_cooldown_elapses() {
        std::env::set_var("ARENA_TEST_AUTH_ONLY", "solo-key");
        let rotator = AuthRotator::from_env_key("test", "ARENA_TEST_AUTH_ONLY").unwrap();
        let entry = rotator.next_key();
        rotator.mark_failed(&entry);
        // Single key: still returned even while cooling down (no alternative).
        let next = rotator.next_key();
        assert_eq!(next.key, "solo-key");
        std::env::remove_var("ARENA_TEST_AUTH_ONLY");
    }
}
