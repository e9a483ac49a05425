//! Session identity — lazy, idempotent resolution of the per-store session id
//!
//! Resolution order: in-memory cache, then the persistent store, then a freshly
//! generated id that is written back. A store that cannot be read or written
//! degrades to an in-memory id for the lifetime of the resolver.

use std::sync::{Arc, Mutex};

use crate::models::ChatSession;
use crate::store::{KeyValueStore, StoreKeys};

/// Number of base36 digits in the random suffix of a session id.
pub const SESSION_SUFFIX_LEN: usize = 9;

/// Wall clock in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Source of uniformly distributed 64-bit values.
pub trait RandomSource: Send + Sync {
    fn next_u64(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Randomness drawn from v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRandom;

impl RandomSource for UuidRandom {
    fn next_u64(&self) -> u64 {
        uuid::Uuid::new_v4().as_u64_pair().0
    }
}

/// Build a session id of the form `session-<unix-ms>-<base36>`.
///
/// Pure in its inputs: the same clock reading and random value always give the
/// same id.
pub fn generate_session_id(clock: &dyn Clock, random: &dyn RandomSource) -> String {
    format!(
        "session-{}-{}",
        clock.now_millis(),
        base36_suffix(random.next_u64())
    )
}

/// Fixed-width base36 rendering of the low digits of `value`.
fn base36_suffix(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = [b'0'; SESSION_SUFFIX_LEN];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(value % 36) as usize];
        value /= 36;
    }
    out.iter().map(|&b| b as char).collect()
}

/// Caches the session id once resolved. One per widget instance.
pub struct SessionResolver {
    store: Arc<dyn KeyValueStore>,
    keys: StoreKeys,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    cached: Mutex<Option<ChatSession>>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl SessionResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StoreKeys) -> Self {
        Self::with_sources(store, keys, Arc::new(SystemClock), Arc::new(UuidRandom))
    }

    pub fn with_sources(
        store: Arc<dyn KeyValueStore>,
        keys: StoreKeys,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            random,
            cached: Mutex::new(None),
        }
    }

    /// Resolve the session id. Safe to call any number of times.
    pub fn session_id(&self) -> String {
        self.resolve().session_id
    }

    pub fn resolve(&self) -> ChatSession {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(session) = cached.as_ref() {
            return session.clone();
        }

        let session = self.load_or_create();
        *cached = Some(session.clone());
        session
    }

    fn load_or_create(&self) -> ChatSession {
        match self.store.get(&self.keys.session_id) {
            Ok(Some(id)) if !id.is_empty() => {
                tracing::debug!(session_id = %id, "Restored chat session");
                return ChatSession {
                    session_id: id,
                    persisted: true,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Session store unreadable — using an in-memory session id");
            }
        }

        let session_id = generate_session_id(self.clock.as_ref(), self.random.as_ref());
        let persisted = match self.store.set(&self.keys.session_id, &session_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist session id — it will not survive a restart");
                false
            }
        };

        tracing::info!(session_id = %session_id, persisted, "Created chat session");

        ChatSession {
            session_id,
            persisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    struct CountingRandom(AtomicU64);

    impl RandomSource for CountingRandom {
        fn next_u64(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
        fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".to_string()))
        }
    }

    fn resolver(store: Arc<dyn KeyValueStore>) -> SessionResolver {
        SessionResolver::with_sources(
            store,
            StoreKeys::with_prefix("binkoo-"),
            Arc::new(FixedClock(1_700_000_000_000)),
            Arc::new(CountingRandom(AtomicU64::new(36 * 36 + 35))),
        )
    }

    #[test]
    fn test_generate_session_id_is_deterministic() {
        let clock = FixedClock(1_700_000_000_000);
        let random = CountingRandom(AtomicU64::new(36 * 36 + 35));

        let id = generate_session_id(&clock, &random);
        assert_eq!(id, "session-1700000000000-00000010z");
    }

    #[test]
    fn test_generate_session_id_suffix_is_fixed_width_base36() {
        let clock = FixedClock(42);
        let random = CountingRandom(AtomicU64::new(u64::MAX));

        let id = generate_session_id(&clock, &random);
        let suffix = id.rsplit('-').next().unwrap();
        assert!(id.starts_with("session-42-"));
        assert_eq!(suffix.len(), SESSION_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_resolver_is_idempotent_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());

        let first = resolver.session_id();
        for _ in 0..10 {
            assert_eq!(resolver.session_id(), first);
        }
        assert_eq!(
            store.get("binkoo-session-id").unwrap().as_deref(),
            Some(first.as_str())
        );
        assert!(resolver.resolve().persisted);
    }

    #[test]
    fn test_resolver_reuses_stored_id_across_instances() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = resolver(store.clone()).session_id();

        // A second resolver stands in for a page reload.
        let second = SessionResolver::new(store, StoreKeys::with_prefix("binkoo-")).session_id();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolver_falls_back_to_memory_when_store_broken() {
        let resolver = resolver(Arc::new(BrokenStore));

        let session = resolver.resolve();
        assert!(!session.persisted);
        assert!(session.session_id.starts_with("session-"));
        assert_eq!(resolver.session_id(), session.session_id);
    }
}
