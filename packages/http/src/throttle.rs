//! Keyed debounce-with-cancel for in-flight requests.
//!
//! Every throttled request registers a slot under its throttle key.
//! Registering cancels the slot registered just before it under the same
//! key, so a burst of calls collapses into the last one.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

type Slots = HashMap<String, BTreeMap<u64, CancellationToken>>;

#[derive(Debug, Default)]
pub struct ThrottleRegistry {
    slots: Arc<Mutex<Slots>>,
    next_id: AtomicU64,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new slot under `key`, cancelling the previous one.
    ///
    /// When `parent` is given, the slot's token is its child, so cancelling
    /// the parent cancels the slot too.
    pub fn register(&self, key: &str, parent: Option<&CancellationToken>) -> ThrottleSlot {
        let token = parent
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut slots = lock(&self.slots);
            let entries = slots.entry(key.to_string()).or_default();
            let previous = entries.last_key_value().map(|(_, token)| token.clone());
            entries.insert(id, token.clone());
            previous
        };

        if let Some(previous) = previous {
            trace!(key, "cancelling superseded request");
            previous.cancel();
        }

        ThrottleSlot {
            key: key.to_string(),
            id,
            token,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Register under `key`, wait out `delay`, then run `dispatch`.
    ///
    /// Fails with [`Error::Cancelled`] if a newer registration under the same
    /// key (or the parent token) cancels this one before `dispatch` settles.
    pub async fn run<T, F>(
        &self,
        key: &str,
        delay: Duration,
        parent: Option<&CancellationToken>,
        dispatch: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let slot = self.register(key, parent);
        trace!(key, delay_ms = delay.as_millis() as u64, "throttle slot registered");

        tokio::select! {
            biased;
            _ = slot.token().cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        cancellable(slot.token(), dispatch).await
    }

    /// Number of unsettled slots under `key`.
    pub fn pending(&self, key: &str) -> usize {
        lock(&self.slots).get(key).map_or(0, BTreeMap::len)
    }
}

/// A registered slot. Dropping it removes the registration.
#[derive(Debug)]
pub struct ThrottleSlot {
    key: String,
    id: u64,
    token: CancellationToken,
    slots: Arc<Mutex<Slots>>,
}

impl ThrottleSlot {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for ThrottleSlot {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        if let Some(entries) = slots.get_mut(&self.key) {
            entries.remove(&self.id);
            if entries.is_empty() {
                slots.remove(&self.key);
            }
        }
    }
}

/// Race `future` against `token`.
pub(crate) async fn cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_cancels_previous_slot() {
        let registry = ThrottleRegistry::new();
        let first = registry.register("search", None);
        assert!(!first.is_cancelled());

        let second = registry.register("search", None);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.pending("search"), 2);
    }

    #[test]
    fn keys_are_independent() {
        let registry = ThrottleRegistry::new();
        let a = registry.register("a", None);
        let _b = registry.register("b", None);
        assert!(!a.is_cancelled());
    }

    #[test]
    fn dropping_slots_clears_the_key() {
        let registry = ThrottleRegistry::new();
        let first = registry.register("k", None);
        let second = registry.register("k", None);

        drop(first);
        assert_eq!(registry.pending("k"), 1);
        drop(second);
        assert_eq!(registry.pending("k"), 0);
        assert!(lock(&registry.slots).is_empty());
    }

    #[test]
    fn parent_cancellation_reaches_slot() {
        let registry = ThrottleRegistry::new();
        let parent = CancellationToken::new();
        let slot = registry.register("k", Some(&parent));
        parent.cancel();
        assert!(slot.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_call() {
        let registry = ThrottleRegistry::new();
        let delay = Duration::from_millis(100);

        let (first, second) = tokio::join!(
            registry.run("k", delay, None, async { Ok::<_, Error>(1) }),
            registry.run("k", delay, None, async { Ok::<_, Error>(2) }),
        );

        assert!(matches!(first, Err(Error::Cancelled)));
        assert_eq!(second.unwrap(), 2);
        assert_eq!(registry.pending("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_dispatch_is_aborted() {
        let registry = ThrottleRegistry::new();
        let delay = Duration::from_millis(10);

        let slow = registry.run("k", delay, None, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>("slow")
        });
        let late = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            registry
                .run("k", delay, None, async { Ok::<_, Error>("late") })
                .await
        };

        let (slow, late) = tokio::join!(slow, late);
        assert!(matches!(slow, Err(Error::Cancelled)));
        assert_eq!(late.unwrap(), "late");
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_debounce_window() {
        let registry = ThrottleRegistry::new();
        let start = tokio::time::Instant::now();

        registry
            .run("k", Duration::from_millis(250), None, async { Ok::<_, Error>(()) })
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
