use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::model::{Product, WindowSize};

/// Per-`(product, window)` serialization guard (§5: "updates to a given
/// `(P, W)` window must be serialized"). The registry itself is guarded by a
/// `parking_lot::Mutex` (process-local, short critical section); each entry
/// is a `tokio::sync::Mutex` held only for the duration of one OHLC update.
#[derive(Default)]
pub struct OhlcGuard {
    locks: SyncMutex<HashMap<(Product, WindowSize), Arc<AsyncMutex<()>>>>,
}

impl OhlcGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, product: &Product, window: WindowSize) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry((product.clone(), window))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the `(product, window)` lock. Other windows and
    /// other products proceed concurrently. `f` is async so the update step
    /// (a cache read-modify-write) can happen entirely inside the lock.
    pub async fn with_lock<F, Fut, R>(&self, product: &Product, window: WindowSize, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let lock = self.lock_for(product, window);
        let _guard = lock.lock().await;
        f().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_window_updates_are_serialized() {
        let guard = Arc::new(OhlcGuard::new());
        let counter = Arc::new(AtomicU32::new(0));
        let product = "NIFTY".to_string();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            let counter = counter.clone();
            let product = product.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .with_lock(&product, WindowSize::OneMinute, || async {
                        let before = counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(before, 0, "overlapping critical section detected");
                        tokio::task::yield_now().await;
                    })
                    .await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn distinct_windows_do_not_contend() {
        let guard = Arc::new(OhlcGuard::new());
        let product = "NIFTY".to_string();

        let g1 = guard.clone();
        let p1 = product.clone();
        let h1 = tokio::spawn(async move {
            g1.with_lock(&p1, WindowSize::OneMinute, || async {}).await;
        });
        let g2 = guard.clone();
        let p2 = product.clone();
        let h2 = tokio::spawn(async move {
            g2.with_lock(&p2, WindowSize::FiveMinute, || async {}).await;
        });
        tokio::time::timeout(Duration::from_secs(1), async {
            h1.await.unwrap();
            h2.await.unwrap();
        })
        .await
        .unwrap();
    }
}
