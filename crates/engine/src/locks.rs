//! Per-multisig protocol serialization
//!
//! At most one protocol executes against a given multisig at a time.
//! Locks are acquired in ascending address order; every current engine
//! method needs exactly one, but multi-lock callers get deadlock
//! freedom for free.

use alloy_primitives::Address;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-multisig mutexes.
#[derive(Default)]
pub struct LockManager {
    locks: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl LockManager {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, multisig: Address) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(multisig).or_default().clone()
    }

    /// Acquire the lock for a single multisig.
    pub async fn acquire(&self, multisig: Address) -> OwnedMutexGuard<()> {
        self.handle(multisig).lock_owned().await
    }

    /// Acquire several locks in ascending address order.
    pub async fn acquire_all(&self, multisigs: &[Address]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted = multisigs.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for multisig in sorted {
            guards.push(self.handle(multisig).lock_owned().await);
        }
        guards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_same_multisig_serializes() {
        let locks = Arc::new(LockManager::new());
        let multisig = address!("1111111111111111111111111111111111111111");
        let running = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let running = running.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(multisig).await;
                assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distinct_multisigs_run_concurrently() {
        let locks = LockManager::new();
        let a = locks
            .acquire(address!("1111111111111111111111111111111111111111"))
            .await;
        // A second channel's lock must not block behind the first.
        let b = locks
            .acquire(address!("2222222222222222222222222222222222222222"))
            .await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn test_acquire_all_dedupes() {
        let locks = LockManager::new();
        let m = address!("3333333333333333333333333333333333333333");
        let guards = locks.acquire_all(&[m, m]).await;
        assert_eq!(guards.len(), 1);
    }
}
