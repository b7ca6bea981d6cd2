//! Cross-instance fetch locks.
//!
//! [`crate::SingleFlight`] collapses concurrent fetches inside one process.
//! When several instances share a store, a [`FetchLock`] additionally makes
//! sure only one of them refreshes a given (item, source) pair; the others
//! poll the store for the holder's write.

use async_trait::async_trait;
use skinprice_core::{ItemKey, SourceId};
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::store::StorageResult;

/// A held lock. Must be released once the refresh has been written.
#[async_trait]
pub trait FetchLease: Send {
    async fn release(&mut self);
}

/// Non-blocking lock keyed by (item, source).
#[async_trait]
pub trait FetchLock: Send + Sync + Debug {
    /// Try to take the lock for a pair. `None` means another holder has it.
    async fn try_acquire(
        &self,
        item: &ItemKey,
        source: SourceId,
    ) -> StorageResult<Option<Box<dyn FetchLease>>>;
}

type HeldKeys = Arc<Mutex<HashSet<(ItemKey, SourceId)>>>;

/// Process-local [`FetchLock`].
///
/// Several reconcilers sharing one instance behave like separate service
/// instances sharing one advisory-lock namespace.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetchLock {
    held: HeldKeys,
}

impl InMemoryFetchLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pair is currently held.
    pub fn is_held(&self, item: &ItemKey, source: SourceId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&(item.clone(), source))
    }
}

#[async_trait]
impl FetchLock for InMemoryFetchLock {
    async fn try_acquire(
        &self,
        item: &ItemKey,
        source: SourceId,
    ) -> StorageResult<Option<Box<dyn FetchLease>>> {
        let key = (item.clone(), source);
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone());

        if !inserted {
            return Ok(None);
        }

        Ok(Some(Box::new(InMemoryLease {
            held: Arc::clone(&self.held),
            key: Some(key),
        })))
    }
}

struct InMemoryLease {
    held: HeldKeys,
    key: Option<(ItemKey, SourceId)>,
}

impl InMemoryLease {
    fn unlock(&mut self) {
        if let Some(key) = self.key.take() {
            self.held
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&key);
        }
    }
}

#[async_trait]
impl FetchLease for InMemoryLease {
    async fn release(&mut self) {
        self.unlock();
    }
}

impl Drop for InMemoryLease {
    fn drop(&mut self) {
        self.unlock();
    }
}
