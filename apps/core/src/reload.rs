//! Versioned snapshot cell for configuration that can be reloaded at runtime.
//!
//! Readers clone an `Arc` and keep it for the whole request; a reload swaps
//! the pointer and bumps the version. Nothing a reader holds is ever mutated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A value together with the version it was published under.
#[derive(Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Versioned<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> std::ops::Deref for Versioned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[derive(Debug)]
pub struct Snapshot<T> {
    current: RwLock<Versioned<T>>,
    next_version: AtomicU64,
}

impl<T> Snapshot<T> {
    /// Publish `value` as version 1.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Versioned {
                version: 1,
                value: Arc::new(value),
            }),
            next_version: AtomicU64::new(2),
        }
    }

    // The lock only guards a pointer swap, so a poisoned guard still holds a whole value.
    pub fn load(&self) -> Versioned<T> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Replace the published value; returns the new version.
    pub fn swap(&self, value: T) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        *guard = Versioned {
            version,
            value: Arc::new(value),
        };
        version
    }

    /// Publish a value derived from the current one under the same write lock,
    /// so concurrent updates never drop each other's changes.
    pub fn update<F>(&self, derive: F) -> u64
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let value = derive(&guard.value);
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        *guard = Versioned {
            version,
            value: Arc::new(value),
        };
        version
    }
}
