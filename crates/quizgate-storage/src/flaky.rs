//! Fault-injecting storage wrapper for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;

use quizgate_core::error::StorageError;
use quizgate_core::traits::Storage;

/// When a wrapped operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    Never,
    Always,
    /// Fail the first `n` calls, then pass through.
    FirstN(u32),
}

impl FailureMode {
    fn fails(self, call_index: u32) -> bool {
        match self {
            FailureMode::Never => false,
            FailureMode::Always => true,
            FailureMode::FirstN(n) => call_index < n,
        }
    }
}

/// Wraps a [`Storage`] and fails reads, writes or removals on demand with
/// [`StorageError::Injected`]. Calls are counted whether or not they fail.
#[derive(Debug)]
pub struct FlakyStorage<S> {
    inner: S,
    get_mode: FailureMode,
    set_mode: FailureMode,
    remove_mode: FailureMode,
    get_calls: AtomicU32,
    set_calls: AtomicU32,
    remove_calls: AtomicU32,
    injected: AtomicU32,
}

impl<S: Storage> FlakyStorage<S> {
    /// Wrap `inner` without any failures.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            get_mode: FailureMode::Never,
            set_mode: FailureMode::Never,
            remove_mode: FailureMode::Never,
            get_calls: AtomicU32::new(0),
            set_calls: AtomicU32::new(0),
            remove_calls: AtomicU32::new(0),
            injected: AtomicU32::new(0),
        }
    }

    pub fn fail_gets(mut self, mode: FailureMode) -> Self {
        self.get_mode = mode;
        self
    }

    pub fn fail_sets(mut self, mode: FailureMode) -> Self {
        self.set_mode = mode;
        self
    }

    pub fn fail_removes(mut self, mode: FailureMode) -> Self {
        self.remove_mode = mode;
        self
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn set_calls(&self) -> u32 {
        self.set_calls.load(Ordering::Relaxed)
    }

    pub fn remove_calls(&self) -> u32 {
        self.remove_calls.load(Ordering::Relaxed)
    }

    /// Number of failures injected so far.
    pub fn injected_failures(&self) -> u32 {
        self.injected.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(
        &self,
        op: &'static str,
        key: &str,
        mode: FailureMode,
        calls: &AtomicU32,
    ) -> Result<(), StorageError> {
        let index = calls.fetch_add(1, Ordering::Relaxed);
        if mode.fails(index) {
            self.injected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(op, key, call = index, "injecting storage failure");
            return Err(StorageError::Injected {
                op,
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl<S: Storage> Storage for FlakyStorage<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check("get", key, self.get_mode, &self.get_calls)?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check("set", key, self.set_mode, &self.set_calls)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check("remove", key, self.remove_mode, &self.remove_calls)?;
        self.inner.remove(key)
    }
}
