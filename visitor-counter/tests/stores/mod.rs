#![allow(dead_code)]

use {
    std::sync::{Mutex, atomic::{AtomicBool, AtomicUsize, Ordering}},
    visitor_counter::{
        AttributeValue,
        CounterStore,
        error::StorageError,
    },
};

/// Store that is never reachable.
pub struct UnavailableStore {
    pub calls: AtomicUsize,
}

impl UnavailableStore {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl CounterStore for UnavailableStore {
    fn add(&self, _id: &str, _attribute: &str, _delta: i64) -> Result<AttributeValue, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable { reason: "connection refused".to_owned() })
    }
}

/// Store that answers every add with the same value, the way a store with its own numeric types would.
pub struct FixedValueStore {
    value: AttributeValue,
}

impl FixedValueStore {
    pub fn new(value: AttributeValue) -> Self {
        Self {
            value,
        }
    }
}

impl CounterStore for FixedValueStore {
    fn add(&self, _id: &str, _attribute: &str, _delta: i64) -> Result<AttributeValue, StorageError> {
        Ok(self.value.clone())
    }
}

/// Wraps a real store and fails the next call without touching it when armed.
pub struct FlakyStore<T> {
    inner: T,
    fail_next: AtomicBool,
    log: Mutex<Vec<(String, String, i64)>>,
}

impl<T: CounterStore> FlakyStore<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            fail_next: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, String, i64)> {
        self.log.lock().unwrap().clone()
    }
}

impl<T: CounterStore> CounterStore for FlakyStore<T> {
    fn add(&self, id: &str, attribute: &str, delta: i64) -> Result<AttributeValue, StorageError> {
        self.log.lock().unwrap().push((id.to_owned(), attribute.to_owned(), delta));
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable { reason: "simulated timeout".to_owned() });
        }
        self.inner.add(id, attribute, delta)
    }
}
