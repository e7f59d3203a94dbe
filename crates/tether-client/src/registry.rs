//! Ordered callback registry
//!
//! Backs both state listeners and push handlers. Entries are kept in
//! registration order and removed by the handle returned at registration.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Handle returned by a registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry of callbacks in registration order
pub struct Registry<T: ?Sized> {
    inner: Mutex<Entries<T>>,
}

struct Entries<T: ?Sized> {
    callbacks: BTreeMap<HandlerId, Arc<T>>,
    next_id: u64,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Entries {
                callbacks: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Register a callback; it runs after every callback registered before it
    pub fn register(&self, callback: Arc<T>) -> HandlerId {
        let mut inner = self.inner.lock();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner.callbacks.insert(id, callback);
        id
    }

    /// Remove a callback; returns false if the handle is unknown
    pub fn unregister(&self, id: HandlerId) -> bool {
        self.inner.lock().callbacks.remove(&id).is_some()
    }

    /// Callbacks in registration order.
    ///
    /// Callers invoke the snapshot without holding the lock, so a callback
    /// may register or unregister without deadlocking.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.inner.lock().callbacks.values().cloned().collect()
    }

    /// Remove every callback
    pub fn clear(&self) {
        self.inner.lock().callbacks.clear();
    }

    /// Number of registered callbacks
    pub fn count(&self) -> usize {
        self.inner.lock().callbacks.len()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn() -> &'static str + Send + Sync;

    #[test]
    fn test_registration_order() {
        let registry: Registry<Callback> = Registry::new();
        registry.register(Arc::new(|| "first"));
        registry.register(Arc::new(|| "second"));
        registry.register(Arc::new(|| "third"));

        let names: Vec<_> = registry.snapshot().iter().map(|cb| cb()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unregister_keeps_order() {
        let registry: Registry<Callback> = Registry::new();
        registry.register(Arc::new(|| "first"));
        let middle = registry.register(Arc::new(|| "second"));
        registry.register(Arc::new(|| "third"));

        assert!(registry.unregister(middle));
        assert!(!registry.unregister(middle));

        let names: Vec<_> = registry.snapshot().iter().map(|cb| cb()).collect();
        assert_eq!(names, vec!["first", "third"]);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_handles_not_reused() {
        let registry: Registry<Callback> = Registry::new();
        let a = registry.register(Arc::new(|| "a"));
        registry.unregister(a);
        let b = registry.register(Arc::new(|| "b"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_clear() {
        let registry: Registry<Callback> = Registry::new();
        registry.register(Arc::new(|| "a"));
        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(registry.snapshot().is_empty());
    }
}
