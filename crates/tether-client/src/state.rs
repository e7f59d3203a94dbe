//! Connection state holder with change listeners

use crate::registry::{HandlerId, Registry};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tether_core::ConnectionState;
use tracing::{debug, error};

/// Callback invoked on every applied state transition
pub type StateListener = dyn Fn(ConnectionState) + Send + Sync;

/// Holds the current connection state and notifies listeners on change.
///
/// `Unauthorized` is sticky: while it is current, only a Connected state is
/// accepted. Listeners run synchronously from `set`, in registration order,
/// outside the internal lock.
pub struct StateManager {
    current: Mutex<Current>,
    listeners: Registry<StateListener>,
}

struct Current {
    state: ConnectionState,
    disposed: bool,
}

impl StateManager {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            current: Mutex::new(Current {
                state: initial,
                disposed: false,
            }),
            listeners: Registry::new(),
        }
    }

    /// Current state
    pub fn get(&self) -> ConnectionState {
        self.current.lock().state
    }

    /// Apply a transition and notify listeners.
    ///
    /// Returns false when the transition was discarded (sticky
    /// `Unauthorized`, or the manager was disposed).
    pub fn set(&self, next: ConnectionState) -> bool {
        {
            let mut current = self.current.lock();
            if current.disposed {
                return false;
            }
            if current.state == ConnectionState::UNAUTHORIZED && next.is_disconnected() {
                debug!("Ignoring transition to {} while unauthorized", next);
                return false;
            }
            current.state = next;
        }

        for listener in self.listeners.snapshot() {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(next))).is_err() {
                error!("State listener panicked on transition to {}", next);
            }
        }
        true
    }

    /// Register a listener; it is not invoked until the next transition
    pub fn register_listener<L>(&self, listener: L) -> HandlerId
    where
        L: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.listeners.register(Arc::new(listener))
    }

    pub fn unregister_listener(&self, id: HandlerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.count()
    }

    /// Tear down: report `Closed` from now on without notifying anyone, drop
    /// all listeners and ignore further transitions.
    pub(crate) fn dispose(&self) {
        {
            let mut current = self.current.lock();
            current.disposed = true;
            current.state = ConnectionState::CLOSED;
        }
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(manager: &StateManager) -> Arc<Mutex<Vec<ConnectionState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.register_listener(move |state| sink.lock().push(state));
        seen
    }

    #[test]
    fn test_initial_state_and_get_has_no_side_effect() {
        let manager = StateManager::new(ConnectionState::CONNECTING);
        let seen = recorder(&manager);
        assert_eq!(manager.get(), ConnectionState::CONNECTING);
        assert_eq!(manager.get(), ConnectionState::CONNECTING);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_set_notifies_in_registration_order() {
        let manager = StateManager::new(ConnectionState::CONNECTING);
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = order.clone();
            manager.register_listener(move |state| order.lock().push((name, state)));
        }

        assert!(manager.set(ConnectionState::OPEN));
        assert_eq!(
            *order.lock(),
            vec![
                ("a", ConnectionState::OPEN),
                ("b", ConnectionState::OPEN),
                ("c", ConnectionState::OPEN),
            ]
        );
    }

    #[test]
    fn test_unregistered_listener_not_called() {
        let manager = StateManager::new(ConnectionState::CONNECTING);
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let id = manager.register_listener(move |_| *counter.lock() += 1);

        manager.set(ConnectionState::OPEN);
        assert!(manager.unregister_listener(id));
        manager.set(ConnectionState::READY);

        assert_eq!(*seen.lock(), 1);
        assert_eq!(manager.listener_count(), 0);
    }

    #[test]
    fn test_unauthorized_is_sticky() {
        let manager = StateManager::new(ConnectionState::CONNECTING);
        let seen = recorder(&manager);

        assert!(manager.set(ConnectionState::UNAUTHORIZED));
        assert!(!manager.set(ConnectionState::TRANSPORT_ERROR));
        assert!(!manager.set(ConnectionState::CLOSED));
        assert!(!manager.set(ConnectionState::CONNECTING));
        assert_eq!(manager.get(), ConnectionState::UNAUTHORIZED);

        assert!(manager.set(ConnectionState::OPEN));
        assert_eq!(manager.get(), ConnectionState::OPEN);
        assert_eq!(
            *seen.lock(),
            vec![ConnectionState::UNAUTHORIZED, ConnectionState::OPEN]
        );
    }

    #[test]
    fn test_other_disconnected_states_are_superseded() {
        let manager = StateManager::new(ConnectionState::CONNECTING);
        assert!(manager.set(ConnectionState::TRANSPORT_ERROR));
        assert!(manager.set(ConnectionState::CLOSED));
        assert!(manager.set(ConnectionState::CONNECTING));
        assert_eq!(manager.get(), ConnectionState::CONNECTING);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let manager = StateManager::new(ConnectionState::CONNECTING);
        manager.register_listener(|_| panic!("listener bug"));
        let seen = recorder(&manager);

        assert!(manager.set(ConnectionState::OPEN));
        assert_eq!(*seen.lock(), vec![ConnectionState::OPEN]);
    }

    #[test]
    fn test_listener_may_read_state() {
        let manager = Arc::new(StateManager::new(ConnectionState::CONNECTING));
        let observed = Arc::new(Mutex::new(None));
        let (inner, sink) = (manager.clone(), observed.clone());
        manager.register_listener(move |_| *sink.lock() = Some(inner.get()));

        manager.set(ConnectionState::READY);
        assert_eq!(*observed.lock(), Some(ConnectionState::READY));
    }

    #[test]
    fn test_dispose_silences_listeners() {
        let manager = StateManager::new(ConnectionState::FETCHING);
        let seen = recorder(&manager);

        manager.dispose();
        assert_eq!(manager.get(), ConnectionState::CLOSED);
        assert!(!manager.set(ConnectionState::OPEN));
        assert_eq!(manager.get(), ConnectionState::CLOSED);
        assert!(seen.lock().is_empty());
        assert_eq!(manager.listener_count(), 0);
    }
}
