//! Change notification fan-out for manager state.
//!
//! Consumers register a [`ChangeListener`] to hear about installation
//! status, activity, and connection changes; the manager fires the set
//! after each committed change.

use std::sync::{Arc, Mutex, PoisonError};

/// Observer notified after installation status, activity, or the connection
/// set changes.
///
/// Callbacks run synchronously on whichever thread committed the change and
/// must return promptly.
pub trait ChangeListener: Send + Sync {
    /// Invoked after a state change has been committed.
    fn state_changed(&self);
}

impl<T> ChangeListener for Arc<T>
where
    T: ChangeListener,
{
    fn state_changed(&self) {
        (**self).state_changed();
    }
}

/// Registered listeners, notified outside any manager lock.
///
/// Notification snapshots the list first, so a callback may register
/// further listeners or call back into the manager without deadlocking.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn ChangeListener>>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn ChangeListener>) {
        self.guard().push(listener);
    }

    pub(crate) fn notify(&self) {
        let snapshot: Vec<_> = self.guard().clone();
        for listener in snapshot {
            listener.state_changed();
        }
    }

    // The stored list is plain data, so a poisoned lock carries no torn
    // invariants and can be recovered.
    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ChangeListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicUsize,
    }

    impl ChangeListener for CountingListener {
        fn state_changed(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn notify_reaches_every_listener() {
        let set = ListenerSet::default();
        let first = Arc::new(CountingListener::default());
        let second = Arc::new(CountingListener::default());
        set.add(Arc::clone(&first) as Arc<dyn ChangeListener>);
        set.add(Arc::clone(&second) as Arc<dyn ChangeListener>);

        set.notify();
        set.notify();

        assert_eq!(first.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_set_notifies_nothing() {
        ListenerSet::default().notify();
    }
}
