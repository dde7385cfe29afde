//! Observer registry for decoded server events.
//!
//! Observers run on the connection's listen task (see [`ChatListener`] for
//! where `Disconnected` is delivered). A slow observer stalls
//! delivery for everyone on that connection, so callbacks must return quickly
//! and hand heavier work to another task (an unbounded `mpsc` sender is itself
//! a listener for exactly that purpose).

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::codec::ServerEvent;

/// A consumer of server events.
///
/// Events decoded from server lines are delivered on the listen task. The
/// final `Disconnected` is delivered by whoever closed the connection: the
/// listen task when the server went away, or the caller's task when the close
/// came from [`Connection::disconnect`] or a failed write. In the second case
/// the listen loop has already finished, so a listener is never invoked from
/// two tasks at once.
///
/// [`Connection::disconnect`]: crate::Connection::disconnect
pub trait ChatListener: Send + Sync {
    fn on_event(&self, event: &ServerEvent);
}

impl<F> ChatListener for F
where
    F: Fn(&ServerEvent) + Send + Sync,
{
    fn on_event(&self, event: &ServerEvent) {
        self(event)
    }
}

impl ChatListener for mpsc::UnboundedSender<ServerEvent> {
    fn on_event(&self, event: &ServerEvent) {
        if self.send(event.clone()).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}

/// Set of registered observers, identified by the `Arc` they were added with.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn ChatListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener` unless the same handle is already registered.
    pub fn register(&self, listener: Arc<dyn ChatListener>) -> bool {
        let mut listeners = self.lock();
        if listeners.iter().any(|known| same_listener(known, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Removes `listener` if present.
    pub fn unregister(&self, listener: &Arc<dyn ChatListener>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|known| !same_listener(known, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delivers `event` to every listener registered at the time of the call.
    ///
    /// The set is copied before delivery and the lock released, so listeners
    /// may register or unregister (themselves included) from inside
    /// `on_event` without deadlocking or disturbing this round.
    pub fn notify_all(&self, event: &ServerEvent) -> usize {
        let snapshot: Vec<Arc<dyn ChatListener>> = self.lock().clone();
        for listener in &snapshot {
            listener.on_event(event);
        }
        snapshot.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ChatListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Compare data pointers only; vtable pointers for the same type may differ
// between codegen units.
fn same_listener(a: &Arc<dyn ChatListener>, b: &Arc<dyn ChatListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn ChatListener>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener: Arc<dyn ChatListener> = Arc::new(move |_: &ServerEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn register_is_idempotent() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();

        assert!(registry.register(Arc::clone(&listener)));
        assert!(!registry.register(Arc::clone(&listener)));
        assert_eq!(registry.len(), 1);

        registry.notify_all(&ServerEvent::Disconnected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_listeners_are_not_notified() {
        let registry = ListenerRegistry::new();
        let (kept_count, kept) = counter();
        let (removed_count, removed) = counter();
        registry.register(kept);
        registry.register(Arc::clone(&removed));

        assert!(registry.unregister(&removed));
        assert!(!registry.unregister(&removed));
        assert_eq!(registry.notify_all(&ServerEvent::Disconnected), 1);

        assert_eq!(kept_count.load(Ordering::SeqCst), 1);
        assert_eq!(removed_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_can_unregister_another_during_delivery() {
        let registry = Arc::new(ListenerRegistry::new());
        let (victim_count, victim) = counter();

        let registry_ref = Arc::clone(&registry);
        let victim_ref = Arc::clone(&victim);
        let remover: Arc<dyn ChatListener> = Arc::new(move |_: &ServerEvent| {
            registry_ref.unregister(&victim_ref);
        });

        registry.register(remover);
        registry.register(victim);

        // The snapshot taken for the first event still includes the victim.
        assert_eq!(registry.notify_all(&ServerEvent::Disconnected), 2);
        assert_eq!(victim_count.load(Ordering::SeqCst), 1);

        assert_eq!(registry.notify_all(&ServerEvent::Disconnected), 1);
        assert_eq!(victim_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_unregister_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<dyn ChatListener>>>> = Arc::new(Mutex::new(None));

        let registry_ref = Arc::clone(&registry);
        let slot_ref = Arc::clone(&slot);
        let seen = Arc::clone(&count);
        let once: Arc<dyn ChatListener> = Arc::new(move |_: &ServerEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = slot_ref.lock().unwrap().take() {
                registry_ref.unregister(&me);
            }
        });
        *slot.lock().unwrap() = Some(Arc::clone(&once));
        registry.register(once);

        registry.notify_all(&ServerEvent::Disconnected);
        registry.notify_all(&ServerEvent::Disconnected);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn channel_sender_forwards_events() {
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(Arc::new(tx));

        let event = ServerEvent::UserList {
            usernames: vec!["alice".into()],
        };
        registry.notify_all(&event);

        assert_eq!(rx.recv().await, Some(event));
    }
}
