//! In-process message bus.
//!
//! Components register a [`Deliver`] handler under a [`SubscriberId`];
//! [`MessageBus::post`] looks up the envelope's destination and runs that
//! handler synchronously on the caller's thread. The bus never queues,
//! retries or drops: a post either reaches exactly one handler or returns
//! a typed [`BusError`].
//!
//! Dispatch is guarded per thread. Posting to a destination whose handler
//! is already running further up the same call stack, or nesting deeper
//! than [`MAX_DISPATCH_DEPTH`], fails with [`BusError::ReentrantDispatch`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::consts::MAX_DISPATCH_DEPTH;
use crate::envelope::{Envelope, SubscriberId};

/// Error types for bus registration and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Subscriber ids must be non-empty.
    #[error("Subscriber id must not be empty")]
    InvalidSubscriberId,

    /// No handler is registered for the envelope's destination.
    #[error("No subscriber registered under '{id}'")]
    UnknownDestination {
        /// Destination that was looked up.
        id: String,
    },

    /// The destination is already being dispatched on this thread.
    #[error("Re-entrant dispatch to '{id}' at depth {depth}")]
    ReentrantDispatch {
        /// Destination of the refused post.
        id: String,
        /// Dispatch depth on the current thread when the post was refused.
        depth: usize,
    },

    /// The destination's inbox is full and its policy is to reject.
    #[error("Inbox of '{id}' is full")]
    QueueFull {
        /// Destination whose inbox is saturated.
        id: String,
    },

    /// The destination's consumer is gone.
    #[error("Inbox of '{id}' is closed")]
    Closed {
        /// Destination whose consumer stopped.
        id: String,
    },
}

/// Delivery handler registered on the bus.
///
/// Implemented for any `Fn(Envelope) -> Result<(), BusError>` closure.
pub trait Deliver: Send + Sync {
    /// Accept one envelope. Errors propagate back to the poster.
    fn deliver(&self, envelope: Envelope) -> Result<(), BusError>;
}

impl<F> Deliver for F
where
    F: Fn(Envelope) -> Result<(), BusError> + Send + Sync,
{
    fn deliver(&self, envelope: Envelope) -> Result<(), BusError> {
        self(envelope)
    }
}

static NEXT_BUS_INSTANCE: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// (bus instance, destination) pairs currently being dispatched on this thread.
    static DISPATCH_STACK: RefCell<Vec<(u64, SubscriberId)>> = const { RefCell::new(Vec::new()) };
}

/// Pops its dispatch stack entry on drop, including on unwind.
struct DispatchGuard;

impl DispatchGuard {
    fn enter(instance: u64, id: &SubscriberId) -> Result<Self, BusError> {
        DISPATCH_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let depth = stack.len();
            let nested = stack.iter().any(|(bus, dest)| *bus == instance && dest == id);
            if nested || depth >= MAX_DISPATCH_DEPTH {
                return Err(BusError::ReentrantDispatch {
                    id: id.to_string(),
                    depth,
                });
            }
            stack.push((instance, id.clone()));
            Ok(DispatchGuard)
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Single-process, single-hop envelope router.
///
/// The registration table sits behind a read/write lock so late
/// registrations are safe; handlers are cloned out of the table before
/// they run, so a handler may itself register or post elsewhere.
pub struct MessageBus {
    instance: u64,
    registrants: RwLock<HashMap<SubscriberId, Arc<dyn Deliver>>>,
}

impl MessageBus {
    /// Create a bus with an empty registration table.
    pub fn new() -> Self {
        Self {
            instance: NEXT_BUS_INSTANCE.fetch_add(1, Ordering::Relaxed),
            registrants: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` under `id`, replacing any previous handler.
    pub fn register<H>(&self, id: SubscriberId, handler: H)
    where
        H: Deliver + 'static,
    {
        let replaced = self
            .registrants
            .write()
            .insert(id.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            debug!("Replaced bus handler for '{}'", id);
        } else {
            debug!("Registered bus handler for '{}'", id);
        }
    }

    /// Remove the handler for `id`. Returns whether one was registered.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        self.registrants.write().remove(id).is_some()
    }

    /// Whether a handler is registered for `id`.
    pub fn is_registered(&self, id: &SubscriberId) -> bool {
        self.registrants.read().contains_key(id)
    }

    /// Currently registered ids, sorted.
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<_> = self.registrants.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Deliver `envelope` to its destination's handler and wait for it to return.
    ///
    /// # Errors
    /// - [`BusError::UnknownDestination`] if nothing is registered for the destination
    ///   (the handler table is left untouched and no handler runs).
    /// - [`BusError::ReentrantDispatch`] if the destination is already being
    ///   dispatched on this thread or the nesting limit is reached.
    /// - Any error returned by the handler itself.
    pub fn post(&self, envelope: Envelope) -> Result<(), BusError> {
        let handler = self
            .registrants
            .read()
            .get(envelope.destination())
            .cloned()
            .ok_or_else(|| BusError::UnknownDestination {
                id: envelope.destination().to_string(),
            })?;

        let _guard = DispatchGuard::enter(self.instance, envelope.destination())?;
        debug!(
            "Dispatch to '{}' from '{}'",
            envelope.destination(),
            envelope.source()
        );
        handler.deliver(envelope)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("instance", &self.instance)
            .field("subscribers", &self.subscribers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;
    use std::sync::Weak;
    use std::sync::atomic::AtomicUsize;

    fn id(s: &str) -> SubscriberId {
        SubscriberId::new(s).unwrap()
    }

    fn text(to: &str, from: &str, body: &str) -> Envelope {
        Envelope::new(id(to), id(from), Payload::Text(body.to_string()))
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> impl Deliver + 'static {
        move |_env: Envelope| -> Result<(), BusError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_post_invokes_registered_handler_once() {
        let bus = MessageBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        bus.register(id("A"), counting_handler(a.clone()));
        bus.register(id("B"), counting_handler(b.clone()));

        bus.post(text("B", "A", "hello")).unwrap();

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_returns_after_handler_completes() {
        let bus = MessageBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.register(id("B"), move |env: Envelope| -> Result<(), BusError> {
            std::thread::sleep(std::time::Duration::from_millis(20));
            sink.lock().push(env);
            Ok(())
        });

        let env = text("B", "A", "sync");
        bus.post(env.clone()).unwrap();
        assert_eq!(seen.lock().as_slice(), &[env]);
    }

    #[test]
    fn test_reregistering_replaces_previous_handler() {
        let bus = MessageBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        bus.register(id("B"), counting_handler(first.clone()));
        bus.register(id("B"), counting_handler(second.clone()));

        bus.post(text("B", "A", "x")).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscribers(), vec![id("B")]);
    }

    #[test]
    fn test_unknown_destination_is_an_error() {
        let bus = MessageBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        bus.register(id("A"), counting_handler(a.clone()));

        let result = bus.post(text("nobody", "A", "lost"));

        assert_eq!(
            result,
            Err(BusError::UnknownDestination {
                id: "nobody".to_string()
            })
        );
        assert_eq!(a.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_errors_reach_the_poster() {
        let bus = MessageBus::new();
        bus.register(id("B"), |env: Envelope| -> Result<(), BusError> {
            Err(BusError::QueueFull {
                id: env.destination().to_string(),
            })
        });
        assert_eq!(
            bus.post(text("B", "A", "x")),
            Err(BusError::QueueFull { id: "B".into() })
        );
    }

    #[test]
    fn test_self_post_is_refused() {
        let bus = Arc::new(MessageBus::new());
        let weak: Weak<MessageBus> = Arc::downgrade(&bus);
        let inner_result = Arc::new(parking_lot::Mutex::new(None));
        let slot = inner_result.clone();
        bus.register(id("B"), move |_env: Envelope| -> Result<(), BusError> {
            if let Some(bus) = weak.upgrade() {
                *slot.lock() = Some(bus.post(text("B", "B", "again")));
            }
            Ok(())
        });

        bus.post(text("B", "A", "first")).unwrap();

        assert_eq!(
            *inner_result.lock(),
            Some(Err(BusError::ReentrantDispatch {
                id: "B".into(),
                depth: 1
            }))
        );
        // Stack unwound: the next top-level post works again.
        bus.post(text("B", "A", "second")).unwrap();
    }

    #[test]
    fn test_chained_posts_to_other_destinations_are_allowed() {
        let bus = Arc::new(MessageBus::new());
        let c = Arc::new(AtomicUsize::new(0));
        bus.register(id("C"), counting_handler(c.clone()));
        let weak = Arc::downgrade(&bus);
        bus.register(id("B"), move |_env: Envelope| -> Result<(), BusError> {
            match weak.upgrade() {
                Some(bus) => bus.post(text("C", "B", "forward")),
                None => Ok(()),
            }
        });

        bus.post(text("B", "A", "start")).unwrap();
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_depth_is_bounded() {
        let bus = Arc::new(MessageBus::new());
        let hops = MAX_DISPATCH_DEPTH + 2;
        for n in 0..hops {
            let weak = Arc::downgrade(&bus);
            let next = format!("hop{}", n + 1);
            bus.register(id(&format!("hop{n}")), move |_env: Envelope| -> Result<(), BusError> {
                match weak.upgrade() {
                    Some(bus) if bus.is_registered(&id(&next)) => {
                        bus.post(text(&next, "chain", "deeper"))
                    }
                    _ => Ok(()),
                }
            });
        }

        let result = bus.post(text("hop0", "test", "go"));
        assert!(matches!(
            result,
            Err(BusError::ReentrantDispatch { depth, .. }) if depth == MAX_DISPATCH_DEPTH
        ));
    }

    #[test]
    fn test_separate_buses_do_not_share_guard_state() {
        let outer = Arc::new(MessageBus::new());
        let inner = Arc::new(MessageBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        inner.register(id("B"), counting_handler(hits.clone()));
        let inner_ref = inner.clone();
        outer.register(id("B"), move |_env: Envelope| -> Result<(), BusError> {
            inner_ref.post(text("B", "outer", "bridge"))
        });

        outer.post(text("B", "A", "go")).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_removes_handler() {
        let bus = MessageBus::new();
        bus.register(id("B"), counting_handler(Arc::new(AtomicUsize::new(0))));
        assert!(bus.unregister(&id("B")));
        assert!(!bus.unregister(&id("B")));
        assert!(matches!(
            bus.post(text("B", "A", "x")),
            Err(BusError::UnknownDestination { .. })
        ));
    }
}
