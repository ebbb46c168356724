//=========================================================================
// Message Bus
//=========================================================================
//
// Typed publish/subscribe queue with explicit delivery.
//
// Architecture:
//   any thread ── publish<M>() ──► ordered buffer [Packet<M>, ...]
//                                        │
//   process() ── take buffer ────────────┘
//        └─► for each message, in publish order:
//              handlers registered for TypeId::of::<M>() (registration order)
//
// Pattern: publish (N producers) → process (one drain) → buffer empty
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, trace};
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::envelope::{Envelope, Packet};
use crate::error::panic_message;

//=== Public API ==========================================================

/// Marker trait for types that can be sent through the MessageBus.
///
/// Automatically implemented for all types that are Send + 'static.
pub trait Message: Send + 'static {}

// Blanket implementation
impl<T: Send + 'static> Message for T {}

/// Built-in message asking the host to shut down.
///
/// The context subscribes to this kind at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quit;

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

//=========================================================================

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

/// Publish/subscribe queue keyed by message type.
///
/// Publishing only buffers; nothing reaches subscribers until `process`
/// is called. Handlers run outside the bus locks, so they may publish
/// follow-up messages (delivered by the next `process`).
pub struct MessageBus {
    buffer: Mutex<Vec<Box<dyn Envelope>>>,
    subscribers: Mutex<HashMap<TypeId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl MessageBus {
    /// Creates a new empty message bus.
    pub fn new() -> Self {
        MessageBus {
            buffer: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    //--- Subscriptions ----------------------------------------------------

    /// Registers `handler` for messages of type `M`.
    pub fn subscribe<M, F>(&self, handler: F) -> SubscriptionId
    where
        M: Message,
        F: Fn(&M) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(move |payload: &dyn Any| {
            if let Some(message) = payload.downcast_ref::<M>() {
                handler(message);
            }
        });

        self.subscribers
            .lock()
            .entry(TypeId::of::<M>())
            .or_default()
            .push(Subscriber { id, handler });

        id
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        for list in subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    //--- Message Operations -----------------------------------------------

    /// Buffers a message for the next `process` call.
    pub fn publish<M: Message>(&self, msg: M) {
        self.buffer.lock().push(Box::new(Packet(msg)));
    }

    /// Delivers every buffered message, in publish order, to the handlers
    /// registered for its type, then leaves the buffer empty.
    ///
    /// A panicking handler is logged and skipped; delivery continues.
    /// Returns the number of messages drained.
    pub fn process(&self) -> usize {
        let messages = {
            let mut buffer = self.buffer.lock();
            let capacity = buffer.capacity();
            mem::replace(&mut *buffer, Vec::with_capacity(capacity))
        };
        if messages.is_empty() {
            return 0;
        }

        let subscribers = self.subscribers.lock().clone();

        for message in &messages {
            let Some(handlers) = subscribers.get(&message.kind()) else {
                trace!(target: "messages", "No subscribers for {}", message.kind_name());
                continue;
            };

            for subscriber in handlers {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    (subscriber.handler)(message.payload())
                }));
                if let Err(payload) = outcome {
                    error!(
                        target: "messages",
                        "Subscriber for {} panicked: {}",
                        message.kind_name(),
                        panic_message(payload)
                    );
                }
            }
        }

        messages.len()
    }

    //--- Query API --------------------------------------------------------

    /// Returns true if there are any messages of type M buffered.
    pub fn has_messages<M: Message>(&self) -> bool {
        self.count::<M>() > 0
    }

    /// Returns the number of messages of type M currently buffered.
    pub fn count<M: Message>(&self) -> usize {
        let kind = TypeId::of::<M>();
        self.buffer.lock().iter().filter(|m| m.kind() == kind).count()
    }

    /// Total number of buffered messages of every type.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of handlers registered for type M.
    pub fn subscriber_count<M: Message>(&self) -> usize {
        self.subscribers
            .lock()
            .get(&TypeId::of::<M>())
            .map_or(0, Vec::len)
    }

    /// Drops every buffered message without delivering it.
    pub fn clear_all(&self) {
        self.buffer.lock().clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================
