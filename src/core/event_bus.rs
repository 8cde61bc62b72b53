//! Ordered pub/sub bus, one per Group.
//!
//! Architecture:
//! - Observers subscribe to event types with callbacks (immediate invocation)
//! - emit() stamps a sequence number, invokes callbacks, then queues the event
//! - poll() returns queued events in emission order for batch processing
//!
//! Sequence numbers are strictly increasing per bus, so a test (or a client
//! replaying the queue) can check that a selection change never overtakes the
//! structural event that caused it.
//!
//! Callback order: FIFO (first-subscribed, first-called) within same event type.

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::warn;

/// Default bound on queued events before the oldest are evicted.
pub const DEFAULT_QUEUE_BOUND: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(u64, &dyn Any) + Send + Sync>;

pub type BoxedEvent = Box<dyn Event>;

/// Queued event with its position in the bus order.
pub struct Envelope {
    pub seq: u64,
    pub event: BoxedEvent,
}

impl Envelope {
    /// Downcast to a concrete event type.
    pub fn get<E: Event>(&self) -> Option<&E> {
        downcast_event::<E>(&self.event)
    }

    pub fn type_name(&self) -> &'static str {
        (*self.event).type_name()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("seq", &self.seq)
            .field("type", &self.type_name())
            .finish()
    }
}

struct Shared {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<VecDeque<Envelope>>,
    next_seq: AtomicU64,
    bound: usize,
}

/// Per-Group event bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_BOUND)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queue_len", &self.queue_len())
            .field("next_seq", &self.shared.next_seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventBus {
    pub fn new(bound: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                subscribers: RwLock::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                next_seq: AtomicU64::new(0),
                bound: bound.max(1),
            }),
        }
    }

    /// Subscribe to events of type E. The callback receives the sequence
    /// number together with the event.
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(u64, &E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |seq, any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(seq, event);
            }
        });
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Emit: assign the next sequence number, invoke callbacks, queue.
    /// Returns the sequence number.
    pub fn emit<E: Event>(&self, event: E) -> u64 {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);

        // Clone the callback list so a callback may subscribe without deadlock
        let callbacks: Vec<Callback> = self
            .shared
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();
        for cb in &callbacks {
            cb(seq, &event);
        }

        let mut queue = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.shared.bound {
            let evict_count = (queue.len() / 2).max(1);
            warn!(
                "EventBus queue full ({} events), evicting oldest {}",
                queue.len(),
                evict_count
            );
            queue.drain(0..evict_count);
        }
        queue.push_back(Envelope {
            seq,
            event: Box::new(event),
        });
        seq
    }

    /// Drain all queued events in emission order.
    pub fn poll(&self) -> Vec<Envelope> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    pub fn unsubscribe_all<E: Event>(&self) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    /// Drop all subscribers and queued events. Sequence numbering continues.
    pub fn clear(&self) {
        self.shared.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Downcast a boxed event to a concrete type.
///
/// Must deref to `dyn Event` before `as_any()`: the blanket impl would
/// otherwise match `Box<dyn Event>` itself and the downcast always fails.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
