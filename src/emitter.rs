//! Local event fan-out.
//!
//! This is the true in-process listener machinery, deliberately separate
//! from remote delivery: [`EventEmitter::dispatch`] invokes local listeners
//! only, while sending to the page goes through
//! [`ConnectionBridge::send_remote`](crate::ConnectionBridge::send_remote).
//!
//! Listeners receive the event arguments plus an optional [`AckHandle`]
//! that, when invoked, routes an acknowledgement back to the peer that
//! produced the event.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
///
/// Receives the event arguments and, for events originating from the remote
/// peer, an [`AckHandle`] for replying. Use [`listener`] to build one from
/// an async closure.
pub type Listener = Arc<dyn Fn(Vec<Value>, Option<AckHandle>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Reply function backing an [`AckHandle`].
type ReplyFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps an async closure into a [`Listener`].
///
/// # Example
///
/// ```ignore
/// ns.on("greet", listener(|args, ack| async move {
///     if let Some(ack) = ack {
///         let _ = ack.send(vec!["ok".into()]).await;
///     }
/// }));
/// ```
pub fn listener<F, Fut>(f: F) -> Listener
where
    F: Fn(Vec<Value>, Option<AckHandle>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |args, ack| Box::pin(f(args, ack)))
}

// ============================================================================
// ListenerId
// ============================================================================

/// Identifier for a registered listener, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// ============================================================================
// AckHandle
// ============================================================================

/// One-shot acknowledgement channel handed to listeners.
///
/// Invoking [`send`](Self::send) routes the given arguments back to the
/// peer under the acknowledgement-event id of the originating emit. The
/// handle stays valid for as long as the bridge that produced it; sending
/// after the bridge closed is a silent no-op.
#[derive(Clone)]
pub struct AckHandle {
    ack_event: String,
    reply: ReplyFn,
}

impl AckHandle {
    /// Creates a handle that replies through the given function.
    pub(crate) fn new(ack_event: impl Into<String>, reply: ReplyFn) -> Self {
        Self {
            ack_event: ack_event.into(),
            reply,
        }
    }

    /// Returns the acknowledgement-event id this handle replies under.
    #[inline]
    #[must_use]
    pub fn ack_event(&self) -> &str {
        &self.ack_event
    }

    /// Sends the acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the reply arguments
    /// cannot be encoded.
    pub async fn send(&self, args: Vec<Value>) -> Result<()> {
        (self.reply)(args).await
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("ack_event", &self.ack_event)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Registered listener entry.
struct Entry {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

/// Local listener registry with async fan-out.
///
/// # Thread Safety
///
/// All operations are non-blocking; the internal lock is never held across
/// an await point.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<FxHashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    /// Creates an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for an event.
    pub fn on(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.register(event.into(), listener, false)
    }

    /// Registers a one-shot listener, removed before its first invocation
    /// is awaited.
    pub fn once(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.register(event.into(), listener, true)
    }

    fn register(&self, event: String, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push(Entry { id, once, listener });
        id
    }

    /// Removes a single listener.
    ///
    /// Unknown ids are ignored.
    pub fn off(&self, event: &str, id: ListenerId) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(event) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                listeners.remove(event);
            }
        }
    }

    /// Removes all listeners for all events.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Returns the number of listeners registered for an event.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .get(event)
            .map_or(0, |entries| entries.len())
    }

    /// Invokes every listener registered for `event` in registration order.
    ///
    /// One-shot listeners are removed from the registry before any future
    /// is awaited, so an immediate re-dispatch cannot fire them twice.
    /// Returns the number of listeners invoked.
    pub async fn dispatch(&self, event: &str, args: Vec<Value>, ack: Option<AckHandle>) -> usize {
        let callbacks: Vec<Listener> = {
            let mut listeners = self.listeners.lock();
            let Some(entries) = listeners.get_mut(event) else {
                return 0;
            };
            let callbacks = entries
                .iter()
                .map(|entry| Arc::clone(&entry.listener))
                .collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                listeners.remove(event);
            }
            callbacks
        };

        trace!(event, count = callbacks.len(), "Dispatching local event");

        let count = callbacks.len();
        for callback in callbacks {
            callback(args.clone(), ack.clone()).await;
        }
        count
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("events", &self.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
