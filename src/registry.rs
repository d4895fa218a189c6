//! Namespace tree over a shared remote client.
//!
//! A [`Namespace`] is a node in a lazily-materialized tree of named
//! channels. All nodes share one underlying remote client; each node owns
//! at most one [`ConnectionBridge`] and fans lifecycle operations (attach,
//! close) out to its whole subtree. Parents hold strong references to
//! children, never the reverse.
//!
//! # Example
//!
//! ```ignore
//! let root = Namespace::root("", Arc::new(JsonCodec));
//! let chat = root.of(DEFAULT_NAMESPACE);
//!
//! chat.on(CONNECTION_EVENT, listener(|_args, _ack| async move {
//!     // client attached
//! }));
//!
//! root.attach_client(client).await?;
//! chat.emit("ping", vec![json!(1)]).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::bridge::ConnectionBridge;
use crate::client::RemoteDebugClient;
use crate::codec::Codec;
use crate::emitter::{EventEmitter, Listener, ListenerId};
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Default namespace suffix.
pub const DEFAULT_NAMESPACE: &str = "/default";

/// Event dispatched locally after a client is attached to a node.
pub const CONNECTION_EVENT: &str = "connection";

// ============================================================================
// Namespace
// ============================================================================

/// Shared namespace-node state.
struct NamespaceInner {
    /// Full path of this node (prefix plus applied suffixes).
    path: String,
    /// Envelope codec, shared by the whole tree.
    codec: Arc<dyn Codec>,
    /// Scope-local listener registry; usable before a client attaches and
    /// shared with the node's bridge once one exists.
    emitter: Arc<EventEmitter>,
    /// Children keyed by their full path. Created lazily, never removed.
    children: Mutex<FxHashMap<String, Namespace>>,
    /// The node's bridge, present while a client is attached.
    bridge: Mutex<Option<ConnectionBridge>>,
}

/// A node in the namespace tree.
///
/// Cheap to clone; clones refer to the same node.
pub struct Namespace {
    inner: Arc<NamespaceInner>,
}

impl Clone for Namespace {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("path", &self.inner.path)
            .field("connected", &self.connected())
            .field("children", &self.inner.children.lock().len())
            .finish_non_exhaustive()
    }
}

impl Namespace {
    /// Creates a root node with the given path prefix.
    ///
    /// The prefix may be empty; child paths are built by order-sensitive
    /// concatenation of [`of`](Self::of) suffixes onto it.
    #[must_use]
    pub fn root(prefix: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        Self::node(prefix.into(), codec)
    }

    fn node(path: String, codec: Arc<dyn Codec>) -> Self {
        Self {
            inner: Arc::new(NamespaceInner {
                path,
                codec,
                emitter: Arc::new(EventEmitter::new()),
                children: Mutex::new(FxHashMap::default()),
                bridge: Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// Namespace - Tree Navigation
// ============================================================================

impl Namespace {
    /// Returns the child namespace at `path + suffix`, creating it on
    /// first access.
    ///
    /// Identity-stable: the same suffix always yields the same node for
    /// the life of this parent. A child created after a client was
    /// attached stays unattached until the next
    /// [`attach_client`](Self::attach_client).
    pub fn of(&self, suffix: &str) -> Namespace {
        let path = format!("{}{}", self.inner.path, suffix);
        let mut children = self.inner.children.lock();
        children
            .entry(path.clone())
            .or_insert_with(|| {
                trace!(%path, "Creating namespace");
                Namespace::node(path.clone(), Arc::clone(&self.inner.codec))
            })
            .clone()
    }

    /// Accepted for API parity with room-based broadcast models; performs
    /// no partitioning and returns this namespace unchanged.
    #[must_use]
    pub fn to(&self, room: &str) -> Namespace {
        trace!(namespace = %self.inner.path, room, "to is a no-op; rooms are not modeled");
        self.clone()
    }

    /// Returns the full path of this node.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }
}

// ============================================================================
// Namespace - Client Lifecycle
// ============================================================================

impl Namespace {
    /// Attaches a remote client to this node and its whole subtree.
    ///
    /// Builds this node's bridge, recursively attaches the same client to
    /// every already-created child, then dispatches [`CONNECTION_EVENT`]
    /// locally.
    ///
    /// Precondition: call at most once per node per client; a second call
    /// replaces the bridge without closing the first, which leaks its
    /// notification subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`](crate::Error::Client) if bridge
    /// initialization fails anywhere in the subtree.
    pub async fn attach_client(&self, client: Arc<dyn RemoteDebugClient>) -> Result<()> {
        debug!(namespace = %self.inner.path, "Attaching remote client");

        let bridge = ConnectionBridge::attach(
            Arc::clone(&client),
            self.inner.path.clone(),
            Arc::clone(&self.inner.codec),
            Arc::clone(&self.inner.emitter),
        )
        .await?;
        *self.inner.bridge.lock() = Some(bridge);

        let children: Vec<Namespace> = self.inner.children.lock().values().cloned().collect();
        for child in children {
            Box::pin(child.attach_client(Arc::clone(&client))).await?;
        }

        self.inner
            .emitter
            .dispatch(CONNECTION_EVENT, vec![], None)
            .await;
        Ok(())
    }

    /// Returns `true` while this node holds a connected bridge.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.inner
            .bridge
            .lock()
            .as_ref()
            .is_some_and(ConnectionBridge::connected)
    }

    /// Closes this node's bridge and recurses into every child.
    ///
    /// Listeners are cleared along with the bridge. Safe to call on a node
    /// that never had a client attached.
    pub fn close(&self) {
        if let Some(bridge) = self.inner.bridge.lock().take() {
            bridge.close();
        } else {
            self.inner.emitter.clear();
        }

        let children: Vec<Namespace> = self.inner.children.lock().values().cloned().collect();
        for child in children {
            child.close();
        }
    }

    /// Disconnects remote peers for this subtree.
    ///
    /// Currently identical to [`close`](Self::close); no separate
    /// keep-structure teardown exists yet.
    pub fn disconnect_clients(&self) {
        self.close();
    }
}

// ============================================================================
// Namespace - Events
// ============================================================================

impl Namespace {
    /// Registers a scope-local listener.
    ///
    /// Usable before a client is attached; inbound events from the bridge
    /// and [`CONNECTION_EVENT`] both dispatch here.
    pub fn on(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.inner.emitter.on(event, listener)
    }

    /// Registers a one-shot scope-local listener.
    pub fn once(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.inner.emitter.once(event, listener)
    }

    /// Removes a listener.
    pub fn off(&self, event: &str, id: ListenerId) {
        self.inner.emitter.off(event, id);
    }

    /// Sends an event to the page through this node's bridge.
    ///
    /// Silently dropped when no client is attached; not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the envelope cannot
    /// be encoded.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        let bridge = self.inner.bridge.lock().clone();
        match bridge {
            Some(bridge) => bridge.send_remote(event, args).await,
            None => {
                trace!(namespace = %self.inner.path, event, "No client attached; emit dropped");
                Ok(())
            }
        }
    }

    /// Sends an event with a one-shot acknowledgement callback.
    ///
    /// Like [`emit`](Self::emit), silently dropped when unattached; the
    /// callback is then never registered.
    ///
    /// # Errors
    ///
    /// Same as [`emit`](Self::emit).
    pub async fn emit_with_ack(&self, event: &str, args: Vec<Value>, ack: Listener) -> Result<()> {
        let bridge = self.inner.bridge.lock().clone();
        match bridge {
            Some(bridge) => bridge.send_remote_with_ack(event, args, ack).await,
            None => {
                trace!(namespace = %self.inner.path, event, "No client attached; emit dropped");
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
