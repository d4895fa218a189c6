//! Per-namespace connection bridge.
//!
//! [`ConnectionBridge`] is the protocol-to-event-bus adapter: it synthesizes
//! a bidirectional, event-based channel for one namespace out of the narrow
//! CDP primitive set (domain enable, binding registration, binding-called
//! notifications, script evaluation).
//!
//! # Wire Mechanics
//!
//! - **Outbound**: the envelope is encoded, escaped, and embedded in a
//!   script that hands it to the page global `"<socket-prefix>-<namespace>"`
//!   if one exists. Delivery is best-effort and fire-and-forget.
//! - **Inbound**: page script calls the registered binding
//!   `"<sender-prefix>-<namespace>"`; the resulting notification is filtered
//!   by binding name, decoded, and replayed as a local event with an
//!   [`AckHandle`] appended.
//!
//! Sending to the page and dispatching locally are two distinct operations
//! ([`send_remote`](ConnectionBridge::send_remote) vs
//! [`dispatch_local`](ConnectionBridge::dispatch_local)); neither shadows
//! the other.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::client::{
    BindingCalled, RUNTIME_ADD_BINDING, RUNTIME_BINDING_CALLED, RUNTIME_ENABLE, RUNTIME_EVALUATE,
    RemoteDebugClient, SubscriptionId,
};
use crate::codec::{Codec, Envelope, escape_script_literal};
use crate::emitter::{AckHandle, EventEmitter, Listener, ListenerId};
use crate::error::Result;

// ============================================================================
// Naming
// ============================================================================

/// Prefix of the page-callable binding registered per namespace.
pub const SENDER_BINDING_PREFIX: &str = "cdp-socket-sender";

/// Prefix of the page global the injected script delivers to.
pub const PAGE_SOCKET_PREFIX: &str = "cdp-socket-page";

/// Returns the binding name for a namespace.
///
/// Unique per namespace per remote client; two namespaces never share one.
#[inline]
#[must_use]
pub fn binding_name(namespace: &str) -> String {
    format!("{SENDER_BINDING_PREFIX}-{namespace}")
}

/// Returns the name of the page global for a namespace.
#[inline]
#[must_use]
pub fn page_socket_name(namespace: &str) -> String {
    format!("{PAGE_SOCKET_PREFIX}-{namespace}")
}

/// Builds the injected delivery script for an encoded payload.
///
/// The page global may legitimately be absent (page not yet initialized,
/// navigated away); the script then does nothing and the message is
/// skipped.
fn build_send_script(namespace: &str, payload: &str) -> String {
    format!(
        "(() => {{ const sock = globalThis['{global}']; \
         if (sock && typeof sock.send === 'function') {{ sock.send('{payload}'); }} }})()",
        global = page_socket_name(namespace),
        payload = escape_script_literal(payload),
    )
}

// ============================================================================
// BridgeInner
// ============================================================================

/// Shared bridge state.
struct BridgeInner {
    /// Remote client handle; `None` once the bridge is closed. The handle
    /// is shared with sibling bridges, never owned exclusively.
    client: Mutex<Option<Arc<dyn RemoteDebugClient>>>,
    /// Namespace this bridge serves.
    namespace: String,
    /// Binding name derived from the namespace, compared against every
    /// incoming notification.
    binding_name: String,
    /// Execution context observed on the last inbound call, targeted by the
    /// next outbound evaluation. Last-writer-wins.
    execution_context: Mutex<Option<u64>>,
    /// Local listener registry, shared with the owning namespace.
    emitter: Arc<EventEmitter>,
    /// Envelope codec.
    codec: Arc<dyn Codec>,
    /// Notification subscription, released exactly once on close.
    subscription: Mutex<Option<SubscriptionId>>,
}

impl BridgeInner {
    /// Handles a raw `Runtime.bindingCalled` notification.
    async fn handle_binding_called(self: Arc<Self>, params: Value) {
        let notification: BindingCalled = match serde_json::from_value(params) {
            Ok(notification) => notification,
            Err(error) => {
                warn!(%error, "Malformed bindingCalled notification");
                return;
            }
        };

        // One client carries many bridges; anything addressed to a sibling
        // namespace is routine filtering, not an error.
        if notification.name != self.binding_name {
            trace!(
                namespace = %self.namespace,
                binding = %notification.name,
                "Ignoring invocation for foreign binding"
            );
            return;
        }

        if self.client.lock().is_none() {
            return;
        }

        *self.execution_context.lock() = Some(notification.execution_context_id);

        let envelope = match self.codec.decode(&notification.payload).await {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    namespace = %self.namespace,
                    %error,
                    "Dropping undecodable payload"
                );
                return;
            }
        };

        debug!(
            namespace = %self.namespace,
            event = %envelope.event,
            context = notification.execution_context_id,
            "Inbound event"
        );

        let ack = Self::ack_handle(&self, &envelope.ack_event);
        self.emitter
            .dispatch(&envelope.event, envelope.args, Some(ack))
            .await;
    }

    /// Builds the acknowledgement handle for an inbound envelope.
    ///
    /// Invoking it re-enters [`send_remote`](Self::send_remote) with the
    /// ack-event id as the event name, completing the round trip. The
    /// handle holds the bridge weakly; after close it becomes a no-op.
    fn ack_handle(this: &Arc<Self>, ack_event: &str) -> AckHandle {
        let weak: Weak<Self> = Arc::downgrade(this);
        let reply_event = ack_event.to_string();
        AckHandle::new(
            ack_event,
            Arc::new(move |args: Vec<Value>| {
                let weak = weak.clone();
                let event = reply_event.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(inner) => inner.send_remote(&event, args, None).await,
                        None => Ok(()),
                    }
                })
            }),
        )
    }

    /// Delivers an event to the page.
    ///
    /// A fresh ack-event id is generated for every send; when `ack` is
    /// supplied it is registered as a one-shot listener under that id
    /// strictly before the evaluation is dispatched.
    async fn send_remote(&self, event: &str, args: Vec<Value>, ack: Option<Listener>) -> Result<()> {
        let Some(client) = self.client.lock().clone() else {
            trace!(namespace = %self.namespace, event, "Bridge closed; dropping send");
            return Ok(());
        };

        let ack_event = format!("{event}-{}", Uuid::new_v4());
        if let Some(ack) = ack {
            self.emitter.once(ack_event.clone(), ack);
        }

        let envelope = Envelope::new(event, ack_event, args);
        let payload = self.codec.encode(&envelope, &self.namespace).await?;
        let script = build_send_script(&self.namespace, &payload);

        let mut params = json!({ "expression": script });
        if let Some(context) = *self.execution_context.lock() {
            params["contextId"] = json!(context);
        }

        // Best-effort: the page may have navigated away mid-send. The
        // caller never observes evaluation failures.
        if let Err(error) = client.send(RUNTIME_EVALUATE, params).await {
            debug!(
                namespace = %self.namespace,
                event,
                %error,
                "Evaluation failed; message dropped"
            );
        }

        Ok(())
    }
}

// ============================================================================
// ConnectionBridge
// ============================================================================

/// Two-way channel between local listeners and page script, for one
/// namespace.
///
/// # Thread Safety
///
/// `ConnectionBridge` is `Send + Sync` and cheap to clone; clones share
/// state.
pub struct ConnectionBridge {
    inner: Arc<BridgeInner>,
}

impl Clone for ConnectionBridge {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for ConnectionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBridge")
            .field("namespace", &self.inner.namespace)
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}

impl ConnectionBridge {
    /// Attaches a bridge to a remote client for the given namespace.
    ///
    /// Enables the runtime domain, registers the namespace-scoped binding,
    /// and subscribes to binding-called notifications. Must complete before
    /// any send or receive is meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`](crate::Error::Client) if domain enable or
    /// binding registration is rejected.
    pub async fn attach(
        client: Arc<dyn RemoteDebugClient>,
        namespace: impl Into<String>,
        codec: Arc<dyn Codec>,
        emitter: Arc<EventEmitter>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let binding = binding_name(&namespace);

        client.send(RUNTIME_ENABLE, json!({})).await?;
        client
            .send(RUNTIME_ADD_BINDING, json!({ "name": binding }))
            .await?;

        let inner = Arc::new(BridgeInner {
            client: Mutex::new(Some(Arc::clone(&client))),
            namespace: namespace.clone(),
            binding_name: binding,
            execution_context: Mutex::new(None),
            emitter,
            codec,
            subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = client.on(
            RUNTIME_BINDING_CALLED,
            Arc::new(move |params| {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_binding_called(params).await;
                    }
                })
            }),
        );
        *inner.subscription.lock() = Some(subscription);

        debug!(namespace = %inner.namespace, "Bridge attached");
        Ok(Self { inner })
    }
}

// ============================================================================
// ConnectionBridge - Remote Delivery
// ============================================================================

impl ConnectionBridge {
    /// Sends an event to the page, fire-and-forget.
    ///
    /// Returns as soon as the evaluation has been issued; it never waits
    /// for the page to process the message, and evaluation failures are
    /// swallowed. On a closed bridge this is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) only if the envelope
    /// itself cannot be encoded.
    pub async fn send_remote(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.inner.send_remote(event, args, None).await
    }

    /// Sends an event and registers a one-shot acknowledgement callback.
    ///
    /// The callback fires with whatever arguments the page passes to the
    /// synthesized acknowledgement call. If the page never acknowledges,
    /// the callback stays registered for the lifetime of the bridge.
    ///
    /// # Errors
    ///
    /// Same as [`send_remote`](Self::send_remote).
    pub async fn send_remote_with_ack(
        &self,
        event: &str,
        args: Vec<Value>,
        ack: Listener,
    ) -> Result<()> {
        self.inner.send_remote(event, args, Some(ack)).await
    }
}

// ============================================================================
// ConnectionBridge - Local Listeners
// ============================================================================

impl ConnectionBridge {
    /// Registers a listener for inbound events.
    pub fn on(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.inner.emitter.on(event, listener)
    }

    /// Registers a one-shot listener for inbound events.
    pub fn once(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.inner.emitter.once(event, listener)
    }

    /// Removes a listener.
    pub fn off(&self, event: &str, id: ListenerId) {
        self.inner.emitter.off(event, id);
    }

    /// Fans an event out to local listeners without touching the page.
    ///
    /// Returns the number of listeners invoked.
    pub async fn dispatch_local(&self, event: &str, args: Vec<Value>) -> usize {
        self.inner.emitter.dispatch(event, args, None).await
    }
}

// ============================================================================
// ConnectionBridge - Lifecycle
// ============================================================================

impl ConnectionBridge {
    /// Accepted for API parity; rooms are not modeled.
    pub fn join(&self, room: &str) {
        trace!(namespace = %self.inner.namespace, room, "join is a no-op; rooms are not modeled");
    }

    /// Returns `true` while a remote client handle is held.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.inner.client.lock().is_some()
    }

    /// Returns the namespace this bridge serves.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Returns the binding name registered for this bridge.
    #[inline]
    #[must_use]
    pub fn binding_name(&self) -> &str {
        &self.inner.binding_name
    }

    /// Closes the bridge.
    ///
    /// Removes exactly this bridge's notification subscription (sibling
    /// bridges on the same client are unaffected), drops the client handle,
    /// and clears local listeners. Idempotent.
    pub fn close(&self) {
        let client = self.inner.client.lock().take();
        let subscription = self.inner.subscription.lock().take();

        if let (Some(client), Some(subscription)) = (client, subscription) {
            client.off(RUNTIME_BINDING_CALLED, subscription);
        }
        self.inner.emitter.clear();

        debug!(namespace = %self.inner.namespace, "Bridge closed");
    }

    /// Alias for [`close`](Self::close).
    pub fn disconnect(&self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::codec::JsonCodec;
    use crate::emitter::listener;
    use crate::testing::{MockClient, decode_evaluation, payload_of};

    async fn attached_bridge(
        client: &Arc<MockClient>,
        namespace: &str,
    ) -> (ConnectionBridge, Arc<EventEmitter>) {
        let emitter = Arc::new(EventEmitter::new());
        let bridge = ConnectionBridge::attach(
            Arc::clone(client) as Arc<dyn RemoteDebugClient>,
            namespace,
            Arc::new(JsonCodec),
            Arc::clone(&emitter),
        )
        .await
        .expect("attach");
        (bridge, emitter)
    }

    /// Encodes an inbound notification as page script would produce it.
    async fn binding_notification(namespace: &str, envelope: &Envelope, context: u64) -> Value {
        let payload = JsonCodec.encode(envelope, namespace).await.expect("encode");
        json!({
            "name": binding_name(namespace),
            "payload": payload,
            "executionContextId": context,
        })
    }

    #[tokio::test]
    async fn test_attach_initialization_sequence() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let sent = client.sent();
        assert_eq!(sent[0].0, RUNTIME_ENABLE);
        assert_eq!(sent[1].0, RUNTIME_ADD_BINDING);
        assert_eq!(
            sent[1].1["name"].as_str(),
            Some("cdp-socket-sender-/default")
        );
        assert_eq!(client.handler_count(RUNTIME_BINDING_CALLED), 1);
        assert!(bridge.connected());
        assert_eq!(bridge.binding_name(), "cdp-socket-sender-/default");
    }

    #[tokio::test]
    async fn test_send_remote_emits_one_evaluation() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        bridge
            .send_remote("ping", vec![json!(1), json!(2)])
            .await
            .expect("send");

        let evaluations = client.evaluations();
        assert_eq!(evaluations.len(), 1);

        let envelope = decode_evaluation(&evaluations[0]).await;
        assert_eq!(envelope.event, "ping");
        assert!(envelope.ack_event.starts_with("ping-"));
        assert_eq!(envelope.args, vec![json!(1), json!(2)]);

        // No inbound call yet, so no execution context to target.
        assert!(evaluations[0].get("contextId").is_none());
    }

    #[tokio::test]
    async fn test_evaluation_script_guards_page_global() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        bridge.send_remote("ping", vec![]).await.expect("send");

        let expression = client.evaluations()[0]["expression"]
            .as_str()
            .expect("expression")
            .to_string();
        assert!(expression.contains("globalThis['cdp-socket-page-/default']"));
        assert!(expression.contains("typeof sock.send === 'function'"));
    }

    #[tokio::test]
    async fn test_ack_listener_registered_one_shot() {
        let client = MockClient::new();
        let (bridge, emitter) = attached_bridge(&client, "/default").await;

        let received: Arc<parking_lot::Mutex<Vec<Vec<Value>>>> = Arc::default();
        let received_clone = Arc::clone(&received);
        bridge
            .send_remote_with_ack(
                "greet",
                vec![json!("hi")],
                listener(move |args, _ack| {
                    let received = Arc::clone(&received_clone);
                    async move {
                        received.lock().push(args);
                    }
                }),
            )
            .await
            .expect("send");

        let envelope = decode_evaluation(&client.evaluations()[0]).await;
        assert_eq!(emitter.listener_count(&envelope.ack_event), 1);

        // Page acknowledges: an envelope whose event is the ack id.
        let ack = Envelope::new(envelope.ack_event.clone(), "unused-ack", vec![json!("ok")]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/default", &ack, 1).await,
            )
            .await;

        assert_eq!(*received.lock(), vec![vec![json!("ok")]]);
        // One-shot: removed on first invocation.
        assert_eq!(emitter.listener_count(&envelope.ack_event), 0);
    }

    #[tokio::test]
    async fn test_inbound_dispatch_with_ack_roundtrip() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let captured: Arc<parking_lot::Mutex<Option<(Vec<Value>, AckHandle)>>> = Arc::default();
        let captured_clone = Arc::clone(&captured);
        bridge.on(
            "greet",
            listener(move |args, ack| {
                let captured = Arc::clone(&captured_clone);
                async move {
                    *captured.lock() = Some((args, ack.expect("ack handle")));
                }
            }),
        );

        let inbound = Envelope::new("greet", "greet-ackid123", vec![json!("hi")]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/default", &inbound, 7).await,
            )
            .await;

        let (args, ack) = captured.lock().take().expect("listener fired");
        assert_eq!(args, vec![json!("hi")]);
        assert_eq!(ack.ack_event(), "greet-ackid123");

        // Invoking the handle re-enters remote delivery with the ack id as
        // the event name.
        ack.send(vec![json!("ok")]).await.expect("ack send");

        let evaluations = client.evaluations();
        assert_eq!(evaluations.len(), 1);
        let reply = decode_evaluation(&evaluations[0]).await;
        assert_eq!(reply.event, "greet-ackid123");
        assert!(reply.ack_event.starts_with("greet-ackid123-"));
        assert_eq!(reply.args, vec![json!("ok")]);
    }

    #[tokio::test]
    async fn test_inbound_records_execution_context() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let inbound = Envelope::new("greet", "greet-1", vec![]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/default", &inbound, 7).await,
            )
            .await;

        bridge.send_remote("pong", vec![]).await.expect("send");
        let evaluation = client.evaluations().pop().expect("evaluation");
        assert_eq!(evaluation["contextId"].as_u64(), Some(7));
    }

    #[tokio::test]
    async fn test_foreign_binding_is_ignored() {
        let client = MockClient::new();
        let (bridge_a, _ea) = attached_bridge(&client, "/a").await;
        let (_bridge_b, _eb) = attached_bridge(&client, "/b").await;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bridge_a.on(
            "hello",
            listener(move |_args, _ack| {
                let count = Arc::clone(&count_clone);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        // Addressed to /b: must never dispatch on /a's bridge.
        let inbound = Envelope::new("hello", "hello-1", vec![]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/b", &inbound, 1).await,
            )
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let inbound = Envelope::new("hello", "hello-2", vec![]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/a", &inbound, 1).await,
            )
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        bridge.on(
            "greet",
            listener(move |_args, _ack| {
                let fired = Arc::clone(&fired_clone);
                async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        client
            .notify(
                RUNTIME_BINDING_CALLED,
                json!({
                    "name": binding_name("/default"),
                    "payload": "not an envelope",
                    "executionContextId": 3,
                }),
            )
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // The bridge keeps working afterwards.
        let inbound = Envelope::new("greet", "greet-1", vec![]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/default", &inbound, 3).await,
            )
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_removes_subscription_and_stops_dispatch() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        bridge.on(
            "greet",
            listener(move |_args, _ack| {
                let fired = Arc::clone(&fired_clone);
                async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        bridge.close();
        assert!(!bridge.connected());
        assert_eq!(client.handler_count(RUNTIME_BINDING_CALLED), 0);

        // Even a matching invocation replayed by the client must not
        // dispatch anything.
        let inbound = Envelope::new("greet", "greet-1", vec![]);
        client
            .notify(
                RUNTIME_BINDING_CALLED,
                binding_notification("/default", &inbound, 1).await,
            )
            .await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Sends after close are silent no-ops.
        bridge.send_remote("ping", vec![]).await.expect("send");
        assert!(client.evaluations().is_empty());

        // close is idempotent.
        bridge.close();
    }

    #[tokio::test]
    async fn test_dispatch_local_does_not_touch_the_page() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        bridge.on(
            "local",
            listener(move |_args, _ack| {
                let fired = Arc::clone(&fired_clone);
                async move {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        let invoked = bridge.dispatch_local("local", vec![json!(1)]).await;
        assert_eq!(invoked, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(client.evaluations().is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_failure_is_swallowed() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        client.fail_next_send("page navigated away");
        bridge.send_remote("ping", vec![]).await.expect("send");
    }

    #[tokio::test]
    async fn test_join_is_noop() {
        let client = MockClient::new();
        let (bridge, _emitter) = attached_bridge(&client, "/default").await;

        let before = client.sent().len();
        bridge.join("room-1");
        assert_eq!(client.sent().len(), before);
    }

    #[test]
    fn test_payload_extraction_helper() {
        let script = build_send_script("/default", r#"["ping","ping-1",[1,2]]"#);
        assert_eq!(payload_of(&script), r#"["ping","ping-1",[1,2]]"#);
    }
}
