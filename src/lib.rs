//! CDP Socket - socket-style messaging over a remote-debugging connection.
//!
//! This library emulates a bidirectional, event-based, namespace-aware
//! messaging channel between a Rust process and JavaScript running inside a
//! browser page, using only Chrome-DevTools-Protocol-style primitives as
//! transport. No real network socket exists between the two endpoints.
//!
//! # Architecture
//!
//! The bridge synthesizes socket semantics on top of four CDP primitives:
//!
//! - **Runtime.enable**: activates the evaluation/notification domain
//! - **Runtime.addBinding**: registers a page-callable function per namespace
//! - **Runtime.bindingCalled**: the only push-from-page primitive
//! - **Runtime.evaluate**: delivers outbound messages via injected script
//!
//! Key design principles:
//!
//! - One [`ConnectionBridge`] per namespace; many bridges share one client
//! - Binding names are namespace-scoped, filtered per invocation
//! - Local fan-out and remote delivery are distinct operations
//! - Delivery is best-effort and fire-and-forget (no ordering, no retries)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cdp_socket::{
//!     DEFAULT_NAMESPACE, JsonCodec, Namespace, RemoteDebugClient, Result,
//!     listener,
//! };
//! use serde_json::json;
//!
//! async fn run(client: Arc<dyn RemoteDebugClient>) -> Result<()> {
//!     let root = Namespace::root("", Arc::new(JsonCodec));
//!     let chat = root.of(DEFAULT_NAMESPACE);
//!
//!     chat.on("greet", listener(|_args, ack| async move {
//!         if let Some(ack) = ack {
//!             let _ = ack.send(vec![json!("ok")]).await;
//!         }
//!     }));
//!
//!     root.attach_client(client).await?;
//!     chat.emit("ping", vec![json!(1), json!(2)]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Per-namespace protocol-to-event-bus adapter |
//! | [`client`] | Remote debug client contract (consumed boundary) |
//! | [`codec`] | Envelope type and wire codec |
//! | [`emitter`] | Local event fan-out and acknowledgement handles |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`registry`] | Lazily-materialized namespace tree |
//!
//! # Page-Side Contract
//!
//! The page is expected to maintain a global object named
//! `"<socket-prefix>-<namespace>"` exposing a `send(string)` function, and
//! to invoke the registered binding `"<sender-prefix>-<namespace>"` with an
//! encoded envelope whenever it wants to deliver a message to this side.
//! Both names derive from [`PAGE_SOCKET_PREFIX`] and
//! [`SENDER_BINDING_PREFIX`].

// ============================================================================
// Modules
// ============================================================================

/// Per-namespace connection bridge.
pub mod bridge;

/// Remote debug client contract.
///
/// The transport implementation (WebSocket, pipe) lives outside this crate.
pub mod client;

/// Envelope type and wire codec.
pub mod codec;

/// Local event fan-out.
pub mod emitter;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Namespace tree over a shared remote client.
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    ConnectionBridge, PAGE_SOCKET_PREFIX, SENDER_BINDING_PREFIX, binding_name, page_socket_name,
};

// Client contract
pub use client::{
    BindingCalled, NotificationHandler, RUNTIME_ADD_BINDING, RUNTIME_BINDING_CALLED,
    RUNTIME_ENABLE, RUNTIME_EVALUATE, RemoteDebugClient, SubscriptionId,
};

// Codec types
pub use codec::{Codec, Envelope, JsonCodec, escape_script_literal};

// Emitter types
pub use emitter::{AckHandle, EventEmitter, Listener, ListenerId, listener};

// Error types
pub use error::{Error, Result};

// Registry types
pub use registry::{CONNECTION_EVENT, DEFAULT_NAMESPACE, Namespace};
