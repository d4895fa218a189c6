//! Remote debug client contract.
//!
//! Defines the boundary the bridge consumes: a CDP-style transport that can
//! send request/response commands and deliver protocol notifications. The
//! actual client implementation (WebSocket connection, browser lifecycle)
//! lives outside this crate.
//!
//! # Protocol Primitives
//!
//! The bridge only needs four primitives from the transport:
//!
//! | Primitive | Method / Notification |
//! |-----------|-----------------------|
//! | Enable the runtime domain | [`RUNTIME_ENABLE`] |
//! | Register a page-callable binding | [`RUNTIME_ADD_BINDING`] |
//! | Evaluate a script in a page context | [`RUNTIME_EVALUATE`] |
//! | Receive page-to-client calls | [`RUNTIME_BINDING_CALLED`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Protocol Method Names
// ============================================================================

/// Enables the runtime/evaluation domain.
pub const RUNTIME_ENABLE: &str = "Runtime.enable";

/// Registers a named page-callable binding.
pub const RUNTIME_ADD_BINDING: &str = "Runtime.addBinding";

/// Evaluates a script string in a page context.
pub const RUNTIME_EVALUATE: &str = "Runtime.evaluate";

/// Notification sent when page script invokes a registered binding.
pub const RUNTIME_BINDING_CALLED: &str = "Runtime.bindingCalled";

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier for a notification subscription.
///
/// Returned by [`RemoteDebugClient::on`]; passing it back to
/// [`RemoteDebugClient::off`] removes exactly that subscription, never
/// affecting other subscriptions on the same client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a subscription ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// BindingCalled
// ============================================================================

/// Payload of a [`RUNTIME_BINDING_CALLED`] notification.
///
/// # Format
///
/// ```json
/// {
///   "name": "binding name",
///   "payload": "string passed by page script",
///   "executionContextId": 3
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BindingCalled {
    /// Name of the binding the page invoked.
    pub name: String,

    /// String argument the page passed to the binding.
    pub payload: String,

    /// Execution context the call originated from.
    #[serde(rename = "executionContextId")]
    pub execution_context_id: u64,
}

// ============================================================================
// Handler Type
// ============================================================================

/// Notification handler callback type.
///
/// Handlers receive the raw notification params and return a boxed future.
/// Client implementations await the future on their event loop, which keeps
/// notification processing serialized with the rest of the client's work.
pub type NotificationHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

// ============================================================================
// RemoteDebugClient
// ============================================================================

/// CDP-style transport consumed by the bridge.
///
/// One client handle may be shared by many bridges (one per namespace)
/// simultaneously; each bridge adds its own notification subscription and
/// removes exactly that subscription on close.
#[async_trait]
pub trait RemoteDebugClient: Send + Sync {
    /// Sends a protocol command and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`](crate::Error::Client) if the command is
    /// rejected by the remote endpoint.
    async fn send(&self, method: &str, params: Value) -> Result<Value>;

    /// Subscribes to a protocol notification stream.
    ///
    /// Returns an identifier for later removal via [`off`](Self::off).
    fn on(&self, event: &str, handler: NotificationHandler) -> SubscriptionId;

    /// Removes a single notification subscription.
    ///
    /// Unknown identifiers are ignored.
    fn off(&self, event: &str, subscription: SubscriptionId);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_called_parsing() {
        let json_str = r#"{
            "name": "cdp-socket-sender-/default",
            "payload": "[\"greet\",\"greet-1\",[\"hi\"]]",
            "executionContextId": 7
        }"#;

        let event: BindingCalled = serde_json::from_str(json_str).expect("parse notification");
        assert_eq!(event.name, "cdp-socket-sender-/default");
        assert_eq!(event.execution_context_id, 7);
        assert!(event.payload.contains("greet"));
    }

    #[test]
    fn test_subscription_id_display() {
        let id = SubscriptionId::new(42);
        assert_eq!(id.to_string(), "sub-42");
        assert_eq!(id.value(), 42);
    }
}
