//! Test doubles shared across module tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::client::{
    NotificationHandler, RUNTIME_EVALUATE, RemoteDebugClient, SubscriptionId,
};
use crate::codec::{Codec, Envelope, JsonCodec};
use crate::error::{Error, Result};

// ============================================================================
// MockClient
// ============================================================================

/// In-memory [`RemoteDebugClient`] recording every command and letting
/// tests replay notifications deterministically.
pub(crate) struct MockClient {
    sent: Mutex<Vec<(String, Value)>>,
    handlers: Mutex<FxHashMap<String, Vec<(SubscriptionId, NotificationHandler)>>>,
    next_subscription: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl MockClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            handlers: Mutex::new(FxHashMap::default()),
            next_subscription: AtomicU64::new(0),
            fail_next: Mutex::new(None),
        })
    }

    /// Every command sent, in order.
    pub(crate) fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

    /// Params of every `Runtime.evaluate` command, in order.
    pub(crate) fn evaluations(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(method, _)| method == RUNTIME_EVALUATE)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Number of live subscriptions for a notification.
    pub(crate) fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .get(event)
            .map_or(0, |handlers| handlers.len())
    }

    /// Makes the next `send` fail with the given message.
    pub(crate) fn fail_next_send(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// Replays a notification through every subscribed handler, awaiting
    /// each in subscription order.
    pub(crate) async fn notify(&self, event: &str, params: Value) {
        let handlers: Vec<NotificationHandler> = self
            .handlers
            .lock()
            .get(event)
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect()
            })
            .unwrap_or_default();

        for handler in handlers {
            handler(params.clone()).await;
        }
    }
}

#[async_trait]
impl RemoteDebugClient for MockClient {
    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(Error::client(message));
        }
        self.sent.lock().push((method.to_string(), params));
        Ok(json!({}))
    }

    fn on(&self, event: &str, handler: NotificationHandler) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, event: &str, subscription: SubscriptionId) {
        let mut handlers = self.handlers.lock();
        if let Some(entries) = handlers.get_mut(event) {
            entries.retain(|(id, _)| *id != subscription);
            if entries.is_empty() {
                handlers.remove(event);
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts the embedded payload from an injected delivery script.
pub(crate) fn payload_of(expression: &str) -> String {
    let start = expression
        .find("sock.send('")
        .map(|index| index + "sock.send('".len())
        .expect("send call in expression");
    let end = expression[start..]
        .rfind("')")
        .map(|index| start + index)
        .expect("closing quote in expression");
    expression[start..end]
        .replace("\\'", "'")
        .replace("\\\\", "\\")
}

/// Decodes the envelope embedded in `Runtime.evaluate` params.
pub(crate) async fn decode_evaluation(params: &Value) -> Envelope {
    let expression = params["expression"].as_str().expect("expression");
    JsonCodec
        .decode(&payload_of(expression))
        .await
        .expect("decode embedded envelope")
}
