//! Envelope type and wire codec.
//!
//! Every message crossing the bridge, in either direction, is an
//! [`Envelope`]: a `(event, ackEventId, args)` triple. The acknowledgement
//! event id correlates a later acknowledgement with the emit that requested
//! it; when an acknowledgement is produced it travels back inside a second
//! envelope whose event name *is* that id.
//!
//! The [`Codec`] trait abstracts the serialization format; [`JsonCodec`] is
//! the default. Encoded payloads must be safe to embed inside a
//! single-quoted script literal after [`escape_script_literal`] is applied.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Envelope
// ============================================================================

/// Wire representation: a 3-element JSON array.
type EnvelopeTuple = (String, String, Vec<Value>);

/// The wire-level message unit exchanged in both directions.
///
/// Serialized as the 3-element array `[event, ackEventId, args]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EnvelopeTuple", into = "EnvelopeTuple")]
pub struct Envelope {
    /// Event name. For an acknowledgement this is the ack-event id of the
    /// emit being acknowledged.
    pub event: String,

    /// Acknowledgement-event id, generated fresh per outbound emit as
    /// `"<event>-<uuid>"`.
    pub ack_event: String,

    /// Ordered event arguments.
    pub args: Vec<Value>,
}

impl Envelope {
    /// Creates a new envelope.
    #[inline]
    #[must_use]
    pub fn new(
        event: impl Into<String>,
        ack_event: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            event: event.into(),
            ack_event: ack_event.into(),
            args,
        }
    }
}

impl From<EnvelopeTuple> for Envelope {
    fn from((event, ack_event, args): EnvelopeTuple) -> Self {
        Self {
            event,
            ack_event,
            args,
        }
    }
}

impl From<Envelope> for EnvelopeTuple {
    fn from(envelope: Envelope) -> Self {
        (envelope.event, envelope.ack_event, envelope.args)
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Serializes and deserializes envelopes for transport through injected
/// scripts and binding payloads.
///
/// Implementations must be lossless for JSON-compatible values.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Encodes an envelope for the given namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the envelope cannot
    /// be serialized.
    async fn encode(&self, envelope: &Envelope, namespace: &str) -> Result<String>;

    /// Decodes a payload back into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload is
    /// malformed.
    async fn decode(&self, payload: &str) -> Result<Envelope>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// Default codec: plain JSON.
///
/// The namespace is not folded into the payload; namespace isolation is
/// already guaranteed by per-namespace binding names and page globals.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[async_trait]
impl Codec for JsonCodec {
    async fn encode(&self, envelope: &Envelope, _namespace: &str) -> Result<String> {
        Ok(serde_json::to_string(envelope)?)
    }

    async fn decode(&self, payload: &str) -> Result<Envelope> {
        Ok(serde_json::from_str(payload)?)
    }
}

// ============================================================================
// Script Escaping
// ============================================================================

/// Escapes a payload for embedding in a single-quoted script literal.
///
/// Backslashes are escaped first, then single quotes.
#[must_use]
pub fn escape_script_literal(payload: &str) -> String {
    payload.replace('\\', "\\\\").replace('\'', "\\'")
}

// ============================================================================
// Tests
// ============================================================================
