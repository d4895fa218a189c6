//! Error types for the CDP socket bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_socket::{Result, Namespace};
//!
//! async fn example(ns: &Namespace) -> Result<()> {
//!     ns.emit("ping", vec![]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport | [`Error::Client`] |
//! | Protocol | [`Error::Protocol`] |
//! | Codec | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Remote debug client command failed.
    ///
    /// Returned when a protocol command (domain enable, binding
    /// registration, evaluation) is rejected by the client.
    #[error("Client error: {message}")]
    Client {
        /// Description of the client failure.
        message: String,
    },

    /// Protocol violation or unexpected notification shape.
    ///
    /// Returned when a notification payload does not match the
    /// expected structure.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// JSON serialization error.
    ///
    /// Returned when envelope encoding or decoding fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a client error.
    #[inline]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a codec (serialization) error.
    #[inline]
    #[must_use]
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Returns `true` if this is a client (transport) error.
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
