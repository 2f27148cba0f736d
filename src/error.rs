//! Error types and handling for the softline-core library
//!
//! This module defines all error types that can occur while orchestrating
//! call sessions and registration state.
//!
//! # Error Categories
//!
//! Errors are categorized to help with recovery strategies:
//!
//! - **Configuration errors** - invalid settings or a duplicate orchestrator
//!   instance; can't recover without fixing the setup
//! - **Connection errors** - the signaling line is down; usually recoverable
//!   once the transport reconnects
//! - **Registration errors** - the registrar rejected us, carries the
//!   transport-supplied reason verbatim
//! - **State errors** - the operation is invalid for the current state; check
//!   state first and retry
//! - **Admission errors** - a new call was refused by the admission gate,
//!   carries the deny reason
//!
//! Transport-originated faults (disconnect, registration rejection) are *not*
//! surfaced through this type at all: they are recorded into the registration
//! state machine and observed via the status reads on `ClientManager`.

use thiserror::Error;

use crate::admission::DenyReason;
use crate::call::{CallId, CallPhase};

/// Result type alias for softline-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Error types for call orchestration operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Invalid or missing configuration, including the duplicate-instance guard
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// The signaling transport reported a connection fault
    #[error("connection error: {reason}")]
    Connection { reason: String },

    /// The signaling line is not connected
    #[error("line is not connected")]
    NotConnected,

    /// The registrar rejected the registration
    #[error("registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// Operation invoked in a state that does not allow it
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    /// A caller-supplied argument was rejected
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The admission controller refused a new call
    #[error("call admission denied: {0}")]
    AdmissionDenied(DenyReason),

    /// A call with active media already exists (no implicit hold)
    #[error("call {call_id} already has active media")]
    ActiveCallConflict { call_id: CallId },

    /// No call with the given id is tracked
    #[error("call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// A per-call operation was invoked in the wrong phase
    #[error("invalid state for call {call_id}: current phase is {phase:?}")]
    InvalidCallState { call_id: CallId, phase: CallPhase },

    /// The transport failed to set up an outbound session
    #[error("call setup failed: {reason}")]
    CallSetupFailed { reason: String },

    /// A transport operation failed
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Internal invariant violation
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }

    /// Create a connection error
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection { reason: reason.into() }
    }

    /// Create a registration failure error
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed { reason: reason.into() }
    }

    /// Create a precondition error
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition { reason: reason.into() }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }

    /// Create a call setup failure error
    pub fn call_setup_failed(reason: impl Into<String>) -> Self {
        Self::CallSetupFailed { reason: reason.into() }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if this error is recoverable without operator intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Connection { .. }
            | ClientError::NotConnected
            | ClientError::Transport { .. }
            | ClientError::AdmissionDenied(_)
            | ClientError::ActiveCallConflict { .. } => true,

            ClientError::Configuration { .. } | ClientError::InvalidArgument { .. } => false,

            _ => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::Configuration { .. } => "configuration",

            ClientError::Connection { .. }
            | ClientError::NotConnected
            | ClientError::Transport { .. } => "connection",

            ClientError::RegistrationFailed { .. } => "registration",

            ClientError::Precondition { .. } | ClientError::InvalidArgument { .. } => "usage",

            ClientError::AdmissionDenied(_) | ClientError::ActiveCallConflict { .. } => "admission",

            ClientError::CallNotFound { .. }
            | ClientError::InvalidCallState { .. }
            | ClientError::CallSetupFailed { .. } => "call",

            ClientError::Internal { .. } => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cover_taxonomy() {
        assert_eq!(ClientError::configuration("x").category(), "configuration");
        assert_eq!(ClientError::NotConnected.category(), "connection");
        assert_eq!(ClientError::registration_failed("Forbidden").category(), "registration");
        assert_eq!(
            ClientError::AdmissionDenied(DenyReason::CapacityReached).category(),
            "admission"
        );
    }

    #[test]
    fn recoverability_split() {
        assert!(ClientError::NotConnected.is_recoverable());
        assert!(ClientError::AdmissionDenied(DenyReason::NotRegistered).is_recoverable());
        assert!(!ClientError::configuration("missing password").is_recoverable());
        assert!(!ClientError::invalid_argument("empty destination").is_recoverable());
    }
}
