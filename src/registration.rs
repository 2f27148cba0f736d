//! Line connectivity and SIP registration state machine
//!
//! Tracks two orthogonal axes: the transport-level line status
//! (`Disconnected → Connecting → Connected`) and the SIP registration status
//! (`Unregistered ⇄ Registered ⇄ Error`). Transitions are driven exclusively
//! by transport events; the `register`/`unregister` client operations delegate
//! to the transport and only change state when the resulting event arrives.
//!
//! The machine guarantees that `Registered` never holds while the line is not
//! `Connected`, for every possible event sequence: a disconnect forces the SIP
//! status into a connection error, and a registration event forces the line
//! connected.
//!
//! Stale events from a superseded transport never reach this machine: the
//! orchestrator's dispatch loop compares each event's transport generation id
//! against the current one and discards mismatches before applying.

use serde::{Deserialize, Serialize};

use crate::transport::TransportEvent;

/// Transport-level connectivity, independent of SIP registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    /// No socket connection
    Disconnected,
    /// Socket connection attempt in progress
    Connecting,
    /// Socket connection established
    Connected,
}

/// SIP-level registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SipStatus {
    /// Not registered with the registrar
    Unregistered,
    /// Registration accepted and current
    Registered,
    /// Registration or connection fault
    Error,
}

/// What kind of fault put the SIP status into `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationErrorKind {
    /// No fault recorded
    None,
    /// Invalid or missing configuration
    Configuration,
    /// The transport connection was lost
    Connection,
    /// The registrar rejected the registration
    Registration,
}

/// Immutable view of the registration state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSnapshot {
    pub line: LineStatus,
    pub sip: SipStatus,
    pub error_kind: RegistrationErrorKind,
    pub error_message: String,
}

/// State machine for line connectivity and SIP registration
#[derive(Debug, Clone)]
pub struct RegistrationStateMachine {
    line: LineStatus,
    sip: SipStatus,
    error_kind: RegistrationErrorKind,
    error_message: String,
}

impl RegistrationStateMachine {
    /// Create a machine in the disconnected, unregistered state
    pub fn new() -> Self {
        Self {
            line: LineStatus::Disconnected,
            sip: SipStatus::Unregistered,
            error_kind: RegistrationErrorKind::None,
            error_message: String::new(),
        }
    }

    /// Restore the initial state (transport reinitialization)
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Apply one transport event
    ///
    /// Session-level events are not registration-relevant and are ignored.
    pub fn apply(&mut self, event: &TransportEvent) {
        match event {
            TransportEvent::Connecting => {
                self.line = LineStatus::Connecting;
                // A registration cannot survive losing the established socket.
                if self.sip == SipStatus::Registered {
                    self.sip = SipStatus::Unregistered;
                }
                tracing::debug!("line connecting");
            }
            TransportEvent::Connected => {
                self.line = LineStatus::Connected;
                tracing::info!("line connected");
            }
            TransportEvent::Disconnected { reason } => {
                self.line = LineStatus::Disconnected;
                self.sip = SipStatus::Error;
                self.error_kind = RegistrationErrorKind::Connection;
                self.error_message = reason.clone();
                tracing::warn!(reason = %reason, "line disconnected");
            }
            TransportEvent::Registered => {
                // Registration implies a live socket; force the line consistent
                // even if events arrived out of order.
                self.line = LineStatus::Connected;
                self.sip = SipStatus::Registered;
                self.clear_error();
                tracing::info!("sip registered");
            }
            TransportEvent::Unregistered => {
                self.sip = SipStatus::Unregistered;
                self.clear_error();
                tracing::info!("sip unregistered");
            }
            TransportEvent::RegistrationFailed { cause, reason } => {
                self.sip = SipStatus::Error;
                self.error_kind = RegistrationErrorKind::Registration;
                // The transport-supplied reason is kept verbatim for the UI.
                self.error_message = reason.clone();
                tracing::warn!(cause = %cause, reason = %reason, "sip registration failed");
            }
            TransportEvent::NewSession { .. } | TransportEvent::Session { .. } => {}
        }
    }

    fn clear_error(&mut self) {
        self.error_kind = RegistrationErrorKind::None;
        self.error_message.clear();
    }

    /// Whether the line is connected
    pub fn is_line_connected(&self) -> bool {
        self.line == LineStatus::Connected
    }

    /// Whether a SIP registration is current
    pub fn is_registered(&self) -> bool {
        self.sip == SipStatus::Registered
    }

    /// Whether the SIP status carries an error
    pub fn has_error(&self) -> bool {
        self.sip == SipStatus::Error
    }

    /// The recorded error message, if any
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Current line status
    pub fn line_status(&self) -> LineStatus {
        self.line
    }

    /// Current SIP status
    pub fn sip_status(&self) -> SipStatus {
        self.sip
    }

    /// Current error kind
    pub fn error_kind(&self) -> RegistrationErrorKind {
        self.error_kind
    }

    /// Immutable snapshot of the whole state
    pub fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot {
            line: self.line,
            sip: self.sip,
            error_kind: self.error_kind,
            error_message: self.error_message.clone(),
        }
    }
}

impl Default for RegistrationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
