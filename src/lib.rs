//! softline-core: call-session orchestration layer for SIP softphones
//!
//! This crate mediates between a SIP signaling transport and a set of
//! concurrently active voice/video call sessions, exposing a consistent,
//! race-free view of line connectivity, registration status and the list of
//! live and historical calls.
//!
//! ## Layer separation
//! ```text
//! presentation layer -> softline-core -> {signaling transport, media engine}
//! ```
//!
//! softline-core owns:
//! - the registration/line-connectivity state machine
//! - the per-call session state machine and its lifecycle
//! - admission control for new calls (capacity, setup serialization)
//! - the authoritative active-call list and derived call history
//!
//! SIP wire-protocol handling and WebSocket plumbing live behind the
//! [`transport::SignalingTransport`] trait; capture-device ownership lives
//! behind [`media::MediaEngine`]. Both are injected at construction.

pub mod admission;
pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod registration;
pub mod registry;
pub mod session;
pub mod transport;

// Public API exports
pub use admission::{can_admit_call, AdmissionDecision, DenyReason};
pub use call::{CallDirection, CallId, CallInfo, CallPhase};
pub use client::{Client, ClientManager, ClientStats};
pub use config::{ClientConfig, DtmfMode, UnregisterOptions};
pub use error::{ClientError, ClientResult};
pub use events::EventBus;
pub use media::{MediaConstraints, MediaEngine, MediaStreamHandle};
pub use registration::{
    LineStatus, RegistrationErrorKind, RegistrationSnapshot, RegistrationStateMachine, SipStatus,
};
pub use registry::CallRegistry;
pub use session::CallSession;
pub use transport::{
    CallOptions, SessionEvent, SessionHandle, SessionOriginator, SignalingTransport,
    SignalingTransportFactory, TransportConfig, TransportEnvelope, TransportEvent, TransportEventTx,
    TransportId,
};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
