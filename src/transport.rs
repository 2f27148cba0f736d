//! Signaling transport boundary
//!
//! The low-level SIP message construction and WebSocket plumbing live behind
//! the traits in this module. The orchestrator consumes transport lifecycle
//! events as a closed set of tagged variants and drives the transport through
//! the [`SignalingTransport`] and [`SessionHandle`] traits; it never sees raw
//! SIP messages.
//!
//! Every event is delivered inside a [`TransportEnvelope`] stamped with the
//! generation id of the transport instance that produced it. When the
//! orchestrator replaces its transport (credential change, reconnect), events
//! still in flight from the discarded instance carry a stale id and are
//! dropped before they can touch current state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{ClientConfig, DtmfMode, UnregisterOptions};
use crate::error::ClientResult;

/// Identity of one transport instance, refreshed on every reinitialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(Uuid);

impl TransportId {
    /// Mint a fresh transport generation id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransportId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Who originated a new transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOriginator {
    /// Our own outbound dial
    Local,
    /// The remote party is calling us
    Remote,
}

/// Progress callbacks for one transport session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Provisional response received (remote is ringing)
    Progress,
    /// The remote party accepted the call
    Accepted,
    /// Media negotiation completed, the call is live
    Confirmed,
    /// The call was placed on hold
    Held,
    /// The call was resumed from hold
    Resumed,
    /// The session failed during signaling
    Failed { cause: String },
    /// The session terminated
    Ended { reason: String },
}

/// Lifecycle events emitted by a signaling transport
///
/// One variant per named transport event; payloads are strongly typed rather
/// than loose key/value bags.
pub enum TransportEvent {
    /// Socket connection attempt started
    Connecting,
    /// Socket connection established
    Connected,
    /// Socket connection lost
    Disconnected { reason: String },
    /// SIP registration succeeded
    Registered,
    /// SIP registration removed
    Unregistered,
    /// SIP registration rejected by the registrar
    RegistrationFailed { cause: String, reason: String },
    /// A new session was attached to this transport
    NewSession {
        originator: SessionOriginator,
        session: Arc<dyn SessionHandle>,
    },
    /// Progress on an existing session, routed by its transport key
    Session { key: String, event: SessionEvent },
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::Connecting => write!(f, "Connecting"),
            TransportEvent::Connected => write!(f, "Connected"),
            TransportEvent::Disconnected { reason } => {
                f.debug_struct("Disconnected").field("reason", reason).finish()
            }
            TransportEvent::Registered => write!(f, "Registered"),
            TransportEvent::Unregistered => write!(f, "Unregistered"),
            TransportEvent::RegistrationFailed { cause, reason } => f
                .debug_struct("RegistrationFailed")
                .field("cause", cause)
                .field("reason", reason)
                .finish(),
            TransportEvent::NewSession { originator, session } => f
                .debug_struct("NewSession")
                .field("originator", originator)
                .field("key", &session.key())
                .finish(),
            TransportEvent::Session { key, event } => {
                f.debug_struct("Session").field("key", key).field("event", event).finish()
            }
        }
    }
}

/// A transport event stamped with the generation id of its emitter
#[derive(Debug)]
pub struct TransportEnvelope {
    /// Generation id of the transport instance that emitted the event
    pub transport_id: TransportId,
    /// The event itself
    pub event: TransportEvent,
}

/// Sending half handed to a transport at construction
///
/// Every event sent through this handle is automatically stamped with the
/// owning transport's generation id, so the orchestrator can discard events
/// from superseded instances.
#[derive(Clone)]
pub struct TransportEventTx {
    transport_id: TransportId,
    tx: mpsc::UnboundedSender<TransportEnvelope>,
}

impl TransportEventTx {
    /// Create a tagged sender for one transport generation
    pub fn new(transport_id: TransportId, tx: mpsc::UnboundedSender<TransportEnvelope>) -> Self {
        Self { transport_id, tx }
    }

    /// The generation id this sender stamps onto events
    pub fn transport_id(&self) -> TransportId {
        self.transport_id
    }

    /// Emit a transport event to the orchestrator
    ///
    /// Send failures mean the orchestrator is gone; the event is dropped.
    pub fn emit(&self, event: TransportEvent) {
        if self.tx.send(TransportEnvelope { transport_id: self.transport_id, event }).is_err() {
            tracing::debug!(transport_id = %self.transport_id, "dropping event, orchestrator closed");
        }
    }
}

/// Connection parameters handed to a transport factory
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the SIP proxy/registrar
    pub socket_address: String,
    /// SIP user address of record
    pub user: String,
    /// Authentication password
    pub password: String,
    /// Authentication realm
    pub realm: Option<String>,
    /// Display name presented to remote parties
    pub display_name: Option<String>,
    /// Register automatically as soon as the socket connects
    pub auto_register: bool,
    /// Session timer expiry in seconds
    pub session_timer_expiry: u32,
    /// Extra SIP headers per method name
    pub extra_headers: HashMap<String, Vec<String>>,
    /// User agent string
    pub user_agent: String,
}

impl From<&ClientConfig> for TransportConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            socket_address: config.socket_address.clone(),
            user: config.sip_user.clone(),
            password: config.password.clone(),
            realm: config.realm.clone(),
            display_name: config.display_name.clone(),
            auto_register: config.auto_register,
            session_timer_expiry: config.session_timer_expiry,
            extra_headers: config.extra_headers.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Options for one outbound dial
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Request a video call
    pub video: bool,
    /// Extra SIP headers for the INVITE
    pub extra_headers: Vec<String>,
}

/// Handle to one signaling session (one call leg on the wire)
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Stable transport-level key for this session
    fn key(&self) -> &str;

    /// Remote party address (the caller for inbound sessions)
    fn remote(&self) -> &str;

    /// Whether the session carries video
    fn is_video(&self) -> bool {
        false
    }

    /// Answer an inbound session
    async fn answer(&self) -> ClientResult<()>;

    /// Terminate the session with a SIP reason
    async fn terminate(&self, code: u16, phrase: &str) -> ClientResult<()>;

    /// Transmit DTMF digits on this session
    async fn send_dtmf(&self, digits: &str, mode: DtmfMode) -> ClientResult<()>;

    /// Place the session on hold
    async fn hold(&self) -> ClientResult<()>;

    /// Resume the session from hold
    async fn resume(&self) -> ClientResult<()>;
}

/// A signaling connection to a SIP registrar/proxy
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Open the socket and start emitting lifecycle events
    async fn start(&self) -> ClientResult<()>;

    /// Close the socket; no further events are expected after this returns
    async fn stop(&self) -> ClientResult<()>;

    /// Send a REGISTER request
    async fn register(&self) -> ClientResult<()>;

    /// Remove the registration
    async fn unregister(&self, options: &UnregisterOptions) -> ClientResult<()>;

    /// Dial an outbound session
    async fn call(&self, destination: &str, options: &CallOptions) -> ClientResult<Arc<dyn SessionHandle>>;

    /// Request termination of every session on this transport
    async fn terminate_sessions(&self) -> ClientResult<()>;
}

/// Factory creating transport instances wired to the orchestrator's event channel
#[async_trait]
pub trait SignalingTransportFactory: Send + Sync {
    /// Build a transport for the given configuration
    ///
    /// The returned transport must emit all of its events through `events`.
    async fn create(
        &self,
        config: &TransportConfig,
        events: TransportEventTx,
    ) -> ClientResult<Arc<dyn SignalingTransport>>;
}
