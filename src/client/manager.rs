//! The orchestrator: transport lifecycle, event dispatch and registry wiring
//!
//! `ClientManager` is the top-level component. It owns the signaling transport
//! (create/replace/stop), routes every transport event either into the
//! registration state machine or into call-session creation, consumes the
//! event bus to keep the call registry current, and exposes the public control
//! surface (spread over the sibling modules in `client/`).
//!
//! # Concurrency model
//!
//! All decisions are taken under one `tokio::sync::Mutex` guarding
//! [`CoreState`]. Transport-event dispatch, bus delivery and client-invoked
//! operations each acquire it, so check-then-act sequences (admission followed
//! by session creation, precondition checks followed by transport requests)
//! are atomic with respect to each other. Sessions publish to the bus without
//! blocking, so holding the lock across a publish cannot deadlock.
//!
//! # Transport generations
//!
//! Each transport instance gets a fresh [`TransportId`]. The dispatch loop
//! drops any envelope whose id is not the current generation, so in-flight
//! events from a discarded transport can never corrupt current state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::{can_admit_call, AdmissionDecision};
use crate::call::{CallId, CallInfo};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::EventBus;
use crate::media::MediaEngine;
use crate::registration::RegistrationStateMachine;
use crate::registry::CallRegistry;
use crate::session::CallSession;
use crate::transport::{
    SessionOriginator, SignalingTransport, SignalingTransportFactory, TransportConfig,
    TransportEnvelope, TransportEvent, TransportEventTx, TransportId,
};

/// Set while a `ClientManager` is alive; only one per process is allowed.
static INSTANCE_SLOT: AtomicBool = AtomicBool::new(false);

/// RAII ownership of the process-wide orchestrator slot
pub(crate) struct InstanceGuard(());

impl InstanceGuard {
    fn acquire() -> ClientResult<Self> {
        if INSTANCE_SLOT
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(Self(()))
        } else {
            Err(ClientError::configuration(
                "another ClientManager is already active in this process",
            ))
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        INSTANCE_SLOT.store(false, Ordering::SeqCst);
    }
}

/// State mutated only under the core lock
pub(crate) struct CoreState {
    pub(crate) registration: RegistrationStateMachine,
    pub(crate) registry: CallRegistry,
    pub(crate) transport: Option<Arc<dyn SignalingTransport>>,
    pub(crate) transport_id: Option<TransportId>,
    pub(crate) sessions: HashMap<CallId, CallSession>,
}

/// Dependencies and state shared with the background tasks
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) media: Arc<dyn MediaEngine>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) state: Mutex<CoreState>,
    /// transport session key -> call id
    pub(crate) call_by_session: DashMap<String, CallId>,
    /// call id -> transport session key
    pub(crate) session_by_call: DashMap<CallId, String>,
}

/// Aggregate status of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub line_connected: bool,
    pub registered: bool,
    pub active_calls: usize,
    pub calls_in_history: usize,
}

/// Top-level call-session orchestrator for one softphone line
pub struct ClientManager {
    pub(crate) shared: Arc<Shared>,
    transport_factory: Arc<dyn SignalingTransportFactory>,
    event_tx: mpsc::UnboundedSender<TransportEnvelope>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    _instance: InstanceGuard,
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager").finish_non_exhaustive()
    }
}

impl ClientManager {
    /// Create the orchestrator and spawn its background tasks
    ///
    /// Fails with a configuration error for an invalid config or when another
    /// manager instance is already active in this process. The transport is
    /// not created here; call [`connect`](Self::connect) next.
    pub fn new(
        config: ClientConfig,
        transport_factory: Arc<dyn SignalingTransportFactory>,
        media: Arc<dyn MediaEngine>,
    ) -> ClientResult<Arc<Self>> {
        config.validate()?;
        let instance = InstanceGuard::acquire()?;

        let bus = Arc::new(EventBus::new());
        let update_rx = bus.call_update.subscribe();
        let ended_rx = bus.call_ended.subscribe();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            config,
            media,
            bus,
            state: Mutex::new(CoreState {
                registration: RegistrationStateMachine::new(),
                registry: CallRegistry::new(),
                transport: None,
                transport_id: None,
                sessions: HashMap::new(),
            }),
            call_by_session: DashMap::new(),
            session_by_call: DashMap::new(),
        });

        let tasks = vec![
            tokio::spawn(dispatch_loop(shared.clone(), event_rx)),
            tokio::spawn(consume_updates(shared.clone(), update_rx)),
            tokio::spawn(consume_ended(shared.clone(), ended_rx)),
        ];

        info!(user = %shared.config.sip_user, "client manager created");
        Ok(Arc::new(Self {
            shared,
            transport_factory,
            event_tx,
            tasks: std::sync::Mutex::new(tasks),
            _instance: instance,
        }))
    }

    /// Create and start the signaling transport
    pub async fn connect(&self) -> ClientResult<()> {
        let mut state = self.shared.state.lock().await;
        if state.transport.is_some() {
            return Err(ClientError::precondition(
                "transport already started; use reconnect() to replace it",
            ));
        }
        self.install_transport(&mut state).await
    }

    /// Stop and discard the current transport, then start a fresh one
    ///
    /// Live sessions on the old transport will never see another event, so
    /// they are ended locally first (releasing any media). The registration
    /// state machine is reset; in-flight events from the old instance are
    /// discarded by the generation check in the dispatch loop.
    pub async fn reconnect(&self) -> ClientResult<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(old) = state.transport.take() {
            info!(transport_id = ?state.transport_id, "discarding transport");
            if let Err(e) = old.stop().await {
                warn!(error = %e, "old transport did not stop cleanly");
            }
        }
        state.transport_id = None;
        self.drain_sessions(&mut state, "transport reinitialized").await;
        state.registration.reset();
        self.install_transport(&mut state).await
    }

    /// Stop the transport and release every resource
    pub async fn stop(&self) -> ClientResult<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(transport) = state.transport.take() {
            if let Err(e) = transport.stop().await {
                warn!(error = %e, "transport did not stop cleanly");
            }
        }
        state.transport_id = None;
        self.drain_sessions(&mut state, "client stopped").await;
        state.registration.reset();
        drop(state);

        self.shared.media.close_all().await;
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("client manager stopped");
        Ok(())
    }

    async fn install_transport(&self, state: &mut CoreState) -> ClientResult<()> {
        let transport_id = TransportId::new();
        let events = TransportEventTx::new(transport_id, self.event_tx.clone());
        let transport_config = TransportConfig::from(&self.shared.config);
        let transport = self.transport_factory.create(&transport_config, events).await?;
        transport.start().await?;
        state.transport = Some(transport);
        state.transport_id = Some(transport_id);
        info!(transport_id = %transport_id, address = %self.shared.config.socket_address, "transport started");
        Ok(())
    }

    /// End every live session and apply the results to the registry in place
    ///
    /// Synchronous on purpose: the bus consumers may already be stopping, so
    /// the registry move and mapping cleanup happen here, under the lock the
    /// caller holds, not through `call.ended` delivery.
    async fn drain_sessions(&self, state: &mut CoreState, reason: &str) {
        let sessions = std::mem::take(&mut state.sessions);
        for (call_id, mut session) in sessions {
            debug!(call_id = %call_id, "ending orphaned session");
            let info = session.force_end(reason, self.shared.media.as_ref()).await;
            if let Some((_, key)) = self.shared.session_by_call.remove(&call_id) {
                self.shared.call_by_session.remove(&key);
            }
            state.registry.apply_ended(info);
        }
    }

    /// Aggregate status snapshot
    pub async fn stats(&self) -> ClientStats {
        let state = self.shared.state.lock().await;
        ClientStats {
            line_connected: state.registration.is_line_connected(),
            registered: state.registration.is_registered(),
            active_calls: state.registry.active_len(),
            calls_in_history: state.registry.history().len(),
        }
    }
}

impl Drop for ClientManager {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

/// Route transport envelopes into registration state or call sessions
async fn dispatch_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<TransportEnvelope>) {
    while let Some(envelope) = rx.recv().await {
        let mut state = shared.state.lock().await;
        if state.transport_id != Some(envelope.transport_id) {
            // Stale event from a superseded transport; silent discard.
            debug!(transport_id = %envelope.transport_id, event = ?envelope.event, "discarding stale transport event");
            continue;
        }
        match envelope.event {
            TransportEvent::NewSession { originator, session } => {
                handle_new_session(&shared, &mut state, originator, session).await;
            }
            TransportEvent::Session { key, event } => {
                let call_id = shared.call_by_session.get(&key).map(|entry| *entry.value());
                match call_id.and_then(|id| state.sessions.get_mut(&id)) {
                    Some(call_session) => {
                        call_session.apply(event, shared.media.as_ref()).await;
                    }
                    None => debug!(key = %key, "event for unknown session ignored"),
                }
            }
            event => state.registration.apply(&event),
        }
    }
}

async fn handle_new_session(
    shared: &Arc<Shared>,
    state: &mut CoreState,
    originator: SessionOriginator,
    session: Arc<dyn crate::transport::SessionHandle>,
) {
    if originator == SessionOriginator::Local {
        // Outbound sessions are wired at dial time in make_call.
        debug!(key = %session.key(), "local session notification ignored");
        return;
    }

    let snapshot = state.registration.snapshot();
    let active = state.registry.active();
    let decision = can_admit_call(
        &snapshot,
        active.as_slice(),
        shared.config.max_concurrent_calls,
        shared.media.is_ready(),
    );
    if let AdmissionDecision::Denied(reason) = decision {
        // Explicit protocol-level rejection, not a local error.
        warn!(caller = %session.remote(), reason = %reason, "rejecting inbound call");
        if let Err(e) = session.terminate(486, "Busy Here").await {
            warn!(error = %e, "failed to reject inbound session");
        }
        return;
    }

    let call_id = CallId::new_v4();
    let transport_id = state.transport_id.unwrap_or_default();
    shared.call_by_session.insert(session.key().to_string(), call_id);
    shared.session_by_call.insert(call_id, session.key().to_string());

    info!(call_id = %call_id, caller = %session.remote(), "inbound call ringing");
    let caller = session.remote().to_string();
    let video = session.is_video();
    let call_session =
        CallSession::inbound(call_id, caller, video, session, transport_id, shared.bus.clone());
    state.registry.insert(call_session.info().clone());
    state.sessions.insert(call_id, call_session);
}

/// Apply `call.update` deliveries to the registry
async fn consume_updates(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<CallInfo>) {
    while let Some(info) = rx.recv().await {
        let mut state = shared.state.lock().await;
        state.registry.apply_update(info);
    }
}

/// Apply `call.ended` deliveries: registry move plus session/mapping cleanup
async fn consume_ended(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<CallInfo>) {
    while let Some(info) = rx.recv().await {
        let mut state = shared.state.lock().await;
        state.sessions.remove(&info.call_id);
        if let Some((_, key)) = shared.session_by_call.remove(&info.call_id) {
            shared.call_by_session.remove(&key);
        }
        state.registry.apply_ended(info);
    }
}
