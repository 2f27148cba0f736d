//! End-to-end orchestration scenarios against a mock signaling transport and
//! a mock media engine
//!
//! Only one `ClientManager` may be live per process, so every test here runs
//! under `#[serial]`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;

use softline_core::{
    CallPhase, ClientConfig, ClientError, ClientManager, ClientResult, DenyReason, DtmfMode,
    MediaConstraints, MediaEngine, MediaStreamHandle, SessionEvent, SessionHandle,
    SessionOriginator, SignalingTransport, SignalingTransportFactory, TransportConfig,
    TransportEvent, TransportEventTx, UnregisterOptions,
};

// ===== mock media engine =====

struct MockMedia {
    ready: AtomicBool,
    next_handle: AtomicU64,
    held: AtomicUsize,
}

impl MockMedia {
    fn new() -> Self {
        Self { ready: AtomicBool::new(true), next_handle: AtomicU64::new(1), held: AtomicUsize::new(0) }
    }

    fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for MockMedia {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn acquire(&self, _constraints: MediaConstraints) -> ClientResult<MediaStreamHandle> {
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(MediaStreamHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    async fn release(&self, _handle: MediaStreamHandle) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }

    async fn close_all(&self) {
        self.held.store(0, Ordering::SeqCst);
    }
}

// ===== mock signaling transport =====

#[derive(Default)]
struct MockSession {
    key: String,
    remote: String,
    answered: AtomicBool,
    dtmf: Mutex<Vec<(String, DtmfMode)>>,
    terminations: Mutex<Vec<(u16, String)>>,
    holds: AtomicUsize,
    resumes: AtomicUsize,
}

impl MockSession {
    fn new(key: impl Into<String>, remote: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { key: key.into(), remote: remote.into(), ..Default::default() })
    }

    fn terminations(&self) -> Vec<(u16, String)> {
        self.terminations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionHandle for MockSession {
    fn key(&self) -> &str {
        &self.key
    }

    fn remote(&self) -> &str {
        &self.remote
    }

    async fn answer(&self) -> ClientResult<()> {
        self.answered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate(&self, code: u16, phrase: &str) -> ClientResult<()> {
        self.terminations.lock().unwrap().push((code, phrase.to_string()));
        Ok(())
    }

    async fn send_dtmf(&self, digits: &str, mode: DtmfMode) -> ClientResult<()> {
        self.dtmf.lock().unwrap().push((digits.to_string(), mode));
        Ok(())
    }

    async fn hold(&self) -> ClientResult<()> {
        self.holds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> ClientResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockTransport {
    events: TransportEventTx,
    next_session: AtomicU64,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    registers: AtomicUsize,
    unregisters: AtomicUsize,
    terminate_all_calls: AtomicUsize,
    stopped: AtomicBool,
}

impl MockTransport {
    fn emit(&self, event: TransportEvent) {
        self.events.emit(event);
    }

    /// Drive the socket up and the registration through, the common preamble.
    fn bring_online(&self) {
        self.emit(TransportEvent::Connecting);
        self.emit(TransportEvent::Connected);
        self.emit(TransportEvent::Registered);
    }

    fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions.lock().unwrap()[index].clone()
    }

    fn session_event(&self, key: &str, event: SessionEvent) {
        self.emit(TransportEvent::Session { key: key.to_string(), event });
    }

    /// Simulate the arrival of a remote inbound session.
    fn push_inbound(&self, remote: &str) -> Arc<MockSession> {
        let key = format!("inbound-{}", self.next_session.fetch_add(1, Ordering::SeqCst));
        let session = MockSession::new(key, remote);
        self.sessions.lock().unwrap().push(session.clone());
        self.emit(TransportEvent::NewSession {
            originator: SessionOriginator::Remote,
            session: session.clone(),
        });
        session
    }
}

#[async_trait]
impl SignalingTransport for MockTransport {
    async fn start(&self) -> ClientResult<()> {
        Ok(())
    }

    async fn stop(&self) -> ClientResult<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn register(&self) -> ClientResult<()> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unregister(&self, _options: &UnregisterOptions) -> ClientResult<()> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn call(
        &self,
        destination: &str,
        _options: &softline_core::CallOptions,
    ) -> ClientResult<Arc<dyn SessionHandle>> {
        let key = format!("outbound-{}", self.next_session.fetch_add(1, Ordering::SeqCst));
        let session = MockSession::new(key, destination);
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn terminate_sessions(&self) -> ClientResult<()> {
        self.terminate_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MockFactory {
    transports: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.transports.lock().unwrap()[index].clone()
    }

    fn latest(&self) -> Arc<MockTransport> {
        self.transports.lock().unwrap().last().unwrap().clone()
    }
}

#[async_trait]
impl SignalingTransportFactory for MockFactory {
    async fn create(
        &self,
        _config: &TransportConfig,
        events: TransportEventTx,
    ) -> ClientResult<Arc<dyn SignalingTransport>> {
        let transport = Arc::new(MockTransport {
            events,
            next_session: AtomicU64::new(0),
            sessions: Mutex::new(Vec::new()),
            registers: AtomicUsize::new(0),
            unregisters: AtomicUsize::new(0),
            terminate_all_calls: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        });
        self.transports.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}

// ===== helpers =====

fn config(capacity: usize) -> ClientConfig {
    ClientConfig::new("wss://sip.example.com:7443", "sip:alice@example.com", "secret")
        .with_max_concurrent_calls(capacity)
}

struct Rig {
    client: Arc<ClientManager>,
    factory: Arc<MockFactory>,
    media: Arc<MockMedia>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client with a started transport, connected line and current registration.
async fn online_rig(capacity: usize) -> Rig {
    init_tracing();
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());
    let client = ClientManager::new(config(capacity), factory.clone(), media.clone()).unwrap();
    client.connect().await.unwrap();
    factory.latest().bring_online();
    wait_until(|| {
        let client = client.clone();
        async move { client.is_registered().await }
    })
    .await;
    Rig { client, factory, media }
}

/// Poll an async predicate until it holds or a second elapses.
async fn wait_until<F, Fut>(mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if predicate().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ===== scenarios =====

#[tokio::test]
#[serial]
async fn outbound_call_reaches_active_with_media() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let active = rig.client.active_calls().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].call_id, call_id);
    assert_eq!(active[0].phase, CallPhase::Dialing);

    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Progress);
    transport.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move {
            client.active_calls().await.first().map(|c| c.phase) == Some(CallPhase::Active)
        }
    })
    .await;

    let active = rig.client.active_calls().await;
    assert!(active[0].media_active);
    assert!(active[0].connected_at.is_some());
    assert_eq!(rig.media.held(), 1);
    assert_eq!(rig.client.active_media_call().await.unwrap().call_id, call_id);
}

#[tokio::test]
#[serial]
async fn second_dial_is_denied_at_capacity() {
    let rig = online_rig(1).await;
    let transport = rig.factory.latest();

    rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move {
            client.active_calls().await.first().map(|c| c.phase) == Some(CallPhase::Active)
        }
    })
    .await;

    let err = rig.client.make_call("sip:carol@example.com", false).await.unwrap_err();
    assert_eq!(err, ClientError::AdmissionDenied(DenyReason::CapacityReached));
    assert_eq!(rig.client.active_calls().await.len(), 1);
}

#[tokio::test]
#[serial]
async fn dialing_call_serializes_setup() {
    let rig = online_rig(4).await;

    rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let err = rig.client.make_call("sip:carol@example.com", false).await.unwrap_err();
    assert_eq!(err, ClientError::AdmissionDenied(DenyReason::EstablishingInProgress));
    assert_eq!(rig.client.active_calls().await.len(), 1);
}

#[tokio::test]
#[serial]
async fn active_media_call_blocks_a_new_dial() {
    let rig = online_rig(4).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;

    let err = rig.client.make_call("sip:carol@example.com", false).await.unwrap_err();
    assert_eq!(err, ClientError::ActiveCallConflict { call_id });
}

#[tokio::test]
#[serial]
async fn holding_the_active_call_allows_a_second_dial() {
    let rig = online_rig(4).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;

    rig.client.hold_call(&call_id).await.unwrap();
    assert_eq!(session.holds.load(Ordering::SeqCst), 1);
    transport.session_event(session.key(), SessionEvent::Held);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move {
            client.active_calls().await.first().map(|c| c.phase) == Some(CallPhase::Held)
        }
    })
    .await;
    assert_eq!(rig.media.held(), 0);

    let second = rig.client.make_call("sip:carol@example.com", false).await.unwrap();
    assert_eq!(rig.client.last_call().await.unwrap().call_id, second);
    assert_eq!(rig.client.active_calls().await.len(), 2);
}

#[tokio::test]
#[serial]
async fn make_call_precondition_ladder() {
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());
    let client = ClientManager::new(config(1), factory.clone(), media.clone()).unwrap();

    // Empty destination is checked before anything else.
    let err = client.make_call("   ", false).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument { .. }));

    // No transport yet.
    let err = client.make_call("sip:bob@example.com", false).await.unwrap_err();
    assert!(matches!(err, ClientError::Precondition { .. }));

    // Transport exists but the line is down.
    client.connect().await.unwrap();
    let err = client.make_call("sip:bob@example.com", false).await.unwrap_err();
    assert_eq!(err, ClientError::NotConnected);

    // Line up, not registered.
    let transport = factory.latest();
    transport.emit(TransportEvent::Connected);
    wait_until(|| {
        let client = client.clone();
        async move { client.is_line_connected().await }
    })
    .await;
    let err = client.make_call("sip:bob@example.com", false).await.unwrap_err();
    assert_eq!(err, ClientError::AdmissionDenied(DenyReason::NotRegistered));

    // Registered but the media engine is unavailable.
    transport.emit(TransportEvent::Registered);
    wait_until(|| {
        let client = client.clone();
        async move { client.is_registered().await }
    })
    .await;
    media.ready.store(false, Ordering::SeqCst);
    let err = client.make_call("sip:bob@example.com", false).await.unwrap_err();
    assert_eq!(err, ClientError::AdmissionDenied(DenyReason::MediaUnavailable));
}

#[tokio::test]
#[serial]
async fn inbound_call_is_rejected_when_admission_denies() {
    let rig = online_rig(1).await;
    let transport = rig.factory.latest();

    rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let outbound = transport.session(0);
    transport.session_event(outbound.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;

    let inbound = transport.push_inbound("sip:carol@example.com");
    let inbound_probe = inbound.clone();
    wait_until(move || {
        let inbound = inbound_probe.clone();
        async move { !inbound.terminations().is_empty() }
    })
    .await;

    assert_eq!(inbound.terminations(), vec![(486, "Busy Here".to_string())]);
    assert_eq!(rig.client.active_calls().await.len(), 1);
}

#[tokio::test]
#[serial]
async fn inbound_call_rings_and_connects_after_answer() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let inbound = transport.push_inbound("sip:carol@example.com");
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { !client.active_calls().await.is_empty() }
    })
    .await;

    let ringing = rig.client.last_call().await.unwrap();
    assert_eq!(ringing.phase, CallPhase::Ringing);
    assert_eq!(ringing.remote_party, "sip:carol@example.com");

    rig.client.answer_call(&ringing.call_id).await.unwrap();
    assert!(inbound.answered.load(Ordering::SeqCst));

    transport.session_event(inbound.key(), SessionEvent::Confirmed);
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;
    assert_eq!(rig.media.held(), 1);
}

#[tokio::test]
#[serial]
async fn ended_call_lands_at_history_front() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);
    transport.session_event(
        session.key(),
        SessionEvent::Ended { reason: "Remote hangup".to_string() },
    );

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_calls().await.is_empty() }
    })
    .await;

    let history = rig.client.call_history().await;
    assert_eq!(history[0].call_id, call_id);
    assert_eq!(history[0].phase, CallPhase::Ended);
    assert_eq!(history[0].end_reason.as_deref(), Some("Remote hangup"));
    assert_eq!(rig.media.held(), 0, "media released on call end");
}

#[tokio::test]
#[serial]
async fn hangup_drains_through_the_registry() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;

    rig.client.hangup_call(&call_id).await.unwrap();
    assert_eq!(rig.media.held(), 0, "media released on terminate request");
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move {
            client.active_calls().await.first().map(|c| c.phase) == Some(CallPhase::Terminating)
        }
    })
    .await;

    transport.session_event(session.key(), SessionEvent::Ended { reason: "Normal".to_string() });
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_calls().await.is_empty() }
    })
    .await;
    assert_eq!(rig.client.call_history().await[0].call_id, call_id);
}

#[tokio::test]
#[serial]
async fn dtmf_is_rejected_outside_active_phase() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let err = rig.client.send_dtmf(&call_id, "12#").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidCallState { phase: CallPhase::Dialing, .. }));
    let session = transport.session(0);
    assert!(session.dtmf.lock().unwrap().is_empty(), "no transport side effect");

    transport.session_event(session.key(), SessionEvent::Confirmed);
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;
    rig.client.send_dtmf(&call_id, "12#").await.unwrap();
    assert_eq!(session.dtmf.lock().unwrap().len(), 1);

    // Unknown calls and garbage digits fail fast too.
    let ghost = uuid::Uuid::new_v4();
    assert!(matches!(
        rig.client.send_dtmf(&ghost, "1").await.unwrap_err(),
        ClientError::CallNotFound { .. }
    ));
    assert!(matches!(
        rig.client.send_dtmf(&call_id, "xyz").await.unwrap_err(),
        ClientError::InvalidArgument { .. }
    ));
}

#[tokio::test]
#[serial]
async fn registration_rejection_is_recorded_not_thrown() {
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());
    let client = ClientManager::new(config(2), factory.clone(), media).unwrap();
    client.connect().await.unwrap();

    let transport = factory.latest();
    transport.emit(TransportEvent::Connected);
    transport.emit(TransportEvent::RegistrationFailed {
        cause: "SIP 403".to_string(),
        reason: "Forbidden".to_string(),
    });

    let probe = client.clone();
    wait_until(|| {
        let client = probe.clone();
        async move { client.has_error().await }
    })
    .await;

    assert!(!client.is_registered().await);
    assert_eq!(client.error_message().await, "Forbidden");
    // The line itself stays connected and queryable.
    assert!(client.is_line_connected().await);
}

#[tokio::test]
#[serial]
async fn register_and_unregister_preconditions() {
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());
    let client = ClientManager::new(config(2), factory.clone(), media).unwrap();

    // No transport yet.
    assert!(matches!(client.register_sip().await.unwrap_err(), ClientError::Precondition { .. }));

    client.connect().await.unwrap();
    let transport = factory.latest();

    // Line still down.
    assert!(matches!(client.register_sip().await.unwrap_err(), ClientError::Precondition { .. }));

    transport.emit(TransportEvent::Connected);
    let probe = client.clone();
    wait_until(|| {
        let client = probe.clone();
        async move { client.is_line_connected().await }
    })
    .await;

    client.register_sip().await.unwrap();
    assert_eq!(transport.registers.load(Ordering::SeqCst), 1);
    // register_sip does not change state; only the transport event does.
    assert!(!client.is_registered().await);

    // Unregister requires a current registration.
    assert!(matches!(
        client.unregister_sip(UnregisterOptions::default()).await.unwrap_err(),
        ClientError::Precondition { .. }
    ));

    transport.emit(TransportEvent::Registered);
    let probe = client.clone();
    wait_until(|| {
        let client = probe.clone();
        async move { client.is_registered().await }
    })
    .await;

    client.unregister_sip(UnregisterOptions::default()).await.unwrap();
    assert_eq!(transport.unregisters.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[serial]
async fn auto_register_disables_manual_registration() {
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());
    let client = ClientManager::new(
        config(2).with_auto_register(true),
        factory.clone(),
        media,
    )
    .unwrap();
    client.connect().await.unwrap();
    factory.latest().emit(TransportEvent::Connected);

    let probe = client.clone();
    wait_until(|| {
        let client = probe.clone();
        async move { client.is_line_connected().await }
    })
    .await;

    let err = client.register_sip().await.unwrap_err();
    assert!(matches!(err, ClientError::Precondition { .. }));
}

#[tokio::test]
#[serial]
async fn terminate_all_requires_a_transport() {
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());
    let client = ClientManager::new(config(2), factory.clone(), media).unwrap();

    assert!(matches!(client.terminate_all().await.unwrap_err(), ClientError::Precondition { .. }));

    client.connect().await.unwrap();
    client.terminate_all().await.unwrap();
    assert_eq!(factory.latest().terminate_all_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[serial]
async fn stale_events_from_a_replaced_transport_are_discarded() {
    let rig = online_rig(2).await;
    let old = rig.factory.latest();

    // A live call on the old transport.
    rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = old.session(0);
    old.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;

    rig.client.reconnect().await.unwrap();
    assert!(old.stopped.load(Ordering::SeqCst));

    // Orphaned call was ended locally and its media released.
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_calls().await.is_empty() }
    })
    .await;
    assert_eq!(rig.media.held(), 0);
    assert_eq!(
        rig.client.call_history().await[0].end_reason.as_deref(),
        Some("transport reinitialized")
    );

    // Registration was reset; stale events from the old instance change nothing.
    assert!(!rig.client.is_registered().await);
    old.emit(TransportEvent::Connected);
    old.emit(TransportEvent::Registered);
    old.session_event(session.key(), SessionEvent::Confirmed);
    settle().await;
    assert!(!rig.client.is_registered().await);
    assert!(!rig.client.is_line_connected().await);
    assert!(rig.client.active_calls().await.is_empty());

    // The replacement transport's events apply normally.
    let new = rig.factory.transport(1);
    new.bring_online();
    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.is_registered().await }
    })
    .await;
}

#[tokio::test]
#[serial]
async fn stop_moves_live_calls_to_history() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let call_id = rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.active_media_call().await.is_some() }
    })
    .await;

    rig.client.stop().await.unwrap();

    // The drain is synchronous: the registry is consistent as soon as stop()
    // returns, even though the bus consumers are gone.
    assert!(rig.client.active_calls().await.is_empty());
    let history = rig.client.call_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].call_id, call_id);
    assert_eq!(history[0].phase, CallPhase::Ended);
    assert!(!history[0].media_active);
    assert_eq!(history[0].end_reason.as_deref(), Some("client stopped"));
    assert_eq!(rig.media.held(), 0);
}

#[tokio::test]
#[serial]
async fn only_one_manager_instance_per_process() {
    let factory = Arc::new(MockFactory::default());
    let media = Arc::new(MockMedia::new());

    let first = ClientManager::new(config(2), factory.clone(), media.clone()).unwrap();

    let err = ClientManager::new(config(2), factory.clone(), media.clone()).unwrap_err();
    assert_eq!(err.category(), "configuration");

    // Releasing the slot makes construction possible again.
    drop(first);
    let _second = ClientManager::new(config(2), factory, media).unwrap();
}

#[tokio::test]
#[serial]
async fn stats_track_line_and_calls() {
    let rig = online_rig(2).await;
    let transport = rig.factory.latest();

    let stats = rig.client.stats().await;
    assert!(stats.line_connected && stats.registered);
    assert_eq!(stats.active_calls, 0);

    rig.client.make_call("sip:bob@example.com", false).await.unwrap();
    let session = transport.session(0);
    transport.session_event(session.key(), SessionEvent::Confirmed);
    transport.session_event(session.key(), SessionEvent::Ended { reason: "bye".to_string() });

    let client = rig.client.clone();
    wait_until(|| {
        let client = client.clone();
        async move { client.stats().await.calls_in_history == 1 }
    })
    .await;
    assert_eq!(rig.client.stats().await.active_calls, 0);

    rig.client.stop().await.unwrap();
    let stats = rig.client.stats().await;
    assert!(!stats.line_connected && !stats.registered);
}
