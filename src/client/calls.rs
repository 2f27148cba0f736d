//! Call operations for the orchestrator
//!
//! Outbound dialing, per-call control (answer, reject, hangup, hold, resume,
//! DTMF), bulk termination and the call-list queries.

use std::sync::Arc;

use tracing::info;

use crate::admission::{can_admit_call, AdmissionDecision};
use crate::call::{CallId, CallInfo};
use crate::error::{ClientError, ClientResult};
use crate::session::CallSession;
use crate::transport::CallOptions;

use super::manager::ClientManager;

impl ClientManager {
    /// Dial an outbound call and return its id
    ///
    /// The id is returned as soon as the transport accepts the dial; call
    /// progress is observed through the active-call snapshots. Fails fast
    /// with no partial mutation: an empty destination, a missing transport, a
    /// disconnected line, an admission denial or an existing active-media
    /// call each reject the request before anything is created.
    pub async fn make_call(&self, destination: impl Into<String>, video: bool) -> ClientResult<CallId> {
        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(ClientError::invalid_argument("destination must not be empty"));
        }

        // Admission and creation happen under one lock acquisition so two
        // near-simultaneous dials cannot both pass the capacity guard.
        let mut state = self.shared.state.lock().await;
        let transport = state
            .transport
            .clone()
            .ok_or_else(|| ClientError::precondition("no signaling transport; call connect() first"))?;
        let transport_id = state.transport_id.unwrap_or_default();

        if !state.registration.is_line_connected() {
            return Err(ClientError::NotConnected);
        }

        let snapshot = state.registration.snapshot();
        let active = state.registry.active();
        let decision = can_admit_call(
            &snapshot,
            active.as_slice(),
            self.shared.config.max_concurrent_calls,
            self.shared.media.is_ready(),
        );
        if let AdmissionDecision::Denied(reason) = decision {
            return Err(ClientError::AdmissionDenied(reason));
        }
        // No implicit hold: a call with flowing media blocks a new dial.
        if let Some(conflict) = state.registry.active_media_call() {
            return Err(ClientError::ActiveCallConflict { call_id: conflict.call_id });
        }

        let options = CallOptions {
            video,
            extra_headers: self.shared.config.headers_for("INVITE").to_vec(),
        };
        let handle = transport.call(&destination, &options).await.map_err(|e| {
            ClientError::call_setup_failed(format!("transport rejected dial: {e}"))
        })?;

        let call_id = CallId::new_v4();
        self.shared.call_by_session.insert(handle.key().to_string(), call_id);
        self.shared.session_by_call.insert(call_id, handle.key().to_string());

        let session = CallSession::outbound(
            call_id,
            destination,
            video,
            handle,
            transport_id,
            self.shared.bus.clone(),
        );
        info!(call_id = %call_id, remote = %session.info().remote_party, video, "outbound call dialing");
        state.registry.insert(session.info().clone());
        state.sessions.insert(call_id, session);
        Ok(call_id)
    }

    /// Answer an inbound ringing call
    pub async fn answer_call(&self, call_id: &CallId) -> ClientResult<()> {
        let mut state = self.shared.state.lock().await;
        let session = state
            .sessions
            .get_mut(call_id)
            .ok_or(ClientError::CallNotFound { call_id: *call_id })?;
        session.answer().await?;
        info!(call_id = %call_id, "answered call");
        Ok(())
    }

    /// Reject an inbound ringing call with 486 Busy Here
    pub async fn reject_call(&self, call_id: &CallId) -> ClientResult<()> {
        let mut state = self.shared.state.lock().await;
        let session = state
            .sessions
            .get_mut(call_id)
            .ok_or(ClientError::CallNotFound { call_id: *call_id })?;
        session.reject(486, "Busy Here").await?;
        info!(call_id = %call_id, "rejected call");
        Ok(())
    }

    /// Hang up a call; completion is observed via the call history
    pub async fn hangup_call(&self, call_id: &CallId) -> ClientResult<()> {
        let mut state = self.shared.state.lock().await;
        let media = Arc::clone(&self.shared.media);
        let session = state
            .sessions
            .get_mut(call_id)
            .ok_or(ClientError::CallNotFound { call_id: *call_id })?;
        session.hangup(media.as_ref()).await?;
        info!(call_id = %call_id, "hangup requested");
        Ok(())
    }

    /// Place an active call on hold
    pub async fn hold_call(&self, call_id: &CallId) -> ClientResult<()> {
        let state = self.shared.state.lock().await;
        let session = state
            .sessions
            .get(call_id)
            .ok_or(ClientError::CallNotFound { call_id: *call_id })?;
        session.request_hold().await
    }

    /// Resume a held call
    pub async fn resume_call(&self, call_id: &CallId) -> ClientResult<()> {
        let state = self.shared.state.lock().await;
        let session = state
            .sessions
            .get(call_id)
            .ok_or(ClientError::CallNotFound { call_id: *call_id })?;
        session.request_resume().await
    }

    /// Transmit DTMF digits on an active call
    pub async fn send_dtmf(&self, call_id: &CallId, digits: &str) -> ClientResult<()> {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || "ABCD*#".contains(c)) {
            return Err(ClientError::invalid_argument(format!("invalid DTMF digits: {digits:?}")));
        }
        let state = self.shared.state.lock().await;
        let session = state
            .sessions
            .get(call_id)
            .ok_or(ClientError::CallNotFound { call_id: *call_id })?;
        session.send_dtmf(digits, self.shared.config.dtmf_mode).await
    }

    /// Request termination of every session on the transport
    ///
    /// Best effort: the registry drains as the resulting `call.ended` events
    /// arrive, not synchronously.
    pub async fn terminate_all(&self) -> ClientResult<()> {
        let state = self.shared.state.lock().await;
        let transport = state
            .transport
            .clone()
            .ok_or_else(|| ClientError::precondition("no signaling transport"))?;
        drop(state);
        info!("terminating all sessions");
        transport.terminate_sessions().await
    }

    /// Snapshot of the active calls, in call start order
    pub async fn active_calls(&self) -> Arc<Vec<CallInfo>> {
        self.shared.state.lock().await.registry.active()
    }

    /// Snapshot of the call history, most recent first
    pub async fn call_history(&self) -> Arc<Vec<CallInfo>> {
        self.shared.state.lock().await.registry.history()
    }

    /// The call whose media is currently flowing, if any
    pub async fn active_media_call(&self) -> Option<CallInfo> {
        self.shared.state.lock().await.registry.active_media_call()
    }

    /// The most recently started active call, if any
    pub async fn last_call(&self) -> Option<CallInfo> {
        self.shared.state.lock().await.registry.last_call()
    }
}
