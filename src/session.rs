//! Per-call session state machine
//!
//! A `CallSession` owns one call's lifecycle: its phase transitions are driven
//! by the transport-session callbacks routed to it by the orchestrator, and by
//! the client-facing call operations (answer, hold, hangup). It publishes a
//! snapshot on the event bus after every observable change, and a single
//! `call.ended` message when it reaches its terminal phase; it never touches
//! the call registry itself.
//!
//! Media scoping: a capture stream is acquired on every transition into
//! `Active` and released on every transition out of it (hold, terminate, end),
//! so a device handle can never leak past the phase it was acquired for.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallId, CallInfo, CallPhase};
use crate::config::DtmfMode;
use crate::error::{ClientError, ClientResult};
use crate::events::EventBus;
use crate::media::{MediaConstraints, MediaEngine, MediaStreamHandle};
use crate::transport::{SessionEvent, SessionHandle, TransportId};

/// Live state machine for one voice/video call
pub struct CallSession {
    info: CallInfo,
    handle: Arc<dyn SessionHandle>,
    media: Option<MediaStreamHandle>,
    transport_id: TransportId,
    bus: Arc<EventBus>,
}

impl CallSession {
    /// Create the session for an outbound call whose dial was just initiated
    pub fn outbound(
        call_id: CallId,
        destination: String,
        video: bool,
        handle: Arc<dyn SessionHandle>,
        transport_id: TransportId,
        bus: Arc<EventBus>,
    ) -> Self {
        let mut info = CallInfo::new(call_id, CallDirection::Outgoing, destination, video);
        info.phase = CallPhase::Dialing;
        Self { info, handle, media: None, transport_id, bus }
    }

    /// Create the session for an inbound call awaiting a local decision
    pub fn inbound(
        call_id: CallId,
        caller: String,
        video: bool,
        handle: Arc<dyn SessionHandle>,
        transport_id: TransportId,
        bus: Arc<EventBus>,
    ) -> Self {
        let mut info = CallInfo::new(call_id, CallDirection::Incoming, caller, video);
        info.phase = CallPhase::Ringing;
        Self { info, handle, media: None, transport_id, bus }
    }

    /// Current snapshot of this call
    pub fn info(&self) -> &CallInfo {
        &self.info
    }

    /// Transport-level key of the underlying session
    pub fn session_key(&self) -> &str {
        self.handle.key()
    }

    /// Apply one transport-session callback
    pub async fn apply(&mut self, event: SessionEvent, media: &dyn MediaEngine) {
        debug!(
            call_id = %self.info.call_id,
            transport_id = %self.transport_id,
            phase = ?self.info.phase,
            event = ?event,
            "session event"
        );
        match event {
            SessionEvent::Progress | SessionEvent::Accepted => {
                if matches!(self.info.phase, CallPhase::Idle | CallPhase::Dialing | CallPhase::Ringing) {
                    self.info.phase = CallPhase::Establishing;
                    self.publish_update();
                }
            }
            SessionEvent::Confirmed => {
                if !self.info.phase.is_terminal() && self.info.phase != CallPhase::Terminating {
                    self.enter_active(media).await;
                }
            }
            SessionEvent::Held => {
                if self.info.phase == CallPhase::Active {
                    self.leave_active(CallPhase::Held, media).await;
                    self.publish_update();
                }
            }
            SessionEvent::Resumed => {
                if self.info.phase == CallPhase::Held {
                    self.enter_active(media).await;
                }
            }
            SessionEvent::Failed { cause } => {
                warn!(call_id = %self.info.call_id, cause = %cause, "session failed");
                self.end(cause, media).await;
            }
            SessionEvent::Ended { reason } => {
                self.end(reason, media).await;
            }
        }
    }

    /// Answer an inbound call (Ringing only)
    pub async fn answer(&mut self) -> ClientResult<()> {
        if self.info.phase != CallPhase::Ringing {
            return Err(ClientError::InvalidCallState {
                call_id: self.info.call_id,
                phase: self.info.phase,
            });
        }
        self.handle.answer().await?;
        self.info.phase = CallPhase::Establishing;
        self.publish_update();
        Ok(())
    }

    /// Reject an inbound call (Ringing only) with an explicit SIP response
    pub async fn reject(&mut self, code: u16, phrase: &str) -> ClientResult<()> {
        if self.info.phase != CallPhase::Ringing {
            return Err(ClientError::InvalidCallState {
                call_id: self.info.call_id,
                phase: self.info.phase,
            });
        }
        self.handle.terminate(code, phrase).await?;
        self.info.phase = CallPhase::Terminating;
        self.publish_update();
        Ok(())
    }

    /// Request local termination; completion arrives as an `Ended` event
    pub async fn hangup(&mut self, media: &dyn MediaEngine) -> ClientResult<()> {
        if self.info.phase.is_terminal() || self.info.phase == CallPhase::Terminating {
            return Ok(());
        }
        self.leave_active(CallPhase::Terminating, media).await;
        self.publish_update();
        self.handle.terminate(200, "Normal Clearing").await
    }

    /// Request hold; the phase changes when the transport confirms
    pub async fn request_hold(&self) -> ClientResult<()> {
        if self.info.phase != CallPhase::Active {
            return Err(ClientError::InvalidCallState {
                call_id: self.info.call_id,
                phase: self.info.phase,
            });
        }
        self.handle.hold().await
    }

    /// Request resume; the phase changes when the transport confirms
    pub async fn request_resume(&self) -> ClientResult<()> {
        if self.info.phase != CallPhase::Held {
            return Err(ClientError::InvalidCallState {
                call_id: self.info.call_id,
                phase: self.info.phase,
            });
        }
        self.handle.resume().await
    }

    /// Transmit DTMF digits; only valid while the call is active
    pub async fn send_dtmf(&self, digits: &str, mode: DtmfMode) -> ClientResult<()> {
        if self.info.phase != CallPhase::Active {
            return Err(ClientError::InvalidCallState {
                call_id: self.info.call_id,
                phase: self.info.phase,
            });
        }
        self.handle.send_dtmf(digits, mode).await
    }

    /// Locally end the session without a transport round trip
    ///
    /// Used when the owning transport instance is discarded (reconnect, stop)
    /// and no `Ended` event will ever arrive for this session. Nothing is
    /// published: the final snapshot is returned and the caller applies it to
    /// the registry itself, since the bus consumers may be about to shut down.
    pub(crate) async fn force_end(&mut self, reason: &str, media: &dyn MediaEngine) -> CallInfo {
        if !self.info.phase.is_terminal() {
            self.leave_active(CallPhase::Ended, media).await;
            self.info.ended_at = Some(Utc::now());
            self.info.end_reason = Some(reason.to_string());
        }
        self.info.clone()
    }

    async fn enter_active(&mut self, media: &dyn MediaEngine) {
        self.info.phase = CallPhase::Active;
        if self.info.connected_at.is_none() {
            self.info.connected_at = Some(Utc::now());
        }
        match media.acquire(MediaConstraints::for_call(self.info.video)).await {
            Ok(handle) => {
                self.media = Some(handle);
                self.info.media_active = true;
                info!(call_id = %self.info.call_id, "call active, media acquired");
            }
            Err(e) => {
                // The call stays up without local media; the line must remain
                // queryable on media faults.
                self.info.media_active = false;
                warn!(call_id = %self.info.call_id, error = %e, "media acquisition failed");
            }
        }
        self.publish_update();
    }

    async fn leave_active(&mut self, next: CallPhase, media: &dyn MediaEngine) {
        if let Some(handle) = self.media.take() {
            media.release(handle).await;
        }
        self.info.media_active = false;
        self.info.phase = next;
    }

    async fn end(&mut self, reason: String, media: &dyn MediaEngine) {
        if self.info.phase.is_terminal() {
            return;
        }
        self.leave_active(CallPhase::Ended, media).await;
        self.info.ended_at = Some(Utc::now());
        self.info.end_reason = Some(reason);
        self.bus.call_ended.publish(self.info.clone());
    }

    fn publish_update(&self) {
        self.bus.call_update.publish(self.info.clone());
    }
}
