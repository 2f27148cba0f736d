//! Call snapshot types
//!
//! This module provides the lightweight call record shared between the live
//! `CallSession` state machines, the `CallRegistry` and API consumers. The
//! registry and the event bus only ever carry these immutable snapshots; the
//! live session objects stay inside the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Lifecycle phase of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallPhase {
    /// Created but not yet submitted to the transport
    Idle,
    /// Outbound invite sent, waiting for any remote response
    Dialing,
    /// Inbound call waiting for a local answer decision
    Ringing,
    /// Remote party reached, media negotiation in progress
    Establishing,
    /// Call is connected and media is flowing
    Active,
    /// Call is on hold, no media is flowing
    Held,
    /// Local termination requested, waiting for the transport to confirm
    Terminating,
    /// Call has ended
    Ended,
}

impl CallPhase {
    /// Check if the call is still being set up (serialized by admission control)
    pub fn is_setup(&self) -> bool {
        matches!(self, CallPhase::Dialing | CallPhase::Ringing | CallPhase::Establishing)
    }

    /// Check if the call has reached its terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Ended)
    }

    /// Check if the call is still in progress
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }
}

/// Direction of a call (from the client's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Outgoing call (client initiated)
    Outgoing,
    /// Incoming call (received from the network)
    Incoming,
}

/// Immutable snapshot of a call session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    /// Unique call identifier
    pub call_id: CallId,
    /// Direction of the call
    pub direction: CallDirection,
    /// Remote party address (destination for outgoing, caller for incoming)
    pub remote_party: String,
    /// Current lifecycle phase
    pub phase: CallPhase,
    /// Whether a media stream is currently acquired for this call
    pub media_active: bool,
    /// Whether this is a video call
    pub video: bool,
    /// When the call was created
    pub created_at: DateTime<Utc>,
    /// When the call first became active (if it did)
    pub connected_at: Option<DateTime<Utc>>,
    /// When the call ended (if it did)
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the call ended (transport-supplied, if available)
    pub end_reason: Option<String>,
}

impl CallInfo {
    /// Create a fresh snapshot for a new call
    pub fn new(call_id: CallId, direction: CallDirection, remote_party: String, video: bool) -> Self {
        Self {
            call_id,
            direction,
            remote_party,
            phase: CallPhase::Idle,
            media_active: false,
            video,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            end_reason: None,
        }
    }
}
