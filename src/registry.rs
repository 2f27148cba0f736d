//! Authoritative list of active calls and derived call history
//!
//! The registry has a single writer: the orchestrator, which mutates it while
//! holding the core state lock (directly on `make_call`/inbound acceptance,
//! and through the event-bus consumers for updates and endings). Readers never
//! see a half-mutated list: every mutation rebuilds an `Arc` snapshot, and
//! the read accessors hand out clones of those snapshots.
//!
//! Invariants maintained here:
//! - `active` preserves insertion order (call start order);
//! - `history` is most-recent-first;
//! - a call id lives in at most one of the two lists, and a history entry is
//!   never mutated after being recorded.

use std::sync::Arc;

use crate::call::{CallId, CallInfo};

/// Registry of active calls and call history
pub struct CallRegistry {
    active: Vec<CallInfo>,
    history: Vec<CallInfo>,
    active_snapshot: Arc<Vec<CallInfo>>,
    history_snapshot: Arc<Vec<CallInfo>>,
}

impl CallRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            active: Vec::new(),
            history: Vec::new(),
            active_snapshot: Arc::new(Vec::new()),
            history_snapshot: Arc::new(Vec::new()),
        }
    }

    /// Register a newly created call at the end of the active list
    pub fn insert(&mut self, info: CallInfo) {
        tracing::debug!(call_id = %info.call_id, phase = ?info.phase, "registering call");
        self.active.push(info);
        self.refresh_active();
    }

    /// Apply a `call.update` event: replace the matching active entry in place
    ///
    /// Updates for unknown ids (already ended, never registered) are ignored.
    pub fn apply_update(&mut self, info: CallInfo) {
        if let Some(entry) = self.active.iter_mut().find(|c| c.call_id == info.call_id) {
            *entry = info;
            self.refresh_active();
        } else {
            tracing::debug!(call_id = %info.call_id, "update for untracked call ignored");
        }
    }

    /// Apply a `call.ended` event: drop from active, prepend to history
    ///
    /// Idempotent per call id: an ending already recorded in the history is
    /// not recorded again, so a bus delivery racing a synchronous drain
    /// cannot duplicate an entry.
    pub fn apply_ended(&mut self, info: CallInfo) {
        if self.history.iter().any(|c| c.call_id == info.call_id) {
            tracing::debug!(call_id = %info.call_id, "ending already recorded");
            return;
        }
        tracing::info!(call_id = %info.call_id, reason = ?info.end_reason, "call ended");
        if let Some(pos) = self.active.iter().position(|c| c.call_id == info.call_id) {
            self.active.remove(pos);
            self.refresh_active();
        }
        // Most-recent-first; retention is the caller's concern.
        self.history.insert(0, info);
        self.history_snapshot = Arc::new(self.history.clone());
    }

    /// Snapshot of the active calls, in call start order
    pub fn active(&self) -> Arc<Vec<CallInfo>> {
        Arc::clone(&self.active_snapshot)
    }

    /// Snapshot of the call history, most recent first
    pub fn history(&self) -> Arc<Vec<CallInfo>> {
        Arc::clone(&self.history_snapshot)
    }

    /// The first active call whose media is flowing, if any
    pub fn active_media_call(&self) -> Option<CallInfo> {
        self.active.iter().find(|c| c.media_active).cloned()
    }

    /// The most recently started active call, if any
    pub fn last_call(&self) -> Option<CallInfo> {
        self.active.last().cloned()
    }

    /// Look up an active call by id
    pub fn find(&self, call_id: CallId) -> Option<&CallInfo> {
        self.active.iter().find(|c| c.call_id == call_id)
    }

    /// Number of active calls
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    fn refresh_active(&mut self) {
        self.active_snapshot = Arc::new(self.active.clone());
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}
