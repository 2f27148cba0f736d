//! Admission control for new calls
//!
//! A pure decision function consulted before any call session is created,
//! outbound or inbound. Callers must evaluate it while holding the same lock
//! that guards the active-call list, and create the session before releasing
//! it, so two near-simultaneous requests cannot both pass the capacity or
//! setup-serialization guard.

use serde::{Deserialize, Serialize};

use crate::call::CallInfo;
use crate::registration::RegistrationSnapshot;

/// Why a new call was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// The media engine cannot serve acquisitions right now
    MediaUnavailable,
    /// No current SIP registration
    NotRegistered,
    /// The configured concurrent-call capacity is already used
    CapacityReached,
    /// Another call is still being set up; call setup is serialized
    EstablishingInProgress,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DenyReason::MediaUnavailable => "media engine unavailable",
            DenyReason::NotRegistered => "not registered",
            DenyReason::CapacityReached => "call capacity reached",
            DenyReason::EstablishingInProgress => "another call is being established",
        };
        f.write_str(text)
    }
}

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The call may proceed
    Allowed,
    /// The call must not be created
    Denied(DenyReason),
}

impl AdmissionDecision {
    /// Whether the call may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}

/// Decide whether a new call (inbound or outbound) may be created
///
/// Computed fresh from the registration snapshot, the current active-call
/// list and the configured capacity; nothing is stored.
pub fn can_admit_call(
    registration: &RegistrationSnapshot,
    active: &[CallInfo],
    capacity: usize,
    media_ready: bool,
) -> AdmissionDecision {
    if !media_ready {
        return AdmissionDecision::Denied(DenyReason::MediaUnavailable);
    }
    if registration.sip != crate::registration::SipStatus::Registered {
        return AdmissionDecision::Denied(DenyReason::NotRegistered);
    }
    if active.len() >= capacity {
        return AdmissionDecision::Denied(DenyReason::CapacityReached);
    }
    if active.iter().any(|call| call.phase.is_setup()) {
        return AdmissionDecision::Denied(DenyReason::EstablishingInProgress);
    }
    AdmissionDecision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallDirection, CallPhase};
    use crate::registration::{RegistrationStateMachine, RegistrationSnapshot};
    use crate::transport::TransportEvent;
    use uuid::Uuid;

    fn registered() -> RegistrationSnapshot {
        let mut machine = RegistrationStateMachine::new();
        machine.apply(&TransportEvent::Connected);
        machine.apply(&TransportEvent::Registered);
        machine.snapshot()
    }

    fn call_in(phase: CallPhase) -> CallInfo {
        let mut info = CallInfo::new(
            Uuid::new_v4(),
            CallDirection::Outgoing,
            "sip:bob@example.com".to_string(),
            false,
        );
        info.phase = phase;
        info
    }

    #[test]
    fn allows_when_registered_and_idle() {
        let decision = can_admit_call(&registered(), &[], 2, true);
        assert!(decision.is_allowed());
    }

    #[test]
    fn media_unavailable_wins_over_everything() {
        let decision = can_admit_call(&registered(), &[], 2, false);
        assert_eq!(decision, AdmissionDecision::Denied(DenyReason::MediaUnavailable));
    }

    #[test]
    fn denies_when_not_registered() {
        let snapshot = RegistrationStateMachine::new().snapshot();
        let decision = can_admit_call(&snapshot, &[], 2, true);
        assert_eq!(decision, AdmissionDecision::Denied(DenyReason::NotRegistered));
    }

    #[test]
    fn denies_at_capacity_boundary() {
        let active = vec![call_in(CallPhase::Active)];
        let decision = can_admit_call(&registered(), &active, 1, true);
        assert_eq!(decision, AdmissionDecision::Denied(DenyReason::CapacityReached));

        // One below capacity with no setup in flight is fine.
        let decision = can_admit_call(&registered(), &active, 2, true);
        assert!(decision.is_allowed());
    }

    #[test]
    fn denies_while_another_call_is_setting_up() {
        for phase in [CallPhase::Dialing, CallPhase::Ringing, CallPhase::Establishing] {
            let active = vec![call_in(phase)];
            let decision = can_admit_call(&registered(), &active, 4, true);
            assert_eq!(
                decision,
                AdmissionDecision::Denied(DenyReason::EstablishingInProgress),
                "phase {phase:?} should serialize setup"
            );
        }
    }

    #[test]
    fn held_calls_do_not_block_admission() {
        let active = vec![call_in(CallPhase::Held)];
        assert!(can_admit_call(&registered(), &active, 4, true).is_allowed());
    }
}
