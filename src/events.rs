//! Outbox boundary for fire-and-forget notifications and audit records
//!
//! Emission happens after a transition has committed and must never
//! roll one back: implementations swallow their own failures.
use crate::types::LeaveType;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveEvent {
    RequestSubmitted {
        request_id: String,
        staff_id: String,
    },
    StepApproved {
        request_id: String,
        level: u32,
        approver_id: String,
    },
    StepDelegated {
        request_id: String,
        level: u32,
        to: String,
    },
    RequestApproved {
        request_id: String,
    },
    RequestRejected {
        request_id: String,
        level: u32,
    },
    RequestCancelled {
        request_id: String,
        actor_id: String,
    },
    BalanceDeducted {
        staff_id: String,
        leave_type: LeaveType,
        days: u32,
    },
    BalanceRestored {
        staff_id: String,
        leave_type: LeaveType,
        days: u32,
    },
    SuspiciousApprovalTiming {
        request_id: String,
        first_level: u32,
        second_level: u32,
    },
    YearEndApplied {
        staff_id: String,
        carried: u32,
        forfeited: u32,
        accrued: u32,
    },
}

/// Sink for domain events. Implementations must not panic and must not
/// surface delivery failures to the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LeaveEvent);
}

/// Default sink when the caller wires no notification pipeline.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _: &LeaveEvent) {}
}

/// Records every event in memory. Used by tests to assert on emission.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LeaveEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<LeaveEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LeaveEvent) {
        self.events
            .lock()
            .expect("event sink lock poisoned")
            .push(event.clone());
    }
}
