//! Per-leave-type policy knobs sourced from the configuration store
use crate::types::LeaveType;
use std::collections::HashMap;

/// Read-only policy consumed by the compliance gate and the year-end
/// batch. Loaded once at startup and passed in by the caller.
#[derive(Debug, Clone)]
pub struct LeavePolicy {
    /// Longest single request allowed per leave type. Types without an
    /// entry are uncapped.
    pub max_request_days: HashMap<LeaveType, u32>,
    /// Most annual days that survive into the next period.
    pub carry_over_cap: u32,
    /// Annual days granted to every active staff member at year end.
    pub annual_accrual: u32,
}

impl LeavePolicy {
    pub fn max_days(&self, leave_type: LeaveType) -> Option<u32> {
        self.max_request_days.get(&leave_type).copied()
    }
}

impl Default for LeavePolicy {
    fn default() -> Self {
        let max_request_days = HashMap::from([
            (LeaveType::Annual, 30),
            (LeaveType::Sick, 15),
            (LeaveType::Maternity, 98),
            (LeaveType::Paternity, 10),
            (LeaveType::Compassionate, 7),
            (LeaveType::Study, 30),
        ]);
        Self {
            max_request_days,
            carry_over_cap: 10,
            annual_accrual: 30,
        }
    }
}
