//! Leave request and approval chain records
use crate::types::{DateRange, LeaveType, Role, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Delegated,
    #[n(4)]
    Skipped,
}

impl StepStatus {
    /// A step still awaiting a decision. Delegation reassigns the
    /// approver but leaves the step open.
    pub fn is_open(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::Delegated)
    }
}

/// Status of the externally tracked clearance some leave types need.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearanceStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
}

/// Reference to an external clearance decision. The reference number is
/// issued by the clearing office and may lag the decision itself.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Clearance {
    #[n(0)]
    pub status: ClearanceStatus,
    #[n(1)]
    pub reference: Option<String>,
}

/// One level of the approval chain. Mutated only by the workflow
/// engine; status moves forward only.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ApprovalStep {
    #[n(0)]
    pub level: u32,
    #[n(1)]
    pub required_role: Role,
    /// Bound approver, when the directory knows who holds the role. A
    /// role-only step stays unassigned until somebody acts on it.
    #[n(2)]
    pub approver_id: Option<String>,
    #[n(3)]
    pub status: StepStatus,
    #[n(4)]
    pub decided_by: Option<String>,
    #[n(5)]
    pub decided_at: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub comments: Option<String>,
    /// Original approver when the step was delegated away.
    #[n(7)]
    pub delegated_from: Option<String>,
}

impl ApprovalStep {
    pub fn new(level: u32, required_role: Role, approver_id: Option<String>) -> Self {
        Self {
            level,
            required_role,
            approver_id,
            status: StepStatus::Pending,
            decided_by: None,
            decided_at: None,
            comments: None,
            delegated_from: None,
        }
    }
}

/// One entitlement-consuming request with its persisted approval chain
/// and current-level cursor.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct LeaveRequest {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub staff_id: String,
    #[n(2)]
    pub leave_type: LeaveType,
    #[n(3)]
    pub dates: DateRange,
    #[n(4)]
    pub days: u32,
    #[n(5)]
    pub status: RequestStatus,
    #[n(6)]
    pub chain: Vec<ApprovalStep>,
    /// Lowest level still awaiting a decision. Maintained by the engine
    /// instead of being re-derived by scanning the chain.
    #[n(7)]
    pub current_level: u32,
    #[n(8)]
    pub version: u64,
    #[n(9)]
    pub deducted: bool,
    #[n(10)]
    pub restored: bool,
    #[n(11)]
    pub declaration_signed: bool,
    #[n(12)]
    pub acting_officer_id: Option<String>,
    #[n(13)]
    pub clearance: Option<Clearance>,
    #[n(14)]
    pub submitted_at: TimeStamp<Utc>,
}

impl LeaveRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: String,
        staff_id: String,
        leave_type: LeaveType,
        dates: DateRange,
        chain: Vec<ApprovalStep>,
        declaration_signed: bool,
        acting_officer_id: Option<String>,
        clearance: Option<Clearance>,
    ) -> Self {
        let days = dates.day_count();
        Self {
            request_id,
            staff_id,
            leave_type,
            dates,
            days,
            status: RequestStatus::Pending,
            chain,
            current_level: 1,
            version: 0,
            deducted: false,
            restored: false,
            declaration_signed,
            acting_officer_id,
            clearance,
            submitted_at: TimeStamp::new(),
        }
    }

    pub fn step(&self, level: u32) -> Option<&ApprovalStep> {
        self.chain.iter().find(|s| s.level == level)
    }

    pub fn step_mut(&mut self, level: u32) -> Option<&mut ApprovalStep> {
        self.chain.iter_mut().find(|s| s.level == level)
    }

    pub fn last_level(&self) -> u32 {
        self.chain.len() as u32
    }

    /// Audit check: no step may be approved while an earlier one is
    /// not. Detects corrupted chains, not just runtime races.
    pub fn sequence_intact(&self) -> bool {
        let mut blocked = false;
        for step in &self.chain {
            match step.status {
                StepStatus::Approved if blocked => return false,
                StepStatus::Approved => {}
                _ => blocked = true,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeaveDate;

    fn request_with(statuses: &[StepStatus]) -> LeaveRequest {
        let chain = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut step = ApprovalStep::new(i as u32 + 1, Role::Supervisor, None);
                step.status = *status;
                step
            })
            .collect();
        LeaveRequest::new(
            "leave_x".into(),
            "staff_x".into(),
            LeaveType::Annual,
            DateRange::new(LeaveDate::from_ymd(2025, 5, 5), LeaveDate::from_ymd(2025, 5, 9))
                .unwrap(),
            chain,
            true,
            None,
            None,
        )
    }

    #[test]
    fn intact_sequence_passes_audit() {
        use StepStatus::*;
        assert!(request_with(&[Approved, Approved, Pending]).sequence_intact());
        assert!(request_with(&[Pending, Pending]).sequence_intact());
    }

    #[test]
    fn approval_after_gap_fails_audit() {
        use StepStatus::*;
        assert!(!request_with(&[Pending, Approved]).sequence_intact());
        assert!(!request_with(&[Approved, Rejected, Approved]).sequence_intact());
    }
}
