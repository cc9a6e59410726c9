//! Structured error taxonomy for ledger and workflow operations
use crate::compliance::ComplianceReport;
use crate::types::LeaveType;

#[derive(thiserror::Error, Debug)]
pub enum LeaveError {
    /// Malformed input the caller can fix before resubmitting.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested more days than the entitlement holds.
    #[error(
        "insufficient {} balance: requested {requested}, available {available}",
        leave_type.as_str()
    )]
    InsufficientBalance {
        leave_type: LeaveType,
        requested: u32,
        available: u32,
    },

    /// One or more compliance checks failed. Carries every finding so a
    /// corrected resubmission can address them all in one pass.
    #[error("compliance checks failed: {0}")]
    Compliance(ComplianceReport),

    /// Optimistic-lock retries exhausted or a concurrent writer won the
    /// race. Safe for the caller to retry the same operation.
    #[error("concurrent update conflict, retries exhausted")]
    Conflict,

    /// Illegal state transition: wrong level, terminal request, or a
    /// step assigned to somebody else.
    #[error("invalid state transition: {0}")]
    State(String),

    /// The acting approver is the requester. Rejected regardless of role.
    #[error("self-approval is forbidden: {0}")]
    SelfApproval(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec failure: {0}")]
    Codec(String),
}

impl LeaveError {
    /// Only conflicts are worth retrying verbatim; everything else needs
    /// a changed request or indicates a caller bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeaveError::Conflict)
    }
}
