//! Compliance gate: policy and segregation-of-duties validation
//!
//! The gate never mutates state. It accumulates every finding so a
//! corrected resubmission can address them all in one pass.
use crate::error::LeaveError;
use crate::ledger::Ledger;
use crate::policy::LeavePolicy;
use crate::request::{ClearanceStatus, LeaveRequest, StepStatus};
use crate::staff::StaffContext;
use crate::types::Role;
use std::fmt;

/// Machine codes surfaced alongside the human-readable messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    InsufficientBalance,
    ExceedsTypeMaximum,
    MissingActingOfficer,
    SegregationOfDutiesViolation,
    ValidatorStepMissing,
    ClearanceNotApproved,
    ClearanceReferenceMissing,
    MissingDeclaration,
    SequenceCorruption,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            IssueCode::ExceedsTypeMaximum => "EXCEEDS_TYPE_MAXIMUM",
            IssueCode::MissingActingOfficer => "MISSING_ACTING_OFFICER",
            IssueCode::SegregationOfDutiesViolation => "SEGREGATION_OF_DUTIES_VIOLATION",
            IssueCode::ValidatorStepMissing => "VALIDATOR_STEP_MISSING",
            IssueCode::ClearanceNotApproved => "CLEARANCE_NOT_APPROVED",
            IssueCode::ClearanceReferenceMissing => "CLEARANCE_REFERENCE_MISSING",
            IssueCode::MissingDeclaration => "MISSING_DECLARATION",
            IssueCode::SequenceCorruption => "SEQUENCE_CORRUPTION",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceIssue {
    pub code: IssueCode,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceReport {
    pub errors: Vec<ComplianceIssue>,
    pub warnings: Vec<ComplianceIssue>,
}

impl ComplianceReport {
    pub fn compliant(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    pub fn has_warning(&self, code: IssueCode) -> bool {
        self.warnings.iter().any(|issue| issue.code == code)
    }

    fn error(&mut self, code: IssueCode, message: impl Into<String>) {
        self.errors.push(ComplianceIssue {
            code,
            message: message.into(),
        });
    }

    fn warning(&mut self, code: IssueCode, message: impl Into<String>) {
        self.warnings.push(ComplianceIssue {
            code,
            message: message.into(),
        });
    }
}

impl fmt::Display for ComplianceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.errors.iter().map(|i| i.code.as_str()).collect();
        write!(f, "[{}]", codes.join(", "))?;
        if !self.warnings.is_empty() {
            let warns: Vec<&str> = self.warnings.iter().map(|i| i.code.as_str()).collect();
            write!(f, " warnings: [{}]", warns.join(", "))?;
        }
        Ok(())
    }
}

/// Which gate pass is running. A pending clearance is tolerated at
/// submission but blocks the final approval level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStage {
    Submission,
    FinalApproval,
}

pub struct ComplianceGate;

impl ComplianceGate {
    /// Run every check and return the accumulated report. Only storage
    /// failures surface as errors; findings never short-circuit.
    pub fn review(
        ledger: &Ledger,
        policy: &LeavePolicy,
        ctx: &StaffContext,
        request: &LeaveRequest,
        stage: ReviewStage,
    ) -> Result<ComplianceReport, LeaveError> {
        let mut report = ComplianceReport::default();

        if !request.declaration_signed {
            report.error(
                IssueCode::MissingDeclaration,
                "the leave declaration must be acknowledged before submission",
            );
        }

        // Sufficiency is gated at submission only. The terminal
        // deduction enforces it atomically; re-reading the counter here
        // would race with concurrent approvals of other requests.
        if stage == ReviewStage::Submission && request.leave_type.consumes_balance() {
            let check = ledger.validate(&request.staff_id, request.leave_type, request.days)?;
            if !check.sufficient {
                report.error(
                    IssueCode::InsufficientBalance,
                    format!(
                        "requested {} {} days with only {} available",
                        request.days,
                        request.leave_type.as_str(),
                        check.current
                    ),
                );
            }
        }

        if let Some(max) = policy.max_days(request.leave_type) {
            if request.days > max {
                report.error(
                    IssueCode::ExceedsTypeMaximum,
                    format!(
                        "{} leave is capped at {} days per request, {} requested",
                        request.leave_type.as_str(),
                        max,
                        request.days
                    ),
                );
            }
        }

        if ctx.critical_post && request.acting_officer_id.is_none() {
            report.error(
                IssueCode::MissingActingOfficer,
                "a critical post may not go on leave without a named acting officer",
            );
        }

        // Structural self-approval scan across the whole chain. The
        // engine re-checks at runtime; this catches misrouted chains.
        for step in &request.chain {
            if step.approver_id.as_deref() == Some(request.staff_id.as_str()) {
                report.error(
                    IssueCode::SegregationOfDutiesViolation,
                    format!("level {} is assigned to the requester", step.level),
                );
            }
        }

        // Director-level chains end at the executive authority instead
        // of the HR validator.
        if !ctx.position.is_director_level() {
            let validator_last = request
                .chain
                .last()
                .is_some_and(|s| s.required_role == Role::HrValidator);
            if !validator_last {
                report.error(
                    IssueCode::ValidatorStepMissing,
                    "the mandatory HR validating step is missing or not last",
                );
            }
        }

        if request.leave_type.requires_clearance() {
            match &request.clearance {
                None => report.error(
                    IssueCode::ClearanceNotApproved,
                    format!(
                        "{} leave requires an external clearance on file",
                        request.leave_type.as_str()
                    ),
                ),
                Some(clearance) => match clearance.status {
                    ClearanceStatus::Pending => {
                        if stage == ReviewStage::FinalApproval {
                            report.error(
                                IssueCode::ClearanceNotApproved,
                                "the external clearance is still pending",
                            );
                        }
                    }
                    ClearanceStatus::Approved => {
                        if clearance.reference.is_none() {
                            report.warning(
                                IssueCode::ClearanceReferenceMissing,
                                "the approved clearance has no reference number yet",
                            );
                        }
                    }
                },
            }
        }

        if !request.sequence_intact() {
            report.error(
                IssueCode::SequenceCorruption,
                "a later step is approved while an earlier one is not",
            );
        }

        // A step must not be decided by the requester either.
        for step in &request.chain {
            if step.status == StepStatus::Approved
                && step.decided_by.as_deref() == Some(request.staff_id.as_str())
            {
                report.error(
                    IssueCode::SegregationOfDutiesViolation,
                    format!("level {} was approved by the requester", step.level),
                );
            }
        }

        Ok(report)
    }
}
