//! Service layer API for leave workflow operations
use crate::compliance::{ComplianceGate, ReviewStage};
use crate::conflict::ConflictDetector;
use crate::engine::ApprovalEngine;
use crate::error::LeaveError;
use crate::events::{EventSink, LeaveEvent, NoopSink};
use crate::ledger::{Backoff, HistoryEntry, Ledger, RetryPolicy, SleepBackoff, YearEndOutcome};
use crate::policy::LeavePolicy;
use crate::request::{ApprovalStep, Clearance, LeaveRequest, RequestStatus};
use crate::router::ChainRouter;
use crate::staff::StaffDirectory;
use crate::types::{DateRange, LeaveDate, LeaveType};
use crate::utils;
use std::sync::Arc;
use tracing::info;

/// Everything a submission carries besides the staff id and dates.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDetails {
    pub declaration_signed: bool,
    pub acting_officer_id: Option<String>,
    pub clearance: Option<Clearance>,
}

pub struct LeaveService {
    directory: Arc<dyn StaffDirectory>,
    policy: LeavePolicy,
    ledger: Ledger,
    engine: ApprovalEngine,
    events: Arc<dyn EventSink>,
}

impl LeaveService {
    /// Wire the service with default retry, backoff, and sink choices.
    pub fn new(
        db: Arc<sled::Db>,
        directory: Arc<dyn StaffDirectory>,
        policy: LeavePolicy,
    ) -> Result<Self, LeaveError> {
        Self::with_options(
            db,
            directory,
            policy,
            RetryPolicy::default(),
            Arc::new(SleepBackoff),
            Arc::new(NoopSink),
            ConflictDetector::default(),
        )
    }

    /// Full dependency injection. Lifecycle of the database handle is
    /// owned by the process entry point, not by this crate.
    pub fn with_options(
        db: Arc<sled::Db>,
        directory: Arc<dyn StaffDirectory>,
        policy: LeavePolicy,
        retry: RetryPolicy,
        backoff: Arc<dyn Backoff>,
        events: Arc<dyn EventSink>,
        detector: ConflictDetector,
    ) -> Result<Self, LeaveError> {
        let ledger = Ledger::open(&db, retry, backoff)?;
        let engine = ApprovalEngine::open(&db, ledger.clone(), events.clone(), detector)?;
        Ok(Self {
            directory,
            policy,
            ledger,
            engine,
            events,
        })
    }

    /// Direct handle to the entitlement ledger, for balance seeding and
    /// history inspection.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Submit a new leave request. The router builds the chain from
    /// directory context, the compliance gate reviews the candidate,
    /// and only a compliant request is persisted.
    pub fn submit_request(
        &self,
        staff_id: &str,
        leave_type: LeaveType,
        dates: DateRange,
        details: SubmissionDetails,
    ) -> Result<LeaveRequest, LeaveError> {
        let ctx = self.directory.staff_context(staff_id)?;
        let chain = ChainRouter::build_chain(&ctx);

        let request = LeaveRequest::new(
            utils::new_uuid_to_bech32("leave_")?,
            staff_id.to_string(),
            leave_type,
            dates,
            chain,
            details.declaration_signed,
            details.acting_officer_id,
            details.clearance,
        );

        let report = ComplianceGate::review(
            &self.ledger,
            &self.policy,
            &ctx,
            &request,
            ReviewStage::Submission,
        )?;
        if !report.compliant() {
            return Err(LeaveError::Compliance(report));
        }

        self.engine.insert_new(&request)?;
        info!(
            request_id = %request.request_id,
            staff_id,
            leave_type = leave_type.as_str(),
            days = request.days,
            levels = request.chain.len(),
            "leave request submitted"
        );
        Ok(request)
    }

    /// Approve one level. The final level re-runs the compliance gate
    /// before the entitlement is deducted.
    pub fn approve(
        &self,
        request_id: &str,
        level: u32,
        approver_id: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let request = self.engine.load(request_id)?;
        if request.status == RequestStatus::Pending && level == request.last_level() {
            let ctx = self.directory.staff_context(&request.staff_id)?;
            let report = ComplianceGate::review(
                &self.ledger,
                &self.policy,
                &ctx,
                &request,
                ReviewStage::FinalApproval,
            )?;
            if !report.compliant() {
                return Err(LeaveError::Compliance(report));
            }
        }

        let request = self.engine.approve(request_id, level, approver_id)?;
        info!(
            request_id,
            level,
            approver_id,
            status = ?request.status,
            "approval recorded"
        );
        Ok(request)
    }

    pub fn reject(
        &self,
        request_id: &str,
        level: u32,
        approver_id: &str,
        comments: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let request = self.engine.reject(request_id, level, approver_id, comments)?;
        info!(request_id, level, approver_id, "request rejected");
        Ok(request)
    }

    pub fn delegate(
        &self,
        request_id: &str,
        level: u32,
        from_approver_id: &str,
        to_approver_id: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let request = self
            .engine
            .delegate(request_id, level, from_approver_id, to_approver_id)?;
        info!(request_id, level, from_approver_id, to_approver_id, "step delegated");
        Ok(request)
    }

    pub fn cancel_request(
        &self,
        request_id: &str,
        actor_id: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let request = self.engine.cancel(request_id, actor_id)?;
        info!(request_id, actor_id, "request cancelled");
        Ok(request)
    }

    pub fn get_balance(&self, staff_id: &str, leave_type: LeaveType) -> Result<u32, LeaveError> {
        self.ledger.balance(staff_id, leave_type)
    }

    pub fn get_request(&self, request_id: &str) -> Result<LeaveRequest, LeaveError> {
        self.engine.load(request_id)
    }

    pub fn get_approval_chain(&self, request_id: &str) -> Result<Vec<ApprovalStep>, LeaveError> {
        Ok(self.engine.load(request_id)?.chain)
    }

    pub fn get_history(&self, staff_id: &str) -> Result<Vec<HistoryEntry>, LeaveError> {
        self.ledger.history(staff_id)
    }

    /// Year-end batch: reconcile every annual counter against the
    /// carry-over policy. Covers the active roster plus anyone still
    /// holding a balance record, so residual balances of staff who left
    /// the directory are not exempt from forfeiture.
    pub fn run_year_end_processing(
        &self,
        effective: LeaveDate,
    ) -> Result<Vec<YearEndOutcome>, LeaveError> {
        let mut roster = self.directory.active_staff();
        for staff_id in self.ledger.staff_with_balances()? {
            if !roster.contains(&staff_id) {
                roster.push(staff_id);
            }
        }
        roster.sort();

        let mut outcomes = Vec::new();
        for staff_id in roster {
            let outcome = self.ledger.apply_year_end(&staff_id, &self.policy, effective)?;
            self.events.emit(&LeaveEvent::YearEndApplied {
                staff_id: staff_id.clone(),
                carried: outcome.carried,
                forfeited: outcome.forfeited,
                accrued: outcome.accrued,
            });
            info!(
                staff_id,
                carried = outcome.carried,
                forfeited = outcome.forfeited,
                accrued = outcome.accrued,
                "year-end reconciliation applied"
            );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
