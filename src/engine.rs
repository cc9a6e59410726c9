//! Approval workflow engine: sequential multi-level state machine
//!
//! Requests are persisted with their chain and a current-level cursor.
//! Every mutation is a version-guarded conditional write, so two
//! concurrent decisions on the same level resolve to exactly one
//! success. Terminal transitions drive the ledger: full approval
//! deducts, cancellation of an approved request restores.
use crate::conflict::ConflictDetector;
use crate::error::LeaveError;
use crate::events::{EventSink, LeaveEvent};
use crate::ledger::Ledger;
use crate::request::{LeaveRequest, RequestStatus, StepStatus};
use crate::types::TimeStamp;
use crate::utils;
use std::sync::Arc;
use tracing::{error, warn};

pub struct ApprovalEngine {
    requests: sled::Tree,
    ledger: Ledger,
    events: Arc<dyn EventSink>,
    detector: ConflictDetector,
}

impl ApprovalEngine {
    pub fn open(
        db: &sled::Db,
        ledger: Ledger,
        events: Arc<dyn EventSink>,
        detector: ConflictDetector,
    ) -> Result<Self, LeaveError> {
        Ok(Self {
            requests: db.open_tree("requests")?,
            ledger,
            events,
            detector,
        })
    }

    pub fn load(&self, request_id: &str) -> Result<LeaveRequest, LeaveError> {
        let bytes = self
            .requests
            .get(request_id.as_bytes())?
            .ok_or_else(|| LeaveError::NotFound(format!("no request {request_id}")))?;
        utils::from_cbor(&bytes)
    }

    /// Persist a freshly submitted request. The id is new, so a key
    /// collision means something upstream went badly wrong.
    pub fn insert_new(&self, request: &LeaveRequest) -> Result<(), LeaveError> {
        let bytes = utils::to_cbor(request)?;
        self.requests
            .compare_and_swap(request.request_id.as_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| LeaveError::Conflict)?;
        self.events.emit(&LeaveEvent::RequestSubmitted {
            request_id: request.request_id.clone(),
            staff_id: request.staff_id.clone(),
        });
        Ok(())
    }

    /// Approve one level. Must be the current lowest pending level and
    /// must not come from the requester. Approving the last level
    /// deducts the entitlement and completes the request.
    pub fn approve(
        &self,
        request_id: &str,
        level: u32,
        approver_id: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let (old, mut request) = self.load_raw(request_id)?;

        Self::ensure_pending(&request)?;
        if approver_id == request.staff_id {
            return Err(LeaveError::SelfApproval(format!(
                "{approver_id} may not approve their own request"
            )));
        }
        Self::ensure_current_level(&request, level)?;
        Self::ensure_assigned(&request, level, approver_id)?;

        let step = request
            .step_mut(level)
            .ok_or_else(|| LeaveError::State(format!("no level {level} in the chain")))?;
        step.status = StepStatus::Approved;
        step.decided_by = Some(approver_id.to_string());
        step.decided_at = Some(TimeStamp::new());

        let last = level == request.last_level();
        let mut deducted_now = false;
        if last {
            // Deduct before committing the terminal transition. A
            // ledger conflict leaves the request pending at level N so
            // the caller can retry the same approve.
            if request.leave_type.consumes_balance() && !request.deducted {
                if let Err(err) =
                    self.ledger
                        .deduct(&request.staff_id, request.leave_type, request.days)
                {
                    return Err(self.reclassify_lost_race(request_id, &request, err));
                }
                request.deducted = true;
                deducted_now = true;
            }
            request.status = RequestStatus::Approved;
        } else {
            request.current_level += 1;
        }

        if let Err(err) = self.save(&old, &mut request) {
            if deducted_now {
                self.compensate_deduction(&request);
            }
            return Err(err);
        }

        self.audit_timing(&request);
        self.events.emit(&LeaveEvent::StepApproved {
            request_id: request.request_id.clone(),
            level,
            approver_id: approver_id.to_string(),
        });
        if last {
            if deducted_now {
                self.events.emit(&LeaveEvent::BalanceDeducted {
                    staff_id: request.staff_id.clone(),
                    leave_type: request.leave_type,
                    days: request.days,
                });
            }
            self.events.emit(&LeaveEvent::RequestApproved {
                request_id: request.request_id.clone(),
            });
        }
        Ok(request)
    }

    /// Reject the current level. All remaining steps are skipped and
    /// the request terminates; the ledger is untouched because no
    /// deduction has happened yet.
    pub fn reject(
        &self,
        request_id: &str,
        level: u32,
        approver_id: &str,
        comments: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let (old, mut request) = self.load_raw(request_id)?;

        Self::ensure_pending(&request)?;
        if approver_id == request.staff_id {
            return Err(LeaveError::SelfApproval(format!(
                "{approver_id} may not decide their own request"
            )));
        }
        Self::ensure_current_level(&request, level)?;
        Self::ensure_assigned(&request, level, approver_id)?;

        let step = request
            .step_mut(level)
            .ok_or_else(|| LeaveError::State(format!("no level {level} in the chain")))?;
        step.status = StepStatus::Rejected;
        step.decided_by = Some(approver_id.to_string());
        step.decided_at = Some(TimeStamp::new());
        step.comments = Some(comments.to_string());

        for step in request.chain.iter_mut().filter(|s| s.level > level) {
            if step.status.is_open() {
                step.status = StepStatus::Skipped;
            }
        }
        request.status = RequestStatus::Rejected;

        self.save(&old, &mut request)?;
        self.events.emit(&LeaveEvent::RequestRejected {
            request_id: request.request_id.clone(),
            level,
        });
        Ok(request)
    }

    /// Reassign an open step to another approver. The step stays
    /// awaiting a decision; self-delegation and delegation to the
    /// requester are forbidden.
    pub fn delegate(
        &self,
        request_id: &str,
        level: u32,
        from_approver_id: &str,
        to_approver_id: &str,
    ) -> Result<LeaveRequest, LeaveError> {
        let (old, mut request) = self.load_raw(request_id)?;

        Self::ensure_pending(&request)?;
        if from_approver_id == to_approver_id {
            return Err(LeaveError::State(format!(
                "{from_approver_id} cannot delegate a step to themselves"
            )));
        }
        if to_approver_id == request.staff_id {
            return Err(LeaveError::SelfApproval(format!(
                "a step may not be delegated to the requester {to_approver_id}"
            )));
        }

        let step = request
            .step_mut(level)
            .ok_or_else(|| LeaveError::State(format!("no level {level} in the chain")))?;
        if !step.status.is_open() {
            return Err(LeaveError::State(format!(
                "level {level} is already decided"
            )));
        }
        if let Some(assigned) = &step.approver_id {
            if assigned != from_approver_id {
                return Err(LeaveError::State(format!(
                    "level {level} is assigned to {assigned}, not {from_approver_id}"
                )));
            }
        }
        step.delegated_from = Some(from_approver_id.to_string());
        step.approver_id = Some(to_approver_id.to_string());
        step.status = StepStatus::Delegated;

        self.save(&old, &mut request)?;
        self.events.emit(&LeaveEvent::StepDelegated {
            request_id: request.request_id.clone(),
            level,
            to: to_approver_id.to_string(),
        });
        Ok(request)
    }

    /// Cancel a request. While pending there is no ledger effect; after
    /// full approval the deducted days are restored, at most once.
    /// Cancelling an already-cancelled request is a no-op.
    pub fn cancel(&self, request_id: &str, actor_id: &str) -> Result<LeaveRequest, LeaveError> {
        let (old, mut request) = self.load_raw(request_id)?;

        let mut restored_now = false;
        match request.status {
            RequestStatus::Cancelled => return Ok(request),
            RequestStatus::Rejected => {
                return Err(LeaveError::State(
                    "a rejected request cannot be cancelled".into(),
                ));
            }
            RequestStatus::Pending => {
                for step in request.chain.iter_mut() {
                    if step.status.is_open() {
                        step.status = StepStatus::Skipped;
                    }
                }
                request.status = RequestStatus::Cancelled;
            }
            RequestStatus::Approved => {
                if request.deducted && !request.restored {
                    self.ledger
                        .restore(&request.staff_id, request.leave_type, request.days)?;
                    request.restored = true;
                    restored_now = true;
                }
                request.status = RequestStatus::Cancelled;
            }
        }

        if let Err(err) = self.save(&old, &mut request) {
            if restored_now {
                self.compensate_restoration(&request);
            }
            return Err(err);
        }

        if restored_now {
            self.events.emit(&LeaveEvent::BalanceRestored {
                staff_id: request.staff_id.clone(),
                leave_type: request.leave_type,
                days: request.days,
            });
        }
        self.events.emit(&LeaveEvent::RequestCancelled {
            request_id: request.request_id.clone(),
            actor_id: actor_id.to_string(),
        });
        Ok(request)
    }

    fn load_raw(&self, request_id: &str) -> Result<(sled::IVec, LeaveRequest), LeaveError> {
        let bytes = self
            .requests
            .get(request_id.as_bytes())?
            .ok_or_else(|| LeaveError::NotFound(format!("no request {request_id}")))?;
        let request = utils::from_cbor(&bytes)?;
        Ok((bytes, request))
    }

    /// Conditional write predicated on the bytes the decision was made
    /// from. A lost race is a conflict; the caller re-reads and may
    /// retry if the operation still applies.
    fn save(&self, old: &sled::IVec, request: &mut LeaveRequest) -> Result<(), LeaveError> {
        request.version += 1;
        let bytes = utils::to_cbor(request)?;
        self.requests
            .compare_and_swap(request.request_id.as_bytes(), Some(old), Some(bytes))?
            .map_err(|_| LeaveError::Conflict)
    }

    fn ensure_pending(request: &LeaveRequest) -> Result<(), LeaveError> {
        if request.status.is_terminal() {
            return Err(LeaveError::State(format!(
                "request {} is already {:?}",
                request.request_id, request.status
            )));
        }
        Ok(())
    }

    fn ensure_current_level(request: &LeaveRequest, level: u32) -> Result<(), LeaveError> {
        if level != request.current_level {
            return Err(LeaveError::State(format!(
                "level {level} is not current; the chain is waiting on level {}",
                request.current_level
            )));
        }
        // The cursor is authoritative, but a corrupted chain must not
        // let an approval slip past an undecided earlier level.
        for step in request.chain.iter().filter(|s| s.level < level) {
            if step.status != StepStatus::Approved {
                return Err(LeaveError::State(format!(
                    "level {} has not been approved yet",
                    step.level
                )));
            }
        }
        Ok(())
    }

    fn ensure_assigned(
        request: &LeaveRequest,
        level: u32,
        approver_id: &str,
    ) -> Result<(), LeaveError> {
        if let Some(step) = request.step(level) {
            if !step.status.is_open() {
                return Err(LeaveError::State(format!(
                    "level {level} is already decided"
                )));
            }
            if let Some(assigned) = &step.approver_id {
                if assigned != approver_id {
                    return Err(LeaveError::State(format!(
                        "level {level} is assigned to {assigned}, not {approver_id}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// A losing final approver can hit the ledger after the winner's
    /// deduction already landed. When the counter held exactly the
    /// requested days that surfaces as an insufficient balance, which
    /// would mislead the caller about a request that did get approved.
    /// Re-read the request and report the race for what it was.
    fn reclassify_lost_race(
        &self,
        request_id: &str,
        seen: &LeaveRequest,
        err: LeaveError,
    ) -> LeaveError {
        if !matches!(err, LeaveError::InsufficientBalance { .. }) {
            return err;
        }
        // The winner may have deducted without having committed its
        // terminal write yet. Give it the same bounded patience as a
        // lost ledger race before concluding the shortfall is real.
        for attempt in 0..=self.ledger.max_retries() {
            match self.load(request_id) {
                Ok(current) if current.status.is_terminal() => {
                    return LeaveError::State(format!(
                        "request {} is already {:?}",
                        current.request_id, current.status
                    ));
                }
                Ok(current) if current.version != seen.version => return LeaveError::Conflict,
                _ => self.ledger.wait(attempt),
            }
        }
        err
    }

    /// The terminal write lost its race after the ledger was already
    /// deducted: give the days back so the balance stays exact.
    fn compensate_deduction(&self, request: &LeaveRequest) {
        if let Err(err) =
            self.ledger
                .restore(&request.staff_id, request.leave_type, request.days)
        {
            error!(
                request_id = %request.request_id,
                staff_id = %request.staff_id,
                %err,
                "failed to compensate a deduction after a lost write race"
            );
        }
    }

    fn compensate_restoration(&self, request: &LeaveRequest) {
        if let Err(err) = self
            .ledger
            .deduct(&request.staff_id, request.leave_type, request.days)
        {
            error!(
                request_id = %request.request_id,
                staff_id = %request.staff_id,
                %err,
                "failed to compensate a restoration after a lost write race"
            );
        }
    }

    fn audit_timing(&self, request: &LeaveRequest) {
        for flag in self.detector.scan(&request.chain) {
            warn!(
                request_id = %request.request_id,
                first_level = flag.first_level,
                second_level = flag.second_level,
                gap_ms = flag.gap_ms,
                "suspiciously concurrent step decisions"
            );
            self.events.emit(&LeaveEvent::SuspiciousApprovalTiming {
                request_id: request.request_id.clone(),
                first_level: flag.first_level,
                second_level: flag.second_level,
            });
        }
    }
}
