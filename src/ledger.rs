//! Entitlement ledger: balance storage under optimistic concurrency
//!
//! Balance records are mutated only through the version-guarded
//! conditional-write path in [`Ledger::with_optimistic_lock`]. Every
//! successful write appends history entries; replaying a staff member's
//! history from zero reproduces the current record.
use crate::error::LeaveError;
use crate::policy::LeavePolicy;
use crate::types::{LeaveDate, LeaveType, TimeStamp};
use crate::utils;
use chrono::Utc;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Bounds for the optimistic-lock retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        }
    }
}

/// Injectable wait strategy between conditional-write retries, so unit
/// tests run without real sleeps.
pub trait Backoff: Send + Sync {
    fn wait(&self, attempt: u32, policy: &RetryPolicy);
}

/// Exponential backoff: base delay doubling per attempt, capped.
pub struct SleepBackoff;

impl Backoff for SleepBackoff {
    fn wait(&self, attempt: u32, policy: &RetryPolicy) {
        let exp = policy.base_delay.saturating_mul(1u32 << attempt.min(16));
        std::thread::sleep(exp.min(policy.max_delay));
    }
}

/// Deterministic no-wait strategy for tests.
pub struct NoWaitBackoff;

impl Backoff for NoWaitBackoff {
    fn wait(&self, _: u32, _: &RetryPolicy) {}
}

/// One entitlement record per staff member: a fixed set of day counters
/// plus the version guarding every conditional write.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    #[n(0)]
    pub staff_id: String,
    #[n(1)]
    pub annual: u32,
    #[n(2)]
    pub sick: u32,
    #[n(3)]
    pub maternity: u32,
    #[n(4)]
    pub paternity: u32,
    #[n(5)]
    pub compassionate: u32,
    #[n(6)]
    pub study: u32,
    #[n(7)]
    pub version: u64,
}

impl BalanceRecord {
    pub fn empty(staff_id: impl Into<String>) -> Self {
        Self {
            staff_id: staff_id.into(),
            annual: 0,
            sick: 0,
            maternity: 0,
            paternity: 0,
            compassionate: 0,
            study: 0,
            version: 0,
        }
    }

    /// Unpaid leave has no counter and always reads zero.
    pub fn get(&self, leave_type: LeaveType) -> u32 {
        match leave_type {
            LeaveType::Annual => self.annual,
            LeaveType::Sick => self.sick,
            LeaveType::Maternity => self.maternity,
            LeaveType::Paternity => self.paternity,
            LeaveType::Compassionate => self.compassionate,
            LeaveType::Study => self.study,
            LeaveType::Unpaid => 0,
        }
    }

    fn counter_mut(&mut self, leave_type: LeaveType) -> Option<&mut u32> {
        match leave_type {
            LeaveType::Annual => Some(&mut self.annual),
            LeaveType::Sick => Some(&mut self.sick),
            LeaveType::Maternity => Some(&mut self.maternity),
            LeaveType::Paternity => Some(&mut self.paternity),
            LeaveType::Compassionate => Some(&mut self.compassionate),
            LeaveType::Study => Some(&mut self.study),
            LeaveType::Unpaid => None,
        }
    }
}

/// Why a balance changed. Stored on every history entry.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    #[n(0)]
    Deduction,
    #[n(1)]
    Restoration,
    #[n(2)]
    YearEndCarryForward,
    #[n(3)]
    YearEndForfeiture,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::Deduction => "deduction",
            ChangeReason::Restoration => "restoration",
            ChangeReason::YearEndCarryForward => "year-end-carry-forward",
            ChangeReason::YearEndForfeiture => "year-end-forfeiture",
        }
    }
}

/// Immutable, append-only record of one balance change.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    #[n(0)]
    pub staff_id: String,
    #[n(1)]
    pub leave_type: LeaveType,
    #[n(2)]
    pub delta: i64,
    #[n(3)]
    pub balance_before: u32,
    #[n(4)]
    pub balance_after: u32,
    #[n(5)]
    pub reason: ChangeReason,
    #[n(6)]
    pub recorded_at: TimeStamp<Utc>,
}

/// Read-only result of a balance sufficiency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCheck {
    pub sufficient: bool,
    pub current: u32,
}

/// What the year-end batch did to one staff member's annual counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearEndOutcome {
    pub staff_id: String,
    pub effective: LeaveDate,
    pub carried: u32,
    pub forfeited: u32,
    pub accrued: u32,
}

#[derive(Clone)]
pub struct Ledger {
    balances: sled::Tree,
    history: sled::Tree,
    retry: RetryPolicy,
    backoff: Arc<dyn Backoff>,
}

impl Ledger {
    pub fn open(
        db: &sled::Db,
        retry: RetryPolicy,
        backoff: Arc<dyn Backoff>,
    ) -> Result<Self, LeaveError> {
        Ok(Self {
            balances: db.open_tree("balances")?,
            history: db.open_tree("balance_history")?,
            retry,
            backoff,
        })
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }

    pub(crate) fn wait(&self, attempt: u32) {
        self.backoff.wait(attempt, &self.retry);
    }

    /// Current record for one staff member, if any mutation has ever
    /// touched it.
    pub fn record(&self, staff_id: &str) -> Result<Option<BalanceRecord>, LeaveError> {
        match self.balances.get(staff_id.as_bytes())? {
            Some(bytes) => Ok(Some(utils::from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Pure read of the remaining days for one leave type. A missing
    /// record reads as zero.
    pub fn balance(&self, staff_id: &str, leave_type: LeaveType) -> Result<u32, LeaveError> {
        Ok(self
            .record(staff_id)?
            .map(|r| r.get(leave_type))
            .unwrap_or(0))
    }

    /// Read-only sufficiency check. Exempt types always report
    /// sufficient.
    pub fn validate(
        &self,
        staff_id: &str,
        leave_type: LeaveType,
        requested: u32,
    ) -> Result<BalanceCheck, LeaveError> {
        if !leave_type.consumes_balance() {
            return Ok(BalanceCheck {
                sufficient: true,
                current: 0,
            });
        }
        let current = self.balance(staff_id, leave_type)?;
        Ok(BalanceCheck {
            sufficient: current >= requested,
            current,
        })
    }

    /// Consume days from an entitlement. Fails with
    /// [`LeaveError::InsufficientBalance`] without retrying when the
    /// counter is too low; conflicting writers are retried per the
    /// configured policy.
    pub fn deduct(
        &self,
        staff_id: &str,
        leave_type: LeaveType,
        days: u32,
    ) -> Result<u32, LeaveError> {
        if days == 0 {
            return Err(LeaveError::Validation("cannot deduct zero days".into()));
        }
        let record = self.with_optimistic_lock(staff_id, |record| {
            let mut record = record.ok_or_else(|| LeaveError::NotFound(format!(
                "no balance record for staff {staff_id}"
            )))?;
            let before = record.get(leave_type);
            if before < days {
                return Err(LeaveError::InsufficientBalance {
                    leave_type,
                    requested: days,
                    available: before,
                });
            }
            let counter = record.counter_mut(leave_type).ok_or_else(|| {
                LeaveError::Validation(format!(
                    "{} leave carries no balance to deduct",
                    leave_type.as_str()
                ))
            })?;
            *counter = before - days;
            let entry = HistoryEntry {
                staff_id: staff_id.to_string(),
                leave_type,
                delta: -i64::from(days),
                balance_before: before,
                balance_after: before - days,
                reason: ChangeReason::Deduction,
                recorded_at: TimeStamp::new(),
            };
            Ok((record, vec![entry]))
        })?;
        Ok(record.get(leave_type))
    }

    /// Give days back after a cancellation. Creates the balance record
    /// on first touch, so restoration never fails for a missing record.
    pub fn restore(
        &self,
        staff_id: &str,
        leave_type: LeaveType,
        days: u32,
    ) -> Result<u32, LeaveError> {
        if days == 0 {
            return Err(LeaveError::Validation("cannot restore zero days".into()));
        }
        let record = self.with_optimistic_lock(staff_id, |record| {
            let mut record = record.unwrap_or_else(|| BalanceRecord::empty(staff_id));
            let before = record.get(leave_type);
            let counter = record.counter_mut(leave_type).ok_or_else(|| {
                LeaveError::Validation(format!(
                    "{} leave carries no balance to restore",
                    leave_type.as_str()
                ))
            })?;
            *counter = before.saturating_add(days);
            let after = before.saturating_add(days);
            let entry = HistoryEntry {
                staff_id: staff_id.to_string(),
                leave_type,
                delta: i64::from(days),
                balance_before: before,
                balance_after: after,
                reason: ChangeReason::Restoration,
                recorded_at: TimeStamp::new(),
            };
            Ok((record, vec![entry]))
        })?;
        Ok(record.get(leave_type))
    }

    /// Year-end reconciliation of the annual counter: forfeit everything
    /// over the carry-over cap, then grant the new period's accrual.
    pub fn apply_year_end(
        &self,
        staff_id: &str,
        policy: &LeavePolicy,
        effective: LeaveDate,
    ) -> Result<YearEndOutcome, LeaveError> {
        let cap = policy.carry_over_cap;
        let accrual = policy.annual_accrual;
        let mut carried = 0u32;
        let mut forfeited = 0u32;
        self.with_optimistic_lock(staff_id, |record| {
            let mut record = record.unwrap_or_else(|| BalanceRecord::empty(staff_id));
            let mut entries = Vec::new();
            let mut annual = record.get(LeaveType::Annual);
            forfeited = annual.saturating_sub(cap);
            if forfeited > 0 {
                entries.push(HistoryEntry {
                    staff_id: staff_id.to_string(),
                    leave_type: LeaveType::Annual,
                    delta: -i64::from(forfeited),
                    balance_before: annual,
                    balance_after: cap,
                    reason: ChangeReason::YearEndForfeiture,
                    recorded_at: TimeStamp::new(),
                });
                annual = cap;
            }
            carried = annual;
            if accrual > 0 {
                entries.push(HistoryEntry {
                    staff_id: staff_id.to_string(),
                    leave_type: LeaveType::Annual,
                    delta: i64::from(accrual),
                    balance_before: annual,
                    balance_after: annual + accrual,
                    reason: ChangeReason::YearEndCarryForward,
                    recorded_at: TimeStamp::new(),
                });
                annual += accrual;
            }
            record.annual = annual;
            Ok((record, entries))
        })?;
        Ok(YearEndOutcome {
            staff_id: staff_id.to_string(),
            effective,
            carried,
            forfeited,
            accrued: accrual,
        })
    }

    /// All balance changes recorded for one staff member, oldest first.
    pub fn history(&self, staff_id: &str) -> Result<Vec<HistoryEntry>, LeaveError> {
        let mut entries = Vec::new();
        for item in self.history.scan_prefix(format!("{staff_id}/").as_bytes()) {
            let (_, bytes) = item?;
            entries.push(utils::from_cbor(&bytes)?);
        }
        Ok(entries)
    }

    /// Staff ids that currently hold a balance record. The year-end
    /// batch unions this with the active roster so residual balances of
    /// separated staff are still reconciled.
    pub fn staff_with_balances(&self) -> Result<Vec<String>, LeaveError> {
        let mut ids = Vec::new();
        for item in self.balances.iter() {
            let (key, _) = item?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    /// Optimistic-lock-with-retry combinator: read the current record,
    /// let the mutator compute its successor plus history entries, then
    /// commit both in one transaction predicated on the version read.
    /// The record never advances without its history entries or vice
    /// versa. A lost race re-reads and retries with backoff; exhaustion
    /// surfaces a retryable [`LeaveError::Conflict`]. Mutator errors
    /// abort immediately without retrying.
    fn with_optimistic_lock<F>(&self, staff_id: &str, mut mutate: F) -> Result<BalanceRecord, LeaveError>
    where
        F: FnMut(Option<BalanceRecord>) -> Result<(BalanceRecord, Vec<HistoryEntry>), LeaveError>,
    {
        let key = staff_id.as_bytes();
        for attempt in 0..=self.retry.max_retries {
            let current = self.record(staff_id)?;
            let seen_version = current.as_ref().map(|r| r.version);
            let (mut next, entries) = mutate(current)?;
            next.version += 1;
            let new_bytes = utils::to_cbor(&next)?;

            // History keys carry the committed version in fixed-width
            // hex, so a prefix scan replays entries in commit order
            // even when a slower writer commits after a faster one.
            let mut history_rows = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                let entry_key = format!("{staff_id}/{:016x}/{i:02}", next.version);
                history_rows.push((entry_key, utils::to_cbor(entry)?));
            }

            let committed = (&self.balances, &self.history)
                .transaction(|(balances, history)| {
                    let stored_version = match balances.get(key)? {
                        Some(bytes) => Some(
                            utils::from_cbor::<BalanceRecord>(&bytes)
                                .map_err(ConflictableTransactionError::Abort)?
                                .version,
                        ),
                        None => None,
                    };
                    if stored_version != seen_version {
                        // another writer won; commit nothing
                        return Ok(false);
                    }
                    balances.insert(key, new_bytes.as_slice())?;
                    for (entry_key, entry_bytes) in &history_rows {
                        history.insert(entry_key.as_bytes(), entry_bytes.as_slice())?;
                    }
                    Ok(true)
                })
                .map_err(|err| match err {
                    TransactionError::Abort(err) => err,
                    TransactionError::Storage(err) => LeaveError::Storage(err),
                })?;

            if committed {
                return Ok(next);
            }
            self.backoff.wait(attempt, &self.retry);
        }
        warn!(
            staff_id,
            attempts = self.retry.max_retries + 1,
            "conditional write lost every attempt"
        );
        Err(LeaveError::Conflict)
    }
}
