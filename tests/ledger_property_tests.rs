//! Property-based tests for the entitlement ledger
//!
//! The ledger's one job is to keep the balance, its version, and its
//! append-only history in exact agreement under any sequence of
//! mutations. These properties drive random operation sequences
//! through a real database and then reconcile.

use leave_approval::{
    error::LeaveError,
    ledger::{Ledger, NoWaitBackoff, RetryPolicy},
    policy::LeavePolicy,
    types::{LeaveDate, LeaveType},
};
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum LedgerOp {
    Restore(u32),
    Deduct(u32),
    YearEnd { cap: u32, accrual: u32 },
}

fn op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (1u32..20).prop_map(LedgerOp::Restore),
        (1u32..20).prop_map(LedgerOp::Deduct),
        (0u32..15, 0u32..10).prop_map(|(cap, accrual)| LedgerOp::YearEnd { cap, accrual }),
    ]
}

fn open_ledger(dir: &tempfile::TempDir) -> Ledger {
    let db = sled::open(dir.path().join("ledger_props.db")).expect("failed to open test db");
    Ledger::open(&db, RetryPolicy::default(), Arc::new(NoWaitBackoff))
        .expect("failed to open ledger")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Replaying the history from zero reproduces the stored balance,
    /// every entry's before/after values chain exactly, and no
    /// intermediate balance is ever negative.
    #[test]
    fn prop_history_replays_to_current_balance(ops in prop::collection::vec(op_strategy(), 1..25)) {
        let temp_dir = tempdir().unwrap();
        let ledger = open_ledger(&temp_dir);

        for op in &ops {
            match op {
                LedgerOp::Restore(days) => {
                    ledger.restore("staff_prop", LeaveType::Annual, *days).unwrap();
                }
                LedgerOp::Deduct(days) => {
                    match ledger.deduct("staff_prop", LeaveType::Annual, *days) {
                        Ok(_)
                        | Err(LeaveError::InsufficientBalance { .. })
                        | Err(LeaveError::NotFound(_)) => {}
                        Err(other) => panic!("unexpected deduct failure: {other:?}"),
                    }
                }
                LedgerOp::YearEnd { cap, accrual } => {
                    let policy = LeavePolicy {
                        carry_over_cap: *cap,
                        annual_accrual: *accrual,
                        ..LeavePolicy::default()
                    };
                    ledger
                        .apply_year_end("staff_prop", &policy, LeaveDate::from_ymd(2025, 12, 31))
                        .unwrap();
                }
            }
        }

        let mut replayed: i64 = 0;
        for entry in ledger.history("staff_prop").unwrap() {
            prop_assert_eq!(replayed, i64::from(entry.balance_before));
            replayed += entry.delta;
            prop_assert_eq!(replayed, i64::from(entry.balance_after));
            prop_assert!(replayed >= 0);
        }
        prop_assert_eq!(
            replayed,
            i64::from(ledger.balance("staff_prop", LeaveType::Annual).unwrap())
        );
    }

    /// The record and its history commit together: after any sequence
    /// of mutations the version equals the number of committed
    /// mutations and the history holds exactly the entries those
    /// mutations produced, with no partial write between them.
    #[test]
    fn prop_record_and_history_commit_together(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let temp_dir = tempdir().unwrap();
        let ledger = open_ledger(&temp_dir);

        let mut committed = 0u64;
        let mut expected_entries = 0usize;
        for op in &ops {
            match op {
                LedgerOp::Restore(days) => {
                    ledger.restore("staff_atom", LeaveType::Annual, *days).unwrap();
                    committed += 1;
                    expected_entries += 1;
                }
                LedgerOp::Deduct(days) => {
                    match ledger.deduct("staff_atom", LeaveType::Annual, *days) {
                        Ok(_) => {
                            committed += 1;
                            expected_entries += 1;
                        }
                        Err(LeaveError::InsufficientBalance { .. })
                        | Err(LeaveError::NotFound(_)) => {}
                        Err(other) => panic!("unexpected deduct failure: {other:?}"),
                    }
                }
                LedgerOp::YearEnd { cap, accrual } => {
                    let policy = LeavePolicy {
                        carry_over_cap: *cap,
                        annual_accrual: *accrual,
                        ..LeavePolicy::default()
                    };
                    let outcome = ledger
                        .apply_year_end("staff_atom", &policy, LeaveDate::from_ymd(2025, 12, 31))
                        .unwrap();
                    committed += 1;
                    expected_entries += usize::from(outcome.forfeited > 0);
                    expected_entries += usize::from(outcome.accrued > 0);
                }
            }
        }

        match ledger.record("staff_atom").unwrap() {
            Some(record) => prop_assert_eq!(record.version, committed),
            None => prop_assert_eq!(committed, 0),
        }
        prop_assert_eq!(ledger.history("staff_atom").unwrap().len(), expected_entries);
    }

    /// Deduct then restore of the same amount is a round trip: the
    /// balance returns to its prior value and the two entries' deltas
    /// cancel.
    #[test]
    fn prop_deduct_restore_round_trip(seed in 1u32..60, take in 1u32..60) {
        prop_assume!(take <= seed);
        let temp_dir = tempdir().unwrap();
        let ledger = open_ledger(&temp_dir);

        ledger.restore("staff_rt", LeaveType::Sick, seed).unwrap();
        ledger.deduct("staff_rt", LeaveType::Sick, take).unwrap();
        let after = ledger.restore("staff_rt", LeaveType::Sick, take).unwrap();

        prop_assert_eq!(after, seed);
        let history = ledger.history("staff_rt").unwrap();
        prop_assert_eq!(history.len(), 3);
        prop_assert_eq!(history[1].delta + history[2].delta, 0);
    }

    /// The version counter strictly increases on every successful
    /// mutation.
    #[test]
    fn prop_version_strictly_increases(grants in prop::collection::vec(1u32..10, 1..12)) {
        let temp_dir = tempdir().unwrap();
        let ledger = open_ledger(&temp_dir);

        let mut last_version = 0u64;
        for days in grants {
            ledger.restore("staff_ver", LeaveType::Annual, days).unwrap();
            let record = ledger.record("staff_ver").unwrap().unwrap();
            prop_assert!(record.version > last_version);
            last_version = record.version;
        }
    }

    /// Deduction below the available balance is refused outright and
    /// leaves no trace in record or history.
    #[test]
    fn prop_overdraft_is_refused(seed in 0u32..10, over in 1u32..10) {
        let temp_dir = tempdir().unwrap();
        let ledger = open_ledger(&temp_dir);

        if seed > 0 {
            ledger.restore("staff_odr", LeaveType::Annual, seed).unwrap();
        }
        let entries_before = ledger.history("staff_odr").unwrap().len();

        let result = ledger.deduct("staff_odr", LeaveType::Annual, seed + over);
        match result {
            Err(LeaveError::InsufficientBalance { requested, available, .. }) => {
                prop_assert_eq!(requested, seed + over);
                prop_assert_eq!(available, seed);
            }
            Err(LeaveError::NotFound(_)) => prop_assert_eq!(seed, 0),
            other => panic!("expected a refusal, got {other:?}"),
        }
        prop_assert_eq!(ledger.balance("staff_odr", LeaveType::Annual).unwrap(), seed);
        prop_assert_eq!(ledger.history("staff_odr").unwrap().len(), entries_before);
    }
}
