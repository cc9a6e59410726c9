//! Smoke Screen Unit tests for leave approval system components
//!
//! These test are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. These are intended as smoke-screen
//! and generally test the happy-path.

use leave_approval::{
    compliance::{ComplianceGate, IssueCode, ReviewStage},
    events::{EventSink, LeaveEvent, MemorySink},
    ledger::{ChangeReason, Ledger, NoWaitBackoff, RetryPolicy},
    policy::LeavePolicy,
    request::{
        ApprovalStep, Clearance, ClearanceStatus, LeaveRequest, RequestStatus, StepStatus,
    },
    router::ChainRouter,
    staff::StaffContext,
    types::{DateRange, LeaveDate, LeaveType, Role},
    utils::new_uuid_to_bech32,
};
use std::sync::Arc;
use tempfile::tempdir;

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_uuid_to_bech32 generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let result = new_uuid_to_bech32("leave_");
        assert!(result.is_ok());

        let encoded = result.unwrap();
        assert!(encoded.starts_with("leave_1"));
        assert!(encoded.len() > 10); // UUID should produce substantial output
    }

    /// Test that the function handles empty strings appropriately
    #[test]
    fn handles_empty_hrp() {
        // Empty string should fail
        let result = new_uuid_to_bech32("");
        assert!(result.is_err());
    }

    /// Test that multiple calls generate unique identifiers
    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("leave_").unwrap();
        let id2 = new_uuid_to_bech32("leave_").unwrap();
        let id3 = new_uuid_to_bech32("leave_").unwrap();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    /// Test that different HRPs produce different encoded strings
    #[test]
    fn different_hrps_produce_different_encodings() {
        let leave_id = new_uuid_to_bech32("leave_").unwrap();
        let staff_id = new_uuid_to_bech32("staff_").unwrap();

        assert!(leave_id.starts_with("leave_"));
        assert!(staff_id.starts_with("staff_"));
        assert_ne!(leave_id, staff_id);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn unpaid_leave_is_the_only_exempt_type() {
        for leave_type in LeaveType::ALL {
            assert_eq!(
                leave_type.consumes_balance(),
                leave_type != LeaveType::Unpaid
            );
        }
    }

    #[test]
    fn clearance_types_are_study_and_unpaid() {
        assert!(LeaveType::Study.requires_clearance());
        assert!(LeaveType::Unpaid.requires_clearance());
        assert!(!LeaveType::Annual.requires_clearance());
        assert!(!LeaveType::Sick.requires_clearance());
    }

    #[test]
    fn change_reason_strings_match_the_audit_vocabulary() {
        assert_eq!(ChangeReason::Deduction.as_str(), "deduction");
        assert_eq!(ChangeReason::Restoration.as_str(), "restoration");
        assert_eq!(
            ChangeReason::YearEndCarryForward.as_str(),
            "year-end-carry-forward"
        );
        assert_eq!(
            ChangeReason::YearEndForfeiture.as_str(),
            "year-end-forfeiture"
        );
    }

    #[test]
    fn role_round_trips_through_its_own_name() {
        for role in [
            Role::Supervisor,
            Role::UnitHead,
            Role::DivisionHead,
            Role::DirectorateHead,
            Role::RegionalCoordinator,
            Role::ExecutiveDirector,
            Role::HrDirector,
            Role::HrValidator,
            Role::ChiefOfStaff,
        ] {
            assert_eq!(Role::normalize(role.as_str()), Some(role));
        }
    }

    #[test]
    fn date_range_rejects_reversed_endpoints() {
        let result = DateRange::new(
            LeaveDate::from_ymd(2025, 8, 10),
            LeaveDate::from_ymd(2025, 8, 1),
        );
        assert!(result.is_err());
    }
}

// POLICY MODULE TESTS
#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn default_policy_caps_every_paid_type() {
        let policy = LeavePolicy::default();
        for leave_type in LeaveType::ALL {
            if leave_type == LeaveType::Unpaid {
                assert_eq!(policy.max_days(leave_type), None);
            } else {
                assert!(policy.max_days(leave_type).is_some());
            }
        }
    }
}

// REQUEST MODULE TESTS
#[cfg(test)]
mod request_tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    #[test]
    fn delegated_steps_are_still_open() {
        assert!(StepStatus::Pending.is_open());
        assert!(StepStatus::Delegated.is_open());
        assert!(!StepStatus::Approved.is_open());
        assert!(!StepStatus::Skipped.is_open());
    }

    #[test]
    fn request_cbor_roundtrip() {
        let chain = vec![
            ApprovalStep::new(1, Role::Supervisor, Some("staff_sup".into())),
            ApprovalStep::new(2, Role::HrValidator, None),
        ];
        let original = LeaveRequest::new(
            "leave_rt".into(),
            "staff_rt".into(),
            LeaveType::Study,
            DateRange::new(LeaveDate::from_ymd(2025, 9, 1), LeaveDate::from_ymd(2025, 9, 5))
                .unwrap(),
            chain,
            true,
            Some("staff_standin".into()),
            Some(Clearance {
                status: ClearanceStatus::Approved,
                reference: Some("clr-2025-0042".into()),
            }),
        );

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: LeaveRequest = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }
}

// COMPLIANCE MODULE TESTS
#[cfg(test)]
mod compliance_tests {
    use super::*;

    fn gate_fixture(
        dir: &tempfile::TempDir,
        leave_type: LeaveType,
        clearance: Option<Clearance>,
        declaration: bool,
    ) -> (Ledger, StaffContext, LeaveRequest) {
        let db = sled::open(dir.path().join("gate.db")).unwrap();
        let ledger = Ledger::open(&db, RetryPolicy::default(), Arc::new(NoWaitBackoff)).unwrap();

        let mut ctx = StaffContext::new("staff_gate");
        ctx.unit = Some("records".into());
        ctx.supervisor_id = Some("staff_sup".into());
        let chain = ChainRouter::build_chain(&ctx);
        let request = LeaveRequest::new(
            "leave_gate".into(),
            "staff_gate".into(),
            leave_type,
            DateRange::new(LeaveDate::from_ymd(2025, 5, 5), LeaveDate::from_ymd(2025, 5, 9))
                .unwrap(),
            chain,
            declaration,
            None,
            clearance,
        );
        (ledger, ctx, request)
    }

    #[test]
    fn a_clean_request_is_compliant() {
        let dir = tempdir().unwrap();
        let (ledger, ctx, request) = gate_fixture(&dir, LeaveType::Annual, None, true);
        ledger.restore("staff_gate", LeaveType::Annual, 20).unwrap();

        let report = ComplianceGate::review(
            &ledger,
            &LeavePolicy::default(),
            &ctx,
            &request,
            ReviewStage::Submission,
        )
        .unwrap();

        assert!(report.compliant());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn every_failure_is_reported_at_once() {
        let dir = tempdir().unwrap();
        // no declaration, no balance, no clearance on a clearance type
        let (ledger, ctx, request) = gate_fixture(&dir, LeaveType::Study, None, false);

        let report = ComplianceGate::review(
            &ledger,
            &LeavePolicy::default(),
            &ctx,
            &request,
            ReviewStage::Submission,
        )
        .unwrap();

        assert!(!report.compliant());
        assert!(report.has_error(IssueCode::MissingDeclaration));
        assert!(report.has_error(IssueCode::InsufficientBalance));
        assert!(report.has_error(IssueCode::ClearanceNotApproved));
    }

    #[test]
    fn approved_clearance_without_reference_is_a_warning_only() {
        let dir = tempdir().unwrap();
        let clearance = Some(Clearance {
            status: ClearanceStatus::Approved,
            reference: None,
        });
        let (ledger, ctx, request) = gate_fixture(&dir, LeaveType::Study, clearance, true);
        ledger.restore("staff_gate", LeaveType::Study, 20).unwrap();

        let report = ComplianceGate::review(
            &ledger,
            &LeavePolicy::default(),
            &ctx,
            &request,
            ReviewStage::FinalApproval,
        )
        .unwrap();

        assert!(report.compliant());
        assert!(report.has_warning(IssueCode::ClearanceReferenceMissing));
    }

    #[test]
    fn requester_in_the_chain_is_a_segregation_violation() {
        let dir = tempdir().unwrap();
        let (ledger, mut ctx, _) = gate_fixture(&dir, LeaveType::Annual, None, true);
        ledger.restore("staff_gate", LeaveType::Annual, 20).unwrap();

        // mis-sourced directory data binds the requester as their own
        // supervisor
        ctx.supervisor_id = Some("staff_gate".into());
        let chain = ChainRouter::build_chain(&ctx);
        let request = LeaveRequest::new(
            "leave_sod".into(),
            "staff_gate".into(),
            LeaveType::Annual,
            DateRange::new(LeaveDate::from_ymd(2025, 5, 5), LeaveDate::from_ymd(2025, 5, 9))
                .unwrap(),
            chain,
            true,
            None,
            None,
        );

        let report = ComplianceGate::review(
            &ledger,
            &LeavePolicy::default(),
            &ctx,
            &request,
            ReviewStage::Submission,
        )
        .unwrap();

        assert!(report.has_error(IssueCode::SegregationOfDutiesViolation));
    }

    #[test]
    fn over_the_type_maximum_is_rejected() {
        let dir = tempdir().unwrap();
        let (ledger, ctx, mut request) = gate_fixture(&dir, LeaveType::Compassionate, None, true);
        ledger
            .restore("staff_gate", LeaveType::Compassionate, 60)
            .unwrap();
        request.days = 12; // default cap is 7

        let report = ComplianceGate::review(
            &ledger,
            &LeavePolicy::default(),
            &ctx,
            &request,
            ReviewStage::Submission,
        )
        .unwrap();

        assert!(report.has_error(IssueCode::ExceedsTypeMaximum));
    }
}

// EVENTS MODULE TESTS
#[cfg(test)]
mod events_tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(&LeaveEvent::RequestSubmitted {
            request_id: "leave_1".into(),
            staff_id: "staff_1".into(),
        });
        sink.emit(&LeaveEvent::RequestApproved {
            request_id: "leave_1".into(),
        });

        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(matches!(recorded[0], LeaveEvent::RequestSubmitted { .. }));
        assert!(matches!(recorded[1], LeaveEvent::RequestApproved { .. }));
    }
}
