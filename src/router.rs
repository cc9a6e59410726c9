//! Workflow router: computes the approval chain from organizational context
use crate::request::ApprovalStep;
use crate::staff::{DutyStation, StaffContext};
use crate::types::Role;

/// Deterministic chain construction. Routing depends only on the staff
/// member's organizational attributes; the levels are numbered 1..N
/// with no gaps regardless of which optional levels applied.
pub struct ChainRouter;

impl ChainRouter {
    pub fn build_chain(ctx: &StaffContext) -> Vec<ApprovalStep> {
        let mut levels: Vec<(Role, Option<String>)> = Vec::new();

        if ctx.position.is_director_level() {
            // Director-level staff bypass line management: senior HR
            // authority, then the executive authority. Nothing else.
            levels.push((Role::HrDirector, None));
            levels.push((Role::ExecutiveDirector, None));
        } else if ctx.duty_station.is_field() {
            // Field stations use the shorter regional variant.
            levels.push((Role::Supervisor, ctx.supervisor_id.clone()));
            levels.push((Role::RegionalCoordinator, None));
            if ctx.directorate.is_some() {
                levels.push((Role::DirectorateHead, None));
            }
            levels.push((Role::HrValidator, None));
        } else {
            // A missing supervisor id still yields a role-only level 1
            // so the sequential invariant never has an ambiguous gap.
            levels.push((Role::Supervisor, ctx.supervisor_id.clone()));
            if ctx.unit.is_some() {
                levels.push((Role::UnitHead, None));
            }
            if ctx.division.is_some() {
                levels.push((Role::DivisionHead, None));
            }
            if ctx.reports_to_executive {
                levels.push((Role::ExecutiveDirector, None));
            } else {
                levels.push((Role::DirectorateHead, None));
            }
            if ctx.escalation_unit {
                levels.push((Role::ChiefOfStaff, None));
            }
            levels.push((Role::HrValidator, None));
        }

        levels
            .into_iter()
            .enumerate()
            .map(|(i, (role, approver))| ApprovalStep::new(i as u32 + 1, role, approver))
            .collect()
    }
}
