//! Organizational context consumed read-only by the workflow router
use crate::error::LeaveError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Where the staff member is posted. Field stations route through the
/// regional coordinator instead of the headquarters management line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DutyStation {
    Headquarters,
    Field { region: String },
}

impl DutyStation {
    pub fn is_field(&self) -> bool {
        matches!(self, DutyStation::Field { .. })
    }
}

/// Seniority of the post a staff member holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Regular,
    SectionChief,
    Director,
}

impl Position {
    /// Director-level staff bypass line management entirely.
    pub fn is_director_level(&self) -> bool {
        matches!(self, Position::Director)
    }
}

/// Snapshot of a staff member's organizational attributes, sourced from
/// the external directory. Never mutated by this crate.
#[derive(Debug, Clone)]
pub struct StaffContext {
    pub staff_id: String,
    pub unit: Option<String>,
    pub division: Option<String>,
    pub directorate: Option<String>,
    pub duty_station: DutyStation,
    pub supervisor_id: Option<String>,
    pub position: Position,
    /// The unit/directorate reports straight to the executive director
    /// rather than through a directorate head.
    pub reports_to_executive: bool,
    /// Unit flagged for the extra chief-of-staff approval level.
    pub escalation_unit: bool,
    /// Post that may not go on leave without a named acting officer.
    pub critical_post: bool,
    pub active: bool,
}

impl StaffContext {
    /// Minimal headquarters context; callers fill in the optional
    /// attributes they have.
    pub fn new(staff_id: impl Into<String>) -> Self {
        Self {
            staff_id: staff_id.into(),
            unit: None,
            division: None,
            directorate: None,
            duty_station: DutyStation::Headquarters,
            supervisor_id: None,
            position: Position::Regular,
            reports_to_executive: false,
            escalation_unit: false,
            critical_post: false,
            active: true,
        }
    }
}

/// Boundary to the organizational directory. The core only ever reads.
pub trait StaffDirectory: Send + Sync {
    fn staff_context(&self, staff_id: &str) -> Result<StaffContext, LeaveError>;

    /// Ids of all staff currently on the active roster, consumed by the
    /// year-end batch.
    fn active_staff(&self) -> Vec<String>;
}

/// Directory backed by a plain map. Serves tests and single-process
/// deployments where the roster is loaded up front.
#[derive(Default)]
pub struct InMemoryDirectory {
    staff: RwLock<HashMap<String, StaffContext>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, context: StaffContext) {
        self.staff
            .write()
            .expect("directory lock poisoned")
            .insert(context.staff_id.clone(), context);
    }
}

impl StaffDirectory for InMemoryDirectory {
    fn staff_context(&self, staff_id: &str) -> Result<StaffContext, LeaveError> {
        self.staff
            .read()
            .expect("directory lock poisoned")
            .get(staff_id)
            .cloned()
            .ok_or_else(|| LeaveError::NotFound(format!("staff {staff_id} is not in the directory")))
    }

    fn active_staff(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .staff
            .read()
            .expect("directory lock poisoned")
            .values()
            .filter(|ctx| ctx.active)
            .map(|ctx| ctx.staff_id.clone())
            .collect();
        ids.sort();
        ids
    }
}
