//! Shared leave-type, role, and time types used across the crate
use crate::error::LeaveError;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::OnceLock;

/// The kinds of leave a staff member may request.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum LeaveType {
    #[n(0)]
    Annual,
    #[n(1)]
    Sick,
    #[n(2)]
    Maternity,
    #[n(3)]
    Paternity,
    #[n(4)]
    Compassionate,
    #[n(5)]
    Study,
    #[n(6)]
    Unpaid,
}

impl LeaveType {
    pub const ALL: [LeaveType; 7] = [
        LeaveType::Annual,
        LeaveType::Sick,
        LeaveType::Maternity,
        LeaveType::Paternity,
        LeaveType::Compassionate,
        LeaveType::Study,
        LeaveType::Unpaid,
    ];

    /// Unpaid leave carries no entitlement counter, so balance checks
    /// always report sufficient and no deduction is ever made for it.
    pub fn consumes_balance(&self) -> bool {
        !matches!(self, LeaveType::Unpaid)
    }

    /// Types that need an externally tracked clearance before the final
    /// approval level can complete.
    pub fn requires_clearance(&self) -> bool {
        matches!(self, LeaveType::Study | LeaveType::Unpaid)
    }

    /// Only annual leave is capped and carried into the next period at
    /// year end.
    pub fn carries_over(&self) -> bool {
        matches!(self, LeaveType::Annual)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "annual",
            LeaveType::Sick => "sick",
            LeaveType::Maternity => "maternity",
            LeaveType::Paternity => "paternity",
            LeaveType::Compassionate => "compassionate",
            LeaveType::Study => "study",
            LeaveType::Unpaid => "unpaid",
        }
    }
}

/// Canonical approver roles. Legacy systems used free-form role strings
/// with overlapping aliases; those collapse onto this enum through
/// [`Role::normalize`].
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Supervisor,
    #[n(1)]
    UnitHead,
    #[n(2)]
    DivisionHead,
    #[n(3)]
    DirectorateHead,
    #[n(4)]
    RegionalCoordinator,
    #[n(5)]
    ExecutiveDirector,
    #[n(6)]
    HrDirector,
    #[n(7)]
    HrValidator,
    #[n(8)]
    ChiefOfStaff,
}

// Alias table covering every legacy role spelling. Built once, on first use.
fn role_aliases() -> &'static HashMap<&'static str, Role> {
    static ALIASES: OnceLock<HashMap<&'static str, Role>> = OnceLock::new();
    ALIASES.get_or_init(|| {
        let mut map = HashMap::new();
        for alias in [
            "supervisor",
            "line_manager",
            "immediate_supervisor",
            "first_reporting_officer",
        ] {
            map.insert(alias, Role::Supervisor);
        }
        for alias in ["unit_head", "head_of_unit", "officer_in_charge"] {
            map.insert(alias, Role::UnitHead);
        }
        for alias in ["division_head", "head_of_division", "division_chief"] {
            map.insert(alias, Role::DivisionHead);
        }
        for alias in ["directorate_head", "head_of_directorate", "director"] {
            map.insert(alias, Role::DirectorateHead);
        }
        for alias in ["regional_coordinator", "field_coordinator", "regional_officer"] {
            map.insert(alias, Role::RegionalCoordinator);
        }
        for alias in ["executive_director", "director_general", "ed", "dg"] {
            map.insert(alias, Role::ExecutiveDirector);
        }
        for alias in ["hr_director", "chief_hr_officer", "head_of_hr"] {
            map.insert(alias, Role::HrDirector);
        }
        for alias in ["hr_validator", "hr_officer", "leave_focal_point"] {
            map.insert(alias, Role::HrValidator);
        }
        for alias in ["chief_of_staff", "cos"] {
            map.insert(alias, Role::ChiefOfStaff);
        }
        map
    })
}

impl Role {
    /// Map a legacy role string onto its canonical role. Matching is
    /// case-insensitive; unknown strings return None.
    pub fn normalize(raw: &str) -> Option<Role> {
        role_aliases().get(raw.to_lowercase().as_str()).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Supervisor => "supervisor",
            Role::UnitHead => "unit_head",
            Role::DivisionHead => "division_head",
            Role::DirectorateHead => "directorate_head",
            Role::RegionalCoordinator => "regional_coordinator",
            Role::ExecutiveDirector => "executive_director",
            Role::HrDirector => "hr_director",
            Role::HrValidator => "hr_validator",
            Role::ChiefOfStaff => "chief_of_staff",
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Calendar date of a leave day, encoded as days from the common era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LeaveDate(NaiveDate);

impl LeaveDate {
    /// Infallible constructor for dates known to be valid, such as
    /// literals. Panics otherwise; caller-supplied input goes through
    /// [`LeaveDate::try_from_ymd`].
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        Self(NaiveDate::from_ymd_opt(year, month, day).unwrap())
    }

    pub fn try_from_ymd(year: i32, month: u32, day: u32) -> Result<Self, LeaveError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(LeaveDate)
            .ok_or_else(|| {
                LeaveError::Validation(format!(
                    "{year:04}-{month:02}-{day:02} is not a calendar date"
                ))
            })
    }
    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for LeaveDate {
    fn from(value: NaiveDate) -> Self {
        LeaveDate(value)
    }
}

impl<C> minicbor::Encode<C> for LeaveDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for LeaveDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(LeaveDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}

/// Inclusive range of calendar days covered by a request.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    #[n(0)]
    pub start: LeaveDate,
    #[n(1)]
    pub end: LeaveDate,
}

impl DateRange {
    pub fn new(start: LeaveDate, end: LeaveDate) -> Result<Self, LeaveError> {
        if end < start {
            return Err(LeaveError::Validation(format!(
                "leave range ends before it starts: {:?} > {:?}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of days consumed, both endpoints included.
    pub fn day_count(&self) -> u32 {
        (self.end.0 - self.start.0).num_days() as u32 + 1
    }
}
