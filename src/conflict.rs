//! Advisory detector for implausibly concurrent step decisions
//!
//! Flags chains where two steps were decided within a very short window
//! as a signal for manual audit. Advisory only; the version-guarded
//! writes remain the authority on conflicts.
use crate::request::ApprovalStep;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFlag {
    pub first_level: u32,
    pub second_level: u32,
    pub gap_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ConflictDetector {
    window: Duration,
}

impl ConflictDetector {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Decisions on distinct levels closer than this are suspicious:
    /// a human reviewing two levels takes longer than a few hundred
    /// milliseconds.
    pub fn scan(&self, chain: &[ApprovalStep]) -> Vec<ConflictFlag> {
        let mut decided: Vec<(u32, DateTime<Utc>)> = chain
            .iter()
            .filter_map(|step| {
                step.decided_at
                    .as_ref()
                    .map(|t| (step.level, t.to_datetime_utc()))
            })
            .collect();
        decided.sort_by_key(|(_, t)| *t);

        let mut flags = Vec::new();
        for pair in decided.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            if gap < self.window {
                flags.push(ConflictFlag {
                    first_level: pair[0].0,
                    second_level: pair[1].0,
                    gap_ms: gap.num_milliseconds(),
                });
            }
        }
        flags
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(Duration::milliseconds(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ApprovalStep, StepStatus};
    use crate::types::{Role, TimeStamp};

    fn decided_step(level: u32, at: TimeStamp<Utc>) -> ApprovalStep {
        let mut step = ApprovalStep::new(level, Role::Supervisor, None);
        step.status = StepStatus::Approved;
        step.decided_at = Some(at);
        step
    }

    #[test]
    fn close_decisions_are_flagged() {
        let base = TimeStamp::new_with(2025, 2, 3, 9, 0, 0).to_datetime_utc();
        let chain = vec![
            decided_step(1, base.into()),
            decided_step(2, (base + Duration::milliseconds(40)).into()),
        ];

        let flags = ConflictDetector::default().scan(&chain);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].first_level, 1);
        assert_eq!(flags[0].second_level, 2);
        assert_eq!(flags[0].gap_ms, 40);
    }

    #[test]
    fn spaced_decisions_pass() {
        let base = TimeStamp::new_with(2025, 2, 3, 9, 0, 0).to_datetime_utc();
        let chain = vec![
            decided_step(1, base.into()),
            decided_step(2, (base + Duration::seconds(90)).into()),
        ];

        assert!(ConflictDetector::default().scan(&chain).is_empty());
    }
}
