//! Exam Clock
//!
//! Pure functions over an exam's schedule. Nothing here is cached: every
//! answer is recomputed from the instant it is asked about, because the
//! results gate who may see questions and who may still answer.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// == Exam Phase ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamPhase {
    NotStarted,
    Ongoing,
    Finished,
}

impl fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExamPhase::NotStarted => "not_started",
            ExamPhase::Ongoing => "ongoing",
            ExamPhase::Finished => "finished",
        })
    }
}

// == Exam Schedule ==
/// Start instant and length of an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSchedule {
    pub exam_date: DateTime<Utc>,
    /// Length in minutes
    pub duration: i64,
}

impl ExamSchedule {
    pub fn new(exam_date: DateTime<Utc>, duration: i64) -> Self {
        Self {
            exam_date,
            duration,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.exam_date + TimeDelta::minutes(self.duration)
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.exam_date
    }

    pub fn has_finished(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at()
    }

    /// Whole minutes until the start, zero once started.
    pub fn starts_in(&self, now: DateTime<Utc>) -> i64 {
        (self.exam_date - now).num_minutes().max(0)
    }

    /// Whole minutes until the end; negative once finished.
    pub fn finishes_in(&self, now: DateTime<Utc>) -> i64 {
        (self.ends_at() - now).num_minutes()
    }

    pub fn phase_at(&self, now: DateTime<Utc>) -> ExamPhase {
        if !self.has_started(now) {
            ExamPhase::NotStarted
        } else if self.has_finished(now) {
            ExamPhase::Finished
        } else {
            ExamPhase::Ongoing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-10T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_ongoing_exam() {
        let schedule = ExamSchedule::new(now() - TimeDelta::minutes(10), 30);

        assert!(schedule.has_started(now()));
        assert!(!schedule.has_finished(now()));
        assert_eq!(schedule.starts_in(now()), 0);
        assert_eq!(schedule.finishes_in(now()), 20);
        assert_eq!(schedule.phase_at(now()), ExamPhase::Ongoing);
    }

    #[test]
    fn test_upcoming_exam() {
        let schedule = ExamSchedule::new(now() + TimeDelta::minutes(10), 30);

        assert!(!schedule.has_started(now()));
        assert_eq!(schedule.starts_in(now()), 10);
        assert_eq!(schedule.finishes_in(now()), 40);
        assert_eq!(schedule.phase_at(now()), ExamPhase::NotStarted);
    }

    #[test]
    fn test_finished_exam_has_negative_finishes_in() {
        let schedule = ExamSchedule::new(now() - TimeDelta::minutes(90), 30);

        assert!(schedule.has_finished(now()));
        assert_eq!(schedule.finishes_in(now()), -60);
        assert_eq!(schedule.phase_at(now()), ExamPhase::Finished);
    }

    #[test]
    fn test_boundaries() {
        let schedule = ExamSchedule::new(now(), 30);

        assert!(schedule.has_started(now()));
        assert!(schedule.has_finished(now() + TimeDelta::minutes(30)));
        assert!(!schedule.has_finished(now() + TimeDelta::minutes(30) - TimeDelta::seconds(1)));
    }

    #[test]
    fn test_derived_state_follows_time() {
        let schedule = ExamSchedule::new(now(), 30);

        assert_eq!(schedule.phase_at(now() - TimeDelta::seconds(1)), ExamPhase::NotStarted);
        assert_eq!(schedule.phase_at(now() + TimeDelta::minutes(5)), ExamPhase::Ongoing);
        assert_eq!(schedule.phase_at(now() + TimeDelta::hours(1)), ExamPhase::Finished);
    }
}
