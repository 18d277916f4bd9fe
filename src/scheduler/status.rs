//! Start eligibility of jobs and reports.
//!
//! Eligibility combines the wall-clock schedule with the exit state of the
//! jobs an entity depends on. Only direct dependencies are checked, so an
//! entity depending on itself cannot make resolution loop.

use std::fmt;

use crate::scheduler::job::{EntityKind, Job, RunState};
use crate::scheduler::registry::{EntityRegistry, Registry};
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartStatus {
    Undefined,
    CanStart,
    ScheduledTimeNotReached,
    DependentNotFinished,
    DependentBadExitCode,
}

impl StartStatus {
    /// Wire code of this status.
    pub fn code(self) -> i64 {
        match self {
            StartStatus::Undefined => 0,
            StartStatus::CanStart => 1,
            StartStatus::ScheduledTimeNotReached => 2,
            StartStatus::DependentNotFinished => 3,
            StartStatus::DependentBadExitCode => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(StartStatus::Undefined),
            1 => Some(StartStatus::CanStart),
            2 => Some(StartStatus::ScheduledTimeNotReached),
            3 => Some(StartStatus::DependentNotFinished),
            4 => Some(StartStatus::DependentBadExitCode),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StartStatus::Undefined => "undefined",
            StartStatus::CanStart => "can start",
            StartStatus::ScheduledTimeNotReached => "scheduled time not reached",
            StartStatus::DependentNotFinished => "dependent job(s) not finished",
            StartStatus::DependentBadExitCode => "dependent job(s) with bad exit code",
        }
    }
}

impl fmt::Display for StartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Eligibility of a run state against the registered jobs. First match wins.
///
/// A dependency id naming no registered job counts as satisfied.
pub fn resolve(run: &RunState, jobs: &EntityRegistry<Job>, now: &Time) -> StartStatus {
    if now.is_before(&run.scheduled_start_time) {
        return StartStatus::ScheduledTimeNotReached;
    }
    for dependency in &run.dependent_job_ids {
        let Some(job) = jobs.find(dependency) else {
            continue;
        };
        if !job.run.finished {
            return StartStatus::DependentNotFinished;
        }
        if job.run.exit_code > 0 {
            return StartStatus::DependentBadExitCode;
        }
    }
    StartStatus::CanStart
}

/// Eligibility of the entity `id`, or `Undefined` if it is not registered.
pub fn status(registry: &Registry, kind: EntityKind, id: &str, now: &Time) -> StartStatus {
    match registry.run_state(kind, id) {
        Some(run) => resolve(run, &registry.jobs, now),
        None => StartStatus::Undefined,
    }
}

pub fn job_status(registry: &Registry, id: &str, now: &Time) -> StartStatus {
    status(registry, EntityKind::Job, id, now)
}

pub fn report_status(registry: &Registry, id: &str, now: &Time) -> StartStatus {
    status(registry, EntityKind::Report, id, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..5 {
            assert_eq!(StartStatus::from_code(code).unwrap().code(), code);
        }
        assert!(StartStatus::from_code(5).is_none());
    }

    #[test]
    fn descriptions() {
        assert_eq!(StartStatus::CanStart.to_string(), "can start");
        assert_eq!(
            StartStatus::DependentBadExitCode.description(),
            "dependent job(s) with bad exit code"
        );
    }
}
