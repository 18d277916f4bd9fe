use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::time::Time;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_CHECK_INTERVALS: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "Basic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Job,
    Report,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Job => "job",
            EntityKind::Report => "report",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the registry stores and the supervisor runs.
pub trait Entity {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn run(&self) -> &RunState;
    fn run_mut(&mut self) -> &mut RunState;
    /// The definition document this entity was loaded from.
    fn definition(&self) -> &str;
}

/// Schedule, dependency and execution state shared by jobs and reports.
///
/// `running` and `finished` are never both true; every transition goes
/// through the methods below.
#[derive(Debug, Clone)]
pub struct RunState {
    pub scheduled_start_time: Time,
    pub actual_start_time: Option<Time>,
    pub finished_time: Option<Time>,
    /// Ids of jobs that must be finished with exit code 0, in declaration order
    pub dependent_job_ids: Vec<String>,
    pub check_interval: Duration,
    pub max_check_intervals: u64,
    pub check_interval_counter: u64,
    pub running: bool,
    pub finished: bool,
    pub start_requested: bool,
    pub exit_code: i32,
    /// Bumped by every run request and every reset. A supervisor only acts
    /// while the generation it was activated with is current.
    pub generation: u64,
}

impl RunState {
    pub fn new(scheduled_start_time: Time) -> Self {
        Self {
            scheduled_start_time,
            actual_start_time: None,
            finished_time: None,
            dependent_job_ids: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            max_check_intervals: DEFAULT_MAX_CHECK_INTERVALS,
            check_interval_counter: 0,
            running: false,
            finished: false,
            start_requested: false,
            exit_code: 0,
            generation: 0,
        }
    }

    /// Add a dependency unless it is already listed. Returns true if added.
    pub fn add_dependency(&mut self, job_id: impl Into<String>) -> bool {
        let job_id = job_id.into();
        if self.dependent_job_ids.contains(&job_id) {
            return false;
        }
        self.dependent_job_ids.push(job_id);
        true
    }

    /// True when a run may be triggered: not started, not requested, not done.
    pub fn is_idle(&self) -> bool {
        !self.running && !self.finished && !self.start_requested
    }

    /// Returns the generation of this request.
    pub fn request_start(&mut self) -> u64 {
        self.start_requested = true;
        self.check_interval_counter = 0;
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Give up a requested run that never launched.
    pub fn abandon_start(&mut self) {
        self.start_requested = false;
        self.running = false;
        self.actual_start_time = None;
    }

    pub fn mark_started(&mut self, now: Time) {
        self.actual_start_time = Some(now);
        self.finished_time = None;
        self.finished = false;
        self.running = true;
    }

    pub fn mark_finished(&mut self, exit_code: i32, now: Time) {
        self.exit_code = exit_code;
        self.running = false;
        self.finished = true;
        self.start_requested = false;
        self.finished_time = Some(now);
    }

    /// Clear timers, flags, retry counter and exit code, and move the
    /// scheduled start time to today.
    ///
    /// A pending request is withdrawn: its supervisor stops at the next poll.
    /// A process that is already running is not stopped; its completion
    /// write-back overwrites the reset state.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.actual_start_time = None;
        self.finished_time = None;
        self.check_interval_counter = 0;
        self.running = false;
        self.finished = false;
        self.start_requested = false;
        self.exit_code = 0;
        self.scheduled_start_time = self.scheduled_start_time.reanchored_today();
    }

    /// Milliseconds between start and finish, once both are known.
    pub fn runtime_millis(&self) -> Option<i64> {
        match (self.actual_start_time, self.finished_time) {
            (Some(start), Some(end)) => Some(start.millis_until(&end)),
            _ => None,
        }
    }
}

/// An ETL unit of work: a script run by the configured runner.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub filename: String,
    /// Folder holding the script; also the working directory of the run
    pub path: PathBuf,
    pub log_level: String,
    /// Parameters with variables already resolved to concrete values
    pub parameters: BTreeMap<String, String>,
    pub definition: String,
    pub run: RunState,
}

impl Job {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let filename = filename.into();
        Self {
            id: id.into(),
            name: filename.clone(),
            filename,
            path: path.into(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            parameters: BTreeMap::new(),
            definition: String::new(),
            run: RunState::new(Time::today_at(chrono::NaiveTime::MIN)),
        }
    }

    pub fn scheduled_at(mut self, time: Time) -> Self {
        self.run.scheduled_start_time = time;
        self
    }

    pub fn depends_on(mut self, job_id: impl Into<String>) -> Self {
        self.run.add_dependency(job_id);
        self
    }

    pub fn with_check_interval(mut self, interval: Duration, max_check_intervals: u64) -> Self {
        self.run.check_interval = interval;
        self.run.max_check_intervals = max_check_intervals;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn script_path(&self) -> PathBuf {
        self.path.join(&self.filename)
    }
}

impl Entity for Job {
    const KIND: EntityKind = EntityKind::Job;

    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self) -> &RunState {
        &self.run
    }

    fn run_mut(&mut self) -> &mut RunState {
        &mut self.run
    }

    fn definition(&self) -> &str {
        &self.definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_idle() {
        let job = Job::new("load_customers", "customers.kjb", "/etl/jobs");
        assert_eq!(job.name, "customers.kjb");
        assert_eq!(job.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(job.script_path(), PathBuf::from("/etl/jobs/customers.kjb"));
        assert!(job.run.is_idle());
        assert_eq!(job.run.check_interval, DEFAULT_CHECK_INTERVAL);
        assert_eq!(job.run.max_check_intervals, DEFAULT_MAX_CHECK_INTERVALS);
    }

    #[test]
    fn dependencies_keep_order_and_drop_duplicates() {
        let job = Job::new("c", "c.kjb", "/etl")
            .depends_on("b")
            .depends_on("a")
            .depends_on("b");
        assert_eq!(job.run.dependent_job_ids, vec!["b", "a"]);
    }

    #[test]
    fn run_transitions_keep_running_and_finished_exclusive() {
        let mut run = RunState::new(Time::now());
        run.request_start();
        assert!(run.start_requested);
        assert!(!run.is_idle());

        run.mark_started(Time::now());
        assert!(run.running && !run.finished);

        run.mark_finished(3, Time::now());
        assert!(!run.running && run.finished);
        assert_eq!(run.exit_code, 3);
        assert!(run.runtime_millis().is_some());
    }

    #[test]
    fn reset_clears_state_and_exit_code() {
        let mut run = RunState::new(Time::now().plus_seconds(-86_400));
        run.request_start();
        run.check_interval_counter = 4;
        run.mark_started(Time::now());
        run.mark_finished(5, Time::now());

        let generation = run.generation;
        run.reset();
        assert!(run.is_idle());
        assert_ne!(run.generation, generation);
        assert_eq!(run.exit_code, 0);
        assert_eq!(run.check_interval_counter, 0);
        assert!(run.actual_start_time.is_none());
        assert!(run.finished_time.is_none());
        assert_eq!(
            run.scheduled_start_time.naive().date(),
            chrono::Local::now().date_naive()
        );
    }

    #[test]
    fn abandon_start_returns_to_idle() {
        let mut run = RunState::new(Time::now());
        let first = run.request_start();
        run.abandon_start();
        assert!(run.request_start() > first);
        run.abandon_start();
        assert!(run.is_idle());
    }
}
