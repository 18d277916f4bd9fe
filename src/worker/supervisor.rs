use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::CoordinatorConfig;
use crate::scheduler::registry::SharedRegistry;
use crate::scheduler::{status, EntityKind, RunState, StartStatus};
use crate::time::Time;
use crate::worker::executor::{log_file_path, LaunchSpec, ProcessLauncher};

/// Answer to a run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// The run was requested and a supervisor will wait for eligibility
    Activated { scheduled: Time },
    Finished { at: Option<Time> },
    Running { since: Option<Time> },
    AlreadyRequested,
    NotFound,
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process ran; its exit code was recorded
    Completed { exit_code: i32 },
    /// Dependencies stayed unfinished for the whole retry budget
    Abandoned,
    /// Polling hit a status that can never turn into a start
    Aborted(StartStatus),
    /// The process could not be started
    LaunchFailed(String),
    /// The request was withdrawn by a reset before launch
    Cancelled,
}

enum Step {
    Wait(Duration),
    Launch(LaunchSpec),
    Stop(RunOutcome),
}

/// Drives one requested run of a job or report: waits for its start status
/// to allow a start, launches the external process and records the result.
///
/// No registry lock is held while sleeping or waiting for the process.
pub struct RunSupervisor {
    kind: EntityKind,
    id: String,
    registry: SharedRegistry,
    config: Arc<CoordinatorConfig>,
    /// Generation of the request this supervisor owns, once activated
    generation: Option<u64>,
}

impl RunSupervisor {
    pub fn new(
        kind: EntityKind,
        id: impl Into<String>,
        registry: SharedRegistry,
        config: Arc<CoordinatorConfig>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            registry,
            config,
            generation: None,
        }
    }

    /// Mark the entity as start-requested if it is idle.
    pub async fn activate(&mut self) -> Activation {
        let mut registry = self.registry.write().await;
        let Some(run) = registry.run_state_mut(self.kind, &self.id) else {
            return Activation::NotFound;
        };
        if run.finished {
            Activation::Finished {
                at: run.finished_time,
            }
        } else if run.running {
            Activation::Running {
                since: run.actual_start_time,
            }
        } else if run.start_requested {
            Activation::AlreadyRequested
        } else {
            self.generation = Some(run.request_start());
            tracing::info!(
                kind = %self.kind,
                id = %self.id,
                scheduled = %run.scheduled_start_time.format_time(),
                "Activated run"
            );
            Activation::Activated {
                scheduled: run.scheduled_start_time,
            }
        }
    }

    /// Activate and, when accepted, continue the run in a detached task.
    pub async fn trigger(mut self) -> Activation {
        let activation = self.activate().await;
        if matches!(activation, Activation::Activated { .. }) {
            self.spawn();
        }
        activation
    }

    pub fn spawn(self) -> JoinHandle<RunOutcome> {
        tokio::spawn(self.run())
    }

    /// Poll until the entity may start, then run it to completion.
    pub async fn run(self) -> RunOutcome {
        loop {
            match self.poll().await {
                Step::Wait(interval) => tokio::time::sleep(interval).await,
                Step::Launch(spec) => return self.launch(spec).await,
                Step::Stop(outcome) => return outcome,
            }
        }
    }

    /// True while the request this supervisor was activated for is still
    /// pending. A reset or a newer request invalidates it.
    fn owns_request(&self, run: &RunState) -> bool {
        run.start_requested && self.generation == Some(run.generation)
    }

    async fn poll(&self) -> Step {
        {
            let registry = self.registry.read().await;
            let Some(run) = registry.run_state(self.kind, &self.id) else {
                return Step::Stop(RunOutcome::Aborted(StartStatus::Undefined));
            };
            if !self.owns_request(run) {
                return self.cancelled();
            }
            let now = Time::now();
            if status::status(&registry, self.kind, &self.id, &now)
                == StartStatus::ScheduledTimeNotReached
            {
                tracing::debug!(
                    kind = %self.kind,
                    id = %self.id,
                    scheduled = %run.scheduled_start_time.format_time(),
                    "Scheduled time not reached"
                );
                return Step::Wait(run.check_interval);
            }
        }

        // State may have changed between the locks, so check again.
        let mut registry = self.registry.write().await;
        match registry.run_state(self.kind, &self.id) {
            None => return Step::Stop(RunOutcome::Aborted(StartStatus::Undefined)),
            Some(run) if !self.owns_request(run) => return self.cancelled(),
            Some(_) => {}
        }
        let now = Time::now();
        let status = status::status(&registry, self.kind, &self.id, &now);

        match status {
            StartStatus::CanStart => {
                let log_file = log_file_path(&self.config.logs_dir, &self.id, &now);
                let spec = match self.kind {
                    EntityKind::Job => registry
                        .jobs
                        .find(&self.id)
                        .map(|job| LaunchSpec::for_job(job, &self.config, log_file)),
                    EntityKind::Report => registry
                        .reports
                        .find(&self.id)
                        .map(|report| LaunchSpec::for_report(report, &self.config, log_file)),
                };
                match (spec, registry.run_state_mut(self.kind, &self.id)) {
                    (Some(spec), Some(run)) => {
                        run.mark_started(now);
                        Step::Launch(spec)
                    }
                    _ => Step::Stop(RunOutcome::Aborted(StartStatus::Undefined)),
                }
            }
            StartStatus::ScheduledTimeNotReached => match registry.run_state(self.kind, &self.id) {
                Some(run) => Step::Wait(run.check_interval),
                None => Step::Stop(RunOutcome::Aborted(StartStatus::Undefined)),
            },
            StartStatus::DependentNotFinished => {
                let Some(run) = registry.run_state_mut(self.kind, &self.id) else {
                    return Step::Stop(RunOutcome::Aborted(StartStatus::Undefined));
                };
                if run.check_interval_counter < run.max_check_intervals {
                    run.check_interval_counter += 1;
                    tracing::info!(
                        kind = %self.kind,
                        id = %self.id,
                        retries_left = run.max_check_intervals - run.check_interval_counter,
                        "Dependent job(s) not finished, waiting"
                    );
                    Step::Wait(run.check_interval)
                } else {
                    run.abandon_start();
                    tracing::warn!(
                        kind = %self.kind,
                        id = %self.id,
                        checks = run.max_check_intervals,
                        "Dependent job(s) still not finished, run abandoned"
                    );
                    Step::Stop(RunOutcome::Abandoned)
                }
            }
            other => {
                if let Some(run) = registry.run_state_mut(self.kind, &self.id) {
                    run.abandon_start();
                }
                tracing::warn!(kind = %self.kind, id = %self.id, status = %other, "Run aborted");
                Step::Stop(RunOutcome::Aborted(other))
            }
        }
    }

    fn cancelled(&self) -> Step {
        tracing::info!(kind = %self.kind, id = %self.id, "Run request withdrawn");
        Step::Stop(RunOutcome::Cancelled)
    }

    async fn launch(&self, spec: LaunchSpec) -> RunOutcome {
        tracing::info!(
            kind = %self.kind,
            id = %self.id,
            log = %spec.log_file.display(),
            "Run started"
        );

        match ProcessLauncher::new().execute(&spec).await {
            Ok(exit_code) => {
                let mut registry = self.registry.write().await;
                match registry.run_state_mut(self.kind, &self.id) {
                    Some(run) => run.mark_finished(exit_code, Time::now()),
                    None => tracing::warn!(
                        kind = %self.kind,
                        id = %self.id,
                        exit_code,
                        "Run finished but the entity is no longer registered"
                    ),
                }
                tracing::info!(kind = %self.kind, id = %self.id, exit_code, "Run finished");
                RunOutcome::Completed { exit_code }
            }
            Err(e) => {
                let mut registry = self.registry.write().await;
                if let Some(run) = registry.run_state_mut(self.kind, &self.id) {
                    run.abandon_start();
                }
                tracing::warn!(kind = %self.kind, id = %self.id, error = %e, "Launch failed");
                RunOutcome::LaunchFailed(e.to_string())
            }
        }
    }
}
