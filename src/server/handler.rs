use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::CoordinatorConfig;
use crate::definitions::{read_job_file, read_report_file, DefinitionLoader, Loaded};
use crate::protocol::{Command, EntityVerb, Value, Verb};
use crate::scheduler::{
    status, Entity, EntityKind, EntityRegistry, Registry, SharedRegistry, StartStatus,
};
use crate::time::{describe_elapsed, Time};
use crate::worker::{Activation, RunSupervisor};

const NON_TEXT_REQUEST: &str = "unknown object received - only strings are processed";

/// Response to one request. `close` ends the connection after sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub value: Value,
    pub close: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: Value::Text(text.into()),
            close: false,
        }
    }

    pub fn integer(n: i64) -> Self {
        Self {
            value: Value::Integer(n),
            close: false,
        }
    }

    fn closing(text: impl Into<String>) -> Self {
        Self {
            value: Value::Text(text.into()),
            close: true,
        }
    }
}

fn entity_message(kind: EntityKind, id: &str, message: impl std::fmt::Display) -> String {
    format!("{} [{}] {}", kind, id, message)
}

fn not_existing(kind: EntityKind, id: &str) -> Reply {
    Reply::text(entity_message(kind, id, "not existing"))
}

/// Dispatches protocol commands against the shared registry.
///
/// Holds no socket state; one handler is cloned into every connection.
#[derive(Clone)]
pub struct CommandHandler {
    registry: SharedRegistry,
    config: Arc<CoordinatorConfig>,
    loader: DefinitionLoader,
    started: Instant,
}

impl CommandHandler {
    pub fn new(registry: SharedRegistry, config: Arc<CoordinatorConfig>) -> Self {
        Self {
            loader: DefinitionLoader::from_config(&config),
            registry,
            config,
            started: Instant::now(),
        }
    }

    pub async fn handle(&self, request: Value, peer: SocketAddr) -> Reply {
        let Value::Text(message) = request else {
            return Reply::text(NON_TEXT_REQUEST);
        };
        let Some(command) = Command::parse(&message) else {
            tracing::debug!(peer = %peer, message = %message, "Unknown message");
            return Reply::text(format!("unknown message: [{}]", message));
        };
        tracing::debug!(peer = %peer, message = %message, "Request");

        match command.verb {
            Verb::Exit => Reply::closing("exit"),
            Verb::Uptime => {
                let millis = self.started.elapsed().as_millis() as i64;
                Reply::text(format!("uptime {}", describe_elapsed(millis)))
            }
            Verb::ProcessId => Reply::text(format!("server processid: [{}]", std::process::id())),
            Verb::Hello => Reply::text(format!("hello client from: [{}]", peer.ip())),
            Verb::Entity(kind, verb) => match command.argument {
                Some(id) => self.entity(kind, verb, &id).await,
                None => Reply::text(format!("{} id missing", kind)),
            },
            Verb::List(kind) => {
                let ids = self.registry.read().await.list(kind);
                Reply::text(format!("list of {}s: [{}]", kind, ids.join(", ")))
            }
            Verb::Count(kind) => {
                let count = self.registry.read().await.count(kind);
                Reply::text(format!("number of {}s: [{}]", kind, count))
            }
            Verb::Reload(kind) => match self.loader.reload(kind, &self.registry).await {
                Ok(_) => Reply::text("ok"),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Reload failed");
                    Reply::text(format!("error reloading {}s: [{}]", kind, e))
                }
            },
            Verb::ResetAll(kind) => {
                self.registry.write().await.reset_all(kind);
                tracing::info!(kind = %kind, "Reset all, schedules moved to today");
                Reply::text("ok")
            }
            Verb::NextJob => self.next_job().await,
            Verb::ListGroupReports => match parse_group(command.argument.as_deref()) {
                Ok(group) => self.list_group(group).await,
                Err(reply) => reply,
            },
            Verb::ReportGroupRun => match parse_group(command.argument.as_deref()) {
                Ok(group) => self.run_group(group).await,
                Err(reply) => reply,
            },
        }
    }

    async fn entity(&self, kind: EntityKind, verb: EntityVerb, id: &str) -> Reply {
        match verb {
            EntityVerb::Add => self.add(kind, id).await,
            EntityVerb::Run => self.run(kind, id).await,
            EntityVerb::Reset => {
                if self.registry.write().await.reset(kind, id) {
                    tracing::info!(kind = %kind, id = %id, "Reset");
                    Reply::text(entity_message(kind, id, "reset"))
                } else {
                    not_existing(kind, id)
                }
            }
            EntityVerb::Remove => {
                if self.registry.write().await.remove(kind, id) {
                    tracing::info!(kind = %kind, id = %id, "Removed");
                    Reply::text(entity_message(kind, id, "removed"))
                } else {
                    not_existing(kind, id)
                }
            }
            _ => {
                let registry = self.registry.read().await;
                describe(&registry, kind, verb, id, &Time::now())
            }
        }
    }

    async fn run(&self, kind: EntityKind, id: &str) -> Reply {
        let supervisor =
            RunSupervisor::new(kind, id, self.registry.clone(), self.config.clone());
        Reply::text(activation_message(kind, id, supervisor.trigger().await))
    }

    /// Read a definition file and register what it defines. The file is
    /// read before the registry lock is taken.
    async fn add(&self, kind: EntityKind, file: &str) -> Reply {
        let path = PathBuf::from(file);
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Reply::text(entity_message(kind, file, "does not exist or not a file"));
        }

        let outcome = match kind {
            EntityKind::Job => {
                match tokio::task::spawn_blocking(move || read_job_file(&path)).await {
                    Ok(Ok(loaded)) => {
                        let mut registry = self.registry.write().await;
                        Some(add_loaded(&mut registry.jobs, loaded))
                    }
                    _ => None,
                }
            }
            EntityKind::Report => {
                match tokio::task::spawn_blocking(move || read_report_file(&path)).await {
                    Ok(Ok(loaded)) => {
                        let mut registry = self.registry.write().await;
                        Some(add_loaded(&mut registry.reports, loaded))
                    }
                    _ => None,
                }
            }
        };

        match outcome {
            Some(AddOutcome { added, .. }) if !added.is_empty() => {
                tracing::info!(kind = %kind, file = %file, ids = ?added, "Added definitions");
                Reply::text(entity_message(
                    kind,
                    file,
                    format!("added: [{}]", added.join(", ")),
                ))
            }
            Some(AddOutcome { existing, .. }) if !existing.is_empty() => {
                Reply::text(entity_message(kind, file, "already existing"))
            }
            _ => Reply::text(entity_message(kind, file, "error reading file")),
        }
    }

    async fn next_job(&self) -> Reply {
        let registry = self.registry.read().await;
        let next = registry.next_jobs(&Time::now());
        let at = next
            .first()
            .and_then(|id| registry.jobs.find(id))
            .map(|job| job.run.scheduled_start_time.format_time());
        match at {
            Some(at) => Reply::text(format!("next job(s): [{}] at [{}]", next.join(", "), at)),
            None => Reply::text("no next job"),
        }
    }

    async fn list_group(&self, group: i64) -> Reply {
        let ids = self.registry.read().await.group_reports(group);
        if ids.is_empty() {
            return Reply::text(format!("report [{}] no reports found", group));
        }
        Reply::text(format!(
            "list of reports, group [{}]: [{}]",
            group,
            ids.join(", ")
        ))
    }

    /// Trigger every report of a group; one acknowledgement per report.
    async fn run_group(&self, group: i64) -> Reply {
        let ids = self.registry.read().await.group_reports(group);
        if ids.is_empty() {
            return Reply::text(format!("report [{}] no reports found", group));
        }
        let mut acknowledgements = Vec::with_capacity(ids.len());
        for id in ids {
            let supervisor = RunSupervisor::new(
                EntityKind::Report,
                id.as_str(),
                self.registry.clone(),
                self.config.clone(),
            );
            let activation = supervisor.trigger().await;
            acknowledgements.push(activation_message(EntityKind::Report, &id, activation));
        }
        Reply::text(acknowledgements.join("; "))
    }
}

/// Answers for the read-only entity verbs.
fn describe(registry: &Registry, kind: EntityKind, verb: EntityVerb, id: &str, now: &Time) -> Reply {
    let Some(run) = registry.run_state(kind, id) else {
        return not_existing(kind, id);
    };
    match verb {
        EntityVerb::StartStatus => {
            let status = status::status(registry, kind, id, now);
            Reply::integer(status.code())
        }
        EntityVerb::CanStart => {
            let status: StartStatus = status::status(registry, kind, id, now);
            Reply::text(format!("status: [{}]", status))
        }
        EntityVerb::StartTime => Reply::text(run.scheduled_start_time.format_time()),
        EntityVerb::RunTime => match (run.actual_start_time, run.runtime_millis()) {
            (_, Some(millis)) => Reply::text(describe_elapsed(millis)),
            (None, None) => Reply::text(entity_message(kind, id, "not started")),
            (Some(_), None) => Reply::text(entity_message(kind, id, "not finished")),
        },
        EntityVerb::ExitCode => Reply::text(entity_message(
            kind,
            id,
            format!("exit code: [{}]", run.exit_code),
        )),
        EntityVerb::Dependencies => Reply::text(entity_message(
            kind,
            id,
            format!("depends on: [{}]", run.dependent_job_ids.join(", ")),
        )),
        EntityVerb::Finished => match (run.finished, run.finished_time) {
            (true, Some(at)) => Reply::text(entity_message(
                kind,
                id,
                format!("finished [{}]", at.format_datetime()),
            )),
            _ => Reply::text(entity_message(kind, id, "not finished")),
        },
        EntityVerb::Json => {
            Reply::text(registry.definition(kind, id).unwrap_or_default().to_string())
        }
        EntityVerb::Reset | EntityVerb::Remove | EntityVerb::Add | EntityVerb::Run => {
            Reply::text(format!("unknown message: [{}]", id))
        }
    }
}

fn activation_message(kind: EntityKind, id: &str, activation: Activation) -> String {
    let stamp = |time: Option<Time>| time.map(|t| t.format_time()).unwrap_or_default();
    match activation {
        Activation::Activated { scheduled } => entity_message(
            kind,
            id,
            format!("activated run. scheduled: [{}]", scheduled.format_time()),
        ),
        Activation::Finished { at } => {
            entity_message(kind, id, format!("finished: [{}]", stamp(at)))
        }
        Activation::Running { since } => {
            entity_message(kind, id, format!("running: [{}]", stamp(since)))
        }
        Activation::AlreadyRequested => entity_message(kind, id, "run already requested"),
        Activation::NotFound => entity_message(kind, id, "not existing"),
    }
}

fn parse_group(argument: Option<&str>) -> Result<i64, Reply> {
    let Some(group) = argument else {
        return Err(Reply::text("report id missing"));
    };
    group
        .parse()
        .map_err(|_| Reply::text(format!("report [{}] invalid group", group)))
}

struct AddOutcome {
    added: Vec<String>,
    existing: Vec<String>,
}

fn add_loaded<T: Entity>(registry: &mut EntityRegistry<T>, loaded: Loaded<T>) -> AddOutcome {
    let mut outcome = AddOutcome {
        added: Vec::new(),
        existing: Vec::new(),
    };
    for entity in loaded.entities {
        let id = entity.id().to_string();
        match registry.add(entity) {
            Ok(()) => outcome.added.push(id),
            Err(e) => {
                tracing::warn!(error = %e, "Not adding definition");
                outcome.existing.push(id);
            }
        }
    }
    outcome
}
