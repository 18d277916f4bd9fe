use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::config::CoordinatorConfig;
use crate::definitions::variables;
use crate::error::{CoordinatorError, Result};
use crate::scheduler::{
    EntityKind, Job, Registry, ReloadSummary, RendererTarget, Report, RunState, SharedRegistry,
};
use crate::time::Time;

/// Entities read from definition documents plus the reasons for any skipped
/// definitions.
#[derive(Debug)]
pub struct Loaded<T> {
    pub entities: Vec<T>,
    pub skipped: Vec<String>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    fn skip(&mut self, source: &Path, reason: impl std::fmt::Display) {
        tracing::warn!(file = %source.display(), reason = %reason, "Skipping definition");
        self.skipped.push(format!("{}: {}", source.display(), reason));
    }

    fn extend(&mut self, other: Loaded<T>) {
        self.entities.extend(other.entities);
        self.skipped.extend(other.skipped);
    }
}

#[derive(Debug, Deserialize)]
struct DependencyRef {
    jobid: String,
}

#[derive(Debug, Deserialize)]
struct JobCollection<'a> {
    #[serde(borrow)]
    jobs: Vec<&'a RawValue>,
}

#[derive(Debug, Deserialize)]
struct JobDocument {
    id: Option<String>,
    filename: Option<String>,
    name: Option<String>,
    path: Option<String>,
    scheduled_start_time: Option<String>,
    check_interval: Option<u64>,
    max_check_intervals: Option<u64>,
    log_level: Option<String>,
    #[serde(default)]
    depends_on_job: Vec<DependencyRef>,
    #[serde(default)]
    parameters: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ReportDocument {
    id: Option<String>,
    group: Option<i64>,
    filename: Option<String>,
    name: Option<String>,
    path: Option<String>,
    target_path: Option<String>,
    scheduled_start_time: Option<String>,
    check_interval: Option<u64>,
    max_check_intervals: Option<u64>,
    #[serde(default)]
    depends_on_job: Vec<DependencyRef>,
    #[serde(alias = "pentaho_server")]
    renderer_server: Option<String>,
    #[serde(alias = "pentaho_server_port")]
    renderer_port: Option<u16>,
    #[serde(alias = "pentaho_base_url")]
    renderer_base_url: Option<String>,
    #[serde(alias = "pentaho_solution")]
    renderer_solution: Option<String>,
    #[serde(alias = "pentaho_path")]
    renderer_path: Option<String>,
    render_mode: Option<String>,
    #[serde(rename = "output-target")]
    output_target: Option<String>,
    locale: Option<String>,
    attachment_name: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// Reads job and report definition documents from their folders.
#[derive(Debug, Clone)]
pub struct DefinitionLoader {
    jobs_dir: PathBuf,
    reports_dir: PathBuf,
}

impl DefinitionLoader {
    pub fn new(jobs_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(&config.jobs_dir, &config.reports_dir)
    }

    /// Read every job document in the jobs folder. Only an unreadable folder
    /// is an error; bad documents and definitions are skipped.
    pub fn load_jobs(&self) -> Result<Loaded<Job>> {
        let mut loaded = Loaded::default();
        for file in definition_files(&self.jobs_dir)? {
            match read_job_file(&file) {
                Ok(from_file) => loaded.extend(from_file),
                Err(e) => loaded.skip(&file, e),
            }
        }
        tracing::info!(
            dir = %self.jobs_dir.display(),
            jobs = loaded.entities.len(),
            skipped = loaded.skipped.len(),
            "Loaded job definitions"
        );
        Ok(loaded)
    }

    /// Read every report document (one report per file) in the reports folder.
    pub fn load_reports(&self) -> Result<Loaded<Report>> {
        let mut loaded = Loaded::default();
        for file in definition_files(&self.reports_dir)? {
            match read_report_file(&file) {
                Ok(from_file) => loaded.extend(from_file),
                Err(e) => loaded.skip(&file, e),
            }
        }
        tracing::info!(
            dir = %self.reports_dir.display(),
            reports = loaded.entities.len(),
            skipped = loaded.skipped.len(),
            "Loaded report definitions"
        );
        Ok(loaded)
    }

    /// Replace all entities of `kind` with the definitions currently on
    /// disk. The folder is read before the registry lock is taken; the swap
    /// happens in one write section.
    pub async fn reload(&self, kind: EntityKind, registry: &SharedRegistry) -> Result<ReloadSummary> {
        let loader = self.clone();
        let summary = match kind {
            EntityKind::Job => {
                let loaded = tokio::task::spawn_blocking(move || loader.load_jobs())
                    .await
                    .map_err(join_error)??;
                let mut registry = registry.write().await;
                let mut summary = registry.jobs.replace_all(loaded.entities);
                summary.skipped += loaded.skipped.len();
                warn_unresolved(&registry);
                summary
            }
            EntityKind::Report => {
                let loaded = tokio::task::spawn_blocking(move || loader.load_reports())
                    .await
                    .map_err(join_error)??;
                let mut registry = registry.write().await;
                let mut summary = registry.reports.replace_all(loaded.entities);
                summary.skipped += loaded.skipped.len();
                warn_unresolved(&registry);
                summary
            }
        };
        tracing::info!(
            kind = %kind,
            loaded = summary.loaded,
            skipped = summary.skipped,
            "Reloaded definitions"
        );
        Ok(summary)
    }
}

fn join_error(e: tokio::task::JoinError) -> CoordinatorError {
    CoordinatorError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Dependencies on unknown jobs count as satisfied; make them visible.
fn warn_unresolved(registry: &Registry) {
    for (kind, id, dependency) in registry.unresolved_dependencies() {
        tracing::warn!(
            kind = %kind,
            id = %id,
            dependency = %dependency,
            "Dependency names no loaded job and is treated as satisfied"
        );
    }
}

/// Regular files of `dir`, sorted by name.
fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read one job document: either `{"jobs": [..]}` or a single job object.
pub fn read_job_file(file: &Path) -> Result<Loaded<Job>> {
    let content = fs::read_to_string(file)?;
    let raws: Vec<&RawValue> = match serde_json::from_str::<JobCollection>(&content) {
        Ok(collection) => collection.jobs,
        Err(_) => vec![serde_json::from_str::<&RawValue>(&content)?],
    };

    let now = Local::now().naive_local();
    let mut loaded = Loaded::default();
    for raw in raws {
        match parse_job(raw.get(), now) {
            Ok(job) => loaded.entities.push(job),
            Err(e) => loaded.skip(file, e),
        }
    }
    Ok(loaded)
}

/// Read one report document holding a single report object.
pub fn read_report_file(file: &Path) -> Result<Loaded<Report>> {
    let content = fs::read_to_string(file)?;
    let raw: &RawValue = serde_json::from_str(&content)?;
    let mut loaded = Loaded::default();
    match parse_report(raw.get(), Local::now().naive_local()) {
        Ok(report) => loaded.entities.push(report),
        Err(e) => loaded.skip(file, e),
    }
    Ok(loaded)
}

/// Build a job from the JSON text of one job object.
pub fn parse_job(raw: &str, now: NaiveDateTime) -> Result<Job> {
    let doc: JobDocument = serde_json::from_str(raw)?;
    let id = require_id(doc.id)?;
    let filename = require(doc.filename, "filename", &id)?;
    let path = PathBuf::from(require(doc.path, "path", &id)?);
    check_readable(&path.join(&filename))?;

    let mut job = Job::new(id, filename, path);
    if let Some(name) = doc.name {
        job.name = name;
    }
    if let Some(level) = doc.log_level {
        job.log_level = level;
    }
    job.run = run_state(
        doc.scheduled_start_time.as_deref(),
        doc.check_interval,
        doc.max_check_intervals,
        doc.depends_on_job,
        now,
    )?;
    for (key, value) in doc.parameters {
        let value = variables::resolve(&value_text(value), now)?;
        job.parameters.insert(key, value);
    }
    job.definition = raw.to_string();
    Ok(job)
}

/// Build a report from the JSON text of one report object.
pub fn parse_report(raw: &str, now: NaiveDateTime) -> Result<Report> {
    let doc: ReportDocument = serde_json::from_str(raw)?;
    let id = require_id(doc.id)?;
    let filename = require(doc.filename, "filename", &id)?;
    let path = PathBuf::from(require(doc.path, "path", &id)?);
    check_readable(&path.join(&filename))?;

    let mut report = Report::new(id, filename, path);
    if let Some(name) = doc.name {
        report.name = name;
    }
    if let Some(target) = doc.target_path {
        report.target_path = PathBuf::from(target);
    }
    report.group = doc.group;
    report.renderer = RendererTarget {
        server: doc.renderer_server.unwrap_or_default(),
        port: doc.renderer_port,
        base_url: doc.renderer_base_url.unwrap_or_default(),
        solution: doc.renderer_solution.unwrap_or_default(),
        path: doc.renderer_path.unwrap_or_default(),
        render_mode: doc.render_mode.unwrap_or_default(),
        output_target: doc.output_target.unwrap_or_default(),
        locale: doc.locale.unwrap_or_default(),
        attachment_name: doc.attachment_name,
    };
    report.run = run_state(
        doc.scheduled_start_time.as_deref(),
        doc.check_interval,
        doc.max_check_intervals,
        doc.depends_on_job,
        now,
    )?;
    for (key, value) in doc.parameters {
        let value = variables::resolve(&value_text(value), now)?;
        report.parameters.push((key, value));
    }
    report.definition = raw.to_string();
    Ok(report)
}

fn require_id(id: Option<String>) -> Result<String> {
    let id = id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CoordinatorError::InvalidDefinition("id is undefined".to_string()))?;
    if id.contains(':') {
        return Err(CoordinatorError::InvalidDefinition(format!(
            "id [{}] must not contain ':'",
            id
        )));
    }
    Ok(id)
}

fn require(value: Option<String>, key: &str, id: &str) -> Result<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        CoordinatorError::InvalidDefinition(format!("[{}] is missing [{}]", id, key))
    })
}

/// The referenced file must exist, be a regular file and be readable.
pub fn check_readable(file: &Path) -> Result<()> {
    let is_file = fs::metadata(file).map(|m| m.is_file()).unwrap_or(false);
    if !is_file || File::open(file).is_err() {
        return Err(CoordinatorError::ScriptNotReadable(file.to_path_buf()));
    }
    Ok(())
}

fn run_state(
    scheduled_start_time: Option<&str>,
    check_interval: Option<u64>,
    max_check_intervals: Option<u64>,
    depends_on: Vec<DependencyRef>,
    now: NaiveDateTime,
) -> Result<RunState> {
    let time_of_day = match scheduled_start_time {
        Some(value) => Time::parse_time_of_day(value)?,
        None => NaiveTime::MIN,
    };
    let mut run = RunState::new(Time::on_date(now.date(), time_of_day));
    if let Some(ms) = check_interval {
        run.check_interval = Duration::from_millis(ms);
    }
    if let Some(max) = max_check_intervals {
        run.max_check_intervals = max;
    }
    for dependency in depends_on {
        run.add_dependency(dependency.jobid);
    }
    Ok(run)
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
