use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::scheduler::{Job, Report};
use crate::time::Time;

/// A process killed by signal `n` is recorded with exit code `128 + n`,
/// the way shells report it.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Everything needed to start one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Receives the child's stdout and stderr
    pub log_file: PathBuf,
}

impl LaunchSpec {
    /// `<runner> <runner args..> -file=<script> -param:k=v.. -level=<level>`,
    /// run from the job's folder with the configured environment overlaid.
    pub fn for_job(job: &Job, config: &CoordinatorConfig, log_file: PathBuf) -> Self {
        let runner = &config.script_runner;
        let mut args = runner.args.clone();
        args.push(format!("-file={}", job.script_path().display()));
        for (key, value) in &job.parameters {
            args.push(format!("-param:{}={}", key, value));
        }
        args.push(format!("-level={}", job.log_level));

        Self {
            program: runner.program.clone(),
            args,
            current_dir: job.path.clone(),
            env: config.environment.clone(),
            log_file,
        }
    }

    /// `<render command> <args..> --output-file=<log> --no-check-certificate
    /// --output-document=<target> <request url>`, run from the report's folder.
    pub fn for_report(report: &Report, config: &CoordinatorConfig, log_file: PathBuf) -> Self {
        let renderer = &config.renderer;
        let mut args = renderer.command.args.clone();
        args.push(format!("--output-file={}", log_file.display()));
        args.push("--no-check-certificate".to_string());
        args.push(format!(
            "--output-document={}",
            report.output_document().display()
        ));
        args.push(report.request_url(renderer.user.as_deref(), renderer.password.as_deref()));

        Self {
            program: renderer.command.program.clone(),
            args,
            current_dir: report.path.clone(),
            env: BTreeMap::new(),
            log_file,
        }
    }
}

/// `<logs_dir>/<id>_<yyyyMMddHHmmss>.log`
pub fn log_file_path(logs_dir: &Path, id: &str, started: &Time) -> PathBuf {
    logs_dir.join(format!("{}_{}.log", id, started.log_stamp()))
}

/// Runs launch specs as child processes and waits for their exit.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Start the process and wait for it. Returns the exit code; a process
    /// terminated by a signal yields a positive code (see [`exit_code`]).
    ///
    /// Only failing to start the process is an error.
    pub async fn execute(&self, spec: &LaunchSpec) -> Result<i32> {
        if let Some(dir) = spec.log_file.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_file)
            .await?;
        let stderr = log.try_clone().await?.into_std().await;
        let stdout = log.into_std().await;

        tracing::debug!(
            program = %spec.program.display(),
            args = ?spec.args,
            cwd = %spec.current_dir.display(),
            "Spawning process"
        );

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.current_dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| {
                CoordinatorError::Launch(format!("{}: {}", spec.program.display(), e))
            })?;

        let status = child.wait().await?;
        Ok(exit_code(status))
    }
}

/// Exit code of a finished process. Never zero for a process that was killed.
pub fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SIGNAL_EXIT_BASE + signal;
        }
    }
    status.code().unwrap_or(SIGNAL_EXIT_BASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;
    use crate::scheduler::RendererTarget;

    #[test]
    fn job_command_line() {
        let mut config = CoordinatorConfig::default().with_env("KETTLE_HOME", "/opt/kettle");
        config.script_runner = CommandConfig::new("bash").with_arg("/opt/pdi/kitchen.sh");
        let job = Job::new("load", "load.kjb", "/etl/jobs")
            .with_parameter("day", "2024-01-05")
            .with_parameter("area", "north");

        let spec = LaunchSpec::for_job(&job, &config, PathBuf::from("/logs/load.log"));
        assert_eq!(spec.program, PathBuf::from("bash"));
        assert_eq!(
            spec.args,
            vec![
                "/opt/pdi/kitchen.sh",
                "-file=/etl/jobs/load.kjb",
                "-param:area=north",
                "-param:day=2024-01-05",
                "-level=Basic",
            ]
        );
        assert_eq!(spec.current_dir, PathBuf::from("/etl/jobs"));
        assert_eq!(spec.env["KETTLE_HOME"], "/opt/kettle");
    }

    #[test]
    fn report_command_line() {
        let mut config = CoordinatorConfig::default();
        config.renderer.user = Some("admin".to_string());
        config.renderer.password = Some("pw".to_string());
        let mut report = Report::new("sales", "sales.prpt", "/reports");
        report.target_path = PathBuf::from("/out");
        report.renderer = RendererTarget {
            server: "http://bi".to_string(),
            base_url: "api".to_string(),
            solution: "public".to_string(),
            path: "/sales?x=1".to_string(),
            ..Default::default()
        };

        let spec = LaunchSpec::for_report(&report, &config, PathBuf::from("/logs/sales.log"));
        assert_eq!(spec.program, PathBuf::from("wget"));
        assert_eq!(spec.args[0], "--output-file=/logs/sales.log");
        assert_eq!(spec.args[1], "--no-check-certificate");
        assert_eq!(spec.args[2], "--output-document=/out/sales.prpt");
        assert!(spec.args[3].starts_with("http://bi/api/public/sales?x=1&render_mode="));
        assert!(spec.args[3].ends_with("&userid=admin&password=pw"));
        assert_eq!(spec.current_dir, PathBuf::from("/reports"));
    }

    #[test]
    fn log_file_name_uses_id_and_stamp() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let started = Time::on_date(date, chrono::NaiveTime::from_hms_opt(6, 5, 4).unwrap());
        assert_eq!(
            log_file_path(Path::new("/logs"), "load", &started),
            PathBuf::from("/logs/load_20240301060504.log")
        );
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_is_a_bad_exit_code() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status: killed by SIGKILL, or exited with 3
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
    }
}
