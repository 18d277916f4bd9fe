use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// An external program plus the leading arguments passed before the
/// per-run arguments.
///
/// Leading arguments let a wrapper be configured, e.g. `bash` with the
/// ETL runner script as its first argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Configuration for report rendering.
///
/// The render command is invoked with the report request URL; the
/// credentials are appended to that URL as query parameters.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub command: CommandConfig,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: CommandConfig::new("wget"),
            user: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub listen_addr: SocketAddr,
    /// Folder holding the job definition documents
    pub jobs_dir: PathBuf,
    /// Folder holding the report definition documents
    pub reports_dir: PathBuf,
    /// Folder receiving one log file per run
    pub logs_dir: PathBuf,
    /// Runner invoked for jobs as `<runner> -file=.. -param:k=v -level=..`
    pub script_runner: CommandConfig,
    pub renderer: RendererConfig,
    /// Environment variables overlaid on every launched job process
    pub environment: BTreeMap<String, String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:9000"
                .parse()
                .expect("default listen address is valid"),
            jobs_dir: PathBuf::from("jobs"),
            reports_dir: PathBuf::from("reports"),
            logs_dir: PathBuf::from("logs"),
            script_runner: CommandConfig::new("kitchen.sh"),
            renderer: RendererConfig::default(),
            environment: BTreeMap::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// Parse a `KEY=VALUE` pair as given on the command line.
pub fn parse_env_pair(pair: &str) -> Option<(String, String)> {
    let (key, value) = pair.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_config_default() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.jobs_dir, PathBuf::from("jobs"));
        assert_eq!(cfg.reports_dir, PathBuf::from("reports"));
        assert_eq!(cfg.logs_dir, PathBuf::from("logs"));
        assert!(cfg.environment.is_empty());
        assert!(cfg.script_runner.args.is_empty());
    }

    #[test]
    fn coordinator_config_new() {
        let addr: SocketAddr = "10.0.0.1:9100".parse().unwrap();
        let cfg = CoordinatorConfig::new(addr);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.logs_dir, PathBuf::from("logs"));
    }

    #[test]
    fn coordinator_config_with_env() {
        let cfg = CoordinatorConfig::default()
            .with_env("KETTLE_HOME", "/opt/kettle")
            .with_env("LANG", "C");
        assert_eq!(cfg.environment.len(), 2);
        assert_eq!(cfg.environment["KETTLE_HOME"], "/opt/kettle");
    }

    #[test]
    fn renderer_config_default_has_no_credentials() {
        let cfg = RendererConfig::default();
        assert_eq!(cfg.command.program, PathBuf::from("wget"));
        assert!(cfg.user.is_none());
        assert!(cfg.password.is_none());
    }

    #[test]
    fn command_config_with_args() {
        let cmd = CommandConfig::new("bash").with_arg("/opt/pdi/kitchen.sh");
        assert_eq!(cmd.program, PathBuf::from("bash"));
        assert_eq!(cmd.args, vec!["/opt/pdi/kitchen.sh".to_string()]);
    }

    #[test]
    fn env_pair_parsing() {
        assert_eq!(
            parse_env_pair("A=b=c"),
            Some(("A".to_string(), "b=c".to_string()))
        );
        assert_eq!(parse_env_pair("EMPTY="), Some(("EMPTY".to_string(), String::new())));
        assert_eq!(parse_env_pair("novalue"), None);
        assert_eq!(parse_env_pair("=x"), None);
    }
}
