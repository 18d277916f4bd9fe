use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::job::{Entity, EntityKind, RunState};
use crate::time::Time;

/// Where and how the report renderer is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererTarget {
    pub server: String,
    pub port: Option<u16>,
    pub base_url: String,
    pub solution: String,
    pub path: String,
    pub render_mode: String,
    pub output_target: String,
    pub locale: String,
    pub attachment_name: Option<String>,
}

/// A rendering task that runs after the jobs it depends on.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
    /// Folder receiving the rendered document
    pub target_path: PathBuf,
    /// Reports sharing a group can be triggered together
    pub group: Option<i64>,
    pub renderer: RendererTarget,
    /// Query parameters in definition order, variables already resolved
    pub parameters: Vec<(String, String)>,
    pub definition: String,
    pub run: RunState,
}

impl Report {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let filename = filename.into();
        Self {
            id: id.into(),
            name: filename.clone(),
            filename,
            path: path.into(),
            target_path: PathBuf::from("."),
            group: None,
            renderer: RendererTarget::default(),
            parameters: Vec::new(),
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

    pub fn in_group(mut self, group: i64) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_check_interval(mut self, interval: Duration, max_check_intervals: u64) -> Self {
        self.run.check_interval = interval;
        self.run.max_check_intervals = max_check_intervals;
        self
    }

    /// File the renderer writes the document to.
    pub fn output_document(&self) -> PathBuf {
        let name = self
            .renderer
            .attachment_name
            .as_deref()
            .unwrap_or(&self.filename);
        self.target_path.join(name)
    }

    /// Renderer request URL without credentials.
    pub fn server_url(&self) -> String {
        let r = &self.renderer;
        let host = match r.port {
            Some(port) => format!("{}:{}", r.server, port),
            None => r.server.clone(),
        };
        let mut url = format!(
            "{}/{}/{}{}&render_mode={}&output-target={}&locale={}",
            host, r.base_url, r.solution, r.path, r.render_mode, r.output_target, r.locale
        );
        for (key, value) in &self.parameters {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    /// Full request URL with renderer credentials injected.
    pub fn request_url(&self, user: Option<&str>, password: Option<&str>) -> String {
        let mut url = self.server_url();
        if let Some(user) = user {
            url.push_str("&userid=");
            url.push_str(user);
        }
        if let Some(password) = password {
            url.push_str("&password=");
            url.push_str(password);
        }
        url
    }
}

impl Entity for Report {
    const KIND: EntityKind = EntityKind::Report;

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

    fn sales_report() -> Report {
        let mut report = Report::new("sales", "sales.prpt", "/reports");
        report.target_path = PathBuf::from("/out");
        report.renderer = RendererTarget {
            server: "http://bi.local".to_string(),
            port: Some(8080),
            base_url: "pentaho/api/repos".to_string(),
            solution: "public".to_string(),
            path: "/sales.prpt/generatedContent?x=1".to_string(),
            render_mode: "REPORT".to_string(),
            output_target: "pageable/pdf".to_string(),
            locale: "de_DE".to_string(),
            attachment_name: Some("sales.pdf".to_string()),
        };
        report.parameters = vec![
            ("year".to_string(), "2024".to_string()),
            ("region".to_string(), "north".to_string()),
        ];
        report
    }

    #[test]
    fn server_url_includes_render_settings_and_parameters() {
        let url = sales_report().server_url();
        assert_eq!(
            url,
            "http://bi.local:8080/pentaho/api/repos/public/sales.prpt/generatedContent?x=1\
             &render_mode=REPORT&output-target=pageable/pdf&locale=de_DE&year=2024&region=north"
        );
    }

    #[test]
    fn request_url_appends_credentials() {
        let url = sales_report().request_url(Some("admin"), Some("secret"));
        assert!(url.ends_with("&region=north&userid=admin&password=secret"));
    }

    #[test]
    fn output_document_prefers_attachment_name() {
        let mut report = sales_report();
        assert_eq!(report.output_document(), PathBuf::from("/out/sales.pdf"));
        report.renderer.attachment_name = None;
        assert_eq!(report.output_document(), PathBuf::from("/out/sales.prpt"));
    }
}
