//! Terminal output and report artifacts.
//!
//! [`print_report`] writes a run summary to stdout. A [`ReportRenderer`]
//! turns each terminated scan into report files; [`FileReportRenderer`]
//! writes JSON, Markdown and HTML under the report directory.

mod cli;
mod html;
mod json;
mod markdown;

pub use cli::print_cli_table;
pub use html::render_html;
pub use json::{print_json, render_json};
pub use markdown::render_markdown;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Scan;
use crate::scheduler::ScheduleReport;

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

pub fn print_report(report: &ScheduleReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(report),
        OutputFormat::Json => print_json(report),
    }
}

/// Turns a terminated scan into report artifacts.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Returns the paths of every artifact written.
    async fn render(&self, scan: &Scan) -> Result<Vec<PathBuf>>;
}

/// Writes `<report_dir>/json/<target>.json`, `<report_dir>/markdown/<target>.md`
/// and `<report_dir>/html/<target>.html`.
#[derive(Debug, Clone)]
pub struct FileReportRenderer {
    report_dir: PathBuf,
}

impl FileReportRenderer {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    async fn write(&self, format_dir: &str, file_name: String, content: String) -> Result<PathBuf> {
        let dir = self.report_dir.join(format_dir);
        let path = dir.join(file_name);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Report(format!("{}: {}", dir.display(), e)))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::Report(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "report written");
        Ok(path)
    }
}

#[async_trait]
impl ReportRenderer for FileReportRenderer {
    async fn render(&self, scan: &Scan) -> Result<Vec<PathBuf>> {
        let stem = scan.target.file_stem();

        let json = render_json(scan)?;
        let markdown = render_markdown(scan);
        let html = render_html(scan);

        Ok(vec![
            self.write("json", format!("{}.json", stem), json).await?,
            self.write("markdown", format!("{}.md", stem), markdown).await?,
            self.write("html", format!("{}.html", stem), html).await?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfiguration;
    use crate::model::{FindingDraft, ScanId, Severity, Target};

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("sarif".parse::<OutputFormat>().is_err());
    }

    #[tokio::test]
    async fn test_file_renderer_writes_three_formats() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FileReportRenderer::new(dir.path());
        let target = Target::new("https://example.com/").unwrap();
        let mut scan = Scan::new(ScanId(1), target.clone(), "web", ScanConfiguration::default());
        scan.record(FindingDraft::new("Open Port", "Port 443 is open.", Severity::Low));
        scan.complete(target);

        let paths = renderer.render(&scan).await.unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("json").join("https_example.com.json"),
                dir.path().join("markdown").join("https_example.com.md"),
                dir.path().join("html").join("https_example.com.html"),
            ]
        );
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["vulnerabilities"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_http_and_https_targets_get_separate_reports() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FileReportRenderer::new(dir.path());
        let plain = Target::new("http://example.com").unwrap();
        let tls = Target::new("https://example.com").unwrap();
        let plain_scan = Scan::new(ScanId(1), plain, "web", ScanConfiguration::default());
        let tls_scan = Scan::new(ScanId(2), tls, "web", ScanConfiguration::default());

        let plain_paths = renderer.render(&plain_scan).await.unwrap();
        let tls_paths = renderer.render(&tls_scan).await.unwrap();

        assert!(plain_paths.iter().all(|p| !tls_paths.contains(p)));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&plain_paths[0]).unwrap()).unwrap();
        assert_eq!(json["target"]["raw"], "http://example.com");
    }

    #[tokio::test]
    async fn test_file_renderer_reports_unwritable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let renderer = FileReportRenderer::new(&blocker);
        let target = Target::new("example.com").unwrap();
        let scan = Scan::new(ScanId(1), target, "web", ScanConfiguration::default());

        let err = renderer.render(&scan).await.unwrap_err();

        assert!(matches!(err, Error::Report(_)));
    }
}
