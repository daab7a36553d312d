//! External scanner invocation.
//!
//! A [`ToolInvoker`] runs a third-party scanner against a target and hands
//! back its output. pentrail keeps that output as-is: JSON is parsed so
//! callers can inspect it, anything else is passed through as text.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::Target;

/// What a tool produced for one target.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub output_path: PathBuf,
    /// Parsed JSON, or a JSON string holding the raw text for other formats.
    pub data: serde_json::Value,
}

#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Short tool name, also used as the report sub-directory.
    fn name(&self) -> &str;

    /// Runs the tool and collects its output.
    ///
    /// # Errors
    ///
    /// [`Error::ToolUnavailable`] if the binary cannot be found,
    /// [`Error::ToolExecutionFailed`] on a non-zero exit or process error and
    /// [`Error::ResultParse`] if the output is missing, or is not JSON for a
    /// tool that promises JSON.
    async fn invoke(&self, target: &Target, output_dir: &Path) -> Result<ToolOutput>;
}

/// How a [`CommandTool`] reports its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// The tool writes JSON; invalid JSON is a [`Error::ResultParse`].
    Json,
    /// XML, plain text or anything else; kept verbatim.
    Raw,
}

impl ResultFormat {
    fn extension(self) -> &'static str {
        match self {
            ResultFormat::Json => "json",
            ResultFormat::Raw => "txt",
        }
    }
}

/// Runs a binary with an argument template.
///
/// `{target}` in an argument is replaced with the target's host, `{url}`
/// with its URL and `{output}` with the file the tool is expected to write.
/// Setup steps run the same binary before the main invocation and must all
/// succeed. A tool that prints its results instead of writing a file is
/// built with [`capture_stdout`](Self::capture_stdout).
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    program: String,
    setup: Vec<Vec<String>>,
    args: Vec<String>,
    format: ResultFormat,
    extension: Option<String>,
    capture_stdout: bool,
}

impl CommandTool {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            setup: Vec::new(),
            args: to_strings(args),
            format: ResultFormat::Json,
            extension: None,
            capture_stdout: false,
        }
    }

    pub fn with_format(mut self, format: ResultFormat) -> Self {
        self.format = format;
        self
    }

    /// File extension of the output file. Defaults to one matching the format.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_setup_step(mut self, args: &[&str]) -> Self {
        self.setup.push(to_strings(args));
        self
    }

    /// Writes the main invocation's stdout to the output file.
    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    /// Service/version detection with XML output.
    pub fn nmap() -> Self {
        Self::new("nmap", "nmap", &["-sV", "-oX", "{output}", "{target}"])
            .with_format(ResultFormat::Raw)
            .with_extension("xml")
    }

    /// Web server scan with JSON output.
    pub fn nikto() -> Self {
        Self::new("nikto", "nikto", &["-h", "{target}", "-Format", "json", "-o", "{output}"])
    }

    /// Spider and active scan through a running OWASP ZAP daemon, then
    /// export its alerts as JSON.
    pub fn zap() -> Self {
        Self::new("zap", "zap-cli", &["alerts", "--output", "json"])
            .with_setup_step(&["start"])
            .with_setup_step(&["spider", "{url}"])
            .with_setup_step(&["active-scan", "{url}"])
            .capture_stdout()
    }

    fn render(&self, args: &[String], target: &Target, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        let url = target.url();
        args.iter()
            .map(|arg| {
                arg.replace("{target}", &target.host)
                    .replace("{url}", &url)
                    .replace("{output}", &output)
            })
            .collect()
    }

    async fn run_step(&self, args: Vec<String>, capture: bool) -> Result<Vec<u8>> {
        debug!(tool = %self.name, "running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(if capture { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolUnavailable {
                    tool: self.name.clone(),
                },
                _ => Error::ToolExecutionFailed {
                    tool: self.name.clone(),
                    detail: e.to_string(),
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ToolExecutionFailed {
                tool: self.name.clone(),
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(output.stdout)
    }
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl ToolInvoker for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, target: &Target, output_dir: &Path) -> Result<ToolOutput> {
        tokio::fs::create_dir_all(output_dir).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let extension = self
            .extension
            .as_deref()
            .unwrap_or_else(|| self.format.extension());
        let output_path = output_dir.join(format!(
            "{}_{}_{}.{}",
            target.file_stem(),
            self.name,
            timestamp,
            extension
        ));

        info!(tool = %self.name, target = %target.host, "starting external scan");

        for step in &self.setup {
            self.run_step(self.render(step, target, &output_path), false).await?;
        }
        let stdout = self
            .run_step(self.render(&self.args, target, &output_path), self.capture_stdout)
            .await?;
        if self.capture_stdout {
            tokio::fs::write(&output_path, &stdout).await?;
        }

        let raw = tokio::fs::read_to_string(&output_path)
            .await
            .map_err(|e| Error::ResultParse {
                tool: self.name.clone(),
                detail: format!("{}: {}", output_path.display(), e),
            })?;
        let data = match self.format {
            ResultFormat::Json => serde_json::from_str(&raw).map_err(|e| Error::ResultParse {
                tool: self.name.clone(),
                detail: e.to_string(),
            })?,
            ResultFormat::Raw => serde_json::Value::String(raw),
        };

        info!(tool = %self.name, target = %target.host, path = %output_path.display(), "external scan finished");

        Ok(ToolOutput { output_path, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("https://example.com").unwrap()
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let nikto = CommandTool::nikto();
        let args = nikto.render(&nikto.args, &target(), Path::new("/tmp/out.json"));
        assert_eq!(args, vec!["-h", "example.com", "-Format", "json", "-o", "/tmp/out.json"]);

        let zap = CommandTool::zap();
        let spider = zap.render(&zap.setup[1], &target(), Path::new("/tmp/out.json"));
        assert_eq!(spider, vec!["spider", "https://example.com"]);
    }

    #[test]
    fn test_nmap_writes_xml() {
        let nmap = CommandTool::nmap();
        let args = nmap.render(&nmap.args, &target(), Path::new("/tmp/out.xml"));
        assert_eq!(args, vec!["-sV", "-oX", "/tmp/out.xml", "example.com"]);
        assert_eq!(nmap.format, ResultFormat::Raw);
    }

    #[tokio::test]
    async fn test_raw_output_is_kept_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CommandTool::new("xmlish", "sh", &["-c", "echo '<nmaprun/>' > {output}"])
            .with_format(ResultFormat::Raw)
            .with_extension("xml");

        let result = tool.invoke(&target(), dir.path()).await.unwrap();

        assert_eq!(result.data.as_str().map(str::trim), Some("<nmaprun/>"));
        assert_eq!(result.output_path.extension().unwrap(), "xml");
    }

    #[tokio::test]
    async fn test_setup_steps_and_captured_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spidered");
        let marker_arg = format!("touch {}", marker.display());
        let tool = CommandTool::new("alerts", "sh", &["-c", r#"printf '[{"alert":"XSS","url":"%s"}]' {url}"#])
            .with_setup_step(&["-c", marker_arg.as_str()])
            .capture_stdout();

        let result = tool.invoke(&target(), &dir.path().join("alerts")).await.unwrap();

        assert!(marker.exists());
        assert_eq!(result.data[0]["alert"], "XSS");
        assert_eq!(result.data[0]["url"], "https://example.com");
    }

    #[tokio::test]
    async fn test_failed_setup_step_stops_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CommandTool::new("never", "sh", &["-c", "echo '{}' > {output}"])
            .with_setup_step(&["-c", "echo daemon down >&2; exit 1"]);

        let err = tool.invoke(&target(), dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::ToolExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_invoke_parses_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CommandTool::new(
            "fake",
            "sh",
            &["-c", r#"printf '{"host":"%s","ports":[80]}' {target} > {output}"#],
        );

        let result = tool.invoke(&target(), &dir.path().join("fake")).await.unwrap();

        assert_eq!(result.data["host"], "example.com");
        assert_eq!(result.data["ports"][0], 80);
        assert!(result.output_path.starts_with(dir.path().join("fake")));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CommandTool::new("ghost", "pentrail-no-such-binary", &["{target}"]);

        let err = tool.invoke(&target(), dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable { ref tool } if tool == "ghost"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CommandTool::new("fails", "sh", &["-c", "echo broken >&2; exit 3"]);

        let err = tool.invoke(&target(), dir.path()).await.unwrap_err();
        match err {
            Error::ToolExecutionFailed { tool, detail } => {
                assert_eq!(tool, "fails");
                assert!(detail.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_output_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = CommandTool::new("garbage", "sh", &["-c", "echo 'not json' > {output}"]);
        let silent = CommandTool::new("silent", "sh", &["-c", "true"]);

        assert!(matches!(
            garbage.invoke(&target(), dir.path()).await,
            Err(Error::ResultParse { .. })
        ));
        assert!(matches!(
            silent.invoke(&target(), dir.path()).await,
            Err(Error::ResultParse { .. })
        ));
    }
}
