//! Delivery of report artifacts.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends the given artifacts to `recipient`. Best-effort: the caller
    /// records a failure but never undoes the scan because of it.
    async fn send(&self, paths: &[PathBuf], recipient: &str) -> Result<()>;
}

pub const DEFAULT_SUBJECT: &str = "Automated Pentest Report";
const DEFAULT_BODY: &str = "Please find the attached pentest reports.";

/// Mails artifacts through a mutt-compatible command line:
/// `<program> -s <subject> -a <paths...> -- <recipient>`, body on stdin.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    subject: String,
    body: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
        }
    }

    pub fn mutt() -> Self {
        Self::new("mutt")
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn args(&self, paths: &[PathBuf], recipient: &str) -> Vec<String> {
        let mut args = vec!["-s".to_string(), self.subject.clone()];
        if !paths.is_empty() {
            args.push("-a".to_string());
            args.extend(paths.iter().map(|p| p.display().to_string()));
        }
        args.push("--".to_string());
        args.push(recipient.to_string());
        args
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn send(&self, paths: &[PathBuf], recipient: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args(paths, recipient))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::Notify(format!("{} is not installed or not found in PATH", self.program))
                }
                _ => Error::Notify(format!("failed to start {}: {}", self.program, e)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The mailer may exit without reading its body.
            if let Err(e) = stdin.write_all(self.body.as_bytes()).await {
                debug!(program = %self.program, error = %e, "could not write message body");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Notify(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Notify(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        info!(recipient, attachments = paths.len(), "report sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutt_command_line() {
        let notifier = CommandNotifier::mutt();
        let args = notifier.args(
            &[PathBuf::from("reports/json/a.json"), PathBuf::from("reports/html/a.html")],
            "sec@example.com",
        );
        assert_eq!(
            args,
            vec![
                "-s",
                "Automated Pentest Report",
                "-a",
                "reports/json/a.json",
                "reports/html/a.html",
                "--",
                "sec@example.com"
            ]
        );
    }

    #[test]
    fn test_no_attachments_omits_flag() {
        let args = CommandNotifier::mutt()
            .with_subject("Weekly")
            .args(&[], "sec@example.com");
        assert_eq!(args, vec!["-s", "Weekly", "--", "sec@example.com"]);
    }

    #[tokio::test]
    async fn test_successful_command() {
        let notifier = CommandNotifier::new("true");
        notifier
            .send(&[PathBuf::from("report.json")], "sec@example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_command_is_reported() {
        let err = CommandNotifier::new("false")
            .send(&[], "sec@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Notify(_)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = CommandNotifier::new("pentrail-no-such-mailer")
            .send(&[], "sec@example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
