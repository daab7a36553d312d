use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use super::{AssessmentModule, ModuleDescriptor};
use crate::error::Result;
use crate::model::{FindingDraft, Scan, Severity, Target};
use crate::tool::ToolInvoker;
use tracing::debug;

/// Runs an external scanner and records where its output landed.
///
/// Tool output goes to `<output_root>/<tool>/<target>/`. Invoker errors are
/// returned unchanged and fail the scan. Output that is a list of
/// ZAP-style alerts also becomes one finding per alert.
pub struct ExternalToolModule {
    descriptor: ModuleDescriptor,
    invoker: Arc<dyn ToolInvoker>,
    output_root: PathBuf,
}

impl ExternalToolModule {
    pub fn new(invoker: Arc<dyn ToolInvoker>, output_root: PathBuf) -> Self {
        let name = invoker.name().to_string();
        Self {
            descriptor: ModuleDescriptor::new(
                name.clone(),
                format!("Runs {} against the target and keeps its output.", name),
            ),
            invoker,
            output_root,
        }
    }
}

#[async_trait]
impl AssessmentModule for ExternalToolModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()> {
        let tool = self.invoker.name();
        let output_dir = self.output_root.join(tool).join(target.file_stem());

        let output = self.invoker.invoke(target, &output_dir).await?;

        scan.record(
            FindingDraft::new(
                format!("{} scan", tool),
                format!("{} results for {}", tool, target.host),
                Severity::Low,
            )
            .with_component(target.host.clone())
            .with_evidence(output.output_path.display().to_string()),
        );

        let alerts = alert_findings(&output.data);
        if !alerts.is_empty() {
            debug!(tool, alerts = alerts.len(), "recording tool alerts");
        }
        for draft in alerts {
            scan.record(draft);
        }
        Ok(())
    }
}

/// Findings for output shaped like OWASP ZAP's alert export: an array of
/// objects carrying at least `alert` and `risk`. Anything else yields none.
fn alert_findings(data: &Value) -> Vec<FindingDraft> {
    let Some(alerts) = data.as_array() else {
        return Vec::new();
    };

    alerts
        .iter()
        .filter_map(|alert| {
            let name = alert.get("alert")?.as_str()?;
            let severity = match alert.get("risk")?.as_str()?.to_ascii_lowercase().as_str() {
                "high" => Severity::High,
                "medium" => Severity::Medium,
                _ => Severity::Low,
            };
            let text = |key: &str| alert.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

            let mut draft = FindingDraft::new(name, text("description"), severity)
                .with_component(text("url"))
                .with_evidence(text("evidence"));
            let solution = text("solution");
            if !solution.is_empty() {
                draft = draft.with_remediation(solution);
            }
            Some(draft)
        })
        .collect()
}
