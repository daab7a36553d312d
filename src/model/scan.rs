use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::finding::{FindingDraft, Payload, PayloadDraft, ScanId, Vulnerability};
use super::ledger::FindingLedger;
use super::target::Target;
use crate::config::ScanConfiguration;
use crate::error::{Error, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "Pending",
            ScanStatus::InProgress => "In Progress",
            ScanStatus::Completed => "Completed",
            ScanStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Why a scan ended `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    /// The module that was running, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    pub fn from_error(module: Option<&str>, error: &Error) -> Self {
        Self {
            module: module.map(str::to_string),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.module {
            Some(module) => write!(f, "[{}] {}: {}", self.kind, module, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// One typed assessment run against one target.
///
/// Findings live in a shared [`FindingLedger`] so that concurrent workers
/// spawned by a module can record into it; everything else is mutated only
/// by the pipeline that owns the scan.
#[derive(Debug)]
pub struct Scan {
    pub id: ScanId,
    /// Snapshot of the target, refreshed when the scan terminates.
    pub target: Target,
    pub scan_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    /// Captured when the scan was created; later config edits do not apply.
    pub configuration: ScanConfiguration,
    pub failure: Option<ScanFailure>,
    ledger: Arc<FindingLedger>,
    cancel: CancellationToken,
}

impl Scan {
    pub fn new(
        id: ScanId,
        target: Target,
        scan_type: impl Into<String>,
        configuration: ScanConfiguration,
    ) -> Self {
        Self {
            id,
            target,
            scan_type: scan_type.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: ScanStatus::Pending,
            configuration,
            failure: None,
            ledger: Arc::new(FindingLedger::new(id)),
            cancel: CancellationToken::new(),
        }
    }

    /// A scan that never got to run a module, e.g. because its worker died.
    pub fn aborted(
        id: ScanId,
        target: Target,
        scan_type: impl Into<String>,
        configuration: ScanConfiguration,
        failure: ScanFailure,
    ) -> Self {
        let mut scan = Self::new(id, target.clone(), scan_type, configuration);
        scan.fail(target, failure);
        scan
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn start(&mut self) {
        self.started_at = Utc::now();
        self.status = ScanStatus::InProgress;
    }

    pub fn complete(&mut self, target: Target) {
        self.target = target;
        self.ended_at = Some(Utc::now());
        self.status = ScanStatus::Completed;
    }

    /// Marks the scan failed. Findings recorded so far are kept.
    pub fn fail(&mut self, target: Target, failure: ScanFailure) {
        self.target = target;
        self.ended_at = Some(Utc::now());
        self.status = ScanStatus::Failed;
        self.failure = Some(failure);
    }

    pub fn ledger(&self) -> &Arc<FindingLedger> {
        &self.ledger
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn record(&self, draft: FindingDraft) -> u64 {
        self.ledger.record(draft)
    }

    pub fn record_payload(&self, draft: PayloadDraft) -> u64 {
        self.ledger.record_payload(draft)
    }

    pub fn vulnerabilities(&self) -> Vec<Vulnerability> {
        self.ledger.vulnerabilities()
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.ledger.payloads()
    }

    pub fn is_completed(&self) -> bool {
        self.status == ScanStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ScanStatus::Failed
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

impl Serialize for Scan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Scan", 10)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("target", &self.target)?;
        state.serialize_field("scan_type", &self.scan_type)?;
        state.serialize_field("started_at", &self.started_at)?;
        state.serialize_field("ended_at", &self.ended_at)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("configuration", &self.configuration)?;
        state.serialize_field("failure", &self.failure)?;
        state.serialize_field("vulnerabilities", &self.vulnerabilities())?;
        state.serialize_field("payloads_used", &self.payloads())?;
        state.end()
    }
}
