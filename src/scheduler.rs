//! Target-level orchestration.
//!
//! The [`Scheduler`] queues one job per target and drains the queue with a
//! fixed number of workers, each running one pipeline at a time on its own
//! tokio task. A target whose pipeline fails or whose worker panics ends up
//! as a `Failed` scan in the report; its siblings are unaffected. Every terminal scan is then rendered and
//! delivered on its own, and a delivery problem is attached to that target
//! rather than changing the scan's outcome.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::ScanConfiguration;
use crate::error::FailureKind;
use crate::logging::LoggingHandle;
use crate::model::{Scan, ScanFailure, Severity, Target};
use crate::module::AssessmentModule;
use crate::notify::Notifier;
use crate::output::ReportRenderer;
use crate::pipeline::{panic_message, ScanPipeline};

/// Called with every scan as soon as it terminates.
pub type ScanObserver = Arc<dyn Fn(&Scan) + Send + Sync>;

/// One target and the modules to run against it, in order.
#[derive(Clone)]
pub struct ScanJob {
    pub target: Target,
    pub scan_type: String,
    pub modules: Vec<Arc<dyn AssessmentModule>>,
}

impl ScanJob {
    pub fn new(target: Target, scan_type: impl Into<String>, modules: Vec<Arc<dyn AssessmentModule>>) -> Self {
        Self {
            target,
            scan_type: scan_type.into(),
            modules,
        }
    }
}

/// Outcome for one target.
#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub scan: Scan,
    /// Report files written for this scan.
    pub artifacts: Vec<PathBuf>,
    /// Rendering or notification failures. They never change the scan.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delivery_errors: Vec<String>,
}

/// Outcome of a [`Scheduler::run`], keyed by the target's raw identifier.
#[derive(Debug, Default, Serialize)]
pub struct ScheduleReport {
    pub targets: BTreeMap<String, TargetReport>,
}

impl ScheduleReport {
    pub fn scan(&self, target: &str) -> Option<&Scan> {
        self.targets.get(target).map(|t| &t.scan)
    }

    pub fn completed(&self) -> usize {
        self.targets.values().filter(|t| t.scan.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.targets.values().filter(|t| t.scan.is_failed()).count()
    }

    pub fn all_completed(&self) -> bool {
        self.failed() == 0
    }

    /// Highest severity recorded across every scan.
    pub fn highest_severity(&self) -> Option<Severity> {
        self.targets
            .values()
            .flat_map(|t| t.scan.vulnerabilities())
            .map(|v| v.severity)
            .max()
    }
}

pub struct Scheduler {
    pipeline: Arc<ScanPipeline>,
    config: ScanConfiguration,
    max_concurrent_targets: usize,
    delivery: Delivery,
    cancel: CancellationToken,
    span: Span,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<ScanPipeline>,
        config: ScanConfiguration,
        max_concurrent_targets: usize,
        logging: &LoggingHandle,
    ) -> Self {
        Self {
            pipeline,
            config,
            max_concurrent_targets: max_concurrent_targets.max(1),
            delivery: Delivery::default(),
            cancel: CancellationToken::new(),
            span: logging.span(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.delivery.renderer = Some(renderer);
        self
    }

    /// Sends each target's artifacts to `recipient`. Without a renderer
    /// there is nothing to send and the notifier is not called.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, recipient: impl Into<String>) -> Self {
        self.delivery.notifier = Some((notifier, recipient.into()));
        self
    }

    /// Cancelling `cancel` stops every pipeline at its next checkpoint.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: ScanObserver) -> Self {
        self.delivery.observer = Some(observer);
        self
    }

    pub fn max_concurrent_targets(&self) -> usize {
        self.max_concurrent_targets
    }

    /// Runs every job and waits for all of them. Jobs naming a target that
    /// was already scheduled are dropped.
    ///
    /// Jobs are queued in order and picked up by at most
    /// `max_concurrent_targets` workers; a worker takes the next job only
    /// after its previous target was scanned and delivered.
    pub async fn run(&self, jobs: Vec<ScanJob>) -> ScheduleReport {
        let mut seen = HashSet::new();
        let queue: Vec<ScanJob> = jobs
            .into_iter()
            .filter(|job| {
                let first = seen.insert(job.target.raw.clone());
                if !first {
                    warn!(parent: &self.span, target = %job.target.raw, "duplicate target, skipping");
                }
                first
            })
            .collect();

        info!(parent: &self.span, targets = queue.len(), workers = self.max_concurrent_targets, "scheduling targets");

        let entries: Vec<(String, TargetReport)> = stream::iter(queue)
            .map(|job| self.run_worker(job))
            .buffer_unordered(self.max_concurrent_targets)
            .collect()
            .await;

        let report = ScheduleReport {
            targets: entries.into_iter().collect(),
        };

        info!(
            parent: &self.span,
            completed = report.completed(),
            failed = report.failed(),
            "all targets finished"
        );
        report
    }

    /// Runs one target on its own task so that a panic outside the modules
    /// still yields a terminal scan for it.
    async fn run_worker(&self, job: ScanJob) -> (String, TargetReport) {
        let target = job.target.clone();
        let scan_type = job.scan_type.clone();
        let span = info_span!(parent: &self.span, "target", target = %target.raw);

        let handle = tokio::spawn(
            run_target(
                job,
                Arc::clone(&self.pipeline),
                self.config.clone(),
                self.cancel.child_token(),
                self.delivery.clone(),
            )
            .instrument(span),
        );

        let key = target.raw.clone();
        let entry = match handle.await {
            Ok(entry) => entry,
            Err(e) => {
                error!(parent: &self.span, target = %key, error = %e, "pipeline worker died");
                let scan = Scan::aborted(
                    self.pipeline.next_scan_id(),
                    target,
                    scan_type,
                    self.config.clone(),
                    worker_failure(e),
                );
                TargetReport {
                    scan,
                    artifacts: Vec::new(),
                    delivery_errors: Vec::new(),
                }
            }
        };
        (key, entry)
    }
}

async fn run_target(
    job: ScanJob,
    pipeline: Arc<ScanPipeline>,
    config: ScanConfiguration,
    cancel: CancellationToken,
    delivery: Delivery,
) -> TargetReport {
    debug!("worker picked up target");

    let scan = pipeline
        .execute_with_cancel(job.target, &job.scan_type, &job.modules, &config, cancel)
        .await;

    if let Some(failure) = &scan.failure {
        warn!(%failure, "target failed");
    }

    delivery.deliver(scan).await
}

fn worker_failure(e: JoinError) -> ScanFailure {
    if e.is_cancelled() {
        return ScanFailure {
            module: None,
            kind: FailureKind::Cancelled,
            message: "pipeline worker was cancelled".to_string(),
        };
    }

    let detail = e
        .try_into_panic()
        .map(|payload| panic_message(payload.as_ref()))
        .unwrap_or_else(|_| "unknown panic".to_string());

    ScanFailure {
        module: None,
        kind: FailureKind::ModuleFailure,
        message: format!("pipeline worker panicked: {}", detail),
    }
}

/// Reporting collaborators shared by every target task.
#[derive(Clone, Default)]
struct Delivery {
    renderer: Option<Arc<dyn ReportRenderer>>,
    notifier: Option<(Arc<dyn Notifier>, String)>,
    observer: Option<ScanObserver>,
}

impl Delivery {
    async fn deliver(&self, scan: Scan) -> TargetReport {
        if let Some(observer) = &self.observer {
            observer(&scan);
        }

        let mut entry = TargetReport {
            scan,
            artifacts: Vec::new(),
            delivery_errors: Vec::new(),
        };

        let Some(renderer) = &self.renderer else {
            return entry;
        };

        match renderer.render(&entry.scan).await {
            Ok(paths) => entry.artifacts = paths,
            Err(e) => {
                error!(target = %entry.scan.target.raw, error = %e, "report rendering failed");
                entry.delivery_errors.push(e.to_string());
                return entry;
            }
        }

        if let Some((notifier, recipient)) = &self.notifier {
            if let Err(e) = notifier.send(&entry.artifacts, recipient).await {
                error!(target = %entry.scan.target.raw, error = %e, "report delivery failed");
                entry.delivery_errors.push(e.to_string());
            }
        }

        entry
    }
}
