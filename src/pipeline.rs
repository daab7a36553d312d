//! Per-target module sequencing.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::ScanConfiguration;
use crate::error::{Error, FailureKind};
use crate::logging::LoggingHandle;
use crate::model::{Scan, ScanFailure, ScanId, Target};
use crate::module::AssessmentModule;

/// Runs an ordered list of modules against one target and produces a
/// terminated [`Scan`].
///
/// The pipeline never returns an error: every outcome, including
/// cancellation, is expressed as the scan's status and failure.
pub struct ScanPipeline {
    next_id: AtomicU64,
    span: Span,
}

impl ScanPipeline {
    pub fn new(logging: &LoggingHandle) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            span: logging.span(),
        }
    }

    /// Hands out a scan id that no other scan of this pipeline uses.
    pub fn next_scan_id(&self) -> ScanId {
        ScanId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn execute(
        &self,
        target: Target,
        scan_type: &str,
        modules: &[Arc<dyn AssessmentModule>],
        config: &ScanConfiguration,
    ) -> Scan {
        self.execute_with_cancel(target, scan_type, modules, config, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), checking `cancel` before each module.
    /// Modules that scan concurrently also observe it through the scan.
    pub async fn execute_with_cancel(
        &self,
        target: Target,
        scan_type: &str,
        modules: &[Arc<dyn AssessmentModule>],
        config: &ScanConfiguration,
        cancel: CancellationToken,
    ) -> Scan {
        let id = self.next_scan_id();
        let span = info_span!(parent: &self.span, "scan", %id, target = %target.raw);

        run_modules(id, target, scan_type, modules, config, cancel)
            .instrument(span)
            .await
    }
}

async fn run_modules(
    id: ScanId,
    mut target: Target,
    scan_type: &str,
    modules: &[Arc<dyn AssessmentModule>],
    config: &ScanConfiguration,
    cancel: CancellationToken,
) -> Scan {
    let mut scan = Scan::new(id, target.clone(), scan_type, config.clone()).with_cancellation(cancel);
    scan.start();
    info!(scan_type, modules = modules.len(), "scan started");

    for module in modules {
        if !module.is_enabled() {
            debug!(module = module.name(), "module disabled, skipping");
            continue;
        }

        if scan.cancellation().is_cancelled() {
            warn!(next = module.name(), "scan cancelled");
            scan.fail(target, ScanFailure::from_error(None, &Error::Cancelled));
            return scan;
        }

        debug!(module = module.name(), "running module");
        let outcome = AssertUnwindSafe(module.run(&mut target, &mut scan))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(module = module.name(), kind = %e.kind(), error = %e, "module failed");
                scan.fail(target, ScanFailure::from_error(Some(module.name()), &e));
                return scan;
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(module = module.name(), panic = %detail, "module panicked");
                scan.fail(
                    target,
                    ScanFailure {
                        module: Some(module.name().to_string()),
                        kind: FailureKind::ModuleFailure,
                        message: format!("module panicked: {}", detail),
                    },
                );
                return scan;
            }
        }
    }

    scan.complete(target);
    info!(findings = scan.ledger().len(), "scan completed");
    scan
}

/// Text of a panic payload, if it carried any.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
