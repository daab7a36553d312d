use async_trait::async_trait;
use tracing::debug;

use super::{AssessmentModule, ModuleDescriptor};
use crate::error::Result;
use crate::model::{FindingDraft, PayloadDraft, Scan, Severity, Target};

/// A pluggable check run by [`VulnerabilityProbe`].
///
/// Detectors look only at what earlier modules discovered; finding nothing
/// is a normal outcome, not an error.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Probe values this detector relies on, recorded in the scan's ledger.
    fn payloads(&self) -> Vec<PayloadDraft> {
        Vec::new()
    }

    fn inspect(&self, target: &Target) -> Vec<FindingDraft>;
}

/// Flags services that carry credentials in cleartext.
pub struct CleartextServiceDetector;

const CLEARTEXT_PORTS: &[(u16, &str, &str)] = &[
    (21, "FTP", "Replace FTP with SFTP or FTPS."),
    (23, "Telnet", "Disable Telnet and use SSH."),
    (110, "POP3", "Require POP3S (port 995)."),
    (143, "IMAP", "Require IMAPS (port 993)."),
];

impl Detector for CleartextServiceDetector {
    fn name(&self) -> &str {
        "cleartext-services"
    }

    fn inspect(&self, target: &Target) -> Vec<FindingDraft> {
        CLEARTEXT_PORTS
            .iter()
            .filter(|(port, _, _)| target.ports.contains(port))
            .map(|(port, service, remediation)| {
                FindingDraft::new(
                    format!("Cleartext {} Service", service),
                    format!("{} on port {} transmits credentials without encryption.", service, port),
                    Severity::Medium,
                )
                .with_component(format!("Port {}", port))
                .with_evidence(format!("Port {} is open on {}.", port, target.host))
                .with_remediation(*remediation)
            })
            .collect()
    }
}

/// Runs a set of detectors against the target.
pub struct VulnerabilityProbe {
    descriptor: ModuleDescriptor,
    detectors: Vec<Box<dyn Detector>>,
}

impl VulnerabilityProbe {
    pub fn new(name: impl Into<String>, detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            descriptor: ModuleDescriptor::new(name, "Scans the target for vulnerabilities."),
            detectors,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }
}

impl Default for VulnerabilityProbe {
    fn default() -> Self {
        Self::new("Vulnerability Scanner", vec![Box::new(CleartextServiceDetector)])
    }
}

#[async_trait]
impl AssessmentModule for VulnerabilityProbe {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()> {
        for detector in &self.detectors {
            for payload in detector.payloads() {
                scan.record_payload(payload);
            }
            let findings = detector.inspect(target);
            debug!(detector = detector.name(), findings = findings.len(), "detector finished");
            for finding in findings {
                scan.record(finding);
            }
        }
        Ok(())
    }
}
