use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info};

use super::service::service_name;
use super::{AssessmentModule, ModuleDescriptor};
use crate::error::{Error, Result};
use crate::model::{FindingDraft, Scan, Severity, Target};
use crate::portscan::{PortProbe, PortRange, PortScanner};
use crate::resolve::HostResolver;

/// Resolves the target and discovers its open TCP ports.
///
/// Each open port is recorded by the scanner as it is found. When at least
/// one port is open, a summary finding listing them is added afterwards.
/// Open ports with a well-known service also populate `target.protocols`.
pub struct PortScanModule {
    descriptor: ModuleDescriptor,
    resolver: Arc<dyn HostResolver>,
    probe: Arc<dyn PortProbe>,
    range: PortRange,
}

impl PortScanModule {
    pub fn new(resolver: Arc<dyn HostResolver>, probe: Arc<dyn PortProbe>, range: PortRange) -> Self {
        Self {
            descriptor: ModuleDescriptor::new("Port Scan", "Scans the target for open ports."),
            resolver,
            probe,
            range,
        }
    }

    async fn resolve(&self, target: &mut Target, scan: &Scan) -> Result<IpAddr> {
        let resolution = timeout(scan.configuration.timeout(), self.resolver.resolve(&target.host))
            .await
            .map_err(|_| Error::Resolution {
                host: target.host.clone(),
                reason: "timed out".to_string(),
            })??;

        target.ip_address = Some(resolution.ip);
        target.hosts.insert(target.host.clone());
        target.hosts.extend(resolution.aliases);
        Ok(resolution.ip)
    }
}

#[async_trait]
impl AssessmentModule for PortScanModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()> {
        let ip = self.resolve(target, scan).await?;

        let scanner = PortScanner::new(Arc::clone(&self.probe), &scan.configuration);
        debug!(target = %target.host, %ip, range = %self.range, limit = scanner.max_in_flight(), "scanning ports");

        let open = scanner
            .scan(ip, self.range, scan.ledger(), scan.cancellation())
            .await?;

        for port in &open {
            target.ports.insert(*port);
            if let Some(service) = service_name(*port) {
                target.protocols.insert(service.to_string());
            }
        }

        info!(target = %target.host, %ip, open = open.len(), "port scan finished");

        if !target.ports.is_empty() {
            let listing = target
                .ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            scan.record(
                FindingDraft::new("Open Ports", format!("Open ports: {}", listing), Severity::Low)
                    .with_component(target.host.clone())
                    .with_evidence(format!(
                        "{} of {} ports on {} accepted a connection",
                        target.ports.len(),
                        self.range.len(),
                        ip
                    )),
            );
        }

        Ok(())
    }
}
