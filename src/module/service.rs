use async_trait::async_trait;

use super::{AssessmentModule, ModuleDescriptor};
use crate::error::Result;
use crate::model::{FindingDraft, Scan, Severity, Target};

/// Service conventionally bound to a well-known TCP port.
pub fn service_name(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 | 587 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        443 => "https",
        445 => "smb",
        465 => "smtps",
        993 => "imaps",
        995 => "pop3s",
        1433 => "mssql",
        1521 => "oracle",
        2049 => "nfs",
        3306 => "mysql",
        3389 => "rdp",
        5432 => "postgresql",
        5900 => "vnc",
        6379 => "redis",
        8000 | 8008 | 8080 => "http-alt",
        8443 => "https-alt",
        9200 => "elasticsearch",
        11211 => "memcached",
        27017 => "mongodb",
        _ => return None,
    };
    Some(name)
}

/// Records which services earlier modules identified on the target.
pub struct ServiceIdentification {
    descriptor: ModuleDescriptor,
}

impl ServiceIdentification {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "Service Scanner",
                "Scans the target for running services.",
            ),
        }
    }
}

impl Default for ServiceIdentification {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssessmentModule for ServiceIdentification {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()> {
        let services: Vec<&str> = target.protocols.iter().map(String::as_str).collect();

        scan.record(
            FindingDraft::new(
                "Running Services",
                format!("Running services: {}", services.join(", ")),
                Severity::Low,
            )
            .with_component(target.host.clone())
            .with_evidence(format!("{} service(s) identified", services.len())),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfiguration;
    use crate::model::ScanId;

    #[test]
    fn test_service_table() {
        assert_eq!(service_name(22), Some("ssh"));
        assert_eq!(service_name(443), Some("https"));
        assert_eq!(service_name(8080), Some("http-alt"));
        assert_eq!(service_name(4444), None);
    }

    #[tokio::test]
    async fn test_lists_protocols() {
        let mut target = Target::new("example.com").unwrap();
        target.protocols.insert("https".to_string());
        target.protocols.insert("http".to_string());
        let mut scan = Scan::new(ScanId(1), target.clone(), "network", ScanConfiguration::default());

        ServiceIdentification::new().run(&mut target, &mut scan).await.unwrap();

        let vulns = scan.vulnerabilities();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].description, "Running services: http, https");
    }

    #[tokio::test]
    async fn test_without_discovery_records_empty_finding() {
        let mut target = Target::new("example.com").unwrap();
        let mut scan = Scan::new(ScanId(1), target.clone(), "network", ScanConfiguration::default());

        ServiceIdentification::new().run(&mut target, &mut scan).await.unwrap();

        let vulns = scan.vulnerabilities();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].description, "Running services: ");
        assert_eq!(vulns[0].evidence, "0 service(s) identified");
    }
}
