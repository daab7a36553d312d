//! Assessment modules.
//!
//! This module provides the [`AssessmentModule`] trait and the built-in
//! implementations a scan pipeline can run.
//!
//! # Available Modules
//!
//! | Kind | Module | Needs before it |
//! |------|--------|-----------------|
//! | `port-scan` | [`PortScanModule`] | - |
//! | `service-scan` | [`ServiceIdentification`] | `port-scan` |
//! | `vulnerability-probe` | [`VulnerabilityProbe`] | `port-scan` |
//! | `link-discovery` | [`LinkDiscovery`] | - |
//! | `crawler` | [`LinkCrawler`] | `link-discovery` |
//! | `nmap` | [`ExternalToolModule`] | - |
//! | `nikto` | [`ExternalToolModule`] | - |
//! | `zap` | [`ExternalToolModule`] | - |
//!
//! Ordering is the pipeline's responsibility. A module whose inputs were
//! never populated still succeeds and records an empty result.
//!
//! # Example
//!
//! ```
//! use pentrail::module::{build_modules, ModuleContext, ModuleKind};
//!
//! let context = ModuleContext::default();
//! let modules = build_modules(&[ModuleKind::PortScan, ModuleKind::ServiceScan], &context);
//! assert_eq!(modules[0].name(), "Port Scan");
//! ```

mod crawler;
mod external;
mod links;
mod port_scan;
mod probe;
mod service;

pub use crawler::LinkCrawler;
pub use external::ExternalToolModule;
pub use links::{extract_links, LinkDiscovery};
pub use port_scan::PortScanModule;
pub use probe::{CleartextServiceDetector, Detector, VulnerabilityProbe};
pub use service::{service_name, ServiceIdentification};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Scan, Target};
use crate::portscan::{PortProbe, PortRange, TcpConnectProbe};
use crate::resolve::{HostResolver, SystemResolver};
use crate::tool::CommandTool;

/// Name, description and enabled flag of a module. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A unit of assessment work run against one target inside one scan.
///
/// Modules may update the target's discovery fields and record findings in
/// the scan's ledger. They must not keep references past `run`, and they do
/// not retry: any error fails the whole scan.
#[async_trait]
pub trait AssessmentModule: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn description(&self) -> &str {
        &self.descriptor().description
    }

    fn is_enabled(&self) -> bool {
        self.descriptor().enabled
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    PortScan,
    ServiceScan,
    VulnerabilityProbe,
    LinkDiscovery,
    Crawler,
    Nmap,
    Nikto,
    Zap,
}

impl ModuleKind {
    pub fn all() -> &'static [ModuleKind] {
        &[
            ModuleKind::PortScan,
            ModuleKind::ServiceScan,
            ModuleKind::VulnerabilityProbe,
            ModuleKind::LinkDiscovery,
            ModuleKind::Crawler,
            ModuleKind::Nmap,
            ModuleKind::Nikto,
            ModuleKind::Zap,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::PortScan => "port-scan",
            ModuleKind::ServiceScan => "service-scan",
            ModuleKind::VulnerabilityProbe => "vulnerability-probe",
            ModuleKind::LinkDiscovery => "link-discovery",
            ModuleKind::Crawler => "crawler",
            ModuleKind::Nmap => "nmap",
            ModuleKind::Nikto => "nikto",
            ModuleKind::Zap => "zap",
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "port-scan" | "ports" => Ok(ModuleKind::PortScan),
            "service-scan" | "services" => Ok(ModuleKind::ServiceScan),
            "vulnerability-probe" | "vuln" => Ok(ModuleKind::VulnerabilityProbe),
            "link-discovery" | "links" => Ok(ModuleKind::LinkDiscovery),
            "crawler" | "crawl" => Ok(ModuleKind::Crawler),
            "nmap" => Ok(ModuleKind::Nmap),
            "nikto" => Ok(ModuleKind::Nikto),
            "zap" | "owasp-zap" => Ok(ModuleKind::Zap),
            _ => Err(format!(
                "Unknown module: {}. Use: {}",
                s,
                ModuleKind::all()
                    .iter()
                    .map(ModuleKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// Shared collaborators the built-in modules are constructed with.
#[derive(Clone)]
pub struct ModuleContext {
    pub resolver: Arc<dyn HostResolver>,
    pub probe: Arc<dyn PortProbe>,
    pub port_range: PortRange,
    /// Root under which external tools write `<tool>/<host>/` output.
    pub report_dir: PathBuf,
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self {
            resolver: Arc::new(SystemResolver),
            probe: Arc::new(TcpConnectProbe),
            port_range: PortRange::default(),
            report_dir: PathBuf::from("reports"),
        }
    }
}

/// Returns the module for a specific kind.
pub fn build_module(kind: ModuleKind, context: &ModuleContext) -> Arc<dyn AssessmentModule> {
    match kind {
        ModuleKind::PortScan => Arc::new(PortScanModule::new(
            Arc::clone(&context.resolver),
            Arc::clone(&context.probe),
            context.port_range,
        )),
        ModuleKind::ServiceScan => Arc::new(ServiceIdentification::new()),
        ModuleKind::VulnerabilityProbe => Arc::new(VulnerabilityProbe::default()),
        ModuleKind::LinkDiscovery => Arc::new(LinkDiscovery::new()),
        ModuleKind::Crawler => Arc::new(LinkCrawler::new()),
        ModuleKind::Nmap => Arc::new(ExternalToolModule::new(
            Arc::new(CommandTool::nmap()),
            context.report_dir.clone(),
        )),
        ModuleKind::Nikto => Arc::new(ExternalToolModule::new(
            Arc::new(CommandTool::nikto()),
            context.report_dir.clone(),
        )),
        ModuleKind::Zap => Arc::new(ExternalToolModule::new(
            Arc::new(CommandTool::zap()),
            context.report_dir.clone(),
        )),
    }
}

/// Builds modules in the given order.
pub fn build_modules(kinds: &[ModuleKind], context: &ModuleContext) -> Vec<Arc<dyn AssessmentModule>> {
    kinds.iter().map(|kind| build_module(*kind, context)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_kind_parse() {
        assert_eq!("port-scan".parse::<ModuleKind>().unwrap(), ModuleKind::PortScan);
        assert_eq!("Port_Scan".parse::<ModuleKind>().unwrap(), ModuleKind::PortScan);
        assert_eq!("crawl".parse::<ModuleKind>().unwrap(), ModuleKind::Crawler);
        assert_eq!("OWASP_ZAP".parse::<ModuleKind>().unwrap(), ModuleKind::Zap);
        assert!("sqlmap".parse::<ModuleKind>().is_err());
    }

    #[test]
    fn test_module_kind_names_roundtrip() {
        for kind in ModuleKind::all() {
            assert_eq!(kind.as_str().parse::<ModuleKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_build_modules_keeps_order_and_names() {
        let context = ModuleContext::default();
        let modules = build_modules(ModuleKind::all(), &context);
        let names: Vec<&str> = modules.iter().map(|m| m.name()).collect();

        assert_eq!(
            names,
            vec![
                "Port Scan",
                "Service Scanner",
                "Vulnerability Scanner",
                "Link Discovery",
                "Web Crawler",
                "nmap",
                "nikto",
                "zap"
            ]
        );
        assert!(modules.iter().all(|m| m.is_enabled()));
        assert!(modules.iter().all(|m| !m.description().is_empty()));
    }

    #[test]
    fn test_descriptor_disable() {
        let descriptor = ModuleDescriptor::new("Noop", "does nothing").with_enabled(false);
        assert!(!descriptor.enabled);
    }
}
