//! pentrail coordinates vulnerability-assessment work against network
//! targets.
//!
//! A [`Scheduler`] runs one [`ScanPipeline`] per [`Target`] concurrently.
//! Each pipeline runs an ordered list of [`AssessmentModule`]s and produces
//! a terminated [`Scan`] whose findings were collected in a [`FindingLedger`].
//! Terminated scans are handed to a [`ReportRenderer`] and a [`Notifier`].

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod module;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod portscan;
pub mod resolve;
pub mod scheduler;
pub mod scope;
pub mod tool;

pub use config::{Config, ScanConfiguration};
pub use error::{Error, FailureKind, Result};
pub use logging::LoggingHandle;
pub use model::{
    FindingDraft, FindingLedger, Payload, PayloadDraft, Scan, ScanFailure, ScanId, ScanStatus, Severity,
    Target, Vulnerability,
};
pub use module::{AssessmentModule, ModuleKind};
pub use notify::{CommandNotifier, Notifier};
pub use output::{FileReportRenderer, ReportRenderer};
pub use pipeline::ScanPipeline;
pub use portscan::{PortProbe, PortRange, PortScanner, TcpConnectProbe};
pub use resolve::{HostResolver, StaticResolver, SystemResolver};
pub use scheduler::{ScanJob, ScheduleReport, Scheduler, TargetReport};
pub use scope::{HttpScopeProvider, ScopeProvider, StaticScope};
pub use tool::{CommandTool, ToolInvoker};
