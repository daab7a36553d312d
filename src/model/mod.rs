//! Core data types for targets, scans and findings.
//!
//! - [`Target`] - A host or URL under assessment and what was discovered about it
//! - [`Scan`] - One typed assessment run against a target
//! - [`FindingLedger`] - The synchronized store of a scan's findings and payloads
//! - [`Vulnerability`] / [`Payload`] - Records held by the ledger
//!
//! # Example
//!
//! ```
//! use pentrail::{FindingDraft, Scan, ScanConfiguration, ScanId, Severity, Target};
//!
//! let target = Target::new("https://example.com").unwrap();
//! let scan = Scan::new(ScanId(1), target, "web", ScanConfiguration::default());
//!
//! let id = scan.record(FindingDraft::new("Open Port", "Port 443 is open.", Severity::Low));
//! assert_eq!(id, 1);
//! ```

mod finding;
mod ledger;
mod scan;
mod target;

pub use finding::*;
pub use ledger::FindingLedger;
pub use scan::*;
pub use target::Target;
