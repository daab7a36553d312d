//! Concurrency-safe accumulation of findings.
//!
//! Port-probe workers run on separate tokio tasks and all report into the
//! same scan. They never touch the scan's lists directly: every record goes
//! through [`FindingLedger`], which assigns ids under one lock so ids stay
//! unique and strictly increasing in append order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::finding::{FindingDraft, Payload, PayloadDraft, ScanId, Vulnerability};

#[derive(Debug)]
pub struct FindingLedger {
    scan_id: ScanId,
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    last_vulnerability_id: u64,
    last_payload_id: u64,
    vulnerabilities: Vec<Vulnerability>,
    payloads: Vec<Payload>,
}

impl FindingLedger {
    pub fn new(scan_id: ScanId) -> Self {
        Self {
            scan_id,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn scan_id(&self) -> ScanId {
        self.scan_id
    }

    /// Appends a finding and returns the id assigned to it. Ids start at 1.
    pub fn record(&self, draft: FindingDraft) -> u64 {
        let mut state = self.lock();
        state.last_vulnerability_id += 1;
        let id = state.last_vulnerability_id;
        state.vulnerabilities.push(Vulnerability {
            id,
            name: draft.name,
            description: draft.description,
            severity: draft.severity,
            affected_component: draft.affected_component,
            evidence: draft.evidence,
            remediation: draft.remediation,
            scan_id: self.scan_id,
        });
        id
    }

    pub fn record_payload(&self, draft: PayloadDraft) -> u64 {
        let mut state = self.lock();
        state.last_payload_id += 1;
        let id = state.last_payload_id;
        state.payloads.push(Payload {
            id,
            content: draft.content,
            encoding: draft.encoding,
            description: draft.description,
            scan_id: self.scan_id,
        });
        id
    }

    /// Snapshot of the findings in id order.
    pub fn vulnerabilities(&self) -> Vec<Vulnerability> {
        self.lock().vulnerabilities.clone()
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.lock().payloads.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().vulnerabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A worker that panicked mid-append cannot leave a half-written record:
    // ids and pushes happen together under the guard.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
