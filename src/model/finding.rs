use serde::{Deserialize, Serialize};

/// Identifier of one scan run, used as the back-reference from findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub u64);

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scan-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A finding recorded in a scan's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub affected_component: String,
    pub evidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub scan_id: ScanId,
}

impl Vulnerability {
    /// Everything except the ledger-assigned id, for comparing two runs.
    pub fn content(&self) -> (&str, &str, Severity, &str, &str) {
        (
            &self.name,
            &self.description,
            self.severity,
            &self.affected_component,
            &self.evidence,
        )
    }
}

/// A probe value used by a module while assessing a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub id: u64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scan_id: ScanId,
}

/// A finding as produced by a module, before the ledger assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingDraft {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub affected_component: String,
    pub evidence: String,
    pub remediation: Option<String>,
}

impl FindingDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            severity,
            affected_component: String::new(),
            evidence: String::new(),
            remediation: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.affected_component = component.into();
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadDraft {
    pub content: String,
    pub encoding: Option<String>,
    pub description: Option<String>,
}

impl PayloadDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            encoding: None,
            description: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
