use std::fmt::Write;

use super::html::sorted_by_severity;
use crate::model::Scan;

pub fn render_markdown(scan: &Scan) -> String {
    let mut md = String::new();
    let target = &scan.target;

    let _ = writeln!(md, "# Pentest Report for {}\n", target.raw);
    let _ = writeln!(md, "- Scan: {} ({})", scan.id, scan.scan_type);
    let _ = writeln!(md, "- Status: {}", scan.status);
    let _ = writeln!(md, "- Started: {}", scan.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(ended) = scan.ended_at {
        let _ = writeln!(md, "- Ended: {}", ended.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(failure) = &scan.failure {
        let _ = writeln!(md, "- Failure: {}", failure);
    }

    let _ = writeln!(md, "\n## Target\n");
    let _ = writeln!(md, "| Field | Value |\n|-------|-------|");
    let _ = writeln!(md, "| Host | {} |", cell(&target.host));
    let _ = writeln!(
        md,
        "| IP address | {} |",
        target.ip_address.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string())
    );
    let ports: Vec<String> = target.ports.iter().map(u16::to_string).collect();
    let _ = writeln!(md, "| Open ports | {} |", dash_if_empty(ports.join(", ")));
    let services: Vec<&str> = target.protocols.iter().map(String::as_str).collect();
    let _ = writeln!(md, "| Services | {} |", dash_if_empty(services.join(", ")));

    let vulns = sorted_by_severity(scan.vulnerabilities());
    let _ = writeln!(md, "\n## Findings ({})\n", vulns.len());
    if vulns.is_empty() {
        md.push_str("No findings recorded.\n");
    } else {
        md.push_str("| # | Severity | Name | Component | Description | Evidence |\n");
        md.push_str("|---|----------|------|-----------|-------------|----------|\n");
        for v in &vulns {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} |",
                v.id,
                v.severity,
                cell(&v.name),
                cell(&v.affected_component),
                cell(&v.description),
                cell(&v.evidence)
            );
        }

        let remediations: Vec<_> = vulns
            .iter()
            .filter_map(|v| v.remediation.as_ref().map(|r| (v, r)))
            .collect();
        if !remediations.is_empty() {
            md.push_str("\n### Remediation\n\n");
            for (v, remediation) in remediations {
                let _ = writeln!(md, "- **{}** (#{}): {}", v.name, v.id, remediation);
            }
        }
    }

    let payloads = scan.payloads();
    if !payloads.is_empty() {
        md.push_str("\n## Payloads Used\n\n");
        for p in &payloads {
            let encoding = p.encoding.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default();
            let _ = writeln!(md, "{}. `{}`{}", p.id, p.content.replace('`', "'"), encoding);
        }
    }

    if !target.links.is_empty() {
        md.push_str("\n## Links\n\n");
        for link in &target.links {
            let _ = writeln!(md, "- {}", link);
        }
    }

    md
}

fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn dash_if_empty(s: String) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s
    }
}
