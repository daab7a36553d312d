use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

use super::html::sorted_by_severity;
use crate::model::{Scan, Severity};
use crate::scheduler::ScheduleReport;

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Open Ports")]
    ports: String,
    #[tabled(rename = "Findings")]
    findings: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn print_cli_table(report: &ScheduleReport) -> Result<()> {
    println!();

    if report.targets.is_empty() {
        println!("No targets scanned.");
        return Ok(());
    }

    let rows: Vec<TargetRow> = report
        .targets
        .values()
        .map(|t| target_row(&t.scan))
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let mut rows = Vec::new();
    for entry in report.targets.values() {
        for v in sorted_by_severity(entry.scan.vulnerabilities()) {
            if v.severity >= Severity::Medium {
                rows.push(FindingRow {
                    severity: format_severity(&v.severity),
                    target: truncate(&entry.scan.target.host, 30),
                    name: truncate(&v.name, 30),
                    component: truncate(&v.affected_component, 25),
                    description: truncate(&v.description, 50),
                });
            }
        }
    }
    if !rows.is_empty() {
        println!();
        println!("Findings of medium severity or higher:");
        println!();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    let delivery: Vec<String> = report
        .targets
        .iter()
        .flat_map(|(name, t)| t.delivery_errors.iter().map(move |e| format!("  {}: {}", name, e)))
        .collect();
    if !delivery.is_empty() {
        println!();
        println!("Report delivery problems:");
        for line in delivery {
            println!("{}", line);
        }
    }

    println!();
    print_summary(report);

    Ok(())
}

fn target_row(scan: &Scan) -> TargetRow {
    let ports: Vec<String> = scan.target.ports.iter().map(u16::to_string).collect();
    TargetRow {
        target: truncate(&scan.target.raw, 40),
        status: format_status(scan),
        ip: scan
            .target
            .ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string()),
        ports: if ports.is_empty() {
            "-".to_string()
        } else {
            truncate(&ports.join(","), 30)
        },
        findings: scan.ledger().len().to_string(),
        reason: scan
            .failure
            .as_ref()
            .map(|f| truncate(&f.to_string(), 50))
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn format_status(scan: &Scan) -> String {
    if scan.is_failed() {
        "\x1b[31mFAILED\x1b[0m".to_string()
    } else if scan.is_completed() {
        "\x1b[32mCOMPLETED\x1b[0m".to_string()
    } else {
        scan.status.display_name().to_uppercase()
    }
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn print_summary(report: &ScheduleReport) {
    let count = |severity: Severity| -> usize {
        report
            .targets
            .values()
            .map(|t| {
                t.scan
                    .vulnerabilities()
                    .iter()
                    .filter(|v| v.severity == severity)
                    .count()
            })
            .sum()
    };

    println!("Summary:");
    println!(
        "  Targets: {} ({} completed, {} failed)",
        report.targets.len(),
        report.completed(),
        report.failed()
    );
    println!(
        "  Findings: {} critical, {} high, {} medium, {} low",
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low)
    );

    let artifacts: usize = report.targets.values().map(|t| t.artifacts.len()).sum();
    if artifacts > 0 {
        println!("  Report files written: {}", artifacts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }
}
