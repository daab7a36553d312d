//! HTML report output format.
//!
//! Generates a self-contained HTML page for one scan.

use crate::model::{Scan, Severity, Vulnerability};

pub fn render_html(scan: &Scan) -> String {
    let vulns = sorted_by_severity(scan.vulnerabilities());
    let payloads = scan.payloads();
    let count = |severity: Severity| vulns.iter().filter(|v| v.severity == severity).count();

    let mut html = String::new();

    html.push_str(&format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>pentrail Report - {}</title>
    <style>
        :root {{
            --bg-color: #1a1a2e;
            --card-bg: #16213e;
            --text-color: #eee;
            --text-muted: #888;
            --border-color: #0f3460;
            --critical: #dc3545;
            --high: #fd7e14;
            --medium: #ffc107;
            --low: #28a745;
        }}
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-color);
            color: var(--text-color);
            line-height: 1.6;
            padding: 2rem;
        }}
        .container {{ max-width: 1200px; margin: 0 auto; }}
        header {{ margin-bottom: 2rem; padding-bottom: 1rem; border-bottom: 1px solid var(--border-color); }}
        h1 {{ font-size: 1.75rem; font-weight: 600; }}
        .meta {{ color: var(--text-muted); font-size: 0.9rem; }}
        .stats {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); gap: 1rem; margin-bottom: 2rem; }}
        .stat-card {{ background: var(--card-bg); padding: 1.25rem; border-radius: 8px; border: 1px solid var(--border-color); }}
        .stat-value {{ font-size: 2rem; font-weight: 700; }}
        .stat-label {{ color: var(--text-muted); font-size: 0.85rem; }}
        .status-completed {{ color: var(--low); }}
        .status-failed {{ color: var(--critical); }}
        section {{ margin-bottom: 2rem; }}
        h2 {{ font-size: 1.25rem; margin-bottom: 1rem; padding-bottom: 0.5rem; border-bottom: 1px solid var(--border-color); }}
        table {{ width: 100%; border-collapse: collapse; background: var(--card-bg); }}
        th, td {{ padding: 0.75rem 1rem; text-align: left; border-bottom: 1px solid var(--border-color); vertical-align: top; }}
        th {{ background: var(--border-color); font-weight: 600; }}
        code {{ word-break: break-all; }}
        .severity {{ padding: 0.25rem 0.5rem; border-radius: 4px; font-size: 0.75rem; font-weight: 600; }}
        .severity-critical {{ background: var(--critical); color: white; }}
        .severity-high {{ background: var(--high); color: white; }}
        .severity-medium {{ background: var(--medium); color: black; }}
        .severity-low {{ background: var(--low); color: white; }}
        .empty {{ text-align: center; padding: 2rem; color: var(--text-muted); }}
        footer {{ text-align: center; color: var(--text-muted); font-size: 0.8rem; margin-top: 2rem; padding-top: 1rem; border-top: 1px solid var(--border-color); }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>Scan report for {}</h1>
            <div class="meta">{} &middot; {} scan &middot; started {}{}</div>
        </header>
"#,
        html_escape(&scan.target.raw),
        html_escape(&scan.target.raw),
        scan.id,
        html_escape(&scan.scan_type),
        scan.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        scan.ended_at
            .map(|end| format!(", ended {}", end.format("%Y-%m-%d %H:%M:%S UTC")))
            .unwrap_or_default(),
    ));

    let status_class = if scan.is_failed() {
        "status-failed"
    } else {
        "status-completed"
    };

    html.push_str(&format!(
        r#"        <div class="stats">
            <div class="stat-card">
                <div class="stat-value {}">{}</div>
                <div class="stat-label">Status</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Findings</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Open Ports</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Critical / High</div>
            </div>
        </div>
"#,
        status_class,
        scan.status,
        vulns.len(),
        scan.target.ports.len(),
        count(Severity::Critical) + count(Severity::High),
    ));

    if let Some(failure) = &scan.failure {
        html.push_str(&format!(
            r#"        <section>
            <h2>Failure</h2>
            <div class="stat-card"><p class="status-failed">{}</p></div>
        </section>
"#,
            html_escape(&failure.to_string())
        ));
    }

    html.push_str(&format!(
        r#"        <section>
            <h2>Target</h2>
            <table>
                <tbody>
                    <tr><th>Host</th><td>{}</td></tr>
                    <tr><th>IP address</th><td>{}</td></tr>
                    <tr><th>Open ports</th><td>{}</td></tr>
                    <tr><th>Services</th><td>{}</td></tr>
                    <tr><th>Links</th><td>{}</td></tr>
                </tbody>
            </table>
        </section>
"#,
        html_escape(&scan.target.host),
        scan.target
            .ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string()),
        join_or_dash(scan.target.ports.iter().map(u16::to_string)),
        html_escape(&join_or_dash(scan.target.protocols.iter().cloned())),
        scan.target.links.len(),
    ));

    html.push_str(
        r#"        <section>
            <h2>Findings</h2>
"#,
    );

    if vulns.is_empty() {
        html.push_str(
            r#"            <div class="empty">No findings recorded</div>
"#,
        );
    } else {
        html.push_str(
            r#"            <table>
                <thead>
                    <tr>
                        <th>#</th>
                        <th>Severity</th>
                        <th>Name</th>
                        <th>Component</th>
                        <th>Description</th>
                        <th>Evidence</th>
                        <th>Remediation</th>
                    </tr>
                </thead>
                <tbody>
"#,
        );

        for vuln in &vulns {
            html.push_str(&format!(
                r#"                    <tr>
                        <td>{}</td>
                        <td><span class="severity severity-{}">{}</span></td>
                        <td>{}</td>
                        <td>{}</td>
                        <td>{}</td>
                        <td><code>{}</code></td>
                        <td>{}</td>
                    </tr>
"#,
                vuln.id,
                vuln.severity.as_str(),
                vuln.severity.as_str().to_uppercase(),
                html_escape(&vuln.name),
                html_escape(&vuln.affected_component),
                html_escape(&vuln.description),
                html_escape(&vuln.evidence),
                vuln.remediation
                    .as_deref()
                    .map(html_escape)
                    .unwrap_or_else(|| "-".to_string()),
            ));
        }

        html.push_str(
            r#"                </tbody>
            </table>
"#,
        );
    }

    html.push_str("        </section>\n");

    if !payloads.is_empty() {
        html.push_str(
            r#"        <section>
            <h2>Payloads Used</h2>
            <table>
                <thead>
                    <tr><th>#</th><th>Content</th><th>Encoding</th><th>Description</th></tr>
                </thead>
                <tbody>
"#,
        );
        for payload in &payloads {
            html.push_str(&format!(
                "                    <tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td></tr>\n",
                payload.id,
                html_escape(&payload.content),
                html_escape(payload.encoding.as_deref().unwrap_or("-")),
                html_escape(payload.description.as_deref().unwrap_or("-")),
            ));
        }
        html.push_str(
            r#"                </tbody>
            </table>
        </section>
"#,
        );
    }

    html.push_str(
        r#"        <footer>
            Generated by pentrail
        </footer>
    </div>
</body>
</html>
"#,
    );

    html
}

/// Highest severity first; ledger order within a severity.
pub(crate) fn sorted_by_severity(mut vulns: Vec<Vulnerability>) -> Vec<Vulnerability> {
    vulns.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.id.cmp(&b.id)));
    vulns
}

fn join_or_dash(items: impl Iterator<Item = String>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfiguration;
    use crate::model::{FindingDraft, PayloadDraft, ScanId, Target};

    #[test]
    fn test_escapes_and_orders_findings() {
        let target = Target::new("example.com").unwrap();
        let mut scan = Scan::new(ScanId(3), target.clone(), "web", ScanConfiguration::default());
        scan.record(FindingDraft::new("Open Port", "Port 80 is open.", Severity::Low));
        scan.record(
            FindingDraft::new("Reflected XSS", "<script> echoed back", Severity::High)
                .with_evidence("q=<script>alert(1)</script>"),
        );
        scan.record_payload(PayloadDraft::new("<svg onload=alert(1)>"));
        scan.complete(target);

        let html = render_html(&scan);

        assert!(html.contains("&lt;script&gt; echoed back"));
        assert!(!html.contains("<script>alert"));
        assert!(html.find("<td>Reflected XSS</td>").unwrap() < html.find("<td>Open Port</td>").unwrap());
        assert!(html.contains("Payloads Used"));
        assert!(html.contains("scan-3"));
    }

    #[test]
    fn test_empty_scan() {
        let target = Target::new("example.com").unwrap();
        let scan = Scan::new(ScanId(1), target, "network", ScanConfiguration::default());

        let html = render_html(&scan);

        assert!(html.contains("No findings recorded"));
        assert!(!html.contains("Payloads Used"));
    }
}
