use crate::error::Result;
use crate::model::Scan;
use crate::scheduler::ScheduleReport;

pub fn print_json(report: &ScheduleReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}

/// One scan, including its ledger, as pretty-printed JSON.
pub fn render_json(scan: &Scan) -> Result<String> {
    Ok(serde_json::to_string_pretty(scan)?)
}
