use haio_core::status::Severity;

use crate::output::{print_json, print_table};
use crate::source::Source;

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Process => "process",
        Severity::Success => "success",
        Severity::Error => "error",
    }
}

pub fn run(source: &Source, limit: usize, json: bool) -> anyhow::Result<()> {
    let logs = source.open_store()?.recent_logs(limit)?;

    if json {
        return print_json(&logs);
    }
    if logs.is_empty() {
        println!("No log entries.");
        return Ok(());
    }

    let rows = logs
        .into_iter()
        .map(|entry| {
            vec![
                entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                severity_label(entry.severity).to_string(),
                entry.message,
                entry.reference.unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["TIME", "SEVERITY", "MESSAGE", "REF"], rows);
    Ok(())
}
