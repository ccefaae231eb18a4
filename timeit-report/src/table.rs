//! Plain two-column tables

use crate::summary::RunSummary;

/// Render the detailed report for one call.
///
/// Keys are left-aligned and padded to the widest key, two spaces before the
/// value. Durations are printed at full precision.
pub fn render_table(summary: &RunSummary) -> String {
    let stats = summary.statistics_or_default();
    let rows: Vec<(&str, String)> = vec![
        ("Function", summary.name.clone()),
        ("Args", summary.args.clone()),
        ("Runs", summary.runs.to_string()),
        ("Workers", summary.workers.to_string()),
        ("Average Time", format!("{}s", stats.mean)),
        ("Median Time", format!("{}s", stats.median)),
        ("Min Time", format!("{}s", stats.min)),
        ("Max Time", format!("{}s", stats.max)),
        ("Std Deviation", format!("{}s", stats.std_dev)),
        ("Total Time", format!("{}s", stats.total)),
        ("Timed Out", summary.any_timed_out().to_string()),
        ("Cancelled", summary.cancelled.to_string()),
        ("Failed", summary.failed.to_string()),
    ];

    let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(key, value)| format!("{key:<width$}  {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}
