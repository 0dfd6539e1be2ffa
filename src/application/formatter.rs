//! Run report formatting.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::ChannelReport;

use super::attachments::DownloadStats;
use super::orchestrator::ImportSummary;

/// Formats the per-channel table.
pub fn format_report_table(reports: &[ChannelReport]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Channel", "Posted", "Threads", "Files", "Status"]);

    for report in reports {
        let status = report
            .failed
            .as_deref()
            .map_or_else(|| "ok".to_string(), |reason| truncate(reason, 60));

        table.add_row(vec![
            format!("#{}", report.channel),
            format!("{}/{}", report.messages_posted, report.messages_total),
            report.threads_created.to_string(),
            report.files_uploaded.to_string(),
            status,
        ]);
    }

    table.to_string()
}

/// Formats download statistics for display.
pub fn format_download_stats(stats: &DownloadStats) -> String {
    format!(
        "{}\n  Downloaded: {}\n  Reused: {}\n  Not found: {}\n  Deleted before export: {}",
        "📎 Attachments".bold(),
        stats.downloaded.to_string().cyan(),
        stats.reused.to_string().green(),
        stats.not_found.to_string().yellow(),
        stats.tombstoned.to_string().yellow()
    )
}

/// Formats the complete end-of-run report.
pub fn format_summary(summary: &ImportSummary) -> String {
    let posted: usize = summary.reports.iter().map(|r| r.messages_posted).sum();
    let headline = if summary.failed_channels() > 0 {
        format!(
            "⚠️  Import finished with {} failed channel(s)",
            summary.failed_channels()
        )
        .red()
        .bold()
    } else if summary.dry_run {
        format!("🔍 Dry run complete, {posted} message(s) would be posted").bold()
    } else {
        format!("✅ Import complete, {posted} message(s) posted")
            .green()
            .bold()
    };

    format!(
        "{}\n{}\n\n{}",
        format_report_table(&summary.reports),
        format_download_stats(&summary.downloads),
        headline
    )
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
