//! Run summary rendering

use crate::crawler::RunSummary;

/// Renders a finished run as the text printed after a harvest
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("=== Harvest Summary ===\n\n");

    if let Some(started_at) = summary.started_at {
        out.push_str(&format!("Started: {}\n", started_at.to_rfc3339()));
    }
    out.push_str(&format!("Duration: {:.1}s\n", summary.elapsed.as_secs_f64()));

    if let Some(discovery) = &summary.discovery {
        out.push_str(&format!(
            "Discovery: {} categories, {} subcategories, {} listing pages, {} items",
            discovery.categories, discovery.subcategories, discovery.listing_pages, discovery.items
        ));
        if discovery.abandoned_branches > 0 {
            out.push_str(&format!(" ({} branches abandoned)", discovery.abandoned_branches));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "Records: {} received, {} written in {} flushes ({} superseded)\n",
        summary.records_received,
        summary.records_written,
        summary.flushes,
        summary.records_superseded
    ));
    out.push_str(&format!(
        "Recovery: {} restarts, {} requeues, {} tasks abandoned\n",
        summary.restarts, summary.requeues, summary.abandoned_tasks
    ));

    out
}

pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", format_run_summary(summary));
}
