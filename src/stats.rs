//! Run statistics summary.
//!
//! Prints what a stored run covered: corpus counts, coverage percentages,
//! average confidence, and the verdict histograms. Used by `triage stats`
//! on a `run.json` written by `triage run`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use triage_harness_core::run::{BatchRun, RunStats};

/// Run the stats command: load a run and print a summary.
pub fn run_stats(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read run file: {}", path.display()))?;
    let run: BatchRun = serde_json::from_slice(&bytes)
        .with_context(|| format!("Not a run file: {}", path.display()))?;
    // Checkpoints of unfinished runs carry no stats yet.
    let stats = run.stats.clone().unwrap_or_else(|| RunStats::from_run(&run));

    println!("Triage Harness — Run Stats");
    println!("==========================");
    println!();
    println!("  Run:         {}", run.run_id);
    println!("  Repository:  {}", run.repo);
    println!("  Phase:       {}", run.phase.as_str());
    println!("  Started:     {}", format_ts_relative(run.started_at.timestamp()));
    println!("  Duration:    {}", format_duration(stats.duration_ms));
    println!("  File size:   {}", format_bytes(bytes.len() as u64));
    println!();
    println!(
        "  Fetched:     {} issues ({} pull requests filtered){}",
        stats.fetched_issues,
        stats.filtered_pull_requests,
        if stats.fetch_truncated { ", truncated" } else { "" }
    );
    println!(
        "  Targeted:    {} in {} / {} batches",
        stats.targeted,
        stats.batches_completed,
        run.total_batches()
    );
    println!("  Analyzed:    {}", stats.analyzed);
    println!("  Skipped:     {}", stats.skipped);
    println!();
    println!(
        "  Candidates:  {} ({}%)",
        stats.with_candidates, stats.candidate_coverage_pct
    );
    println!(
        "  Answered:    {} ({}%)",
        stats.with_answered_candidates, stats.answered_coverage_pct
    );
    println!(
        "  Precedents:  {} ({}%)",
        stats.with_precedents, stats.precedent_coverage_pct
    );
    println!("  Confidence:  {:.1} avg", stats.average_confidence);
    println!(
        "  Queries:     {} issued, {} failed, {} cool-downs",
        stats.queries.issued, stats.queries.failed, stats.queries.cooldowns
    );

    print_histogram("Complexity", &stats.complexity, stats.analyzed);
    print_histogram("Solvability", &stats.solvability, stats.analyzed);
    print_histogram("Effort", &stats.effort, stats.analyzed);

    let gaps: Vec<_> = run.gaps().collect();
    if !gaps.is_empty() {
        println!();
        println!("  Skipped issues:");
        println!("  {:<10} {:>8}   {}", "ISSUE", "ATTEMPTS", "REASON");
        println!("  {}", "-".repeat(76));
        for gap in gaps {
            println!(
                "  {:<10} {:>8}   {}",
                format!("#{}", gap.number),
                gap.attempts,
                gap.reason
            );
        }
    }

    println!();
    Ok(())
}

fn print_histogram(title: &str, counts: &BTreeMap<String, usize>, total: usize) {
    if counts.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    for (label, count) in counts {
        let pct = if total > 0 { count * 100 / total } else { 0 };
        println!("  {:<24} {:>6}   {:>3}%", label, count, pct);
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format milliseconds as "850 ms", "12.4 s", "3m 05s" or "2h 14m".
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{} ms", ms)
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1000.0)
    } else if ms < 3_600_000 {
        let secs = ms / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        let mins = ms / 60_000;
        format!("{}h {:02}m", mins / 60, mins % 60)
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
