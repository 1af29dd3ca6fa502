//! Plain-text rendering of a finished run for terminals.

use std::fmt::Write;

use crate::aggregate::RunVerdict;
use crate::driver::RepairRunReport;

/// Errors beyond this count are elided from the summary.
const MAX_LISTED_ERRORS: usize = 5;

fn verdict_label(verdict: RunVerdict) -> &'static str {
    match verdict {
        RunVerdict::NothingToDo => "nothing to repair",
        RunVerdict::FullSuccess => "full success",
        RunVerdict::PartialSuccess => "partial success",
        RunVerdict::Failed => "failed",
    }
}

pub fn render_summary(report: &RepairRunReport) -> String {
    let aggregate = &report.aggregate;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Repair run {} {} ({})",
        report.run_id,
        report.status,
        verdict_label(report.verdict())
    );
    let _ = writeln!(out, "Issue type: {}", report.issue_type);
    match report.estimated_total_iterations {
        Some(total) => {
            let _ = writeln!(out, "Chunks: {} (estimated {})", aggregate.iterations(), total);
        }
        None => {
            let _ = writeln!(out, "Chunks: {}", aggregate.iterations());
        }
    }
    let _ = writeln!(
        out,
        "Cursor: {} -> {}",
        report.start_cursor, report.final_cursor
    );
    let _ = writeln!(
        out,
        "Attempted: {}  Successful: {}  Failed: {}  Success rate: {:.1}%",
        aggregate.total_attempted(),
        aggregate.total_successful(),
        aggregate.total_failed(),
        aggregate.success_rate() * 100.0
    );

    let errors = aggregate.all_errors();
    if !errors.is_empty() {
        let _ = writeln!(out, "Errors:");
        for error in errors.iter().take(MAX_LISTED_ERRORS) {
            let _ = writeln!(out, "  - {}", error);
        }
        if errors.len() > MAX_LISTED_ERRORS {
            let _ = writeln!(out, "  ... and {} more", errors.len() - MAX_LISTED_ERRORS);
        }
    }

    out
}
