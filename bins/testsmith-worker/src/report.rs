/// Report Parser - Raw Output to Metrics
///
/// **Core Responsibility:**
/// Extract test totals and the coverage percentage from the raw text a test
/// run produced.
///
/// **Critical Properties:**
/// - Pure function: text in, metrics out. Knows nothing about processes,
///   stores or queues.
/// - Best-effort by contract: the text scanning is inherently fragile, so
///   every field degrades independently to zero instead of erroring. A run
///   record is always produced.
///
/// The scan targets the usual terminal reporting of a pytest + coverage run:
/// a summary line carrying `N passed` / `N failed` counts (either may be
/// absent; the last such line wins) and a `TOTAL ... NN%` coverage row.
use testsmith_common::types::RunMetrics;

/// Parse raw runner output into metrics. Never fails; unparseable fields
/// stay at their zero defaults.
pub fn parse(raw: &str) -> RunMetrics {
    let mut counts: Option<(u32, u32)> = None;
    let mut coverage = 0.0_f64;

    for line in raw.lines() {
        if let Some(found) = parse_summary_line(line) {
            counts = Some(found);
        }
        if line.contains("TOTAL") && line.contains('%') {
            if let Some(pct) = parse_total_percent(line) {
                coverage = pct;
            }
        }
    }

    let (passed, failed) = counts.unwrap_or((0, 0));
    RunMetrics {
        tests_total: passed.saturating_add(failed),
        tests_failed: failed,
        coverage: coverage.clamp(0.0, 100.0),
    }
}

/// Extract `(passed, failed)` from a results summary line, if this is one.
///
/// Counts are read as `<number> passed` / `<number> failed` token pairs so
/// prose mentioning the words without a count does not match.
fn parse_summary_line(line: &str) -> Option<(u32, u32)> {
    if !line.contains("passed") && !line.contains("failed") {
        return None;
    }

    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',' || c == '=')
        .filter(|t| !t.is_empty())
        .collect();

    let mut passed = None;
    let mut failed = None;
    for pair in tokens.windows(2) {
        if let Ok(n) = pair[0].parse::<u32>() {
            match pair[1] {
                "passed" => passed = Some(n),
                "failed" => failed = Some(n),
                _ => {}
            }
        }
    }

    if passed.is_none() && failed.is_none() {
        None
    } else {
        Some((passed.unwrap_or(0), failed.unwrap_or(0)))
    }
}

/// Extract the percentage from a coverage `TOTAL` row: the last token ending
/// in `%` that parses as a number.
fn parse_total_percent(line: &str) -> Option<f64> {
    line.split_whitespace()
        .rev()
        .filter_map(|token| token.strip_suffix('%'))
        .find_map(|token| token.parse::<f64>().ok())
}
