//! Output parsing for quality commands
//!
//! Recognises the summary lines of the common test runners and the
//! diagnostic lines of the common analyzers.

use regex::Regex;
use std::sync::OnceLock;

/// Findings kept per analysis run
pub const MAX_FINDINGS: usize = 50;

// Compiled regex patterns
static CARGO_RESULT_PATTERN: OnceLock<Regex> = OnceLock::new();
static FLUTTER_PATTERN: OnceLock<Regex> = OnceLock::new();
static PASSED_PATTERN: OnceLock<Regex> = OnceLock::new();
static FAILED_PATTERN: OnceLock<Regex> = OnceLock::new();
static FINDING_PATTERN: OnceLock<Regex> = OnceLock::new();

fn get_cargo_result_pattern() -> &'static Regex {
    CARGO_RESULT_PATTERN.get_or_init(|| {
        Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed").unwrap()
    })
}

fn get_flutter_pattern() -> &'static Regex {
    // "00:02 +3 ~1 -2: Some tests failed."
    FLUTTER_PATTERN
        .get_or_init(|| Regex::new(r"(?m)^\d+:\d+ \+(\d+)(?: ~\d+)?(?: -(\d+))?:").unwrap())
}

fn get_passed_pattern() -> &'static Regex {
    PASSED_PATTERN.get_or_init(|| Regex::new(r"(\d+) passed").unwrap())
}

fn get_failed_pattern() -> &'static Regex {
    FAILED_PATTERN.get_or_init(|| Regex::new(r"(\d+) failed").unwrap())
}

fn get_finding_pattern() -> &'static Regex {
    FINDING_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:error|warning|warn|info|lint)\b[\s\[:(•-]").unwrap()
    })
}

fn capture_u32(caps: &regex::Captures, index: usize) -> u32 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Extract `(passed, failed)` test counts from runner output.
///
/// Cargo summaries are summed across test binaries, flutter reports the
/// running tally so the last line wins, and jest/pytest style summaries use
/// the last line mentioning passed or failed tests.
pub fn parse_test_counts(output: &str) -> Option<(u32, u32)> {
    let cargo: Vec<_> = get_cargo_result_pattern().captures_iter(output).collect();
    if !cargo.is_empty() {
        let passed = cargo.iter().map(|caps| capture_u32(caps, 1)).sum();
        let failed = cargo.iter().map(|caps| capture_u32(caps, 2)).sum();
        return Some((passed, failed));
    }

    if let Some(caps) = get_flutter_pattern().captures_iter(output).last() {
        return Some((capture_u32(&caps, 1), capture_u32(&caps, 2)));
    }

    let summary = output.lines().rev().find(|line| {
        get_passed_pattern().is_match(line) || get_failed_pattern().is_match(line)
    })?;

    let passed = get_passed_pattern()
        .captures(summary)
        .map(|caps| capture_u32(&caps, 1))
        .unwrap_or(0);
    let failed = get_failed_pattern()
        .captures(summary)
        .map(|caps| capture_u32(&caps, 1))
        .unwrap_or(0);
    Some((passed, failed))
}

/// Collect analyzer diagnostic lines, at most [`MAX_FINDINGS`]
pub fn parse_findings(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| get_finding_pattern().is_match(line))
        .map(|line| line.trim().to_string())
        .take(MAX_FINDINGS)
        .collect()
}
