//! Summarizes a shadow-compare divergence JSONL log (as written by
//! `sched_core::shadow::ShadowHarness`) into per-kind and per-reason
//! counts. Grounded on the Python runtime's shadow-report CLI.

use std::collections::HashMap;
use std::path::Path;

use sched_common::error::SchedError;
use sched_common::Result;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowReportSummary {
    pub divergence_entries: usize,
    pub kind_counts: HashMap<String, usize>,
    pub reason_counts: HashMap<String, usize>,
}

impl ShadowReportSummary {
    pub fn top_kinds(&self, n: usize) -> Vec<(String, usize)> {
        top_n(&self.kind_counts, n)
    }

    pub fn top_reasons(&self, n: usize) -> Vec<(String, usize)> {
        top_n(&self.reason_counts, n)
    }
}

fn top_n(counts: &HashMap<String, usize>, n: usize) -> Vec<(String, usize)> {
    let mut items: Vec<(String, usize)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(n);
    items
}

/// Missing input is zero divergence when `allow_missing`, matching the
/// CLI's `--allow-missing` behavior for a run with shadow logging disabled.
pub fn summarize(path: &Path, allow_missing: bool) -> Result<ShadowReportSummary> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if allow_missing && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ShadowReportSummary::default());
        }
        Err(e) => return Err(SchedError::IoError(e)),
    };

    let mut summary = ShadowReportSummary::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: Value = serde_json::from_str(line).map_err(|e| SchedError::protocol(format!("malformed shadow report line: {e}")))?;
        summary.divergence_entries += 1;
        let kind = entry.get("kind").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let reason = entry.get("reason").and_then(Value::as_str).unwrap_or("unknown").to_string();
        *summary.kind_counts.entry(kind).or_insert(0) += 1;
        *summary.reason_counts.entry(reason).or_insert(0) += 1;
    }
    Ok(summary)
}

pub fn format_report(summary: &ShadowReportSummary, top: usize) -> String {
    let mut out = format!("divergence_entries={}\ntop_kinds:\n", summary.divergence_entries);
    for (kind, count) in summary.top_kinds(top) {
        out.push_str(&format!("  {kind}: {count}\n"));
    }
    out.push_str("top_reasons:\n");
    for (reason, count) in summary.top_reasons(top) {
        out.push_str(&format!("  {reason}: {count}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_without_allow_missing_is_an_error() {
        let path = Path::new("/nonexistent/shadow-report.jsonl");
        assert!(summarize(path, false).is_err());
    }

    #[test]
    fn missing_file_with_allow_missing_is_zero_divergence() {
        let path = Path::new("/nonexistent/shadow-report.jsonl");
        let summary = summarize(path, true).unwrap();
        assert_eq!(summary.divergence_entries, 0);
    }

    #[test]
    fn counts_kinds_and_reasons_across_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"kind":"decode","reason":"mismatch_positions"}}"#).unwrap();
        writeln!(file, r#"{{"kind":"decode","reason":"mismatch_positions"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"kind":"prefill","reason":"shadow_exception"}}"#).unwrap();
        let summary = summarize(file.path(), false).unwrap();
        assert_eq!(summary.divergence_entries, 3);
        assert_eq!(summary.kind_counts.get("decode"), Some(&2));
        assert_eq!(summary.top_kinds(1), vec![("decode".to_string(), 2)]);
    }

    #[test]
    fn missing_kind_or_reason_falls_back_to_unknown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{}}").unwrap();
        let summary = summarize(file.path(), false).unwrap();
        assert_eq!(summary.kind_counts.get("unknown"), Some(&1));
        assert_eq!(summary.reason_counts.get("unknown"), Some(&1));
    }
}
