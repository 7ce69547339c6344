use std::fmt::Write;

use anyhow::{Context, Result};

use crate::report::RunSummary;
use crate::types::{ProbeResult, Severity};

pub const GENERIC_PROBE_ERROR: &str = "Something went wrong. Enable debug mode for more information";

fn status_label(result: &ProbeResult) -> String {
    if result.is_failed() {
        return "[Error]".to_string();
    }
    format!("[{}]", result.severity(Severity::Ok))
}

fn render_result(out: &mut String, result: &ProbeResult, debug: bool) {
    let _ = writeln!(out, "Checking {}... {}", result.probe, status_label(result));

    if let Some(err) = &result.error {
        let message = if debug {
            err.to_string()
        } else {
            GENERIC_PROBE_ERROR.to_string()
        };
        let _ = writeln!(out, "  {}", message);
        return;
    }
    if result.findings.is_empty() {
        let _ = writeln!(out, "  no issues found");
        return;
    }

    let subject_width = result
        .findings
        .iter()
        .map(|f| f.subject.chars().count())
        .max()
        .unwrap_or(0);
    let severity_width = result
        .findings
        .iter()
        .map(|f| f.severity.label().len() + 2)
        .max()
        .unwrap_or(0);
    for finding in &result.findings {
        let columns = finding
            .detail
            .iter()
            .filter(|(k, _)| k.as_str() != "message")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        let line = format!(
            "  {:<sw$}  {:<tw$}  {}  {}",
            format!("[{}]", finding.severity),
            finding.subject,
            finding.message,
            columns,
            sw = severity_width,
            tw = subject_width,
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
}

/// Human-readable report: one section per probe in registration order.
pub fn render_text(summary: &RunSummary, debug: bool) -> String {
    let mut out = String::new();
    for result in &summary.results {
        render_result(&mut out, result, debug);
        out.push('\n');
    }
    let counts = summary.counts();
    let _ = writeln!(
        out,
        "Overall: {} ({} warning(s), {} info, {} probe error(s), {}s)",
        summary.overall_severity,
        counts.warning + counts.fatal,
        counts.info,
        counts.probe_errors,
        summary.duration().num_seconds()
    );
    out
}

pub fn render_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("Failed to serialize run summary")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::types::Finding;
    use chrono::Utc;

    fn summary() -> RunSummary {
        let now = Utc::now();
        RunSummary::aggregate(
            vec![
                ProbeResult::completed(
                    "nodes",
                    vec![Finding::new("nodes", "worker-0", Severity::Warning, "node is cordoned")
                        .with_detail("taint", "node.kubernetes.io/unschedulable:NoSchedule")],
                ),
                ProbeResult::completed("etcd", vec![]),
                ProbeResult::failed("events", ProbeError::Api("connection refused".to_string())),
            ],
            Severity::Warning,
            now,
            now,
        )
    }

    #[test]
    fn test_text_hides_errors_without_debug() {
        let text = render_text(&summary(), false);
        assert!(text.contains("Checking nodes... [Warning]"));
        assert!(text.contains("Checking etcd... [OK]"));
        assert!(text.contains("Checking events... [Error]"));
        assert!(text.contains(GENERIC_PROBE_ERROR));
        assert!(!text.contains("connection refused"));
        assert!(text.contains("taint=node.kubernetes.io/unschedulable:NoSchedule"));
        assert!(text.contains("Overall: Warning"));
    }

    #[test]
    fn test_text_shows_errors_with_debug() {
        let text = render_text(&summary(), true);
        assert!(text.contains("connection refused"));
        assert!(!text.contains(GENERIC_PROBE_ERROR));
    }

    #[test]
    fn test_json_output() {
        let json = render_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["overall_severity"], "Warning");
        assert_eq!(value["results"][0]["probe"], "nodes");
        assert_eq!(value["results"][2]["error"], "cluster API request failed: connection refused");
        assert!(value["results"][1]["error"].is_null());
    }
}
