use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ProbeResult, Severity};

/// Aggregated outcome of one audit run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// In probe registration order.
    pub results: Vec<ProbeResult>,
    pub overall_severity: Severity,
    /// Severity a failed probe counts as.
    pub error_floor: Severity,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Fold probe results into a summary. Pure over its inputs, so folding the
    /// same results again yields an identical summary.
    pub fn aggregate(
        results: Vec<ProbeResult>,
        error_floor: Severity,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let overall_severity = results
            .iter()
            .map(|r| r.severity(error_floor))
            .max()
            .unwrap_or(Severity::Ok);
        Self {
            results,
            overall_severity,
            error_floor,
            started_at,
            finished_at,
        }
    }

    pub fn result(&self, probe: &str) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.probe == probe)
    }

    pub fn failed_probes(&self) -> Vec<&ProbeResult> {
        self.results.iter().filter(|r| r.is_failed()).collect()
    }

    /// Number of findings at each severity, plus failed probes.
    pub fn counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for result in &self.results {
            if result.is_failed() {
                counts.probe_errors += 1;
            }
            for finding in &result.findings {
                match finding.severity {
                    Severity::Ok => counts.ok += 1,
                    Severity::Info => counts.info += 1,
                    Severity::Warning => counts.warning += 1,
                    Severity::Fatal => counts.fatal += 1,
                }
            }
        }
        counts
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub ok: usize,
    pub info: usize,
    pub warning: usize,
    pub fatal: usize,
    pub probe_errors: usize,
}

impl SeverityCounts {
    pub fn total_issues(&self) -> usize {
        self.warning + self.fatal + self.probe_errors
    }

    pub fn has_issues(&self) -> bool {
        self.total_issues() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::types::Finding;

    fn results() -> Vec<ProbeResult> {
        vec![
            ProbeResult::completed(
                "nodes",
                vec![
                    Finding::new("nodes", "worker-0", Severity::Info, "node is tainted"),
                    Finding::new("nodes", "worker-1", Severity::Ok, "ready"),
                ],
            ),
            ProbeResult::failed("events", ProbeError::Api("connection refused".to_string())),
        ]
    }

    #[test]
    fn test_probe_error_counts_as_floor() {
        let now = Utc::now();
        let summary = RunSummary::aggregate(results(), Severity::Warning, now, now);
        assert_eq!(summary.overall_severity, Severity::Warning);

        let downgraded = RunSummary::aggregate(results(), Severity::Ok, now, now);
        assert_eq!(downgraded.overall_severity, Severity::Info);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let now = Utc::now();
        let first = RunSummary::aggregate(results(), Severity::Warning, now, now);
        let second = RunSummary::aggregate(first.results.clone(), first.error_floor, now, now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_counts() {
        let now = Utc::now();
        let summary = RunSummary::aggregate(results(), Severity::Warning, now, now);
        let counts = summary.counts();
        assert_eq!(counts.ok, 1);
        assert_eq!(counts.info, 1);
        assert_eq!(counts.probe_errors, 1);
        assert_eq!(counts.total_issues(), 1);
        assert!(counts.has_issues());
        assert_eq!(summary.failed_probes()[0].probe, "events");
        assert!(summary.result("nodes").is_some());
        assert!(summary.result("alerts").is_none());
    }

    #[test]
    fn test_empty_run_is_ok() {
        let now = Utc::now();
        let summary = RunSummary::aggregate(Vec::new(), Severity::Warning, now, now);
        assert_eq!(summary.overall_severity, Severity::Ok);
        assert!(!summary.counts().has_issues());
    }
}
