use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ProbeError;

/// Ordered verdict vocabulary. Aggregation takes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub enum Severity {
    #[default]
    Ok,
    Info,
    Warning,
    Fatal,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" => Ok(Severity::Ok),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "fatal" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// One observation emitted by a probe.
///
/// `detail` holds the tabular columns a renderer shows next to the subject;
/// keys are column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub probe: String,
    pub subject: String,
    pub severity: Severity,
    pub message: String,
    pub detail: BTreeMap<String, String>,
}

impl Finding {
    pub fn new(
        probe: impl Into<String>,
        subject: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            probe: probe.into(),
            subject: subject.into(),
            severity,
            message: message.into(),
            detail: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(column.into(), value.into());
        self
    }

    pub fn detail(&self, column: &str) -> Option<&str> {
        self.detail.get(column).map(|v| v.as_str())
    }
}

/// Outcome of a single probe run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub probe: String,
    pub findings: Vec<Finding>,
    #[serde(serialize_with = "serialize_probe_error")]
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn completed(probe: impl Into<String>, findings: Vec<Finding>) -> Self {
        Self {
            probe: probe.into(),
            findings,
            error: None,
        }
    }

    /// A failed probe carries no findings, so a partial scan never reads as "all clear".
    pub fn failed(probe: impl Into<String>, error: ProbeError) -> Self {
        Self {
            probe: probe.into(),
            findings: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Highest severity among findings, with a probe error counted as `error_floor`.
    pub fn severity(&self, error_floor: Severity) -> Severity {
        let worst = self
            .findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Ok);
        match self.error {
            Some(_) => worst.max(error_floor),
            None => worst,
        }
    }

    pub fn findings_at_least(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity >= severity)
    }
}

fn serialize_probe_error<S>(error: &Option<ProbeError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
