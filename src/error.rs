use std::time::Duration;

use thiserror::Error;

/// Recoverable failure of a single probe or collaborator call.
///
/// Kept `Clone + PartialEq` so results can be compared and re-aggregated;
/// underlying library errors are captured as text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("cluster API request failed: {0}")]
    Api(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("could not decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("exec in {target} failed: {message}")]
    Exec { target: String, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("required field missing: {0}")]
    Missing(String),

    #[error("malformed release channel '{0}'")]
    Channel(String),

    #[error("no absent channel found within {queries} lookups after {from}")]
    ChannelSearchExhausted { from: String, queries: u32 },

    #[error("probe panicked: {0}")]
    Panicked(String),
}

impl ProbeError {
    pub fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ProbeError::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub fn exec(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ProbeError::Exec {
            target: target.into(),
            message: err.to_string(),
        }
    }

    /// Transport-level failures and server errors may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProbeError::Http { .. } | ProbeError::Timeout(_) => true,
            ProbeError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<kube::Error> for ProbeError {
    fn from(err: kube::Error) -> Self {
        ProbeError::Api(err.to_string())
    }
}

/// Conditions that abort the whole run. No partial summary is produced.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("user is not a cluster-admin: {reason}")]
    NotClusterAdmin { reason: String },

    #[error("cluster-admin check could not complete: {0}")]
    AdminGate(ProbeError),

    #[error("run cancelled before completion")]
    Cancelled,
}
