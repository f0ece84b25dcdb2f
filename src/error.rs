use std::{io, path::PathBuf, time::Duration};

use serde::Serialize;

/// Why a single trial produced no metric.
///
/// These never abort a sweep; they are recorded on the trial's result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
pub enum ErrorKind {
    #[error("simulator did not finish within {0:?}")]
    Timeout(Duration),

    #[error("simulator failed to run: {0}")]
    LaunchFailure(String),

    #[error("no hit rate found in simulator output")]
    ExtractionFailure,

    #[error("hit rate {0} is outside [0, 100]")]
    OutOfRange(f64),

    #[error("not dispatched, sweep stopped after {0} failed trials")]
    Aborted(usize),
}

impl ErrorKind {
    /// Transient failures are worth another attempt, malformed output is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Timeout(_) | ErrorKind::LaunchFailure(_))
    }
}

/// Misconfiguration detected before any trial is dispatched.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no {0} given, the sweep would be empty")]
    EmptyAxis(&'static str),

    #[error("{axis} must be positive, got {value}")]
    NonPositive { axis: &'static str, value: usize },

    #[error("cache size must be positive")]
    ZeroCacheSize,

    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    #[error("per-trial timeout must be non-zero")]
    ZeroTimeout,

    #[error("trace file {0:?} does not exist")]
    MissingTrace(PathBuf),

    #[error("unable to inspect trace file {path:?}")]
    Trace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
