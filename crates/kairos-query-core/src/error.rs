use thiserror::Error;

/// Raised by a strict builder, or when a textual bound cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{operation} called with no metric in progress")]
    NoMetricInProgress { operation: &'static str },

    #[error("unrecognized time bound: {0:?}")]
    UnrecognizedTimeBound(String),

    #[error("build called before any metric was added")]
    NoMetrics,
}
