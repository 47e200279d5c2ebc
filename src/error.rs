//! Error types for the forecasting pipeline.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that halt a pipeline run.
///
/// Data-quality problems (unparseable quantities, unknown precipitation text)
/// are coerced during ingestion and never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required source file does not exist.
    #[error("required source file is missing: {}", path.display())]
    MissingSource { path: PathBuf },

    /// A source file exists but could not be read or parsed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// CSV error without an associated file (in-memory readers).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The merged daily panel has no rows.
    #[error("daily panel is empty: no weather observations were loaded")]
    EmptyPanel,

    /// Every panel row was removed by the operating-day filter.
    #[error("no operating days left after excluding closed days and zero-sales days")]
    NoOperatingDays,

    /// Fewer observations than parameters to estimate.
    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A feature name in the configuration is not recognised.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// The feature specification uses piecewise temperature but no kink is set.
    #[error("feature specification uses piecewise temperature terms but defines no kink")]
    KinkRequired,

    /// Configuration values that parse but make no sense together.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A zero actual reached the diagnostics stage.
    #[error("observation on {date} has zero actual demand; operating-day filter was bypassed")]
    ZeroActual { date: NaiveDate },
}
