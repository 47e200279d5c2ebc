//! Daily Insights Library
//!
//! Demand forecasting for a single restaurant: point-of-sale exports and
//! daily weather are merged into a daily panel, turned into calendar and
//! weather features, and fitted with a linear model that predicts bowls
//! sold for a future day.

pub mod cache;
pub mod calendar;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod features;
pub mod ingest;
pub mod model;
pub mod panel;
pub mod pipeline;
pub mod traits;

// Re-export commonly used types
pub use cache::{PanelCache, SourceFingerprint};
pub use calendar::BusinessCalendar;
pub use config::AppConfig;
pub use diagnostics::{
    Diagnostics, ErrorBands, ObservationError, OutcomeComparison, compare_outcomes, diagnostics,
    observation_errors, recent_days,
};
pub use error::{PipelineError, Result};
pub use features::{
    DayInputs, Feature, FeatureEngine, FeatureRow, FeatureSpec, FeatureTable, KinkSelection,
    Outcome, PrecipEncoding, TransformParams,
};
pub use ingest::{LoadedSources, SaleBatch, SaleRecord, WeatherBatch, WeatherObservation, load_sources};
pub use model::{
    CapacityTier, Coefficient, FitWarning, FittedModel, Forecast, KinkReport, Term, fit, predict,
};
pub use panel::{DailyPanel, PanelBuilder, PanelRow, PrecipCategory};
pub use pipeline::{Pipeline, PipelineRun};
pub use traits::{Clock, MockClock, SystemClock};

/// Build the daily panel from loaded batches.
pub fn build_panel(
    builder: &PanelBuilder,
    sales: &[SaleBatch],
    weather: &[WeatherBatch],
) -> Result<DailyPanel> {
    builder.build(sales, weather)
}

/// Engineer the model-ready table for `spec`.
pub fn engineer_features(
    engine: &FeatureEngine,
    panel: &DailyPanel,
    spec: &FeatureSpec,
) -> Result<FeatureTable> {
    engine.engineer(panel, spec)
}
