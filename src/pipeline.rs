//! One-call orchestration: load, build the panel, engineer features, fit.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::cache::{CachedPanel, PanelCache, SourceFingerprint};
use crate::config::AppConfig;
use crate::error::Result;
use crate::features::{DayInputs, FeatureEngine, FeatureSpec, FeatureTable};
use crate::ingest;
use crate::model::{self, FittedModel, Forecast};
use crate::panel::{PanelBuilder, PrecipCategory};

/// Everything produced by one run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub panel: Arc<CachedPanel>,
    pub table: FeatureTable,
    pub model: FittedModel,
}

impl PipelineRun {
    /// Human-readable caveats: skipped sources and fit warnings.
    pub fn warnings(&self) -> Vec<String> {
        self.panel
            .skipped_files
            .iter()
            .map(|p| format!("optional source not found: {}", p.display()))
            .chain(self.model.warnings.iter().map(ToString::to_string))
            .collect()
    }
}

/// Configured pipeline, ready to run against the source files.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AppConfig,
    builder: PanelBuilder,
    engine: FeatureEngine,
    spec: FeatureSpec,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        let builder = PanelBuilder::from_config(&config.pipeline)?;
        let engine = FeatureEngine::from_config(&config);
        let spec = FeatureSpec::from_config(&config.features)?;
        Ok(Self {
            config,
            builder,
            engine,
            spec,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn engine(&self) -> &FeatureEngine {
        &self.engine
    }

    /// Replace the feature specification for subsequent runs.
    pub fn with_spec(mut self, spec: FeatureSpec) -> Self {
        self.spec = spec;
        self
    }

    fn fingerprint(&self) -> SourceFingerprint {
        let p = &self.config.pipeline;
        let settings = format!(
            "{}|{}|{}",
            p.source_timezone, p.reporting_timezone, p.item_filter
        );
        SourceFingerprint::compute(&self.config.data.all_paths(), &settings)
    }

    /// Load sources and build the daily panel, reusing `cache` when the
    /// source files are unchanged.
    pub fn load_panel(&self, cache: &mut PanelCache) -> Result<Arc<CachedPanel>> {
        cache.get_or_build(self.fingerprint(), || {
            let sources = ingest::load_sources(&self.config.data)?;
            let panel = self.builder.build(&sources.sales, &sources.weather)?;
            Ok((panel, sources.skipped_files))
        })
    }

    /// Run the whole pipeline with the configured specification.
    pub fn run(&self, cache: &mut PanelCache) -> Result<PipelineRun> {
        let panel = self.load_panel(cache)?;
        let table = self.engine.engineer(&panel.panel, &self.spec)?;
        let model = model::fit(&table, &self.spec)?;
        Ok(PipelineRun {
            panel,
            table,
            model,
        })
    }

    /// Inputs for a future day. The year is left empty so the forecast sits
    /// on the most recent year's baseline.
    pub fn forecast_inputs(&self, date: NaiveDate, temp_high: f64, precip: PrecipCategory) -> DayInputs {
        DayInputs {
            year: None,
            ..self.engine.day_inputs(date, temp_high, precip, &self.spec)
        }
    }

    pub fn forecast(&self, run: &PipelineRun, inputs: &DayInputs) -> Forecast {
        model::predict(&run.model, inputs, &self.config.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeaturesConfig;
    use crate::error::PipelineError;

    #[test]
    fn test_unknown_preset_is_rejected() {
        let config = AppConfig {
            features: FeaturesConfig {
                spec: "everything".to_string(),
                ..FeaturesConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_timezone_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.source_timezone = "Mars/Olympus".to_string();
        assert!(matches!(Pipeline::new(config), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_forecast_inputs_use_baseline_year() {
        let pipeline = Pipeline::new(AppConfig::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 6).unwrap();

        let inputs = pipeline.forecast_inputs(date, 33.0, PrecipCategory::Snow);

        assert_eq!(inputs.year, None);
        assert!(inputs.is_federal_payday);
        assert!(inputs.is_weekend);
        assert_eq!(inputs.precip, PrecipCategory::Snow);
    }

    #[test]
    fn test_missing_required_source_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.data.dir = dir.path().to_path_buf();
        let pipeline = Pipeline::new(config).unwrap();

        let err = pipeline.run(&mut PanelCache::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource { .. }));
    }
}
