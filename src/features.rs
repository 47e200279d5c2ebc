//! Feature engineering.
//!
//! Every model column is a [`Feature`] variant. Historical rows and forecast
//! days share the same [`DayInputs`] representation, so the value of a
//! column is computed by one function in both cases.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::{self, BusinessCalendar};
use crate::config::{AppConfig, FeaturesConfig};
use crate::error::{PipelineError, Result};
use crate::panel::{DailyPanel, PanelRow, PrecipCategory};

/// How precipitation enters the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipEncoding {
    /// Separate rain and snow flags, clear days as baseline
    #[default]
    Categories,
    /// One "any precipitation" flag
    Any,
}

/// A model column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Feature {
    TempHigh,
    TempCentered,
    TempCold,
    TempHot,
    Weekend,
    Friday,
    Clear,
    Rain,
    Snow,
    AnyPrecip,
    SeasonImpact,
    FederalPayday,
    PaydayWeekend,
    SemiMonthlyPayday,
    SemiMonthlyWeekend,
    SchoolBreak,
    ObservedHoliday,
    PreHoliday,
    PostHoliday,
    ValentinesPeriod,
    LunarNewYear,
    PreHolidayFriday,
    OverflowIndex,
    OverflowWeekend,
    /// Indicator for one historical year
    Year(i32),
}

impl Feature {
    /// Every named (non-year) feature, in display order.
    pub const NAMED: [Feature; 24] = [
        Feature::TempHigh,
        Feature::TempCentered,
        Feature::TempCold,
        Feature::TempHot,
        Feature::Weekend,
        Feature::Friday,
        Feature::Clear,
        Feature::Rain,
        Feature::Snow,
        Feature::AnyPrecip,
        Feature::SeasonImpact,
        Feature::FederalPayday,
        Feature::PaydayWeekend,
        Feature::SemiMonthlyPayday,
        Feature::SemiMonthlyWeekend,
        Feature::SchoolBreak,
        Feature::ObservedHoliday,
        Feature::PreHoliday,
        Feature::PostHoliday,
        Feature::ValentinesPeriod,
        Feature::LunarNewYear,
        Feature::PreHolidayFriday,
        Feature::OverflowIndex,
        Feature::OverflowWeekend,
    ];

    fn name(&self) -> &'static str {
        match self {
            Feature::TempHigh => "Temp_High",
            Feature::TempCentered => "Temp_Centered",
            Feature::TempCold => "temp_cold",
            Feature::TempHot => "temp_hot",
            Feature::Weekend => "is_weekend",
            Feature::Friday => "is_friday",
            Feature::Clear => "is_clear",
            Feature::Rain => "is_rain",
            Feature::Snow => "is_snow",
            Feature::AnyPrecip => "has_precip",
            Feature::SeasonImpact => "season_impact",
            Feature::FederalPayday => "is_federal_payday",
            Feature::PaydayWeekend => "is_payday_weekend",
            Feature::SemiMonthlyPayday => "is_semi_monthly_payday",
            Feature::SemiMonthlyWeekend => "semi_monthly_x_weekend",
            Feature::SchoolBreak => "is_school_break",
            Feature::ObservedHoliday => "is_observed_holiday",
            Feature::PreHoliday => "is_pre_holiday",
            Feature::PostHoliday => "is_post_holiday",
            Feature::ValentinesPeriod => "is_valentines_period",
            Feature::LunarNewYear => "is_lunar_new_year",
            Feature::PreHolidayFriday => "is_pre_holiday_friday",
            Feature::OverflowIndex => "overflow_index",
            Feature::OverflowWeekend => "overflow_x_weekend",
            Feature::Year(_) => "year",
        }
    }

    pub fn uses_kink(&self) -> bool {
        matches!(self, Feature::TempCold | Feature::TempHot)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Year(year) => write!(f, "year_{year}"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for Feature {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some(year) = trimmed
            .strip_prefix("year_")
            .or_else(|| trimmed.strip_prefix("is_"))
            .and_then(|y| y.parse::<i32>().ok())
        {
            return Ok(Feature::Year(year));
        }
        Feature::NAMED
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| PipelineError::UnknownFeature(trimmed.to_string()))
    }
}

/// Parameters learned from the training rows and reused at prediction time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransformParams {
    /// Mean daily high over the training rows
    pub temp_mean: f64,
    /// Piecewise breakpoint, when the specification uses one
    pub kink: Option<f64>,
}

/// Raw inputs for one day: either a historical row or a forecast candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayInputs {
    pub temp_high: f64,
    pub weekday: Weekday,
    pub is_weekend: bool,
    pub precip: PrecipCategory,
    pub season_impact: i8,
    pub is_federal_payday: bool,
    pub is_payday_weekend: bool,
    pub is_semi_monthly_payday: bool,
    pub is_school_break: bool,
    pub is_observed_holiday: bool,
    pub is_pre_holiday: bool,
    pub is_post_holiday: bool,
    pub is_valentines_period: bool,
    pub is_lunar_new_year: bool,
    pub overflow_index: u32,
    /// `None` means the most recent year, the dummy baseline
    pub year: Option<i32>,
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl DayInputs {
    /// A plain day with no calendar events. Useful as a starting point for
    /// hand-entered forecasts.
    pub fn new(temp_high: f64, weekday: Weekday, is_weekend: bool) -> Self {
        Self {
            temp_high,
            weekday,
            is_weekend,
            precip: PrecipCategory::Clear,
            season_impact: 0,
            is_federal_payday: false,
            is_payday_weekend: false,
            is_semi_monthly_payday: false,
            is_school_break: false,
            is_observed_holiday: false,
            is_pre_holiday: false,
            is_post_holiday: false,
            is_valentines_period: false,
            is_lunar_new_year: false,
            overflow_index: 0,
            year: None,
        }
    }

    /// Numeric value of a column for this day.
    ///
    /// Interaction columns multiply the values of their component columns.
    /// Piecewise columns are `NaN` when no kink is set.
    pub fn value(&self, feature: Feature, params: &TransformParams) -> f64 {
        match feature {
            Feature::TempHigh => self.temp_high,
            Feature::TempCentered => self.temp_high - params.temp_mean,
            Feature::TempCold => params
                .kink
                .map_or(f64::NAN, |k| piecewise_cold(self.temp_high, k)),
            Feature::TempHot => params
                .kink
                .map_or(f64::NAN, |k| piecewise_hot(self.temp_high, k)),
            Feature::Weekend => flag(self.is_weekend),
            Feature::Friday => flag(self.weekday == Weekday::Fri),
            Feature::Clear => flag(self.precip.is_clear()),
            Feature::Rain => flag(self.precip.is_rain()),
            Feature::Snow => flag(self.precip.is_snow()),
            Feature::AnyPrecip => flag(!self.precip.is_clear()),
            Feature::SeasonImpact => f64::from(self.season_impact),
            Feature::FederalPayday => flag(self.is_federal_payday),
            Feature::PaydayWeekend => flag(self.is_payday_weekend),
            Feature::SemiMonthlyPayday => flag(self.is_semi_monthly_payday),
            Feature::SemiMonthlyWeekend => {
                self.value(Feature::SemiMonthlyPayday, params) * self.value(Feature::Weekend, params)
            }
            Feature::SchoolBreak => flag(self.is_school_break),
            Feature::ObservedHoliday => flag(self.is_observed_holiday),
            Feature::PreHoliday => flag(self.is_pre_holiday),
            Feature::PostHoliday => flag(self.is_post_holiday),
            Feature::ValentinesPeriod => flag(self.is_valentines_period),
            Feature::LunarNewYear => flag(self.is_lunar_new_year),
            Feature::PreHolidayFriday => {
                self.value(Feature::PreHoliday, params) * self.value(Feature::Friday, params)
            }
            Feature::OverflowIndex => f64::from(self.overflow_index),
            Feature::OverflowWeekend => {
                self.value(Feature::OverflowIndex, params) * self.value(Feature::Weekend, params)
            }
            Feature::Year(year) => flag(self.year == Some(year)),
        }
    }
}

/// Cold-side piecewise term: `min(t, kink)`.
pub fn piecewise_cold(temp: f64, kink: f64) -> f64 {
    temp.min(kink)
}

/// Hot-side piecewise term: `max(0, t - kink)`.
pub fn piecewise_hot(temp: f64, kink: f64) -> f64 {
    (temp - kink).max(0.0)
}

/// How the piecewise breakpoint is chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum KinkSelection {
    /// Use this breakpoint as-is
    Fixed(f64),
    /// Grid search by in-sample R², falling back to `default` when no
    /// candidate produces a finite R²
    Search { candidates: Vec<f64>, default: f64 },
}

/// A named, versioned list of model columns plus the settings that shape
/// how rows are turned into values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSpec {
    pub name: String,
    pub version: u32,
    pub features: Vec<Feature>,
    /// Append one dummy per historical year except the latest
    pub year_dummies: bool,
    pub weekend_days: Vec<Weekday>,
    pub precip_encoding: PrecipEncoding,
    pub kink: Option<KinkSelection>,
}

impl FeatureSpec {
    pub const PRESETS: [&'static str; 3] = ["piecewise", "centered", "calendar_full"];

    fn precip_features(encoding: PrecipEncoding) -> Vec<Feature> {
        match encoding {
            PrecipEncoding::Categories => vec![Feature::Rain, Feature::Snow],
            PrecipEncoding::Any => vec![Feature::AnyPrecip],
        }
    }

    fn base(name: &str, features: Vec<Feature>) -> Self {
        Self {
            name: name.to_string(),
            version: 1,
            features,
            year_dummies: true,
            weekend_days: vec![Weekday::Fri, Weekday::Sat, Weekday::Sun],
            precip_encoding: PrecipEncoding::Categories,
            kink: None,
        }
    }

    /// Hockey-stick temperature response with the production indicator set.
    pub fn piecewise(encoding: PrecipEncoding) -> Self {
        let mut features = vec![Feature::TempCold, Feature::TempHot, Feature::Weekend];
        features.extend(Self::precip_features(encoding));
        features.extend([
            Feature::FederalPayday,
            Feature::PaydayWeekend,
            Feature::SeasonImpact,
        ]);
        Self {
            precip_encoding: encoding,
            kink: Some(KinkSelection::Search {
                candidates: vec![50.0, 55.0, 60.0, 65.0, 70.0],
                default: 60.0,
            }),
            ..Self::base("piecewise", features)
        }
    }

    /// Linear response to temperature centered on the training mean.
    pub fn centered(encoding: PrecipEncoding) -> Self {
        let mut features = vec![Feature::TempCentered, Feature::Weekend];
        features.extend(Self::precip_features(encoding));
        features.extend([
            Feature::FederalPayday,
            Feature::PaydayWeekend,
            Feature::SeasonImpact,
        ]);
        Self {
            precip_encoding: encoding,
            ..Self::base("centered", features)
        }
    }

    /// Piecewise model plus every calendar and competitor indicator.
    pub fn calendar_full(encoding: PrecipEncoding) -> Self {
        let mut spec = Self::piecewise(encoding);
        spec.name = "calendar_full".to_string();
        spec.features.extend([
            Feature::Friday,
            Feature::SemiMonthlyPayday,
            Feature::SemiMonthlyWeekend,
            Feature::SchoolBreak,
            Feature::ObservedHoliday,
            Feature::PreHoliday,
            Feature::PostHoliday,
            Feature::ValentinesPeriod,
            Feature::LunarNewYear,
            Feature::PreHolidayFriday,
            Feature::OverflowIndex,
            Feature::OverflowWeekend,
        ]);
        spec
    }

    pub fn preset(name: &str, encoding: PrecipEncoding) -> Result<Self> {
        match name {
            "piecewise" => Ok(Self::piecewise(encoding)),
            "centered" => Ok(Self::centered(encoding)),
            "calendar_full" => Ok(Self::calendar_full(encoding)),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown feature specification {other:?}; expected one of {}",
                Self::PRESETS.join(", ")
            ))),
        }
    }

    /// Build from the `[features]` config section.
    ///
    /// An explicit column list replaces the preset's columns and is checked
    /// name by name.
    pub fn from_config(config: &FeaturesConfig) -> Result<Self> {
        let mut spec = Self::preset(&config.spec, config.precip_encoding)?;

        if !config.columns.is_empty() {
            spec.features = config
                .columns
                .iter()
                .map(|c| c.parse())
                .collect::<Result<Vec<Feature>>>()?;
            spec.version += 1;
        }

        spec.year_dummies = config.year_dummies;
        spec.weekend_days = config.weekend_days.clone();

        spec.kink = if spec.uses_kink() {
            Some(KinkSelection::Search {
                candidates: config.kink_candidates.clone(),
                default: config.default_kink,
            })
        } else {
            None
        };

        Ok(spec)
    }

    pub fn uses_kink(&self) -> bool {
        self.features.iter().any(Feature::uses_kink)
    }

    pub fn with_kink(mut self, kink: KinkSelection) -> Self {
        self.kink = Some(kink);
        self
    }

    /// Columns for a fit on `table`: the configured list followed by the
    /// year dummies for every year present except the most recent.
    pub fn resolve(&self, table: &FeatureTable) -> Vec<Feature> {
        let mut columns: Vec<Feature> = self
            .features
            .iter()
            .copied()
            .filter(|f| !matches!(f, Feature::Year(_)))
            .collect();

        if self.year_dummies {
            let years = table.years();
            let latest = years.last().copied();
            columns.extend(
                years
                    .into_iter()
                    .filter(|y| Some(*y) != latest)
                    .map(Feature::Year),
            );
        } else {
            columns.extend(self.features.iter().filter(|f| matches!(f, Feature::Year(_))));
        }

        columns
    }
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self::piecewise(PrecipEncoding::Categories)
    }
}

/// Dependent variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Outcome {
    #[default]
    BowlsSold,
    Transactions,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::BowlsSold => f.write_str("Bowls_Sold"),
            Outcome::Transactions => f.write_str("Transactions"),
        }
    }
}

/// One operating day, ready for the design matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub bowls_sold: f64,
    pub transactions: u32,
    pub gross_sales: f64,
    pub inputs: DayInputs,
}

impl FeatureRow {
    pub fn outcome(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::BowlsSold => self.bowls_sold,
            Outcome::Transactions => f64::from(self.transactions),
        }
    }
}

/// Date-ordered feature rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by_key(|r| r.date);
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct calendar years, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.rows
            .iter()
            .filter_map(|r| r.inputs.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Mean daily high over all rows.
    pub fn temp_mean(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().map(|r| r.inputs.temp_high).sum::<f64>() / self.rows.len() as f64
    }

    pub fn targets(&self, outcome: Outcome) -> Vec<f64> {
        self.rows.iter().map(|r| r.outcome(outcome)).collect()
    }

    /// The last `n` rows.
    pub fn tail(&self, n: usize) -> &[FeatureRow] {
        &self.rows[self.rows.len().saturating_sub(n)..]
    }
}

/// Turns panel rows into feature rows using the business calendar.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    calendar: BusinessCalendar,
    closed_weekday: Weekday,
}

impl FeatureEngine {
    pub fn new(calendar: BusinessCalendar, closed_weekday: Weekday) -> Self {
        Self {
            calendar,
            closed_weekday,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            BusinessCalendar::new(&config.calendar),
            config.pipeline.closed_weekday,
        )
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Derive every input for `date` from the calendar.
    pub fn day_inputs(
        &self,
        date: NaiveDate,
        temp_high: f64,
        precip: PrecipCategory,
        spec: &FeatureSpec,
    ) -> DayInputs {
        let weekday = date.weekday();
        DayInputs {
            temp_high,
            weekday,
            is_weekend: spec.weekend_days.contains(&weekday),
            precip,
            season_impact: calendar::season_impact(date.month()),
            is_federal_payday: self.calendar.is_federal_payday(date),
            is_payday_weekend: self.calendar.is_payday_weekend(date),
            is_semi_monthly_payday: calendar::is_semi_monthly_payday(date),
            is_school_break: self.calendar.is_school_break(date),
            is_observed_holiday: self.calendar.is_observed_holiday(date),
            is_pre_holiday: self.calendar.is_pre_holiday(date),
            is_post_holiday: self.calendar.is_post_holiday(date),
            is_valentines_period: self.calendar.is_valentines_period(date),
            is_lunar_new_year: self.calendar.is_lunar_new_year(date),
            overflow_index: self.calendar.overflow_index(weekday),
            year: Some(date.year()),
        }
    }

    fn row(&self, panel_row: &PanelRow, spec: &FeatureSpec) -> Option<FeatureRow> {
        let temp = panel_row.temp_high?;
        Some(FeatureRow {
            date: panel_row.date,
            bowls_sold: panel_row.bowls_sold,
            transactions: panel_row.transactions,
            gross_sales: panel_row.gross_sales,
            inputs: self.day_inputs(panel_row.date, temp, panel_row.precip, spec),
        })
    }

    /// Keep only days the restaurant traded: not the closed weekday and
    /// with positive sales. Applying it twice changes nothing.
    pub fn operating_day_filter(&self, table: FeatureTable) -> FeatureTable {
        FeatureTable {
            rows: table
                .rows
                .into_iter()
                .filter(|r| r.inputs.weekday != self.closed_weekday && r.bowls_sold > 0.0)
                .collect(),
        }
    }

    /// Build the model-ready table for `panel`.
    pub fn engineer(&self, panel: &DailyPanel, spec: &FeatureSpec) -> Result<FeatureTable> {
        let mut missing_temp = 0usize;
        let rows = panel
            .rows()
            .iter()
            .filter_map(|r| {
                let row = self.row(r, spec);
                if row.is_none() && r.bowls_sold > 0.0 {
                    missing_temp += 1;
                }
                row
            })
            .collect();

        if missing_temp > 0 {
            tracing::debug!("{} trading days have no usable temperature", missing_temp);
        }

        let table = self.operating_day_filter(FeatureTable::new(rows));
        if table.is_empty() {
            return Err(PipelineError::NoOperatingDays);
        }

        tracing::info!(
            "Engineered {} operating days for specification '{}' v{}",
            table.len(),
            spec.name,
            spec.version
        );

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalendarConfig;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine() -> FeatureEngine {
        FeatureEngine::new(BusinessCalendar::new(&CalendarConfig::default()), Weekday::Mon)
    }

    fn panel_row(d: NaiveDate, temp: Option<f64>, bowls: f64) -> PanelRow {
        PanelRow {
            date: d,
            day_of_week: d.weekday(),
            temp_high: temp,
            precip: PrecipCategory::Clear,
            bowls_sold: bowls,
            transactions: bowls as u32,
            gross_sales: bowls * 15.0,
        }
    }

    fn params(kink: Option<f64>) -> TransformParams {
        TransformParams {
            temp_mean: 40.0,
            kink,
        }
    }

    // ==================== Feature Name Tests ====================

    #[test]
    fn test_feature_names_round_trip_through_from_str() {
        for feature in Feature::NAMED {
            let parsed: Feature = feature.to_string().parse().unwrap();
            assert_eq!(parsed, feature);
        }
    }

    #[test]
    fn test_year_feature_parsing() {
        assert_eq!("year_2024".parse::<Feature>().unwrap(), Feature::Year(2024));
        assert_eq!("is_2025".parse::<Feature>().unwrap(), Feature::Year(2025));
        assert_eq!(Feature::Year(2024).to_string(), "year_2024");
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let err = "is_wekend".parse::<Feature>().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownFeature(name) if name == "is_wekend"));
    }

    // ==================== Value Tests ====================

    #[test]
    fn test_centered_temperature_uses_stored_mean() {
        let inputs = DayInputs::new(52.5, Weekday::Wed, false);
        assert_eq!(inputs.value(Feature::TempCentered, &params(None)), 12.5);
    }

    #[test]
    fn test_piecewise_terms() {
        let p = params(Some(60.0));
        let cold = DayInputs::new(45.0, Weekday::Tue, false);
        let hot = DayInputs::new(72.0, Weekday::Tue, false);

        assert_eq!(cold.value(Feature::TempCold, &p), 45.0);
        assert_eq!(cold.value(Feature::TempHot, &p), 0.0);
        assert_eq!(hot.value(Feature::TempCold, &p), 60.0);
        assert_eq!(hot.value(Feature::TempHot, &p), 12.0);
    }

    #[test]
    fn test_piecewise_without_kink_is_nan() {
        let inputs = DayInputs::new(45.0, Weekday::Tue, false);
        assert!(inputs.value(Feature::TempCold, &params(None)).is_nan());
        assert!(inputs.value(Feature::TempHot, &params(None)).is_nan());
        // Above and below the kink once one is set
        assert_eq!(inputs.value(Feature::TempCold, &params(Some(40.0))), 40.0);
        assert_eq!(inputs.value(Feature::TempHot, &params(Some(40.0))), 5.0);
    }

    #[test]
    fn test_precipitation_flags() {
        let p = params(None);
        let mut inputs = DayInputs::new(30.0, Weekday::Thu, false);

        inputs.precip = PrecipCategory::Mixed;
        assert_eq!(inputs.value(Feature::Rain, &p), 1.0);
        assert_eq!(inputs.value(Feature::Snow, &p), 0.0);
        assert_eq!(inputs.value(Feature::AnyPrecip, &p), 1.0);

        inputs.precip = PrecipCategory::Flurries;
        assert_eq!(inputs.value(Feature::Snow, &p), 1.0);
        assert_eq!(inputs.value(Feature::Clear, &p), 0.0);

        inputs.precip = PrecipCategory::Clear;
        assert_eq!(inputs.value(Feature::AnyPrecip, &p), 0.0);
        assert_eq!(inputs.value(Feature::Clear, &p), 1.0);
    }

    #[test]
    fn test_interactions_follow_component_flags() {
        let p = params(None);
        let mut inputs = DayInputs::new(30.0, Weekday::Fri, true);
        inputs.is_semi_monthly_payday = true;
        inputs.is_pre_holiday = true;
        inputs.overflow_index = 2;

        assert_eq!(inputs.value(Feature::SemiMonthlyWeekend, &p), 1.0);
        assert_eq!(inputs.value(Feature::PreHolidayFriday, &p), 1.0);
        assert_eq!(inputs.value(Feature::OverflowWeekend, &p), 2.0);

        // An explicit weekday flag of false turns the interactions off
        inputs.is_weekend = false;
        assert_eq!(inputs.value(Feature::SemiMonthlyWeekend, &p), 0.0);
        assert_eq!(inputs.value(Feature::OverflowWeekend, &p), 0.0);
    }

    #[test]
    fn test_year_dummy_baseline_is_none() {
        let p = params(None);
        let mut inputs = DayInputs::new(30.0, Weekday::Fri, true);
        assert_eq!(inputs.value(Feature::Year(2024), &p), 0.0);
        inputs.year = Some(2024);
        assert_eq!(inputs.value(Feature::Year(2024), &p), 1.0);
        assert_eq!(inputs.value(Feature::Year(2025), &p), 0.0);
    }

    // ==================== Specification Tests ====================

    #[test]
    fn test_presets_exist() {
        for name in FeatureSpec::PRESETS {
            assert_eq!(FeatureSpec::preset(name, PrecipEncoding::Categories).unwrap().name, name);
        }
        assert!(FeatureSpec::preset("kitchen_sink", PrecipEncoding::Any).is_err());
    }

    #[test]
    fn test_precip_encoding_changes_columns() {
        let any = FeatureSpec::piecewise(PrecipEncoding::Any);
        assert!(any.features.contains(&Feature::AnyPrecip));
        assert!(!any.features.contains(&Feature::Rain));
    }

    #[test]
    fn test_from_config_explicit_columns() {
        let config = FeaturesConfig {
            spec: "centered".to_string(),
            columns: vec!["Temp_Centered".to_string(), "is_weekend".to_string()],
            year_dummies: false,
            weekend_days: vec![Weekday::Sat, Weekday::Sun],
            ..FeaturesConfig::default()
        };

        let spec = FeatureSpec::from_config(&config).unwrap();

        assert_eq!(spec.features, vec![Feature::TempCentered, Feature::Weekend]);
        assert_eq!(spec.version, 2);
        assert_eq!(spec.weekend_days, vec![Weekday::Sat, Weekday::Sun]);
        assert!(spec.kink.is_none());
    }

    #[test]
    fn test_from_config_unknown_column_fails() {
        let config = FeaturesConfig {
            columns: vec!["temp_warm".to_string()],
            ..FeaturesConfig::default()
        };
        assert!(matches!(
            FeatureSpec::from_config(&config),
            Err(PipelineError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_from_config_piecewise_gets_kink_search() {
        let spec = FeatureSpec::from_config(&FeaturesConfig::default()).unwrap();
        assert_eq!(
            spec.kink,
            Some(KinkSelection::Search {
                candidates: vec![50.0, 55.0, 60.0, 65.0, 70.0],
                default: 60.0
            })
        );
    }

    #[test]
    fn test_resolve_adds_year_dummies_except_latest() {
        let engine = engine();
        let spec = FeatureSpec::centered(PrecipEncoding::Categories);
        let panel = DailyPanel::from_rows(vec![
            panel_row(date(2024, 3, 5), Some(50.0), 40.0),
            panel_row(date(2025, 3, 4), Some(50.0), 40.0),
            panel_row(date(2026, 1, 6), Some(30.0), 60.0),
        ]);

        let table = engine.engineer(&panel, &spec).unwrap();
        let columns = spec.resolve(&table);

        assert!(columns.contains(&Feature::Year(2024)));
        assert!(columns.contains(&Feature::Year(2025)));
        assert!(!columns.contains(&Feature::Year(2026)));
    }

    // ==================== Engine Tests ====================

    #[test]
    fn test_engineer_excludes_closed_zero_and_missing_temperature_days() {
        let panel = DailyPanel::from_rows(vec![
            panel_row(date(2026, 1, 5), Some(30.0), 12.0), // Monday
            panel_row(date(2026, 1, 6), Some(31.0), 0.0),  // zero sales
            panel_row(date(2026, 1, 7), None, 40.0),       // NA temperature
            panel_row(date(2026, 1, 8), Some(33.0), 45.0),
        ]);

        let table = engine().engineer(&panel, &FeatureSpec::default()).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].date, date(2026, 1, 8));
    }

    #[test]
    fn test_engineer_with_nothing_left_fails() {
        let panel = DailyPanel::from_rows(vec![panel_row(date(2026, 1, 5), Some(30.0), 12.0)]);
        let err = engine().engineer(&panel, &FeatureSpec::default()).unwrap_err();
        assert!(matches!(err, PipelineError::NoOperatingDays));
    }

    #[test]
    fn test_day_inputs_from_calendar() {
        let spec = FeatureSpec::default();
        // 2026-01-09 is the payday anchor, a Friday
        let payday = engine().day_inputs(date(2026, 1, 9), 35.0, PrecipCategory::Snow, &spec);
        assert!(payday.is_federal_payday);
        assert!(payday.is_weekend);
        assert_eq!(payday.season_impact, 1);
        assert_eq!(payday.year, Some(2026));

        let saturday = engine().day_inputs(date(2026, 1, 10), 35.0, PrecipCategory::Clear, &spec);
        assert!(saturday.is_payday_weekend);
        assert!(!saturday.is_federal_payday);
    }

    #[test]
    fn test_weekend_set_is_configurable() {
        let mut spec = FeatureSpec::default();
        spec.weekend_days = vec![Weekday::Sat, Weekday::Sun];
        let friday = engine().day_inputs(date(2026, 1, 9), 35.0, PrecipCategory::Clear, &spec);
        assert!(!friday.is_weekend);
    }

    #[test]
    fn test_tail_returns_last_rows() {
        let panel = DailyPanel::from_rows(
            (6..=10)
                .map(|d| panel_row(date(2026, 1, d), Some(30.0), 20.0))
                .collect(),
        );
        let table = engine().engineer(&panel, &FeatureSpec::default()).unwrap();
        let tail = table.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].date, date(2026, 1, 10));
        assert_eq!(table.tail(50).len(), table.len());
    }

    // ==================== Property-Based Tests ====================

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn piecewise_terms_sum_to_temperature(t in 0.0f64..120.0, k in 0.0f64..120.0) {
                let sum = piecewise_cold(t, k) + piecewise_hot(t, k);
                prop_assert!((sum - t).abs() < 1e-9);
                prop_assert!(piecewise_hot(t, k) >= 0.0);
            }

            #[test]
            fn operating_day_filter_is_idempotent(
                bowls in proptest::collection::vec(0.0f64..5.0, 1..40),
            ) {
                let start = date(2025, 12, 1);
                let panel = DailyPanel::from_rows(
                    bowls
                        .iter()
                        .enumerate()
                        .map(|(i, b)| panel_row(
                            start + chrono::Duration::days(i as i64),
                            Some(40.0),
                            b.floor(),
                        ))
                        .collect(),
                );
                let engine = engine();
                let spec = FeatureSpec::default();
                let rows = panel
                    .rows()
                    .iter()
                    .filter_map(|r| engine.row(r, &spec))
                    .collect();

                let once = engine.operating_day_filter(FeatureTable::new(rows));
                let twice = engine.operating_day_filter(once.clone());

                prop_assert_eq!(&once, &twice);
                prop_assert!(once.rows().iter().all(|r| r.bowls_sold > 0.0 && r.inputs.weekday != Weekday::Mon));
            }
        }
    }
}
