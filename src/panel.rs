//! Daily panel construction.
//!
//! Sales are shifted from the register's zone into the reporting zone before
//! a calendar date is taken, so a late-night sale can land on the next day.
//! Weather defines the date range: every date between the first and last
//! weather observation gets exactly one row, with zero bowls when nothing
//! was sold.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::{SaleBatch, WeatherBatch};

/// Normalized precipitation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PrecipCategory {
    #[default]
    Clear,
    Rain,
    Mixed,
    Snow,
    Flurries,
    HeavySnow,
}

impl PrecipCategory {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" | "clear" => Some(PrecipCategory::Clear),
            "rain" => Some(PrecipCategory::Rain),
            "mixed" => Some(PrecipCategory::Mixed),
            "snow" => Some(PrecipCategory::Snow),
            "flurries" => Some(PrecipCategory::Flurries),
            "heavy snow" => Some(PrecipCategory::HeavySnow),
            _ => None,
        }
    }

    /// Map free text onto the vocabulary.
    ///
    /// Whole-label matches win ("Heavy Snow"), then the first word
    /// ("Rain Showers" -> Rain). Anything else, including blanks, is Clear.
    pub fn normalize(raw: &str) -> Self {
        Self::from_label(raw)
            .or_else(|| raw.split_whitespace().next().and_then(Self::from_label))
            .unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            PrecipCategory::Clear => "Clear",
            PrecipCategory::Rain => "Rain",
            PrecipCategory::Mixed => "Mixed",
            PrecipCategory::Snow => "Snow",
            PrecipCategory::Flurries => "Flurries",
            PrecipCategory::HeavySnow => "Heavy Snow",
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, PrecipCategory::Clear)
    }

    pub fn is_rain(&self) -> bool {
        matches!(self, PrecipCategory::Rain | PrecipCategory::Mixed)
    }

    pub fn is_snow(&self) -> bool {
        matches!(
            self,
            PrecipCategory::Snow | PrecipCategory::Flurries | PrecipCategory::HeavySnow
        )
    }
}

/// Parse a daily high such as `34`, `34.5`, `34°F`, `34℉` or `34 F`.
/// Missing markers like `NA` yield `None`.
pub fn strip_temperature(raw: &str) -> Option<f64> {
    let trimmed = raw
        .trim()
        .trim_end_matches(['F', 'f', 'C', 'c', '\u{2109}', '\u{2103}'])
        .trim_end()
        .trim_end_matches('°')
        .trim();
    trimmed.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// One calendar day in the reporting zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub date: NaiveDate,
    pub day_of_week: Weekday,
    pub temp_high: Option<f64>,
    pub precip: PrecipCategory,
    pub bowls_sold: f64,
    /// Distinct transactions containing at least one matching item
    pub transactions: u32,
    pub gross_sales: f64,
}

/// Date-ordered daily observations, one row per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyPanel {
    rows: Vec<PanelRow>,
}

impl DailyPanel {
    pub fn from_rows(mut rows: Vec<PanelRow>) -> Self {
        rows.sort_by_key(|r| r.date);
        Self { rows }
    }

    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&PanelRow> {
        self.rows
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.rows.first()?.date, self.rows.last()?.date))
    }

    /// Days with no matching sales (closures, gaps, Mondays).
    pub fn closed_days(&self) -> usize {
        self.rows.iter().filter(|r| r.bowls_sold <= 0.0).count()
    }
}

#[derive(Debug, Default)]
struct DayTotals<'a> {
    bowls: f64,
    gross: f64,
    transactions: HashSet<&'a str>,
}

/// Merges sales and weather into a [`DailyPanel`].
#[derive(Debug, Clone)]
pub struct PanelBuilder {
    source_tz: Tz,
    reporting_tz: Tz,
    item_filter: String,
}

impl PanelBuilder {
    pub fn new(source_tz: Tz, reporting_tz: Tz, item_filter: &str) -> Self {
        Self {
            source_tz,
            reporting_tz,
            item_filter: item_filter.to_lowercase(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let source = config
            .source_tz()
            .map_err(|e| PipelineError::InvalidConfig(format!("{e:#}")))?;
        let reporting = config
            .reporting_tz()
            .map_err(|e| PipelineError::InvalidConfig(format!("{e:#}")))?;
        Ok(Self::new(source, reporting, &config.item_filter))
    }

    /// Convert a register-local timestamp to the reporting zone.
    ///
    /// Ambiguous fall-back times take the earlier instant; times inside the
    /// spring-forward gap are moved one hour later.
    pub fn to_reporting(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        let instant = self
            .source_tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                self.source_tz
                    .from_local_datetime(&(local + Duration::hours(1)))
                    .earliest()
            })?;
        Some(instant.with_timezone(&self.reporting_tz).naive_local())
    }

    pub fn matches_item(&self, item: &str) -> bool {
        item.to_lowercase().contains(&self.item_filter)
    }

    pub fn build(&self, sales: &[SaleBatch], weather: &[WeatherBatch]) -> Result<DailyPanel> {
        let mut totals: BTreeMap<NaiveDate, DayTotals<'_>> = BTreeMap::new();
        let mut unconvertible = 0usize;

        for record in sales.iter().flat_map(|b| b.records.iter()) {
            if !self.matches_item(&record.item) {
                continue;
            }
            let Some(reporting) = self.to_reporting(record.local_timestamp) else {
                unconvertible += 1;
                continue;
            };
            let day = totals.entry(reporting.date()).or_default();
            day.bowls += record.quantity;
            day.gross += record.gross_amount;
            day.transactions.insert(record.transaction_id.as_str());
        }

        if unconvertible > 0 {
            tracing::warn!("{} sale rows could not be converted to the reporting zone", unconvertible);
        }

        // Later batches override earlier ones for the same date
        let mut observations = BTreeMap::new();
        let mut duplicates = 0usize;
        for obs in weather.iter().flat_map(|b| b.observations.iter()) {
            if observations.insert(obs.date, obs).is_some() {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            tracing::debug!("{} duplicate weather dates; later sources kept", duplicates);
        }

        let (Some(first), Some(last)) = (
            observations.keys().next().copied(),
            observations.keys().next_back().copied(),
        ) else {
            return Err(PipelineError::EmptyPanel);
        };

        let orphaned = totals
            .keys()
            .filter(|d| **d < first || **d > last)
            .count();
        if orphaned > 0 {
            tracing::warn!(
                "{} sales days fall outside the weather range {}..={} and are dropped",
                orphaned,
                first,
                last
            );
        }

        let mut rows = Vec::with_capacity((last - first).num_days() as usize + 1);
        let mut date = first;
        while date <= last {
            let obs = observations.get(&date);
            let day = totals.get(&date);
            rows.push(PanelRow {
                date,
                day_of_week: date.weekday(),
                temp_high: obs.and_then(|o| strip_temperature(&o.temp_high)),
                precip: obs
                    .map(|o| PrecipCategory::normalize(&o.precip_type))
                    .unwrap_or_default(),
                bowls_sold: day.map_or(0.0, |d| d.bowls),
                transactions: day.map_or(0, |d| d.transactions.len() as u32),
                gross_sales: day.map_or(0.0, |d| d.gross),
            });
            date += Duration::days(1);
        }

        let panel = DailyPanel { rows };
        tracing::info!(
            "Built daily panel: {} days from {} to {} ({} without sales)",
            panel.len(),
            first,
            last,
            panel.closed_days()
        );

        Ok(panel)
    }
}
