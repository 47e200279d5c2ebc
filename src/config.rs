use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::features::PrecipEncoding;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
    pub features: FeaturesConfig,
    pub calendar: CalendarConfig,
    pub capacity: CapacityConfig,
}

/// Source files, relative to `dir`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub required_sales: Vec<String>,
    /// Older exports that may be absent on a fresh checkout
    pub optional_sales: Vec<String>,
    pub weather: Vec<String>,
    pub optional_weather: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            required_sales: vec![
                "Jan_2026_Bamboo_Data.csv".to_string(),
                "Feb 3 and 4 sales.csv".to_string(),
            ],
            optional_sales: vec![
                "2024_Bamboo_Data.csv".to_string(),
                "2025_Bamboo_Data.csv".to_string(),
            ],
            weather: vec![
                "camp_hill_2024_weather_processed.csv".to_string(),
                "camp_hill_2025_weather.csv".to_string(),
                "jan_weather.csv".to_string(),
                "feb_weather.csv".to_string(),
            ],
            optional_weather: Vec::new(),
        }
    }
}

impl DataConfig {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Every configured source, required or not.
    pub fn all_paths(&self) -> Vec<PathBuf> {
        self.required_sales
            .iter()
            .chain(&self.optional_sales)
            .chain(&self.weather)
            .chain(&self.optional_weather)
            .map(|n| self.path(n))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Zone the point-of-sale clock runs in
    pub source_timezone: String,
    /// Zone that defines a business day
    pub reporting_timezone: String,
    /// Case-insensitive substring selecting the forecast item family
    pub item_filter: String,
    pub closed_weekday: Weekday,
    /// Operating days shown in the recent-days table
    pub recent_days: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_timezone: "US/Pacific".to_string(),
            reporting_timezone: "US/Eastern".to_string(),
            item_filter: "Pho".to_string(),
            closed_weekday: Weekday::Mon,
            recent_days: 7,
        }
    }
}

impl PipelineConfig {
    pub fn source_tz(&self) -> Result<Tz> {
        parse_tz(&self.source_timezone).context("pipeline.source_timezone")
    }

    pub fn reporting_tz(&self) -> Result<Tz> {
        parse_tz(&self.reporting_timezone).context("pipeline.reporting_timezone")
    }
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("unknown timezone {name:?}: {e}"))
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Named preset: `piecewise`, `centered` or `calendar_full`
    pub spec: String,
    /// Explicit feature list; overrides the preset's columns when non-empty
    pub columns: Vec<String>,
    pub year_dummies: bool,
    pub weekend_days: Vec<Weekday>,
    pub precip_encoding: PrecipEncoding,
    pub kink_candidates: Vec<f64>,
    pub default_kink: f64,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            spec: "piecewise".to_string(),
            columns: Vec::new(),
            year_dummies: true,
            weekend_days: vec![Weekday::Fri, Weekday::Sat, Weekday::Sun],
            precip_encoding: PrecipEncoding::Categories,
            kink_candidates: vec![50.0, 55.0, 60.0, 65.0, 70.0],
            default_kink: 60.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CompetitorConfig {
    pub name: String,
    pub closed_on: Vec<Weekday>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalendarConfig {
    /// A known federal payday; the lattice extends both ways from here
    pub payday_anchor: NaiveDate,
    pub payday_period_days: i64,
    pub school_breaks: Vec<DateRange>,
    pub observed_holidays: Vec<NaiveDate>,
    /// First day of each Lunar New Year; the window covers three days
    pub lunar_new_year: Vec<NaiveDate>,
    pub competitors: Vec<CompetitorConfig>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self {
            payday_anchor: d(2026, 1, 9),
            payday_period_days: 14,
            school_breaks: vec![
                DateRange { start: d(2024, 12, 23), end: d(2025, 1, 1) },
                DateRange { start: d(2025, 4, 17), end: d(2025, 4, 21) },
                DateRange { start: d(2025, 6, 6), end: d(2025, 8, 25) },
                DateRange { start: d(2025, 12, 22), end: d(2026, 1, 2) },
                DateRange { start: d(2026, 4, 2), end: d(2026, 4, 6) },
            ],
            observed_holidays: vec![
                d(2025, 1, 20),
                d(2025, 2, 17),
                d(2025, 10, 13),
                d(2025, 11, 11),
                d(2026, 1, 19),
                d(2026, 2, 16),
            ],
            lunar_new_year: vec![d(2024, 2, 10), d(2025, 1, 29), d(2026, 2, 17)],
            competitors: vec![
                CompetitorConfig {
                    name: "Carlisle Pike".to_string(),
                    closed_on: vec![Weekday::Tue],
                },
                CompetitorConfig {
                    name: "Paxton St".to_string(),
                    closed_on: vec![Weekday::Wed],
                },
                CompetitorConfig {
                    name: "Derry St".to_string(),
                    closed_on: vec![Weekday::Sun],
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CapacityConfig {
    /// Bowls per day the dining room can serve (10 tables, ~3 turns, 2.5 bowls)
    pub ceiling: f64,
    /// Fraction of the ceiling where "high demand" starts
    pub high_fraction: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            ceiling: 80.0,
            high_fraction: 0.85,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // .env may carry DAILY_INSIGHTS__* overrides; absence is fine
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daily-insights");

        let builder = Config::builder()
            // 1. Load default values
            // Data
            .set_default("data.dir", ".")?
            // Pipeline
            .set_default("pipeline.source_timezone", "US/Pacific")?
            .set_default("pipeline.reporting_timezone", "US/Eastern")?
            .set_default("pipeline.item_filter", "Pho")?
            .set_default("pipeline.closed_weekday", "Mon")?
            .set_default("pipeline.recent_days", 7)?
            // Features
            .set_default("features.spec", "piecewise")?
            .set_default("features.year_dummies", true)?
            .set_default("features.weekend_days", vec!["Fri", "Sat", "Sun"])?
            .set_default("features.precip_encoding", "categories")?
            .set_default("features.kink_candidates", vec![50.0, 55.0, 60.0, 65.0, 70.0])?
            .set_default("features.default_kink", 60.0)?
            // Calendar
            .set_default("calendar.payday_anchor", "2026-01-09")?
            .set_default("calendar.payday_period_days", 14)?
            // Capacity
            .set_default("capacity.ceiling", 80.0)?
            .set_default("capacity.high_fraction", 0.85)?
            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Load from Environment variables (DAILY_INSIGHTS__CAPACITY__CEILING=...)
            .add_source(Environment::with_prefix("DAILY_INSIGHTS").separator("__"));

        let s = builder.build()?;
        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.calendar.payday_period_days <= 0 {
            anyhow::bail!("calendar.payday_period_days must be positive");
        }
        if self.capacity.ceiling <= 0.0 {
            anyhow::bail!("capacity.ceiling must be positive");
        }
        if !(0.0..=1.0).contains(&self.capacity.high_fraction) {
            anyhow::bail!("capacity.high_fraction must be within 0..=1");
        }
        if self.features.kink_candidates.iter().any(|k| !k.is_finite() || *k < 0.0) {
            anyhow::bail!("features.kink_candidates must be finite and non-negative");
        }
        if self.data.required_sales.is_empty() && self.data.optional_sales.is_empty() {
            anyhow::bail!("data: at least one sales file must be configured");
        }
        self.pipeline.source_tz()?;
        self.pipeline.reporting_tz()?;
        Ok(())
    }
}
