//! CSV ingestion for point-of-sale exports and daily weather sheets.
//!
//! Readers are deliberately forgiving: a malformed quantity becomes zero and a
//! row whose timestamp cannot be parsed is skipped and counted. Only a missing
//! *required* file stops a run.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::config::DataConfig;
use crate::error::{PipelineError, Result};

// Two-digit years must be tried before %Y, which would read "26" as year 26
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// One point-of-sale line item, timestamped in the register's local zone.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub transaction_id: String,
    pub item: String,
    pub quantity: f64,
    pub gross_amount: f64,
    pub local_timestamp: NaiveDateTime,
    pub customer_name: Option<String>,
}

/// One weather sheet row, exactly as typed (units and free text included).
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub date: NaiveDate,
    pub temp_high: String,
    pub precip_type: String,
}

/// Sale records loaded from a single file.
#[derive(Debug, Clone, Default)]
pub struct SaleBatch {
    pub source: String,
    pub records: Vec<SaleRecord>,
    /// Rows dropped because date/time could not be parsed
    pub skipped_rows: usize,
}

/// Weather observations loaded from a single file.
#[derive(Debug, Clone, Default)]
pub struct WeatherBatch {
    pub source: String,
    pub observations: Vec<WeatherObservation>,
    pub skipped_rows: usize,
}

/// Everything read for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct LoadedSources {
    pub sales: Vec<SaleBatch>,
    pub weather: Vec<WeatherBatch>,
    /// Optional files that were not found
    pub skipped_files: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawSaleRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Item", default)]
    item: String,
    #[serde(rename = "Qty", default)]
    qty: String,
    #[serde(rename = "Gross Sales", default)]
    gross_sales: String,
    #[serde(rename = "Transaction ID", default)]
    transaction_id: String,
    #[serde(rename = "Customer Name", default)]
    customer_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWeatherRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Temp_High", default)]
    temp_high: String,
    #[serde(rename = "Precip_Type", default)]
    precip_type: String,
}

/// Strip `$` and thousands separators; anything unparseable is zero.
pub fn parse_currency(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    // Accounting exports write refunds as (1.50)
    let (negative, digits) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };
    match digits.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// Numeric-like quantity; invalid values count as zero rather than failing the row.
pub fn coerce_quantity(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            // "2026-01-15 00:00:00" style exports
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}

/// Read a point-of-sale export.
pub fn read_sales<R: Read>(reader: R, source: &str) -> Result<SaleBatch> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut batch = SaleBatch {
        source: source.to_string(),
        ..Default::default()
    };

    for row in rdr.deserialize::<RawSaleRow>() {
        let row = row?;
        let timestamp = parse_date(&row.date)
            .zip(parse_time(&row.time))
            .map(|(d, t)| d.and_time(t));

        let Some(local_timestamp) = timestamp else {
            batch.skipped_rows += 1;
            continue;
        };

        batch.records.push(SaleRecord {
            transaction_id: row.transaction_id.trim().to_string(),
            item: row.item,
            quantity: coerce_quantity(&row.qty),
            gross_amount: parse_currency(&row.gross_sales),
            local_timestamp,
            customer_name: row
                .customer_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        });
    }

    if batch.skipped_rows > 0 {
        tracing::warn!(
            "{}: skipped {} sale rows with unparseable date/time",
            source,
            batch.skipped_rows
        );
    }
    tracing::debug!("{}: loaded {} sale rows", source, batch.records.len());

    Ok(batch)
}

/// Read a daily weather sheet.
///
/// Header spaces are treated as underscores (`Temp High` == `Temp_High`).
/// Template instruction rows starting with `#` and rows without a date are skipped.
pub fn read_weather<R: Read>(reader: R, source: &str) -> Result<WeatherBatch> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: csv::StringRecord = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().replace(' ', "_"))
        .collect();

    let mut batch = WeatherBatch {
        source: source.to_string(),
        ..Default::default()
    };

    for record in rdr.records() {
        let record = record?;
        let first = record.get(0).unwrap_or("").trim();
        if first.is_empty() || first.starts_with('#') {
            continue;
        }

        let row: RawWeatherRow = record.deserialize(Some(&headers))?;
        let Some(date) = parse_date(&row.date) else {
            batch.skipped_rows += 1;
            continue;
        };

        batch.observations.push(WeatherObservation {
            date,
            temp_high: row.temp_high,
            precip_type: row.precip_type,
        });
    }

    if batch.skipped_rows > 0 {
        tracing::warn!(
            "{}: skipped {} weather rows with unparseable dates",
            source,
            batch.skipped_rows
        );
    }

    Ok(batch)
}

fn open(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::Read {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        }),
    }
}

fn with_path<T>(path: &Path, result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        PipelineError::Csv(source) => PipelineError::Read {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

fn label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load every configured source file.
///
/// A missing required file is fatal. A missing optional file is recorded in
/// [`LoadedSources::skipped_files`] and logged, and the run continues.
pub fn load_sources(data: &DataConfig) -> Result<LoadedSources> {
    let mut loaded = LoadedSources::default();

    let sales = data
        .optional_sales
        .iter()
        .map(|n| (n, false))
        .chain(data.required_sales.iter().map(|n| (n, true)));

    for (name, required) in sales {
        let path = data.path(name);
        match open(&path)? {
            Some(file) => {
                let batch = with_path(&path, read_sales(file, &label(&path)))?;
                loaded.sales.push(batch);
            }
            None if required => return Err(PipelineError::MissingSource { path }),
            None => {
                tracing::warn!("Optional sales file not found, skipping: {}", path.display());
                loaded.skipped_files.push(path);
            }
        }
    }

    let weather = data
        .weather
        .iter()
        .map(|n| (n, true))
        .chain(data.optional_weather.iter().map(|n| (n, false)));

    for (name, required) in weather {
        let path = data.path(name);
        match open(&path)? {
            Some(file) => {
                let batch = with_path(&path, read_weather(file, &label(&path)))?;
                loaded.weather.push(batch);
            }
            None if required => return Err(PipelineError::MissingSource { path }),
            None => {
                tracing::warn!("Optional weather file not found, skipping: {}", path.display());
                loaded.skipped_files.push(path);
            }
        }
    }

    tracing::info!(
        "Loaded {} sales files and {} weather files ({} optional files skipped)",
        loaded.sales.len(),
        loaded.weather.len(),
        loaded.skipped_files.len()
    );

    Ok(loaded)
}
