use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::features::{FeatureTable, KinkSelection, Outcome};
use crate::model::{FittedModel, fit_outcome};

/// Percentage error above which a day is flagged in the recent-days table.
pub const FLAG_THRESHOLD_PCT: f64 = 10.0;

// ==================== Per-Day Errors ====================

/// Actual against predicted for one operating day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationError {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
    /// actual - predicted
    pub error: f64,
    /// Signed error as a percentage of actual
    pub error_pct: f64,
    /// |error_pct| exceeds [`FLAG_THRESHOLD_PCT`]
    pub flagged: bool,
}

impl ObservationError {
    pub fn abs_error_pct(&self) -> f64 {
        self.error_pct.abs()
    }
}

/// Residuals of `model` over every row of `table`.
///
/// A zero actual means the operating-day filter was bypassed and is
/// reported as an error rather than an infinite percentage.
pub fn observation_errors(model: &FittedModel, table: &FeatureTable) -> Result<Vec<ObservationError>> {
    table
        .rows()
        .iter()
        .map(|row| {
            let actual = row.outcome(model.outcome);
            if actual == 0.0 {
                return Err(PipelineError::ZeroActual { date: row.date });
            }
            let predicted = model.linear_predict(&row.inputs);
            let error = actual - predicted;
            let error_pct = error / actual * 100.0;
            Ok(ObservationError {
                date: row.date,
                actual,
                predicted,
                error,
                error_pct,
                flagged: error_pct.abs() > FLAG_THRESHOLD_PCT,
            })
        })
        .collect()
}

/// The last `days` operating days.
pub fn recent_days(model: &FittedModel, table: &FeatureTable, days: usize) -> Result<Vec<ObservationError>> {
    let tail = FeatureTable::new(table.tail(days).to_vec());
    observation_errors(model, &tail)
}

// ==================== Aggregate Metrics ====================

/// How many days fall within each error band (cumulative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ErrorBands {
    pub within_5: usize,
    pub within_10: usize,
    pub within_20: usize,
    pub total: usize,
}

impl ErrorBands {
    pub fn from_errors(errors: &[ObservationError]) -> Self {
        let count = |limit: f64| errors.iter().filter(|e| e.abs_error_pct() <= limit).count();
        Self {
            within_5: count(5.0),
            within_10: count(10.0),
            within_20: count(20.0),
            total: errors.len(),
        }
    }

    /// Share of days in a band, as a percentage.
    pub fn share(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }
}

/// Goodness-of-fit summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub outcome: Outcome,
    pub nobs: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub mae: f64,
    /// Square root of the fit's residual mean square
    pub rmse: f64,
    pub mape: f64,
    pub bands: ErrorBands,
}

pub fn diagnostics(model: &FittedModel, table: &FeatureTable) -> Result<Diagnostics> {
    let errors = observation_errors(model, table)?;
    let n = errors.len().max(1) as f64;

    Ok(Diagnostics {
        outcome: model.outcome,
        nobs: errors.len(),
        r_squared: model.r_squared,
        adj_r_squared: model.adj_r_squared,
        mae: errors.iter().map(|e| e.error.abs()).sum::<f64>() / n,
        rmse: model.residual_std_error(),
        mape: errors.iter().map(ObservationError::abs_error_pct).sum::<f64>() / n,
        bands: ErrorBands::from_errors(&errors),
    })
}

// ==================== Outcome Comparison ====================

/// Bowls sold against transaction count under the same specification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeComparison {
    pub bowls: Diagnostics,
    pub transactions: Diagnostics,
}

impl OutcomeComparison {
    /// The outcome with the higher adjusted R².
    pub fn better(&self) -> Outcome {
        if self.transactions.adj_r_squared > self.bowls.adj_r_squared {
            Outcome::Transactions
        } else {
            Outcome::BowlsSold
        }
    }
}

/// Refit `model`'s specification on transaction counts and compare.
///
/// The transaction model reuses the bowls model's kink so both outcomes see
/// identical columns.
pub fn compare_outcomes(model: &FittedModel, table: &FeatureTable) -> Result<OutcomeComparison> {
    let mut spec = model.spec.clone();
    if let Some(kink) = model.params.kink {
        spec.kink = Some(KinkSelection::Fixed(kink));
    }

    let transactions_model = fit_outcome(table, &spec, Outcome::Transactions)?;

    Ok(OutcomeComparison {
        bowls: diagnostics(model, table)?,
        transactions: diagnostics(&transactions_model, table)?,
    })
}
