//! Forecasts for a single day and capacity classification.

use std::fmt;

use serde::Serialize;

use super::FittedModel;
use crate::config::CapacityConfig;
use crate::features::DayInputs;

/// Where a forecast sits relative to dine-in capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CapacityTier {
    /// At or below the high-demand threshold
    Comfortable,
    /// Above the threshold, at or below the ceiling
    High,
    /// Above the ceiling by `amount`
    Overflow { amount: f64 },
}

impl fmt::Display for CapacityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityTier::Comfortable => f.write_str("comfortable"),
            CapacityTier::High => f.write_str("high demand"),
            CapacityTier::Overflow { amount } => write!(f, "overflow alert (+{amount:.0})"),
        }
    }
}

/// A forecast for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// Unconstrained linear prediction
    pub raw: f64,
    /// `max(0, raw)`
    pub value: f64,
    /// Whole bowls: `value` truncated, the figure shown and tiered
    pub bowls: u32,
    pub tier: CapacityTier,
    /// The model had warnings; show a caveat alongside the number
    pub degenerate: bool,
}

/// Truncate a non-negative forecast to whole bowls.
pub fn whole_bowls(value: f64) -> f64 {
    value.max(0.0).floor()
}

/// Classify a forecast against the physical ceiling.
///
/// The whole-bowl figure is classified, so 80.4 bowls is shown and tiered
/// as 80.
pub fn classify_capacity(value: f64, capacity: &CapacityConfig) -> CapacityTier {
    let bowls = whole_bowls(value);
    // Compare as a fraction so 68/80 lands exactly on 0.85
    let load = bowls / capacity.ceiling;
    if load <= capacity.high_fraction {
        CapacityTier::Comfortable
    } else if bowls <= capacity.ceiling {
        CapacityTier::High
    } else {
        CapacityTier::Overflow {
            amount: bowls - capacity.ceiling,
        }
    }
}

/// Predict demand for `inputs` using exactly the transformation the model
/// was fitted with.
pub fn predict(model: &FittedModel, inputs: &DayInputs, capacity: &CapacityConfig) -> Forecast {
    let raw = model.linear_predict(inputs);
    let value = raw.max(0.0);
    Forecast {
        raw,
        value,
        bowls: whole_bowls(value) as u32,
        tier: classify_capacity(value, capacity),
        degenerate: model.is_degenerate(),
    }
}
