//! Linear demand model
//!
//! Fitting, kink selection and prediction for the daily bowl regression.

pub mod ols;
pub mod predictor;
pub mod training;

use std::fmt;

use serde::Serialize;

use crate::features::{DayInputs, Feature, FeatureSpec, Outcome, TransformParams};

pub use ols::{OlsFit, f_upper_p, fit_ols, t_two_sided_p};
pub use predictor::{CapacityTier, Forecast, classify_capacity, predict, whole_bowls};
pub use training::{KinkCandidate, KinkReport, fit, fit_outcome, fit_with_kink, search_kink};

/// A row of the coefficient table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Term {
    Intercept,
    Feature(Feature),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Intercept => f.write_str("const"),
            Term::Feature(feature) => write!(f, "{feature}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: Term,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    /// Linearly dependent on earlier columns; estimates are `NaN`
    pub aliased: bool,
}

impl Coefficient {
    /// Conventional significance stars for the p-value.
    pub fn significance(&self) -> &'static str {
        significance_code(self.p_value)
    }
}

pub fn significance_code(p: f64) -> &'static str {
    match p {
        p if p < 0.001 => "***",
        p if p < 0.01 => "**",
        p if p < 0.05 => "*",
        p if p < 0.1 => ".",
        _ => "",
    }
}

/// Conditions that make a fit usable but suspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FitWarning {
    /// These columns could not be identified from the data
    RankDeficient { terms: Vec<String> },
    /// No kink candidate produced a finite R²
    KinkFallback { kink: f64 },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::RankDeficient { terms } => write!(
                f,
                "design matrix is rank deficient; undefined coefficients for {}",
                terms.join(", ")
            ),
            FitWarning::KinkFallback { kink } => write!(
                f,
                "no kink candidate produced a finite R²; using default kink {kink}"
            ),
        }
    }
}

/// A fitted regression together with everything needed to reproduce its
/// transformation on new days.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub spec: FeatureSpec,
    pub outcome: Outcome,
    /// Resolved columns, year dummies included, in design-matrix order
    pub features: Vec<Feature>,
    pub params: TransformParams,
    pub coefficients: Vec<Coefficient>,
    pub nobs: usize,
    pub df_resid: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub mse_resid: f64,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub warnings: Vec<FitWarning>,
    pub kink_report: Option<KinkReport>,
}

impl FittedModel {
    pub fn coefficient(&self, term: Term) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    pub fn intercept(&self) -> f64 {
        self.coefficient(Term::Intercept)
            .map_or(f64::NAN, |c| c.estimate)
    }

    /// Square root of the residual mean square.
    pub fn residual_std_error(&self) -> f64 {
        self.mse_resid.sqrt()
    }

    /// True when any coefficient is undefined or a fallback was used.
    pub fn is_degenerate(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Design-matrix row for `inputs`, intercept first.
    pub fn design_row(&self, inputs: &DayInputs) -> Vec<f64> {
        std::iter::once(1.0)
            .chain(self.features.iter().map(|f| inputs.value(*f, &self.params)))
            .collect()
    }

    /// Unclamped linear prediction. Aliased coefficients are skipped.
    pub fn linear_predict(&self, inputs: &DayInputs) -> f64 {
        self.coefficients
            .iter()
            .zip(self.design_row(inputs))
            .filter(|(c, _)| !c.aliased)
            .map(|(c, x)| c.estimate * x)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significance_codes() {
        assert_eq!(significance_code(0.0005), "***");
        assert_eq!(significance_code(0.005), "**");
        assert_eq!(significance_code(0.03), "*");
        assert_eq!(significance_code(0.07), ".");
        assert_eq!(significance_code(0.5), "");
        assert_eq!(significance_code(f64::NAN), "");
    }

    #[test]
    fn test_term_display() {
        assert_eq!(Term::Intercept.to_string(), "const");
        assert_eq!(Term::Feature(Feature::Weekend).to_string(), "is_weekend");
        assert_eq!(Term::Feature(Feature::Year(2024)).to_string(), "year_2024");
    }

    #[test]
    fn test_fit_warning_messages() {
        let warning = FitWarning::RankDeficient {
            terms: vec!["is_school_break".to_string()],
        };
        assert!(warning.to_string().contains("is_school_break"));
        assert!(FitWarning::KinkFallback { kink: 60.0 }.to_string().contains("60"));
    }
}
