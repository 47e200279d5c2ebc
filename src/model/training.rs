//! Model fitting and kink-point selection

use ndarray::{Array1, Array2};
use serde::Serialize;

use super::ols::{OlsFit, fit_ols};
use super::{Coefficient, FitWarning, FittedModel, Term};
use crate::error::{PipelineError, Result};
use crate::features::{
    Feature, FeatureRow, FeatureSpec, FeatureTable, KinkSelection, Outcome, TransformParams,
};

/// One row of the kink comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KinkCandidate {
    pub kink: f64,
    pub r_squared: f64,
    pub cold_coef: f64,
    pub hot_coef: f64,
    pub cold_p_value: f64,
    pub hot_p_value: f64,
}

/// Outcome of a kink grid search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KinkReport {
    pub candidates: Vec<KinkCandidate>,
    pub selected: f64,
    /// No candidate produced a finite R²
    pub fell_back: bool,
}

/// Build the design matrix: an intercept column followed by `features`.
pub fn design_matrix(rows: &[FeatureRow], features: &[Feature], params: &TransformParams) -> Array2<f64> {
    let mut x = Array2::<f64>::ones((rows.len(), features.len() + 1));
    for (i, row) in rows.iter().enumerate() {
        for (j, feature) in features.iter().enumerate() {
            x[[i, j + 1]] = row.inputs.value(*feature, params);
        }
    }
    x
}

fn coefficients(ols: &OlsFit, features: &[Feature]) -> Vec<Coefficient> {
    std::iter::once(Term::Intercept)
        .chain(features.iter().copied().map(Term::Feature))
        .enumerate()
        .map(|(j, term)| Coefficient {
            term,
            estimate: ols.coefficients[j],
            std_error: ols.std_errors[j],
            t_value: ols.t_values[j],
            p_value: ols.p_values[j],
            aliased: ols.aliased[j],
        })
        .collect()
}

/// Fit `outcome` on the resolved columns of `spec` with a fixed kink.
///
/// The centering mean is taken from `table`, which must hold exactly the
/// training rows.
pub fn fit_with_kink(
    table: &FeatureTable,
    spec: &FeatureSpec,
    outcome: Outcome,
    kink: Option<f64>,
) -> Result<FittedModel> {
    if spec.uses_kink() && kink.is_none() {
        return Err(PipelineError::KinkRequired);
    }

    let features = spec.resolve(table);
    let params = TransformParams {
        temp_mean: table.temp_mean(),
        kink,
    };

    let x = design_matrix(table.rows(), &features, &params);
    let y = Array1::from_vec(table.targets(outcome));
    let ols = fit_ols(&x, &y)?;

    let coefficients = coefficients(&ols, &features);
    let mut warnings = Vec::new();
    if ols.has_aliased() {
        let terms: Vec<String> = coefficients
            .iter()
            .filter(|c| c.aliased)
            .map(|c| c.term.to_string())
            .collect();
        warnings.push(FitWarning::RankDeficient { terms });
    }

    Ok(FittedModel {
        spec: spec.clone(),
        outcome,
        features,
        params,
        coefficients,
        nobs: ols.nobs,
        df_resid: ols.df_resid,
        r_squared: ols.r_squared,
        adj_r_squared: ols.adj_r_squared,
        f_statistic: ols.f_statistic,
        f_p_value: ols.f_p_value,
        mse_resid: ols.mse_resid,
        fitted: ols.fitted,
        residuals: ols.residuals,
        warnings,
        kink_report: None,
    })
}

fn candidate_from(model: &FittedModel, kink: f64) -> KinkCandidate {
    let cold = model.coefficient(Term::Feature(Feature::TempCold));
    let hot = model.coefficient(Term::Feature(Feature::TempHot));
    KinkCandidate {
        kink,
        r_squared: model.r_squared,
        cold_coef: cold.map_or(f64::NAN, |c| c.estimate),
        hot_coef: hot.map_or(f64::NAN, |c| c.estimate),
        cold_p_value: cold.map_or(f64::NAN, |c| c.p_value),
        hot_p_value: hot.map_or(f64::NAN, |c| c.p_value),
    }
}

/// Grid search over `candidates`, keeping the first strictly best R².
pub fn search_kink(
    table: &FeatureTable,
    spec: &FeatureSpec,
    outcome: Outcome,
    candidates: &[f64],
    default: f64,
) -> Result<KinkReport> {
    let mut rows = Vec::with_capacity(candidates.len());
    let mut best: Option<(f64, f64)> = None;

    for &kink in candidates {
        let model = fit_with_kink(table, spec, outcome, Some(kink))?;
        tracing::debug!("kink {}: R² = {:.4}", kink, model.r_squared);

        if model.r_squared.is_finite() && best.is_none_or(|(_, r2)| model.r_squared > r2) {
            best = Some((kink, model.r_squared));
        }
        rows.push(candidate_from(&model, kink));
    }

    let report = match best {
        Some((selected, _)) => KinkReport {
            candidates: rows,
            selected,
            fell_back: false,
        },
        None => KinkReport {
            candidates: rows,
            selected: default,
            fell_back: true,
        },
    };

    Ok(report)
}

/// Fit `outcome` under `spec`, running the kink search when the
/// specification asks for one.
pub fn fit_outcome(table: &FeatureTable, spec: &FeatureSpec, outcome: Outcome) -> Result<FittedModel> {
    if !spec.uses_kink() {
        return fit_with_kink(table, spec, outcome, None);
    }

    match &spec.kink {
        None => Err(PipelineError::KinkRequired),
        Some(KinkSelection::Fixed(kink)) => fit_with_kink(table, spec, outcome, Some(*kink)),
        Some(KinkSelection::Search {
            candidates,
            default,
        }) => {
            let report = search_kink(table, spec, outcome, candidates, *default)?;
            let mut model = fit_with_kink(table, spec, outcome, Some(report.selected))?;

            if report.fell_back {
                tracing::warn!("kink search found no finite R²; using default {}", report.selected);
                model.warnings.push(FitWarning::KinkFallback {
                    kink: report.selected,
                });
            } else {
                tracing::info!(
                    "Selected kink {}°F (R² = {:.4})",
                    report.selected,
                    model.r_squared
                );
            }

            model.kink_report = Some(report);
            Ok(model)
        }
    }
}

/// Fit the primary outcome (bowls sold).
pub fn fit(table: &FeatureTable, spec: &FeatureSpec) -> Result<FittedModel> {
    let model = fit_outcome(table, spec, Outcome::BowlsSold)?;

    for warning in &model.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        "Fitted '{}' on {} days: R² = {:.3}, adj. R² = {:.3}",
        spec.name,
        model.nobs,
        model.r_squared,
        model.adj_r_squared
    );

    Ok(model)
}
