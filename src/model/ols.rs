//! Ordinary least squares via the normal equations.
//!
//! `X'X` is factored with a Cholesky decomposition that walks the columns in
//! order and skips any column whose remaining pivot is numerically zero.
//! Skipped columns are linear combinations of earlier ones (or constant
//! zero); they are reported as aliased with `NaN` estimates instead of being
//! forced to zero.

use ndarray::{Array1, Array2, ArrayView1};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::{PipelineError, Result};

/// Relative pivot size below which a column is treated as aliased.
const ALIAS_TOLERANCE: f64 = 1e-10;

/// Estimates and inference statistics for one least-squares fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub aliased: Vec<bool>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub nobs: usize,
    /// Number of identified columns, intercept included
    pub rank: usize,
    pub df_resid: f64,
    pub df_model: f64,
    pub ssr: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    /// SSR / df_resid
    pub mse_resid: f64,
}

impl OlsFit {
    pub fn has_aliased(&self) -> bool {
        self.aliased.iter().any(|a| *a)
    }

    /// Linear prediction for one design row. Aliased columns contribute
    /// nothing.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.coefficients
            .iter()
            .zip(row.iter())
            .filter(|(b, _)| !b.is_nan())
            .map(|(b, x)| b * x)
            .sum()
    }
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    StudentsT::new(0.0, 1.0, df).map_or(f64::NAN, |dist| (2.0 * dist.sf(t.abs())).min(1.0))
}

/// Upper-tail p-value of an F statistic with `(d1, d2)` degrees of freedom.
pub fn f_upper_p(f: f64, d1: f64, d2: f64) -> f64 {
    if f.is_nan() || d1.is_nan() || d2.is_nan() || d1 <= 0.0 || d2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    FisherSnedecor::new(d1, d2).map_or(f64::NAN, |dist| dist.sf(f))
}

/// Lower-triangular factor of `X'X` restricted to the identified columns.
struct PivotedCholesky {
    /// Identified column indices, in column order
    kept: Vec<usize>,
    l: Array2<f64>,
}

impl PivotedCholesky {
    fn factor(xtx: &Array2<f64>) -> Self {
        let p = xtx.nrows();
        let mut kept: Vec<usize> = Vec::with_capacity(p);
        let mut l = Array2::<f64>::zeros((p, p));

        for j in 0..p {
            let r = kept.len();
            let mut row = vec![0.0; r];
            for a in 0..r {
                let i = kept[a];
                let mut sum = xtx[[j, i]];
                for b in 0..a {
                    sum -= row[b] * l[[a, b]];
                }
                row[a] = sum / l[[a, a]];
            }

            let diag = xtx[[j, j]];
            let pivot = diag - row.iter().map(|v| v * v).sum::<f64>();
            if diag <= 0.0 || pivot <= ALIAS_TOLERANCE * diag {
                continue;
            }

            for (b, v) in row.into_iter().enumerate() {
                l[[r, b]] = v;
            }
            l[[r, r]] = pivot.sqrt();
            kept.push(j);
        }

        let r = kept.len();
        let l = l.slice(ndarray::s![..r, ..r]).to_owned();
        Self { kept, l }
    }

    fn rank(&self) -> usize {
        self.kept.len()
    }

    /// Solve `L L' x = b` for the identified columns.
    fn solve(&self, b: &Array1<f64>) -> Array1<f64> {
        let r = self.rank();
        let mut z = Array1::<f64>::zeros(r);
        for i in 0..r {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.l[[i, k]] * z[k];
            }
            z[i] = sum / self.l[[i, i]];
        }

        let mut x = Array1::<f64>::zeros(r);
        for i in (0..r).rev() {
            let mut sum = z[i];
            for k in (i + 1)..r {
                sum -= self.l[[k, i]] * x[k];
            }
            x[i] = sum / self.l[[i, i]];
        }
        x
    }

    /// Diagonal of `(X'X)^-1` for the identified columns.
    fn inverse_diagonal(&self) -> Vec<f64> {
        let r = self.rank();
        // Columns of L^-1 by forward substitution
        let mut inv = Array2::<f64>::zeros((r, r));
        for c in 0..r {
            for i in c..r {
                let mut sum = if i == c { 1.0 } else { 0.0 };
                for k in c..i {
                    sum -= self.l[[i, k]] * inv[[k, c]];
                }
                inv[[i, c]] = sum / self.l[[i, i]];
            }
        }
        // (L L')^-1 = L^-T L^-1, whose diagonal is the column norms of L^-1
        (0..r)
            .map(|c| inv.column(c).iter().map(|v| v * v).sum())
            .collect()
    }
}

/// Fit `y ~ X` by least squares. `x` must already contain the intercept
/// column.
pub fn fit_ols(x: &Array2<f64>, y: &Array1<f64>) -> Result<OlsFit> {
    let (n, p) = x.dim();
    if n == 0 || p == 0 {
        return Err(PipelineError::InsufficientData {
            needed: p + 1,
            got: n,
        });
    }

    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    let chol = PivotedCholesky::factor(&xtx);
    let rank = chol.rank();

    if n <= rank {
        return Err(PipelineError::InsufficientData {
            needed: rank + 1,
            got: n,
        });
    }

    let rhs = Array1::from_iter(chol.kept.iter().map(|&j| xty[j]));
    let beta_kept = chol.solve(&rhs);

    let mut coefficients = vec![f64::NAN; p];
    let mut aliased = vec![true; p];
    for (pos, &j) in chol.kept.iter().enumerate() {
        coefficients[j] = beta_kept[pos];
        aliased[j] = false;
    }

    let fitted: Vec<f64> = x
        .rows()
        .into_iter()
        .map(|row| {
            chol.kept
                .iter()
                .enumerate()
                .map(|(pos, &j)| beta_kept[pos] * row[j])
                .sum()
        })
        .collect();
    let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();

    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    let y_mean = y.mean().unwrap_or(0.0);
    let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    let df_resid = (n - rank) as f64;
    let df_model = rank.saturating_sub(1) as f64;
    let mse_resid = ssr / df_resid;

    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid;
    let f_statistic = if df_model > 0.0 {
        ((sst - ssr) / df_model) / mse_resid
    } else {
        f64::NAN
    };
    let f_p_value = f_upper_p(f_statistic, df_model, df_resid);

    let inv_diag = chol.inverse_diagonal();
    let mut std_errors = vec![f64::NAN; p];
    let mut t_values = vec![f64::NAN; p];
    let mut p_values = vec![f64::NAN; p];
    for (pos, &j) in chol.kept.iter().enumerate() {
        let se = (mse_resid * inv_diag[pos]).sqrt();
        let t = coefficients[j] / se;
        std_errors[j] = se;
        t_values[j] = t;
        p_values[j] = t_two_sided_p(t, df_resid);
    }

    Ok(OlsFit {
        coefficients,
        std_errors,
        t_values,
        p_values,
        aliased,
        fitted,
        residuals,
        nobs: n,
        rank,
        df_resid,
        df_model,
        ssr,
        r_squared,
        adj_r_squared,
        f_statistic,
        f_p_value,
        mse_resid,
    })
}
