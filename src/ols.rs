use crate::linalg::faer_ndarray::{KahanSum, LinalgError, svd_least_squares};
use crate::probability::{f_upper_tail_p, student_t_critical, student_t_two_sided_p};
use crate::table::{TableError, WorkingTable};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INTERCEPT: &str = "Intercept";

#[derive(Error, Debug)]
pub enum OlsError {
    #[error("cannot fit a regression on zero observations")]
    Empty,

    #[error("response has {found} rows but the design has {expected}")]
    ResponseLength { expected: usize, found: usize },

    #[error("design has {names} column names but {columns} columns")]
    NameCount { names: usize, columns: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("{n} observations are not enough to estimate {p} coefficients with residual degrees of freedom")]
    InsufficientObservations { n: usize, p: usize },

    #[error("predictor '{0}' is not part of the fitted model")]
    UnknownPredictor(String),

    #[error(transparent)]
    Linalg(#[from] LinalgError),

    #[error(transparent)]
    Table(#[from] TableError),
}

pub fn default_condition_warning_threshold() -> f64 {
    1e10
}

pub fn default_confidence_level() -> f64 {
    0.95
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OlsOptions {
    /// Condition number of the design above which the fit carries a warning.
    #[serde(default = "default_condition_warning_threshold")]
    pub condition_warning_threshold: f64,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

impl Default for OlsOptions {
    fn default() -> Self {
        Self {
            condition_warning_threshold: default_condition_warning_threshold(),
            confidence_level: default_confidence_level(),
        }
    }
}

impl OlsOptions {
    pub fn validate(&self) -> Result<(), crate::config::ConfigError> {
        if !(self.condition_warning_threshold > 1.0) {
            return Err(crate::config::ConfigError::Invalid(format!(
                "condition warning threshold must exceed 1, got {}",
                self.condition_warning_threshold
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(crate::config::ConfigError::Invalid(format!(
                "confidence level must be in (0,1), got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }
}

/// Design matrix with a leading intercept column and named predictors.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignMatrix {
    names: Vec<String>,
    x: Array2<f64>,
}

impl DesignMatrix {
    /// Intercept plus the given predictor columns, in order.
    pub fn with_intercept(
        n_rows: usize,
        predictors: &[(String, ArrayView1<'_, f64>)],
    ) -> Result<Self, OlsError> {
        if n_rows == 0 {
            return Err(OlsError::Empty);
        }
        let p = predictors.len() + 1;
        let mut x = Array2::<f64>::ones((n_rows, p));
        let mut names = Vec::with_capacity(p);
        names.push(INTERCEPT.to_string());
        for (j, (name, values)) in predictors.iter().enumerate() {
            if values.len() != n_rows {
                return Err(OlsError::ResponseLength {
                    expected: n_rows,
                    found: values.len(),
                });
            }
            x.column_mut(j + 1).assign(values);
            names.push(name.clone());
        }
        Ok(Self { names, x })
    }

    /// Builds the design from named numeric columns of a table.
    pub fn from_table(table: &WorkingTable, predictors: &[&str]) -> Result<Self, OlsError> {
        let columns = predictors
            .iter()
            .map(|name| Ok(((*name).to_string(), table.numeric(name)?)))
            .collect::<Result<Vec<_>, TableError>>()?;
        Self::with_intercept(table.n_rows(), &columns)
    }

    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum NumericalWarning {
    IllConditioned { condition_number: f64 },
    RankDeficient { rank: usize, columns: usize },
}

impl std::fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericalWarning::IllConditioned { condition_number } => write!(
                f,
                "design condition number {condition_number:.3e} is large; coefficients may be unstable (near-collinear predictors)"
            ),
            NumericalWarning::RankDeficient { rank, columns } => write!(
                f,
                "design has rank {rank} < {columns} columns; minimum-norm coefficients reported for collinear predictors"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Result of an ordinary least-squares fit. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OlsFit {
    pub names: Vec<String>,
    pub coefficients: Array1<f64>,
    pub std_errors: Array1<f64>,
    pub t_values: Array1<f64>,
    pub p_values: Array1<f64>,
    pub conf_int: Vec<(f64, f64)>,
    pub confidence_level: f64,
    pub fitted: Array1<f64>,
    pub residuals: Array1<f64>,
    pub n_obs: usize,
    pub rank: usize,
    pub df_model: f64,
    pub df_resid: f64,
    pub ssr: f64,
    pub centered_tss: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub sigma: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub durbin_watson: f64,
    pub condition_number: f64,
    pub warnings: Vec<NumericalWarning>,
}

impl OlsFit {
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|j| self.coefficients[j])
    }

    pub fn p_value(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|j| self.p_values[j])
    }

    pub fn coefficient_rows(&self) -> Vec<CoefficientRow> {
        (0..self.names.len())
            .map(|j| CoefficientRow {
                name: self.names[j].clone(),
                estimate: self.coefficients[j],
                std_error: self.std_errors[j],
                t_value: self.t_values[j],
                p_value: self.p_values[j],
                ci_lower: self.conf_int[j].0,
                ci_upper: self.conf_int[j].1,
            })
            .collect()
    }

    /// Prediction at a single point given by predictor name. Predictors not
    /// listed are taken as zero.
    pub fn predict_named(&self, values: &[(&str, f64)]) -> Result<f64, OlsError> {
        let mut acc = self.coefficient(INTERCEPT).unwrap_or(0.0);
        for (name, value) in values {
            let beta = self
                .coefficient(name)
                .ok_or_else(|| OlsError::UnknownPredictor((*name).to_string()))?;
            acc += beta * value;
        }
        Ok(acc)
    }
}

pub fn durbin_watson(residuals: ArrayView1<'_, f64>) -> f64 {
    let denom: KahanSum = residuals.iter().map(|e| e * e).collect();
    let denom = denom.sum();
    if denom <= 0.0 {
        return f64::NAN;
    }
    let num: KahanSum = residuals
        .windows(2)
        .into_iter()
        .map(|w| (w[1] - w[0]).powi(2))
        .collect();
    num.sum() / denom
}

/// Fits `y ~ X` by least squares.
///
/// The solve goes through the SVD: collinear indicator columns produce a
/// minimum-norm solution plus a [`NumericalWarning`] instead of NaNs.
pub fn fit_ols(
    design: &DesignMatrix,
    y: ArrayView1<'_, f64>,
    options: &OlsOptions,
) -> Result<OlsFit, OlsError> {
    let x = design.matrix();
    let (n, p) = x.dim();
    if n == 0 {
        return Err(OlsError::Empty);
    }
    if design.names.len() != p {
        return Err(OlsError::NameCount {
            names: design.names.len(),
            columns: p,
        });
    }
    if y.len() != n {
        return Err(OlsError::ResponseLength {
            expected: n,
            found: y.len(),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(OlsError::NonFinite("design matrix"));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(OlsError::NonFinite("response"));
    }
    if n <= p {
        return Err(OlsError::InsufficientObservations { n, p });
    }

    let solved = svd_least_squares(&x, y)?;
    let beta = solved.solution;
    let fitted = x.dot(&beta);
    let residuals = &y - &fitted;

    let rank = solved.rank;
    let df_resid = (n - rank) as f64;
    let df_model = rank.saturating_sub(1) as f64;

    let ssr = residuals.iter().map(|e| e * e).collect::<KahanSum>().sum();
    let y_mean = y.iter().copied().collect::<KahanSum>().sum() / n as f64;
    let centered_tss = y
        .iter()
        .map(|v| (v - y_mean).powi(2))
        .collect::<KahanSum>()
        .sum();

    let r_squared = if centered_tss > 0.0 {
        (1.0 - ssr / centered_tss).clamp(0.0, 1.0)
    } else {
        log::warn!("[OLS] response has zero variance; R-squared reported as 0");
        0.0
    };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid;

    let sigma2 = ssr / df_resid;
    let sigma = sigma2.sqrt();

    let t_crit = student_t_critical(1.0 - options.confidence_level, df_resid);
    let mut std_errors = Array1::<f64>::zeros(p);
    let mut t_values = Array1::<f64>::zeros(p);
    let mut p_values = Array1::<f64>::zeros(p);
    let mut conf_int = Vec::with_capacity(p);
    for j in 0..p {
        let se = (sigma2 * solved.normal_pinv[[j, j]]).max(0.0).sqrt();
        let t = if se > 0.0 { beta[j] / se } else { f64::NAN };
        std_errors[j] = se;
        t_values[j] = t;
        p_values[j] = student_t_two_sided_p(t, df_resid);
        conf_int.push((beta[j] - t_crit * se, beta[j] + t_crit * se));
    }

    let (f_statistic, f_p_value) = if df_model > 0.0 && r_squared < 1.0 {
        let f = (r_squared / df_model) / ((1.0 - r_squared) / df_resid);
        (f, f_upper_tail_p(f, df_model, df_resid))
    } else {
        (f64::NAN, f64::NAN)
    };

    let nf = n as f64;
    let log_likelihood = if ssr > 0.0 {
        -0.5 * nf * ((2.0 * std::f64::consts::PI).ln() + (ssr / nf).ln() + 1.0)
    } else {
        f64::INFINITY
    };
    let k = rank as f64;
    let aic = -2.0 * log_likelihood + 2.0 * k;
    let bic = -2.0 * log_likelihood + nf.ln() * k;

    let mut warnings = Vec::new();
    if rank < p {
        warnings.push(NumericalWarning::RankDeficient { rank, columns: p });
    }
    if solved.condition_number > options.condition_warning_threshold {
        warnings.push(NumericalWarning::IllConditioned {
            condition_number: solved.condition_number,
        });
    }
    for w in &warnings {
        log::warn!("[OLS] {w}");
    }

    log::debug!(
        "[OLS] n={} p={} rank={} R2={:.6} cond={:.3e}",
        n,
        p,
        rank,
        r_squared,
        solved.condition_number
    );

    Ok(OlsFit {
        names: design.names.clone(),
        coefficients: beta,
        std_errors,
        t_values,
        p_values,
        conf_int,
        confidence_level: options.confidence_level,
        durbin_watson: durbin_watson(residuals.view()),
        fitted,
        residuals,
        n_obs: n,
        rank,
        df_model,
        df_resid,
        ssr,
        centered_tss,
        r_squared,
        adj_r_squared,
        f_statistic,
        f_p_value,
        sigma,
        log_likelihood,
        aic,
        bic,
        condition_number: solved.condition_number,
        warnings,
    })
}
