//! Box-Cox power transform with a maximum-likelihood λ.

use crate::linalg::faer_ndarray::KahanSum;
use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use thiserror::Error;

/// Below this |λ| the logarithmic limit of the transform is used.
const LAMBDA_ZERO_TOL: f64 = 1e-8;
const BRENT_TOL: f64 = 1.48e-8;
const BRENT_MAX_ITER: usize = 500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoxCoxError {
    #[error("Box-Cox requires strictly positive data, found {value} at index {index}")]
    NonPositive { index: usize, value: f64 },

    #[error("Box-Cox requires at least two observations, got {0}")]
    TooFewObservations(usize),

    #[error("Box-Cox likelihood is undefined for constant data")]
    ConstantData,

    #[error("transformed value {value} has no preimage for lambda {lambda}")]
    InverseOutOfDomain { value: f64, lambda: f64 },

    #[error("invalid lambda search interval ({0}, {1})")]
    InvalidBounds(f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxCoxFit {
    pub lambda: f64,
    pub log_likelihood: f64,
    pub iterations: usize,
    /// The optimum sits on an edge of the search interval.
    pub at_bound: bool,
}

/// Domain check performed before any transformation.
pub fn check_positive(y: ArrayView1<'_, f64>) -> Result<(), BoxCoxError> {
    match y
        .iter()
        .enumerate()
        .find(|(_, v)| !(v.is_finite() && **v > 0.0))
    {
        Some((index, &value)) => Err(BoxCoxError::NonPositive { index, value }),
        None => Ok(()),
    }
}

#[inline]
fn transform_value(y: f64, lambda: f64) -> f64 {
    if lambda.abs() < LAMBDA_ZERO_TOL {
        y.ln()
    } else {
        (lambda * y.ln()).exp_m1() / lambda
    }
}

fn population_variance(values: impl Iterator<Item = f64> + Clone, n: f64) -> f64 {
    let mean = values.clone().collect::<KahanSum>().sum() / n;
    values.map(|v| (v - mean).powi(2)).collect::<KahanSum>().sum() / n
}

/// Profile log-likelihood `(λ−1)Σln y − n/2·ln σ̂²(y_λ)` for positive `y`.
pub fn boxcox_log_likelihood(y: ArrayView1<'_, f64>, lambda: f64) -> f64 {
    let n = y.len() as f64;
    let sum_log = y.iter().map(|v| v.ln()).collect::<KahanSum>().sum();

    let log_var = if lambda.abs() < LAMBDA_ZERO_TOL {
        population_variance(y.iter().map(|v| v.ln()), n).ln()
    } else {
        // var(y_λ) = var(y^λ)/λ²; scale by the largest power to avoid overflow.
        let log_max = y
            .iter()
            .map(|v| lambda * v.ln())
            .fold(f64::NEG_INFINITY, f64::max);
        let scaled = y.iter().map(move |v| (lambda * v.ln() - log_max).exp());
        population_variance(scaled, n).ln() + 2.0 * log_max - 2.0 * lambda.abs().ln()
    };

    (lambda - 1.0) * sum_log - 0.5 * n * log_var
}

#[derive(Debug, Clone, Copy)]
pub struct BrentResult {
    pub x: f64,
    pub fx: f64,
    pub iterations: usize,
}

/// Bounded Brent minimization (golden section with parabolic steps).
pub fn brent_minimize<F: Fn(f64) -> f64>(
    f: F,
    lo: f64,
    hi: f64,
    tol: f64,
    max_iter: usize,
) -> BrentResult {
    const GOLDEN: f64 = 0.381_966_011_250_105_1;
    let sqrt_eps = f64::EPSILON.sqrt();

    let (mut a, mut b) = (lo, hi);
    let mut x = a + GOLDEN * (b - a);
    let (mut w, mut v) = (x, x);
    let mut fx = f(x);
    let (mut fw, mut fv) = (fx, fx);
    let (mut d, mut e) = (0.0_f64, 0.0_f64);
    let mut iterations = 0;

    while iterations < max_iter {
        let xm = 0.5 * (a + b);
        let tol1 = sqrt_eps * x.abs() + tol / 3.0;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }
        iterations += 1;

        let mut golden_step = true;
        if e.abs() > tol1 {
            let mut r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = d;
            if p.abs() < (0.5 * q * r).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if (u - a) < tol2 || (b - u) < tol2 {
                    d = if xm >= x { tol1 } else { -tol1 };
                }
                golden_step = false;
            }
        }
        if golden_step {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d >= 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    BrentResult { x, fx, iterations }
}

/// Maximum-likelihood λ within `bounds`.
pub fn fit_lambda(y: ArrayView1<'_, f64>, bounds: (f64, f64)) -> Result<BoxCoxFit, BoxCoxError> {
    let (lo, hi) = bounds;
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(BoxCoxError::InvalidBounds(lo, hi));
    }
    check_positive(y)?;
    if y.len() < 2 {
        return Err(BoxCoxError::TooFewObservations(y.len()));
    }
    let first = y[0];
    if y.iter().all(|v| *v == first) {
        return Err(BoxCoxError::ConstantData);
    }

    let result = brent_minimize(
        |lambda| -boxcox_log_likelihood(y, lambda),
        lo,
        hi,
        BRENT_TOL,
        BRENT_MAX_ITER,
    );
    let span = hi - lo;
    let at_bound = (result.x - lo) < 1e-6 * span || (hi - result.x) < 1e-6 * span;
    if at_bound {
        log::warn!(
            "[BoxCox] optimum lambda={:.6} lies on the search bound ({}, {}); widen the interval",
            result.x,
            lo,
            hi
        );
    }
    log::debug!(
        "[BoxCox] lambda={:.6} llf={:.6} iterations={}",
        result.x,
        -result.fx,
        result.iterations
    );

    Ok(BoxCoxFit {
        lambda: result.x,
        log_likelihood: -result.fx,
        iterations: result.iterations,
        at_bound,
    })
}

pub fn boxcox_transform(y: ArrayView1<'_, f64>, lambda: f64) -> Result<Array1<f64>, BoxCoxError> {
    check_positive(y)?;
    Ok(y.mapv(|v| transform_value(v, lambda)))
}

/// Fits λ and transforms in one step.
pub fn boxcox(
    y: ArrayView1<'_, f64>,
    bounds: (f64, f64),
) -> Result<(Array1<f64>, BoxCoxFit), BoxCoxError> {
    let fit = fit_lambda(y, bounds)?;
    let transformed = boxcox_transform(y, fit.lambda)?;
    Ok((transformed, fit))
}

pub fn inverse_boxcox(value: f64, lambda: f64) -> Result<f64, BoxCoxError> {
    if lambda.abs() < LAMBDA_ZERO_TOL {
        return Ok(value.exp());
    }
    let base = lambda * value + 1.0;
    if !(base > 0.0) {
        return Err(BoxCoxError::InverseOutOfDomain { value, lambda });
    }
    Ok((base.ln() / lambda).exp())
}
