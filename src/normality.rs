//! Normality tests for regression residuals.
//!
//! Shapiro-Wilk follows Royston's (1995) AS R94 approximation for the
//! coefficients and the p-value; Shapiro-Francia uses Royston's (1993)
//! log-normal approximation of the statistic.

use crate::linalg::faer_ndarray::KahanSum;
use crate::probability::{normal_upper_tail, standard_normal_quantile};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_SAMPLE_SIZE: usize = 5000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalityError {
    #[error("{method} needs at least {min} observations, got {found}")]
    TooFewObservations {
        method: &'static str,
        min: usize,
        found: usize,
    },

    #[error("{method} supports at most {max} observations, got {found}")]
    TooManyObservations {
        method: &'static str,
        max: usize,
        found: usize,
    },

    #[error("sample contains non-finite values")]
    NonFinite,

    #[error("sample has zero range; normality is undefined")]
    ZeroRange,

    #[error("normal quantile evaluation failed: {0}")]
    Quantile(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormalityMethod {
    #[default]
    ShapiroWilk,
    ShapiroFrancia,
}

impl NormalityMethod {
    pub fn label(self) -> &'static str {
        match self {
            NormalityMethod::ShapiroWilk => "Shapiro-Wilk",
            NormalityMethod::ShapiroFrancia => "Shapiro-Francia",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NormalityDecision {
    RejectNormality,
    FailToReject,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalityTest {
    pub method: NormalityMethod,
    pub statistic: f64,
    pub p_value: f64,
    pub n: usize,
}

impl NormalityTest {
    /// Rejects normality when `p < alpha`.
    pub fn decision(&self, alpha: f64) -> NormalityDecision {
        if self.p_value < alpha {
            NormalityDecision::RejectNormality
        } else {
            NormalityDecision::FailToReject
        }
    }

    pub fn describe(&self, alpha: f64) -> String {
        match self.decision(alpha) {
            NormalityDecision::RejectNormality => format!(
                "{}: W={:.4}, p={:.4} < {alpha}: residuals are not normally distributed (reject H0)",
                self.method.label(),
                self.statistic,
                self.p_value
            ),
            NormalityDecision::FailToReject => format!(
                "{}: W={:.4}, p={:.4} >= {alpha}: no evidence against normality (fail to reject H0)",
                self.method.label(),
                self.statistic,
                self.p_value
            ),
        }
    }
}

pub fn normality_test(
    sample: ArrayView1<'_, f64>,
    method: NormalityMethod,
) -> Result<NormalityTest, NormalityError> {
    match method {
        NormalityMethod::ShapiroWilk => shapiro_wilk(sample),
        NormalityMethod::ShapiroFrancia => shapiro_francia(sample),
    }
}

#[inline]
fn poly(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn sorted_checked(
    sample: ArrayView1<'_, f64>,
    method: &'static str,
    min: usize,
) -> Result<Vec<f64>, NormalityError> {
    let n = sample.len();
    if n < min {
        return Err(NormalityError::TooFewObservations {
            method,
            min,
            found: n,
        });
    }
    if n > MAX_SAMPLE_SIZE {
        return Err(NormalityError::TooManyObservations {
            method,
            max: MAX_SAMPLE_SIZE,
            found: n,
        });
    }
    if sample.iter().any(|v| !v.is_finite()) {
        return Err(NormalityError::NonFinite);
    }
    let mut x = sample.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));
    if x[n - 1] - x[0] <= f64::EPSILON * x[n - 1].abs().max(1.0) {
        return Err(NormalityError::ZeroRange);
    }
    Ok(x)
}

/// Blom-type expected normal order statistics `Φ⁻¹((i − 3/8)/(n + 1/4))`.
fn normal_scores(n: usize) -> Result<Vec<f64>, NormalityError> {
    let nf = n as f64;
    (1..=n)
        .map(|i| {
            standard_normal_quantile((i as f64 - 0.375) / (nf + 0.25))
                .map_err(NormalityError::Quantile)
        })
        .collect()
}

fn centered_sum_of_squares(x: &[f64]) -> f64 {
    let mean = x.iter().copied().collect::<KahanSum>().sum() / x.len() as f64;
    x.iter().map(|v| (v - mean).powi(2)).collect::<KahanSum>().sum()
}

/// Shapiro-Wilk W test, valid for 3 ≤ n ≤ 5000.
pub fn shapiro_wilk(sample: ArrayView1<'_, f64>) -> Result<NormalityTest, NormalityError> {
    const METHOD: &str = "Shapiro-Wilk";
    const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
    const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
    const C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
    const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
    const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
    const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
    const G: [f64; 2] = [-2.273, 0.459];

    let x = sorted_checked(sample, METHOD, 3)?;
    let n = x.len();
    let nf = n as f64;

    // Antisymmetric coefficients a_i; only the upper half is computed.
    let mut a = vec![0.0; n];
    if n == 3 {
        a[0] = -std::f64::consts::FRAC_1_SQRT_2;
        a[2] = std::f64::consts::FRAC_1_SQRT_2;
    } else {
        let m = normal_scores(n)?;
        let summ2: f64 = m.iter().map(|v| v * v).sum();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / nf.sqrt();
        let a_n = poly(&C1, rsn) + m[n - 1] / ssumm2;

        let (first_free, phi) = if n > 5 {
            let a_n1 = poly(&C2, rsn) + m[n - 2] / ssumm2;
            a[n - 1] = a_n;
            a[n - 2] = a_n1;
            let phi = (summ2 - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
                / (1.0 - 2.0 * a_n.powi(2) - 2.0 * a_n1.powi(2));
            (2, phi)
        } else {
            a[n - 1] = a_n;
            let phi = (summ2 - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * a_n.powi(2));
            (1, phi)
        };
        let scale = phi.sqrt();
        for i in first_free..n - first_free {
            a[i] = m[i] / scale;
        }
        for i in 0..first_free {
            a[i] = -a[n - 1 - i];
        }
    }

    let numerator = x.iter().zip(a.iter()).map(|(xi, ai)| xi * ai).sum::<f64>();
    let ssq = centered_sum_of_squares(&x);
    let w = (numerator * numerator / ssq).clamp(0.0, 1.0);

    let p_value = if n == 3 {
        const STQR: f64 = 1.047_197_551_196_597_6; // asin(sqrt(3/4)) = π/3
        let pi6 = 6.0 / std::f64::consts::PI;
        (pi6 * (w.sqrt().asin() - STQR)).clamp(0.0, 1.0)
    } else {
        let w1 = (1.0 - w).max(f64::MIN_POSITIVE).ln();
        let z = if n <= 11 {
            let gamma = poly(&G, nf);
            let mean = poly(&C3, nf);
            let sd = poly(&C4, nf).exp();
            if w1 >= gamma {
                // Outside the approximation's support: W is tiny.
                return Ok(NormalityTest {
                    method: NormalityMethod::ShapiroWilk,
                    statistic: w,
                    p_value: 1e-99,
                    n,
                });
            }
            (-(gamma - w1).ln() - mean) / sd
        } else {
            let ln_n = nf.ln();
            let mean = poly(&C5, ln_n);
            let sd = poly(&C6, ln_n).exp();
            (w1 - mean) / sd
        };
        normal_upper_tail(z).clamp(0.0, 1.0)
    };

    log::debug!("[Normality] Shapiro-Wilk n={} W={:.6} p={:.6}", n, w, p_value);

    Ok(NormalityTest {
        method: NormalityMethod::ShapiroWilk,
        statistic: w,
        p_value,
        n,
    })
}

/// Shapiro-Francia W' test, valid for 5 ≤ n ≤ 5000.
pub fn shapiro_francia(sample: ArrayView1<'_, f64>) -> Result<NormalityTest, NormalityError> {
    const METHOD: &str = "Shapiro-Francia";
    let x = sorted_checked(sample, METHOD, 5)?;
    let n = x.len();
    let nf = n as f64;

    let m = normal_scores(n)?;
    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_m = m.iter().sum::<f64>() / nf;
    let sxm: f64 = x
        .iter()
        .zip(m.iter())
        .map(|(xi, mi)| (xi - mean_x) * (mi - mean_m))
        .sum();
    let smm: f64 = m.iter().map(|mi| (mi - mean_m).powi(2)).sum();
    let sxx = centered_sum_of_squares(&x);
    let w = (sxm * sxm / (sxx * smm)).clamp(0.0, 1.0);

    let u = nf.ln();
    let v = u.ln();
    let mu = -1.2725 + 1.0521 * (v - u);
    let sigma = 1.0308 - 0.26758 * (v + 2.0 / u);
    let z = ((1.0 - w).max(f64::MIN_POSITIVE).ln() - mu) / sigma;
    let p_value = normal_upper_tail(z).clamp(0.0, 1.0);

    log::debug!("[Normality] Shapiro-Francia n={} W'={:.6} p={:.6}", n, w, p_value);

    Ok(NormalityTest {
        method: NormalityMethod::ShapiroFrancia,
        statistic: w,
        p_value,
        n,
    })
}
