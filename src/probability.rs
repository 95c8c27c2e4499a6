use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Standard normal PDF φ(x).
#[inline]
pub fn normal_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF Φ(x) using a stable Abramowitz-Stegun-style approximation.
#[inline]
pub fn normal_cdf_approx(x: f64) -> f64 {
    let z = x.abs().clamp(0.0, 30.0);
    let t = 1.0 / (1.0 + 0.231_641_9 * z);
    let poly = (((((1.330_274_429 * t - 1.821_255_978) * t) + 1.781_477_937) * t - 0.356_563_782)
        * t
        + 0.319_381_530)
        * t;
    let cdf_pos = 1.0 - normal_pdf(z) * poly;
    if x >= 0.0 { cdf_pos } else { 1.0 - cdf_pos }
}

/// Upper-tail probability 1 − Φ(z).
#[inline]
pub fn normal_upper_tail(z: f64) -> f64 {
    normal_cdf_approx(-z)
}

/// Standard normal quantile Φ⁻¹(p) using Acklam's rational approximation.
#[inline]
pub fn standard_normal_quantile(p: f64) -> Result<f64, String> {
    if !(p.is_finite() && p > 0.0 && p < 1.0) {
        return Err(format!("normal quantile requires p in (0,1), got {p}"));
    }

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    Ok(x)
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
///
/// Returns NaN when the statistic or the degrees of freedom are unusable.
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() || !(df > 0.0) {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Two-sided critical value t_{1-α/2, df}.
pub fn student_t_critical(alpha: f64, df: f64) -> f64 {
    if !(alpha > 0.0 && alpha < 1.0) || !(df > 0.0) {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist.inverse_cdf(1.0 - alpha / 2.0),
        Err(_) => f64::NAN,
    }
}

/// Upper-tail p-value of an F statistic.
pub fn f_upper_tail_p(f: f64, df_num: f64, df_den: f64) -> f64 {
    if !f.is_finite() || f < 0.0 || !(df_num > 0.0) || !(df_den > 0.0) {
        return f64::NAN;
    }
    match FisherSnedecor::new(df_num, df_den) {
        Ok(dist) => dist.sf(f).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normal_quantile_inverts_cdf() {
        for &p in &[0.01, 0.1, 0.5, 0.8, 0.975] {
            let z = standard_normal_quantile(p).expect("valid p");
            assert_abs_diff_eq!(normal_cdf_approx(z), p, epsilon = 1e-6);
        }
        assert!(standard_normal_quantile(0.0).is_err());
        assert!(standard_normal_quantile(1.0).is_err());
    }

    #[test]
    fn student_t_p_values_match_reference_points() {
        // t = 2.228 is the 97.5% quantile at 10 degrees of freedom.
        assert_abs_diff_eq!(student_t_two_sided_p(2.228, 10.0), 0.05, epsilon = 1e-3);
        assert_abs_diff_eq!(student_t_two_sided_p(0.0, 10.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(student_t_critical(0.05, 10.0), 2.228, epsilon = 1e-3);
        assert!(student_t_two_sided_p(1.0, 0.0).is_nan());
    }

    #[test]
    fn f_upper_tail_matches_reference_point() {
        // F(1, 10) 95% quantile is 4.965.
        assert_abs_diff_eq!(f_upper_tail_p(4.965, 1.0, 10.0), 0.05, epsilon = 1e-3);
    }
}
