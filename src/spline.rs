//! Interpolating B-splines over a handful of (x, y) pairs.

use crate::linalg::faer_ndarray::{LinalgError, svd_least_squares};
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use thiserror::Error;

/// Upper bound on the number of points of an evaluation grid.
pub const MAX_GRID_POINTS: usize = 1_000_000;

#[derive(Error, Debug)]
pub enum SplineError {
    #[error(
        "a degree-{degree} spline needs at least {required} points, but only {provided} were provided"
    )]
    InsufficientData {
        degree: usize,
        required: usize,
        provided: usize,
    },

    #[error("abscissae must be strictly increasing; violated at index {index}")]
    InvalidAbscissae { index: usize },

    #[error("spline degree must be at least 1, got {0}")]
    InvalidDegree(usize),

    #[error("x has {x} points but y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("non-finite value in spline input")]
    NonFinite,

    #[error("grid step {0} must be positive and give at most {max} points", max = MAX_GRID_POINTS)]
    InvalidStep(f64),

    #[error("interpolation system is singular (rank {rank} of {size})")]
    SingularSystem { rank: usize, size: usize },

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// Clamped B-spline passing through every input point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterpolatingSpline {
    degree: usize,
    knots: Array1<f64>,
    coefficients: Array1<f64>,
}

/// Evenly spaced evaluation of a spline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SplineGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Knots for interpolation at `x`: boundary knots repeated `degree + 1`
/// times, interior knots at data points (odd degree) or at midpoints of
/// consecutive data points (even degree).
pub fn interpolation_knots(x: ArrayView1<'_, f64>, degree: usize) -> Array1<f64> {
    let m = x.len();
    let first = x[0];
    let last = x[m - 1];
    let interior = m - degree - 1;
    let half = degree / 2;

    let mut knots = Vec::with_capacity(m + degree + 1);
    knots.extend(std::iter::repeat_n(first, degree + 1));
    for l in 0..interior {
        let knot = if degree % 2 == 1 {
            x[half + 1 + l]
        } else {
            0.5 * (x[half + l] + x[half + 1 + l])
        };
        knots.push(knot);
    }
    knots.extend(std::iter::repeat_n(last, degree + 1));
    Array1::from_vec(knots)
}

/// Knot span `mu` with `knots[mu] <= x < knots[mu + 1]`, clamped to the
/// valid range so boundary points use the outermost polynomial piece.
fn find_span(x: f64, knots: ArrayView1<'_, f64>, degree: usize) -> usize {
    let num_basis = knots.len() - degree - 1;
    if x >= knots[num_basis] {
        num_basis - 1
    } else if x < knots[degree] {
        degree
    } else {
        let mut span = degree;
        while span < num_basis && x >= knots[span + 1] {
            span += 1;
        }
        span
    }
}

/// Values of all B-spline basis functions at `x` (Cox-de Boor recursion).
pub fn basis_row(x: f64, knots: ArrayView1<'_, f64>, degree: usize) -> Array1<f64> {
    let num_basis = knots.len() - degree - 1;
    let mu = find_span(x, knots, degree);

    let mut n = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;

    for d in 1..=degree {
        left[d] = x - knots[mu + 1 - d];
        right[d] = knots[mu + d] - x;
        let mut saved = 0.0;
        for r in 0..d {
            let den = right[r + 1] + left[d - r];
            let temp = if den.abs() > 1e-12 { n[r] / den } else { 0.0 };
            n[r] = saved + right[r + 1] * temp;
            saved = left[d - r] * temp;
        }
        n[d] = saved;
    }

    let mut row = Array1::<f64>::zeros(num_basis);
    let start = mu.saturating_sub(degree);
    for (i, value) in n.into_iter().enumerate() {
        if start + i < num_basis {
            row[start + i] = value;
        }
    }
    row
}

impl InterpolatingSpline {
    pub fn fit(
        x: ArrayView1<'_, f64>,
        y: ArrayView1<'_, f64>,
        degree: usize,
    ) -> Result<Self, SplineError> {
        if degree == 0 {
            return Err(SplineError::InvalidDegree(degree));
        }
        if x.len() != y.len() {
            return Err(SplineError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        let m = x.len();
        if m < degree + 1 {
            return Err(SplineError::InsufficientData {
                degree,
                required: degree + 1,
                provided: m,
            });
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(SplineError::NonFinite);
        }
        if let Some(index) = (1..m).find(|&i| x[i] <= x[i - 1]) {
            return Err(SplineError::InvalidAbscissae { index });
        }

        let knots = interpolation_knots(x, degree);
        let mut collocation = Array2::<f64>::zeros((m, m));
        for (i, &xi) in x.iter().enumerate() {
            collocation.row_mut(i).assign(&basis_row(xi, knots.view(), degree));
        }

        let solved = svd_least_squares(&collocation, y)?;
        if solved.rank < m {
            return Err(SplineError::SingularSystem {
                rank: solved.rank,
                size: m,
            });
        }

        log::debug!(
            "[Spline] degree={} points={} knots={:?}",
            degree,
            m,
            knots.to_vec()
        );

        Ok(Self {
            degree,
            knots,
            coefficients: solved.solution,
        })
    }

    /// Outside the data range the boundary polynomial pieces are extended.
    pub fn evaluate(&self, x: f64) -> f64 {
        basis_row(x, self.knots.view(), self.degree).dot(&self.coefficients)
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    /// Evaluates on `lo, lo + step, …` up to and including the upper end of
    /// the data range.
    pub fn evaluate_grid(&self, step: f64) -> Result<SplineGrid, SplineError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(SplineError::InvalidStep(step));
        }
        let (lo, hi) = self.domain();
        let intervals = ((hi - lo) / step + 1e-9).floor();
        if !(intervals < MAX_GRID_POINTS as f64) {
            return Err(SplineError::InvalidStep(step));
        }
        let count = intervals as usize + 1;
        let x: Vec<f64> = (0..count).map(|k| lo + k as f64 * step).collect();
        let y = x.iter().map(|&t| self.evaluate(t)).collect();
        log::debug!("[Spline] evaluated {} grid points on [{}, {}]", count, lo, hi);
        Ok(SplineGrid { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn quadratic_knots_use_midpoints() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let knots = interpolation_knots(x.view(), 2);
        assert_eq!(knots.to_vec(), vec![1.0, 1.0, 1.0, 2.5, 3.5, 5.0, 5.0, 5.0]);
        let cubic = interpolation_knots(x.view(), 3);
        assert_eq!(
            cubic.to_vec(),
            vec![1.0, 1.0, 1.0, 1.0, 3.0, 5.0, 5.0, 5.0, 5.0]
        );
    }

    #[test]
    fn basis_is_a_partition_of_unity() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let knots = interpolation_knots(x.view(), 2);
        for t in [1.0, 1.3, 2.5, 3.9, 4.99, 5.0] {
            let row = basis_row(t, knots.view(), 2);
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|v| *v >= -1e-12));
        }
    }

    #[test]
    fn interpolates_every_point() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = array![4.18, 2.33, 8.0, 6.26, 9.0];
        let spline = InterpolatingSpline::fit(x.view(), y.view(), 2).expect("fits");
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_abs_diff_eq!(spline.evaluate(*xi), *yi, epsilon = 1e-9);
        }
    }

    #[test]
    fn reproduces_polynomials_of_its_degree() {
        let x = array![0.0, 0.5, 1.7, 2.0, 3.1, 4.0];
        let y = x.mapv(|v| 2.0 * v * v - v + 1.0);
        let spline = InterpolatingSpline::fit(x.view(), y.view(), 2).expect("fits");
        for t in [0.25, 1.1, 2.6, 3.9] {
            assert_abs_diff_eq!(spline.evaluate(t), 2.0 * t * t - t + 1.0, epsilon = 1e-9);
        }
        let y = x.mapv(|v| v * v * v - 2.0 * v);
        let cubic = InterpolatingSpline::fit(x.view(), y.view(), 3).expect("fits");
        assert_abs_diff_eq!(cubic.evaluate(2.4), 2.4_f64.powi(3) - 4.8, epsilon = 1e-9);
    }

    #[test]
    fn too_few_points_is_insufficient_data() {
        let x = array![1.0, 2.0];
        let y = array![3.0, 4.0];
        assert!(matches!(
            InterpolatingSpline::fit(x.view(), y.view(), 2),
            Err(SplineError::InsufficientData {
                degree: 2,
                required: 3,
                provided: 2
            })
        ));
        // Exactly degree + 1 points is a single polynomial piece.
        let x = array![1.0, 2.0, 3.0];
        let y = array![1.0, 4.0, 9.0];
        let spline = InterpolatingSpline::fit(x.view(), y.view(), 2).expect("fits");
        assert_abs_diff_eq!(spline.evaluate(2.5), 6.25, epsilon = 1e-9);
    }

    #[test]
    fn rejects_unsorted_or_duplicate_abscissae() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        assert!(matches!(
            InterpolatingSpline::fit(array![1.0, 3.0, 2.0, 4.0].view(), y.view(), 2),
            Err(SplineError::InvalidAbscissae { index: 2 })
        ));
        assert!(matches!(
            InterpolatingSpline::fit(array![1.0, 2.0, 2.0, 4.0].view(), y.view(), 2),
            Err(SplineError::InvalidAbscissae { index: 2 })
        ));
        assert!(matches!(
            InterpolatingSpline::fit(array![1.0, 2.0, 3.0].view(), y.view(), 2),
            Err(SplineError::LengthMismatch { x: 3, y: 4 })
        ));
    }

    #[test]
    fn grid_spans_range_inclusively() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = array![1.0, 0.0, 1.0, 0.0, 1.0];
        let spline = InterpolatingSpline::fit(x.view(), y.view(), 2).expect("fits");
        let grid = spline.evaluate_grid(0.1).expect("valid step");
        assert_eq!(grid.x.len(), 41);
        assert_abs_diff_eq!(grid.x[0], 1.0);
        assert_abs_diff_eq!(grid.x[40], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.y[10], 0.0, epsilon = 1e-9);
        assert!(matches!(
            spline.evaluate_grid(0.0),
            Err(SplineError::InvalidStep(_))
        ));
    }

    #[test]
    fn tiny_steps_are_rejected_instead_of_allocating() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = array![1.0, 0.0, 1.0, 0.0, 1.0];
        let spline = InterpolatingSpline::fit(x.view(), y.view(), 2).expect("fits");
        for step in [1e-9, 1e-300, f64::MIN_POSITIVE] {
            assert!(matches!(
                spline.evaluate_grid(step),
                Err(SplineError::InvalidStep(s)) if s == step
            ));
        }
        let fine = spline.evaluate_grid(1e-5).expect("below the cap");
        assert!(fine.x.len() > 399_000 && fine.x.len() <= MAX_GRID_POINTS);
    }
}
