use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Mat, MatRef, get_global_parallelism};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

/// Relative cutoff below which a singular value is treated as zero.
pub const RANK_REL_TOL: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
    #[error("Dimension mismatch: matrix has {rows} rows but right-hand side has {rhs} entries")]
    DimensionMismatch { rows: usize, rhs: usize },
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((mat.nrows(), mat.ncols()));
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            out[[i, j]] = mat[(i, j)];
        }
    }
    out
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    let mut out = Array1::<f64>::zeros(mat.nrows());
    for i in 0..mat.nrows() {
        out[i] = mat[(i, 0)];
    }
    out
}

/// Borrowed faer view over an ndarray matrix.
pub struct FaerArrayView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        // Negative or zero strides are materialized into a compact copy.
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.to_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let (ptr, rows, cols, row_stride, col_stride) = if let Some(owned) = &self.owned {
            let strides = owned.strides();
            (
                owned.as_ptr(),
                owned.nrows(),
                owned.ncols(),
                strides[0],
                strides[1],
            )
        } else {
            (
                self.ptr,
                self.rows,
                self.cols,
                self.row_stride,
                self.col_stride,
            )
        };
        // SAFETY: pointer/shape/strides either come directly from a live ndarray
        // view with positive strides, or from an owned compact copy stored inside
        // this wrapper, which guarantees validity for the returned view lifetime.
        unsafe { MatRef::from_raw_parts(ptr, rows, cols, row_stride, col_stride) }
    }
}

pub trait FaerSvd {
    fn svd(
        &self,
        compute_u: bool,
        compute_vt: bool,
    ) -> Result<(Option<Array2<f64>>, Array1<f64>, Option<Array2<f64>>), LinalgError>;
}

impl<S: Data<Elem = f64>> FaerSvd for ArrayBase<S, Ix2> {
    fn svd(
        &self,
        compute_u: bool,
        compute_vt: bool,
    ) -> Result<(Option<Array2<f64>>, Array1<f64>, Option<Array2<f64>>), LinalgError> {
        let faer_view = FaerArrayView::new(self);
        let faer_mat = faer_view.as_ref();
        let (rows, cols) = faer_mat.shape();
        let compute_u_flag = if compute_u {
            ComputeSvdVectors::Full
        } else {
            ComputeSvdVectors::No
        };
        let compute_v_flag = if compute_vt {
            ComputeSvdVectors::Full
        } else {
            ComputeSvdVectors::No
        };

        let mut singular = Diag::<f64>::zeros(rows.min(cols));
        let mut u_storage = compute_u.then(|| Mat::<f64>::zeros(rows, rows));
        let mut v_storage = compute_vt.then(|| Mat::<f64>::zeros(cols, cols));

        let par = get_global_parallelism();
        let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
            rows,
            cols,
            compute_u_flag,
            compute_v_flag,
            par,
            Default::default(),
        ));
        let stack = MemStack::new(&mut mem);

        svd::svd(
            faer_mat,
            singular.as_mut(),
            u_storage.as_mut().map(|mat| mat.as_mut()),
            v_storage.as_mut().map(|mat| mat.as_mut()),
            par,
            stack,
            Default::default(),
        )
        .map_err(|_| LinalgError::SvdNoConvergence)?;

        let singular_values = diag_to_array(singular.as_ref());
        let u_opt = u_storage.map(|mat| mat_to_array(mat.as_ref()));
        let vt_opt = v_storage.map(|mat| {
            let mat_ref = mat.as_ref();
            let mut out = Array2::<f64>::zeros((mat_ref.ncols(), mat_ref.nrows()));
            for j in 0..mat_ref.nrows() {
                for i in 0..mat_ref.ncols() {
                    out[[i, j]] = mat_ref[(j, i)];
                }
            }
            out
        });

        Ok((u_opt, singular_values, vt_opt))
    }
}

/// Ratio of the largest to the smallest singular value; infinite when the
/// smallest is numerically zero.
pub fn condition_number_from_singular(singular: &Array1<f64>) -> f64 {
    let max_sv = singular.iter().fold(0.0_f64, |max, &val| max.max(val));
    let min_sv = singular.iter().fold(f64::INFINITY, |min, &val| min.min(val));
    if !min_sv.is_finite() || min_sv <= max_sv * RANK_REL_TOL {
        return f64::INFINITY;
    }
    max_sv / min_sv
}

/// Minimum-norm least-squares solution of `A x ≈ b` via the SVD.
#[derive(Clone, Debug)]
pub struct SvdLeastSquares {
    pub solution: Array1<f64>,
    /// `(AᵀA)⁺`, the unscaled covariance of the solution.
    pub normal_pinv: Array2<f64>,
    pub singular_values: Array1<f64>,
    pub rank: usize,
    pub condition_number: f64,
}

pub fn svd_least_squares<S: Data<Elem = f64>>(
    a: &ArrayBase<S, Ix2>,
    b: ArrayView1<'_, f64>,
) -> Result<SvdLeastSquares, LinalgError> {
    let (rows, cols) = a.dim();
    if b.len() != rows {
        return Err(LinalgError::DimensionMismatch {
            rows,
            rhs: b.len(),
        });
    }

    let (u_opt, s, vt_opt) = a.svd(true, true)?;
    let (u, vt) = match (u_opt, vt_opt) {
        (Some(u), Some(vt)) => (u, vt),
        _ => return Err(LinalgError::SvdNoConvergence),
    };

    let max_sv = s.iter().fold(0.0_f64, |max, &val| max.max(val));
    let cutoff = max_sv * RANK_REL_TOL * (rows.max(cols) as f64);

    let mut solution = Array1::<f64>::zeros(cols);
    let mut normal_pinv = Array2::<f64>::zeros((cols, cols));
    let mut rank = 0usize;
    for (k, &sk) in s.iter().enumerate() {
        if sk <= cutoff {
            continue;
        }
        rank += 1;
        let uk = u.column(k);
        let vk = vt.row(k);
        let coef = uk.dot(&b) / sk;
        solution.scaled_add(coef, &vk);
        let inv_sq = 1.0 / (sk * sk);
        for i in 0..cols {
            for j in 0..cols {
                normal_pinv[[i, j]] += inv_sq * vk[i] * vk[j];
            }
        }
    }

    let condition_number = if s.len() < cols {
        f64::INFINITY
    } else {
        condition_number_from_singular(&s)
    };

    Ok(SvdLeastSquares {
        solution,
        normal_pinv,
        singular_values: s,
        rank,
        condition_number,
    })
}

/// Compensated summation for residual and moment accumulation.
#[derive(Default, Clone, Copy)]
pub struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub fn sum(self) -> f64 {
        self.sum
    }
}

impl FromIterator<f64> for KahanSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = KahanSum::default();
        for v in iter {
            acc.add(v);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn svd_reconstructs_singular_values_of_diagonal() {
        let a = array![[3.0, 0.0], [0.0, 2.0], [0.0, 0.0]];
        let (_, s, _) = a.svd(false, false).expect("svd should succeed");
        assert_abs_diff_eq!(s[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(condition_number_from_singular(&s), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn least_squares_recovers_exact_line() {
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let b = array![1.0, 3.0, 5.0, 7.0];
        let fit = svd_least_squares(&a, b.view()).expect("lstsq should succeed");
        assert_eq!(fit.rank, 2);
        assert_abs_diff_eq!(fit.solution[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.solution[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn least_squares_reports_rank_deficiency_without_nan() {
        // Second and third columns are identical.
        let a = array![[1.0, 1.0, 1.0], [1.0, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 0.0]];
        let b = array![2.0, 1.0, 2.0, 1.0];
        let fit = svd_least_squares(&a, b.view()).expect("lstsq should succeed");
        assert_eq!(fit.rank, 2);
        assert!(fit.condition_number.is_infinite());
        assert!(fit.solution.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(fit.solution[1], fit.solution[2], epsilon = 1e-10);
        assert_abs_diff_eq!(fit.solution[0], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn least_squares_rejects_mismatched_rhs() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];
        assert!(matches!(
            svd_least_squares(&a, b.view()),
            Err(LinalgError::DimensionMismatch { rows: 2, rhs: 3 })
        ));
    }

    #[test]
    fn kahan_sum_matches_plain_sum_on_small_inputs() {
        let acc: KahanSum = [0.1, 0.2, 0.3].into_iter().collect();
        assert_abs_diff_eq!(acc.sum(), 0.6, epsilon = 1e-15);
    }
}
