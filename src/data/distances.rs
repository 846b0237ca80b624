use faer::{Mat, MatRef};
use num_traits::Float;
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::error::*;

/////////////
// Helpers //
/////////////

/// Squared Euclidean distance between two rows of the same point set
///
/// ### Params
///
/// * `points` - Point set (samples × features)
/// * `i` - Index of the first sample
/// * `j` - Index of the second sample
///
/// ### Returns
///
/// `||p_i - p_j||²`
#[inline(always)]
fn sq_euclidean<T>(points: MatRef<T>, i: usize, j: usize) -> T
where
    T: Float,
{
    (0..points.ncols()).fold(T::zero(), |acc, k| {
        let diff = points[(i, k)] - points[(j, k)];
        acc + diff * diff
    })
}

/// Check that a matrix is square and non-empty
///
/// ### Params
///
/// * `mat` - The matrix to check
/// * `what` - Name of the matrix for the error message
///
/// ### Returns
///
/// The side length of the matrix
pub(crate) fn check_square<T>(mat: MatRef<T>, what: &str) -> Result<usize, TsneError> {
    let (n_rows, n_cols) = (mat.nrows(), mat.ncols());
    if n_rows == 0 {
        return Err(invalid_input(format!("{} is empty", what)));
    }
    if n_rows != n_cols {
        return Err(invalid_input(format!(
            "{} must be square, got {} x {}",
            what, n_rows, n_cols
        )));
    }
    Ok(n_rows)
}

///////////////
// Distances //
///////////////

/// Pairwise squared Euclidean distances of a point set
///
/// Only the strictly lower triangle is computed (one rayon task per row, each
/// row summed sequentially) and then mirrored, so the result is exactly
/// symmetric with a zero diagonal.
///
/// ### Params
///
/// * `points` - Point set (samples × features)
///
/// ### Returns
///
/// `N × N` matrix with `D[i][j] = ||p_i - p_j||²`
///
/// ### Errors
///
/// `InvalidInput` if the point set has no rows or contains non-finite values.
pub fn pairwise_sq_distances<T>(points: MatRef<T>) -> Result<Mat<T>, TsneError>
where
    T: Float + Send + Sync,
{
    let n = points.nrows();
    if n == 0 {
        return Err(invalid_input("Point set has no rows"));
    }

    for i in 0..n {
        for k in 0..points.ncols() {
            if !points[(i, k)].is_finite() {
                return Err(invalid_input(format!(
                    "Point set contains a non-finite value at ({}, {})",
                    i, k
                )));
            }
        }
    }

    let lower: Vec<Vec<T>> = (0..n)
        .into_par_iter()
        .map(|i| (0..i).map(|j| sq_euclidean(points, i, j)).collect())
        .collect();

    Ok(Mat::from_fn(n, n, |i, j| match i.cmp(&j) {
        Ordering::Greater => lower[i][j],
        Ordering::Less => lower[j][i],
        Ordering::Equal => T::zero(),
    }))
}

///////////
// Tests //
///////////
