use faer::{Mat, MatRef};
use num_traits::{Float, FromPrimitive};
use rayon::prelude::*;

use crate::data::affinities::*;
use crate::data::distances::*;
use crate::error::*;

///////////
// Enums //
///////////

/// Which per-pair coefficient the gradient uses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GradientForm {
    /// `4 * (P_ij - Q_ij) * w_ij` with `w_ij = 1 / (1 + d_ij)`, the standard
    /// t-SNE gradient
    #[default]
    Canonical,
    /// Canonical coefficient multiplied by `sqrt(d_ij)`. Not the derivative
    /// of the loss; kept to reproduce embeddings produced with that variant.
    DistanceScaled,
}

/// Parse the gradient form
///
/// ### Params
///
/// * `s` - `"canonical"` or `"distance_scaled"` (alias `"scaled"`)
///
/// ### Returns
///
/// Option of the GradientForm
pub fn parse_gradient_form(s: &str) -> Option<GradientForm> {
    match s.to_lowercase().as_str() {
        "canonical" => Some(GradientForm::Canonical),
        "distance_scaled" | "scaled" => Some(GradientForm::DistanceScaled),
        _ => None,
    }
}

/// Objective settings
///
/// ### Fields
///
/// * `kernel` - Normalisation of the low-dimensional Student-t affinities
/// * `gradient` - Gradient coefficient to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectiveParams {
    pub kernel: KernelParams,
    pub gradient: GradientForm,
}

/////////////
// Helpers //
/////////////

/// Frobenius norm of a matrix
pub fn frobenius_norm<T>(mat: MatRef<T>) -> T
where
    T: Float,
{
    let mut sum = T::zero();
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            sum = sum + mat[(i, j)] * mat[(i, j)];
        }
    }
    sum.sqrt()
}

/// Check that the fixed affinities fit an embedding with `n` points
fn check_affinities<T>(p: MatRef<T>, n: usize) -> Result<(), TsneError> {
    let n_p = check_square(p, "Affinity matrix")?;
    if n_p != n {
        return Err(invalid_input(format!(
            "Affinity matrix covers {} points, embedding has {}",
            n_p, n
        )));
    }
    Ok(())
}

/// Reject embeddings that already left the finite range
fn check_embedding<T>(embd: MatRef<T>) -> Result<(), TsneError>
where
    T: Float,
{
    for j in 0..embd.ncols() {
        for i in 0..embd.nrows() {
            if !embd[(i, j)].is_finite() {
                return Err(numeric_degeneracy(format!(
                    "Embedding coordinate ({}, {}) is not finite",
                    i, j
                )));
            }
        }
    }
    Ok(())
}

//////////
// Loss //
//////////

/// Kullback-Leibler divergence `KL(P || Q)`
///
/// Entries with `P[i][j] == 0` contribute nothing.
///
/// ### Params
///
/// * `p` - Reference (high-dimensional) affinities
/// * `q` - Embedding affinities
///
/// ### Returns
///
/// `sum_ij P[i][j] * ln(P[i][j] / Q[i][j])`
///
/// ### Errors
///
/// * `InvalidInput` - shapes differ
/// * `NumericDegeneracy` - `Q[i][j] <= 0` (or not finite) where `P[i][j] > 0`
pub fn kl_divergence<T>(p: MatRef<T>, q: MatRef<T>) -> Result<T, TsneError>
where
    T: Float,
{
    let n = check_square(p, "Affinity matrix P")?;
    if q.nrows() != n || q.ncols() != n {
        return Err(invalid_input(format!(
            "Q is {} x {}, P is {} x {}",
            q.nrows(),
            q.ncols(),
            n,
            n
        )));
    }

    let mut loss = T::zero();
    for i in 0..n {
        for j in 0..n {
            let p_ij = p[(i, j)];
            if p_ij <= T::zero() {
                continue;
            }
            let q_ij = q[(i, j)];
            if !(q_ij.is_finite() && q_ij > T::zero()) {
                return Err(numeric_degeneracy(format!(
                    "Q[{}][{}] = {} while P[{}][{}] > 0",
                    i,
                    j,
                    q_ij.to_f64().unwrap_or(f64::NAN),
                    i,
                    j
                )));
            }
            loss = loss + p_ij * (p_ij / q_ij).ln();
        }
    }

    Ok(loss)
}

/// KL loss of an embedding against fixed high-dimensional affinities
///
/// ### Params
///
/// * `p` - High-dimensional affinities (`N × N`)
/// * `embd` - Embedding (`N × M`)
/// * `params` - Objective settings (Student-t normalisation)
///
/// ### Returns
///
/// The loss
pub fn embedding_loss<T>(
    p: MatRef<T>,
    embd: MatRef<T>,
    params: &ObjectiveParams,
) -> Result<T, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    check_affinities(p, embd.nrows())?;
    check_embedding(embd)?;

    let dist = pairwise_sq_distances(embd)?;
    let q = student_t_affinities(dist.as_ref(), &params.kernel)?;

    kl_divergence(p, q.as_ref())
}

//////////////
// Gradient //
//////////////

/// Gradient of the KL loss with respect to the embedding
///
/// `grad_i = sum_{j != i} c_ij * (y_i - y_j)` with
/// `c_ij = 4 * (P_ij - Q_ij) / (1 + d_ij)` (times `sqrt(d_ij)` for
/// `GradientForm::DistanceScaled`). Rows are computed in parallel, each row
/// summed in index order.
///
/// ### Params
///
/// * `p` - High-dimensional affinities (`N × N`)
/// * `embd` - Current embedding (`N × M`)
/// * `params` - Objective settings
///
/// ### Returns
///
/// `N × M` gradient
///
/// ### Errors
///
/// * `InvalidInput` - shape mismatch between `p` and `embd`
/// * `NumericDegeneracy` - non-finite embedding or gradient, or a degenerate
///   Student-t normalisation
pub fn tsne_gradient<T>(
    p: MatRef<T>,
    embd: MatRef<T>,
    params: &ObjectiveParams,
) -> Result<Mat<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    let n = embd.nrows();
    let n_dim = embd.ncols();
    check_affinities(p, n)?;
    check_embedding(embd)?;

    let dist = pairwise_sq_distances(embd)?;
    let w = student_t_kernel(dist.as_ref());
    let q = student_t_affinities(dist.as_ref(), &params.kernel)?;
    let four = T::from_f64(4.0).unwrap();

    let rows: Vec<Vec<T>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut grad_i = vec![T::zero(); n_dim];
            for j in 0..n {
                if j == i {
                    continue;
                }
                let mut coeff = four * (p[(i, j)] - q[(i, j)]) * w[(i, j)];
                if params.gradient == GradientForm::DistanceScaled {
                    coeff = coeff * dist[(i, j)].sqrt();
                }
                for k in 0..n_dim {
                    grad_i[k] = grad_i[k] + coeff * (embd[(i, k)] - embd[(j, k)]);
                }
            }
            grad_i
        })
        .collect();

    if let Some(i) = rows.iter().position(|r| r.iter().any(|g| !g.is_finite())) {
        return Err(numeric_degeneracy(format!(
            "Gradient of point {} is not finite",
            i
        )));
    }

    Ok(Mat::from_fn(n, n_dim, |i, k| rows[i][k]))
}

///////////
// Tests //
///////////
