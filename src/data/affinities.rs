use faer::{Mat, MatRef};
use num_traits::{Float, FromPrimitive};
use rayon::prelude::*;

use crate::data::distances::check_square;
use crate::error::*;

///////////
// Enums //
///////////

/// Bandwidth of the Gaussian kernel
///
/// Row `i` of the kernel always uses `sigma(i)`, i.e. either the shared value
/// or the i-th entry of the per-point vector.
#[derive(Clone, Debug, PartialEq)]
pub enum Bandwidth<T> {
    /// One sigma shared by all points
    Constant(T),
    /// One sigma per point (usually the output of the perplexity calibration)
    PerPoint(Vec<T>),
}

impl<T> Bandwidth<T>
where
    T: Float,
{
    /// Build per-point bandwidths from Gaussian precisions
    ///
    /// ### Params
    ///
    /// * `betas` - Precision per point; `sigma_i = 1 / sqrt(beta_i)`
    ///
    /// ### Returns
    ///
    /// `Bandwidth::PerPoint`
    pub fn from_precisions(betas: &[T]) -> Self {
        Bandwidth::PerPoint(betas.iter().map(|&b| T::one() / b.sqrt()).collect())
    }

    /// Sigma used for row `i`
    #[inline(always)]
    pub fn sigma(&self, i: usize) -> T {
        match self {
            Bandwidth::Constant(sigma) => *sigma,
            Bandwidth::PerPoint(sigmas) => sigmas[i],
        }
    }

    /// Check the bandwidth against a point set of size `n`
    ///
    /// ### Params
    ///
    /// * `n` - Number of points
    ///
    /// ### Returns
    ///
    /// `InvalidInput` for non-positive or non-finite values, or a per-point
    /// vector of the wrong length.
    pub fn validate(&self, n: usize) -> Result<(), TsneError> {
        match self {
            Bandwidth::Constant(sigma) => {
                if !(sigma.is_finite() && *sigma > T::zero()) {
                    return Err(invalid_input("Bandwidth must be positive and finite"));
                }
            }
            Bandwidth::PerPoint(sigmas) => {
                if sigmas.len() != n {
                    return Err(invalid_input(format!(
                        "Got {} bandwidths for {} points",
                        sigmas.len(),
                        n
                    )));
                }
                if let Some(i) = sigmas
                    .iter()
                    .position(|s| !(s.is_finite() && *s > T::zero()))
                {
                    return Err(invalid_input(format!(
                        "Bandwidth of point {} must be positive and finite",
                        i
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Treatment of the self-similarity `A[i][i]` before normalisation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelfAffinity {
    /// Keep the self-similarity (distance zero, so `A[i][i] = 1`) in the
    /// normalising sums
    #[default]
    Include,
    /// Zero the diagonal before normalising
    Exclude,
}

/// How the unnormalised kernel is turned into a joint distribution
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelNormalisation {
    /// Column-normalise to conditional probabilities, then
    /// `P = (C + C^T) / 2N`
    #[default]
    Conditional,
    /// `P = (A + A^T) / (2 * sum(A))`
    Joint,
}

/// Parse the kernel normalisation
///
/// ### Params
///
/// * `s` - `"conditional"` or `"joint"`
///
/// ### Returns
///
/// Option of the KernelNormalisation
pub fn parse_kernel_normalisation(s: &str) -> Option<KernelNormalisation> {
    match s.to_lowercase().as_str() {
        "conditional" => Some(KernelNormalisation::Conditional),
        "joint" => Some(KernelNormalisation::Joint),
        _ => None,
    }
}

/// Normalisation settings shared by both kernel families
///
/// ### Fields
///
/// * `self_affinity` - Whether the diagonal takes part in the normalisation
/// * `normalisation` - Conditional (column) or joint normalisation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KernelParams {
    pub self_affinity: SelfAffinity,
    pub normalisation: KernelNormalisation,
}

///////////////////
// Normalisation //
///////////////////

/// Normalise an unnormalised kernel into a symmetric joint distribution
///
/// ### Params
///
/// * `kernel` - Unnormalised `N × N` kernel (owned, modified in place)
/// * `params` - Normalisation settings
/// * `label` - Kernel name for error messages
///
/// ### Returns
///
/// Symmetric matrix summing to 1
fn normalise_and_symmetrise<T>(
    mut kernel: Mat<T>,
    params: &KernelParams,
    label: &str,
) -> Result<Mat<T>, TsneError>
where
    T: Float + FromPrimitive,
{
    let n = kernel.nrows();
    let two = T::from_f64(2.0).unwrap();

    if params.self_affinity == SelfAffinity::Exclude {
        for i in 0..n {
            kernel[(i, i)] = T::zero();
        }
    }

    match params.normalisation {
        KernelNormalisation::Conditional => {
            let mut col_sums = vec![T::zero(); n];
            for j in 0..n {
                col_sums[j] = (0..n).fold(T::zero(), |acc, i| acc + kernel[(i, j)]);
                if !(col_sums[j].is_finite() && col_sums[j] > T::zero()) {
                    return Err(numeric_degeneracy(format!(
                        "{} kernel: column {} has no usable mass (sum = {})",
                        label,
                        j,
                        col_sums[j].to_f64().unwrap_or(f64::NAN)
                    )));
                }
            }
            let denom = two * T::from_usize(n).unwrap();

            Ok(Mat::from_fn(n, n, |i, j| {
                (kernel[(i, j)] / col_sums[j] + kernel[(j, i)] / col_sums[i]) / denom
            }))
        }
        KernelNormalisation::Joint => {
            let mut total = T::zero();
            for j in 0..n {
                for i in 0..n {
                    total = total + kernel[(i, j)];
                }
            }
            if !(total.is_finite() && total > T::zero()) {
                return Err(numeric_degeneracy(format!(
                    "{} kernel: total mass is {}",
                    label,
                    total.to_f64().unwrap_or(f64::NAN)
                )));
            }
            let denom = two * total;

            Ok(Mat::from_fn(n, n, |i, j| {
                (kernel[(i, j)] + kernel[(j, i)]) / denom
            }))
        }
    }
}

/// Assemble an `N × N` matrix from rows computed in parallel
fn kernel_from_rows<T, F>(n: usize, f: F) -> Mat<T>
where
    T: Float + Send + Sync,
    F: Fn(usize, usize) -> T + Send + Sync,
{
    let rows: Vec<Vec<T>> = (0..n)
        .into_par_iter()
        .map(|i| (0..n).map(|j| f(i, j)).collect())
        .collect();

    Mat::from_fn(n, n, |i, j| rows[i][j])
}

//////////////
// Gaussian //
//////////////

/// Gaussian affinities from a squared distance matrix
///
/// `A[i][j] = exp(-D[i][j] / (2 * sigma_i²))`, followed by normalisation and
/// symmetrisation according to `params`.
///
/// ### Params
///
/// * `dist` - Squared distance matrix (`N × N`)
/// * `bandwidth` - Constant or per-point sigma
/// * `params` - Normalisation settings
///
/// ### Returns
///
/// Symmetric affinity matrix summing to 1
///
/// ### Errors
///
/// * `InvalidInput` - non-square/empty `dist` or an invalid bandwidth
/// * `NumericDegeneracy` - every similarity of a column underflowed to zero
pub fn gaussian_affinities<T>(
    dist: MatRef<T>,
    bandwidth: &Bandwidth<T>,
    params: &KernelParams,
) -> Result<Mat<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    let n = check_square(dist, "Distance matrix")?;
    bandwidth.validate(n)?;

    let two = T::from_f64(2.0).unwrap();
    let kernel = kernel_from_rows(n, |i, j| {
        let sigma = bandwidth.sigma(i);
        (-dist[(i, j)] / (two * sigma * sigma)).exp()
    });

    normalise_and_symmetrise(kernel, params, "Gaussian")
}

///////////////
// Student-t //
///////////////

/// Unnormalised Student-t kernel (one degree of freedom)
///
/// ### Params
///
/// * `dist` - Squared distance matrix (`N × N`)
///
/// ### Returns
///
/// `W[i][j] = 1 / (1 + D[i][j])`
pub fn student_t_kernel<T>(dist: MatRef<T>) -> Mat<T>
where
    T: Float + Send + Sync,
{
    kernel_from_rows(dist.nrows(), |i, j| T::one() / (T::one() + dist[(i, j)]))
}

/// Student-t affinities from a squared distance matrix
///
/// Same normalise-then-symmetrise pipeline as the Gaussian kernel, with
/// `A[i][j] = 1 / (1 + D[i][j])`. Used for the embedding side.
///
/// ### Params
///
/// * `dist` - Squared distance matrix (`N × N`)
/// * `params` - Normalisation settings
///
/// ### Returns
///
/// Symmetric affinity matrix summing to 1
pub fn student_t_affinities<T>(dist: MatRef<T>, params: &KernelParams) -> Result<Mat<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    check_square(dist, "Distance matrix")?;
    normalise_and_symmetrise(student_t_kernel(dist), params, "Student-t")
}

///////////
// Tests //
///////////
