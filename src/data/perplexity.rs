use faer::MatRef;
use num_traits::{Float, FromPrimitive};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::data::affinities::Bandwidth;
use crate::data::distances::check_square;
use crate::error::*;

/////////////
// Globals //
/////////////

pub const PERPLEXITY_DEFAULT: f64 = 30.0;
const PERPLEXITY_TOL: f64 = 1e-5;
const PERPLEXITY_MAX_ITER: usize = 50;

////////////
// Params //
////////////

/// Perplexity calibration parameters
///
/// ### Fields
///
/// * `perplexity` - Target perplexity (effective number of neighbours).
///   Typical values: 5 - 50
/// * `tol` - Accepted absolute difference between the entropy (in nats) and
///   `ln(perplexity)`
/// * `max_iter` - Bisection steps per point before the current precision is
///   accepted as is
#[derive(Clone, Debug)]
pub struct CalibrationParams<T> {
    pub perplexity: T,
    pub tol: T,
    pub max_iter: usize,
}

impl<T> CalibrationParams<T>
where
    T: Float + FromPrimitive,
{
    /// Generate new calibration parameters
    ///
    /// ### Params
    ///
    /// * `perplexity` - Target perplexity. Default `30.0`.
    /// * `tol` - Entropy tolerance. Default `1e-5`.
    /// * `max_iter` - Bisection steps. Default `50`.
    ///
    /// ### Returns
    ///
    /// Initialised self
    pub fn new(perplexity: Option<T>, tol: Option<T>, max_iter: Option<usize>) -> Self {
        let defaults = Self::default();
        Self {
            perplexity: perplexity.unwrap_or(defaults.perplexity),
            tol: tol.unwrap_or(defaults.tol),
            max_iter: max_iter.unwrap_or(defaults.max_iter),
        }
    }

    /// Check the parameters
    pub fn validate(&self) -> Result<(), TsneError> {
        if !(self.perplexity.is_finite() && self.perplexity > T::zero()) {
            return Err(invalid_input("Perplexity must be positive and finite"));
        }
        if !(self.tol.is_finite() && self.tol > T::zero()) {
            return Err(invalid_input("Calibration tolerance must be positive"));
        }
        if self.max_iter == 0 {
            return Err(invalid_input("Calibration needs at least one iteration"));
        }
        Ok(())
    }
}

impl<T: Float + FromPrimitive> Default for CalibrationParams<T> {
    fn default() -> Self {
        Self {
            perplexity: T::from_f64(PERPLEXITY_DEFAULT).unwrap(),
            tol: T::from_f64(PERPLEXITY_TOL).unwrap(),
            max_iter: PERPLEXITY_MAX_ITER,
        }
    }
}

/// Outcome of the bisection for a single point
///
/// ### Fields
///
/// * `beta` - Found precision of `exp(-d * beta)`, `beta = 1 / sigma²`. The
///   Gaussian kernel `exp(-d / (2 * sigma²))` therefore runs at `beta / 2`.
/// * `entropy` - Neighbour entropy (nats) at `beta`
/// * `n_iter` - Bisection steps taken
/// * `converged` - Whether `|entropy - ln(perplexity)| <= tol` was reached
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointCalibration<T> {
    pub beta: T,
    pub entropy: T,
    pub n_iter: usize,
    pub converged: bool,
}

impl<T: Float> PointCalibration<T> {
    /// Bandwidth of the point: `1 / sqrt(beta)`
    pub fn sigma(&self) -> T {
        T::one() / self.beta.sqrt()
    }
}

/////////////
// Entropy //
/////////////

/// Shannon entropy of the Gaussian neighbour distribution of one point
///
/// `p_j = exp(-d_j * beta)`, `H = ln(Z) + beta * sum(d_j * p_j) / Z`. The
/// distances are shifted by their minimum first; `H` is invariant to the
/// shift and `Z` can no longer underflow to zero.
///
/// ### Params
///
/// * `dists` - Squared distances to all other points (self excluded)
/// * `beta` - Precision
///
/// ### Returns
///
/// Entropy in nats
pub fn neighbour_entropy<T>(dists: &[T], beta: T) -> T
where
    T: Float,
{
    let d_min = dists.iter().copied().fold(T::infinity(), T::min);

    let mut z = T::zero();
    let mut weighted = T::zero();
    for &d in dists {
        let shifted = d - d_min;
        let p = (-shifted * beta).exp();
        z = z + p;
        weighted = weighted + shifted * p;
    }

    z.ln() + beta * weighted / z
}

///////////////
// Bisection //
///////////////

/// Bisection over the precision of one point
///
/// ### Params
///
/// * `dists` - Squared distances to all other points (self excluded)
/// * `target` - `ln(perplexity)`
/// * `params` - Calibration parameters
///
/// ### Returns
///
/// The `PointCalibration` of the point
fn calibrate_point<T>(dists: &[T], target: T, params: &CalibrationParams<T>) -> PointCalibration<T>
where
    T: Float + FromPrimitive,
{
    let two = T::from_f64(2.0).unwrap();

    let mut beta = T::one();
    let mut min_beta = T::neg_infinity();
    let mut max_beta = T::infinity();

    let mut entropy = neighbour_entropy(dists, beta);
    let mut n_iter = 0;
    let mut converged = false;

    while n_iter < params.max_iter {
        let diff = entropy - target;
        if diff.abs() <= params.tol {
            converged = true;
            break;
        }

        if diff > T::zero() {
            // too flat -> narrow the kernel
            min_beta = beta;
            beta = if max_beta.is_infinite() {
                beta * two
            } else {
                (beta + max_beta) / two
            };
        } else {
            // too peaked -> widen the kernel
            max_beta = beta;
            beta = if min_beta.is_infinite() {
                beta / two
            } else {
                (beta + min_beta) / two
            };
        }

        entropy = neighbour_entropy(dists, beta);
        n_iter += 1;
    }

    // the last step may land inside the tolerance
    if !converged {
        converged = (entropy - target).abs() <= params.tol;
    }

    PointCalibration {
        beta,
        entropy,
        n_iter,
        converged,
    }
}

/// Calibrate the Gaussian precision of every point to a target perplexity
///
/// For each point the self-distance is dropped and the precision `beta` is
/// bisected until the neighbour entropy matches `ln(perplexity)` within
/// `tol`. Running out of iterations is not an error: the last precision is
/// kept.
///
/// ### Params
///
/// * `dist` - Squared distance matrix of the high-dimensional points
/// * `params` - Calibration parameters
///
/// ### Returns
///
/// One `PointCalibration` per point
///
/// ### Errors
///
/// `InvalidInput` for invalid parameters, a non-square matrix or fewer than
/// two points.
pub fn calibrate_precisions<T>(
    dist: MatRef<T>,
    params: &CalibrationParams<T>,
) -> Result<Vec<PointCalibration<T>>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    params.validate()?;
    let n = check_square(dist, "Distance matrix")?;
    if n < 2 {
        return Err(invalid_input(
            "Perplexity calibration needs at least two points",
        ));
    }

    let target = params.perplexity.ln();

    let res: Vec<PointCalibration<T>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let dists: Vec<T> = (0..n).filter(|&j| j != i).map(|j| dist[(i, j)]).collect();
            calibrate_point(&dists, target, params)
        })
        .collect();

    let n_failed = res.iter().filter(|c| !c.converged).count();
    if n_failed > 0 {
        warn!(
            n_failed,
            n_points = n,
            "perplexity calibration hit the iteration cap; keeping the last precision"
        );
    }
    debug!(
        n_points = n,
        perplexity = params.perplexity.to_f64(),
        "perplexity calibration done"
    );

    Ok(res)
}

/// Per-point Gaussian bandwidths for a target perplexity
///
/// ### Params
///
/// * `dist` - Squared distance matrix of the high-dimensional points
/// * `params` - Calibration parameters
///
/// ### Returns
///
/// `Bandwidth::PerPoint` with `sigma_i = 1 / sqrt(beta_i)`
pub fn calibrate_bandwidth<T>(
    dist: MatRef<T>,
    params: &CalibrationParams<T>,
) -> Result<Bandwidth<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    let calibration = calibrate_precisions(dist, params)?;
    let betas: Vec<T> = calibration.iter().map(|c| c.beta).collect();
    Ok(Bandwidth::from_precisions(&betas))
}

///////////
// Tests //
///////////
