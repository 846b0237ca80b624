#![allow(clippy::needless_range_loop)] // I like loops ... !

pub mod data;
pub mod error;
pub mod prelude;
pub mod training;

use faer::{Mat, MatRef};
use num_traits::{Float, FromPrimitive};
use rand_distr::{Distribution, StandardNormal};
use std::time::Instant;
use thousands::*;

use crate::data::affinities::*;
use crate::data::distances::*;
use crate::data::init::*;
use crate::data::perplexity::*;
use crate::error::*;
use crate::training::tsne_optimiser::*;
use crate::training::*;

////////////
// Params //
////////////

/// How the bandwidth of the high-dimensional Gaussian kernel is chosen
#[derive(Clone, Debug, PartialEq)]
pub enum BandwidthSelection<T> {
    /// Calibrate one bandwidth per point to this perplexity
    Perplexity(T),
    /// Use one fixed bandwidth for all points (no calibration)
    Constant(T),
}

impl<T: Float + FromPrimitive> Default for BandwidthSelection<T> {
    fn default() -> Self {
        BandwidthSelection::Perplexity(T::from_f64(PERPLEXITY_DEFAULT).unwrap())
    }
}

/// Main config structure for exact t-SNE
///
/// ### Fields
///
/// * `n_dim` - How many dimensions to return
/// * `bandwidth` - Perplexity calibration or a constant Gaussian bandwidth.
///   A perplexity given here takes precedence over `calibration.perplexity`.
/// * `calibration` - Tolerance and iteration cap of the bisection
/// * `kernel` - Normalisation of the high-dimensional affinities
/// * `init` - Initialisation of the embedding
/// * `optim_params` - The optimiser parameters
#[derive(Clone, Debug)]
pub struct TsneParams<T> {
    pub n_dim: usize,
    pub bandwidth: BandwidthSelection<T>,
    pub calibration: CalibrationParams<T>,
    pub kernel: KernelParams,
    pub init: EmbdInit<T>,
    pub optim_params: TsneOptimParams<T>,
}

impl<T> TsneParams<T>
where
    T: Float + FromPrimitive,
{
    /// Generate new t-SNE parameters
    ///
    /// Everything set to `None` falls back to the defaults.
    ///
    /// ### Params
    ///
    /// * `n_dim` - How many dimensions to return. Default `2`.
    /// * `bandwidth` - Bandwidth selection. Default perplexity `30.0`.
    /// * `calibration` - Bisection settings. Default tolerance `1e-5`, cap
    ///   `50`.
    /// * `kernel` - High-dimensional kernel settings. Default: self-affinity
    ///   included, conditional normalisation.
    /// * `init` - Embedding initialisation. Default uniform in `[-1, 1)`.
    /// * `optim_params` - Optimiser parameters.
    ///
    /// ### Returns
    ///
    /// Initialised self
    pub fn new(
        n_dim: Option<usize>,
        bandwidth: Option<BandwidthSelection<T>>,
        calibration: Option<CalibrationParams<T>>,
        kernel: Option<KernelParams>,
        init: Option<EmbdInit<T>>,
        optim_params: Option<TsneOptimParams<T>>,
    ) -> Self {
        Self {
            n_dim: n_dim.unwrap_or(2),
            bandwidth: bandwidth.unwrap_or_default(),
            calibration: calibration.unwrap_or_default(),
            kernel: kernel.unwrap_or_default(),
            init: init.unwrap_or_default(),
            optim_params: optim_params.unwrap_or_default(),
        }
    }

    /// Calibration settings with the requested perplexity applied
    fn effective_calibration(&self) -> CalibrationParams<T> {
        match self.bandwidth {
            BandwidthSelection::Perplexity(perplexity) => CalibrationParams {
                perplexity,
                ..self.calibration.clone()
            },
            BandwidthSelection::Constant(_) => self.calibration.clone(),
        }
    }

    /// Check all parameters before any computation
    pub fn validate(&self) -> Result<(), TsneError> {
        if self.n_dim == 0 {
            return Err(invalid_input("Embedding dimensionality must be positive"));
        }
        match self.bandwidth {
            BandwidthSelection::Perplexity(_) => self.effective_calibration().validate()?,
            BandwidthSelection::Constant(sigma) => {
                if !(sigma.is_finite() && sigma > T::zero()) {
                    return Err(invalid_input("Bandwidth must be positive and finite"));
                }
            }
        }
        self.init.validate()?;
        self.optim_params.validate()
    }
}

impl<T: Float + FromPrimitive> Default for TsneParams<T> {
    fn default() -> Self {
        Self::new(None, None, None, None, None, None)
    }
}

/// Result of a t-SNE run
///
/// ### Fields
///
/// * `embedding` - Final embedding (samples × `n_dim`)
/// * `status` - Why the optimiser stopped
/// * `n_iter` - Number of updates applied
#[derive(Clone, Debug)]
pub struct TsneOutput<T> {
    pub embedding: Mat<T>,
    pub status: OptimiserStatus,
    pub n_iter: usize,
}

/////////////
// Helpers //
/////////////

/// Generate the fixed high-dimensional affinities
///
/// ### Params
///
/// * `data` - Input data matrix (samples × features)
/// * `params` - The t-SNE parameters
/// * `verbose` - Controls verbosity
///
/// ### Returns
///
/// Symmetric `N × N` affinity matrix summing to 1
pub fn construct_tsne_affinities<T>(
    data: MatRef<T>,
    params: &TsneParams<T>,
    verbose: bool,
) -> Result<Mat<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    params.validate()?;

    if verbose {
        println!(
            "Computing pairwise distances for {} samples...",
            data.nrows().separate_with_underscores()
        );
    }

    let start_dist = Instant::now();
    let dist = pairwise_sq_distances(data)?;

    if verbose {
        println!("Distances done in: {:.2?}.", start_dist.elapsed());
    }

    let start_aff = Instant::now();
    let bandwidth = match &params.bandwidth {
        BandwidthSelection::Perplexity(perplexity) => {
            if verbose {
                println!(
                    "Calibrating bandwidths to perplexity {:.2}...",
                    perplexity.to_f64().unwrap_or(f64::NAN)
                );
            }
            calibrate_bandwidth(dist.as_ref(), &params.effective_calibration())?
        }
        BandwidthSelection::Constant(sigma) => Bandwidth::Constant(*sigma),
    };

    let p = gaussian_affinities(dist.as_ref(), &bandwidth, &params.kernel)?;

    if verbose {
        println!("Affinities done in: {:.2?}.", start_aff.elapsed());
    }

    Ok(p)
}

////////////////
// Main t-SNE //
////////////////

/// Run exact t-SNE from a given starting embedding
///
/// ### Params
///
/// * `data` - Input data matrix (samples × features)
/// * `init` - Starting embedding (samples × `n_dim`)
/// * `params` - The t-SNE parameters. `params.init` is ignored.
/// * `observer` - Receives the diagnostic records of the optimiser
/// * `verbose` - Controls verbosity
///
/// ### Returns
///
/// `TsneOutput` with the final embedding
///
/// ### Errors
///
/// `InvalidInput` if the parameters are invalid, the point counts of `data`
/// and `init` differ or `init` does not have `n_dim` columns;
/// `NumericDegeneracy` from the affinities or the optimiser.
pub fn tsne_from_init<T, O>(
    data: MatRef<T>,
    init: Mat<T>,
    params: &TsneParams<T>,
    observer: &mut O,
    verbose: bool,
) -> Result<TsneOutput<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
    O: TsneObserver<T> + ?Sized,
{
    params.validate()?;
    if init.nrows() != data.nrows() {
        return Err(invalid_input(format!(
            "Starting embedding has {} points, data has {}",
            init.nrows(),
            data.nrows()
        )));
    }
    if init.ncols() != params.n_dim {
        return Err(invalid_input(format!(
            "Starting embedding has {} dimensions, expected {}",
            init.ncols(),
            params.n_dim
        )));
    }

    let p = construct_tsne_affinities(data, params, verbose)?;

    if verbose {
        println!(
            "Optimising embedding via momentum gradient descent ({} iterations, lr {:.2}) on {} pairs...",
            params.optim_params.max_iter.separate_with_underscores(),
            params.optim_params.lr.to_f64().unwrap_or(f64::NAN),
            (data.nrows() * data.nrows()).separate_with_underscores()
        );
    }

    let start_layout = Instant::now();
    let mut state = TsneOptimiserState::new(init);
    let status = optimise_tsne(&mut state, p.as_ref(), &params.optim_params, observer, verbose)?;

    if verbose {
        println!("Optimised embedding in: {:.2?}.", start_layout.elapsed());
        println!("t-SNE complete!");
    }

    let n_iter = state.iter;
    Ok(TsneOutput {
        embedding: state.into_embedding(),
        status,
        n_iter,
    })
}

/// Run exact t-SNE dimensionality reduction
///
/// 1. Compute the pairwise squared distances of the data
/// 2. Calibrate per-point Gaussian bandwidths to the perplexity (or use a
///    constant bandwidth)
/// 3. Build the symmetric, normalised Gaussian affinities
/// 4. Initialise the embedding
/// 5. Minimise `KL(P || Q)` with momentum gradient descent
///
/// ### Params
///
/// * `data` - Input data matrix (samples × features)
/// * `params` - The t-SNE parameters
/// * `seed` - Seed for the initialisation
/// * `verbose` - Controls verbosity of the function
///
/// ### Returns
///
/// `TsneOutput` with the `samples × n_dim` embedding
///
/// ### Example
///
/// ```ignore
/// use faer::Mat;
/// let data = Mat::from_fn(200, 10, |_, _| rand::random::<f64>());
/// let res = tsne(data.as_ref(), &TsneParams::default(), 42, false).unwrap();
/// // res.embedding[(i, 0)] and res.embedding[(i, 1)] are the coordinates of
/// // sample i
/// ```
pub fn tsne<T>(
    data: MatRef<T>,
    params: &TsneParams<T>,
    seed: usize,
    verbose: bool,
) -> Result<TsneOutput<T>, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
    StandardNormal: Distribution<T>,
{
    params.validate()?;

    if verbose {
        println!(
            "Initialising embedding via {} layout...",
            match params.init {
                EmbdInit::RandomInit { .. } => "random",
                EmbdInit::GaussianInit { .. } => "gaussian",
            }
        );
    }

    let init = initialise_embedding(&params.init, data.nrows(), params.n_dim, seed as u64);

    tsne_from_init(data, init, params, &mut NoopObserver, verbose)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod test_tsne {
    use super::*;

    fn make_test_image_points() -> Mat<f64> {
        faer::mat![
            [2.0, -1.0, -7.0, -2.0, -2.0, 5.0],
            [6.0, 3.0, -2.0, 4.0, -5.0, 6.0],
            [8.0, -6.0, 5.0, 8.0, -6.0, -8.0],
            [4.0, 6.0, 2.0, 0.0, 0.0, 0.0],
        ]
    }

    fn make_test_map_points() -> Mat<f64> {
        faer::mat![[6.0, 7.0], [7.0, -2.0], [-7.0, -2.0], [8.0, -6.0]]
    }

    fn constant_params(lr: f64) -> TsneParams<f64> {
        TsneParams {
            bandwidth: BandwidthSelection::Constant(10.0),
            optim_params: TsneOptimParams::new(Some(1000), Some(lr), None, None, Some(0)),
            ..TsneParams::default()
        }
    }

    #[test]
    fn test_default_params() {
        let params = TsneParams::<f64>::default();
        assert_eq!(params.n_dim, 2);
        assert_eq!(params.bandwidth, BandwidthSelection::Perplexity(30.0));
        assert_eq!(params.kernel, KernelParams::default());
        assert_eq!(params.optim_params.max_iter, 1000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_perplexity_overrides_calibration() {
        let params = TsneParams::<f64> {
            bandwidth: BandwidthSelection::Perplexity(5.0),
            ..TsneParams::default()
        };
        let calibration = params.effective_calibration();
        assert_eq!(calibration.perplexity, 5.0);
        assert_eq!(calibration.max_iter, params.calibration.max_iter);
    }

    #[test]
    fn test_params_validation() {
        let zero_dim = TsneParams::<f64> {
            n_dim: 0,
            ..TsneParams::default()
        };
        assert!(matches!(zero_dim.validate(), Err(TsneError::InvalidInput(_))));

        let bad_perplexity = TsneParams::<f64> {
            bandwidth: BandwidthSelection::Perplexity(-1.0),
            ..TsneParams::default()
        };
        assert!(bad_perplexity.validate().is_err());

        let bad_sigma = TsneParams::<f64> {
            bandwidth: BandwidthSelection::Constant(0.0),
            ..TsneParams::default()
        };
        assert!(bad_sigma.validate().is_err());

        assert!(constant_params(0.0).validate().is_err());
    }

    #[test]
    fn test_invalid_init_is_rejected() {
        let data = make_test_image_points();

        for range in [0.0, -1.0, f64::NAN] {
            let params = TsneParams {
                init: EmbdInit::RandomInit { range: Some(range) },
                ..constant_params(10.0)
            };
            let res = tsne(data.as_ref(), &params, 42, false);
            assert!(matches!(res, Err(TsneError::InvalidInput(_))));
        }

        let params = TsneParams {
            init: EmbdInit::GaussianInit { std: Some(0.0) },
            ..constant_params(10.0)
        };
        assert!(matches!(
            tsne(data.as_ref(), &params, 42, false),
            Err(TsneError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_constant_bandwidth_affinities() {
        let data = make_test_image_points();
        let params = constant_params(10.0);

        let p = construct_tsne_affinities(data.as_ref(), &params, false).unwrap();

        let dist = pairwise_sq_distances(data.as_ref()).unwrap();
        let expected =
            gaussian_affinities(dist.as_ref(), &Bandwidth::Constant(10.0), &KernelParams::default())
                .unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(p[(i, j)], expected[(i, j)]);
            }
        }
    }

    #[test]
    fn test_tsne_from_init_converges() {
        let data = make_test_image_points();
        let params = constant_params(10.0);

        let res = tsne_from_init(
            data.as_ref(),
            make_test_map_points(),
            &params,
            &mut NoopObserver,
            false,
        )
        .unwrap();

        assert_eq!(res.status, OptimiserStatus::Converged);
        assert!(res.n_iter > 0 && res.n_iter < 1000);
        assert_eq!(res.embedding.nrows(), 4);
        assert_eq!(res.embedding.ncols(), 2);
    }

    #[test]
    fn test_tsne_from_init_shape_errors() {
        let data = make_test_image_points();
        let params = constant_params(10.0);

        let too_few = faer::mat![[0.0, 0.0], [1.0, 1.0]];
        let res = tsne_from_init(data.as_ref(), too_few, &params, &mut NoopObserver, false);
        assert!(matches!(res, Err(TsneError::InvalidInput(_))));

        let wrong_dim = Mat::from_fn(4, 3, |i, j| (i + j) as f64);
        let res = tsne_from_init(data.as_ref(), wrong_dim, &params, &mut NoopObserver, false);
        assert!(matches!(res, Err(TsneError::InvalidInput(_))));
    }

    #[test]
    fn test_tsne_is_reproducible() {
        let data = make_test_image_points();
        let params = TsneParams {
            bandwidth: BandwidthSelection::Perplexity(2.0),
            optim_params: TsneOptimParams::new(Some(50), Some(10.0), None, None, None),
            ..TsneParams::default()
        };

        let a = tsne(data.as_ref(), &params, 42, false).unwrap();
        let b = tsne(data.as_ref(), &params, 42, false).unwrap();

        assert_eq!(a.n_iter, b.n_iter);
        for i in 0..4 {
            for k in 0..2 {
                assert_eq!(a.embedding[(i, k)], b.embedding[(i, k)]);
            }
        }
    }
}
