use faer::Mat;
use num_traits::{Float, FromPrimitive, ToPrimitive};
use rand::{
    rngs::StdRng,
    {Rng, SeedableRng},
};
use rand_distr::{Distribution, StandardNormal};

use crate::error::*;

// Default spreads of the starting embedding

pub const RANDOM_RANGE: f64 = 1.0;
pub const GAUSSIAN_STD: f64 = 1e-4;

/////////////
// Helpers //
/////////////

/// Different initialisation methods for the t-SNE embedding
#[derive(Clone, Debug, PartialEq)]
pub enum EmbdInit<T> {
    /// Uniform in `[-range, range)`
    RandomInit { range: Option<T> },
    /// Isotropic Gaussian around the origin
    GaussianInit { std: Option<T> },
}

impl<T> EmbdInit<T>
where
    T: Float,
{
    /// A given range or standard deviation must be positive and finite
    pub fn validate(&self) -> Result<(), TsneError> {
        let (name, spread) = match self {
            EmbdInit::RandomInit { range } => ("range", range),
            EmbdInit::GaussianInit { std } => ("standard deviation", std),
        };
        match spread {
            Some(v) if !(v.is_finite() && *v > T::zero()) => Err(invalid_input(format!(
                "Initialisation {} must be positive and finite",
                name
            ))),
            _ => Ok(()),
        }
    }
}

impl<T> Default for EmbdInit<T> {
    fn default() -> Self {
        EmbdInit::RandomInit { range: None }
    }
}

/// Parse the respective initialisation
///
/// ### Params
///
/// * `s` - String that defines the initialisation method: `"random"` or
///   `"gaussian"`
/// * `spread` - Range (random) or standard deviation (gaussian). `None`
///   uses the defaults
///
/// ### Returns
///
/// The Option of a EmbdInit
pub fn parse_initialisation<T>(s: &str, spread: Option<T>) -> Option<EmbdInit<T>>
where
    T: Float,
{
    match s.to_lowercase().as_str() {
        "random" | "uniform" => Some(EmbdInit::RandomInit { range: spread }),
        "gaussian" | "normal" => Some(EmbdInit::GaussianInit { std: spread }),
        _ => None,
    }
}

////////////
// Random //
////////////

/// Random uniform embedding initialisation
///
/// ### Params
///
/// * `n_samples` - Number of samples to initialise
/// * `n_comp` - Dimensionality of the embedding
/// * `seed` - Random seed
/// * `range` - Half-width of the interval. Defaults to `1.0`
///
/// ### Returns
///
/// `n_samples × n_comp` matrix uniformly distributed in `[-range, range)`
pub fn random_layout<T>(n_samples: usize, n_comp: usize, seed: u64, range: Option<T>) -> Mat<T>
where
    T: Float + FromPrimitive + ToPrimitive,
{
    let range = range
        .unwrap_or(T::from_f64(RANDOM_RANGE).unwrap())
        .to_f64()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(seed);

    Mat::from_fn(n_samples, n_comp, |_, _| {
        T::from_f64(rng.random_range(-range..range)).unwrap()
    })
}

//////////////
// Gaussian //
//////////////

/// Gaussian embedding initialisation
///
/// The classic t-SNE start: a tight cloud around the origin.
///
/// ### Params
///
/// * `n_samples` - Number of samples to initialise
/// * `n_comp` - Dimensionality of the embedding
/// * `seed` - Random seed
/// * `std` - Standard deviation. Defaults to `1e-4`
///
/// ### Returns
///
/// `n_samples × n_comp` matrix drawn from `N(0, std²)`
pub fn gaussian_layout<T>(n_samples: usize, n_comp: usize, seed: u64, std: Option<T>) -> Mat<T>
where
    T: Float + FromPrimitive,
    StandardNormal: Distribution<T>,
{
    let std = std.unwrap_or(T::from_f64(GAUSSIAN_STD).unwrap());
    let mut rng = StdRng::seed_from_u64(seed);

    Mat::from_fn(n_samples, n_comp, |_, _| {
        let z: T = StandardNormal.sample(&mut rng);
        z * std
    })
}

/// Initialise the embedding
///
/// ### Params
///
/// * `init_method` - Which initialisation to use
/// * `n_samples` - Number of samples
/// * `n_comp` - Dimensionality of the embedding
/// * `seed` - Random seed
///
/// ### Returns
///
/// Initial embedding coordinates (samples × components)
pub fn initialise_embedding<T>(
    init_method: &EmbdInit<T>,
    n_samples: usize,
    n_comp: usize,
    seed: u64,
) -> Mat<T>
where
    T: Float + FromPrimitive + ToPrimitive,
    StandardNormal: Distribution<T>,
{
    match init_method {
        EmbdInit::RandomInit { range } => random_layout(n_samples, n_comp, seed, *range),
        EmbdInit::GaussianInit { std } => gaussian_layout(n_samples, n_comp, seed, *std),
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod test_init {
    use super::*;

    #[test]
    fn test_parse_initialisation() {
        assert!(matches!(
            parse_initialisation::<f64>("random", None),
            Some(EmbdInit::RandomInit { range: None })
        ));
        assert!(matches!(
            parse_initialisation::<f64>("RANDOM", Some(0.5)),
            Some(EmbdInit::RandomInit { range: Some(_) })
        ));
        assert!(matches!(
            parse_initialisation::<f64>("gaussian", None),
            Some(EmbdInit::GaussianInit { std: None })
        ));
        assert!(matches!(
            parse_initialisation::<f64>("normal", Some(1e-2)),
            Some(EmbdInit::GaussianInit { std: Some(_) })
        ));
        assert!(parse_initialisation::<f64>("spectral", None).is_none());
    }

    #[test]
    fn test_init_validation() {
        assert!(EmbdInit::<f64>::default().validate().is_ok());
        assert!(EmbdInit::RandomInit { range: Some(0.5) }.validate().is_ok());
        assert!(EmbdInit::GaussianInit { std: Some(1e-4) }.validate().is_ok());

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                EmbdInit::RandomInit { range: Some(bad) }.validate(),
                Err(TsneError::InvalidInput(_))
            ));
            assert!(matches!(
                EmbdInit::GaussianInit { std: Some(bad) }.validate(),
                Err(TsneError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_random_layout_range() {
        let embd: Mat<f64> = random_layout(100, 3, 42, Some(2.0));

        assert_eq!(embd.nrows(), 100);
        assert_eq!(embd.ncols(), 3);
        for i in 0..100 {
            for j in 0..3 {
                assert!(embd[(i, j)] >= -2.0 && embd[(i, j)] < 2.0);
            }
        }
    }

    #[test]
    fn test_random_layout_reproducible() {
        let embd1: Mat<f64> = random_layout(20, 2, 42, None);
        let embd2: Mat<f64> = random_layout(20, 2, 42, None);
        let embd3: Mat<f64> = random_layout(20, 2, 123, None);

        let mut same = true;
        let mut differs = false;
        for i in 0..20 {
            for j in 0..2 {
                same &= embd1[(i, j)] == embd2[(i, j)];
                differs |= embd1[(i, j)] != embd3[(i, j)];
            }
        }
        assert!(same, "Same seed should give the same layout");
        assert!(differs, "Different seeds should give different layouts");
    }

    #[test]
    fn test_gaussian_layout_spread() {
        let embd: Mat<f64> = gaussian_layout(500, 2, 42, None);

        let coords: Vec<f64> = (0..500)
            .flat_map(|i| (0..2).map(move |j| (i, j)))
            .map(|(i, j)| embd[(i, j)])
            .collect();
        let mean = coords.iter().sum::<f64>() / coords.len() as f64;
        let std = (coords.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / coords.len() as f64)
            .sqrt();

        assert!(coords.iter().all(|x| x.is_finite()));
        assert!(mean.abs() < 3e-5, "mean {} too far from zero", mean);
        assert!(std > 0.5e-4 && std < 2e-4, "std {} not around 1e-4", std);
    }

    #[test]
    fn test_initialise_embedding() {
        let embd: Mat<f64> =
            initialise_embedding(&EmbdInit::RandomInit { range: None }, 7, 3, 42);
        assert_eq!((embd.nrows(), embd.ncols()), (7, 3));

        let embd: Mat<f64> =
            initialise_embedding(&EmbdInit::GaussianInit { std: Some(0.1) }, 4, 2, 42);
        assert_eq!((embd.nrows(), embd.ncols()), (4, 2));
    }
}
