pub mod objective;
pub mod tsne_optimiser;

use num_traits::{Float, FromPrimitive};

use crate::error::*;
use crate::training::objective::ObjectiveParams;

/////////////
// Globals //
/////////////

const TSNE_MOMENTUM_SWITCH_ITER: usize = 250;
const TSNE_INITIAL_MOMENTUM: f64 = 0.5;
const TSNE_FINAL_MOMENTUM: f64 = 0.8;

////////////
// Params //
////////////

/// Momentum policy of the gradient descent
#[derive(Clone, Debug, PartialEq)]
pub enum MomentumSchedule<T> {
    /// Same momentum for every iteration
    Constant(T),
    /// `initial` before `switch_iter`, `late` from then on
    Switch {
        initial: T,
        late: T,
        switch_iter: usize,
    },
}

impl<T> MomentumSchedule<T>
where
    T: Float,
{
    /// Momentum to use at a given iteration
    #[inline(always)]
    pub fn momentum_at(&self, iter: usize) -> T {
        match self {
            MomentumSchedule::Constant(m) => *m,
            MomentumSchedule::Switch {
                initial,
                late,
                switch_iter,
            } => {
                if iter < *switch_iter {
                    *initial
                } else {
                    *late
                }
            }
        }
    }

    /// All momenta must lie in `[0, 1)`
    pub fn validate(&self) -> Result<(), TsneError> {
        let in_range = |m: T| m >= T::zero() && m < T::one();
        let ok = match self {
            MomentumSchedule::Constant(m) => in_range(*m),
            MomentumSchedule::Switch { initial, late, .. } => in_range(*initial) && in_range(*late),
        };
        if ok {
            Ok(())
        } else {
            Err(invalid_input("Momentum must lie in [0, 1)"))
        }
    }
}

impl<T: Float + FromPrimitive> Default for MomentumSchedule<T> {
    fn default() -> Self {
        MomentumSchedule::Switch {
            initial: T::from_f64(TSNE_INITIAL_MOMENTUM).unwrap(),
            late: T::from_f64(TSNE_FINAL_MOMENTUM).unwrap(),
            switch_iter: TSNE_MOMENTUM_SWITCH_ITER,
        }
    }
}

/// t-SNE specific optimisation parameters
///
/// ### Fields
///
/// * `max_iter` - Iteration cap
/// * `lr` - Learning rate
/// * `eps` - Convergence tolerance; the loop stops once
///   `||grad||² <= eps * ||grad_0||²`
/// * `momentum` - Momentum schedule
/// * `report_every` - Cadence (in iterations) of the diagnostic records sent
///   to the observer. `0` switches them off.
/// * `objective` - Student-t normalisation and gradient form
#[derive(Clone, Debug)]
pub struct TsneOptimParams<T> {
    pub max_iter: usize,
    pub lr: T,
    pub eps: T,
    pub momentum: MomentumSchedule<T>,
    pub report_every: usize,
    pub objective: ObjectiveParams,
}

impl<T> TsneOptimParams<T>
where
    T: Float + FromPrimitive,
{
    /// Generate a new instance
    ///
    /// ### Params
    ///
    /// * `max_iter` - Iteration cap. Default `1000`.
    /// * `lr` - Learning rate. Default `100.0`.
    /// * `eps` - Relative squared gradient norm threshold. Default `1e-6`.
    /// * `momentum` - Momentum schedule. Default `0.5` for 250 iterations,
    ///   `0.8` afterwards.
    /// * `report_every` - Diagnostic cadence. Default `100`.
    ///
    /// ### Returns
    ///
    /// Initialised self
    pub fn new(
        max_iter: Option<usize>,
        lr: Option<T>,
        eps: Option<T>,
        momentum: Option<MomentumSchedule<T>>,
        report_every: Option<usize>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            max_iter: max_iter.unwrap_or(defaults.max_iter),
            lr: lr.unwrap_or(defaults.lr),
            eps: eps.unwrap_or(defaults.eps),
            momentum: momentum.unwrap_or(defaults.momentum),
            report_every: report_every.unwrap_or(defaults.report_every),
            objective: defaults.objective,
        }
    }

    /// Check the parameters
    pub fn validate(&self) -> Result<(), TsneError> {
        if self.max_iter == 0 {
            return Err(invalid_input("Iteration cap must be positive"));
        }
        if !(self.lr.is_finite() && self.lr > T::zero()) {
            return Err(invalid_input("Learning rate must be positive and finite"));
        }
        if !(self.eps.is_finite() && self.eps >= T::zero()) {
            return Err(invalid_input("Convergence eps must be non-negative"));
        }
        self.momentum.validate()
    }
}

impl<T: Float + FromPrimitive> Default for TsneOptimParams<T> {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            lr: T::from_f64(100.0).unwrap(),
            eps: T::from_f64(1e-6).unwrap(),
            momentum: MomentumSchedule::default(),
            report_every: 100,
            objective: ObjectiveParams::default(),
        }
    }
}

#[cfg(test)]
mod test_training_params {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tsne_params_defaults() {
        let params = TsneOptimParams::<f64>::default();
        assert_eq!(params.max_iter, 1000);
        assert_relative_eq!(params.lr, 100.0);
        assert_relative_eq!(params.eps, 1e-6);
        assert_eq!(params.report_every, 100);
        assert!(params.validate().is_ok());

        let params = TsneOptimParams::new(Some(50), Some(10.0), None, None, Some(0));
        assert_eq!(params.max_iter, 50);
        assert_relative_eq!(params.lr, 10.0);
        assert_relative_eq!(params.eps, 1e-6);
        assert_eq!(params.report_every, 0);
    }

    #[test]
    fn test_momentum_schedule() {
        let schedule = MomentumSchedule::<f64>::default();
        assert_relative_eq!(schedule.momentum_at(0), 0.5);
        assert_relative_eq!(schedule.momentum_at(249), 0.5);
        assert_relative_eq!(schedule.momentum_at(250), 0.8);

        let constant = MomentumSchedule::Constant(0.3);
        assert_relative_eq!(constant.momentum_at(10_000), 0.3);
    }

    #[test]
    fn test_params_validation() {
        let base = TsneOptimParams::<f64>::default();

        let bad = TsneOptimParams { lr: 0.0, ..base.clone() };
        assert!(matches!(bad.validate(), Err(TsneError::InvalidInput(_))));

        let bad = TsneOptimParams { max_iter: 0, ..base.clone() };
        assert!(bad.validate().is_err());

        let bad = TsneOptimParams { eps: -1.0, ..base.clone() };
        assert!(bad.validate().is_err());

        let bad = TsneOptimParams {
            momentum: MomentumSchedule::Constant(1.0),
            ..base.clone()
        };
        assert!(bad.validate().is_err());

        let ok = TsneOptimParams {
            momentum: MomentumSchedule::Constant(0.0),
            ..base
        };
        assert!(ok.validate().is_ok());
    }
}
