use faer::{Mat, MatRef};
use num_traits::{Float, FromPrimitive};
use std::time::Instant;
use thousands::*;
use tracing::debug;

use crate::error::*;
use crate::training::objective::*;
use crate::training::TsneOptimParams;

///////////
// State //
///////////

/// Where the optimiser currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimiserStatus {
    /// More steps to do
    Running,
    /// `||grad|| <= sqrt(eps) * ||grad_0||`
    Converged,
    /// `max_iter` steps were taken
    IterationCapReached,
    /// The observer asked to stop
    Stopped,
}

impl OptimiserStatus {
    /// Whether no further step will change the state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OptimiserStatus::Running)
    }
}

/// Caller-owned optimiser state
///
/// The embedding and the momentum buffer are only written by `tsne_step()`.
///
/// ### Fields
///
/// * `embd` - Current embedding (samples × components)
/// * `update` - Previous update (momentum buffer), same shape as `embd`
/// * `iter` - Number of updates applied so far
/// * `initial_grad_norm` - Norm of the first gradient; convergence reference
/// * `last_grad_norm` - Norm of the most recent gradient
/// * `status` - Current status
#[derive(Clone, Debug)]
pub struct TsneOptimiserState<T> {
    pub embd: Mat<T>,
    pub update: Mat<T>,
    pub iter: usize,
    pub initial_grad_norm: Option<T>,
    pub last_grad_norm: Option<T>,
    pub status: OptimiserStatus,
}

impl<T> TsneOptimiserState<T>
where
    T: Float,
{
    /// Fresh state at a starting embedding with a zeroed momentum buffer
    ///
    /// ### Params
    ///
    /// * `embd` - Starting embedding (samples × components)
    ///
    /// ### Returns
    ///
    /// Initialised self in the `Running` state
    pub fn new(embd: Mat<T>) -> Self {
        let update = Mat::from_fn(embd.nrows(), embd.ncols(), |_, _| T::zero());
        Self {
            embd,
            update,
            iter: 0,
            initial_grad_norm: None,
            last_grad_norm: None,
            status: OptimiserStatus::Running,
        }
    }

    /// Consume the state and return the embedding
    pub fn into_embedding(self) -> Mat<T> {
        self.embd
    }
}

//////////////
// Observer //
//////////////

/// A diagnostic record sent to the observer
///
/// ### Fields
///
/// * `iter` - Number of updates applied
/// * `loss` - KL loss of the current embedding
/// * `grad_norm` - Norm of the gradient of the last update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Diagnostic<T> {
    pub iter: usize,
    pub loss: T,
    pub grad_norm: T,
}

/// Answer of an observer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverSignal {
    Continue,
    Stop,
}

/// Receives diagnostic records from the optimisation loop
pub trait TsneObserver<T> {
    /// Called every `report_every` iterations
    fn observe(&mut self, record: &Diagnostic<T>) -> ObserverSignal;
}

impl<T, F> TsneObserver<T> for F
where
    F: FnMut(&Diagnostic<T>) -> ObserverSignal,
{
    fn observe(&mut self, record: &Diagnostic<T>) -> ObserverSignal {
        self(record)
    }
}

/// Observer that ignores all records
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl<T> TsneObserver<T> for NoopObserver {
    fn observe(&mut self, _record: &Diagnostic<T>) -> ObserverSignal {
        ObserverSignal::Continue
    }
}

/// Observer that keeps every record
#[derive(Clone, Debug, Default)]
pub struct LossHistory<T> {
    pub records: Vec<Diagnostic<T>>,
}

impl<T: Copy> TsneObserver<T> for LossHistory<T> {
    fn observe(&mut self, record: &Diagnostic<T>) -> ObserverSignal {
        self.records.push(*record);
        ObserverSignal::Continue
    }
}

///////////////
// Optimiser //
///////////////

/// One transition of the momentum gradient descent
///
/// 1. Stop with `IterationCapReached` if `max_iter` updates were applied.
/// 2. Compute the gradient; its norm becomes the convergence reference on
///    the first call.
/// 3. Stop with `Converged` if `||grad|| <= sqrt(eps) * ||grad_0||`; the
///    embedding is left untouched.
/// 4. `update = momentum * update + lr * grad`, `embd -= update`.
///
/// ### Params
///
/// * `state` - Optimiser state, updated in place
/// * `p` - Fixed high-dimensional affinities (`N × N`)
/// * `params` - Optimiser parameters
///
/// ### Returns
///
/// The status after the transition. Terminal states are returned unchanged.
pub fn tsne_step<T>(
    state: &mut TsneOptimiserState<T>,
    p: MatRef<T>,
    params: &TsneOptimParams<T>,
) -> Result<OptimiserStatus, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
{
    if state.status.is_terminal() {
        return Ok(state.status);
    }
    params.validate()?;
    if state.update.nrows() != state.embd.nrows() || state.update.ncols() != state.embd.ncols() {
        return Err(invalid_input(format!(
            "Momentum buffer is {} x {}, embedding is {} x {}",
            state.update.nrows(),
            state.update.ncols(),
            state.embd.nrows(),
            state.embd.ncols()
        )));
    }

    if state.iter >= params.max_iter {
        state.status = OptimiserStatus::IterationCapReached;
        return Ok(state.status);
    }

    let grad = tsne_gradient(p, state.embd.as_ref(), &params.objective)?;
    let grad_norm = frobenius_norm(grad.as_ref());
    let initial = *state.initial_grad_norm.get_or_insert(grad_norm);
    state.last_grad_norm = Some(grad_norm);

    if grad_norm <= params.eps.sqrt() * initial {
        state.status = OptimiserStatus::Converged;
        return Ok(state.status);
    }

    let momentum = params.momentum.momentum_at(state.iter);
    for j in 0..state.embd.ncols() {
        for i in 0..state.embd.nrows() {
            let update = momentum * state.update[(i, j)] + params.lr * grad[(i, j)];
            state.update[(i, j)] = update;
            state.embd[(i, j)] = state.embd[(i, j)] - update;
        }
    }
    state.iter += 1;

    Ok(state.status)
}

/// Optimise an embedding with exact t-SNE
///
/// Minimises `KL(P || Q)` between the fixed high-dimensional affinities and
/// the Student-t affinities of the embedding with momentum gradient descent,
/// until convergence, the iteration cap or an observer stop.
///
/// ### Params
///
/// * `state` - Caller-owned optimiser state (embedding + momentum buffer)
/// * `p` - Fixed high-dimensional affinities (`N × N`)
/// * `params` - Optimiser parameters
/// * `observer` - Receives `(iteration, loss, gradient norm)` every
///   `params.report_every` iterations and may stop the loop
/// * `verbose` - Print the diagnostic records
///
/// ### Returns
///
/// The terminal status
///
/// ### Notes
///
/// The loss is only evaluated for the observer; convergence is decided on
/// the gradient norm alone.
pub fn optimise_tsne<T, O>(
    state: &mut TsneOptimiserState<T>,
    p: MatRef<T>,
    params: &TsneOptimParams<T>,
    observer: &mut O,
    verbose: bool,
) -> Result<OptimiserStatus, TsneError>
where
    T: Float + FromPrimitive + Send + Sync,
    O: TsneObserver<T> + ?Sized,
{
    params.validate()?;
    let start = Instant::now();

    loop {
        let status = tsne_step(state, p, params)?;
        if status.is_terminal() {
            break;
        }

        if params.report_every > 0 && state.iter % params.report_every == 0 {
            let loss = embedding_loss(p, state.embd.as_ref(), &params.objective)?;
            let record = Diagnostic {
                iter: state.iter,
                loss,
                grad_norm: state.last_grad_norm.unwrap_or_else(T::zero),
            };

            if verbose {
                println!(
                    "Iteration {} out of {} | KL = {:.6} | ||grad|| = {:.6e}",
                    state.iter.separate_with_underscores(),
                    params.max_iter.separate_with_underscores(),
                    loss.to_f64().unwrap_or(f64::NAN),
                    record.grad_norm.to_f64().unwrap_or(f64::NAN),
                );
            }

            if observer.observe(&record) == ObserverSignal::Stop {
                state.status = OptimiserStatus::Stopped;
                break;
            }
        }
    }

    debug!(
        iterations = state.iter,
        status = ?state.status,
        elapsed = ?start.elapsed(),
        "t-SNE optimisation finished"
    );

    if verbose {
        println!(
            "Optimisation stopped after {} iterations ({:?}) in {:.2?}.",
            state.iter.separate_with_underscores(),
            state.status,
            start.elapsed()
        );
    }

    Ok(state.status)
}

///////////
// Tests //
///////////
