//! L-BFGS minimization of the [`Objective`] over the latent vector of a [`ParameterStore`].
use crate::errors::{NsgpError, Result};
use crate::objective::Objective;
use crate::parameter_store::ParameterStore;
use crate::utils::into_f64;
use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{
    CostFunction, Error, Executor, Gradient, IterState, State, TerminationReason,
    TerminationStatus, KV,
};
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::BacktrackingLineSearch;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;
use linfa::Float;
use log::{debug, info};
use ndarray::Array1;
use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::time::Instant;

type LbfgsState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// Sufficient decrease constant of the Armijo condition
const ARMIJO_C: f64 = 1e-4;
/// Step contraction factor of the backtracking line search
const BACKTRACKING_RHO: f64 = 0.5;
/// Half width of the latent box explored by the optimizer, every parameter stays
/// within `[exp(-LATENT_BOUND), exp(LATENT_BOUND)]` during training
const LATENT_BOUND: f64 = 10.;

/// Maps an unconstrained optimizer coordinate to a latent value in the box
fn to_latent(u: f64) -> f64 {
    LATENT_BOUND * (u / LATENT_BOUND).tanh()
}

/// Inverse of [`to_latent`], latent values on the boundary map to its last
/// representable preimage
fn from_latent(latent: f64) -> Result<f64> {
    let ratio = latent / LATENT_BOUND;
    if !(ratio.abs() <= 1.) {
        return Err(NsgpError::InvalidValueError(format!(
            "latent value {latent} outside of [-{LATENT_BOUND}, {LATENT_BOUND}]"
        )));
    }
    let edge = 1. - f64::EPSILON;
    Ok(LATENT_BOUND * ratio.clamp(-edge, edge).atanh())
}

fn finite_cost(cost: f64) -> Result<f64> {
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(NsgpError::NumericalInstabilityError(format!(
            "negative log posterior is not finite ({cost})"
        )))
    }
}

/// Settings of an optimization run
#[derive(Clone, Debug)]
pub(crate) struct LbfgsParams {
    pub max_iters: u64,
    pub mem: usize,
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub trace: bool,
}

/// Report of a hyperparameters optimization run
#[derive(Clone, Debug)]
pub struct OptimOutcome {
    /// Negative log posterior at the starting parameters
    pub initial_cost: f64,
    /// Best negative log posterior reached, the store holds the matching parameters
    pub best_cost: f64,
    /// Number of L-BFGS iterations
    pub iterations: u64,
    /// Why the optimizer stopped
    pub termination: TerminationStatus,
    /// Cost after each iteration
    pub history: Vec<f64>,
}

/// The objective seen by argmin as a function of the optimizer coordinates.
///
/// argmin may end a run on a failing evaluation with a successful termination
/// status, so the first error is kept in `failure` for the caller.
struct LatentProblem<'a, F: Float> {
    objective: &'a Objective<'a, F>,
    store: &'a ParameterStore<F>,
    failure: &'a RefCell<Option<NsgpError>>,
}

impl<'a, F: Float> LatentProblem<'a, F> {
    fn evaluate(&self, u: &[f64]) -> Result<f64> {
        if u.iter().any(|v| !v.is_finite()) {
            return Err(NsgpError::NumericalInstabilityError(
                "optimizer produced non finite parameters".to_string(),
            ));
        }
        let latent = u
            .iter()
            .map(|v| F::cast(to_latent(*v)))
            .collect::<Array1<F>>();
        let store = self.store.with_latent(latent)?;
        finite_cost(into_f64(self.objective.negative_log_posterior(&store)?))
    }

    fn fail(&self, err: NsgpError) -> Error {
        let msg = err.to_string();
        self.failure.borrow_mut().get_or_insert(err);
        Error::msg(msg)
    }
}

impl<'a, F: Float> CostFunction for LatentProblem<'a, F> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> std::result::Result<Self::Output, Error> {
        self.evaluate(u).map_err(|err| self.fail(err))
    }
}

impl<'a, F: Float> Gradient for LatentProblem<'a, F> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// Central finite differences, any failing evaluation aborts the run
    fn gradient(&self, u: &Self::Param) -> std::result::Result<Self::Gradient, Error> {
        let failure: RefCell<Option<NsgpError>> = RefCell::new(None);
        let cost = |p: &Vec<f64>| -> f64 {
            match self.evaluate(p) {
                Ok(c) => c,
                Err(err) => {
                    failure.borrow_mut().get_or_insert(err);
                    f64::NAN
                }
            }
        };
        let grad = u.central_diff(&cost);
        match failure.take() {
            Some(err) => Err(self.fail(err)),
            None => Ok(grad),
        }
    }
}

/// Error of a finished run: the first failing evaluation, then any solver exit
fn run_failure(
    failure: &RefCell<Option<NsgpError>>,
    termination: &TerminationStatus,
) -> Result<()> {
    if let Some(err) = failure.take() {
        return Err(err);
    }
    match termination {
        TerminationStatus::Terminated(TerminationReason::SolverExit(msg)) => {
            Err(NsgpError::OptimizationError(msg.clone()))
        }
        _ => Ok(()),
    }
}

/// Records the cost history and logs iterations when tracing
struct CostRecorder {
    history: Arc<Mutex<Vec<f64>>>,
    trace: bool,
}

impl Observe<LbfgsState> for CostRecorder {
    fn observe_iter(&mut self, state: &LbfgsState, _kv: &KV) -> std::result::Result<(), Error> {
        let cost = state.get_cost();
        if let Ok(mut history) = self.history.lock() {
            history.push(cost);
        }
        if self.trace {
            info!(
                "iter {:>4}  cost = {:.6e}  best = {:.6e}",
                state.get_iter(),
                cost,
                state.get_best_cost()
            );
        }
        Ok(())
    }
}

/// Minimizes `objective` with L-BFGS starting from the latent vector of `store`.
///
/// Returns the best latent vector found, the store itself is left untouched.
/// Any failing evaluation during the run is returned unchanged.
pub(crate) fn optimize_params<F: Float>(
    objective: &Objective<F>,
    store: &ParameterStore<F>,
    params: &LbfgsParams,
) -> Result<(Array1<F>, OptimOutcome)> {
    let initial_cost = finite_cost(into_f64(objective.negative_log_posterior(store)?))?;
    if params.max_iters == 0 {
        return Ok((
            store.latent().to_owned(),
            OptimOutcome {
                initial_cost,
                best_cost: initial_cost,
                iterations: 0,
                termination: TerminationStatus::NotTerminated,
                history: vec![],
            },
        ));
    }
    let u0 = store
        .latent()
        .iter()
        .map(|v| from_latent(into_f64(*v)))
        .collect::<Result<Vec<_>>>()?;

    let linesearch: BacktrackingLineSearch<Vec<f64>, Vec<f64>, ArmijoCondition<f64>, f64> =
        BacktrackingLineSearch::new(ArmijoCondition::new(ARMIJO_C)?).rho(BACKTRACKING_RHO)?;
    let mut solver: LBFGS<_, Vec<f64>, Vec<f64>, f64> = LBFGS::new(linesearch, params.mem);
    if let Some(tol) = params.tol_grad {
        solver = solver.with_tolerance_grad(tol)?;
    }
    if let Some(tol) = params.tol_cost {
        solver = solver.with_tolerance_cost(tol)?;
    }

    let history = Arc::new(Mutex::new(Vec::new()));
    let recorder = CostRecorder {
        history: Arc::clone(&history),
        trace: params.trace,
    };
    if params.trace {
        info!(
            "L-BFGS start: {} parameters, cost = {initial_cost:.6e}",
            u0.len()
        );
    }

    let failure = RefCell::new(None);
    let problem = LatentProblem {
        objective,
        store,
        failure: &failure,
    };
    let now = Instant::now();
    let run = Executor::new(problem, solver)
        .configure(|state| state.param(u0).max_iters(params.max_iters))
        .add_observer(recorder, ObserverMode::Always)
        .run();
    debug!("elapsed optim = {:?}", now.elapsed().as_millis());

    let mut state = match run {
        Ok(result) => result.state().clone(),
        Err(err) => return Err(failure.take().unwrap_or_else(|| err.into())),
    };
    let termination = state.get_termination_status().clone();
    run_failure(&failure, &termination)?;

    let best_cost = state.get_best_cost();
    let iterations = state.get_iter();
    let history = history.lock().map(|h| h.clone()).unwrap_or_default();
    let (latent, best_cost) = match state.take_best_param() {
        Some(best) if best_cost <= initial_cost => (
            best.into_iter()
                .map(|u| F::cast(to_latent(u)))
                .collect::<Array1<F>>(),
            best_cost,
        ),
        _ => (store.latent().to_owned(), initial_cost),
    };
    info!(
        "L-BFGS: {iterations} iterations, cost {initial_cost:.6e} -> {best_cost:.6e} \
         ({termination:?})"
    );

    Ok((
        latent,
        OptimOutcome {
            initial_cost,
            best_cost,
            iterations,
            termination,
            history,
        },
    ))
}
