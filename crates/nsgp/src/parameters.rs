use crate::errors::{NsgpError, Result};
use crate::inducings::Inducings;
use crate::{NSGP_JITTER, NSGP_LBFGS_MEM, NSGP_MAX_ITERS};
use linfa::{Float, ParamGuard};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A set of validated NSGP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(serialize = "F: Serialize", deserialize = "F: Deserialize<'de>"))
)]
pub struct NsgpValidParams<F: Float> {
    /// Inducing points of the local lengthscale GPs
    pub(crate) inducings: Inducings<F>,
    /// Seed of the random initialization of the parameters (and of randomized inducings)
    pub(crate) seed: u64,
    /// Max number of L-BFGS iterations when fitting
    pub(crate) max_iters: u64,
    /// Number of corrections kept by L-BFGS
    pub(crate) lbfgs_mem: usize,
    /// Optional L-BFGS gradient norm tolerance
    pub(crate) tol_grad: Option<f64>,
    /// Optional L-BFGS cost change tolerance
    pub(crate) tol_cost: Option<f64>,
    /// Relative diagonal jitter added before each Cholesky factorization
    pub(crate) jitter: F,
    /// Log optimizer iterations
    pub(crate) trace: bool,
}

impl<F: Float> Default for NsgpValidParams<F> {
    fn default() -> NsgpValidParams<F> {
        NsgpValidParams {
            inducings: Inducings::default(),
            seed: 0,
            max_iters: NSGP_MAX_ITERS,
            lbfgs_mem: NSGP_LBFGS_MEM,
            tol_grad: None,
            tol_cost: None,
            jitter: F::cast(NSGP_JITTER),
            trace: false,
        }
    }
}

impl<F: Float> NsgpValidParams<F> {
    /// Get inducing points specification
    pub fn inducings(&self) -> &Inducings<F> {
        &self.inducings
    }

    /// Get random seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get max number of optimizer iterations
    pub fn max_iters(&self) -> u64 {
        self.max_iters
    }

    /// Get L-BFGS history size
    pub fn lbfgs_mem(&self) -> usize {
        self.lbfgs_mem
    }

    /// Get gradient tolerance
    pub fn tol_grad(&self) -> Option<f64> {
        self.tol_grad
    }

    /// Get cost tolerance
    pub fn tol_cost(&self) -> Option<f64> {
        self.tol_cost
    }

    /// Get jitter
    pub fn jitter(&self) -> F {
        self.jitter
    }

    /// Whether optimizer iterations are logged
    pub fn trace(&self) -> bool {
        self.trace
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [NSGP algorithm](crate::NsgpRegression).
pub struct NsgpParams<F: Float>(NsgpValidParams<F>);

impl<F: Float> NsgpParams<F> {
    /// A constructor for NSGP parameters given inducing points specification
    pub fn new(inducings: Inducings<F>) -> NsgpParams<F> {
        Self(NsgpValidParams {
            inducings,
            ..Default::default()
        })
    }

    /// A constructor for NSGP parameters from validated parameters
    pub fn new_from_valid(params: &NsgpValidParams<F>) -> Self {
        Self(params.clone())
    }

    /// Set inducing points specification
    pub fn inducings(mut self, inducings: Inducings<F>) -> Self {
        self.0.inducings = inducings;
        self
    }

    /// Set random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set max number of L-BFGS iterations, 0 skips the optimization
    pub fn max_iters(mut self, max_iters: u64) -> Self {
        self.0.max_iters = max_iters;
        self
    }

    /// Set L-BFGS history size
    pub fn lbfgs_mem(mut self, lbfgs_mem: usize) -> Self {
        self.0.lbfgs_mem = lbfgs_mem;
        self
    }

    /// Set gradient norm tolerance
    pub fn tol_grad(mut self, tol_grad: f64) -> Self {
        self.0.tol_grad = Some(tol_grad);
        self
    }

    /// Set cost change tolerance
    pub fn tol_cost(mut self, tol_cost: f64) -> Self {
        self.0.tol_cost = Some(tol_cost);
        self
    }

    /// Set jitter.
    ///
    /// Jitter is used to improve numerical stability: `jitter * max(diag(A))`
    /// is added to the diagonal of every factorized matrix `A`. May be 0.
    pub fn jitter(mut self, jitter: F) -> Self {
        self.0.jitter = jitter;
        self
    }

    /// Log each optimizer iteration at info level
    pub fn trace(mut self, trace: bool) -> Self {
        self.0.trace = trace;
        self
    }
}

impl<F: Float> From<NsgpValidParams<F>> for NsgpParams<F> {
    fn from(valid: NsgpValidParams<F>) -> Self {
        NsgpParams(valid)
    }
}

fn check_tolerance(name: &str, tol: Option<f64>) -> Result<()> {
    match tol {
        Some(t) if !(t.is_finite() && t > 0.) => Err(NsgpError::InvalidValueError(format!(
            "`{name}` should be strictly positive, got {t}"
        ))),
        _ => Ok(()),
    }
}

impl<F: Float> ParamGuard for NsgpParams<F> {
    type Checked = NsgpValidParams<F>;
    type Error = NsgpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        match &self.0.inducings {
            Inducings::Randomized(0) | Inducings::Linspaced(0) => {
                return Err(NsgpError::InvalidValueError(
                    "number of inducing points should be at least 1".to_string(),
                ))
            }
            Inducings::Located(z) if z.nrows() == 0 || z.ncols() == 0 => {
                return Err(NsgpError::InvalidValueError(format!(
                    "inducing points should be a non empty matrix, got {:?}",
                    z.dim()
                )))
            }
            _ => {}
        }
        if self.0.lbfgs_mem == 0 {
            return Err(NsgpError::InvalidValueError(
                "`lbfgs_mem` cannot be 0!".to_string(),
            ));
        }
        if !self.0.jitter.is_finite() || self.0.jitter < F::zero() {
            return Err(NsgpError::InvalidValueError(format!(
                "`jitter` should be positive or zero, got {}",
                self.0.jitter
            )));
        }
        check_tolerance("tol_grad", self.0.tol_grad)?;
        check_tolerance("tol_cost", self.0.tol_cost)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
