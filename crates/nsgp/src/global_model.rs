//! Global GP over the training data whose kernel uses, at each point, the
//! lengthscales predicted by the local model.
use crate::correlation_models::{NonStationaryCorrelationModel, NsSquaredExponentialCorr};
use crate::errors::{NsgpError, Result};
use crate::parameter_store::ParameterStore;
use crate::utils::{cho_solve, cholesky_factor, solve_lower, symmetrize};
use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix2};

/// Signal standard deviation of the global GP
pub const GLOBAL_GP_STD: &str = "global_gp_std";
/// Noise standard deviation of the global GP
pub const GLOBAL_GP_NOISE_STD: &str = "global_gp_noise_std";

/// Zero-mean GP with kernel `signal_var * corr(x, x'; l(x), l(x'))` and
/// homoscedastic gaussian noise.
#[derive(Clone, Debug)]
pub struct NonStationaryGp<
    F: Float,
    Corr: NonStationaryCorrelationModel<F> = NsSquaredExponentialCorr,
> {
    corr: Corr,
    signal_var: F,
    noise_var: F,
    jitter: F,
}

impl<F: Float, Corr: NonStationaryCorrelationModel<F>> NonStationaryGp<F, Corr> {
    /// Constructor, `jitter` is relative to the largest diagonal entry of the factored matrices
    pub fn new(corr: Corr, signal_var: F, noise_var: F, jitter: F) -> Self {
        NonStationaryGp {
            corr,
            signal_var,
            noise_var,
            jitter,
        }
    }

    /// Global GP reading its signal and noise standard deviations from `store`
    pub fn from_store(corr: Corr, store: &ParameterStore<F>, jitter: F) -> Result<Self> {
        let std = store.scalar(GLOBAL_GP_STD)?;
        let noise_std = store.scalar(GLOBAL_GP_NOISE_STD)?;
        Ok(Self::new(corr, std * std, noise_std * noise_std, jitter))
    }

    /// Signal variance
    pub fn signal_variance(&self) -> F {
        self.signal_var
    }

    /// Noise variance
    pub fn noise_variance(&self) -> F {
        self.noise_var
    }

    /// Noise free covariance matrix between `x1` and `x2` points with `l1` and `l2` lengthscales
    pub fn covariance(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        self.corr.value(x1, x2, l1, l2) * self.signal_var
    }

    /// Cholesky factor of the noisy training covariance
    fn factorize(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        let k = self.covariance(x, x, l, l) + Array2::<F>::eye(x.nrows()) * self.noise_var;
        cholesky_factor(k, self.jitter)
    }

    fn check_training(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<()> {
        if y.nrows() != x.nrows() || y.ncols() != 1 {
            return Err(NsgpError::ShapeError(format!(
                "expected ({}, 1) training outputs, got {:?}",
                x.nrows(),
                y.dim()
            )));
        }
        if l.dim() != x.dim() {
            return Err(NsgpError::ShapeError(format!(
                "expected {:?} training lengthscales, got {:?}",
                x.dim(),
                l.dim()
            )));
        }
        Ok(())
    }

    /// Log marginal likelihood of `y` (n, 1) at `x` (n, nx) given lengthscales `l` (n, nx)
    ///
    /// `-1/2 y^T A^-1 y - sum(ln(diag(chol(A)))) - n/2 ln(2 pi)`
    /// with `A = signal_var * K(x, x) + noise_var * I`
    pub fn log_marginal_likelihood(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<F> {
        Self::check_training(x, y, l)?;
        let chol = self.factorize(x, l)?;
        let half = solve_lower(&chol, y)?;
        let quad = half.mapv(|v| v * v).sum();
        let log_det_half = chol.diag().mapv(|v| v.ln()).sum();
        let log_2pi = F::cast(2. * std::f64::consts::PI).ln();
        Ok(F::cast(-0.5) * quad - log_det_half - F::cast(0.5) * F::cast(x.nrows()) * log_2pi)
    }

    /// Predictive mean (n_new, 1) and noise free covariance (n_new, n_new) at `x_new`
    /// points with lengthscales `l_new` given training data `x`, `y` with lengthscales `l`.
    ///
    /// The covariance is symmetrized and its diagonal clipped at zero.
    pub fn predict(
        &self,
        x_new: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l_new: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>)> {
        Self::check_training(x, y, l)?;
        if x_new.ncols() != x.ncols() || l_new.dim() != x_new.dim() {
            return Err(NsgpError::ShapeError(format!(
                "expected (n, {}) prediction points and lengthscales, got {:?} and {:?}",
                x.ncols(),
                x_new.dim(),
                l_new.dim()
            )));
        }
        let chol = self.factorize(x, l)?;
        let alpha = cho_solve(&chol, y)?;
        let k_star = self.covariance(x_new, x, l_new, l);
        let mean = k_star.dot(&alpha);

        let v = solve_lower(&chol, &k_star.t())?;
        let k_star_star = self.covariance(x_new, x_new, l_new, l_new);
        let mut cov = symmetrize(k_star_star - v.t().dot(&v));
        // Mean Squared Error might be slightly negative depending on
        // machine precision: set to zero in that case
        cov.diag_mut()
            .mapv_inplace(|v| if v < F::zero() { F::zero() } else { v });
        Ok((mean, cov))
    }

    /// As [`NonStationaryGp::predict`] but the covariance is the one of noisy observations
    pub fn predict_observed(
        &self,
        x_new: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l_new: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>)> {
        let (mean, mut cov) = self.predict(x_new, x, y, l_new, l)?;
        cov.diag_mut().mapv_inplace(|v| v + self.noise_var);
        Ok((mean, cov))
    }
}
