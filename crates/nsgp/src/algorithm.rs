use crate::correlation_models::{NsSquaredExponentialCorr, SquaredExponentialCorr};
use crate::errors::{NsgpError, Result};
use crate::global_model::{NonStationaryGp, GLOBAL_GP_NOISE_STD, GLOBAL_GP_STD};
use crate::inducings::{InducingSelector, Inducings, Linspaced, Located, RandomSubset};
use crate::local_model::{
    LocalLengthscaleModel, LOCAL_GP_LS, LOCAL_GP_NOISE_STD, LOCAL_GP_STD, LOCAL_LS,
};
use crate::objective::Objective;
use crate::optimization::{optimize_params, LbfgsParams, OptimOutcome};
use crate::parameter_store::{ParameterStore, Shape};
use crate::parameters::{NsgpParams, NsgpValidParams};
use crate::utils::has_duplicate_rows;

use linfa::prelude::{DatasetBase, Fit, Float};
use log::{debug, info, warn};
use ndarray::{arr0, Array1, Array2, ArrayBase, ArrayD, Axis, Data, Ix2};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use std::fmt;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// Default number of L-BFGS iterations when fitting
pub const NSGP_MAX_ITERS: u64 = 1000;
/// Default number of corrections kept by L-BFGS
pub const NSGP_LBFGS_MEM: usize = 7;
/// Default relative jitter added before each Cholesky factorization
pub const NSGP_JITTER: f64 = 1e-10;

/// Non-stationary Gaussian process regression.
///
/// The lengthscale of the global kernel varies across the input space. For each input
/// dimension `d`, a local GP conditioned on learned values `local_ls[d, :]` at a fixed set
/// of inducing points predicts the lengthscale of dimension `d` at any location. The global
/// GP then uses a non-stationary squared exponential kernel built from the lengthscale
/// vectors of both points.
///
/// All hyperparameters (local GP signal, lengthscale and noise standard deviations,
/// inducing lengthscale values, global signal and noise standard deviations) live in a
/// [`ParameterStore`] and are trained jointly by minimizing
///
/// `-log_marginal_likelihood(X, y) - sum_d prior_d`
///
/// where `prior_d` is the log-density term of the `d`th conditioned local GP.
///
/// # Example
///
/// ```no_run
/// use nsgp::{Linspaced, NsgpRegression};
/// use ndarray::{Array1, Axis};
///
/// let xt = Array1::linspace(0., 6., 8).insert_axis(Axis(1));
/// let yt = xt.mapv(f64::sin);
///
/// let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 42).expect("NSGP built");
/// nsgp.optimize(200, false).expect("NSGP trained");
///
/// let xtest = Array1::linspace(0., 6., 50).insert_axis(Axis(1));
/// let (mean, cov) = nsgp.predict(&xtest).expect("NSGP prediction");
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(serialize = "F: Serialize", deserialize = "F: Deserialize<'de>"))
)]
pub struct NsgpRegression<F: Float> {
    /// Training inputs (n, nx)
    xt: Array2<F>,
    /// Training outputs (n, 1)
    yt: Array2<F>,
    /// Local lengthscale GPs conditioned at the inducing points
    local: LocalLengthscaleModel<F, SquaredExponentialCorr>,
    /// Correlation of the global GP
    corr: NsSquaredExponentialCorr,
    /// Hyperparameters, the only mutable state of the model
    store: ParameterStore<F>,
    /// Settings used at construction, inducings are always `Located`
    params: NsgpValidParams<F>,
}

impl<F: Float> fmt::Display for NsgpRegression<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "NSGP(nx={}, n_inducings={}, corr={}, params={})",
            self.local.dim(),
            self.local.inducings().nrows(),
            self.corr,
            self.store
        )
    }
}

impl<F: Float> NsgpRegression<F> {
    /// NSGP parameters constructor
    pub fn params(inducings: Inducings<F>) -> NsgpParams<F> {
        NsgpParams::new(inducings)
    }

    /// Builds an untrained model from training inputs `x` (n, nx) and outputs `y` (n, 1).
    ///
    /// `n_inducings` points are picked once by `selector`, hyperparameters are initialized
    /// with absolute values of standard normal draws from a generator seeded with `seed`.
    pub fn new(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_inducings: usize,
        selector: &impl InducingSelector<F>,
        seed: u64,
    ) -> Result<Self> {
        let params = NsgpValidParams {
            seed,
            ..Default::default()
        };
        Self::build(x, y, n_inducings, selector, params)
    }

    /// Same as [`NsgpRegression::new`] for arrays of unchecked rank.
    ///
    /// Fails with [`NsgpError::ShapeError`] when `x` or `y` is not a matrix.
    pub fn from_dyn(
        x: &ArrayD<F>,
        y: &ArrayD<F>,
        n_inducings: usize,
        selector: &impl InducingSelector<F>,
        seed: u64,
    ) -> Result<Self> {
        let x = x.view().into_dimensionality::<Ix2>().map_err(|_| {
            NsgpError::ShapeError(format!(
                "training inputs should be a matrix, got shape {:?}",
                x.shape()
            ))
        })?;
        let y = y.view().into_dimensionality::<Ix2>().map_err(|_| {
            NsgpError::ShapeError(format!(
                "training outputs should be a matrix, got shape {:?}",
                y.shape()
            ))
        })?;
        Self::new(&x, &y, n_inducings, selector, seed)
    }

    fn build(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_inducings: usize,
        selector: &impl InducingSelector<F>,
        mut params: NsgpValidParams<F>,
    ) -> Result<Self> {
        let (n, nx) = x.dim();
        if n == 0 || nx == 0 {
            return Err(NsgpError::ShapeError(format!(
                "training inputs should have at least one row and one column, got {:?}",
                x.dim()
            )));
        }
        if y.dim() != (n, 1) {
            return Err(NsgpError::ShapeError(format!(
                "expected ({n}, 1) training outputs, got {:?}",
                y.dim()
            )));
        }
        if n_inducings == 0 {
            return Err(NsgpError::InvalidValueError(
                "number of inducing points should be at least 1".to_string(),
            ));
        }
        if has_duplicate_rows(x) {
            warn!("Duplicate rows in training inputs, noise keeps the global GP factorizable");
        }

        let z = selector.select(&x.view(), n_inducings)?;
        if z.nrows() == 0 || z.ncols() != nx {
            return Err(NsgpError::ShapeError(format!(
                "expected (m, {nx}) inducing points with m >= 1, got {:?}",
                z.dim()
            )));
        }
        if z.iter().any(|v| !v.is_finite()) {
            return Err(NsgpError::InvalidValueError(
                "inducing points should be finite".to_string(),
            ));
        }
        debug!("Inducing points: {z}");

        let store = Self::init_store(nx, z.nrows(), params.seed)?;
        let local = LocalLengthscaleModel::new(SquaredExponentialCorr(), z.clone(), params.jitter);
        params.inducings = Inducings::Located(z);

        Ok(NsgpRegression {
            xt: x.to_owned(),
            yt: y.to_owned(),
            local,
            corr: NsSquaredExponentialCorr(),
            store,
            params,
        })
    }

    /// Declares every hyperparameter initialized with `|N(0, 1)|` draws
    fn init_store(nx: usize, n_inducings: usize, seed: u64) -> Result<ParameterStore<F>> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let mut draw = |shape: Shape| -> Array1<F> {
            Array1::<f64>::random_using(shape.size(), StandardNormal, &mut rng)
                .mapv(|v| F::cast(v.abs()))
        };

        let mut store = ParameterStore::new();
        store.declare_positive(LOCAL_GP_STD, &draw(Shape::Vector(nx)), Shape::Vector(nx))?;
        store.declare_positive(LOCAL_GP_LS, &draw(Shape::Vector(nx)), Shape::Vector(nx))?;
        let local_ls_shape = Shape::Matrix(nx, n_inducings);
        let local_ls = draw(local_ls_shape)
            .into_shape((nx, n_inducings))
            .map_err(|err| NsgpError::ShapeError(err.to_string()))?;
        store.declare_positive(LOCAL_LS, &local_ls, local_ls_shape)?;
        store.declare_positive(
            LOCAL_GP_NOISE_STD,
            &draw(Shape::Vector(nx)),
            Shape::Vector(nx),
        )?;
        store.declare_positive(GLOBAL_GP_STD, &arr0(draw(Shape::Scalar)[0]), Shape::Scalar)?;
        store.declare_positive(
            GLOBAL_GP_NOISE_STD,
            &arr0(draw(Shape::Scalar)[0]),
            Shape::Scalar,
        )?;
        debug!("Initial parameters: {store}");
        Ok(store)
    }

    fn objective(&self) -> Objective<'_, F> {
        Objective::new(
            &self.xt,
            &self.yt,
            &self.local,
            self.corr,
            self.params.jitter,
        )
    }

    /// Trains the hyperparameters with at most `iterations` L-BFGS iterations.
    ///
    /// Starts from the current parameters, so calling it again resumes training.
    /// The store is updated with the best parameters found. When `trace` is set
    /// every iteration is logged at info level.
    pub fn optimize(&mut self, iterations: u64, trace: bool) -> Result<OptimOutcome> {
        let settings = LbfgsParams {
            max_iters: iterations,
            mem: self.params.lbfgs_mem,
            tol_grad: self.params.tol_grad,
            tol_cost: self.params.tol_cost,
            trace: trace || self.params.trace,
        };
        let (latent, outcome) = optimize_params(&self.objective(), &self.store, &settings)?;
        self.store.set_latent(latent)?;
        info!("Trained parameters: {}", self.store);
        Ok(outcome)
    }

    fn check_query(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        if x.ncols() != self.local.dim() {
            return Err(NsgpError::ShapeError(format!(
                "expected (n, {}) query points, got {:?}",
                self.local.dim(),
                x.dim()
            )));
        }
        Ok(())
    }

    fn global(&self) -> Result<NonStationaryGp<F>> {
        NonStationaryGp::from_store(self.corr, &self.store, self.params.jitter)
    }

    /// Predictive mean (n, 1) and covariance (n, n) of the latent function at `x` (n, nx)
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>)> {
        self.check_query(x)?;
        let l_train = self.local_lengthscales(&self.xt)?;
        let l_new = self.local_lengthscales(x)?;
        self.global()?
            .predict(x, &self.xt, &self.yt, &l_new, &l_train)
    }

    /// Predictive mean (n, 1) and covariance (n, n) of noisy observations at `x` (n, nx)
    pub fn predict_observed(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>)> {
        self.check_query(x)?;
        let l_train = self.local_lengthscales(&self.xt)?;
        let l_new = self.local_lengthscales(x)?;
        self.global()?
            .predict_observed(x, &self.xt, &self.yt, &l_new, &l_train)
    }

    /// Predictive variances (n, 1) of the latent function at `x` (n, nx)
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let (_, cov) = self.predict(x)?;
        Ok(cov.diag().to_owned().insert_axis(Axis(1)))
    }

    /// Lengthscale field (n, nx) predicted by the local GPs at `x` (n, nx)
    pub fn local_lengthscales(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.local
            .predict_all_dims(&self.store, &x.view(), false)
            .map(|field| field.lengthscales)
    }

    /// Training objective at the current parameters
    pub fn negative_log_posterior(&self) -> Result<F> {
        self.objective().negative_log_posterior(&self.store)
    }

    /// Log marginal likelihood of the global GP at the current parameters
    pub fn log_marginal_likelihood(&self) -> Result<F> {
        self.objective().log_marginal_likelihood(&self.store)
    }

    /// Inducing points (n_inducings, nx)
    pub fn inducings(&self) -> &Array2<F> {
        self.local.inducings()
    }

    /// Current hyperparameters
    pub fn store(&self) -> &ParameterStore<F> {
        &self.store
    }

    /// Training inputs (n, nx) and outputs (n, 1)
    pub fn training_data(&self) -> (&Array2<F>, &Array2<F>) {
        (&self.xt, &self.yt)
    }

    /// Number of training points and input dimension
    pub fn dims(&self) -> (usize, usize) {
        self.xt.dim()
    }

    /// Relative jitter used before each factorization
    pub fn jitter(&self) -> F {
        self.params.jitter
    }

    /// Settings the model was built with
    pub fn valid_params(&self) -> &NsgpValidParams<F> {
        &self.params
    }
}

#[cfg(feature = "persistent")]
impl<F: Float + Serialize + for<'de> Deserialize<'de>> NsgpRegression<F> {
    /// Saves the model as JSON in the file at `path`
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = serde_json::to_vec(self)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Loads a model previously saved with [`NsgpRegression::save`]
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>, NsgpError>
    for NsgpValidParams<F>
{
    type Object = NsgpRegression<F>;

    /// Builds the model from the dataset then trains it with `max_iters` iterations
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        let mut nsgp = match &self.inducings {
            Inducings::Randomized(n) => {
                NsgpRegression::build(x, y, *n, &RandomSubset::new(self.seed), self.clone())?
            }
            Inducings::Linspaced(n) => NsgpRegression::build(x, y, *n, &Linspaced, self.clone())?,
            Inducings::Located(z) => {
                NsgpRegression::build(x, y, z.nrows(), &Located(z.to_owned()), self.clone())?
            }
        };
        nsgp.optimize(self.max_iters, self.trace)?;
        Ok(nsgp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use linfa::ParamGuard;
    use ndarray::{array, Array, ArrayView2, IxDyn};
    use argmin::core::{TerminationReason, TerminationStatus};
    use ndarray_rand::rand_distr::Uniform;

    fn random_inputs(n: usize, nx: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array::random_using((n, nx), Uniform::new(0., 5.), &mut rng)
    }

    fn wrong_width(_x: &ArrayView2<f64>, n: usize) -> Array2<f64> {
        Array2::zeros((n, 2))
    }

    fn nothing(_x: &ArrayView2<f64>, _n: usize) -> Array2<f64> {
        Array2::zeros((0, 1))
    }

    fn sine_data() -> (Array2<f64>, Array2<f64>) {
        let xt = Array1::linspace(0., 2. * std::f64::consts::PI, 5).insert_axis(Axis(1));
        let yt = xt.mapv(f64::sin);
        (xt, yt)
    }

    fn assert_valid_covariance(cov: &Array2<f64>) {
        assert_abs_diff_eq!(*cov, cov.t(), epsilon = 1e-12);
        assert!(cov.diag().iter().all(|v| *v >= 0.));
    }

    #[test]
    fn test_initial_parameters_are_positive() {
        for nx in 1..4 {
            let xt = random_inputs(6, nx, 0);
            let yt = xt.sum_axis(Axis(1)).insert_axis(Axis(1));
            let nsgp = NsgpRegression::new(&xt, &yt, 3, &RandomSubset::new(1), 42).unwrap();
            let store = nsgp.store();
            assert_eq!(store.len(), 3 * nx + nx * 3 + 2);
            for name in store.names() {
                assert!(store.get(name).unwrap().iter().all(|v| *v > 0.));
            }
            assert_eq!(store.shape(LOCAL_LS).unwrap(), Shape::Matrix(nx, 3));
            assert_eq!(nsgp.inducings().dim(), (3, nx));
        }
    }

    #[test]
    fn test_seeded_construction_is_reproducible() {
        let (xt, yt) = sine_data();
        let a = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 7).unwrap();
        let b = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 7).unwrap();
        let c = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 8).unwrap();
        assert_eq!(a.store(), b.store());
        assert_ne!(a.store(), c.store());
    }

    #[test]
    fn test_shape_errors() {
        let (xt, yt) = sine_data();
        let bad_y = Array2::zeros((4, 1));
        assert!(matches!(
            NsgpRegression::new(&xt, &bad_y, 3, &Linspaced, 0),
            Err(NsgpError::ShapeError(_))
        ));
        let two_outputs = Array2::zeros((5, 2));
        assert!(matches!(
            NsgpRegression::new(&xt, &two_outputs, 3, &Linspaced, 0),
            Err(NsgpError::ShapeError(_))
        ));
        let empty = Array2::<f64>::zeros((0, 1));
        assert!(matches!(
            NsgpRegression::new(&empty, &Array2::zeros((0, 1)), 3, &Linspaced, 0),
            Err(NsgpError::ShapeError(_))
        ));

        let x_dyn = Array1::linspace(0., 1., 5).into_dyn();
        let y_dyn = yt.clone().into_dyn();
        assert!(matches!(
            NsgpRegression::from_dyn(&x_dyn, &y_dyn, 3, &Linspaced, 0),
            Err(NsgpError::ShapeError(_))
        ));
        let x_dyn = xt.clone().into_dyn();
        let y_dyn = Array::zeros(IxDyn(&[5]));
        assert!(matches!(
            NsgpRegression::from_dyn(&x_dyn, &y_dyn, 3, &Linspaced, 0),
            Err(NsgpError::ShapeError(_))
        ));
        assert!(NsgpRegression::from_dyn(&xt.into_dyn(), &yt.into_dyn(), 3, &Linspaced, 0).is_ok());
    }

    #[test]
    fn test_bad_selector() {
        let (xt, yt) = sine_data();
        assert!(matches!(
            NsgpRegression::new(&xt, &yt, 3, &wrong_width, 0),
            Err(NsgpError::ShapeError(_))
        ));
        assert!(matches!(
            NsgpRegression::new(&xt, &yt, 3, &nothing, 0),
            Err(NsgpError::ShapeError(_))
        ));
        assert!(matches!(
            NsgpRegression::new(&xt, &yt, 0, &Linspaced, 0),
            Err(NsgpError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_predict_is_pure() {
        let (xt, yt) = sine_data();
        let nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        let xtest = Array1::linspace(-1., 7., 11).insert_axis(Axis(1));
        let before = nsgp.store().clone();
        let (mean1, cov1) = nsgp.predict(&xtest).unwrap();
        let (mean2, cov2) = nsgp.predict(&xtest).unwrap();
        assert_eq!(mean1, mean2);
        assert_eq!(cov1, cov2);
        assert_eq!(nsgp.store(), &before);
        assert_eq!(mean1.dim(), (11, 1));
        assert_eq!(cov1.dim(), (11, 11));
    }

    #[test]
    fn test_predict_empty_query() {
        let xt = random_inputs(6, 2, 3);
        let yt = xt.map_axis(Axis(1), |r| r[0] * r[1]).insert_axis(Axis(1));
        let nsgp = NsgpRegression::new(&xt, &yt, 3, &RandomSubset::new(0), 0).unwrap();
        let (mean, cov) = nsgp.predict(&Array2::zeros((0, 2))).unwrap();
        assert_eq!(mean.dim(), (0, 1));
        assert_eq!(cov.dim(), (0, 0));
        assert_eq!(nsgp.predict_var(&Array2::zeros((0, 2))).unwrap().dim(), (0, 1));
        assert!(matches!(
            nsgp.predict(&Array2::zeros((3, 1))),
            Err(NsgpError::ShapeError(_))
        ));
    }

    #[test]
    fn test_sine_optimization_decreases_loss() {
        let (xt, yt) = sine_data();
        let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        let start = nsgp.negative_log_posterior().unwrap();
        let outcome = nsgp.optimize(200, false).unwrap();

        assert_abs_diff_eq!(outcome.initial_cost, start, epsilon = 1e-12);
        assert!(outcome.best_cost <= outcome.initial_cost);
        assert!(outcome.iterations <= 200);
        assert!(!matches!(
            outcome.termination,
            TerminationStatus::Terminated(TerminationReason::SolverExit(_))
        ));
        assert!(outcome.history.iter().all(|c| c.is_finite()));
        if let Some(last) = outcome.history.last() {
            assert!(*last <= outcome.initial_cost + 1e-9);
        }
        let trained = nsgp.negative_log_posterior().unwrap();
        assert_abs_diff_eq!(trained, outcome.best_cost, epsilon = 1e-9);
        for name in nsgp.store().names() {
            assert!(nsgp.store().get(name).unwrap().iter().all(|v| *v > 0.));
        }
    }

    #[test]
    fn test_degenerate_inducings_without_jitter() {
        let (xt, yt) = sine_data();
        let params = NsgpValidParams {
            jitter: 0.,
            ..Default::default()
        };
        let mut nsgp =
            NsgpRegression::build(&xt, &yt, 2, &Located(array![[1.], [1.]]), params).unwrap();
        nsgp.store.set_positive(LOCAL_GP_STD, &[1.]).unwrap();
        nsgp.store.set_positive(LOCAL_GP_NOISE_STD, &[1e-200]).unwrap();
        let before = nsgp.store().clone();

        assert!(matches!(
            nsgp.negative_log_posterior(),
            Err(NsgpError::NumericalInstabilityError(_))
        ));
        assert!(matches!(
            nsgp.optimize(10, false),
            Err(NsgpError::NumericalInstabilityError(_))
        ));
        assert!(matches!(
            nsgp.predict(&xt),
            Err(NsgpError::NumericalInstabilityError(_))
        ));
        assert_eq!(nsgp.store(), &before);
    }

    #[test]
    fn test_optimize_resumes_from_current_parameters() {
        let (xt, yt) = sine_data();
        let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        let first = nsgp.optimize(10, false).unwrap();
        let second = nsgp.optimize(10, false).unwrap();
        assert_abs_diff_eq!(second.initial_cost, first.best_cost, epsilon = 1e-9);
        assert!(second.best_cost <= first.best_cost);

        let untouched = nsgp.store().clone();
        let outcome = nsgp.optimize(0, false).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(nsgp.store(), &untouched);
    }

    #[test]
    fn test_covariance_before_and_after_training() {
        let (xt, yt) = sine_data();
        let xtest = Array1::linspace(-1., 7., 23).insert_axis(Axis(1));
        let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 1).unwrap();
        let (_, cov) = nsgp.predict(&xtest).unwrap();
        assert_valid_covariance(&cov);
        nsgp.optimize(30, false).unwrap();
        let (_, cov) = nsgp.predict(&xtest).unwrap();
        assert_valid_covariance(&cov);
        let var = nsgp.predict_var(&xtest).unwrap();
        assert_abs_diff_eq!(var.column(0), cov.diag(), epsilon = 1e-15);
    }

    #[test]
    fn test_interpolation_with_vanishing_noise() {
        let (xt, yt) = sine_data();
        let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        let store = &mut nsgp.store;
        store.set_positive(LOCAL_GP_STD, &[1.]).unwrap();
        store.set_positive(LOCAL_GP_LS, &[1.]).unwrap();
        store.set_positive(LOCAL_LS, &[1., 1., 1.]).unwrap();
        store.set_positive(LOCAL_GP_NOISE_STD, &[1e-2]).unwrap();
        store.set_positive(GLOBAL_GP_STD, &[1.]).unwrap();
        store.set_positive(GLOBAL_GP_NOISE_STD, &[1e-4]).unwrap();

        let (mean, cov) = nsgp.predict(&xt).unwrap();
        assert_abs_diff_eq!(mean, yt, epsilon = 1e-4);
        assert_abs_diff_eq!(cov.diag(), Array1::zeros(5), epsilon = 1e-4);

        let (_, observed) = nsgp.predict_observed(&xt).unwrap();
        assert_abs_diff_eq!(observed.diag(), cov.diag().mapv(|v| v + 1e-8), epsilon = 1e-12);
    }

    #[test]
    fn test_local_lengthscales_at_inducings() {
        let (xt, yt) = sine_data();
        let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        let store = &mut nsgp.store;
        store.set_positive(LOCAL_GP_STD, &[1.]).unwrap();
        store.set_positive(LOCAL_GP_LS, &[2.]).unwrap();
        store.set_positive(LOCAL_LS, &[0.5, 1.5, 0.8]).unwrap();
        store.set_positive(LOCAL_GP_NOISE_STD, &[1e-5]).unwrap();

        let z = nsgp.inducings().to_owned();
        assert_abs_diff_eq!(z, array![[0.], [std::f64::consts::PI], [2. * std::f64::consts::PI]]);
        let l = nsgp.local_lengthscales(&z).unwrap();
        assert_abs_diff_eq!(l, array![[0.5], [1.5], [0.8]], epsilon = 1e-6);
    }

    #[test]
    fn test_fit_with_params() {
        let (xt, yt) = sine_data();
        let nsgp = NsgpRegression::params(Inducings::Linspaced(3))
            .seed(3)
            .max_iters(5)
            .fit(&DatasetBase::new(xt.to_owned(), yt.to_owned()))
            .unwrap();
        assert_eq!(nsgp.inducings().dim(), (3, 1));
        assert_eq!(nsgp.valid_params().seed(), 3);
        assert!(matches!(nsgp.valid_params().inducings(), Inducings::Located(_)));

        let z = array![[1.], [4.]];
        let located = NsgpRegression::params(Inducings::Located(z.clone()))
            .max_iters(0)
            .check()
            .unwrap()
            .fit(&DatasetBase::new(xt.to_owned(), yt.to_owned()))
            .unwrap();
        assert_eq!(located.inducings(), &z);

        let randomized = NsgpRegression::params(Inducings::Randomized(2))
            .max_iters(0)
            .fit(&DatasetBase::new(xt, yt))
            .unwrap();
        assert_eq!(randomized.inducings().nrows(), 2);
    }

    #[test]
    fn test_display() {
        let (xt, yt) = sine_data();
        let nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        let repr = nsgp.to_string();
        assert!(repr.starts_with("NSGP(nx=1, n_inducings=3"));
        assert!(repr.contains(GLOBAL_GP_NOISE_STD));
    }

    #[cfg(feature = "persistent")]
    #[test]
    fn test_save_load() {
        let (xt, yt) = sine_data();
        let mut nsgp = NsgpRegression::new(&xt, &yt, 3, &Linspaced, 0).unwrap();
        nsgp.optimize(5, false).unwrap();
        let path = std::env::temp_dir().join("nsgp_save_load.json");
        let path = path.to_str().unwrap();
        nsgp.save(path).unwrap();
        let loaded = NsgpRegression::<f64>::load(path).unwrap();
        assert_eq!(loaded.store(), nsgp.store());
        let xtest = array![[0.3], [2.2]];
        assert_abs_diff_eq!(
            loaded.predict(&xtest).unwrap().0,
            nsgp.predict(&xtest).unwrap().0,
            epsilon = 1e-12
        );
    }
}
