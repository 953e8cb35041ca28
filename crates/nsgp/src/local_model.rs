//! Local lengthscale model: one zero-mean GP per input dimension, conditioned on
//! the `local_ls` values at the inducing points, whose posterior mean gives the
//! lengthscale of that dimension anywhere in the input space.
use crate::correlation_models::{CorrelationModel, SquaredExponentialCorr};
use crate::errors::{NsgpError, Result};
use crate::parameter_store::ParameterStore;
use crate::utils::{cho_solve, cholesky_factor, solve_lower, symmetrize};
use linfa::Float;
use ndarray::{array, s, stack, Array1, Array2, ArrayBase, Axis, Data, Ix2};
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Signal standard deviation of the local GPs (nx)
pub const LOCAL_GP_STD: &str = "local_gp_std";
/// Lengthscale of the local GPs (nx)
pub const LOCAL_GP_LS: &str = "local_gp_ls";
/// Lengthscale values observed at the inducing points (nx, n_inducings)
pub const LOCAL_LS: &str = "local_ls";
/// Noise standard deviation of the local GPs (nx)
pub const LOCAL_GP_NOISE_STD: &str = "local_gp_noise_std";

/// Lengthscale field predicted by the local GPs at a set of query points
#[derive(Clone, Debug)]
pub struct LocalLengthscales<F: Float> {
    /// (n, nx) matrix, column `d` holds the lengthscales of dimension `d`
    pub lengthscales: Array2<F>,
    /// (nx) log-density terms of the conditioned local GPs, when requested
    pub priors: Option<Array1<F>>,
}

/// Hyperparameters of the local GP of one dimension
struct LocalHyperParams<F: Float> {
    sigma2: F,
    lengthscale: F,
    noise2: F,
    values: Array1<F>,
}

impl<F: Float> LocalHyperParams<F> {
    fn from_store(store: &ParameterStore<F>, dim: usize, n_inducings: usize) -> Result<Self> {
        let std = store.vector(LOCAL_GP_STD)?;
        let ls = store.vector(LOCAL_GP_LS)?;
        let noise = store.vector(LOCAL_GP_NOISE_STD)?;
        let values = store.matrix(LOCAL_LS)?;
        if dim >= std.len() || dim >= values.nrows() {
            return Err(NsgpError::ShapeError(format!(
                "dimension {dim} out of range, local model has {} dimensions",
                std.len()
            )));
        }
        if values.ncols() != n_inducings {
            return Err(NsgpError::ShapeError(format!(
                "{LOCAL_LS} has {} columns, expected {n_inducings} inducing points",
                values.ncols()
            )));
        }
        Ok(LocalHyperParams {
            sigma2: std[dim] * std[dim],
            lengthscale: ls[dim],
            noise2: noise[dim] * noise[dim],
            values: values.row(dim).to_owned(),
        })
    }
}

/// Per dimension GPs predicting the lengthscale field from the inducing points.
///
/// The model holds no parameter values: every prediction reads them from the
/// [`ParameterStore`] it is given.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Corr: Serialize",
        deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>"
    ))
)]
pub struct LocalLengthscaleModel<F: Float, Corr: CorrelationModel<F> = SquaredExponentialCorr> {
    /// Correlation of the local GPs
    corr: Corr,
    /// Inducing points (n_inducings, nx)
    inducings: Array2<F>,
    /// Relative jitter added before each factorization
    jitter: F,
}

impl<F: Float, Corr: CorrelationModel<F>> LocalLengthscaleModel<F, Corr> {
    /// Local model conditioned at the given `inducings` points (n_inducings, nx)
    pub fn new(corr: Corr, inducings: Array2<F>, jitter: F) -> Self {
        LocalLengthscaleModel {
            corr,
            inducings,
            jitter,
        }
    }

    /// Inducing points (n_inducings, nx)
    pub fn inducings(&self) -> &Array2<F> {
        &self.inducings
    }

    /// Input dimension
    pub fn dim(&self) -> usize {
        self.inducings.ncols()
    }

    fn check_query(&self, x_query: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        if x_query.ncols() != self.dim() {
            return Err(NsgpError::ShapeError(format!(
                "query points have {} columns, expected {}",
                x_query.ncols(),
                self.dim()
            )));
        }
        Ok(())
    }

    /// Posterior mean of the local GP of dimension `dim` at `x_query[:, dim]`
    /// and, if `return_prior` is set, the log-density term of that GP.
    fn conditioned_dim(
        &self,
        store: &ParameterStore<F>,
        x_query: &ArrayBase<impl Data<Elem = F>, Ix2>,
        dim: usize,
        return_prior: bool,
    ) -> Result<(Array1<F>, Option<F>)> {
        let hp = LocalHyperParams::from_store(store, dim, self.inducings.nrows())?;
        let theta = array![hp.lengthscale];
        let z = self.inducings.slice(s![.., dim..dim + 1]);
        let q = x_query.slice(s![.., dim..dim + 1]);

        let kzz = self.corr.value(&z, &z, &theta) * hp.sigma2
            + Array2::<F>::eye(z.nrows()) * hp.noise2;
        let kqz = self.corr.value(&q, &z, &theta) * hp.sigma2;
        let chol = cholesky_factor(kzz, self.jitter)?;
        let alpha = cho_solve(&chol, &hp.values.insert_axis(Axis(1)))?;
        let mean = kqz.dot(&alpha).remove_axis(Axis(1));

        if !return_prior {
            return Ok((mean, None));
        }
        let v = solve_lower(&chol, &kqz.t())?;
        let kqq = self.corr.value(&q, &q, &theta) * hp.sigma2;
        let post_chol = cholesky_factor(symmetrize(kqq - v.t().dot(&v)), self.jitter)?;
        let log_2pi = F::cast(2. * std::f64::consts::PI).ln();
        let prior = post_chol.diag().mapv(|v| v.ln()).sum()
            + F::cast(0.5) * F::cast(q.nrows()) * log_2pi;
        Ok((mean, Some(prior)))
    }

    /// Lengthscales of dimension `dim` at `x_query` (n, nx) points
    pub fn predict_lengthscale(
        &self,
        store: &ParameterStore<F>,
        x_query: &ArrayBase<impl Data<Elem = F>, Ix2>,
        dim: usize,
    ) -> Result<Array1<F>> {
        self.check_query(x_query)?;
        self.conditioned_dim(store, x_query, dim, false)
            .map(|(mean, _)| mean)
    }

    /// Lengthscales of all dimensions at `x_query` (n, nx) points.
    ///
    /// Dimensions are computed in parallel and stacked in order. When `return_prior`
    /// is set, each dimension also reports
    /// `sum(ln(diag(chol(post_cov)))) + n/2 ln(2 pi)` where `post_cov` is the
    /// posterior covariance of its local GP at the query points.
    pub fn predict_all_dims(
        &self,
        store: &ParameterStore<F>,
        x_query: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
        return_prior: bool,
    ) -> Result<LocalLengthscales<F>> {
        self.check_query(x_query)?;
        let per_dim = (0..self.dim())
            .into_par_iter()
            .map(|dim| self.conditioned_dim(store, x_query, dim, return_prior))
            .collect::<Result<Vec<_>>>()?;

        let columns = per_dim.iter().map(|(l, _)| l.view()).collect::<Vec<_>>();
        let lengthscales =
            stack(Axis(1), &columns).map_err(|err| NsgpError::ShapeError(err.to_string()))?;
        let priors = if return_prior {
            Some(per_dim.iter().filter_map(|(_, p)| *p).collect::<Array1<F>>())
        } else {
            None
        };
        Ok(LocalLengthscales {
            lengthscales,
            priors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter_store::Shape;
    use approx::assert_abs_diff_eq;
    use ndarray::Array;

    fn store(nx: usize, m: usize) -> ParameterStore<f64> {
        let mut store = ParameterStore::new();
        store
            .declare_positive(LOCAL_GP_STD, &Array1::ones(nx), Shape::Vector(nx))
            .unwrap();
        store
            .declare_positive(LOCAL_GP_LS, &Array1::ones(nx), Shape::Vector(nx))
            .unwrap();
        let values = Array::from_shape_fn((nx, m), |(d, j)| 0.5 + (d * m + j) as f64 * 0.25);
        store
            .declare_positive(LOCAL_LS, &values, Shape::Matrix(nx, m))
            .unwrap();
        store
            .declare_positive(
                LOCAL_GP_NOISE_STD,
                &Array1::from_elem(nx, 1e-5),
                Shape::Vector(nx),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_interpolates_at_inducings() {
        let z = array![[0., 1.], [1.5, 3.], [3., 5.]];
        let store = store(2, 3);
        let local = LocalLengthscaleModel::new(SquaredExponentialCorr::default(), z.clone(), 1e-10);
        let field = local.predict_all_dims(&store, &z, false).unwrap();
        assert_abs_diff_eq!(
            field.lengthscales.t(),
            store.matrix(LOCAL_LS).unwrap(),
            epsilon = 1e-6
        );
        assert!(field.priors.is_none());
    }

    #[test]
    fn test_columns_follow_dimensions() {
        let z = array![[0., 1.], [1.5, 3.], [3., 5.]];
        let x = array![[0.2, 4.], [2.5, 1.1], [1., 2.], [2.9, 3.3]];
        let store = store(2, 3);
        let local = LocalLengthscaleModel::new(SquaredExponentialCorr::default(), z, 1e-10);
        let field = local.predict_all_dims(&store, &x, true).unwrap();
        assert_eq!(field.lengthscales.dim(), (4, 2));
        for dim in 0..2 {
            let ls = local.predict_lengthscale(&store, &x, dim).unwrap();
            assert_eq!(ls, field.lengthscales.column(dim));
        }
        assert_eq!(field.priors.unwrap().len(), 2);
    }

    #[test]
    fn test_single_inducing_closed_form() {
        // one inducing point at 0 observed with value 2, one query point at 1
        let mut store = store(1, 1);
        store.set_positive(LOCAL_GP_STD, &[1.5]).unwrap();
        store.set_positive(LOCAL_GP_LS, &[0.8]).unwrap();
        store.set_positive(LOCAL_LS, &[2.]).unwrap();
        store.set_positive(LOCAL_GP_NOISE_STD, &[0.3]).unwrap();
        let local = LocalLengthscaleModel::new(SquaredExponentialCorr::default(), array![[0.]], 0.);
        let field = local.predict_all_dims(&store, &array![[1.]], true).unwrap();

        let (sigma2, noise2) = (1.5f64 * 1.5, 0.3f64 * 0.3);
        let kqz = sigma2 * (-0.5f64 / (0.8 * 0.8)).exp();
        let mean = kqz * 2. / (sigma2 + noise2);
        let post_var = sigma2 - kqz * kqz / (sigma2 + noise2);
        let prior = 0.5 * post_var.ln() + 0.5 * (2. * std::f64::consts::PI).ln();

        assert_abs_diff_eq!(field.lengthscales[[0, 0]], mean, epsilon = 1e-12);
        assert_abs_diff_eq!(field.priors.unwrap()[0], prior, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_query() {
        let store = store(2, 3);
        let local = LocalLengthscaleModel::new(
            SquaredExponentialCorr::default(),
            array![[0., 1.], [1.5, 3.], [3., 5.]],
            1e-10,
        );
        let field = local
            .predict_all_dims(&store, &Array2::<f64>::zeros((0, 2)), false)
            .unwrap();
        assert_eq!(field.lengthscales.dim(), (0, 2));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let store = store(2, 3);
        let local = LocalLengthscaleModel::new(
            SquaredExponentialCorr::default(),
            array![[0., 1.], [1.5, 3.], [3., 5.]],
            1e-10,
        );
        assert!(matches!(
            local.predict_all_dims(&store, &array![[0.]], false),
            Err(NsgpError::ShapeError(_))
        ));
        assert!(matches!(
            local.predict_lengthscale(&store, &array![[0., 1.]], 2),
            Err(NsgpError::ShapeError(_))
        ));
    }

    #[test]
    fn test_degenerate_inducings_without_jitter() {
        let mut store = store(1, 2);
        // unit signal variance and vanishing noise on two identical inducing points
        store.set_positive(LOCAL_GP_NOISE_STD, &[1e-200]).unwrap();
        let local = LocalLengthscaleModel::new(
            SquaredExponentialCorr::default(),
            array![[1.], [1.]],
            0.,
        );
        assert!(matches!(
            local.predict_lengthscale(&store, &array![[0.5]], 0),
            Err(NsgpError::NumericalInstabilityError(_))
        ));
        // jitter makes it tractable
        let local = LocalLengthscaleModel::new(
            SquaredExponentialCorr::default(),
            array![[1.], [1.]],
            1e-10,
        );
        assert!(local.predict_lengthscale(&store, &array![[0.5]], 0).is_ok());
    }

    #[test]
    fn test_missing_parameter() {
        let store = ParameterStore::<f64>::new();
        let local = LocalLengthscaleModel::new(SquaredExponentialCorr::default(), array![[0.]], 0.);
        assert!(matches!(
            local.predict_lengthscale(&store, &array![[0.]], 0),
            Err(NsgpError::NotFoundError(_))
        ));
    }
}
