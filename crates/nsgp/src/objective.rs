use crate::correlation_models::NsSquaredExponentialCorr;
use crate::errors::Result;
use crate::global_model::NonStationaryGp;
use crate::local_model::LocalLengthscaleModel;
use crate::parameter_store::ParameterStore;
use linfa::Float;
use ndarray::Array2;

/// Training objective of the non-stationary GP: the negative log marginal
/// likelihood of the global GP minus the log-density terms of the local GPs.
///
/// It only borrows training data and models, parameters come from the store
/// given at each evaluation.
pub struct Objective<'a, F: Float> {
    xt: &'a Array2<F>,
    yt: &'a Array2<F>,
    local: &'a LocalLengthscaleModel<F>,
    corr: NsSquaredExponentialCorr,
    jitter: F,
}

impl<'a, F: Float> Objective<'a, F> {
    /// Objective over training inputs `xt` (n, nx) and outputs `yt` (n, 1)
    pub fn new(
        xt: &'a Array2<F>,
        yt: &'a Array2<F>,
        local: &'a LocalLengthscaleModel<F>,
        corr: NsSquaredExponentialCorr,
        jitter: F,
    ) -> Self {
        Objective {
            xt,
            yt,
            local,
            corr,
            jitter,
        }
    }

    /// `-log_marginal_likelihood - sum(local priors)` for the parameters held by `store`
    pub fn negative_log_posterior(&self, store: &ParameterStore<F>) -> Result<F> {
        let field = self.local.predict_all_dims(store, self.xt, true)?;
        let global = NonStationaryGp::from_store(self.corr, store, self.jitter)?;
        let lml = global.log_marginal_likelihood(self.xt, self.yt, &field.lengthscales)?;
        let prior = field.priors.map_or(F::zero(), |p| p.sum());
        Ok(-lml - prior)
    }

    /// Log marginal likelihood of the global GP alone
    pub fn log_marginal_likelihood(&self, store: &ParameterStore<F>) -> Result<F> {
        let field = self.local.predict_all_dims(store, self.xt, false)?;
        NonStationaryGp::from_store(self.corr, store, self.jitter)?.log_marginal_likelihood(
            self.xt,
            self.yt,
            &field.lengthscales,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_models::SquaredExponentialCorr;
    use crate::global_model::{GLOBAL_GP_NOISE_STD, GLOBAL_GP_STD};
    use crate::local_model::{LOCAL_GP_LS, LOCAL_GP_NOISE_STD, LOCAL_GP_STD, LOCAL_LS};
    use crate::parameter_store::Shape;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr0, array};

    #[test]
    fn test_negative_log_posterior_composition() {
        let xt = array![[0., 1.], [1., 0.5], [2., 2.], [3., 1.5]];
        let yt = array![[0.1], [0.8], [-0.4], [0.3]];
        let z = array![[0., 0.5], [3., 2.]];
        let local = LocalLengthscaleModel::new(SquaredExponentialCorr::default(), z, 1e-10);

        let mut store = ParameterStore::new();
        store
            .declare_positive(LOCAL_GP_STD, &array![1.2, 0.7], Shape::Vector(2))
            .unwrap();
        store
            .declare_positive(LOCAL_GP_LS, &array![1.5, 0.9], Shape::Vector(2))
            .unwrap();
        store
            .declare_positive(LOCAL_LS, &array![[0.6, 1.1], [0.8, 0.4]], Shape::Matrix(2, 2))
            .unwrap();
        store
            .declare_positive(LOCAL_GP_NOISE_STD, &array![0.1, 0.2], Shape::Vector(2))
            .unwrap();
        store
            .declare_positive(GLOBAL_GP_STD, &arr0(0.9), Shape::Scalar)
            .unwrap();
        store
            .declare_positive(GLOBAL_GP_NOISE_STD, &arr0(0.05), Shape::Scalar)
            .unwrap();

        let corr = NsSquaredExponentialCorr::default();
        let objective = Objective::new(&xt, &yt, &local, corr, 1e-10);
        let nlp = objective.negative_log_posterior(&store).unwrap();

        let field = local.predict_all_dims(&store, &xt, true).unwrap();
        let lml = NonStationaryGp::new(corr, 0.81, 0.0025, 1e-10)
            .log_marginal_likelihood(&xt, &yt, &field.lengthscales)
            .unwrap();
        let priors = field.priors.unwrap().sum();
        assert_abs_diff_eq!(nlp, -lml - priors, epsilon = 1e-10);
        assert_abs_diff_eq!(
            objective.log_marginal_likelihood(&store).unwrap(),
            lml,
            epsilon = 1e-10
        );
    }
}
