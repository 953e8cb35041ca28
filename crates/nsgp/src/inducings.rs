//! Selection of the inducing points where the local lengthscale GPs are conditioned.
use crate::errors::{NsgpError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView2, Zip};
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::SeedableRng;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A strategy picking `n_inducings` points (n_inducings, nx) given training inputs (n, nx)
pub trait InducingSelector<F: Float> {
    /// Inducing points selected for training inputs `x`
    fn select(&self, x: &ArrayView2<F>, n_inducings: usize) -> Result<Array2<F>>;
}

impl<F, T> InducingSelector<F> for T
where
    F: Float,
    T: Fn(&ArrayView2<F>, usize) -> Array2<F>,
{
    fn select(&self, x: &ArrayView2<F>, n_inducings: usize) -> Result<Array2<F>> {
        Ok(self(x, n_inducings))
    }
}

/// Inducing points specification used by [`NsgpParams`](crate::NsgpParams)
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Inducings<F: Float> {
    /// `usize` points are selected randomly in the training dataset
    Randomized(usize),
    /// `usize` points evenly spaced along each input dimension
    Linspaced(usize),
    /// Points are given as a (npoints, nx) matrix
    Located(Array2<F>),
}

impl<F: Float> Default for Inducings<F> {
    fn default() -> Inducings<F> {
        Self::Randomized(10)
    }
}

/// Random subset of the training rows, reproducible given the seed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RandomSubset {
    seed: u64,
}

impl RandomSubset {
    /// Selector drawing from a generator seeded with `seed`
    pub fn new(seed: u64) -> Self {
        RandomSubset { seed }
    }
}

impl<F: Float> InducingSelector<F> for RandomSubset {
    /// At most `nrows(x)` points can be selected
    fn select(&self, x: &ArrayView2<F>, n_inducings: usize) -> Result<Array2<F>> {
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut indices = (0..x.nrows()).collect::<Vec<_>>();
        indices.shuffle(&mut rng);
        let n = n_inducings.min(x.nrows());
        let mut z = Array2::zeros((n, x.ncols()));
        Zip::from(z.rows_mut())
            .and(&Array1::from_vec(indices[..n].to_vec()))
            .for_each(|mut zi, i| zi.assign(&x.row(*i)));
        Ok(z)
    }
}

/// Points evenly spaced between the min and max of each column of the training inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Linspaced;

impl<F: Float> InducingSelector<F> for Linspaced {
    fn select(&self, x: &ArrayView2<F>, n_inducings: usize) -> Result<Array2<F>> {
        let mut z = Array2::zeros((n_inducings, x.ncols()));
        for (mut zc, xc) in z.columns_mut().into_iter().zip(x.columns()) {
            let lo = *xc
                .min()
                .map_err(|err| NsgpError::InvalidValueError(err.to_string()))?;
            let hi = *xc
                .max()
                .map_err(|err| NsgpError::InvalidValueError(err.to_string()))?;
            zc.assign(&Array1::linspace(lo, hi, n_inducings));
        }
        Ok(z)
    }
}

/// Given inducing points, whatever the training inputs
#[derive(Clone, Debug, PartialEq)]
pub struct Located<F: Float>(pub Array2<F>);

impl<F: Float> InducingSelector<F> for Located<F> {
    fn select(&self, _x: &ArrayView2<F>, _n_inducings: usize) -> Result<Array2<F>> {
        Ok(self.0.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn first_rows(x: &ArrayView2<f64>, n: usize) -> Array2<f64> {
        x.slice(ndarray::s![..n, ..]).to_owned()
    }

    #[test]
    fn test_linspaced() {
        let x = array![[0., 10.], [4., -2.], [2., 3.]];
        let z = Linspaced.select(&x.view(), 3).unwrap();
        assert_abs_diff_eq!(z, array![[0., -2.], [2., 4.], [4., 10.]], epsilon = 1e-12);
    }

    #[test]
    fn test_random_subset() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let z = RandomSubset::new(42).select(&x.view(), 4).unwrap();
        assert_eq!(z.dim(), (4, 2));
        for zi in z.rows() {
            assert!(x.rows().into_iter().any(|xi| xi == zi));
        }
        // reproducible
        assert_eq!(z, RandomSubset::new(42).select(&x.view(), 4).unwrap());
        // no more than the training points
        let z = RandomSubset::new(0).select(&x.view(), 20).unwrap();
        assert_eq!(z.nrows(), 10);
    }

    #[test]
    fn test_located() {
        let z = array![[0.5], [1.5]];
        let x = array![[0.], [1.], [2.]];
        assert_eq!(Located(z.clone()).select(&x.view(), 5).unwrap(), z);
    }

    #[test]
    fn test_function_selector() {
        let x = array![[0.], [1.], [2.]];
        let z = first_rows.select(&x.view(), 2).unwrap();
        assert_eq!(z, array![[0.], [1.]]);
    }
}
