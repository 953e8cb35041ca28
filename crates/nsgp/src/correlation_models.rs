//! Correlation models of the GPs.
//!
//! * [`SquaredExponentialCorr`]: stationary squared exponential used by the local lengthscale GPs,
//! * [`NsSquaredExponentialCorr`]: non-stationary squared exponential (Gibbs form) used by the
//!   global GP, where each point carries its own lengthscale vector.
//!
//! Both return unit-variance correlations, callers scale them by the signal variance.

use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// A trait for stationary correlation models
pub trait CorrelationModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Correlation matrix `r(x1, x2)` (n1, n2) between the rows of `x1` (n1, nx)
    /// and `x2` (n2, nx) given `lengthscales` (nx).
    ///
    /// *Panics* if dimensions do not agree.
    fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        lengthscales: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F>;
}

/// A trait for non-stationary correlation models
pub trait NonStationaryCorrelationModel<F: Float>:
    Clone + Copy + Default + fmt::Display + Sync
{
    /// Correlation matrix `r(x1, x2)` (n1, n2) where `l1` (n1, nx) and `l2` (n2, nx)
    /// hold the lengthscales at each point of `x1` (n1, nx) and `x2` (n2, nx).
    ///
    /// *Panics* if dimensions do not agree.
    fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F>;
}

/// Squared exponential correlation model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct SquaredExponentialCorr();

impl From<SquaredExponentialCorr> for String {
    fn from(_item: SquaredExponentialCorr) -> String {
        "SquaredExponential".to_string()
    }
}

impl TryFrom<String> for SquaredExponentialCorr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "SquaredExponential" {
            Ok(Self::default())
        } else {
            Err("Bad string value for SquaredExponentialCorr, should be \'SquaredExponential\'")
        }
    }
}

impl<F: Float> CorrelationModel<F> for SquaredExponentialCorr {
    /// ```text
    ///        nx
    /// exp( - sum (x1_d - x2_d)^2 / (2 l_d^2) )
    ///        d=1
    /// ```
    fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        lengthscales: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        assert!(x1.ncols() == x2.ncols() && x1.ncols() == lengthscales.len());
        Array2::from_shape_fn((x1.nrows(), x2.nrows()), |(i, j)| {
            let r = (0..x1.ncols()).fold(F::zero(), |acc, d| {
                let u = (x1[[i, d]] - x2[[j, d]]) / lengthscales[d];
                acc + u * u
            });
            F::exp(F::cast(-0.5) * r)
        })
    }
}

impl fmt::Display for SquaredExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

/// Non-stationary squared exponential correlation model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct NsSquaredExponentialCorr();

impl From<NsSquaredExponentialCorr> for String {
    fn from(_item: NsSquaredExponentialCorr) -> String {
        "NsSquaredExponential".to_string()
    }
}

impl TryFrom<String> for NsSquaredExponentialCorr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "NsSquaredExponential" {
            Ok(Self::default())
        } else {
            Err("Bad string value for NsSquaredExponentialCorr, should be \'NsSquaredExponential\'")
        }
    }
}

impl<F: Float> NonStationaryCorrelationModel<F> for NsSquaredExponentialCorr {
    ///  nx
    /// prod sqrt( 2 |l1_d l2_d| / (l1_d^2 + l2_d^2) )
    ///  d=1
    ///                 nx
    ///     * exp( - sum (x1_d - x2_d)^2 / (l1_d^2 + l2_d^2) )
    ///                 d=1
    ///
    /// Computed from the ratio of the smaller to the larger lengthscale so that
    /// neither the products nor the sums of squares overflow. Two zero lengthscales
    /// give the limit correlation: 1 for identical coordinates, 0 otherwise.
    fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        l2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        assert!(x1.ncols() == x2.ncols());
        assert!(l1.dim() == x1.dim() && l2.dim() == x2.dim());
        let two = F::cast(2.);
        Array2::from_shape_fn((x1.nrows(), x2.nrows()), |(i, j)| {
            let mut prefactor = F::one();
            let mut dist = F::zero();
            for d in 0..x1.ncols() {
                let (a, b) = (l1[[i, d]].abs(), l2[[j, d]].abs());
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                let diff = x1[[i, d]] - x2[[j, d]];
                if hi > F::zero() {
                    let t = lo / hi;
                    let denom = F::one() + t * t;
                    prefactor *= F::sqrt(two * t / denom);
                    let u = diff / hi;
                    dist += u * u / denom;
                } else if diff != F::zero() {
                    return F::zero();
                }
            }
            prefactor * F::exp(-dist)
        })
    }
}

impl fmt::Display for NsSquaredExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NsSquaredExponential")
    }
}
