//! This library implements non-stationary Gaussian Process regression: the lengthscale
//! of the kernel varies across the input space instead of being a single hyperparameter.
//!
//! The model is a two-level hierarchy of GPs:
//!
//! * for each input dimension, a local GP conditioned on learned lengthscale values at a
//!   fixed set of inducing points predicts the lengthscale field of that dimension,
//! * a global GP regresses the training outputs with a non-stationary squared exponential
//!   kernel evaluated with the lengthscales predicted at both points.
//!
//! Every hyperparameter is strictly positive and stored as its logarithm in a
//! [`ParameterStore`]. Training minimizes the negative log marginal likelihood of the
//! global GP minus the log-density terms of the local GPs with L-BFGS
//! (see [argmin](https://argmin-rs.org)).
//!
//! # Example
//!
//! ```no_run
//! use nsgp::{Inducings, NsgpRegression};
//! use linfa::prelude::*;
//! use ndarray::{Array1, Axis};
//!
//! let xt = Array1::linspace(0., 6., 8).insert_axis(Axis(1));
//! let yt = xt.mapv(f64::sin);
//!
//! let nsgp = NsgpRegression::params(Inducings::Linspaced(3))
//!     .seed(42)
//!     .max_iters(100)
//!     .fit(&DatasetBase::new(xt, yt))
//!     .expect("NSGP fitted");
//!
//! let xtest = Array1::linspace(0., 6., 20).insert_axis(Axis(1));
//! let mean = nsgp.predict(&xtest).expect("NSGP prediction").0;
//! ```
//!
//! # Features
//!
//! ## serializable
//!
//! The `serializable` feature enables the serialization of models using
//! [`serde`](https://serde.rs/).
//!
//! ## persistent
//!
//! The `persistent` feature enables `save()`/`load()` methods for a trained model
//! to/from a JSON file.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod correlation_models;
mod errors;
mod global_model;
mod inducings;
mod local_model;
mod objective;
mod optimization;
mod parameter_store;
mod parameters;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use global_model::*;
pub use inducings::*;
pub use local_model::*;
pub use objective::*;
pub use optimization::OptimOutcome;
pub use parameter_store::*;
pub use parameters::*;
