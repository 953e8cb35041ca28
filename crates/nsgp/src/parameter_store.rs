//! Named positive parameters backed by a flat vector of unconstrained latent values.
//!
//! Each parameter is stored as `ln(value)` and read back as `exp(latent)`, so any
//! latent vector proposed by the optimizer maps to strictly positive parameters.
use crate::errors::{NsgpError, Result};
use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayD, Data, Dimension, IxDyn};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Shape of a parameter declared in a [`ParameterStore`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Shape {
    /// A single value
    Scalar,
    /// A vector of the given length
    Vector(usize),
    /// A matrix of the given (rows, columns)
    Matrix(usize, usize),
}

impl Shape {
    /// Number of values held by a parameter of this shape
    pub fn size(&self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector(n) => *n,
            Shape::Matrix(r, c) => r * c,
        }
    }

    /// Array dimensions of a parameter of this shape
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Shape::Scalar => vec![],
            Shape::Vector(n) => vec![*n],
            Shape::Matrix(r, c) => vec![*r, *c],
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Vector(n) => write!(f, "vector({n})"),
            Shape::Matrix(r, c) => write!(f, "matrix({r}x{c})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
struct ParamEntry {
    name: String,
    shape: Shape,
    offset: usize,
}

impl ParamEntry {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.shape.size()
    }
}

/// Registry of named strictly positive parameters.
///
/// Values are kept in declaration order in a single latent vector, which is
/// the only thing the optimizer sees (see [`ParameterStore::latent`]).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(serialize = "F: Serialize", deserialize = "F: Deserialize<'de>"))
)]
pub struct ParameterStore<F: Float> {
    entries: Vec<ParamEntry>,
    latent: Array1<F>,
}

impl<F: Float> Default for ParameterStore<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> ParameterStore<F> {
    /// An empty store
    pub fn new() -> Self {
        ParameterStore {
            entries: Vec::new(),
            latent: Array1::zeros(0),
        }
    }

    /// Registers a strictly positive parameter `name` of the given `shape`
    /// with `init` as initial value.
    ///
    /// Fails with [`NsgpError::DuplicateNameError`] if `name` is already declared,
    /// [`NsgpError::ShapeError`] if `init` does not match `shape` and
    /// [`NsgpError::InvalidValueError`] if `init` holds a non positive or
    /// non finite value.
    pub fn declare_positive<D: Dimension>(
        &mut self,
        name: &str,
        init: &ArrayBase<impl Data<Elem = F>, D>,
        shape: Shape,
    ) -> Result<()> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(NsgpError::DuplicateNameError(name.to_string()));
        }
        if init.shape() != shape.dims().as_slice() {
            return Err(NsgpError::ShapeError(format!(
                "initial value of `{name}` has shape {:?}, expected {shape}",
                init.shape()
            )));
        }
        if let Some(v) = init.iter().find(|v| !v.is_finite() || **v <= F::zero()) {
            return Err(NsgpError::InvalidValueError(format!(
                "initial value of `{name}` must be strictly positive and finite, got {v}"
            )));
        }

        let offset = self.latent.len();
        let mut latent = Array1::zeros(offset + shape.size());
        latent.slice_mut(s![..offset]).assign(&self.latent);
        latent
            .slice_mut(s![offset..])
            .iter_mut()
            .zip(init.iter())
            .for_each(|(l, v)| *l = v.ln());
        self.latent = latent;
        self.entries.push(ParamEntry {
            name: name.to_string(),
            shape,
            offset,
        });
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&ParamEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| NsgpError::NotFoundError(name.to_string()))
    }

    fn positive_values(&self, entry: &ParamEntry) -> Array1<F> {
        self.latent.slice(s![entry.range()]).mapv(|v| v.exp())
    }

    /// Positive value of `name` with its declared shape
    pub fn get(&self, name: &str) -> Result<ArrayD<F>> {
        let entry = self.entry(name)?;
        self.positive_values(entry)
            .into_shape(IxDyn(&entry.shape.dims()))
            .map_err(|err| NsgpError::ShapeError(err.to_string()))
    }

    /// Positive value of the scalar parameter `name`
    pub fn scalar(&self, name: &str) -> Result<F> {
        let entry = self.entry(name)?;
        match entry.shape {
            Shape::Scalar => Ok(self.latent[entry.offset].exp()),
            other => Err(NsgpError::ShapeError(format!(
                "`{name}` is a {other} parameter, not a scalar"
            ))),
        }
    }

    /// Positive value of the vector parameter `name`
    pub fn vector(&self, name: &str) -> Result<Array1<F>> {
        let entry = self.entry(name)?;
        match entry.shape {
            Shape::Vector(_) => Ok(self.positive_values(entry)),
            other => Err(NsgpError::ShapeError(format!(
                "`{name}` is a {other} parameter, not a vector"
            ))),
        }
    }

    /// Positive value of the matrix parameter `name`
    pub fn matrix(&self, name: &str) -> Result<Array2<F>> {
        let entry = self.entry(name)?;
        match entry.shape {
            Shape::Matrix(r, c) => self
                .positive_values(entry)
                .into_shape((r, c))
                .map_err(|err| NsgpError::ShapeError(err.to_string())),
            other => Err(NsgpError::ShapeError(format!(
                "`{name}` is a {other} parameter, not a matrix"
            ))),
        }
    }

    /// Declared shape of `name`
    pub fn shape(&self, name: &str) -> Result<Shape> {
        self.entry(name).map(|e| e.shape)
    }

    /// Flat unconstrained vector of all parameters in declaration order
    pub fn latent(&self) -> &Array1<F> {
        &self.latent
    }

    /// Replaces the latent vector, its length must match [`ParameterStore::len`]
    pub fn set_latent(&mut self, latent: Array1<F>) -> Result<()> {
        if latent.len() != self.latent.len() {
            return Err(NsgpError::ShapeError(format!(
                "latent vector of length {} expected, got {}",
                self.latent.len(),
                latent.len()
            )));
        }
        self.latent = latent;
        Ok(())
    }

    /// A copy of the store holding the given latent vector
    pub fn with_latent(&self, latent: Array1<F>) -> Result<Self> {
        let mut store = self.clone();
        store.set_latent(latent)?;
        Ok(store)
    }

    /// Total number of scalar values
    pub fn len(&self) -> usize {
        self.latent.len()
    }

    /// Whether no parameter is declared
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Positions of `name` values in the latent vector
    pub(crate) fn latent_range(&self, name: &str) -> Result<Range<usize>> {
        self.entry(name).map(|e| e.range())
    }

    #[cfg(test)]
    pub(crate) fn set_positive(&mut self, name: &str, values: &[F]) -> Result<()> {
        let range = self.latent_range(name)?;
        if range.len() != values.len() {
            return Err(NsgpError::ShapeError(name.to_string()));
        }
        self.latent
            .slice_mut(s![range])
            .iter_mut()
            .zip(values)
            .for_each(|(l, v)| *l = v.ln());
        Ok(())
    }
}

impl<F: Float> fmt::Display for ParameterStore<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params = self
            .entries
            .iter()
            .map(|e| format!("{}={}", e.name, self.positive_values(e)))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{params}]")
    }
}
