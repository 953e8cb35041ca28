use thiserror::Error;

/// A result type for non-stationary GP regression
pub type Result<T> = std::result::Result<T, NsgpError>;

/// An error when using [`NsgpRegression`](crate::NsgpRegression) or one of its building blocks
#[derive(Error, Debug)]
pub enum NsgpError {
    /// When arrays or parameters do not have the expected rank or dimensions
    #[error("Shape error: {0}")]
    ShapeError(String),
    /// When a parameter name is unknown to the store
    #[error("Parameter not found: {0}")]
    NotFoundError(String),
    /// When a parameter name is declared twice
    #[error("Duplicate parameter: {0}")]
    DuplicateNameError(String),
    /// When a Cholesky factorization fails or the objective is not finite
    #[error("Numerical instability: {0}")]
    NumericalInstabilityError(String),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When the optimizer fails for another reason than the objective
    #[error("Optimization error: {0}")]
    OptimizationError(String),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When a model cannot be (de)serialized
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
}

impl From<argmin::core::Error> for NsgpError {
    fn from(err: argmin::core::Error) -> Self {
        // objective errors travel through argmin untouched
        match err.downcast::<NsgpError>() {
            Ok(err) => err,
            Err(err) => NsgpError::OptimizationError(err.to_string()),
        }
    }
}
