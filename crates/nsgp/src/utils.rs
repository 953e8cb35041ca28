use crate::errors::{NsgpError, Result};
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{Array2, ArrayBase, Data, Ix2};

/// Lower Cholesky factor of `a + jitter * max(diag(a)) * I`.
///
/// The jitter is relative to the largest diagonal entry so that it dominates
/// the rounding errors of `a` whatever the signal variance. A failed
/// factorization, as well as a factor with a non-finite or non-positive
/// diagonal, is reported as [`NsgpError::NumericalInstabilityError`].
pub(crate) fn cholesky_factor<F: Float>(mut a: Array2<F>, jitter: F) -> Result<Array2<F>> {
    if jitter > F::zero() {
        let scale = a
            .diag()
            .iter()
            .fold(F::zero(), |acc, &v| if v > acc { v } else { acc });
        let nugget = jitter * scale;
        a.diag_mut().mapv_inplace(|v| v + nugget);
    }
    let chol = a.cholesky().map_err(|err| {
        NsgpError::NumericalInstabilityError(format!("Cholesky decomposition failed: {err}"))
    })?;
    if chol.diag().iter().any(|v| !v.is_finite() || *v <= F::zero()) {
        return Err(NsgpError::NumericalInstabilityError(
            "Cholesky decomposition failed: matrix is not positive definite".to_string(),
        ));
    }
    Ok(chol)
}

/// Solves `L X = B` with `L` lower triangular
pub(crate) fn solve_lower<F: Float>(
    chol: &Array2<F>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    chol.solve_triangular(b, UPLO::Lower)
        .map_err(|err| {
            NsgpError::NumericalInstabilityError(format!("Triangular solve failed: {err}"))
        })
}

/// Solves `(L L^T) X = B` given the lower Cholesky factor `L`
pub(crate) fn cho_solve<F: Float>(
    chol: &Array2<F>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let half = solve_lower(chol, b)?;
    chol.t()
        .solve_triangular(&half, UPLO::Upper)
        .map_err(|err| {
            NsgpError::NumericalInstabilityError(format!("Triangular solve failed: {err}"))
        })
}

/// `(a + a^T) / 2`
pub(crate) fn symmetrize<F: Float>(a: Array2<F>) -> Array2<F> {
    (&a + &a.t()) * F::cast(0.5)
}

/// Converts to f64, non representable values become NaN
pub(crate) fn into_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

/// Whether two rows of `x` are exactly equal
pub(crate) fn has_duplicate_rows<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> bool {
    let rows: Vec<_> = x.rows().into_iter().collect();
    rows.iter()
        .enumerate()
        .any(|(i, r)| rows[i + 1..].iter().any(|other| other == r))
}
