use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use thiserror::Error;

/// Step used by the central finite-difference validators.
const FD_STEP: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// The evaluation point does not have the map's declared input dimension.
    #[error("input dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Hessians and gradients are only defined for scalar-valued maps.
    #[error("operation requires a scalar map, got output dimension {output_dimension}")]
    ScalarMapRequired { output_dimension: usize },
}

/// Shared handle to a map. Cost terms commonly alias the same underlying map
/// (a workspace signed-distance field, a squared-distance residual), so
/// wrapped maps are reference counted.
pub type SharedMap = Arc<dyn DifferentiableMap + Send + Sync>;

/// A function with a well-defined value, Jacobian, and (for scalar output)
/// Hessian at any input point.
///
/// Implementations are pure in the evaluation point: parameters are fixed at
/// construction and no point-dependent state survives between calls, so a map
/// behind a `SharedMap` may be evaluated concurrently without locking.
pub trait DifferentiableMap {
    /// Dimension n of the input space.
    fn input_dimension(&self) -> usize;

    /// Dimension m of the output space, commonly 1.
    fn output_dimension(&self) -> usize;

    /// Value at x, length `output_dimension`.
    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError>;

    /// Jacobian at x, `output_dimension` rows by `input_dimension` columns.
    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError>;

    /// Hessian at x, `input_dimension` square and symmetric. Only defined for
    /// scalar maps.
    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        let _ = x;
        Err(MapError::ScalarMapRequired {
            output_dimension: self.output_dimension(),
        })
    }

    /// Gradient of a scalar map: the transposed 1 x n Jacobian.
    fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        if self.output_dimension() != 1 {
            return Err(MapError::ScalarMapRequired {
                output_dimension: self.output_dimension(),
            });
        }
        Ok(self.jacobian(x)?.row(0).transpose())
    }

    /// Validates the evaluation point length against `input_dimension`.
    fn check_input(&self, x: &DVector<f64>) -> Result<(), MapError> {
        if x.len() != self.input_dimension() {
            return Err(MapError::DimensionMismatch {
                expected: self.input_dimension(),
                got: x.len(),
            });
        }
        Ok(())
    }
}

/// Builds the 1 x n Jacobian of a scalar map from its gradient.
pub(crate) fn row_jacobian(gradient: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, gradient.len(), gradient.as_slice())
}

/// Central finite-difference Jacobian of `f` at x.
///
/// Used by the test suite to validate the hand-derived Jacobian of every
/// operator.
pub fn finite_difference_jacobian(
    f: &dyn DifferentiableMap,
    x: &DVector<f64>,
) -> Result<DMatrix<f64>, MapError> {
    f.check_input(x)?;
    let mut jacobian = DMatrix::zeros(f.output_dimension(), f.input_dimension());
    for col in 0..f.input_dimension() {
        let mut x_plus = x.clone();
        let mut x_minus = x.clone();
        x_plus[col] += FD_STEP;
        x_minus[col] -= FD_STEP;
        let delta = (f.forward(&x_plus)? - f.forward(&x_minus)?) / (2.0 * FD_STEP);
        jacobian.set_column(col, &delta);
    }
    Ok(jacobian)
}

/// Central finite difference of the analytic gradient: the reference Hessian
/// of a scalar map.
pub fn finite_difference_hessian(
    f: &dyn DifferentiableMap,
    x: &DVector<f64>,
) -> Result<DMatrix<f64>, MapError> {
    f.check_input(x)?;
    let n = f.input_dimension();
    let mut hessian = DMatrix::zeros(n, n);
    for col in 0..n {
        let mut x_plus = x.clone();
        let mut x_minus = x.clone();
        x_plus[col] += FD_STEP;
        x_minus[col] -= FD_STEP;
        let delta = (f.gradient(&x_plus)? - f.gradient(&x_minus)?) / (2.0 * FD_STEP);
        hessian.set_column(col, &delta);
    }
    Ok(hessian)
}
