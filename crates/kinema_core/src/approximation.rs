use crate::maps::{row_jacobian, DifferentiableMap, MapError, SharedMap};
use crate::operators::LogBarrier;
use anyhow::{ensure, Context, Result};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// `alpha * f(x)`; value, Jacobian, and Hessian all scale together.
pub struct Scale {
    f: SharedMap,
    alpha: f64,
}

impl Scale {
    pub fn new(f: SharedMap, alpha: f64) -> Self {
        Self { f, alpha }
    }
}

impl DifferentiableMap for Scale {
    fn input_dimension(&self) -> usize {
        self.f.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.f.output_dimension()
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        Ok(self.f.forward(x)? * self.alpha)
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        Ok(self.f.jacobian(x)? * self.alpha)
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        Ok(self.f.hessian(x)? * self.alpha)
    }
}

/// Pointwise sum of maps sharing input and output dimensions; derivatives sum
/// termwise.
pub struct SumMap {
    maps: Vec<SharedMap>,
}

impl SumMap {
    pub fn new(maps: Vec<SharedMap>) -> Result<Self> {
        ensure!(!maps.is_empty(), "cannot sum zero maps");
        let n = maps[0].input_dimension();
        let m = maps[0].output_dimension();
        for f in &maps[1..] {
            ensure!(
                f.input_dimension() == n && f.output_dimension() == m,
                "summed maps disagree on dimensions: {}x{} vs {}x{}",
                m,
                n,
                f.output_dimension(),
                f.input_dimension()
            );
        }
        Ok(Self { maps })
    }
}

impl DifferentiableMap for SumMap {
    fn input_dimension(&self) -> usize {
        self.maps[0].input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.maps[0].output_dimension()
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        let mut value = self.maps[0].forward(x)?;
        for f in &self.maps[1..] {
            value += f.forward(x)?;
        }
        Ok(value)
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        let mut jacobian = self.maps[0].jacobian(x)?;
        for f in &self.maps[1..] {
            jacobian += f.jacobian(x)?;
        }
        Ok(jacobian)
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        let mut hessian = self.maps[0].hessian(x)?;
        for f in &self.maps[1..] {
            hessian += f.hessian(x)?;
        }
        Ok(hessian)
    }
}

/// Quadratic surrogate `q(x) = c + b'x + 0.5 x'Hx` capturing a scalar map's
/// value, gradient, and Hessian at an expansion point x0.
///
/// Exact at x0 and globally defined, with a constant Hessian everywhere. The
/// expanded polynomial form re-evaluates without recomputing (x - x0). Once
/// built, the surrogate is immutable and independent of the source map.
pub struct SecondOrderTaylorApproximation {
    x0: DVector<f64>,
    hessian: DMatrix<f64>,
    b: DVector<f64>,
    c: f64,
}

impl SecondOrderTaylorApproximation {
    pub fn new(f: &dyn DifferentiableMap, x0: DVector<f64>) -> Result<Self> {
        ensure!(
            f.output_dimension() == 1,
            "taylor expansion requires a scalar map, got output dimension {}",
            f.output_dimension()
        );
        let value = f.forward(&x0)?[0];
        let gradient = f.gradient(&x0)?;
        let hessian = f.hessian(&x0)?;
        let b = &gradient - hessian.transpose() * &x0;
        let c = value - gradient.dot(&x0) + 0.5 * x0.dot(&(&hessian * &x0));
        Ok(Self { x0, hessian, b, c })
    }

    pub fn expansion_point(&self) -> &DVector<f64> {
        &self.x0
    }
}

impl DifferentiableMap for SecondOrderTaylorApproximation {
    fn input_dimension(&self) -> usize {
        self.x0.len()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let value = self.c + self.b.dot(x) + 0.5 * x.dot(&(&self.hessian * x));
        Ok(DVector::from_element(1, value))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        Ok(row_jacobian(&(&self.hessian * x + &self.b)))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        Ok(self.hessian.clone())
    }
}

/// Scales a unit log barrier and Taylor-expands it at the splice point.
pub fn make_taylor_log_barrier(
    x_splice: f64,
    scalar: f64,
) -> Result<SecondOrderTaylorApproximation> {
    let barrier: SharedMap = Arc::new(LogBarrier::default());
    let scaled = Scale::new(barrier, scalar);
    SecondOrderTaylorApproximation::new(&scaled, DVector::from_element(1, x_splice))
        .context("failed to expand the scaled log barrier at the splice point")
}

/// Log barrier with a quadratic model spliced in near the boundary.
///
/// Three regimes: non-positive inputs are infinitely penalized with zero
/// derivatives; on (0, x_splice] the precomputed Taylor model of
/// `scalar * LogBarrier` applies, bounding the curvature where the true
/// barrier derivative diverges; above x_splice the analytic barrier applies.
/// The splice is C2 because the model is expanded exactly at x_splice.
pub struct LogBarrierWithApprox {
    scalar: f64,
    x_splice: f64,
    approximation: SecondOrderTaylorApproximation,
}

impl LogBarrierWithApprox {
    pub fn new(x_splice: f64, scalar: f64) -> Result<Self> {
        ensure!(
            x_splice > 0.0,
            "splice threshold must be positive, got {x_splice}"
        );
        let approximation = make_taylor_log_barrier(x_splice, scalar)?;
        Ok(Self {
            scalar,
            x_splice,
            approximation,
        })
    }
}

impl DifferentiableMap for LogBarrierWithApprox {
    fn input_dimension(&self) -> usize {
        1
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let value = x[0];
        if value <= 0.0 {
            Ok(DVector::from_element(1, f64::INFINITY))
        } else if value <= self.x_splice {
            self.approximation.forward(x)
        } else {
            Ok(DVector::from_element(1, -self.scalar * value.ln()))
        }
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let value = x[0];
        if value <= 0.0 {
            Ok(DMatrix::from_element(1, 1, 0.0))
        } else if value <= self.x_splice {
            self.approximation.jacobian(x)
        } else {
            Ok(DMatrix::from_element(1, 1, -self.scalar / value))
        }
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let value = x[0];
        if value <= 0.0 {
            Ok(DMatrix::from_element(1, 1, 0.0))
        } else if value <= self.x_splice {
            self.approximation.hessian(x)
        } else {
            Ok(DMatrix::from_element(1, 1, self.scalar / (value * value)))
        }
    }
}
