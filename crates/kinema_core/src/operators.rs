use crate::maps::{row_jacobian, DifferentiableMap, MapError, SharedMap};
use anyhow::{ensure, Result};
use nalgebra::{DMatrix, DVector};

/// Barrier cost `-ln(x)` over the half-line x > margin, +infinity at or
/// below it.
///
/// At or inside the margin the Jacobian and Hessian are clamped to zero
/// rather than diverging.
#[derive(Debug, Clone, Copy)]
pub struct LogBarrier {
    margin: f64,
}

impl LogBarrier {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }
}

impl Default for LogBarrier {
    fn default() -> Self {
        Self { margin: 0.0 }
    }
}

impl DifferentiableMap for LogBarrier {
    fn input_dimension(&self) -> usize {
        1
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let x = x[0];
        let value = if x <= self.margin {
            f64::INFINITY
        } else {
            -x.ln()
        };
        Ok(DVector::from_element(1, value))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let x = x[0];
        let slope = if x <= self.margin { 0.0 } else { -1.0 / x };
        Ok(DMatrix::from_element(1, 1, slope))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let x = x[0];
        let curvature = if x <= self.margin { 0.0 } else { 1.0 / (x * x) };
        Ok(DMatrix::from_element(1, 1, curvature))
    }
}

/// Smoothed Euclidean norm of (x - x0): `sqrt(||x - x0||^2 + alpha^2) - alpha`.
///
/// Zero at x0 and non-negative, converging to the true norm as the argument
/// grows; the smoothing removes the gradient singularity at x0.
#[derive(Debug, Clone)]
pub struct SoftNorm {
    x0: DVector<f64>,
    alpha: f64,
    alpha_sq: f64,
}

impl SoftNorm {
    pub fn new(x0: DVector<f64>, alpha: f64) -> Result<Self> {
        ensure!(alpha > 0.0, "smoothing constant must be positive, got {alpha}");
        Ok(Self {
            alpha_sq: alpha * alpha,
            x0,
            alpha,
        })
    }

    /// Soft norm about the origin of an n-dimensional space.
    pub fn centered(n: usize, alpha: f64) -> Result<Self> {
        Self::new(DVector::zeros(n), alpha)
    }

    fn smoothed_radius(&self, displaced: &DVector<f64>) -> f64 {
        (displaced.norm_squared() + self.alpha_sq).sqrt()
    }
}

impl DifferentiableMap for SoftNorm {
    fn input_dimension(&self) -> usize {
        self.x0.len()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let displaced = x - &self.x0;
        Ok(DVector::from_element(
            1,
            self.smoothed_radius(&displaced) - self.alpha,
        ))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let displaced = x - &self.x0;
        let radius = self.smoothed_radius(&displaced);
        Ok(row_jacobian(&(displaced / radius)))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let n = self.x0.len();
        let displaced = x - &self.x0;
        let radius = self.smoothed_radius(&displaced);
        let unit = displaced / radius;
        Ok((DMatrix::identity(n, n) - &unit * unit.transpose()) / radius)
    }
}

/// Soft distance over an arbitrary squared-distance map d:
/// `sqrt(d(x) + alpha^2) - alpha`.
///
/// Derivatives follow from the chain rule through d's own Jacobian and
/// Hessian, so any twice-differentiable scalar map gains a bounded, smooth
/// distance this way.
pub struct SoftDist {
    sq_dist: SharedMap,
    alpha: f64,
    alpha_sq: f64,
}

impl SoftDist {
    pub fn new(sq_dist: SharedMap, alpha: f64) -> Result<Self> {
        ensure!(alpha > 0.0, "smoothing constant must be positive, got {alpha}");
        ensure!(
            sq_dist.output_dimension() == 1,
            "squared-distance map must be scalar-valued, got output dimension {}",
            sq_dist.output_dimension()
        );
        Ok(Self {
            alpha_sq: alpha * alpha,
            sq_dist,
            alpha,
        })
    }
}

impl DifferentiableMap for SoftDist {
    fn input_dimension(&self) -> usize {
        self.sq_dist.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let d = self.sq_dist.forward(x)?[0];
        Ok(DVector::from_element(1, (d + self.alpha_sq).sqrt() - self.alpha))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let d = self.sq_dist.forward(x)?[0];
        let radius = (d + self.alpha_sq).sqrt();
        Ok(self.sq_dist.jacobian(x)? * (0.5 / radius))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let d = self.sq_dist.forward(x)?[0];
        let radius = (d + self.alpha_sq).sqrt();
        let g = self.sq_dist.gradient(x)? * (0.5 / radius);
        Ok((self.sq_dist.hessian(x)? * 0.5 - &g * g.transpose()) / radius)
    }
}

/// Smooth maximum: `(1/alpha) ln sum_i exp(alpha x_i)`, sharpening toward the
/// true maximum as alpha grows.
///
/// Exponentials are computed on shifted arguments (largest exponent
/// subtracted, compensated in the log term) so large `alpha * x_i` cannot
/// overflow; the shift cancels entirely in the softmax weights.
#[derive(Debug, Clone, Copy)]
pub struct LogSumExp {
    n: usize,
    alpha: f64,
    inv_alpha: f64,
}

impl LogSumExp {
    pub fn new(n: usize, alpha: f64) -> Result<Self> {
        ensure!(n > 0, "input dimension must be positive");
        ensure!(alpha > 0.0, "sharpness must be positive, got {alpha}");
        Ok(Self {
            n,
            alpha,
            inv_alpha: 1.0 / alpha,
        })
    }

    /// Shifted exponentials z_i = exp(alpha x_i - shift), their sum, and the
    /// shift max_i(alpha x_i).
    fn shifted_exponentials(&self, x: &DVector<f64>) -> (DVector<f64>, f64, f64) {
        let shift = x
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &v| acc.max(self.alpha * v));
        let z = x.map(|v| (self.alpha * v - shift).exp());
        let z_sum = z.sum();
        (z, z_sum, shift)
    }
}

impl DifferentiableMap for LogSumExp {
    fn input_dimension(&self) -> usize {
        self.n
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let (_, z_sum, shift) = self.shifted_exponentials(x);
        Ok(DVector::from_element(
            1,
            self.inv_alpha * (shift + z_sum.ln()),
        ))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let (z, z_sum, _) = self.shifted_exponentials(x);
        Ok(row_jacobian(&(z / z_sum)))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let (z, z_sum, _) = self.shifted_exponentials(x);
        let p = z / z_sum;
        Ok((DMatrix::from_diagonal(&p) - &p * p.transpose()) * self.alpha)
    }
}

/// Smooth minimum: `-(1/alpha) ln sum_i exp(-alpha x_i)`, the mirrored
/// counterpart of [`LogSumExp`].
#[derive(Debug, Clone, Copy)]
pub struct NegLogSumExp {
    mirrored: LogSumExp,
}

impl NegLogSumExp {
    pub fn new(n: usize, alpha: f64) -> Result<Self> {
        Ok(Self {
            mirrored: LogSumExp::new(n, alpha)?,
        })
    }
}

impl DifferentiableMap for NegLogSumExp {
    fn input_dimension(&self) -> usize {
        self.mirrored.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        Ok(-self.mirrored.forward(&(-x))?)
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        // Both sign flips cancel: the weights still sum to one.
        self.mirrored.jacobian(&(-x))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        Ok(-self.mirrored.hessian(&(-x))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::{finite_difference_hessian, finite_difference_jacobian};
    use std::sync::Arc;

    /// Squared distance to x0: the map SoftDist composes over.
    struct SquaredDistance {
        x0: DVector<f64>,
    }

    impl DifferentiableMap for SquaredDistance {
        fn input_dimension(&self) -> usize {
            self.x0.len()
        }
        fn output_dimension(&self) -> usize {
            1
        }
        fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
            self.check_input(x)?;
            Ok(DVector::from_element(1, (x - &self.x0).norm_squared()))
        }
        fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
            self.check_input(x)?;
            Ok(row_jacobian(&((x - &self.x0) * 2.0)))
        }
        fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
            self.check_input(x)?;
            let n = self.x0.len();
            Ok(DMatrix::identity(n, n) * 2.0)
        }
    }

    #[test]
    fn log_barrier_evaluates_the_negative_log() {
        let barrier = LogBarrier::default();
        let x = DVector::from_element(1, 2.0);
        assert!((barrier.forward(&x).unwrap()[0] - (-(2.0f64).ln())).abs() < 1e-12);
        assert!((barrier.jacobian(&x).unwrap()[(0, 0)] + 0.5).abs() < 1e-12);
        assert!((barrier.hessian(&x).unwrap()[(0, 0)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn log_barrier_is_infinite_below_margin_with_clamped_derivatives() {
        let barrier = LogBarrier::new(0.5);
        for value in [-1.0, 0.0, 0.3, 0.5] {
            let x = DVector::from_element(1, value);
            assert!(barrier.forward(&x).unwrap()[0].is_infinite());
            assert_eq!(barrier.jacobian(&x).unwrap()[(0, 0)], 0.0);
            assert_eq!(barrier.hessian(&x).unwrap()[(0, 0)], 0.0);
        }
    }

    #[test]
    fn log_barrier_derivatives_match_finite_differences() {
        let barrier = LogBarrier::default();
        for value in [0.5, 1.0, 3.7] {
            let x = DVector::from_element(1, value);
            let jacobian = barrier.jacobian(&x).unwrap();
            let fd = finite_difference_jacobian(&barrier, &x).unwrap();
            assert!((jacobian - fd).norm() < 1e-6, "jacobian mismatch at {value}");
            let hessian = barrier.hessian(&x).unwrap();
            let fd = finite_difference_hessian(&barrier, &x).unwrap();
            assert!((hessian - fd).norm() < 1e-6, "hessian mismatch at {value}");
        }
    }

    #[test]
    fn soft_norm_is_zero_at_reference_and_non_negative() {
        let x0 = DVector::from_vec(vec![1.0, -2.0]);
        let norm = SoftNorm::new(x0.clone(), 0.05).unwrap();
        assert!(norm.forward(&x0).unwrap()[0].abs() < 1e-12);
        for point in [[3.0, 4.0], [-0.2, 0.1], [1.0, -1.9]] {
            let x = DVector::from_row_slice(&point);
            assert!(norm.forward(&x).unwrap()[0] >= 0.0);
        }
    }

    #[test]
    fn soft_norm_value_at_a_known_point() {
        let norm = SoftNorm::centered(2, 0.1).unwrap();
        let x = DVector::from_vec(vec![3.0, 4.0]);
        let expected = (25.01f64).sqrt() - 0.1;
        assert!((norm.forward(&x).unwrap()[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn soft_norm_derivatives_match_finite_differences() {
        let norm = SoftNorm::new(DVector::from_vec(vec![0.5, -0.5]), 0.2).unwrap();
        // Includes the reference point, where the unsmoothed norm would be
        // singular.
        for point in [[0.3, -1.2], [0.5, -0.5], [2.0, 1.0]] {
            let x = DVector::from_row_slice(&point);
            let jacobian = norm.jacobian(&x).unwrap();
            let fd = finite_difference_jacobian(&norm, &x).unwrap();
            assert!((jacobian - fd).norm() < 1e-6);
            let hessian = norm.hessian(&x).unwrap();
            let fd = finite_difference_hessian(&norm, &x).unwrap();
            assert!((hessian - fd).norm() < 1e-6);
        }
    }

    #[test]
    fn soft_dist_reduces_to_soft_norm_over_a_squared_norm() {
        let x0 = DVector::from_vec(vec![1.0, 2.0]);
        let alpha = 0.1;
        let dist = SoftDist::new(Arc::new(SquaredDistance { x0: x0.clone() }), alpha).unwrap();
        let norm = SoftNorm::new(x0, alpha).unwrap();
        for point in [[3.0, 4.0], [1.0, 2.0], [-0.5, 0.7]] {
            let x = DVector::from_row_slice(&point);
            assert!((dist.forward(&x).unwrap()[0] - norm.forward(&x).unwrap()[0]).abs() < 1e-9);
            assert!((dist.jacobian(&x).unwrap() - norm.jacobian(&x).unwrap()).norm() < 1e-9);
            assert!((dist.hessian(&x).unwrap() - norm.hessian(&x).unwrap()).norm() < 1e-9);
        }
    }

    #[test]
    fn soft_dist_derivatives_match_finite_differences() {
        let sq_dist = Arc::new(SquaredDistance {
            x0: DVector::from_vec(vec![-1.0, 0.5, 2.0]),
        });
        let dist = SoftDist::new(sq_dist, 0.3).unwrap();
        let x = DVector::from_vec(vec![0.4, -0.7, 1.1]);
        let jacobian = dist.jacobian(&x).unwrap();
        let fd = finite_difference_jacobian(&dist, &x).unwrap();
        assert!((jacobian - fd).norm() < 1e-6);
        let hessian = dist.hessian(&x).unwrap();
        let fd = finite_difference_hessian(&dist, &x).unwrap();
        assert!((hessian - fd).norm() < 1e-6);
    }

    #[test]
    fn log_sum_exp_jacobian_is_a_distribution() {
        let lse = LogSumExp::new(3, 2.5).unwrap();
        for point in [[1.0, 3.0, 2.0], [-4.0, 0.0, 4.0], [0.1, 0.1, 0.1]] {
            let x = DVector::from_row_slice(&point);
            let jacobian = lse.jacobian(&x).unwrap();
            assert!((jacobian.sum() - 1.0).abs() < 1e-12);
            assert!(jacobian.iter().all(|&w| w >= 0.0));
        }
    }

    #[test]
    fn log_sum_exp_approximates_the_maximum() {
        let lse = LogSumExp::new(3, 20.0).unwrap();
        let x = DVector::from_vec(vec![1.0, 3.0, 2.0]);
        let value = lse.forward(&x).unwrap()[0];
        assert!(value >= 3.0);
        assert!(value - 3.0 <= (3.0f64).ln() / 20.0 + 1e-12);
    }

    #[test]
    fn log_sum_exp_survives_inputs_beyond_exp_range() {
        let lse = LogSumExp::new(2, 1.0).unwrap();
        let x = DVector::from_vec(vec![1000.0, 999.0]);
        let value = lse.forward(&x).unwrap()[0];
        let expected = 1000.0 + (1.0 + (-1.0f64).exp()).ln();
        assert!(value.is_finite());
        assert!((value - expected).abs() < 1e-9);
        let jacobian = lse.jacobian(&x).unwrap();
        assert!(jacobian.iter().all(|w| w.is_finite()));
        assert!((jacobian.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn log_sum_exp_derivatives_match_finite_differences() {
        let lse = LogSumExp::new(2, 2.5).unwrap();
        let x = DVector::from_vec(vec![0.3, -0.4]);
        let jacobian = lse.jacobian(&x).unwrap();
        let fd = finite_difference_jacobian(&lse, &x).unwrap();
        assert!((jacobian - fd).norm() < 1e-6);
        // The alpha chain-rule factor in the Hessian is exactly what finite
        // differences of the softmax gradient produce.
        let hessian = lse.hessian(&x).unwrap();
        let fd = finite_difference_hessian(&lse, &x).unwrap();
        assert!((&hessian - fd).norm() < 1e-6);
        assert!((&hessian - hessian.transpose()).norm() < 1e-12);
        for row in 0..2 {
            assert!(hessian.row(row).sum().abs() < 1e-12);
        }
    }

    #[test]
    fn neg_log_sum_exp_approximates_the_minimum() {
        let nlse = NegLogSumExp::new(3, 20.0).unwrap();
        let x = DVector::from_vec(vec![1.0, 3.0, 2.0]);
        let value = nlse.forward(&x).unwrap()[0];
        assert!(value <= 1.0);
        assert!(1.0 - value <= (3.0f64).ln() / 20.0 + 1e-12);
        let jacobian = nlse.jacobian(&x).unwrap();
        assert!((jacobian.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn neg_log_sum_exp_derivatives_match_finite_differences() {
        let nlse = NegLogSumExp::new(2, 3.0).unwrap();
        let x = DVector::from_vec(vec![0.8, 0.2]);
        let jacobian = nlse.jacobian(&x).unwrap();
        let fd = finite_difference_jacobian(&nlse, &x).unwrap();
        assert!((jacobian - fd).norm() < 1e-6);
        let hessian = nlse.hessian(&x).unwrap();
        let fd = finite_difference_hessian(&nlse, &x).unwrap();
        assert!((hessian - fd).norm() < 1e-6);
    }
}
