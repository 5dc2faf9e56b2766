use crate::maps::{DifferentiableMap, MapError, SharedMap};
use anyhow::{ensure, Result};
use nalgebra::{DMatrix, DVector};

/// Exponential obstacle penalty over a signed-distance field:
/// `rho_scaling * exp(-alpha * sdf(x))`.
///
/// Decays to zero as the signed distance grows and diverges under penetration
/// (negative signed distance).
pub struct ObstaclePotential {
    signed_distance_field: SharedMap,
    alpha: f64,
    rho_scaling: f64,
    ambient_dim: usize,
}

impl ObstaclePotential {
    pub fn new(signed_distance_field: SharedMap, alpha: f64, rho_scaling: f64) -> Result<Self> {
        ensure!(
            signed_distance_field.output_dimension() == 1,
            "signed-distance field must be scalar-valued, got output dimension {}",
            signed_distance_field.output_dimension()
        );
        ensure!(alpha > 0.0, "alpha must be positive, got {alpha}");
        ensure!(
            rho_scaling > 0.0,
            "rho scaling must be positive, got {rho_scaling}"
        );
        let ambient_dim = signed_distance_field.input_dimension();
        Ok(Self {
            signed_distance_field,
            alpha,
            rho_scaling,
            ambient_dim,
        })
    }
}

impl DifferentiableMap for ObstaclePotential {
    fn input_dimension(&self) -> usize {
        self.ambient_dim
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(x)?;
        let distance = self.signed_distance_field.forward(x)?[0];
        let rho = self.rho_scaling * (-self.alpha * distance).exp();
        Ok(DVector::from_element(1, rho))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let rho = self.forward(x)?[0];
        Ok(self.signed_distance_field.jacobian(x)? * (-self.alpha * rho))
    }

    fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(x)?;
        let rho = self.forward(x)?[0];
        let j_sdf = self.signed_distance_field.jacobian(x)?;
        let h_sdf = self.signed_distance_field.hessian(x)?;
        Ok((j_sdf.transpose() * &j_sdf * (self.alpha * self.alpha) - h_sdf * self.alpha) * rho)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::{finite_difference_hessian, finite_difference_jacobian, row_jacobian};
    use crate::operators::SoftNorm;
    use std::sync::Arc;

    /// Half-space signed distance: `n . x - offset` with unit normal n.
    struct PlaneSdf {
        normal: DVector<f64>,
        offset: f64,
    }

    impl DifferentiableMap for PlaneSdf {
        fn input_dimension(&self) -> usize {
            self.normal.len()
        }
        fn output_dimension(&self) -> usize {
            1
        }
        fn forward(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapError> {
            self.check_input(x)?;
            Ok(DVector::from_element(1, self.normal.dot(x) - self.offset))
        }
        fn jacobian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
            self.check_input(x)?;
            Ok(row_jacobian(&self.normal))
        }
        fn hessian(&self, x: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
            self.check_input(x)?;
            let n = self.normal.len();
            Ok(DMatrix::zeros(n, n))
        }
    }

    fn wall() -> SharedMap {
        Arc::new(PlaneSdf {
            normal: DVector::from_vec(vec![1.0, 0.0]),
            offset: 0.0,
        })
    }

    #[test]
    fn potential_decays_away_and_diverges_inside() {
        let potential = ObstaclePotential::new(wall(), 2.0, 1.0).unwrap();
        let far = DVector::from_vec(vec![10.0, 0.0]);
        assert!(potential.forward(&far).unwrap()[0] < 1e-8);
        let inside = DVector::from_vec(vec![-5.0, 0.0]);
        assert!(potential.forward(&inside).unwrap()[0] > 1e4);
        let at_one = DVector::from_vec(vec![1.0, 0.3]);
        assert!((potential.forward(&at_one).unwrap()[0] - (-2.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn jacobian_follows_the_chain_rule_through_the_exponential() {
        let potential = ObstaclePotential::new(wall(), 2.0, 1.5).unwrap();
        let x = DVector::from_vec(vec![0.7, -0.2]);
        let rho = potential.forward(&x).unwrap()[0];
        let jacobian = potential.jacobian(&x).unwrap();
        assert!((jacobian[(0, 0)] + 2.0 * rho).abs() < 1e-12);
        assert!(jacobian[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn derivatives_match_finite_differences_over_a_curved_field() {
        let sdf: SharedMap = Arc::new(SoftNorm::centered(2, 0.5).unwrap());
        let potential = ObstaclePotential::new(sdf, 1.5, 2.0).unwrap();
        let x = DVector::from_vec(vec![0.4, -0.7]);
        let jacobian = potential.jacobian(&x).unwrap();
        let fd = finite_difference_jacobian(&potential, &x).unwrap();
        assert!((jacobian - fd).norm() < 1e-6);
        let hessian = potential.hessian(&x).unwrap();
        let fd = finite_difference_hessian(&potential, &x).unwrap();
        assert!((hessian - fd).norm() < 1e-6);
    }

    #[test]
    fn ambient_dimension_comes_from_the_wrapped_field() {
        let potential = ObstaclePotential::new(wall(), 1.0, 1.0).unwrap();
        assert_eq!(potential.input_dimension(), 2);
        let wrong = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(potential.forward(&wrong).is_err());
    }
}
