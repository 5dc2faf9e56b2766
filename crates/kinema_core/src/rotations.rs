use crate::maps::{DifferentiableMap, MapError};
use nalgebra::{DMatrix, DVector, UnitQuaternion};

/// Pitch argument clamp; inside it the orientation is at gimbal lock and the
/// pitch derivatives are zeroed, the same finite-derivative convention the
/// barrier maps use at their margins.
const PITCH_CLAMP: f64 = 0.99999;

/// Quaternion `[x, y, z, w]` to extrinsic roll-pitch-yaw angles, with a
/// hand-derived 3 x 4 Jacobian.
///
/// No Hessian: the output dimension is 3.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuatToEuler;

impl DifferentiableMap for QuatToEuler {
    fn input_dimension(&self) -> usize {
        4
    }

    fn output_dimension(&self) -> usize {
        3
    }

    fn forward(&self, q: &DVector<f64>) -> Result<DVector<f64>, MapError> {
        self.check_input(q)?;
        let (x, y, z, w) = (q[0], q[1], q[2], q[3]);

        let t0 = 2.0 * (w * x + y * z);
        let t1 = 1.0 - 2.0 * (x * x + y * y);
        let roll = t0.atan2(t1);

        let t2 = (2.0 * (w * y - z * x)).clamp(-PITCH_CLAMP, PITCH_CLAMP);
        let pitch = t2.asin();

        let t3 = 2.0 * (w * z + x * y);
        let t4 = 1.0 - 2.0 * (y * y + z * z);
        let yaw = t3.atan2(t4);

        Ok(DVector::from_vec(vec![roll, pitch, yaw]))
    }

    fn jacobian(&self, q: &DVector<f64>) -> Result<DMatrix<f64>, MapError> {
        self.check_input(q)?;
        let (x, y, z, w) = (q[0], q[1], q[2], q[3]);
        let mut jacobian = DMatrix::zeros(3, 4);

        // atan2(u, v) differentiates to (v du - u dv) / (u^2 + v^2).
        let t0 = 2.0 * (w * x + y * z);
        let t1 = 1.0 - 2.0 * (x * x + y * y);
        let dt0 = [2.0 * w, 2.0 * z, 2.0 * y, 2.0 * x];
        let dt1 = [-4.0 * x, -4.0 * y, 0.0, 0.0];
        let denom_roll = t0 * t0 + t1 * t1;
        for col in 0..4 {
            jacobian[(0, col)] = (t1 * dt0[col] - t0 * dt1[col]) / denom_roll;
        }

        let t2 = 2.0 * (w * y - z * x);
        if t2.abs() < PITCH_CLAMP {
            let dt2 = [-2.0 * z, 2.0 * w, -2.0 * x, 2.0 * y];
            let scale = 1.0 / (1.0 - t2 * t2).sqrt();
            for col in 0..4 {
                jacobian[(1, col)] = scale * dt2[col];
            }
        }

        let t3 = 2.0 * (w * z + x * y);
        let t4 = 1.0 - 2.0 * (y * y + z * z);
        let dt3 = [2.0 * y, 2.0 * x, 2.0 * w, 2.0 * z];
        let dt4 = [0.0, -4.0 * y, -4.0 * z, 0.0];
        let denom_yaw = t3 * t3 + t4 * t4;
        for col in 0..4 {
            jacobian[(2, col)] = (t4 * dt3[col] - t3 * dt4[col]) / denom_yaw;
        }

        Ok(jacobian)
    }
}

/// Extrinsic roll-pitch-yaw angles to the quaternion `[x, y, z, w]`; the
/// inverse of [`QuatToEuler`] away from gimbal lock.
pub fn euler_to_quaternion(roll: f64, pitch: f64, yaw: f64) -> DVector<f64> {
    let q = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    DVector::from_vec(vec![q.i, q.j, q.k, q.w])
}
