use anyhow::{ensure, Result};
use nalgebra::{DMatrix, Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// How a joint moves its link relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointType {
    Rotational,
    Prismatic,
    Fixed,
}

/// Joint limits, radians or meters depending on the joint type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointBounds {
    pub lower: f64,
    pub upper: f64,
}

/// One link of a serial chain together with the joint attaching it to the
/// previous link.
///
/// Base-frame quantities (`frame_in_base`, `joint_axis_in_base`) are only
/// meaningful after [`KinematicChain::set_and_update`] has run for the
/// current configuration.
#[derive(Debug, Clone)]
pub struct RigidBody {
    name: String,
    joint_name: String,
    joint_type: JointType,
    joint_bounds: JointBounds,
    frame_in_base: Isometry3<f64>,
    frame_in_local: Isometry3<f64>,
    local_in_prev: Isometry3<f64>,
    joint_axis_in_local: Vector3<f64>,
    joint_axis_in_base: Vector3<f64>,
}

impl RigidBody {
    pub fn new(
        name: impl Into<String>,
        joint_name: impl Into<String>,
        joint_type: JointType,
        joint_bounds: JointBounds,
        local_in_prev: Isometry3<f64>,
        joint_axis_in_local: Vector3<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            joint_name: joint_name.into(),
            joint_type,
            joint_bounds,
            frame_in_base: Isometry3::identity(),
            frame_in_local: local_in_prev,
            local_in_prev,
            joint_axis_in_local,
            joint_axis_in_base: Vector3::zeros(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_name(&self) -> &str {
        &self.joint_name
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn joint_bounds(&self) -> JointBounds {
        self.joint_bounds
    }

    pub fn frame_in_base(&self) -> &Isometry3<f64> {
        &self.frame_in_base
    }

    /// Position of the joint origin in the base frame.
    pub fn joint_origin_in_base(&self) -> Vector3<f64> {
        self.frame_in_base.translation.vector
    }

    pub fn joint_axis_in_base(&self) -> &Vector3<f64> {
        &self.joint_axis_in_base
    }

    /// Recomputes the local frame for the given joint value.
    fn set_joint_value(&mut self, q: f64) {
        let motion = match self.joint_type {
            JointType::Rotational => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(
                    &Unit::new_normalize(self.joint_axis_in_local),
                    q,
                ),
            ),
            JointType::Prismatic => Isometry3::from_parts(
                Translation3::from(self.joint_axis_in_local * q),
                UnitQuaternion::identity(),
            ),
            JointType::Fixed => Isometry3::identity(),
        };
        self.frame_in_local = self.local_in_prev * motion;
    }
}

/// Ordered serial chain, base to tip.
#[derive(Debug, Clone, Default)]
pub struct KinematicChain {
    bodies: Vec<RigidBody>,
}

impl KinematicChain {
    pub fn new(bodies: Vec<RigidBody>) -> Self {
        Self { bodies }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    /// Sets all joint values and propagates base-frame transforms and joint
    /// axes down the chain.
    pub fn set_and_update(&mut self, q: &[f64]) -> Result<()> {
        ensure!(
            q.len() == self.bodies.len(),
            "configuration length mismatch: chain has {} joints, got {}",
            self.bodies.len(),
            q.len()
        );
        let mut prev_in_base = Isometry3::identity();
        for (body, &value) in self.bodies.iter_mut().zip(q) {
            body.set_joint_value(value);
            body.frame_in_base = prev_in_base * body.frame_in_local;
            body.joint_axis_in_base = body.frame_in_base.rotation * body.joint_axis_in_local;
            prev_in_base = body.frame_in_base;
        }
        Ok(())
    }

    /// Position Jacobian of link `link_index` with respect to all joint
    /// values: a 3 x len matrix whose column j is `axis_j x (p - origin_j)`
    /// for joints upstream of the link and zero from the link onward. A joint
    /// only moves what is downstream of it.
    pub fn jacobian_position(&self, link_index: usize) -> Result<DMatrix<f64>> {
        ensure!(
            link_index < self.bodies.len(),
            "link index {} out of range for chain of length {}",
            link_index,
            self.bodies.len()
        );
        let mut jacobian = DMatrix::zeros(3, self.bodies.len());
        let p = self.bodies[link_index].joint_origin_in_base();
        for (j, body) in self.bodies.iter().enumerate().take(link_index) {
            let origin = body.joint_origin_in_base();
            let column = body.joint_axis_in_base().cross(&(p - origin));
            jacobian.set_column(j, &column);
        }
        Ok(jacobian)
    }
}
