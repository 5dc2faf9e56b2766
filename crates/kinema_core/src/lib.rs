pub mod approximation;
pub mod cost_terms;
pub mod kinematics;
/// The `kinema_core` crate provides the differentiable-map engine used to
/// assemble cost terms for robot-motion and trajectory optimization.
///
/// Key components:
/// - **Maps**: the `DifferentiableMap` contract (value/Jacobian/Hessian and
///   dimensions) plus finite-difference validators.
/// - **Operators**: atomic scalar operators with hand-derived closed-form
///   derivatives (log barrier, soft norm, soft distance, log-sum-exp).
/// - **Approximation**: scaling/summing combinators, second-order Taylor
///   surrogates, and the spliced log barrier built from them.
/// - **Cost terms**: obstacle potentials composed over signed-distance fields.
/// - **Kinematics**: serial-chain forward kinematics and the per-link
///   position Jacobian consumed by task-space cost terms.
pub mod maps;
pub mod operators;
pub mod rotations;
