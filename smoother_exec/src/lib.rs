//! # Trajectory smoother library.
//!
//! This library takes a coarse reference trajectory from an upstream planner and smooths it into
//! one which the vehicle's kinematic model can actually follow, by solving a bound-constrained
//! nonlinear program over the model's inputs.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Trajectory data types - points, discretized trajectories and time-based resampling
pub mod trajectory;

/// Trajectory smoother - vehicle model, problem setup, objective and solver driver
pub mod smoother;
