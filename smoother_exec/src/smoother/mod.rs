//! # Trajectory smoother module
//!
//! The smoother turns a kinematically inconsistent reference trajectory into one the vehicle can
//! follow. The decision variables are the model inputs, jerk and curvature rate, on a time grid
//! which may be finer than the reference's (the subsampling factor sets how many intermediate
//! steps are inserted between each pair of reference points).
//!
//! Each objective evaluation forward integrates the vehicle model from the reference's first
//! state, propagating the sensitivity of every state to every earlier input. The cost penalises
//! deviation from the reference at the steps which line up with reference points, along with
//! acceleration, curvature and input magnitudes, and its gradient follows in closed form from the
//! sensitivity matrix. A bound-constrained gradient solver then minimises it.
//!
//! The typical cycle is:
//!
//!  1. `TrajSmoother::initialise_problem` with the reference trajectory
//!  1. `TrajSmoother::optimize`
//!  1. `TrajSmoother::get_optimized_trajectory`

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod constraints;
pub mod integrator;
pub mod model;
pub mod objective;
pub mod params;
pub mod problem;
pub mod solver;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::{CostParams, Params, SolverParams};
pub use problem::{Candidate, Problem, ProblemError};
pub use solver::{Algorithm, NloptSolver, NlpProblem, NlpSolver, SolverError, Termination};
pub use state::*;
