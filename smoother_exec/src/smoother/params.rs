//! Trajectory smoother parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::solver::Algorithm;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the trajectory smoother
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Number of intermediate integration steps inserted between each pair of reference points.
    pub subsampling: usize,

    /// Cost weights and input bounds
    pub cost: CostParams,

    /// Solver configuration
    pub solver: SolverParams,
}

/// Cost weights and input bounds of the smoothing problem.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CostParams {
    // ---- STATE COSTS ----
    /// Weight on the squared X position deviation from the reference
    pub cost_offset_x: f64,

    /// Weight on the squared Y position deviation from the reference
    pub cost_offset_y: f64,

    /// Weight on the squared heading deviation from the reference
    pub cost_offset_theta: f64,

    /// Weight on the squared speed deviation from the reference
    pub cost_offset_v: f64,

    /// Weight on the squared acceleration
    pub cost_acceleration: f64,

    /// Weight on the squared curvature
    pub cost_curvature: f64,

    // ---- INPUT COSTS ----
    /// Weight on the squared jerk
    pub cost_acceleration_change: f64,

    /// Weight on the squared curvature rate
    pub cost_curvature_change: f64,

    // ---- INPUT BOUNDS ----
    /// Minimum jerk.
    ///
    /// Units: meters/second^3
    pub lower_bound_jerk: f64,

    /// Maximum jerk.
    ///
    /// Units: meters/second^3
    pub upper_bound_jerk: f64,

    /// Minimum curvature rate.
    ///
    /// Units: 1/(meters seconds)
    pub lower_bound_curvature_change: f64,

    /// Maximum curvature rate.
    ///
    /// Units: 1/(meters seconds)
    pub upper_bound_curvature_change: f64,
}

/// Configuration of the nonlinear solver.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SolverParams {
    /// The solver algorithm to use
    pub algorithm: Algorithm,

    /// Relative tolerance on the change of each decision variable
    pub x_tol_rel: f64,

    /// Absolute tolerance on the change of each decision variable
    pub x_tol_abs: f64,

    /// Relative tolerance on the change of the cost. Zero disables the check.
    pub f_tol_rel: f64,

    /// Absolute tolerance on the change of the cost. Zero disables the check.
    pub f_tol_abs: f64,

    /// Stop as soon as the cost falls to or below this value
    pub stop_val: Option<f64>,

    /// Maximum number of objective evaluations. Zero means no limit.
    ///
    /// This is the only bound on the solve time, so it should be set conservatively when the
    /// smoother runs inside a planning cycle.
    pub max_num_evals: usize,

    /// Tolerance applied to each inequality constraint
    pub ineq_const_tol: f64,

    /// Tolerance applied to each equality constraint
    pub eq_const_tol: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for CostParams {
    fn default() -> Self {
        Self {
            cost_offset_x: 1.0,
            cost_offset_y: 1.0,
            cost_offset_theta: 1.0,
            cost_offset_v: 1.0,
            cost_acceleration: 0.1,
            cost_curvature: 0.1,
            cost_acceleration_change: 0.1,
            cost_curvature_change: 0.1,
            lower_bound_jerk: -4.0,
            upper_bound_jerk: 4.0,
            lower_bound_curvature_change: -0.5,
            upper_bound_curvature_change: 0.5,
        }
    }
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Lbfgs,
            x_tol_rel: 1e-6,
            x_tol_abs: 1e-8,
            f_tol_rel: 0.0,
            f_tol_abs: 0.0,
            stop_val: None,
            max_num_evals: 500,
            ineq_const_tol: 1e-6,
            eq_const_tol: 1e-6,
        }
    }
}

impl CostParams {
    /// Weights of the six state components, in state order.
    pub fn state_weights(&self) -> [f64; 6] {
        [
            self.cost_offset_x,
            self.cost_offset_y,
            self.cost_offset_theta,
            self.cost_offset_v,
            self.cost_acceleration,
            self.cost_curvature,
        ]
    }

    /// Weights of the two inputs, in input order.
    pub fn input_weights(&self) -> [f64; 2] {
        [self.cost_acceleration_change, self.cost_curvature_change]
    }

    /// Saturate a jerk value into the jerk bounds
    pub fn bounded_jerk(&self, jerk: f64) -> f64 {
        util::maths::clamp(jerk, self.lower_bound_jerk, self.upper_bound_jerk)
    }

    /// Saturate a curvature rate into the curvature rate bounds
    pub fn bounded_curvature_change(&self, dkappa: f64) -> f64 {
        util::maths::clamp(
            dkappa,
            self.lower_bound_curvature_change,
            self.upper_bound_curvature_change,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_from_toml() {
        let params: Params = util::params::from_str(
            r#"
            subsampling = 2

            [cost]
            cost_offset_x = 5.0
            upper_bound_jerk = 2.0

            [solver]
            algorithm = "slsqp"
            max_num_evals = 50
            stop_val = 1e-3
            "#,
        )
        .unwrap();

        assert_eq!(params.subsampling, 2);
        assert_eq!(params.cost.cost_offset_x, 5.0);
        assert_eq!(params.cost.upper_bound_jerk, 2.0);
        assert_eq!(params.solver.algorithm, Algorithm::Slsqp);
        assert_eq!(params.solver.max_num_evals, 50);
        assert_eq!(params.solver.stop_val, Some(1e-3));

        // Fields not given keep their defaults
        assert_eq!(params.cost.cost_offset_y, CostParams::default().cost_offset_y);
        assert_eq!(params.solver.x_tol_rel, SolverParams::default().x_tol_rel);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let params: Params = util::params::from_str("").unwrap();
        assert_eq!(params, Params::default());
    }

    #[test]
    fn test_bounded_inputs() {
        let cost = CostParams::default();
        assert_eq!(cost.bounded_jerk(10.0), cost.upper_bound_jerk);
        assert_eq!(cost.bounded_jerk(-10.0), cost.lower_bound_jerk);
        assert_eq!(cost.bounded_curvature_change(0.1), 0.1);
        assert_eq!(
            cost.bounded_curvature_change(-3.0),
            cost.lower_bound_curvature_change
        );
    }
}
