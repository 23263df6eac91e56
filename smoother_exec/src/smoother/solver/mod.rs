//! # Nonlinear solver interface
//!
//! The smoother talks to a bound-constrained, derivative-based solver through the [`NlpSolver`]
//! trait, handing it an [`NlpProblem`] to call back into and a [`SolverSetup`] describing bounds,
//! tolerances and constraints. [`NloptSolver`] implements it on top of NLopt.
//!
//! Solvers report normal termination through [`Termination`] and exceptional conditions through
//! [`SolverError`]. On return the decision vector passed to [`NlpSolver::minimize`] holds the
//! best point found. The last objective evaluation is not necessarily made at that point.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod nlopt_solver;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
pub use nlopt_solver::NloptSolver;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A problem a solver can minimise.
pub trait NlpProblem {
    /// Evaluate the objective at `x`.
    ///
    /// If `grad` is given it must be filled with the gradient at `x`.
    fn objective(&mut self, x: &[f64], grad: Option<&mut [f64]>) -> f64;

    /// Evaluate the inequality constraints `c(x) <= 0` into `result`.
    ///
    /// If `jacobian` is given it must be filled row-major, one row per constraint.
    fn inequality_constraints(
        &mut self,
        _x: &[f64],
        _result: &mut [f64],
        _jacobian: Option<&mut [f64]>,
    ) {
    }

    /// Evaluate the equality constraints `c(x) = 0` into `result`.
    ///
    /// If `jacobian` is given it must be filled row-major, one row per constraint.
    fn equality_constraints(
        &mut self,
        _x: &[f64],
        _result: &mut [f64],
        _jacobian: Option<&mut [f64]>,
    ) {
    }
}

/// A bound-constrained, derivative-based nonlinear solver.
pub trait NlpSolver {
    /// Human readable name of the solver
    fn name(&self) -> &'static str;

    /// Minimise `problem` starting from `x`.
    ///
    /// On return `x` holds the best point found, including when an error is returned after the
    /// solver started iterating.
    fn minimize(
        &self,
        setup: &SolverSetup,
        problem: &mut dyn NlpProblem,
        x: &mut [f64],
    ) -> Result<SolverOutcome, SolverError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Options, bounds and constraint registrations for one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSetup {
    /// Number of decision variables
    pub dimension: usize,

    /// Per-variable lower bounds, empty for none
    pub lower_bounds: Vec<f64>,

    /// Per-variable upper bounds, empty for none
    pub upper_bounds: Vec<f64>,

    pub x_tol_rel: f64,
    pub x_tol_abs: f64,
    pub f_tol_rel: f64,
    pub f_tol_abs: f64,

    /// Stop once the objective reaches this value
    pub stop_val: Option<f64>,

    /// Maximum number of objective evaluations, zero for unlimited
    pub max_evals: usize,

    /// One tolerance per registered inequality constraint
    pub ineq_tols: Vec<f64>,

    /// One tolerance per registered equality constraint
    pub eq_tols: Vec<f64>,
}

/// The outcome of a solve which terminated normally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolverOutcome {
    /// Why the solver stopped
    pub termination: Termination,

    /// Objective value at the returned point
    pub cost: f64,

    /// Number of objective evaluations performed
    pub num_evals: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Selects the NLopt algorithm. All of them use the gradient and honour the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Low-storage BFGS (`LD_LBFGS`)
    Lbfgs,

    /// Sequential quadratic programming (`LD_SLSQP`), supports nonlinear constraints
    Slsqp,

    /// Method of moving asymptotes (`LD_MMA`), supports inequality constraints
    Mma,

    /// Conservative convex separable approximation (`LD_CCSAQ`), supports inequality constraints
    Ccsaq,

    /// Preconditioned truncated Newton with restarts (`LD_TNEWTON_PRECOND_RESTART`)
    TruncatedNewton,
}

/// Reason a solver returned.
///
/// The codes follow the usual NLopt convention: positive values are successful terminations and
/// negative ones failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Generic success, the projected gradient vanished
    Success,

    /// The objective reached the configured stop value
    StopvalReached,

    /// The change in objective fell below the tolerances
    FtolReached,

    /// The change in decision variables fell below the tolerances
    XtolReached,

    /// The evaluation budget was spent
    MaxevalReached,

    /// The time budget was spent
    MaxtimeReached,

    /// Generic failure
    Failure,

    /// Invalid arguments such as inconsistent bounds
    InvalidArgs,

    /// The solver ran out of memory
    OutOfMemory,

    /// Round-off errors prevented further progress
    RoundoffLimited,
}

/// Exceptional conditions raised by a solver.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("Halted because roundoff errors limited progress")]
    RoundoffLimited,

    #[error("Ran out of memory")]
    OutOfMemory,

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Generic failure: {0}")]
    Failure(String),

    /// A failure the solver could not classify. The result must not be used.
    #[error("Unhandled solver error: {0}")]
    Unhandled(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SolverSetup {
    /// Create a setup with no bounds, no constraints and no stopping criteria.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            lower_bounds: Vec::new(),
            upper_bounds: Vec::new(),
            x_tol_rel: 0.0,
            x_tol_abs: 0.0,
            f_tol_rel: 0.0,
            f_tol_abs: 0.0,
            stop_val: None,
            max_evals: 0,
            ineq_tols: Vec::new(),
            eq_tols: Vec::new(),
        }
    }

    pub fn set_lower_bounds(&mut self, lower_bounds: &[f64]) {
        self.lower_bounds = lower_bounds.to_vec();
    }

    pub fn set_upper_bounds(&mut self, upper_bounds: &[f64]) {
        self.upper_bounds = upper_bounds.to_vec();
    }

    pub fn set_xtol_rel(&mut self, tol: f64) {
        self.x_tol_rel = tol;
    }

    pub fn set_xtol_abs(&mut self, tol: f64) {
        self.x_tol_abs = tol;
    }

    pub fn set_ftol_rel(&mut self, tol: f64) {
        self.f_tol_rel = tol;
    }

    pub fn set_ftol_abs(&mut self, tol: f64) {
        self.f_tol_abs = tol;
    }

    pub fn set_stopval(&mut self, stop_val: Option<f64>) {
        self.stop_val = stop_val;
    }

    pub fn set_maxeval(&mut self, max_evals: usize) {
        self.max_evals = max_evals;
    }

    /// Register a block of inequality constraints with one tolerance each.
    pub fn add_inequality_mconstraint(&mut self, tols: Vec<f64>) {
        self.ineq_tols = tols;
    }

    /// Register a block of equality constraints with one tolerance each.
    pub fn add_equality_mconstraint(&mut self, tols: Vec<f64>) {
        self.eq_tols = tols;
    }
}

impl Termination {
    /// NLopt-style numeric result code
    pub fn code(&self) -> i32 {
        match self {
            Termination::Success => 1,
            Termination::StopvalReached => 2,
            Termination::FtolReached => 3,
            Termination::XtolReached => 4,
            Termination::MaxevalReached => 5,
            Termination::MaxtimeReached => 6,
            Termination::Failure => -1,
            Termination::InvalidArgs => -2,
            Termination::OutOfMemory => -3,
            Termination::RoundoffLimited => -4,
        }
    }

    /// A description of the termination for logging
    pub fn description(&self) -> &'static str {
        match self {
            Termination::Success => "Generic success return value.",
            Termination::StopvalReached => "Optimization stopped because stopval was reached.",
            Termination::FtolReached => {
                "Optimization stopped because ftol_rel or ftol_abs was reached."
            }
            Termination::XtolReached => {
                "Optimization stopped because xtol_rel or xtol_abs was reached."
            }
            Termination::MaxevalReached => "Optimization stopped because maxeval was reached.",
            Termination::MaxtimeReached => "Optimization stopped because maxtime was reached.",
            Termination::Failure => "Generic failure.",
            Termination::InvalidArgs => {
                "Invalid arguments (e.g. lower bounds are bigger than upper bounds, an unknown \
                 algorithm was specified, etcetera)."
            }
            Termination::OutOfMemory => "Ran out of memory.",
            Termination::RoundoffLimited => {
                "Halted because roundoff errors limited progress. (In this case, the \
                 optimization still typically returns a useful result.)"
            }
        }
    }
}

impl Algorithm {
    /// Build the solver implementing this algorithm
    pub fn solver(&self) -> Box<dyn NlpSolver> {
        Box::new(NloptSolver::new(*self))
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Lbfgs
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Message carried by a caught panic
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
