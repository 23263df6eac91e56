//! # NLopt backend
//!
//! Runs a gradient-based NLopt algorithm over an [`NlpProblem`]. The problem is shared between
//! the objective and constraint callbacks, and any panic raised inside a callback is caught
//! before it reaches the C library. Once a callback has panicked every further evaluation returns
//! NaN so the algorithm winds down, and the solve is reported as unhandled.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nlopt::{FailState, Nlopt, SuccessState, Target};
use std::cell::RefCell;
use std::convert::TryFrom;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

// Internal
use super::{
    panic_message, Algorithm, NlpProblem, NlpSolver, SolverError, SolverOutcome, SolverSetup,
    Termination,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Solver backed by one of NLopt's gradient-based algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NloptSolver {
    algorithm: Algorithm,
}

/// State shared by every callback of one solve.
struct Callbacks<'a> {
    problem: &'a mut dyn NlpProblem,

    /// Objective evaluations made by NLopt
    num_evals: usize,

    /// Message of the first panic raised in a callback
    panic_msg: Option<String>,
}

type Shared<'a> = Rc<RefCell<Callbacks<'a>>>;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NloptSolver {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    fn nlopt_algorithm(&self) -> nlopt::Algorithm {
        match self.algorithm {
            Algorithm::Lbfgs => nlopt::Algorithm::Lbfgs,
            Algorithm::Slsqp => nlopt::Algorithm::Slsqp,
            Algorithm::Mma => nlopt::Algorithm::Mma,
            Algorithm::Ccsaq => nlopt::Algorithm::Ccsaq,
            Algorithm::TruncatedNewton => nlopt::Algorithm::TNewtonPrecondRestart,
        }
    }
}

impl NlpSolver for NloptSolver {
    fn name(&self) -> &'static str {
        match self.algorithm {
            Algorithm::Lbfgs => "NLopt LD_LBFGS",
            Algorithm::Slsqp => "NLopt LD_SLSQP",
            Algorithm::Mma => "NLopt LD_MMA",
            Algorithm::Ccsaq => "NLopt LD_CCSAQ",
            Algorithm::TruncatedNewton => "NLopt LD_TNEWTON_PRECOND_RESTART",
        }
    }

    fn minimize(
        &self,
        setup: &SolverSetup,
        problem: &mut dyn NlpProblem,
        x: &mut [f64],
    ) -> Result<SolverOutcome, SolverError> {
        validate(setup, x)?;

        let shared: Shared<'_> = Rc::new(RefCell::new(Callbacks {
            problem,
            num_evals: 0,
            panic_msg: None,
        }));

        let mut opt = Nlopt::new(
            self.nlopt_algorithm(),
            setup.dimension,
            objective,
            Target::Minimize,
            Rc::clone(&shared),
        );

        if !setup.lower_bounds.is_empty() {
            opt.set_lower_bounds(&setup.lower_bounds)
                .map_err(|e| setup_error(e, "lower bounds"))?;
        }
        if !setup.upper_bounds.is_empty() {
            opt.set_upper_bounds(&setup.upper_bounds)
                .map_err(|e| setup_error(e, "upper bounds"))?;
        }

        opt.set_xtol_rel(setup.x_tol_rel)
            .map_err(|e| setup_error(e, "xtol_rel"))?;
        opt.set_xtol_abs(&vec![setup.x_tol_abs; setup.dimension])
            .map_err(|e| setup_error(e, "xtol_abs"))?;
        opt.set_ftol_rel(setup.f_tol_rel)
            .map_err(|e| setup_error(e, "ftol_rel"))?;
        opt.set_ftol_abs(setup.f_tol_abs)
            .map_err(|e| setup_error(e, "ftol_abs"))?;
        if let Some(stop_val) = setup.stop_val {
            opt.set_stopval(stop_val)
                .map_err(|e| setup_error(e, "stopval"))?;
        }
        // Zero is NLopt's "no limit" as well
        opt.set_maxeval(u32::try_from(setup.max_evals).unwrap_or(u32::MAX))
            .map_err(|e| setup_error(e, "maxeval"))?;

        if !setup.ineq_tols.is_empty() {
            opt.add_inequality_mconstraint(
                setup.ineq_tols.len(),
                inequality_constraints,
                Rc::clone(&shared),
                &setup.ineq_tols,
            )
            .map_err(|e| setup_error(e, "inequality constraints"))?;
        }
        if !setup.eq_tols.is_empty() {
            opt.add_equality_mconstraint(
                setup.eq_tols.len(),
                equality_constraints,
                Rc::clone(&shared),
                &setup.eq_tols,
            )
            .map_err(|e| setup_error(e, "equality constraints"))?;
        }

        debug!(
            "Running {} over {} variables, max {} evaluations",
            self.name(),
            setup.dimension,
            setup.max_evals
        );

        let result = opt.optimize(x);

        let (num_evals, panic_msg) = {
            let mut callbacks = shared.borrow_mut();
            (callbacks.num_evals, callbacks.panic_msg.take())
        };

        if let Some(msg) = panic_msg {
            return Err(SolverError::Unhandled(format!(
                "objective or constraint callback panicked: {}",
                msg
            )));
        }

        match result {
            Ok((state, cost)) => {
                debug!(
                    "{} stopped with {:?} after {} evaluations, cost {:e}",
                    self.name(),
                    state,
                    num_evals,
                    cost
                );
                Ok(SolverOutcome {
                    termination: termination_of(state),
                    cost,
                    num_evals,
                })
            }
            Err((state, cost)) => {
                debug!(
                    "{} failed with {:?} after {} evaluations, cost {:e}",
                    self.name(),
                    state,
                    num_evals,
                    cost
                );
                Err(error_of(state, "optimize"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Check sizes before anything reaches NLopt, which trusts them.
fn validate(setup: &SolverSetup, x: &[f64]) -> Result<(), SolverError> {
    if x.len() != setup.dimension {
        return Err(SolverError::InvalidArgs(format!(
            "start point has {} variables, expected {}",
            x.len(),
            setup.dimension
        )));
    }

    for (name, bounds) in [("lower", &setup.lower_bounds), ("upper", &setup.upper_bounds)].iter()
    {
        if !bounds.is_empty() && bounds.len() != setup.dimension {
            return Err(SolverError::InvalidArgs(format!(
                "{} {} bounds given for {} variables",
                bounds.len(),
                name,
                setup.dimension
            )));
        }
    }

    if !setup.lower_bounds.is_empty() && !setup.upper_bounds.is_empty() {
        if let Some(i) = (0..setup.dimension).find(|&i| setup.lower_bounds[i] > setup.upper_bounds[i])
        {
            return Err(SolverError::InvalidArgs(format!(
                "bounds {} fail {} <= {}",
                i, setup.lower_bounds[i], setup.upper_bounds[i]
            )));
        }
    }

    Ok(())
}

fn objective(x: &[f64], grad: Option<&mut [f64]>, shared: &mut Shared<'_>) -> f64 {
    let mut guard = shared.borrow_mut();
    let Callbacks {
        problem,
        num_evals,
        panic_msg,
    } = &mut *guard;

    if panic_msg.is_some() {
        return std::f64::NAN;
    }

    *num_evals += 1;

    match panic::catch_unwind(AssertUnwindSafe(|| problem.objective(x, grad))) {
        Ok(cost) => {
            trace!("NLopt evaluation {}: {:e}", num_evals, cost);
            cost
        }
        Err(payload) => {
            *panic_msg = Some(panic_message(payload.as_ref()).to_string());
            std::f64::NAN
        }
    }
}

fn inequality_constraints(
    result: &mut [f64],
    x: &[f64],
    jacobian: Option<&mut [f64]>,
    shared: &mut Shared<'_>,
) {
    constraints(result, x, jacobian, shared, false)
}

fn equality_constraints(
    result: &mut [f64],
    x: &[f64],
    jacobian: Option<&mut [f64]>,
    shared: &mut Shared<'_>,
) {
    constraints(result, x, jacobian, shared, true)
}

fn constraints(
    result: &mut [f64],
    x: &[f64],
    jacobian: Option<&mut [f64]>,
    shared: &mut Shared<'_>,
    equality: bool,
) {
    let mut guard = shared.borrow_mut();
    let Callbacks {
        problem, panic_msg, ..
    } = &mut *guard;

    if panic_msg.is_some() {
        result.iter_mut().for_each(|r| *r = std::f64::NAN);
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if equality {
            problem.equality_constraints(x, result, jacobian)
        } else {
            problem.inequality_constraints(x, result, jacobian)
        }
    }));

    if let Err(payload) = outcome {
        *panic_msg = Some(panic_message(payload.as_ref()).to_string());
        result.iter_mut().for_each(|r| *r = std::f64::NAN);
    }
}

fn termination_of(state: SuccessState) -> Termination {
    match state {
        SuccessState::Success => Termination::Success,
        SuccessState::StopValReached => Termination::StopvalReached,
        SuccessState::FtolReached => Termination::FtolReached,
        SuccessState::XtolReached => Termination::XtolReached,
        SuccessState::MaxEvalReached => Termination::MaxevalReached,
        SuccessState::MaxTimeReached => Termination::MaxtimeReached,
    }
}

fn error_of(state: FailState, context: &str) -> SolverError {
    match state {
        FailState::RoundoffLimited => SolverError::RoundoffLimited,
        FailState::OutOfMemory => SolverError::OutOfMemory,
        FailState::InvalidArgs => SolverError::InvalidArgs(format!("rejected by NLopt in {}", context)),
        FailState::Failure => SolverError::Failure(format!("NLopt failure in {}", context)),
        FailState::ForcedStop => {
            SolverError::Unhandled(format!("NLopt was forced to stop in {}", context))
        }
    }
}

fn setup_error(state: FailState, option: &str) -> SolverError {
    error_of(state, &format!("setting {}", option))
}
