//! Trajectory smoother state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

// Internal
use super::{
    model::{states, NUM_INPUTS, NUM_STATES},
    solver::{panic_message, NlpSolver, SolverError, SolverSetup},
    Params, Problem, ProblemError, Termination,
};
use crate::trajectory::{DiscretizedTrajectory, PathPoint, TrajectoryPoint};
use util::params;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Smooths reference trajectories by solving the smoothing problem.
///
/// One smoother owns one problem. To smooth trajectories concurrently use one smoother each.
pub struct TrajSmoother {
    params: Params,

    problem: Problem,

    /// Status of the last solve
    status: SmootherStatus,

    /// Name of the solver used in the last solve
    solver_name: &'static str,

    /// Wall time of the last solve.
    ///
    /// Units: seconds
    solve_time_s: f64,
}

/// Summary of the last solve, flat so it can be archived as a CSV row.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub status_code: i32,
    pub solver: &'static str,
    pub final_cost: f64,
    pub num_evals: usize,
    pub num_integrations: usize,
    pub reference_size: usize,
    pub num_steps: usize,
    pub step_size_s: f64,
    pub solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Outcome of the last call to [`TrajSmoother::optimize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherStatus {
    /// No solve has been attempted on the current problem
    Pending,

    /// The problem was not ready so no solve was attempted
    NotInitialised,

    /// The solver terminated normally
    Terminated(Termination),

    /// The solver reported a recoverable error
    SolverWarning(SolverWarning),

    /// The solver failed in a way that could not be classified
    Fatal,
}

/// Recoverable solver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverWarning {
    /// Round-off limited progress, the result is still usable
    RoundoffLimited,
    OutOfMemory,
    InvalidArgs,
    GenericFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum SmootherError {
    #[error("Failed to load the smoother parameters: {0}")]
    ParamLoadError(#[from] params::LoadError),

    #[error("No optimized trajectory is available, the last solve status was {0:?}")]
    NoSolution(SmootherStatus),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajSmoother {
    /// Create a smoother with the given parameters.
    pub fn new(params: Params) -> Self {
        Self {
            problem: Problem::new(params.cost.clone()),
            params,
            status: SmootherStatus::Pending,
            solver_name: "",
            solve_time_s: 0.0,
        }
    }

    /// Create a smoother from a parameter file.
    pub fn init<P: AsRef<Path>>(params_path: P) -> Result<Self, SmootherError> {
        Ok(Self::new(params::load(params_path)?))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn status(&self) -> SmootherStatus {
        self.status
    }

    /// Build the smoothing problem for a new reference trajectory.
    ///
    /// See [`Problem::initialise`].
    pub fn initialise_problem(
        &mut self,
        subsampling: usize,
        reference: &DiscretizedTrajectory,
        planning_init_point: &TrajectoryPoint,
    ) -> Result<(), ProblemError> {
        self.status = SmootherStatus::Pending;
        self.problem.set_params(self.params.cost.clone());
        self.problem
            .initialise(subsampling, reference, planning_init_point)
    }

    /// Whether a problem is ready to be solved
    pub fn is_ready(&self) -> bool {
        self.problem.is_ready()
    }

    /// Solve the problem with the configured algorithm.
    pub fn optimize(&mut self) -> SmootherStatus {
        let solver = self.params.solver.algorithm.solver();
        self.optimize_with(solver.as_ref())
    }

    /// Solve the problem with the given solver.
    ///
    /// The solve starts from, and leaves its result in, the problem's input vector. Solver
    /// failures, including panics, are contained and reported through the returned status.
    pub fn optimize_with(&mut self, solver: &dyn NlpSolver) -> SmootherStatus {
        if !self.problem.is_ready() {
            warn!("Smoothing problem is not initialised, cannot optimize");
            self.status = SmootherStatus::NotInitialised;
            return self.status;
        }

        let setup = self.solver_setup();
        let mut u = self.problem.inputs().as_slice().to_vec();

        self.solver_name = solver.name();
        info!(
            "Starting {} over {} variables",
            self.solver_name,
            u.len()
        );

        let start = Instant::now();
        let problem = &mut self.problem;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            solver.minimize(&setup, problem, &mut u)
        }));
        self.solve_time_s = start.elapsed().as_secs_f64();

        self.status = match result {
            Ok(Ok(outcome)) => {
                info!("{}", outcome.termination.description());
                SmootherStatus::Terminated(outcome.termination)
            }
            Ok(Err(SolverError::Unhandled(msg))) => {
                error!("Unhandled solver failure: {}", msg);
                self.status = SmootherStatus::Fatal;
                return self.status;
            }
            Ok(Err(e)) => {
                warn!("{}", e);
                SmootherStatus::SolverWarning(match e {
                    SolverError::RoundoffLimited => SolverWarning::RoundoffLimited,
                    SolverError::OutOfMemory => SolverWarning::OutOfMemory,
                    SolverError::InvalidArgs(_) => SolverWarning::InvalidArgs,
                    _ => SolverWarning::GenericFailure,
                })
            }
            Err(payload) => {
                error!("Solver panicked: {}", panic_message(payload.as_ref()));
                self.status = SmootherStatus::Fatal;
                return self.status;
            }
        };

        // The result is the best evaluated candidate, whose states are already known
        match self.problem.best_candidate().map(|best| best.inputs.clone()) {
            Some(inputs) => {
                if inputs.as_slice() != u.as_slice() {
                    debug!("Solver returned a point other than its best evaluation");
                }
                self.problem.u = inputs;
            }
            None => self.problem.u.copy_from_slice(&u),
        }

        info!(
            "Optimization finished with status {} in {:.3} s, final cost {:e} after {} evaluations",
            self.status.code(),
            self.solve_time_s,
            self.problem.best_cost(),
            self.problem.num_evals()
        );

        self.status
    }

    /// Build the optimized trajectory from the last successful solve.
    ///
    /// One point is produced per integration step, with the jerk and curvature rate of the input
    /// applied from that step. The states are the ones recorded when the best candidate was
    /// evaluated, nothing is integrated here.
    pub fn get_optimized_trajectory(&self) -> Result<DiscretizedTrajectory, SmootherError> {
        if !self.status.is_success() {
            return Err(SmootherError::NoSolution(self.status));
        }

        let best = self
            .problem
            .best_candidate()
            .ok_or(SmootherError::NoSolution(self.status))?;

        let x = &best.states;
        let u = &best.inputs;
        let h = self.problem.step_size_s();
        let t0 = self.problem.initial_time_s();

        let mut traj = DiscretizedTrajectory::new();
        let mut s = 0.0;

        for idx in 0..self.problem.num_steps() {
            let state = x.fixed_rows::<NUM_STATES>(idx * NUM_STATES);

            if idx > 0 {
                let prev = x.fixed_rows::<NUM_STATES>((idx - 1) * NUM_STATES);
                s += (state[states::X] - prev[states::X])
                    .hypot(state[states::Y] - prev[states::Y]);
            }

            traj.push(TrajectoryPoint {
                path_point: PathPoint {
                    x: state[states::X],
                    y: state[states::Y],
                    theta: state[states::THETA],
                    kappa: state[states::KAPPA],
                    dkappa: u[idx * NUM_INPUTS + 1],
                    s,
                },
                v: state[states::V],
                a: state[states::A],
                da: u[idx * NUM_INPUTS],
                relative_time: t0 + idx as f64 * h,
            });
        }

        Ok(traj)
    }

    /// Summary of the last solve
    pub fn report(&self) -> SolveReport {
        SolveReport {
            status_code: self.status.code(),
            solver: self.solver_name,
            final_cost: self.problem.best_cost(),
            num_evals: self.problem.num_evals(),
            num_integrations: self.problem.num_integrations(),
            reference_size: self.problem.reference_size(),
            num_steps: self.problem.num_steps(),
            step_size_s: self.problem.step_size_s(),
            solve_time_s: self.solve_time_s,
        }
    }

    fn solver_setup(&self) -> SolverSetup {
        let sp = &self.params.solver;
        let mut setup = SolverSetup::new(self.problem.dimension());

        if !self.problem.lower_bounds().is_empty() {
            setup.set_lower_bounds(self.problem.lower_bounds());
        }
        if !self.problem.upper_bounds().is_empty() {
            setup.set_upper_bounds(self.problem.upper_bounds());
        }

        setup.set_xtol_rel(sp.x_tol_rel);
        setup.set_xtol_abs(sp.x_tol_abs);
        setup.set_ftol_rel(sp.f_tol_rel);
        setup.set_ftol_abs(sp.f_tol_abs);
        setup.set_stopval(sp.stop_val);
        setup.set_maxeval(sp.max_num_evals);

        let num_ineq = self.problem.num_inequality_constraints();
        if num_ineq > 0 {
            setup.add_inequality_mconstraint(vec![sp.ineq_const_tol; num_ineq]);
        }
        let num_eq = self.problem.num_equality_constraints();
        if num_eq > 0 {
            setup.add_equality_mconstraint(vec![sp.eq_const_tol; num_eq]);
        }

        setup
    }
}

impl SmootherStatus {
    /// Numeric status code, positive when the result is usable.
    pub fn code(&self) -> i32 {
        match self {
            SmootherStatus::Pending => 0,
            SmootherStatus::NotInitialised => -100,
            SmootherStatus::Terminated(t) => t.code(),
            SmootherStatus::SolverWarning(w) => match w {
                SolverWarning::RoundoffLimited => 10,
                SolverWarning::OutOfMemory => Termination::OutOfMemory.code(),
                SolverWarning::InvalidArgs => Termination::InvalidArgs.code(),
                SolverWarning::GenericFailure => Termination::Failure.code(),
            },
            SmootherStatus::Fatal => -11,
        }
    }

    /// Whether the solution may be used
    pub fn is_success(&self) -> bool {
        self.code() > 0
    }
}

#[cfg(test)]
mod test {
    use super::super::solver::{NlpProblem, SolverOutcome};
    use super::*;

    /// Solver which fails in a fixed way after one evaluation
    struct Broken(fn() -> Result<(), SolverError>);

    impl NlpSolver for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn minimize(
            &self,
            setup: &SolverSetup,
            problem: &mut dyn NlpProblem,
            x: &mut [f64],
        ) -> Result<SolverOutcome, SolverError> {
            assert_eq!(setup.dimension, x.len());
            let cost = problem.objective(x, None);
            (self.0)()?;
            Ok(SolverOutcome {
                termination: Termination::Success,
                cost,
                num_evals: 1,
            })
        }
    }

    fn reference() -> DiscretizedTrajectory {
        DiscretizedTrajectory::from(vec![
            TrajectoryPoint {
                v: 1.0,
                ..TrajectoryPoint::default()
            },
            TrajectoryPoint {
                path_point: PathPoint {
                    x: 1.0,
                    s: 1.0,
                    ..PathPoint::default()
                },
                v: 1.0,
                relative_time: 1.0,
                ..TrajectoryPoint::default()
            },
        ])
    }

    fn ready_smoother() -> TrajSmoother {
        let mut smoother = TrajSmoother::new(Params::default());
        let reference = reference();
        smoother
            .initialise_problem(1, &reference, &reference.points[0])
            .unwrap();
        smoother
    }

    #[test]
    fn test_not_initialised() {
        let mut smoother = TrajSmoother::new(Params::default());
        assert_eq!(smoother.optimize(), SmootherStatus::NotInitialised);
        assert_eq!(smoother.status().code(), -100);
        assert!(matches!(
            smoother.get_optimized_trajectory(),
            Err(SmootherError::NoSolution(SmootherStatus::NotInitialised))
        ));
    }

    #[test]
    fn test_status_mapping() {
        let cases: [(fn() -> Result<(), SolverError>, SmootherStatus, bool); 5] = [
            (
                || Ok(()),
                SmootherStatus::Terminated(Termination::Success),
                true,
            ),
            (
                || Err(SolverError::RoundoffLimited),
                SmootherStatus::SolverWarning(SolverWarning::RoundoffLimited),
                true,
            ),
            (
                || Err(SolverError::InvalidArgs("bad".into())),
                SmootherStatus::SolverWarning(SolverWarning::InvalidArgs),
                false,
            ),
            (
                || Err(SolverError::Failure("bad".into())),
                SmootherStatus::SolverWarning(SolverWarning::GenericFailure),
                false,
            ),
            (
                || Err(SolverError::Unhandled("bad".into())),
                SmootherStatus::Fatal,
                false,
            ),
        ];

        for (fail, expected, usable) in cases.iter() {
            let mut smoother = ready_smoother();
            let status = smoother.optimize_with(&Broken(*fail));

            assert_eq!(status, *expected);
            assert_eq!(status.is_success(), *usable);
            assert_eq!(smoother.get_optimized_trajectory().is_ok(), *usable);
        }
    }

    #[test]
    fn test_panic_is_contained() {
        let mut smoother = ready_smoother();
        let status = smoother.optimize_with(&Broken(|| panic!("solver exploded")));

        assert_eq!(status, SmootherStatus::Fatal);
        assert_eq!(status.code(), -11);
    }

    #[test]
    fn test_result_layout() {
        let mut smoother = ready_smoother();
        let status = smoother.optimize_with(&Broken(|| Ok(())));
        assert!(status.is_success());

        let traj = smoother.get_optimized_trajectory().unwrap();
        let u = smoother.problem().inputs().clone();

        assert_eq!(traj.len(), 3);
        for (idx, point) in traj.iter().enumerate() {
            assert_eq!(point.relative_time, idx as f64 * 0.5);
            assert_eq!(point.da, u[2 * idx]);
            assert_eq!(point.path_point.dkappa, u[2 * idx + 1]);
        }
        assert_eq!(traj.points[0].path_point.s, 0.0);
        assert!(traj.points[2].path_point.s > traj.points[1].path_point.s);

        let report = smoother.report();
        assert_eq!(report.status_code, 1);
        assert_eq!(report.num_steps, 3);
        assert_eq!(report.solver, "broken");
    }

    #[test]
    fn test_result_does_not_integrate() {
        let mut smoother = TrajSmoother::new(Params {
            solver: crate::smoother::SolverParams {
                max_num_evals: 20,
                ..Default::default()
            },
            ..Params::default()
        });
        let reference = reference();
        smoother
            .initialise_problem(1, &reference, &reference.points[0])
            .unwrap();

        assert!(smoother.optimize().is_success());
        let report = smoother.report();
        assert!(report.num_evals <= 20, "{} evaluations", report.num_evals);

        let integrations = smoother.problem().num_integrations();
        let traj = smoother.get_optimized_trajectory().unwrap();
        assert_eq!(smoother.problem().num_integrations(), integrations);

        // The returned inputs and states belong to the same evaluation
        let best = smoother.problem().best_candidate().unwrap();
        assert_eq!(smoother.problem().inputs(), &best.inputs);
        assert_eq!(report.final_cost, best.cost);
        for (idx, point) in traj.iter().enumerate() {
            assert_eq!(point.v, best.states[idx * NUM_STATES + states::V]);
            assert_eq!(point.da, best.inputs[idx * NUM_INPUTS]);
        }
    }
}
