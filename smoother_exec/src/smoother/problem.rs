//! # Smoothing problem
//!
//! Builds the decision vector, reference states, initial state and bounds from a reference
//! trajectory, and holds them along with the integration cache for the duration of a solve.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info};
use nalgebra::DVector;

// Internal
use super::{
    integrator::ModelCache,
    model::{State, NUM_INPUTS, NUM_STATES},
    params::CostParams,
    solver::NlpProblem,
};
use crate::trajectory::{DiscretizedTrajectory, TrajectoryPoint};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The smoothing problem for one reference trajectory.
///
/// Created empty, filled by [`Problem::initialise`]. The problem only becomes ready once every
/// part of it has been built.
#[derive(Debug, Clone)]
pub struct Problem {
    pub(super) params: CostParams,

    ready: bool,

    /// Number of points in the reference
    pub(super) reference_size: usize,

    /// Intermediate steps between each pair of reference points
    pub(super) subsampling: usize,

    /// Number of states (and input blocks) on the integration grid
    pub(super) num_steps: usize,

    /// Integration step.
    ///
    /// Units: seconds
    pub(super) step_size_s: f64,

    /// Relative time of the first reference point.
    ///
    /// Units: seconds
    pub(super) initial_time_s: f64,

    pub(super) x0: State,

    /// Reference states, one block of 6 per reference point
    pub(super) x_ref: DVector<f64>,

    /// Current input vector, one block of 2 per step
    pub(super) u: DVector<f64>,

    pub(super) lower_bounds: Vec<f64>,
    pub(super) upper_bounds: Vec<f64>,

    pub(super) cache: ModelCache,

    /// Objective evaluations since initialisation
    pub(super) num_evals: usize,

    /// Lowest cost candidate evaluated since initialisation
    pub(super) best: Option<Candidate>,
}

/// An evaluated input vector together with the states it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub cost: f64,

    /// Input vector, one block of 2 per step
    pub inputs: DVector<f64>,

    /// Integrated states, one block of 6 per step
    pub states: DVector<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProblemError {
    #[error("The reference trajectory contains no points")]
    EmptyReference,

    #[error(
        "Invalid integration step of {0} s, the first two reference points must be strictly \
         increasing in time"
    )]
    InvalidStepSize(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Problem {
    /// Create an empty problem which is not ready.
    pub fn new(params: CostParams) -> Self {
        Self {
            params,
            ready: false,
            reference_size: 0,
            subsampling: 0,
            num_steps: 0,
            step_size_s: 0.0,
            initial_time_s: 0.0,
            x0: State::zeros(),
            x_ref: DVector::zeros(0),
            u: DVector::zeros(0),
            lower_bounds: Vec::new(),
            upper_bounds: Vec::new(),
            cache: ModelCache::default(),
            num_evals: 0,
            best: None,
        }
    }

    /// Build the problem from a reference trajectory.
    ///
    /// An empty reference is an error. A reference with a single point has nothing to smooth, so
    /// `Ok` is returned but the problem is left not ready.
    pub fn initialise(
        &mut self,
        subsampling: usize,
        reference: &DiscretizedTrajectory,
        planning_init_point: &TrajectoryPoint,
    ) -> Result<(), ProblemError> {
        self.ready = false;
        self.cache.invalidate();
        self.num_evals = 0;
        self.best = None;

        let points = &reference.points;

        let (front, back) = match (points.first(), points.last()) {
            (Some(f), Some(b)) => (f, b),
            _ => {
                error!("Cannot smooth an empty reference trajectory");
                return Err(ProblemError::EmptyReference);
            }
        };

        if points.len() == 1 {
            info!("Reference trajectory has a single point, nothing to smooth");
            return Ok(());
        }

        // The step comes from the first interval only and is applied to the whole horizon
        let h = (points[1].relative_time - front.relative_time) / (subsampling + 1) as f64;
        if !(h > 0.0 && h.is_finite()) {
            error!(
                "The first two reference points are {} s apart, cannot build an integration grid",
                points[1].relative_time - front.relative_time
            );
            return Err(ProblemError::InvalidStepSize(h));
        }

        debug!(
            "Planning init point offset from the reference start: dx = {:.3} m, dy = {:.3} m, \
             dt = {:.3} s",
            planning_init_point.path_point.x - front.path_point.x,
            planning_init_point.path_point.y - front.path_point.y,
            planning_init_point.relative_time - front.relative_time
        );

        let reference_size = points.len();
        let num_steps = reference_size + (reference_size - 1) * subsampling;

        // Reference states
        let mut x_ref = DVector::zeros(NUM_STATES * reference_size);
        for (i, point) in points.iter().enumerate() {
            x_ref
                .fixed_rows_mut::<NUM_STATES>(i * NUM_STATES)
                .copy_from(&state_of(point));
        }

        // Initial guess, each reference point's input held over its interval
        let mut u = DVector::zeros(NUM_INPUTS * num_steps);
        for (i, point) in points[..reference_size - 1].iter().enumerate() {
            let jerk = self.params.bounded_jerk(point.da);
            let dkappa = self.params.bounded_curvature_change(point.path_point.dkappa);

            for k in 0..=subsampling {
                let idx = NUM_INPUTS * (i * (subsampling + 1) + k);
                u[idx] = jerk;
                u[idx + 1] = dkappa;
            }
        }
        let last = NUM_INPUTS * (num_steps - 1);
        u[last] = back.da;
        u[last + 1] = back.path_point.dkappa;

        // Bounds
        let mut lower_bounds = Vec::with_capacity(NUM_INPUTS * num_steps);
        let mut upper_bounds = Vec::with_capacity(NUM_INPUTS * num_steps);
        for _ in 0..num_steps {
            lower_bounds.push(self.params.lower_bound_jerk);
            lower_bounds.push(self.params.lower_bound_curvature_change);
            upper_bounds.push(self.params.upper_bound_jerk);
            upper_bounds.push(self.params.upper_bound_curvature_change);
        }

        self.reference_size = reference_size;
        self.subsampling = subsampling;
        self.num_steps = num_steps;
        self.step_size_s = h;
        self.initial_time_s = front.relative_time;
        self.x0 = state_of(front);
        self.x_ref = x_ref;
        self.u = u;
        self.lower_bounds = lower_bounds;
        self.upper_bounds = upper_bounds;
        self.ready = true;

        info!(
            "Smoothing problem initialised: {} reference points, {} steps of {:.4} s",
            reference_size, num_steps, h
        );

        Ok(())
    }

    /// Whether the problem has been fully built and can be solved
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Replace the cost weights and bounds. Takes effect on the next initialisation.
    pub fn set_params(&mut self, params: CostParams) {
        self.params = params;
    }

    pub fn params(&self) -> &CostParams {
        &self.params
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Number of decision variables
    pub fn dimension(&self) -> usize {
        NUM_INPUTS * self.num_steps
    }

    pub fn reference_size(&self) -> usize {
        self.reference_size
    }

    pub fn subsampling(&self) -> usize {
        self.subsampling
    }

    pub fn step_size_s(&self) -> f64 {
        self.step_size_s
    }

    pub fn initial_time_s(&self) -> f64 {
        self.initial_time_s
    }

    pub fn initial_state(&self) -> &State {
        &self.x0
    }

    pub fn reference_states(&self) -> &DVector<f64> {
        &self.x_ref
    }

    /// The current input vector
    pub fn inputs(&self) -> &DVector<f64> {
        &self.u
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    /// The state trajectory of the last evaluated candidate
    pub fn state_trajectory(&self) -> &DVector<f64> {
        self.cache.x_traj()
    }

    pub fn num_integrations(&self) -> usize {
        self.cache.num_integrations()
    }

    pub fn num_evals(&self) -> usize {
        self.num_evals
    }

    /// The lowest cost candidate evaluated so far, if any.
    pub fn best_candidate(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    /// Cost of the best candidate, NaN before the first evaluation.
    pub fn best_cost(&self) -> f64 {
        self.best.as_ref().map_or(std::f64::NAN, |b| b.cost)
    }

    /// Keep the evaluated candidate if it improves on the best one.
    pub(super) fn record_candidate(&mut self, cost: f64, inputs: &DVector<f64>) {
        if !cost.is_finite() {
            return;
        }

        let states = self.cache.x_traj();
        match &mut self.best {
            Some(best) if cost < best.cost => {
                best.cost = cost;
                best.inputs.copy_from(inputs);
                best.states.copy_from(states);
            }
            Some(_) => (),
            None => {
                self.best = Some(Candidate {
                    cost,
                    inputs: inputs.clone(),
                    states: states.clone(),
                })
            }
        }
    }
}

impl NlpProblem for Problem {
    fn objective(&mut self, x: &[f64], grad: Option<&mut [f64]>) -> f64 {
        self.cost_and_gradient(x, grad)
    }

    fn inequality_constraints(
        &mut self,
        x: &[f64],
        result: &mut [f64],
        jacobian: Option<&mut [f64]>,
    ) {
        self.inequality_constraint_values(x, result, jacobian)
    }

    fn equality_constraints(&mut self, x: &[f64], result: &mut [f64], jacobian: Option<&mut [f64]>) {
        self.equality_constraint_values(x, result, jacobian)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// The model state recorded in a trajectory point
fn state_of(point: &TrajectoryPoint) -> State {
    State::new(
        point.path_point.x,
        point.path_point.y,
        point.path_point.theta,
        point.v,
        point.a,
        point.path_point.kappa,
    )
}
