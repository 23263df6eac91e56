//! # Forward integrator
//!
//! Integrates the vehicle model over the whole horizon and propagates the sensitivity of every
//! state to every input.
//!
//! The state trajectory `X` stacks the `N` states (the first being the initial state) into a
//! vector of length `6N`. The sensitivity matrix `dXdU` is `6N x 2N`, block `(i, k)` holding the
//! derivative of state `i` with respect to input `k`. State `i` only depends on inputs `0..i`, so
//! every block with `k >= i` is zero.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{DMatrix, DVector};

// Internal
use super::model::{self, Input, InputJacobian, State, NUM_INPUTS, NUM_STATES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Memoised result of the last integration.
///
/// The solver usually asks for the cost and the gradient of the same candidate in separate calls,
/// integrating is only repeated when the candidate changes.
#[derive(Debug, Clone)]
pub struct ModelCache {
    /// Whether the cached trajectory belongs to `last_u`
    valid: bool,

    /// The input vector the cache was computed for
    last_u: DVector<f64>,

    /// State trajectory
    x_traj: DVector<f64>,

    /// Sensitivity of the state trajectory to the inputs
    dxdu: DMatrix<f64>,

    /// Number of integrations performed since creation
    num_integrations: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ModelCache {
    fn default() -> Self {
        Self {
            valid: false,
            last_u: DVector::zeros(0),
            x_traj: DVector::zeros(0),
            dxdu: DMatrix::zeros(0, 0),
            num_integrations: 0,
        }
    }
}

impl ModelCache {
    /// Make sure the cache holds the trajectory for `u`, integrating if needed.
    ///
    /// Returns `true` if an integration was performed.
    pub fn update(&mut self, x0: &State, u: &DVector<f64>, num_steps: usize, h: f64) -> bool {
        if self.valid && self.last_u.len() == u.len() && self.last_u == *u {
            return false;
        }

        self.last_u.clone_from(u);
        integrate_model(x0, u, num_steps, h, &mut self.x_traj, &mut self.dxdu);
        self.valid = true;
        self.num_integrations += 1;

        true
    }

    /// Drop the cached trajectory so the next update always integrates.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.last_u = DVector::zeros(0);
        self.x_traj = DVector::zeros(0);
        self.dxdu = DMatrix::zeros(0, 0);
    }

    /// Whether the cache currently holds a trajectory
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The cached state trajectory
    pub fn x_traj(&self) -> &DVector<f64> {
        &self.x_traj
    }

    /// The cached sensitivity matrix
    pub fn dxdu(&self) -> &DMatrix<f64> {
        &self.dxdu
    }

    /// The input vector the cached trajectory was computed for
    pub fn last_u(&self) -> &DVector<f64> {
        &self.last_u
    }

    /// Number of integrations performed by this cache
    pub fn num_integrations(&self) -> usize {
        self.num_integrations
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Integrate the model from `x0` over `num_steps` states using inputs `u`.
///
/// `x_traj` is resized to `6 * num_steps` and `dxdu` to `6 * num_steps x 2 * num_steps`. Input
/// block `i - 1` drives the step from state `i - 1` to state `i`, so the last input block has no
/// effect on the trajectory.
pub fn integrate_model(
    x0: &State,
    u: &DVector<f64>,
    num_steps: usize,
    h: f64,
    x_traj: &mut DVector<f64>,
    dxdu: &mut DMatrix<f64>,
) {
    debug_assert_eq!(u.len(), NUM_INPUTS * num_steps);

    *x_traj = DVector::zeros(NUM_STATES * num_steps);
    *dxdu = DMatrix::zeros(NUM_STATES * num_steps, NUM_INPUTS * num_steps);

    if num_steps == 0 {
        return;
    }

    x_traj.fixed_rows_mut::<NUM_STATES>(0).copy_from(x0);

    for i in 1..num_steps {
        let row = i * NUM_STATES;
        let row_prev = (i - 1) * NUM_STATES;
        let u_col = (i - 1) * NUM_INPUTS;

        let x_prev: State = x_traj.fixed_rows::<NUM_STATES>(row_prev).into_owned();
        let u_curr: Input = u.fixed_rows::<NUM_INPUTS>(u_col).into_owned();

        let a = model::state_jacobian(&x_prev, &u_curr, h);
        let b = model::input_jacobian(&x_prev, &u_curr, h);

        x_traj
            .fixed_rows_mut::<NUM_STATES>(row)
            .copy_from(&model::step(&x_prev, &u_curr, h));

        // The input applied over this step acts directly
        dxdu.fixed_view_mut::<NUM_STATES, NUM_INPUTS>(row, u_col)
            .copy_from(&b);

        // Earlier inputs act through the previous state
        for k in 0..(i - 1) {
            let col = k * NUM_INPUTS;
            let prev: InputJacobian = dxdu
                .fixed_view::<NUM_STATES, NUM_INPUTS>(row_prev, col)
                .into_owned();
            dxdu.fixed_view_mut::<NUM_STATES, NUM_INPUTS>(row, col)
                .copy_from(&(a * prev));
        }
    }

    trace!("Integrated {} steps with h = {}", num_steps, h);
}
