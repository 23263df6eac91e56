//! # Vehicle model
//!
//! Discrete-time kinematic model of the vehicle and its analytic derivatives.
//!
//! The state is `[x, y, theta, v, a, kappa]` and the input `[j, xi]`, jerk and curvature rate.
//! One step of length `h` is taken with a midpoint-style scheme: the heading, speed and curvature
//! are extrapolated over the full step and the position and heading updates average the rates at
//! the start and at the extrapolated end of the step.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix6, Matrix6x2, Vector2, Vector6};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of elements in the state vector
pub const NUM_STATES: usize = 6;

/// Number of elements in the input vector
pub const NUM_INPUTS: usize = 2;

/// Indices of the state vector elements
pub mod states {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const THETA: usize = 2;
    pub const V: usize = 3;
    pub const A: usize = 4;
    pub const KAPPA: usize = 5;
}

/// Indices of the input vector elements
pub mod inputs {
    pub const J: usize = 0;
    pub const XI: usize = 1;
}

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Vehicle state `[x, y, theta, v, a, kappa]`
pub type State = Vector6<f64>;

/// Model input `[j, xi]`
pub type Input = Vector2<f64>;

/// Jacobian of the next state with respect to the current state
pub type StateJacobian = Matrix6<f64>;

/// Jacobian of the next state with respect to the input
pub type InputJacobian = Matrix6x2<f64>;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Propagate the state `x` by one step of length `h` under input `u`.
pub fn step(x: &State, u: &Input, h: f64) -> State {
    use self::{inputs::*, states::*};

    let (sin_th, cos_th) = x[THETA].sin_cos();
    let c1 = x[V] + h * x[A];
    let c2 = x[THETA] + h * x[V] * x[KAPPA];
    let c3 = x[KAPPA] + h * u[XI];
    let c4 = x[A] + h * u[J];
    let (sin_c2, cos_c2) = c2.sin_cos();

    State::new(
        x[X] + 0.5 * h * x[V] * cos_th + 0.5 * h * c1 * cos_c2,
        x[Y] + 0.5 * h * x[V] * sin_th + 0.5 * h * c1 * sin_c2,
        x[THETA] + 0.5 * h * x[V] * x[KAPPA] + 0.5 * h * c1 * c3,
        x[V] + 0.5 * h * x[A] + 0.5 * h * c4,
        c4,
        c3,
    )
}

/// Jacobian of [`step`] with respect to the state.
pub fn state_jacobian(x: &State, u: &Input, h: f64) -> StateJacobian {
    use self::{inputs::*, states::*};

    let h2 = h * h;
    let (sin_th, cos_th) = x[THETA].sin_cos();
    let c1 = x[V] + h * x[A];
    let c2 = x[THETA] + h * x[V] * x[KAPPA];
    let (sin_c2, cos_c2) = c2.sin_cos();

    let dx_dth = -0.5 * h * x[V] * sin_th - 0.5 * h * c1 * sin_c2;
    let dy_dth = 0.5 * h * x[V] * cos_th + 0.5 * h * c1 * cos_c2;

    let dx_dv = 0.5 * h * cos_th + 0.5 * h * cos_c2 - 0.5 * h2 * x[KAPPA] * c1 * sin_c2;
    let dy_dv = 0.5 * h * sin_th + 0.5 * h * sin_c2 + 0.5 * h2 * x[KAPPA] * c1 * cos_c2;
    let dth_dv = h * x[KAPPA] + 0.5 * h2 * u[XI];

    let dx_da = 0.5 * h2 * cos_c2;
    let dy_da = 0.5 * h2 * sin_c2;
    let dth_da = 0.5 * h2 * (x[KAPPA] + h * u[XI]);

    let dx_dk = -0.5 * h2 * x[V] * c1 * sin_c2;
    let dy_dk = 0.5 * h2 * x[V] * c1 * cos_c2;
    let dth_dk = h * x[V] + 0.5 * h2 * x[A];

    #[rustfmt::skip]
    let jac = StateJacobian::new(
        1.0, 0.0, dx_dth, dx_dv,  dx_da,  dx_dk,
        0.0, 1.0, dy_dth, dy_dv,  dy_da,  dy_dk,
        0.0, 0.0, 1.0,    dth_dv, dth_da, dth_dk,
        0.0, 0.0, 0.0,    1.0,    h,      0.0,
        0.0, 0.0, 0.0,    0.0,    1.0,    0.0,
        0.0, 0.0, 0.0,    0.0,    0.0,    1.0,
    );
    jac
}

/// Jacobian of [`step`] with respect to the input.
pub fn input_jacobian(x: &State, _u: &Input, h: f64) -> InputJacobian {
    use self::states::*;

    let h2 = h * h;

    #[rustfmt::skip]
    let jac = InputJacobian::new(
        0.0,      0.0,
        0.0,      0.0,
        0.0,      0.5 * h2 * (x[V] + h * x[A]),
        0.5 * h2, 0.0,
        h,        0.0,
        0.0,      h,
    );
    jac
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    const FD_STEP: f64 = 1e-6;

    /// A spread of states, inputs and step sizes covering turning, braking and reversing.
    fn cases() -> Vec<(State, Input, f64)> {
        vec![
            (State::new(0.0, 0.0, 0.0, 5.0, 0.0, 0.0), Input::new(0.0, 0.0), 0.1),
            (State::new(1.0, -2.0, 0.7, 8.0, 1.5, 0.05), Input::new(0.5, -0.02), 0.2),
            (State::new(-3.0, 4.0, -2.5, 2.0, -1.0, -0.2), Input::new(-1.0, 0.3), 0.5),
            (State::new(10.0, 10.0, 3.0, -1.0, 0.3, 0.4), Input::new(2.0, 0.1), 1.0),
        ]
    }

    /// Relative comparison scaled so small entries are compared absolutely.
    fn assert_close(analytic: f64, numeric: f64) {
        let scale = 1.0f64.max(analytic.abs()).max(numeric.abs());
        assert_abs_diff_eq!(analytic / scale, numeric / scale, epsilon = 1e-6);
    }

    #[test]
    fn test_state_jacobian_matches_finite_difference() {
        for (x, u, h) in cases() {
            let jac = state_jacobian(&x, &u, h);

            for col in 0..NUM_STATES {
                let mut x_p = x;
                let mut x_m = x;
                x_p[col] += FD_STEP;
                x_m[col] -= FD_STEP;
                let fd = (step(&x_p, &u, h) - step(&x_m, &u, h)) / (2.0 * FD_STEP);

                for row in 0..NUM_STATES {
                    assert_close(jac[(row, col)], fd[row]);
                }
            }
        }
    }

    #[test]
    fn test_input_jacobian_matches_finite_difference() {
        for (x, u, h) in cases() {
            let jac = input_jacobian(&x, &u, h);

            for col in 0..NUM_INPUTS {
                let mut u_p = u;
                let mut u_m = u;
                u_p[col] += FD_STEP;
                u_m[col] -= FD_STEP;
                let fd = (step(&x, &u_p, h) - step(&x, &u_m, h)) / (2.0 * FD_STEP);

                for row in 0..NUM_STATES {
                    assert_close(jac[(row, col)], fd[row]);
                }
            }
        }
    }

    #[test]
    fn test_straight_constant_speed() {
        // No acceleration or curvature, the vehicle covers v * h along its heading
        let x = State::new(1.0, 2.0, 0.0, 10.0, 0.0, 0.0);
        let next = step(&x, &Input::zeros(), 0.5);

        assert_abs_diff_eq!(next, State::new(6.0, 2.0, 0.0, 10.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_inputs_integrate_into_acceleration_and_curvature() {
        let x = State::zeros();
        let next = step(&x, &Input::new(2.0, 0.4), 0.5);

        assert_abs_diff_eq!(next[states::A], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next[states::KAPPA], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(next[states::V], 0.25, epsilon = 1e-12);
    }
}
