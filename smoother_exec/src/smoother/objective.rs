//! # Objective
//!
//! Cost of a candidate input vector and its gradient.
//!
//! Only steps which line up with a reference point contribute. For those steps the cost is the
//! weighted squared deviation of position, heading and speed from the reference, the weighted
//! squared acceleration and curvature, and the weighted squared inputs. The state terms reach the
//! inputs through the sensitivity matrix, so the gradient is
//!
//! ```text
//! grad = 2 dXdU' (w_x . r) + 2 w_u . u
//! ```
//!
//! where `r` holds the deviations (or raw values for acceleration and curvature) at the aligned
//! steps and zero elsewhere.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::DVector;

// Internal
use super::{
    model::{states, NUM_INPUTS, NUM_STATES},
    Problem,
};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Problem {
    /// Evaluate the cost at `u`, writing the gradient into `grad` if given.
    ///
    /// The integration cache is refreshed first, so evaluating the same candidate repeatedly only
    /// integrates once.
    pub fn cost_and_gradient(&mut self, u: &[f64], grad: Option<&mut [f64]>) -> f64 {
        self.num_evals += 1;

        let u_vec = DVector::from_column_slice(u);
        self.cache
            .update(&self.x0, &u_vec, self.num_steps, self.step_size_s);

        let x_traj = self.cache.x_traj();
        let state_weights = self.params.state_weights();
        let input_weights = self.params.input_weights();
        let stride = self.subsampling + 1;

        let mut weighted_residual = DVector::zeros(x_traj.len());
        let mut cost = 0.0;

        for idx in (0..self.num_steps).step_by(stride) {
            let ref_idx = idx / stride;

            for s in 0..NUM_STATES {
                let value = x_traj[idx * NUM_STATES + s];

                // Acceleration and curvature are penalised directly, not tracked
                let residual = if s < states::A {
                    value - self.x_ref[ref_idx * NUM_STATES + s]
                } else {
                    value
                };

                cost += state_weights[s] * residual * residual;
                weighted_residual[idx * NUM_STATES + s] = state_weights[s] * residual;
            }

            for k in 0..NUM_INPUTS {
                let input = u[idx * NUM_INPUTS + k];
                cost += input_weights[k] * input * input;
            }
        }

        if let Some(grad) = grad {
            let state_grad = self.cache.dxdu().tr_mul(&weighted_residual);

            for (g, sg) in grad.iter_mut().zip(state_grad.iter()) {
                *g = 2.0 * sg;
            }

            for idx in (0..self.num_steps).step_by(stride) {
                for k in 0..NUM_INPUTS {
                    let i = idx * NUM_INPUTS + k;
                    grad[i] += 2.0 * input_weights[k] * u[i];
                }
            }
        }

        trace!("Objective evaluation {}: cost = {:e}", self.num_evals, cost);

        self.record_candidate(cost, &u_vec);
        cost
    }
}
