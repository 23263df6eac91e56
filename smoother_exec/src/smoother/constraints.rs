//! # Constraints
//!
//! Nonlinear inequality and equality constraints of the smoothing problem. None are currently
//! formulated; the counts are zero so nothing is registered with the solver.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::Problem;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Problem {
    pub fn num_inequality_constraints(&self) -> usize {
        0
    }

    pub fn num_equality_constraints(&self) -> usize {
        0
    }

    /// Evaluate the inequality constraints `c(u) <= 0` at `u`.
    pub fn inequality_constraint_values(
        &mut self,
        _u: &[f64],
        _result: &mut [f64],
        _jacobian: Option<&mut [f64]>,
    ) {
    }

    /// Evaluate the equality constraints `c(u) = 0` at `u`.
    pub fn equality_constraint_values(
        &mut self,
        _u: &[f64],
        _result: &mut [f64],
        _jacobian: Option<&mut [f64]>,
    ) {
    }
}

#[cfg(test)]
mod test {
    use super::super::params::CostParams;
    use super::*;

    #[test]
    fn test_no_constraints() {
        let mut problem = Problem::new(CostParams::default());
        assert_eq!(problem.num_inequality_constraints(), 0);
        assert_eq!(problem.num_equality_constraints(), 0);

        let mut result: [f64; 0] = [];
        problem.inequality_constraint_values(&[0.0, 0.0], &mut result, None);
        problem.equality_constraint_values(&[0.0, 0.0], &mut result, None);
    }
}
