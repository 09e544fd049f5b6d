use num_traits::Float;

use crate::convergence::cast;

/// Magnitude used in place of infinite bounds inside the solver, so
/// distance-to-bound weights stay finite.
pub(crate) const BOUND_SENTINEL: f64 = 1e20;

/// Trait for constrained optimization problems.
///
/// Implementors provide the objective, its gradient, and (optionally)
/// nonlinear equality and inequality constraints with their Jacobians.
/// Methods take `&mut self` to allow caching, eval counting, and internal
/// buffers.
///
/// Derivatives are required through this contract; a host without analytic
/// derivatives is expected to wrap its own finite-difference approximation
/// before handing the problem to the solver.
///
/// Sign convention: [`inequality`](Problem::inequality) values are satisfied
/// when `<= 0`. The solver negates them once on entry, so internally (and in
/// [`SolveResult::constraints`](crate::SolveResult)) the satisfied direction
/// is `>= 0`, and the slack bounds of
/// [`ineq_lower`](Problem::ineq_lower)/[`ineq_upper`](Problem::ineq_upper)
/// apply to the negated values.
pub trait Problem<F: Float> {
    /// Number of free parameters.
    fn dim(&self) -> usize;

    /// Evaluate the objective at `x`.
    ///
    /// Return `None` to signal an aborted or invalid evaluation; the solver
    /// substitutes a large finite penalty and continues.
    fn objective(&mut self, x: &[F]) -> Option<F>;

    /// Gradient of the objective at `x`.
    fn gradient(&mut self, x: &[F]) -> Vec<F>;

    /// Number of equality constraints.
    fn eq_count(&self) -> usize {
        0
    }

    /// Number of inequality constraints.
    fn ineq_count(&self) -> usize {
        0
    }

    /// Equality constraint values at `x` (target zero).
    fn equality(&mut self, _x: &[F]) -> Vec<F> {
        Vec::new()
    }

    /// Jacobian of the equality constraints, one row per constraint.
    fn equality_jacobian(&mut self, _x: &[F]) -> Vec<Vec<F>> {
        Vec::new()
    }

    /// Inequality constraint values at `x` (satisfied when `<= 0`).
    fn inequality(&mut self, _x: &[F]) -> Vec<F> {
        Vec::new()
    }

    /// Jacobian of the inequality constraints, one row per constraint.
    fn inequality_jacobian(&mut self, _x: &[F]) -> Vec<Vec<F>> {
        Vec::new()
    }

    /// Per-parameter lower bounds; `-inf` for unbounded entries.
    fn lower_bounds(&self) -> Vec<F> {
        vec![F::neg_infinity(); self.dim()]
    }

    /// Per-parameter upper bounds; `+inf` for unbounded entries.
    fn upper_bounds(&self) -> Vec<F> {
        vec![F::infinity(); self.dim()]
    }

    /// Lower bounds on the sign-normalized inequality values.
    fn ineq_lower(&self) -> Vec<F> {
        vec![F::zero(); self.ineq_count()]
    }

    /// Upper bounds on the sign-normalized inequality values.
    fn ineq_upper(&self) -> Vec<F> {
        vec![F::infinity(); self.ineq_count()]
    }

    /// Cooperative cancellation poll.
    ///
    /// Checked once per outer iteration and once per line-search
    /// sub-iteration; returning `true` ends the run with
    /// [`Inform::NotAtOptimum`](crate::Inform).
    fn interrupted(&self) -> bool {
        false
    }
}

/// Bound table over the decision vector: inequality-slack rows first, then
/// parameter rows. Fixed for the duration of one pass.
#[derive(Debug, Clone)]
pub(crate) struct Bounds<F> {
    pub lower: Vec<F>,
    pub upper: Vec<F>,
    /// Number of leading rows with active bounds: all of them when any
    /// parameter bound is finite, only the slack rows otherwise.
    pub mm: usize,
    /// Whether any bound constrains the decision vector at all.
    pub bounded: bool,
    /// Whether any parameter bound is finite.
    pub param_bounded: bool,
}

impl<F: Float> Bounds<F> {
    /// Build the table for a pass with `m_ineq` active slack entries.
    pub fn build<P: Problem<F>>(problem: &P, m_ineq: usize) -> Self {
        let n = problem.dim();
        let lb = problem.lower_bounds();
        let ub = problem.upper_bounds();
        debug_assert_eq!(lb.len(), n);
        debug_assert_eq!(ub.len(), n);

        let param_bounded = lb.iter().any(|v| v.is_finite()) || ub.iter().any(|v| v.is_finite());

        let big = cast::<F>(BOUND_SENTINEL);
        let npic = n + m_ineq;
        let mut lower = Vec::with_capacity(npic);
        let mut upper = Vec::with_capacity(npic);
        if m_ineq > 0 {
            let slack_lb = problem.ineq_lower();
            let slack_ub = problem.ineq_upper();
            debug_assert_eq!(slack_lb.len(), m_ineq);
            debug_assert_eq!(slack_ub.len(), m_ineq);
            for i in 0..m_ineq {
                lower.push(slack_lb[i].max(-big));
                upper.push(slack_ub[i].min(big));
            }
        }
        for i in 0..n {
            lower.push(lb[i].max(-big));
            upper.push(ub[i].min(big));
        }

        let mm = if param_bounded { npic } else { m_ineq };
        Bounds {
            lower,
            upper,
            mm,
            bounded: param_bounded || m_ineq > 0,
            param_bounded,
        }
    }

    /// Bound table expressed in scaled decision units.
    pub fn scaled(&self, dec_scale: &[F]) -> Self {
        debug_assert_eq!(dec_scale.len(), self.lower.len());
        let lower = self
            .lower
            .iter()
            .zip(dec_scale)
            .map(|(&b, &s)| b / s)
            .collect();
        let upper = self
            .upper
            .iter()
            .zip(dec_scale)
            .map(|(&b, &s)| b / s)
            .collect();
        Bounds {
            lower,
            upper,
            mm: self.mm,
            bounded: self.bounded,
            param_bounded: self.param_bounded,
        }
    }
}
