use std::fmt;

/// Result of a constrained optimization run.
///
/// The solver always returns a complete record; failures are reported
/// through [`Inform`], never by panicking or erroring past the boundary.
#[derive(Debug, Clone)]
pub struct SolveResult<F> {
    /// Solution point (free parameters only; inequality slacks stripped).
    pub x: Vec<F>,
    /// Objective value at the solution.
    pub value: F,
    /// Objective gradient over the free parameters at the solution.
    pub gradient: Vec<F>,
    /// BFGS Hessian approximation over the full decision vector
    /// (`m_ineq` slack entries first, then the free parameters).
    pub hessian: Vec<Vec<F>>,
    /// Lagrange multiplier estimates, equality constraints first.
    pub multipliers: Vec<F>,
    /// Constraint values at the solution: equality residuals followed by
    /// the sign-normalized inequality values (satisfied when `>= 0`).
    pub constraints: Vec<F>,
    /// Number of outer iterations performed (last pass).
    pub iterations: usize,
    /// Total number of objective evaluations.
    pub func_evals: usize,
    /// Set when feasibility restoration hit its iteration cap; the
    /// linearized constraints may have no feasible point.
    pub infeasible: bool,
    /// Terminal status classification.
    pub inform: Inform,
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inform {
    /// Constraint violation and relative improvement are within tolerance
    /// and the step-size test passed.
    Converged,
    /// Tolerances are met but the iterate sequence had not settled; the
    /// point sits in a flat region and need not be a local optimum.
    ConvergedSuboptimal,
    /// The outer iteration cap was reached before the tolerances.
    IterationLimit,
    /// The run ended early: cancellation, an invalid final evaluation, or
    /// a possibly infeasible constraint set.
    NotAtOptimum,
    /// The regularized Hessian could not be factorized even after
    /// repeated regularization growth.
    NumericalFailure,
}

impl fmt::Display for Inform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inform::Converged => write!(f, "converged to an optimum"),
            Inform::ConvergedSuboptimal => {
                write!(f, "tolerances met, iterate sequence not converged")
            }
            Inform::IterationLimit => write!(f, "iteration limit reached"),
            Inform::NotAtOptimum => write!(f, "stopped before reaching an optimum"),
            Inform::NumericalFailure => write!(f, "numerical failure"),
        }
    }
}
