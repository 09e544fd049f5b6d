//! SQP / augmented-Lagrangian solver for smooth nonlinear programs.
//!
//! Minimizes a possibly non-convex objective subject to nonlinear equality
//! constraints, nonlinear inequality constraints, and box bounds. An outer
//! augmented-Lagrangian loop adapts multipliers and a penalty weight around
//! an inner SQP minimizer (BFGS model, regularized Newton steps, three-point
//! merit line search); inequalities are handled through slack variables so
//! they reduce to bound constraints.
//!
//! The host supplies the objective/constraint callbacks through the
//! [`Problem`] trait; the solver always returns a [`SolveResult`] and
//! reports failures through its [`Inform`] code.

pub mod convergence;
mod feasibility;
mod line_search;
pub mod linalg;
pub mod problem;
pub mod result;
mod scaling;
pub mod solvers;

pub use problem::Problem;
pub use result::{Inform, SolveResult};
pub use solvers::solnp::{solve, SolnpConfig};
