//! Primal-dual interior-point method for convex QPs.
//!
//! The driver follows the central path: each iteration builds the
//! barrier-weighted Hessian, takes a residual Newton step (eliminating
//! equality multipliers through the Schur complement when present),
//! line-searches for dual positivity, primal feasibility and
//! sufficient residual decrease, then rescales the barrier parameter
//! from the surrogate duality gap. Infeasible starts go through a
//! phase-1 slack-minimization problem first.

mod feasibility;
mod linesearch;
mod newton;
mod solve;
pub mod workspace;

pub use solve::{solve, solve_with_stop};
pub use workspace::QpWorkspace;

use thiserror::Error;

use crate::linalg::LinalgError;

/// Errors surfaced by the QP entry points.
///
/// Numerical trouble mid-run (failed factorization, non-finite
/// residuals) is reported through [`crate::QpStatus::NumericalError`]
/// in the result, not through this type.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
