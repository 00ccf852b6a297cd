//! Dense SPD linear algebra and convex quadratic programming.
//!
//! This library is the numerical core of a stereo distance-sensing
//! pipeline: a symmetric-positive-definite dense linear-algebra engine
//! and a primal-dual interior-point solver for convex QPs built on it.
//! It provides:
//!
//! - **Dense containers**: flat `f32` vectors and row-major matrices,
//!   plus a packed lower-triangular SPD matrix type
//! - **Dual-path BLAS kernels**: every operation runs on a sequential
//!   scalar path or a data-parallel path, selected per call through an
//!   explicit [`ExecContext`]
//! - **Blocked Cholesky**: in-place `LLᵗ` factorization with per-pivot
//!   definiteness checks and a lazy, invalidate-on-write factor cache
//! - **Linear solves**: blocked forward/back substitution with
//!   iterative refinement, for single and multi-column right-hand sides
//! - **Schur complement**: `A·H⁻¹·Aᵗ` for eliminating equality
//!   multipliers from KKT systems
//! - **QP solver**: feasibility phase, central-path iterations, and a
//!   feasibility-aware backtracking line search
//! - **Newton minimizer**: unconstrained (and equality-constrained)
//!   descent sharing the same Cholesky/Schur machinery
//!
//! # Algorithm
//!
//! The QP solver is a **primal-dual interior-point method**: each
//! iteration forms the barrier-weighted Hessian `P + MᵗD(z)M`, takes a
//! residual-based Newton step (Schur-eliminating equality multipliers
//! when present), line-searches for dual positivity, primal
//! feasibility and sufficient residual decrease, and rescales the
//! barrier parameter from the surrogate duality gap. An infeasible
//! start is handled by a phase-1 problem that minimizes a heavily
//! penalized slack until it turns negative.
//!
//! # Example
//!
//! ```ignore
//! use optim_core::{solve, ExecContext, Matrix, QpProblem, QpSettings, SpdMatrix, Vector};
//!
//! // minimize x1^2 + x2^2  subject to  x1 + x2 <= -1
//! let prob = QpProblem {
//!     p: SpdMatrix::from_dense(2, &[2.0, 0.0, 0.0, 2.0])?,
//!     q: Vector::zeros(2),
//!     m: Matrix::from_vec(1, 2, vec![1.0, 1.0])?,
//!     d: Vector::from_slice(&[-1.0]),
//!     a: None,
//!     b: None,
//! };
//!
//! let ctx = ExecContext::sequential();
//! let result = solve(&prob, &Vector::zeros(2), &QpSettings::default(), &ctx)?;
//! println!("status: {}, x = {:?}", result.status, result.x);
//! ```
//!
//! # Precision
//!
//! Container elements are `f32` (the working precision of the sensor
//! pipeline); reductions accumulate in `f64`. The sequential and
//! parallel execution paths agree to working precision, not bitwise —
//! the parallel reduction sums in a different order.

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // IPM plumbing needs many parameters

pub mod ipm;
pub mod linalg;
pub mod minimize;
pub mod problem;
pub mod util;

// Re-export main types
pub use ipm::{solve, solve_with_stop, SolveError};
pub use linalg::{
    CholeskyError, Diag, ExecContext, ExecPolicy, LinalgError, Matrix, SpdMatrix, Vector,
};
pub use minimize::{minimize, minimize_constrained, NewtonResult, NewtonSettings, Objective};
pub use problem::{QpInfo, QpProblem, QpResult, QpSettings, QpStatus};
