//! Dense SPD linear algebra.
//!
//! Containers, dual-path BLAS kernels, blocked Cholesky factorization,
//! triangular solves with iterative refinement, and the Schur-complement
//! primitive used to eliminate equality-constraint multipliers.

pub mod backend;
pub mod matrix;
pub mod ops;
pub mod schur;
pub mod solve;
pub mod spd;
pub mod vector;

pub use backend::{ExecContext, ExecPolicy};
pub use matrix::Matrix;
pub use schur::{a_hinv_at, a_hinv_at_into, SchurWorkspace};
pub use solve::{solve_into, solve_mat_into, SolveScratch};
pub use spd::{CholeskyError, SpdMatrix};
pub use vector::{Diag, Vector};

use thiserror::Error;

/// Errors raised by the dense kernels.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    /// Operand shapes do not line up. Always a programming error at the
    /// call site; lengths are never coerced.
    #[error("incompatible dimensions in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Cholesky(#[from] CholeskyError),
}

#[inline]
pub(crate) fn check_len(
    context: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), LinalgError> {
    if expected == found {
        Ok(())
    } else {
        Err(LinalgError::DimensionMismatch {
            context,
            expected,
            found,
        })
    }
}
