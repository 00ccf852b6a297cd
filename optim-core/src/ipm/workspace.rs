//! Preallocated scratch arena for the central-path loop.
//!
//! Every buffer the iteration touches is allocated once up front; the
//! hot loop performs no allocation. Fields are public within the crate
//! so callers can destructure for disjoint borrows.

use crate::linalg::{SchurWorkspace, SolveScratch, SpdMatrix, Vector};

/// Scratch tied to the equality block, present only when `c > 0`.
#[derive(Debug)]
pub struct EqWorkspace {
    /// Schur-complement scratch for `A·H⁻¹·Aᵗ`.
    pub(crate) schur: SchurWorkspace,

    /// The c×c reduced system.
    pub(crate) s: SpdMatrix,

    /// Right-hand side of the reduced system.
    pub(crate) rhs_c: Vector,

    /// `H⁻¹·rhs`, length n.
    pub(crate) hinv_rhs: Vector,

    /// Length-n temporary for `rhs − Aᵗ·Δν`.
    pub(crate) tmp_n: Vector,

    pub(crate) solve_c: SolveScratch,
}

impl EqWorkspace {
    fn new(c: usize, n: usize) -> Self {
        Self {
            schur: SchurWorkspace::new(c, n),
            s: SpdMatrix::zeros(c),
            rhs_c: Vector::zeros(c),
            hinv_rhs: Vector::zeros(n),
            tmp_n: Vector::zeros(n),
            solve_c: SolveScratch::new(c),
        }
    }
}

/// Arena for one QP solve: `n` variables, `m` inequalities, `c`
/// equalities.
#[derive(Debug)]
pub struct QpWorkspace {
    /// Constraint values `f = M·x − d` at the current iterate.
    pub(crate) f: Vector,

    /// Barrier weights `z_i = −λ_i / f_i`.
    pub(crate) z: Vector,

    /// `w_i = r_cent_i / f_i`, reused when recovering Δλ.
    pub(crate) w: Vector,

    /// Zero regularization diagonal for the weighted Gram product.
    pub(crate) reg: Vector,

    /// Barrier-weighted Hessian `P + MᵗD(z)M`.
    pub(crate) hpd: SpdMatrix,

    pub(crate) r_dual: Vector,
    pub(crate) r_cent: Vector,
    pub(crate) r_pri: Vector,

    /// Reduced Newton right-hand side, length n.
    pub(crate) rhs: Vector,

    pub(crate) dx: Vector,
    pub(crate) dlambda: Vector,
    pub(crate) dnu: Vector,

    /// `M·Δx`, length m.
    pub(crate) mdx: Vector,

    /// `P·x` scratch for residual and objective evaluation.
    pub(crate) px: Vector,

    /// `Aᵗν` / `Mᵗλ` scratch, length n.
    pub(crate) atv: Vector,

    /// Reduction scratch, length `max(n, m, c)`.
    pub(crate) sum_scratch: Vector,

    // Trial-point buffers for the line search.
    pub(crate) x_t: Vector,
    pub(crate) lambda_t: Vector,
    pub(crate) nu_t: Vector,
    pub(crate) f_t: Vector,
    pub(crate) rd_t: Vector,
    pub(crate) rc_t: Vector,
    pub(crate) rp_t: Vector,

    pub(crate) solve: SolveScratch,

    pub(crate) eq: Option<EqWorkspace>,
}

impl QpWorkspace {
    pub fn new(n: usize, m: usize, c: usize) -> Self {
        Self {
            f: Vector::zeros(m),
            z: Vector::zeros(m),
            w: Vector::zeros(m),
            reg: Vector::zeros(n),
            hpd: SpdMatrix::zeros(n),
            r_dual: Vector::zeros(n),
            r_cent: Vector::zeros(m),
            r_pri: Vector::zeros(c),
            rhs: Vector::zeros(n),
            dx: Vector::zeros(n),
            dlambda: Vector::zeros(m),
            dnu: Vector::zeros(c),
            mdx: Vector::zeros(m),
            px: Vector::zeros(n),
            atv: Vector::zeros(n),
            sum_scratch: Vector::zeros(n.max(m).max(c)),
            x_t: Vector::zeros(n),
            lambda_t: Vector::zeros(m),
            nu_t: Vector::zeros(c),
            f_t: Vector::zeros(m),
            rd_t: Vector::zeros(n),
            rc_t: Vector::zeros(m),
            rp_t: Vector::zeros(c),
            solve: SolveScratch::new(n),
            eq: (c > 0).then(|| EqWorkspace::new(c, n)),
        }
    }

    /// Sized for the given problem.
    pub fn for_problem(prob: &crate::problem::QpProblem) -> Self {
        Self::new(prob.num_vars(), prob.num_ineq(), prob.num_eq())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_scratch_only_when_needed() {
        assert!(QpWorkspace::new(3, 2, 0).eq.is_none());
        assert!(QpWorkspace::new(3, 2, 1).eq.is_some());
    }

    #[test]
    fn buffer_lengths_follow_dimensions() {
        let ws = QpWorkspace::new(4, 7, 2);
        assert_eq!(ws.f.len(), 7);
        assert_eq!(ws.rhs.len(), 4);
        assert_eq!(ws.dnu.len(), 2);
        assert_eq!(ws.sum_scratch.len(), 7);
    }
}
