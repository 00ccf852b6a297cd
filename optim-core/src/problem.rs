//! QP problem data, solver settings, and result types.

use std::fmt;

use crate::linalg::{Matrix, SpdMatrix, Vector};

/// Convex quadratic program in canonical form.
///
/// ```text
/// minimize    (1/2) xᵗ P x + qᵗ x
/// subject to  M x ≤ d            (m inequality rows)
///             A x = b            (optional, c equality rows)
/// ```
///
/// # Dimensions
///
/// - `n`: number of variables
/// - P: n × n SPD, q: n
/// - M: m × n, d: m (m ≥ 1: the barrier needs at least one inequality)
/// - A: c × n, b: c (present together or not at all)
#[derive(Debug, Clone)]
pub struct QpProblem {
    /// Quadratic cost matrix P (n × n, SPD).
    pub p: SpdMatrix,

    /// Linear cost vector q (length n).
    pub q: Vector,

    /// Inequality constraint matrix M (m × n).
    pub m: Matrix,

    /// Inequality right-hand side d (length m).
    pub d: Vector,

    /// Equality constraint matrix A (c × n), if any.
    pub a: Option<Matrix>,

    /// Equality right-hand side b (length c), if any.
    pub b: Option<Vector>,
}

impl QpProblem {
    /// Number of variables (n).
    pub fn num_vars(&self) -> usize {
        self.q.len()
    }

    /// Number of inequality rows (m).
    pub fn num_ineq(&self) -> usize {
        self.d.len()
    }

    /// Number of equality rows (c).
    pub fn num_eq(&self) -> usize {
        self.b.as_ref().map_or(0, Vector::len)
    }

    /// Validate dimension couplings between all pieces.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.num_vars();
        let m = self.num_ineq();

        if self.p.n() != n {
            return Err(format!("P is {0}×{0}, expected {n}×{n}", self.p.n()));
        }
        if m == 0 {
            return Err("at least one inequality row is required".to_string());
        }
        if self.m.rows() != m {
            return Err(format!("M has {} rows, expected {m}", self.m.rows()));
        }
        if self.m.cols() != n {
            return Err(format!("M has {} cols, expected {n}", self.m.cols()));
        }
        match (&self.a, &self.b) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                if a.rows() != b.len() {
                    return Err(format!(
                        "A has {} rows but b has length {}",
                        a.rows(),
                        b.len()
                    ));
                }
                if a.cols() != n {
                    return Err(format!("A has {} cols, expected {n}", a.cols()));
                }
                if a.rows() == 0 {
                    return Err("empty equality block; pass None instead".to_string());
                }
            }
            _ => return Err("A and b must be supplied together".to_string()),
        }
        Ok(())
    }
}

/// Solver settings.
#[derive(Debug, Clone)]
pub struct QpSettings {
    /// Central-path iteration cap.
    pub max_iter: usize,

    /// Surrogate-duality-gap tolerance for convergence.
    pub tol_gap: f64,

    /// Barrier rescale factor μ in `t = m·μ/gap`.
    pub barrier_scale: f64,

    /// Armijo sufficient-decrease constant for the residual line search.
    pub armijo_alpha: f32,

    /// Geometric backtracking factor.
    pub backtrack_beta: f32,

    /// Safety margin keeping λ strictly positive at the dual step cap.
    pub dual_step_margin: f32,

    /// Apply iterative refinement inside every KKT solve.
    pub refine: bool,

    /// Log a convergence summary per iteration.
    pub verbose: bool,

    /// Mid-run anti-stall heuristic: at the halfway iteration, reset λ
    /// to a small constant and shrink the barrier parameter. Observed
    /// to counter stalling on ill-conditioned instances; optional
    /// because it is a heuristic, not a correctness requirement.
    pub anti_stall: bool,

    /// λ value the anti-stall reset writes.
    pub anti_stall_lambda: f32,

    /// Multiplier applied to t by the anti-stall reset.
    pub anti_stall_t_shrink: f64,

    /// Linear objective weight on the phase-1 slack variable.
    pub feasibility_penalty: f32,

    /// Initial slack headroom above the worst constraint violation.
    pub feasibility_margin: f32,
}

impl Default for QpSettings {
    fn default() -> Self {
        // Environment override mirrors how the deployed sensor tunes
        // the heuristic without a rebuild.
        let anti_stall = std::env::var("OPTIM_ANTI_STALL")
            .ok()
            .map(|s| s != "0" && s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            max_iter: 60,
            tol_gap: 5e-5,
            barrier_scale: 10.0,
            armijo_alpha: 0.02,
            backtrack_beta: 0.6,
            dual_step_margin: 0.99,
            refine: true,
            verbose: false,
            anti_stall,
            anti_stall_lambda: 0.1,
            anti_stall_t_shrink: 0.5,
            feasibility_penalty: 1e3,
            feasibility_margin: 1.0,
        }
    }
}

/// Terminal state of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    /// Surrogate duality gap dropped below tolerance.
    Converged,

    /// The phase-1 slack never went negative: no feasible point exists.
    Infeasible,

    /// Iteration cap reached without convergence.
    IterationLimit,

    /// Caller-supplied stop predicate fired.
    Stopped,

    /// Factorization failed or residuals went non-finite mid-run.
    NumericalError,
}

impl fmt::Display for QpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QpStatus::Converged => write!(f, "Converged"),
            QpStatus::Infeasible => write!(f, "Infeasible"),
            QpStatus::IterationLimit => write!(f, "IterationLimit"),
            QpStatus::Stopped => write!(f, "Stopped"),
            QpStatus::NumericalError => write!(f, "NumericalError"),
        }
    }
}

/// Solve result with solution and diagnostics.
#[derive(Debug, Clone)]
pub struct QpResult {
    pub status: QpStatus,

    /// Primal point (length n). Meaningful for `Converged` and
    /// best-effort otherwise; callers must check `status`.
    pub x: Vector,

    /// Inequality multipliers λ (length m).
    pub lambda: Vector,

    /// Equality multipliers ν (length c), when equalities are present.
    pub nu: Option<Vector>,

    /// Objective value at `x`.
    pub obj_val: f64,

    pub info: QpInfo,
}

/// Per-solve diagnostics.
#[derive(Debug, Clone, Default)]
pub struct QpInfo {
    /// Central-path iterations taken.
    pub iters: usize,

    /// Iterations spent in the phase-1 feasibility problem.
    pub feasibility_iters: usize,

    /// Final surrogate duality gap.
    pub gap: f64,

    /// Final total residual norm.
    pub residual_norm: f64,

    /// Wall-clock solve time in milliseconds.
    pub solve_time_ms: u64,
}
