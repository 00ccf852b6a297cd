//! Newton minimization of smooth convex objectives.
//!
//! Shares the Cholesky and Schur machinery with the QP solver: each
//! iteration factorizes the Hessian, solves for the Newton direction,
//! and backtracks on the objective value. Convergence is declared on
//! the Newton decrement.

use crate::linalg::{
    a_hinv_at_into, check_len, ops, solve_into, ExecContext, LinalgError, Matrix, SchurWorkspace,
    SolveScratch, SpdMatrix, Vector,
};

/// A twice-differentiable convex objective.
///
/// `derivatives` must fill the full gradient and Hessian at `x`; the
/// Hessian must be positive definite on the region the iterates visit.
pub trait Objective {
    fn value(&self, x: &Vector) -> f64;

    fn derivatives(&self, x: &Vector, grad: &mut Vector, hess: &mut SpdMatrix);
}

/// Newton iteration settings.
#[derive(Debug, Clone)]
pub struct NewtonSettings {
    /// Stop when half the squared Newton decrement drops below this.
    pub eps: f64,

    pub max_iter: usize,

    /// Armijo sufficient-decrease constant.
    pub armijo_alpha: f32,

    /// Geometric backtracking factor.
    pub backtrack_beta: f32,

    /// Iterative refinement inside every Hessian solve.
    pub refine: bool,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            max_iter: 50,
            armijo_alpha: 0.01,
            backtrack_beta: 0.5,
            refine: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewtonResult {
    pub x: Vector,

    pub iters: usize,

    /// Newton decrement at the last evaluated point.
    pub decrement: f64,

    pub converged: bool,
}

/// Steps below this end the backtracking search.
const MIN_STEP: f32 = 1e-10;

/// Minimize an unconstrained objective from `x0`.
pub fn minimize<O: Objective>(
    obj: &O,
    x0: &Vector,
    settings: &NewtonSettings,
    ctx: &ExecContext,
) -> Result<NewtonResult, LinalgError> {
    let n = x0.len();
    let mut x = x0.clone();
    let mut grad = Vector::zeros(n);
    let mut hess = SpdMatrix::zeros(n);
    let mut neg_g = Vector::zeros(n);
    let mut dx = Vector::zeros(n);
    let mut x_t = Vector::zeros(n);
    let mut scratch = Vector::zeros(n);
    let mut solve_ws = SolveScratch::new(n);
    let mut decrement = f64::INFINITY;

    for iter in 1..=settings.max_iter {
        obj.derivatives(&x, &mut grad, &mut hess);
        for i in 0..n {
            neg_g[i] = -grad[i];
        }
        solve_into(ctx, &mut hess, &neg_g, &mut dx, settings.refine, &mut solve_ws)?;

        let gdx = ops::dot(ctx, &grad, &dx, &mut scratch)? as f64;
        decrement = (-gdx).max(0.0).sqrt();
        if decrement * decrement / 2.0 <= settings.eps {
            return Ok(NewtonResult {
                x,
                iters: iter,
                decrement,
                converged: true,
            });
        }

        backtrack(obj, ctx, &x, &dx, gdx, settings, &mut x_t)?;
        x.copy_from(&x_t)?;
        log::trace!("newton iter {iter}: decrement {decrement:.4e}");
    }

    Ok(NewtonResult {
        x,
        iters: settings.max_iter,
        decrement,
        converged: false,
    })
}

/// Minimize subject to `A·x = b`, eliminating the multipliers through
/// the Schur complement of the Hessian. `x0` should satisfy the
/// equalities; a small violation is corrected by the first step.
pub fn minimize_constrained<O: Objective>(
    obj: &O,
    a: &Matrix,
    b: &Vector,
    x0: &Vector,
    settings: &NewtonSettings,
    ctx: &ExecContext,
) -> Result<NewtonResult, LinalgError> {
    let n = x0.len();
    let c = a.rows();
    check_len("minimize_constrained a cols", n, a.cols())?;
    check_len("minimize_constrained b", c, b.len())?;

    let mut x = x0.clone();
    let mut grad = Vector::zeros(n);
    let mut hess = SpdMatrix::zeros(n);
    let mut neg_g = Vector::zeros(n);
    let mut dx = Vector::zeros(n);
    let mut x_t = Vector::zeros(n);
    let mut scratch = Vector::zeros(n);
    let mut solve_ws = SolveScratch::new(n);

    let mut schur_ws = SchurWorkspace::new(c, n);
    let mut s = SpdMatrix::zeros(c);
    let mut w = Vector::zeros(c);
    let mut rhs_c = Vector::zeros(c);
    let mut r_pri = Vector::zeros(c);
    let mut hinv_g = Vector::zeros(n);
    let mut tmp = Vector::zeros(n);
    let mut solve_c = SolveScratch::new(c);
    let mut decrement = f64::INFINITY;

    for iter in 1..=settings.max_iter {
        obj.derivatives(&x, &mut grad, &mut hess);
        for i in 0..n {
            neg_g[i] = -grad[i];
        }
        ops::mat_vec_add(ctx, a, &x, 1.0, b, -1.0, &mut r_pri)?;

        // (A·H⁻¹·Aᵗ)·w = A·H⁻¹·(−g) + (A·x − b)
        a_hinv_at_into(ctx, a, &mut hess, settings.refine, &mut schur_ws, &mut s)?;
        solve_into(ctx, &mut hess, &neg_g, &mut hinv_g, settings.refine, &mut solve_ws)?;
        ops::mat_vec_add(ctx, a, &hinv_g, 1.0, &r_pri, 1.0, &mut rhs_c)?;
        solve_into(ctx, &mut s, &rhs_c, &mut w, settings.refine, &mut solve_c)?;

        // Δx = H⁻¹·(−g − Aᵗ·w)
        ops::mat_t_vec(ctx, a, &w, -1.0, &mut tmp)?;
        for i in 0..n {
            tmp[i] += neg_g[i];
        }
        solve_into(ctx, &mut hess, &tmp, &mut dx, settings.refine, &mut solve_ws)?;

        let gdx = ops::dot(ctx, &grad, &dx, &mut scratch)? as f64;
        decrement = (-gdx).max(0.0).sqrt();
        if decrement * decrement / 2.0 <= settings.eps {
            return Ok(NewtonResult {
                x,
                iters: iter,
                decrement,
                converged: true,
            });
        }

        backtrack(obj, ctx, &x, &dx, gdx, settings, &mut x_t)?;
        x.copy_from(&x_t)?;
        log::trace!("newton iter {iter}: decrement {decrement:.4e}");
    }

    Ok(NewtonResult {
        x,
        iters: settings.max_iter,
        decrement,
        converged: false,
    })
}

/// Armijo backtracking on the objective value; leaves the accepted
/// trial point in `x_t`.
fn backtrack<O: Objective>(
    obj: &O,
    ctx: &ExecContext,
    x: &Vector,
    dx: &Vector,
    gdx: f64,
    settings: &NewtonSettings,
    x_t: &mut Vector,
) -> Result<(), LinalgError> {
    let f0 = obj.value(x);
    let mut s = 1.0f32;
    loop {
        ops::lin_comb(ctx, 1.0, x, s, dx, x_t)?;
        let ft = obj.value(x_t);
        if ft.is_finite() && ft <= f0 + settings.armijo_alpha as f64 * s as f64 * gdx {
            return Ok(());
        }
        s *= settings.backtrack_beta;
        if s < MIN_STEP {
            // no acceptable step; keep the current point
            x_t.copy_from(x)?;
            return Ok(());
        }
    }
}
