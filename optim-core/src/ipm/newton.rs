//! Residual evaluation and the primal-dual Newton step.

use crate::linalg::{
    a_hinv_at_into, ops, solve_into, Diag, ExecContext, LinalgError, Matrix, SpdMatrix, Vector,
};

use super::workspace::QpWorkspace;

/// Evaluate the KKT residuals at `(x, λ, ν)` into the supplied buffers
/// and return their combined two-norm.
///
/// On return `f` holds `M·x − d`, `r_dual` the dual residual
/// `P·x + q + Mᵗλ (+ Aᵗν)`, `r_cent` the centrality residual
/// `−D(λ)·f − (1/t)·1`, and `r_pri` the equality residual `A·x − b`
/// (untouched when there is no equality block).
pub(crate) fn residuals_into(
    ctx: &ExecContext,
    p: &SpdMatrix,
    q: &Vector,
    mm: &Matrix,
    d: &Vector,
    a: Option<&Matrix>,
    b: Option<&Vector>,
    x: &Vector,
    lambda: &Vector,
    nu: Option<&Vector>,
    t: f64,
    f: &mut Vector,
    r_dual: &mut Vector,
    r_cent: &mut Vector,
    r_pri: &mut Vector,
    px: &mut Vector,
    atv: &mut Vector,
    scratch: &mut Vector,
) -> Result<f64, LinalgError> {
    ops::mat_vec_add(ctx, mm, x, 1.0, d, -1.0, f)?;
    p.mul_vec_into(ctx, x, px)?;
    ops::mat_t_vec(ctx, mm, lambda, 1.0, r_dual)?;
    for i in 0..r_dual.len() {
        r_dual[i] += px[i] + q[i];
    }
    if let (Some(a), Some(nu)) = (a, nu) {
        ops::mat_t_vec(ctx, a, nu, 1.0, atv)?;
        for i in 0..r_dual.len() {
            r_dual[i] += atv[i];
        }
    }
    let inv_t = (1.0 / t) as f32;
    for i in 0..r_cent.len() {
        r_cent[i] = -lambda[i] * f[i] - inv_t;
    }
    if let (Some(a), Some(b)) = (a, b) {
        ops::mat_vec_add(ctx, a, x, 1.0, b, -1.0, r_pri)?;
    }

    let mut acc = ops::dot(ctx, r_dual, r_dual, scratch)? as f64;
    acc += ops::dot(ctx, r_cent, r_cent, scratch)? as f64;
    if a.is_some() {
        acc += ops::dot(ctx, r_pri, r_pri, scratch)? as f64;
    }
    Ok(acc.max(0.0).sqrt())
}

/// One Newton step on the residuals already stored in the workspace.
///
/// Forms the barrier-weighted Hessian `Hpd = P + MᵗD(z)M` with
/// `z = −λ/f`, solves the reduced system for `Δx` (through the Schur
/// complement of the equality block when present), and recovers
/// `Δλ = D(z)·M·Δx + r_cent/f`. Results land in `ws.dx`, `ws.dlambda`
/// and `ws.dnu`.
pub(crate) fn newton_step(
    ctx: &ExecContext,
    p: &SpdMatrix,
    mm: &Matrix,
    a: Option<&Matrix>,
    lambda: &Vector,
    refine: bool,
    ws: &mut QpWorkspace,
) -> Result<(), LinalgError> {
    let QpWorkspace {
        f,
        z,
        w,
        reg,
        hpd,
        r_dual,
        r_cent,
        r_pri,
        rhs,
        dx,
        dlambda,
        dnu,
        mdx,
        solve,
        eq,
        ..
    } = ws;

    // f < 0 and λ > 0 in the interior, so z > 0
    for i in 0..z.len() {
        z[i] = -lambda[i] / f[i];
        w[i] = r_cent[i] / f[i];
    }

    ops::weighted_gram(ctx, mm, &Diag::View(z.as_slice()), &Diag::View(reg.as_slice()), hpd)?;
    hpd.add_scaled(1.0, p)?;

    // rhs = −r_dual − Mᵗ·(r_cent / f)
    ops::mat_t_vec(ctx, mm, w, -1.0, rhs)?;
    for i in 0..rhs.len() {
        rhs[i] -= r_dual[i];
    }

    match (a, eq.as_mut()) {
        (Some(a), Some(eqw)) => {
            // (A·Hpd⁻¹·Aᵗ)·Δν = A·Hpd⁻¹·rhs + r_pri
            a_hinv_at_into(ctx, a, hpd, refine, &mut eqw.schur, &mut eqw.s)?;
            solve_into(ctx, hpd, rhs, &mut eqw.hinv_rhs, refine, solve)?;
            ops::mat_vec_add(ctx, a, &eqw.hinv_rhs, 1.0, r_pri, 1.0, &mut eqw.rhs_c)?;
            solve_into(ctx, &mut eqw.s, &eqw.rhs_c, dnu, refine, &mut eqw.solve_c)?;

            // Δx = Hpd⁻¹·(rhs − Aᵗ·Δν)
            ops::mat_t_vec(ctx, a, dnu, -1.0, &mut eqw.tmp_n)?;
            for i in 0..rhs.len() {
                eqw.tmp_n[i] += rhs[i];
            }
            solve_into(ctx, hpd, &eqw.tmp_n, dx, refine, solve)?;
        }
        _ => {
            solve_into(ctx, hpd, rhs, dx, refine, solve)?;
        }
    }

    ops::mat_vec(ctx, mm, dx, 1.0, mdx)?;
    for i in 0..dlambda.len() {
        dlambda[i] = z[i] * mdx[i] + w[i];
    }
    Ok(())
}
