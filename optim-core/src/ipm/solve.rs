//! QP entry points and the central-path driver.

use std::time::Instant;

use crate::linalg::{check_len, ops, ExecContext, LinalgError, Vector};
use crate::problem::{QpInfo, QpProblem, QpResult, QpSettings, QpStatus};

use super::feasibility::find_feasible;
use super::linesearch::line_search;
use super::newton::{newton_step, residuals_into};
use super::workspace::QpWorkspace;
use super::SolveError;

/// λ initialization cap: −1/f blows up when a constraint starts nearly
/// active.
const LAMBDA_INIT_CAP: f32 = 1e4;

/// Solve a convex QP from the starting point `x0`.
///
/// `x0` does not need to be feasible; an infeasible start triggers the
/// phase-1 slack problem first.
pub fn solve(
    prob: &QpProblem,
    x0: &Vector,
    settings: &QpSettings,
    ctx: &ExecContext,
) -> Result<QpResult, SolveError> {
    solve_with_stop(prob, x0, settings, ctx, None)
}

/// [`solve`] with an optional per-iteration stop predicate. The
/// predicate sees the iterate after every accepted step; returning
/// `true` ends the run with [`QpStatus::Stopped`].
pub fn solve_with_stop(
    prob: &QpProblem,
    x0: &Vector,
    settings: &QpSettings,
    ctx: &ExecContext,
    stop: Option<&mut dyn FnMut(&Vector) -> bool>,
) -> Result<QpResult, SolveError> {
    prob.validate().map_err(SolveError::InvalidProblem)?;
    check_len("solve x0", prob.num_vars(), x0.len())?;
    let start = Instant::now();

    let m = prob.num_ineq();
    let mut f0 = Vector::zeros(m);
    ops::mat_vec_add(ctx, &prob.m, x0, 1.0, &prob.d, -1.0, &mut f0)?;

    let (x_start, feasibility_iters) = if f0.max() >= 0.0 {
        match find_feasible(prob, x0, settings, ctx)? {
            (Some(x), iters) => (x, iters),
            (None, iters) => {
                return Ok(QpResult {
                    status: QpStatus::Infeasible,
                    x: x0.clone(),
                    lambda: Vector::zeros(m),
                    nu: prob.a.as_ref().map(|_| Vector::zeros(prob.num_eq())),
                    obj_val: f64::NAN,
                    info: QpInfo {
                        feasibility_iters: iters,
                        solve_time_ms: start.elapsed().as_millis() as u64,
                        ..QpInfo::default()
                    },
                });
            }
        }
    } else {
        (x0.clone(), 0)
    };

    let mut result = central_path(prob, x_start, settings, ctx, stop)?;
    result.info.feasibility_iters = feasibility_iters;
    result.info.solve_time_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

/// Follow the central path from a strictly feasible `x`.
pub(crate) fn central_path(
    prob: &QpProblem,
    x: Vector,
    settings: &QpSettings,
    ctx: &ExecContext,
    mut stop: Option<&mut dyn FnMut(&Vector) -> bool>,
) -> Result<QpResult, SolveError> {
    let n = prob.num_vars();
    let m = prob.num_ineq();
    let c = prob.num_eq();
    let mut ws = QpWorkspace::new(n, m, c);
    let mut x = x;
    let mut lambda = Vector::zeros(m);
    let mut nu = prob.a.as_ref().map(|_| Vector::zeros(c));

    // λ_i = min(−1/f_i, cap); the start is strictly interior so f < 0
    ops::mat_vec_add(ctx, &prob.m, &x, 1.0, &prob.d, -1.0, &mut ws.f)?;
    for i in 0..m {
        lambda[i] = (-1.0 / ws.f[i]).min(LAMBDA_INIT_CAP);
    }

    let mu = settings.barrier_scale;
    let mut gap = surrogate_gap(ctx, &ws.f, &lambda, &mut ws.sum_scratch)?;
    let mut t = mu * m as f64 / gap;

    let mut status = QpStatus::IterationLimit;
    let mut iters = 0;
    let mut residual_norm = f64::NAN;

    for iter in 1..=settings.max_iter {
        iters = iter;

        if settings.anti_stall && iter == settings.max_iter / 2 {
            lambda.fill(settings.anti_stall_lambda);
            gap = surrogate_gap(ctx, &ws.f, &lambda, &mut ws.sum_scratch)?;
            t = mu * m as f64 / gap * settings.anti_stall_t_shrink;
            log::debug!("anti-stall reset at iter {iter}: gap={gap:.3e} t={t:.3e}");
        }

        let pre_norm = residuals_into(
            ctx,
            &prob.p,
            &prob.q,
            &prob.m,
            &prob.d,
            prob.a.as_ref(),
            prob.b.as_ref(),
            &x,
            &lambda,
            nu.as_ref(),
            t,
            &mut ws.f,
            &mut ws.r_dual,
            &mut ws.r_cent,
            &mut ws.r_pri,
            &mut ws.px,
            &mut ws.atv,
            &mut ws.sum_scratch,
        )?;
        if !pre_norm.is_finite() {
            status = QpStatus::NumericalError;
            break;
        }

        match newton_step(
            ctx,
            &prob.p,
            &prob.m,
            prob.a.as_ref(),
            &lambda,
            settings.refine,
            &mut ws,
        ) {
            Ok(()) => {}
            Err(LinalgError::Cholesky(e)) => {
                log::warn!("KKT factorization failed at iter {iter}: {e}");
                status = QpStatus::NumericalError;
                break;
            }
            Err(e) => return Err(e.into()),
        }
        if !ws.dx.is_finite() || !ws.dlambda.is_finite() {
            status = QpStatus::NumericalError;
            break;
        }

        let outcome = line_search(
            ctx,
            &prob.p,
            &prob.q,
            &prob.m,
            &prob.d,
            prob.a.as_ref(),
            prob.b.as_ref(),
            &mut x,
            &mut lambda,
            nu.as_mut(),
            t,
            pre_norm,
            settings,
            &mut ws,
        )?;
        residual_norm = outcome.post_norm;

        gap = surrogate_gap(ctx, &ws.f, &lambda, &mut ws.sum_scratch)?;
        if settings.verbose {
            log::info!(
                "iter {iter}: gap={gap:.3e} residual={residual_norm:.3e} step={:.3}",
                outcome.step
            );
        } else {
            log::debug!(
                "iter {iter}: gap={gap:.3e} residual={residual_norm:.3e} step={:.3}",
                outcome.step
            );
        }

        if !gap.is_finite() || !x.is_finite() {
            status = QpStatus::NumericalError;
            break;
        }
        if gap < settings.tol_gap {
            status = QpStatus::Converged;
            break;
        }
        if let Some(cb) = stop.as_mut() {
            if cb(&x) {
                status = QpStatus::Stopped;
                break;
            }
        }
        t = mu * m as f64 / gap;
    }

    let obj_val = objective(ctx, prob, &x, &mut ws.px, &mut ws.sum_scratch)?;
    Ok(QpResult {
        status,
        x,
        lambda,
        nu,
        obj_val,
        info: QpInfo {
            iters,
            feasibility_iters: 0,
            gap,
            residual_norm,
            solve_time_ms: 0,
        },
    })
}

/// Surrogate duality gap `−fᵗλ`.
fn surrogate_gap(
    ctx: &ExecContext,
    f: &Vector,
    lambda: &Vector,
    scratch: &mut Vector,
) -> Result<f64, LinalgError> {
    Ok(-(ops::dot(ctx, f, lambda, scratch)? as f64))
}

/// `(1/2)·xᵗPx + qᵗx`
fn objective(
    ctx: &ExecContext,
    prob: &QpProblem,
    x: &Vector,
    px: &mut Vector,
    scratch: &mut Vector,
) -> Result<f64, LinalgError> {
    prob.p.mul_vec_into(ctx, x, px)?;
    let xpx = ops::dot(ctx, x, px, scratch)? as f64;
    let qx = ops::dot(ctx, &prob.q, x, scratch)? as f64;
    Ok(0.5 * xpx + qx)
}
