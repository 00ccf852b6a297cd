//! Backtracking line search along the Newton direction.
//!
//! Three gates, in order: cap the step so every λ stays strictly
//! positive, backtrack until every trial constraint value is strictly
//! negative, then backtrack until the trial residual norm satisfies the
//! sufficient-decrease condition. Both feasibility and dual positivity
//! survive further shrinking because the trial point is affine in the
//! step length.

use crate::linalg::{ops, ExecContext, LinalgError, Matrix, SpdMatrix, Vector};
use crate::problem::QpSettings;

use super::newton::residuals_into;
use super::workspace::QpWorkspace;

/// Steps below this are treated as a stall; the iterate is left alone.
const MIN_STEP: f32 = 1e-10;

/// Residual backtracking cap.
const MAX_BACKTRACK: usize = 50;

pub(crate) struct LineSearchOutcome {
    pub step: f32,
    pub post_norm: f64,
}

/// Search along `(ws.dx, ws.dlambda, ws.dnu)` from `(x, λ, ν)` and
/// commit the accepted trial point in place. `ws.f` holds the
/// constraint values at the committed point afterwards.
pub(crate) fn line_search(
    ctx: &ExecContext,
    p: &SpdMatrix,
    q: &Vector,
    mm: &Matrix,
    d: &Vector,
    a: Option<&Matrix>,
    b: Option<&Vector>,
    x: &mut Vector,
    lambda: &mut Vector,
    mut nu: Option<&mut Vector>,
    t: f64,
    pre_norm: f64,
    settings: &QpSettings,
    ws: &mut QpWorkspace,
) -> Result<LineSearchOutcome, LinalgError> {
    let QpWorkspace {
        f,
        dx,
        dlambda,
        dnu,
        x_t,
        lambda_t,
        nu_t,
        f_t,
        rd_t,
        rc_t,
        rp_t,
        px,
        atv,
        sum_scratch,
        ..
    } = ws;

    // largest step keeping λ + s·Δλ > 0, with margin
    let mut s = 1.0f32;
    for i in 0..lambda.len() {
        if dlambda[i] < 0.0 {
            s = s.min(-lambda[i] / dlambda[i]);
        }
    }
    s = (s * settings.dual_step_margin).min(1.0);

    let beta = settings.backtrack_beta;

    // strict primal feasibility of the trial point
    loop {
        ops::lin_comb(ctx, 1.0, x, s, dx, x_t)?;
        ops::mat_vec_add(ctx, mm, x_t, 1.0, d, -1.0, f_t)?;
        if f_t.max() < 0.0 {
            break;
        }
        s *= beta;
        if s < MIN_STEP {
            return Ok(LineSearchOutcome {
                step: 0.0,
                post_norm: pre_norm,
            });
        }
    }

    // sufficient residual decrease
    let mut trial = |s: f32,
                     x_t: &mut Vector,
                     lambda_t: &mut Vector,
                     nu_t: &mut Vector|
     -> Result<f64, LinalgError> {
        ops::lin_comb(ctx, 1.0, x, s, dx, x_t)?;
        ops::lin_comb(ctx, 1.0, lambda, s, dlambda, lambda_t)?;
        let nu_ref = if let Some(nu) = nu.as_deref() {
            ops::lin_comb(ctx, 1.0, nu, s, dnu, nu_t)?;
            Some(&*nu_t)
        } else {
            None
        };
        residuals_into(
            ctx, p, q, mm, d, a, b, x_t, lambda_t, nu_ref, t, f_t, rd_t, rc_t, rp_t, px, atv,
            sum_scratch,
        )
    };

    let mut post_norm = trial(s, x_t, lambda_t, nu_t)?;
    let mut tries = 0;
    while post_norm > (1.0 - settings.armijo_alpha * s) as f64 * pre_norm
        && tries < MAX_BACKTRACK
        && s >= MIN_STEP
    {
        s *= beta;
        post_norm = trial(s, x_t, lambda_t, nu_t)?;
        tries += 1;
    }

    x.copy_from(x_t)?;
    lambda.copy_from(lambda_t)?;
    if let Some(nu) = nu.as_deref_mut() {
        nu.copy_from(nu_t)?;
    }
    f.copy_from(f_t)?;
    Ok(LineSearchOutcome { step: s, post_norm })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipm::newton::newton_step;

    /// One full Newton-plus-search iteration on a 1-d problem must
    /// decrease the residual norm and keep the iterate interior.
    #[test]
    fn search_decreases_residual_and_stays_interior() {
        let ctx = ExecContext::sequential();
        let p = SpdMatrix::from_dense(1, &[2.0]).unwrap();
        let q = Vector::zeros(1);
        let mm = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        let d = Vector::from_slice(&[-1.0]);
        let settings = QpSettings::default();

        let mut x = Vector::from_slice(&[-3.0]);
        let mut lambda = Vector::from_slice(&[0.5]);
        let mut ws = QpWorkspace::new(1, 1, 0);
        let t = 5.0;

        let pre = residuals_into(
            &ctx,
            &p,
            &q,
            &mm,
            &d,
            None,
            None,
            &x,
            &lambda,
            None,
            t,
            &mut ws.f,
            &mut ws.r_dual,
            &mut ws.r_cent,
            &mut ws.r_pri,
            &mut ws.px,
            &mut ws.atv,
            &mut ws.sum_scratch,
        )
        .unwrap();
        newton_step(&ctx, &p, &mm, None, &lambda, true, &mut ws).unwrap();

        let out = line_search(
            &ctx,
            &p,
            &q,
            &mm,
            &d,
            None,
            None,
            &mut x,
            &mut lambda,
            None,
            t,
            pre,
            &settings,
            &mut ws,
        )
        .unwrap();

        assert!(out.step > 0.0);
        assert!(out.post_norm < pre);
        assert!(x[0] < -1.0, "trial point left the interior: {}", x[0]);
        assert!(lambda[0] > 0.0);
    }
}
