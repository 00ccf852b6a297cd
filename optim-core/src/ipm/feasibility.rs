//! Phase-1 search for a strictly feasible starting point.
//!
//! Augments the problem with one slack variable `s`, relaxes every
//! inequality row by it (`M·x − s·1 ≤ d`), and drives `s` down with a
//! heavy linear penalty. The run stops the moment the slack goes
//! negative: the leading coordinates are then strictly interior for the
//! original problem. A slack that never goes negative certifies the
//! problem infeasible.

use crate::linalg::{ops, ExecContext, Matrix, SpdMatrix, Vector};
use crate::problem::{QpProblem, QpSettings};

use super::solve::central_path;
use super::SolveError;

/// Returns a strictly feasible point (and the iterations spent), or
/// `None` when no feasible point exists.
pub(crate) fn find_feasible(
    prob: &QpProblem,
    x0: &Vector,
    settings: &QpSettings,
    ctx: &ExecContext,
) -> Result<(Option<Vector>, usize), SolveError> {
    let n = prob.num_vars();
    let m = prob.num_ineq();
    let c = prob.num_eq();

    let mut f0 = Vector::zeros(m);
    ops::mat_vec_add(ctx, &prob.m, x0, 1.0, &prob.d, -1.0, &mut f0)?;
    let s0 = f0.max() + settings.feasibility_margin;

    // P̃ extends P with a unit diagonal entry for the slack; the packed
    // lower-triangular layout makes the original rows a prefix.
    let mut paug = SpdMatrix::zeros(n + 1);
    let plen = prob.p.packed().len();
    paug.packed_mut()[..plen].copy_from_slice(prob.p.packed());
    paug.set(n, n, 1.0);

    let mut qaug = Vector::zeros(n + 1);
    qaug.as_mut_slice()[..n].copy_from_slice(prob.q.as_slice());
    qaug[n] = settings.feasibility_penalty;

    // M̃ = [M | −1]
    let mut maug = Matrix::zeros(m, n + 1);
    for i in 0..m {
        let row = maug.row_mut(i);
        row[..n].copy_from_slice(prob.m.row(i));
        row[n] = -1.0;
    }

    // the slack does not enter the equality block
    let aaug = prob.a.as_ref().map(|a| {
        let mut out = Matrix::zeros(c, n + 1);
        for i in 0..c {
            out.row_mut(i)[..n].copy_from_slice(a.row(i));
        }
        out
    });

    let aug = QpProblem {
        p: paug,
        q: qaug,
        m: maug,
        d: prob.d.clone(),
        a: aaug,
        b: prob.b.clone(),
    };

    let mut x0aug = Vector::zeros(n + 1);
    x0aug.as_mut_slice()[..n].copy_from_slice(x0.as_slice());
    x0aug[n] = s0;

    log::debug!("phase-1: initial slack {s0:.4e} over {m} rows");
    let mut slack_negative = |x: &Vector| x[n] < 0.0;
    let result = central_path(&aug, x0aug, settings, ctx, Some(&mut slack_negative))?;

    if result.x[n] < 0.0 {
        log::debug!(
            "phase-1: feasible after {} iterations, slack {:.4e}",
            result.info.iters,
            result.x[n]
        );
        let x = Vector::from_slice(&result.x.as_slice()[..n]);
        Ok((Some(x), result.info.iters))
    } else {
        log::debug!(
            "phase-1: no feasible point, terminal slack {:.4e} ({})",
            result.x[n],
            result.status
        );
        Ok((None, result.info.iters))
    }
}
