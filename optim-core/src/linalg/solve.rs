//! Linear solves against a factorized SPD matrix.
//!
//! Blocked forward/back substitution plus iterative refinement. The
//! refinement loop runs after every direct solve unless explicitly
//! disabled: it never lets the residual norm grow (a worsening pass is
//! rolled back) and a non-finite residual aborts it, returning the last
//! finite iterate.

use rayon::prelude::*;

use super::backend::ExecContext;
use super::matrix::Matrix;
use super::spd::{pidx, SpdMatrix};
use super::vector::Vector;
use super::{check_len, LinalgError};

/// Refinement iteration cap.
const MAX_REFINE: usize = 8;

/// Mean-absolute-residual target that stops refinement early.
const REFINE_TOL: f64 = 1e-5;

/// Scratch buffers for one solve chain, allocated once and reused for
/// every right-hand side and refinement pass.
#[derive(Debug)]
pub struct SolveScratch {
    r: Vector,
    delta: Vector,
    xb: Vector,
    col: Vector,
    cx: Vector,
}

impl SolveScratch {
    pub fn new(n: usize) -> Self {
        Self {
            r: Vector::zeros(n),
            delta: Vector::zeros(n),
            xb: Vector::zeros(n),
            col: Vector::zeros(n),
            cx: Vector::zeros(n),
        }
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

/// Forward substitution `L·y = b`, blocked into `panel`-wide steps:
/// solve within the panel, then propagate into the tail in parallel.
fn forward_subst(ctx: &ExecContext, l: &[f32], n: usize, y: &mut [f32]) {
    if !ctx.is_parallel() {
        for i in 0..n {
            let row = pidx(i, 0);
            let mut s = y[i] as f64;
            for j in 0..i {
                s -= (l[row + j] as f64) * (y[j] as f64);
            }
            y[i] = (s / l[row + i] as f64) as f32;
        }
        return;
    }
    let nb = ctx.panel.max(1);
    let mut k0 = 0;
    while k0 < n {
        let kb = nb.min(n - k0);
        // panel solve; columns before k0 were already propagated
        for i in k0..k0 + kb {
            let row = pidx(i, 0);
            let mut s = y[i] as f64;
            for j in k0..i {
                s -= (l[row + j] as f64) * (y[j] as f64);
            }
            y[i] = (s / l[row + i] as f64) as f32;
        }
        let first = k0 + kb;
        if first < n {
            let (head, tail) = y.split_at_mut(first);
            tail.par_iter_mut().enumerate().for_each(|(ti, yt)| {
                let t = first + ti;
                let row = pidx(t, 0);
                let mut s = *yt as f64;
                for j in k0..first {
                    s -= (l[row + j] as f64) * (head[j] as f64);
                }
                *yt = s as f32;
            });
        }
        k0 += kb;
    }
}

/// Back substitution `Lᵗ·x = y`, blocked from the end.
fn backward_subst(ctx: &ExecContext, l: &[f32], n: usize, x: &mut [f32]) {
    if !ctx.is_parallel() {
        for i in (0..n).rev() {
            let mut s = x[i] as f64;
            for j in (i + 1)..n {
                s -= (l[pidx(j, i)] as f64) * (x[j] as f64);
            }
            x[i] = (s / l[pidx(i, i)] as f64) as f32;
        }
        return;
    }
    let nb = ctx.panel.max(1);
    let mut hi = n;
    while hi > 0 {
        let kb = nb.min(hi);
        let k0 = hi - kb;
        // panel solve; columns past hi were already propagated
        for i in (k0..hi).rev() {
            let mut s = x[i] as f64;
            for j in (i + 1)..hi {
                s -= (l[pidx(j, i)] as f64) * (x[j] as f64);
            }
            x[i] = (s / l[pidx(i, i)] as f64) as f32;
        }
        if k0 > 0 {
            let (head, panel) = x.split_at_mut(k0);
            head.par_iter_mut().enumerate().for_each(|(t, xt)| {
                let mut s = *xt as f64;
                for c in 0..kb {
                    s -= (l[pidx(k0 + c, t)] as f64) * (panel[c] as f64);
                }
                *xt = s as f32;
            });
        }
        hi = k0;
    }
}

fn direct_solve(ctx: &ExecContext, l: &[f32], n: usize, b: &[f32], x: &mut [f32]) {
    x.copy_from_slice(b);
    forward_subst(ctx, l, n, x);
    backward_subst(ctx, l, n, x);
}

fn mean_abs(v: &[f32]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for &x in v {
        acc += (x as f64).abs();
    }
    acc / v.len() as f64
}

fn norm(v: &[f32]) -> f64 {
    let mut acc = 0.0f64;
    for &x in v {
        acc += (x as f64) * (x as f64);
    }
    acc.sqrt()
}

/// Direct solve plus refinement against an already-factorized matrix.
fn solve_one(
    ctx: &ExecContext,
    m: &mut SpdMatrix,
    b: &Vector,
    x: &mut Vector,
    refine: bool,
    r: &mut Vector,
    delta: &mut Vector,
    xb: &mut Vector,
) -> Result<(), LinalgError> {
    let n = m.n();
    m.factorize(ctx)?;
    direct_solve(ctx, m.factor_unchecked(), n, b.as_slice(), x.as_mut_slice());
    if !refine {
        return Ok(());
    }

    // r = M·x − b
    let residual =
        |m: &SpdMatrix, x: &Vector, r: &mut Vector| -> Result<(), LinalgError> {
            m.mul_vec_into(ctx, x, r)?;
            for (ri, bi) in r.as_mut_slice().iter_mut().zip(b.as_slice()) {
                *ri -= bi;
            }
            Ok(())
        };

    residual(m, x, r)?;
    if !r.is_finite() {
        return Ok(());
    }
    let mut r_norm = norm(r.as_slice());
    for _ in 0..MAX_REFINE {
        if mean_abs(r.as_slice()) < REFINE_TOL {
            break;
        }
        direct_solve(
            ctx,
            m.factor_unchecked(),
            n,
            r.as_slice(),
            delta.as_mut_slice(),
        );
        xb.copy_from(x)?;
        for (xi, di) in x.as_mut_slice().iter_mut().zip(delta.as_slice()) {
            *xi -= di;
        }
        residual(m, x, r)?;
        if !r.is_finite() {
            // keep the last finite iterate
            x.copy_from(xb)?;
            return Ok(());
        }
        let new_norm = norm(r.as_slice());
        if new_norm > r_norm {
            // refinement must never increase the residual
            x.copy_from(xb)?;
            break;
        }
        r_norm = new_norm;
    }
    Ok(())
}

/// Solve `M·x = b`, factorizing lazily, with iterative refinement when
/// `refine` is set.
pub fn solve_into(
    ctx: &ExecContext,
    m: &mut SpdMatrix,
    b: &Vector,
    x: &mut Vector,
    refine: bool,
    ws: &mut SolveScratch,
) -> Result<(), LinalgError> {
    let n = m.n();
    check_len("solve b", n, b.len())?;
    check_len("solve x", n, x.len())?;
    check_len("solve scratch", n, ws.len())?;
    let SolveScratch { r, delta, xb, .. } = ws;
    solve_one(ctx, m, b, x, refine, r, delta, xb)
}

/// Solve `M·X = B` column by column against one factorization.
pub fn solve_mat_into(
    ctx: &ExecContext,
    m: &mut SpdMatrix,
    b: &Matrix,
    x: &mut Matrix,
    refine: bool,
    ws: &mut SolveScratch,
) -> Result<(), LinalgError> {
    let n = m.n();
    check_len("solve_mat b rows", n, b.rows())?;
    check_len("solve_mat x rows", n, x.rows())?;
    check_len("solve_mat x cols", b.cols(), x.cols())?;
    check_len("solve_mat scratch", n, ws.len())?;
    m.factorize(ctx)?;
    let SolveScratch {
        r,
        delta,
        xb,
        col,
        cx,
    } = ws;
    for c in 0..b.cols() {
        for i in 0..n {
            col[i] = b.get(i, c);
        }
        solve_one(ctx, m, col, cx, refine, r, delta, xb)?;
        for i in 0..n {
            x.set(i, c, cx[i]);
        }
    }
    Ok(())
}

impl SpdMatrix {
    /// Solve `M·x = b` with refinement, allocating fresh scratch.
    pub fn solve(&mut self, ctx: &ExecContext, b: &Vector) -> Result<Vector, LinalgError> {
        let mut x = Vector::zeros(self.n());
        let mut ws = SolveScratch::new(self.n());
        solve_into(ctx, self, b, &mut x, true, &mut ws)?;
        Ok(x)
    }

    /// Solve `M·X = B` with refinement, allocating fresh scratch.
    pub fn solve_matrix(&mut self, ctx: &ExecContext, b: &Matrix) -> Result<Matrix, LinalgError> {
        let mut x = Matrix::zeros(self.n(), b.cols());
        let mut ws = SolveScratch::new(self.n());
        solve_mat_into(ctx, self, b, &mut x, true, &mut ws)?;
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn random_spd(n: usize, seed: u64) -> SpdMatrix {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let g: Vec<f32> = (0..n * n).map(|_| rng.random_range(-1.0..1.0)).collect();
        let mut m = SpdMatrix::zeros(n);
        for i in 0..n {
            for j in 0..=i {
                let mut s = 0.0f64;
                for k in 0..n {
                    s += (g[i * n + k] as f64) * (g[j * n + k] as f64);
                }
                if i == j {
                    s += n as f64;
                }
                m.set(i, j, s as f32);
            }
        }
        m
    }

    #[test]
    fn solve_recovers_rhs() {
        for ctx in [
            ExecContext::sequential(),
            ExecContext::parallel().with_panel(8),
        ] {
            for n in [1usize, 4, 31, 64, 129] {
                let mut m = random_spd(n, n as u64);
                let b = Vector::from_vec((0..n).map(|i| (i as f32 * 0.3).sin() * 2.0).collect());
                let x = m.solve(&ctx, &b).unwrap();
                let mut r = Vector::zeros(n);
                m.mul_vec_into(&ctx, &x, &mut r).unwrap();
                let mut acc = 0.0f64;
                for i in 0..n {
                    acc += ((r[i] - b[i]) as f64).abs();
                }
                assert!(
                    acc / (n as f64) < 1e-5,
                    "n={n}: mean abs residual {}",
                    acc / n as f64
                );
            }
        }
    }

    #[test]
    fn multi_rhs_matches_single() {
        let ctx = ExecContext::sequential();
        let n = 23;
        let mut m = random_spd(n, 5);
        let mut b = Matrix::zeros(n, 3);
        for c in 0..3 {
            for i in 0..n {
                b.set(i, c, ((i * (c + 1)) as f32 * 0.17).cos());
            }
        }
        let x = m.solve_matrix(&ctx, &b).unwrap();
        for c in 0..3 {
            let bc = Vector::from_vec((0..n).map(|i| b.get(i, c)).collect());
            let xc = m.solve(&ctx, &bc).unwrap();
            for i in 0..n {
                assert!((x.get(i, c) - xc[i]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn refinement_does_not_regress() {
        let ctx = ExecContext::sequential();
        let n = 60;
        let mut m = random_spd(n, 11);
        let b = Vector::from_vec((0..n).map(|i| (i as f32).sqrt()).collect());
        let mut ws = SolveScratch::new(n);
        let mut x_direct = Vector::zeros(n);
        solve_into(&ctx, &mut m, &b, &mut x_direct, false, &mut ws).unwrap();
        let mut x_refined = Vector::zeros(n);
        solve_into(&ctx, &mut m, &b, &mut x_refined, true, &mut ws).unwrap();

        let res = |x: &Vector| -> f64 {
            let mut r = Vector::zeros(n);
            m.mul_vec_into(&ctx, x, &mut r).unwrap();
            let mut acc = 0.0f64;
            for i in 0..n {
                let d = (r[i] - b[i]) as f64;
                acc += d * d;
            }
            acc.sqrt()
        };
        assert!(res(&x_refined) <= res(&x_direct) + 1e-9);
    }

    #[test]
    fn nan_rhs_does_not_hang_refinement() {
        let ctx = ExecContext::sequential();
        let mut m = random_spd(8, 3);
        let mut b = Vector::zeros(8);
        b[2] = f32::NAN;
        // Must neither loop forever nor panic; refinement aborts on NaN.
        let _ = m.solve(&ctx, &b).unwrap();
    }
}
