//! Dual-path BLAS kernels.
//!
//! Stateless operations over the dense containers. Every function
//! validates operand compatibility and fails fast on a mismatch, then
//! dispatches on the [`ExecContext`] policy. The parallel path mirrors
//! the accelerated backend of the original engine: independent work
//! items dispatched synchronously, with a blocked group reduction for
//! sums. Sequential and parallel results agree to working `f32`
//! precision, not bitwise.

use rayon::prelude::*;

use super::backend::ExecContext;
use super::matrix::Matrix;
use super::spd::{packed_rows_mut, SpdMatrix};
use super::vector::{Diag, Vector};
use super::{check_len, LinalgError};

fn map_slices<F>(ctx: &ExecContext, v: &[f32], out: &mut [f32], f: F)
where
    F: Fn(f32) -> f32 + Sync,
{
    if ctx.is_parallel() {
        out.par_iter_mut()
            .zip(v.par_iter())
            .for_each(|(o, &x)| *o = f(x));
    } else {
        for (o, &x) in out.iter_mut().zip(v.iter()) {
            *o = f(x);
        }
    }
}

fn lin_comb_slices(ctx: &ExecContext, alpha: f32, u: &[f32], beta: f32, v: &[f32], out: &mut [f32]) {
    if ctx.is_parallel() {
        out.par_iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = alpha * u[i] + beta * v[i]);
    } else {
        for (i, o) in out.iter_mut().enumerate() {
            *o = alpha * u[i] + beta * v[i];
        }
    }
}

/// `out = alpha·u + beta·v`, elementwise.
pub fn lin_comb(
    ctx: &ExecContext,
    alpha: f32,
    u: &Vector,
    beta: f32,
    v: &Vector,
    out: &mut Vector,
) -> Result<(), LinalgError> {
    check_len("lin_comb v", u.len(), v.len())?;
    check_len("lin_comb out", u.len(), out.len())?;
    lin_comb_slices(ctx, alpha, u.as_slice(), beta, v.as_slice(), out.as_mut_slice());
    Ok(())
}

/// `out = alpha·U + beta·V` for matrices; same semantics as the vector
/// form over the flat buffers.
pub fn lin_comb_mat(
    ctx: &ExecContext,
    alpha: f32,
    u: &Matrix,
    beta: f32,
    v: &Matrix,
    out: &mut Matrix,
) -> Result<(), LinalgError> {
    check_len("lin_comb_mat rows", u.rows(), v.rows())?;
    check_len("lin_comb_mat cols", u.cols(), v.cols())?;
    check_len("lin_comb_mat out rows", u.rows(), out.rows())?;
    check_len("lin_comb_mat out cols", u.cols(), out.cols())?;
    lin_comb_slices(ctx, alpha, u.as_slice(), beta, v.as_slice(), out.as_mut_slice());
    Ok(())
}

/// `out_i = v_i²`
pub fn elem_square(ctx: &ExecContext, v: &Vector, out: &mut Vector) -> Result<(), LinalgError> {
    check_len("elem_square out", v.len(), out.len())?;
    map_slices(ctx, v.as_slice(), out.as_mut_slice(), |x| x * x);
    Ok(())
}

/// `out_i = 1 / v_i`
pub fn elem_inv(ctx: &ExecContext, v: &Vector, out: &mut Vector) -> Result<(), LinalgError> {
    check_len("elem_inv out", v.len(), out.len())?;
    map_slices(ctx, v.as_slice(), out.as_mut_slice(), |x| 1.0 / x);
    Ok(())
}

/// `out_i = 1 / v_i²`
pub fn elem_inv2(ctx: &ExecContext, v: &Vector, out: &mut Vector) -> Result<(), LinalgError> {
    check_len("elem_inv2 out", v.len(), out.len())?;
    map_slices(ctx, v.as_slice(), out.as_mut_slice(), |x| 1.0 / (x * x));
    Ok(())
}

fn seq_sum(v: &[f32]) -> f32 {
    let mut acc = 0.0f64;
    for &x in v {
        acc += x as f64;
    }
    acc as f32
}

/// Fold a slice onto its first element. Handles any length.
fn tree_reduce(chunk: &mut [f32]) {
    let mut m = chunk.len();
    while m > 1 {
        let half = m / 2;
        for i in 0..half {
            chunk[i] += chunk[m - half + i];
        }
        m -= half;
    }
}

/// Blocked group reduction over `s`, destructive.
///
/// The element count splits into whole work groups plus a remainder;
/// the remainder folds into the front of the buffer first, then each
/// group tree-reduces in parallel and the per-group partials are summed
/// serially.
fn par_sum_in_place(s: &mut [f32], work_group: usize) -> f32 {
    let len = s.len();
    let wg = work_group.max(2);
    let groups = len / wg;
    if groups == 0 {
        return seq_sum(s);
    }
    let rem = len - groups * wg;
    for i in 0..rem {
        s[i] += s[groups * wg + i];
    }
    let active = &mut s[..groups * wg];
    active.par_chunks_mut(wg).for_each(tree_reduce);
    let mut total = 0.0f32;
    for g in 0..groups {
        total += s[g * wg];
    }
    total
}

/// Reduction of `v`. Sequential path: straight double-accumulated sum.
/// Parallel path: blocked group reduction through `scratch`.
pub fn sum(ctx: &ExecContext, v: &Vector, scratch: &mut Vector) -> Result<f32, LinalgError> {
    if !ctx.is_parallel() {
        return Ok(seq_sum(v.as_slice()));
    }
    if scratch.len() < v.len() {
        return Err(LinalgError::DimensionMismatch {
            context: "sum scratch",
            expected: v.len(),
            found: scratch.len(),
        });
    }
    let s = &mut scratch.as_mut_slice()[..v.len()];
    s.copy_from_slice(v.as_slice());
    Ok(par_sum_in_place(s, ctx.work_group))
}

/// Dot product: elementwise product into `scratch`, then [`sum`].
pub fn dot(
    ctx: &ExecContext,
    u: &Vector,
    v: &Vector,
    scratch: &mut Vector,
) -> Result<f32, LinalgError> {
    check_len("dot v", u.len(), v.len())?;
    if scratch.len() < u.len() {
        return Err(LinalgError::DimensionMismatch {
            context: "dot scratch",
            expected: u.len(),
            found: scratch.len(),
        });
    }
    let us = u.as_slice();
    let vs = v.as_slice();
    let s = &mut scratch.as_mut_slice()[..u.len()];
    if ctx.is_parallel() {
        s.par_iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = us[i] * vs[i]);
        Ok(par_sum_in_place(s, ctx.work_group))
    } else {
        let mut acc = 0.0f64;
        for i in 0..us.len() {
            acc += (us[i] as f64) * (vs[i] as f64);
        }
        Ok(acc as f32)
    }
}

/// Two-norm, accumulated in `f64`.
pub fn norm2(ctx: &ExecContext, v: &Vector, scratch: &mut Vector) -> Result<f64, LinalgError> {
    let d = dot(ctx, v, v, scratch)? as f64;
    Ok(d.max(0.0).sqrt())
}

/// `out = alpha·M·v`
pub fn mat_vec(
    ctx: &ExecContext,
    m: &Matrix,
    v: &Vector,
    alpha: f32,
    out: &mut Vector,
) -> Result<(), LinalgError> {
    check_len("mat_vec v", m.cols(), v.len())?;
    check_len("mat_vec out", m.rows(), out.len())?;
    let vs = v.as_slice();
    let kernel = |i: usize| -> f32 {
        let row = m.row(i);
        let mut acc = 0.0f64;
        for (a, b) in row.iter().zip(vs.iter()) {
            acc += (*a as f64) * (*b as f64);
        }
        (alpha as f64 * acc) as f32
    };
    if ctx.is_parallel() {
        out.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = kernel(i));
    } else {
        for (i, o) in out.as_mut_slice().iter_mut().enumerate() {
            *o = kernel(i);
        }
    }
    Ok(())
}

/// `out = alpha·M·v + beta·u`
pub fn mat_vec_add(
    ctx: &ExecContext,
    m: &Matrix,
    v: &Vector,
    alpha: f32,
    u: &Vector,
    beta: f32,
    out: &mut Vector,
) -> Result<(), LinalgError> {
    check_len("mat_vec_add v", m.cols(), v.len())?;
    check_len("mat_vec_add u", m.rows(), u.len())?;
    check_len("mat_vec_add out", m.rows(), out.len())?;
    let vs = v.as_slice();
    let us = u.as_slice();
    let kernel = |i: usize| -> f32 {
        let row = m.row(i);
        let mut acc = 0.0f64;
        for (a, b) in row.iter().zip(vs.iter()) {
            acc += (*a as f64) * (*b as f64);
        }
        (alpha as f64 * acc + beta as f64 * us[i] as f64) as f32
    };
    if ctx.is_parallel() {
        out.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = kernel(i));
    } else {
        for (i, o) in out.as_mut_slice().iter_mut().enumerate() {
            *o = kernel(i);
        }
    }
    Ok(())
}

/// `out = alpha·Aᵗ·v`
pub fn mat_t_vec(
    ctx: &ExecContext,
    a: &Matrix,
    v: &Vector,
    alpha: f32,
    out: &mut Vector,
) -> Result<(), LinalgError> {
    check_len("mat_t_vec v", a.rows(), v.len())?;
    check_len("mat_t_vec out", a.cols(), out.len())?;
    let cols = a.cols();
    let data = a.as_slice();
    let vs = v.as_slice();
    let kernel = |j: usize| -> f32 {
        let mut acc = 0.0f64;
        for (i, &vi) in vs.iter().enumerate() {
            acc += (data[i * cols + j] as f64) * (vi as f64);
        }
        (alpha as f64 * acc) as f32
    };
    if ctx.is_parallel() {
        out.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(j, o)| *o = kernel(j));
    } else {
        for (j, o) in out.as_mut_slice().iter_mut().enumerate() {
            *o = kernel(j);
        }
    }
    Ok(())
}

/// `out = alpha·Aᵗ·W·b` with diagonal weights `W`.
pub fn mat_t_weighted_vec(
    ctx: &ExecContext,
    a: &Matrix,
    w: &Diag<'_>,
    b: &Vector,
    alpha: f32,
    out: &mut Vector,
) -> Result<(), LinalgError> {
    check_len("mat_t_weighted_vec w", a.rows(), w.len())?;
    check_len("mat_t_weighted_vec b", a.rows(), b.len())?;
    check_len("mat_t_weighted_vec out", a.cols(), out.len())?;
    let cols = a.cols();
    let data = a.as_slice();
    let ws = w.as_slice();
    let bs = b.as_slice();
    let kernel = |j: usize| -> f32 {
        let mut acc = 0.0f64;
        for i in 0..bs.len() {
            acc += (data[i * cols + j] as f64) * (ws[i] as f64) * (bs[i] as f64);
        }
        (alpha as f64 * acc) as f32
    };
    if ctx.is_parallel() {
        out.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(j, o)| *o = kernel(j));
    } else {
        for (j, o) in out.as_mut_slice().iter_mut().enumerate() {
            *o = kernel(j);
        }
    }
    Ok(())
}

/// Weighted normal equations `out = AᵗWA + diag(λ)`.
///
/// The regularization diagonal is always added; pass zeros to skip it.
pub fn weighted_gram(
    ctx: &ExecContext,
    a: &Matrix,
    w: &Diag<'_>,
    lambda: &Diag<'_>,
    out: &mut SpdMatrix,
) -> Result<(), LinalgError> {
    check_len("weighted_gram w", a.rows(), w.len())?;
    check_len("weighted_gram lambda", a.cols(), lambda.len())?;
    check_len("weighted_gram out", a.cols(), out.n())?;
    let k = a.cols();
    let rows = a.rows();
    let data = a.as_slice();
    let ws = w.as_slice();
    let ls = lambda.as_slice();
    let entry = |i: usize, j: usize| -> f32 {
        let mut acc = 0.0f64;
        for r in 0..rows {
            acc += (data[r * k + i] as f64) * (ws[r] as f64) * (data[r * k + j] as f64);
        }
        if i == j {
            acc += ls[i] as f64;
        }
        acc as f32
    };
    let packed = out.packed_mut();
    if ctx.is_parallel() {
        let mut out_rows = packed_rows_mut(packed, k);
        out_rows.par_iter_mut().enumerate().for_each(|(i, row)| {
            for (j, o) in row.iter_mut().enumerate() {
                *o = entry(i, j);
            }
        });
    } else {
        let mut idx = 0;
        for i in 0..k {
            for j in 0..=i {
                packed[idx] = entry(i, j);
                idx += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn both() -> [ExecContext; 2] {
        [ExecContext::sequential(), ExecContext::parallel()]
    }

    #[test]
    fn sum_matches_reference_across_counts() {
        // Counts straddling work-group multiples, plus the full range cap.
        let mut counts: Vec<usize> = (0..=300).collect();
        counts.extend((301..=10000).step_by(257));
        counts.push(10000);
        for n in counts {
            let v = Vector::from_vec((0..n).map(|i| ((i % 97) as f32) * 0.25 - 6.0).collect());
            let reference: f64 = v.iter().map(|x| x as f64).sum();
            let mut scratch = Vector::zeros(n.max(1));
            for ctx in both() {
                let s = sum(&ctx, &v, &mut scratch).unwrap() as f64;
                assert!(
                    (s - reference).abs() <= 1e-3 * reference.abs().max(1.0),
                    "n={n}: {s} vs {reference}"
                );
            }
        }
    }

    #[test]
    fn sum_of_empty_is_zero() {
        let v = Vector::zeros(0);
        let mut scratch = Vector::zeros(1);
        for ctx in both() {
            assert_eq!(sum(&ctx, &v, &mut scratch).unwrap(), 0.0);
        }
    }

    #[test]
    fn lin_comb_both_paths() {
        let u = Vector::from_slice(&[1.0, 2.0, 3.0]);
        let v = Vector::from_slice(&[4.0, 5.0, 6.0]);
        for ctx in both() {
            let mut out = Vector::zeros(3);
            lin_comb(&ctx, 2.0, &u, -1.0, &v, &mut out).unwrap();
            assert_eq!(out.as_slice(), &[-2.0, -1.0, 0.0]);
        }
    }

    #[test]
    fn lin_comb_rejects_mismatch() {
        let u = Vector::zeros(3);
        let v = Vector::zeros(4);
        let mut out = Vector::zeros(3);
        assert!(lin_comb(&ExecContext::sequential(), 1.0, &u, 1.0, &v, &mut out).is_err());
    }

    #[test]
    fn dot_agrees_across_paths() {
        let n = 513;
        let u = Vector::from_vec((0..n).map(|i| (i as f32 * 0.37).sin()).collect());
        let v = Vector::from_vec((0..n).map(|i| (i as f32 * 0.11).cos()).collect());
        let mut scratch = Vector::zeros(n);
        let a = dot(&ExecContext::sequential(), &u, &v, &mut scratch).unwrap();
        let b = dot(&ExecContext::parallel(), &u, &v, &mut scratch).unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-4, epsilon = 1e-5);
    }

    #[test]
    fn elementwise_kernels() {
        let v = Vector::from_slice(&[1.0, 2.0, 4.0]);
        let mut out = Vector::zeros(3);
        let ctx = ExecContext::sequential();
        elem_square(&ctx, &v, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 4.0, 16.0]);
        elem_inv(&ctx, &v, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 0.5, 0.25]);
        elem_inv2(&ctx, &v, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 0.25, 0.0625]);
    }

    #[test]
    fn mat_vec_and_transpose() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let v = Vector::from_slice(&[1.0, 1.0, 1.0]);
        let u = Vector::from_slice(&[1.0, 2.0]);
        for ctx in both() {
            let mut out = Vector::zeros(2);
            mat_vec(&ctx, &m, &v, 1.0, &mut out).unwrap();
            assert_eq!(out.as_slice(), &[6.0, 15.0]);

            let mut out2 = Vector::zeros(2);
            mat_vec_add(&ctx, &m, &v, 1.0, &u, -1.0, &mut out2).unwrap();
            assert_eq!(out2.as_slice(), &[5.0, 13.0]);

            let mut out3 = Vector::zeros(3);
            mat_t_vec(&ctx, &m, &u, 1.0, &mut out3).unwrap();
            assert_eq!(out3.as_slice(), &[9.0, 12.0, 15.0]);
        }
    }

    #[test]
    fn transpose_weighted_product() {
        // Aᵗ·W·b with A = [[1, 2], [3, 4]], W = diag(2, 1), b = (1, 1)
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let w = Diag::Owned(Vector::from_slice(&[2.0, 1.0]));
        let b = Vector::from_slice(&[1.0, 1.0]);
        for ctx in both() {
            let mut out = Vector::zeros(2);
            mat_t_weighted_vec(&ctx, &a, &w, &b, 1.0, &mut out).unwrap();
            assert_eq!(out.as_slice(), &[5.0, 8.0]);
        }
    }

    #[test]
    fn weighted_gram_with_regularization() {
        // A = [[1, 2], [3, 4]], W = diag(2, 1), λ = diag(0.5, 0.5)
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let w = Diag::Owned(Vector::from_slice(&[2.0, 1.0]));
        let lam = Diag::constant(2, 0.5);
        for ctx in both() {
            let mut out = SpdMatrix::zeros(2);
            weighted_gram(&ctx, &a, &w, &lam, &mut out).unwrap();
            // AᵗWA = [[11, 16], [16, 24]]
            assert_relative_eq!(out.get(0, 0), 11.5);
            assert_relative_eq!(out.get(1, 0), 16.0);
            assert_relative_eq!(out.get(1, 1), 24.5);
        }
    }
}
