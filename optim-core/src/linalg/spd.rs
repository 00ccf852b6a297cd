//! Packed symmetric positive-definite matrix with a cached Cholesky
//! factor.
//!
//! Storage is the lower triangle only, row-major packed, length
//! n(n+1)/2. Element access canonicalizes `(i, j)` to `i >= j`. Any
//! mutation invalidates the cached factor; factorization is lazy and a
//! no-op while the cache is valid.

use rayon::prelude::*;
use thiserror::Error;

use super::backend::ExecContext;
use super::vector::Vector;
use super::{check_len, LinalgError};

/// Packed row-major index of `(i, j)` with `i >= j`.
#[inline]
pub(crate) fn pidx(i: usize, j: usize) -> usize {
    i * (i + 1) / 2 + j
}

/// Split packed lower-triangular storage into disjoint per-row slices.
///
/// Row `i` has length `i + 1`.
pub(crate) fn packed_rows_mut(packed: &mut [f32], n: usize) -> Vec<&mut [f32]> {
    let mut rows = Vec::with_capacity(n);
    let mut rest = packed;
    for i in 0..n {
        let (head, tail) = rest.split_at_mut(i + 1);
        rows.push(head);
        rest = tail;
    }
    rows
}

/// Cholesky factorization failure, detected at the offending pivot.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum CholeskyError {
    /// A pivot came out non-positive: the matrix is not positive
    /// definite.
    #[error("matrix is not positive definite: pivot {pivot:.3e} at row {row}")]
    NotPositiveDefinite { row: usize, pivot: f64 },

    /// A pivot fell below the relative floor: the factor would be
    /// numerically meaningless.
    #[error("matrix is ill-conditioned: pivot {pivot:.3e} at row {row}")]
    IllConditioned { row: usize, pivot: f64 },
}

/// Symmetric positive-definite matrix, packed lower triangle.
#[derive(Debug, Clone)]
pub struct SpdMatrix {
    n: usize,
    data: Vec<f32>,
    factor: Vec<f32>,
    factorized: bool,
}

impl SpdMatrix {
    pub fn zeros(n: usize) -> Self {
        let len = n * (n + 1) / 2;
        Self {
            n,
            data: vec![0.0; len],
            factor: vec![0.0; len],
            factorized: false,
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m.data[pidx(i, i)] = 1.0;
        }
        m
    }

    /// Build from a full row-major n×n buffer; only the lower triangle
    /// is read.
    pub fn from_dense(n: usize, dense: &[f32]) -> Result<Self, LinalgError> {
        check_len("SpdMatrix::from_dense", n * n, dense.len())?;
        let mut m = Self::zeros(n);
        for i in 0..n {
            for j in 0..=i {
                m.data[pidx(i, j)] = dense[i * n + j];
            }
        }
        Ok(m)
    }

    /// Build from packed lower-triangular storage of length n(n+1)/2.
    pub fn from_packed(n: usize, packed: Vec<f32>) -> Result<Self, LinalgError> {
        check_len("SpdMatrix::from_packed", n * (n + 1) / 2, packed.len())?;
        let factor = vec![0.0; packed.len()];
        Ok(Self {
            n,
            data: packed,
            factor,
            factorized: false,
        })
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        let (r, c) = if i >= j { (i, j) } else { (j, i) };
        self.data[pidx(r, c)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: f32) {
        let (r, c) = if i >= j { (i, j) } else { (j, i) };
        self.data[pidx(r, c)] = v;
        self.factorized = false;
    }

    #[inline]
    pub fn packed(&self) -> &[f32] {
        &self.data
    }

    /// Mutable packed storage; clears the cached factor.
    #[inline]
    pub fn packed_mut(&mut self) -> &mut [f32] {
        self.factorized = false;
        &mut self.data
    }

    /// Drop the cached factor.
    pub fn invalidate(&mut self) {
        self.factorized = false;
    }

    #[inline]
    pub fn is_factorized(&self) -> bool {
        self.factorized
    }

    /// Packed Cholesky factor, if currently cached.
    pub fn factor_packed(&self) -> Option<&[f32]> {
        self.factorized.then_some(self.factor.as_slice())
    }

    #[inline]
    pub(crate) fn factor_unchecked(&self) -> &[f32] {
        debug_assert!(self.factorized);
        &self.factor
    }

    /// `self += alpha * other`, elementwise over the packed triangles.
    pub fn add_scaled(&mut self, alpha: f32, other: &SpdMatrix) -> Result<(), LinalgError> {
        check_len("SpdMatrix::add_scaled", self.n, other.n)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += alpha * b;
        }
        self.factorized = false;
        Ok(())
    }

    /// Compute the in-place Cholesky factor `L` with `L·Lᵗ = M`.
    ///
    /// No-op while a cached factor is valid. The sequential path is the
    /// naive O(n³) elimination; the parallel path is blocked into
    /// `ctx.panel`-wide panels purely to expose independent work — the
    /// two agree to working precision. Every pivot is sign-checked
    /// before its square root is taken.
    pub fn factorize(&mut self, ctx: &ExecContext) -> Result<(), CholeskyError> {
        if self.factorized {
            return Ok(());
        }
        self.factor.copy_from_slice(&self.data);
        if self.n > 0 {
            let scale = (0..self.n)
                .map(|i| (self.data[pidx(i, i)] as f64).abs())
                .fold(f64::MIN_POSITIVE, f64::max);
            let floor = scale * 1e-10;
            if ctx.is_parallel() {
                cholesky_blocked(&mut self.factor, self.n, ctx.panel, floor)?;
            } else {
                cholesky_naive(&mut self.factor, self.n, floor)?;
            }
        }
        self.factorized = true;
        Ok(())
    }

    /// Symmetric matrix-vector product `out = M·x`.
    pub fn mul_vec_into(
        &self,
        ctx: &ExecContext,
        x: &Vector,
        out: &mut Vector,
    ) -> Result<(), LinalgError> {
        check_len("SpdMatrix::mul_vec x", self.n, x.len())?;
        check_len("SpdMatrix::mul_vec out", self.n, out.len())?;
        let n = self.n;
        let data = &self.data;
        let xs = x.as_slice();
        let kernel = |i: usize| -> f32 {
            let row = pidx(i, 0);
            let mut acc = 0.0f64;
            for j in 0..=i {
                acc += (data[row + j] as f64) * (xs[j] as f64);
            }
            for j in (i + 1)..n {
                acc += (data[pidx(j, i)] as f64) * (xs[j] as f64);
            }
            acc as f32
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

    /// Determinant through the factor: `(∏ diag(L))²`.
    pub fn determinant(&mut self, ctx: &ExecContext) -> Result<f64, CholeskyError> {
        self.factorize(ctx)?;
        let mut p = 1.0f64;
        for i in 0..self.n {
            p *= self.factor[pidx(i, i)] as f64;
        }
        Ok(p * p)
    }
}

fn cholesky_naive(l: &mut [f32], n: usize, floor: f64) -> Result<(), CholeskyError> {
    for j in 0..n {
        let jrow = pidx(j, 0);
        let mut d = l[jrow + j] as f64;
        for k in 0..j {
            let v = l[jrow + k] as f64;
            d -= v * v;
        }
        if d <= 0.0 {
            return Err(CholeskyError::NotPositiveDefinite { row: j, pivot: d });
        }
        if d < floor {
            return Err(CholeskyError::IllConditioned { row: j, pivot: d });
        }
        let ljj = d.sqrt();
        l[jrow + j] = ljj as f32;
        for i in (j + 1)..n {
            let irow = pidx(i, 0);
            let mut s = l[irow + j] as f64;
            for k in 0..j {
                s -= (l[irow + k] as f64) * (l[jrow + k] as f64);
            }
            l[irow + j] = (s / ljj) as f32;
        }
    }
    Ok(())
}

/// Blocked right-looking Cholesky: factor the diagonal block, invert
/// it, propagate into the trailing row-block, rank-update the trailing
/// submatrix. Row updates within one step are independent and run as
/// parallel work items.
fn cholesky_blocked(
    l: &mut [f32],
    n: usize,
    panel: usize,
    floor: f64,
) -> Result<(), CholeskyError> {
    let nb = panel.max(1);
    let mut inv = vec![0.0f32; nb * nb];
    let mut strip = vec![0.0f32; n * nb];

    let mut k0 = 0;
    while k0 < n {
        let kb = nb.min(n - k0);
        factor_diag_block(l, k0, kb, floor)?;
        let first = k0 + kb;
        if first >= n {
            break;
        }
        invert_lower_block(l, k0, kb, &mut inv);

        // L21 = A21 · L11⁻ᵗ, in place per row. Descending column order:
        // entry c only reads columns <= c, which are still original.
        {
            let inv = &inv;
            let mut rows = packed_rows_mut(l, n);
            rows[first..].par_iter_mut().for_each(|row| {
                for c in (0..kb).rev() {
                    let mut s = 0.0f64;
                    for t in 0..=c {
                        s += (row[k0 + t] as f64) * (inv[c * kb + t] as f64);
                    }
                    row[k0 + c] = s as f32;
                }
            });
        }

        // Snapshot the panel so the rank update can read row j while
        // row i is being written.
        for i in first..n {
            let base = pidx(i, k0);
            let dst = (i - first) * kb;
            strip[dst..dst + kb].copy_from_slice(&l[base..base + kb]);
        }

        // A22 -= L21 · L21ᵗ
        {
            let strip = &strip;
            let mut rows = packed_rows_mut(l, n);
            rows[first..]
                .par_iter_mut()
                .enumerate()
                .for_each(|(ri, row)| {
                    let i = first + ri;
                    let pi = &strip[ri * kb..ri * kb + kb];
                    for j in first..=i {
                        let pj = &strip[(j - first) * kb..(j - first) * kb + kb];
                        let mut s = 0.0f64;
                        for t in 0..kb {
                            s += (pi[t] as f64) * (pj[t] as f64);
                        }
                        row[j] = (row[j] as f64 - s) as f32;
                    }
                });
        }

        k0 += kb;
    }
    Ok(())
}

fn factor_diag_block(
    l: &mut [f32],
    k0: usize,
    kb: usize,
    floor: f64,
) -> Result<(), CholeskyError> {
    for c in 0..kb {
        let j = k0 + c;
        let jrow = pidx(j, 0);
        let mut d = l[jrow + j] as f64;
        for t in 0..c {
            let v = l[jrow + k0 + t] as f64;
            d -= v * v;
        }
        if d <= 0.0 {
            return Err(CholeskyError::NotPositiveDefinite { row: j, pivot: d });
        }
        if d < floor {
            return Err(CholeskyError::IllConditioned { row: j, pivot: d });
        }
        let ljj = d.sqrt();
        l[jrow + j] = ljj as f32;
        for r in (c + 1)..kb {
            let i = k0 + r;
            let irow = pidx(i, 0);
            let mut s = l[irow + j] as f64;
            for t in 0..c {
                s -= (l[irow + k0 + t] as f64) * (l[jrow + k0 + t] as f64);
            }
            l[irow + j] = (s / ljj) as f32;
        }
    }
    Ok(())
}

/// `inv = L11⁻¹` for the kb×kb diagonal block at `k0`, row-major into
/// `inv[c*kb + t]` (lower triangular).
fn invert_lower_block(l: &[f32], k0: usize, kb: usize, inv: &mut [f32]) {
    inv[..kb * kb].fill(0.0);
    for c in 0..kb {
        let jc = k0 + c;
        let d = l[pidx(jc, jc)] as f64;
        inv[c * kb + c] = (1.0 / d) as f32;
        for t in 0..c {
            let mut s = 0.0f64;
            for k in t..c {
                s += (l[pidx(jc, k0 + k)] as f64) * (inv[k * kb + t] as f64);
            }
            inv[c * kb + t] = (-s / d) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(l: &[f32], n: usize) -> Vec<f64> {
        // (L·Lᵗ)[i][j] = Σ_k L[i][k]·L[j][k], packed lower triangle
        let mut out = vec![0.0f64; n * (n + 1) / 2];
        for i in 0..n {
            for j in 0..=i {
                let mut s = 0.0f64;
                for k in 0..=j {
                    s += (l[pidx(i, k)] as f64) * (l[pidx(j, k)] as f64);
                }
                out[pidx(i, j)] = s;
            }
        }
        out
    }

    fn random_spd(n: usize, seed: u64) -> SpdMatrix {
        use rand::{Rng, SeedableRng};
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
    fn factor_reconstructs_matrix() {
        let ctx = ExecContext::sequential();
        for n in [1usize, 3, 17, 64, 130] {
            let mut m = random_spd(n, 7 + n as u64);
            m.factorize(&ctx).unwrap();
            let rec = reconstruct(m.factor_packed().unwrap(), n);
            let mut err = 0.0f64;
            let mut norm = 0.0f64;
            for (r, orig) in rec.iter().zip(m.packed().iter()) {
                err += (r - *orig as f64).abs();
                norm += (*orig as f64).abs();
            }
            assert!(err / norm < 5e-5, "n={n}: relative error {}", err / norm);
        }
    }

    #[test]
    fn blocked_matches_naive() {
        let seq = ExecContext::sequential();
        let par = ExecContext::parallel().with_panel(8);
        for n in [5usize, 8, 19, 33, 96] {
            let mut a = random_spd(n, 100 + n as u64);
            let mut b = a.clone();
            a.factorize(&seq).unwrap();
            b.factorize(&par).unwrap();
            let la = a.factor_packed().unwrap();
            let lb = b.factor_packed().unwrap();
            for (x, y) in la.iter().zip(lb.iter()) {
                let denom = x.abs().max(1.0);
                assert!(
                    (x - y).abs() / denom < 1e-4,
                    "n={n}: {x} vs {y}"
                );
            }
        }
    }

    #[test]
    fn non_positive_definite_is_tagged() {
        // [[1, 2], [2, 1]] has a negative second pivot
        let mut m = SpdMatrix::from_dense(2, &[1.0, 2.0, 2.0, 1.0]).unwrap();
        match m.factorize(&ExecContext::sequential()) {
            Err(CholeskyError::NotPositiveDefinite { row: 1, .. }) => {}
            other => panic!("expected NotPositiveDefinite at row 1, got {other:?}"),
        }
        assert!(!m.is_factorized());
    }

    #[test]
    fn mutation_invalidates_factor() {
        let ctx = ExecContext::sequential();
        let mut m = SpdMatrix::identity(4);
        m.factorize(&ctx).unwrap();
        assert!(m.is_factorized());
        m.set(2, 1, 0.25);
        assert!(!m.is_factorized());
    }

    #[test]
    fn identity_determinant_is_one() {
        let ctx = ExecContext::sequential();
        let par = ExecContext::parallel();
        for n in [1usize, 2, 7, 33, 128] {
            assert!((SpdMatrix::identity(n).determinant(&ctx).unwrap() - 1.0).abs() < 1e-9);
            assert!((SpdMatrix::identity(n).determinant(&par).unwrap() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn access_is_canonicalized() {
        let mut m = SpdMatrix::zeros(3);
        m.set(0, 2, 5.0);
        assert_eq!(m.get(2, 0), 5.0);
        assert_eq!(m.get(0, 2), 5.0);
    }
}
