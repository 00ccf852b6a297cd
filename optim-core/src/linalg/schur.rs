//! Schur-complement primitive `A·H⁻¹·Aᵗ`.
//!
//! Solves `H·X = Aᵗ` column-block-wise through the SPD solver, then
//! forms `A·X`. This is how equality-constraint multipliers are
//! eliminated from the KKT system: the reduced c×c system is SPD again
//! and goes back through the same Cholesky machinery.

use rayon::prelude::*;

use super::backend::ExecContext;
use super::matrix::Matrix;
use super::solve::{solve_into, SolveScratch};
use super::spd::{packed_rows_mut, SpdMatrix};
use super::vector::Vector;
use super::{check_len, LinalgError};

/// Scratch for one `A·H⁻¹·Aᵗ` evaluation, reused across iterations.
#[derive(Debug)]
pub struct SchurWorkspace {
    /// Row i holds `H⁻¹·aᵢ` (the solve against the i-th row of A).
    x: Matrix,
    rhs: Vector,
    sol: Vector,
    solve: SolveScratch,
}

impl SchurWorkspace {
    /// `c` equality rows, `n` variables.
    pub fn new(c: usize, n: usize) -> Self {
        Self {
            x: Matrix::zeros(c, n),
            rhs: Vector::zeros(n),
            sol: Vector::zeros(n),
            solve: SolveScratch::new(n),
        }
    }
}

/// `out = A·H⁻¹·Aᵗ`, factorizing `H` lazily.
pub fn a_hinv_at_into(
    ctx: &ExecContext,
    a: &Matrix,
    h: &mut SpdMatrix,
    refine: bool,
    ws: &mut SchurWorkspace,
    out: &mut SpdMatrix,
) -> Result<(), LinalgError> {
    let c = a.rows();
    let n = a.cols();
    check_len("a_hinv_at h", n, h.n())?;
    check_len("a_hinv_at out", c, out.n())?;
    check_len("a_hinv_at ws rows", c, ws.x.rows())?;
    check_len("a_hinv_at ws cols", n, ws.x.cols())?;

    h.factorize(ctx)?;
    // columns of Aᵗ are rows of A: no transpose pass needed
    for i in 0..c {
        ws.rhs.as_mut_slice().copy_from_slice(a.row(i));
        solve_into(ctx, h, &ws.rhs, &mut ws.sol, refine, &mut ws.solve)?;
        ws.x.row_mut(i).copy_from_slice(ws.sol.as_slice());
    }

    // out[i][j] = aᵢ · xⱼ, lower triangle
    let xm = &ws.x;
    let packed = out.packed_mut();
    let entry = |i: usize, j: usize| -> f32 {
        let ai = a.row(i);
        let xj = xm.row(j);
        let mut acc = 0.0f64;
        for (p, q) in ai.iter().zip(xj.iter()) {
            acc += (*p as f64) * (*q as f64);
        }
        acc as f32
    };
    if ctx.is_parallel() {
        let mut rows = packed_rows_mut(packed, c);
        rows.par_iter_mut().enumerate().for_each(|(i, row)| {
            for (j, o) in row.iter_mut().enumerate() {
                *o = entry(i, j);
            }
        });
    } else {
        let mut idx = 0;
        for i in 0..c {
            for j in 0..=i {
                packed[idx] = entry(i, j);
                idx += 1;
            }
        }
    }
    Ok(())
}

/// Convenience form allocating its own workspace and output.
pub fn a_hinv_at(
    ctx: &ExecContext,
    a: &Matrix,
    h: &mut SpdMatrix,
) -> Result<SpdMatrix, LinalgError> {
    let mut ws = SchurWorkspace::new(a.rows(), a.cols());
    let mut out = SpdMatrix::zeros(a.rows());
    a_hinv_at_into(ctx, a, h, true, &mut ws, &mut out)?;
    Ok(out)
}
