//! Cross-checks of the dense kernels against nalgebra.
//!
//! nalgebra is the oracle: factorizations and solves computed here must
//! match its f64 reference results to working f32 precision, on both
//! execution paths.

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};

use optim_core::linalg::ops;
use optim_core::{ExecContext, Matrix, SpdMatrix, Vector};

fn random_spd(n: usize, seed: u64) -> (SpdMatrix, DMatrix<f64>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let g = DMatrix::<f64>::from_fn(n, n, |_, _| rng.random_range(-1.0..1.0));
    let dense = &g * g.transpose() + DMatrix::<f64>::identity(n, n) * n as f64;
    let mut m = SpdMatrix::zeros(n);
    for i in 0..n {
        for j in 0..=i {
            m.set(i, j, dense[(i, j)] as f32);
        }
    }
    (m, dense)
}

fn random_vector(n: usize, seed: u64) -> (Vector, DVector<f64>) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let v: Vec<f32> = (0..n).map(|_| rng.random_range(-2.0..2.0)).collect();
    let dv = DVector::from_iterator(n, v.iter().map(|&x| x as f64));
    (Vector::from_vec(v), dv)
}

#[test]
fn cholesky_solve_matches_nalgebra() {
    for n in [1usize, 5, 32, 77, 150] {
        let (mut m, dense) = random_spd(n, n as u64);
        let (b, db) = random_vector(n, 1000 + n as u64);
        let reference = dense
            .clone()
            .cholesky()
            .expect("oracle factorization failed")
            .solve(&db);
        for ctx in [ExecContext::sequential(), ExecContext::parallel()] {
            m.invalidate();
            let x = m.solve(&ctx, &b).unwrap();
            for i in 0..n {
                let err = (x[i] as f64 - reference[i]).abs();
                assert!(
                    err < 1e-3 * reference[i].abs().max(1.0),
                    "n={n} i={i}: {} vs {}",
                    x[i],
                    reference[i]
                );
            }
        }
    }
}

#[test]
fn determinant_matches_nalgebra() {
    for n in [2usize, 6, 20] {
        let (mut m, dense) = random_spd(n, 7 * n as u64);
        let reference = dense.determinant();
        let ctx = ExecContext::sequential();
        let det = m.determinant(&ctx).unwrap();
        assert!(
            (det - reference).abs() < 1e-2 * reference.abs(),
            "n={n}: {det} vs {reference}"
        );
    }
}

#[test]
fn mat_vec_matches_nalgebra() {
    let rows = 13;
    let cols = 9;
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.random_range(-1.0..1.0)).collect();
    let m = Matrix::from_vec(rows, cols, data.clone()).unwrap();
    let dm = DMatrix::from_row_iterator(rows, cols, data.iter().map(|&x| x as f64));
    let (v, dv) = random_vector(cols, 43);
    let (u, du) = random_vector(rows, 44);

    for ctx in [ExecContext::sequential(), ExecContext::parallel()] {
        let mut out = Vector::zeros(rows);
        ops::mat_vec(&ctx, &m, &v, 2.0, &mut out).unwrap();
        let reference = &dm * &dv * 2.0;
        for i in 0..rows {
            assert!((out[i] as f64 - reference[i]).abs() < 1e-4);
        }

        let mut out_t = Vector::zeros(cols);
        ops::mat_t_vec(&ctx, &m, &u, 1.0, &mut out_t).unwrap();
        let reference_t = dm.transpose() * &du;
        for j in 0..cols {
            assert!((out_t[j] as f64 - reference_t[j]).abs() < 1e-4);
        }
    }
}

#[test]
fn weighted_gram_matches_nalgebra() {
    let rows = 11;
    let cols = 6;
    let mut rng = rand::rngs::StdRng::seed_from_u64(9);
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.random_range(-1.0..1.0)).collect();
    let a = Matrix::from_vec(rows, cols, data.clone()).unwrap();
    let da = DMatrix::from_row_iterator(rows, cols, data.iter().map(|&x| x as f64));
    let w: Vec<f32> = (0..rows).map(|_| rng.random_range(0.1..2.0)).collect();
    let dw = DMatrix::from_diagonal(&DVector::from_iterator(
        rows,
        w.iter().map(|&x| x as f64),
    ));
    let reference = da.transpose() * dw * &da;

    let wv = Vector::from_vec(w);
    for ctx in [ExecContext::sequential(), ExecContext::parallel()] {
        let mut out = SpdMatrix::zeros(cols);
        ops::weighted_gram(
            &ctx,
            &a,
            &optim_core::Diag::from(&wv),
            &optim_core::Diag::constant(cols, 0.0),
            &mut out,
        )
        .unwrap();
        for i in 0..cols {
            for j in 0..=i {
                assert!(
                    (out.get(i, j) as f64 - reference[(i, j)]).abs() < 1e-4,
                    "({i},{j}): {} vs {}",
                    out.get(i, j),
                    reference[(i, j)]
                );
            }
        }
    }
}

#[test]
fn schur_complement_matches_nalgebra() {
    let c = 3;
    let n = 10;
    let (mut h, dh) = random_spd(n, 21);
    let mut rng = rand::rngs::StdRng::seed_from_u64(22);
    let data: Vec<f32> = (0..c * n).map(|_| rng.random_range(-1.0..1.0)).collect();
    let a = Matrix::from_vec(c, n, data.clone()).unwrap();
    let da = DMatrix::from_row_iterator(c, n, data.iter().map(|&x| x as f64));
    let hinv = dh.clone().try_inverse().expect("oracle inverse failed");
    let reference = &da * hinv * da.transpose();

    for ctx in [ExecContext::sequential(), ExecContext::parallel()] {
        h.invalidate();
        let s = optim_core::linalg::a_hinv_at(&ctx, &a, &mut h).unwrap();
        for i in 0..c {
            for j in 0..=i {
                assert!(
                    (s.get(i, j) as f64 - reference[(i, j)]).abs() < 1e-3,
                    "({i},{j}): {} vs {}",
                    s.get(i, j),
                    reference[(i, j)]
                );
            }
        }
    }
}

#[test]
fn multi_rhs_solve_matches_nalgebra() {
    let n = 24;
    let k = 4;
    let (mut m, dense) = random_spd(n, 31);
    let mut rng = rand::rngs::StdRng::seed_from_u64(32);
    let bdata: Vec<f32> = (0..n * k).map(|_| rng.random_range(-1.0..1.0)).collect();
    let b = Matrix::from_vec(n, k, bdata.clone()).unwrap();
    let db = DMatrix::from_row_iterator(n, k, bdata.iter().map(|&x| x as f64));
    let reference = dense
        .clone()
        .cholesky()
        .expect("oracle factorization failed")
        .solve(&db);

    let ctx = ExecContext::sequential();
    let x = m.solve_matrix(&ctx, &b).unwrap();
    for i in 0..n {
        for j in 0..k {
            assert!(
                (x.get(i, j) as f64 - reference[(i, j)]).abs() < 1e-3,
                "({i},{j})"
            );
        }
    }
}
