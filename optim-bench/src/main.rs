//! Benchmarking CLI for the optim solver.
//!
//! Two suites: `chol` times the Cholesky/solve path on random SPD
//! systems, `qp` times full interior-point solves on generated box QPs.
//! Both run every case on the sequential and the parallel execution
//! path and report the speedup.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use optim_core::{solve, ExecContext, Matrix, QpProblem, QpSettings, QpStatus, SpdMatrix, Vector};

#[derive(Parser)]
#[command(name = "optim-bench", about = "Benchmarks for the optim solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Time factorization and solve on random SPD systems.
    Chol {
        /// Problem sizes to run.
        #[arg(long, value_delimiter = ',', default_values_t = vec![64, 256, 512, 1024])]
        sizes: Vec<usize>,

        /// Repetitions per size.
        #[arg(long, default_value_t = 5)]
        reps: usize,
    },

    /// Time full QP solves on generated box-constrained problems.
    Qp {
        /// Variable counts to run.
        #[arg(long, value_delimiter = ',', default_values_t = vec![10, 50, 150])]
        sizes: Vec<usize>,

        /// RNG seed for problem generation.
        #[arg(long, default_value_t = 12345)]
        seed: u64,
    },
}

/// Simple LCG random number generator; benchmarks must not depend on
/// an RNG crate version for reproducibility.
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_f32(&mut self) -> f32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        ((self.state >> 33) as f32) / (u32::MAX as f32)
    }

    /// Uniform in [-1, 1].
    fn next_signed(&mut self) -> f32 {
        2.0 * self.next_f32() - 1.0
    }
}

/// Random SPD matrix `G·Gᵗ + n·I`.
fn random_spd(n: usize, rng: &mut Lcg) -> SpdMatrix {
    let g: Vec<f32> = (0..n * n).map(|_| rng.next_signed()).collect();
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

/// Box QP: strictly convex quadratic over -1 <= x <= 1, with a linear
/// term strong enough to push several coordinates onto the boundary.
fn generate_box_qp(n: usize, rng: &mut Lcg) -> QpProblem {
    let mut p = SpdMatrix::zeros(n);
    for i in 0..n {
        for j in 0..=i {
            let v = if i == j {
                2.0 + rng.next_f32()
            } else {
                0.5 * rng.next_signed() / n as f32
            };
            p.set(i, j, v);
        }
    }
    let q = Vector::from_vec((0..n).map(|_| 4.0 * rng.next_signed()).collect());

    let mut m = Matrix::zeros(2 * n, n);
    for i in 0..n {
        m.set(i, i, 1.0);
        m.set(n + i, i, -1.0);
    }
    let d = Vector::from_vec(vec![1.0; 2 * n]);

    QpProblem {
        p,
        q,
        m,
        d,
        a: None,
        b: None,
    }
}

fn bench_chol(sizes: &[usize], reps: usize) -> Result<()> {
    println!("{:>6} {:>6} {:>14} {:>14} {:>9}", "n", "reps", "seq (ms)", "par (ms)", "speedup");
    let seq = ExecContext::sequential();
    let par = ExecContext::parallel();
    for &n in sizes {
        let mut rng = Lcg::new(n as u64 + 1);
        let base = random_spd(n, &mut rng);
        let b = Vector::from_vec((0..n).map(|_| rng.next_signed()).collect());

        let mut time_path = |ctx: &ExecContext| -> Result<f64> {
            let start = Instant::now();
            for _ in 0..reps {
                let mut m = base.clone();
                m.solve(ctx, &b)
                    .with_context(|| format!("solve failed at n={n}"))?;
            }
            Ok(start.elapsed().as_secs_f64() * 1000.0 / reps as f64)
        };

        let t_seq = time_path(&seq)?;
        let t_par = time_path(&par)?;
        println!(
            "{n:>6} {reps:>6} {t_seq:>14.3} {t_par:>14.3} {:>8.2}x",
            t_seq / t_par
        );
    }
    Ok(())
}

fn bench_qp(sizes: &[usize], seed: u64) -> Result<()> {
    let settings = QpSettings::default();
    println!(
        "{:>6} {:>12} {:>8} {:>8} {:>14} {:>14}",
        "n", "status", "iters", "phase1", "seq (ms)", "par (ms)"
    );
    for &n in sizes {
        let mut rng = Lcg::new(seed.wrapping_add(n as u64));
        let prob = generate_box_qp(n, &mut rng);
        let x0 = Vector::zeros(n);

        let run = |ctx: &ExecContext| -> Result<(QpStatus, usize, usize, f64)> {
            let start = Instant::now();
            let result =
                solve(&prob, &x0, &settings, ctx).with_context(|| format!("QP failed at n={n}"))?;
            let ms = start.elapsed().as_secs_f64() * 1000.0;
            Ok((
                result.status,
                result.info.iters,
                result.info.feasibility_iters,
                ms,
            ))
        };

        let (status, iters, phase1, t_seq) = run(&ExecContext::sequential())?;
        let (_, _, _, t_par) = run(&ExecContext::parallel())?;
        println!(
            "{n:>6} {:>12} {iters:>8} {phase1:>8} {t_seq:>14.3} {t_par:>14.3}",
            status.to_string()
        );
        if status != QpStatus::Converged {
            log::warn!("n={n}: solver ended with status {status}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Chol { sizes, reps } => bench_chol(&sizes, reps),
        Command::Qp { sizes, seed } => bench_qp(&sizes, seed),
    }
}
