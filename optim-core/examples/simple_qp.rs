//! Simple QP example.
//!
//! Solves:
//!   minimize    x1^2 + x2^2
//!   subject to  x1 + x2 <= -1
//!
//! The unconstrained optimum (0, 0) violates the constraint, so the
//! solution sits on the boundary: x1 = x2 = -0.5, objective = 0.5.
//! The start (0, 0) is infeasible and exercises the phase-1 search.

use optim_core::{solve, ExecContext, Matrix, QpProblem, QpSettings, SpdMatrix, Vector};

fn main() {
    env_logger::init();

    let prob = QpProblem {
        p: SpdMatrix::from_dense(2, &[2.0, 0.0, 0.0, 2.0]).expect("P shape"),
        q: Vector::zeros(2),
        m: Matrix::from_vec(1, 2, vec![1.0, 1.0]).expect("M shape"),
        d: Vector::from_slice(&[-1.0]),
        a: None,
        b: None,
    };

    let settings = QpSettings {
        verbose: true,
        ..Default::default()
    };
    let ctx = ExecContext::sequential();

    match solve(&prob, &Vector::zeros(2), &settings, &ctx) {
        Ok(result) => {
            println!("\n=== Solution ===");
            println!("Status: {}", result.status);
            println!("x1 = {:.6}", result.x[0]);
            println!("x2 = {:.6}", result.x[1]);
            println!("lambda = {:?}", result.lambda.as_slice());
            println!("Objective value: {:.6}", result.obj_val);
            println!(
                "Iterations: {} (+{} phase-1)",
                result.info.iters, result.info.feasibility_iters
            );
            println!("Final gap: {:.3e}", result.info.gap);
        }
        Err(e) => {
            eprintln!("Solver failed: {e}");
            std::process::exit(1);
        }
    }
}
