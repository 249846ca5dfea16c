//! Benchmark of one control tick's trajectory solve.
//!
//! The solve is the dominant cost of a tick and must fit comfortably inside
//! the 100 ms cycle period.

use criterion::{criterion_group, criterion_main, Criterion};

use mpc_lib::mpc_ctrl::{Params, Solver, VehicleState};

fn bench_solve(c: &mut Criterion) {
    let params = Params::default();
    let mut solver = Solver::new(&params);

    // A vehicle at speed, offset and misaligned, on a gently curving path
    let state = VehicleState::from_errors(15.0, 0.5, -0.1);
    let coeffs = [0.5, 0.1, 0.01, 0.0];

    c.bench_function("tick_solve", |b| {
        b.iter(|| solver.solve(&state, &coeffs, &params))
    });
}

criterion_group!(benches, bench_solve);
criterion_main!(benches);
