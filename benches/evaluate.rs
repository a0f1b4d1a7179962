// Copyright 2026 Vexpr Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Compiled evaluation vs a straight-line Rust loop
//!
//! Run with: cargo bench --bench evaluate
//!
//! The compiled path pays for compilation once (outside the timing loop)
//! and for the chunked gather/dispatch machinery on every call; the naive
//! loop is the upper bound a single expression can reach without fusion.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use vexpr::{compile, set_num_threads, CompileOptions, Kind, NdArray};

const N: usize = 1 << 20;

fn inputs() -> (NdArray, NdArray, NdArray) {
    let a: Vec<f64> = (0..N).map(|i| (i as f64) * 0.001).collect();
    let b: Vec<f64> = (0..N).map(|i| ((i % 4096) as f64) + 1.0).collect();
    let c: Vec<f64> = (0..N).map(|i| ((i % 251) as f64) * 0.5).collect();
    (a.into(), b.into(), c.into())
}

fn bench_weighted_sum(criterion: &mut Criterion) {
    let signature = vec![
        ("a".to_string(), Kind::Float64),
        ("b".to_string(), Kind::Float64),
        ("c".to_string(), Kind::Float64),
    ];
    let prog = compile("2.0*a + 3.0*b*c", &signature, &CompileOptions::default()).unwrap();
    let (a, b, c) = inputs();

    set_num_threads(1);
    criterion.bench_function("weighted_sum/compiled_1_thread", |bencher| {
        bencher.iter(|| black_box(prog.run(&[&a, &b, &c], None).unwrap()))
    });

    set_num_threads(8);
    criterion.bench_function("weighted_sum/compiled_8_threads", |bencher| {
        bencher.iter(|| black_box(prog.run(&[&a, &b, &c], None).unwrap()))
    });

    let (av, bv, cv) = (
        a.as_f64().unwrap().to_vec(),
        b.as_f64().unwrap().to_vec(),
        c.as_f64().unwrap().to_vec(),
    );
    criterion.bench_function("weighted_sum/naive_loop", |bencher| {
        bencher.iter(|| {
            let mut out = vec![0.0f64; N];
            for i in 0..N {
                out[i] = 2.0 * av[i] + 3.0 * bv[i] * cv[i];
            }
            black_box(out)
        })
    });
}

fn bench_reduction(criterion: &mut Criterion) {
    let signature = vec![("x".to_string(), Kind::Float64)];
    let prog = compile("sum(x*x + 2.0)", &signature, &CompileOptions::default()).unwrap();
    let (x, _, _) = inputs();

    set_num_threads(1);
    criterion.bench_function("sum_of_squares/compiled_1_thread", |bencher| {
        bencher.iter(|| black_box(prog.run(&[&x], None).unwrap()))
    });

    set_num_threads(8);
    criterion.bench_function("sum_of_squares/compiled_8_threads", |bencher| {
        bencher.iter(|| black_box(prog.run(&[&x], None).unwrap()))
    });
}

fn bench_compile(criterion: &mut Criterion) {
    let signature = vec![
        ("a".to_string(), Kind::Float64),
        ("b".to_string(), Kind::Float64),
    ];
    criterion.bench_function("compile/medium_expression", |bencher| {
        bencher.iter(|| {
            black_box(
                compile(
                    "sqrt(a*a + b*b) / (1.0 + a*b) + where(a > b, a, b)",
                    &signature,
                    &CompileOptions::default(),
                )
                .unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_weighted_sum, bench_reduction, bench_compile);
criterion_main!(benches);
