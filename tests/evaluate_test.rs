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

//! End-to-end evaluation tests
//!
//! Round-trip correctness, broadcasting, reductions, threading determinism
//! and the error contract, all through the public compile/run surface.

use vexpr::{
    compile, evaluate, get_num_threads, set_num_threads, ArrayData, CompileOptions, Error, Kind,
    NdArray, OptLevel, ScalarValue,
};

fn sig(pairs: &[(&str, Kind)]) -> Vec<(String, Kind)> {
    pairs.iter().map(|(n, k)| (n.to_string(), *k)).collect()
}

fn options(opt_level: OptLevel, truediv: bool) -> CompileOptions {
    CompileOptions { opt_level, truediv }
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-12 * e.abs().max(1.0),
            "element {}: {} != {}",
            index,
            a,
            e
        );
    }
}

// ============================================================================
// Spec scenarios
// ============================================================================

#[test]
fn test_weighted_sum_of_three_arrays() {
    let prog = compile(
        "2.0*a + 3.0*b*c",
        &sig(&[
            ("a", Kind::Float64),
            ("b", Kind::Float64),
            ("c", Kind::Float64),
        ]),
        &CompileOptions::default(),
    )
    .unwrap();
    let a: NdArray = vec![1.0f64, 2.0, 3.0].into();
    let b: NdArray = vec![4.0f64, 5.0, 6.0].into();
    let c: NdArray = vec![7.0f64, 8.0, 9.0].into();
    let out = prog.run(&[&a, &b, &c], None).unwrap();
    assert_eq!(out.as_f64().unwrap(), &[86.0, 124.0, 168.0]);
}

#[test]
fn test_division_semantics_depend_on_truediv() {
    let a: NdArray = vec![0i32, 1, 2, 3].into();

    let int_div = compile(
        "a / 2",
        &sig(&[("a", Kind::Int32)]),
        &options(OptLevel::Moderate, false),
    )
    .unwrap();
    let out = int_div.run(&[&a], None).unwrap();
    assert_eq!(out.kind(), Kind::Int32);
    assert_eq!(out.as_i32().unwrap(), &[0, 0, 1, 1]);

    let true_div = compile(
        "a / 2",
        &sig(&[("a", Kind::Int32)]),
        &options(OptLevel::Moderate, true),
    )
    .unwrap();
    let out = true_div.run(&[&a], None).unwrap();
    assert_eq!(out.kind(), Kind::Float64);
    assert_eq!(out.as_f64().unwrap(), &[0.0, 0.5, 1.0, 1.5]);
}

#[test]
fn test_axis_reduction_matches_reference() {
    // sum(x**2 + 2) over arange(10)
    let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let expected: f64 = data.iter().map(|x| x * x + 2.0).sum();

    let prog = compile(
        "sum(x**2 + 2, axis=0)",
        &sig(&[("x", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();
    let x: NdArray = data.into();
    let out = prog.run(&[&x], None).unwrap();
    assert!(out.is_scalar());
    assert_close(out.as_f64().unwrap(), &[expected]);
}

#[test]
fn test_where_selects_by_sign() {
    let prog = compile(
        "where(a > 0.0, b, c)",
        &sig(&[
            ("a", Kind::Float64),
            ("b", Kind::Float64),
            ("c", Kind::Float64),
        ]),
        &CompileOptions::default(),
    )
    .unwrap();
    let a: NdArray = vec![1.0f64, -1.0, 0.0, 2.0].into();
    let b: NdArray = vec![10.0f64, 20.0, 30.0, 40.0].into();
    let c: NdArray = vec![-10.0f64, -20.0, -30.0, -40.0].into();
    let out = prog.run(&[&a, &b, &c], None).unwrap();
    assert_eq!(out.as_f64().unwrap(), &[10.0, -20.0, -30.0, 40.0]);
}

#[test]
fn test_bytes_mixed_with_numeric_fails_at_compile_time() {
    let err = compile(
        "s1 + s2",
        &sig(&[("s1", Kind::Bytes), ("s2", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
    assert!(err.is_compile_error());
}

// ============================================================================
// Round-trip correctness against straight-line Rust
// ============================================================================

#[test]
fn test_roundtrip_float_arithmetic() {
    let n = 10_000;
    let a: Vec<f64> = (0..n).map(|i| (i as f64) * 0.25 - 100.0).collect();
    let b: Vec<f64> = (0..n).map(|i| (i as f64).mul_add(0.5, 1.0)).collect();
    let expected: Vec<f64> = a
        .iter()
        .zip(&b)
        .map(|(x, y)| (x * y + x / y).sin().abs().sqrt())
        .collect();

    let av: NdArray = a.into();
    let bv: NdArray = b.into();
    let out = evaluate("sqrt(abs(sin(a*b + a/b)))", &[("a", &av), ("b", &bv)]).unwrap();
    assert_close(out.as_f64().unwrap(), &expected);
}

#[test]
fn test_roundtrip_integer_arithmetic() {
    let a: Vec<i64> = (-50..50).collect();
    let expected: Vec<i64> = a.iter().map(|x| x * x * x - 7 * x).collect();

    let av: NdArray = a.into();
    let prog = compile(
        "a**3 - 7*a",
        &sig(&[("a", Kind::Int64)]),
        &options(OptLevel::Aggressive, true),
    )
    .unwrap();
    let out = prog.run(&[&av], None).unwrap();
    assert_eq!(out.as_i64().unwrap(), expected.as_slice());
}

#[test]
fn test_roundtrip_comparisons_and_boolean_ops() {
    let a: Vec<f64> = vec![1.0, -2.0, 3.0, -4.0];
    let b: Vec<f64> = vec![0.5, -2.0, 4.0, -5.0];
    let expected: Vec<bool> = a
        .iter()
        .zip(&b)
        .map(|(x, y)| (x > y) & (*x > 0.0))
        .collect();

    let av: NdArray = a.into();
    let bv: NdArray = b.into();
    let out = evaluate("(a > b) & (a > 0.0)", &[("a", &av), ("b", &bv)]).unwrap();
    assert_eq!(out.as_bool().unwrap(), expected.as_slice());
}

#[test]
fn test_complex_arithmetic() {
    use num_complex::Complex64;
    let values = vec![Complex64::new(1.0, 2.0), Complex64::new(-3.0, 0.5)];
    let z = NdArray::new(ArrayData::Complex128(values.clone()), vec![2]).unwrap();
    let out = evaluate("z * conj(z)", &[("z", &z)]).unwrap();
    let result = out.as_complex().unwrap();
    for (got, v) in result.iter().zip(&values) {
        assert!((got.re - v.norm_sqr()).abs() < 1e-12);
        assert!(got.im.abs() < 1e-12);
    }
}

#[test]
fn test_abs_of_complex_is_float() {
    use num_complex::Complex64;
    let z = NdArray::new(
        ArrayData::Complex128(vec![Complex64::new(3.0, 4.0)]),
        vec![1],
    )
    .unwrap();
    let out = evaluate("abs(z)", &[("z", &z)]).unwrap();
    assert_eq!(out.kind(), Kind::Float64);
    assert_close(out.as_f64().unwrap(), &[5.0]);
}

#[test]
fn test_mixed_kind_promotion() {
    let i: NdArray = vec![1i32, 2, 3].into();
    let f: NdArray = vec![0.5f64, 0.5, 0.5].into();
    let out = evaluate("i + f", &[("i", &i), ("f", &f)]).unwrap();
    assert_eq!(out.kind(), Kind::Float64);
    assert_eq!(out.as_f64().unwrap(), &[1.5, 2.5, 3.5]);
}

// ============================================================================
// Broadcasting
// ============================================================================

#[test]
fn test_broadcast_matrix_against_row() {
    // (2,3) + (3,)
    let a = NdArray::new(
        ArrayData::Float64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        vec![2, 3],
    )
    .unwrap();
    let b: NdArray = vec![10.0f64, 20.0, 30.0].into();
    let out = evaluate("a + b", &[("a", &a), ("b", &b)]).unwrap();
    assert_eq!(out.shape(), &[2, 3]);
    assert_eq!(
        out.as_f64().unwrap(),
        &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
    );
}

#[test]
fn test_broadcast_column_against_row() {
    // (3,1) * (1,4) -> (3,4)
    let a = NdArray::new(ArrayData::Float64(vec![1.0, 2.0, 3.0]), vec![3, 1]).unwrap();
    let b = NdArray::new(ArrayData::Float64(vec![1.0, 10.0, 100.0, 1000.0]), vec![1, 4]).unwrap();
    let out = evaluate("a * b", &[("a", &a), ("b", &b)]).unwrap();
    assert_eq!(out.shape(), &[3, 4]);
    assert_eq!(
        out.as_f64().unwrap(),
        &[
            1.0, 10.0, 100.0, 1000.0, //
            2.0, 20.0, 200.0, 2000.0, //
            3.0, 30.0, 300.0, 3000.0,
        ]
    );
}

#[test]
fn test_broadcast_scalar() {
    let a: NdArray = vec![1.0f64, 2.0].into();
    let s = NdArray::scalar(ScalarValue::Float64(10.0));
    let out = evaluate("a * s", &[("a", &a), ("s", &s)]).unwrap();
    assert_eq!(out.as_f64().unwrap(), &[10.0, 20.0]);
}

#[test]
fn test_empty_arrays_produce_empty_results() {
    let a: NdArray = Vec::<f64>::new().into();
    let b: NdArray = Vec::<f64>::new().into();
    let out = evaluate("a + b", &[("a", &a), ("b", &b)]).unwrap();
    assert_eq!(out.shape(), &[0]);
    assert!(out.is_empty());
}

#[test]
fn test_incompatible_shapes_raise_shape_error() {
    let a = NdArray::zeros(Kind::Float64, vec![3, 2]);
    let b = NdArray::zeros(Kind::Float64, vec![4]);
    let err = evaluate("a + b", &[("a", &a), ("b", &b)]).unwrap_err();
    assert!(matches!(err, Error::Shape { .. }));
}

// ============================================================================
// Reductions
// ============================================================================

#[test]
fn test_full_sum_over_matrix() {
    let a = NdArray::new(
        ArrayData::Float64((1..=6).map(|i| i as f64).collect()),
        vec![2, 3],
    )
    .unwrap();
    let out = evaluate("sum(a)", &[("a", &a)]).unwrap();
    assert!(out.is_scalar());
    assert_close(out.as_f64().unwrap(), &[21.0]);
}

#[test]
fn test_axis_sum_over_matrix() {
    let a = NdArray::new(
        ArrayData::Float64(vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]),
        vec![2, 3],
    )
    .unwrap();

    let sum0 = evaluate("sum(a, axis=0)", &[("a", &a)]).unwrap();
    assert_eq!(sum0.shape(), &[3]);
    assert_close(sum0.as_f64().unwrap(), &[11.0, 22.0, 33.0]);

    let sum1 = evaluate("sum(a, axis=1)", &[("a", &a)]).unwrap();
    assert_eq!(sum1.shape(), &[2]);
    assert_close(sum1.as_f64().unwrap(), &[6.0, 60.0]);
}

#[test]
fn test_prod_reduction() {
    let a: NdArray = vec![1.0f64, 2.0, 3.0, 4.0].into();
    let out = evaluate("prod(a)", &[("a", &a)]).unwrap();
    assert_close(out.as_f64().unwrap(), &[24.0]);
}

#[test]
fn test_integer_sum_widens_to_int64() {
    let a: NdArray = vec![1i32; 1000].into();
    let out = evaluate("sum(a)", &[("a", &a)]).unwrap();
    assert_eq!(out.kind(), Kind::Int64);
    assert_eq!(out.as_i64().unwrap(), &[1000]);
}

#[test]
fn test_sum_of_empty_is_zero() {
    let a: NdArray = Vec::<f64>::new().into();
    let out = evaluate("sum(a)", &[("a", &a)]).unwrap();
    assert_close(out.as_f64().unwrap(), &[0.0]);
}

#[test]
fn test_axis_out_of_range() {
    let a: NdArray = vec![1.0f64, 2.0].into();
    let err = evaluate("sum(a, axis=2)", &[("a", &a)]).unwrap_err();
    assert!(err.is_runtime_error());
}

// ============================================================================
// Threading determinism
// ============================================================================

#[test]
fn test_elementwise_results_identical_across_thread_counts() {
    let n = 200_000; // comfortably past the parallel threshold
    let data: Vec<f64> = (0..n).map(|i| (i as f64) * 0.001).collect();
    let a: NdArray = data.into();
    let prog = compile(
        "sqrt(a) + a*a",
        &sig(&[("a", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();

    let before = get_num_threads();
    set_num_threads(1);
    let single = prog.run(&[&a], None).unwrap();
    set_num_threads(8);
    let parallel = prog.run(&[&a], None).unwrap();
    set_num_threads(before);

    // Bit-identical, not merely close
    assert_eq!(single.as_f64().unwrap(), parallel.as_f64().unwrap());
}

#[test]
fn test_reduction_agrees_across_thread_counts() {
    let n = 200_000;
    let data: Vec<f64> = (0..n).map(|i| ((i % 97) as f64) * 0.125).collect();
    let a: NdArray = data.clone().into();
    let expected: f64 = data.iter().sum();
    let prog = compile(
        "sum(a)",
        &sig(&[("a", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();

    let before = get_num_threads();
    set_num_threads(1);
    let single = prog.run(&[&a], None).unwrap();
    set_num_threads(8);
    let parallel = prog.run(&[&a], None).unwrap();
    set_num_threads(before);

    let single = single.as_f64().unwrap()[0];
    let parallel = parallel.as_f64().unwrap()[0];
    assert!((single - expected).abs() < 1e-6 * expected.abs());
    assert!((single - parallel).abs() < 1e-6 * expected.abs());
}

// ============================================================================
// Error contract
// ============================================================================

#[test]
fn test_integer_division_by_zero_yields_sentinel() {
    let a: NdArray = vec![10i64, 20].into();
    let b: NdArray = vec![0i64, 5].into();
    let prog = compile(
        "a / b",
        &sig(&[("a", Kind::Int64), ("b", Kind::Int64)]),
        &options(OptLevel::Moderate, false),
    )
    .unwrap();
    let out = prog.run(&[&a, &b], None).unwrap();
    assert_eq!(out.as_i64().unwrap(), &[0, 4]);
}

#[test]
fn test_float_division_by_zero_follows_ieee() {
    let a: NdArray = vec![1.0f64, -1.0, 0.0].into();
    let b: NdArray = vec![0.0f64, 0.0, 0.0].into();
    let out = evaluate("a / b", &[("a", &a), ("b", &b)]).unwrap();
    let values = out.as_f64().unwrap();
    assert!(values[0].is_infinite() && values[0] > 0.0);
    assert!(values[1].is_infinite() && values[1] < 0.0);
    assert!(values[2].is_nan());
}

#[test]
fn test_parse_error_names_offending_text() {
    let a: NdArray = vec![1.0f64].into();
    let err = evaluate("a +* 2", &[("a", &a)]).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(err.to_string().contains("a +* 2"));
}

#[test]
fn test_out_buffer_is_written_in_place() {
    let prog = compile(
        "a + 1.0",
        &sig(&[("a", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();
    let a: NdArray = vec![1.0f64, 2.0, 3.0].into();
    let out = NdArray::zeros(Kind::Float64, vec![3]);
    let result = prog.run(&[&a], Some(out)).unwrap();
    assert_eq!(result.as_f64().unwrap(), &[2.0, 3.0, 4.0]);
}
