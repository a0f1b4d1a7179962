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

//! Compiler contract tests
//!
//! The properties a careful reader of the compiled programs can check
//! without running them: CSE idempotence, constant folding, register
//! budget, def-before-use, and the wire format.

use vexpr::{
    compile, compile_tree, CompileOptions, Error, ExprTree, Kind, NdArray, OpName, OptLevel,
    ScalarValue,
};

fn sig(pairs: &[(&str, Kind)]) -> Vec<(String, Kind)> {
    pairs.iter().map(|(n, k)| (n.to_string(), *k)).collect()
}

fn count_op(prog: &vexpr::CompiledExpression, name: OpName) -> usize {
    prog.program()
        .iter()
        .filter(|i| i.op.name() == name)
        .count()
}

// ============================================================================
// CSE
// ============================================================================

#[test]
fn test_cse_collapses_repeated_subexpression() {
    let prog = compile(
        "(a + b) * (a + b)",
        &sig(&[("a", Kind::Float64), ("b", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();
    assert_eq!(count_op(&prog, OpName::Add), 1);
}

#[test]
fn test_cse_and_square_rewrite_agree() {
    // (a+b)*(a+b) and (a+b)**2 must produce identical results
    let signature = sig(&[("a", Kind::Float64), ("b", Kind::Float64)]);
    let squared = compile("(a + b) ** 2", &signature, &CompileOptions::default()).unwrap();
    let multiplied = compile("(a + b) * (a + b)", &signature, &CompileOptions::default()).unwrap();

    let a: NdArray = vec![1.5f64, -2.0, 3.25].into();
    let b: NdArray = vec![0.5f64, 1.0, -0.25].into();
    let lhs = squared.run(&[&a, &b], None).unwrap();
    let rhs = multiplied.run(&[&a, &b], None).unwrap();
    assert_eq!(lhs.as_f64().unwrap(), rhs.as_f64().unwrap());
}

// ============================================================================
// Constant folding
// ============================================================================

#[test]
fn test_constant_expression_folds_to_copy() {
    let prog = compile("2 + 2", &[], &CompileOptions::default()).unwrap();
    assert_eq!(prog.program().len(), 1);
    assert_eq!(prog.program()[0].op.name(), OpName::Copy);
    assert_eq!(count_op(&prog, OpName::Add), 0);
    assert_eq!(prog.constant_pool(), &[ScalarValue::Int32(4)]);

    let out = prog.run(&[], None).unwrap();
    assert_eq!(out.get(0), ScalarValue::Int32(4));
}

#[test]
fn test_folding_matches_runtime_integer_semantics() {
    // Compile-time folding of 7/2 must agree with the VM's truncating
    // integer division
    let options = CompileOptions {
        opt_level: OptLevel::Moderate,
        truediv: false,
    };
    let folded = compile("7 / 2", &[], &options).unwrap();
    assert_eq!(folded.constant_pool(), &[ScalarValue::Int32(3)]);

    let runtime = compile(
        "a / b",
        &sig(&[("a", Kind::Int32), ("b", Kind::Int32)]),
        &options,
    )
    .unwrap();
    let a: NdArray = vec![7i32].into();
    let b: NdArray = vec![2i32].into();
    let out = runtime.run(&[&a, &b], None).unwrap();
    assert_eq!(out.get(0), ScalarValue::Int32(3));
}

// ============================================================================
// Register budget
// ============================================================================

#[test]
fn test_register_ids_stay_below_sentinel() {
    // A deep expression with many live temporaries
    let expr = "(a+b)*(c+d) + (a-b)*(c-d) + sqrt(a*c) - sqrt(b*d) + (a*d - b*c)";
    let prog = compile(
        expr,
        &sig(&[
            ("a", Kind::Float64),
            ("b", Kind::Float64),
            ("c", Kind::Float64),
            ("d", Kind::Float64),
        ]),
        &CompileOptions::default(),
    )
    .unwrap();
    for instruction in prog.program() {
        assert!(instruction.dest < 255);
    }
    assert!(prog.n_registers() <= 255);
    prog.validate().unwrap();
}

#[test]
fn test_temp_count_tracks_liveness_not_op_count() {
    // A long chain touches many ops but only ever two live float temps
    let expr = "((((a + b) * b + a) * b + a) * b + a) * b";
    let prog = compile(
        expr,
        &sig(&[("a", Kind::Float64), ("b", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();
    assert!(
        prog.temp_signature().len() <= 2,
        "chain should reuse temporaries, got {:?}",
        prog.temp_signature()
    );
}

#[test]
fn test_register_overflow_reported() {
    // Three hundred distinct inputs exhaust the one-byte register space
    let names: Vec<String> = (0..300).map(|i| format!("v{}", i)).collect();
    let expr = names.join(" + ");
    let signature: Vec<(String, Kind)> =
        names.iter().map(|n| (n.clone(), Kind::Float64)).collect();
    let err = compile(&expr, &signature, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::RegisterOverflow { .. }));
}

// ============================================================================
// Def-before-use and decoding
// ============================================================================

#[test]
fn test_programs_validate_def_before_use() {
    let expressions = [
        "a + b * c - a / c",
        "where(a > b, a*a + b, sqrt(c))",
        "sum(a*b + c, axis=0)",
        "(a + b) * (a + b) - (b + a)",
    ];
    let signature = sig(&[
        ("a", Kind::Float64),
        ("b", Kind::Float64),
        ("c", Kind::Float64),
    ]);
    for expr in expressions {
        let prog = compile(expr, &signature, &CompileOptions::default()).unwrap();
        prog.validate()
            .unwrap_or_else(|e| panic!("{:?} failed validation: {}", expr, e));
    }
}

#[test]
fn test_wire_format_is_four_bytes_per_instruction() {
    let prog = compile(
        "where(a > 0.0, a, 0.0 - a)",
        &sig(&[("a", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();
    let bytes = prog.encode();
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(bytes.len() / 4, prog.program().len());

    // The where instruction needs a third operand, so a noop continuation
    // group must follow it
    let position = prog
        .program()
        .iter()
        .position(|i| i.op.name() == OpName::Where)
        .expect("where instruction present");
    assert!(prog.program()[position + 1].is_continuation());
    assert_eq!(bytes[(position + 1) * 4], 0, "noop opcode byte is zero");
}

#[test]
fn test_disassembly_is_readable() {
    let prog = compile(
        "2.0 * a + 1.0",
        &sig(&[("a", Kind::Float64)]),
        &CompileOptions::default(),
    )
    .unwrap();
    let listing = prog.disassemble();
    assert!(listing.contains("mul_ddd"));
    assert!(listing.contains("add_ddd"));
    assert!(listing.contains("r0"));
}

// ============================================================================
// Options plumbing
// ============================================================================

#[test]
fn test_opt_levels_share_semantics() {
    let signature = sig(&[("a", Kind::Float64)]);
    let a: NdArray = vec![1.3f64, 2.7, 0.2].into();
    let mut outputs = Vec::new();
    for level in [OptLevel::None, OptLevel::Moderate, OptLevel::Aggressive] {
        let options = CompileOptions {
            opt_level: level,
            truediv: true,
        };
        let prog = compile("a ** 4 / 2.0", &signature, &options).unwrap();
        outputs.push(prog.run(&[&a], None).unwrap());
    }
    let baseline = outputs[0].as_f64().unwrap();
    for out in &outputs[1..] {
        let values = out.as_f64().unwrap();
        for (x, y) in baseline.iter().zip(values) {
            assert!((x - y).abs() < 1e-12, "{} != {}", x, y);
        }
    }
}

#[test]
fn test_aggressive_removes_pow_instructions() {
    let signature = sig(&[("a", Kind::Float64)]);
    let moderate = compile(
        "a ** 6",
        &signature,
        &CompileOptions {
            opt_level: OptLevel::Moderate,
            truediv: true,
        },
    )
    .unwrap();
    let aggressive = compile(
        "a ** 6",
        &signature,
        &CompileOptions {
            opt_level: OptLevel::Aggressive,
            truediv: true,
        },
    )
    .unwrap();
    assert_eq!(count_op(&moderate, OpName::Pow), 1);
    assert_eq!(count_op(&aggressive, OpName::Pow), 0);
    assert!(count_op(&aggressive, OpName::Mul) >= 2);
}

#[test]
fn test_builder_and_parser_agree() {
    let signature = sig(&[("x", Kind::Float64)]);
    let parsed = compile("x * x + 2.0", &signature, &CompileOptions::default()).unwrap();

    let mut tree = ExprTree::new();
    let x = tree.var("x");
    let square = tree.mul(x, x);
    let two = tree.constant(2.0f64);
    let root = tree.add(square, two);
    let built = compile_tree(tree, root, &signature, &CompileOptions::default()).unwrap();

    let input: NdArray = vec![1.0f64, 2.0, 3.0].into();
    let lhs = parsed.run(&[&input], None).unwrap();
    let rhs = built.run(&[&input], None).unwrap();
    assert_eq!(lhs.as_f64().unwrap(), rhs.as_f64().unwrap());
}
