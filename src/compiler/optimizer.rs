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

//! Compile-time optimization passes
//!
//! Three passes over the resolved tree, in this order:
//!
//! 1. **Constant folding** — any op whose operands are all constants is
//!    evaluated through the same scalar kernels the VM uses, so compile-time
//!    and run-time results agree exactly.
//! 2. **Algebraic simplification** (Moderate+) — division by a float
//!    constant becomes multiplication by its reciprocal; small constant
//!    powers become copies, square roots or multiplications. At Aggressive,
//!    integer and half-integer exponents up to |50| expand into a
//!    multiplication chain via exponentiation by squaring.
//! 3. **CSE** — structurally identical subexpressions collapse; the later
//!    occurrence becomes an [`ExprNode::Alias`] of the earlier one, and all
//!    alias chains are flattened before register allocation.
//!
//! Folding and simplification run bottom-up in one walk so simplified
//! children can fold at their parents; CSE runs last so two subtrees that
//! simplify to the same shape are recognized as duplicates.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::core::error::{Error, Result};
use crate::core::kind::Kind;
use crate::core::scalar::ScalarValue;
use crate::vm::kernels::eval_scalar;

use super::opcodes::OpName;
use super::tree::{ExprNode, ExprTree, NodeId};
use super::{CompileOptions, OptLevel};

/// Largest |exponent| expanded by the Aggressive pow rewrite.
/// Past this the multiplication chain stops paying for itself.
const MAX_EXPANDED_POW: f64 = 50.0;

/// Run all optimization passes. Returns the (possibly re-aliased) root.
pub fn optimize(tree: &mut ExprTree, root: NodeId, options: &CompileOptions) -> Result<NodeId> {
    fold_node(tree, root, options)?;
    let root = cse(tree, root);
    Ok(root)
}

/// Bottom-up constant folding and algebraic simplification
fn fold_node(tree: &mut ExprTree, id: NodeId, options: &CompileOptions) -> Result<()> {
    let ExprNode::Op { name, kind, args } = tree.node(id).clone() else {
        return Ok(());
    };
    for &arg in args.iter() {
        fold_node(tree, arg, options)?;
    }
    let kind = kind.ok_or_else(|| Error::internal("optimizer ran before kind resolution"))?;

    // Constant folding (reductions keep their accumulator semantics)
    if !name.is_reduction() {
        let mut values = Vec::with_capacity(args.len());
        let mut all_constant = true;
        for &arg in args.iter() {
            match tree.node(tree.resolve_alias(arg)) {
                ExprNode::Constant(v) => values.push(v.clone()),
                _ => {
                    all_constant = false;
                    break;
                }
            }
        }
        if all_constant {
            let folded = match name {
                OpName::Cast => values[0].cast_to(kind)?,
                _ => eval_scalar(name, kind, &values)?,
            };
            *tree.node_mut(id) = ExprNode::Constant(folded);
            return Ok(());
        }
    }

    if options.opt_level >= OptLevel::Moderate {
        simplify_node(tree, id, name, kind, &args, options)?;
    }
    Ok(())
}

/// Algebraic rewrites on one op node (children already folded)
fn simplify_node(
    tree: &mut ExprTree,
    id: NodeId,
    name: OpName,
    kind: Kind,
    args: &[NodeId],
    options: &CompileOptions,
) -> Result<()> {
    match name {
        // x / const  ->  x * (1/const), float and complex kinds only
        // (integer division truncates, so the rewrite would change results)
        OpName::Div if kind.is_float() || kind.is_complex() => {
            let divisor = match tree.node(tree.resolve_alias(args[1])) {
                ExprNode::Constant(v) if !v.is_zero() => v.clone(),
                _ => return Ok(()),
            };
            let one = one_of(kind);
            let reciprocal = eval_scalar(OpName::Div, kind, &[one, divisor])?;
            let recip_node = tree.push(ExprNode::Constant(reciprocal));
            *tree.node_mut(id) = ExprNode::Op {
                name: OpName::Mul,
                kind: Some(kind),
                args: SmallVec::from_slice(&[args[0], recip_node]),
            };
            Ok(())
        }

        OpName::Pow => simplify_pow(tree, id, kind, args, options),

        _ => Ok(()),
    }
}

/// Constant-exponent power rewrites
fn simplify_pow(
    tree: &mut ExprTree,
    id: NodeId,
    kind: Kind,
    args: &[NodeId],
    options: &CompileOptions,
) -> Result<()> {
    let base = args[0];
    let exponent = match tree.node(tree.resolve_alias(args[1])) {
        ExprNode::Constant(v) => match v {
            ScalarValue::Complex128(c) if c.im != 0.0 => return Ok(()),
            _ => match v.as_f64().or_else(|_| v.as_complex().map(|c| c.re)) {
                Ok(p) => p,
                Err(_) => return Ok(()),
            },
        },
        _ => return Ok(()),
    };

    // The handful of special cases the Moderate level knows about
    if exponent == 1.0 {
        // Graft the base into this slot rather than aliasing forwards:
        // the base may be a resolver-inserted cast with a larger index,
        // and aliases must always point backwards.
        let base_node = tree.node(tree.resolve_alias(base)).clone();
        *tree.node_mut(id) = base_node;
        return Ok(());
    }
    if exponent == 0.0 {
        *tree.node_mut(id) = ExprNode::Constant(one_of(kind));
        return Ok(());
    }
    if exponent == 2.0 {
        *tree.node_mut(id) = ExprNode::Op {
            name: OpName::Mul,
            kind: Some(kind),
            args: SmallVec::from_slice(&[base, base]),
        };
        return Ok(());
    }
    if exponent == 0.5 && (kind.is_float() || kind.is_complex()) {
        *tree.node_mut(id) = ExprNode::Op {
            name: OpName::Sqrt,
            kind: Some(kind),
            args: SmallVec::from_slice(&[base]),
        };
        return Ok(());
    }
    if exponent == -1.0 && (kind.is_float() || kind.is_complex()) {
        let one = tree.push(ExprNode::Constant(one_of(kind)));
        *tree.node_mut(id) = ExprNode::Op {
            name: OpName::Div,
            kind: Some(kind),
            args: SmallVec::from_slice(&[one, base]),
        };
        return Ok(());
    }

    if options.opt_level < OptLevel::Aggressive {
        return Ok(());
    }

    // Aggressive: expand integer and half-integer exponents up to |50| by
    // squaring. One pow becomes O(log n) muls, plus one sqrt for the
    // half-integer remainder and one division when the exponent is negative.
    let magnitude = exponent.abs();
    if magnitude > MAX_EXPANDED_POW {
        return Ok(());
    }
    let whole = magnitude.trunc();
    let fract = magnitude - whole;
    let half = fract == 0.5 && (kind.is_float() || kind.is_complex());
    if fract != 0.0 && !half {
        return Ok(());
    }
    if exponent < 0.0 && !(kind.is_float() || kind.is_complex()) {
        return Ok(());
    }

    let mut result: Option<NodeId> = None;
    let mut square = base;
    let mut remaining = whole as u64;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = Some(match result {
                None => square,
                Some(acc) => push_op(tree, OpName::Mul, kind, &[acc, square]),
            });
        }
        remaining >>= 1;
        if remaining > 0 {
            square = push_op(tree, OpName::Mul, kind, &[square, square]);
        }
    }
    if half {
        let sqrt = push_op(tree, OpName::Sqrt, kind, &[base]);
        result = Some(match result {
            None => sqrt,
            Some(acc) => push_op(tree, OpName::Mul, kind, &[acc, sqrt]),
        });
    }
    let positive = result.expect("exponent 0 handled above");

    if exponent < 0.0 {
        let one = tree.push(ExprNode::Constant(one_of(kind)));
        *tree.node_mut(id) = ExprNode::Op {
            name: OpName::Div,
            kind: Some(kind),
            args: SmallVec::from_slice(&[one, positive]),
        };
    } else if positive == base {
        let base_node = tree.node(tree.resolve_alias(base)).clone();
        *tree.node_mut(id) = base_node;
    } else {
        // Graft the final multiply into the pow node's slot so parents keep
        // their existing child reference.
        let top = tree.node(positive).clone();
        *tree.node_mut(id) = top;
    }
    Ok(())
}

fn push_op(tree: &mut ExprTree, name: OpName, kind: Kind, args: &[NodeId]) -> NodeId {
    tree.push(ExprNode::Op {
        name,
        kind: Some(kind),
        args: SmallVec::from_slice(args),
    })
}

fn one_of(kind: Kind) -> ScalarValue {
    match kind {
        Kind::Bool => ScalarValue::Bool(true),
        Kind::Int32 => ScalarValue::Int32(1),
        Kind::Int64 => ScalarValue::Int64(1),
        Kind::Float32 => ScalarValue::Float32(1.0),
        Kind::Float64 => ScalarValue::Float64(1.0),
        Kind::Complex128 => ScalarValue::Complex128(num_complex::Complex64::new(1.0, 0.0)),
        Kind::Bytes => ScalarValue::Bytes(Vec::new()),
    }
}

/// Structural identity of a node for CSE purposes. Leaves hash by value,
/// not by arena index, so repeated references to the same variable or
/// literal collapse before their parents are compared.
#[derive(PartialEq, Eq, Hash)]
enum CseKey {
    Var(String),
    Const(ScalarValue),
    Op(OpName, Kind, SmallVec<[NodeId; 3]>),
}

/// Common subexpression elimination.
///
/// Structural hashing: two ops are duplicates iff operation, kind and
/// (canonical) children match. The smaller arena index always wins as the
/// canonical node, so an alias invariably points backwards and chains cannot
/// cycle. Returns the canonical root.
fn cse(tree: &mut ExprTree, root: NodeId) -> NodeId {
    let mut seen: FxHashMap<CseKey, NodeId> = FxHashMap::default();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    cse_visit(tree, root, &mut seen, &mut visited);
    flatten_aliases(tree);
    tree.resolve_alias(root)
}

fn cse_visit(
    tree: &mut ExprTree,
    id: NodeId,
    seen: &mut FxHashMap<CseKey, NodeId>,
    visited: &mut FxHashSet<NodeId>,
) {
    let id = tree.resolve_alias(id);
    if !visited.insert(id) {
        return;
    }
    let key = match tree.node(id).clone() {
        ExprNode::Variable { name, .. } => CseKey::Var(name),
        ExprNode::Constant(value) => CseKey::Const(value),
        // Raw axis immediates are never shared
        ExprNode::Raw(_) => return,
        ExprNode::Alias(_) => unreachable!("alias resolved above"),
        ExprNode::Op { name, kind, args } => {
            let Some(kind) = kind else { return };
            let mut canonical_args: SmallVec<[NodeId; 3]> = SmallVec::with_capacity(args.len());
            for &arg in args.iter() {
                cse_visit(tree, arg, seen, visited);
                canonical_args.push(tree.resolve_alias(arg));
            }
            if let ExprNode::Op { args, .. } = tree.node_mut(id) {
                *args = canonical_args.clone();
            }
            CseKey::Op(name, kind, canonical_args)
        }
    };

    match seen.get(&key).copied() {
        None => {
            seen.insert(key, id);
        }
        Some(canonical) if canonical == id => {}
        Some(canonical) => {
            // Keep the smaller index as the canonical node so aliases
            // always point backwards.
            let (keep, drop) = if canonical < id {
                (canonical, id)
            } else {
                (id, canonical)
            };
            *tree.node_mut(drop) = ExprNode::Alias(keep);
            seen.insert(key, keep);
        }
    }
}

/// Rewrite every op argument to its alias target
fn flatten_aliases(tree: &mut ExprTree) {
    for index in 0..tree.len() {
        let id = NodeId(index as u32);
        let ExprNode::Op { args, .. } = tree.node(id) else {
            continue;
        };
        let resolved: SmallVec<[NodeId; 3]> =
            args.iter().map(|&a| tree.resolve_alias(a)).collect();
        if let ExprNode::Op { args, .. } = tree.node_mut(id) {
            *args = resolved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::resolver::resolve;
    use crate::parser::parse;

    fn optimize_expr(
        input: &str,
        signature: &[(&str, Kind)],
        level: OptLevel,
    ) -> (ExprTree, NodeId) {
        let options = CompileOptions {
            opt_level: level,
            truediv: true,
        };
        let (mut tree, root) = parse(input).unwrap();
        let sig: Vec<(String, Kind)> = signature
            .iter()
            .map(|(n, k)| (n.to_string(), *k))
            .collect();
        resolve(&mut tree, root, &sig, &options).unwrap();
        let root = optimize(&mut tree, root, &options).unwrap();
        (tree, root)
    }

    fn count_ops(tree: &ExprTree, root: NodeId, name: OpName) -> usize {
        let mut seen = FxHashSet::default();
        let mut stack = vec![root];
        let mut count = 0;
        while let Some(id) = stack.pop() {
            let id = tree.resolve_alias(id);
            if !seen.insert(id) {
                continue;
            }
            if let ExprNode::Op {
                name: n, args, ..
            } = tree.node(id)
            {
                if *n == name {
                    count += 1;
                }
                stack.extend(args.iter().copied());
            }
        }
        count
    }

    // =========================================================================
    // Constant folding
    // =========================================================================

    #[test]
    fn test_fold_integer_addition() {
        let (tree, root) = optimize_expr("2 + 2", &[], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Int32(4)),
            other => panic!("expected folded constant, got {:?}", other),
        }
    }

    #[test]
    fn test_fold_through_cast() {
        // 2 + 2.5: the int literal is cast to float64, then folded
        let (tree, root) = optimize_expr("2 + 2.5", &[], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Float64(4.5)),
            other => panic!("expected folded constant, got {:?}", other),
        }
    }

    #[test]
    fn test_fold_enables_parent_fold() {
        let (tree, root) = optimize_expr("(1 + 2) * (3 + 4)", &[], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Int32(21)),
            other => panic!("expected folded constant, got {:?}", other),
        }
    }

    #[test]
    fn test_fold_respects_integer_truncation() {
        let options = CompileOptions {
            opt_level: OptLevel::Moderate,
            truediv: false,
        };
        let (mut tree, root) = parse("7 / 2").unwrap();
        resolve(&mut tree, root, &[], &options).unwrap();
        let root = optimize(&mut tree, root, &options).unwrap();
        match tree.node(root) {
            ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Int32(3)),
            other => panic!("expected folded constant, got {:?}", other),
        }
    }

    #[test]
    fn test_no_fold_with_variables() {
        let (tree, root) = optimize_expr("a + 2", &[("a", Kind::Int32)], OptLevel::Moderate);
        assert!(matches!(tree.node(root), ExprNode::Op { .. }));
    }

    // =========================================================================
    // Algebraic simplification
    // =========================================================================

    #[test]
    fn test_div_by_constant_becomes_mul() {
        let (tree, root) = optimize_expr("a / 4.0", &[("a", Kind::Float64)], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Op { name, args, .. } => {
                assert_eq!(*name, OpName::Mul);
                match tree.node(tree.resolve_alias(args[1])) {
                    ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Float64(0.25)),
                    other => panic!("expected reciprocal constant, got {:?}", other),
                }
            }
            other => panic!("expected mul, got {:?}", other),
        }
    }

    #[test]
    fn test_div_rewrite_skips_integers() {
        let options = CompileOptions {
            opt_level: OptLevel::Moderate,
            truediv: false,
        };
        let (mut tree, root) = parse("a / 4").unwrap();
        resolve(&mut tree, root, &[("a".to_string(), Kind::Int32)], &options).unwrap();
        let root = optimize(&mut tree, root, &options).unwrap();
        match tree.node(root) {
            ExprNode::Op { name, .. } => assert_eq!(*name, OpName::Div),
            other => panic!("expected div, got {:?}", other),
        }
    }

    #[test]
    fn test_pow_one_is_identity() {
        let (tree, root) = optimize_expr("a ** 1", &[("a", Kind::Float64)], OptLevel::Moderate);
        assert!(matches!(tree.node(root), ExprNode::Variable { .. }));
    }

    #[test]
    fn test_pow_zero_is_one() {
        let (tree, root) = optimize_expr("a ** 0", &[("a", Kind::Float64)], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Float64(1.0)),
            other => panic!("expected one, got {:?}", other),
        }
    }

    #[test]
    fn test_pow_two_is_square() {
        let (tree, root) = optimize_expr("a ** 2", &[("a", Kind::Float64)], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Op { name, args, .. } => {
                assert_eq!(*name, OpName::Mul);
                assert_eq!(args[0], args[1]);
            }
            other => panic!("expected square, got {:?}", other),
        }
    }

    #[test]
    fn test_pow_half_is_sqrt() {
        let (tree, root) = optimize_expr("a ** 0.5", &[("a", Kind::Float64)], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Op { name, .. } => assert_eq!(*name, OpName::Sqrt),
            other => panic!("expected sqrt, got {:?}", other),
        }
    }

    #[test]
    fn test_pow_minus_one_is_reciprocal() {
        let (tree, root) = optimize_expr("a ** -1", &[("a", Kind::Float64)], OptLevel::Moderate);
        match tree.node(root) {
            ExprNode::Op { name, args, .. } => {
                assert_eq!(*name, OpName::Div);
                match tree.node(tree.resolve_alias(args[0])) {
                    ExprNode::Constant(v) => assert_eq!(*v, ScalarValue::Float64(1.0)),
                    other => panic!("expected one, got {:?}", other),
                }
            }
            other => panic!("expected div, got {:?}", other),
        }
    }

    #[test]
    fn test_moderate_keeps_large_pow() {
        let (tree, root) = optimize_expr("a ** 8", &[("a", Kind::Float64)], OptLevel::Moderate);
        assert_eq!(count_ops(&tree, root, OpName::Pow), 1);
    }

    #[test]
    fn test_aggressive_expands_pow_by_squaring() {
        let (tree, root) = optimize_expr("a ** 8", &[("a", Kind::Float64)], OptLevel::Aggressive);
        assert_eq!(count_ops(&tree, root, OpName::Pow), 0);
        // a**8 = ((a^2)^2)^2: three squarings
        assert_eq!(count_ops(&tree, root, OpName::Mul), 3);
    }

    #[test]
    fn test_aggressive_half_integer_pow() {
        let (tree, root) = optimize_expr("a ** 2.5", &[("a", Kind::Float64)], OptLevel::Aggressive);
        assert_eq!(count_ops(&tree, root, OpName::Pow), 0);
        assert_eq!(count_ops(&tree, root, OpName::Sqrt), 1);
    }

    #[test]
    fn test_aggressive_negative_pow_inverts_once() {
        let (tree, root) = optimize_expr("a ** -3", &[("a", Kind::Float64)], OptLevel::Aggressive);
        assert_eq!(count_ops(&tree, root, OpName::Pow), 0);
        assert_eq!(count_ops(&tree, root, OpName::Div), 1);
    }

    #[test]
    fn test_aggressive_keeps_huge_pow() {
        let (tree, root) = optimize_expr("a ** 51", &[("a", Kind::Float64)], OptLevel::Aggressive);
        assert_eq!(count_ops(&tree, root, OpName::Pow), 1);
    }

    // =========================================================================
    // CSE
    // =========================================================================

    #[test]
    fn test_cse_collapses_duplicate_subtrees() {
        let (tree, root) = optimize_expr(
            "(a + b) * (a + b)",
            &[("a", Kind::Float64), ("b", Kind::Float64)],
            OptLevel::Moderate,
        );
        assert_eq!(count_ops(&tree, root, OpName::Add), 1);
        match tree.node(root) {
            ExprNode::Op { name, args, .. } => {
                assert_eq!(*name, OpName::Mul);
                assert_eq!(
                    tree.resolve_alias(args[0]),
                    tree.resolve_alias(args[1]),
                    "both operands must share the canonical add node"
                );
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_cse_aliases_point_backwards() {
        let (tree, _) = optimize_expr(
            "(a + b) * (a + b) + (a + b)",
            &[("a", Kind::Float64), ("b", Kind::Float64)],
            OptLevel::Moderate,
        );
        for index in 0..tree.len() {
            if let ExprNode::Alias(target) = tree.node(NodeId(index as u32)) {
                assert!(
                    target.index() < index,
                    "alias at {} points forward to {}",
                    index,
                    target.index()
                );
            }
        }
    }

    #[test]
    fn test_cse_distinguishes_kinds_and_ops() {
        let (tree, root) = optimize_expr(
            "(a + b) * (a - b)",
            &[("a", Kind::Float64), ("b", Kind::Float64)],
            OptLevel::Moderate,
        );
        assert_eq!(count_ops(&tree, root, OpName::Add), 1);
        assert_eq!(count_ops(&tree, root, OpName::Sub), 1);
    }

    #[test]
    fn test_square_and_self_mul_unify() {
        // a**2 simplifies to a*a, which must then CSE with the explicit a*a
        let (tree, root) = optimize_expr(
            "(a ** 2) + (a * a)",
            &[("a", Kind::Float64)],
            OptLevel::Moderate,
        );
        assert_eq!(count_ops(&tree, root, OpName::Mul), 1);
    }
}
