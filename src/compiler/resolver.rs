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

//! Kind resolution and cast insertion
//!
//! Walks the AST bottom-up, assigns every node exactly one [`Kind`], and
//! inserts explicit cast nodes so that after resolution every surviving
//! operation's children share one kind. Concrete opcode existence is
//! verified here: the exact signature is tried first, then every upward
//! promotion; exhausting the promotions is a `NotImplementedOpcode` error.

use rustc_hash::FxHashMap;

use crate::core::error::{Error, Result};
use crate::core::kind::{signature_string, Kind};

use super::opcodes::{global_registry, OpName};
use super::tree::{ExprNode, ExprTree, NodeId};
use super::CompileOptions;

/// Resolve kinds for the tree rooted at `root` against an input signature.
///
/// After this pass every `Variable` and `Op` node has a kind, every binary
/// op's children share one kind, and every op has a registered concrete
/// variant.
pub fn resolve(
    tree: &mut ExprTree,
    root: NodeId,
    signature: &[(String, Kind)],
    options: &CompileOptions,
) -> Result<()> {
    let resolver = Resolver {
        kinds: signature
            .iter()
            .map(|(n, k)| (n.clone(), *k))
            .collect(),
        options: *options,
    };
    resolver.resolve_node(tree, root, true)?;
    Ok(())
}

struct Resolver {
    kinds: FxHashMap<String, Kind>,
    options: CompileOptions,
}

impl Resolver {
    fn resolve_node(&self, tree: &mut ExprTree, id: NodeId, is_root: bool) -> Result<Kind> {
        match tree.node(id).clone() {
            ExprNode::Variable { name, .. } => {
                let kind = *self.kinds.get(&name).ok_or_else(|| {
                    Error::type_error(format!("variable '{}' is not in the input signature", name))
                })?;
                if let ExprNode::Variable { kind: slot, .. } = tree.node_mut(id) {
                    *slot = Some(kind);
                }
                Ok(kind)
            }

            ExprNode::Constant(value) => Ok(value.kind()),

            ExprNode::Raw(_) => Err(Error::internal(
                "raw operand outside a reduction axis position",
            )),

            ExprNode::Alias(target) => self.resolve_node(tree, target, is_root),

            ExprNode::Op { name, args, .. } => {
                if name.is_reduction() && !is_root {
                    return Err(Error::type_error(format!(
                        "'{}' reductions must be the outermost operation",
                        name
                    )));
                }

                // Resolve value children; the trailing Raw axis (reductions
                // only) is an immediate, not a value operand.
                let mut child_kinds = Vec::with_capacity(args.len());
                for &arg in args.iter() {
                    if matches!(tree.node(arg), ExprNode::Raw(_)) {
                        continue;
                    }
                    child_kinds.push((arg, self.resolve_node(tree, arg, false)?));
                }

                let result = self.resolve_op(tree, id, name, &child_kinds)?;
                if let ExprNode::Op { kind, .. } = tree.node_mut(id) {
                    *kind = Some(result);
                }
                Ok(result)
            }
        }
    }

    /// Pick the operand kind and concrete variant for one op, inserting
    /// casts around lower-kinded children. Returns the node's result kind.
    fn resolve_op(
        &self,
        tree: &mut ExprTree,
        id: NodeId,
        name: OpName,
        children: &[(NodeId, Kind)],
    ) -> Result<Kind> {
        match name {
            OpName::Where => {
                let (_, cond_kind) = children[0];
                if cond_kind != Kind::Bool {
                    return Err(Error::type_error(format!(
                        "where() condition must be bool, got {}",
                        cond_kind
                    )));
                }
                let common = Kind::common(children[1].1, children[2].1)?;
                let operand = self.find_variant(name, common, |k| vec![Kind::Bool, k, k])?;
                self.cast_children(tree, id, &children[1..], operand)?;
                Ok(operand)
            }

            OpName::Sum | OpName::Prod => {
                let (_, child_kind) = children[0];
                if !child_kind.is_numeric() {
                    return Err(Error::type_error(format!(
                        "cannot reduce {} values with '{}'",
                        child_kind, name
                    )));
                }
                // Narrow integral accumulators widen to int64, NumPy-style.
                let base = if child_kind.is_integral() {
                    Kind::Int64
                } else {
                    child_kind
                };
                let operand = self.find_variant(name, base, |k| vec![k])?;
                self.cast_children(tree, id, children, operand)?;
                Ok(operand)
            }

            OpName::BitAnd | OpName::BitOr | OpName::BitXor | OpName::Invert => {
                for (_, kind) in children {
                    if !kind.is_integral() && *kind != Kind::Bytes {
                        return Err(Error::type_error(format!(
                            "'{}' requires bool or integer operands, got {}",
                            name, kind
                        )));
                    }
                }
                let common = self.common_kind(children)?;
                let operand = self.find_variant(name, common, |k| vec![k; children.len()])?;
                self.cast_children(tree, id, children, operand)?;
                Ok(operand)
            }

            OpName::Div if self.options.truediv => {
                let common = self.common_kind(children)?;
                // True division never returns an integer kind.
                let base = if common.is_integral() {
                    Kind::Float64
                } else {
                    common
                };
                let operand = self.find_variant(name, base, |k| vec![k, k])?;
                self.cast_children(tree, id, children, operand)?;
                Ok(operand)
            }

            OpName::Pow => {
                let common = self.common_kind(children)?;
                // Integer bases with a negative constant exponent resolve
                // through float64, matching true-division semantics.
                let negative_const_exp = match tree.node(tree.resolve_alias(children[1].0)) {
                    ExprNode::Constant(v) => v.as_f64().map(|x| x < 0.0).unwrap_or(false),
                    _ => false,
                };
                let base = if common.is_integral() && negative_const_exp {
                    Kind::Float64
                } else if common == Kind::Bool {
                    Kind::Int32
                } else {
                    common
                };
                let operand = self.find_variant(name, base, |k| vec![k, k])?;
                self.cast_children(tree, id, children, operand)?;
                Ok(operand)
            }

            _ if name.is_transcendental() => {
                let common = self.common_kind(children)?;
                // Integer arguments promote to float64 before dispatch.
                let base = if common.is_integral() {
                    Kind::Float64
                } else {
                    common
                };
                let operand = self.find_variant(name, base, |k| vec![k; children.len()])?;
                self.cast_children(tree, id, children, operand)?;
                // Result kind may differ from the operand kind (none do
                // today among transcendentals, but the table is the truth).
                Ok(self.result_kind(name, operand, children.len()))
            }

            _ => {
                // Copy/Cast, unary arithmetic, binary arithmetic, comparisons
                let common = self.common_kind(children)?;
                let arity = children.len();
                let operand = self.find_variant(name, common, |k| vec![k; arity])?;
                self.cast_children(tree, id, children, operand)?;
                Ok(self.result_kind(name, operand, arity))
            }
        }
    }

    fn common_kind(&self, children: &[(NodeId, Kind)]) -> Result<Kind> {
        let mut iter = children.iter();
        let (_, first) = iter.next().expect("op must have at least one operand");
        iter.try_fold(*first, |acc, (_, k)| Kind::common(acc, *k))
    }

    /// Try `base`, then every upward promotion of it, until a concrete
    /// variant is registered. Returns the chosen operand kind.
    fn find_variant(
        &self,
        name: OpName,
        base: Kind,
        make_sig: impl Fn(Kind) -> Vec<Kind>,
    ) -> Result<Kind> {
        let registry = global_registry();
        if registry.lookup(name, &make_sig(base)).is_some() {
            return Ok(base);
        }
        for candidate in base.promotions() {
            if registry.lookup(name, &make_sig(candidate)).is_some() {
                return Ok(candidate);
            }
        }
        Err(Error::not_implemented(
            name.as_str(),
            signature_string(&make_sig(base)),
        ))
    }

    /// The table result kind for the chosen variant
    fn result_kind(&self, name: OpName, operand: Kind, arity: usize) -> Kind {
        let registry = global_registry();
        let sig = vec![operand; arity];
        registry
            .lookup(name, &sig)
            .map(|op| op.result())
            .unwrap_or(operand)
    }

    /// Wrap every child whose kind differs from `target` in a cast node
    fn cast_children(
        &self,
        tree: &mut ExprTree,
        id: NodeId,
        children: &[(NodeId, Kind)],
        target: Kind,
    ) -> Result<()> {
        for (child, kind) in children {
            if *kind == target {
                continue;
            }
            if global_registry().lookup_cast(*kind, target).is_none() {
                return Err(Error::type_error(format!(
                    "cannot convert {} operand to {}",
                    kind, target
                )));
            }
            let cast = tree.push(ExprNode::Op {
                name: OpName::Cast,
                kind: Some(target),
                args: smallvec::smallvec![*child],
            });
            if let ExprNode::Op { args, .. } = tree.node_mut(id) {
                for arg in args.iter_mut() {
                    if arg == child {
                        *arg = cast;
                    }
                }
            }
        }
        Ok(())
    }
}
