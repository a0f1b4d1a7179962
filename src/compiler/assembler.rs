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

//! Bytecode assembly
//!
//! Linearizes the allocated tree into instructions, walking the exact
//! post-order the register allocator used; that shared order is what
//! guarantees every operand register is written before it is read.
//! Aliases contribute no instructions. Operations with a third source
//! operand emit a `noop` continuation group carrying the overflow operand.

use crate::core::error::{Error, Result};
use crate::core::kind::Kind;

use super::opcodes::{global_registry, ConcreteOp, OpName, NOOP};
use super::program::{CompiledExpression, Instruction, Reduction};
use super::registers::{post_order_ops, Allocation, NO_REG};
use super::tree::{ExprNode, ExprTree, NodeId};

/// Assemble the allocated tree into a compiled expression
pub fn assemble(
    tree: &ExprTree,
    root: NodeId,
    alloc: Allocation,
    signature: &[(String, Kind)],
    expr_text: &str,
) -> Result<CompiledExpression> {
    let root = tree.resolve_alias(root);
    let output_kind = tree
        .kind_of(root)
        .ok_or_else(|| Error::internal("unresolved root kind during assembly"))?;

    let mut program = Vec::new();
    let mut reduction = None;

    match tree.node(root) {
        // A bare variable or constant compiles to one copy into the output.
        ExprNode::Variable { .. } | ExprNode::Constant(_) => {
            let src = alloc
                .reg(tree, root)
                .ok_or_else(|| Error::internal("leaf root without a register"))?;
            let copy = global_registry()
                .lookup_copy(output_kind)
                .ok_or_else(|| Error::not_implemented("copy", output_kind.letter().to_string()))?;
            program.push(Instruction::new(copy, 0, src, NO_REG));
        }

        ExprNode::Op { .. } => {
            for &node in &post_order_ops(tree, root) {
                emit(tree, node, &alloc, &mut program, &mut reduction)?;
            }
        }

        ExprNode::Raw(_) | ExprNode::Alias(_) => {
            return Err(Error::internal("cannot assemble a raw or alias root"))
        }
    }

    Ok(CompiledExpression::new(
        expr_text.to_string(),
        signature.to_vec(),
        alloc.constants,
        alloc.temp_kinds,
        output_kind,
        program,
        reduction,
    ))
}

/// Emit the instruction (plus continuations) for one op node
fn emit(
    tree: &ExprTree,
    node: NodeId,
    alloc: &Allocation,
    program: &mut Vec<Instruction>,
    reduction: &mut Option<Reduction>,
) -> Result<()> {
    let ExprNode::Op { name, kind, args } = tree.node(node) else {
        return Err(Error::internal("emit called on a non-op node"));
    };
    let kind = (*kind).ok_or_else(|| Error::internal("unresolved op kind during assembly"))?;

    let dest = alloc
        .reg(tree, node)
        .ok_or_else(|| Error::internal("op node without a register"))?;

    // Split value operands from the reduction-axis immediate.
    let mut operand_regs: Vec<u8> = Vec::with_capacity(args.len());
    let mut operand_kinds: Vec<Kind> = Vec::with_capacity(args.len());
    let mut axis: Option<i64> = None;
    for &arg in args.iter() {
        let arg = tree.resolve_alias(arg);
        match tree.node(arg) {
            ExprNode::Raw(value) => axis = Some(*value),
            _ => {
                operand_regs.push(
                    alloc
                        .reg(tree, arg)
                        .ok_or_else(|| Error::internal("operand without a register"))?,
                );
                operand_kinds.push(
                    tree.kind_of(arg)
                        .ok_or_else(|| Error::internal("unresolved operand kind"))?,
                );
            }
        }
    }

    let op = concrete_op(*name, kind, &operand_kinds)?;

    if name.is_reduction() {
        let axis_byte = match axis {
            None => NO_REG,
            Some(value) => {
                if !(0..NO_REG as i64).contains(&value) {
                    return Err(Error::value(format!("reduction axis {} out of range", value)));
                }
                value as u8
            }
        };
        *reduction = Some(Reduction {
            op: *name,
            axis: axis.map(|a| a as usize),
        });
        program.push(Instruction::new(op, dest, operand_regs[0], axis_byte));
        return Ok(());
    }

    let first = operand_regs.first().copied().unwrap_or(NO_REG);
    let second = operand_regs.get(1).copied().unwrap_or(NO_REG);
    program.push(Instruction::new(op, dest, first, second));

    // Overflow operands ride in noop continuation groups, three per group.
    let mut rest = operand_regs[operand_regs.len().min(2)..].chunks(3);
    for chunk in &mut rest {
        program.push(Instruction::new(
            NOOP,
            chunk.first().copied().unwrap_or(NO_REG),
            chunk.get(1).copied().unwrap_or(NO_REG),
            chunk.get(2).copied().unwrap_or(NO_REG),
        ));
    }
    Ok(())
}

/// Resolve the concrete opcode for an op whose kinds are already settled
fn concrete_op(name: OpName, kind: Kind, operand_kinds: &[Kind]) -> Result<ConcreteOp> {
    let registry = global_registry();
    let found = match name {
        OpName::Cast => registry.lookup_cast(operand_kinds[0], kind),
        _ => registry.lookup(name, operand_kinds),
    };
    // The resolver proved this lookup succeeds; a miss here is a compiler bug.
    found.ok_or_else(|| {
        Error::internal(format!(
            "no concrete opcode for resolved op '{}' ({})",
            name,
            crate::core::kind::signature_string(operand_kinds)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::optimizer::optimize;
    use crate::compiler::registers::allocate;
    use crate::compiler::resolver::resolve;
    use crate::compiler::{CompileOptions, OptLevel};
    use crate::parser::parse;

    fn compile_raw(input: &str, signature: &[(&str, Kind)], level: OptLevel) -> CompiledExpression {
        let options = CompileOptions {
            opt_level: level,
            truediv: true,
        };
        let sig: Vec<(String, Kind)> = signature
            .iter()
            .map(|(n, k)| (n.to_string(), *k))
            .collect();
        let (mut tree, root) = parse(input).unwrap();
        resolve(&mut tree, root, &sig, &options).unwrap();
        let root = optimize(&mut tree, root, &options).unwrap();
        let alloc = allocate(&tree, root, &sig).unwrap();
        assemble(&tree, root, alloc, &sig, input).unwrap()
    }

    // =========================================================================
    // Emission shapes
    // =========================================================================

    #[test]
    fn test_single_instruction_addition() {
        let prog = compile_raw("a + b", &[("a", Kind::Float64), ("b", Kind::Float64)], OptLevel::Moderate);
        assert_eq!(prog.program().len(), 1);
        let instr = prog.program()[0];
        assert_eq!(instr.op.name(), OpName::Add);
        assert_eq!(instr.dest, 0);
        assert_eq!(instr.arg1, 1);
        assert_eq!(instr.arg2, 2);
        prog.validate().unwrap();
    }

    #[test]
    fn test_folded_constant_compiles_to_copy() {
        let prog = compile_raw("2 + 2", &[], OptLevel::Moderate);
        assert_eq!(prog.program().len(), 1);
        assert_eq!(prog.program()[0].op.name(), OpName::Copy);
        assert_eq!(prog.constant_pool().len(), 1);
        prog.validate().unwrap();
    }

    #[test]
    fn test_cse_emits_one_add() {
        let prog = compile_raw(
            "(a + b) * (a + b)",
            &[("a", Kind::Float64), ("b", Kind::Float64)],
            OptLevel::Moderate,
        );
        let adds = prog
            .program()
            .iter()
            .filter(|i| i.op.name() == OpName::Add)
            .count();
        assert_eq!(adds, 1);
        prog.validate().unwrap();
    }

    #[test]
    fn test_where_emits_continuation() {
        let prog = compile_raw(
            "where(a > 0.0, b, c)",
            &[
                ("a", Kind::Float64),
                ("b", Kind::Float64),
                ("c", Kind::Float64),
            ],
            OptLevel::Moderate,
        );
        let position = prog
            .program()
            .iter()
            .position(|i| i.op.name() == OpName::Where)
            .expect("where instruction present");
        let continuation = prog.program()[position + 1];
        assert!(continuation.is_continuation());
        assert_ne!(continuation.dest, NO_REG);
        assert_eq!(continuation.arg1, NO_REG);
        prog.validate().unwrap();
    }

    #[test]
    fn test_reduction_axis_is_immediate() {
        let prog = compile_raw("sum(x, axis=0)", &[("x", Kind::Float64)], OptLevel::Moderate);
        let last = *prog.program().last().unwrap();
        assert_eq!(last.op.name(), OpName::Sum);
        assert_eq!(last.dest, 0);
        assert_eq!(last.arg2, 0, "axis 0 rides as an immediate byte");
        assert_eq!(
            prog.reduction(),
            Some(Reduction {
                op: OpName::Sum,
                axis: Some(0)
            })
        );
        prog.validate().unwrap();
    }

    #[test]
    fn test_full_reduction_has_absent_axis() {
        let prog = compile_raw("sum(x)", &[("x", Kind::Float64)], OptLevel::Moderate);
        let last = *prog.program().last().unwrap();
        assert_eq!(last.arg2, NO_REG);
        assert_eq!(
            prog.reduction(),
            Some(Reduction {
                op: OpName::Sum,
                axis: None
            })
        );
    }

    #[test]
    fn test_cast_instruction_emitted() {
        let prog = compile_raw(
            "a + b",
            &[("a", Kind::Int32), ("b", Kind::Float64)],
            OptLevel::Moderate,
        );
        let casts = prog
            .program()
            .iter()
            .filter(|i| i.op.name() == OpName::Cast)
            .count();
        assert_eq!(casts, 1);
        prog.validate().unwrap();
    }

    #[test]
    fn test_bare_variable_compiles_to_copy() {
        let prog = compile_raw("a", &[("a", Kind::Float64)], OptLevel::Moderate);
        assert_eq!(prog.program().len(), 1);
        let instr = prog.program()[0];
        assert_eq!(instr.op.name(), OpName::Copy);
        assert_eq!(instr.dest, 0);
        assert_eq!(instr.arg1, 1);
    }

    #[test]
    fn test_wire_bytes_round_trip_structure() {
        let prog = compile_raw(
            "2.0*a + 3.0*b*c",
            &[
                ("a", Kind::Float64),
                ("b", Kind::Float64),
                ("c", Kind::Float64),
            ],
            OptLevel::Moderate,
        );
        let bytes = prog.encode();
        assert_eq!(bytes.len(), prog.program().len() * 4);
        for (index, instruction) in prog.program().iter().enumerate() {
            assert_eq!(&bytes[index * 4..index * 4 + 4], &instruction.encode());
        }
        prog.validate().unwrap();
    }

    #[test]
    fn test_every_register_below_sentinel() {
        let prog = compile_raw(
            "sqrt(a*a + b*b) / (a + b) * (a - b)",
            &[("a", Kind::Float64), ("b", Kind::Float64)],
            OptLevel::Aggressive,
        );
        for instruction in prog.program() {
            assert!(instruction.dest < 255);
        }
        prog.validate().unwrap();
    }
}
