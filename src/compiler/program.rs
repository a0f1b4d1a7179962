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

//! Compiled expression programs
//!
//! A [`CompiledExpression`] is the immutable output of the compiler: a flat
//! instruction sequence plus the metadata the VM needs to size its buffers
//! (input signature, constant pool, temporary kinds). It is safely shared
//! across threads and across any number of `run()` calls.
//!
//! Wire format: each instruction encodes as 4 bytes
//! `[opcode, dest, arg1, arg2]`, with `0xFF` meaning "absent operand".
//! Instructions with more than two source operands append continuation
//! groups whose opcode byte is the reserved `noop` code; the VM treats a
//! noop following an instruction as extra operands, not as a step.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::core::array::NdArray;
use crate::core::error::{Error, Result};
use crate::core::kind::Kind;
use crate::core::scalar::ScalarValue;

use super::opcodes::{ConcreteOp, OpName, NOOP};
use super::registers::NO_REG;

/// One fixed-width instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Concrete opcode (table index, also the wire byte)
    pub op: ConcreteOp,
    /// Destination register (for continuations: the third source operand)
    pub dest: u8,
    /// First source operand or 0xFF
    pub arg1: u8,
    /// Second source operand, reduction-axis immediate, or 0xFF
    pub arg2: u8,
}

impl Instruction {
    /// Create an instruction
    pub fn new(op: ConcreteOp, dest: u8, arg1: u8, arg2: u8) -> Self {
        Self {
            op,
            dest,
            arg1,
            arg2,
        }
    }

    /// The 4-byte wire encoding
    pub fn encode(&self) -> [u8; 4] {
        [self.op.0, self.dest, self.arg1, self.arg2]
    }

    /// True for continuation groups carrying overflow operands
    pub fn is_continuation(&self) -> bool {
        self.op == NOOP
    }
}

/// Reduction metadata for programs whose outermost operation is sum/prod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    /// The reduction operation
    pub op: OpName,
    /// Reduced axis; None reduces over the whole array
    pub axis: Option<usize>,
}

/// An immutable compiled expression
#[derive(Clone)]
pub struct CompiledExpression {
    expr: String,
    input_signature: Vec<(String, Kind)>,
    constant_pool: Vec<ScalarValue>,
    temp_signature: Vec<Kind>,
    output_kind: Kind,
    program: Vec<Instruction>,
    reduction: Option<Reduction>,
}

impl CompiledExpression {
    /// Assemble a compiled expression from its parts (compiler-internal)
    pub(crate) fn new(
        expr: String,
        input_signature: Vec<(String, Kind)>,
        constant_pool: Vec<ScalarValue>,
        temp_signature: Vec<Kind>,
        output_kind: Kind,
        program: Vec<Instruction>,
        reduction: Option<Reduction>,
    ) -> Self {
        Self {
            expr,
            input_signature,
            constant_pool,
            temp_signature,
            output_kind,
            program,
            reduction,
        }
    }

    /// The original expression text
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Input names and kinds, in register order
    pub fn input_signature(&self) -> &[(String, Kind)] {
        &self.input_signature
    }

    /// Constants, in register order
    pub fn constant_pool(&self) -> &[ScalarValue] {
        &self.constant_pool
    }

    /// Temporary register kinds, in register order
    pub fn temp_signature(&self) -> &[Kind] {
        &self.temp_signature
    }

    /// Kind of the result (for reductions: the accumulator kind)
    pub fn output_kind(&self) -> Kind {
        self.output_kind
    }

    /// The instruction sequence
    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    /// Reduction metadata, when the outermost operation is sum/prod
    pub fn reduction(&self) -> Option<Reduction> {
        self.reduction
    }

    /// Total register count: output + inputs + constants + temporaries
    pub fn n_registers(&self) -> usize {
        1 + self.input_signature.len() + self.constant_pool.len() + self.temp_signature.len()
    }

    /// The kind stored in register `reg`
    pub fn register_kind(&self, reg: u8) -> Kind {
        let reg = reg as usize;
        let n_inputs = self.input_signature.len();
        let n_consts = self.constant_pool.len();
        if reg == 0 {
            self.output_kind
        } else if reg <= n_inputs {
            self.input_signature[reg - 1].1
        } else if reg <= n_inputs + n_consts {
            self.constant_pool[reg - 1 - n_inputs].kind()
        } else {
            self.temp_signature[reg - 1 - n_inputs - n_consts]
        }
    }

    /// Encode the whole program as wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.program.len() * 4);
        for instruction in &self.program {
            bytes.extend_from_slice(&instruction.encode());
        }
        bytes
    }

    /// Human-readable listing for debugging
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (index, instruction) in self.program.iter().enumerate() {
            let reg = |r: u8| {
                if r == NO_REG {
                    "--".to_string()
                } else {
                    format!("r{}", r)
                }
            };
            if instruction.is_continuation() {
                out.push_str(&format!(
                    "{:04}:   .. {}, {}, {}\n",
                    index,
                    reg(instruction.dest),
                    reg(instruction.arg1),
                    reg(instruction.arg2)
                ));
            } else if instruction.op.name().is_reduction() {
                let axis = if instruction.arg2 == NO_REG {
                    "axis=all".to_string()
                } else {
                    format!("axis={}", instruction.arg2)
                };
                out.push_str(&format!(
                    "{:04}: {} {}, {}, {}\n",
                    index,
                    instruction.op,
                    reg(instruction.dest),
                    reg(instruction.arg1),
                    axis
                ));
            } else {
                out.push_str(&format!(
                    "{:04}: {} {}, {}, {}\n",
                    index,
                    instruction.op,
                    reg(instruction.dest),
                    reg(instruction.arg1),
                    reg(instruction.arg2)
                ));
            }
        }
        out
    }

    /// Check the program's register invariants: every referenced register
    /// is in range and every source is defined before use.
    pub fn validate(&self) -> Result<()> {
        let n_registers = self.n_registers();
        let n_inputs = self.input_signature.len();
        let n_consts = self.constant_pool.len();

        let mut defined: FxHashSet<u8> = (1..=(n_inputs + n_consts) as u8).collect();
        if self.reduction.is_some() {
            // The accumulator is initialized by the VM before the loop.
            defined.insert(0);
        }

        let check = |reg: u8, defined: &FxHashSet<u8>| -> Result<()> {
            if reg as usize >= n_registers {
                return Err(Error::internal(format!(
                    "register r{} out of range ({} allocated)",
                    reg, n_registers
                )));
            }
            if !defined.contains(&reg) {
                return Err(Error::internal(format!("register r{} read before write", reg)));
            }
            Ok(())
        };

        for instruction in &self.program {
            if instruction.is_continuation() {
                for reg in [instruction.dest, instruction.arg1, instruction.arg2] {
                    if reg != NO_REG {
                        check(reg, &defined)?;
                    }
                }
                continue;
            }
            if instruction.arg1 != NO_REG {
                check(instruction.arg1, &defined)?;
            }
            // arg2 of a reduction is an immediate axis, not a register
            if instruction.arg2 != NO_REG && !instruction.op.name().is_reduction() {
                check(instruction.arg2, &defined)?;
            }
            if instruction.dest as usize >= n_registers {
                return Err(Error::internal(format!(
                    "destination r{} out of range ({} allocated)",
                    instruction.dest, n_registers
                )));
            }
            defined.insert(instruction.dest);
        }
        Ok(())
    }

    /// Evaluate the program against concrete inputs.
    ///
    /// `inputs` must match the input signature in order and count; pass
    /// scalars as 0-d arrays. When `out` is given, its shape and kind must
    /// match the result exactly and it is written in place.
    pub fn run(&self, inputs: &[&NdArray], out: Option<NdArray>) -> Result<NdArray> {
        crate::vm::machine::run(self, inputs, out)
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("expr", &self.expr)
            .field("inputs", &self.input_signature.len())
            .field("constants", &self.constant_pool.len())
            .field("temps", &self.temp_signature.len())
            .field("instructions", &self.program.len())
            .field("output_kind", &self.output_kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::opcodes::global_registry;

    fn add_dd() -> ConcreteOp {
        global_registry()
            .lookup(OpName::Add, &[Kind::Float64, Kind::Float64])
            .unwrap()
    }

    #[test]
    fn test_encode_four_bytes() {
        let op = add_dd();
        let instr = Instruction::new(op, 0, 1, 2);
        assert_eq!(instr.encode(), [op.0, 0, 1, 2]);
    }

    #[test]
    fn test_absent_operand_byte() {
        let copy = global_registry().lookup_copy(Kind::Float64).unwrap();
        let instr = Instruction::new(copy, 0, 1, NO_REG);
        assert_eq!(instr.encode()[3], 0xFF);
    }

    fn small_program() -> CompiledExpression {
        // out = a + b
        CompiledExpression::new(
            "a + b".to_string(),
            vec![
                ("a".to_string(), Kind::Float64),
                ("b".to_string(), Kind::Float64),
            ],
            vec![],
            vec![],
            Kind::Float64,
            vec![Instruction::new(add_dd(), 0, 1, 2)],
            None,
        )
    }

    #[test]
    fn test_register_kind_ranges() {
        let prog = CompiledExpression::new(
            "a + 2.5".to_string(),
            vec![("a".to_string(), Kind::Float64)],
            vec![ScalarValue::Float64(2.5)],
            vec![Kind::Bool],
            Kind::Float64,
            vec![],
            None,
        );
        assert_eq!(prog.register_kind(0), Kind::Float64);
        assert_eq!(prog.register_kind(1), Kind::Float64);
        assert_eq!(prog.register_kind(2), Kind::Float64);
        assert_eq!(prog.register_kind(3), Kind::Bool);
        assert_eq!(prog.n_registers(), 4);
    }

    #[test]
    fn test_validate_accepts_def_before_use() {
        assert!(small_program().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_undefined_read() {
        let prog = CompiledExpression::new(
            "bad".to_string(),
            vec![("a".to_string(), Kind::Float64)],
            vec![],
            vec![Kind::Float64],
            Kind::Float64,
            // reads temp r2 before anything wrote it
            vec![Instruction::new(add_dd(), 0, 1, 2)],
            None,
        );
        assert!(prog.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let prog = CompiledExpression::new(
            "bad".to_string(),
            vec![("a".to_string(), Kind::Float64)],
            vec![],
            vec![],
            Kind::Float64,
            vec![Instruction::new(add_dd(), 9, 1, 1)],
            None,
        );
        assert!(prog.validate().is_err());
    }

    #[test]
    fn test_disassemble_mentions_opcodes() {
        let text = small_program().disassemble();
        assert!(text.contains("0000:"));
        assert!(text.contains("add_ddd"));
        assert!(text.contains("r0"));
    }

    #[test]
    fn test_debug_is_a_summary() {
        let text = format!("{:?}", small_program());
        assert!(text.contains("CompiledExpression"));
        assert!(text.contains("instructions"));
    }
}
