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

//! Abstract operations and the concrete opcode table
//!
//! An [`OpName`] identifies an abstract operation (add, sqrt, where, ...);
//! a [`ConcreteOp`] is one row of the static [`OP_TABLE`], i.e. an operation
//! specialized to a kind signature. The table index is the opcode byte of
//! the wire format, so the numbering is stable by construction.
//!
//! Lookups go through [`OpRegistry`], a map built once from the table —
//! never through string concatenation.

use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::core::kind::{signature_string, Kind};

/// Abstract operation names, prior to kind-variant resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpName {
    /// Continuation marker / extra-operand carrier in the wire format
    Noop,
    /// Register-to-register copy
    Copy,
    /// Upward kind conversion
    Cast,

    // Unary arithmetic
    Neg,
    Abs,
    /// Logical not on Bool, bitwise not on integers
    Invert,

    // Binary arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    /// Logical and on Bool, bitwise and on integers
    BitAnd,
    /// Logical or on Bool, bitwise or on integers
    BitOr,
    /// Logical xor on Bool, bitwise xor on integers
    BitXor,

    // Comparisons (always produce Bool)
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    /// Elementwise select: where(cond, a, b)
    Where,

    // Transcendental functions
    Sqrt,
    Exp,
    Expm1,
    Log,
    Log10,
    Log1p,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Arctan2,
    Sinh,
    Cosh,
    Tanh,
    Arcsinh,
    Arccosh,
    Arctanh,
    Floor,
    Ceil,

    // Complex helpers
    Real,
    Imag,
    Conj,

    // Reductions (accumulate across chunks)
    Sum,
    Prod,
}

impl OpName {
    /// Number of register operands (the optional reduction axis is an
    /// immediate, not an operand)
    pub fn arity(&self) -> usize {
        use OpName::*;
        match self {
            Noop => 0,
            Copy | Cast | Neg | Abs | Invert | Sqrt | Exp | Expm1 | Log | Log10 | Log1p | Sin
            | Cos | Tan | Arcsin | Arccos | Arctan | Sinh | Cosh | Tanh | Arcsinh | Arccosh
            | Arctanh | Floor | Ceil | Real | Imag | Conj | Sum | Prod => 1,
            Add | Sub | Mul | Div | Mod | Pow | LShift | RShift | BitAnd | BitOr | BitXor | Lt
            | Le | Gt | Ge | Eq | Ne | Arctan2 => 2,
            Where => 3,
        }
    }

    /// True for sum/prod
    pub fn is_reduction(&self) -> bool {
        matches!(self, OpName::Sum | OpName::Prod)
    }

    /// True for the six comparison operators
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            OpName::Lt | OpName::Le | OpName::Gt | OpName::Ge | OpName::Eq | OpName::Ne
        )
    }

    /// True for functions that never return an integer kind
    pub fn is_transcendental(&self) -> bool {
        use OpName::*;
        matches!(
            self,
            Sqrt | Exp | Expm1 | Log | Log10 | Log1p | Sin | Cos | Tan | Arcsin | Arccos
                | Arctan | Arctan2 | Sinh | Cosh | Tanh | Arcsinh | Arccosh | Arctanh
        )
    }

    /// Map a function name from expression text to its operation
    pub fn from_func_name(name: &str) -> Option<OpName> {
        use OpName::*;
        Some(match name {
            "abs" => Abs,
            "sqrt" => Sqrt,
            "exp" => Exp,
            "expm1" => Expm1,
            "log" => Log,
            "log10" => Log10,
            "log1p" => Log1p,
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            "arcsin" => Arcsin,
            "arccos" => Arccos,
            "arctan" => Arctan,
            "arctan2" => Arctan2,
            "sinh" => Sinh,
            "cosh" => Cosh,
            "tanh" => Tanh,
            "arcsinh" => Arcsinh,
            "arccosh" => Arccosh,
            "arctanh" => Arctanh,
            "floor" => Floor,
            "ceil" => Ceil,
            "real" => Real,
            "imag" => Imag,
            "conj" => Conj,
            "where" => Where,
            "pow" => Pow,
            "sum" => Sum,
            "prod" => Prod,
            _ => return None,
        })
    }

    /// Lowercase display name
    pub fn as_str(&self) -> &'static str {
        use OpName::*;
        match self {
            Noop => "noop",
            Copy => "copy",
            Cast => "cast",
            Neg => "neg",
            Abs => "abs",
            Invert => "invert",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Pow => "pow",
            LShift => "lshift",
            RShift => "rshift",
            BitAnd => "and",
            BitOr => "or",
            BitXor => "xor",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            Eq => "eq",
            Ne => "ne",
            Where => "where",
            Sqrt => "sqrt",
            Exp => "exp",
            Expm1 => "expm1",
            Log => "log",
            Log10 => "log10",
            Log1p => "log1p",
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
            Arcsin => "arcsin",
            Arccos => "arccos",
            Arctan => "arctan",
            Arctan2 => "arctan2",
            Sinh => "sinh",
            Cosh => "cosh",
            Tanh => "tanh",
            Arcsinh => "arcsinh",
            Arccosh => "arccosh",
            Arctanh => "arctanh",
            Floor => "floor",
            Ceil => "ceil",
            Real => "real",
            Imag => "imag",
            Conj => "conj",
            Sum => "sum",
            Prod => "prod",
        }
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the opcode table: an operation specialized to operand kinds
#[derive(Debug, Clone, Copy)]
pub struct OpSpec {
    /// The abstract operation
    pub name: OpName,
    /// Operand kinds, in operand order
    pub operands: &'static [Kind],
    /// Result kind
    pub result: Kind,
}

macro_rules! op {
    ($name:ident, [$($k:ident),*], $res:ident) => {
        OpSpec {
            name: OpName::$name,
            operands: &[$(Kind::$k),*],
            result: Kind::$res,
        }
    };
}

/// The concrete opcode table. The index of a row is its opcode byte in the
/// wire format; rows are only ever appended, never reordered.
pub static OP_TABLE: &[OpSpec] = &[
    // Continuation marker; operand bytes carry overflow operands
    op!(Noop, [], Bool),
    // Copies
    op!(Copy, [Bool], Bool),
    op!(Copy, [Int32], Int32),
    op!(Copy, [Int64], Int64),
    op!(Copy, [Float32], Float32),
    op!(Copy, [Float64], Float64),
    op!(Copy, [Complex128], Complex128),
    op!(Copy, [Bytes], Bytes),
    // Upward casts
    op!(Cast, [Bool], Int32),
    op!(Cast, [Bool], Int64),
    op!(Cast, [Bool], Float32),
    op!(Cast, [Bool], Float64),
    op!(Cast, [Bool], Complex128),
    op!(Cast, [Int32], Int64),
    op!(Cast, [Int32], Float32),
    op!(Cast, [Int32], Float64),
    op!(Cast, [Int32], Complex128),
    op!(Cast, [Int64], Float32),
    op!(Cast, [Int64], Float64),
    op!(Cast, [Int64], Complex128),
    op!(Cast, [Float32], Float64),
    op!(Cast, [Float32], Complex128),
    op!(Cast, [Float64], Complex128),
    // Unary arithmetic
    op!(Neg, [Int32], Int32),
    op!(Neg, [Int64], Int64),
    op!(Neg, [Float32], Float32),
    op!(Neg, [Float64], Float64),
    op!(Neg, [Complex128], Complex128),
    op!(Abs, [Int32], Int32),
    op!(Abs, [Int64], Int64),
    op!(Abs, [Float32], Float32),
    op!(Abs, [Float64], Float64),
    op!(Abs, [Complex128], Float64),
    op!(Invert, [Bool], Bool),
    op!(Invert, [Int32], Int32),
    op!(Invert, [Int64], Int64),
    // Binary arithmetic
    op!(Add, [Int32, Int32], Int32),
    op!(Add, [Int64, Int64], Int64),
    op!(Add, [Float32, Float32], Float32),
    op!(Add, [Float64, Float64], Float64),
    op!(Add, [Complex128, Complex128], Complex128),
    op!(Sub, [Int32, Int32], Int32),
    op!(Sub, [Int64, Int64], Int64),
    op!(Sub, [Float32, Float32], Float32),
    op!(Sub, [Float64, Float64], Float64),
    op!(Sub, [Complex128, Complex128], Complex128),
    op!(Mul, [Int32, Int32], Int32),
    op!(Mul, [Int64, Int64], Int64),
    op!(Mul, [Float32, Float32], Float32),
    op!(Mul, [Float64, Float64], Float64),
    op!(Mul, [Complex128, Complex128], Complex128),
    op!(Div, [Int32, Int32], Int32),
    op!(Div, [Int64, Int64], Int64),
    op!(Div, [Float32, Float32], Float32),
    op!(Div, [Float64, Float64], Float64),
    op!(Div, [Complex128, Complex128], Complex128),
    op!(Mod, [Int32, Int32], Int32),
    op!(Mod, [Int64, Int64], Int64),
    op!(Mod, [Float32, Float32], Float32),
    op!(Mod, [Float64, Float64], Float64),
    op!(Pow, [Int32, Int32], Int32),
    op!(Pow, [Int64, Int64], Int64),
    op!(Pow, [Float32, Float32], Float32),
    op!(Pow, [Float64, Float64], Float64),
    op!(Pow, [Complex128, Complex128], Complex128),
    op!(LShift, [Int32, Int32], Int32),
    op!(LShift, [Int64, Int64], Int64),
    op!(RShift, [Int32, Int32], Int32),
    op!(RShift, [Int64, Int64], Int64),
    op!(BitAnd, [Bool, Bool], Bool),
    op!(BitAnd, [Int32, Int32], Int32),
    op!(BitAnd, [Int64, Int64], Int64),
    op!(BitOr, [Bool, Bool], Bool),
    op!(BitOr, [Int32, Int32], Int32),
    op!(BitOr, [Int64, Int64], Int64),
    op!(BitXor, [Bool, Bool], Bool),
    op!(BitXor, [Int32, Int32], Int32),
    op!(BitXor, [Int64, Int64], Int64),
    // Ordering comparisons
    op!(Lt, [Int32, Int32], Bool),
    op!(Lt, [Int64, Int64], Bool),
    op!(Lt, [Float32, Float32], Bool),
    op!(Lt, [Float64, Float64], Bool),
    op!(Lt, [Bytes, Bytes], Bool),
    op!(Le, [Int32, Int32], Bool),
    op!(Le, [Int64, Int64], Bool),
    op!(Le, [Float32, Float32], Bool),
    op!(Le, [Float64, Float64], Bool),
    op!(Le, [Bytes, Bytes], Bool),
    op!(Gt, [Int32, Int32], Bool),
    op!(Gt, [Int64, Int64], Bool),
    op!(Gt, [Float32, Float32], Bool),
    op!(Gt, [Float64, Float64], Bool),
    op!(Gt, [Bytes, Bytes], Bool),
    op!(Ge, [Int32, Int32], Bool),
    op!(Ge, [Int64, Int64], Bool),
    op!(Ge, [Float32, Float32], Bool),
    op!(Ge, [Float64, Float64], Bool),
    op!(Ge, [Bytes, Bytes], Bool),
    // Equality comparisons
    op!(Eq, [Bool, Bool], Bool),
    op!(Eq, [Int32, Int32], Bool),
    op!(Eq, [Int64, Int64], Bool),
    op!(Eq, [Float32, Float32], Bool),
    op!(Eq, [Float64, Float64], Bool),
    op!(Eq, [Complex128, Complex128], Bool),
    op!(Eq, [Bytes, Bytes], Bool),
    op!(Ne, [Bool, Bool], Bool),
    op!(Ne, [Int32, Int32], Bool),
    op!(Ne, [Int64, Int64], Bool),
    op!(Ne, [Float32, Float32], Bool),
    op!(Ne, [Float64, Float64], Bool),
    op!(Ne, [Complex128, Complex128], Bool),
    op!(Ne, [Bytes, Bytes], Bool),
    // Select
    op!(Where, [Bool, Bool, Bool], Bool),
    op!(Where, [Bool, Int32, Int32], Int32),
    op!(Where, [Bool, Int64, Int64], Int64),
    op!(Where, [Bool, Float32, Float32], Float32),
    op!(Where, [Bool, Float64, Float64], Float64),
    op!(Where, [Bool, Complex128, Complex128], Complex128),
    op!(Where, [Bool, Bytes, Bytes], Bytes),
    // Transcendentals
    op!(Sqrt, [Float32], Float32),
    op!(Sqrt, [Float64], Float64),
    op!(Sqrt, [Complex128], Complex128),
    op!(Exp, [Float32], Float32),
    op!(Exp, [Float64], Float64),
    op!(Exp, [Complex128], Complex128),
    op!(Log, [Float32], Float32),
    op!(Log, [Float64], Float64),
    op!(Log, [Complex128], Complex128),
    op!(Expm1, [Float32], Float32),
    op!(Expm1, [Float64], Float64),
    op!(Log10, [Float32], Float32),
    op!(Log10, [Float64], Float64),
    op!(Log1p, [Float32], Float32),
    op!(Log1p, [Float64], Float64),
    op!(Sin, [Float32], Float32),
    op!(Sin, [Float64], Float64),
    op!(Sin, [Complex128], Complex128),
    op!(Cos, [Float32], Float32),
    op!(Cos, [Float64], Float64),
    op!(Cos, [Complex128], Complex128),
    op!(Tan, [Float32], Float32),
    op!(Tan, [Float64], Float64),
    op!(Tan, [Complex128], Complex128),
    op!(Arcsin, [Float32], Float32),
    op!(Arcsin, [Float64], Float64),
    op!(Arccos, [Float32], Float32),
    op!(Arccos, [Float64], Float64),
    op!(Arctan, [Float32], Float32),
    op!(Arctan, [Float64], Float64),
    op!(Arctan2, [Float32, Float32], Float32),
    op!(Arctan2, [Float64, Float64], Float64),
    op!(Sinh, [Float32], Float32),
    op!(Sinh, [Float64], Float64),
    op!(Cosh, [Float32], Float32),
    op!(Cosh, [Float64], Float64),
    op!(Tanh, [Float32], Float32),
    op!(Tanh, [Float64], Float64),
    op!(Arcsinh, [Float32], Float32),
    op!(Arcsinh, [Float64], Float64),
    op!(Arccosh, [Float32], Float32),
    op!(Arccosh, [Float64], Float64),
    op!(Arctanh, [Float32], Float32),
    op!(Arctanh, [Float64], Float64),
    op!(Floor, [Float32], Float32),
    op!(Floor, [Float64], Float64),
    op!(Ceil, [Float32], Float32),
    op!(Ceil, [Float64], Float64),
    // Complex helpers
    op!(Real, [Complex128], Float64),
    op!(Imag, [Complex128], Float64),
    op!(Conj, [Complex128], Complex128),
    // Reductions (operand is the per-chunk source; result is the accumulator)
    op!(Sum, [Int64], Int64),
    op!(Sum, [Float32], Float32),
    op!(Sum, [Float64], Float64),
    op!(Sum, [Complex128], Complex128),
    op!(Prod, [Int64], Int64),
    op!(Prod, [Float32], Float32),
    op!(Prod, [Float64], Float64),
    op!(Prod, [Complex128], Complex128),
];

/// A resolved opcode: an index into [`OP_TABLE`], also the wire opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcreteOp(pub u8);

/// The reserved noop opcode byte
pub const NOOP: ConcreteOp = ConcreteOp(0);

impl ConcreteOp {
    /// The table row for this opcode
    pub fn spec(&self) -> &'static OpSpec {
        &OP_TABLE[self.0 as usize]
    }

    /// The abstract operation
    pub fn name(&self) -> OpName {
        self.spec().name
    }

    /// The result kind
    pub fn result(&self) -> Kind {
        self.spec().result
    }

    /// The operand kinds
    pub fn operands(&self) -> &'static [Kind] {
        self.spec().operands
    }
}

impl fmt::Display for ConcreteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self.spec();
        if spec.operands.is_empty() {
            write!(f, "{}", spec.name)
        } else {
            write!(
                f,
                "{}_{}{}",
                spec.name,
                spec.result.letter(),
                signature_string(spec.operands)
            )
        }
    }
}

type SigKey = (OpName, SmallVec<[Kind; 3]>);

/// Lookup maps from abstract operation + kind signature to concrete opcodes
pub struct OpRegistry {
    by_sig: FxHashMap<SigKey, ConcreteOp>,
    casts: FxHashMap<(Kind, Kind), ConcreteOp>,
}

impl OpRegistry {
    fn build() -> Self {
        let mut by_sig = FxHashMap::default();
        let mut casts = FxHashMap::default();
        for (index, spec) in OP_TABLE.iter().enumerate() {
            debug_assert!(index <= u8::MAX as usize, "opcode table exceeds one byte");
            let code = ConcreteOp(index as u8);
            match spec.name {
                OpName::Cast => {
                    casts.insert((spec.operands[0], spec.result), code);
                }
                _ => {
                    let key = (spec.name, SmallVec::from_slice(spec.operands));
                    by_sig.insert(key, code);
                }
            }
        }
        OpRegistry { by_sig, casts }
    }

    /// Look up an exact (operation, operand kinds) signature
    pub fn lookup(&self, name: OpName, operands: &[Kind]) -> Option<ConcreteOp> {
        self.by_sig
            .get(&(name, SmallVec::from_slice(operands)))
            .copied()
    }

    /// Look up the cast opcode from `from` to `to`
    pub fn lookup_cast(&self, from: Kind, to: Kind) -> Option<ConcreteOp> {
        self.casts.get(&(from, to)).copied()
    }

    /// Look up the copy opcode for `kind`
    pub fn lookup_copy(&self, kind: Kind) -> Option<ConcreteOp> {
        self.lookup(OpName::Copy, &[kind])
    }
}

/// Process-wide opcode registry, built once from [`OP_TABLE`]
pub fn global_registry() -> &'static OpRegistry {
    static REGISTRY: OnceLock<OpRegistry> = OnceLock::new();
    REGISTRY.get_or_init(OpRegistry::build)
}
