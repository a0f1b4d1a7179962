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

//! Element kinds and numeric promotion
//!
//! Every expression node, register and array has exactly one [`Kind`].
//! Numeric kinds form a total promotion order; [`Kind::Bytes`] does not mix
//! with any numeric kind.

use std::fmt;
use std::str::FromStr;

use super::error::{Error, Result};

/// Element kinds supported by the engine
///
/// The numeric kinds are ordered by promotion rank:
/// Bool < Int32 < Int64 < Float32 < Float64 < Complex128.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    /// Boolean true/false
    Bool = 0,

    /// 32-bit signed integer
    Int32 = 1,

    /// 64-bit signed integer
    Int64 = 2,

    /// 32-bit floating point
    Float32 = 3,

    /// 64-bit floating point
    Float64 = 4,

    /// Complex number (two 64-bit floats)
    Complex128 = 5,

    /// Raw byte string, incompatible with all numeric kinds
    Bytes = 6,
}

/// All kinds in promotion-rank order (Bytes last, outside the numeric order)
pub const ALL_KINDS: [Kind; 7] = [
    Kind::Bool,
    Kind::Int32,
    Kind::Int64,
    Kind::Float32,
    Kind::Float64,
    Kind::Complex128,
    Kind::Bytes,
];

impl Kind {
    /// Returns true if this kind participates in numeric promotion
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Kind::Bytes)
    }

    /// Returns true for the integer kinds (Int32, Int64)
    pub fn is_integer(&self) -> bool {
        matches!(self, Kind::Int32 | Kind::Int64)
    }

    /// Returns true for Bool and the integer kinds
    pub fn is_integral(&self) -> bool {
        matches!(self, Kind::Bool | Kind::Int32 | Kind::Int64)
    }

    /// Returns true for the real floating-point kinds
    pub fn is_float(&self) -> bool {
        matches!(self, Kind::Float32 | Kind::Float64)
    }

    /// Returns true for Complex128
    pub fn is_complex(&self) -> bool {
        matches!(self, Kind::Complex128)
    }

    /// Returns true for kinds with a total "<" ordering kernel
    /// (complex numbers only support equality)
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Kind::Complex128)
    }

    /// Promotion rank within the numeric order.
    /// Bytes has no rank; callers must check [`Kind::is_numeric`] first.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// One-letter signature code used in opcode signatures and error messages
    pub fn letter(&self) -> char {
        match self {
            Kind::Bool => 'b',
            Kind::Int32 => 'i',
            Kind::Int64 => 'l',
            Kind::Float32 => 'f',
            Kind::Float64 => 'd',
            Kind::Complex128 => 'c',
            Kind::Bytes => 's',
        }
    }

    /// Returns the kind ID as u8 for serialization
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Create a Kind from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Kind::Bool),
            1 => Some(Kind::Int32),
            2 => Some(Kind::Int64),
            3 => Some(Kind::Float32),
            4 => Some(Kind::Float64),
            5 => Some(Kind::Complex128),
            6 => Some(Kind::Bytes),
            _ => None,
        }
    }

    /// The common kind two operands promote to.
    ///
    /// Bytes only combines with Bytes; mixing Bytes with a numeric kind is a
    /// type error.
    pub fn common(a: Kind, b: Kind) -> Result<Kind> {
        match (a.is_numeric(), b.is_numeric()) {
            (true, true) => Ok(if a.rank() >= b.rank() { a } else { b }),
            (false, false) => Ok(Kind::Bytes),
            _ => Err(Error::type_error(format!(
                "cannot mix {} and {} operands",
                a, b
            ))),
        }
    }

    /// Returns true if a value of this kind can be widened to `target`
    /// without loss of kind-correctness (upward promotion only)
    pub fn promotes_to(&self, target: Kind) -> bool {
        if *self == target {
            return true;
        }
        self.is_numeric() && target.is_numeric() && self.rank() < target.rank()
    }

    /// Iterate the numeric kinds strictly above this one, lowest first
    pub fn promotions(&self) -> impl Iterator<Item = Kind> {
        let rank = self.rank();
        let numeric = self.is_numeric();
        ALL_KINDS
            .into_iter()
            .filter(move |k| numeric && k.is_numeric() && k.rank() > rank)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Bool => write!(f, "bool"),
            Kind::Int32 => write!(f, "int32"),
            Kind::Int64 => write!(f, "int64"),
            Kind::Float32 => write!(f, "float32"),
            Kind::Float64 => write!(f, "float64"),
            Kind::Complex128 => write!(f, "complex128"),
            Kind::Bytes => write!(f, "bytes"),
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bool" => Ok(Kind::Bool),
            "int32" | "int" => Ok(Kind::Int32),
            "int64" | "long" => Ok(Kind::Int64),
            "float32" | "float" => Ok(Kind::Float32),
            "float64" | "double" => Ok(Kind::Float64),
            "complex128" | "complex" => Ok(Kind::Complex128),
            "bytes" | "str" => Ok(Kind::Bytes),
            _ => Err(Error::value(format!("unknown kind: {}", s))),
        }
    }
}

/// Render a kind sequence as a signature string, e.g. "ddd"
pub fn signature_string(kinds: &[Kind]) -> String {
    kinds.iter().map(|k| k.letter()).collect()
}
