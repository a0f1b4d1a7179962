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

//! Scalar values with kind information
//!
//! [`ScalarValue`] carries one element of any [`Kind`]. It is used for
//! expression constants, the constant pool of a compiled program, and the
//! results of compile-time folding. Equality and hashing are structural:
//! floats compare by IEEE bit pattern so the constant pool and the CSE table
//! behave deterministically (NaN equals NaN, -0.0 differs from 0.0).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_complex::Complex64;

use super::error::{Error, Result};
use super::kind::Kind;

/// A single typed value
#[derive(Debug, Clone)]
pub enum ScalarValue {
    /// Boolean
    Bool(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// Complex number
    Complex128(Complex64),
    /// Byte string
    Bytes(Vec<u8>),
}

impl ScalarValue {
    /// The kind of this value
    pub fn kind(&self) -> Kind {
        match self {
            ScalarValue::Bool(_) => Kind::Bool,
            ScalarValue::Int32(_) => Kind::Int32,
            ScalarValue::Int64(_) => Kind::Int64,
            ScalarValue::Float32(_) => Kind::Float32,
            ScalarValue::Float64(_) => Kind::Float64,
            ScalarValue::Complex128(_) => Kind::Complex128,
            ScalarValue::Bytes(_) => Kind::Bytes,
        }
    }

    /// Widen this value to `target`. Upward numeric promotion only;
    /// anything else is a type error.
    pub fn cast_to(&self, target: Kind) -> Result<ScalarValue> {
        if self.kind() == target {
            return Ok(self.clone());
        }
        if !self.kind().promotes_to(target) {
            return Err(Error::type_error(format!(
                "cannot cast {} to {}",
                self.kind(),
                target
            )));
        }
        let value = match target {
            Kind::Int32 => ScalarValue::Int32(self.as_i64()? as i32),
            Kind::Int64 => ScalarValue::Int64(self.as_i64()?),
            Kind::Float32 => ScalarValue::Float32(self.as_f64()? as f32),
            Kind::Float64 => ScalarValue::Float64(self.as_f64()?),
            Kind::Complex128 => ScalarValue::Complex128(self.as_complex()?),
            Kind::Bool | Kind::Bytes => {
                return Err(Error::type_error(format!(
                    "cannot cast {} to {}",
                    self.kind(),
                    target
                )))
            }
        };
        Ok(value)
    }

    /// Integer view of an integral value
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            ScalarValue::Bool(b) => Ok(*b as i64),
            ScalarValue::Int32(v) => Ok(*v as i64),
            ScalarValue::Int64(v) => Ok(*v),
            other => Err(Error::type_error(format!(
                "expected an integer value, got {}",
                other.kind()
            ))),
        }
    }

    /// Float view of any real numeric value
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            ScalarValue::Bool(b) => Ok(*b as i64 as f64),
            ScalarValue::Int32(v) => Ok(*v as f64),
            ScalarValue::Int64(v) => Ok(*v as f64),
            ScalarValue::Float32(v) => Ok(*v as f64),
            ScalarValue::Float64(v) => Ok(*v),
            other => Err(Error::type_error(format!(
                "expected a real value, got {}",
                other.kind()
            ))),
        }
    }

    /// Complex view of any numeric value
    pub fn as_complex(&self) -> Result<Complex64> {
        match self {
            ScalarValue::Complex128(v) => Ok(*v),
            other => Ok(Complex64::new(other.as_f64()?, 0.0)),
        }
    }

    /// Bool view; only Bool values have one
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            ScalarValue::Bool(b) => Ok(*b),
            other => Err(Error::type_error(format!(
                "expected a bool value, got {}",
                other.kind()
            ))),
        }
    }

    /// True when the value is numerically zero (used by algebraic rewrites)
    pub fn is_zero(&self) -> bool {
        match self {
            ScalarValue::Bool(b) => !*b,
            ScalarValue::Int32(v) => *v == 0,
            ScalarValue::Int64(v) => *v == 0,
            ScalarValue::Float32(v) => *v == 0.0,
            ScalarValue::Float64(v) => *v == 0.0,
            ScalarValue::Complex128(v) => v.re == 0.0 && v.im == 0.0,
            ScalarValue::Bytes(_) => false,
        }
    }

    /// Canonical bit pattern used for structural equality, hashing and the
    /// deterministic constant-pool order
    fn bits(&self) -> (u64, u64) {
        match self {
            ScalarValue::Bool(b) => (*b as u64, 0),
            ScalarValue::Int32(v) => (*v as i64 as u64, 0),
            ScalarValue::Int64(v) => (*v as u64, 0),
            ScalarValue::Float32(v) => (v.to_bits() as u64, 0),
            ScalarValue::Float64(v) => (v.to_bits(), 0),
            ScalarValue::Complex128(v) => (v.re.to_bits(), v.im.to_bits()),
            ScalarValue::Bytes(_) => (0, 0),
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        match (self, other) {
            (ScalarValue::Bytes(a), ScalarValue::Bytes(b)) => a == b,
            _ => self.bits() == other.bits(),
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().as_u8().hash(state);
        match self {
            ScalarValue::Bytes(b) => b.hash(state),
            _ => self.bits().hash(state),
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    /// Deterministic total order: by kind first, then by value
    /// (floats via total_cmp, bytes lexicographic)
    fn cmp(&self, other: &Self) -> Ordering {
        let by_kind = self.kind().as_u8().cmp(&other.kind().as_u8());
        if by_kind != Ordering::Equal {
            return by_kind;
        }
        match (self, other) {
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a.cmp(b),
            (ScalarValue::Int32(a), ScalarValue::Int32(b)) => a.cmp(b),
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a.cmp(b),
            (ScalarValue::Float32(a), ScalarValue::Float32(b)) => a.total_cmp(b),
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.total_cmp(b),
            (ScalarValue::Complex128(a), ScalarValue::Complex128(b)) => a
                .re
                .total_cmp(&b.re)
                .then_with(|| a.im.total_cmp(&b.im)),
            (ScalarValue::Bytes(a), ScalarValue::Bytes(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float32(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Complex128(v) => write!(f, "({}+{}j)", v.re, v.im),
            ScalarValue::Bytes(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int32(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::Float32(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}

impl From<Complex64> for ScalarValue {
    fn from(v: Complex64) -> Self {
        ScalarValue::Complex128(v)
    }
}
