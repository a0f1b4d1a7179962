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

//! Error types for vexpr
//!
//! One crate-wide error enum covering compile-time errors (parse, type,
//! opcode resolution, register overflow) and run-time errors (shape,
//! value). Compile-time errors carry the original expression text so a
//! failing expression can be debugged without internal register numbers.

use thiserror::Error;

/// Result type alias for vexpr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for compilation and evaluation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Compile-time errors
    // =========================================================================
    /// Malformed expression text
    #[error("parse error at offset {offset}: {message} (in {expr:?})")]
    Parse {
        expr: String,
        offset: usize,
        message: String,
    },

    /// Incompatible kinds (e.g. bytes mixed with numeric)
    #[error("type error: {message} (in {expr:?})")]
    Type { expr: String, message: String },

    /// No concrete opcode variant exists for an operation + kind signature,
    /// even after exhausting upward promotions
    #[error("no opcode variant for '{op}' over signature \"{signature}\" (in {expr:?})")]
    NotImplementedOpcode {
        expr: String,
        op: String,
        signature: String,
    },

    /// The expression needs more than 254 live registers
    #[error("expression needs {needed} registers, limit is 254 (in {expr:?})")]
    RegisterOverflow { expr: String, needed: usize },

    // =========================================================================
    // Run-time errors
    // =========================================================================
    /// Broadcast-incompatible input shapes
    #[error("operands cannot be broadcast together with shapes {lhs:?} and {rhs:?}")]
    Shape { lhs: Vec<usize>, rhs: Vec<usize> },

    /// Invalid run-time value or argument
    #[error("invalid value: {0}")]
    Value(String),

    // =========================================================================
    // Other errors
    // =========================================================================
    /// Internal error for conditions that indicate a bug in the compiler
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new Parse error
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            expr: String::new(),
            offset,
            message: message.into(),
        }
    }

    /// Create a new Type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type {
            expr: String::new(),
            message: message.into(),
        }
    }

    /// Create a new NotImplementedOpcode error
    pub fn not_implemented(op: impl Into<String>, signature: impl Into<String>) -> Self {
        Error::NotImplementedOpcode {
            expr: String::new(),
            op: op.into(),
            signature: signature.into(),
        }
    }

    /// Create a new RegisterOverflow error
    pub fn register_overflow(needed: usize) -> Self {
        Error::RegisterOverflow {
            expr: String::new(),
            needed,
        }
    }

    /// Create a new Shape error
    pub fn shape(lhs: &[usize], rhs: &[usize]) -> Self {
        Error::Shape {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// Create a new Value error
    pub fn value(message: impl Into<String>) -> Self {
        Error::Value(message.into())
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Attach the original expression text to a compile-phase error.
    /// Later attachments do not overwrite an already-recorded text.
    pub fn with_expr(mut self, text: &str) -> Self {
        match &mut self {
            Error::Parse { expr, .. }
            | Error::Type { expr, .. }
            | Error::NotImplementedOpcode { expr, .. }
            | Error::RegisterOverflow { expr, .. } => {
                if expr.is_empty() {
                    *expr = text.to_string();
                }
            }
            _ => {}
        }
        self
    }

    /// Check if this error is raised at compile time
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. }
                | Error::Type { .. }
                | Error::NotImplementedOpcode { .. }
                | Error::RegisterOverflow { .. }
        )
    }

    /// Check if this error is raised at run time
    pub fn is_runtime_error(&self) -> bool {
        matches!(self, Error::Shape { .. } | Error::Value(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::parse(3, "unexpected character '@'").with_expr("a @ b");
        assert_eq!(
            err.to_string(),
            "parse error at offset 3: unexpected character '@' (in \"a @ b\")"
        );

        let err = Error::type_error("cannot mix bytes and float64").with_expr("s1 + x");
        assert_eq!(
            err.to_string(),
            "type error: cannot mix bytes and float64 (in \"s1 + x\")"
        );

        let err = Error::not_implemented("mod", "cc").with_expr("a % b");
        assert_eq!(
            err.to_string(),
            "no opcode variant for 'mod' over signature \"cc\" (in \"a % b\")"
        );

        let err = Error::shape(&[3, 2], &[4]);
        assert_eq!(
            err.to_string(),
            "operands cannot be broadcast together with shapes [3, 2] and [4]"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::parse(0, "x").is_compile_error());
        assert!(Error::type_error("x").is_compile_error());
        assert!(Error::not_implemented("a", "b").is_compile_error());
        assert!(Error::register_overflow(300).is_compile_error());
        assert!(!Error::shape(&[1], &[2]).is_compile_error());

        assert!(Error::shape(&[1], &[2]).is_runtime_error());
        assert!(Error::value("bad").is_runtime_error());
        assert!(!Error::parse(0, "x").is_runtime_error());
    }

    #[test]
    fn test_with_expr_keeps_first_text() {
        let err = Error::type_error("boom").with_expr("first").with_expr("second");
        match err {
            Error::Type { expr, .. } => assert_eq!(expr, "first"),
            _ => panic!("expected type error"),
        }
    }
}
