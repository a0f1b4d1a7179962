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

//! Operator precedence levels for the Pratt parser

/// Precedence levels (higher number = higher precedence)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Precedence {
    /// Lowest precedence
    #[default]
    Lowest = 1,
    /// Comparison operators (<, <=, ==, !=, >=, >)
    Comparison = 2,
    /// Bitwise/logical OR (|)
    BitOr = 3,
    /// Bitwise/logical XOR (^)
    BitXor = 4,
    /// Bitwise/logical AND (&)
    BitAnd = 5,
    /// Bitwise shift (<<, >>)
    Shift = 6,
    /// Addition and subtraction (+, -)
    Sum = 7,
    /// Multiplication, division, modulo (*, /, %)
    Product = 8,
    /// Prefix operators (-, +, ~)
    Unary = 9,
    /// Exponentiation (**), right-associative
    Power = 10,
    /// Function calls
    Call = 11,
}

impl Precedence {
    /// Get precedence for an infix operator string
    pub fn for_operator(op: &str) -> Precedence {
        match op {
            "<" | "<=" | "==" | "!=" | ">=" | ">" => Precedence::Comparison,
            "|" => Precedence::BitOr,
            "^" => Precedence::BitXor,
            "&" => Precedence::BitAnd,
            "<<" | ">>" => Precedence::Shift,
            "+" | "-" => Precedence::Sum,
            "*" | "/" | "%" => Precedence::Product,
            "**" => Precedence::Power,
            _ => Precedence::Lowest,
        }
    }

    /// The level just below this one, used for right-associative operators
    pub fn lower(&self) -> Precedence {
        match self {
            Precedence::Lowest | Precedence::Comparison => Precedence::Lowest,
            Precedence::BitOr => Precedence::Comparison,
            Precedence::BitXor => Precedence::BitOr,
            Precedence::BitAnd => Precedence::BitXor,
            Precedence::Shift => Precedence::BitAnd,
            Precedence::Sum => Precedence::Shift,
            Precedence::Product => Precedence::Sum,
            Precedence::Unary => Precedence::Product,
            Precedence::Power => Precedence::Unary,
            Precedence::Call => Precedence::Power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        assert!(Precedence::Power > Precedence::Unary);
        assert!(Precedence::Unary > Precedence::Product);
        assert!(Precedence::Product > Precedence::Sum);
        assert!(Precedence::Sum > Precedence::Shift);
        assert!(Precedence::Shift > Precedence::BitAnd);
        assert!(Precedence::BitAnd > Precedence::BitXor);
        assert!(Precedence::BitXor > Precedence::BitOr);
        assert!(Precedence::BitOr > Precedence::Comparison);
        assert!(Precedence::Comparison > Precedence::Lowest);
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(Precedence::for_operator("**"), Precedence::Power);
        assert_eq!(Precedence::for_operator("*"), Precedence::Product);
        assert_eq!(Precedence::for_operator("+"), Precedence::Sum);
        assert_eq!(Precedence::for_operator("&"), Precedence::BitAnd);
        assert_eq!(Precedence::for_operator("=="), Precedence::Comparison);
        assert_eq!(Precedence::for_operator("??"), Precedence::Lowest);
    }

    #[test]
    fn test_lower() {
        assert_eq!(Precedence::Power.lower(), Precedence::Unary);
        assert_eq!(Precedence::Lowest.lower(), Precedence::Lowest);
    }
}
