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

//! Pratt parser producing AST arena nodes
//!
//! One pass, no backtracking: each token either starts a prefix expression
//! (literal, identifier, unary operator, parenthesized group, function call)
//! or extends the current expression as an infix operator. `**` is parsed
//! right-associatively.

use crate::compiler::opcodes::OpName;
use crate::compiler::tree::{ExprTree, NodeId};
use crate::core::error::{Error, Result};
use crate::core::scalar::ScalarValue;

use super::lexer::Lexer;
use super::precedence::Precedence;
use super::token::{Token, TokenType};

use num_complex::Complex64;

/// Parse expression text into a fresh AST arena.
/// Returns the arena and the root node.
pub fn parse(input: &str) -> Result<(ExprTree, NodeId)> {
    let mut parser = Parser::new(input);
    let mut tree = ExprTree::new();
    let root = parser.parse_expression(&mut tree, Precedence::Lowest)?;
    parser.expect_eof()?;
    Ok((tree, root))
}

/// Pratt parser over a token stream
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser for the given input
    pub fn new(input: &str) -> Self {
        Self {
            tokens: Lexer::new(input).tokenize(),
            pos: 0,
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        let next = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[next]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error_at(token: &Token, message: impl Into<String>) -> Error {
        Error::parse(token.offset, message)
    }

    /// Verify all input was consumed
    pub fn expect_eof(&self) -> Result<()> {
        let token = self.current();
        if token.token_type == TokenType::Eof {
            Ok(())
        } else {
            Err(Self::error_at(
                token,
                format!("unexpected {} after expression", token),
            ))
        }
    }

    /// Parse one expression at the given precedence level
    pub fn parse_expression(
        &mut self,
        tree: &mut ExprTree,
        precedence: Precedence,
    ) -> Result<NodeId> {
        let mut left = self.parse_prefix(tree)?;

        while self.current().token_type == TokenType::Operator
            && precedence < Precedence::for_operator(&self.current().literal)
        {
            left = self.parse_infix(tree, left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self, tree: &mut ExprTree) -> Result<NodeId> {
        let token = self.current().clone();
        match token.token_type {
            TokenType::Integer => {
                self.advance();
                let value: i64 = token
                    .literal
                    .parse()
                    .map_err(|_| Self::error_at(&token, "integer literal out of range"))?;
                // Literals that fit int32 enter at the lower rank so they
                // don't needlessly widen the whole expression.
                let scalar = match i32::try_from(value) {
                    Ok(v) => ScalarValue::Int32(v),
                    Err(_) => ScalarValue::Int64(value),
                };
                Ok(tree.constant(scalar))
            }

            TokenType::Float => {
                self.advance();
                let value: f64 = token
                    .literal
                    .parse()
                    .map_err(|_| Self::error_at(&token, "malformed float literal"))?;
                Ok(tree.constant(ScalarValue::Float64(value)))
            }

            TokenType::Imaginary => {
                self.advance();
                let value: f64 = token
                    .literal
                    .parse()
                    .map_err(|_| Self::error_at(&token, "malformed imaginary literal"))?;
                Ok(tree.constant(ScalarValue::Complex128(Complex64::new(0.0, value))))
            }

            TokenType::String => {
                self.advance();
                Ok(tree.constant(ScalarValue::Bytes(token.literal.into_bytes())))
            }

            TokenType::Identifier => {
                if self.peek().is_punctuator("(") {
                    return self.parse_call(tree);
                }
                self.advance();
                match token.literal.as_str() {
                    "True" | "true" => Ok(tree.constant(ScalarValue::Bool(true))),
                    "False" | "false" => Ok(tree.constant(ScalarValue::Bool(false))),
                    _ => Ok(tree.var(token.literal)),
                }
            }

            TokenType::Punctuator if token.literal == "(" => {
                self.advance();
                let inner = self.parse_expression(tree, Precedence::Lowest)?;
                self.expect_punctuator(")")?;
                Ok(inner)
            }

            TokenType::Operator => {
                let op = match token.literal.as_str() {
                    "-" => Some(OpName::Neg),
                    "~" => Some(OpName::Invert),
                    "+" => None,
                    other => {
                        return Err(Self::error_at(
                            &token,
                            format!("'{}' is not a prefix operator", other),
                        ))
                    }
                };
                self.advance();
                let operand = self.parse_expression(tree, Precedence::Unary)?;
                // Fold unary minus on a bare numeric literal so constants
                // like -2 reach the resolver with their sign attached.
                if op == Some(OpName::Neg) {
                    if let crate::compiler::tree::ExprNode::Constant(v) = tree.node(operand) {
                        if let Some(negated) = negate_literal(v) {
                            *tree.node_mut(operand) =
                                crate::compiler::tree::ExprNode::Constant(negated);
                            return Ok(operand);
                        }
                    }
                }
                Ok(match op {
                    Some(name) => tree.op(name, &[operand]),
                    None => operand,
                })
            }

            TokenType::Illegal => Err(Self::error_at(
                &token,
                format!("unexpected character '{}'", token.literal),
            )),

            _ => Err(Self::error_at(
                &token,
                format!("unexpected {} at start of expression", token),
            )),
        }
    }

    fn parse_infix(&mut self, tree: &mut ExprTree, left: NodeId) -> Result<NodeId> {
        let token = self.current().clone();
        let name = match token.literal.as_str() {
            "+" => OpName::Add,
            "-" => OpName::Sub,
            "*" => OpName::Mul,
            "/" => OpName::Div,
            "%" => OpName::Mod,
            "**" => OpName::Pow,
            "<<" => OpName::LShift,
            ">>" => OpName::RShift,
            "&" => OpName::BitAnd,
            "|" => OpName::BitOr,
            "^" => OpName::BitXor,
            "<" => OpName::Lt,
            "<=" => OpName::Le,
            ">" => OpName::Gt,
            ">=" => OpName::Ge,
            "==" => OpName::Eq,
            "!=" => OpName::Ne,
            other => {
                return Err(Self::error_at(
                    &token,
                    format!("'{}' is not an infix operator", other),
                ))
            }
        };
        let precedence = Precedence::for_operator(&token.literal);
        self.advance();
        // ** is right-associative: parse the right side one level lower so a
        // following ** binds to it first.
        let right_precedence = if name == OpName::Pow {
            precedence.lower()
        } else {
            precedence
        };
        let right = self.parse_expression(tree, right_precedence)?;
        Ok(tree.op(name, &[left, right]))
    }

    /// Parse `name(arg, ...)`, including the `axis=N` keyword on reductions
    fn parse_call(&mut self, tree: &mut ExprTree) -> Result<NodeId> {
        let name_token = self.current().clone();
        let op = OpName::from_func_name(&name_token.literal).ok_or_else(|| {
            Self::error_at(
                &name_token,
                format!("unknown function '{}'", name_token.literal),
            )
        })?;
        self.advance(); // function name
        self.advance(); // opening paren

        let mut args: Vec<NodeId> = Vec::new();
        let mut axis: Option<i64> = None;

        if !self.current().is_punctuator(")") {
            loop {
                if self.current().token_type == TokenType::Identifier
                    && self.current().literal == "axis"
                    && self.peek().is_operator("=")
                {
                    let axis_token = self.current().clone();
                    if !op.is_reduction() {
                        return Err(Self::error_at(
                            &axis_token,
                            format!("'{}' takes no axis argument", op),
                        ));
                    }
                    self.advance(); // axis
                    self.advance(); // =
                    let value_token = self.current().clone();
                    if value_token.token_type != TokenType::Integer {
                        return Err(Self::error_at(&value_token, "axis must be an integer"));
                    }
                    axis = Some(value_token.literal.parse().map_err(|_| {
                        Self::error_at(&value_token, "axis literal out of range")
                    })?);
                    self.advance();
                } else {
                    args.push(self.parse_expression(tree, Precedence::Lowest)?);
                }

                if self.current().is_punctuator(",") {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_punctuator(")")?;

        if args.len() != op.arity() {
            return Err(Self::error_at(
                &name_token,
                format!(
                    "'{}' takes {} argument(s), got {}",
                    op,
                    op.arity(),
                    args.len()
                ),
            ));
        }

        if let Some(ax) = axis {
            let raw = tree.raw(ax);
            args.push(raw);
        }
        Ok(tree.op(op, &args))
    }

    fn expect_punctuator(&mut self, p: &str) -> Result<()> {
        let token = self.current();
        if token.is_punctuator(p) {
            self.advance();
            Ok(())
        } else {
            Err(Self::error_at(
                token,
                format!("expected '{}', found {}", p, token),
            ))
        }
    }
}

/// Negate a numeric literal; None for kinds where unary minus stays an op
fn negate_literal(value: &ScalarValue) -> Option<ScalarValue> {
    Some(match value {
        ScalarValue::Int32(v) => ScalarValue::Int32(v.wrapping_neg()),
        ScalarValue::Int64(v) => ScalarValue::Int64(v.wrapping_neg()),
        ScalarValue::Float32(v) => ScalarValue::Float32(-v),
        ScalarValue::Float64(v) => ScalarValue::Float64(-v),
        ScalarValue::Complex128(v) => ScalarValue::Complex128(-v),
        ScalarValue::Bool(_) | ScalarValue::Bytes(_) => return None,
    })
}
