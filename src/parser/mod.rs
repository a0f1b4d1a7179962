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

//! Expression parser
//!
//! Parses infix expression text ("2.0*a + sqrt(b)") into the AST arena.
//! Operator set and precedence follow the conventional numeric-expression
//! rules: `**` binds tightest (right-associative), then unary `- + ~`,
//! `* / %`, `+ -`, `<< >>`, `&`, `^`, `|`, comparisons.

pub mod lexer;
pub mod parser;
pub mod precedence;
pub mod token;

pub use lexer::Lexer;
pub use parser::{parse, Parser};
pub use precedence::Precedence;
pub use token::{Token, TokenType};
