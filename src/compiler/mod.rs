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

//! Expression compiler
//!
//! The pipeline from text (or a builder-made AST) to a runnable program:
//!
//! ```text
//!   parse -> resolve kinds -> optimize -> allocate registers -> assemble
//! ```
//!
//! Options are threaded explicitly through every phase; there is no global
//! compilation state, so concurrent compiles with different options are safe.

pub mod assembler;
pub mod opcodes;
pub mod optimizer;
pub mod program;
pub mod registers;
pub mod resolver;
pub mod tree;

pub use opcodes::{ConcreteOp, OpName, OpRegistry, OpSpec, OP_TABLE};
pub use program::{CompiledExpression, Instruction, Reduction};
pub use registers::{MAX_REGISTERS, NO_REG};
pub use tree::{ExprNode, ExprTree, NodeId};

use rustc_hash::FxHashSet;

use crate::core::error::{Error, Result};
use crate::core::kind::Kind;

/// How hard the optimizer works
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum OptLevel {
    /// Fold constants and share duplicate subexpressions, nothing else
    None,
    /// Also apply algebraic rewrites (reciprocal multiply, small powers)
    #[default]
    Moderate,
    /// Also expand |exponent| <= 50 powers by squaring
    Aggressive,
}

/// Options threaded through every compile phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileOptions {
    /// Optimizer effort
    pub opt_level: OptLevel,
    /// When true, `/` on integer operands promotes to float64 before
    /// dividing; when false it is truncating integer division
    pub truediv: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Moderate,
            truediv: true,
        }
    }
}

/// Compile expression text against an input signature
pub fn compile(
    expr: &str,
    signature: &[(String, Kind)],
    options: &CompileOptions,
) -> Result<CompiledExpression> {
    let (mut tree, root) = crate::parser::parse(expr).map_err(|e| e.with_expr(expr))?;
    compile_impl(expr, &mut tree, root, signature, options)
}

/// Compile a builder-made AST against an input signature
pub fn compile_tree(
    mut tree: ExprTree,
    root: NodeId,
    signature: &[(String, Kind)],
    options: &CompileOptions,
) -> Result<CompiledExpression> {
    let text = tree.render(root);
    compile_impl(&text, &mut tree, root, signature, options)
}

fn compile_impl(
    expr_text: &str,
    tree: &mut ExprTree,
    root: NodeId,
    signature: &[(String, Kind)],
    options: &CompileOptions,
) -> Result<CompiledExpression> {
    let mut names: FxHashSet<&str> = FxHashSet::default();
    for (name, _) in signature {
        if !names.insert(name.as_str()) {
            return Err(
                Error::type_error(format!("duplicate input name '{}'", name)).with_expr(expr_text)
            );
        }
    }

    resolver::resolve(tree, root, signature, options).map_err(|e| e.with_expr(expr_text))?;
    let root = optimizer::optimize(tree, root, options).map_err(|e| e.with_expr(expr_text))?;
    let alloc = registers::allocate(tree, root, signature).map_err(|e| e.with_expr(expr_text))?;
    assembler::assemble(tree, root, alloc, signature, expr_text)
        .map_err(|e| e.with_expr(expr_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scalar::ScalarValue;

    fn sig(pairs: &[(&str, Kind)]) -> Vec<(String, Kind)> {
        pairs.iter().map(|(n, k)| (n.to_string(), *k)).collect()
    }

    #[test]
    fn test_compile_pipeline_end_to_end() {
        let prog = compile(
            "2.0*a + 3.0*b*c",
            &sig(&[
                ("a", Kind::Float64),
                ("b", Kind::Float64),
                ("c", Kind::Float64),
            ]),
            &CompileOptions::default(),
        )
        .unwrap();
        assert_eq!(prog.output_kind(), Kind::Float64);
        assert_eq!(prog.input_signature().len(), 3);
        prog.validate().unwrap();
    }

    #[test]
    fn test_compile_errors_carry_expression_text() {
        let err = compile(
            "s1 + s2",
            &sig(&[("s1", Kind::Bytes), ("s2", Kind::Float64)]),
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("s1 + s2"));
        assert!(err.is_compile_error());
    }

    #[test]
    fn test_duplicate_signature_name_rejected() {
        let err = compile(
            "a + a",
            &sig(&[("a", Kind::Float64), ("a", Kind::Int32)]),
            &CompileOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_compile_tree_builder_api() {
        let mut tree = ExprTree::new();
        let a = tree.var("a");
        let b = tree.var("b");
        let s = tree.add(a, b);
        let root = tree.mul(s, s);
        let prog = compile_tree(
            tree,
            root,
            &sig(&[("a", Kind::Float64), ("b", Kind::Float64)]),
            &CompileOptions::default(),
        )
        .unwrap();
        // The duplicate add collapses through CSE even from the builder
        let adds = prog
            .program()
            .iter()
            .filter(|i| i.op.name() == OpName::Add)
            .count();
        assert_eq!(adds, 1);
        assert_eq!(prog.expr(), "((a + b) * (a + b))");
    }

    #[test]
    fn test_constant_program() {
        let prog = compile("2 + 2", &[], &CompileOptions::default()).unwrap();
        assert_eq!(prog.constant_pool(), &[ScalarValue::Int32(4)]);
        assert_eq!(prog.program().len(), 1);
        assert_eq!(prog.program()[0].op.name(), OpName::Copy);
    }
}
