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

//! Expression AST arena
//!
//! Expressions live in a flat arena (`Vec<ExprNode>` + [`NodeId`] handles):
//! the parser and the builder API push nodes, the resolver rewrites them in
//! place, and CSE replaces duplicates with [`ExprNode::Alias`] entries.
//! An alias always points at a node with a strictly smaller index, so alias
//! chains cannot cycle and a plain loop resolves them.

use smallvec::SmallVec;

use crate::core::kind::Kind;
use crate::core::scalar::ScalarValue;

use super::opcodes::OpName;

/// Handle to a node in an [`ExprTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena index of this node
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One AST node
#[derive(Debug, Clone)]
pub enum ExprNode {
    /// Placeholder for a run-time input; kind is filled in by the resolver
    /// from the input signature
    Variable { name: String, kind: Option<Kind> },

    /// Compile-time literal; its kind is the value's kind
    Constant(ScalarValue),

    /// Operator or function application; kind is None until resolved
    Op {
        name: OpName,
        kind: Option<Kind>,
        args: SmallVec<[NodeId; 3]>,
    },

    /// Immediate integer operand (e.g. a reduction axis); never a register
    Raw(i64),

    /// Produced by CSE: this node is equivalent to an earlier node
    Alias(NodeId),
}

/// Flat arena of expression nodes
#[derive(Debug, Clone, Default)]
pub struct ExprTree {
    nodes: Vec<ExprNode>,
}

impl ExprTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena (including dead and alias nodes)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no nodes have been pushed
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Push a node and return its handle
    pub fn push(&mut self, node: ExprNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node
    pub fn node_mut(&mut self, id: NodeId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    /// Follow alias links to the ultimate target
    pub fn resolve_alias(&self, mut id: NodeId) -> NodeId {
        while let ExprNode::Alias(target) = self.node(id) {
            debug_assert!(target.index() < id.index(), "alias must point backwards");
            id = *target;
        }
        id
    }

    /// The resolved kind of a node, if known.
    /// `Raw` nodes have no kind; aliases report their target's kind.
    pub fn kind_of(&self, id: NodeId) -> Option<Kind> {
        match self.node(self.resolve_alias(id)) {
            ExprNode::Variable { kind, .. } => *kind,
            ExprNode::Constant(v) => Some(v.kind()),
            ExprNode::Op { kind, .. } => *kind,
            ExprNode::Raw(_) => None,
            ExprNode::Alias(_) => unreachable!("alias resolved above"),
        }
    }

    // =========================================================================
    // Builder API
    // =========================================================================

    /// Add a variable reference. Its kind is resolved later against the
    /// input signature.
    pub fn var(&mut self, name: impl Into<String>) -> NodeId {
        self.push(ExprNode::Variable {
            name: name.into(),
            kind: None,
        })
    }

    /// Add a literal constant
    pub fn constant(&mut self, value: impl Into<ScalarValue>) -> NodeId {
        self.push(ExprNode::Constant(value.into()))
    }

    /// Add an immediate integer operand
    pub fn raw(&mut self, value: i64) -> NodeId {
        self.push(ExprNode::Raw(value))
    }

    /// Add an operation node with explicit arguments
    pub fn op(&mut self, name: OpName, args: &[NodeId]) -> NodeId {
        self.push(ExprNode::Op {
            name,
            kind: None,
            args: SmallVec::from_slice(args),
        })
    }

    /// a + b
    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(OpName::Add, &[a, b])
    }

    /// a - b
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(OpName::Sub, &[a, b])
    }

    /// a * b
    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(OpName::Mul, &[a, b])
    }

    /// a / b
    pub fn div(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(OpName::Div, &[a, b])
    }

    /// a ** b
    pub fn pow(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.op(OpName::Pow, &[a, b])
    }

    /// -a
    pub fn neg(&mut self, a: NodeId) -> NodeId {
        self.op(OpName::Neg, &[a])
    }

    /// where(cond, a, b)
    pub fn where_(&mut self, cond: NodeId, a: NodeId, b: NodeId) -> NodeId {
        self.op(OpName::Where, &[cond, a, b])
    }

    /// sum(a) or sum(a, axis)
    pub fn sum(&mut self, a: NodeId, axis: Option<i64>) -> NodeId {
        match axis {
            Some(ax) => {
                let raw = self.raw(ax);
                self.op(OpName::Sum, &[a, raw])
            }
            None => self.op(OpName::Sum, &[a]),
        }
    }

    /// prod(a) or prod(a, axis)
    pub fn prod(&mut self, a: NodeId, axis: Option<i64>) -> NodeId {
        match axis {
            Some(ax) => {
                let raw = self.raw(ax);
                self.op(OpName::Prod, &[a, raw])
            }
            None => self.op(OpName::Prod, &[a]),
        }
    }

    /// Render the subtree as fully parenthesized expression text,
    /// for error messages from builder-made trees
    pub fn render(&self, id: NodeId) -> String {
        match self.node(self.resolve_alias(id)) {
            ExprNode::Variable { name, .. } => name.clone(),
            ExprNode::Constant(value) => value.to_string(),
            ExprNode::Raw(value) => format!("axis={}", value),
            ExprNode::Op { name, args, .. } => {
                let parts: Vec<String> = args.iter().map(|&a| self.render(a)).collect();
                match name {
                    OpName::Add => format!("({} + {})", parts[0], parts[1]),
                    OpName::Sub => format!("({} - {})", parts[0], parts[1]),
                    OpName::Mul => format!("({} * {})", parts[0], parts[1]),
                    OpName::Div => format!("({} / {})", parts[0], parts[1]),
                    OpName::Mod => format!("({} % {})", parts[0], parts[1]),
                    OpName::Pow => format!("({} ** {})", parts[0], parts[1]),
                    OpName::Neg => format!("(-{})", parts[0]),
                    OpName::Invert => format!("(~{})", parts[0]),
                    OpName::BitAnd => format!("({} & {})", parts[0], parts[1]),
                    OpName::BitOr => format!("({} | {})", parts[0], parts[1]),
                    OpName::BitXor => format!("({} ^ {})", parts[0], parts[1]),
                    OpName::LShift => format!("({} << {})", parts[0], parts[1]),
                    OpName::RShift => format!("({} >> {})", parts[0], parts[1]),
                    OpName::Lt => format!("({} < {})", parts[0], parts[1]),
                    OpName::Le => format!("({} <= {})", parts[0], parts[1]),
                    OpName::Gt => format!("({} > {})", parts[0], parts[1]),
                    OpName::Ge => format!("({} >= {})", parts[0], parts[1]),
                    OpName::Eq => format!("({} == {})", parts[0], parts[1]),
                    OpName::Ne => format!("({} != {})", parts[0], parts[1]),
                    _ => format!("{}({})", name, parts.join(", ")),
                }
            }
            ExprNode::Alias(_) => unreachable!("alias resolved above"),
        }
    }

    /// Variable names in order of first appearance under `root`
    pub fn variable_order(&self, root: NodeId) -> Vec<String> {
        let mut order = Vec::new();
        self.collect_variables(root, &mut order);
        order
    }

    fn collect_variables(&self, id: NodeId, order: &mut Vec<String>) {
        match self.node(id) {
            ExprNode::Variable { name, .. } => {
                if !order.iter().any(|n| n == name) {
                    order.push(name.clone());
                }
            }
            ExprNode::Op { args, .. } => {
                for &arg in args.iter() {
                    self.collect_variables(arg, order);
                }
            }
            ExprNode::Alias(target) => self.collect_variables(*target, order),
            ExprNode::Constant(_) | ExprNode::Raw(_) => {}
        }
    }
}
