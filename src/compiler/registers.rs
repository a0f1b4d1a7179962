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

//! Register allocation
//!
//! Registers are numbered in four fixed ranges: `0` is the output, then one
//! register per input (signature order), then one per distinct constant
//! (sorted by kind and value for determinism), then the temporaries.
//!
//! Temporaries are reused with consumer-set liveness: walking ops in
//! post-order, each visited op first removes itself from its children's
//! consumer sets — a child whose set drains re-enters the per-kind free
//! pool — and only then takes its own register, preferring the pool over a
//! fresh slot. The peak temporary count therefore tracks simultaneous
//! liveness, not total op count. Assembly walks the same post-order, which
//! is what makes freeing at last-consumer-visit safe.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::error::{Error, Result};
use crate::core::kind::Kind;
use crate::core::scalar::ScalarValue;

use super::tree::{ExprNode, ExprTree, NodeId};

/// Register byte value meaning "no operand"
pub const NO_REG: u8 = 0xFF;

/// Highest usable register id; 0xFF is the absent-operand sentinel
pub const MAX_REGISTERS: usize = 255;

/// Op nodes reachable from `root` in post-order, aliases resolved, each
/// visited once (children before parents). Allocation and assembly both walk
/// this exact order; it is the def-before-use contract between them.
pub fn post_order_ops(tree: &ExprTree, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut visited = FxHashSet::default();
    visit(tree, root, &mut visited, &mut order);
    order
}

fn visit(tree: &ExprTree, id: NodeId, visited: &mut FxHashSet<NodeId>, order: &mut Vec<NodeId>) {
    let id = tree.resolve_alias(id);
    if !visited.insert(id) {
        return;
    }
    if let ExprNode::Op { args, .. } = tree.node(id) {
        for &arg in args.clone().iter() {
            visit(tree, arg, visited, order);
        }
        order.push(id);
    }
}

/// The result of register allocation
#[derive(Debug)]
pub struct Allocation {
    /// Final register per arena node (None for Raw nodes and dead nodes)
    node_regs: Vec<Option<u8>>,
    /// Distinct constants in register order
    pub constants: Vec<ScalarValue>,
    /// Kind of each temporary register, in first-use order
    pub temp_kinds: Vec<Kind>,
    /// Number of input registers
    pub n_inputs: usize,
}

impl Allocation {
    /// The register assigned to a node (aliases resolved)
    pub fn reg(&self, tree: &ExprTree, id: NodeId) -> Option<u8> {
        self.node_regs[tree.resolve_alias(id).index()]
    }
}

/// Assign registers to every node reachable from `root`.
///
/// Fails with [`Error::RegisterOverflow`] when the program would need more
/// than 254 registers.
pub fn allocate(
    tree: &ExprTree,
    root: NodeId,
    signature: &[(String, Kind)],
) -> Result<Allocation> {
    let root = tree.resolve_alias(root);
    let order = post_order_ops(tree, root);
    let op_set: FxHashSet<NodeId> = order.iter().copied().collect();

    // Input registers: one per signature entry, in signature order.
    let mut input_regs: FxHashMap<&str, u8> = FxHashMap::default();
    let n_inputs = signature.len();
    for (position, (name, _)) in signature.iter().enumerate() {
        input_regs.insert(name.as_str(), (1 + position) as u8);
    }

    // Constant registers: deduplicated by (kind, value), sorted for
    // deterministic numbering.
    let mut constants = collect_constants(tree, root);
    constants.sort();
    let const_base = 1 + n_inputs;
    let const_index: FxHashMap<&ScalarValue, usize> = constants
        .iter()
        .enumerate()
        .map(|(index, value)| (value, index))
        .collect();

    // Consumer sets: which ops still need to read each temp-producing op.
    let mut consumers: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
    for &node in &order {
        let ExprNode::Op { args, .. } = tree.node(node) else {
            unreachable!("post_order_ops yields op nodes only");
        };
        for &arg in args.iter() {
            let arg = tree.resolve_alias(arg);
            if op_set.contains(&arg) {
                consumers.entry(arg).or_default().insert(node);
            }
        }
    }

    // Temporary allocation with per-kind free pools.
    let mut temp_kinds: Vec<Kind> = Vec::new();
    let mut temp_of: FxHashMap<NodeId, usize> = FxHashMap::default();
    let mut free_pool: FxHashMap<Kind, Vec<usize>> = FxHashMap::default();

    for &node in &order {
        let ExprNode::Op { args, .. } = tree.node(node) else {
            unreachable!("post_order_ops yields op nodes only");
        };
        // Free children whose last consumer this node is. The output
        // register (the root) never enters the pool.
        for &arg in args.iter() {
            let arg = tree.resolve_alias(arg);
            if arg == root || !op_set.contains(&arg) {
                continue;
            }
            if let Some(set) = consumers.get_mut(&arg) {
                // A node reading the same register twice (x*x) must only
                // release it once.
                if set.remove(&node) && set.is_empty() {
                    if let Some(&slot) = temp_of.get(&arg) {
                        free_pool.entry(temp_kinds[slot]).or_default().push(slot);
                    }
                }
            }
        }

        if node == root {
            continue; // forced to register 0
        }
        let kind = tree
            .kind_of(node)
            .ok_or_else(|| Error::internal("unresolved op kind during allocation"))?;
        let slot = match free_pool.get_mut(&kind).and_then(|pool| pool.pop()) {
            Some(slot) => slot,
            None => {
                temp_kinds.push(kind);
                temp_kinds.len() - 1
            }
        };
        temp_of.insert(node, slot);
    }

    let temp_base = const_base + constants.len();
    let total = temp_base + temp_kinds.len();
    if total > MAX_REGISTERS {
        return Err(Error::register_overflow(total));
    }

    // Final per-node numbering.
    let mut node_regs = vec![None; tree.len()];
    for index in 0..tree.len() {
        let id = NodeId(index as u32);
        match tree.node(id) {
            ExprNode::Variable { name, .. } => {
                node_regs[index] = input_regs.get(name.as_str()).copied();
            }
            ExprNode::Constant(value) => {
                node_regs[index] = const_index
                    .get(value)
                    .map(|&slot| (const_base + slot) as u8);
            }
            ExprNode::Op { .. } => {
                if id == root {
                    node_regs[index] = Some(0);
                } else if let Some(&slot) = temp_of.get(&id) {
                    node_regs[index] = Some((temp_base + slot) as u8);
                }
            }
            ExprNode::Raw(_) | ExprNode::Alias(_) => {}
        }
    }

    Ok(Allocation {
        node_regs,
        constants,
        temp_kinds,
        n_inputs,
    })
}

/// Distinct constants reachable from `root`
fn collect_constants(tree: &ExprTree, root: NodeId) -> Vec<ScalarValue> {
    let mut seen: FxHashSet<ScalarValue> = FxHashSet::default();
    let mut out = Vec::new();
    let mut visited = FxHashSet::default();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let id = tree.resolve_alias(id);
        if !visited.insert(id) {
            continue;
        }
        match tree.node(id) {
            ExprNode::Constant(value) => {
                if seen.insert(value.clone()) {
                    out.push(value.clone());
                }
            }
            ExprNode::Op { args, .. } => stack.extend(args.iter().copied()),
            _ => {}
        }
    }
    out
}
