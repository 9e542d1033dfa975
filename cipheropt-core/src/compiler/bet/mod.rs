//! Binary Expression Trees
//!
//! A [`Bet`] is the tree registry of one function body: it maps every assigned variable
//! (plus the two sentinel keys for "no variable" and "return value") to the root of the
//! tree currently computing it. All trees share one [`ExprArena`].
//!
//! # Rewrites
//! - [`Bet::reduce_all`]: common-factor extraction, `a*x + b*x` into `(a+b)*x`
//! - [`Bet::reorder_priorities`]: re-association so cheap operands combine first
//! - [`Bet::escape_pows`]: `x^k` into `k-1` multiplications
//!
//! Each rewrite reports `Ok(true)` if it changed the tree, `Ok(false)` at its fixed point.
//!
//! # Iteration Order
//! Trees are visited most recent registration first; nodes within a tree in pre-order,
//! left before right. The tree encoding relies on this order.

pub mod builder;
pub mod codegen;
pub mod encoding;
pub mod exponent;
pub mod factorize;
pub mod node;
pub mod reorder;

pub use builder::TreeBuilder;
pub use codegen::CodeGenerator;
pub use encoding::{EncodedNode, TreeEncoding};
pub use node::{ExprArena, LeafKind, Node, NodeId, Operator, ValueRef};

use crate::compiler::error::Result;
use crate::compiler::ir::instruction::VarId;
use crate::compiler::ir::types::{IrType, SecureTypes, TypeOracle};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Registry key of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeKey {
    /// Statement without an assigned variable.
    NoVar,
    /// Function return value.
    Return,
    Var(VarId),
}

impl TreeKey {
    pub const NO_VAR_ID: i64 = -1;
    pub const RETURN_ID: i64 = -2;

    /// Signed identity: the variable id, or one of the negative sentinels.
    pub fn as_i64(self) -> i64 {
        match self {
            TreeKey::NoVar => Self::NO_VAR_ID,
            TreeKey::Return => Self::RETURN_ID,
            TreeKey::Var(var) => var.as_i64(),
        }
    }
}

/// Tree registry of one function body.
#[derive(Debug, Clone)]
pub struct Bet<O: TypeOracle = SecureTypes> {
    pub arena: ExprArena,
    trees: HashMap<TreeKey, NodeId>,
    /// Keys in registration order; re-registration moves a key to the end.
    order: Vec<TreeKey>,
    oracle: O,
}

impl Bet<SecureTypes> {
    pub fn new() -> Self {
        Self::with_oracle(SecureTypes::new())
    }
}

impl Default for Bet<SecureTypes> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: TypeOracle> Bet<O> {
    pub fn with_oracle(oracle: O) -> Self {
        Self {
            arena: ExprArena::new(),
            trees: HashMap::new(),
            order: Vec::new(),
            oracle,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Register `root` as the tree computing `key`, overwriting any previous tree.
    pub fn add_tree(&mut self, key: TreeKey, root: NodeId) {
        if self.trees.insert(key, root).is_some() {
            self.order.retain(|&k| k != key);
        }
        self.order.push(key);
    }

    pub fn tree(&self, key: TreeKey) -> Option<NodeId> {
        self.trees.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered trees, most recent first.
    pub fn trees(&self) -> impl Iterator<Item = (TreeKey, NodeId)> + '_ {
        self.order.iter().rev().map(|key| (*key, self.trees[key]))
    }

    /// Every node of every tree, most recent tree first, each tree in pre-order.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes {
            arena: &self.arena,
            stack: self.order.iter().map(|key| self.trees[key]).collect(),
        }
    }

    /// Substitute every unexpanded variable leaf under `id` with a copy of the tree
    /// registered for that variable.
    pub fn expand_node(&mut self, id: NodeId) {
        if self.arena[id].expanded {
            return;
        }

        if self.arena[id].is_leaf() {
            let registered = self.arena[id].var().and_then(|var| self.tree(TreeKey::Var(var)));
            if let Some(root) = registered {
                let copy = self.arena.copy(root);
                self.arena.replace(id, copy);
            }
        } else {
            let children: SmallVec<[NodeId; 2]> = self.arena[id].children().collect();
            for child in children {
                self.expand_node(child);
            }
        }

        self.arena[id].expanded = true;
    }

    /// Total nodes and edges over all registered trees.
    pub fn elements_count(&self) -> (usize, usize) {
        self.order
            .iter()
            .map(|key| self.arena.elements_count(self.trees[key]))
            .fold((0, 0), |(nodes, edges), (n, e)| (nodes + n, edges + e))
    }

    pub fn realize_type(&mut self, id: NodeId, force: bool) -> Result<IrType> {
        self.arena.realize_type(id, force, &self.oracle)
    }

    pub fn is_expensive(&mut self, id: NodeId) -> Result<bool> {
        self.arena.is_expensive(id, &self.oracle)
    }
}

/// Pre-order node iterator over a registry.
pub struct Nodes<'a> {
    arena: &'a ExprArena,
    stack: Vec<NodeId>,
}

impl Iterator for Nodes<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let node = &self.arena[id];
        if let Some(right) = node.right {
            self.stack.push(right);
        }
        if let Some(left) = node.left {
            self.stack.push(left);
        }
        Some(id)
    }
}
