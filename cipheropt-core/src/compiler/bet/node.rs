//! Expression Nodes
//!
//! Binary expression tree nodes live in an [`ExprArena`] and refer to their children by
//! [`NodeId`]. A node is either a leaf (constant, variable read, or any other value the
//! builder stops at) or an operation with one or two children.
//!
//! # Ownership
//! Every node has at most one parent. Rewrites that need a subtree in two places take a
//! deep [`ExprArena::copy`]; nodes are never aliased. Replacing a node "in place"
//! overwrites the record stored at its id, so every parent slot holding that id observes
//! the new content. The source record is left orphaned in the arena.
//!
//! # Type Realization
//! Types are realized lazily and memoized. A leaf takes the type of its IR value. An
//! operation takes the type of a cipher-encrypted ciphertensor child if there is one
//! (left first), else of a plaintext-encrypted ciphertensor child, else of its left child.

use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::instruction::{Value, ValueId, ValueKind, VarId};
use crate::compiler::ir::module::{
    ADD_MAGIC_NAME, MATMUL_MAGIC_NAME, MUL_MAGIC_NAME, POW_MAGIC_NAME, SUB_MAGIC_NAME, TRUEDIV_MAGIC_NAME,
};
use crate::compiler::ir::types::{IrType, TypeOracle};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Stable index of a node in an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operator tag of an internal node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    MatMul,
    TrueDiv,
    Pow,
    /// Any other one- or two-operand call, kept by name.
    Other(String),
}

impl Operator {
    pub fn from_magic_name(name: &str) -> Self {
        match name {
            ADD_MAGIC_NAME => Operator::Add,
            SUB_MAGIC_NAME => Operator::Sub,
            MUL_MAGIC_NAME => Operator::Mul,
            MATMUL_MAGIC_NAME => Operator::MatMul,
            TRUEDIV_MAGIC_NAME => Operator::TrueDiv,
            POW_MAGIC_NAME => Operator::Pow,
            other => Operator::Other(other.to_string()),
        }
    }

    pub fn magic_name(&self) -> &str {
        match self {
            Operator::Add => ADD_MAGIC_NAME,
            Operator::Sub => SUB_MAGIC_NAME,
            Operator::Mul => MUL_MAGIC_NAME,
            Operator::MatMul => MATMUL_MAGIC_NAME,
            Operator::TrueDiv => TRUEDIV_MAGIC_NAME,
            Operator::Pow => POW_MAGIC_NAME,
            Operator::Other(name) => name,
        }
    }

    /// Addition and multiplication.
    pub fn is_commutative(&self) -> bool {
        matches!(self, Operator::Add | Operator::Mul)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.magic_name())
    }
}

/// What a leaf's IR value denotes, as far as structural equality is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafKind {
    Int(i64),
    Float(f64),
    Var(VarId),
    /// Anything else (calls the builder stopped at, tuples).
    Opaque,
}

/// Snapshot of the IR value a node originates from.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRef {
    pub id: ValueId,
    pub ty: Option<IrType>,
    pub kind: LeafKind,
}

impl ValueRef {
    pub fn from_value(value: &Value) -> Self {
        let kind = match &value.kind {
            ValueKind::IntConst(v) => LeafKind::Int(*v),
            ValueKind::FloatConst(v) => LeafKind::Float(*v),
            ValueKind::Var(var) => LeafKind::Var(*var),
            ValueKind::Call { .. } | ValueKind::Tuple(_) => LeafKind::Opaque,
        };
        Self {
            id: value.id,
            ty: value.ty.clone(),
            kind,
        }
    }
}

/// Binary expression tree node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Originating IR value; set for leaves and for materialized operations.
    pub value: Option<ValueRef>,
    /// Memoized realized type.
    pub ty: Option<IrType>,
    /// Operator tag; `None` for leaves.
    pub op: Option<Operator>,
    pub left: Option<NodeId>,
    /// Absent for unary operations.
    pub right: Option<NodeId>,
    /// Variable substitution already applied to this subtree.
    pub expanded: bool,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn is_op(&self, op: &Operator) -> bool {
        self.op.as_ref() == Some(op)
    }

    pub fn is_add(&self) -> bool {
        self.is_op(&Operator::Add)
    }

    pub fn is_mul(&self) -> bool {
        self.is_op(&Operator::Mul)
    }

    pub fn is_pow(&self) -> bool {
        self.is_op(&Operator::Pow)
    }

    /// Leaf kind, or `None` for operations and value-less leaves.
    pub fn leaf_kind(&self) -> Option<&LeafKind> {
        if !self.is_leaf() {
            return None;
        }
        self.value.as_ref().map(|value| &value.kind)
    }

    /// Variable read by this leaf.
    pub fn var(&self) -> Option<VarId> {
        match self.leaf_kind() {
            Some(LeafKind::Var(var)) => Some(*var),
            _ => None,
        }
    }

    /// Integer constant held by this leaf.
    pub fn int_const(&self) -> Option<i64> {
        match self.leaf_kind() {
            Some(LeafKind::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> {
        self.left.into_iter().chain(self.right)
    }

    /// Is `child` one of this node's children?
    pub fn has_child(&self, child: NodeId) -> bool {
        self.left == Some(child) || self.right == Some(child)
    }
}

/// Owned storage for expression tree nodes.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Node>,
}

impl Index<NodeId> for ExprArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for ExprArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, including orphaned ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Leaf carrying `value` (a value-less leaf is untagged and untypeable).
    pub fn leaf(&mut self, value: Option<ValueRef>) -> NodeId {
        self.alloc(Node {
            value,
            ..Node::default()
        })
    }

    /// Synthetic operation node with no IR value and no realized type yet.
    pub fn operation(&mut self, op: Operator, left: NodeId, right: Option<NodeId>) -> NodeId {
        self.alloc(Node {
            op: Some(op),
            left: Some(left),
            right,
            ..Node::default()
        })
    }

    /// Overwrite the record at `target` with the record at `source`.
    ///
    /// Children are moved, not copied: `source` must not be reachable afterwards.
    pub fn replace(&mut self, target: NodeId, source: NodeId) {
        if target != source {
            self.nodes[target.index()] = self.nodes[source.index()].clone();
        }
    }

    /// Deep copy of the subtree rooted at `id`.
    pub fn copy(&mut self, id: NodeId) -> NodeId {
        let mut node = self[id].clone();
        node.left = node.left.map(|left| self.copy(left));
        node.right = node.right.map(|right| self.copy(right));
        self.alloc(node)
    }

    /// Do the subtrees at `a` and `b` compute the same value?
    ///
    /// Commutative operations also match with their operands swapped.
    pub fn structurally_equal(&self, a: NodeId, b: NodeId) -> bool {
        let (lhs, rhs) = (&self[a], &self[b]);

        match (lhs.is_leaf(), rhs.is_leaf()) {
            (true, true) => match (lhs.leaf_kind(), rhs.leaf_kind()) {
                (Some(LeafKind::Int(x)), Some(LeafKind::Int(y))) => x == y,
                (Some(LeafKind::Float(x)), Some(LeafKind::Float(y))) => x == y,
                (Some(LeafKind::Var(x)), Some(LeafKind::Var(y))) => x == y,
                _ => false,
            },
            (false, false) => {
                if let (Some(x), Some(y)) = (&lhs.op, &rhs.op) {
                    if x != y {
                        return false;
                    }
                }
                if self.slots_equal(lhs.left, rhs.left) && self.slots_equal(lhs.right, rhs.right) {
                    return true;
                }
                let commutative = lhs.op.as_ref().is_some_and(Operator::is_commutative);
                commutative && self.slots_equal(lhs.left, rhs.right) && self.slots_equal(lhs.right, rhs.left)
            }
            _ => false,
        }
    }

    fn slots_equal(&self, a: Option<NodeId>, b: Option<NodeId>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.structurally_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Commutative operation with at least one child under the same operator.
    pub fn is_consecutive_commutative(&self, id: NodeId) -> bool {
        let node = &self[id];
        match &node.op {
            Some(op) if op.is_commutative() => node.children().any(|child| self[child].is_op(op)),
            _ => false,
        }
    }

    /// Realize (or return the memoized) type of `id`.
    ///
    /// With `force`, the whole subtree is re-derived from its leaves.
    pub fn realize_type(&mut self, id: NodeId, force: bool, oracle: &dyn TypeOracle) -> Result<IrType> {
        if !force {
            if let Some(ty) = &self[id].ty {
                return Ok(ty.clone());
            }
        }

        let node = &self[id];
        if node.is_leaf() {
            let ty = node
                .value
                .as_ref()
                .and_then(|value| value.ty.clone())
                .ok_or_else(|| OptimizerError::untypeable_leaf(self.display(id)))?;
            self[id].ty = Some(ty.clone());
            return Ok(ty);
        }

        let (left, right) = (node.left, node.right);
        let left_ty = match left {
            Some(left) => Some(self.realize_type(left, force, oracle)?),
            None => None,
        };
        let right_ty = match right {
            Some(right) => Some(self.realize_type(right, force, oracle)?),
            None => None,
        };

        let candidates = [left_ty.as_ref(), right_ty.as_ref()];
        let ty = candidates
            .iter()
            .flatten()
            .find(|ty| oracle.is_cipher_ciphertensor(ty))
            .or_else(|| candidates.iter().flatten().find(|ty| oracle.is_plain_ciphertensor(ty)))
            .or_else(|| candidates.iter().flatten().next())
            .map(|ty| (*ty).clone())
            .ok_or_else(|| OptimizerError::Type {
                message: format!("no child of {} yields a type", id),
                suggestion: "Operations need at least one typed operand.".to_string(),
            })?;

        self[id].ty = Some(ty.clone());
        Ok(ty)
    }

    /// Drop the memoized type of `id` (children keep theirs).
    pub fn invalidate_type(&mut self, id: NodeId) {
        self[id].ty = None;
    }

    /// Is the value computed at `id` costly to combine?
    pub fn is_expensive(&mut self, id: NodeId, oracle: &dyn TypeOracle) -> Result<bool> {
        let ty = self.realize_type(id, false, oracle)?;
        Ok(oracle.is_secure_container(&ty))
    }

    /// Node ids of the subtree in pre-order, left before right.
    pub fn preorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = &self[id];
            if let Some(right) = node.right {
                stack.push(right);
            }
            if let Some(left) = node.left {
                stack.push(left);
            }
        }
        order
    }

    /// Number of operation nodes tagged `op` in the subtree.
    pub fn count_ops(&self, root: NodeId, op: &Operator) -> usize {
        self.preorder(root).into_iter().filter(|&id| self[id].is_op(op)).count()
    }

    /// Number of nodes in the subtree.
    pub fn node_count(&self, root: NodeId) -> usize {
        self.preorder(root).len()
    }

    /// Nodes and parent/child edges of the subtree.
    pub fn elements_count(&self, root: NodeId) -> (usize, usize) {
        let nodes = self.preorder(root);
        let edges = nodes.iter().map(|&id| self[id].children().count()).sum();
        (nodes.len(), edges)
    }

    /// S-expression view of the subtree.
    pub fn display(&self, root: NodeId) -> TreeDisplay<'_> {
        TreeDisplay { arena: self, root }
    }
}

/// S-expression rendering of a subtree: `(__mul__ $3 (__add__ $1 $2))`.
///
/// Variable leaves print as `$id`, constants as literals, other leaves as `?id` of
/// their IR value (or `?` without one).
pub struct TreeDisplay<'a> {
    arena: &'a ExprArena,
    root: NodeId,
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = &self.arena[self.root];
        if let Some(op) = &node.op {
            write!(f, "({}", op)?;
            for child in node.children() {
                write!(f, " {}", self.arena.display(child))?;
            }
            return write!(f, ")");
        }
        match &node.value {
            Some(ValueRef { kind: LeafKind::Int(v), .. }) => write!(f, "{}", v),
            Some(ValueRef { kind: LeafKind::Float(v), .. }) => write!(f, "{:?}", v),
            Some(ValueRef { kind: LeafKind::Var(var), .. }) => write!(f, "{}", var),
            Some(ValueRef { id, kind: LeafKind::Opaque, .. }) => write!(f, "?{}", id.0),
            None => write!(f, "?"),
        }
    }
}
