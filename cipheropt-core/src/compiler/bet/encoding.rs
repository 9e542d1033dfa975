//! Tree Encoding
//!
//! Flattens a tree registry into a sequence of fixed 7-field records consumed by the
//! runtime optimization helper:
//!
//! | field | meaning                                                 |
//! |-------|---------------------------------------------------------|
//! | 0     | node identity                                           |
//! | 1     | left child identity, or `-1`                            |
//! | 2     | right child identity, or `-1`                           |
//! | 3     | index into the function's user parameters, or `-1`      |
//! | 4     | variable identity of a variable leaf, or `-1`           |
//! | 5     | operator name (empty for leaves)                        |
//! | 6     | canonical name of the realized type                     |
//!
//! Records follow registry iteration order: most recent tree first, pre-order within
//! each tree. The field order and the `-1` sentinel are part of the wire contract.
//!
//! Node identity is the id of the node's IR value. Nodes without one (or whose value id
//! was already taken by another node) get fresh ids starting after the module's last value.

use crate::compiler::bet::node::{ExprArena, LeafKind, Node, NodeId, Operator, ValueRef};
use crate::compiler::bet::Bet;
use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::instruction::{ValueId, VarId};
use crate::compiler::ir::module::Module;
use crate::compiler::ir::types::{IrType, TypeOracle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Sentinel for an absent identity or index.
pub const ABSENT: i64 = -1;

/// One encoded node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireRecord", into = "WireRecord")]
pub struct EncodedNode {
    pub id: i64,
    pub left: i64,
    pub right: i64,
    pub param_index: i64,
    pub var_id: i64,
    pub operator: String,
    pub type_name: String,
}

impl EncodedNode {
    pub fn is_leaf(&self) -> bool {
        self.left == ABSENT && self.right == ABSENT
    }
}

/// Positional wire form of [`EncodedNode`].
#[derive(Serialize, Deserialize)]
struct WireRecord(i64, i64, i64, i64, i64, String, String);

impl From<WireRecord> for EncodedNode {
    fn from(WireRecord(id, left, right, param_index, var_id, operator, type_name): WireRecord) -> Self {
        Self {
            id,
            left,
            right,
            param_index,
            var_id,
            operator,
            type_name,
        }
    }
}

impl From<EncodedNode> for WireRecord {
    fn from(node: EncodedNode) -> Self {
        WireRecord(
            node.id,
            node.left,
            node.right,
            node.param_index,
            node.var_id,
            node.operator,
            node.type_name,
        )
    }
}

/// Encoded tree registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeEncoding {
    pub records: Vec<EncodedNode>,
}

impl TreeEncoding {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodedNode> {
        self.records.iter()
    }

    /// Rebuild parent/child linkage from the identity fields.
    ///
    /// Returns a fresh arena and the roots in record order. Leaves carry their variable
    /// (constants and other values come back opaque) and every node carries its encoded
    /// type. Use [`TreeEncoding::decode_with`] to recover leaves from the module.
    pub fn decode(&self) -> Result<(ExprArena, Vec<NodeId>)> {
        self.decode_inner(None)
    }

    /// Like [`TreeEncoding::decode`], but a leaf whose identity is a value of `module`
    /// is rebuilt from that value, so constants decode to themselves.
    pub fn decode_with(&self, module: &Module) -> Result<(ExprArena, Vec<NodeId>)> {
        self.decode_inner(Some(module))
    }

    fn decode_inner(&self, module: Option<&Module>) -> Result<(ExprArena, Vec<NodeId>)> {
        let mut by_id: HashMap<i64, &EncodedNode> = HashMap::with_capacity(self.records.len());
        for record in &self.records {
            by_id.entry(record.id).or_insert(record);
        }
        let children: HashSet<i64> = self
            .records
            .iter()
            .flat_map(|record| [record.left, record.right])
            .filter(|&id| id != ABSENT)
            .collect();

        let mut decoder = Decoder {
            module,
            by_id,
            arena: ExprArena::new(),
            on_path: HashSet::new(),
        };
        let mut roots = Vec::new();
        let mut seen_roots = HashSet::new();
        for record in &self.records {
            if !children.contains(&record.id) && seen_roots.insert(record.id) {
                roots.push(decoder.build(record.id)?);
            }
        }
        Ok((decoder.arena, roots))
    }
}

struct Decoder<'a> {
    module: Option<&'a Module>,
    by_id: HashMap<i64, &'a EncodedNode>,
    arena: ExprArena,
    on_path: HashSet<i64>,
}

impl Decoder<'_> {
    fn build(&mut self, id: i64) -> Result<NodeId> {
        let record = *self
            .by_id
            .get(&id)
            .ok_or_else(|| OptimizerError::constraint(format!("encoding references unknown node {}", id)))?;
        if !self.on_path.insert(id) {
            return Err(OptimizerError::constraint(format!("encoding contains a cycle through node {}", id)));
        }

        let left = self.child(record.left)?;
        let right = self.child(record.right)?;
        let value_id = u32::try_from(record.id)
            .map_err(|_| OptimizerError::constraint(format!("invalid node identity {}", record.id)))?;
        let ty = IrType::new(record.type_name.clone());
        let known = self
            .module
            .filter(|module| left.is_none() && (value_id as usize) < module.value_count())
            .map(|module| ValueRef::from_value(module.value(ValueId(value_id))));
        let value = known.unwrap_or_else(|| {
            let kind = match u32::try_from(record.var_id) {
                Ok(var) if left.is_none() => LeafKind::Var(VarId(var)),
                _ => LeafKind::Opaque,
            };
            ValueRef {
                id: ValueId(value_id),
                ty: Some(ty.clone()),
                kind,
            }
        });

        let node = Node {
            value: Some(value),
            ty: Some(ty),
            op: (!record.operator.is_empty()).then(|| Operator::from_magic_name(&record.operator)),
            left,
            right,
            expanded: true,
        };

        self.on_path.remove(&id);
        Ok(self.arena.alloc(node))
    }

    fn child(&mut self, id: i64) -> Result<Option<NodeId>> {
        if id == ABSENT {
            Ok(None)
        } else {
            self.build(id).map(Some)
        }
    }
}

impl<O: TypeOracle> Bet<O> {
    /// Encode every registered tree.
    ///
    /// `params` are the function's user parameters; a variable leaf reading one of them
    /// records its position.
    pub fn encode(&mut self, module: &Module, params: &[VarId]) -> Result<TreeEncoding> {
        let order: Vec<NodeId> = self.nodes().collect();

        let mut identities: HashMap<NodeId, i64> = HashMap::with_capacity(order.len());
        let mut taken: HashSet<i64> = HashSet::with_capacity(order.len());
        let mut next_free = module.value_count() as i64;
        for &id in &order {
            let candidate = self.arena[id].value.as_ref().map(|value| i64::from(value.id.0));
            let identity = match candidate {
                Some(candidate) if !taken.contains(&candidate) => candidate,
                _ => {
                    next_free += 1;
                    next_free - 1
                }
            };
            taken.insert(identity);
            identities.entry(id).or_insert(identity);
        }

        let mut records = Vec::with_capacity(order.len());
        for id in order {
            let type_name = self.realize_type(id, false)?.name().to_string();
            let node = &self.arena[id];
            let var = node.var();

            records.push(EncodedNode {
                id: identities[&id],
                left: node.left.map_or(ABSENT, |child| identities[&child]),
                right: node.right.map_or(ABSENT, |child| identities[&child]),
                param_index: var
                    .and_then(|var| params.iter().position(|&param| param == var))
                    .map_or(ABSENT, |index| index as i64),
                var_id: var.map_or(ABSENT, VarId::as_i64),
                operator: node.op.as_ref().map(|op| op.magic_name().to_string()).unwrap_or_default(),
                type_name,
            });
        }

        Ok(TreeEncoding { records })
    }
}
