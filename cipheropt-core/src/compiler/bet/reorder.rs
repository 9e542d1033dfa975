//! Priority Reorderer
//!
//! Re-associates chains of one commutative operator so that cheap operands combine with
//! each other before meeting an expensive one.
//!
//! # Algorithm
//! For `root = sibling op (x op y)` where `sibling` is cheap and one of `x`, `y` is
//! expensive, the expensive grandchild is pulled up next to the chain and the cheap
//! sibling takes its slot: `(s + a) + b` becomes `(b + a) + s` with `s` secure.
//! The driver walks the tree in pre-order and repeats until a full pass swaps nothing.

use crate::compiler::bet::node::NodeId;
use crate::compiler::bet::Bet;
use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::types::TypeOracle;

impl<O: TypeOracle> Bet<O> {
    /// Swap the cheap `sibling` of `child` with the expensive grandchild under `child`.
    ///
    /// `child` must be a child of `root` tagged with the same operator.
    pub fn swap_priorities(&mut self, root: NodeId, child: NodeId) -> Result<bool> {
        let root_node = &self.arena[root];
        if !root_node.has_child(child) {
            return Err(OptimizerError::constraint(format!(
                "{} is not a child of {}",
                child, root
            )));
        }
        if root_node.op.is_none() || root_node.op != self.arena[child].op {
            return Err(OptimizerError::constraint(format!(
                "cannot swap priorities of {} and {}: operators differ",
                self.arena.display(root),
                self.arena.display(child)
            )));
        }

        let (Some(lc), Some(rc)) = (root_node.left, root_node.right) else {
            return Ok(false);
        };
        let sibling = if lc == child { rc } else { lc };
        if self.is_expensive(sibling)? {
            return Ok(false);
        }

        let (Some(lcc), Some(rcc)) = (self.arena[child].left, self.arena[child].right) else {
            return Ok(false);
        };
        let (lcc_expensive, rcc_expensive) = (self.is_expensive(lcc)?, self.is_expensive(rcc)?);
        if lcc_expensive == rcc_expensive {
            return Ok(false);
        }

        let cipher_grandchild = if lcc_expensive { lcc } else { rcc };
        if cipher_grandchild == lcc {
            self.arena[child].left = Some(sibling);
        } else {
            self.arena[child].right = Some(sibling);
        }
        if sibling == lc {
            self.arena[root].left = Some(cipher_grandchild);
        } else {
            self.arena[root].right = Some(cipher_grandchild);
        }

        self.arena.invalidate_type(child);
        self.realize_type(child, false)?;
        log::debug!("Reordered priorities: {}", self.arena.display(root));
        Ok(true)
    }

    /// Apply the first possible swap in the subtree at `node`.
    pub fn reorder_priority(&mut self, node: NodeId) -> Result<bool> {
        if self.arena[node].is_leaf() || !self.is_expensive(node)? {
            return Ok(false);
        }

        let (left, right) = (self.arena[node].left, self.arena[node].right);
        if self.arena.is_consecutive_commutative(node) {
            for child in [left, right].into_iter().flatten() {
                if self.arena[child].op == self.arena[node].op && self.swap_priorities(node, child)? {
                    return Ok(true);
                }
            }
        }

        for child in [left, right].into_iter().flatten() {
            if self.reorder_priority(child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reorder `root` until no swap applies.
    pub fn reorder_priorities(&mut self, root: NodeId) -> Result<bool> {
        let size = self.arena.node_count(root);
        let max_swaps = (size * size).max(16);

        let mut swaps = 0;
        while self.reorder_priority(root)? {
            swaps += 1;
            if swaps >= max_swaps {
                log::warn!(
                    "Priority reordering stopped after {} swaps on {}",
                    swaps,
                    self.arena.display(root)
                );
                break;
            }
        }
        Ok(swaps > 0)
    }
}
