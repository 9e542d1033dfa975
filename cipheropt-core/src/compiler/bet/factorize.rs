//! Factorization Rewriter
//!
//! Extracts a common multiplicative factor out of two additive terms:
//! `a*x + b*x` becomes `x*(a+b)`, saving one multiplication.
//!
//! # Algorithm
//! 1. Walk the additive spine below an addition node. For every multiplication subtree
//!    hanging off the spine, walk its multiplicative chain and record each non-mul
//!    factor together with its parent, sibling, chain root (mul ancestor), the enclosing
//!    addition and that addition's other operand (tail).
//! 2. Each new factor is compared against the factors visited so far, skipping those
//!    recorded under the same mul ancestor. The first structural match ends the search.
//! 3. Rewrite: drop the factor from both chains (parent replaced by sibling), turn the
//!    later chain root into `factor * (rest_later + rest_earlier)` and splice the earlier
//!    chain's addition out by replacing it with its tail.
//!
//! Only the topmost addition reached from the root is searched per call; callers loop
//! through [`Bet::reduce_all`] until nothing is found. Types are stale while rewiring and
//! are re-realized once the loop finishes.

use crate::compiler::bet::node::{ExprArena, NodeId, Operator};
use crate::compiler::bet::Bet;
use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::types::TypeOracle;
use std::collections::HashMap;

/// Search bookkeeping for one factor candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FactorMetadata {
    parent: NodeId,
    sibling: NodeId,
    mul_ancestor: NodeId,
    add_ancestor: NodeId,
    add_tail: NodeId,
}

/// State of one factorization search; dropped after each attempt.
#[derive(Default)]
struct FactorSearch {
    visited: Vec<NodeId>,
    metadata: HashMap<NodeId, FactorMetadata>,
}

impl FactorSearch {
    fn find_factorization_nodes(&mut self, arena: &ExprArena, node: NodeId) -> Result<Option<(NodeId, NodeId)>> {
        if !arena[node].is_add() {
            return Err(OptimizerError::constraint(format!(
                "tried to find factors in non-addition tree {}",
                arena.display(node)
            )));
        }
        let (Some(lc), Some(rc)) = (arena[node].left, arena[node].right) else {
            return Ok(None);
        };

        for (child, tail) in [(lc, rc), (rc, lc)] {
            let factors = if arena[child].is_mul() {
                self.find_factors_in_mul_tree(arena, child, child, node, tail)?
            } else if arena[child].is_add() {
                self.find_factorization_nodes(arena, child)?
            } else {
                None
            };
            if factors.is_some() {
                return Ok(factors);
            }
        }

        Ok(None)
    }

    fn find_factors_in_mul_tree(
        &mut self,
        arena: &ExprArena,
        node: NodeId,
        mul_ancestor: NodeId,
        add_ancestor: NodeId,
        add_tail: NodeId,
    ) -> Result<Option<(NodeId, NodeId)>> {
        if !arena[node].is_mul() {
            return Err(OptimizerError::constraint(format!(
                "tried to find factors in non-multiplication tree {}",
                arena.display(node)
            )));
        }
        let (Some(lc), Some(rc)) = (arena[node].left, arena[node].right) else {
            return Ok(None);
        };

        for (child, sibling) in [(lc, rc), (rc, lc)] {
            if arena[child].is_mul() {
                continue;
            }
            self.metadata.insert(
                child,
                FactorMetadata {
                    parent: node,
                    sibling,
                    mul_ancestor,
                    add_ancestor,
                    add_tail,
                },
            );
            if let Some(twin) = self.internal_is_visited(arena, child, mul_ancestor) {
                return Ok(Some((child, twin)));
            }
            self.visited.push(child);
        }

        for child in [lc, rc] {
            if arena[child].is_mul() {
                let factors = self.find_factors_in_mul_tree(arena, child, mul_ancestor, add_ancestor, add_tail)?;
                if factors.is_some() {
                    return Ok(factors);
                }
            }
        }

        Ok(None)
    }

    /// Visited factor structurally equal to `node` outside its own multiplication chain.
    fn internal_is_visited(&self, arena: &ExprArena, node: NodeId, mul_ancestor: NodeId) -> Option<NodeId> {
        self.visited
            .iter()
            .copied()
            .filter(|visited| self.metadata[visited].mul_ancestor != mul_ancestor)
            .find(|&visited| arena.structurally_equal(node, visited))
    }
}

impl<O: TypeOracle> Bet<O> {
    /// Find two matching factors in different multiplication chains below `add`.
    ///
    /// Returns `(later match, earlier visited twin)`.
    pub fn find_factors(&self, add: NodeId) -> Result<Option<(NodeId, NodeId)>> {
        FactorSearch::default().find_factorization_nodes(&self.arena, add)
    }

    /// Apply one factorization at the topmost addition reachable from `node`.
    pub fn reduce_lvl(&mut self, node: NodeId) -> Result<bool> {
        let current = &self.arena[node];
        if current.is_leaf() {
            return Ok(false);
        }
        if !current.is_add() {
            let (left, right) = (current.left, current.right);
            if let Some(left) = left {
                if self.reduce_lvl(left)? {
                    return Ok(true);
                }
            }
            return match right {
                Some(right) => self.reduce_lvl(right),
                None => Ok(false),
            };
        }

        let mut search = FactorSearch::default();
        let Some((first, second)) = search.find_factorization_nodes(&self.arena, node)? else {
            return Ok(false);
        };
        let f = search.metadata[&first];
        let s = search.metadata[&second];
        log::debug!(
            "Factoring {} out of {}",
            self.arena.display(first),
            self.arena.display(node)
        );

        // Drop the factor from both chains.
        self.arena.replace(s.parent, s.sibling);
        self.arena.replace(f.parent, f.sibling);

        let remainder = self.arena.copy(f.mul_ancestor);
        let sum = self.arena.operation(Operator::Add, remainder, Some(s.mul_ancestor));
        let root = &mut self.arena[f.mul_ancestor];
        root.op = Some(Operator::Mul);
        root.left = Some(first);
        root.right = Some(sum);
        root.value = None;
        root.ty = None;

        self.arena.replace(s.add_ancestor, s.add_tail);

        log::debug!("Factored tree: {}", self.arena.display(node));
        Ok(true)
    }

    /// Factorize `root` to a fixed point, then force type re-realization.
    pub fn reduce_all(&mut self, root: NodeId) -> Result<bool> {
        let mut reduced = false;
        while self.reduce_lvl(root)? {
            reduced = true;
        }
        if reduced {
            self.realize_type(root, true)?;
        }
        Ok(reduced)
    }
}
