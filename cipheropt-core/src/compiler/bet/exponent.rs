//! Exponent Expander
//!
//! Rewrites `x^k` for a positive integer constant `k` into `k-1` multiplications of
//! copies of `x` (`x*(x*x)` for `k = 3`), which exposes the product to factorization
//! and reordering. Nested powers are expanded bottom-up. Exponents above
//! [`MAX_EXPONENT`] are rejected.

use crate::compiler::bet::node::{NodeId, Operator};
use crate::compiler::bet::Bet;
use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::types::TypeOracle;

/// Largest exponent expanded into a multiplication chain.
pub const MAX_EXPONENT: i64 = 1 << 10;

impl<O: TypeOracle> Bet<O> {
    /// Expand every power in the subtree at `node`.
    ///
    /// # Errors
    /// A power whose exponent is not a positive integer constant, or exceeds
    /// [`MAX_EXPONENT`], is a constraint error.
    pub fn escape_pows(&mut self, node: NodeId) -> Result<bool> {
        let current = &self.arena[node];
        if current.is_leaf() {
            return Ok(false);
        }

        if !current.is_pow() {
            let mut changed = false;
            for child in [current.left, current.right].into_iter().flatten() {
                changed |= self.escape_pows(child)?;
            }
            return Ok(changed);
        }

        let (Some(base), Some(exponent)) = (current.left, current.right) else {
            return Err(OptimizerError::constraint(format!(
                "power {} has no exponent",
                self.arena.display(node)
            )));
        };
        self.escape_pows(base)?;

        let k = match self.arena[exponent].int_const() {
            Some(k) if k > MAX_EXPONENT => {
                return Err(OptimizerError::constraint(format!(
                    "exponent {} in {} exceeds the expansion limit of {}",
                    k,
                    self.arena.display(node),
                    MAX_EXPONENT
                )))
            }
            Some(k) if k > 0 => k,
            Some(k) => {
                return Err(OptimizerError::constraint(format!(
                    "non-positive exponent {} in {}",
                    k,
                    self.arena.display(node)
                )))
            }
            None => {
                return Err(OptimizerError::constraint(format!(
                    "non-integer exponent in {}; exponents must be integer constants",
                    self.arena.display(node)
                )))
            }
        };

        if k == 1 {
            self.arena.replace(node, base);
            return Ok(true);
        }

        let (left, right) = (self.arena.copy(base), self.arena.copy(base));
        let mut chain = self.arena.operation(Operator::Mul, left, Some(right));
        for _ in 2..k {
            let factor = self.arena.copy(base);
            chain = self.arena.operation(Operator::Mul, factor, Some(chain));
        }
        self.arena.replace(node, chain);

        log::debug!("Expanded power into {}", self.arena.display(node));
        Ok(true)
    }
}
