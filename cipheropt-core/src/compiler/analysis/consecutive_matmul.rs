//! Consecutive Matrix Multiplication Reordering
//!
//! Replaces chains of directly nested `__matmul__` calls with a single call to the
//! `matmul_reordering(mpc, operands)` helper, which picks the cheapest association
//! order at run time.
//!
//! # Algorithm
//! For each top-level instruction, repeat until nothing is replaced:
//! 1. Find the first unvisited matmul call in pre-order (visited calls are still
//!    descended through).
//! 2. If none of its operands is a matmul call, mark it visited and continue.
//! 3. Otherwise flatten the chain: walk the first two operands, recursing into the ones
//!    that are matmul calls, and collect the rest in order.
//! 4. Overwrite the matmul value in place with `matmul_reordering(mpc, tuple(operands))`.
//!
//! # Memory Optimizations
//! - The visited set is a `BitVec<u32>` indexed by value id, grown as the module grows

use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::instruction::{FuncId, Instruction, ValueId, ValueKind, VarId};
use crate::compiler::ir::module::{Module, MATMUL_MAGIC_NAME, MATMUL_REORDERING_HELPER};
use bitvec::prelude::*;
use smallvec::smallvec;

/// Matrix multiplication chain reordering.
pub struct ConsecutiveMatmul;

/// Lazily resolved helper call operands, shared by all chains of a body.
struct ReorderTarget {
    mpc: VarId,
    helper: Option<FuncId>,
    mpc_value: Option<ValueId>,
}

impl ReorderTarget {
    fn resolve(&mut self, module: &mut Module) -> Result<(FuncId, ValueId)> {
        let helper = match self.helper {
            Some(helper) => helper,
            None => {
                let helper = module
                    .helper(MATMUL_REORDERING_HELPER)
                    .ok_or_else(|| OptimizerError::missing_helper(MATMUL_REORDERING_HELPER))?;
                self.helper = Some(helper);
                helper
            }
        };
        let mpc = self.mpc;
        let mpc_value = *self.mpc_value.get_or_insert_with(|| module.var_value(mpc));
        Ok((helper, mpc_value))
    }
}

impl ConsecutiveMatmul {
    /// Reorder every matmul chain reachable from the instructions of `body`.
    ///
    /// # Arguments
    /// * `module` - Module owning the values (chains are overwritten in place)
    /// * `body` - Top-level instructions to scan
    /// * `mpc` - Multiparty environment variable passed to the helper
    ///
    /// # Returns
    /// Number of chains replaced.
    ///
    /// # Errors
    /// A chain was found but the module has no `matmul_reordering` helper.
    pub fn reorder_series(module: &mut Module, body: &[Instruction], mpc: VarId) -> Result<usize> {
        let mut target = ReorderTarget {
            mpc,
            helper: None,
            mpc_value: None,
        };
        let mut replaced = 0;
        for instruction in body {
            let mut visited: BitVec<u32> = bitvec![u32, Lsb0; 0; module.value_count()];
            while Self::transform_single(module, instruction.value(), &mut visited, &mut target)? {
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    fn transform_single(
        module: &mut Module,
        root: ValueId,
        visited: &mut BitVec<u32>,
        target: &mut ReorderTarget,
    ) -> Result<bool> {
        loop {
            if visited.len() < module.value_count() {
                visited.resize(module.value_count(), false);
            }
            let Some(matmul) = Self::find_matmul(module, root, visited) else {
                return Ok(false);
            };

            let consecutive = module
                .value(matmul)
                .used_values()
                .iter()
                .any(|&used| module.is_call_of(used, MATMUL_MAGIC_NAME));
            if !consecutive {
                visited.set(matmul.index(), true);
                continue;
            }

            let mut operands = Vec::new();
            Self::parse_args(module, matmul, &mut operands);

            let (helper, mpc_value) = target.resolve(module)?;
            let ty = module
                .func(helper)
                .result
                .clone()
                .or_else(|| module.value(matmul).ty.clone());
            let count = operands.len();
            let tuple = module.tuple(operands);
            module.replace_value(
                matmul,
                ValueKind::Call {
                    func: helper,
                    args: smallvec![mpc_value, tuple],
                },
                ty,
            );

            log::debug!("Reordered chain of {} matrix multiplications at {}", count, matmul);
            return Ok(true);
        }
    }

    /// First unvisited matmul call under `root` in pre-order.
    fn find_matmul(module: &Module, root: ValueId, visited: &BitVec<u32>) -> Option<ValueId> {
        let mut stack = vec![root];
        while let Some(value) = stack.pop() {
            if module.is_call_of(value, MATMUL_MAGIC_NAME) && !visited[value.index()] {
                return Some(value);
            }
            stack.extend(module.value(value).used_values().iter().rev().copied());
        }
        None
    }

    /// Collect the operands of a matmul chain in order.
    fn parse_args(module: &Module, matmul: ValueId, operands: &mut Vec<ValueId>) {
        for &used in module.value(matmul).used_values().iter().take(2) {
            if module.is_call_of(used, MATMUL_MAGIC_NAME) {
                Self::parse_args(module, used, operands);
            } else {
                operands.push(used);
            }
        }
    }
}
