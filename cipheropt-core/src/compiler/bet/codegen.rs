//! Code Generator
//!
//! Regenerates IR from an optimized tree. Leaves yield their stored IR value; every
//! operation node is re-linked against the operator implementation for its realized
//! operand types (the left operand's type is the receiver) and emitted as a new call.
//!
//! Must run after the last rewrite and after a forced type re-realization: rewrites
//! change which implementation is correct for a node.

use crate::compiler::bet::node::{ExprArena, NodeId, ValueRef};
use crate::compiler::bet::Bet;
use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::instruction::ValueId;
use crate::compiler::ir::module::{Module, OperatorResolver};
use crate::compiler::ir::types::{IrType, TypeOracle};
use smallvec::SmallVec;

/// Emits IR for expression trees.
pub struct CodeGenerator;

impl CodeGenerator {
    /// Emit the value computed by the subtree at `node`.
    ///
    /// # Errors
    /// - `Link` if no operator implementation matches a node's operand types
    /// - `Constraint` if a leaf carries no IR value
    /// - `Type` if an operand type cannot be realized
    pub fn generate(
        arena: &mut ExprArena,
        oracle: &dyn TypeOracle,
        module: &mut Module,
        node: NodeId,
    ) -> Result<ValueId> {
        if arena[node].is_leaf() {
            return arena[node].value.as_ref().map(|value| value.id).ok_or_else(|| {
                OptimizerError::constraint(format!("leaf {} has no IR value to emit", node))
            });
        }

        let (Some(op), Some(left)) = (arena[node].op.clone(), arena[node].left) else {
            return Err(OptimizerError::constraint(format!(
                "operation {} is missing its operator or left operand",
                node
            )));
        };
        let right = arena[node].right;

        let mut operand_types: SmallVec<[IrType; 2]> = SmallVec::new();
        operand_types.push(arena.realize_type(left, false, oracle)?);
        if let Some(right) = right {
            operand_types.push(arena.realize_type(right, false, oracle)?);
        }
        let operand_refs: SmallVec<[&IrType; 2]> = operand_types.iter().collect();

        let func = module
            .resolve_operator(&operand_types[0], op.magic_name(), &operand_refs)
            .ok_or_else(|| {
                let names: SmallVec<[&str; 2]> = operand_types.iter().map(IrType::name).collect();
                OptimizerError::link(op.magic_name(), operand_types[0].name(), &names)
            })?;

        let mut args: SmallVec<[ValueId; 2]> = SmallVec::new();
        args.push(Self::generate(arena, oracle, module, left)?);
        if let Some(right) = right {
            args.push(Self::generate(arena, oracle, module, right)?);
        }

        let call = module.call(func, &args);
        arena[node].value = Some(ValueRef::from_value(module.value(call)));
        Ok(call)
    }
}

impl<O: TypeOracle> Bet<O> {
    /// Emit the value computed by the subtree at `node`.
    pub fn generate(&mut self, module: &mut Module, node: NodeId) -> Result<ValueId> {
        CodeGenerator::generate(&mut self.arena, &self.oracle, module, node)
    }
}
