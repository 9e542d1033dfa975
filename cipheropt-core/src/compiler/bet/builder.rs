//! Tree Builder
//!
//! Converts IR values into expression trees. Calls with one or two operands become
//! operation nodes whose children are built recursively; every other value (constants,
//! variable reads, tuples, calls of other arity) becomes a leaf carrying that value.
//!
//! The rewrite path uses [`TreeBuilder::build_arithmetic`] instead, which only descends
//! through two-operand calls so every operation it produces can be re-linked by the
//! code generator.
//!
//! Registration into a [`Bet`] is the caller's job, except for [`Bet::parse_series`]
//! which registers one tree per statement.

use crate::compiler::bet::node::{ExprArena, NodeId, Operator, ValueRef};
use crate::compiler::bet::{Bet, TreeKey};
use crate::compiler::ir::instruction::{Instruction, ValueId, ValueKind};
use crate::compiler::ir::module::Module;
use crate::compiler::ir::types::TypeOracle;

/// Builds expression trees from IR.
pub struct TreeBuilder;

impl TreeBuilder {
    /// Tree of the value computed by `instruction`.
    pub fn build_instruction(arena: &mut ExprArena, module: &Module, instruction: &Instruction) -> NodeId {
        Self::build_value(arena, module, instruction.value())
    }

    /// Tree of `value`.
    pub fn build_value(arena: &mut ExprArena, module: &Module, value: ValueId) -> NodeId {
        let ir_value = module.value(value);

        match &ir_value.kind {
            ValueKind::Call { func, args } if (1..=2).contains(&args.len()) => {
                let op = Operator::from_magic_name(&module.func(*func).name);
                let left = Self::build_value(arena, module, args[0]);
                let right = args.get(1).map(|&arg| Self::build_value(arena, module, arg));

                let id = arena.operation(op, left, right);
                arena[id].value = Some(ValueRef::from_value(ir_value));
                arena[id].ty = ir_value.ty.clone();
                id
            }
            _ => arena.leaf(Some(ValueRef::from_value(ir_value))),
        }
    }

    /// Tree of a binary arithmetic expression.
    ///
    /// Only two-operand calls become operation nodes. Everything else is a leaf that is
    /// already expanded, except variable reads which stay open for substitution.
    pub fn build_arithmetic(arena: &mut ExprArena, module: &Module, value: ValueId) -> NodeId {
        let ir_value = module.value(value);

        match &ir_value.kind {
            ValueKind::Call { func, args } if args.len() == 2 => {
                let op = Operator::from_magic_name(&module.func(*func).name);
                let left = Self::build_arithmetic(arena, module, args[0]);
                let right = Self::build_arithmetic(arena, module, args[1]);

                let id = arena.operation(op, left, Some(right));
                arena[id].value = Some(ValueRef::from_value(ir_value));
                arena[id].ty = ir_value.ty.clone();
                id
            }
            kind => {
                let id = arena.leaf(Some(ValueRef::from_value(ir_value)));
                arena[id].expanded = !matches!(kind, ValueKind::Var(_));
                id
            }
        }
    }

    /// Is `value` a two-operand call?
    pub fn is_binary(module: &Module, value: ValueId) -> bool {
        matches!(&module.value(value).kind, ValueKind::Call { args, .. } if args.len() == 2)
    }
}

impl<O: TypeOracle> Bet<O> {
    /// Build and register one tree per statement of `body`.
    ///
    /// Returns go under [`TreeKey::Return`], assignments under their variable, and bare
    /// evaluations under [`TreeKey::NoVar`]. No variable expansion is applied.
    pub fn parse_series(&mut self, module: &Module, body: &[Instruction]) {
        for instruction in body {
            let root = TreeBuilder::build_instruction(&mut self.arena, module, instruction);
            let key = match instruction {
                Instruction::Return(_) => TreeKey::Return,
                Instruction::Assign { lhs, .. } => TreeKey::Var(*lhs),
                Instruction::Eval(_) => TreeKey::NoVar,
            };
            self.add_tree(key, root);
        }
    }
}
