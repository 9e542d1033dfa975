//! Test Utilities
//!
//! Builds small modules with a fake operator table and turns IR values into trees.
//! Operator results follow a simple rule: a ciphertext ciphertensor operand wins, then
//! a plaintext ciphertensor, then a secret-shared tensor, otherwise `int`.

#![allow(dead_code)]

use cipheropt_core::compiler::bet::{Bet, ExprArena, LeafKind, NodeId, Operator, TreeBuilder, ValueRef};
use cipheropt_core::compiler::ir::instruction::{ValueId, VarId};
use cipheropt_core::compiler::ir::module::{
    Module, ADD_MAGIC_NAME, MATMUL_MAGIC_NAME, MUL_MAGIC_NAME, POW_MAGIC_NAME, SUB_MAGIC_NAME,
};
use cipheropt_core::compiler::ir::types::IrType;
use cipheropt_core::compiler::ir::{OperatorResolver, ValueKind};

pub const INT: &str = "int";
pub const SECRET: &str = "std.sequre.types.sharetensor.Sharetensor[int]";
pub const CIPHER: &str =
    "std.sequre.types.ciphertensor.Ciphertensor[std.sequre.lattiseq.ckks.Ciphertext]";
pub const PLAIN: &str = "std.sequre.types.ciphertensor.Ciphertensor[std.sequre.lattiseq.ckks.Plaintext]";

pub const ALL_TYPES: [&str; 4] = [INT, SECRET, CIPHER, PLAIN];
pub const ALL_OPERATORS: [&str; 5] = [ADD_MAGIC_NAME, SUB_MAGIC_NAME, MUL_MAGIC_NAME, MATMUL_MAGIC_NAME, POW_MAGIC_NAME];

/// Result type of a binary operator over `lhs` and `rhs` in the fake operator table.
pub fn result_type(lhs: &str, rhs: &str) -> &'static str {
    [CIPHER, PLAIN, SECRET]
        .into_iter()
        .find(|candidate| lhs == *candidate || rhs == *candidate)
        .unwrap_or(INT)
}

/// A module plus a tree registry sharing its values.
pub struct Fixture {
    pub module: Module,
    pub bet: Bet,
}

impl Fixture {
    /// Module with every operator registered for every pair of test types.
    pub fn new() -> Self {
        let mut fixture = Self::bare();
        for op in ALL_OPERATORS {
            for lhs in ALL_TYPES {
                for rhs in ALL_TYPES {
                    fixture.register(op, lhs, rhs);
                }
            }
        }
        fixture
    }

    /// Module without any operator.
    pub fn bare() -> Self {
        Self {
            module: Module::new(),
            bet: Bet::new(),
        }
    }

    pub fn register(&mut self, op: &str, lhs: &str, rhs: &str) {
        let (l, r) = (IrType::new(lhs), IrType::new(rhs));
        self.module
            .register_operator(&l, op, &[&l, &r], IrType::new(result_type(lhs, rhs)));
    }

    pub fn declare(&mut self, name: &str, ty: &str) -> VarId {
        self.module.add_var(name, Some(IrType::new(ty)))
    }

    /// Fresh read of a new variable.
    pub fn var(&mut self, name: &str, ty: &str) -> ValueId {
        let var = self.declare(name, ty);
        self.module.var_value(var)
    }

    /// Fresh read of an existing variable.
    pub fn read(&mut self, var: VarId) -> ValueId {
        self.module.var_value(var)
    }

    pub fn int(&mut self, value: i64) -> ValueId {
        self.module.int(value)
    }

    /// Call of `op` resolved against the operand types.
    pub fn op(&mut self, op: &str, lhs: ValueId, rhs: ValueId) -> ValueId {
        let l = self.module.value(lhs).ty.clone().expect("typed lhs");
        let r = self.module.value(rhs).ty.clone().expect("typed rhs");
        let func = self
            .module
            .resolve_operator(&l, op, &[&l, &r])
            .unwrap_or_else(|| panic!("operator {} not registered for ({}, {})", op, l, r));
        self.module.call(func, &[lhs, rhs])
    }

    pub fn add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.op(ADD_MAGIC_NAME, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.op(MUL_MAGIC_NAME, lhs, rhs)
    }

    pub fn matmul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.op(MATMUL_MAGIC_NAME, lhs, rhs)
    }

    pub fn pow(&mut self, base: ValueId, exponent: i64) -> ValueId {
        let exponent = self.int(exponent);
        self.op(POW_MAGIC_NAME, base, exponent)
    }

    /// Build the tree of `value` into the fixture's registry arena.
    pub fn tree(&mut self, value: ValueId) -> NodeId {
        TreeBuilder::build_value(&mut self.bet.arena, &self.module, value)
    }

    pub fn display(&self, node: NodeId) -> String {
        self.bet.arena.display(node).to_string()
    }

    pub fn equal(&self, a: NodeId, b: NodeId) -> bool {
        self.bet.arena.structurally_equal(a, b)
    }

    /// Number of binary operations whose operands are both expensive.
    pub fn expensive_pairs(&mut self, root: NodeId) -> usize {
        let mut pairs = 0;
        for id in self.bet.arena.preorder(root) {
            let node = &self.bet.arena[id];
            if let (Some(left), Some(right)) = (node.left, node.right) {
                let left_expensive = self.bet.is_expensive(left).expect("typed left operand");
                let right_expensive = self.bet.is_expensive(right).expect("typed right operand");
                if left_expensive && right_expensive {
                    pairs += 1;
                }
            }
        }
        pairs
    }

    /// Rendering of a call value, with variable names.
    pub fn render(&self, value: ValueId) -> String {
        self.module.render(value)
    }

    pub fn is_call(&self, value: ValueId) -> bool {
        matches!(self.module.value(value).kind, ValueKind::Call { .. })
    }
}

/// Variable leaf built directly in an arena.
pub fn var_leaf(arena: &mut ExprArena, var: u32, ty: Option<&str>) -> NodeId {
    arena.leaf(Some(ValueRef {
        id: ValueId(var),
        ty: ty.map(IrType::new),
        kind: LeafKind::Var(VarId(var)),
    }))
}

/// Integer constant leaf built directly in an arena.
pub fn int_leaf(arena: &mut ExprArena, value: i64) -> NodeId {
    arena.leaf(Some(ValueRef {
        id: ValueId(u32::MAX),
        ty: Some(IrType::int()),
        kind: LeafKind::Int(value),
    }))
}

/// Value of the subtree at `root` in wrapping integer arithmetic, reading variable `v`
/// from `env[v]`. `None` for leaves and operators it cannot evaluate.
pub fn evaluate(arena: &ExprArena, root: NodeId, env: &[i64]) -> Option<i64> {
    let node = &arena[root];
    if node.is_leaf() {
        return match node.leaf_kind()? {
            LeafKind::Int(v) => Some(*v),
            LeafKind::Var(var) => env.get(var.0 as usize).copied(),
            _ => None,
        };
    }

    let left = evaluate(arena, node.left?, env)?;
    let right = evaluate(arena, node.right?, env)?;
    match node.op.as_ref()? {
        Operator::Add => Some(left.wrapping_add(right)),
        Operator::Sub => Some(left.wrapping_sub(right)),
        Operator::Mul => Some(left.wrapping_mul(right)),
        _ => None,
    }
}

/// Path of a JSON fixture.
pub fn fixture_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
