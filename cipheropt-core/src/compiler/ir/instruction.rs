//! Host IR Values and Instructions
//!
//! This module defines the straight-line IR the optimizer consumes. A function body is
//! an ordered list of top-level [`Instruction`]s; every operand is a [`ValueId`] into the
//! owning module's value arena.
//!
//! # Memory Layout
//! - Identifiers are `u32` newtypes (a function body never holds 4 billion values)
//! - `ValueKind::Call.args` uses `SmallVec<[ValueId; 2]>` (almost every call is binary)

use crate::compiler::ir::types::IrType;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Signed identity used by the tree encoding wire format.
            #[inline]
            pub fn as_i64(self) -> i64 {
                i64::from(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_newtype!(
    /// Index of a value in the module's value arena.
    ValueId,
    "%"
);
id_newtype!(
    /// Index of a variable in the module's variable table.
    VarId,
    "$"
);
id_newtype!(
    /// Index of a callee in the module's function table.
    FuncId,
    "@"
);

/// What a value computes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Integer literal.
    IntConst(i64),
    /// Floating-point literal.
    FloatConst(f64),
    /// Read of a variable.
    Var(VarId),
    /// Call of a callee (operator method or helper).
    Call {
        func: FuncId,
        args: SmallVec<[ValueId; 2]>,
    },
    /// Tuple construction.
    Tuple(Vec<ValueId>),
}

/// A value in the module's value arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    /// Resolved type; `None` if the value is not directly typeable.
    pub ty: Option<IrType>,
    pub kind: ValueKind,
}

impl Value {
    /// Operand values this value reads.
    pub fn used_values(&self) -> &[ValueId] {
        match &self.kind {
            ValueKind::Call { args, .. } => args.as_slice(),
            ValueKind::Tuple(elements) => elements.as_slice(),
            _ => &[],
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ValueKind::Call { .. })
    }
}

/// Top-level statement of a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// `return value`
    Return(ValueId),
    /// `lhs = rhs`
    Assign { lhs: VarId, rhs: ValueId },
    /// Bare evaluation of a value (a call statement).
    Eval(ValueId),
}

impl Instruction {
    /// The value this instruction computes.
    pub fn value(&self) -> ValueId {
        match *self {
            Instruction::Return(value) | Instruction::Eval(value) => value,
            Instruction::Assign { rhs, .. } => rhs,
        }
    }

    /// Replace the computed value, keeping the statement shape.
    pub fn set_value(&mut self, value: ValueId) {
        match self {
            Instruction::Return(v) | Instruction::Eval(v) => *v = value,
            Instruction::Assign { rhs, .. } => *rhs = value,
        }
    }
}

/// Per-function optimization opt-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionAttributes {
    /// Run the cipher/plain rewrite path.
    pub cipher_opt: bool,
    /// Produce a tree encoding for the runtime helper.
    pub enc_opt: bool,
    /// Run the matrix-multiplication chain reordering.
    pub reorder_matmul: bool,
}

/// A function under optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Leading multiparty environment parameter, excluded from `params`.
    pub mpc: Option<VarId>,
    /// User parameters; encodings index into this list.
    pub params: Vec<VarId>,
    pub body: Vec<Instruction>,
    pub attributes: FunctionAttributes,
}

impl Function {
    /// 0-based index of `var` among the user parameters.
    pub fn param_index(&self, var: VarId) -> Option<usize> {
        self.params.iter().position(|&param| param == var)
    }
}
