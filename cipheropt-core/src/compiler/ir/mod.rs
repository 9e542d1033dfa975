//! Host intermediate representation consumed by the expression tree engine.

pub mod instruction;
pub mod module;
pub mod parse;
pub mod types;

pub use instruction::{FuncId, Function, FunctionAttributes, Instruction, Value, ValueId, ValueKind, VarId};
pub use module::{Func, Module, OperatorResolver, Var};
pub use parse::{parse_module, ModuleSpec};
pub use types::{IrType, SecureTypes, TypeOracle};
