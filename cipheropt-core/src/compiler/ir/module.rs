//! IR Module
//!
//! Owns everything a function body refers to: the value arena, the variable table,
//! the callee table, the operator table and the optimization-helper table.
//!
//! # Operator Resolution
//! Operators are looked up by `(receiver type, operator name, operand types)`, the way
//! the host type system resolves a magic method on the left operand's type. The lookup
//! is exposed through the [`OperatorResolver`] trait so the code generator does not
//! depend on how the table is stored.

use crate::compiler::ir::instruction::{FuncId, Function, Value, ValueId, ValueKind, VarId};
use crate::compiler::ir::types::IrType;
use smallvec::SmallVec;
use std::collections::HashMap;

pub const ADD_MAGIC_NAME: &str = "__add__";
pub const SUB_MAGIC_NAME: &str = "__sub__";
pub const MUL_MAGIC_NAME: &str = "__mul__";
pub const MATMUL_MAGIC_NAME: &str = "__matmul__";
pub const TRUEDIV_MAGIC_NAME: &str = "__truediv__";
pub const POW_MAGIC_NAME: &str = "__pow__";

/// Helper replacing a chain of matrix multiplications.
pub const MATMUL_REORDERING_HELPER: &str = "matmul_reordering";

/// Operator-symbol resolver.
pub trait OperatorResolver {
    /// Find the implementation of `operator` on `receiver` accepting `operands`.
    fn resolve_operator(&self, receiver: &IrType, operator: &str, operands: &[&IrType]) -> Option<FuncId>;
}

/// A callee: an operator method or a helper.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub id: FuncId,
    /// Unmangled name (the magic name for operator methods).
    pub name: String,
    /// Result type of a call; `None` makes calls untypeable.
    pub result: Option<IrType>,
}

/// A variable (local or parameter).
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub id: VarId,
    pub name: String,
    pub ty: Option<IrType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperatorKey {
    receiver: String,
    operator: String,
    operands: Vec<String>,
}

impl OperatorKey {
    fn new(receiver: &IrType, operator: &str, operands: &[&IrType]) -> Self {
        Self {
            receiver: receiver.name().to_string(),
            operator: operator.to_string(),
            operands: operands.iter().map(|ty| ty.name().to_string()).collect(),
        }
    }
}

/// IR module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    values: Vec<Value>,
    vars: Vec<Var>,
    funcs: Vec<Func>,
    /// Functions eligible for optimization.
    pub functions: Vec<Function>,
    operators: HashMap<OperatorKey, FuncId>,
    helpers: HashMap<String, FuncId>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: impl Into<String>, ty: Option<IrType>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Var {
            id,
            name: name.into(),
            ty,
        });
        id
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.index()]
    }

    pub fn var_by_name(&self, name: &str) -> Option<VarId> {
        self.vars.iter().find(|var| var.name == name).map(|var| var.id)
    }

    pub fn add_func(&mut self, name: impl Into<String>, result: Option<IrType>) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(Func {
            id,
            name: name.into(),
            result,
        });
        id
    }

    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id.index()]
    }

    /// Register an operator implementation and return its callee.
    pub fn register_operator(
        &mut self,
        receiver: &IrType,
        operator: &str,
        operands: &[&IrType],
        result: IrType,
    ) -> FuncId {
        let key = OperatorKey::new(receiver, operator, operands);
        if let Some(&existing) = self.operators.get(&key) {
            self.funcs[existing.index()].result = Some(result);
            return existing;
        }
        let id = self.add_func(operator, Some(result));
        self.operators.insert(key, id);
        id
    }

    /// Register an optimization helper under `name`.
    pub fn register_helper(&mut self, name: impl Into<String>, result: Option<IrType>) -> FuncId {
        let name = name.into();
        let id = self.add_func(name.clone(), result);
        self.helpers.insert(name, id);
        id
    }

    pub fn helper(&self, name: &str) -> Option<FuncId> {
        self.helpers.get(name).copied()
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    fn push_value(&mut self, ty: Option<IrType>, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value { id, ty, kind });
        id
    }

    pub fn int(&mut self, value: i64) -> ValueId {
        self.push_value(Some(IrType::int()), ValueKind::IntConst(value))
    }

    pub fn float(&mut self, value: f64) -> ValueId {
        self.push_value(Some(IrType::float()), ValueKind::FloatConst(value))
    }

    /// Read of `var`, typed with the variable's type.
    pub fn var_value(&mut self, var: VarId) -> ValueId {
        let ty = self.var(var).ty.clone();
        self.push_value(ty, ValueKind::Var(var))
    }

    /// Call of `func`, typed with the callee's result type.
    pub fn call(&mut self, func: FuncId, args: &[ValueId]) -> ValueId {
        let ty = self.func(func).result.clone();
        self.push_value(
            ty,
            ValueKind::Call {
                func,
                args: SmallVec::from_slice(args),
            },
        )
    }

    pub fn tuple(&mut self, elements: Vec<ValueId>) -> ValueId {
        self.push_value(None, ValueKind::Tuple(elements))
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Overwrite a value record in place; every user of `id` observes the new value.
    pub fn replace_value(&mut self, id: ValueId, kind: ValueKind, ty: Option<IrType>) {
        let value = &mut self.values[id.index()];
        value.kind = kind;
        value.ty = ty;
    }

    /// Copy of the call `id` with its arguments swapped for `new_args`.
    ///
    /// The original call is left alone; a non-call `id` is returned unchanged.
    pub fn with_call_args(&mut self, id: ValueId, new_args: &[ValueId]) -> ValueId {
        let value = self.value(id);
        let ValueKind::Call { func, .. } = value.kind else {
            return id;
        };
        let ty = value.ty.clone();
        self.push_value(
            ty,
            ValueKind::Call {
                func,
                args: SmallVec::from_slice(new_args),
            },
        )
    }

    /// Unmangled callee name if `id` is a call.
    pub fn callee_name(&self, id: ValueId) -> Option<&str> {
        match &self.value(id).kind {
            ValueKind::Call { func, .. } => Some(self.func(*func).name.as_str()),
            _ => None,
        }
    }

    /// Is `id` a call of `name` with at least one argument?
    pub fn is_call_of(&self, id: ValueId, name: &str) -> bool {
        match &self.value(id).kind {
            ValueKind::Call { func, args } => !args.is_empty() && self.func(*func).name == name,
            _ => false,
        }
    }

    /// Render a value as an s-expression using variable names.
    pub fn render(&self, id: ValueId) -> String {
        let value = self.value(id);
        match &value.kind {
            ValueKind::IntConst(v) => v.to_string(),
            ValueKind::FloatConst(v) => format!("{:?}", v),
            ValueKind::Var(var) => self.var(*var).name.clone(),
            ValueKind::Call { func, args } => {
                let mut out = format!("({}", self.func(*func).name);
                for &arg in args {
                    out.push(' ');
                    out.push_str(&self.render(arg));
                }
                out.push(')');
                out
            }
            ValueKind::Tuple(elements) => {
                let rendered: Vec<String> = elements.iter().map(|&e| self.render(e)).collect();
                format!("(tuple {})", rendered.join(" "))
            }
        }
    }
}

impl OperatorResolver for Module {
    fn resolve_operator(&self, receiver: &IrType, operator: &str, operands: &[&IrType]) -> Option<FuncId> {
        self.operators
            .get(&OperatorKey::new(receiver, operator, operands))
            .copied()
    }
}
