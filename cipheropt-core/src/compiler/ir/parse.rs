//! JSON Module Descriptions
//!
//! A module is described as JSON: declared variables with their types, the operator
//! table, the helper table, and functions whose bodies use nested expression syntax.
//!
//! ```json
//! {
//!   "vars": [{ "name": "x", "type": "std.sequre.types.sharetensor.Sharetensor[int]" }],
//!   "operators": [{ "receiver": "int", "operator": "__add__", "operands": ["int", "int"], "result": "int" }],
//!   "functions": [{
//!     "name": "f",
//!     "params": ["x"],
//!     "attributes": { "cipher_opt": true },
//!     "body": [{ "return": { "op": "__add__", "args": ["x", 1] } }]
//!   }]
//! }
//! ```
//!
//! # Lowering
//! Calls resolve, in order, to a registered operator matching the argument types, to a
//! helper of that name, or to an opaque callee with no result type. Assignment to an
//! undeclared variable declares it with the type of the assigned value.

use crate::compiler::error::{OptimizerError, Result};
use crate::compiler::ir::instruction::{FuncId, Function, FunctionAttributes, Instruction, ValueId, VarId};
use crate::compiler::ir::module::{Module, OperatorResolver};
use crate::compiler::ir::types::IrType;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSpec {
    pub vars: Vec<VarSpec>,
    pub operators: Vec<OperatorSpec>,
    pub helpers: Vec<HelperSpec>,
    pub functions: Vec<FunctionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSpec {
    pub receiver: String,
    pub operator: String,
    pub operands: Vec<String>,
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperSpec {
    pub name: String,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub mpc: Option<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub attributes: FunctionAttributes,
    pub body: Vec<StatementSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementSpec {
    Return(ExprSpec),
    Assign { var: String, value: ExprSpec },
    Eval(ExprSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprSpec {
    Int(i64),
    Float(f64),
    Var(String),
    Call { op: String, args: Vec<ExprSpec> },
}

/// Parse and lower a JSON module description.
pub fn parse_module(json: &str) -> anyhow::Result<Module> {
    let spec: ModuleSpec = serde_json::from_str(json).context("Failed to parse module description")?;
    let module = spec.lower().context("Failed to lower module description")?;
    Ok(module)
}

impl ModuleSpec {
    /// Lower the description into an IR module.
    pub fn lower(&self) -> Result<Module> {
        let mut lowering = Lowering {
            module: Module::new(),
            opaque: HashMap::new(),
        };

        for var in &self.vars {
            if lowering.module.var_by_name(&var.name).is_some() {
                return Err(OptimizerError::invalid_module(format!("variable {} declared twice", var.name)));
            }
            lowering.module.add_var(var.name.clone(), var.ty.clone().map(IrType::new));
        }
        for op in &self.operators {
            let receiver = IrType::new(op.receiver.clone());
            let operands: Vec<IrType> = op.operands.iter().cloned().map(IrType::new).collect();
            let operand_refs: Vec<&IrType> = operands.iter().collect();
            lowering
                .module
                .register_operator(&receiver, &op.operator, &operand_refs, IrType::new(op.result.clone()));
        }
        for helper in &self.helpers {
            lowering
                .module
                .register_helper(helper.name.clone(), helper.result.clone().map(IrType::new));
        }
        for function in &self.functions {
            let lowered = lowering.function(function)?;
            lowering.module.add_function(lowered);
        }

        Ok(lowering.module)
    }
}

struct Lowering {
    module: Module,
    opaque: HashMap<String, FuncId>,
}

impl Lowering {
    fn declared(&self, name: &str, function: &str) -> Result<VarId> {
        self.module.var_by_name(name).ok_or_else(|| {
            OptimizerError::invalid_module(format!("undeclared variable {} in function {}", name, function))
        })
    }

    fn function(&mut self, spec: &FunctionSpec) -> Result<Function> {
        let mpc = spec
            .mpc
            .as_deref()
            .map(|name| self.declared(name, &spec.name))
            .transpose()?;
        let params = spec
            .params
            .iter()
            .map(|name| self.declared(name, &spec.name))
            .collect::<Result<Vec<_>>>()?;

        let mut body = Vec::with_capacity(spec.body.len());
        for statement in &spec.body {
            let instruction = match statement {
                StatementSpec::Return(expr) => Instruction::Return(self.expr(expr, &spec.name)?),
                StatementSpec::Eval(expr) => Instruction::Eval(self.expr(expr, &spec.name)?),
                StatementSpec::Assign { var, value } => {
                    let rhs = self.expr(value, &spec.name)?;
                    let lhs = match self.module.var_by_name(var) {
                        Some(id) => id,
                        None => {
                            let ty = self.module.value(rhs).ty.clone();
                            self.module.add_var(var.clone(), ty)
                        }
                    };
                    Instruction::Assign { lhs, rhs }
                }
            };
            body.push(instruction);
        }

        Ok(Function {
            name: spec.name.clone(),
            mpc,
            params,
            body,
            attributes: spec.attributes,
        })
    }

    fn expr(&mut self, expr: &ExprSpec, function: &str) -> Result<ValueId> {
        match expr {
            ExprSpec::Int(v) => Ok(self.module.int(*v)),
            ExprSpec::Float(v) => Ok(self.module.float(*v)),
            ExprSpec::Var(name) => {
                let var = self.declared(name, function)?;
                Ok(self.module.var_value(var))
            }
            ExprSpec::Call { op, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg, function))
                    .collect::<Result<Vec<_>>>()?;
                let func = self.callee(op, &args);
                Ok(self.module.call(func, &args))
            }
        }
    }

    fn callee(&mut self, op: &str, args: &[ValueId]) -> FuncId {
        let types: Option<Vec<IrType>> = args.iter().map(|&arg| self.module.value(arg).ty.clone()).collect();
        if let Some(types) = types.filter(|types| !types.is_empty()) {
            let operands: Vec<&IrType> = types.iter().collect();
            if let Some(func) = self.module.resolve_operator(operands[0], op, &operands) {
                return func;
            }
        }
        if let Some(func) = self.module.helper(op) {
            return func;
        }
        if let Some(&func) = self.opaque.get(op) {
            return func;
        }
        let func = self.module.add_func(op, None);
        self.opaque.insert(op.to_string(), func);
        func
    }
}
