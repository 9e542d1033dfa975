//! Optimization Pipeline
//!
//! Drives the expression tree engine over every function of a module.
//!
//! # Pipeline Stages
//! For each function (in module order):
//! 1. **Cipher/plain rewrites** (functions with `cipher_opt`, when a tree rewrite is
//!    enabled): every top-level statement is minimized in order. Binary arithmetic is
//!    built into a tree, expanded through the trees of earlier assignments, rewritten
//!    (powers, factorization, priority reordering) and regenerated if any rewrite
//!    changed it. Other calls with a rewritten argument are re-emitted as new calls; values
//!    already in the module are never modified by this stage. Assignments register
//!    their tree for later expansion.
//! 2. **Matrix multiplication reordering** (functions with `reorder_matmul` and an mpc
//!    parameter): chains of nested matmuls are replaced by the reordering helper.
//! 3. **Tree encoding** (functions with `enc_opt`): the body as left by the previous
//!    stages is parsed into a fresh registry and encoded against the user parameters.
//!
//! A failing function is logged and counted; its body is left as it was and the
//! remaining functions are still processed.

use crate::compiler::analysis::ConsecutiveMatmul;
use crate::compiler::bet::{Bet, NodeId, TreeBuilder, TreeEncoding, TreeKey, ValueRef};
use crate::compiler::config::OptimizerConfig;
use crate::compiler::error::Result;
use crate::compiler::ir::instruction::{Function, Instruction, ValueId, ValueKind};
use crate::compiler::ir::module::Module;
use crate::compiler::ir::types::SecureTypes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_functions: usize,
    pub optimized_functions: usize,
    pub encoded_functions: usize,
    pub failed_functions: usize,
    pub rewritten_instructions: usize,
    pub matmul_chains: usize,
}

/// What the cipher/plain path did to one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub name: String,
    /// Top-level values regenerated from a rewritten tree.
    pub rewritten_instructions: usize,
    /// Matmul chains replaced by the reordering helper.
    pub matmul_chains: usize,
    /// Nodes of the final tree registry.
    pub nodes: usize,
    /// Edges of the final tree registry.
    pub edges: usize,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub stats: PipelineStats,
    pub reports: Vec<FunctionReport>,
    /// Tree encodings by function name.
    pub encodings: BTreeMap<String, TreeEncoding>,
}

/// Optimization pipeline orchestrator.
pub struct OptimizationPipeline {
    config: OptimizerConfig,
    oracle: SecureTypes,
}

impl OptimizationPipeline {
    pub fn new(config: OptimizerConfig) -> Self {
        let oracle = config.oracle();
        Self { config, oracle }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize (and encode) every eligible function of `module` in place.
    pub fn run(&self, module: &mut Module) -> PipelineOutput {
        log::info!("Starting optimization pipeline...");
        let mut output = PipelineOutput::default();

        for index in 0..module.functions.len() {
            let function = module.functions[index].clone();
            output.stats.total_functions += 1;

            if self.runs_cipher_path(&function) {
                log::info!("Optimizing function {}...", function.name);
                match self.optimize_function(module, &function) {
                    Ok((report, body)) => {
                        module.functions[index].body = body;
                        output.stats.optimized_functions += 1;
                        output.stats.rewritten_instructions += report.rewritten_instructions;
                        output.stats.matmul_chains += report.matmul_chains;
                        output.reports.push(report);
                    }
                    Err(e) => {
                        log::warn!("Failed to optimize function {}: {}", function.name, e);
                        output.stats.failed_functions += 1;
                        continue;
                    }
                }
            }

            if function.attributes.enc_opt && self.config.encode_trees {
                log::info!("Encoding function {}...", function.name);
                match self.encode_function(module, &module.functions[index]) {
                    Ok(encoding) => {
                        log::debug!("Encoded {} nodes of {}", encoding.len(), function.name);
                        output.stats.encoded_functions += 1;
                        output.encodings.insert(function.name.clone(), encoding);
                    }
                    Err(e) => {
                        log::warn!("Failed to encode function {}: {}", function.name, e);
                        output.stats.failed_functions += 1;
                    }
                }
            }
        }

        log::info!(
            "Pipeline complete: {} optimized, {} encoded, {} failed out of {} functions",
            output.stats.optimized_functions,
            output.stats.encoded_functions,
            output.stats.failed_functions,
            output.stats.total_functions
        );
        output
    }

    fn rewrites_function(&self, function: &Function) -> bool {
        function.attributes.cipher_opt && self.config.rewrites_trees()
    }

    fn runs_cipher_path(&self, function: &Function) -> bool {
        self.rewrites_function(function) || (self.config.reorder_matmuls && function.attributes.reorder_matmul)
    }

    /// Run the cipher/plain rewrites and the matmul pass over one function.
    ///
    /// # Returns
    /// The report and the rewritten body; `function` itself is not modified, but new
    /// values are appended to `module`. Matmul chains are overwritten in place, and only
    /// once the helper has been found.
    pub fn optimize_function(&self, module: &mut Module, function: &Function) -> Result<(FunctionReport, Vec<Instruction>)> {
        let mut bet = Bet::with_oracle(self.oracle.clone());
        let mut body = function.body.clone();
        let mut rewritten = 0;

        if self.rewrites_function(function) {
            for instruction in body.iter_mut() {
                let (value, tree) = self.minimize(&mut bet, module, instruction.value(), &mut rewritten)?;
                instruction.set_value(value);

                if let Some(tree) = tree {
                    let key = match instruction {
                        Instruction::Return(_) => TreeKey::Return,
                        Instruction::Assign { lhs, .. } => TreeKey::Var(*lhs),
                        Instruction::Eval(_) => TreeKey::NoVar,
                    };
                    bet.add_tree(key, tree);
                }
            }
        }

        let mut matmul_chains = 0;
        if self.config.reorder_matmuls && function.attributes.reorder_matmul {
            match function.mpc {
                Some(mpc) => matmul_chains = ConsecutiveMatmul::reorder_series(module, &body, mpc)?,
                None => log::debug!("Function {} has no mpc parameter; skipping matmul reordering", function.name),
            }
        }

        let (nodes, edges) = bet.elements_count();
        let report = FunctionReport {
            name: function.name.clone(),
            rewritten_instructions: rewritten,
            matmul_chains,
            nodes,
            edges,
        };
        Ok((report, body))
    }

    /// Minimize one value, returning its replacement and its tree (if it has one).
    fn minimize(
        &self,
        bet: &mut Bet,
        module: &mut Module,
        value: ValueId,
        rewritten: &mut usize,
    ) -> Result<(ValueId, Option<NodeId>)> {
        if TreeBuilder::is_binary(module, value) {
            let root = TreeBuilder::build_arithmetic(&mut bet.arena, module, value);
            bet.expand_node(root);
            let before = bet.arena.display(root).to_string();

            let mut changed = false;
            if self.config.expand_powers {
                changed |= bet.escape_pows(root)?;
            }
            if self.config.factorize {
                changed |= bet.reduce_all(root)?;
            }
            if self.config.reorder_priorities {
                changed |= bet.reorder_priorities(root)?;
            }
            if !changed {
                return Ok((value, Some(root)));
            }

            bet.realize_type(root, true)?;
            let generated = bet.generate(module, root)?;
            *rewritten += 1;
            log::debug!("Rewrote {} into {}", before, bet.arena.display(root));
            return Ok((generated, Some(root)));
        }

        if let ValueKind::Call { args, .. } = &module.value(value).kind {
            let args = args.clone();
            let mut new_args = args.clone();
            for arg in new_args.iter_mut() {
                *arg = self.minimize(bet, module, *arg, rewritten)?.0;
            }
            if new_args == args {
                return Ok((value, None));
            }
            return Ok((module.with_call_args(value, &new_args), None));
        }

        let leaf = bet.arena.leaf(Some(ValueRef::from_value(module.value(value))));
        bet.expand_node(leaf);
        Ok((value, Some(leaf)))
    }

    /// Encode the trees of one function body.
    pub fn encode_function(&self, module: &Module, function: &Function) -> Result<TreeEncoding> {
        let mut bet = Bet::with_oracle(self.oracle.clone());
        bet.parse_series(module, &function.body);
        bet.encode(module, &function.params)
    }
}

impl Default for OptimizationPipeline {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
