// CLI command handlers
use anyhow::{Context, Result};
use cipheropt_core::compiler::bet::{Bet, TreeEncoding};
use cipheropt_core::compiler::config::{OptimizationLevel, OptimizerConfig};
use cipheropt_core::compiler::ir::{parse_module, Function, Instruction, Module};
use cipheropt_core::compiler::pipeline::OptimizationPipeline;
use std::fs;
use std::path::Path;

fn read_module(input: &Path) -> Result<Module> {
    let json = fs::read_to_string(input)
        .with_context(|| format!("Failed to read module file: {}", input.display()))?;
    parse_module(&json).with_context(|| format!("Invalid module file: {}", input.display()))
}

fn render_instruction(module: &Module, instruction: &Instruction) -> String {
    match instruction {
        Instruction::Return(value) => format!("return {}", module.render(*value)),
        Instruction::Assign { lhs, rhs } => format!("{} = {}", module.var(*lhs).name, module.render(*rhs)),
        Instruction::Eval(value) => module.render(*value),
    }
}

fn print_function(module: &Module, function: &Function) {
    println!("fn {}:", function.name);
    for instruction in &function.body {
        println!("    {}", render_instruction(module, instruction));
    }
}

pub fn optimize_module(
    input: &Path,
    level: OptimizationLevel,
    config_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    println!("Reading module: {}", input.display());
    let mut module = read_module(input)?;

    let config = match config_path {
        Some(path) => OptimizerConfig::load(path)?,
        None => OptimizerConfig::new(level),
    };
    log::debug!("Optimizer configuration: {:?}", config);

    let pipeline = OptimizationPipeline::new(config);
    let result = pipeline.run(&mut module);

    for function in &module.functions {
        print_function(&module, function);
    }
    for report in &result.reports {
        println!(
            "  {}: {} rewritten, {} matmul chains, {} nodes / {} edges",
            report.name, report.rewritten_instructions, report.matmul_chains, report.nodes, report.edges
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&result.stats).context("Failed to serialize statistics")?
    );

    if let Some(output) = output {
        let content = serde_json::to_string_pretty(&result).context("Failed to serialize pipeline output")?;
        fs::write(output, content)
            .with_context(|| format!("Failed to write output file: {}", output.display()))?;
        println!("Output written to: {}", output.display());
    }

    Ok(())
}

pub fn encode_module(input: &Path, function_name: &str, output: Option<&Path>) -> Result<()> {
    let module = read_module(input)?;
    let function = module
        .function_by_name(function_name)
        .with_context(|| format!("Function {} not found in {}", function_name, input.display()))?;

    let pipeline = OptimizationPipeline::default();
    let encoding = pipeline
        .encode_function(&module, function)
        .with_context(|| format!("Failed to encode function {}", function_name))?;
    let content = serde_json::to_string(&encoding).context("Failed to serialize encoding")?;

    match output {
        Some(output) => {
            fs::write(output, content)
                .with_context(|| format!("Failed to write encoding file: {}", output.display()))?;
            println!("Encoded {} nodes to: {}", encoding.len(), output.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

pub fn inspect_module(input: &Path, function_name: Option<&str>) -> Result<()> {
    let module = read_module(input)?;

    for function in module
        .functions
        .iter()
        .filter(|function| function_name.map_or(true, |name| function.name == name))
    {
        print_function(&module, function);

        let mut bet = Bet::new();
        bet.parse_series(&module, &function.body);
        for (key, root) in bet.trees() {
            println!("  tree {:>3}: {}", key.as_i64(), bet.arena.display(root));
        }
        let (nodes, edges) = bet.elements_count();
        println!("  {} nodes, {} edges", nodes, edges);
    }
    Ok(())
}

pub fn inspect_encoding(path: &Path, module: Option<&Path>) -> Result<()> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read encoding file: {}", path.display()))?;
    let encoding: TreeEncoding = serde_json::from_str(&json).context("Failed to parse encoding")?;
    let decoded = match module {
        Some(module) => encoding.decode_with(&read_module(module)?),
        None => encoding.decode(),
    };
    let (arena, roots) = decoded.context("Failed to decode encoding")?;

    println!("Decoded {} records into {} trees", encoding.len(), roots.len());
    for root in roots {
        println!("  {}", arena.display(root));
    }
    Ok(())
}
