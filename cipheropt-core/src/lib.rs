//! Algebraic rewriting of arithmetic expression trees over secure values.
//!
//! See [`compiler::pipeline::OptimizationPipeline`] for the per-function driver.

pub mod compiler;
