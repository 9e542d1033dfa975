//! Analysis Module
//!
//! IR-level passes that run alongside the expression tree rewrites.

pub mod consecutive_matmul;

pub use consecutive_matmul::ConsecutiveMatmul;
