//! Optimizer Configuration
//!
//! # Optimization Levels
//!
//! - **None**: No rewrites; functions are left untouched
//! - **Basic**: Factorization and exponent expansion
//! - **Aggressive**: Everything, including priority reordering, matrix multiplication
//!   reordering and tree encoding
//!
//! Configurations are persisted as JSON:
//!
//! ```rust,no_run
//! use cipheropt_core::compiler::config::{OptimizationLevel, OptimizerConfig};
//!
//! let config = OptimizerConfig::new(OptimizationLevel::Aggressive);
//! config.save("cipheropt.json").unwrap();
//! ```

use crate::compiler::ir::types::SecureTypes;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optimization level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// No optimizations
    None,
    /// Factorization and exponent expansion
    #[default]
    Basic,
    /// All rewrites
    Aggressive,
}

/// Which rewrites the pipeline runs.
///
/// Per-function attributes still decide whether a function is considered at all; these
/// flags only switch individual rewrites off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Extract common factors out of sums of products
    pub factorize: bool,
    /// Re-associate commutative chains so cheap operands combine first
    pub reorder_priorities: bool,
    /// Expand integer powers into multiplications
    pub expand_powers: bool,
    /// Replace chains of matrix multiplications with the reordering helper
    pub reorder_matmuls: bool,
    /// Produce tree encodings for functions that opt in
    pub encode_trees: bool,
    /// Extra type-name prefixes treated as secure containers
    pub extra_secure_prefixes: Vec<String>,
}

impl OptimizerConfig {
    /// Create a configuration for the given level.
    pub fn new(level: OptimizationLevel) -> Self {
        let (basic, aggressive) = match level {
            OptimizationLevel::None => (false, false),
            OptimizationLevel::Basic => (true, false),
            OptimizationLevel::Aggressive => (true, true),
        };
        Self {
            factorize: basic,
            reorder_priorities: aggressive,
            expand_powers: basic,
            reorder_matmuls: aggressive,
            encode_trees: aggressive,
            extra_secure_prefixes: Vec::new(),
        }
    }

    /// Does any rewrite run on the cipher/plain path?
    pub fn rewrites_trees(&self) -> bool {
        self.factorize || self.reorder_priorities || self.expand_powers
    }

    /// Type oracle honoring the configured extra prefixes.
    pub fn oracle(&self) -> SecureTypes {
        SecureTypes::new().with_extra_prefixes(self.extra_secure_prefixes.iter().cloned())
    }

    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: OptimizerConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new(OptimizationLevel::default())
    }
}
