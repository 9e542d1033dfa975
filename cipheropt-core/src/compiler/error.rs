//! Optimizer Error Handling
//!
//! This module provides the error types for the expression tree optimizer using `thiserror`.
//!
//! # Error Categories
//! - **Type errors**: a leaf has no resolvable type, or no child yields one
//! - **Constraint errors**: a rewriter was invoked on a node that violates its precondition
//! - **Link errors**: no operator implementation or optimization helper exists for the resolved types
//! - **Module errors**: a JSON module description could not be lowered into IR
//!
//! Rewrites that find nothing to do are not errors; they report `Ok(false)`.

use std::fmt::Display;
use thiserror::Error;

/// Optimizer error types.
///
/// Every variant is fatal for the function being optimized. The pipeline logs the
/// failure and moves on to the next function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptimizerError {
    /// Type realization error.
    ///
    /// Occurs when a leaf is not directly typeable, so neither it nor any ancestor
    /// can have its type realized.
    #[error("Type error: {message}\nSuggestion: {suggestion}")]
    Type { message: String, suggestion: String },

    /// Rewriter precondition violation.
    ///
    /// Indicates a caller bug in how a rewriter was invoked (or a malformed exponent
    /// in the input program), not a recoverable runtime condition.
    #[error("Constraint error: {message}")]
    Constraint { message: String },

    /// Operator resolution error.
    ///
    /// Occurs when the code generator cannot find an implementation of an operator
    /// for the realized operand types.
    #[error("Link error: {operator} not found in type {receiver} with arguments ({operands})")]
    Link {
        operator: String,
        receiver: String,
        operands: String,
    },

    /// Optimization helper resolution error.
    #[error("Link error: optimization helper {name} is not registered\nSuggestion: {suggestion}")]
    MissingHelper { name: String, suggestion: String },

    /// Module description error.
    #[error("Invalid module: {message}")]
    InvalidModule { message: String },
}

impl OptimizerError {
    /// Create a type error for a leaf that carries no type.
    #[cold]
    pub fn untypeable_leaf(leaf: impl Display) -> Self {
        Self::Type {
            message: format!("cannot realize type of leaf {} (leaf is not typeable)", leaf),
            suggestion: "Make sure every operand of an optimized expression has a resolved type."
                .to_string(),
        }
    }

    /// Create a constraint error.
    #[cold]
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Create a link error from the operator name and the operand type names.
    #[cold]
    pub fn link(operator: impl Into<String>, receiver: impl Into<String>, operands: &[&str]) -> Self {
        Self::Link {
            operator: operator.into(),
            receiver: receiver.into(),
            operands: operands.join(", "),
        }
    }

    /// Create a missing helper error.
    #[cold]
    pub fn missing_helper(name: impl Into<String>) -> Self {
        Self::MissingHelper {
            name: name.into(),
            suggestion: "Register the helper in the module's helper table.".to_string(),
        }
    }

    /// Create a module description error.
    #[cold]
    pub fn invalid_module(message: impl Into<String>) -> Self {
        Self::InvalidModule {
            message: message.into(),
        }
    }

    /// Returns true for precondition violations.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}

/// Result alias used throughout the optimizer.
pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_message_names_operator_and_types() {
        let err = OptimizerError::link("__mul__", "Sharetensor", &["Sharetensor", "int"]);
        assert_eq!(
            err.to_string(),
            "Link error: __mul__ not found in type Sharetensor with arguments (Sharetensor, int)"
        );
    }

    #[test]
    fn test_untypeable_leaf_is_type_error() {
        let err = OptimizerError::untypeable_leaf("?7");
        assert!(matches!(err, OptimizerError::Type { .. }));
        assert!(err.to_string().contains("?7"));
        assert!(!err.is_constraint());
    }
}
