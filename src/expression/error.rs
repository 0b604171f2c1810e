//! Error types for expression resolution and evaluation.

use crate::expression::determinism::ConstraintKind;
use thiserror::Error;

/// Errors raised while binding, typing, validating or evaluating expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Column reference not bound by any enclosing scope
    #[error("Column not found: {name}")]
    UnresolvedColumn { name: String },

    /// Coercion failure or degree mismatch
    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        context: String,
    },

    #[error("Non-deterministic expression in {constraint} definition")]
    NonDeterministic { constraint: ConstraintKind },

    #[error("{construct} is not allowed in {constraint} definition")]
    DisallowedConstruct {
        construct: String,
        constraint: ConstraintKind,
    },

    /// Evaluation attempted with no row positioned under the range
    #[error("No current row for range position {position}")]
    UnboundRange { position: usize },

    /// A node kind reached a pass that does not handle it
    #[error("Internal inconsistency in {pass}: {detail}")]
    InternalInconsistency { pass: &'static str, detail: String },

    #[error(
        "Invalid operand types for operator {operator}: left={left_type:?}, right={right_type:?}"
    )]
    InvalidOperandTypes {
        operator: String,
        left_type: Option<String>,
        right_type: Option<String>,
    },

    #[error("Column index {index} out of bounds for tuple with {tuple_size} columns")]
    ColumnIndexOutOfBounds { index: usize, tuple_size: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Numeric overflow in {context}")]
    NumericOverflow { context: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Function {function} expects {expected} arguments, got {actual}")]
    FunctionArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    /// A row subquery produced more than one row
    #[error("Cardinality violation: subquery returned {rows} rows")]
    CardinalityViolation { rows: usize },

    #[error("Expression evaluation error: {message}")]
    EvaluationError { message: String },
}

impl ExpressionError {
    pub fn type_mismatch(
        expected: impl ToString,
        actual: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        ExpressionError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
            context: context.into(),
        }
    }

    pub fn degree_mismatch(expected: usize, actual: usize, context: impl Into<String>) -> Self {
        ExpressionError::TypeMismatch {
            expected: format!("degree {}", expected),
            actual: format!("degree {}", actual),
            context: context.into(),
        }
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        ExpressionError::NumericOverflow {
            context: context.into(),
        }
    }

    pub fn internal(pass: &'static str, detail: impl Into<String>) -> Self {
        ExpressionError::InternalInconsistency {
            pass,
            detail: detail.into(),
        }
    }

    /// False for errors that indicate an engine or executor defect
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            ExpressionError::UnboundRange { .. } | ExpressionError::InternalInconsistency { .. }
        )
    }
}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExpressionError::UnresolvedColumn {
            name: "e.salary".to_string(),
        };
        assert_eq!(err.to_string(), "Column not found: e.salary");

        let err = ExpressionError::degree_mismatch(2, 3, "VALUES list");
        assert_eq!(
            err.to_string(),
            "Type mismatch in VALUES list: expected degree 2, got degree 3"
        );

        let err = ExpressionError::NonDeterministic {
            constraint: ConstraintKind::Generated,
        };
        assert_eq!(
            err.to_string(),
            "Non-deterministic expression in GENERATED column definition"
        );

        let err = ExpressionError::DisallowedConstruct {
            construct: "subquery".to_string(),
            constraint: ConstraintKind::Check,
        };
        assert_eq!(
            err.to_string(),
            "subquery is not allowed in CHECK constraint definition"
        );

        let err = ExpressionError::UnboundRange { position: 1 };
        assert_eq!(err.to_string(), "No current row for range position 1");

        let err = ExpressionError::FunctionArgumentCount {
            function: "ABS".to_string(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Function ABS expects 1 arguments, got 2");
    }

    #[test]
    fn test_user_error_classification() {
        assert!(ExpressionError::UnresolvedColumn {
            name: "x".to_string()
        }
        .is_user_error());
        assert!(ExpressionError::degree_mismatch(1, 2, "row").is_user_error());
        assert!(!ExpressionError::UnboundRange { position: 0 }.is_user_error());
        assert!(!ExpressionError::internal("evaluate", "TABLE").is_user_error());
    }
}
