//! SQL expression trees for query execution.
//!
//! This module provides:
//! - Expression node representation with subquery handles
//! - Column resolution against range variables
//! - Type resolution and value list shaping
//! - Determinism checks for CHECK constraints and GENERATED columns
//! - Expression evaluation against the current rows of a session

pub mod coercion;
pub mod determinism;
pub mod error;
pub mod eval;
pub mod expr;
pub mod function;
pub mod operator;
pub mod render;
pub mod resolver;
pub mod subquery;
pub mod tree;
pub mod type_resolver;

pub use coercion::{StandardTypeRegistry, TypeRegistry};
pub use determinism::{check_deterministic, ConstraintKind};
pub use error::{ExpressionError, ExpressionResult};
pub use eval::{
    count_nulls, evaluate_expression, expression_to_predicate, ExpressionEvaluator, Predicate,
    QueryResult,
};
pub use expr::{
    ColumnBinding, ColumnRef, ExprKind, Expression, OpType, AGGREGATE_SET, COLUMN_SET, EMPTY_SET,
    FUNCTION_SET, SUBQUERY_AGGREGATE_SET, SUBQUERY_SET,
};
pub use function::{AggregateFunction, SqlFunction};
pub use operator::{BinaryOperator, UnaryOperator};
pub use resolver::check_columns_resolved;
pub use subquery::{NestedPlan, RowSetNavigator, StaticPlan, SubQuery};
pub use type_resolver::{resolve_types, validate_filter_predicate, TypeResolver};
