//! Expression evaluation implementation.

use crate::access::{DataType, RangeContext, Value, MICROS_PER_DAY};
use crate::expression::expr::{ColumnRef, ExprKind, Expression};
use crate::expression::function::SqlFunction;
use crate::expression::subquery::SubQuery;
use crate::expression::{BinaryOperator, ExpressionError, ExpressionResult, UnaryOperator};
use crate::session::Session;
use std::cmp::Ordering;

/// Result of evaluating an expression that may produce a row set
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Value(Value),
    RowSet(Vec<Vec<Value>>),
}

/// Evaluator for expressions
pub struct ExpressionEvaluator<'a> {
    /// Current rows, statement clock, registry and services
    session: &'a Session,
}

impl<'a> ExpressionEvaluator<'a> {
    /// Create a new evaluator over a session
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Evaluate an expression and return the result
    pub fn evaluate(&self, expr: &Expression) -> ExpressionResult<Value> {
        match &expr.kind {
            ExprKind::Value(value) => Ok(value.clone()),

            ExprKind::Column(col) => self.evaluate_column_ref(col),

            ExprKind::SimpleColumn {
                range_position,
                column_index,
            } => self.read_column(*range_position, *column_index),

            ExprKind::Row => {
                let mut values = self.evaluate_nodes(expr)?;
                if values.len() == 1 {
                    Ok(values.remove(0))
                } else {
                    Ok(Value::Row(values))
                }
            }

            ExprKind::Table => Err(ExpressionError::internal(
                "evaluate",
                "value list has no single value",
            )),

            ExprKind::Array { .. } => {
                let values = self.evaluate_nodes(expr)?;
                match expr.data_type() {
                    Some(array_type) => {
                        self.session
                            .registry()
                            .convert(Value::Array(values), None, array_type)
                    }
                    None => Ok(Value::Array(values)),
                }
            }

            ExprKind::ArraySubquery(sq) => self.evaluate_array_subquery(expr, sq),

            ExprKind::RowSubquery(sq) | ExprKind::TableSubquery(sq) => {
                sq.materialize(self.session)?;
                let single_row = matches!(expr.kind, ExprKind::RowSubquery(_));
                let mut values = sq.values(single_row)?;
                if values.len() == 1 {
                    Ok(values.remove(0))
                } else {
                    Ok(Value::Row(values))
                }
            }

            ExprKind::Binary(op) => {
                let left_val = self.evaluate_operand(expr.left(), op.as_str())?;
                let right_val = self.evaluate_operand(expr.right(), op.as_str())?;
                self.evaluate_binary_op(*op, left_val, right_val)
            }

            ExprKind::Unary(op) => {
                let operand_val = self.evaluate_operand(expr.node(0), op.as_str())?;
                self.evaluate_unary_op(*op, operand_val)
            }

            ExprKind::Function(function) => {
                let args = self.evaluate_nodes(expr)?;
                self.evaluate_function(*function, args, expr.data_type())
            }

            ExprKind::Routine(info) => {
                let args = self.evaluate_nodes(expr)?;
                let services = self.session.services().ok_or_else(|| {
                    ExpressionError::EvaluationError {
                        message: format!("No routine services to invoke {}", info.name),
                    }
                })?;
                services.invoke_routine(&info.name, &args)
            }

            ExprKind::Aggregate(function) => Err(ExpressionError::internal(
                "evaluate",
                format!("aggregate {} is computed by the executor", function.name()),
            )),

            ExprKind::NextValue { sequence } => {
                let services = self.session.services().ok_or_else(|| {
                    ExpressionError::EvaluationError {
                        message: format!("No sequence services for {}", sequence),
                    }
                })?;
                services.next_sequence_value(sequence)
            }
        }
    }

    /// Evaluate every present child; vacant slots yield NULL
    fn evaluate_nodes(&self, expr: &Expression) -> ExpressionResult<Vec<Value>> {
        expr.nodes
            .iter()
            .map(|node| match node {
                Some(node) => self.evaluate(node),
                None => Ok(Value::Null),
            })
            .collect()
    }

    fn evaluate_operand(
        &self,
        node: Option<&Expression>,
        operator: &str,
    ) -> ExpressionResult<Value> {
        let node = node.ok_or_else(|| {
            ExpressionError::internal(
                "evaluate",
                format!("operator {} is missing an operand", operator),
            )
        })?;
        self.evaluate(node)
    }

    /// Evaluate a column reference
    fn evaluate_column_ref(&self, col: &ColumnRef) -> ExpressionResult<Value> {
        match &col.binding {
            Some(binding) => self.read_column(binding.range_position, binding.column_index),
            None => Err(ExpressionError::internal(
                "evaluate",
                format!("column {} was never resolved", col.display_name()),
            )),
        }
    }

    fn read_column(&self, range_position: usize, column_index: usize) -> ExpressionResult<Value> {
        let row = self
            .session
            .current_row(range_position)
            .ok_or(ExpressionError::UnboundRange {
                position: range_position,
            })?;
        row.get(column_index)
            .cloned()
            .ok_or(ExpressionError::ColumnIndexOutOfBounds {
                index: column_index,
                tuple_size: row.len(),
            })
    }

    fn evaluate_array_subquery(&self, expr: &Expression, sq: &SubQuery) -> ExpressionResult<Value> {
        sq.materialize(self.session)?;
        let values = sq.with_navigator(|nav| {
            let mut values = Vec::with_capacity(nav.size());
            while let Some(row) = nav.next_row() {
                values.push(row.first().cloned().unwrap_or(Value::Null));
            }
            values
        })?;
        let limit = match expr.data_type() {
            Some(DataType::Array {
                max_cardinality, ..
            }) => *max_cardinality,
            _ => self.session.config().max_array_cardinality,
        };
        if values.len() > limit {
            return Err(ExpressionError::EvaluationError {
                message: format!(
                    "ARRAY subquery produced {} elements, limit is {}",
                    values.len(),
                    limit
                ),
            });
        }
        Ok(Value::Array(values))
    }

    /// Evaluate a binary operation
    fn evaluate_binary_op(
        &self,
        op: BinaryOperator,
        left: Value,
        right: Value,
    ) -> ExpressionResult<Value> {
        // Handle NULL propagation for most operators
        if left.is_null() || right.is_null() {
            return Ok(match op {
                // NULL AND false = false, NULL AND true = NULL
                BinaryOperator::And => match (&left, &right) {
                    (Value::Boolean(false), _) | (_, Value::Boolean(false)) => {
                        Value::Boolean(false)
                    }
                    _ => Value::Null,
                },
                // NULL OR true = true, NULL OR false = NULL
                BinaryOperator::Or => match (&left, &right) {
                    (Value::Boolean(true), _) | (_, Value::Boolean(true)) => {
                        Value::Boolean(true)
                    }
                    _ => Value::Null,
                },
                // comparisons, arithmetic and concatenation propagate NULL
                _ => Value::Null,
            });
        }

        match op {
            BinaryOperator::Add
            | BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Div => self.evaluate_arithmetic(op, left, right),

            // Comparison operators
            BinaryOperator::Eq => {
                self.compare_values(op, left, right, |cmp| cmp == Ordering::Equal)
            }
            BinaryOperator::Ne => {
                self.compare_values(op, left, right, |cmp| cmp != Ordering::Equal)
            }
            BinaryOperator::Lt => self.compare_values(op, left, right, |cmp| cmp == Ordering::Less),
            BinaryOperator::Le => {
                self.compare_values(op, left, right, |cmp| cmp != Ordering::Greater)
            }
            BinaryOperator::Gt => {
                self.compare_values(op, left, right, |cmp| cmp == Ordering::Greater)
            }
            BinaryOperator::Ge => self.compare_values(op, left, right, |cmp| cmp != Ordering::Less),

            // Logical operators
            BinaryOperator::And => match (&left, &right) {
                (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(*a && *b)),
                _ => Err(invalid_operands(op.as_str(), &left, Some(&right))),
            },

            BinaryOperator::Or => match (&left, &right) {
                (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(*a || *b)),
                _ => Err(invalid_operands(op.as_str(), &left, Some(&right))),
            },

            // String operators
            BinaryOperator::Concat => match (&left, &right) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
                _ => Err(invalid_operands(op.as_str(), &left, Some(&right))),
            },
        }
    }

    fn evaluate_arithmetic(
        &self,
        op: BinaryOperator,
        left: Value,
        right: Value,
    ) -> ExpressionResult<Value> {
        let overflow = || ExpressionError::overflow(op.as_str());

        let subtract = op == BinaryOperator::Sub;
        let shifts = matches!(op, BinaryOperator::Add | BinaryOperator::Sub);

        match (&left, &right) {
            (Value::Date(a), Value::Date(b)) if subtract => {
                a.checked_sub(*b).map(Value::Int32).ok_or_else(overflow)
            }

            // date/time arithmetic counts whole days
            (Value::Date(d), n) if shifts && n.as_i64().is_some() => {
                shift_date(*d, n, subtract).ok_or_else(overflow)
            }
            (n, Value::Date(d)) if op == BinaryOperator::Add && n.as_i64().is_some() => {
                shift_date(*d, n, false).ok_or_else(overflow)
            }
            (Value::Timestamp(t), n) if shifts && n.as_i64().is_some() => {
                shift_timestamp(*t, n, subtract).ok_or_else(overflow)
            }
            (n, Value::Timestamp(t)) if op == BinaryOperator::Add && n.as_i64().is_some() => {
                shift_timestamp(*t, n, false).ok_or_else(overflow)
            }
            (Value::Date(_) | Value::Timestamp(_), _)
            | (_, Value::Date(_) | Value::Timestamp(_)) => {
                Err(invalid_operands(op.as_str(), &left, Some(&right)))
            }

            (Value::Double(_), _) | (_, Value::Double(_)) => {
                let (a, b) = match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(invalid_operands(op.as_str(), &left, Some(&right))),
                };
                let result = match op {
                    BinaryOperator::Add => a + b,
                    BinaryOperator::Sub => a - b,
                    BinaryOperator::Mul => a * b,
                    _ if b == 0.0 => return Err(ExpressionError::DivisionByZero),
                    _ => a / b,
                };
                Ok(Value::Double(result))
            }

            (Value::Int32(a), Value::Int32(b)) => {
                let result = match op {
                    BinaryOperator::Add => a.checked_add(*b),
                    BinaryOperator::Sub => a.checked_sub(*b),
                    BinaryOperator::Mul => a.checked_mul(*b),
                    _ if *b == 0 => return Err(ExpressionError::DivisionByZero),
                    _ => a.checked_div(*b),
                };
                result.map(Value::Int32).ok_or_else(overflow)
            }

            _ => {
                let (a, b) = match (left.as_i64(), right.as_i64()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(invalid_operands(op.as_str(), &left, Some(&right))),
                };
                let result = match op {
                    BinaryOperator::Add => a.checked_add(b),
                    BinaryOperator::Sub => a.checked_sub(b),
                    BinaryOperator::Mul => a.checked_mul(b),
                    _ if b == 0 => return Err(ExpressionError::DivisionByZero),
                    _ => a.checked_div(b),
                };
                result.map(Value::Int64).ok_or_else(overflow)
            }
        }
    }

    /// Evaluate a unary operation
    fn evaluate_unary_op(&self, op: UnaryOperator, operand: Value) -> ExpressionResult<Value> {
        match op {
            UnaryOperator::Not => match operand {
                Value::Null => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                _ => Err(invalid_operands(op.as_str(), &operand, None)),
            },

            UnaryOperator::IsNull => Ok(Value::Boolean(operand.is_null())),

            UnaryOperator::IsNotNull => Ok(Value::Boolean(!operand.is_null())),

            UnaryOperator::Plus => match operand {
                Value::Null | Value::Int32(_) | Value::Int64(_) | Value::Double(_) => Ok(operand),
                _ => Err(invalid_operands(op.as_str(), &operand, None)),
            },

            UnaryOperator::Minus => match operand {
                Value::Null => Ok(Value::Null),
                Value::Int32(n) => n
                    .checked_neg()
                    .map(Value::Int32)
                    .ok_or_else(|| ExpressionError::overflow("-")),
                Value::Int64(n) => n
                    .checked_neg()
                    .map(Value::Int64)
                    .ok_or_else(|| ExpressionError::overflow("-")),
                Value::Double(n) => Ok(Value::Double(-n)),
                _ => Err(invalid_operands(op.as_str(), &operand, None)),
            },
        }
    }

    fn evaluate_function(
        &self,
        function: SqlFunction,
        args: Vec<Value>,
        result_type: Option<&DataType>,
    ) -> ExpressionResult<Value> {
        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(ExpressionError::FunctionArgumentCount {
                function: function.name().to_string(),
                expected: min,
                actual: args.len(),
            });
        }

        match function {
            SqlFunction::CurrentDate => self.session.current_date().map(Value::Date),
            SqlFunction::CurrentTimestamp => Ok(Value::Timestamp(self.session.current_timestamp())),
            SqlFunction::LocalTimestamp => self.session.local_timestamp().map(Value::Timestamp),
            SqlFunction::Random => Ok(Value::Double(self.session.next_random())),
            SqlFunction::Coalesce => {
                let first = args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null);
                match result_type {
                    Some(t) => self.session.registry().convert(first, None, t),
                    None => Ok(first),
                }
            }
            _ => {
                let arg = args.into_iter().next().unwrap_or(Value::Null);
                match (function, &arg) {
                    (_, Value::Null) => Ok(Value::Null),
                    (SqlFunction::Abs, Value::Int32(n)) => n
                        .checked_abs()
                        .map(Value::Int32)
                        .ok_or_else(|| ExpressionError::overflow("ABS")),
                    (SqlFunction::Abs, Value::Int64(n)) => n
                        .checked_abs()
                        .map(Value::Int64)
                        .ok_or_else(|| ExpressionError::overflow("ABS")),
                    (SqlFunction::Abs, Value::Double(n)) => Ok(Value::Double(n.abs())),
                    (SqlFunction::Upper, Value::String(s)) => Ok(Value::String(s.to_uppercase())),
                    (SqlFunction::Lower, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
                    (SqlFunction::CharLength, Value::String(s)) => {
                        Ok(Value::Int32(s.chars().count() as i32))
                    }
                    _ => Err(invalid_operands(function.name(), &arg, None)),
                }
            }
        }
    }

    /// Compare two values and apply a comparison function
    fn compare_values<F>(
        &self,
        op: BinaryOperator,
        left: Value,
        right: Value,
        cmp_fn: F,
    ) -> ExpressionResult<Value>
    where
        F: FnOnce(Ordering) -> bool,
    {
        match left.compare(&right) {
            Some(ordering) => Ok(Value::Boolean(cmp_fn(ordering))),
            // rows with NULL fields compare as unknown
            None if matches!((&left, &right), (Value::Row(_), Value::Row(_))) => Ok(Value::Null),
            None => Err(invalid_operands(op.as_str(), &left, Some(&right))),
        }
    }

    /// Evaluate and convert the result to `data_type`
    pub fn evaluate_as(&self, expr: &Expression, data_type: &DataType) -> ExpressionResult<Value> {
        let value = self.evaluate(expr)?;
        self.session
            .registry()
            .convert(value, expr.data_type(), data_type)
    }

    /// True only when the condition evaluates to TRUE
    pub fn test_condition(&self, expr: &Expression) -> ExpressionResult<bool> {
        match self.evaluate(expr)? {
            Value::Boolean(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(ExpressionError::type_mismatch(
                DataType::Boolean,
                other.data_type().map(|t| t.name()).unwrap_or_else(|| "ROW".to_string()),
                "condition",
            )),
        }
    }

    /// Single value for scalar kinds, all rows for table subqueries and value lists
    pub fn get_result(&self, expr: &Expression) -> ExpressionResult<QueryResult> {
        match &expr.kind {
            ExprKind::TableSubquery(sq) => {
                sq.materialize(self.session)?;
                let rows = sq.with_navigator(|nav| {
                    let mut rows = Vec::with_capacity(nav.size());
                    while let Some(row) = nav.next_row() {
                        rows.push(row.to_vec());
                    }
                    rows
                })?;
                Ok(QueryResult::RowSet(rows))
            }
            ExprKind::Table => self.table_rows(expr).map(QueryResult::RowSet),
            _ => self.evaluate(expr).map(QueryResult::Value),
        }
    }

    /// Rows of a value list, each field converted to its position type
    pub fn table_rows(&self, expr: &Expression) -> ExpressionResult<Vec<Vec<Value>>> {
        if !matches!(expr.kind, ExprKind::Table) {
            return Err(ExpressionError::internal(
                "table_rows",
                format!("{:?} is not a value list", expr.op_type()),
            ));
        }
        let types = expr.node_data_types.as_ref().ok_or_else(|| {
            ExpressionError::internal("table_rows", "value list evaluated before type resolution")
        })?;
        let registry = self.session.registry();

        expr.children()
            .map(|row| {
                row.nodes
                    .iter()
                    .zip(types)
                    .map(|(field, target)| {
                        let (value, from) = match field {
                            Some(field) => (self.evaluate(field)?, field.data_type()),
                            None => (Value::Null, None),
                        };
                        match target {
                            Some(target) => registry.convert(value, from, target),
                            None => Ok(value),
                        }
                    })
                    .collect::<ExpressionResult<Vec<_>>>()
            })
            .collect()
    }
}

fn shift_date(date: i32, days: &Value, subtract: bool) -> Option<Value> {
    let days = days.as_i64()?;
    let days = if subtract { days.checked_neg()? } else { days };
    i32::try_from((date as i64).checked_add(days)?)
        .ok()
        .map(Value::Date)
}

fn shift_timestamp(micros: i64, days: &Value, subtract: bool) -> Option<Value> {
    let delta = days.as_i64()?.checked_mul(MICROS_PER_DAY)?;
    let delta = if subtract { delta.checked_neg()? } else { delta };
    micros.checked_add(delta).map(Value::Timestamp)
}

fn invalid_operands(operator: &str, left: &Value, right: Option<&Value>) -> ExpressionError {
    ExpressionError::InvalidOperandTypes {
        operator: operator.to_string(),
        left_type: left.data_type().map(|t| t.name()),
        right_type: right.and_then(|v| v.data_type()).map(|t| t.name()),
    }
}

impl Expression {
    /// Evaluate against the rows currently positioned in `session`
    pub fn evaluate(&self, session: &Session) -> ExpressionResult<Value> {
        ExpressionEvaluator::new(session).evaluate(self)
    }

    pub fn evaluate_as(&self, session: &Session, data_type: &DataType) -> ExpressionResult<Value> {
        ExpressionEvaluator::new(session).evaluate_as(self, data_type)
    }

    pub fn test_condition(&self, session: &Session) -> ExpressionResult<bool> {
        ExpressionEvaluator::new(session).test_condition(self)
    }

    pub fn get_result(&self, session: &Session) -> ExpressionResult<QueryResult> {
        ExpressionEvaluator::new(session).get_result(self)
    }

    pub fn table_rows(&self, session: &Session) -> ExpressionResult<Vec<Vec<Value>>> {
        ExpressionEvaluator::new(session).table_rows(self)
    }

    /// Replace constant operator and function subtrees with their value.
    ///
    /// Subtrees with a non-deterministic function, a routine or a sequence are
    /// left alone.
    pub fn fold_constants(&mut self, session: &Session) -> ExpressionResult<()> {
        for child in self.children_mut() {
            child.fold_constants(session)?;
        }
        let foldable = match &self.kind {
            ExprKind::Binary(_) | ExprKind::Unary(_) => true,
            ExprKind::Function(function) => function.is_deterministic(),
            _ => false,
        };
        let constant_inputs = !self.nodes.is_empty()
            && self
                .nodes
                .iter()
                .all(|node| matches!(node, Some(Expression { kind: ExprKind::Value(_), .. })));
        if foldable && constant_inputs {
            let value = self.evaluate(session)?;
            self.set_as_constant_value(value);
        }
        Ok(())
    }
}

/// Helper function to evaluate an expression against a session
pub fn evaluate_expression(expr: &Expression, session: &Session) -> ExpressionResult<Value> {
    ExpressionEvaluator::new(session).evaluate(expr)
}

/// Number of NULLs in a row
pub fn count_nulls(values: &[Value]) -> usize {
    values.iter().filter(|v| v.is_null()).count()
}

/// Type alias for predicate functions
pub type Predicate = Box<dyn Fn(&Session) -> bool + Send + 'static>;

/// Helper function to create a predicate function from an expression
pub fn expression_to_predicate(expr: Expression) -> Predicate {
    Box::new(move |session| {
        match evaluate_expression(&expr, session) {
            Ok(Value::Boolean(b)) => b,
            Ok(Value::Null) => false, // NULL is treated as false in WHERE clause
            _ => false,               // Type error or non-boolean result
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{RangeColumn, RangeVariable};
    use crate::config::EngineConfig;
    use crate::expression::function::AggregateFunction;
    use crate::expression::subquery::StaticPlan;

    fn session_with_row(values: Vec<Value>) -> Session {
        let mut session = Session::default();
        session.set_current_row(0, values);
        session
    }

    #[test]
    fn test_literal_evaluation() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);

        assert_eq!(
            evaluator
                .evaluate(&Expression::literal(Value::Int32(42)))
                .unwrap(),
            Value::Int32(42)
        );
        assert_eq!(
            evaluator
                .evaluate(&Expression::literal(Value::String("hello".to_string())))
                .unwrap(),
            Value::String("hello".to_string())
        );
        assert_eq!(evaluator.evaluate(&Expression::null()).unwrap(), Value::Null);
    }

    #[test]
    fn test_column_evaluation() {
        let session = session_with_row(vec![
            Value::Int32(1),
            Value::String("test".to_string()),
        ]);
        let evaluator = ExpressionEvaluator::new(&session);

        assert_eq!(
            evaluator.evaluate(&Expression::simple_column(0, 1)).unwrap(),
            Value::String("test".to_string())
        );

        // Out of bounds
        assert!(matches!(
            evaluator.evaluate(&Expression::simple_column(0, 3)),
            Err(ExpressionError::ColumnIndexOutOfBounds { .. })
        ));

        // No row positioned under the range
        assert_eq!(
            evaluator.evaluate(&Expression::simple_column(4, 0)),
            Err(ExpressionError::UnboundRange { position: 4 })
        );

        // Named columns read through their binding
        let range = RangeVariable::new(0, "t", vec![
            RangeColumn::new("id", DataType::Int32),
            RangeColumn::new("name", DataType::Varchar),
        ]);
        let mut named = Expression::column("name");
        named.resolve_columns(&[range]).unwrap();
        assert_eq!(
            evaluator.evaluate(&named).unwrap(),
            Value::String("test".to_string())
        );

        assert!(matches!(
            evaluator.evaluate(&Expression::column("name")),
            Err(ExpressionError::InternalInconsistency { .. })
        ));
    }

    #[test]
    fn test_arithmetic_operations() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);
        let int = |v| Expression::literal(Value::Int32(v));

        assert_eq!(
            evaluator
                .evaluate(&Expression::add_expr(int(10), int(5)))
                .unwrap(),
            Value::Int32(15)
        );
        assert_eq!(
            evaluator
                .evaluate(&Expression::sub_expr(int(10), int(5)))
                .unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            evaluator
                .evaluate(&Expression::mul_expr(int(4), int(3)))
                .unwrap(),
            Value::Int32(12)
        );
        assert_eq!(
            evaluator
                .evaluate(&Expression::div_expr(int(10), int(3)))
                .unwrap(),
            Value::Int32(3)
        );

        // Mixed widths
        let expr = Expression::add_expr(int(1), Expression::literal(Value::Int64(2)));
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Int64(3));
        let expr = Expression::mul_expr(int(2), Expression::literal(Value::Double(1.5)));
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Double(3.0));

        // Division by zero
        assert!(matches!(
            evaluator.evaluate(&Expression::div_expr(int(10), int(0))),
            Err(ExpressionError::DivisionByZero)
        ));

        // Overflow
        assert_eq!(
            evaluator.evaluate(&Expression::add_expr(int(i32::MAX), int(1))),
            Err(ExpressionError::overflow("+"))
        );

        // Type mismatch
        let expr = Expression::add_expr(
            int(10),
            Expression::literal(Value::String("5".to_string())),
        );
        assert!(matches!(
            evaluator.evaluate(&expr),
            Err(ExpressionError::InvalidOperandTypes { .. })
        ));
    }

    #[test]
    fn test_datetime_arithmetic() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);

        let expr = Expression::add_expr(
            Expression::literal(Value::Date(100)),
            Expression::literal(Value::Int32(5)),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Date(105));

        let expr = Expression::sub_expr(
            Expression::literal(Value::Timestamp(MICROS_PER_DAY * 2)),
            Expression::literal(Value::Int64(1)),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Timestamp(MICROS_PER_DAY));

        let expr = Expression::sub_expr(
            Expression::literal(Value::Date(10)),
            Expression::literal(Value::Date(3)),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Int32(7));

        let expr = Expression::sub_expr(
            Expression::literal(Value::Int32(3)),
            Expression::literal(Value::Date(10)),
        );
        assert!(matches!(
            evaluator.evaluate(&expr),
            Err(ExpressionError::InvalidOperandTypes { .. })
        ));
    }

    #[test]
    fn test_comparison_operations() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);

        let expr = Expression::eq(
            Expression::literal(Value::Int32(5)),
            Expression::literal(Value::Int64(5)),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Boolean(true));

        let expr = Expression::ne(
            Expression::literal(Value::Int32(5)),
            Expression::literal(Value::Int32(3)),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Boolean(true));

        let expr = Expression::lt(
            Expression::literal(Value::String("abc".to_string())),
            Expression::literal(Value::String("def".to_string())),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Boolean(true));

        let expr = Expression::ge(
            Expression::literal(Value::Date(1)),
            Expression::literal(Value::Timestamp(MICROS_PER_DAY)),
        );
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Boolean(true));

        let expr = Expression::eq(
            Expression::literal(Value::Int32(1)),
            Expression::literal(Value::String("1".to_string())),
        );
        assert!(matches!(
            evaluator.evaluate(&expr),
            Err(ExpressionError::InvalidOperandTypes { .. })
        ));
    }

    #[test]
    fn test_logical_operations() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);
        let t = || Expression::literal(Value::Boolean(true));
        let f = || Expression::literal(Value::Boolean(false));

        assert_eq!(evaluator.evaluate(&Expression::and(t(), t())).unwrap(), Value::Boolean(true));
        assert_eq!(evaluator.evaluate(&Expression::and(t(), f())).unwrap(), Value::Boolean(false));
        assert_eq!(evaluator.evaluate(&Expression::or(f(), t())).unwrap(), Value::Boolean(true));
        assert_eq!(evaluator.evaluate(&Expression::or(f(), f())).unwrap(), Value::Boolean(false));
        assert_eq!(evaluator.evaluate(&Expression::not_expr(t())).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_null_operations() {
        let session = session_with_row(vec![Value::Null, Value::Int32(5)]);
        let evaluator = ExpressionEvaluator::new(&session);
        let col = |i| Expression::simple_column(0, i);

        assert_eq!(evaluator.evaluate(&Expression::is_null(col(0))).unwrap(), Value::Boolean(true));
        assert_eq!(
            evaluator.evaluate(&Expression::is_null(col(1))).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            evaluator.evaluate(&Expression::is_not_null(col(0))).unwrap(),
            Value::Boolean(false)
        );

        // NULL propagation in arithmetic
        let expr = Expression::add_expr(col(0), Expression::literal(Value::Int32(5)));
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Null);

        // NULL in comparisons
        let expr = Expression::eq(col(0), Expression::literal(Value::Int32(5)));
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Null);

        // false AND NULL = false
        let expr = Expression::and(Expression::literal(Value::Boolean(false)), col(0));
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Boolean(false));

        // true OR NULL = true
        let expr = Expression::or(Expression::literal(Value::Boolean(true)), col(0));
        assert_eq!(evaluator.evaluate(&expr).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_row_and_array_values() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);

        let single = Expression::row(vec![Expression::literal(Value::Int32(1))]);
        assert_eq!(evaluator.evaluate(&single).unwrap(), Value::Int32(1));

        let pair = Expression::row(vec![
            Expression::literal(Value::Int32(1)),
            Expression::literal(Value::String("a".into())),
        ]);
        assert_eq!(
            evaluator.evaluate(&pair).unwrap(),
            Value::Row(vec![Value::Int32(1), Value::String("a".into())])
        );

        let mut array = Expression::array(vec![
            Expression::literal(Value::Int32(1)),
            Expression::literal(Value::Double(2.5)),
        ]);
        array.resolve_types(&session).unwrap();
        assert_eq!(
            evaluator.evaluate(&array).unwrap(),
            Value::Array(vec![Value::Double(1.0), Value::Double(2.5)])
        );
    }

    #[test]
    fn test_subquery_values() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);
        let plan = StaticPlan::new(
            vec![DataType::Int32, DataType::Varchar],
            vec![
                vec![Value::Int32(1), Value::String("a".into())],
                vec![Value::Int32(2), Value::String("b".into())],
            ],
        );

        let table = Expression::table_subquery(SubQuery::new(plan.clone()));
        assert_eq!(
            evaluator.evaluate(&table).unwrap(),
            Value::Row(vec![Value::Int32(1), Value::String("a".into())])
        );
        assert_eq!(
            evaluator.get_result(&table).unwrap(),
            QueryResult::RowSet(vec![
                vec![Value::Int32(1), Value::String("a".into())],
                vec![Value::Int32(2), Value::String("b".into())],
            ])
        );

        let row = Expression::row_subquery(SubQuery::new(plan));
        assert_eq!(
            evaluator.evaluate(&row),
            Err(ExpressionError::CardinalityViolation { rows: 2 })
        );

        let ids = StaticPlan::new(
            vec![DataType::Int32],
            vec![vec![Value::Int32(7)], vec![Value::Int32(8)]],
        );
        let mut array = Expression::array_subquery(SubQuery::new(ids));
        array.resolve_types(&session).unwrap();
        assert_eq!(
            evaluator.evaluate(&array).unwrap(),
            Value::Array(vec![Value::Int32(7), Value::Int32(8)])
        );

        let empty = Expression::row_subquery(SubQuery::new(StaticPlan::new(
            vec![DataType::Int32],
            vec![],
        )));
        assert_eq!(evaluator.evaluate(&empty).unwrap(), Value::Null);
    }

    #[test]
    fn test_array_subquery_limit() {
        let session = Session::new(EngineConfig::new().with_max_array_cardinality(1));
        let plan = StaticPlan::new(
            vec![DataType::Int32],
            vec![vec![Value::Int32(1)], vec![Value::Int32(2)]],
        );
        let mut array = Expression::array_subquery(SubQuery::new(plan));
        array.resolve_types(&session).unwrap();
        assert!(matches!(
            array.evaluate(&session),
            Err(ExpressionError::EvaluationError { .. })
        ));
    }

    #[test]
    fn test_functions() {
        let day = 19_000;
        let session = Session::new(
            EngineConfig::new()
                .with_fixed_timestamp(day as i64 * MICROS_PER_DAY + 42)
                .with_random_seed(1),
        );
        let evaluator = ExpressionEvaluator::new(&session);

        assert_eq!(evaluator.evaluate(&Expression::current_date()).unwrap(), Value::Date(day));
        assert_eq!(
            evaluator.evaluate(&Expression::current_timestamp()).unwrap(),
            Value::Timestamp(day as i64 * MICROS_PER_DAY + 42)
        );
        assert!(matches!(
            evaluator.evaluate(&Expression::random()).unwrap(),
            Value::Double(v) if (0.0..1.0).contains(&v)
        ));

        let call = |f, arg| Expression::function(f, vec![Expression::literal(arg)]);
        assert_eq!(
            evaluator
                .evaluate(&call(SqlFunction::Abs, Value::Int32(-4)))
                .unwrap(),
            Value::Int32(4)
        );
        assert_eq!(
            evaluator.evaluate(&call(SqlFunction::Upper, Value::String("abc".into()))).unwrap(),
            Value::String("ABC".into())
        );
        assert_eq!(
            evaluator
                .evaluate(&call(SqlFunction::CharLength, Value::String("héllo".into())))
                .unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            evaluator
                .evaluate(&call(SqlFunction::Lower, Value::Null))
                .unwrap(),
            Value::Null
        );

        let mut coalesce = Expression::function(
            SqlFunction::Coalesce,
            vec![
                Expression::null(),
                Expression::literal(Value::Int32(3)),
                Expression::literal(Value::Double(1.5)),
            ],
        );
        coalesce.resolve_types(&session).unwrap();
        assert_eq!(evaluator.evaluate(&coalesce).unwrap(), Value::Double(3.0));
    }

    #[test]
    fn test_routine_without_services() {
        let session = Session::default();
        let expr = Expression::routine(
            crate::catalog::RoutineInfo::new("f", DataType::Int32),
            vec![],
        );
        assert!(matches!(
            expr.evaluate(&session),
            Err(ExpressionError::EvaluationError { .. })
        ));
    }

    #[test]
    fn test_aggregate_and_table_are_not_evaluated() {
        let session = Session::default();
        let agg = Expression::aggregate(AggregateFunction::Count, None);
        assert!(matches!(
            agg.evaluate(&session),
            Err(ExpressionError::InternalInconsistency { .. })
        ));
        let list = Expression::value_list(vec![Expression::literal(Value::Int32(1))]).unwrap();
        assert!(matches!(
            list.evaluate(&session),
            Err(ExpressionError::InternalInconsistency { .. })
        ));
    }

    #[test]
    fn test_table_rows_convert_to_position_types() {
        let session = Session::default();
        let mut list = Expression::value_list(vec![
            Expression::row(vec![Expression::literal(Value::Int32(1)), Expression::null()]),
            Expression::row(vec![
                Expression::literal(Value::Double(2.5)),
                Expression::literal(Value::String("x".into())),
            ]),
        ])
        .unwrap();
        assert!(matches!(
            list.table_rows(&session),
            Err(ExpressionError::InternalInconsistency { .. })
        ));

        list.resolve_types(&session).unwrap();
        assert_eq!(
            list.table_rows(&session).unwrap(),
            vec![
                vec![Value::Double(1.0), Value::Null],
                vec![Value::Double(2.5), Value::String("x".into())],
            ]
        );
    }

    #[test]
    fn test_condition_and_evaluate_as() {
        let session = Session::default();
        let evaluator = ExpressionEvaluator::new(&session);
        assert!(evaluator
            .test_condition(&Expression::literal(Value::Boolean(true)))
            .unwrap());
        assert!(!evaluator.test_condition(&Expression::null()).unwrap());
        assert!(evaluator
            .test_condition(&Expression::literal(Value::Int32(1)))
            .is_err());

        assert_eq!(
            evaluator
                .evaluate_as(&Expression::literal(Value::Int32(7)), &DataType::Varchar)
                .unwrap(),
            Value::String("7".into())
        );
    }

    #[test]
    fn test_fold_constants() {
        let session = Session::default();
        let mut expr = Expression::gt(
            Expression::simple_column(0, 0),
            Expression::add_expr(
                Expression::literal(Value::Int32(1)),
                Expression::mul_expr(
                    Expression::literal(Value::Int32(2)),
                    Expression::literal(Value::Int32(3)),
                ),
            ),
        );
        expr.fold_constants(&session).unwrap();
        assert_eq!(expr.right(), Some(&Expression::literal(Value::Int32(7))));
        assert!(matches!(expr.kind(), ExprKind::Binary(BinaryOperator::Gt)));

        let mut clock = Expression::add_expr(
            Expression::current_date(),
            Expression::literal(Value::Int32(1)),
        );
        clock.fold_constants(&session).unwrap();
        assert!(matches!(clock.kind(), ExprKind::Binary(BinaryOperator::Add)));
    }

    #[test]
    fn test_expression_to_predicate() {
        let expr = Expression::gt(
            Expression::simple_column(0, 0),
            Expression::literal(Value::Int32(5)),
        );
        let predicate = expression_to_predicate(expr);

        assert!(predicate(&session_with_row(vec![Value::Int32(10)])));
        assert!(!predicate(&session_with_row(vec![Value::Int32(3)])));

        // NULL is false
        assert!(!predicate(&session_with_row(vec![Value::Null])));

        // Type error is false
        assert!(!predicate(&session_with_row(vec![Value::String("x".into())])));
    }

    #[test]
    fn test_count_nulls() {
        assert_eq!(count_nulls(&[Value::Null, Value::Int32(1), Value::Null]), 2);
        assert_eq!(count_nulls(&[]), 0);
    }
}
