//! Validation of CHECK constraint and GENERATED column expressions.

use crate::access::RangeVariable;
use crate::catalog::{ObjectName, SchemaLookup, SchemaObject};
use crate::expression::expr::{ExprKind, Expression};
use crate::expression::{BinaryOperator, ExpressionError, ExpressionResult};
use crate::session::Session;
use log::debug;
use std::fmt;

/// The kind of table constraint an expression is defined for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Check,
    Generated,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Check => write!(f, "CHECK constraint"),
            ConstraintKind::Generated => write!(f, "GENERATED column"),
        }
    }
}

/// Resolve `expr` against the table's range and verify it may be stored as a
/// constraint of `kind`.
///
/// CHECK constraints may compare a date/time column with the statement clock
/// (`hire_date <= CURRENT_DATE`, `CURRENT_TIMESTAMP - 30 < created`) in a
/// top-level conjunct. Every other non-deterministic function is rejected.
pub fn check_deterministic(
    expr: &mut Expression,
    range: &RangeVariable,
    kind: ConstraintKind,
    schema: &dyn SchemaLookup,
    session: &Session,
) -> ExpressionResult<()> {
    expr.resolve_columns(std::slice::from_ref(range))?;
    expr.resolve_types(session)?;
    expr.check_no_subquery_or_aggregate(kind)?;

    if expr.has_non_deterministic_function() {
        check_clock_conjuncts(expr, kind)?;
    }

    for name in expr.collect_object_names() {
        check_object(&name, range, kind, schema)?;
    }
    Ok(())
}

fn check_clock_conjuncts(expr: &Expression, kind: ConstraintKind) -> ExpressionResult<()> {
    if kind == ConstraintKind::Generated {
        debug!("Rejected GENERATED column {}: non-deterministic function", expr);
        return Err(ExpressionError::NonDeterministic { constraint: kind });
    }

    let mut conjuncts = Vec::new();
    decompose_and_conditions(expr, &mut conjuncts);

    for conjunct in conjuncts {
        if !conjunct.has_non_deterministic_function() {
            continue;
        }
        if is_clock_comparison(conjunct) {
            debug!("Tolerated clock comparison {} in CHECK constraint", conjunct);
            continue;
        }
        debug!("Rejected CHECK constraint conjunct {}: non-deterministic", conjunct);
        return Err(ExpressionError::NonDeterministic { constraint: kind });
    }
    Ok(())
}

fn decompose_and_conditions<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match (&expr.kind, expr.left(), expr.right()) {
        (ExprKind::Binary(BinaryOperator::And), Some(left), Some(right)) => {
            decompose_and_conditions(left, out);
            decompose_and_conditions(right, out);
        }
        _ => out.push(expr),
    }
}

/// `<deterministic datetime> <op> <clock expression>` in either orientation,
/// with `op` one of `<`, `<=`, `>`, `>=`
fn is_clock_comparison(expr: &Expression) -> bool {
    let ordering = matches!(
        expr.kind,
        ExprKind::Binary(
            BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge
        )
    );
    if !ordering {
        return false;
    }
    match (expr.left(), expr.right()) {
        (Some(left), Some(right)) => {
            (is_stable_datetime(left) && is_clock_expression(right))
                || (is_clock_expression(left) && is_stable_datetime(right))
        }
        _ => false,
    }
}

fn is_stable_datetime(expr: &Expression) -> bool {
    expr.data_type().is_some_and(|t| t.is_datetime()) && !expr.has_non_deterministic_function()
}

/// A clock function, optionally shifted by a deterministic amount
fn is_clock_expression(expr: &Expression) -> bool {
    let is_clock =
        |e: &Expression| matches!(e.kind, ExprKind::Function(f) if f.is_current_datetime());
    match (&expr.kind, expr.left(), expr.right()) {
        (ExprKind::Function(f), _, _) => f.is_current_datetime(),
        (ExprKind::Binary(BinaryOperator::Add), Some(left), Some(right)) => {
            (is_clock(left) && !right.has_non_deterministic_function())
                || (is_clock(right) && !left.has_non_deterministic_function())
        }
        (ExprKind::Binary(BinaryOperator::Sub), Some(left), Some(right)) => {
            is_clock(left) && !right.has_non_deterministic_function()
        }
        _ => false,
    }
}

fn check_object(
    name: &ObjectName,
    range: &RangeVariable,
    kind: ConstraintKind,
    schema: &dyn SchemaLookup,
) -> ExpressionResult<()> {
    match name {
        ObjectName::Column { column, .. } => {
            if kind == ConstraintKind::Check {
                return Ok(());
            }
            // generated flags come from the range, which may not be in the schema yet
            let range_column = range
                .find_column(column)
                .and_then(|index| range.column(index))
                .ok_or_else(|| ExpressionError::UnresolvedColumn {
                    name: column.clone(),
                })?;
            if range_column.generated {
                debug!(
                    "Rejected GENERATED column: references generated column {}",
                    range_column.name
                );
                return Err(ExpressionError::DisallowedConstruct {
                    construct: format!("reference to generated column {}", range_column.name),
                    constraint: kind,
                });
            }
            Ok(())
        }
        ObjectName::Sequence(sequence) => {
            debug!("Rejected {}: references sequence {}", kind, sequence);
            Err(ExpressionError::DisallowedConstruct {
                construct: format!("sequence {}", sequence),
                constraint: kind,
            })
        }
        ObjectName::Routine(routine) => match schema.lookup(name) {
            Some(SchemaObject::Routine(info)) => {
                if !info.deterministic || info.has_side_effects() {
                    debug!(
                        "Rejected {}: routine {} is not deterministic or touches SQL data",
                        kind, routine
                    );
                    return Err(ExpressionError::NonDeterministic { constraint: kind });
                }
                Ok(())
            }
            _ => Err(ExpressionError::UnknownFunction {
                name: routine.clone(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, RangeColumn, Value};
    use crate::catalog::{DataAccess, InMemorySchema, RoutineInfo};
    use crate::expression::function::AggregateFunction;
    use crate::expression::subquery::{StaticPlan, SubQuery};
    use std::sync::Arc;

    fn schema() -> InMemorySchema {
        let schema = InMemorySchema::new();
        schema.create_table(
            "employees",
            vec![
                RangeColumn::new("id", DataType::Int32),
                RangeColumn::new("hire_date", DataType::Date),
                RangeColumn::new("salary", DataType::Double),
                RangeColumn::generated("bonus", DataType::Double),
            ],
        );
        schema.create_sequence("emp_seq", 1, 1);
        schema.create_routine(
            RoutineInfo::new("grade", DataType::Int32),
            Arc::new(|_: &[Value]| Ok(Value::Int32(1))),
        );
        schema.create_routine(
            RoutineInfo::new("lucky", DataType::Int32).non_deterministic(),
            Arc::new(|_: &[Value]| Ok(Value::Int32(7))),
        );
        schema.create_routine(
            RoutineInfo::new("headcount", DataType::Int32).with_data_access(DataAccess::ReadsSql),
            Arc::new(|_: &[Value]| Ok(Value::Int32(0))),
        );
        schema
    }

    fn check(mut expr: Expression, kind: ConstraintKind) -> ExpressionResult<()> {
        let schema = schema();
        let range = schema.range_variable("employees", 0).unwrap();
        check_deterministic(&mut expr, &range, kind, &schema, &Session::default())
    }

    fn hired_in_past() -> Expression {
        Expression::gt(Expression::current_date(), Expression::column("hire_date"))
    }

    #[test]
    fn test_clock_comparison_passes_check() {
        assert!(check(hired_in_past(), ConstraintKind::Check).is_ok());

        let expr = Expression::le(
            Expression::column("hire_date"),
            Expression::add_expr(Expression::literal(Value::Int32(30)), Expression::current_date()),
        );
        assert!(check(expr, ConstraintKind::Check).is_ok());

        let expr = Expression::and(
            Expression::gt(Expression::column("salary"), Expression::literal(Value::Double(0.0))),
            Expression::lt(
                Expression::sub_expr(
                    Expression::current_timestamp(),
                    Expression::literal(Value::Int32(1)),
                ),
                Expression::column("hire_date"),
            ),
        );
        assert!(check(expr, ConstraintKind::Check).is_ok());
    }

    #[test]
    fn test_random_conjunct_fails_check() {
        let expr = Expression::and(
            hired_in_past(),
            Expression::gt(Expression::random(), Expression::literal(Value::Double(0.5))),
        );
        assert_eq!(
            check(expr, ConstraintKind::Check),
            Err(ExpressionError::NonDeterministic {
                constraint: ConstraintKind::Check
            })
        );
    }

    #[test]
    fn test_clock_outside_comparison_fails_check() {
        // equality with the clock is not a range bound
        let expr = Expression::eq(Expression::column("hire_date"), Expression::current_date());
        assert!(check(expr, ConstraintKind::Check).is_err());

        // clock minus a column is still clock-dependent on both sides
        let expr = Expression::lt(
            Expression::column("hire_date"),
            Expression::sub_expr(Expression::literal(Value::Int32(3)), Expression::current_date()),
        );
        assert!(check(expr, ConstraintKind::Check).is_err());

        // non-datetime side
        let expr = Expression::lt(
            Expression::column("salary"),
            Expression::function(
                crate::expression::SqlFunction::Coalesce,
                vec![Expression::random()],
            ),
        );
        assert!(check(expr, ConstraintKind::Check).is_err());
    }

    #[test]
    fn test_clock_comparison_fails_generated() {
        assert_eq!(
            check(hired_in_past(), ConstraintKind::Generated),
            Err(ExpressionError::NonDeterministic {
                constraint: ConstraintKind::Generated
            })
        );
    }

    #[test]
    fn test_generated_column_references() {
        let expr = Expression::mul_expr(
            Expression::column("salary"),
            Expression::literal(Value::Double(0.1)),
        );
        assert!(check(expr, ConstraintKind::Generated).is_ok());

        let expr = Expression::add_expr(
            Expression::column("bonus"),
            Expression::literal(Value::Double(1.0)),
        );
        let err = check(expr.clone(), ConstraintKind::Generated).unwrap_err();
        assert_eq!(
            err.to_string(),
            "reference to generated column bonus is not allowed in GENERATED column definition"
        );

        // CHECK constraints may read generated columns
        let expr = Expression::gt(expr, Expression::literal(Value::Double(0.0)));
        assert!(check(expr, ConstraintKind::Check).is_ok());
    }

    #[test]
    fn test_generated_columns_of_table_being_created() {
        // the table is not registered in the schema yet
        let schema = InMemorySchema::new();
        let range = RangeVariable::new(
            0,
            "payroll",
            vec![
                RangeColumn::new("salary", DataType::Double),
                RangeColumn::generated("bonus", DataType::Double),
            ],
        );
        let session = Session::default();
        let plus_one = |name: &str| {
            Expression::add_expr(
                Expression::column(name),
                Expression::literal(Value::Double(1.0)),
            )
        };

        let mut expr = plus_one("salary");
        assert_eq!(
            check_deterministic(&mut expr, &range, ConstraintKind::Generated, &schema, &session),
            Ok(())
        );

        let mut expr = plus_one("bonus");
        assert!(matches!(
            check_deterministic(&mut expr, &range, ConstraintKind::Generated, &schema, &session),
            Err(ExpressionError::DisallowedConstruct { construct, .. })
                if construct == "reference to generated column bonus"
        ));
    }

    #[test]
    fn test_sequences_and_routines() {
        let expr = Expression::gt(Expression::column("id"), Expression::next_value("emp_seq"));
        assert!(matches!(
            check(expr, ConstraintKind::Check),
            Err(ExpressionError::DisallowedConstruct { construct, .. })
                if construct == "sequence emp_seq"
        ));

        let deterministic = schema().routine("grade").unwrap();
        let expr = Expression::gt(
            Expression::routine(deterministic, vec![Expression::column("id")]),
            Expression::literal(Value::Int32(0)),
        );
        assert!(check(expr, ConstraintKind::Generated).is_ok());

        for name in ["lucky", "headcount"] {
            let info = schema().routine(name).unwrap();
            let expr = Expression::gt(
                Expression::routine(info, vec![]),
                Expression::literal(Value::Int32(0)),
            );
            assert!(matches!(
                check(expr, ConstraintKind::Check),
                Err(ExpressionError::NonDeterministic { .. })
            ));
        }

        let unknown = RoutineInfo::new("missing", DataType::Int32);
        let expr = Expression::gt(
            Expression::routine(unknown, vec![]),
            Expression::literal(Value::Int32(0)),
        );
        assert!(matches!(
            check(expr, ConstraintKind::Check),
            Err(ExpressionError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_subqueries_and_aggregates_rejected() {
        let expr = Expression::gt(
            Expression::column("salary"),
            Expression::row_subquery(SubQuery::new(StaticPlan::new(
                vec![DataType::Double],
                vec![],
            ))),
        );
        assert!(matches!(
            check(expr, ConstraintKind::Check),
            Err(ExpressionError::DisallowedConstruct { constraint: ConstraintKind::Check, .. })
        ));

        let expr = Expression::gt(
            Expression::aggregate(AggregateFunction::Max, Some(Expression::column("salary"))),
            Expression::literal(Value::Double(0.0)),
        );
        assert!(matches!(
            check(expr, ConstraintKind::Generated),
            Err(ExpressionError::DisallowedConstruct { .. })
        ));
    }

    #[test]
    fn test_unknown_column_fails_resolution() {
        let expr = Expression::gt(Expression::column("age"), Expression::literal(Value::Int32(18)));
        assert_eq!(
            check(expr, ConstraintKind::Check),
            Err(ExpressionError::UnresolvedColumn {
                name: "age".to_string()
            })
        );
    }
}
