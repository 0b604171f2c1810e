//! Bottom-up type resolution.

use crate::access::DataType;
use crate::config::EngineConfig;
use crate::expression::coercion::TypeRegistry;
use crate::expression::expr::{ExprKind, Expression, LEFT, RIGHT};
use crate::expression::function::SqlFunction;
use crate::expression::operator::{BinaryOperator, UnaryOperator};
use crate::expression::subquery::SubQuery;
use crate::expression::{ExpressionError, ExpressionResult};
use crate::session::Session;

/// Assigns a data type to every node of a resolved tree
pub struct TypeResolver<'a> {
    registry: &'a dyn TypeRegistry,
    max_array_cardinality: usize,
}

impl<'a> TypeResolver<'a> {
    pub fn new(registry: &'a dyn TypeRegistry, config: &EngineConfig) -> Self {
        Self {
            registry,
            max_array_cardinality: config.max_array_cardinality,
        }
    }

    pub fn for_session(session: &'a Session) -> Self {
        Self::new(session.registry(), session.config())
    }

    /// Resolve types post-order; every pass replaces the previous result
    pub fn resolve(&self, expr: &mut Expression) -> ExpressionResult<()> {
        for child in expr.children_mut() {
            self.resolve(child)?;
        }

        match &expr.kind {
            ExprKind::Value(value) => {
                if expr.data_type.is_none() {
                    expr.data_type = value.data_type();
                }
            }

            ExprKind::Column(col) => match &col.binding {
                Some(binding) => expr.data_type = Some(binding.data_type.clone()),
                None => {
                    return Err(ExpressionError::UnresolvedColumn {
                        name: col.display_name(),
                    })
                }
            },

            // typed by whoever produced the lookup
            ExprKind::SimpleColumn { .. } => {}

            ExprKind::Row => {
                let types: Vec<Option<DataType>> = expr
                    .nodes
                    .iter()
                    .map(|node| node.as_ref().and_then(|n| n.data_type.clone()))
                    .collect();
                expr.data_type = if types.len() == 1 {
                    types[0].clone()
                } else {
                    None
                };
                expr.node_data_types = Some(types);
            }

            ExprKind::Table => {
                let degree = expr.node(0).map(|row| row.degree()).unwrap_or(1);
                expr.node_data_types = None;
                expr.prepare_table(self.registry, degree, None)?;
            }

            ExprKind::Array { element_type } => {
                let declared = element_type.clone();
                self.resolve_array(expr, declared)?;
            }

            ExprKind::RowSubquery(sq)
            | ExprKind::TableSubquery(sq)
            | ExprKind::ArraySubquery(sq) => {
                let sq = sq.clone();
                self.resolve_subquery(expr, &sq)?;
            }

            ExprKind::Binary(op) => {
                let op = *op;
                self.resolve_binary(expr, op)?;
            }

            ExprKind::Unary(op) => {
                let op = *op;
                let operand = expr.node(0).and_then(|n| n.data_type.clone());
                expr.data_type = match (op, operand) {
                    (UnaryOperator::IsNull | UnaryOperator::IsNotNull, _) => {
                        Some(DataType::Boolean)
                    }
                    (_, Some(t)) => Some(op.output_type(&t).ok_or_else(|| {
                        ExpressionError::InvalidOperandTypes {
                            operator: op.as_str().to_string(),
                            left_type: Some(t.name()),
                            right_type: None,
                        }
                    })?),
                    (UnaryOperator::Not, None) => Some(DataType::Boolean),
                    (_, None) => None,
                };
            }

            ExprKind::Function(function) => {
                let function = *function;
                self.resolve_function(expr, function)?;
            }

            ExprKind::Routine(info) => {
                expr.data_type = Some(info.return_type.clone());
            }

            ExprKind::Aggregate(function) => {
                let function = *function;
                let argument = expr.node(0).and_then(|n| n.data_type.clone());
                expr.data_type = match function.output_type(argument.as_ref()) {
                    Some(t) => Some(t),
                    None if argument.is_some() => {
                        return Err(ExpressionError::InvalidOperandTypes {
                            operator: function.name().to_string(),
                            left_type: argument.map(|t| t.name()),
                            right_type: None,
                        })
                    }
                    None => None,
                };
            }

            ExprKind::NextValue { .. } => expr.data_type = Some(DataType::Int64),
        }
        Ok(())
    }

    fn resolve_array(
        &self,
        expr: &mut Expression,
        declared: Option<DataType>,
    ) -> ExpressionResult<()> {
        let cardinality = expr.nodes.len();
        if cardinality > self.max_array_cardinality {
            return Err(ExpressionError::type_mismatch(
                format!("at most {} elements", self.max_array_cardinality),
                format!("{} elements", cardinality),
                "ARRAY constructor",
            ));
        }

        let mut element = declared.clone();
        for child in expr.children() {
            let aggregated = self
                .registry
                .aggregate_type(element.as_ref(), child.data_type())?;
            if declared.is_none() {
                element = aggregated;
            }
        }
        let element = element.ok_or_else(|| {
            let actual = if cardinality == 0 {
                "empty ARRAY"
            } else {
                "only NULL elements"
            };
            ExpressionError::type_mismatch("an element type", actual, "ARRAY constructor")
        })?;

        for child in expr.children_mut() {
            if child.data_type.is_none() {
                child.set_data_type(element.clone(), self.registry)?;
            }
        }
        expr.data_type = Some(DataType::array(element, cardinality));
        Ok(())
    }

    fn resolve_subquery(&self, expr: &mut Expression, sq: &SubQuery) -> ExpressionResult<()> {
        sq.resolve_types(self.registry)?;
        let types = sq.prepare_table()?;

        expr.data_type = if matches!(expr.kind, ExprKind::ArraySubquery(_)) {
            if types.len() != 1 {
                return Err(ExpressionError::degree_mismatch(
                    1,
                    types.len(),
                    "ARRAY subquery",
                ));
            }
            Some(DataType::array(types[0].clone(), self.max_array_cardinality))
        } else if types.len() == 1 {
            Some(types[0].clone())
        } else {
            None
        };
        expr.node_data_types = Some(types.into_iter().map(Some).collect());
        Ok(())
    }

    fn resolve_binary(&self, expr: &mut Expression, op: BinaryOperator) -> ExpressionResult<()> {
        let mut left = expr.left().and_then(|n| n.data_type.clone());
        let mut right = expr.right().and_then(|n| n.data_type.clone());

        // an untyped NULL literal takes its type from the other operand
        let fill = match (&left, &right) {
            (Some(l), None) => Some((RIGHT, null_operand_type(op, l))),
            (None, Some(r)) => Some((LEFT, null_operand_type(op, r))),
            _ => None,
        };
        if let Some((index, data_type)) = fill {
            let typed = self.type_null_literal(expr, index, data_type)?;
            if index == LEFT {
                left = typed;
            } else {
                right = typed;
            }
        }

        expr.data_type = match (left, right) {
            (Some(l), Some(r)) => Some(op.output_type(&l, &r).ok_or_else(|| {
                ExpressionError::InvalidOperandTypes {
                    operator: op.as_str().to_string(),
                    left_type: Some(l.name()),
                    right_type: Some(r.name()),
                }
            })?),
            _ if op.is_comparison() || matches!(op, BinaryOperator::And | BinaryOperator::Or) => {
                Some(DataType::Boolean)
            }
            _ => None,
        };
        Ok(())
    }

    fn type_null_literal(
        &self,
        expr: &mut Expression,
        index: usize,
        data_type: DataType,
    ) -> ExpressionResult<Option<DataType>> {
        match expr.node_mut(index) {
            Some(node) if matches!(node.kind, ExprKind::Value(_)) => {
                node.set_data_type(data_type.clone(), self.registry)?;
                Ok(Some(data_type))
            }
            _ => Ok(None),
        }
    }

    fn resolve_function(
        &self,
        expr: &mut Expression,
        function: SqlFunction,
    ) -> ExpressionResult<()> {
        let count = expr.nodes.len();
        let (min, max) = function.arity();
        if count < min || max.is_some_and(|max| count > max) {
            return Err(ExpressionError::FunctionArgumentCount {
                function: function.name().to_string(),
                expected: if count < min { min } else { max.unwrap_or(min) },
                actual: count,
            });
        }

        if function == SqlFunction::Coalesce {
            let mut common: Option<DataType> = None;
            for child in expr.children() {
                common = self.registry.aggregate_type(common.as_ref(), child.data_type())?;
            }
            if let Some(common) = &common {
                for child in expr.children_mut() {
                    if child.data_type.is_none() && matches!(child.kind, ExprKind::Value(_)) {
                        child.set_data_type(common.clone(), self.registry)?;
                    }
                }
            }
            expr.data_type = common;
            return Ok(());
        }

        let argument = expr.node(0).and_then(|n| n.data_type.clone());
        expr.data_type = match function.output_type(argument.as_ref()) {
            Some(t) => Some(t),
            None if argument.is_some() => {
                return Err(ExpressionError::InvalidOperandTypes {
                    operator: function.name().to_string(),
                    left_type: argument.map(|t| t.name()),
                    right_type: None,
                })
            }
            None => None,
        };
        Ok(())
    }

    /// Check if an expression is valid for use as a filter predicate
    pub fn check_filter_predicate(&self, expr: &mut Expression) -> ExpressionResult<()> {
        self.resolve(expr)?;
        match expr.data_type() {
            Some(DataType::Boolean) | None => Ok(()),
            Some(other) => Err(ExpressionError::type_mismatch(
                DataType::Boolean,
                other,
                "filter predicate",
            )),
        }
    }
}

/// Type an untyped NULL operand of `op` should take given the other operand
fn null_operand_type(op: BinaryOperator, other: &DataType) -> DataType {
    match op {
        BinaryOperator::And | BinaryOperator::Or => DataType::Boolean,
        _ if op.is_arithmetic() && other.is_datetime() => DataType::Int32,
        _ => other.clone(),
    }
}

impl Expression {
    /// Resolve the types of this tree with the session's registry and limits
    pub fn resolve_types(&mut self, session: &Session) -> ExpressionResult<()> {
        TypeResolver::for_session(session).resolve(self)
    }

    /// Type a value list.
    ///
    /// Each position gets the aggregate type of that field over all rows and,
    /// when given, the matching field of `expected_row` (the other side of an
    /// `IN`). Untyped NULL literals take the position type. Does nothing once
    /// the position types are set.
    pub fn prepare_table(
        &mut self,
        registry: &dyn TypeRegistry,
        degree: usize,
        expected_row: Option<&Expression>,
    ) -> ExpressionResult<()> {
        if self.node_data_types.is_some() {
            return Ok(());
        }
        if !matches!(self.kind, ExprKind::Table) {
            return Err(ExpressionError::internal(
                "prepare_table",
                format!("{:?} is not a value list", self.op_type()),
            ));
        }

        // validate every row before rewriting any of them
        for slot in self.nodes.iter() {
            let row = slot
                .as_ref()
                .ok_or_else(|| ExpressionError::internal("prepare_table", "vacant row slot"))?;
            let row_degree = if matches!(row.kind, ExprKind::Row) {
                row.nodes.len()
            } else {
                1
            };
            if row_degree != degree {
                return Err(ExpressionError::degree_mismatch(
                    degree,
                    row_degree,
                    "VALUES list",
                ));
            }
        }
        for slot in self.nodes.iter_mut() {
            if let Some(item) = slot.take() {
                *slot = Some(if matches!(item.kind, ExprKind::Row) {
                    item
                } else {
                    Expression::row(vec![item])
                });
            }
        }

        let mut types = Vec::with_capacity(degree);
        for position in 0..degree {
            let mut column_type = expected_row.and_then(|r| r.node_data_type(position)).cloned();
            for row in self.children() {
                let field_type = row.node(position).and_then(|n| n.data_type());
                column_type = registry.aggregate_type(column_type.as_ref(), field_type)?;
            }
            let column_type = column_type.ok_or_else(|| {
                ExpressionError::type_mismatch(
                    "a determinable type",
                    "NULL",
                    format!("VALUES list column {}", position + 1),
                )
            })?;
            for row in self.children_mut() {
                if let Some(field) = row.node_mut(position) {
                    if field.data_type.is_none() {
                        field.set_data_type(column_type.clone(), registry)?;
                    }
                }
            }
            types.push(Some(column_type));
        }

        let row_type = if degree == 1 { types[0].clone() } else { None };
        for row in self.children_mut() {
            row.node_data_types = Some(types.clone());
            row.data_type = row_type.clone();
        }
        self.data_type = row_type;
        self.node_data_types = Some(types);
        Ok(())
    }
}

/// Helper function to resolve the types of an expression
pub fn resolve_types(expr: &mut Expression, session: &Session) -> ExpressionResult<()> {
    expr.resolve_types(session)
}

/// Helper function to validate a filter predicate
pub fn validate_filter_predicate(expr: &mut Expression, session: &Session) -> ExpressionResult<()> {
    TypeResolver::for_session(session).check_filter_predicate(expr)
}
