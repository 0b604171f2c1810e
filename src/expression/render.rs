//! SQL text and explain output for expressions.

use crate::access::DataType;
use crate::expression::expr::{ExprKind, Expression};
use std::fmt;

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Value(value) => write!(f, "{}", value),
            ExprKind::Column(col) => write!(f, "{}", col.display_name()),
            ExprKind::SimpleColumn {
                range_position,
                column_index,
            } => write!(f, "#{}.{}", range_position, column_index),
            ExprKind::Row => write!(f, "({})", self.join_nodes(",")),
            ExprKind::Table => write!(f, "{}", self.join_nodes(", ")),
            ExprKind::Array { .. } => write!(f, "ARRAY[{}]", self.join_nodes(",")),
            ExprKind::RowSubquery(sq) | ExprKind::TableSubquery(sq) => {
                write!(f, "({})", sq.to_sql())
            }
            ExprKind::ArraySubquery(sq) => write!(f, "ARRAY({})", sq.to_sql()),
            ExprKind::Binary(op) => write!(
                f,
                "{} {} {}",
                self.operand_sql(0),
                op.as_str(),
                self.operand_sql(1)
            ),
            ExprKind::Unary(op) if op.is_postfix() => {
                write!(f, "{} {}", self.operand_sql(0), op.as_str())
            }
            ExprKind::Unary(op) => write!(f, "{} {}", op.as_str(), self.operand_sql(0)),
            ExprKind::Function(function) if function.is_niladic() && self.nodes.is_empty() => {
                write!(f, "{}", function.name())
            }
            ExprKind::Function(function) => {
                write!(f, "{}({})", function.name(), self.join_nodes(","))
            }
            ExprKind::Routine(info) => write!(f, "{}({})", info.name, self.join_nodes(",")),
            ExprKind::Aggregate(function) if self.nodes.is_empty() => {
                write!(f, "{}(*)", function.name())
            }
            ExprKind::Aggregate(function) => {
                write!(f, "{}({})", function.name(), self.join_nodes(","))
            }
            ExprKind::NextValue { sequence } => write!(f, "NEXT VALUE FOR {}", sequence),
        }
    }
}

impl Expression {
    /// SQL text, parenthesized unless this is a value, column, row or function
    pub fn context_sql(&self) -> String {
        match self.kind {
            ExprKind::Value(_)
            | ExprKind::Column(_)
            | ExprKind::SimpleColumn { .. }
            | ExprKind::Row
            | ExprKind::Function(_)
            | ExprKind::Routine(_)
            | ExprKind::Aggregate(_)
            | ExprKind::NextValue { .. } => self.to_string(),
            _ => format!("({})", self),
        }
    }

    fn operand_sql(&self, index: usize) -> String {
        match self.node(index) {
            Some(node) => node.context_sql(),
            None => "?".to_string(),
        }
    }

    fn join_nodes(&self, separator: &str) -> String {
        self.nodes
            .iter()
            .map(|node| match node {
                Some(node) => node.to_string(),
                None => "?".to_string(),
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Indented multi-line description of the tree
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(0, &mut out);
        out
    }

    fn explain_into(&self, indent: usize, out: &mut String) {
        let pad = " ".repeat(indent);
        let type_name =
            |t: Option<&DataType>| t.map(|t| t.name()).unwrap_or_else(|| "NULL".to_string());

        match &self.kind {
            ExprKind::Value(value) => {
                out.push_str(&format!(
                    "{}VALUE = {}, TYPE = {}\n",
                    pad,
                    value,
                    type_name(self.data_type())
                ));
            }
            ExprKind::Column(col) => {
                let binding = match &col.binding {
                    Some(b) => format!(" RANGE = {}, INDEX = {}", b.range_position, b.column_index),
                    None => " UNRESOLVED".to_string(),
                };
                out.push_str(&format!("{}COLUMN: {}{}\n", pad, col.display_name(), binding));
            }
            ExprKind::SimpleColumn {
                range_position,
                column_index,
            } => {
                out.push_str(&format!(
                    "{}SIMPLE COLUMN: RANGE = {}, INDEX = {}\n",
                    pad, range_position, column_index
                ));
            }
            ExprKind::Row => {
                out.push_str(&format!("{}ROW = \n", pad));
                self.explain_children(indent, out);
            }
            ExprKind::Table => {
                out.push_str(&format!("{}VALUELIST \n", pad));
                self.explain_children(indent, out);
            }
            ExprKind::Array { .. } => {
                out.push_str(&format!("{}ARRAY \n", pad));
                self.explain_children(indent, out);
            }
            ExprKind::ArraySubquery(sq) => {
                out.push_str(&format!("{}ARRAY SUBQUERY\n", pad));
                out.push_str(&sq.with_plan(|plan| plan.describe(indent + 2)));
            }
            ExprKind::RowSubquery(sq) | ExprKind::TableSubquery(sq) => {
                let correlated = if sq.is_correlated() { " CORRELATED" } else { "" };
                out.push_str(&format!("{}QUERY{}\n", pad, correlated));
                out.push_str(&sq.with_plan(|plan| plan.describe(indent + 2)));
            }
            ExprKind::Binary(op) => {
                out.push_str(&format!("{}{} arg_left=[\n", pad, op.as_str()));
                self.explain_slot(0, indent + 2, out);
                out.push_str(&format!("{}] arg_right=[\n", pad));
                self.explain_slot(1, indent + 2, out);
                out.push_str(&format!("{}]\n", pad));
            }
            ExprKind::Unary(op) => {
                out.push_str(&format!("{}{} arg=[\n", pad, op.as_str()));
                self.explain_slot(0, indent + 2, out);
                out.push_str(&format!("{}]\n", pad));
            }
            ExprKind::Function(function) => {
                out.push_str(&format!("{}FUNCTION {}\n", pad, function.name()));
                self.explain_children(indent, out);
            }
            ExprKind::Routine(info) => {
                out.push_str(&format!("{}ROUTINE {}\n", pad, info.name));
                self.explain_children(indent, out);
            }
            ExprKind::Aggregate(function) => {
                out.push_str(&format!("{}AGGREGATE {}\n", pad, function.name()));
                self.explain_children(indent, out);
            }
            ExprKind::NextValue { sequence } => {
                out.push_str(&format!("{}NEXT VALUE FOR {}\n", pad, sequence));
            }
        }
    }

    fn explain_children(&self, indent: usize, out: &mut String) {
        for index in 0..self.nodes.len() {
            self.explain_slot(index, indent + 2, out);
        }
    }

    fn explain_slot(&self, index: usize, indent: usize, out: &mut String) {
        match self.node(index) {
            Some(node) => node.explain_into(indent, out),
            None => out.push_str(&format!("{}(vacant)\n", " ".repeat(indent))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::access::{DataType, Value};
    use crate::expression::expr::Expression;
    use crate::expression::function::{AggregateFunction, SqlFunction};
    use crate::expression::subquery::{StaticPlan, SubQuery};

    #[test]
    fn test_display_sql() {
        let expr = Expression::and(
            Expression::gt(
                Expression::qualified_column("e", "salary"),
                Expression::literal(Value::Int32(10)),
            ),
            Expression::is_not_null(Expression::column("name")),
        );
        assert_eq!(expr.to_string(), "(e.salary > 10) AND (name IS NOT NULL)");

        let expr = Expression::row(vec![
            Expression::literal(Value::String("it's".into())),
            Expression::null(),
        ]);
        assert_eq!(expr.to_string(), "('it''s',NULL)");

        let expr = Expression::array(vec![
            Expression::literal(Value::Int32(1)),
            Expression::literal(Value::Int32(2)),
        ]);
        assert_eq!(expr.to_string(), "ARRAY[1,2]");

        assert_eq!(Expression::current_date().to_string(), "CURRENT_DATE");
        assert_eq!(
            Expression::function(SqlFunction::Abs, vec![Expression::simple_column(0, 2)])
                .to_string(),
            "ABS(#0.2)"
        );
        assert_eq!(Expression::aggregate(AggregateFunction::Count, None).to_string(), "COUNT(*)");
        assert_eq!(Expression::next_value("s").to_string(), "NEXT VALUE FOR s");
    }

    #[test]
    fn test_subquery_sql() {
        let plan = StaticPlan::new(vec![DataType::Int32], vec![]).with_sql("SELECT id FROM t");
        let expr = Expression::array_subquery(SubQuery::new(plan.clone()));
        assert_eq!(expr.to_string(), "ARRAY(SELECT id FROM t)");
        let expr = Expression::row_subquery(SubQuery::new(plan));
        assert_eq!(expr.to_string(), "(SELECT id FROM t)");
        assert_eq!(expr.context_sql(), "((SELECT id FROM t))");
    }

    #[test]
    fn test_explain() {
        let expr = Expression::row(vec![
            Expression::literal(Value::Int32(1)),
            Expression::simple_column(1, 0),
        ]);
        assert_eq!(
            expr.explain(),
            "ROW = \n  VALUE = 1, TYPE = INTEGER\n  SIMPLE COLUMN: RANGE = 1, INDEX = 0\n"
        );

        let expr = Expression::is_null(Expression::null());
        assert_eq!(expr.explain(), "IS NULL arg=[\n  VALUE = NULL, TYPE = NULL\n]\n");
    }
}
