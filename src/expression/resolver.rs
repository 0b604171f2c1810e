//! Column reference resolution.

use crate::access::RangeVariable;
use crate::expression::expr::{ColumnBinding, ColumnRef, ExprKind, Expression, COLUMN_SET};
use crate::expression::{ExpressionError, ExpressionResult};
use log::{debug, trace};

impl Expression {
    /// Bind column references against `ranges`.
    ///
    /// References that stay unbound are appended to `unresolved` (as copies)
    /// and the accumulator is returned. References a nested plan could not
    /// bind are attempted against `ranges`; every column inside them is
    /// appended, bound or not, so the caller sees the outer bindings of a
    /// correlated subquery.
    pub fn resolve_column_references(
        &mut self,
        ranges: &[RangeVariable],
        mut unresolved: Vec<Expression>,
    ) -> ExpressionResult<Vec<Expression>> {
        match &mut self.kind {
            ExprKind::Value(_) | ExprKind::SimpleColumn { .. } => return Ok(unresolved),

            ExprKind::Column(col) => {
                if !col.is_bound() {
                    bind_column(col, ranges);
                }
                match col.binding.as_ref().map(|b| b.data_type.clone()) {
                    Some(data_type) => self.data_type = Some(data_type),
                    None => unresolved.push(self.clone()),
                }
                return Ok(unresolved);
            }

            ExprKind::Table => {
                let mut local = Vec::new();
                for child in self.children_mut() {
                    local = child.resolve_column_references(&[], local)?;
                }
                if !local.is_empty() {
                    self.set_correlated();
                    for child in self.children_mut() {
                        unresolved = child.resolve_column_references(ranges, unresolved)?;
                    }
                }
            }

            ExprKind::RowSubquery(sq)
            | ExprKind::TableSubquery(sq)
            | ExprKind::ArraySubquery(sq) => {
                let outer = sq.resolve_column_references()?;
                if !outer.is_empty() {
                    debug!(
                        "Subquery {} has {} outer reference(s)",
                        sq.to_sql(),
                        outer.len()
                    );
                    let mut bound = Vec::with_capacity(outer.len());
                    for mut reference in outer {
                        let unbound = reference.resolve_column_references(ranges, Vec::new())?;
                        unresolved.extend(bound_columns(&reference));
                        unresolved.extend(unbound);
                        bound.push(reference);
                    }
                    sq.with_plan_mut(|plan| plan.bind_outer_references(&bound));
                    self.set_correlated();
                }
                return Ok(unresolved);
            }

            ExprKind::Row
            | ExprKind::Array { .. }
            | ExprKind::Binary(_)
            | ExprKind::Unary(_)
            | ExprKind::Function(_)
            | ExprKind::Routine(_)
            | ExprKind::Aggregate(_)
            | ExprKind::NextValue { .. } => {
                for child in self.children_mut() {
                    unresolved = child.resolve_column_references(ranges, unresolved)?;
                }
            }
        }

        self.is_aggregate = matches!(self.kind, ExprKind::Aggregate(_))
            || self.children().any(|child| child.is_aggregate);
        Ok(unresolved)
    }

    /// Resolve against `ranges` and fail on the first reference left unbound
    pub fn resolve_columns(&mut self, ranges: &[RangeVariable]) -> ExpressionResult<()> {
        let unresolved = self.resolve_column_references(ranges, Vec::new())?;
        check_columns_resolved(&unresolved)
    }
}

/// Bind to the first range exposing the column under a matching qualifier
fn bind_column(col: &mut ColumnRef, ranges: &[RangeVariable]) {
    for range in ranges {
        if !range.matches_qualifier(col.table.as_deref()) {
            continue;
        }
        if let Some(column_index) = range.find_column(&col.name) {
            let data_type = range.columns[column_index].data_type.clone();
            trace!(
                "Bound column {} to range {} ({}) index {}",
                col.display_name(),
                range.position,
                range.qualifier(),
                column_index
            );
            col.binding = Some(ColumnBinding {
                range_position: range.position,
                column_index,
                data_type,
            });
            return;
        }
    }
}

/// Column references of `expr` that carry a binding
fn bound_columns(expr: &Expression) -> impl Iterator<Item = Expression> {
    expr.collect_all_expressions(COLUMN_SET, &[])
        .into_iter()
        .filter(|e| e.column_ref().is_some_and(|c| c.is_bound()))
}

/// Report the first still-unbound column of an accumulator
pub fn check_columns_resolved(unresolved: &[Expression]) -> ExpressionResult<()> {
    match unresolved.iter().find_map(|e| e.column_ref().filter(|c| !c.is_bound())) {
        Some(col) => Err(ExpressionError::UnresolvedColumn {
            name: col.display_name(),
        }),
        None => Ok(()),
    }
}
