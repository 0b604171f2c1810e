//! Tree walks over expressions: collection, rewriting and structural checks.
//!
//! Every walk visits the children in order, then the nested plan of an owned
//! subquery. Vacant child slots are skipped.

use crate::catalog::ObjectName;
use crate::expression::determinism::ConstraintKind;
use crate::expression::expr::{ColumnRef, ExprKind, Expression, OpType, SUBQUERY_AGGREGATE_SET};
use crate::expression::subquery::SubQuery;
use crate::expression::{ExpressionError, ExpressionResult};
use std::collections::BTreeSet;

impl Expression {
    /// Nodes (self included) whose kind is in `filter`, in post-order.
    ///
    /// Subtrees rooted at a kind in `stop` are skipped entirely.
    pub fn collect_all_expressions(&self, filter: &[OpType], stop: &[OpType]) -> Vec<Expression> {
        let mut out = Vec::new();
        self.collect_into(filter, stop, &mut out);
        out
    }

    pub(crate) fn collect_into(
        &self,
        filter: &[OpType],
        stop: &[OpType],
        out: &mut Vec<Expression>,
    ) {
        let op_type = self.op_type();
        if stop.contains(&op_type) {
            return;
        }
        for child in self.children() {
            child.collect_into(filter, stop, out);
        }
        if filter.contains(&op_type) {
            out.push(self.clone());
        }
        if let Some(sq) = self.subquery() {
            sq.with_plan(|plan| plan.collect_all_expressions(filter, stop, out));
        }
    }

    /// True if any node of a kind in `filter` is reachable without crossing `stop`
    pub fn contains_kind(&self, filter: &[OpType], stop: &[OpType]) -> bool {
        !self.collect_all_expressions(filter, stop).is_empty()
    }

    /// Rewrite columns bound to `range_position` into copies of
    /// `replacements[column_index]`
    pub fn replace_column_references(
        &mut self,
        range_position: usize,
        replacements: &[Expression],
    ) {
        if self.range_position() == Some(range_position) {
            let replacement = self
                .column_index()
                .and_then(|index| replacements.get(index))
                .cloned();
            if let Some(mut replacement) = replacement {
                if replacement.alias.is_none() {
                    replacement.alias = self.alias.take();
                }
                *self = replacement;
            }
            return;
        }
        for child in self.children_mut() {
            child.replace_column_references(range_position, replacements);
        }
        if let Some(sq) = self.subquery() {
            sq.with_plan_mut(|plan| plan.replace_column_references(range_position, replacements));
        }
    }

    /// Columns, sequences and routines referenced anywhere in the tree
    pub fn collect_object_names(&self) -> Vec<ObjectName> {
        let mut names = Vec::new();
        self.collect_object_names_into(&mut names);
        names
    }

    fn collect_object_names_into(&self, names: &mut Vec<ObjectName>) {
        let name = match &self.kind {
            ExprKind::Column(ColumnRef { table, name, .. }) => Some(ObjectName::Column {
                table: table.clone(),
                column: name.clone(),
            }),
            ExprKind::NextValue { sequence } => Some(ObjectName::Sequence(sequence.clone())),
            ExprKind::Routine(info) => Some(ObjectName::Routine(info.name.clone())),
            _ => None,
        };
        if let Some(name) = name {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        for child in self.children() {
            child.collect_object_names_into(names);
        }
        if let Some(sq) = self.subquery() {
            let mut nested = Vec::new();
            sq.with_plan(|plan| plan.collect_object_names(&mut nested));
            for name in nested {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }

    /// True if the tree reads from `range_position`
    pub fn has_reference(&self, range_position: usize) -> bool {
        if self.range_position() == Some(range_position) {
            return true;
        }
        if self.children().any(|child| child.has_reference(range_position)) {
            return true;
        }
        self.subquery()
            .is_some_and(|sq| sq.with_plan(|plan| plan.has_reference(range_position)))
    }

    /// Range positions read by bound columns, ascending
    pub fn collect_range_positions(&self) -> Vec<usize> {
        let mut positions = BTreeSet::new();
        self.collect_range_positions_into(&mut positions);
        positions.into_iter().collect()
    }

    fn collect_range_positions_into(&self, positions: &mut BTreeSet<usize>) {
        if let Some(position) = self.range_position() {
            positions.insert(position);
        }
        for child in self.children() {
            child.collect_range_positions_into(positions);
        }
    }

    /// Replace every subtree equal to `expressions[i]` with `replacements[i]`.
    ///
    /// Used once the executor has computed grouping keys or aggregates into a
    /// row of its own; the replacements are usually `SimpleColumn` lookups.
    pub fn convert_to_simple_column(
        &mut self,
        expressions: &[Expression],
        replacements: &[Expression],
    ) {
        if self.op_type() == OpType::Value {
            return;
        }
        let found = expressions
            .iter()
            .position(|e| e == &*self)
            .and_then(|index| replacements.get(index))
            .cloned();
        if let Some(mut replacement) = found {
            if replacement.alias.is_none() {
                replacement.alias = self.alias.take();
            }
            if replacement.data_type.is_none() {
                replacement.data_type = self.data_type.take();
            }
            *self = replacement;
            return;
        }
        for child in self.children_mut() {
            child.convert_to_simple_column(expressions, replacements);
        }
        let is_aggregate = self.children().any(|child| child.is_aggregate);
        self.is_aggregate = is_aggregate;
    }

    /// Whether the tree is built only from literals, kinds in `exclude` and
    /// members of `expressions`. Aggregates and subqueries never are.
    pub fn is_composed_of(&self, expressions: &[Expression], exclude: &[OpType]) -> bool {
        let op_type = self.op_type();
        if op_type == OpType::Value || exclude.contains(&op_type) {
            return true;
        }
        if expressions.iter().any(|e| e == self) {
            return true;
        }
        match &self.kind {
            ExprKind::Aggregate(_)
            | ExprKind::RowSubquery(_)
            | ExprKind::TableSubquery(_)
            | ExprKind::ArraySubquery(_)
            | ExprKind::Column(_)
            | ExprKind::SimpleColumn { .. }
            | ExprKind::NextValue { .. } => false,
            // the statement clock is fixed per statement; RANDOM() is not
            ExprKind::Function(function)
                if !function.is_deterministic() && !function.is_current_datetime() =>
            {
                false
            }
            ExprKind::Routine(info) if !info.deterministic => false,
            ExprKind::Function(_) | ExprKind::Routine(_) if self.nodes.is_empty() => true,
            _ => {
                !self.nodes.is_empty()
                    && self
                        .children()
                        .all(|child| child.is_composed_of(expressions, exclude))
            }
        }
    }

    /// True if a built-in function or routine in the tree is not deterministic
    pub fn has_non_deterministic_function(&self) -> bool {
        let own = match &self.kind {
            ExprKind::Function(function) => !function.is_deterministic(),
            ExprKind::Routine(info) => !info.deterministic,
            _ => false,
        };
        own || self
            .children()
            .any(|child| child.has_non_deterministic_function())
    }

    /// Subquery handles in the tree, innermost first, each once
    pub fn collect_all_subqueries(&self) -> Vec<SubQuery> {
        let mut out: Vec<SubQuery> = Vec::new();
        self.collect_subqueries_into(&mut out);
        out
    }

    fn collect_subqueries_into(&self, out: &mut Vec<SubQuery>) {
        for child in self.children() {
            child.collect_subqueries_into(out);
        }
        if let Some(sq) = self.subquery() {
            let mut nested = Vec::new();
            sq.with_plan(|plan| plan.collect_subqueries(&mut nested));
            nested.push(sq.clone());
            for handle in nested {
                if !out.iter().any(|existing| existing.same_handle(&handle)) {
                    out.push(handle);
                }
            }
        }
    }

    /// Reject aggregates and subqueries in a CHECK constraint
    pub fn check_valid_check_constraint(&self) -> ExpressionResult<()> {
        self.check_no_subquery_or_aggregate(ConstraintKind::Check)
    }

    pub(crate) fn check_no_subquery_or_aggregate(
        &self,
        constraint: ConstraintKind,
    ) -> ExpressionResult<()> {
        let found = self.collect_all_expressions(SUBQUERY_AGGREGATE_SET, &[]);
        match found.first().map(|e| e.op_type()) {
            None => Ok(()),
            Some(OpType::Aggregate) => Err(ExpressionError::DisallowedConstruct {
                construct: "aggregate function".to_string(),
                constraint,
            }),
            Some(_) => Err(ExpressionError::DisallowedConstruct {
                construct: "subquery".to_string(),
                constraint,
            }),
        }
    }

    /// Columns read from ranges not in `keyed_ranges`.
    ///
    /// A grouped query may select any column of a range whose key is among
    /// the grouping columns; the remaining columns must be grouped themselves.
    pub fn get_unkeyed_columns(&self, keyed_ranges: &[usize]) -> Vec<Expression> {
        let mut out = Vec::new();
        self.collect_unkeyed_into(keyed_ranges, &mut out);
        out
    }

    fn collect_unkeyed_into(&self, keyed_ranges: &[usize], out: &mut Vec<Expression>) {
        match self.op_type() {
            OpType::Column | OpType::SimpleColumn => {
                let keyed = self
                    .range_position()
                    .is_some_and(|position| keyed_ranges.contains(&position));
                if !keyed && !out.contains(self) {
                    out.push(self.clone());
                }
            }
            _ => {
                for child in self.children() {
                    child.collect_unkeyed_into(keyed_ranges, out);
                }
            }
        }
    }
}
