//! Subquery handles and the nested plan contract they wrap.

use crate::access::{DataType, Value};
use crate::catalog::ObjectName;
use crate::expression::coercion::TypeRegistry;
use crate::expression::{Expression, ExpressionError, ExpressionResult, OpType};
use crate::session::Session;
use log::debug;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Positionable cursor over a materialized row set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSetNavigator {
    rows: Vec<Vec<Value>>,
    position: usize,
}

impl RowSetNavigator {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows, position: 0 }
    }

    pub fn before_first(&mut self) {
        self.position = 0;
    }

    pub fn has_next(&self) -> bool {
        self.position < self.rows.len()
    }

    pub fn next_row(&mut self) -> Option<&[Value]> {
        let row = self.rows.get(self.position)?;
        self.position += 1;
        Some(row)
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

/// The query plan behind a subquery expression.
///
/// Implemented by the surrounding query compiler. Traversal hooks default to
/// no-ops for plans that expose no expressions.
pub trait NestedPlan: fmt::Debug + Send {
    /// Bind the plan's own column references, returning the ones that need
    /// an enclosing scope.
    fn resolve_column_references(&mut self) -> ExpressionResult<Vec<Expression>>;

    fn resolve_types(&mut self, registry: &dyn TypeRegistry) -> ExpressionResult<()>;

    fn column_types(&self) -> Vec<DataType>;

    fn column_count(&self) -> usize {
        self.column_types().len()
    }

    /// Execute the plan. Correlated plans read outer rows from `session`.
    fn materialize(&mut self, session: &Session, correlated: bool)
        -> ExpressionResult<RowSetNavigator>;

    fn is_equivalent(&self, other: &dyn NestedPlan) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn to_sql(&self) -> String {
        String::new()
    }

    fn describe(&self, _indent: usize) -> String {
        String::new()
    }

    fn collect_all_expressions(
        &self,
        _filter: &[OpType],
        _stop: &[OpType],
        _out: &mut Vec<Expression>,
    ) {
    }

    fn collect_object_names(&self, _out: &mut Vec<ObjectName>) {}

    fn collect_subqueries(&self, _out: &mut Vec<SubQuery>) {}

    /// Receives the references returned by `resolve_column_references`
    /// after the enclosing scope has bound them
    fn bind_outer_references(&mut self, _references: &[Expression]) {}

    fn replace_column_references(&mut self, _range_position: usize, _replacements: &[Expression]) {}

    fn has_reference(&self, _range_position: usize) -> bool {
        false
    }
}

struct SubQueryState {
    plan: Box<dyn NestedPlan>,
    correlated: bool,
    column_types: Option<Vec<DataType>>,
    navigator: Option<RowSetNavigator>,
    materializations: usize,
}

/// Shared handle from an expression to a nested plan and its materialized rows.
///
/// Cloning the handle (as `Expression::duplicate` does) shares the plan and
/// its materialization.
#[derive(Clone)]
pub struct SubQuery {
    inner: Arc<Mutex<SubQueryState>>,
}

impl SubQuery {
    pub fn new(plan: impl NestedPlan + 'static) -> Self {
        Self::from_boxed(Box::new(plan))
    }

    pub fn from_boxed(plan: Box<dyn NestedPlan>) -> Self {
        SubQuery {
            inner: Arc::new(Mutex::new(SubQueryState {
                plan,
                correlated: false,
                column_types: None,
                navigator: None,
                materializations: 0,
            })),
        }
    }

    pub fn is_correlated(&self) -> bool {
        self.inner.lock().correlated
    }

    pub fn set_correlated(&self) {
        let mut state = self.inner.lock();
        if !state.correlated {
            debug!("Subquery {} is correlated", state.plan.to_sql());
            state.correlated = true;
        }
    }

    /// Unbound references of the nested plan (empty when fully resolved)
    pub fn resolve_column_references(&self) -> ExpressionResult<Vec<Expression>> {
        self.inner.lock().plan.resolve_column_references()
    }

    pub fn resolve_types(&self, registry: &dyn TypeRegistry) -> ExpressionResult<()> {
        self.inner.lock().plan.resolve_types(registry)
    }

    /// Fix the result table shape and return its column types
    pub fn prepare_table(&self) -> ExpressionResult<Vec<DataType>> {
        let mut state = self.inner.lock();
        let types = state.plan.column_types();
        if types.is_empty() {
            return Err(ExpressionError::degree_mismatch(1, 0, "subquery select list"));
        }
        state.column_types = Some(types.clone());
        Ok(types)
    }

    pub fn column_types(&self) -> Vec<DataType> {
        let state = self.inner.lock();
        state
            .column_types
            .clone()
            .unwrap_or_else(|| state.plan.column_types())
    }

    pub fn column_count(&self) -> usize {
        let state = self.inner.lock();
        match &state.column_types {
            Some(types) => types.len(),
            None => state.plan.column_count(),
        }
    }

    /// Build the row set if it is missing, or always when correlated
    pub fn materialize(&self, session: &Session) -> ExpressionResult<()> {
        let mut state = self.inner.lock();
        if state.navigator.is_some() && !state.correlated {
            return Ok(());
        }
        let correlated = state.correlated;
        let navigator = state.plan.materialize(session, correlated)?;
        state.materializations += 1;
        debug!(
            "Materialized {} subquery {} ({} rows)",
            if correlated { "correlated" } else { "uncorrelated" },
            state.plan.to_sql(),
            navigator.size()
        );
        state.navigator = Some(navigator);
        Ok(())
    }

    /// Run `f` over the materialized navigator, positioned before the first row
    pub fn with_navigator<R>(
        &self,
        f: impl FnOnce(&mut RowSetNavigator) -> R,
    ) -> ExpressionResult<R> {
        let mut state = self.inner.lock();
        let navigator = state.navigator.as_mut().ok_or_else(|| {
            ExpressionError::internal("subquery", "navigator read before materialization")
        })?;
        navigator.before_first();
        Ok(f(navigator))
    }

    /// Values of the first row; NULLs when empty.
    ///
    /// With `single_row`, more than one row is a cardinality violation.
    pub fn values(&self, single_row: bool) -> ExpressionResult<Vec<Value>> {
        let degree = self.column_count();
        self.with_navigator(|nav| {
            if single_row && nav.size() > 1 {
                return Err(ExpressionError::CardinalityViolation { rows: nav.size() });
            }
            Ok(nav
                .next_row()
                .map(|row| row.to_vec())
                .unwrap_or_else(|| vec![Value::Null; degree]))
        })?
    }

    /// Drop the cached row set; the owning statement has finished
    pub fn release(&self) {
        self.inner.lock().navigator = None;
    }

    pub fn is_materialized(&self) -> bool {
        self.inner.lock().navigator.is_some()
    }

    /// Number of times the nested plan has been executed
    pub fn materialization_count(&self) -> usize {
        self.inner.lock().materializations
    }

    /// True when both handles refer to the same subquery
    pub fn same_handle(&self, other: &SubQuery) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_equivalent(&self, other: &SubQuery) -> bool {
        if self.same_handle(other) {
            return true;
        }
        // lock in address order so concurrent comparisons cannot deadlock
        let self_first = Arc::as_ptr(&self.inner) < Arc::as_ptr(&other.inner);
        let (first, second) = if self_first {
            (&self.inner, &other.inner)
        } else {
            (&other.inner, &self.inner)
        };
        let first = first.lock();
        let second = second.lock();
        let (this, that) = if self_first {
            (&first, &second)
        } else {
            (&second, &first)
        };
        this.plan.is_equivalent(that.plan.as_ref())
    }

    pub fn with_plan<R>(&self, f: impl FnOnce(&dyn NestedPlan) -> R) -> R {
        f(self.inner.lock().plan.as_ref())
    }

    pub fn with_plan_mut<R>(&self, f: impl FnOnce(&mut dyn NestedPlan) -> R) -> R {
        f(self.inner.lock().plan.as_mut())
    }

    pub fn to_sql(&self) -> String {
        self.inner.lock().plan.to_sql()
    }
}

impl fmt::Debug for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SubQuery")
            .field("plan", &state.plan)
            .field("correlated", &state.correlated)
            .field("materialized", &state.navigator.is_some())
            .finish()
    }
}

/// Nested plan over a fixed row set, such as a constant derived table
#[derive(Debug, Clone, PartialEq)]
pub struct StaticPlan {
    sql: String,
    column_types: Vec<DataType>,
    rows: Vec<Vec<Value>>,
}

impl StaticPlan {
    pub fn new(column_types: Vec<DataType>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            sql: String::new(),
            column_types,
            rows,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }
}

impl NestedPlan for StaticPlan {
    fn resolve_column_references(&mut self) -> ExpressionResult<Vec<Expression>> {
        Ok(Vec::new())
    }

    fn resolve_types(&mut self, _registry: &dyn TypeRegistry) -> ExpressionResult<()> {
        Ok(())
    }

    fn column_types(&self) -> Vec<DataType> {
        self.column_types.clone()
    }

    fn materialize(
        &mut self,
        _session: &Session,
        _correlated: bool,
    ) -> ExpressionResult<RowSetNavigator> {
        Ok(RowSetNavigator::new(self.rows.clone()))
    }

    fn is_equivalent(&self, other: &dyn NestedPlan) -> bool {
        other
            .as_any()
            .downcast_ref::<StaticPlan>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_sql(&self) -> String {
        self.sql.clone()
    }

    fn describe(&self, indent: usize) -> String {
        format!(
            "{}STATIC ROWS = {}, COLUMNS = {}\n",
            " ".repeat(indent),
            self.rows.len(),
            self.column_types.len()
        )
    }
}
