//! Expression tree nodes.

use crate::access::{DataType, Value};
use crate::catalog::RoutineInfo;
use crate::expression::coercion::TypeRegistry;
use crate::expression::function::{AggregateFunction, SqlFunction};
use crate::expression::operator::{BinaryOperator, UnaryOperator};
use crate::expression::subquery::SubQuery;
use crate::expression::{ExpressionError, ExpressionResult};
use std::hash::{Hash, Hasher};

/// Child slot of the left operand of a binary node
pub const LEFT: usize = 0;
/// Child slot of the right operand of a binary node
pub const RIGHT: usize = 1;

/// Where a resolved column reference reads its value from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnBinding {
    pub range_position: usize,
    pub column_index: usize,
    pub data_type: DataType,
}

/// Column reference in an expression
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Qualifier as written (`e` in `e.salary`)
    pub table: Option<String>,
    pub name: String,
    /// Set by the resolver
    pub binding: Option<ColumnBinding>,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
            binding: None,
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
            binding: None,
        }
    }

    /// Name used in messages: `table.column` or `column`
    pub fn display_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    fn same_reference(&self, other: &ColumnRef) -> bool {
        match (&self.binding, &other.binding) {
            (Some(a), Some(b)) => {
                a.range_position == b.range_position && a.column_index == b.column_index
            }
            (None, None) => {
                self.name.eq_ignore_ascii_case(&other.name)
                    && match (&self.table, &other.table) {
                        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

/// Node kind with its per-kind payload
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Literal constant
    Value(Value),
    /// Named column reference, bound by the resolver
    Column(ColumnRef),
    /// Direct lookup into the row positioned under a range
    SimpleColumn {
        range_position: usize,
        column_index: usize,
    },
    /// Row constructor `(a, b, ...)`
    Row,
    /// Value list `VALUES (..), (..)`; every child is a `Row`
    Table,
    /// Array constructor; `element_type` is the declared type, if any
    Array { element_type: Option<DataType> },
    RowSubquery(SubQuery),
    TableSubquery(SubQuery),
    ArraySubquery(SubQuery),
    Binary(BinaryOperator),
    Unary(UnaryOperator),
    Function(SqlFunction),
    Routine(RoutineInfo),
    Aggregate(AggregateFunction),
    /// `NEXT VALUE FOR sequence`
    NextValue { sequence: String },
}

/// Payload-free tag of an [`ExprKind`], used for kind sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Value,
    Column,
    SimpleColumn,
    Row,
    Table,
    Array,
    RowSubquery,
    TableSubquery,
    ArraySubquery,
    Binary,
    Unary,
    Function,
    Routine,
    Aggregate,
    NextValue,
}

pub const EMPTY_SET: &[OpType] = &[];
pub const AGGREGATE_SET: &[OpType] = &[OpType::Aggregate];
pub const COLUMN_SET: &[OpType] = &[OpType::Column, OpType::SimpleColumn];
pub const FUNCTION_SET: &[OpType] = &[OpType::Function, OpType::Routine];
pub const SUBQUERY_SET: &[OpType] = &[
    OpType::RowSubquery,
    OpType::TableSubquery,
    OpType::ArraySubquery,
];
pub const SUBQUERY_AGGREGATE_SET: &[OpType] = &[
    OpType::Aggregate,
    OpType::RowSubquery,
    OpType::TableSubquery,
    OpType::ArraySubquery,
];

impl ExprKind {
    pub fn op_type(&self) -> OpType {
        match self {
            ExprKind::Value(_) => OpType::Value,
            ExprKind::Column(_) => OpType::Column,
            ExprKind::SimpleColumn { .. } => OpType::SimpleColumn,
            ExprKind::Row => OpType::Row,
            ExprKind::Table => OpType::Table,
            ExprKind::Array { .. } => OpType::Array,
            ExprKind::RowSubquery(_) => OpType::RowSubquery,
            ExprKind::TableSubquery(_) => OpType::TableSubquery,
            ExprKind::ArraySubquery(_) => OpType::ArraySubquery,
            ExprKind::Binary(_) => OpType::Binary,
            ExprKind::Unary(_) => OpType::Unary,
            ExprKind::Function(_) => OpType::Function,
            ExprKind::Routine(_) => OpType::Routine,
            ExprKind::Aggregate(_) => OpType::Aggregate,
            ExprKind::NextValue { .. } => OpType::NextValue,
        }
    }

    pub fn subquery(&self) -> Option<&SubQuery> {
        match self {
            ExprKind::RowSubquery(sq)
            | ExprKind::TableSubquery(sq)
            | ExprKind::ArraySubquery(sq) => Some(sq),
            _ => None,
        }
    }

    fn same_kind(&self, other: &ExprKind) -> bool {
        match (self, other) {
            (ExprKind::Value(a), ExprKind::Value(b)) => a == b,
            (ExprKind::Column(a), ExprKind::Column(b)) => a.same_reference(b),
            (
                ExprKind::SimpleColumn {
                    range_position: ra,
                    column_index: ca,
                },
                ExprKind::SimpleColumn {
                    range_position: rb,
                    column_index: cb,
                },
            ) => ra == rb && ca == cb,
            (ExprKind::Row, ExprKind::Row) | (ExprKind::Table, ExprKind::Table) => true,
            (ExprKind::Array { element_type: a }, ExprKind::Array { element_type: b }) => a == b,
            (ExprKind::RowSubquery(a), ExprKind::RowSubquery(b))
            | (ExprKind::TableSubquery(a), ExprKind::TableSubquery(b))
            | (ExprKind::ArraySubquery(a), ExprKind::ArraySubquery(b)) => a.is_equivalent(b),
            (ExprKind::Binary(a), ExprKind::Binary(b)) => a == b,
            (ExprKind::Unary(a), ExprKind::Unary(b)) => a == b,
            (ExprKind::Function(a), ExprKind::Function(b)) => a == b,
            (ExprKind::Routine(a), ExprKind::Routine(b)) => a.name.eq_ignore_ascii_case(&b.name),
            (ExprKind::Aggregate(a), ExprKind::Aggregate(b)) => a == b,
            (ExprKind::NextValue { sequence: a }, ExprKind::NextValue { sequence: b }) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => false,
        }
    }

    /// Hashes the subtype qualifier only; literal values and subquery
    /// internals do not take part.
    fn hash_subtype<H: Hasher>(&self, state: &mut H) {
        match self {
            ExprKind::SimpleColumn {
                range_position,
                column_index,
            } => {
                range_position.hash(state);
                column_index.hash(state);
            }
            ExprKind::Array { element_type } => element_type.hash(state),
            ExprKind::Binary(op) => op.hash(state),
            ExprKind::Unary(op) => op.hash(state),
            ExprKind::Function(f) => f.hash(state),
            ExprKind::Routine(info) => info.name.to_ascii_uppercase().hash(state),
            ExprKind::Aggregate(f) => f.hash(state),
            ExprKind::NextValue { sequence } => sequence.to_ascii_uppercase().hash(state),
            ExprKind::Value(_)
            | ExprKind::Column(_)
            | ExprKind::Row
            | ExprKind::Table
            | ExprKind::RowSubquery(_)
            | ExprKind::TableSubquery(_)
            | ExprKind::ArraySubquery(_) => {}
        }
    }
}

/// Expression tree node.
///
/// Children live in `nodes`; a slot may be vacant. Cloning is a deep copy of
/// the tree that shares subquery handles.
#[derive(Debug, Clone)]
pub struct Expression {
    pub(crate) kind: ExprKind,
    pub(crate) nodes: Vec<Option<Expression>>,
    pub(crate) data_type: Option<DataType>,
    pub(crate) node_data_types: Option<Vec<Option<DataType>>>,
    pub(crate) alias: Option<String>,
    pub(crate) is_aggregate: bool,
    pub(crate) is_correlated: bool,
}

impl Expression {
    pub fn new(kind: ExprKind, nodes: Vec<Expression>) -> Self {
        let is_aggregate = matches!(kind, ExprKind::Aggregate(_))
            || nodes.iter().any(|node| node.is_aggregate);
        Self {
            kind,
            nodes: nodes.into_iter().map(Some).collect(),
            data_type: None,
            node_data_types: None,
            alias: None,
            is_aggregate,
            is_correlated: false,
        }
    }

    /// Create a literal expression
    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type();
        let mut expr = Self::new(ExprKind::Value(value), Vec::new());
        expr.data_type = data_type;
        expr
    }

    /// Create a NULL literal with a known type
    pub fn typed_literal(value: Value, data_type: DataType) -> Self {
        let mut expr = Self::new(ExprKind::Value(value), Vec::new());
        expr.data_type = Some(data_type);
        expr
    }

    pub fn null() -> Self {
        Self::literal(Value::Null)
    }

    /// Create an unresolved column reference
    pub fn column(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Column(ColumnRef::new(name)), Vec::new())
    }

    /// Create an unresolved `table.column` reference
    pub fn qualified_column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ExprKind::Column(ColumnRef::qualified(table, name)), Vec::new())
    }

    pub fn simple_column(range_position: usize, column_index: usize) -> Self {
        Self::new(
            ExprKind::SimpleColumn {
                range_position,
                column_index,
            },
            Vec::new(),
        )
    }

    /// Create a row constructor
    pub fn row(items: Vec<Expression>) -> Self {
        Self::new(ExprKind::Row, items)
    }

    /// Create a value list.
    ///
    /// Every item must be a row of the list's degree. With degree 1 scalar
    /// items are accepted and wrapped into single-field rows.
    pub fn value_list(items: Vec<Expression>) -> ExpressionResult<Self> {
        let degree = match items.first() {
            Some(first) if matches!(first.kind, ExprKind::Row) => first.nodes.len(),
            Some(_) => 1,
            None => return Err(ExpressionError::degree_mismatch(1, 0, "VALUES list")),
        };
        let rows = items
            .into_iter()
            .map(|item| match item.kind {
                ExprKind::Row if item.nodes.len() == degree => Ok(item),
                ExprKind::Row => Err(ExpressionError::degree_mismatch(
                    degree,
                    item.nodes.len(),
                    "VALUES list",
                )),
                _ if degree == 1 => Ok(Expression::row(vec![item])),
                _ => Err(ExpressionError::degree_mismatch(degree, 1, "VALUES list")),
            })
            .collect::<ExpressionResult<Vec<_>>>()?;
        Ok(Self::new(ExprKind::Table, rows))
    }

    /// Create an array constructor
    pub fn array(items: Vec<Expression>) -> Self {
        Self::new(ExprKind::Array { element_type: None }, items)
    }

    /// Create an array constructor with a declared element type
    pub fn typed_array(items: Vec<Expression>, element_type: DataType) -> Self {
        Self::new(
            ExprKind::Array {
                element_type: Some(element_type),
            },
            items,
        )
    }

    pub fn row_subquery(subquery: SubQuery) -> Self {
        Self::new(ExprKind::RowSubquery(subquery), Vec::new())
    }

    pub fn table_subquery(subquery: SubQuery) -> Self {
        Self::new(ExprKind::TableSubquery(subquery), Vec::new())
    }

    pub fn array_subquery(subquery: SubQuery) -> Self {
        Self::new(ExprKind::ArraySubquery(subquery), Vec::new())
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Binary(op), vec![left, right])
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: Expression) -> Self {
        Self::new(ExprKind::Unary(op), vec![operand])
    }

    /// Create a built-in function call
    pub fn function(function: SqlFunction, args: Vec<Expression>) -> Self {
        Self::new(ExprKind::Function(function), args)
    }

    /// Create a user-defined routine invocation
    pub fn routine(info: RoutineInfo, args: Vec<Expression>) -> Self {
        Self::new(ExprKind::Routine(info), args)
    }

    /// Create an aggregate; `None` is `COUNT(*)`
    pub fn aggregate(function: AggregateFunction, arg: Option<Expression>) -> Self {
        Self::new(ExprKind::Aggregate(function), arg.into_iter().collect())
    }

    pub fn next_value(sequence: impl Into<String>) -> Self {
        Self::new(
            ExprKind::NextValue {
                sequence: sequence.into(),
            },
            Vec::new(),
        )
    }

    pub fn current_date() -> Self {
        Self::function(SqlFunction::CurrentDate, Vec::new())
    }

    pub fn current_timestamp() -> Self {
        Self::function(SqlFunction::CurrentTimestamp, Vec::new())
    }

    pub fn random() -> Self {
        Self::function(SqlFunction::Random, Vec::new())
    }

    /// Create an AND expression
    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::And, left, right)
    }

    /// Create an OR expression
    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Or, left, right)
    }

    /// Create a NOT expression
    pub fn not_expr(operand: Expression) -> Self {
        Self::unary_op(UnaryOperator::Not, operand)
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Eq, left, right)
    }

    pub fn ne(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Ne, left, right)
    }

    pub fn lt(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Lt, left, right)
    }

    pub fn le(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Le, left, right)
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Gt, left, right)
    }

    pub fn ge(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Ge, left, right)
    }

    pub fn add_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Add, left, right)
    }

    pub fn sub_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Sub, left, right)
    }

    pub fn mul_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Mul, left, right)
    }

    pub fn div_expr(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Div, left, right)
    }

    pub fn concat(left: Expression, right: Expression) -> Self {
        Self::binary_op(BinaryOperator::Concat, left, right)
    }

    pub fn is_null(operand: Expression) -> Self {
        Self::unary_op(UnaryOperator::IsNull, operand)
    }

    pub fn is_not_null(operand: Expression) -> Self {
        Self::unary_op(UnaryOperator::IsNotNull, operand)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Deep copy; subquery handles are shared with the original
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn op_type(&self) -> OpType {
        self.kind.op_type()
    }

    pub fn nodes(&self) -> &[Option<Expression>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Expression> {
        self.nodes.get(index).and_then(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Expression> {
        self.nodes.get_mut(index).and_then(|n| n.as_mut())
    }

    /// Present children in order
    pub fn children(&self) -> impl Iterator<Item = &Expression> {
        self.nodes.iter().flatten()
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut Expression> {
        self.nodes.iter_mut().flatten()
    }

    pub fn left(&self) -> Option<&Expression> {
        self.node(LEFT)
    }

    pub fn right(&self) -> Option<&Expression> {
        self.node(RIGHT)
    }

    pub fn set_left(&mut self, expr: Option<Expression>) {
        self.set_node(LEFT, expr);
    }

    pub fn set_right(&mut self, expr: Option<Expression>) {
        self.set_node(RIGHT, expr);
    }

    fn set_node(&mut self, index: usize, expr: Option<Expression>) {
        if self.nodes.len() <= index {
            self.nodes.resize(index + 1, None);
        }
        self.nodes[index] = expr;
    }

    /// Swap the operands of a binary node, flipping a comparison so the
    /// result is unchanged
    pub fn swap_left_and_right(&mut self) {
        if self.nodes.len() < 2 {
            return;
        }
        self.nodes.swap(LEFT, RIGHT);
        if let ExprKind::Binary(op) = &mut self.kind {
            if let Some(flipped) = op.flipped() {
                *op = flipped;
            }
        }
    }

    /// Replace the child at `index`; the replacement inherits its alias
    pub fn replace_node(
        &mut self,
        index: usize,
        mut replacement: Expression,
    ) -> ExpressionResult<()> {
        let slot = self.nodes.get_mut(index).ok_or_else(|| {
            ExpressionError::internal("replace_node", format!("no child slot {}", index))
        })?;
        if let Some(existing) = slot.as_mut() {
            if replacement.alias.is_none() {
                replacement.alias = existing.alias.take();
            }
        }
        *slot = Some(replacement);
        Ok(())
    }

    pub fn data_type(&self) -> Option<&DataType> {
        self.data_type.as_ref()
    }

    /// Assign a type; literals are converted to it through `registry`
    pub fn set_data_type(
        &mut self,
        data_type: DataType,
        registry: &dyn TypeRegistry,
    ) -> ExpressionResult<()> {
        if let ExprKind::Value(value) = &mut self.kind {
            *value = registry.convert(value.clone(), self.data_type.as_ref(), &data_type)?;
        }
        self.data_type = Some(data_type);
        Ok(())
    }

    /// Type of field `index`; scalar nodes report their own type at 0
    pub fn node_data_type(&self, index: usize) -> Option<&DataType> {
        match &self.node_data_types {
            Some(types) => types.get(index).and_then(|t| t.as_ref()),
            None if index == 0 => self.data_type.as_ref(),
            None => None,
        }
    }

    pub fn node_data_types(&self) -> Vec<Option<DataType>> {
        match &self.node_data_types {
            Some(types) => types.clone(),
            None => vec![self.data_type.clone()],
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn set_alias(&mut self, alias: Option<String>) {
        self.alias = alias;
    }

    /// Literal value of a `Value` node
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn column_ref(&self) -> Option<&ColumnRef> {
        match &self.kind {
            ExprKind::Column(col) => Some(col),
            _ => None,
        }
    }

    pub fn subquery(&self) -> Option<&SubQuery> {
        self.kind.subquery()
    }

    /// Range position of a bound column or simple column
    pub fn range_position(&self) -> Option<usize> {
        match &self.kind {
            ExprKind::Column(ColumnRef {
                binding: Some(binding),
                ..
            }) => Some(binding.range_position),
            ExprKind::SimpleColumn { range_position, .. } => Some(*range_position),
            _ => None,
        }
    }

    /// Column index of a bound column or simple column
    pub fn column_index(&self) -> Option<usize> {
        match &self.kind {
            ExprKind::Column(ColumnRef {
                binding: Some(binding),
                ..
            }) => Some(binding.column_index),
            ExprKind::SimpleColumn { column_index, .. } => Some(*column_index),
            _ => None,
        }
    }

    pub fn is_unresolved_column(&self) -> bool {
        matches!(&self.kind, ExprKind::Column(col) if !col.is_bound())
    }

    /// Number of fields the node produces
    pub fn degree(&self) -> usize {
        match &self.kind {
            ExprKind::Row => self.nodes.len(),
            ExprKind::RowSubquery(sq) | ExprKind::TableSubquery(sq) => sq.column_count(),
            _ => 1,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_aggregate
    }

    /// True if this node or any descendant reads an outer range
    pub fn is_correlated(&self) -> bool {
        self.is_correlated
            || self.subquery().is_some_and(|sq| sq.is_correlated())
            || self.children().any(|child| child.is_correlated())
    }

    pub(crate) fn set_correlated(&mut self) {
        self.is_correlated = true;
        if let Some(sq) = self.kind.subquery() {
            sq.set_correlated();
        }
    }

    /// Turn this node into a literal carrying `value`
    pub fn set_as_constant_value(&mut self, value: Value) {
        if self.data_type.is_none() {
            self.data_type = value.data_type();
        }
        self.kind = ExprKind::Value(value);
        self.nodes.clear();
        self.node_data_types = None;
        self.is_aggregate = false;
        self.is_correlated = false;
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        if !self.kind.same_kind(&other.kind) {
            return false;
        }
        if self.kind.subquery().is_some() {
            return true;
        }
        self.data_type == other.data_type && self.nodes == other.nodes
    }
}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.op_type().hash(state);
        self.kind.hash_subtype(state);
        for node in &self.nodes {
            match node {
                Some(node) => node.hash(state),
                None => 0u8.hash(state),
            }
        }
    }
}
