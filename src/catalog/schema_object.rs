//! Schema objects referenced from expressions and their lookup.

use crate::access::{DataType, RangeColumn, RangeVariable, Value};
use crate::expression::{ExpressionError, ExpressionResult};
use crate::session::SessionServices;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Name of a schema object referenced by an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectName {
    Column {
        table: Option<String>,
        column: String,
    },
    Sequence(String),
    Routine(String),
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectName::Column {
                table: Some(table),
                column,
            } => write!(f, "{}.{}", table, column),
            ObjectName::Column { table: None, column } => write!(f, "{}", column),
            ObjectName::Sequence(name) | ObjectName::Routine(name) => write!(f, "{}", name),
        }
    }
}

/// How much SQL a routine body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataAccess {
    NoSql,
    ContainsSql,
    ReadsSql,
    ModifiesSql,
}

/// Metadata of a user-defined routine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineInfo {
    pub name: String,
    pub deterministic: bool,
    pub data_access: DataAccess,
    pub return_type: DataType,
}

impl RoutineInfo {
    pub fn new(name: impl Into<String>, return_type: DataType) -> Self {
        Self {
            name: name.into(),
            deterministic: true,
            data_access: DataAccess::NoSql,
            return_type,
        }
    }

    pub fn non_deterministic(mut self) -> Self {
        self.deterministic = false;
        self
    }

    pub fn with_data_access(mut self, data_access: DataAccess) -> Self {
        self.data_access = data_access;
        self
    }

    /// True when the routine reads or modifies SQL data
    pub fn has_side_effects(&self) -> bool {
        matches!(self.data_access, DataAccess::ReadsSql | DataAccess::ModifiesSql)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    pub name: String,
    pub start: i64,
    pub increment: i64,
}

/// A resolved schema object
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaObject {
    Column { table: String, column: RangeColumn },
    Sequence(SequenceInfo),
    Routine(RoutineInfo),
}

/// Resolves referenced names to schema objects
pub trait SchemaLookup {
    fn lookup(&self, name: &ObjectName) -> Option<SchemaObject>;
}

pub type RoutineBody = Arc<dyn Fn(&[Value]) -> ExpressionResult<Value> + Send + Sync>;

struct RoutineEntry {
    info: RoutineInfo,
    body: RoutineBody,
}

struct SequenceEntry {
    info: SequenceInfo,
    next: AtomicI64,
}

/// In-memory schema registry
#[derive(Default)]
pub struct InMemorySchema {
    tables: DashMap<String, Vec<RangeColumn>>,
    sequences: DashMap<String, SequenceEntry>,
    routines: DashMap<String, RoutineEntry>,
}

fn key(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: Vec<RangeColumn>) {
        self.tables.insert(key(name), columns);
    }

    pub fn create_sequence(&self, name: &str, start: i64, increment: i64) {
        self.sequences.insert(
            key(name),
            SequenceEntry {
                info: SequenceInfo {
                    name: name.to_string(),
                    start,
                    increment,
                },
                next: AtomicI64::new(start),
            },
        );
    }

    pub fn create_routine(&self, info: RoutineInfo, body: RoutineBody) {
        self.routines.insert(key(&info.name), RoutineEntry { info, body });
    }

    /// Build a range variable over a registered table
    pub fn range_variable(&self, table: &str, position: usize) -> Option<RangeVariable> {
        self.tables
            .get(&key(table))
            .map(|columns| RangeVariable::new(position, table, columns.clone()))
    }

    pub fn routine(&self, name: &str) -> Option<RoutineInfo> {
        self.routines.get(&key(name)).map(|entry| entry.info.clone())
    }
}

impl SchemaLookup for InMemorySchema {
    fn lookup(&self, name: &ObjectName) -> Option<SchemaObject> {
        match name {
            ObjectName::Column { table, column } => {
                let find = |table_name: &str, columns: &[RangeColumn]| {
                    columns
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(column))
                        .map(|c| SchemaObject::Column {
                            table: table_name.to_string(),
                            column: c.clone(),
                        })
                };
                match table {
                    Some(table) => self
                        .tables
                        .get(&key(table))
                        .and_then(|columns| find(table, columns.value())),
                    None => self
                        .tables
                        .iter()
                        .find_map(|entry| find(entry.key(), entry.value())),
                }
            }
            ObjectName::Sequence(sequence) => self
                .sequences
                .get(&key(sequence))
                .map(|entry| SchemaObject::Sequence(entry.info.clone())),
            ObjectName::Routine(routine) => self.routine(routine).map(SchemaObject::Routine),
        }
    }
}

impl SessionServices for InMemorySchema {
    fn invoke_routine(&self, name: &str, args: &[Value]) -> ExpressionResult<Value> {
        let body = self
            .routines
            .get(&key(name))
            .map(|entry| entry.body.clone())
            .ok_or_else(|| ExpressionError::UnknownFunction {
                name: name.to_string(),
            })?;
        body(args)
    }

    fn next_sequence_value(&self, name: &str) -> ExpressionResult<Value> {
        let entry = self.sequences.get(&key(name)).ok_or_else(|| {
            ExpressionError::EvaluationError {
                message: format!("Sequence {} does not exist", name),
            }
        })?;
        let value = entry.next.fetch_add(entry.info.increment, Ordering::SeqCst);
        Ok(Value::Int64(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> InMemorySchema {
        let schema = InMemorySchema::new();
        schema.create_table(
            "employees",
            vec![
                RangeColumn::new("id", DataType::Int32),
                RangeColumn::generated("id_label", DataType::Varchar),
            ],
        );
        schema.create_sequence("emp_seq", 100, 10);
        schema.create_routine(
            RoutineInfo::new("double_it", DataType::Int32),
            Arc::new(|args: &[Value]| match args {
                [Value::Int32(v)] => Ok(Value::Int32(v * 2)),
                _ => Err(ExpressionError::EvaluationError {
                    message: "bad args".to_string(),
                }),
            }),
        );
        schema
    }

    #[test]
    fn test_lookup_objects() {
        let schema = schema();
        assert!(matches!(
            schema.lookup(&ObjectName::Column {
                table: Some("EMPLOYEES".into()),
                column: "ID_LABEL".into()
            }),
            Some(SchemaObject::Column { column, .. }) if column.generated
        ));
        assert!(matches!(
            schema.lookup(&ObjectName::Sequence("emp_seq".into())),
            Some(SchemaObject::Sequence(_))
        ));
        assert!(matches!(
            schema.lookup(&ObjectName::Routine("DOUBLE_IT".into())),
            Some(SchemaObject::Routine(info)) if info.deterministic
        ));
        assert!(schema.lookup(&ObjectName::Routine("missing".into())).is_none());
    }

    #[test]
    fn test_sequence_values_advance() {
        let schema = schema();
        assert_eq!(schema.next_sequence_value("emp_seq").unwrap(), Value::Int64(100));
        assert_eq!(schema.next_sequence_value("EMP_SEQ").unwrap(), Value::Int64(110));
        assert!(schema.next_sequence_value("other").is_err());
    }

    #[test]
    fn test_invoke_routine() {
        let schema = schema();
        assert_eq!(
            schema.invoke_routine("double_it", &[Value::Int32(21)]).unwrap(),
            Value::Int32(42)
        );
        assert!(matches!(
            schema.invoke_routine("nope", &[]),
            Err(ExpressionError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_range_variable_from_table() {
        let schema = schema();
        let range = schema.range_variable("employees", 3).unwrap();
        assert_eq!(range.position, 3);
        assert_eq!(range.find_column("id"), Some(0));
        assert!(schema.range_variable("missing", 0).is_none());
    }

    #[test]
    fn test_routine_side_effects() {
        let info =
            RoutineInfo::new("audit", DataType::Int32).with_data_access(DataAccess::ModifiesSql);
        assert!(info.has_side_effects());
        assert!(!RoutineInfo::new("pure", DataType::Int32).has_side_effects());
    }
}
