//! Schema objects visible to expressions: columns, sequences and routines.

pub mod schema_object;

pub use schema_object::{
    DataAccess, InMemorySchema, ObjectName, RoutineBody, RoutineInfo, SchemaLookup, SchemaObject,
    SequenceInfo,
};
