//! Access layer types shared by the expression engine.
//!
//! - **Value** / **DataType**: runtime values and their SQL types
//! - **RangeVariable**: a tuple source that column references bind against
//! - **RangeContext**: the row currently positioned under each range during evaluation

pub mod range;
pub mod value;

pub use range::{RangeColumn, RangeContext, RangeIterators, RangeVariable};
pub use value::{DataType, Value, MICROS_PER_DAY};
