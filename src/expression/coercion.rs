//! Type aggregation and value conversion rules.

use crate::access::value::{civil_from_days, MICROS_PER_DAY};
use crate::access::{DataType, Value};
use crate::expression::{ExpressionError, ExpressionResult};

/// 2^63, the first double past the range of i64
const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Coercion rules consulted by the type resolver and the evaluator
pub trait TypeRegistry: Send + Sync {
    /// Common type of two operands. `None` stands for an undefined (NULL) type.
    fn aggregate_type(
        &self,
        a: Option<&DataType>,
        b: Option<&DataType>,
    ) -> ExpressionResult<Option<DataType>>;

    /// Convert `value` (of type `from`) to `to`
    fn convert(&self, value: Value, from: Option<&DataType>, to: &DataType)
        -> ExpressionResult<Value>;
}

/// Default coercion rules: numeric widening, DATE to TIMESTAMP promotion,
/// element-wise array aggregation and string casts.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardTypeRegistry;

impl StandardTypeRegistry {
    pub fn new() -> Self {
        Self
    }

    fn numeric_rank(data_type: &DataType) -> u8 {
        match data_type {
            DataType::Int32 => 1,
            DataType::Int64 => 2,
            DataType::Double => 3,
            _ => 0,
        }
    }
}

impl TypeRegistry for StandardTypeRegistry {
    fn aggregate_type(
        &self,
        a: Option<&DataType>,
        b: Option<&DataType>,
    ) -> ExpressionResult<Option<DataType>> {
        let (a, b) = match (a, b) {
            (None, None) => return Ok(None),
            (Some(t), None) | (None, Some(t)) => return Ok(Some(t.clone())),
            (Some(a), Some(b)) => (a, b),
        };

        if a == b {
            return Ok(Some(a.clone()));
        }

        if a.is_numeric() && b.is_numeric() {
            let wider = if Self::numeric_rank(a) >= Self::numeric_rank(b) {
                a
            } else {
                b
            };
            return Ok(Some(wider.clone()));
        }

        if a.is_datetime() && b.is_datetime() {
            return Ok(Some(DataType::Timestamp));
        }

        if let (
            DataType::Array {
                element: ea,
                max_cardinality: ca,
            },
            DataType::Array {
                element: eb,
                max_cardinality: cb,
            },
        ) = (a, b)
        {
            let element = self.aggregate_type(Some(ea), Some(eb))?;
            if let Some(element) = element {
                return Ok(Some(DataType::array(element, (*ca).max(*cb))));
            }
        }

        Err(ExpressionError::type_mismatch(a, b, "type aggregation"))
    }

    fn convert(
        &self,
        value: Value,
        from: Option<&DataType>,
        to: &DataType,
    ) -> ExpressionResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let DataType::Array {
            element,
            max_cardinality,
        } = to
        {
            return match value {
                Value::Array(items) => {
                    if items.len() > *max_cardinality {
                        return Err(ExpressionError::type_mismatch(
                            format!("at most {} elements", max_cardinality),
                            format!("{} elements", items.len()),
                            "array conversion",
                        ));
                    }
                    let from_element = from.and_then(|t| t.element_type());
                    items
                        .into_iter()
                        .map(|item| self.convert(item, from_element, element))
                        .collect::<ExpressionResult<Vec<_>>>()
                        .map(Value::Array)
                }
                other => Err(mismatch(&other, from, to)),
            };
        }
        if value.is_compatible_with(to) {
            return Ok(value);
        }

        let converted = match (&value, to) {
            (Value::Int32(v), DataType::Int64) => Some(Value::Int64(*v as i64)),
            (Value::Int32(v), DataType::Double) => Some(Value::Double(*v as f64)),
            (Value::Int64(v), DataType::Int32) => i32::try_from(*v).ok().map(Value::Int32),
            (Value::Int64(v), DataType::Double) => Some(Value::Double(*v as f64)),
            (Value::Double(v), DataType::Int32) => {
                let rounded = v.round();
                if !(rounded >= i32::MIN as f64 && rounded <= i32::MAX as f64) {
                    return Err(ExpressionError::overflow(format!("conversion of {}", value)));
                }
                Some(Value::Int32(rounded as i32))
            }
            (Value::Double(v), DataType::Int64) => {
                let rounded = v.round();
                if !(rounded >= i64::MIN as f64 && rounded < I64_UPPER_BOUND) {
                    return Err(ExpressionError::overflow(format!("conversion of {}", value)));
                }
                Some(Value::Int64(rounded as i64))
            }
            (Value::Date(d), DataType::Timestamp) => {
                Some(Value::Timestamp(*d as i64 * MICROS_PER_DAY))
            }
            (Value::Timestamp(t), DataType::Date) => {
                i32::try_from(t.div_euclid(MICROS_PER_DAY)).ok().map(Value::Date)
            }
            (Value::String(s), DataType::Int32) => s.trim().parse().ok().map(Value::Int32),
            (Value::String(s), DataType::Int64) => s.trim().parse().ok().map(Value::Int64),
            (Value::String(s), DataType::Double) => s.trim().parse().ok().map(Value::Double),
            (Value::String(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            (Value::Date(d), DataType::Varchar) => {
                let (y, m, day) = civil_from_days(*d as i64);
                Some(Value::String(format!("{:04}-{:02}-{:02}", y, m, day)))
            }
            (
                Value::Boolean(_) | Value::Int32(_) | Value::Int64(_) | Value::Double(_),
                DataType::Varchar,
            ) => {
                Some(Value::String(value.to_string()))
            }
            _ => None,
        };

        converted.ok_or_else(|| mismatch(&value, from, to))
    }
}

fn mismatch(value: &Value, from: Option<&DataType>, to: &DataType) -> ExpressionError {
    let actual = from
        .cloned()
        .or_else(|| value.data_type())
        .map(|t| t.name())
        .unwrap_or_else(|| "ROW".to_string());
    ExpressionError::type_mismatch(to, actual, format!("conversion of {}", value))
}
