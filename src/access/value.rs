use std::cmp::Ordering;
use std::fmt;

pub const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Data types understood by the expression engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Double,
    Varchar,
    /// Days since 1970-01-01
    Date,
    /// Microseconds since 1970-01-01 00:00:00
    Timestamp,
    Array {
        element: Box<DataType>,
        max_cardinality: usize,
    },
}

impl DataType {
    pub fn array(element: DataType, max_cardinality: usize) -> Self {
        DataType::Array {
            element: Box::new(element),
            max_cardinality,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Double)
    }

    pub fn is_exact_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }

    pub fn is_character(&self) -> bool {
        matches!(self, DataType::Varchar)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array { .. })
    }

    /// Element type of an array type
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// SQL name of the type
    pub fn name(&self) -> String {
        match self {
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Int32 => "INTEGER".to_string(),
            DataType::Int64 => "BIGINT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Varchar => "VARCHAR".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Array {
                element,
                max_cardinality,
            } => format!("{} ARRAY[{}]", element.name(), max_cardinality),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Runtime values produced by evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Date(i32),
    Timestamp(i64),
    Array(Vec<Value>),
    /// Composite value of a row constructor or multi-column subquery
    Row(Vec<Value>),
}

impl Value {
    /// Get the data type of this value
    ///
    /// NULL and composite rows have no single type. Arrays report the type of
    /// their first non-NULL element.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Double(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::Varchar),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Array(items) => items
                .iter()
                .find_map(|v| v.data_type())
                .map(|element| DataType::array(element, items.len())),
            Value::Row(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is compatible with the given data type
    pub fn is_compatible_with(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true, // NULL is compatible with any type
            (Value::Boolean(_), DataType::Boolean) => true,
            (Value::Int32(_), DataType::Int32) => true,
            (Value::Int64(_), DataType::Int64) => true,
            (Value::Double(_), DataType::Double) => true,
            (Value::String(_), DataType::Varchar) => true,
            (Value::Date(_), DataType::Date) => true,
            (Value::Timestamp(_), DataType::Timestamp) => true,
            (Value::Array(items), DataType::Array { element, .. }) => {
                items.iter().all(|v| v.is_compatible_with(element))
            }
            _ => false,
        }
    }

    /// SQL ordering between two non-NULL values.
    ///
    /// Numeric values compare across widths, dates compare with timestamps at
    /// midnight. Returns `None` when either side is NULL or the values are not
    /// comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Timestamp(b)) => Some((*a as i64 * MICROS_PER_DAY).cmp(b)),
            (Value::Timestamp(a), Value::Date(b)) => Some(a.cmp(&(*b as i64 * MICROS_PER_DAY))),
            (Value::Array(a), Value::Array(b)) | (Value::Row(a), Value::Row(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (Value::Double(_), _) | (_, Value::Double(_)) => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
            _ => {
                let a = self.as_i64()?;
                let b = other.as_i64()?;
                Some(a.cmp(&b))
            }
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

/// Convert days since the epoch into a (year, month, day) civil date.
pub fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Convert a civil date into days since the epoch.
pub fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = (if year >= 0 { year } else { year - 399 }) / 400;
    let yoe = year - era * 400;
    let month = month as i64;
    let doy = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn write_date(f: &mut fmt::Formatter<'_>, days: i64) -> fmt::Result {
    let (year, month, day) = civil_from_days(days);
    write!(f, "{:04}-{:02}-{:02}", year, month, day)
}

/// Renders the value as a SQL literal
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{:?}", v),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Date(days) => {
                write!(f, "DATE '")?;
                write_date(f, *days as i64)?;
                write!(f, "'")
            }
            Value::Timestamp(micros) => {
                let days = micros.div_euclid(MICROS_PER_DAY);
                let rem = micros.rem_euclid(MICROS_PER_DAY);
                let secs = rem / 1_000_000;
                let fraction = rem % 1_000_000;
                write!(f, "TIMESTAMP '")?;
                write_date(f, days)?;
                write!(
                    f,
                    " {:02}:{:02}:{:02}",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60
                )?;
                if fraction != 0 {
                    write!(f, ".{:06}", fraction)?;
                }
                write!(f, "'")
            }
            Value::Array(items) => {
                write!(f, "ARRAY[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Row(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}
