//! Built-in SQL functions and aggregate function descriptors.

use crate::access::DataType;

/// Built-in SQL functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlFunction {
    CurrentDate,
    CurrentTimestamp,
    LocalTimestamp,
    Random,
    Abs,
    Upper,
    Lower,
    CharLength,
    Coalesce,
}

impl SqlFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name.to_ascii_uppercase().as_str() {
            "CURRENT_DATE" => SqlFunction::CurrentDate,
            "CURRENT_TIMESTAMP" => SqlFunction::CurrentTimestamp,
            "LOCALTIMESTAMP" => SqlFunction::LocalTimestamp,
            "RANDOM" | "RAND" => SqlFunction::Random,
            "ABS" => SqlFunction::Abs,
            "UPPER" => SqlFunction::Upper,
            "LOWER" => SqlFunction::Lower,
            "CHAR_LENGTH" | "CHARACTER_LENGTH" => SqlFunction::CharLength,
            "COALESCE" => SqlFunction::Coalesce,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SqlFunction::CurrentDate => "CURRENT_DATE",
            SqlFunction::CurrentTimestamp => "CURRENT_TIMESTAMP",
            SqlFunction::LocalTimestamp => "LOCALTIMESTAMP",
            SqlFunction::Random => "RANDOM",
            SqlFunction::Abs => "ABS",
            SqlFunction::Upper => "UPPER",
            SqlFunction::Lower => "LOWER",
            SqlFunction::CharLength => "CHAR_LENGTH",
            SqlFunction::Coalesce => "COALESCE",
        }
    }

    /// Same result for the same arguments within and across statements
    pub fn is_deterministic(&self) -> bool {
        !matches!(
            self,
            SqlFunction::CurrentDate
                | SqlFunction::CurrentTimestamp
                | SqlFunction::LocalTimestamp
                | SqlFunction::Random
        )
    }

    /// Reads the statement clock
    pub fn is_current_datetime(&self) -> bool {
        matches!(
            self,
            SqlFunction::CurrentDate | SqlFunction::CurrentTimestamp | SqlFunction::LocalTimestamp
        )
    }

    /// Niladic datetime functions are written without parentheses
    pub fn is_niladic(&self) -> bool {
        self.is_current_datetime()
    }

    /// Accepted argument count: (min, max)
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            SqlFunction::CurrentDate
            | SqlFunction::CurrentTimestamp
            | SqlFunction::LocalTimestamp
            | SqlFunction::Random => (0, Some(0)),
            SqlFunction::Abs
            | SqlFunction::Upper
            | SqlFunction::Lower
            | SqlFunction::CharLength => (1, Some(1)),
            SqlFunction::Coalesce => (1, None),
        }
    }

    /// Result type for single-argument and niladic functions.
    ///
    /// COALESCE needs type aggregation and is typed by the type resolver.
    pub fn output_type(&self, argument: Option<&DataType>) -> Option<DataType> {
        match self {
            SqlFunction::CurrentDate => Some(DataType::Date),
            SqlFunction::CurrentTimestamp | SqlFunction::LocalTimestamp => {
                Some(DataType::Timestamp)
            }
            SqlFunction::Random => Some(DataType::Double),
            SqlFunction::Abs => argument.filter(|t| t.is_numeric()).cloned(),
            SqlFunction::Upper | SqlFunction::Lower => argument
                .filter(|t| t.is_character())
                .map(|_| DataType::Varchar),
            SqlFunction::CharLength => argument
                .filter(|t| t.is_character())
                .map(|_| DataType::Int32),
            SqlFunction::Coalesce => argument.cloned(),
        }
    }
}

/// Aggregate functions. Computed by the executor's grouping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Every,
    Some,
    StddevPop,
    StddevSamp,
    VarPop,
    VarSamp,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Every => "EVERY",
            AggregateFunction::Some => "SOME",
            AggregateFunction::StddevPop => "STDDEV_POP",
            AggregateFunction::StddevSamp => "STDDEV_SAMP",
            AggregateFunction::VarPop => "VAR_POP",
            AggregateFunction::VarSamp => "VAR_SAMP",
        }
    }

    /// Result type given the argument type (`None` for `COUNT(*)`)
    pub fn output_type(&self, argument: Option<&DataType>) -> Option<DataType> {
        match self {
            AggregateFunction::Count => Some(DataType::Int64),
            AggregateFunction::Sum => match argument? {
                DataType::Int32 | DataType::Int64 => Some(DataType::Int64),
                DataType::Double => Some(DataType::Double),
                _ => None,
            },
            AggregateFunction::Min | AggregateFunction::Max => argument.cloned(),
            AggregateFunction::Every | AggregateFunction::Some => {
                argument.filter(|t| **t == DataType::Boolean).cloned()
            }
            AggregateFunction::Avg
            | AggregateFunction::StddevPop
            | AggregateFunction::StddevSamp
            | AggregateFunction::VarPop
            | AggregateFunction::VarSamp => argument
                .filter(|t| t.is_numeric())
                .map(|_| DataType::Double),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(
            SqlFunction::from_name("current_date"),
            Some(SqlFunction::CurrentDate)
        );
        assert_eq!(SqlFunction::from_name("RAND"), Some(SqlFunction::Random));
        assert_eq!(SqlFunction::from_name("nope"), None);
    }

    #[test]
    fn test_determinism_flags() {
        assert!(!SqlFunction::CurrentDate.is_deterministic());
        assert!(!SqlFunction::Random.is_deterministic());
        assert!(SqlFunction::Upper.is_deterministic());
        assert!(SqlFunction::LocalTimestamp.is_current_datetime());
        assert!(!SqlFunction::Random.is_current_datetime());
    }

    #[test]
    fn test_function_output_types() {
        assert_eq!(
            SqlFunction::CharLength.output_type(Some(&DataType::Varchar)),
            Some(DataType::Int32)
        );
        assert_eq!(SqlFunction::Abs.output_type(Some(&DataType::Varchar)), None);
        assert_eq!(SqlFunction::CurrentDate.output_type(None), Some(DataType::Date));
    }

    #[test]
    fn test_aggregate_output_types() {
        assert_eq!(
            AggregateFunction::Sum.output_type(Some(&DataType::Int32)),
            Some(DataType::Int64)
        );
        assert_eq!(
            AggregateFunction::Avg.output_type(Some(&DataType::Int32)),
            Some(DataType::Double)
        );
        assert_eq!(AggregateFunction::Count.output_type(None), Some(DataType::Int64));
        assert_eq!(AggregateFunction::Every.output_type(Some(&DataType::Int32)), None);
    }
}
