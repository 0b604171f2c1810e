//! Operator definitions for expressions.

use crate::access::DataType;

/// Binary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // String
    Concat,
}

impl BinaryOperator {
    /// Get the output type of this operator given input types
    pub fn output_type(&self, left: &DataType, right: &DataType) -> Option<DataType> {
        match self {
            BinaryOperator::Add | BinaryOperator::Sub => {
                if let Some(numeric) = numeric_result(left, right) {
                    return Some(numeric);
                }
                // date/time arithmetic counts whole days
                match (left, right) {
                    (DataType::Date | DataType::Timestamp, r) if r.is_exact_numeric() => {
                        Some(left.clone())
                    }
                    (l, DataType::Date | DataType::Timestamp)
                        if l.is_exact_numeric() && *self == BinaryOperator::Add =>
                    {
                        Some(right.clone())
                    }
                    (DataType::Date, DataType::Date) if *self == BinaryOperator::Sub => {
                        Some(DataType::Int32)
                    }
                    _ => None,
                }
            }

            BinaryOperator::Mul | BinaryOperator::Div => numeric_result(left, right),

            // Comparison operators always return boolean
            BinaryOperator::Eq
            | BinaryOperator::Ne
            | BinaryOperator::Lt
            | BinaryOperator::Le
            | BinaryOperator::Gt
            | BinaryOperator::Ge => {
                if types_compatible_for_comparison(left, right) {
                    Some(DataType::Boolean)
                } else {
                    None
                }
            }

            BinaryOperator::And | BinaryOperator::Or => match (left, right) {
                (DataType::Boolean, DataType::Boolean) => Some(DataType::Boolean),
                _ => None,
            },

            BinaryOperator::Concat => match (left, right) {
                (DataType::Varchar, DataType::Varchar) => Some(DataType::Varchar),
                _ => None,
            },
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div
        )
    }

    /// The operator that yields the same result with operands swapped
    pub fn flipped(&self) -> Option<BinaryOperator> {
        match self {
            BinaryOperator::Lt => Some(BinaryOperator::Gt),
            BinaryOperator::Le => Some(BinaryOperator::Ge),
            BinaryOperator::Gt => Some(BinaryOperator::Lt),
            BinaryOperator::Ge => Some(BinaryOperator::Le),
            BinaryOperator::Eq | BinaryOperator::Ne => Some(*self),
            BinaryOperator::Add | BinaryOperator::Mul => Some(*self),
            BinaryOperator::And | BinaryOperator::Or => Some(*self),
            BinaryOperator::Sub | BinaryOperator::Div | BinaryOperator::Concat => None,
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Concat => "||",
        }
    }
}

fn numeric_result(left: &DataType, right: &DataType) -> Option<DataType> {
    match (left, right) {
        (DataType::Double, r) if r.is_numeric() => Some(DataType::Double),
        (l, DataType::Double) if l.is_numeric() => Some(DataType::Double),
        (DataType::Int64, r) if r.is_exact_numeric() => Some(DataType::Int64),
        (l, DataType::Int64) if l.is_exact_numeric() => Some(DataType::Int64),
        (DataType::Int32, DataType::Int32) => Some(DataType::Int32),
        _ => None,
    }
}

/// Check if two types are compatible for comparison
fn types_compatible_for_comparison(left: &DataType, right: &DataType) -> bool {
    left == right
        || (left.is_numeric() && right.is_numeric())
        || (left.is_datetime() && right.is_datetime())
        || match (left.element_type(), right.element_type()) {
            (Some(l), Some(r)) => types_compatible_for_comparison(l, r),
            _ => false,
        }
}

/// Unary operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    // Logical
    Not,

    // NULL checks
    IsNull,
    IsNotNull,

    // Arithmetic
    Plus,
    Minus,
}

impl UnaryOperator {
    /// Get the output type of this operator given input type
    pub fn output_type(&self, operand: &DataType) -> Option<DataType> {
        match self {
            UnaryOperator::Not => match operand {
                DataType::Boolean => Some(DataType::Boolean),
                _ => None,
            },

            // NULL checks always return boolean regardless of input type
            UnaryOperator::IsNull | UnaryOperator::IsNotNull => Some(DataType::Boolean),

            UnaryOperator::Plus | UnaryOperator::Minus => {
                operand.is_numeric().then(|| operand.clone())
            }
        }
    }

    /// Get the display string for this operator
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::IsNull => "IS NULL",
            UnaryOperator::IsNotNull => "IS NOT NULL",
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
        }
    }

    /// True for operators written after their operand
    pub fn is_postfix(&self) -> bool {
        matches!(self, UnaryOperator::IsNull | UnaryOperator::IsNotNull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_operator_output_types() {
        // Arithmetic operators
        assert_eq!(
            BinaryOperator::Add.output_type(&DataType::Int32, &DataType::Int32),
            Some(DataType::Int32)
        );
        assert_eq!(
            BinaryOperator::Mul.output_type(&DataType::Int32, &DataType::Double),
            Some(DataType::Double)
        );
        assert_eq!(
            BinaryOperator::Div.output_type(&DataType::Int64, &DataType::Int32),
            Some(DataType::Int64)
        );

        // Type mismatch for arithmetic
        assert_eq!(
            BinaryOperator::Add.output_type(&DataType::Int32, &DataType::Varchar),
            None
        );

        // Comparison operators
        assert_eq!(
            BinaryOperator::Eq.output_type(&DataType::Int32, &DataType::Double),
            Some(DataType::Boolean)
        );
        assert_eq!(
            BinaryOperator::Lt.output_type(&DataType::Date, &DataType::Timestamp),
            Some(DataType::Boolean)
        );
        assert_eq!(
            BinaryOperator::Eq.output_type(&DataType::Int32, &DataType::Varchar),
            None
        );

        // Logical operators
        assert_eq!(
            BinaryOperator::And.output_type(&DataType::Boolean, &DataType::Boolean),
            Some(DataType::Boolean)
        );
        assert_eq!(
            BinaryOperator::Or.output_type(&DataType::Int32, &DataType::Boolean),
            None
        );

        assert_eq!(
            BinaryOperator::Concat.output_type(&DataType::Varchar, &DataType::Varchar),
            Some(DataType::Varchar)
        );
    }

    #[test]
    fn test_datetime_arithmetic_types() {
        assert_eq!(
            BinaryOperator::Add.output_type(&DataType::Date, &DataType::Int32),
            Some(DataType::Date)
        );
        assert_eq!(
            BinaryOperator::Add.output_type(&DataType::Int32, &DataType::Timestamp),
            Some(DataType::Timestamp)
        );
        assert_eq!(
            BinaryOperator::Sub.output_type(&DataType::Int32, &DataType::Date),
            None
        );
        assert_eq!(
            BinaryOperator::Sub.output_type(&DataType::Date, &DataType::Date),
            Some(DataType::Int32)
        );
    }

    #[test]
    fn test_unary_operator_output_types() {
        assert_eq!(
            UnaryOperator::Not.output_type(&DataType::Boolean),
            Some(DataType::Boolean)
        );
        assert_eq!(UnaryOperator::Not.output_type(&DataType::Int32), None);
        assert_eq!(
            UnaryOperator::IsNull.output_type(&DataType::Varchar),
            Some(DataType::Boolean)
        );
        assert_eq!(
            UnaryOperator::Minus.output_type(&DataType::Double),
            Some(DataType::Double)
        );
        assert_eq!(UnaryOperator::Plus.output_type(&DataType::Varchar), None);
    }

    #[test]
    fn test_flipped() {
        assert_eq!(BinaryOperator::Gt.flipped(), Some(BinaryOperator::Lt));
        assert_eq!(BinaryOperator::Le.flipped(), Some(BinaryOperator::Ge));
        assert_eq!(BinaryOperator::Sub.flipped(), None);
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(BinaryOperator::Add.as_str(), "+");
        assert_eq!(BinaryOperator::Ne.as_str(), "<>");
        assert_eq!(BinaryOperator::Concat.as_str(), "||");
        assert_eq!(UnaryOperator::IsNotNull.as_str(), "IS NOT NULL");
        assert!(UnaryOperator::IsNull.is_postfix());
        assert!(!UnaryOperator::Minus.is_postfix());
    }
}
