//! Range variables and the row binding context used during evaluation.

use crate::access::{DataType, Value};

/// Column exposed by a range variable
#[derive(Debug, Clone, PartialEq)]
pub struct RangeColumn {
    pub name: String,
    pub data_type: DataType,
    /// True for GENERATED ALWAYS AS (...) columns
    pub generated: bool,
}

impl RangeColumn {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            generated: false,
        }
    }

    pub fn generated(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            generated: true,
        }
    }
}

/// A tuple source (table, derived table, ...) that contributes rows.
///
/// `position` is the slot of this range in the executor's range arena. Column
/// references keep only the position, never a pointer to the range itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVariable {
    pub position: usize,
    pub table_name: String,
    pub alias: Option<String>,
    pub columns: Vec<RangeColumn>,
}

impl RangeVariable {
    pub fn new(position: usize, table_name: impl Into<String>, columns: Vec<RangeColumn>) -> Self {
        Self {
            position,
            table_name: table_name.into(),
            alias: None,
            columns,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name used to qualify columns of this range
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table_name)
    }

    /// Whether a column qualifier (`t` in `t.col`) designates this range
    pub fn matches_qualifier(&self, qualifier: Option<&str>) -> bool {
        match qualifier {
            None => true,
            Some(q) => self.qualifier().eq_ignore_ascii_case(q),
        }
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, index: usize) -> Option<&RangeColumn> {
        self.columns.get(index)
    }
}

/// Access to the row currently positioned under each range variable.
pub trait RangeContext {
    fn current_row(&self, range_position: usize) -> Option<&[Value]>;
}

/// Current-row slots for every range position of a statement.
#[derive(Debug, Default, Clone)]
pub struct RangeIterators {
    rows: Vec<Option<Vec<Value>>>,
}

impl RangeIterators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(ranges: usize) -> Self {
        Self {
            rows: vec![None; ranges],
        }
    }

    /// Position a row under `range_position`, growing the slot table if needed
    pub fn set_current(&mut self, range_position: usize, row: Vec<Value>) {
        if self.rows.len() <= range_position {
            self.rows.resize(range_position + 1, None);
        }
        self.rows[range_position] = Some(row);
    }

    pub fn clear(&mut self, range_position: usize) {
        if let Some(slot) = self.rows.get_mut(range_position) {
            *slot = None;
        }
    }

    pub fn clear_all(&mut self) {
        self.rows.iter_mut().for_each(|slot| *slot = None);
    }
}

impl RangeContext for RangeIterators {
    fn current_row(&self, range_position: usize) -> Option<&[Value]> {
        self.rows
            .get(range_position)
            .and_then(|slot| slot.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees() -> RangeVariable {
        RangeVariable::new(
            0,
            "employees",
            vec![
                RangeColumn::new("id", DataType::Int32),
                RangeColumn::new("hire_date", DataType::Date),
            ],
        )
    }

    #[test]
    fn test_qualifier_matching() {
        let range = employees();
        assert!(range.matches_qualifier(None));
        assert!(range.matches_qualifier(Some("EMPLOYEES")));
        assert!(!range.matches_qualifier(Some("e")));

        let aliased = employees().with_alias("e");
        assert!(aliased.matches_qualifier(Some("e")));
        assert!(!aliased.matches_qualifier(Some("employees")));
    }

    #[test]
    fn test_find_column_is_case_insensitive() {
        let range = employees();
        assert_eq!(range.find_column("HIRE_DATE"), Some(1));
        assert_eq!(range.find_column("salary"), None);
    }

    #[test]
    fn test_range_iterators() {
        let mut iterators = RangeIterators::new();
        assert!(iterators.current_row(2).is_none());

        iterators.set_current(2, vec![Value::Int32(7)]);
        assert_eq!(iterators.current_row(2), Some(&[Value::Int32(7)][..]));
        assert!(iterators.current_row(0).is_none());

        iterators.clear(2);
        assert!(iterators.current_row(2).is_none());
    }
}
