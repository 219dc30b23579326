//! Row filters
//!
//! A filter maps a row to the subset of its cells that survive. Used both to
//! narrow reads and as the predicate of a conditional mutation, where the
//! predicate matches iff at least one cell survives.

use crate::store::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// Every cell survives
    PassAll,
    /// Cells of one column family
    Family(String),
    /// Cells whose value is exactly these bytes
    ValueEquals(Vec<u8>),
    /// Each filter is applied to the output of the previous one
    Chain(Vec<RowFilter>),
}

impl RowFilter {
    pub fn family(name: impl Into<String>) -> Self {
        RowFilter::Family(name.into())
    }

    pub fn value_equals(value: impl Into<Vec<u8>>) -> Self {
        RowFilter::ValueEquals(value.into())
    }

    pub fn chain(filters: impl IntoIterator<Item = RowFilter>) -> Self {
        RowFilter::Chain(filters.into_iter().collect())
    }

    /// Cells of `row` that survive this filter
    pub fn apply(&self, row: &Row) -> Row {
        match self {
            RowFilter::PassAll => row.clone(),
            RowFilter::Family(name) => row.retain(|family, _| family == name.as_str()),
            RowFilter::ValueEquals(expected) => row.retain(|_, value| value == expected.as_slice()),
            RowFilter::Chain(filters) => filters
                .iter()
                .fold(row.clone(), |acc, filter| filter.apply(&acc)),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        !self.apply(row).is_empty()
    }
}
