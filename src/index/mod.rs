//! Primary and secondary indexes over a table's rows.

pub(crate) mod builder;
mod cursor;
mod error;
mod primary;
mod secondary;

use serde::{Deserialize, Serialize};

pub use self::{
    cursor::Cursor,
    error::IndexError,
    primary::PrimaryIndex,
    secondary::SecondaryIndex,
};
pub(crate) use self::{
    primary::{MainColumn, RowSource},
    secondary::map_name,
};
use crate::record::{Row, SearchRow};

/// Baseline added to row counts by the cost model so tiny tables still
/// prefer index lookups over scans.
pub(crate) const COST_ROW_OFFSET: u64 = 1000;

/// Read side shared by every index kind: range lookups, end lookups,
/// row counts and the optimizer cost estimate.
pub trait Index {
    fn name(&self) -> &str;

    fn columns(&self) -> &[IndexColumn];

    fn is_unique(&self) -> bool;

    /// Rows between the optional bounds, inclusive, in index order.
    fn find(
        &self,
        first: Option<&SearchRow>,
        last: Option<&SearchRow>,
    ) -> Result<Cursor<'_>, IndexError>;

    /// First or last row in index order, skipping rows whose leading indexed
    /// value is NULL.
    fn find_first_or_last(&self, first: bool) -> Result<Option<Row>, IndexError>;

    /// Estimated cost of a lookup constrained by `masks`, indexed by table
    /// column position.
    fn cost(&self, masks: &[Option<IndexCondition>]) -> f64;

    fn row_count(&self) -> u64;

    fn row_count_approximation(&self) -> u64 {
        self.row_count()
    }
}

/// One column of an index definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    pub descending: bool,
}

impl IndexColumn {
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            descending: false,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            descending: true,
        }
    }
}

/// Index definition persisted next to the index data so indexes can be
/// rediscovered when a table is reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub unique: bool,
    pub primary: bool,
    pub columns: Vec<IndexColumn>,
}

impl IndexMeta {
    pub fn new(name: impl Into<String>, columns: Vec<IndexColumn>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            unique: false,
            primary: false,
            columns,
        }
    }

    pub fn unique(self, unique: bool) -> Self {
        IndexMeta { unique, ..self }
    }

    /// Primary key indexes are always unique.
    pub fn primary(self, primary: bool) -> Self {
        IndexMeta {
            primary,
            unique: self.unique || primary,
            ..self
        }
    }
}

/// How a lookup constrains one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCondition {
    Equality,
    Range,
    Start,
    End,
}

/// Range-index cost heuristic.
///
/// `columns` pairs each index column's table position with its selectivity.
/// Equality on a leading prefix narrows the estimate by the combined
/// selectivity; a full equality match on a unique index is a point lookup.
/// The first range-like or unconstrained column ends the prefix.
pub(crate) fn range_cost(
    columns: &[(usize, u32)],
    masks: &[Option<IndexCondition>],
    row_count: u64,
    unique: bool,
) -> f64 {
    let rows = row_count + COST_ROW_OFFSET;
    let mut cost = rows as f64;
    let mut total_selectivity: u64 = 0;
    for (position, (column, selectivity)) in columns.iter().enumerate() {
        match masks.get(*column).copied().flatten() {
            Some(IndexCondition::Equality) => {
                if unique && position + 1 == columns.len() {
                    cost = 3.0;
                    break;
                }
                let selectivity = u64::from((*selectivity).clamp(1, 100));
                total_selectivity =
                    100 - ((100 - total_selectivity) * (100 - selectivity) / 100);
                let distinct_rows = (rows * total_selectivity / 100).max(1);
                cost = 2.0 + (rows / distinct_rows).max(1) as f64;
            }
            Some(IndexCondition::Range) => {
                cost = 2.0 + rows as f64 / 4.0;
                break;
            }
            Some(IndexCondition::Start) | Some(IndexCondition::End) => {
                cost = 2.0 + rows as f64 / 3.0;
                break;
            }
            None => break,
        }
    }
    cost
}
