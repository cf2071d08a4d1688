//! Placeholder-aware row ordering.
//!
//! Cells are reduced to a [`SortKey`] first. Missing values and the literal `-`
//! are greater than everything else, so they end up last in ascending order and
//! first in descending order. Free-text cells that look like numbers, dates or
//! times compare in that domain; cells from different domains are ordered
//! number < date < time < text so that the ordering stays total.

use crate::record::value::{CellValue, ColumnKind, Domain, Key};
use crate::record::Row;
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first, placeholders last
    #[default]
    Ascending,
    /// Largest first, placeholders first
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Text(String),
    Placeholder,
}

impl SortKey {
    fn of(cell: &CellValue, kind: ColumnKind) -> Self {
        if cell.is_placeholder() {
            return SortKey::Placeholder;
        }
        let domain = match (kind.domain(), cell) {
            (Some(domain), _) => domain,
            (None, CellValue::Text(raw)) => Domain::sniff(raw),
            (None, _) => Domain::Text,
        };
        match cell.key(domain) {
            Some(Key::Number(v)) => SortKey::Number(v),
            Some(Key::Date(d)) => SortKey::Date(d),
            Some(Key::Time(t)) => SortKey::Time(t),
            Some(Key::Text(s)) => SortKey::Text(s),
            None => SortKey::Text(cell.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Date(_) => 1,
            SortKey::Time(_) => 2,
            SortKey::Text(_) => 3,
            SortKey::Placeholder => 4,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            (SortKey::Time(a), SortKey::Time(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Ascending comparison of two cells of a column of `kind`.
pub fn compare_cells(a: &CellValue, b: &CellValue, kind: ColumnKind) -> Ordering {
    SortKey::of(a, kind).total_cmp(&SortKey::of(b, kind))
}

/// Comparison of the cells at `column` of two rows, in `order`. A short row
/// counts as missing.
pub fn ordered(
    a: &[CellValue],
    b: &[CellValue],
    column: usize,
    kind: ColumnKind,
    order: SortOrder,
) -> Ordering {
    let missing = CellValue::Missing;
    let a = a.get(column).unwrap_or(&missing);
    let b = b.get(column).unwrap_or(&missing);
    let ordering = compare_cells(a, b, kind);
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

/// Stable sort of `rows` by the cell at `column`.
pub fn sort_rows(rows: &mut [Row], column: usize, kind: ColumnKind, order: SortOrder) {
    rows.sort_by(|a, b| ordered(a, b, column, kind, order));
}
