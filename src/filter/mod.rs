//! Filter Predicate Engine
//!
//! A [`FilterSet`] holds at most one filter per column. Every column has a fixed
//! [`FilterMode`] chosen when the set is built: exact-match columns take a target
//! value, range columns take an inclusive `(min, max)` pair where either side may
//! be open. A row is accepted when every active filter accepts it; a set with no
//! active filters accepts everything.
//!
//! ## Comparison
//!
//! - Exact: a target that parses as a number is compared numerically with the
//!   cell (a cell that is not numeric is rejected); any other target is compared
//!   with the displayed text of the cell.
//! - Range: typed columns compare in their own domain and parse the bounds once.
//!   Free-text columns sniff each value ([`Domain::sniff`]) and parse the bounds
//!   in that domain. A set bound that cannot be parsed, or a value that is not a
//!   number, date or time, rejects the row.

pub mod sort;

use crate::error::{AppResult, DaqError};
use crate::record::value::{parse_number, CellValue, ColumnKind, Domain, Key};
use crate::record::TableSchema;
use std::collections::BTreeMap;

pub use sort::{compare_cells, ordered, sort_rows, SortOrder};

/// How a column is filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Value must equal a target
    Exact,
    /// Value must fall inside an inclusive interval
    Range,
}

impl FilterMode {
    /// Default mode for a column kind: identifiers and text are matched exactly,
    /// measurements, dates and times by range.
    pub fn default_for(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Integer | ColumnKind::Text => FilterMode::Exact,
            ColumnKind::Float | ColumnKind::Date | ColumnKind::Time => FilterMode::Range,
        }
    }
}

/// Exact-match predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactFilter {
    target: String,
    numeric: Option<f64>,
}

impl ExactFilter {
    /// Build from operator input.
    pub fn new(target: &str) -> Self {
        let target = target.trim();
        Self {
            target: target.to_string(),
            numeric: parse_number(target),
        }
    }

    /// Target as entered.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether `cell` matches the target.
    pub fn accepts(&self, cell: &CellValue) -> bool {
        match self.numeric {
            Some(target) => cell.as_f64() == Some(target),
            None => cell.to_string() == self.target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Bound {
    Open,
    Raw(String),
    Parsed(Key),
    Invalid,
}

impl Bound {
    fn new(raw: Option<&str>, domain: Option<Domain>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Bound::Open;
        };
        match domain {
            None => Bound::Raw(raw.to_string()),
            Some(domain) => Key::parse(domain, raw).map_or(Bound::Invalid, Bound::Parsed),
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, Bound::Open)
    }

    /// `Some(None)` when open, `Some(Some(key))` when usable, `None` when unparseable.
    fn resolve(&self, domain: Domain) -> Option<Option<Key>> {
        match self {
            Bound::Open => Some(None),
            Bound::Parsed(key) => Some(Some(key.clone())),
            Bound::Raw(raw) => Key::parse(domain, raw).map(Some),
            Bound::Invalid => None,
        }
    }
}

/// Inclusive range predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    domain: Option<Domain>,
    min: Bound,
    max: Bound,
}

impl RangeFilter {
    /// Build for a column of `kind`; empty bounds are open.
    pub fn new(kind: ColumnKind, min: Option<&str>, max: Option<&str>) -> Self {
        let domain = kind.domain();
        Self {
            domain,
            min: Bound::new(min, domain),
            max: Bound::new(max, domain),
        }
    }

    /// Both sides open.
    pub fn is_unbounded(&self) -> bool {
        self.min.is_open() && self.max.is_open()
    }

    /// Whether `cell` lies inside the interval.
    pub fn accepts(&self, cell: &CellValue) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let domain = match (self.domain, cell) {
            (Some(domain), _) => domain,
            (None, CellValue::Text(raw)) => Domain::sniff(raw),
            (None, _) => return false,
        };
        if domain == Domain::Text {
            return false;
        }
        let (Some(min), Some(max)) = (self.min.resolve(domain), self.max.resolve(domain)) else {
            return false;
        };
        let Some(value) = cell.key(domain) else {
            return false;
        };
        let above_min = min.map_or(true, |min| value >= min);
        let below_max = max.map_or(true, |max| value <= max);
        above_min && below_max
    }
}

/// The active filters of one table.
#[derive(Debug, Clone)]
pub struct FilterSet {
    schema: TableSchema,
    modes: Vec<FilterMode>,
    exact: BTreeMap<usize, ExactFilter>,
    range: BTreeMap<usize, RangeFilter>,
}

impl FilterSet {
    /// Filter set over `schema`; `overrides` replaces the default mode of the named columns.
    ///
    /// # Errors
    /// [`DaqError::InvalidRequest`] when an override names an unknown column.
    pub fn new<'a, I>(schema: TableSchema, overrides: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (&'a str, FilterMode)>,
    {
        let mut set = Self::for_schema(schema);
        for (key, mode) in overrides {
            let index = set.index_of(key)?;
            set.modes[index] = mode;
        }
        Ok(set)
    }

    /// Filter set with the default mode for every column.
    pub fn for_schema(schema: TableSchema) -> Self {
        let modes = schema
            .columns()
            .iter()
            .map(|c| FilterMode::default_for(c.kind))
            .collect();
        Self {
            schema,
            modes,
            exact: BTreeMap::new(),
            range: BTreeMap::new(),
        }
    }

    /// Schema the filters apply to.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Mode of a column.
    pub fn mode(&self, key: &str) -> Option<FilterMode> {
        self.schema.index_of(key).map(|i| self.modes[i])
    }

    /// Set (or with an empty target, clear) the exact filter of a column.
    pub fn set_exact(&mut self, key: &str, target: &str) -> AppResult<()> {
        let index = self.index_with_mode(key, FilterMode::Exact)?;
        if target.trim().is_empty() {
            self.exact.remove(&index);
        } else {
            self.exact.insert(index, ExactFilter::new(target));
        }
        Ok(())
    }

    /// Set the range filter of a column; two open bounds clear it.
    pub fn set_range(&mut self, key: &str, min: Option<&str>, max: Option<&str>) -> AppResult<()> {
        let index = self.index_with_mode(key, FilterMode::Range)?;
        let kind = self.schema.columns()[index].kind;
        let filter = RangeFilter::new(kind, min, max);
        if filter.is_unbounded() {
            self.range.remove(&index);
        } else {
            self.range.insert(index, filter);
        }
        Ok(())
    }

    /// Drop whatever filter a column has.
    pub fn clear_column(&mut self, key: &str) -> AppResult<()> {
        let index = self.index_of(key)?;
        self.exact.remove(&index);
        self.range.remove(&index);
        Ok(())
    }

    /// Drop every filter.
    pub fn clear(&mut self) {
        self.exact.clear();
        self.range.clear();
    }

    /// Number of active filters.
    pub fn active_count(&self) -> usize {
        self.exact.len() + self.range.len()
    }

    /// No active filters.
    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Whether `row` passes every active filter.
    pub fn accepts(&self, row: &[CellValue]) -> bool {
        let cell = |index: &usize| row.get(*index).unwrap_or(&CellValue::Missing);
        self.exact.iter().all(|(i, f)| f.accepts(cell(i)))
            && self.range.iter().all(|(i, f)| f.accepts(cell(i)))
    }

    fn index_of(&self, key: &str) -> AppResult<usize> {
        self.schema
            .index_of(key)
            .ok_or_else(|| DaqError::InvalidRequest(format!("unknown column '{key}'")))
    }

    fn index_with_mode(&self, key: &str, mode: FilterMode) -> AppResult<usize> {
        let index = self.index_of(key)?;
        if self.modes[index] != mode {
            return Err(DaqError::InvalidRequest(format!(
                "column '{key}' is filtered by {:?}, not {mode:?}",
                self.modes[index]
            )));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ColumnSpec;
    use chrono::NaiveDate;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn exact_numeric_target() {
        let filter = ExactFilter::new("3");
        assert!(filter.accepts(&CellValue::Integer(3)));
        assert!(filter.accepts(&text("3.0")));
        assert!(!filter.accepts(&CellValue::Integer(4)));
        assert!(!filter.accepts(&text("three")));
        assert!(!filter.accepts(&CellValue::Missing));
    }

    #[test]
    fn exact_text_target() {
        let filter = ExactFilter::new("Ivanov");
        assert!(filter.accepts(&text("Ivanov")));
        assert!(!filter.accepts(&text("Petrova")));
    }

    #[test]
    fn typed_range_is_inclusive() {
        let filter = RangeFilter::new(ColumnKind::Float, Some("1.5"), Some("2.5"));
        assert!(filter.accepts(&CellValue::Float(1.5)));
        assert!(filter.accepts(&CellValue::Float(2.5)));
        assert!(!filter.accepts(&CellValue::Float(2.6)));
        assert!(!filter.accepts(&CellValue::Missing));
    }

    #[test]
    fn open_sides() {
        let filter = RangeFilter::new(ColumnKind::Float, None, Some("0"));
        assert!(filter.accepts(&CellValue::Float(-100.0)));
        assert!(!filter.accepts(&CellValue::Float(0.1)));
    }

    #[test]
    fn unparseable_bound_rejects_everything() {
        let filter = RangeFilter::new(ColumnKind::Date, Some("yesterday"), None);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!filter.accepts(&CellValue::Date(date)));
    }

    #[test]
    fn text_column_sniffs_each_value() {
        let filter = RangeFilter::new(ColumnKind::Text, Some("10:00:00"), Some("12:00:00"));
        assert!(filter.accepts(&text("11:30:00")));
        assert!(!filter.accepts(&text("12:00:01")));
        // a number cannot be compared with time bounds
        assert!(!filter.accepts(&text("11")));
        assert!(!filter.accepts(&text("noon")));
    }

    #[test]
    fn wrong_mode_is_rejected() {
        let schema = TableSchema::new(vec![ColumnSpec {
            key: "value".into(),
            header: "Value".into(),
            kind: ColumnKind::Float,
        }]);
        let mut set = FilterSet::for_schema(schema);
        assert!(matches!(
            set.set_exact("value", "1"),
            Err(DaqError::InvalidRequest(_))
        ));
        assert!(set.set_range("value", Some("1"), None).is_ok());
        assert!(matches!(
            set.set_range("nope", None, None),
            Err(DaqError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_target_clears() {
        let mut set = FilterSet::for_schema(TableSchema::sessions());
        set.set_exact("user", "Ivanov").unwrap();
        assert_eq!(set.active_count(), 1);
        set.set_exact("user", " ").unwrap();
        assert!(set.is_empty());

        set.set_range("date", Some("01.01.2024"), None).unwrap();
        set.clear_column("date").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn overrides_change_mode() {
        let set = FilterSet::new(TableSchema::sessions(), [("research", FilterMode::Range)]).unwrap();
        assert_eq!(set.mode("research"), Some(FilterMode::Range));
        assert_eq!(set.mode("user"), Some(FilterMode::Exact));
        assert!(FilterSet::new(TableSchema::sessions(), [("year", FilterMode::Range)]).is_err());
    }
}
