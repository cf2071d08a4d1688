//! Statistics Aggregator
//!
//! Population mean and variance (divide by `n`, not `n - 1`) over the numeric
//! columns of whatever rows are currently visible. Cells that are not numeric are
//! skipped rather than counted as zero; a column without a single numeric cell
//! yields empty statistics, displayed as the `-` placeholder.
//!
//! [`FilteredView`] ties a table to its [`FilterSet`]: the caller edits filters
//! (one or several) and then calls [`FilteredView::on_filter_changed`], which
//! rescans every row and recomputes the statistics of the visible subset.

use crate::error::{AppResult, DaqError};
use crate::filter::{ordered, FilterSet, SortOrder};
use crate::record::value::{CellValue, PLACEHOLDER};
use crate::record::{Row, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Population mean and variance of `values`, or `None` when empty.
pub fn mean_variance(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance))
}

/// Mean and variance of one column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ColumnStats {
    /// Population mean
    pub mean: Option<f64>,
    /// Population variance
    pub variance: Option<f64>,
    /// Number of numeric cells that contributed
    pub count: usize,
}

impl ColumnStats {
    /// Statistics of a sample set.
    pub fn from_values(values: &[f64]) -> Self {
        match mean_variance(values) {
            Some((mean, variance)) => Self {
                mean: Some(mean),
                variance: Some(variance),
                count: values.len(),
            },
            None => Self::default(),
        }
    }
}

impl fmt::Display for ColumnStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| match v {
            Some(v) => format!("{:.4}", v),
            None => PLACEHOLDER.to_string(),
        };
        write!(f, "mean={} var={}", show(self.mean), show(self.variance))
    }
}

/// Recompute statistics for `columns` (`(key, index)` pairs) over `rows`.
pub fn recompute<'a, I>(rows: I, columns: &[(String, usize)]) -> BTreeMap<String, ColumnStats>
where
    I: IntoIterator<Item = &'a [CellValue]>,
{
    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for row in rows {
        for (slot, (_, index)) in samples.iter_mut().zip(columns) {
            if let Some(value) = row.get(*index).and_then(CellValue::as_f64) {
                slot.push(value);
            }
        }
    }

    columns
        .iter()
        .zip(samples)
        .map(|((key, _), values)| (key.clone(), ColumnStats::from_values(&values)))
        .collect()
}

/// A table seen through its filters.
#[derive(Debug, Clone)]
pub struct FilteredView {
    table: Table,
    filters: FilterSet,
    visible: Vec<usize>,
    stats: BTreeMap<String, ColumnStats>,
    sort: Option<(usize, SortOrder)>,
}

impl FilteredView {
    /// View with no active filters.
    pub fn new(table: Table) -> Self {
        let filters = FilterSet::for_schema(table.schema.clone());
        Self::scanned(table, filters)
    }

    /// View with a prepared filter set.
    ///
    /// # Errors
    /// [`DaqError::InvalidRequest`] when the filters were built for another schema.
    pub fn with_filters(table: Table, filters: FilterSet) -> AppResult<Self> {
        if filters.schema() != &table.schema {
            return Err(DaqError::InvalidRequest(
                "filter set does not match the table columns".to_string(),
            ));
        }
        Ok(Self::scanned(table, filters))
    }

    /// Underlying table, unfiltered.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Active filters.
    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Edit filters. Changes take effect at the next [`Self::on_filter_changed`].
    pub fn filters_mut(&mut self) -> &mut FilterSet {
        &mut self.filters
    }

    /// Re-evaluate every row and recompute statistics over the visible ones.
    pub fn on_filter_changed(&mut self) {
        self.visible = self
            .table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.filters.accepts(row))
            .map(|(i, _)| i)
            .collect();
        self.apply_sort();
        let columns = self.table.schema.numeric_columns();
        self.stats = recompute(
            self.visible.iter().map(|&i| self.table.rows[i].as_slice()),
            &columns,
        );
        debug!(
            visible = self.visible.len(),
            total = self.table.rows.len(),
            filters = self.filters.active_count(),
            "view recomputed"
        );
    }

    /// Order visible rows by a column; kept across filter changes.
    pub fn sort_by(&mut self, key: &str, order: SortOrder) -> AppResult<()> {
        let index = self
            .table
            .schema
            .index_of(key)
            .ok_or_else(|| DaqError::InvalidRequest(format!("unknown column '{key}'")))?;
        self.sort = Some((index, order));
        self.apply_sort();
        Ok(())
    }

    /// Visible rows in display order.
    pub fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        self.visible.iter().map(|&i| &self.table.rows[i])
    }

    /// Number of visible rows.
    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Statistics of the visible rows, keyed by column.
    pub fn statistics(&self) -> &BTreeMap<String, ColumnStats> {
        &self.stats
    }

    /// Copy of the visible rows as a table (for export).
    pub fn visible_table(&self) -> Table {
        Table {
            schema: self.table.schema.clone(),
            rows: self.visible_rows().cloned().collect(),
        }
    }

    fn scanned(table: Table, filters: FilterSet) -> Self {
        let mut view = Self {
            table,
            filters,
            visible: Vec::new(),
            stats: BTreeMap::new(),
            sort: None,
        };
        view.on_filter_changed();
        view
    }

    fn apply_sort(&mut self) {
        let Some((column, order)) = self.sort else {
            return;
        };
        let Some(kind) = self.table.schema.column(column).map(|c| c.kind) else {
            return;
        };
        let rows = &self.table.rows;
        self.visible
            .sort_by(|&a, &b| ordered(&rows[a], &rows[b], column, kind, order));
    }
}
