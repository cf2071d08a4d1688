//! Table schemas and row projection.
//!
//! Sessions and frames are shown, filtered, sorted and exported as rows of
//! [`CellValue`]s. The frame schema is derived from the channel layout so that the
//! encoded field order and the column order are the same thing.

use super::value::{CellValue, ColumnKind};
use super::{FrameRecord, Session};
use crate::channel::FieldSpec;

/// One row of cells, in schema column order.
pub type Row = Vec<CellValue>;

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Stable identifier used by filters and storage
    pub key: String,
    /// Header shown to the operator
    pub header: String,
    /// Declared type
    pub kind: ColumnKind,
}

impl ColumnSpec {
    fn new(key: impl Into<String>, header: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            kind,
        }
    }
}

/// Ordered column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Schema from explicit columns.
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Schema of the session table.
    pub fn sessions() -> Self {
        Self::new(vec![
            ColumnSpec::new("research", "Research", ColumnKind::Integer),
            ColumnSpec::new("date", "Date (DD.MM.YYYY)", ColumnKind::Date),
            ColumnSpec::new("user", "Operator", ColumnKind::Text),
            ColumnSpec::new("comment", "Comment", ColumnKind::Text),
        ])
    }

    /// Schema of the frame table for a channel layout.
    pub fn frames(layout: &[FieldSpec]) -> Self {
        let mut columns = vec![
            ColumnSpec::new("id", "ID", ColumnKind::Integer),
            ColumnSpec::new("research", "Research", ColumnKind::Integer),
            ColumnSpec::new("time", "Time", ColumnKind::Time),
        ];
        columns.extend(
            layout
                .iter()
                .map(|field| ColumnSpec::new(&field.key, &field.label, ColumnKind::Float)),
        );
        Self::new(columns)
    }

    /// All columns.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column key.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.key == key)
    }

    /// Column at a position.
    pub fn column(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get(index)
    }

    /// Headers in column order.
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    /// `(key, index)` of every measured-value column.
    pub fn numeric_columns(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ColumnKind::Float)
            .map(|(i, c)| (c.key.clone(), i))
            .collect()
    }
}

/// A schema plus its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column definitions
    pub schema: TableSchema,
    /// Rows in schema column order
    pub rows: Vec<Row>,
}

impl Table {
    /// Session table.
    pub fn sessions(sessions: &[Session]) -> Self {
        let rows = sessions
            .iter()
            .map(|s| {
                vec![
                    CellValue::Integer(s.id),
                    CellValue::Date(s.date),
                    CellValue::Text(s.operator.clone()),
                    CellValue::Text(s.comment.clone()),
                ]
            })
            .collect();
        Self {
            schema: TableSchema::sessions(),
            rows,
        }
    }

    /// Frame table. Records with fewer values than the layout get `Missing` cells.
    pub fn frames(layout: &[FieldSpec], frames: &[FrameRecord]) -> Self {
        let rows = frames
            .iter()
            .map(|f| {
                let mut row = Vec::with_capacity(3 + layout.len());
                row.push(CellValue::Integer(f.id));
                row.push(CellValue::Integer(f.session_id));
                row.push(CellValue::Time(f.captured_at));
                row.extend((0..layout.len()).map(|i| match f.values.get(i) {
                    Some(v) if v.is_finite() => CellValue::Float(*v),
                    _ => CellValue::Missing,
                }));
                row
            })
            .collect();
        Self {
            schema: TableSchema::frames(layout),
            rows,
        }
    }
}
