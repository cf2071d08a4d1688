//! CSV export of the session and frame tables.
//!
//! One file per table, written with the display headers and the displayed cell
//! text (dates `DD.MM.YYYY`, times `HH:MM:SS`, missing values `-`). Callers pass
//! already-filtered tables.

use crate::error::{AppResult, DaqError};
use crate::record::Table;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the session export.
pub const SESSIONS_FILE: &str = "sessions.csv";
/// File name of the frame export.
pub const FRAMES_FILE: &str = "frames.csv";

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Path of the session file
    pub sessions_path: PathBuf,
    /// Session rows written
    pub session_rows: usize,
    /// Path of the frame file
    pub frames_path: PathBuf,
    /// Frame rows written
    pub frame_rows: usize,
}

/// Write one table to `path`, returning the number of data rows.
pub fn write_table(path: &Path, table: &Table) -> AppResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.schema.headers())?;
    for row in &table.rows {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    Ok(table.rows.len())
}

/// Write `sessions.csv` and `frames.csv` into `dir`, creating it if needed.
pub fn export_tables(dir: &Path, sessions: &Table, frames: &Table) -> AppResult<ExportSummary> {
    std::fs::create_dir_all(dir).map_err(|e| {
        DaqError::Storage(format!("cannot create export directory {}: {e}", dir.display()))
    })?;
    let sessions_path = dir.join(SESSIONS_FILE);
    let frames_path = dir.join(FRAMES_FILE);
    let session_rows = write_table(&sessions_path, sessions)?;
    let frame_rows = write_table(&frames_path, frames)?;
    info!(
        dir = %dir.display(),
        session_rows,
        frame_rows,
        "export written"
    );
    Ok(ExportSummary {
        sessions_path,
        session_rows,
        frames_path,
        frame_rows,
    })
}
