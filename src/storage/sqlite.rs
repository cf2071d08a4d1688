//! SQLite-backed repository.
//!
//! Two tables:
//!
//! ```text
//! users   (research INTEGER PK AUTOINCREMENT, date TEXT NOT NULL, user TEXT NOT NULL, comment TEXT)
//! entries (id INTEGER PK AUTOINCREMENT, research INTEGER -> users, time TEXT, <field> REAL ...)
//! ```
//!
//! The `entries` value columns are generated from the channel layout. Opening a
//! database whose `entries` table was created for a different layout fails with
//! [`DaqError::LayoutMismatch`]. Non-finite values are stored as `NULL`.

use super::Repository;
use crate::channel::FieldSpec;
use crate::error::{AppResult, DaqError};
use crate::record::{
    FrameId, FrameRecord, FrameUpdate, NewFrame, NewSession, Session, SessionId,
};
use chrono::NaiveTime;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

const FIXED_ENTRY_COLUMNS: [&str; 3] = ["id", "research", "time"];

/// Repository over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteRepository {
    conn: Connection,
    value_columns: Vec<String>,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    /// [`DaqError::LayoutMismatch`] when `entries` exists with other columns.
    pub fn open<P: AsRef<Path>>(path: P, layout: &[FieldSpec]) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DaqError::Storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        info!(path = %path.display(), "opening database");
        Self::with_connection(Connection::open(path)?, layout)
    }

    /// Private in-memory database.
    pub fn open_in_memory(layout: &[FieldSpec]) -> AppResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, layout)
    }

    /// Close the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> AppResult<()> {
        self.conn.close().map_err(|(_, e)| DaqError::Sqlite(e))
    }

    /// Value column names in layout order.
    pub fn value_columns(&self) -> &[String] {
        &self.value_columns
    }

    fn with_connection(conn: Connection, layout: &[FieldSpec]) -> AppResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let repo = Self {
            conn,
            value_columns: layout.iter().map(|f| f.key.clone()).collect(),
        };
        repo.create_schema()?;
        repo.check_layout()?;
        Ok(repo)
    }

    fn create_schema(&self) -> AppResult<()> {
        let values: String = self
            .value_columns
            .iter()
            .map(|c| format!(", {} REAL", quote(c)))
            .collect();
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS users (
                 research INTEGER PRIMARY KEY AUTOINCREMENT,
                 date TEXT NOT NULL,
                 user TEXT NOT NULL,
                 comment TEXT
             );
             CREATE TABLE IF NOT EXISTS entries (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 research INTEGER REFERENCES users(research),
                 time TEXT{values}
             );"
        ))?;
        Ok(())
    }

    fn check_layout(&self) -> AppResult<()> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info('entries')")?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let expected: Vec<&str> = FIXED_ENTRY_COLUMNS
            .iter()
            .copied()
            .chain(self.value_columns.iter().map(String::as_str))
            .collect();
        if found != expected {
            return Err(DaqError::LayoutMismatch {
                expected: expected.join(", "),
                found: found.join(", "),
            });
        }
        Ok(())
    }

    fn session_exists(&self, id: SessionId) -> AppResult<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM users WHERE research = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn check_frame(&self, session_id: SessionId, values: &[f64]) -> AppResult<()> {
        if values.len() != self.value_columns.len() {
            return Err(DaqError::InvalidRequest(format!(
                "frame has {} values, layout expects {}",
                values.len(),
                self.value_columns.len()
            )));
        }
        if !self.session_exists(session_id)? {
            return Err(DaqError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    fn select_frames_sql(&self) -> String {
        let values: String = self
            .value_columns
            .iter()
            .map(|c| format!(", {}", quote(c)))
            .collect();
        format!("SELECT id, research, time{values} FROM entries")
    }

    fn frame_from_row(&self, row: &Row<'_>) -> rusqlite::Result<FrameRecord> {
        let values = (0..self.value_columns.len())
            .map(|i| Ok(row.get::<_, Option<f64>>(3 + i)?.unwrap_or(f64::NAN)))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(FrameRecord {
            id: row.get(0)?,
            session_id: row.get(1)?,
            captured_at: row.get::<_, NaiveTime>(2)?,
            values,
        })
    }

    fn load_frame(&self, id: FrameId) -> AppResult<Option<FrameRecord>> {
        let sql = format!("{} WHERE id = ?1", self.select_frames_sql());
        Ok(self
            .conn
            .query_row(&sql, [id], |row| self.frame_from_row(row))
            .optional()?)
    }
}

impl Repository for SqliteRepository {
    fn load_sessions(&self) -> AppResult<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT research, date, user, comment FROM users ORDER BY research")?;
        let sessions = stmt
            .query_map([], |row| {
                Ok(Session {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    operator: row.get(2)?,
                    comment: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn load_frames(&self) -> AppResult<Vec<FrameRecord>> {
        let sql = format!("{} ORDER BY id", self.select_frames_sql());
        let mut stmt = self.conn.prepare(&sql)?;
        let frames = stmt
            .query_map([], |row| self.frame_from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(frames)
    }

    fn save_session(&mut self, session: NewSession) -> AppResult<Session> {
        self.conn.execute(
            "INSERT INTO users (date, user, comment) VALUES (?1, ?2, ?3)",
            params![session.date, session.operator, session.comment],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(session = id, "session saved");
        Ok(Session {
            id,
            date: session.date,
            operator: session.operator,
            comment: session.comment,
        })
    }

    fn save_frame(&mut self, frame: NewFrame) -> AppResult<FrameRecord> {
        self.check_frame(frame.session_id, &frame.values)?;

        let columns: String = self
            .value_columns
            .iter()
            .map(|c| format!(", {}", quote(c)))
            .collect();
        let placeholders: String = (0..self.value_columns.len())
            .map(|i| format!(", ?{}", i + 3))
            .collect();
        let sql = format!(
            "INSERT INTO entries (research, time{columns}) VALUES (?1, ?2{placeholders})"
        );

        let stored = stored_values(&frame.values);
        let mut args: Vec<&dyn ToSql> = vec![&frame.session_id, &frame.captured_at];
        args.extend(stored.iter().map(|v| v as &dyn ToSql));
        self.conn.execute(&sql, args.as_slice())?;

        let id = self.conn.last_insert_rowid();
        debug!(frame = id, session = frame.session_id, "frame saved");
        Ok(FrameRecord {
            id,
            session_id: frame.session_id,
            captured_at: frame.captured_at,
            values: frame.values,
        })
    }

    fn delete_frame(&mut self, id: FrameId) -> AppResult<()> {
        let changed = self.conn.execute("DELETE FROM entries WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(DaqError::NotFound(format!("frame {id}")));
        }
        info!(frame = id, "frame deleted");
        Ok(())
    }

    fn update_frame(&mut self, id: FrameId, update: &FrameUpdate) -> AppResult<FrameRecord> {
        let mut record = self
            .load_frame(id)?
            .ok_or_else(|| DaqError::NotFound(format!("frame {id}")))?;
        update.apply_to(&mut record);
        self.check_frame(record.session_id, &record.values)?;

        let assignments: String = self
            .value_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!(", {} = ?{}", quote(c), i + 3))
            .collect();
        let sql = format!(
            "UPDATE entries SET research = ?1, time = ?2{assignments} WHERE id = ?{}",
            self.value_columns.len() + 3
        );

        let stored = stored_values(&record.values);
        let mut args: Vec<&dyn ToSql> = vec![&record.session_id, &record.captured_at];
        args.extend(stored.iter().map(|v| v as &dyn ToSql));
        args.push(&id);
        self.conn.execute(&sql, args.as_slice())?;

        info!(frame = id, "frame updated");
        Ok(record)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn stored_values(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|v| v.is_finite().then_some(*v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use chrono::NaiveDate;

    fn layout() -> Vec<FieldSpec> {
        ChannelRegistry::rig_default().unwrap().layout()
    }

    fn new_session() -> NewSession {
        NewSession {
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            operator: "Ivanov".into(),
            comment: "calibration".into(),
        }
    }

    #[test]
    fn creates_layout_columns() {
        let repo = SqliteRepository::open_in_memory(&layout()).unwrap();
        assert_eq!(repo.value_columns().len(), 10);
        assert_eq!(repo.value_columns()[5], "sensor6_mean");
    }

    #[test]
    fn nan_round_trips_as_null() {
        let mut repo = SqliteRepository::open_in_memory(&layout()).unwrap();
        let session = repo.save_session(new_session()).unwrap();
        let mut values = vec![1.5; 10];
        values[2] = f64::NAN;
        repo.save_frame(NewFrame {
            session_id: session.id,
            captured_at: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            values,
        })
        .unwrap();

        let frames = repo.load_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].values[2].is_nan());
        assert_eq!(frames[0].values[3], 1.5);
        assert_eq!(
            frames[0].captured_at,
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
    }

    #[test]
    fn orphan_frame_is_rejected() {
        let mut repo = SqliteRepository::open_in_memory(&layout()).unwrap();
        let result = repo.save_frame(NewFrame {
            session_id: 42,
            captured_at: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            values: vec![0.0; 10],
        });
        assert!(matches!(result, Err(DaqError::NotFound(_))));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote("sensor6_mean"), "\"sensor6_mean\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
