//! Persistence of sessions and frames.
//!
//! The acquisition pipeline only talks to the [`Repository`] trait. The handle is
//! built once by the caller (CLI, tests) and passed down explicitly; there is no
//! process-wide database engine.
//!
//! - [`InMemoryRepository`]: dry runs and tests.
//! - [`SqliteRepository`]: the on-disk database (`users` and `entries` tables).
//! - [`export`]: CSV rendition of the session and frame tables.

pub mod export;
pub mod memory;
pub mod sqlite;

use crate::error::AppResult;
use crate::record::{FrameId, FrameRecord, FrameUpdate, NewFrame, NewSession, Session};

pub use export::{export_tables, write_table, ExportSummary};
pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

/// Session and frame store.
///
/// Implementations assign ids on save and must reject frames that reference an
/// unknown session or carry the wrong number of values.
pub trait Repository {
    /// All sessions, ordered by id.
    fn load_sessions(&self) -> AppResult<Vec<Session>>;

    /// All frames, ordered by id.
    fn load_frames(&self) -> AppResult<Vec<FrameRecord>>;

    /// Persist a new session and return it with its id.
    fn save_session(&mut self, session: NewSession) -> AppResult<Session>;

    /// Persist a new frame and return it with its id.
    fn save_frame(&mut self, frame: NewFrame) -> AppResult<FrameRecord>;

    /// Remove a frame.
    ///
    /// # Errors
    /// [`crate::error::DaqError::NotFound`] for an unknown id.
    fn delete_frame(&mut self, id: FrameId) -> AppResult<()>;

    /// Edit a frame in place and return the result.
    ///
    /// # Errors
    /// [`crate::error::DaqError::NotFound`] for an unknown id.
    fn update_frame(&mut self, id: FrameId, update: &FrameUpdate) -> AppResult<FrameRecord>;
}

impl<R: Repository + ?Sized> Repository for &mut R {
    fn load_sessions(&self) -> AppResult<Vec<Session>> {
        (**self).load_sessions()
    }

    fn load_frames(&self) -> AppResult<Vec<FrameRecord>> {
        (**self).load_frames()
    }

    fn save_session(&mut self, session: NewSession) -> AppResult<Session> {
        (**self).save_session(session)
    }

    fn save_frame(&mut self, frame: NewFrame) -> AppResult<FrameRecord> {
        (**self).save_frame(frame)
    }

    fn delete_frame(&mut self, id: FrameId) -> AppResult<()> {
        (**self).delete_frame(id)
    }

    fn update_frame(&mut self, id: FrameId, update: &FrameUpdate) -> AppResult<FrameRecord> {
        (**self).update_frame(id, update)
    }
}
