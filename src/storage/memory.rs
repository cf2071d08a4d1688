//! In-memory repository for dry runs and tests.

use super::Repository;
use crate::error::{AppResult, DaqError};
use crate::record::{
    FrameId, FrameRecord, FrameUpdate, NewFrame, NewSession, Session, SessionId,
};
use std::collections::BTreeMap;

/// Volatile session and frame store with the same checks as the database.
#[derive(Debug, Clone)]
pub struct InMemoryRepository {
    field_count: usize,
    sessions: BTreeMap<SessionId, Session>,
    frames: BTreeMap<FrameId, FrameRecord>,
    next_session: SessionId,
    next_frame: FrameId,
}

impl InMemoryRepository {
    /// Empty store for frames of `field_count` encoded values.
    pub fn new(field_count: usize) -> Self {
        Self {
            field_count,
            sessions: BTreeMap::new(),
            frames: BTreeMap::new(),
            next_session: 1,
            next_frame: 1,
        }
    }

    /// Number of stored frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn check_frame(&self, session_id: SessionId, values: &[f64]) -> AppResult<()> {
        if !self.sessions.contains_key(&session_id) {
            return Err(DaqError::NotFound(format!("session {session_id}")));
        }
        if values.len() != self.field_count {
            return Err(DaqError::InvalidRequest(format!(
                "frame has {} values, layout expects {}",
                values.len(),
                self.field_count
            )));
        }
        Ok(())
    }
}

impl Repository for InMemoryRepository {
    fn load_sessions(&self) -> AppResult<Vec<Session>> {
        Ok(self.sessions.values().cloned().collect())
    }

    fn load_frames(&self) -> AppResult<Vec<FrameRecord>> {
        Ok(self.frames.values().cloned().collect())
    }

    fn save_session(&mut self, session: NewSession) -> AppResult<Session> {
        let id = self.next_session;
        self.next_session += 1;
        let session = Session {
            id,
            date: session.date,
            operator: session.operator,
            comment: session.comment,
        };
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    fn save_frame(&mut self, frame: NewFrame) -> AppResult<FrameRecord> {
        self.check_frame(frame.session_id, &frame.values)?;
        let id = self.next_frame;
        self.next_frame += 1;
        let record = FrameRecord {
            id,
            session_id: frame.session_id,
            captured_at: frame.captured_at,
            values: frame.values,
        };
        self.frames.insert(id, record.clone());
        Ok(record)
    }

    fn delete_frame(&mut self, id: FrameId) -> AppResult<()> {
        self.frames
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DaqError::NotFound(format!("frame {id}")))
    }

    fn update_frame(&mut self, id: FrameId, update: &FrameUpdate) -> AppResult<FrameRecord> {
        let mut record = self
            .frames
            .get(&id)
            .cloned()
            .ok_or_else(|| DaqError::NotFound(format!("frame {id}")))?;
        update.apply_to(&mut record);
        self.check_frame(record.session_id, &record.values)?;
        self.frames.insert(id, record.clone());
        Ok(record)
    }
}
