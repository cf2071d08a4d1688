//! Acquisition request orchestration.
//!
//! One request creates one session and then repeats acquire, encode, save until
//! the requested number of frames is stored. Frames are saved one at a time, so
//! a hardware fault, an exhausted retry budget or a cancellation keeps every
//! frame saved before it.

use super::encoder::{BoundaryAlert, FrameEncoder};
use super::sweep::{CancelToken, FrameAcquirer};
use crate::channel::ChannelRegistry;
use crate::config::AcquisitionConfig;
use crate::error::{AppResult, DaqError};
use crate::plant::PlantReader;
use crate::record::{FrameId, NewFrame, NewSession, Session, SessionId};
use crate::storage::Repository;
use crate::validation::is_not_empty;
use chrono::{Local, NaiveTime, Timelike};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    /// Operator name, stored with the session
    pub operator: String,
    /// Frames to store
    pub frame_count: usize,
    /// Free-text comment
    pub comment: String,
}

impl AcquisitionRequest {
    /// Request `frame_count` frames for `operator`.
    pub fn new(operator: impl Into<String>, frame_count: usize, comment: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            frame_count,
            comment: comment.into(),
        }
    }

    /// Operator must be non-blank and at least one frame requested.
    pub fn validate(&self) -> AppResult<()> {
        is_not_empty(&self.operator)
            .map_err(|e| DaqError::InvalidRequest(format!("operator: {e}")))?;
        if self.frame_count == 0 {
            return Err(DaqError::InvalidRequest(
                "frame count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a completed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionReport {
    /// Session created for the request
    pub session: Session,
    /// Ids of the stored frames, in capture order
    pub frame_ids: Vec<FrameId>,
    /// Sweeps discarded because a stable channel disagreed
    pub stability_retries: usize,
    /// Base readings outside their envelope
    pub alerts: Vec<BoundaryAlert>,
}

/// Acquirer and encoder bound to one registry and plant.
pub struct AcquisitionRun<P: PlantReader> {
    acquirer: FrameAcquirer<P>,
    encoder: FrameEncoder,
}

impl<P: PlantReader> AcquisitionRun<P> {
    /// Bind a plant to `registry`, with the retry cap from `config`.
    pub fn new(registry: Arc<ChannelRegistry>, plant: P, config: &AcquisitionConfig) -> Self {
        Self {
            acquirer: FrameAcquirer::new(registry.clone(), plant, config.max_consecutive_failures),
            encoder: FrameEncoder::new(registry),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.acquirer = self.acquirer.with_cancel_token(cancel);
        self
    }

    /// Token checked between channel reads.
    pub fn cancel_token(&self) -> CancelToken {
        self.acquirer.cancel_token()
    }

    /// Run a request against `repository`.
    ///
    /// # Errors
    /// - [`DaqError::InvalidRequest`] before anything is stored
    /// - [`DaqError::Instrument`], [`DaqError::StabilityExhausted`] or
    ///   [`DaqError::Cancelled`] after the session and zero or more frames were stored
    /// - any storage error
    pub async fn execute<R: Repository>(
        &self,
        request: &AcquisitionRequest,
        repository: &mut R,
    ) -> AppResult<AcquisitionReport> {
        request.validate()?;
        if self.acquirer.cancel_token().is_cancelled() {
            return Err(DaqError::Cancelled);
        }

        let session = repository.save_session(NewSession {
            date: Local::now().date_naive(),
            operator: request.operator.trim().to_string(),
            comment: request.comment.clone(),
        })?;
        info!(
            session = session.id,
            operator = %session.operator,
            frames = request.frame_count,
            "acquisition started"
        );

        let mut report = AcquisitionReport {
            session,
            frame_ids: Vec::with_capacity(request.frame_count),
            stability_retries: 0,
            alerts: Vec::new(),
        };

        while report.frame_ids.len() < request.frame_count {
            match self.store_next_frame(report.session.id, repository).await {
                Ok(stored) => {
                    report.frame_ids.push(stored.id);
                    report.stability_retries += stored.retries;
                    report.alerts.extend(stored.alerts);
                }
                Err(e) => {
                    error!(
                        session = report.session.id,
                        saved = report.frame_ids.len(),
                        requested = request.frame_count,
                        "acquisition aborted: {e}"
                    );
                    return Err(e);
                }
            }
        }

        info!(
            session = report.session.id,
            frames = report.frame_ids.len(),
            retries = report.stability_retries,
            alerts = report.alerts.len(),
            "acquisition finished"
        );
        Ok(report)
    }
}

struct StoredFrame {
    id: FrameId,
    retries: usize,
    alerts: Vec<BoundaryAlert>,
}

impl<P: PlantReader> AcquisitionRun<P> {
    /// Acquire, encode and save one frame.
    async fn store_next_frame<R: Repository>(
        &self,
        session_id: SessionId,
        repository: &mut R,
    ) -> AppResult<StoredFrame> {
        let accepted = self.acquirer.acquire_frame().await?;
        let captured_at = capture_time();
        let encoded = self.encoder.encode(&accepted.frame);
        let record = repository.save_frame(NewFrame {
            session_id,
            captured_at,
            values: encoded.values,
        })?;
        Ok(StoredFrame {
            id: record.id,
            retries: accepted.discarded.len(),
            alerts: encoded.alerts,
        })
    }
}

/// Wall-clock time of day, whole seconds.
fn capture_time() -> NaiveTime {
    let now = Local::now().time();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::plant::MockPlant;
    use crate::storage::InMemoryRepository;

    fn run() -> (AcquisitionRun<MockPlant>, InMemoryRepository) {
        let settings = Settings::default();
        let registry = Arc::new(ChannelRegistry::from_settings(&settings).unwrap());
        let plant = MockPlant::for_registry(&registry, 7, 0.0);
        let repo = InMemoryRepository::new(registry.field_count());
        (AcquisitionRun::new(registry, plant, &settings.acquisition), repo)
    }

    #[test]
    fn request_validation() {
        assert!(AcquisitionRequest::new("Ivanov", 1, "").validate().is_ok());
        assert!(AcquisitionRequest::new("  ", 1, "").validate().is_err());
        assert!(AcquisitionRequest::new("Ivanov", 0, "").validate().is_err());
    }

    #[tokio::test]
    async fn stores_one_session_and_requested_frames() {
        let (run, mut repo) = run();
        let report = run
            .execute(&AcquisitionRequest::new("Ivanov", 3, "warm-up"), &mut repo)
            .await
            .unwrap();

        assert_eq!(report.frame_ids.len(), 3);
        assert_eq!(report.stability_retries, 0);
        let sessions = repo.load_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].comment, "warm-up");
        let frames = repo.load_frames().unwrap();
        assert!(frames.iter().all(|f| f.session_id == report.session.id));
        assert!(frames.iter().all(|f| f.captured_at.nanosecond() == 0));
    }

    #[tokio::test]
    async fn invalid_request_stores_nothing() {
        let (run, mut repo) = run();
        let err = run
            .execute(&AcquisitionRequest::new("", 3, ""), &mut repo)
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::InvalidRequest(_)));
        assert!(repo.load_sessions().unwrap().is_empty());
    }

    /// Accepts `room` frames, then fails every save.
    struct FullDisk {
        inner: InMemoryRepository,
        room: usize,
    }

    impl Repository for FullDisk {
        fn load_sessions(&self) -> AppResult<Vec<Session>> {
            self.inner.load_sessions()
        }
        fn load_frames(&self) -> AppResult<Vec<crate::record::FrameRecord>> {
            self.inner.load_frames()
        }
        fn save_session(&mut self, session: NewSession) -> AppResult<Session> {
            self.inner.save_session(session)
        }
        fn save_frame(&mut self, frame: NewFrame) -> AppResult<crate::record::FrameRecord> {
            if self.inner.frame_count() >= self.room {
                return Err(DaqError::Storage("disk full".to_string()));
            }
            self.inner.save_frame(frame)
        }
        fn delete_frame(&mut self, id: FrameId) -> AppResult<()> {
            self.inner.delete_frame(id)
        }
        fn update_frame(
            &mut self,
            id: FrameId,
            update: &crate::record::FrameUpdate,
        ) -> AppResult<crate::record::FrameRecord> {
            self.inner.update_frame(id, update)
        }
    }

    #[tokio::test]
    async fn save_failure_is_logged_with_progress() {
        use crate::log_capture::{CaptureLayer, LogBuffer};
        use tracing_subscriber::layer::SubscriberExt;

        let buffer = LogBuffer::new();
        let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(buffer.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (run, inner) = run();
        let mut repo = FullDisk { inner, room: 2 };
        let err = run
            .execute(&AcquisitionRequest::new("Ivanov", 4, ""), &mut repo)
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::Storage(_)));
        assert_eq!(repo.inner.frame_count(), 2);

        let entries = buffer.snapshot();
        let aborted = entries
            .iter()
            .find(|e| e.level == tracing::Level::ERROR)
            .expect("abort was logged");
        assert!(aborted.message.contains("acquisition aborted: Storage error: disk full"));
        assert!(aborted.message.contains("saved=2"));
    }
}
