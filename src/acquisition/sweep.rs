//! Frame Acquirer
//!
//! One *sweep* walks the registry's sweep order once and reads every visited
//! channel from the plant:
//!
//! ```text
//!  sweep order:  8  71  1  2  3  4  5  20  43  58  71  6  8  71
//!                │   │  └──────── base ────────┘   │   │  │   │
//!                └───┴──── stable (must agree) ────┴───┼──┴───┘
//!                                                      └ multi-sample burst
//! ```
//!
//! - Base channels are read once per visit; a later visit overwrites the value.
//! - Multi-sample channels are read `samples` times in one contiguous burst.
//! - Stable channels are read once per visit and compared with the previous
//!   reading of the same sweep. A difference is a [`StabilityViolation`]: the
//!   sweep is abandoned immediately and all of its readings are discarded.
//!
//! [`FrameAcquirer::acquire_frame`] retries whole sweeps (fresh reads for every
//! channel) until one completes, giving up after `max_consecutive_failures`
//! unstable sweeps in a row. Hardware faults are never retried.

use crate::channel::{ChannelId, ChannelKind, ChannelRegistry};
use crate::error::{AppResult, DaqError};
use crate::plant::PlantReader;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What one channel produced during a sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMeasurement {
    /// Base channel reading
    Single(f64),
    /// Multi-sample burst, in read order
    Samples(Vec<f64>),
}

/// Readings of one completed sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    readings: BTreeMap<ChannelId, RawMeasurement>,
    stable: BTreeMap<ChannelId, f64>,
}

impl RawFrame {
    /// Empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) a base reading.
    pub fn insert_single(&mut self, channel: ChannelId, value: f64) {
        self.readings.insert(channel, RawMeasurement::Single(value));
    }

    /// Store (or overwrite) a multi-sample burst.
    pub fn insert_samples(&mut self, channel: ChannelId, samples: Vec<f64>) {
        self.readings.insert(channel, RawMeasurement::Samples(samples));
    }

    /// Reading of a base or multi-sample channel.
    pub fn get(&self, channel: ChannelId) -> Option<&RawMeasurement> {
        self.readings.get(&channel)
    }

    /// Base and multi-sample readings in ascending channel order.
    pub fn readings(&self) -> impl Iterator<Item = (ChannelId, &RawMeasurement)> {
        self.readings.iter().map(|(id, m)| (*id, m))
    }

    /// The agreed value of a stable channel.
    pub fn stable_value(&self, channel: ChannelId) -> Option<f64> {
        self.stable.get(&channel).copied()
    }
}

/// A stable channel returned two different values within one sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityViolation {
    /// Offending channel
    pub channel: ChannelId,
    /// Earlier reading in the same sweep
    pub previous: f64,
    /// Reading that disagreed
    pub current: f64,
}

impl fmt::Display for StabilityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel {} not stable ({} -> {})",
            self.channel, self.previous, self.current
        )
    }
}

/// Result of a single sweep attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    /// Every channel was read and every stable channel agreed
    Complete(RawFrame),
    /// The sweep was abandoned; nothing it read is kept
    Unstable(StabilityViolation),
}

/// A frame accepted after zero or more discarded sweeps.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedFrame {
    /// Readings of the sweep that completed
    pub frame: RawFrame,
    /// Violations of the sweeps discarded before it
    pub discarded: Vec<StabilityViolation>,
}

/// Shared flag that stops an acquisition between two channel reads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestrates sweeps across the plant.
pub struct FrameAcquirer<P: PlantReader> {
    registry: Arc<ChannelRegistry>,
    plant: P,
    max_consecutive_failures: u32,
    cancel: CancelToken,
}

impl<P: PlantReader> FrameAcquirer<P> {
    /// Create an acquirer. `max_consecutive_failures` is clamped to at least 1.
    pub fn new(registry: Arc<ChannelRegistry>, plant: P, max_consecutive_failures: u32) -> Self {
        Self {
            registry,
            plant,
            max_consecutive_failures: max_consecutive_failures.max(1),
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token checked between channel reads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The plant this acquirer reads from.
    pub fn plant(&self) -> &P {
        &self.plant
    }

    /// Perform one sweep.
    ///
    /// # Errors
    /// - [`DaqError::Instrument`] when the plant fails a read
    /// - [`DaqError::Cancelled`] when the cancel token is tripped
    pub async fn sweep(&self) -> AppResult<SweepOutcome> {
        let mut frame = RawFrame::new();

        for &id in self.registry.sweep_order() {
            let Some(channel) = self.registry.get(id) else {
                // Unreachable for a validated registry.
                continue;
            };
            match channel.kind {
                ChannelKind::Base { .. } => {
                    let value = self.read(id).await?;
                    frame.insert_single(id, value);
                }
                ChannelKind::Stable => {
                    let value = self.read(id).await?;
                    if let Some(&previous) = frame.stable.get(&id) {
                        if previous != value {
                            return Ok(SweepOutcome::Unstable(StabilityViolation {
                                channel: id,
                                previous,
                                current: value,
                            }));
                        }
                    }
                    frame.stable.insert(id, value);
                }
                ChannelKind::MultiSample { samples } => {
                    let mut burst = Vec::with_capacity(samples);
                    for _ in 0..samples {
                        burst.push(self.read(id).await?);
                    }
                    frame.insert_samples(id, burst);
                }
            }
        }

        debug!(channels = frame.readings.len(), "sweep complete");
        Ok(SweepOutcome::Complete(frame))
    }

    /// Sweep until one sweep completes.
    ///
    /// Each discarded sweep is logged as a warning. After
    /// `max_consecutive_failures` unstable sweeps in a row the batch fails with
    /// [`DaqError::StabilityExhausted`].
    pub async fn acquire_frame(&self) -> AppResult<AcceptedFrame> {
        let mut discarded = Vec::new();
        loop {
            match self.sweep().await? {
                SweepOutcome::Complete(frame) => return Ok(AcceptedFrame { frame, discarded }),
                SweepOutcome::Unstable(violation) => {
                    warn!(
                        channel = violation.channel,
                        previous = violation.previous,
                        current = violation.current,
                        "{violation}, sweep discarded"
                    );
                    discarded.push(violation);
                    let attempts = discarded.len() as u32;
                    if attempts >= self.max_consecutive_failures {
                        error!(
                            channel = violation.channel,
                            attempts, "giving up: too many unstable sweeps in a row"
                        );
                        return Err(DaqError::StabilityExhausted {
                            channel: violation.channel,
                            attempts,
                        });
                    }
                }
            }
        }
    }

    /// Acquire `count` accepted frames.
    pub async fn acquire(&self, count: usize) -> AppResult<Vec<RawFrame>> {
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            frames.push(self.acquire_frame().await?.frame);
        }
        Ok(frames)
    }

    async fn read(&self, channel: ChannelId) -> AppResult<f64> {
        if self.cancel.is_cancelled() {
            return Err(DaqError::Cancelled);
        }
        self.plant
            .read(channel)
            .await
            .map_err(|e| DaqError::Instrument {
                channel,
                message: format!("{e:#}"),
            })
    }
}
