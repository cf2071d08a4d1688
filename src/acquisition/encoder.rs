//! Frame Encoder
//!
//! Flattens a [`RawFrame`] into the persisted field order given by
//! [`ChannelRegistry::layout`]: ascending channel id, one field per base channel,
//! mean then variance for each multi-sample channel. Every field is rounded to
//! four decimal places.
//!
//! Encoding never fails. A base reading outside its configured envelope is kept
//! and reported as a [`BoundaryAlert`] (and a `WARN` log line).

use super::sweep::{RawFrame, RawMeasurement};
use crate::channel::{ChannelBound, ChannelId, ChannelKind, ChannelRegistry};
use crate::stats::mean_variance;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Round to four decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// A base reading fell outside its configured envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryAlert {
    /// Channel that left its envelope
    pub channel: ChannelId,
    /// Channel name
    pub name: String,
    /// Raw (unrounded) reading
    pub value: f64,
    /// Configured envelope
    pub bound: ChannelBound,
}

impl fmt::Display for BoundaryAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel {} ({}) reading {} outside {}",
            self.channel, self.name, self.value, self.bound
        )
    }
}

/// Output of one encoding pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Fields in layout order
    pub values: Vec<f64>,
    /// Out-of-envelope readings
    pub alerts: Vec<BoundaryAlert>,
}

/// Converts raw sweeps into flat records.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    registry: Arc<ChannelRegistry>,
}

impl FrameEncoder {
    /// Encoder for the given registry.
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    /// Encode one accepted sweep.
    pub fn encode(&self, raw: &RawFrame) -> EncodedFrame {
        let mut values = Vec::with_capacity(self.registry.field_count());
        let mut alerts = Vec::new();

        for channel in self.registry.encoded_channels() {
            match (&channel.kind, raw.get(channel.id)) {
                (ChannelKind::Base { bound }, Some(RawMeasurement::Single(value))) => {
                    values.push(round4(*value));
                    if let Some(bound) = bound {
                        if bound.is_violated_by(*value) {
                            let alert = BoundaryAlert {
                                channel: channel.id,
                                name: channel.name.clone(),
                                value: *value,
                                bound: *bound,
                            };
                            warn!(channel = channel.id, value = *value, "{alert}");
                            alerts.push(alert);
                        }
                    }
                }
                (ChannelKind::MultiSample { .. }, Some(RawMeasurement::Samples(samples))) => {
                    let (mean, variance) = mean_variance(samples).unwrap_or((f64::NAN, f64::NAN));
                    values.push(round4(mean));
                    values.push(round4(variance));
                }
                (kind, measurement) => {
                    warn!(
                        channel = channel.id,
                        "no usable reading ({measurement:?}) for {kind:?}, field left empty"
                    );
                    values.extend(std::iter::repeat(f64::NAN).take(kind.field_count()));
                }
            }
        }

        EncodedFrame { values, alerts }
    }
}
