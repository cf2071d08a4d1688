//! Measurement-frame acquisition pipeline.
//!
//! - [`sweep`]: walks the sweep order, checks stable channels, retries unstable sweeps
//! - [`encoder`]: flattens an accepted sweep into rounded fields and boundary alerts
//! - [`run`]: turns an operator request into a session plus stored frames

pub mod encoder;
pub mod run;
pub mod sweep;

pub use encoder::{round4, BoundaryAlert, EncodedFrame, FrameEncoder};
pub use run::{AcquisitionReport, AcquisitionRequest, AcquisitionRun};
pub use sweep::{
    AcceptedFrame, CancelToken, FrameAcquirer, RawFrame, RawMeasurement, StabilityViolation,
    SweepOutcome,
};
