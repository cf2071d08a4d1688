//! Plant Reader capability
//!
//! The plant is the physical rig. The acquisition core only needs one thing from it:
//! read one sample of one channel. Drivers for real hardware implement
//! [`PlantReader`]; [`mock::MockPlant`] simulates the rig for tests and dry runs.
//!
//! # Contract
//! - `read` may block on hardware I/O for as long as the device needs
//! - Errors are hardware faults; the core propagates them and never retries
//! - Implementations are `Send + Sync` and use interior mutability for state

pub mod mock;

use crate::channel::ChannelId;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability: read one sample from a plant channel.
#[async_trait]
pub trait PlantReader: Send + Sync {
    /// Read one sample of `channel`.
    ///
    /// # Returns
    /// - Ok(value) on a successful read
    /// - Err on hardware fault or timeout
    async fn read(&self, channel: ChannelId) -> Result<f64>;
}

#[async_trait]
impl<T: PlantReader + ?Sized> PlantReader for Arc<T> {
    async fn read(&self, channel: ChannelId) -> Result<f64> {
        (**self).read(channel).await
    }
}

pub use mock::{MockPlant, SignalModel};
