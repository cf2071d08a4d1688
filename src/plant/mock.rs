//! Mock Plant
//!
//! Simulated rig for tests and dry runs. Every wired channel has a signal model;
//! tests can queue exact values (`script`) that are served before the model, inject
//! hardware faults, and make stable channels glitch with a given probability.
//!
//! All timing uses `tokio::time::sleep`, never `std::thread::sleep`.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use super::PlantReader;
use crate::channel::{ChannelId, ChannelKind, ChannelRegistry};

/// How a simulated channel produces values once its script is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalModel {
    /// Always the same value
    Constant(f64),
    /// Uniform noise in `centre ± spread`
    Noisy {
        /// Centre of the distribution
        centre: f64,
        /// Half-width of the distribution
        spread: f64,
    },
}

impl SignalModel {
    fn sample(&self, rng: &mut StdRng) -> f64 {
        match *self {
            SignalModel::Constant(value) => value,
            SignalModel::Noisy { centre, spread } if spread > 0.0 => {
                centre + rng.gen_range(-spread..=spread)
            }
            SignalModel::Noisy { centre, .. } => centre,
        }
    }
}

#[derive(Debug)]
struct SimulatedChannel {
    model: SignalModel,
    script: VecDeque<f64>,
    fault: Option<String>,
    glitch_probability: f64,
}

impl SimulatedChannel {
    fn new(model: SignalModel) -> Self {
        Self {
            model,
            script: VecDeque::new(),
            fault: None,
            glitch_probability: 0.0,
        }
    }
}

#[derive(Debug)]
struct PlantState {
    channels: HashMap<ChannelId, SimulatedChannel>,
    rng: StdRng,
}

/// Simulated plant.
///
/// # Example
///
/// ```rust,ignore
/// let plant = MockPlant::new(7)
///     .with_channel(1, SignalModel::Constant(20.0))
///     .with_script(71, [5.0, 5.1]);
/// assert_eq!(plant.read(1).await?, 20.0);
/// ```
#[derive(Debug)]
pub struct MockPlant {
    state: Mutex<PlantState>,
    read_delay: Duration,
    reads: AtomicU64,
}

impl MockPlant {
    /// Create an empty plant with a deterministic random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(PlantState {
                channels: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
            read_delay: Duration::ZERO,
            reads: AtomicU64::new(0),
        }
    }

    /// Create a plant with one plausible signal per registry channel.
    ///
    /// Bounded base channels hover around the middle of their envelope, other
    /// base and multi-sample channels produce mild noise, stable channels are
    /// constant and glitch with `glitch_probability`.
    pub fn for_registry(registry: &ChannelRegistry, seed: u64, glitch_probability: f64) -> Self {
        let mut plant = Self::new(seed);
        for channel in registry.channels() {
            plant = match &channel.kind {
                ChannelKind::Base { bound: Some(bound) } => {
                    let half_width = (bound.high() - bound.low()) / 2.0;
                    plant.with_channel(
                        channel.id,
                        SignalModel::Noisy {
                            centre: bound.low() + half_width,
                            spread: half_width * 0.5,
                        },
                    )
                }
                ChannelKind::Base { bound: None } => plant.with_channel(
                    channel.id,
                    SignalModel::Noisy {
                        centre: 10.0 + f64::from(channel.id),
                        spread: 1.0,
                    },
                ),
                ChannelKind::MultiSample { .. } => plant.with_channel(
                    channel.id,
                    SignalModel::Noisy {
                        centre: 3.0,
                        spread: 0.1,
                    },
                ),
                ChannelKind::Stable => plant
                    .with_channel(channel.id, SignalModel::Constant(f64::from(channel.id)))
                    .with_glitches(channel.id, glitch_probability),
            };
        }
        plant
    }

    /// Wire a channel with a signal model (replacing any previous model).
    pub fn with_channel(mut self, channel: ChannelId, model: SignalModel) -> Self {
        self.state
            .get_mut()
            .channels
            .entry(channel)
            .and_modify(|sim| sim.model = model)
            .or_insert_with(|| SimulatedChannel::new(model));
        self
    }

    /// Queue exact values for a channel; wires the channel if needed.
    pub fn with_script(mut self, channel: ChannelId, values: impl IntoIterator<Item = f64>) -> Self {
        let sim = self
            .state
            .get_mut()
            .channels
            .entry(channel)
            .or_insert_with(|| SimulatedChannel::new(SignalModel::Constant(0.0)));
        sim.script.extend(values);
        self
    }

    /// Make a channel glitch (return a shifted value) with the given probability.
    pub fn with_glitches(mut self, channel: ChannelId, probability: f64) -> Self {
        if let Some(sim) = self.state.get_mut().channels.get_mut(&channel) {
            sim.glitch_probability = probability.clamp(0.0, 1.0);
        }
        self
    }

    /// Simulated latency of every read.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Queue exact values on a running plant.
    pub async fn push_script(&self, channel: ChannelId, values: impl IntoIterator<Item = f64>) {
        let mut state = self.state.lock().await;
        let sim = state
            .channels
            .entry(channel)
            .or_insert_with(|| SimulatedChannel::new(SignalModel::Constant(0.0)));
        sim.script.extend(values);
    }

    /// Make every subsequent read of `channel` fail, or clear the fault with `None`.
    pub async fn set_fault(&self, channel: ChannelId, fault: Option<&str>) {
        let mut state = self.state.lock().await;
        if let Some(sim) = state.channels.get_mut(&channel) {
            sim.fault = fault.map(str::to_string);
        }
    }

    /// Total number of reads served (including failed ones).
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlantReader for MockPlant {
    async fn read(&self, channel: ChannelId) -> Result<f64> {
        if !self.read_delay.is_zero() {
            sleep(self.read_delay).await;
        }
        self.reads.fetch_add(1, Ordering::SeqCst);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let sim = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| anyhow!("MockPlant: channel {channel} is not wired"))?;

        if let Some(fault) = &sim.fault {
            bail!("MockPlant: channel {channel}: {fault}");
        }
        if let Some(value) = sim.script.pop_front() {
            return Ok(value);
        }

        let value = sim.model.sample(&mut state.rng);
        if sim.glitch_probability > 0.0 && state.rng.gen_bool(sim.glitch_probability) {
            return Ok(value + 1.0);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_is_served_before_model() {
        let plant = MockPlant::new(1)
            .with_channel(71, SignalModel::Constant(5.0))
            .with_script(71, [5.0, 5.1]);

        assert_eq!(plant.read(71).await.unwrap(), 5.0);
        assert_eq!(plant.read(71).await.unwrap(), 5.1);
        assert_eq!(plant.read(71).await.unwrap(), 5.0);
        assert_eq!(plant.read_count(), 3);
    }

    #[tokio::test]
    async fn unwired_channel_is_a_fault() {
        let plant = MockPlant::new(1);
        let err = plant.read(99).await.unwrap_err();
        assert!(err.to_string().contains("not wired"));
    }

    #[tokio::test]
    async fn injected_fault_and_recovery() {
        let plant = MockPlant::new(1).with_channel(2, SignalModel::Constant(101.3));
        plant.set_fault(2, Some("bus timeout")).await;
        assert!(plant.read(2).await.is_err());
        plant.set_fault(2, None).await;
        assert_eq!(plant.read(2).await.unwrap(), 101.3);
    }

    #[tokio::test]
    async fn noise_stays_within_spread() {
        let plant = MockPlant::new(42).with_channel(
            6,
            SignalModel::Noisy {
                centre: 3.0,
                spread: 0.1,
            },
        );
        for _ in 0..100 {
            let v = plant.read(6).await.unwrap();
            assert!((2.9..=3.1).contains(&v), "{v} out of spread");
        }
    }

    #[tokio::test]
    async fn registry_plant_wires_every_channel() {
        let registry = ChannelRegistry::rig_default().unwrap();
        let plant = MockPlant::for_registry(&registry, 3, 0.0);
        for channel in registry.channels() {
            assert!(plant.read(channel.id).await.is_ok(), "channel {}", channel.id);
        }
    }

    #[tokio::test]
    async fn certain_glitch_shifts_value() {
        let plant = MockPlant::new(5)
            .with_channel(8, SignalModel::Constant(8.0))
            .with_glitches(8, 1.0);
        assert_eq!(plant.read(8).await.unwrap(), 9.0);
    }
}
