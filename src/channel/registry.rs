//! Channel Registry
//!
//! Holds every channel of the rig plus the sweep order, and derives the encoded
//! field layout from them.
//!
//! # Layout contract
//!
//! ```text
//!  channels (ascending id)      encoded fields
//!  ┌────┬──────────────┐        ┌──────────────────┐
//!  │  1 │ base         │ ─────▶ │ temperature      │
//!  │  6 │ multi (7)    │ ─────▶ │ sensor6_mean     │
//!  │    │              │ ─────▶ │ sensor6_var      │
//!  │  8 │ stable       │   ✗    │                  │
//!  └────┴──────────────┘        └──────────────────┘
//! ```
//!
//! The encoder, the table schema and the SQLite column list are all built from
//! [`ChannelRegistry::layout`], so the three cannot drift apart.

use super::{Channel, ChannelBound, ChannelId, ChannelKind};
use crate::config::{ChannelDefinition, ChannelKindTag, Settings};
use crate::error::{AppResult, DaqError};
use crate::validation::is_valid_identifier;
use std::collections::{BTreeMap, HashSet};

/// Role of an encoded field relative to its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Rounded single reading of a base channel
    Value,
    /// Mean of a multi-sample burst
    Mean,
    /// Population variance of a multi-sample burst
    Variance,
}

/// One field of an encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Storage column name
    pub key: String,
    /// Operator-facing header
    pub label: String,
    /// Source channel
    pub channel: ChannelId,
    /// Role within the channel
    pub role: FieldRole,
}

/// Validated, immutable set of channels and their sweep order.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
    sweep_order: Vec<ChannelId>,
}

impl ChannelRegistry {
    /// Build a registry, validating it.
    ///
    /// Fails with [`DaqError::Configuration`] on duplicate ids or names, invalid
    /// names, zero-sized bursts, sweep entries that name unknown channels, or an
    /// encoded channel that the sweep never visits.
    pub fn new(channels: Vec<Channel>, sweep_order: Vec<ChannelId>) -> AppResult<Self> {
        let mut by_id = BTreeMap::new();
        let mut names = HashSet::new();

        for channel in channels {
            is_valid_identifier(&channel.name).map_err(|e| {
                DaqError::Configuration(format!("channel {} name '{}': {e}", channel.id, channel.name))
            })?;
            if !names.insert(channel.name.clone()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate channel name: {}",
                    channel.name
                )));
            }
            if let ChannelKind::MultiSample { samples: 0 } = channel.kind {
                return Err(DaqError::Configuration(format!(
                    "multi-sample channel {} must take at least one sample",
                    channel.id
                )));
            }
            let id = channel.id;
            if by_id.insert(id, channel).is_some() {
                return Err(DaqError::Configuration(format!("Duplicate channel ID: {id}")));
            }
        }

        if sweep_order.is_empty() {
            return Err(DaqError::Configuration("sweep order is empty".to_string()));
        }
        if let Some(unknown) = sweep_order.iter().find(|id| !by_id.contains_key(id)) {
            return Err(DaqError::Configuration(format!(
                "sweep order references unknown channel {unknown}"
            )));
        }
        for channel in by_id.values() {
            if channel.kind.field_count() > 0 && !sweep_order.contains(&channel.id) {
                return Err(DaqError::Configuration(format!(
                    "channel {} ({}) is never read by the sweep order",
                    channel.id, channel.name
                )));
            }
        }

        // Encoded field keys must be unique too, e.g. a base channel named
        // `sensor6_mean` next to a multi-sample channel named `sensor6`.
        let registry = Self {
            channels: by_id,
            sweep_order,
        };
        let mut keys = HashSet::new();
        for field in registry.layout() {
            if !keys.insert(field.key.clone()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate field name: {}",
                    field.key
                )));
            }
        }
        Ok(registry)
    }

    /// Build a registry from configuration file definitions.
    pub fn from_definitions(
        definitions: &[ChannelDefinition],
        sweep_order: &[ChannelId],
    ) -> AppResult<Self> {
        let channels = definitions
            .iter()
            .map(channel_from_definition)
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(channels, sweep_order.to_vec())
    }

    /// Build the registry described by loaded settings.
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Self::from_definitions(&settings.channels, &settings.acquisition.sweep_order)
    }

    /// The registry of the standard rig (built-in default settings).
    pub fn rig_default() -> AppResult<Self> {
        Self::from_settings(&Settings::default())
    }

    /// Look up a channel.
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// All channels in ascending id order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Channels that contribute fields to a frame, in ascending id order.
    pub fn encoded_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values().filter(|c| c.kind.field_count() > 0)
    }

    /// The order in which one sweep visits channels.
    pub fn sweep_order(&self) -> &[ChannelId] {
        &self.sweep_order
    }

    /// Encoded field layout: ascending channel id, multi-sample channels expanding
    /// to `<name>_mean` then `<name>_var`.
    pub fn layout(&self) -> Vec<FieldSpec> {
        let mut fields = Vec::with_capacity(self.field_count());
        for channel in self.encoded_channels() {
            match channel.kind {
                ChannelKind::Base { .. } => fields.push(FieldSpec {
                    key: channel.name.clone(),
                    label: channel.label.clone(),
                    channel: channel.id,
                    role: FieldRole::Value,
                }),
                ChannelKind::MultiSample { .. } => {
                    fields.push(FieldSpec {
                        key: format!("{}_mean", channel.name),
                        label: format!("{} (mean)", channel.label),
                        channel: channel.id,
                        role: FieldRole::Mean,
                    });
                    fields.push(FieldSpec {
                        key: format!("{}_var", channel.name),
                        label: format!("{} (var)", channel.label),
                        channel: channel.id,
                        role: FieldRole::Variance,
                    });
                }
                ChannelKind::Stable => {}
            }
        }
        fields
    }

    /// Number of fields in an encoded frame.
    pub fn field_count(&self) -> usize {
        self.channels.values().map(|c| c.kind.field_count()).sum()
    }
}

fn channel_from_definition(def: &ChannelDefinition) -> AppResult<Channel> {
    let misplaced = |what: &str| {
        DaqError::Configuration(format!(
            "channel {} ({}): '{what}' is not allowed for {:?} channels",
            def.id, def.name, def.kind
        ))
    };

    let kind = match def.kind {
        ChannelKindTag::Base => {
            if def.samples.is_some() {
                return Err(misplaced("samples"));
            }
            let bound = match def.bound {
                Some([low, high]) => Some(ChannelBound::new(low, high).map_err(|e| {
                    DaqError::Configuration(format!("channel {} ({}): {e}", def.id, def.name))
                })?),
                None => None,
            };
            ChannelKind::Base { bound }
        }
        ChannelKindTag::MultiSample => {
            if def.bound.is_some() {
                return Err(misplaced("bound"));
            }
            let samples = def.samples.ok_or_else(|| {
                DaqError::Configuration(format!(
                    "multi-sample channel {} ({}) needs 'samples'",
                    def.id, def.name
                ))
            })?;
            ChannelKind::MultiSample { samples }
        }
        ChannelKindTag::Stable => {
            if def.bound.is_some() {
                return Err(misplaced("bound"));
            }
            if def.samples.is_some() {
                return Err(misplaced("samples"));
            }
            ChannelKind::Stable
        }
    };

    Ok(Channel {
        id: def.id,
        name: def.name.clone(),
        label: def.label.clone().unwrap_or_else(|| def.name.clone()),
        kind,
    })
}
