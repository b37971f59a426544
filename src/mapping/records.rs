//! Persisted mapping records
//!
//! Mappings are saved per bus, keyed by the bus name. Targets are stored by
//! endpoint display name rather than by id: ids only live for one run,
//! while names survive restarts and replugs. The floating default is
//! stored as the literal `[default]`.

use serde::{Deserialize, Serialize};

use super::types::Target;
use crate::graph::GraphSnapshot;

/// Stored name of the floating default target
pub const DEFAULT_TARGET_NAME: &str = "[default]";

/// A saved whole-bus mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullRecord {
    /// Endpoint display name, or `[default]`
    pub target: String,
    #[serde(default)]
    pub gain_db: f32,
}

/// A saved single-channel mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelRecord {
    pub guest_channel: u32,
    /// Endpoint display name, or `[default]`
    pub target: String,
    pub target_channel: u32,
    #[serde(default)]
    pub gain_db: f32,
}

/// Everything saved for one bus, in row order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusRecord {
    pub bus: String,
    #[serde(default)]
    pub full: Vec<FullRecord>,
    #[serde(default)]
    pub channel: Vec<ChannelRecord>,
}

impl BusRecord {
    pub fn new(bus: impl Into<String>) -> Self {
        Self {
            bus: bus.into(),
            full: Vec::new(),
            channel: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.channel.is_empty()
    }
}

/// Resolve a stored target name against the current graph.
///
/// `None` when the named endpoint is not (yet) present or cannot take audio.
pub fn resolve_target_name(name: &str, snapshot: &GraphSnapshot) -> Option<Target> {
    if name == DEFAULT_TARGET_NAME {
        return Some(Target::Default);
    }
    snapshot
        .endpoint_by_name(name)
        .filter(|e| e.has_sinks())
        .map(|e| Target::Endpoint(e.id))
}

/// Merge records for the same bus, keeping the order of first appearance.
pub fn merge_records(records: impl IntoIterator<Item = BusRecord>) -> Vec<BusRecord> {
    let mut merged: Vec<BusRecord> = Vec::new();
    for record in records {
        match merged.iter_mut().find(|r| r.bus == record.bus) {
            Some(existing) => {
                for full in record.full {
                    if !existing.full.iter().any(|f| f.target == full.target) {
                        existing.full.push(full);
                    }
                }
                for channel in record.channel {
                    if !existing.channel.iter().any(|c| {
                        c.guest_channel == channel.guest_channel
                            && c.target == channel.target
                            && c.target_channel == channel.target_channel
                    }) {
                        existing.channel.push(channel);
                    }
                }
            }
            None => merged.push(record),
        }
    }
    merged.retain(|r| !r.is_empty());
    merged
}
