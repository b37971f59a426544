//! Mapping model
//!
//! Owns the speaker buses and their mappings. Independent of playback:
//! it only knows about targets, channels and gains, and works against a
//! [`GraphSnapshot`] passed in by the caller.
//!
//! ## Uniqueness
//! A bus never has two full mappings to the same target, nor two channel
//! mappings with the same `(guest_channel, target, target_channel)`. The
//! floating default counts as its own target, distinct from whichever
//! endpoint it currently resolves to.
//!
//! ## Pending records
//! Loaded records whose bus or endpoint is not present yet are kept aside
//! and restored by `resolve_pending()` once they can be.

use std::collections::HashMap;

use super::gain::quantize_db;
use super::records::{
    merge_records, resolve_target_name, BusRecord, ChannelRecord, FullRecord, DEFAULT_TARGET_NAME,
};
use super::search::{self, Direction};
use super::types::*;
use crate::error::RouteError;
use crate::graph::{EndpointId, GraphSnapshot, Position};

/// Speaker buses and their mappings
#[derive(Debug, Default)]
pub struct MappingModel {
    buses: Vec<BusMappings>,
    next_bus: u32,
    /// Records waiting for their bus or endpoint to appear
    pending: Vec<BusRecord>,
    /// Last known display name of every endpoint a mapping points at, so a
    /// mapping to an unplugged device can still be saved
    names: HashMap<EndpointId, String>,
    /// Set whenever mappings change; the owner uses this to trigger a save
    pub dirty: bool,
}

impl MappingModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Buses ──────────────────────────────────────────────────────────────

    /// Register a speaker bus. One position per channel.
    pub fn add_bus(&mut self, name: impl Into<String>, positions: Vec<Position>) -> BusId {
        self.next_bus += 1;
        let id = BusId(self.next_bus);
        let bus = SpeakerBus {
            id,
            name: name.into(),
            positions,
        };
        log::debug!("{} registered: {:?} ({} channels)", id, bus.name, bus.channels());
        self.buses.push(BusMappings {
            bus,
            full: Vec::new(),
            channel: Vec::new(),
        });
        id
    }

    pub fn bus(&self, id: BusId) -> Option<&SpeakerBus> {
        self.entry(id).ok().map(|b| &b.bus)
    }

    pub fn bus_by_name(&self, name: &str) -> Option<&SpeakerBus> {
        self.buses.iter().map(|b| &b.bus).find(|b| b.name == name)
    }

    pub fn buses(&self) -> impl Iterator<Item = &SpeakerBus> {
        self.buses.iter().map(|b| &b.bus)
    }

    /// Buses with their mappings, in registration order.
    pub fn bus_mappings(&self) -> &[BusMappings] {
        &self.buses
    }

    fn entry(&self, id: BusId) -> Result<&BusMappings, RouteError> {
        self.buses
            .iter()
            .find(|b| b.bus.id == id)
            .ok_or(RouteError::UnknownBus(id))
    }

    fn entry_mut(&mut self, id: BusId) -> Result<&mut BusMappings, RouteError> {
        self.buses
            .iter_mut()
            .find(|b| b.bus.id == id)
            .ok_or(RouteError::UnknownBus(id))
    }

    // ── Queries ────────────────────────────────────────────────────────────

    pub fn mapping(&self, key: &MappingKey) -> Option<Mapping> {
        let entry = self.entry(key.bus()).ok()?;
        let gain_db = match *key {
            MappingKey::Full { target, .. } => {
                entry.full.iter().find(|m| m.target == target)?.gain_db
            }
            MappingKey::Channel {
                guest_channel,
                target,
                target_channel,
                ..
            } => {
                entry
                    .channel
                    .iter()
                    .find(|m| {
                        m.guest_channel == guest_channel
                            && m.target == target
                            && m.target_channel == target_channel
                    })?
                    .gain_db
            }
        };
        Some(Mapping { key: *key, gain_db })
    }

    /// Mappings of one bus, full ones first.
    pub fn mappings_for(&self, bus: BusId) -> Vec<Mapping> {
        self.entry(bus)
            .map(|b| b.mappings().collect())
            .unwrap_or_default()
    }

    /// Every mapping of every bus, in row order.
    pub fn all_mappings(&self) -> impl Iterator<Item = Mapping> + '_ {
        self.buses.iter().flat_map(|b| b.mappings())
    }

    /// Concrete endpoint a target plays to right now.
    pub fn resolve(&self, target: Target, snapshot: &GraphSnapshot) -> Option<EndpointId> {
        target.resolve(snapshot)
    }

    /// Whether `bus` may get a full mapping to `target`.
    pub fn full_mapping_available(&self, bus: BusId, target: Target, snapshot: &GraphSnapshot) -> bool {
        if target.is_default() && !snapshot.has_default_sink() {
            return false;
        }
        match self.entry(bus) {
            Ok(entry) => !entry.full.iter().any(|m| m.target == target),
            Err(_) => false,
        }
    }

    /// Whether `bus` may get the channel mapping `guest_channel > target:target_channel`.
    pub fn channel_mapping_available(
        &self,
        bus: BusId,
        guest_channel: u32,
        target: Target,
        target_channel: u32,
        snapshot: &GraphSnapshot,
    ) -> bool {
        if target.is_default() && !snapshot.has_default_sink() {
            return false;
        }
        match self.entry(bus) {
            Ok(entry) => !entry.channel.iter().any(|m| {
                m.guest_channel == guest_channel
                    && m.target == target
                    && m.target_channel == target_channel
            }),
            Err(_) => false,
        }
    }

    // ── Search ─────────────────────────────────────────────────────────────

    /// The default when free for `bus`, otherwise the first free endpoint.
    pub fn find_first_available_target(&self, bus: BusId, snapshot: &GraphSnapshot) -> Option<Target> {
        search::find_first_available(snapshot, |t| self.full_mapping_available(bus, t, snapshot))
    }

    pub fn find_next_available_target(
        &self,
        bus: BusId,
        after: Target,
        snapshot: &GraphSnapshot,
    ) -> Option<Target> {
        search::find_available(snapshot, after, Direction::Forward, |t| {
            self.full_mapping_available(bus, t, snapshot)
        })
    }

    pub fn find_previous_available_target(
        &self,
        bus: BusId,
        after: Target,
        snapshot: &GraphSnapshot,
    ) -> Option<Target> {
        search::find_available(snapshot, after, Direction::Backward, |t| {
            self.full_mapping_available(bus, t, snapshot)
        })
    }

    /// Next target able to take `guest_channel` on `target_channel`.
    ///
    /// Endpoints too narrow to have `target_channel` are skipped.
    pub fn find_next_available_channel_target(
        &self,
        bus: BusId,
        guest_channel: u32,
        after: Target,
        target_channel: u32,
        snapshot: &GraphSnapshot,
    ) -> Option<Target> {
        self.find_channel_target(bus, guest_channel, after, target_channel, Direction::Forward, snapshot)
    }

    pub fn find_previous_available_channel_target(
        &self,
        bus: BusId,
        guest_channel: u32,
        after: Target,
        target_channel: u32,
        snapshot: &GraphSnapshot,
    ) -> Option<Target> {
        self.find_channel_target(bus, guest_channel, after, target_channel, Direction::Backward, snapshot)
    }

    fn find_channel_target(
        &self,
        bus: BusId,
        guest_channel: u32,
        after: Target,
        target_channel: u32,
        direction: Direction,
        snapshot: &GraphSnapshot,
    ) -> Option<Target> {
        search::find_available(snapshot, after, direction, |t| {
            target_channel < t.sink_count(snapshot)
                && self.channel_mapping_available(bus, guest_channel, t, target_channel, snapshot)
        })
    }

    /// Any free `(guest_channel, target, target_channel)` triple for `bus`.
    ///
    /// Tries the default first, then endpoints in order; for each target
    /// every guest channel is tried against every target channel.
    pub fn find_first_available_channel_target(
        &self,
        bus: BusId,
        snapshot: &GraphSnapshot,
    ) -> Option<(u32, Target, u32)> {
        let guest_count = self.bus(bus)?.channels();
        let default = snapshot.has_default_sink().then_some(Target::Default);
        let candidates = default
            .into_iter()
            .chain(search::target_endpoints(snapshot).map(Target::Endpoint));

        for target in candidates {
            let sink_count = target.sink_count(snapshot);
            for guest_channel in 0..guest_count {
                for target_channel in 0..sink_count {
                    if self.channel_mapping_available(bus, guest_channel, target, target_channel, snapshot) {
                        return Some((guest_channel, target, target_channel));
                    }
                }
            }
        }
        None
    }

    /// Cycle the guest channel of a channel mapping to the next free one.
    pub fn find_guest_channel(
        &self,
        key: &MappingKey,
        direction: Direction,
        snapshot: &GraphSnapshot,
    ) -> Option<u32> {
        let MappingKey::Channel {
            bus,
            guest_channel,
            target,
            target_channel,
        } = *key
        else {
            return None;
        };
        let count = self.bus(bus)?.channels();
        search::cycle_channel(guest_channel, count, direction, |g| {
            self.channel_mapping_available(bus, g, target, target_channel, snapshot)
        })
    }

    /// Cycle the target channel of a channel mapping to the next free one.
    pub fn find_target_channel(
        &self,
        key: &MappingKey,
        direction: Direction,
        snapshot: &GraphSnapshot,
    ) -> Option<u32> {
        let MappingKey::Channel {
            bus,
            guest_channel,
            target,
            target_channel,
        } = *key
        else {
            return None;
        };
        let count = target.sink_count(snapshot);
        search::cycle_channel(target_channel, count, direction, |c| {
            self.channel_mapping_available(bus, guest_channel, target, c, snapshot)
        })
    }

    // ── Edits ──────────────────────────────────────────────────────────────

    fn check_target(&self, target: Target, snapshot: &GraphSnapshot) -> Result<u32, RouteError> {
        match target {
            Target::Default => {
                if !snapshot.has_default_sink() {
                    return Err(RouteError::Unavailable);
                }
            }
            Target::Endpoint(id) => {
                if snapshot.endpoint(id).is_none() {
                    return Err(RouteError::NotFound(id));
                }
            }
        }
        match target.sink_count(snapshot) {
            0 => Err(RouteError::Unavailable),
            count => Ok(count),
        }
    }

    fn check(&self, key: &MappingKey, snapshot: &GraphSnapshot) -> Result<(), RouteError> {
        let entry = self.entry(key.bus())?;
        let sink_count = self.check_target(key.target(), snapshot)?;
        match *key {
            MappingKey::Full { bus, target } => {
                if !self.full_mapping_available(bus, target, snapshot) {
                    return Err(RouteError::Unavailable);
                }
            }
            MappingKey::Channel {
                bus,
                guest_channel,
                target,
                target_channel,
            } => {
                let count = entry.bus.channels();
                if guest_channel >= count {
                    return Err(RouteError::ChannelOutOfRange {
                        channel: guest_channel,
                        count,
                    });
                }
                if target_channel >= sink_count {
                    return Err(RouteError::ChannelOutOfRange {
                        channel: target_channel,
                        count: sink_count,
                    });
                }
                if !self.channel_mapping_available(bus, guest_channel, target, target_channel, snapshot) {
                    return Err(RouteError::Unavailable);
                }
            }
        }
        Ok(())
    }

    fn remember_name(&mut self, target: Target, snapshot: &GraphSnapshot) {
        if let Target::Endpoint(id) = target
            && let Some(endpoint) = snapshot.endpoint(id)
        {
            self.names.insert(id, endpoint.display_name().to_string());
        }
    }

    /// Insert a validated mapping at unity gain.
    pub fn add(&mut self, key: MappingKey, snapshot: &GraphSnapshot) -> Result<Mapping, RouteError> {
        self.check(&key, snapshot)?;
        self.remember_name(key.target(), snapshot);
        let entry = self.entry_mut(key.bus())?;
        match key {
            MappingKey::Full { target, .. } => entry.full.push(FullMapping {
                target,
                gain_db: 0.0,
            }),
            MappingKey::Channel {
                guest_channel,
                target,
                target_channel,
                ..
            } => entry.channel.push(ChannelMapping {
                guest_channel,
                target,
                target_channel,
                gain_db: 0.0,
            }),
        }
        self.dirty = true;
        log::debug!("Mapping added: {}", key);
        Ok(Mapping { key, gain_db: 0.0 })
    }

    /// Map the whole bus to `target` at 0 dB.
    pub fn add_full(
        &mut self,
        bus: BusId,
        target: Target,
        snapshot: &GraphSnapshot,
    ) -> Result<Mapping, RouteError> {
        self.add(MappingKey::Full { bus, target }, snapshot)
    }

    /// Map one bus channel to one endpoint channel at 0 dB.
    pub fn add_channel(
        &mut self,
        bus: BusId,
        guest_channel: u32,
        target: Target,
        target_channel: u32,
        snapshot: &GraphSnapshot,
    ) -> Result<Mapping, RouteError> {
        self.add(
            MappingKey::Channel {
                bus,
                guest_channel,
                target,
                target_channel,
            },
            snapshot,
        )
    }

    /// Remove a mapping. Returns what was removed.
    pub fn remove(&mut self, key: &MappingKey) -> Option<Mapping> {
        let mapping = self.mapping(key)?;
        let entry = self.entry_mut(key.bus()).ok()?;
        match *key {
            MappingKey::Full { target, .. } => entry.full.retain(|m| m.target != target),
            MappingKey::Channel {
                guest_channel,
                target,
                target_channel,
                ..
            } => entry.channel.retain(|m| {
                !(m.guest_channel == guest_channel
                    && m.target == target
                    && m.target_channel == target_channel)
            }),
        }
        self.dirty = true;
        log::debug!("Mapping removed: {}", key);
        Some(mapping)
    }

    fn gain_slot(&mut self, key: &MappingKey) -> Option<&mut f32> {
        let entry = self.entry_mut(key.bus()).ok()?;
        match *key {
            MappingKey::Full { target, .. } => entry
                .full
                .iter_mut()
                .find(|m| m.target == target)
                .map(|m| &mut m.gain_db),
            MappingKey::Channel {
                guest_channel,
                target,
                target_channel,
                ..
            } => entry
                .channel
                .iter_mut()
                .find(|m| {
                    m.guest_channel == guest_channel
                        && m.target == target
                        && m.target_channel == target_channel
                })
                .map(|m| &mut m.gain_db),
        }
    }

    /// Set a mapping's gain. Returns the quantized value that was stored.
    pub fn set_gain(&mut self, key: &MappingKey, db: f32) -> Option<f32> {
        let db = quantize_db(db);
        let slot = self.gain_slot(key)?;
        if *slot != db {
            *slot = db;
            self.dirty = true;
        }
        Some(db)
    }

    /// Swap a mapping for another of the same bus and kind, keeping its gain
    /// and its row position. Nothing changes if the replacement is refused.
    pub fn replace(
        &mut self,
        old: &MappingKey,
        new: MappingKey,
        snapshot: &GraphSnapshot,
    ) -> Result<Mapping, RouteError> {
        let current = self.mapping(old).ok_or(RouteError::NoMapping)?;
        if *old == new {
            return Ok(current);
        }
        if old.bus() != new.bus() || old.is_full() != new.is_full() {
            return Err(RouteError::Unavailable);
        }
        self.check(&new, snapshot)?;
        self.remember_name(new.target(), snapshot);

        let entry = self.entry_mut(old.bus())?;
        match (*old, new) {
            (MappingKey::Full { target: from, .. }, MappingKey::Full { target, .. }) => {
                if let Some(m) = entry.full.iter_mut().find(|m| m.target == from) {
                    m.target = target;
                }
            }
            (
                MappingKey::Channel {
                    guest_channel: g0,
                    target: t0,
                    target_channel: c0,
                    ..
                },
                MappingKey::Channel {
                    guest_channel,
                    target,
                    target_channel,
                    ..
                },
            ) => {
                if let Some(m) = entry
                    .channel
                    .iter_mut()
                    .find(|m| m.guest_channel == g0 && m.target == t0 && m.target_channel == c0)
                {
                    m.guest_channel = guest_channel;
                    m.target = target;
                    m.target_channel = target_channel;
                }
            }
            _ => return Err(RouteError::Unavailable),
        }
        self.dirty = true;
        log::debug!("Mapping moved: {} -> {}", old, new);
        Ok(Mapping {
            key: new,
            gain_db: current.gain_db,
        })
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Pick up renamed endpoints so saved names stay current.
    pub fn refresh_names(&mut self, snapshot: &GraphSnapshot) {
        for (id, name) in self.names.iter_mut() {
            if let Some(endpoint) = snapshot.endpoint(*id) {
                *name = endpoint.display_name().to_string();
            }
        }
    }

    fn target_name(&self, target: Target) -> Option<String> {
        match target {
            Target::Default => Some(DEFAULT_TARGET_NAME.to_string()),
            Target::Endpoint(id) => self.names.get(&id).cloned(),
        }
    }

    /// Records for every bus, followed by anything still pending.
    pub fn export(&self) -> Vec<BusRecord> {
        let mut records = Vec::new();
        for entry in &self.buses {
            let mut record = BusRecord::new(entry.bus.name.clone());
            for m in &entry.full {
                match self.target_name(m.target) {
                    Some(target) => record.full.push(FullRecord {
                        target,
                        gain_db: m.gain_db,
                    }),
                    None => log::warn!("No name known for {}, not saving its mapping", m.target),
                }
            }
            for m in &entry.channel {
                match self.target_name(m.target) {
                    Some(target) => record.channel.push(ChannelRecord {
                        guest_channel: m.guest_channel,
                        target,
                        target_channel: m.target_channel,
                        gain_db: m.gain_db,
                    }),
                    None => log::warn!("No name known for {}, not saving its mapping", m.target),
                }
            }
            records.push(record);
        }
        merge_records(records.into_iter().chain(self.pending.iter().cloned()))
    }

    /// Replace all mappings with loaded records.
    ///
    /// Returns the number of mappings restored right away; the rest stay
    /// pending.
    pub fn import(&mut self, records: Vec<BusRecord>, snapshot: &GraphSnapshot) -> usize {
        for entry in &mut self.buses {
            entry.full.clear();
            entry.channel.clear();
        }
        self.pending = merge_records(records);
        let restored = self.resolve_pending(snapshot);
        self.dirty = false;
        restored
    }

    /// Restore pending records whose bus and endpoint are now present.
    pub fn resolve_pending(&mut self, snapshot: &GraphSnapshot) -> usize {
        let mut restored = 0;
        let mut leftover = Vec::new();

        for record in std::mem::take(&mut self.pending) {
            let Some(index) = self.buses.iter().position(|b| b.bus.name == record.bus) else {
                leftover.push(record);
                continue;
            };
            let mut waiting = BusRecord::new(record.bus.clone());

            for full in record.full {
                let Some(target) = resolve_target_name(&full.target, snapshot) else {
                    waiting.full.push(full);
                    continue;
                };
                self.remember_name(target, snapshot);
                let entry = &mut self.buses[index];
                if !entry.full.iter().any(|m| m.target == target) {
                    entry.full.push(FullMapping {
                        target,
                        gain_db: quantize_db(full.gain_db),
                    });
                    restored += 1;
                }
            }

            for channel in record.channel {
                let guest_count = self.buses[index].bus.channels();
                if channel.guest_channel >= guest_count {
                    log::warn!(
                        "Dropping saved mapping of {:?}: guest channel {} out of range",
                        record.bus,
                        channel.guest_channel
                    );
                    continue;
                }
                let Some(target) = resolve_target_name(&channel.target, snapshot) else {
                    waiting.channel.push(channel);
                    continue;
                };
                if let Target::Endpoint(_) = target
                    && channel.target_channel >= target.sink_count(snapshot)
                {
                    log::warn!(
                        "Dropping saved mapping of {:?}: {} has no channel {}",
                        record.bus,
                        channel.target,
                        channel.target_channel
                    );
                    continue;
                }
                self.remember_name(target, snapshot);
                let entry = &mut self.buses[index];
                if !entry.channel.iter().any(|m| {
                    m.guest_channel == channel.guest_channel
                        && m.target == target
                        && m.target_channel == channel.target_channel
                }) {
                    entry.channel.push(ChannelMapping {
                        guest_channel: channel.guest_channel,
                        target,
                        target_channel: channel.target_channel,
                        gain_db: quantize_db(channel.gain_db),
                    });
                    restored += 1;
                }
            }

            if !waiting.is_empty() {
                leftover.push(waiting);
            }
        }

        self.pending = leftover;
        if restored > 0 {
            log::info!("Restored {} saved mappings", restored);
        }
        restored
    }

    /// Records still waiting for a bus or endpoint.
    pub fn pending(&self) -> &[BusRecord] {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DeviceGraph, EndpointKind, PortDirection};
    use std::sync::Arc;

    /// One stereo endpoint named "Speakers" (`L`/`R`), set as default.
    fn stereo_graph() -> Arc<DeviceGraph> {
        let graph = DeviceGraph::new();
        graph.insert_endpoint(40, EndpointKind::Sink, "Speakers", "alsa.out", None);
        graph.insert_channel(40, PortDirection::Input, 0, "L");
        graph.insert_channel(40, PortDirection::Input, 1, "R");
        graph.set_default(EndpointKind::Sink, "alsa.out");
        graph
    }

    fn add_headphones(graph: &DeviceGraph) -> EndpointId {
        let id = graph.insert_endpoint(50, EndpointKind::Sink, "Headphones", "usb.dac", None);
        graph.insert_channel(50, PortDirection::Input, 0, "FL");
        graph.insert_channel(50, PortDirection::Input, 1, "FR");
        id
    }

    fn stereo_bus(model: &mut MappingModel) -> BusId {
        model.add_bus("lspeaker", SpeakerBus::front())
    }

    #[test]
    fn test_add_full_to_default_then_search() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let speakers = Target::Endpoint(snap.endpoints[0].id);
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        let m = model.add_full(bus, Target::Default, &snap).unwrap();
        assert_eq!(m.gain_db, 0.0);
        assert!(model.dirty);
        assert!(!model.full_mapping_available(bus, Target::Default, &snap));
        assert_eq!(
            model.add_full(bus, Target::Default, &snap),
            Err(RouteError::Unavailable)
        );
        assert_eq!(
            model.find_next_available_target(bus, Target::Default, &snap),
            Some(speakers)
        );

        model.add_full(bus, speakers, &snap).unwrap();
        assert_eq!(model.add_full(bus, speakers, &snap), Err(RouteError::Unavailable));
        assert_eq!(model.find_next_available_target(bus, speakers, &snap), None);
        assert_eq!(model.mappings_for(bus).len(), 2);
    }

    #[test]
    fn test_default_needs_a_default_sink() {
        let graph = DeviceGraph::new();
        graph.insert_endpoint(40, EndpointKind::Sink, "Speakers", "alsa.out", None);
        graph.insert_channel(40, PortDirection::Input, 0, "MONO");
        let snap = graph.snapshot();
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        assert!(!model.full_mapping_available(bus, Target::Default, &snap));
        assert_eq!(
            model.add_full(bus, Target::Default, &snap),
            Err(RouteError::Unavailable)
        );
        assert_eq!(
            model.find_first_available_target(bus, &snap),
            Some(Target::Endpoint(EndpointId(1)))
        );
    }

    #[test]
    fn test_add_errors() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        assert_eq!(
            model.add_full(BusId(99), Target::Default, &snap),
            Err(RouteError::UnknownBus(BusId(99)))
        );
        assert_eq!(
            model.add_full(bus, Target::Endpoint(EndpointId(7)), &snap),
            Err(RouteError::NotFound(EndpointId(7)))
        );
        assert_eq!(
            model.add_channel(bus, 2, Target::Default, 0, &snap),
            Err(RouteError::ChannelOutOfRange { channel: 2, count: 2 })
        );
        assert_eq!(
            model.add_channel(bus, 0, Target::Default, 5, &snap),
            Err(RouteError::ChannelOutOfRange { channel: 5, count: 2 })
        );
        assert!(model.mappings_for(bus).is_empty());
    }

    #[test]
    fn test_channel_triples_are_unique() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let speakers = Target::Endpoint(snap.endpoints[0].id);
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        model.add_channel(bus, 0, speakers, 1, &snap).unwrap();
        assert_eq!(
            model.add_channel(bus, 0, speakers, 1, &snap),
            Err(RouteError::Unavailable)
        );
        // the default is a distinct target even though it resolves to the same endpoint
        assert!(model.add_channel(bus, 0, Target::Default, 1, &snap).is_ok());
        assert!(model.add_channel(bus, 1, speakers, 1, &snap).is_ok());
        // full and channel mappings are keyed independently
        assert!(model.add_full(bus, speakers, &snap).is_ok());
    }

    #[test]
    fn test_first_channel_triple_prefers_default() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        assert_eq!(
            model.find_first_available_channel_target(bus, &snap),
            Some((0, Target::Default, 0))
        );
        model.add_channel(bus, 0, Target::Default, 0, &snap).unwrap();
        assert_eq!(
            model.find_first_available_channel_target(bus, &snap),
            Some((0, Target::Default, 1))
        );
    }

    #[test]
    fn test_channel_search_skips_narrow_endpoints() {
        let graph = stereo_graph();
        graph.insert_endpoint(60, EndpointKind::Sink, "Mono", "mono.out", None);
        graph.insert_channel(60, PortDirection::Input, 0, "MONO");
        let headphones = Target::Endpoint(add_headphones(&graph));
        let snap = graph.snapshot();
        let speakers = Target::Endpoint(snap.endpoints[0].id);
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        model.add_channel(bus, 0, speakers, 1, &snap).unwrap();
        assert_eq!(
            model.find_next_available_channel_target(bus, 0, speakers, 1, &snap),
            Some(headphones)
        );
        assert_eq!(
            model.find_previous_available_channel_target(bus, 0, headphones, 1, &snap),
            Some(Target::Default)
        );
    }

    #[test]
    fn test_cycle_channels() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let mut model = MappingModel::new();
        let bus = model.add_bus("quad", SpeakerBus::corners());

        let a = model.add_channel(bus, 0, Target::Default, 0, &snap).unwrap();
        model.add_channel(bus, 1, Target::Default, 0, &snap).unwrap();
        assert_eq!(model.find_guest_channel(&a.key, Direction::Forward, &snap), Some(2));
        assert_eq!(model.find_guest_channel(&a.key, Direction::Backward, &snap), Some(3));
        assert_eq!(model.find_target_channel(&a.key, Direction::Forward, &snap), Some(1));
        let full = MappingKey::Full {
            bus,
            target: Target::Default,
        };
        assert_eq!(model.find_guest_channel(&full, Direction::Forward, &snap), None);
    }

    #[test]
    fn test_replace_keeps_gain_and_row() {
        let graph = stereo_graph();
        let headphones = Target::Endpoint(add_headphones(&graph));
        let snap = graph.snapshot();
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        let first = model.add_full(bus, Target::Default, &snap).unwrap();
        model.add_channel(bus, 0, Target::Default, 0, &snap).unwrap();
        model.set_gain(&first.key, -6.2);

        let moved = model
            .replace(&first.key, first.key.with_target(headphones), &snap)
            .unwrap();
        assert_eq!(moved.gain_db, -6.0);
        assert_eq!(model.mappings_for(bus)[0].key, moved.key);
        assert!(model.mapping(&first.key).is_none());

        // refused replacement leaves everything as it was
        let channel = model.mappings_for(bus)[1].key;
        let bad = MappingKey::Channel {
            bus,
            guest_channel: 0,
            target: Target::Default,
            target_channel: 9,
        };
        assert!(model.replace(&channel, bad, &snap).is_err());
        assert!(model.mapping(&channel).is_some());
        assert_eq!(
            model.replace(&first.key, moved.key, &snap),
            Err(RouteError::NoMapping)
        );
    }

    #[test]
    fn test_remove_and_set_gain() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);

        let m = model.add_full(bus, Target::Default, &snap).unwrap();
        assert_eq!(model.set_gain(&m.key, 40.0), Some(12.0));
        assert_eq!(model.mapping(&m.key).unwrap().gain_db, 12.0);
        assert_eq!(model.remove(&m.key).unwrap().gain_db, 12.0);
        assert!(model.remove(&m.key).is_none());
        assert!(model.set_gain(&m.key, 0.0).is_none());
        assert!(model.full_mapping_available(bus, Target::Default, &snap));
    }

    #[test]
    fn test_export_import_round_trip() {
        let graph = stereo_graph();
        let snap = graph.snapshot();
        let speakers = Target::Endpoint(snap.endpoints[0].id);
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);
        let m = model.add_full(bus, Target::Default, &snap).unwrap();
        model.set_gain(&m.key, -3.0);
        model.add_channel(bus, 1, speakers, 0, &snap).unwrap();

        let records = model.export();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].full[0].target, DEFAULT_TARGET_NAME);
        assert_eq!(records[0].channel[0].target, "Speakers");

        let mut restored = MappingModel::new();
        let bus = stereo_bus(&mut restored);
        assert_eq!(restored.import(records, &snap), 2);
        assert!(!restored.dirty);
        assert_eq!(restored.mappings_for(bus), model.mappings_for(bus));
    }

    #[test]
    fn test_unresolved_records_stay_pending() {
        let graph = stereo_graph();
        let mut model = MappingModel::new();
        let mut record = BusRecord::new("lspeaker");
        record.full.push(FullRecord {
            target: "Headphones".to_string(),
            gain_db: -1.0,
        });
        let mut later = BusRecord::new("rspeaker");
        later.full.push(FullRecord {
            target: DEFAULT_TARGET_NAME.to_string(),
            gain_db: 0.0,
        });

        let bus = stereo_bus(&mut model);
        assert_eq!(model.import(vec![record, later], &graph.snapshot()), 0);
        assert_eq!(model.pending().len(), 2);
        // pending records survive a save
        assert_eq!(model.export().len(), 2);

        let headphones = add_headphones(&graph);
        let rbus = model.add_bus("rspeaker", SpeakerBus::front());
        assert_eq!(model.resolve_pending(&graph.snapshot()), 2);
        assert!(model.pending().is_empty());
        assert_eq!(
            model.mappings_for(bus)[0].key.target(),
            Target::Endpoint(headphones)
        );
        assert_eq!(model.mappings_for(rbus).len(), 1);
    }

    #[test]
    fn test_unplugged_target_is_still_saved() {
        let graph = stereo_graph();
        let headphones = Target::Endpoint(add_headphones(&graph));
        let mut model = MappingModel::new();
        let bus = stereo_bus(&mut model);
        model.add_full(bus, headphones, &graph.snapshot()).unwrap();
        graph.remove_object(50);
        model.refresh_names(&graph.snapshot());
        assert_eq!(model.export()[0].full[0].target, "Headphones");
    }
}
