//! Control context
//!
//! A [`Session`] owns the device graph, the mapping model, the open routes
//! and the backend. It drains discovery events, applies editor input and
//! keeps the set of open routes in line with the mappings:
//!
//! - a resolvable mapping without a route gets one opened
//! - a route whose mapping is gone is closed
//! - a route whose target now resolves elsewhere (the default moved, or a
//!   vanished endpoint came back) is closed and reopened
//! - gain changes are pushed to the open route
//!
//! A route that failed to open is not retried until the graph changes.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

use crate::backend::AudioBackend;
use crate::config::{self, Settings};
use crate::editor::{EditorAction, MixerEditor};
use crate::error::{ConfigError, RouteError};
use crate::graph::{apply_event, BackendEvent, DeviceGraph, GraphSnapshot, Position};
use crate::mapping::{BusId, Mapping, MappingKey, MappingModel, Target};
use crate::playback::{PeakSummary, RouteState, Router};

pub struct Session {
    graph: Arc<DeviceGraph>,
    model: MappingModel,
    router: Router,
    backend: Box<dyn AudioBackend>,
    editor: MixerEditor,
    events: Option<Receiver<BackendEvent>>,
    settings: Settings,
    /// Generation of the graph the routes were last reconciled against
    synced_generation: u64,
    /// Mappings whose route failed to open, and the generation it failed at
    failed: HashMap<MappingKey, u64>,
    stopped: bool,
}

impl Session {
    /// Start `backend` and pick up whatever it has announced so far.
    pub fn start(mut backend: Box<dyn AudioBackend>, settings: Settings) -> Result<Self, RouteError> {
        let (tx, rx) = std::sync::mpsc::channel();
        backend.start(tx)?;
        log::info!("Session started on the {} backend", backend.name());

        let graph = DeviceGraph::new();
        let mut session = Self {
            router: Router::new(graph.clone(), settings.router_config()),
            graph,
            model: MappingModel::new(),
            backend,
            editor: MixerEditor::new(),
            events: Some(rx),
            settings,
            synced_generation: 0,
            failed: HashMap::new(),
            stopped: false,
        };
        session.process_events();
        Ok(session)
    }

    // ── Events ─────────────────────────────────────────────────────────────

    /// Apply every queued backend event. Returns how many were applied.
    ///
    /// When the graph changed, saved mappings waiting for an endpoint are
    /// restored and routes are reconciled.
    pub fn process_events(&mut self) -> usize {
        let mut count = 0;
        let mut disconnected = false;
        if let Some(events) = &self.events {
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        apply_event(&self.graph, event);
                        count += 1;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            log::warn!("Audio backend event channel closed");
            self.events = None;
        }

        if self.graph.generation() != self.synced_generation {
            let snapshot = self.graph.snapshot();
            self.model.refresh_names(&snapshot);
            self.model.resolve_pending(&snapshot);
            self.editor.refresh(&self.model);
            self.sync_routes();
        }
        count
    }

    /// Bring the open routes in line with the mappings.
    pub fn sync_routes(&mut self) {
        let snapshot = self.graph.snapshot();
        let wanted: HashSet<MappingKey> = self.model.all_mappings().map(|m| m.key).collect();

        for key in self.router.keys() {
            let stale = if !wanted.contains(&key) {
                true
            } else {
                let resolved = key.target().resolve(&snapshot);
                match self.router.state(&key) {
                    Some(RouteState::Dropped) => resolved.is_some(),
                    _ => resolved.is_some_and(|id| Some(id) != self.router.endpoint(&key)),
                }
            };
            if stale {
                self.router.close(self.backend.as_mut(), &key);
            }
        }

        for mapping in self.model.all_mappings() {
            let key = mapping.key;
            if self.router.is_open(&key) {
                self.router.set_gain(self.backend.as_mut(), &key, mapping.gain_db);
                continue;
            }
            if key.target().resolve(&snapshot).is_none() {
                continue;
            }
            if self.failed.get(&key) == Some(&snapshot.generation) {
                continue;
            }
            let Some(bus) = self.model.bus(key.bus()) else {
                continue;
            };
            match self.router.open(self.backend.as_mut(), bus, &mapping, &snapshot) {
                Ok(_) => {
                    self.failed.remove(&key);
                }
                Err(e) => {
                    log::warn!("Failed to open route for {}: {}", key, e);
                    self.failed.insert(key, snapshot.generation);
                }
            }
        }

        self.failed.retain(|key, _| wanted.contains(key));
        self.synced_generation = snapshot.generation;
    }

    // ── Mappings ───────────────────────────────────────────────────────────

    /// Register a speaker bus; saved mappings for it are restored.
    pub fn add_bus(&mut self, name: &str, positions: Vec<Position>) -> BusId {
        let bus = self.model.add_bus(name, positions);
        self.model.resolve_pending(&self.graph.snapshot());
        self.editor.refresh(&self.model);
        self.sync_routes();
        bus
    }

    pub fn add_full(&mut self, bus: BusId, target: Target) -> Result<Mapping, RouteError> {
        let mapping = self.model.add_full(bus, target, &self.graph.snapshot())?;
        self.mappings_changed();
        Ok(mapping)
    }

    pub fn add_channel(
        &mut self,
        bus: BusId,
        guest_channel: u32,
        target: Target,
        target_channel: u32,
    ) -> Result<Mapping, RouteError> {
        let mapping =
            self.model
                .add_channel(bus, guest_channel, target, target_channel, &self.graph.snapshot())?;
        self.mappings_changed();
        Ok(mapping)
    }

    pub fn remove(&mut self, key: &MappingKey) -> Option<Mapping> {
        let mapping = self.model.remove(key)?;
        self.mappings_changed();
        Some(mapping)
    }

    /// Set a mapping's gain and push it to its route. Returns the stored value.
    pub fn set_gain(&mut self, key: &MappingKey, db: f32) -> Option<f32> {
        let db = self.model.set_gain(key, db)?;
        self.mappings_changed();
        Some(db)
    }

    /// Feed one editor input. Returns whether anything changed.
    pub fn editor_action(&mut self, action: EditorAction) -> bool {
        let snapshot = self.graph.snapshot();
        if !self.editor.handle(action, &mut self.model, &snapshot) {
            return false;
        }
        self.sync_routes();
        true
    }

    fn mappings_changed(&mut self) {
        self.editor.refresh(&self.model);
        self.sync_routes();
    }

    // ── Playback ───────────────────────────────────────────────────────────

    /// Queue interleaved frames of `bus` on all of its routes.
    pub fn enqueue(&mut self, bus: BusId, samples: &[i16]) -> usize {
        self.router.enqueue(bus, samples)
    }

    /// Finished peak buckets per route, with their summary.
    pub fn take_peaks(&mut self) -> Vec<(MappingKey, Vec<f32>, PeakSummary)> {
        self.router
            .take_peaks()
            .into_iter()
            .map(|(key, series)| {
                let summary = PeakSummary::of(&series);
                (key, series, summary)
            })
            .collect()
    }

    // ── Persistence ────────────────────────────────────────────────────────

    pub fn save_mappings_to(&mut self, path: &Path) -> Result<(), ConfigError> {
        config::save_mappings_to(path, &self.model.export())?;
        self.model.dirty = false;
        Ok(())
    }

    /// Replace all mappings with the ones saved at `path`. Returns how many
    /// were restored right away; the rest wait for their bus or endpoint.
    pub fn load_mappings_from(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let records = config::load_mappings_from(path)?;
        let restored = self.model.import(records, &self.graph.snapshot());
        self.editor.refresh(&self.model);
        self.sync_routes();
        Ok(restored)
    }

    pub fn save_mappings(&mut self) -> Result<(), ConfigError> {
        let path = config::mappings_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_mappings_to(&path)
    }

    pub fn load_mappings(&mut self) -> Result<usize, ConfigError> {
        let path = config::mappings_path().ok_or(ConfigError::NoConfigDir)?;
        self.load_mappings_from(&path)
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    pub fn graph(&self) -> &Arc<DeviceGraph> {
        &self.graph
    }

    pub fn model(&self) -> &MappingModel {
        &self.model
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn editor(&self) -> &MixerEditor {
        &self.editor
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Close every route and stop the backend.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.router.close_all(self.backend.as_mut());
        self.backend.shutdown();
        self.events = None;
        self.graph.clear();
        log::info!("Session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
