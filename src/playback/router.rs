//! Open routes, one per mapping.
//!
//! A route realises one mapping against the backend: a sink stream, the
//! feed the backend pulls from, and a peak meter. Full mappings carry the
//! bus frames unchanged and let the backend lay them out; channel mappings
//! carry frames as wide as the target endpoint, with the guest channel
//! placed on the target channel and every other channel silent.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use super::feed::RouteFeed;
use super::peak::PeakMeter;
use crate::backend::{AudioBackend, SinkRequest};
use crate::error::RouteError;
use crate::graph::{DeviceGraph, EndpointId, GraphSnapshot, SinkHandle};
use crate::mapping::{BusId, Mapping, MappingKey, SpeakerBus, Target};

/// Whether a route is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Active,
    /// The target endpoint vanished; queued frames are discarded
    Dropped,
}

/// How bus frames become route frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameLayout {
    Verbatim,
    Scatter {
        guest_channel: usize,
        target_channel: usize,
        width: usize,
    },
}

#[derive(Debug)]
struct Route {
    handle: SinkHandle,
    endpoint: EndpointId,
    bus_channels: usize,
    layout: FrameLayout,
    feed: Arc<RouteFeed>,
    meter: PeakMeter,
    gain_db: f32,
    /// Per-channel gain the backend reported when the stream came up
    initial_volumes: Vec<f32>,
}

/// Public view of an open route
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub key: MappingKey,
    pub handle: SinkHandle,
    /// Endpoint the route was opened against
    pub endpoint: EndpointId,
    pub channels: usize,
    pub gain_db: f32,
    pub initial_volumes: Vec<f32>,
    pub state: RouteState,
}

/// Router settings
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub sample_rate: u32,
    pub open_timeout: Duration,
    pub peak_buckets_per_second: u32,
}

/// All open routes
pub struct Router {
    graph: Arc<DeviceGraph>,
    config: RouterConfig,
    routes: HashMap<MappingKey, Route>,
    scratch: Vec<i16>,
}

impl Router {
    pub fn new(graph: Arc<DeviceGraph>, config: RouterConfig) -> Self {
        Self {
            graph,
            config,
            routes: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    /// Open a route for `mapping` and wait for the backend to confirm it.
    ///
    /// Fails with `OpenTimeout` when the backend does not report the
    /// negotiated gain in time; nothing is left behind on failure.
    pub fn open(
        &mut self,
        backend: &mut dyn AudioBackend,
        bus: &SpeakerBus,
        mapping: &Mapping,
        snapshot: &GraphSnapshot,
    ) -> Result<SinkHandle, RouteError> {
        let key = mapping.key;
        if let Some(route) = self.routes.get(&key) {
            return Ok(route.handle);
        }

        let target = key.target();
        let endpoint_id = target.resolve(snapshot).ok_or(match target {
            Target::Default => RouteError::Unavailable,
            Target::Endpoint(id) => RouteError::NotFound(id),
        })?;
        let endpoint = snapshot
            .endpoint(endpoint_id)
            .ok_or(RouteError::NotFound(endpoint_id))?;

        let bus_channels = bus.channels() as usize;
        if bus_channels == 0 {
            return Err(RouteError::ChannelOutOfRange { channel: 0, count: 0 });
        }
        let (layout, channels) = match key {
            MappingKey::Full { .. } => (FrameLayout::Verbatim, bus_channels),
            MappingKey::Channel {
                guest_channel,
                target_channel,
                ..
            } => {
                if guest_channel as usize >= bus_channels {
                    return Err(RouteError::ChannelOutOfRange {
                        channel: guest_channel,
                        count: bus_channels as u32,
                    });
                }
                let width = endpoint.sink_count() as usize;
                if target_channel as usize >= width {
                    return Err(RouteError::ChannelOutOfRange {
                        channel: target_channel,
                        count: width as u32,
                    });
                }
                let layout = FrameLayout::Scatter {
                    guest_channel: guest_channel as usize,
                    target_channel: target_channel as usize,
                    width,
                };
                (layout, width)
            }
        };

        let feed = RouteFeed::new(channels);
        let name = match key {
            MappingKey::Full { .. } => bus.name.clone(),
            MappingKey::Channel { guest_channel, .. } => {
                format!("{}:{}", bus.name, bus.position_name(guest_channel))
            }
        };
        let request = SinkRequest {
            node: match target {
                Target::Default => None,
                Target::Endpoint(_) => Some(endpoint.object_id),
            },
            name,
            rate: self.config.sample_rate,
            channels: channels as u32,
            feed: feed.clone(),
        };

        let pending = backend.open_sink(request)?;
        let initial_volumes = match pending.initial_gain.recv_timeout(self.config.open_timeout) {
            Ok(volumes) => volumes,
            Err(e) => {
                log::warn!("{} for {} was not confirmed: {}", pending.handle, key, e);
                feed.close();
                backend.close(pending.handle);
                return Err(match e {
                    RecvTimeoutError::Timeout => {
                        RouteError::OpenTimeout(self.config.open_timeout.as_millis() as u64)
                    }
                    RecvTimeoutError::Disconnected => {
                        RouteError::BackendFailure(format!("{} closed before starting", pending.handle))
                    }
                });
            }
        };

        self.graph
            .bind_route(pending.handle, pending.source_node, endpoint_id);
        backend.set_gain(pending.handle, &vec![mapping.gain_db; channels]);

        log::info!(
            "Opened {} for {} on {:?} ({} channels)",
            pending.handle,
            key,
            endpoint.display_name(),
            channels
        );
        self.routes.insert(
            key,
            Route {
                handle: pending.handle,
                endpoint: endpoint_id,
                bus_channels,
                layout,
                feed,
                meter: PeakMeter::new(
                    channels,
                    self.config.sample_rate,
                    self.config.peak_buckets_per_second,
                ),
                gain_db: mapping.gain_db,
                initial_volumes,
            },
        );
        Ok(pending.handle)
    }

    /// Close the route of `key`. Returns false if none was open.
    pub fn close(&mut self, backend: &mut dyn AudioBackend, key: &MappingKey) -> bool {
        let Some(route) = self.routes.remove(key) else {
            return false;
        };
        // detach the buffer before the backend lets go of the stream
        route.feed.close();
        backend.close(route.handle);
        self.graph.unbind_route(route.handle);
        log::info!("Closed {} for {}", route.handle, key);
        true
    }

    pub fn close_all(&mut self, backend: &mut dyn AudioBackend) {
        let keys: Vec<MappingKey> = self.routes.keys().copied().collect();
        for key in keys {
            self.close(backend, &key);
        }
    }

    /// Push a new gain to the route of `key`, if open and changed.
    pub fn set_gain(&mut self, backend: &mut dyn AudioBackend, key: &MappingKey, db: f32) -> bool {
        let Some(route) = self.routes.get_mut(key) else {
            return false;
        };
        if route.gain_db == db {
            return false;
        }
        route.gain_db = db;
        backend.set_gain(route.handle, &vec![db; route.feed.channels()]);
        true
    }

    /// Queue one chunk of bus frames on every route of `bus`.
    ///
    /// Routes whose target vanished discard the chunk. Returns the number
    /// of routes that took it.
    pub fn enqueue(&mut self, bus: BusId, samples: &[i16]) -> usize {
        let mut fed = 0;
        for (key, route) in self.routes.iter_mut() {
            if key.bus() != bus {
                continue;
            }
            if self.graph.route_target(route.handle) == Some(None) {
                continue;
            }
            let frames: &[i16] = match route.layout {
                FrameLayout::Verbatim => samples,
                FrameLayout::Scatter {
                    guest_channel,
                    target_channel,
                    width,
                } => {
                    let count = samples.len() / route.bus_channels;
                    self.scratch.clear();
                    self.scratch.resize(count * width, 0);
                    for (frame, out) in samples
                        .chunks_exact(route.bus_channels)
                        .zip(self.scratch.chunks_exact_mut(width))
                    {
                        out[target_channel] = frame[guest_channel];
                    }
                    &self.scratch
                }
            };
            route.meter.record(frames);
            if route.feed.enqueue(frames) {
                fed += 1;
            }
        }
        fed
    }

    pub fn handle(&self, key: &MappingKey) -> Option<SinkHandle> {
        self.routes.get(key).map(|r| r.handle)
    }

    pub fn is_open(&self, key: &MappingKey) -> bool {
        self.routes.contains_key(key)
    }

    pub fn state(&self, key: &MappingKey) -> Option<RouteState> {
        let route = self.routes.get(key)?;
        Some(match self.graph.route_target(route.handle) {
            Some(None) => RouteState::Dropped,
            _ => RouteState::Active,
        })
    }

    /// Endpoint the route was opened against.
    pub fn endpoint(&self, key: &MappingKey) -> Option<EndpointId> {
        self.routes.get(key).map(|r| r.endpoint)
    }

    pub fn gain(&self, key: &MappingKey) -> Option<f32> {
        self.routes.get(key).map(|r| r.gain_db)
    }

    pub fn keys(&self) -> Vec<MappingKey> {
        self.routes.keys().copied().collect()
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = self
            .routes
            .iter()
            .map(|(key, route)| RouteInfo {
                key: *key,
                handle: route.handle,
                endpoint: route.endpoint,
                channels: route.feed.channels(),
                gain_db: route.gain_db,
                initial_volumes: route.initial_volumes.clone(),
                state: self.state(key).unwrap_or(RouteState::Active),
            })
            .collect();
        routes.sort_by_key(|r| r.handle);
        routes
    }

    /// Feed of an open route, for inspection.
    pub fn feed(&self, key: &MappingKey) -> Option<Arc<RouteFeed>> {
        self.routes.get(key).map(|r| r.feed.clone())
    }

    /// Finished peak buckets of every route.
    pub fn take_peaks(&mut self) -> Vec<(MappingKey, Vec<f32>)> {
        self.routes
            .iter_mut()
            .map(|(key, route)| (*key, route.meter.take()))
            .collect()
    }
}
