use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::discovery::channel_position;
use super::types::*;

#[derive(Debug)]
struct GraphInner {
    endpoints: BTreeMap<EndpointId, Endpoint>,
    by_object: HashMap<ObjectId, EndpointId>,
    /// Ids of endpoints that went away, by backend name, handed back on replug
    retired: HashMap<String, EndpointId>,
    next_id: u32,
    default_sink_name: String,
    default_source_name: String,
    routes: BTreeMap<SinkHandle, RouteBinding>,
    generation: u64,
}

impl Default for GraphInner {
    fn default() -> Self {
        Self {
            endpoints: BTreeMap::new(),
            by_object: HashMap::new(),
            retired: HashMap::new(),
            next_id: 1,
            default_sink_name: String::new(),
            default_source_name: String::new(),
            routes: BTreeMap::new(),
            generation: 1,
        }
    }
}

impl GraphInner {
    fn mark_changed(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn refresh_default_flags(&mut self) {
        for endpoint in self.endpoints.values_mut() {
            endpoint.is_default_sink =
                !self.default_sink_name.is_empty() && endpoint.text_id == self.default_sink_name;
            endpoint.is_default_source = !self.default_source_name.is_empty()
                && endpoint.text_id == self.default_source_name;
        }
    }

    fn endpoint_for_object(&mut self, object_id: ObjectId) -> Option<&mut Endpoint> {
        let id = *self.by_object.get(&object_id)?;
        self.endpoints.get_mut(&id)
    }
}

/// The discovered endpoint/channel topology.
///
/// All mutations happen under one graph-wide write lock, so any reader sees
/// an endpoint/channel set consistent with the generation it reads alongside.
/// Each logical change bumps the generation exactly once.
#[derive(Debug, Default)]
pub struct DeviceGraph {
    inner: RwLock<GraphInner>,
}

impl DeviceGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.read();
        let find = |name: &str| {
            if name.is_empty() {
                return EndpointId::NONE;
            }
            inner
                .endpoints
                .values()
                .find(|e| e.text_id == name)
                .map(|e| e.id)
                .unwrap_or(EndpointId::NONE)
        };
        GraphSnapshot {
            endpoints: inner.endpoints.values().cloned().collect(),
            default_sink: find(&inner.default_sink_name),
            default_source: find(&inner.default_source_name),
            routes: inner.routes.values().cloned().collect(),
            generation: inner.generation,
        }
    }

    pub fn get_endpoint(&self, id: EndpointId) -> Option<Endpoint> {
        self.inner.read().endpoints.get(&id).cloned()
    }

    /// Backend object behind an endpoint, used when opening streams.
    pub fn object_of(&self, id: EndpointId) -> Option<ObjectId> {
        self.inner.read().endpoints.get(&id).map(|e| e.object_id)
    }

    pub fn endpoint_of_object(&self, object_id: ObjectId) -> Option<EndpointId> {
        self.inner.read().by_object.get(&object_id).copied()
    }

    /// Register a discovered endpoint, or rename it if already known.
    ///
    /// An endpoint that re-appears with a backend name seen before gets its
    /// previous id back.
    pub fn insert_endpoint(
        &self,
        object_id: ObjectId,
        kind: EndpointKind,
        name: &str,
        text_id: &str,
        serial: Option<String>,
    ) -> EndpointId {
        let mut inner = self.inner.write();

        if let Some(endpoint) = inner.endpoint_for_object(object_id) {
            let id = endpoint.id;
            if endpoint.name != name {
                endpoint.name = name.to_string();
                inner.mark_changed();
            }
            return id;
        }

        let id = match inner.retired.remove(text_id) {
            Some(id) if !inner.endpoints.contains_key(&id) => id,
            _ => {
                let id = EndpointId(inner.next_id);
                inner.next_id += 1;
                id
            }
        };

        inner.endpoints.insert(
            id,
            Endpoint {
                id,
                object_id,
                kind,
                name: name.to_string(),
                text_id: text_id.to_string(),
                serial,
                sinks: Vec::new(),
                sources: Vec::new(),
                rate: RateRange::default(),
                is_default_sink: false,
                is_default_source: false,
            },
        );
        inner.by_object.insert(object_id, id);
        inner.refresh_default_flags();
        inner.mark_changed();
        log::debug!("Endpoint {} registered: {:?} (object {})", id, name, object_id);
        id
    }

    /// Remove the endpoint discovered as `object_id`.
    ///
    /// Open routes targeting it lose their target but stay open.
    pub fn remove_object(&self, object_id: ObjectId) -> Option<EndpointId> {
        let mut inner = self.inner.write();
        let id = inner.by_object.remove(&object_id)?;
        let endpoint = inner.endpoints.remove(&id)?;
        if !endpoint.text_id.is_empty() {
            inner.retired.insert(endpoint.text_id.clone(), id);
        }
        for route in inner.routes.values_mut() {
            if route.target == Some(id) {
                log::debug!("{} lost its target {}", route.handle, id);
                route.target = None;
            }
        }
        inner.mark_changed();
        log::debug!("Endpoint {} removed: {:?}", id, endpoint.name);
        Some(id)
    }

    /// Record a port of a known endpoint. Ports of unknown objects, and
    /// indices at or past [`MAX_CHANNELS`], are ignored.
    pub fn insert_channel(
        &self,
        object_id: ObjectId,
        direction: PortDirection,
        index: u32,
        name: &str,
    ) -> bool {
        if index >= MAX_CHANNELS {
            log::debug!("Object {}: port index {} out of range", object_id, index);
            return false;
        }
        let mut inner = self.inner.write();
        let Some(endpoint) = inner.endpoint_for_object(object_id) else {
            return false;
        };
        let channels = match direction {
            PortDirection::Input => &mut endpoint.sinks,
            PortDirection::Output => &mut endpoint.sources,
        };
        let index_usize = index as usize;
        let mut changed = false;
        while channels.len() <= index_usize {
            let i = channels.len() as u32;
            channels.push(Channel {
                index: i,
                name: "?".to_string(),
                position: None,
            });
            changed = true;
        }
        let channel = &mut channels[index_usize];
        if channel.name != name {
            channel.name = name.to_string();
            changed = true;
        }
        if channel.position.is_none() {
            channel.position = channel_position(name);
        }
        if changed {
            inner.mark_changed();
        }
        changed
    }

    /// Apply a format enumeration result to a known endpoint.
    pub fn set_format(&self, object_id: ObjectId, rate: RateRange, positions: &[String]) -> bool {
        let mut inner = self.inner.write();
        let Some(endpoint) = inner.endpoint_for_object(object_id) else {
            return false;
        };
        endpoint.rate = rate;
        for channels in [&mut endpoint.sinks, &mut endpoint.sources] {
            for (channel, code) in channels.iter_mut().zip(positions) {
                channel.position = Some(channel_position(code).unwrap_or([0.0, 0.0, 0.0]));
            }
        }
        inner.mark_changed();
        true
    }

    /// Change the system default sink or source, by backend name.
    pub fn set_default(&self, kind: EndpointKind, text_id: &str) -> bool {
        let mut inner = self.inner.write();
        let slot = match kind {
            EndpointKind::Sink => &mut inner.default_sink_name,
            EndpointKind::Source => &mut inner.default_source_name,
        };
        if slot == text_id {
            return false;
        }
        *slot = text_id.to_string();
        inner.refresh_default_flags();
        inner.mark_changed();
        true
    }

    /// Track a freshly opened stream.
    pub fn bind_route(&self, handle: SinkHandle, source_node: ObjectId, target: EndpointId) {
        self.inner.write().routes.insert(
            handle,
            RouteBinding {
                handle,
                source_node,
                target: Some(target),
                volumes: Vec::new(),
            },
        );
    }

    pub fn unbind_route(&self, handle: SinkHandle) -> Option<RouteBinding> {
        self.inner.write().routes.remove(&handle)
    }

    /// `None` if the stream is unknown, `Some(None)` if it lost its target.
    pub fn route_target(&self, handle: SinkHandle) -> Option<Option<EndpointId>> {
        self.inner.read().routes.get(&handle).map(|r| r.target)
    }

    /// A link from a stream node to an endpoint was created: follow it.
    pub fn reroute(&self, output_node: ObjectId, input_node: ObjectId) -> bool {
        let mut inner = self.inner.write();
        let Some(&target) = inner.by_object.get(&input_node) else {
            return false;
        };
        let mut changed = false;
        for route in inner.routes.values_mut() {
            if route.source_node == output_node && route.target != Some(target) {
                log::debug!("{} rerouted to {}", route.handle, target);
                route.target = Some(target);
                changed = true;
            }
        }
        if changed {
            inner.mark_changed();
        }
        changed
    }

    pub fn set_route_volumes(&self, handle: SinkHandle, db: Vec<f32>) -> bool {
        let mut inner = self.inner.write();
        let Some(route) = inner.routes.get_mut(&handle) else {
            return false;
        };
        if route.volumes == db {
            return false;
        }
        route.volumes = db;
        inner.mark_changed();
        true
    }

    /// Drop every endpoint and route, e.g. when the backend shuts down.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let generation = inner.generation;
        *inner = GraphInner::default();
        inner.generation = generation;
        inner.mark_changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speakers(graph: &DeviceGraph, object_id: ObjectId, text_id: &str) -> EndpointId {
        let id = graph.insert_endpoint(object_id, EndpointKind::Sink, "Speakers", text_id, None);
        graph.insert_channel(object_id, PortDirection::Input, 0, "FL");
        graph.insert_channel(object_id, PortDirection::Input, 1, "FR");
        id
    }

    #[test]
    fn test_ids_start_at_one_and_bump_generation() {
        let graph = DeviceGraph::new();
        let g0 = graph.generation();
        let id = graph.insert_endpoint(40, EndpointKind::Sink, "Speakers", "alsa.out", None);
        assert_eq!(id, EndpointId(1));
        assert_eq!(graph.generation(), g0 + 1);
    }

    #[test]
    fn test_channels_fill_gaps_and_positions() {
        let graph = DeviceGraph::new();
        let id = graph.insert_endpoint(40, EndpointKind::Sink, "Speakers", "alsa.out", None);
        graph.insert_channel(40, PortDirection::Input, 1, "FR");
        let endpoint = graph.get_endpoint(id).unwrap();
        assert_eq!(endpoint.sink_count(), 2);
        assert_eq!(endpoint.sinks[0].name, "?");
        assert_eq!(endpoint.sinks[1].position, Some([0.2, 0.0, 1.0]));
    }

    #[test]
    fn test_ports_of_unknown_nodes_are_ignored() {
        let graph = DeviceGraph::new();
        let g0 = graph.generation();
        assert!(!graph.insert_channel(99, PortDirection::Input, 0, "FL"));
        assert_eq!(graph.generation(), g0);
    }

    #[test]
    fn test_channel_index_is_bounded() {
        let graph = DeviceGraph::new();
        let id = graph.insert_endpoint(40, EndpointKind::Sink, "Speakers", "alsa.out", None);
        let before = graph.generation();
        assert!(!graph.insert_channel(40, PortDirection::Input, MAX_CHANNELS, "FL"));
        assert!(!graph.insert_channel(40, PortDirection::Input, u32::MAX, "FL"));
        assert_eq!(graph.generation(), before);
        assert_eq!(graph.get_endpoint(id).unwrap().sink_count(), 0);
        assert!(graph.insert_channel(40, PortDirection::Input, MAX_CHANNELS - 1, "AUX63"));
        assert_eq!(graph.get_endpoint(id).unwrap().sink_count(), MAX_CHANNELS);
    }

    #[test]
    fn test_unchanged_channel_keeps_generation() {
        let graph = DeviceGraph::new();
        speakers(&graph, 40, "alsa.out");
        let before = graph.generation();
        assert!(!graph.insert_channel(40, PortDirection::Input, 1, "FR"));
        assert_eq!(graph.generation(), before);
        assert!(graph.insert_channel(40, PortDirection::Input, 1, "RR"));
        assert_eq!(graph.generation(), before + 1);
    }

    #[test]
    fn test_replug_reuses_id() {
        let graph = DeviceGraph::new();
        let first = speakers(&graph, 40, "usb.dac");
        speakers(&graph, 41, "alsa.out");
        graph.remove_object(40);
        let again = speakers(&graph, 77, "usb.dac");
        assert_eq!(first, again);
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.endpoints[0].id, first);
        assert_eq!(snapshot.endpoints[0].object_id, 77);
    }

    #[test]
    fn test_default_sink_follows_name() {
        let graph = DeviceGraph::new();
        let id = speakers(&graph, 40, "alsa.out");
        assert!(!graph.snapshot().has_default_sink());
        assert!(graph.set_default(EndpointKind::Sink, "alsa.out"));
        assert!(!graph.set_default(EndpointKind::Sink, "alsa.out"));
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.default_sink, id);
        assert!(snapshot.endpoints[0].is_default_sink);
    }

    #[test]
    fn test_removing_target_drops_route_with_single_bump() {
        let graph = DeviceGraph::new();
        let id = speakers(&graph, 40, "alsa.out");
        graph.bind_route(SinkHandle(1), 500, id);
        let before = graph.generation();
        graph.remove_object(40);
        assert_eq!(graph.generation(), before + 1);
        assert_eq!(graph.route_target(SinkHandle(1)), Some(None));
    }

    #[test]
    fn test_reroute_follows_links() {
        let graph = DeviceGraph::new();
        let a = speakers(&graph, 40, "a");
        let b = speakers(&graph, 41, "b");
        graph.bind_route(SinkHandle(3), 500, a);
        assert!(graph.reroute(500, 41));
        assert_eq!(graph.route_target(SinkHandle(3)), Some(Some(b)));
        assert!(!graph.reroute(500, 41));
        assert!(!graph.reroute(500, 1234));
    }
}
