use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an object on the backend side (node, port, link)
pub type ObjectId = u32;

/// Stable identifier of an endpoint in the device graph.
///
/// Id 0 is reserved: it never names a concrete endpoint and is used to mean
/// "no endpoint" in snapshot fields such as `default_sink`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub u32);

impl EndpointId {
    pub const NONE: EndpointId = EndpointId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of an open sink stream, assigned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkHandle(pub u32);

impl fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream {}", self.0)
    }
}

/// Spatial hint of a channel: x right, y up, z front, listener at origin.
pub type Position = [f64; 3];

/// Endpoint direction class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Playback device (speakers, headphones)
    Sink,
    /// Capture device (microphone, line in)
    Source,
}

/// Port direction as seen from the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Supported sample rates. A zero default means "use the configured rate".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRange {
    pub default_rate: u32,
    pub min_rate: u32,
    pub max_rate: u32,
}

impl RateRange {
    pub fn fixed(rate: u32) -> Self {
        Self {
            default_rate: rate,
            min_rate: rate,
            max_rate: rate,
        }
    }

    pub fn contains(&self, rate: u32) -> bool {
        self.default_rate == 0 || (self.min_rate..=self.max_rate).contains(&rate)
    }
}

/// Ports past this index are not tracked
pub const MAX_CHANNELS: u32 = 64;

/// One channel of an endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub index: u32,
    /// Channel name (e.g., "FL", "FR", "MONO")
    pub name: String,
    pub position: Option<Position>,
}

/// A discovered output or input device
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub id: EndpointId,
    /// Backend object the endpoint was discovered as
    pub object_id: ObjectId,
    pub kind: EndpointKind,
    /// Human-readable name, also used as the persisted target name
    pub name: String,
    /// Backend-internal name (e.g. `alsa_output.pci-0000_00_1f.3.analog-stereo`)
    pub text_id: String,
    pub serial: Option<String>,
    pub sinks: Vec<Channel>,
    pub sources: Vec<Channel>,
    pub rate: RateRange,
    pub is_default_sink: bool,
    pub is_default_source: bool,
}

impl Endpoint {
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.text_id.is_empty() {
            &self.text_id
        } else {
            "Unknown"
        }
    }

    pub fn sink_count(&self) -> u32 {
        self.sinks.len() as u32
    }

    pub fn has_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }
}

/// An open stream as the graph sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RouteBinding {
    pub handle: SinkHandle,
    /// Backend node created for the stream itself
    pub source_node: ObjectId,
    /// Endpoint the stream currently plays to; `None` once it vanished
    pub target: Option<EndpointId>,
    /// Per-channel gain last reported by the backend
    pub volumes: Vec<f32>,
}

/// Consistent copy of the device graph at one generation
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    /// Endpoints in stable (id) order
    pub endpoints: Vec<Endpoint>,
    pub default_sink: EndpointId,
    pub default_source: EndpointId,
    pub routes: Vec<RouteBinding>,
    pub generation: u64,
}

impl GraphSnapshot {
    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn index_of(&self, id: EndpointId) -> Option<usize> {
        self.endpoints.iter().position(|e| e.id == id)
    }

    pub fn endpoint_by_name(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.display_name() == name)
    }

    pub fn has_default_sink(&self) -> bool {
        !self.default_sink.is_none() && self.endpoint(self.default_sink).is_some()
    }
}

/// Kind of a global announced by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Node,
    Port,
    Link,
}

/// Property dictionary attached to a discovered global
pub type Properties = BTreeMap<String, String>;

/// Messages from the backend thread to the control context
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A global was announced
    Global {
        id: ObjectId,
        kind: ObjectKind,
        props: Properties,
    },
    /// A global was removed
    GlobalRemoved(ObjectId),
    /// Format enumeration result for a node
    NodeFormat {
        id: ObjectId,
        rate: RateRange,
        /// Channel position names in channel order (e.g. "FL", "FR")
        positions: Vec<String>,
    },
    /// A key of the default-target metadata changed
    Metadata {
        key: String,
        value_type: Option<String>,
        value: Option<String>,
    },
    /// Per-channel gain reported for an open stream after it was opened
    StreamVolumes { handle: SinkHandle, db: Vec<f32> },
    /// Backend connection error
    Error(String),
}

/// Build a property dictionary from key/value pairs.
pub fn props<const N: usize>(pairs: [(&str, &str); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
