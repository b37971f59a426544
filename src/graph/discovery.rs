//! Translation of backend discovery events into device graph updates.
//!
//! Events are property dictionaries in the shape host audio services publish
//! them. An event missing a field it needs is logged and skipped; it never
//! aborts the event stream.

use super::state::DeviceGraph;
use super::types::*;

/// Known channel names and their spatial hints.
const CHANNEL_POSITIONS: &[(&str, Position)] = &[
    ("MONO", [0.0, 0.0, 1.0]),
    ("FL", [-0.2, 0.0, 1.0]),
    ("FR", [0.2, 0.0, 1.0]),
    ("FC", [0.0, 0.0, 1.0]),
    ("LFE", [0.0, -0.5, 1.0]),
    ("RL", [-0.2, 0.0, -0.5]),
    ("RR", [0.2, 0.0, -0.5]),
    ("RC", [0.0, 0.0, -0.5]),
];

pub const DEFAULT_SINK_KEY: &str = "default.audio.sink";
pub const DEFAULT_SOURCE_KEY: &str = "default.audio.source";

/// Spatial hint of a channel name, if it is a well-known one.
pub fn channel_position(name: &str) -> Option<Position> {
    CHANNEL_POSITIONS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, p)| *p)
}

/// Parsed form of a node global
#[derive(Debug, Clone, PartialEq)]
struct NodeInfo {
    kind: EndpointKind,
    name: String,
    text_id: String,
    serial: Option<String>,
}

fn parse_node(props: &Properties) -> Option<NodeInfo> {
    let kind = match props.get("media.class").map(String::as_str) {
        Some("Audio/Sink") => EndpointKind::Sink,
        Some("Audio/Source") => EndpointKind::Source,
        _ => return None,
    };
    let name = props
        .get("node.description")
        .or_else(|| props.get("node.nick"))
        .cloned()
        .unwrap_or_else(|| "?".to_string());
    let text_id = props
        .get("node.name")
        .cloned()
        .unwrap_or_else(|| "?".to_string());

    Some(NodeInfo {
        kind,
        name,
        text_id,
        serial: props.get("object.serial").cloned(),
    })
}

/// Parsed form of a port global
#[derive(Debug, Clone, PartialEq)]
struct PortInfo {
    node_id: ObjectId,
    index: u32,
    direction: PortDirection,
    name: String,
}

fn parse_port(id: ObjectId, props: &Properties) -> Option<PortInfo> {
    let node_id = match props.get("node.id").map(|v| v.parse::<ObjectId>()) {
        Some(Ok(node_id)) => node_id,
        other => {
            log::debug!("Port {}: missing or invalid node.id ({:?})", id, other);
            return None;
        }
    };
    let index = match props.get("port.id").map(|v| v.parse::<u32>()) {
        Some(Ok(index)) => index,
        other => {
            log::debug!("Port {}: missing or invalid port.id ({:?})", id, other);
            return None;
        }
    };
    if index >= MAX_CHANNELS {
        log::debug!("Port {}: port.id {} out of range", id, index);
        return None;
    }
    let direction = match props.get("port.direction").map(String::as_str) {
        Some("in") => PortDirection::Input,
        _ => PortDirection::Output,
    };
    let name = props
        .get("audio.channel")
        .cloned()
        .unwrap_or_else(|| "?".to_string());

    Some(PortInfo {
        node_id,
        index,
        direction,
        name,
    })
}

fn parse_link(props: &Properties) -> Option<(ObjectId, ObjectId)> {
    Some((
        props.get("link.output.node")?.parse().ok()?,
        props.get("link.input.node")?.parse().ok()?,
    ))
}

/// Extract the node name from a default-target metadata value.
///
/// Values are either plain names or JSON objects carrying a `name` field.
pub fn parse_default_value(value_type: Option<&str>, value: &str) -> String {
    if value_type == Some("Spa:String:JSON")
        && let Ok(serde_json::Value::Object(map)) = serde_json::from_str(value)
        && let Some(serde_json::Value::String(name)) = map.get("name")
    {
        return name.clone();
    }
    value.to_string()
}

/// Events announcing a sink endpoint with input ports named `channels`.
///
/// Port globals get ids following `object_id`. Used by software backends.
pub fn announce_sink(object_id: ObjectId, text_id: &str, name: &str, channels: &[&str]) -> Vec<BackendEvent> {
    let node_id = object_id.to_string();
    let mut events = vec![BackendEvent::Global {
        id: object_id,
        kind: ObjectKind::Node,
        props: props([
            ("media.class", "Audio/Sink"),
            ("node.name", text_id),
            ("node.description", name),
        ]),
    }];
    for (index, channel) in channels.iter().enumerate() {
        let port_id = index.to_string();
        events.push(BackendEvent::Global {
            id: object_id + 1 + index as ObjectId,
            kind: ObjectKind::Port,
            props: props([
                ("node.id", node_id.as_str()),
                ("port.id", port_id.as_str()),
                ("port.direction", "in"),
                ("audio.channel", channel),
            ]),
        });
    }
    events
}

/// Event making `text_id` the default sink.
pub fn announce_default_sink(text_id: &str) -> BackendEvent {
    BackendEvent::Metadata {
        key: DEFAULT_SINK_KEY.to_string(),
        value_type: Some("Spa:String:JSON".to_string()),
        value: Some(serde_json::json!({ "name": text_id }).to_string()),
    }
}

/// Apply one backend event to the graph. Returns true if the graph changed.
pub fn apply_event(graph: &DeviceGraph, event: BackendEvent) -> bool {
    match event {
        BackendEvent::Global { id, kind, props } => match kind {
            ObjectKind::Node => match parse_node(&props) {
                Some(node) => {
                    let before = graph.generation();
                    graph.insert_endpoint(id, node.kind, &node.name, &node.text_id, node.serial);
                    graph.generation() != before
                }
                None => false,
            },
            ObjectKind::Port => match parse_port(id, &props) {
                Some(port) => graph.insert_channel(port.node_id, port.direction, port.index, &port.name),
                None => false,
            },
            ObjectKind::Link => match parse_link(&props) {
                Some((output, input)) => graph.reroute(output, input),
                None => {
                    log::debug!("Link {}: missing node ends", id);
                    false
                }
            },
        },
        BackendEvent::GlobalRemoved(id) => graph.remove_object(id).is_some(),
        BackendEvent::NodeFormat { id, rate, positions } => graph.set_format(id, rate, &positions),
        BackendEvent::Metadata {
            key,
            value_type,
            value,
        } => {
            let kind = match key.as_str() {
                DEFAULT_SINK_KEY => EndpointKind::Sink,
                DEFAULT_SOURCE_KEY => EndpointKind::Source,
                _ => return false,
            };
            let name = value
                .map(|v| parse_default_value(value_type.as_deref(), &v))
                .unwrap_or_default();
            graph.set_default(kind, &name)
        }
        BackendEvent::StreamVolumes { handle, db } => graph.set_route_volumes(handle, db),
        BackendEvent::Error(message) => {
            log::error!("Audio backend error: {}", message);
            false
        }
    }
}
