use std::fmt;

use crate::graph::{EndpointId, GraphSnapshot, Position};

/// Handle of a speaker bus, stable for the session's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusId(pub u32);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus {}", self.0)
    }
}

/// Names of the usual speaker placements.
const POSITION_NAMES: &[(Position, &str)] = &[
    ([0.0, 0.0, 1.0], "Front center"),
    ([-0.2, 0.0, 1.0], "Front left"),
    ([0.0, -0.5, 1.0], "Front floor"),
    ([0.2, 0.0, 1.0], "Front right"),
    ([0.0, 0.0, -0.5], "Rear center"),
    ([-0.2, 0.0, -0.5], "Rear left"),
    ([0.2, 0.0, -0.5], "Rear right"),
    ([0.0, 0.0, -0.1], "Headrest center"),
    ([-0.1, 0.0, -0.1], "Headrest left"),
    ([0.1, 0.0, -0.1], "Headrest right"),
    ([0.0, -0.5, 0.0], "Seat"),
    ([0.0, -0.2, 0.1], "Backrest"),
];

pub const FRONT_LEFT: Position = [-0.2, 0.0, 1.0];
pub const FRONT_RIGHT: Position = [0.2, 0.0, 1.0];
pub const FRONT_CENTER: Position = [0.0, 0.0, 1.0];
pub const REAR_LEFT: Position = [-0.2, 0.0, -0.5];
pub const REAR_RIGHT: Position = [0.2, 0.0, -0.5];

/// An emulated multichannel audio source
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerBus {
    pub id: BusId,
    /// Tag shown in the editor and used as the persistence key
    pub name: String,
    /// One spatial hint per channel; the length is the channel count
    pub positions: Vec<Position>,
}

impl SpeakerBus {
    pub fn channels(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Front left/right pair
    pub fn front() -> Vec<Position> {
        vec![FRONT_LEFT, FRONT_RIGHT]
    }

    /// Rear left/right pair
    pub fn rear() -> Vec<Position> {
        vec![REAR_LEFT, REAR_RIGHT]
    }

    /// Front pair followed by rear pair
    pub fn corners() -> Vec<Position> {
        vec![FRONT_LEFT, FRONT_RIGHT, REAR_LEFT, REAR_RIGHT]
    }

    /// Human-readable name of a channel's placement, `#n` when unusual.
    pub fn position_name(&self, channel: u32) -> String {
        self.positions
            .get(channel as usize)
            .and_then(|p| POSITION_NAMES.iter().find(|(q, _)| q == p))
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("#{}", channel))
    }
}

/// Where a mapping sends audio.
///
/// `Default` floats with the system default sink and is never stored as the
/// concrete endpoint it currently resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Default,
    Endpoint(EndpointId),
}

impl Target {
    /// Raw id form: 0 for the default.
    pub fn from_raw(id: u32) -> Self {
        if id == 0 {
            Target::Default
        } else {
            Target::Endpoint(EndpointId(id))
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Target::Default => 0,
            Target::Endpoint(id) => id.0,
        }
    }

    pub fn is_default(self) -> bool {
        matches!(self, Target::Default)
    }

    /// Concrete endpoint this target plays to right now, if any.
    pub fn resolve(self, snapshot: &GraphSnapshot) -> Option<EndpointId> {
        let id = match self {
            Target::Default => snapshot.default_sink,
            Target::Endpoint(id) => id,
        };
        snapshot
            .endpoint(id)
            .filter(|e| e.has_sinks())
            .map(|e| e.id)
    }

    /// Sink channel count of the resolved endpoint, 0 when unresolved.
    pub fn sink_count(self, snapshot: &GraphSnapshot) -> u32 {
        self.resolve(snapshot)
            .and_then(|id| snapshot.endpoint(id))
            .map(|e| e.sink_count())
            .unwrap_or(0)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Default => f.write_str("[default]"),
            Target::Endpoint(id) => write!(f, "{}", id),
        }
    }
}

/// Whole-bus mapping: the backend lays the bus channels out on the endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullMapping {
    pub target: Target,
    pub gain_db: f32,
}

/// One bus channel to one endpoint channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMapping {
    pub guest_channel: u32,
    pub target: Target,
    pub target_channel: u32,
    pub gain_db: f32,
}

/// Identity of a mapping; gain is deliberately not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKey {
    Full {
        bus: BusId,
        target: Target,
    },
    Channel {
        bus: BusId,
        guest_channel: u32,
        target: Target,
        target_channel: u32,
    },
}

impl MappingKey {
    pub fn bus(&self) -> BusId {
        match *self {
            MappingKey::Full { bus, .. } | MappingKey::Channel { bus, .. } => bus,
        }
    }

    pub fn target(&self) -> Target {
        match *self {
            MappingKey::Full { target, .. } | MappingKey::Channel { target, .. } => target,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, MappingKey::Full { .. })
    }

    /// Same mapping pointed at another target.
    pub fn with_target(self, target: Target) -> Self {
        match self {
            MappingKey::Full { bus, .. } => MappingKey::Full { bus, target },
            MappingKey::Channel {
                bus,
                guest_channel,
                target_channel,
                ..
            } => MappingKey::Channel {
                bus,
                guest_channel,
                target,
                target_channel,
            },
        }
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKey::Full { bus, target } => write!(f, "{} > {}", bus, target),
            MappingKey::Channel {
                bus,
                guest_channel,
                target,
                target_channel,
            } => write!(f, "{}:{} > {}:{}", bus, guest_channel, target, target_channel),
        }
    }
}

/// A mapping together with its gain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mapping {
    pub key: MappingKey,
    pub gain_db: f32,
}

/// All mappings of one bus, in insertion order per kind
#[derive(Debug, Clone, PartialEq)]
pub struct BusMappings {
    pub bus: SpeakerBus,
    pub full: Vec<FullMapping>,
    pub channel: Vec<ChannelMapping>,
}

impl BusMappings {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.channel.is_empty()
    }

    /// Full mappings first, then channel mappings.
    pub fn mappings(&self) -> impl Iterator<Item = Mapping> + '_ {
        let bus = self.bus.id;
        self.full
            .iter()
            .map(move |m| Mapping {
                key: MappingKey::Full {
                    bus,
                    target: m.target,
                },
                gain_db: m.gain_db,
            })
            .chain(self.channel.iter().map(move |m| Mapping {
                key: MappingKey::Channel {
                    bus,
                    guest_channel: m.guest_channel,
                    target: m.target,
                    target_channel: m.target_channel,
                },
                gain_db: m.gain_db,
            }))
    }
}
