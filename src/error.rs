//! Error types for busmix.
//!
//! Nothing here is fatal to the process: every failure degrades to "the
//! mapping or route does not exist" or "silence is emitted".

use std::path::PathBuf;

use crate::graph::EndpointId;
use crate::mapping::BusId;

/// Failures returned by mapping and route operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    /// The requested target (or target channel) is already taken by another
    /// mapping of the same bus, or it is the floating default and no default
    /// sink currently exists.
    #[error("mapping target unavailable")]
    Unavailable,

    /// The referenced endpoint is no longer part of the device graph.
    #[error("endpoint {0} not found")]
    NotFound(EndpointId),

    /// The mapping being edited does not exist (any more).
    #[error("no such mapping")]
    NoMapping,

    /// The speaker bus handle does not belong to this model.
    #[error("unknown speaker bus {0}")]
    UnknownBus(BusId),

    /// A guest or target channel index is outside the valid range.
    #[error("channel {channel} out of range (0..{count})")]
    ChannelOutOfRange { channel: u32, count: u32 },

    /// The backend refused or failed to open a route.
    #[error("backend failure: {0}")]
    BackendFailure(String),

    /// The backend did not report the negotiated gain in time.
    #[error("backend did not confirm the stream within {0} ms")]
    OpenTimeout(u64),
}

/// Failures loading or saving configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration directory available")]
    NoConfigDir,

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
