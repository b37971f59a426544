//! busmix - routes emulated speaker buses to host audio devices
//!
//! An emulated machine exposes one or more speaker buses (interleaved
//! 16-bit PCM with a fixed channel count). busmix tracks the audio
//! endpoints the host announces, lets the user map each bus, whole or
//! channel by channel, onto those endpoints with a per-mapping gain, and
//! plays the bus frames into one backend stream per mapping.

pub mod backend;
pub mod config;
pub mod editor;
pub mod error;
pub mod graph;
pub mod mapping;
pub mod playback;
pub mod session;

pub use error::{ConfigError, RouteError};
pub use session::Session;
