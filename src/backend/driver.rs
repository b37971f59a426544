//! Interface between the core and a host audio service.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};

use crate::error::RouteError;
use crate::graph::{BackendEvent, ObjectId, SinkHandle};
use crate::playback::RouteFeed;

/// Parameters of a sink stream to open
#[derive(Debug, Clone)]
pub struct SinkRequest {
    /// Backend object to play to; `None` follows the system default sink
    pub node: Option<ObjectId>,
    /// Stream name shown by the host service
    pub name: String,
    pub rate: u32,
    pub channels: u32,
    /// Where the backend pulls frames from
    pub feed: Arc<RouteFeed>,
}

/// A stream the backend accepted but has not confirmed yet.
///
/// The backend sends the negotiated per-channel gain (dB) on
/// `initial_gain` once the connection is up.
#[derive(Debug)]
pub struct PendingSink {
    pub handle: SinkHandle,
    /// Backend object created for the stream itself
    pub source_node: ObjectId,
    pub initial_gain: Receiver<Vec<f32>>,
}

/// A host audio service.
///
/// `start` hands the backend the channel it reports discovery events on.
/// Frames are pulled by the backend itself, on its own thread, through the
/// [`RouteFeed`] of each stream; that path never blocks on the control
/// context.
pub trait AudioBackend: Send {
    fn name(&self) -> &str;

    /// Connect and begin reporting topology on `events`.
    fn start(&mut self, events: Sender<BackendEvent>) -> Result<(), RouteError>;

    fn open_sink(&mut self, request: SinkRequest) -> Result<PendingSink, RouteError>;

    /// Per-channel gain in dB.
    fn set_gain(&mut self, handle: SinkHandle, db: &[f32]);

    /// Stop pulling for `handle` and release its resources.
    fn close(&mut self, handle: SinkHandle);

    /// Close everything and disconnect.
    fn shutdown(&mut self);
}
