//! Scripted backend for tests.
//!
//! Discovery events are injected through a [`MockControl`]; every call the
//! core makes is recorded. Streams are never pulled on their own: tests pull
//! explicitly, standing in for the host service's callback.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use super::driver::{AudioBackend, PendingSink, SinkRequest};
use crate::error::RouteError;
use crate::graph::{BackendEvent, ObjectId, SinkHandle};
use crate::playback::RouteFeed;

/// First object id handed to stream nodes
const STREAM_NODE_BASE: ObjectId = 1000;

/// A call the core made on the backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Start,
    Open {
        handle: SinkHandle,
        node: Option<ObjectId>,
        name: String,
        channels: u32,
    },
    SetGain {
        handle: SinkHandle,
        db: Vec<f32>,
    },
    Close(SinkHandle),
    Shutdown,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    events: Option<Sender<BackendEvent>>,
    /// Events queued before `start`
    script: Vec<BackendEvent>,
    feeds: HashMap<SinkHandle, Arc<RouteFeed>>,
    next_handle: u32,
    withhold_gain: bool,
    /// Gain senders kept alive so withheld opens time out
    withheld: Vec<Sender<Vec<f32>>>,
    fail_open: Option<String>,
}

/// Test backend
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle on a [`MockBackend`]
#[derive(Clone)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// A backend that reports `script` as soon as it is started.
    pub fn new(script: Vec<BackendEvent>) -> (Self, MockControl) {
        let state = Arc::new(Mutex::new(MockState {
            script,
            ..Default::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            MockControl { state },
        )
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn start(&mut self, events: Sender<BackendEvent>) -> Result<(), RouteError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Start);
        for event in std::mem::take(&mut state.script) {
            let _ = events.send(event);
        }
        state.events = Some(events);
        Ok(())
    }

    fn open_sink(&mut self, request: SinkRequest) -> Result<PendingSink, RouteError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_open.clone() {
            return Err(RouteError::BackendFailure(reason));
        }
        state.next_handle += 1;
        let handle = SinkHandle(state.next_handle);
        state.calls.push(MockCall::Open {
            handle,
            node: request.node,
            name: request.name,
            channels: request.channels,
        });
        state.feeds.insert(handle, request.feed);

        let (gain_tx, gain_rx) = std::sync::mpsc::channel();
        let volumes = vec![0.0; request.channels as usize];
        if state.withhold_gain {
            state.withheld.push(gain_tx);
        } else {
            let _ = gain_tx.send(volumes.clone());
            if let Some(events) = &state.events {
                let _ = events.send(BackendEvent::StreamVolumes { handle, db: volumes });
            }
        }

        Ok(PendingSink {
            handle,
            source_node: STREAM_NODE_BASE + handle.0,
            initial_gain: gain_rx,
        })
    }

    fn set_gain(&mut self, handle: SinkHandle, db: &[f32]) {
        self.state.lock().calls.push(MockCall::SetGain {
            handle,
            db: db.to_vec(),
        });
    }

    fn close(&mut self, handle: SinkHandle) {
        let mut state = self.state.lock();
        state.feeds.remove(&handle);
        state.calls.push(MockCall::Close(handle));
    }

    fn shutdown(&mut self) {
        let mut state = self.state.lock();
        state.feeds.clear();
        state.events = None;
        state.calls.push(MockCall::Shutdown);
    }
}

impl MockControl {
    /// Report a discovery event. False before `start` or after `shutdown`.
    pub fn send(&self, event: BackendEvent) -> bool {
        match &self.state.lock().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn send_all(&self, events: impl IntoIterator<Item = BackendEvent>) {
        for event in events {
            self.send(event);
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Stop confirming new streams, so opening them times out.
    pub fn withhold_gain(&self, withhold: bool) {
        self.state.lock().withhold_gain = withhold;
    }

    /// Make every open fail with `reason` (or succeed again with `None`).
    pub fn fail_open(&self, reason: Option<&str>) {
        self.state.lock().fail_open = reason.map(str::to_string);
    }

    pub fn open_handles(&self) -> Vec<SinkHandle> {
        let mut handles: Vec<SinkHandle> = self.state.lock().feeds.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Object id of the node created for a stream.
    pub fn stream_node(&self, handle: SinkHandle) -> ObjectId {
        STREAM_NODE_BASE + handle.0
    }

    /// Pull frames from a stream, as the host service's callback would.
    /// False if the stream is not open on the backend.
    pub fn pull(&self, handle: SinkHandle, out: &mut [i16]) -> bool {
        let feed = self.state.lock().feeds.get(&handle).cloned();
        match feed {
            Some(feed) => {
                feed.pull(out);
                true
            }
            None => false,
        }
    }
}
