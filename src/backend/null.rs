//! Software backend that plays into nothing.
//!
//! Announces a single stereo `default` endpoint and, for every open stream,
//! runs a timer thread that pulls one period at a time at the stream's rate.
//! Useful to exercise routing without a host audio service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::driver::{AudioBackend, PendingSink, SinkRequest};
use crate::error::RouteError;
use crate::graph::discovery::{announce_default_sink, announce_sink};
use crate::graph::{BackendEvent, ObjectId, SinkHandle};

/// Object id of the announced endpoint
const ENDPOINT_OBJECT: ObjectId = 10;
const ENDPOINT_TEXT_ID: &str = "default";
const STREAM_NODE_BASE: ObjectId = 100;

struct NullStream {
    running: Arc<AtomicBool>,
    pulled: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl NullStream {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Backend without a host service
pub struct NullBackend {
    period_frames: u32,
    events: Option<Sender<BackendEvent>>,
    streams: HashMap<SinkHandle, NullStream>,
    next_handle: u32,
}

impl NullBackend {
    pub fn new(period_frames: u32) -> Self {
        Self {
            period_frames: period_frames.max(1),
            events: None,
            streams: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Frames pulled so far by a stream.
    pub fn pulled_frames(&self, handle: SinkHandle) -> Option<u64> {
        self.streams
            .get(&handle)
            .map(|s| s.pulled.load(Ordering::Relaxed))
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn start(&mut self, events: Sender<BackendEvent>) -> Result<(), RouteError> {
        let announce = announce_sink(ENDPOINT_OBJECT, ENDPOINT_TEXT_ID, "Null Output", &["L", "R"])
            .into_iter()
            .chain(std::iter::once(announce_default_sink(ENDPOINT_TEXT_ID)));
        for event in announce {
            events
                .send(event)
                .map_err(|e| RouteError::BackendFailure(e.to_string()))?;
        }
        self.events = Some(events);
        log::info!("Null audio backend started");
        Ok(())
    }

    fn open_sink(&mut self, request: SinkRequest) -> Result<PendingSink, RouteError> {
        if request.rate == 0 || request.channels == 0 {
            return Err(RouteError::BackendFailure(format!(
                "unsupported format: {} Hz, {} channels",
                request.rate, request.channels
            )));
        }
        self.next_handle += 1;
        let handle = SinkHandle(self.next_handle);

        let running = Arc::new(AtomicBool::new(true));
        let pulled = Arc::new(AtomicU64::new(0));
        let period = Duration::from_secs_f64(self.period_frames as f64 / request.rate as f64);
        let samples = self.period_frames as usize * request.channels as usize;

        let thread = {
            let running = running.clone();
            let pulled = pulled.clone();
            let feed = request.feed;
            let frames = self.period_frames as u64;
            std::thread::Builder::new()
                .name(format!("null-sink-{}", handle.0))
                .spawn(move || {
                    let mut out = vec![0i16; samples];
                    let mut next = Instant::now();
                    while running.load(Ordering::Acquire) {
                        feed.pull(&mut out);
                        pulled.fetch_add(frames, Ordering::Relaxed);
                        next += period;
                        if let Some(wait) = next.checked_duration_since(Instant::now()) {
                            std::thread::sleep(wait);
                        }
                    }
                })
                .map_err(|e| RouteError::BackendFailure(e.to_string()))?
        };

        let (gain_tx, gain_rx) = std::sync::mpsc::channel();
        let volumes = vec![0.0; request.channels as usize];
        let _ = gain_tx.send(volumes.clone());
        if let Some(events) = &self.events {
            let _ = events.send(BackendEvent::StreamVolumes { handle, db: volumes });
        }

        log::debug!("{} opened: {:?} ({} Hz)", handle, request.name, request.rate);
        self.streams.insert(
            handle,
            NullStream {
                running,
                pulled,
                thread: Some(thread),
            },
        );
        Ok(PendingSink {
            handle,
            source_node: STREAM_NODE_BASE + handle.0,
            initial_gain: gain_rx,
        })
    }

    fn set_gain(&mut self, handle: SinkHandle, db: &[f32]) {
        if self.streams.contains_key(&handle) {
            log::debug!("{} gain {:?} dB", handle, db);
            if let Some(events) = &self.events {
                let _ = events.send(BackendEvent::StreamVolumes {
                    handle,
                    db: db.to_vec(),
                });
            }
        }
    }

    fn close(&mut self, handle: SinkHandle) {
        if let Some(mut stream) = self.streams.remove(&handle) {
            stream.stop();
            log::debug!("{} closed", handle);
        }
    }

    fn shutdown(&mut self) {
        for (_, mut stream) in self.streams.drain() {
            stream.stop();
        }
        self.events = None;
        log::info!("Null audio backend stopped");
    }
}

impl Drop for NullBackend {
    fn drop(&mut self) {
        for (_, mut stream) in self.streams.drain() {
            stream.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::RouteFeed;

    #[test]
    fn test_announces_default_endpoint() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut backend = NullBackend::new(48);
        backend.start(tx).unwrap();
        let events: Vec<BackendEvent> = rx.try_iter().collect();
        // node, two ports, default metadata
        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], BackendEvent::Metadata { .. }));
    }

    #[test]
    fn test_stream_is_pulled_until_closed() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut backend = NullBackend::new(48);
        backend.start(tx).unwrap();

        let feed = RouteFeed::new(2);
        let pending = backend
            .open_sink(SinkRequest {
                node: None,
                name: "test".to_string(),
                rate: 48000,
                channels: 2,
                feed: feed.clone(),
            })
            .unwrap();
        assert_eq!(pending.initial_gain.recv().unwrap(), vec![0.0, 0.0]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while backend.pulled_frames(pending.handle).unwrap_or(0) < 480 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(backend.pulled_frames(pending.handle).unwrap() >= 480);

        backend.close(pending.handle);
        assert!(backend.pulled_frames(pending.handle).is_none());
    }

    #[test]
    fn test_rejects_empty_format() {
        let mut backend = NullBackend::new(48);
        let result = backend.open_sink(SinkRequest {
            node: None,
            name: "test".to_string(),
            rate: 48000,
            channels: 0,
            feed: RouteFeed::new(1),
        });
        assert!(matches!(result, Err(RouteError::BackendFailure(_))));
    }
}
