//! The pull side of a route, shared with the backend.
//!
//! Each route's buffer sits behind its own lock, disjoint from everything
//! the control context locks, so the backend callback only ever contends
//! with the producer of that one route. Closing takes the buffer out under
//! that lock; a pull arriving afterwards finds nothing and emits silence.

use parking_lot::Mutex;
use std::sync::Arc;

use super::buffer::PlaybackBuffer;

/// Frame source handed to the backend for one open route
#[derive(Debug)]
pub struct RouteFeed {
    channels: usize,
    buffer: Mutex<Option<PlaybackBuffer>>,
}

impl RouteFeed {
    pub fn new(channels: usize) -> Arc<Self> {
        Arc::new(Self {
            channels: channels.max(1),
            buffer: Mutex::new(Some(PlaybackBuffer::new(channels))),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_open(&self) -> bool {
        self.buffer.lock().is_some()
    }

    /// Queue a chunk. Returns false once the feed is closed.
    pub fn enqueue(&self, samples: &[i16]) -> bool {
        match self.buffer.lock().as_mut() {
            Some(buffer) => {
                buffer.enqueue(samples);
                true
            }
            None => false,
        }
    }

    /// Backend callback: fill `out` with interleaved frames.
    pub fn pull(&self, out: &mut [i16]) {
        match self.buffer.lock().as_mut() {
            Some(buffer) => buffer.pull(out),
            None => out.fill(0),
        }
    }

    pub fn queued_chunks(&self) -> usize {
        self.buffer
            .lock()
            .as_ref()
            .map(|b| b.queued_chunks())
            .unwrap_or(0)
    }

    /// Detach the buffer. Later pulls emit silence.
    pub fn close(&self) {
        self.buffer.lock().take();
    }
}
