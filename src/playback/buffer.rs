//! Per-route frame queue.
//!
//! The producer appends one chunk per emulated audio frame; the backend
//! pulls fixed-size periods at its own cadence. Backlog is kept bounded by
//! a hard cap plus a slow resync that skips a few frames of each new chunk
//! while the queue runs long.

use std::collections::VecDeque;

/// Hard cap on queued chunks (roughly 0.2 s at 50 chunks/s)
pub const MAX_QUEUED_CHUNKS: usize = 10;
/// Queue length from which new chunks start partly consumed
pub const RESYNC_THRESHOLD: usize = 5;
/// Frames skipped at the head of each chunk while resyncing
pub const RESYNC_SKIP_FRAMES: usize = 5;

#[derive(Debug)]
struct Chunk {
    /// Interleaved samples
    samples: Vec<i16>,
    /// Frames already consumed
    read_offset: usize,
}

impl Chunk {
    fn frames(&self, channels: usize) -> usize {
        self.samples.len() / channels
    }
}

/// Queue of interleaved `i16` chunks for one route
#[derive(Debug)]
pub struct PlaybackBuffer {
    channels: usize,
    queue: VecDeque<Chunk>,
    last_frame: Vec<i16>,
}

impl PlaybackBuffer {
    pub fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            queue: VecDeque::with_capacity(MAX_QUEUED_CHUNKS + 1),
            last_frame: vec![0; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn queued_chunks(&self) -> usize {
        self.queue.len()
    }

    /// Frames still to be played.
    pub fn queued_frames(&self) -> usize {
        self.queue
            .iter()
            .map(|c| c.frames(self.channels) - c.read_offset)
            .sum()
    }

    /// Frame repeated on underrun.
    pub fn last_frame(&self) -> &[i16] {
        &self.last_frame
    }

    /// Append one chunk of interleaved samples.
    ///
    /// A trailing partial frame is ignored. Empty chunks are not queued.
    pub fn enqueue(&mut self, samples: &[i16]) {
        let frames = samples.len() / self.channels;
        if frames == 0 {
            return;
        }
        self.queue.push_back(Chunk {
            samples: samples[..frames * self.channels].to_vec(),
            read_offset: 0,
        });

        if self.queue.len() > MAX_QUEUED_CHUNKS {
            let excess = self.queue.len() - MAX_QUEUED_CHUNKS;
            self.queue.drain(..excess);
            log::trace!("Playback backlog over cap, dropped {} chunks", excess);
        } else if self.queue.len() >= RESYNC_THRESHOLD
            && let Some(chunk) = self.queue.back_mut()
        {
            chunk.read_offset = RESYNC_SKIP_FRAMES.min(frames);
        }
    }

    /// Fill `out` (interleaved, a whole number of frames) from the queue.
    ///
    /// Whatever the queue cannot cover is filled with the last frame
    /// emitted. Never blocks and touches only the chunks it consumes.
    pub fn pull(&mut self, out: &mut [i16]) {
        let channels = self.channels;
        let wanted = out.len() / channels;
        let mut pos = 0;

        while pos < wanted {
            let Some(chunk) = self.queue.front_mut() else {
                break;
            };
            let avail = chunk.frames(channels) - chunk.read_offset;
            let take = avail.min(wanted - pos);
            if take > 0 {
                let from = chunk.read_offset * channels;
                let to = from + take * channels;
                out[pos * channels..(pos + take) * channels].copy_from_slice(&chunk.samples[from..to]);
                chunk.read_offset += take;
                pos += take;
                self.last_frame
                    .copy_from_slice(&out[(pos - 1) * channels..pos * channels]);
            }
            if chunk.read_offset >= chunk.frames(channels) {
                self.queue.pop_front();
            }
        }

        for frame in out[pos * channels..wanted * channels].chunks_exact_mut(channels) {
            frame.copy_from_slice(&self.last_frame);
        }
    }

    /// Drop everything queued, keeping the last frame.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
