//! Peak tracking for routed audio.
//!
//! The producer side records every chunk it queues; the control context
//! periodically takes the finished buckets. One bucket holds the largest
//! absolute sample seen during `1 / buckets_per_second` seconds, normalised
//! so that full scale is 1.0. Buckets nobody takes are kept for
//! [`MAX_HISTORY_SECONDS`]; older ones are dropped.

use std::collections::VecDeque;

/// Default bucket rate
pub const BUCKETS_PER_SECOND: u32 = 10;

/// How much untaken history a meter holds
pub const MAX_HISTORY_SECONDS: usize = 60;

/// Normalised level at which a sample counts as clipped
pub const CLIP_LEVEL: f32 = i16::MAX as f32 / 32768.0;

/// Peak series of one route
#[derive(Debug, Clone)]
pub struct PeakMeter {
    channels: usize,
    frames_per_bucket: usize,
    /// Frames recorded into the open bucket
    frames: usize,
    /// Largest absolute sample of the open bucket
    current: u16,
    max_buckets: usize,
    buckets: VecDeque<f32>,
}

impl PeakMeter {
    pub fn new(channels: usize, sample_rate: u32, buckets_per_second: u32) -> Self {
        let frames_per_bucket = (sample_rate / buckets_per_second.max(1)).max(1) as usize;
        Self {
            channels: channels.max(1),
            frames_per_bucket,
            frames: 0,
            current: 0,
            max_buckets: MAX_HISTORY_SECONDS * buckets_per_second.max(1) as usize,
            buckets: VecDeque::new(),
        }
    }

    pub fn frames_per_bucket(&self) -> usize {
        self.frames_per_bucket
    }

    /// Record interleaved samples as they are queued.
    pub fn record(&mut self, samples: &[i16]) {
        for frame in samples.chunks_exact(self.channels) {
            for sample in frame {
                self.current = self.current.max(sample.unsigned_abs());
            }
            self.frames += 1;
            if self.frames == self.frames_per_bucket {
                if self.buckets.len() == self.max_buckets {
                    self.buckets.pop_front();
                }
                self.buckets.push_back(self.current as f32 / 32768.0);
                self.frames = 0;
                self.current = 0;
            }
        }
    }

    /// Take the finished buckets, leaving the open one in place.
    pub fn take(&mut self) -> Vec<f32> {
        self.buckets.drain(..).collect()
    }
}

/// Aggregate of a peak series
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeakSummary {
    /// Largest peak of the series
    pub max: f32,
    /// Buckets that reached full scale
    pub clipped_buckets: usize,
    pub buckets: usize,
}

impl PeakSummary {
    pub fn of(series: &[f32]) -> Self {
        Self {
            max: series.iter().copied().fold(0.0, f32::max),
            clipped_buckets: series.iter().filter(|&&p| p >= CLIP_LEVEL).count(),
            buckets: series.len(),
        }
    }

    /// Share of buckets that clipped, in percent.
    pub fn clipped_percent(&self) -> f64 {
        if self.buckets > 0 {
            self.clipped_buckets as f64 * 100.0 / self.buckets as f64
        } else {
            0.0
        }
    }
}
