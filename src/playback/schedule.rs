//! Gap-free chunk scheduling on a playback clock.

use super::decode::{SAMPLE_RATE, decode_pcm16le};

/// Safety margin applied when the scheduler has fallen behind the clock.
///
/// Scheduling at exactly `clock_now` after an underrun produces audible
/// glitches, so the next chunk is pushed 50ms into the future instead.
pub const UNDERRUN_MARGIN_SECS: f64 = 0.05;

/// One chunk scheduled onto the playback timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChunk {
    /// Decoded samples, normalized to [-1, 1], 24kHz mono.
    pub samples: Vec<f32>,
    /// Timeline position at which playback starts, in clock seconds.
    pub start_time: f64,
    /// Chunk duration in seconds (`samples / 24000`).
    pub duration: f64,
}

/// Per-playback-session scheduling state.
///
/// Owns the `next_play_time` cursor: the timeline position at which the
/// next chunk must start. Once a chunk is scheduled the cursor advances by
/// exactly that chunk's duration, so consecutive chunks concatenate with
/// no gaps and no overlaps, in arrival order.
#[derive(Debug)]
pub struct PlaybackSession {
    next_play_time: f64,
    chunks_scheduled: usize,
}

impl PlaybackSession {
    /// Start a new playback session at the clock's current position.
    pub fn new(clock_now: f64) -> Self {
        Self {
            next_play_time: clock_now,
            chunks_scheduled: 0,
        }
    }

    /// Decode one PCM16LE chunk and schedule it.
    ///
    /// The chunk starts at `max(next_play_time, clock_now)`; if the cursor
    /// has fallen behind the clock (underrun), it resynchronizes to
    /// `clock_now + 0.05` instead of playing immediately.
    pub fn schedule(&mut self, chunk: &[u8], clock_now: f64) -> ScheduledChunk {
        let samples = decode_pcm16le(chunk);
        let duration = samples.len() as f64 / SAMPLE_RATE as f64;

        let start_time = if self.next_play_time < clock_now {
            clock_now + UNDERRUN_MARGIN_SECS
        } else {
            self.next_play_time
        };

        self.next_play_time = start_time + duration;
        self.chunks_scheduled += 1;

        ScheduledChunk {
            samples,
            start_time,
            duration,
        }
    }

    /// Timeline position at which the next chunk would start.
    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    /// Number of chunks scheduled so far in this session.
    pub fn chunks_scheduled(&self) -> usize {
        self.chunks_scheduled
    }
}
