//! Client-side playback scheduling.
//!
//! Converts an unpredictable sequence of network audio chunks into smooth,
//! gap-free playback: each chunk is decoded from PCM16LE to normalized
//! float samples and scheduled back-to-back on a shared playback clock,
//! and a completion watcher polls that clock to detect when everything
//! scheduled has finished playing.

pub mod decode;
pub mod schedule;
pub mod watcher;

pub use decode::{SAMPLE_RATE, decode_pcm16le};
pub use schedule::{PlaybackSession, ScheduledChunk, UNDERRUN_MARGIN_SECS};
pub use watcher::{COMPLETION_POLL_INTERVAL, COMPLETION_TOLERANCE_SECS, PlaybackClock, SystemClock, wait_for_completion};
