//! Streaming text-to-speech provider adapters.
//!
//! Each provider module wraps one external streaming synthesis service
//! behind the [`BaseSpeak`] trait, turning provider-specific wire traffic
//! into the uniform [`SpeakEvent`] stream consumed by the relay session.

pub mod base;
pub mod deepgram;

pub use base::{
    BaseSpeak, BoxedSpeak, ConnectionState, SpeakConfig, SpeakError, SpeakEvent, SpeakResult,
    create_speak_provider, get_supported_speak_providers,
};
pub use deepgram::DeepgramSpeak;
