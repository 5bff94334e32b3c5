//! Audio Engine Module
//!
//! This module provides real-time mixing, effects and playback.
//! It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`audio_stream`]: CPAL output stream, realtime engine and controller handle
//! - [`constants`]: Configuration constants and limits
//! - [`errors`]: Audio-specific error types
//! - [`eq`]: Biquad primitives and the five-band shelving chain
//! - [`effects`]: Reverb, delay, distortion and compressor
//! - [`routing`]: Inspectable signal route of one play
//! - [`click`]: Metronome click synthesis
//! - [`voice_slot`]: Per-voice playback state
//! - [`mixer`]: Real-time mixing engine
//! - [`sample_loader`] and [`channels`]: Audio file decoding and format conversion

pub mod audio_stream;
pub mod channels;
pub mod click;
pub mod constants;
pub mod effects;
pub mod eq;
pub mod errors;
pub mod mixer;
pub mod routing;
pub mod sample_loader;
pub mod voice_slot;

pub use audio_stream::{
    AudioStreamHandle, EngineHandle, RtEngine, create_audio_stream, create_engine, setup_logger,
};
pub use effects::{EffectHandle, EffectKind};
pub use errors::{AudioInitError, DecodeError, RecordingError};
pub use routing::{GraphNode, SignalRoute};
