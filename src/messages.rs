//! Message definitions for communication between the controller and the realtime audio thread.
//!
//! These enums are the wire format of the two ring buffers: `ControlMessage` travels from the
//! controller into the output callback, `AudioMessage` travels back.

use std::sync::Arc;

use pyo3::prelude::*;

use crate::audio_engine::effects::EffectHandle;
use crate::recorder::CaptureTap;

/// Decoded, immutable audio shared between the controller and any voice playing it.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub channels: usize,
    pub sample_rate_hz: u32,
    pub samples: Arc<[f32]>,
}

impl SampleBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate_hz)
    }
}

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone, PartialEq)]
#[pyclass]
pub enum AudioMessage {
    /// Response to a Ping message.
    Pong(),

    /// A one-shot voice's source played out. Its effect tail may still be ringing.
    VoiceEnded { token: u64 },

    /// A voice could not be started because every slot was busy.
    VoiceDropped { token: u64 },

    /// The click track fired tick number `index` (0-based since start).
    MetronomeTick { index: u64 },

    /// Peak and RMS of the master bus over the last meter window.
    MasterLevel { peak: f32, rms: f32 },
}

#[pymethods]
impl AudioMessage {
    pub fn master_level(&self) -> Option<(f32, f32)> {
        match self {
            AudioMessage::MasterLevel { peak, rms } => Some((*peak, *rms)),
            _ => None,
        }
    }

    pub fn metronome_tick(&self) -> Option<u64> {
        match self {
            AudioMessage::MetronomeTick { index } => Some(*index),
            _ => None,
        }
    }
}

/// Message that is emitted from the controller.
pub enum ControlMessage {
    /// Used for testing message passing functionality.
    Ping(),

    /// Start a voice.
    ///
    /// The effect chain is built by the controller; the audio thread only runs it.
    PlayVoice {
        token: u64,
        sample: SampleBuffer,
        looping: bool,
        effects: Vec<EffectHandle>,
    },

    /// Cut the voice with this token immediately, effect tail included.
    StopVoice { token: u64 },

    /// Stop all currently active voices.
    StopAll(),

    /// Set the master gain (0.0 to 1.0).
    SetMasterVolume(f32),

    /// Set the gain of one EQ band in dB.
    SetEqGain { band: usize, gain_db: f32 },

    /// Start the click track; replaces a running one.
    StartMetronome { bpm: u32 },

    /// Stop the click track.
    StopMetronome(),

    /// Copy every rendered master block into `tap` until `StopCapture`.
    StartCapture { tap: CaptureTap },

    /// Stop copying the master bus.
    StopCapture(),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_duration() {
        let buffer = SampleBuffer {
            channels: 2,
            sample_rate_hz: 1_000,
            samples: Arc::from(vec![0.0; 3_000].into_boxed_slice()),
        };
        assert_eq!(buffer.frames(), 1_500);
        assert!((buffer.duration_seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_audio_message_accessors() {
        let level = AudioMessage::MasterLevel {
            peak: 0.5,
            rms: 0.25,
        };
        assert_eq!(level.master_level(), Some((0.5, 0.25)));
        assert_eq!(level.metronome_tick(), None);
        assert_eq!(
            AudioMessage::MetronomeTick { index: 3 }.metronome_tick(),
            Some(3)
        );
    }
}
