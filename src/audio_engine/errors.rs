//! Audio-specific error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while bringing up the output device.
#[derive(Debug, Error)]
pub enum AudioInitError {
    /// The host reports no output device at all.
    #[error("no audio output device found")]
    NoOutputDevice,

    /// The device has no usable default configuration.
    #[error("no default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// The device refused to build the stream (permission denied, busy, ...).
    #[error("failed to create audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// The stream was built but could not be started.
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The device only offers a sample format the mixer cannot render.
    #[error("unsupported output sample format: {0}")]
    UnsupportedSampleFormat(String),
}

/// Errors that can occur while loading audio files.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Failed to open the audio file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio file.
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// Audio file has no default track.
    #[error("audio file has no default track")]
    NoDefaultTrack,

    /// Audio file is missing sample rate information.
    #[error("audio file is missing a sample rate")]
    MissingSampleRate,

    /// Audio file is missing channel information.
    #[error("audio file is missing channel information")]
    MissingChannels,

    /// The file decoded to zero frames.
    #[error("audio file contains no samples")]
    Empty,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: file has {file_channels} channels, output has {output_channels} channels"
    )]
    UnsupportedChannels {
        /// Number of channels in the source file.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },
}

/// Errors that can occur while capturing a take.
#[derive(Debug, Error)]
pub enum RecordingError {
    /// A take is already running.
    #[error("already recording")]
    AlreadyRecording,

    /// No take is running.
    #[error("not recording")]
    NotRecording,

    /// The host reports no input device.
    #[error("no audio input device found")]
    NoInputDevice,

    /// The mix can only be captured while the output engine runs.
    #[error("audio engine not initialized")]
    EngineUnavailable,

    /// The input device has no usable default configuration.
    #[error("no default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// The device refused to build the capture stream.
    #[error("failed to open input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// The capture stream could not be started.
    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The realtime engine did not accept the capture request.
    #[error("failed to send capture request - buffer may be full")]
    QueueFull,

    /// Writing the finished take failed.
    #[error("failed to write recording {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// Creating the recordings directory failed.
    #[error("failed to prepare recordings directory: {0}")]
    Io(#[from] std::io::Error),
}
