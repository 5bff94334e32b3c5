//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Stream initialization and configuration
//! - The realtime engine run inside the output callback
//! - The controller-side handle to the message rings
//!
//! A third ring carries the effect chains of freed voices back to the controller, so their
//! buffers are never deallocated inside the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, FromSample, SizedSample, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio_engine::constants::{
    MAX_BLOCK_FRAMES, MESSAGE_QUEUE_CAPACITY, STREAM_BUFFER_FRAMES,
};
use crate::audio_engine::effects::EffectHandle;
use crate::audio_engine::errors::AudioInitError;
use crate::audio_engine::mixer::RtMixer;
use crate::messages::{AudioMessage, ControlMessage};

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Users can override the default via `RUST_LOG`, e.g. `RUST_LOG=debug`.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Controller side of the engine: sends commands, receives events.
pub struct EngineHandle {
    producer: Producer<ControlMessage>,
    consumer: Consumer<AudioMessage>,
    retired: Consumer<Vec<EffectHandle>>,
    channels: usize,
    sample_rate_hz: u32,
}

impl EngineHandle {
    /// Queues a command for the audio thread. A full ring hands the message back.
    pub fn send(&mut self, message: ControlMessage) -> Result<(), ControlMessage> {
        self.producer.push(message).map_err(|err| match err {
            rtrb::PushError::Full(message) => message,
        })
    }

    /// Pops the next event from the audio thread, if any.
    pub fn try_recv(&mut self) -> Option<AudioMessage> {
        self.consumer.pop().ok()
    }

    /// Drops the effect chains the audio thread handed back. Returns how many there were.
    pub fn release_retired(&mut self) -> usize {
        let mut released = 0;
        while self.retired.pop().is_ok() {
            released += 1;
        }
        released
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
}

/// Audio-thread side of the engine: drains commands, renders, publishes events.
pub struct RtEngine {
    mixer: RtMixer,
    consumer: Consumer<ControlMessage>,
    producer: Producer<AudioMessage>,
    retired: Producer<Vec<EffectHandle>>,
}

impl RtEngine {
    /// Runs one callback's worth of work on an interleaved output buffer.
    pub fn process(&mut self, output: &mut [f32]) {
        while let Ok(message) = self.consumer.pop() {
            self.handle(message);
            self.flush_events();
        }

        self.mixer.render(output);
        self.flush_events();
    }

    fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Ping() => {
                let _ = self.producer.push(AudioMessage::Pong());
            }
            ControlMessage::PlayVoice {
                token,
                sample,
                looping,
                effects,
            } => {
                self.mixer.play_voice(token, sample, looping, effects);
            }
            ControlMessage::StopVoice { token } => {
                self.mixer.stop_voice(token);
            }
            ControlMessage::StopAll() => {
                self.mixer.stop_all();
            }
            ControlMessage::SetMasterVolume(volume) => {
                self.mixer.set_volume(volume);
            }
            ControlMessage::SetEqGain { band, gain_db } => {
                self.mixer.set_eq_gain(band, gain_db);
            }
            ControlMessage::StartMetronome { bpm } => {
                self.mixer.start_metronome(bpm);
            }
            ControlMessage::StopMetronome() => {
                self.mixer.stop_metronome();
            }
            ControlMessage::StartCapture { tap } => {
                self.mixer.start_capture(tap);
            }
            ControlMessage::StopCapture() => {
                self.mixer.stop_capture();
            }
        }
    }

    fn flush_events(&mut self) {
        for event in self.mixer.drain_events() {
            if self.producer.push(event).is_err() {
                break;
            }
        }
        // A chain only drops here if the controller stopped polling and the ring filled up.
        for chain in self.mixer.drain_retired() {
            if self.retired.push(chain).is_err() {
                break;
            }
        }
    }

    #[cfg(test)]
    pub fn mixer(&self) -> &RtMixer {
        &self.mixer
    }
}

/// Creates a connected handle/engine pair without touching any device.
///
/// The output stream drives [`RtEngine::process`] from its callback; tests call it directly.
pub fn create_engine(channels: usize, sample_rate_hz: u32) -> (EngineHandle, RtEngine) {
    let (producer_in, consumer_in) = RingBuffer::new(MESSAGE_QUEUE_CAPACITY);
    let (producer_out, consumer_out) = RingBuffer::new(MESSAGE_QUEUE_CAPACITY);
    let (retired_producer, retired_consumer) = RingBuffer::new(MESSAGE_QUEUE_CAPACITY);

    let handle = EngineHandle {
        producer: producer_in,
        consumer: consumer_out,
        retired: retired_consumer,
        channels,
        sample_rate_hz,
    };
    let engine = RtEngine {
        mixer: RtMixer::new(channels, sample_rate_hz),
        consumer: consumer_in,
        producer: producer_out,
        retired: retired_producer,
    };

    (handle, engine)
}

/// Handle to the running output stream with its engine handle.
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub engine: EngineHandle,
}

/// Opens the default output device and starts rendering.
///
/// # Errors
///
/// Returns [`AudioInitError`] when there is no device, no usable configuration, or the
/// stream cannot be built or started.
pub fn create_audio_stream() -> Result<AudioStreamHandle, AudioInitError> {
    setup_logger();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioInitError::NoOutputDevice)?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate();
    let channels = config.channels();

    log::info!(
        "Starting audio engine... ({} ch@{} Hz, {:?})",
        channels,
        sample_rate,
        config.sample_format()
    );

    let (handle, engine) = create_engine(channels as usize, sample_rate);

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(STREAM_BUFFER_FRAMES),
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_output_stream::<f32>(&device, &stream_config, engine)?,
        cpal::SampleFormat::I16 => build_output_stream::<i16>(&device, &stream_config, engine)?,
        cpal::SampleFormat::U16 => build_output_stream::<u16>(&device, &stream_config, engine)?,
        other => return Err(AudioInitError::UnsupportedSampleFormat(other.to_string())),
    };

    stream.play()?;

    Ok(AudioStreamHandle {
        stream,
        engine: handle,
    })
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: RtEngine,
) -> Result<Stream, AudioInitError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = callback_scratch(config.channels as usize);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            render_into(&mut engine, &mut scratch, data);
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

/// Render buffer for one callback, allocated before the stream starts.
fn callback_scratch(channels: usize) -> Vec<f32> {
    vec![0.0; MAX_BLOCK_FRAMES * channels.max(1)]
}

/// Fills a device buffer of any length through the fixed `scratch` buffer.
///
/// `scratch` holds whole frames, so every chunk of `data` does too.
fn render_into<T>(engine: &mut RtEngine, scratch: &mut [f32], data: &mut [T])
where
    T: SizedSample + FromSample<f32>,
{
    for chunk in data.chunks_mut(scratch.len()) {
        let block = &mut scratch[..chunk.len()];
        engine.process(block);
        for (out, &s) in chunk.iter_mut().zip(block.iter()) {
            *out = T::from_sample(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::messages::SampleBuffer;
    use cpal::Sample;

    #[test]
    fn test_logger_setup() {
        // Multiple calls are safe; only the first takes effect.
        setup_logger();
        setup_logger();
    }

    #[test]
    fn test_ping_pong() {
        let (mut handle, mut engine) = create_engine(2, 48_000);
        assert!(handle.send(ControlMessage::Ping()).is_ok());

        let mut buf = vec![0.0; 64];
        engine.process(&mut buf);

        assert_eq!(handle.try_recv(), Some(AudioMessage::Pong()));
        assert_eq!(handle.channels(), 2);
        assert_eq!(handle.sample_rate_hz(), 48_000);
    }

    #[test]
    fn test_commands_reach_mixer() {
        let (mut handle, mut engine) = create_engine(1, 1_000);
        let sample = SampleBuffer {
            channels: 1,
            sample_rate_hz: 1_000,
            samples: Arc::from(vec![0.5; 4].into_boxed_slice()),
        };

        assert!(handle.send(ControlMessage::SetMasterVolume(1.0)).is_ok());
        assert!(
            handle
                .send(ControlMessage::PlayVoice {
                    token: 9,
                    sample,
                    looping: false,
                    effects: Vec::new(),
                })
                .is_ok()
        );

        let mut buf = vec![0.0; 10];
        engine.process(&mut buf);

        assert!((buf[0] - 0.5).abs() < 1e-5);
        assert_eq!(engine.mixer().active_voices(), 0);
        assert_eq!(handle.try_recv(), Some(AudioMessage::VoiceEnded { token: 9 }));
    }

    #[test]
    fn test_freed_chains_return_to_handle() {
        use crate::audio_engine::effects::{EffectKind, build_chain};

        let (mut handle, mut engine) = create_engine(1, 1_000);
        let sample = SampleBuffer {
            channels: 1,
            sample_rate_hz: 1_000,
            samples: Arc::from(vec![0.5; 100].into_boxed_slice()),
        };
        let effects = build_chain(&[EffectKind::Reverb], 1_000, 1);

        assert!(
            handle
                .send(ControlMessage::PlayVoice {
                    token: 1,
                    sample,
                    looping: true,
                    effects,
                })
                .is_ok()
        );
        let mut buf = vec![0.0; 10];
        engine.process(&mut buf);
        assert_eq!(handle.release_retired(), 0);

        assert!(handle.send(ControlMessage::StopVoice { token: 1 }).is_ok());
        engine.process(&mut buf);
        assert_eq!(handle.release_retired(), 1);
        assert_eq!(handle.release_retired(), 0);
    }

    #[test]
    fn test_render_into_chunks_long_device_buffers() {
        let (mut handle, mut engine) = create_engine(2, 1_000);
        let sample = SampleBuffer {
            channels: 2,
            sample_rate_hz: 1_000,
            samples: Arc::from(vec![0.5; 2 * 10].into_boxed_slice()),
        };
        assert!(handle.send(ControlMessage::SetMasterVolume(1.0)).is_ok());
        assert!(
            handle
                .send(ControlMessage::PlayVoice {
                    token: 3,
                    sample,
                    looping: true,
                    effects: Vec::new(),
                })
                .is_ok()
        );

        let mut scratch = callback_scratch(2);
        let scratch_len = scratch.len();
        let mut data = vec![0i16; scratch_len * 3 + 6];
        render_into(&mut engine, &mut scratch, &mut data);

        assert_eq!(scratch.len(), scratch_len);
        let expected = i16::from_sample(0.5f32);
        assert!(data.iter().all(|&s| (i32::from(s) - i32::from(expected)).abs() <= 1));
    }

    #[test]
    fn test_full_ring_returns_message() {
        let (mut handle, _engine) = create_engine(2, 48_000);
        for _ in 0..MESSAGE_QUEUE_CAPACITY {
            assert!(handle.send(ControlMessage::StopAll()).is_ok());
        }
        assert!(matches!(
            handle.send(ControlMessage::StopAll()),
            Err(ControlMessage::StopAll())
        ));
    }

    #[test]
    fn test_audio_stream_creation() {
        // Actual stream creation requires audio hardware.
        if cpal::default_host().default_output_device().is_none() {
            return;
        }

        // Opening may still fail in headless environments; both outcomes are acceptable.
        if let Ok(handle) = create_audio_stream() {
            assert!(handle.engine.channels() > 0);
        }
    }
}
