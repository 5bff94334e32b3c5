//! Take recording: buffers captured audio and writes it out as one WAV file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, Stream, StreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio_engine::constants::CAPTURE_BUFFER_SECONDS;
use crate::audio_engine::errors::RecordingError;
use crate::pads::unix_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingSource {
    /// Default input device.
    #[default]
    Microphone,
    /// Tap of the master bus after the master gain.
    MasterOutput,
}

impl RecordingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Microphone => "microphone",
            Self::MasterOutput => "master",
        }
    }
}

impl fmt::Display for RecordingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "microphone" | "mic" | "input" => Ok(Self::Microphone),
            "master" | "output" | "master_output" => Ok(Self::MasterOutput),
            other => Err(format!("unknown recording source: {other}")),
        }
    }
}

/// `soundpad-recording-<unix-millis>.wav`
pub fn recording_file_name(millis: u128) -> String {
    format!("soundpad-recording-{millis}.wav")
}

/// The user's download directory, else `<data-dir>/recordings`.
pub fn default_recordings_dir(data_dir: &Path) -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| data_dir.join("recordings"))
}

/// Ring capacity holding [`CAPTURE_BUFFER_SECONDS`] of interleaved audio.
pub fn capture_ring_capacity(channels: usize, sample_rate_hz: u32) -> usize {
    (sample_rate_hz as usize * channels.max(1) * CAPTURE_BUFFER_SECONDS).max(1)
}

/// Writer end of a capture ring, held by the device callback or the master bus.
///
/// A full ring never blocks the callback; the samples that did not fit are counted instead.
pub struct CaptureTap {
    producer: Producer<f32>,
    dropped: Arc<AtomicUsize>,
}

impl CaptureTap {
    pub fn push_block<T: Copy>(&mut self, block: &[T], convert: impl Fn(T) -> f32) {
        for (i, &s) in block.iter().enumerate() {
            if self.producer.push(convert(s)).is_err() {
                self.dropped.fetch_add(block.len() - i, Ordering::Relaxed);
                return;
            }
        }
    }
}

/// Reader end of a capture ring.
pub struct CaptureSink {
    consumer: Consumer<f32>,
    dropped: Arc<AtomicUsize>,
}

impl CaptureSink {
    pub fn pop(&mut self) -> Option<f32> {
        self.consumer.pop().ok()
    }

    /// Samples the tap lost to a full ring so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A capture ring of `capacity` samples.
pub fn capture_ring(capacity: usize) -> (CaptureTap, CaptureSink) {
    let (producer, consumer) = RingBuffer::new(capacity);
    let dropped = Arc::new(AtomicUsize::new(0));
    (
        CaptureTap {
            producer,
            dropped: Arc::clone(&dropped),
        },
        CaptureSink { consumer, dropped },
    )
}

/// Writes interleaved samples as 16-bit PCM. A failed write leaves no file behind.
pub fn write_wav(
    path: &Path,
    channels: u16,
    sample_rate_hz: u32,
    samples: &[f32],
) -> Result<(), RecordingError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    write_pcm16(path, spec, samples).map_err(|source| {
        let _ = fs::remove_file(path);
        RecordingError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn write_pcm16(path: &Path, spec: hound::WavSpec, samples: &[f32]) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
        writer.write_sample((s * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}

struct Take {
    source: RecordingSource,
    // Dropping the stream releases the input device.
    _stream: Option<Stream>,
    sink: CaptureSink,
    channels: u16,
    sample_rate_hz: u32,
    samples: Vec<f32>,
}

/// Recorder state: idle, or one running take.
pub struct Recorder {
    source: RecordingSource,
    output_dir: PathBuf,
    take: Option<Take>,
}

impl Recorder {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            source: RecordingSource::default(),
            output_dir,
            take: None,
        }
    }

    pub fn source(&self) -> RecordingSource {
        self.source
    }

    /// Selects the source of the next take; a running take keeps its source.
    pub fn set_source(&mut self, source: RecordingSource) {
        self.source = source;
    }

    pub fn is_recording(&self) -> bool {
        self.take.is_some()
    }

    /// Source of the running take.
    pub fn active_source(&self) -> Option<RecordingSource> {
        self.take.as_ref().map(|take| take.source)
    }

    /// Opens the default input device and starts buffering.
    pub fn start_microphone(&mut self) -> Result<(), RecordingError> {
        if self.take.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(RecordingError::NoInputDevice)?;
        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let (tap, sink) =
            capture_ring(capture_ring_capacity(config.channels as usize, config.sample_rate));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_input_stream::<f32>(&device, &config, tap)?,
            cpal::SampleFormat::I16 => build_input_stream::<i16>(&device, &config, tap)?,
            cpal::SampleFormat::U16 => build_input_stream::<u16>(&device, &config, tap)?,
            other => {
                log::warn!("Unsupported input sample format {other}, trying f32");
                build_input_stream::<f32>(&device, &config, tap)?
            }
        };
        stream.play()?;

        log::info!(
            "Recording from microphone ({} ch@{} Hz)",
            config.channels,
            config.sample_rate
        );

        self.begin(
            RecordingSource::Microphone,
            Some(stream),
            sink,
            config.channels,
            config.sample_rate,
        )
    }

    /// Starts a take fed from an already connected ring, e.g. the master bus tap.
    pub fn start_with_sink(
        &mut self,
        sink: CaptureSink,
        channels: u16,
        sample_rate_hz: u32,
    ) -> Result<(), RecordingError> {
        self.begin(
            RecordingSource::MasterOutput,
            None,
            sink,
            channels,
            sample_rate_hz,
        )
    }

    fn begin(
        &mut self,
        source: RecordingSource,
        stream: Option<Stream>,
        sink: CaptureSink,
        channels: u16,
        sample_rate_hz: u32,
    ) -> Result<(), RecordingError> {
        if self.take.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        self.take = Some(Take {
            source,
            _stream: stream,
            sink,
            channels,
            sample_rate_hz,
            samples: Vec::new(),
        });
        Ok(())
    }

    /// Moves captured audio from the ring into the take. Returns the number of samples moved.
    pub fn pump(&mut self) -> usize {
        let Some(take) = self.take.as_mut() else {
            return 0;
        };

        let before = take.samples.len();
        while let Some(sample) = take.sink.pop() {
            take.samples.push(sample);
        }
        take.samples.len() - before
    }

    /// Ends the take, releases its source and writes the WAV file.
    ///
    /// The recorder is idle afterwards whether or not the write succeeded.
    pub fn stop(&mut self) -> Result<PathBuf, RecordingError> {
        self.pump();
        let take = self.take.take().ok_or(RecordingError::NotRecording)?;
        let Take {
            source,
            _stream,
            sink,
            channels,
            sample_rate_hz,
            samples,
        } = take;
        drop(_stream);

        let dropped = sink.dropped();
        if dropped > 0 {
            let frame_rate = sample_rate_hz as f32 * f32::from(channels.max(1));
            log::warn!(
                "Recording from {source} lost {dropped} samples ({:.2} s) to a full capture buffer",
                dropped as f32 / frame_rate.max(1.0)
            );
        }

        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(recording_file_name(unix_millis()));
        write_wav(&path, channels, sample_rate_hz, &samples)?;

        log::info!(
            "Saved recording {} ({} frames)",
            path.display(),
            samples.len() / channels.max(1) as usize
        );
        Ok(path)
    }

}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut tap: CaptureTap,
) -> Result<Stream, RecordingError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            tap.push_block(data, f32::from_sample);
        },
        |err| {
            log::error!("Audio input stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(
            recording_file_name(1_700_000_000_000),
            "soundpad-recording-1700000000000.wav"
        );
    }

    #[test]
    fn test_source_parse() {
        assert_eq!("Mic".parse::<RecordingSource>(), Ok(RecordingSource::Microphone));
        assert_eq!("master".parse::<RecordingSource>(), Ok(RecordingSource::MasterOutput));
        assert!("tape".parse::<RecordingSource>().is_err());
    }

    #[test]
    fn test_take_from_consumer_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path().join("takes"));
        let (mut tap, sink) = capture_ring(64);

        recorder.start_with_sink(sink, 2, 8_000).unwrap();
        assert!(recorder.is_recording());
        assert_eq!(recorder.active_source(), Some(RecordingSource::MasterOutput));

        tap.push_block(&[0.5, -0.5, 0.25, -0.25], |s| s);
        assert_eq!(recorder.pump(), 4);
        tap.push_block(&[1.0, -1.0], |s| s);

        let path = recorder.stop().unwrap();
        assert!(!recorder.is_recording());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("soundpad-recording-")
        );

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0], (0.5 * i16::MAX as f32) as i16);
        assert_eq!(samples[4], i16::MAX);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path().to_path_buf());
        let (_t1, s1) = capture_ring(4);
        let (_t2, s2) = capture_ring(4);

        recorder.start_with_sink(s1, 1, 8_000).unwrap();
        assert!(matches!(
            recorder.start_with_sink(s2, 1, 8_000),
            Err(RecordingError::AlreadyRecording)
        ));
    }

    #[test]
    fn test_stop_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path().to_path_buf());
        assert!(matches!(recorder.stop(), Err(RecordingError::NotRecording)));
    }

    #[test]
    fn test_failed_write_reverts_to_idle_without_file() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the recordings directory should be.
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"x").unwrap();

        let mut recorder = Recorder::new(blocker.clone());
        let (_tap, sink) = capture_ring(4);
        recorder.start_with_sink(sink, 1, 8_000).unwrap();

        assert!(recorder.stop().is_err());
        assert!(!recorder.is_recording());
        assert!(blocker.is_file());
    }

    #[test]
    fn test_full_ring_counts_lost_samples() {
        let (mut tap, mut sink) = capture_ring(4);

        tap.push_block(&[1i16, 2, 3], f32::from);
        assert_eq!(sink.dropped(), 0);
        tap.push_block(&[4i16, 5, 6], f32::from);
        assert_eq!(sink.dropped(), 2);

        let kept: Vec<f32> = std::iter::from_fn(|| sink.pop()).collect();
        assert_eq!(kept, vec![1.0, 2.0, 3.0, 4.0]);

        tap.push_block(&[7i16], f32::from);
        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_take_keeps_what_fit_when_ring_overflows() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path().to_path_buf());
        let (mut tap, sink) = capture_ring(4);
        recorder.start_with_sink(sink, 1, 8_000).unwrap();

        tap.push_block(&[0.1f32; 10], |s| s);
        let path = recorder.stop().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn test_microphone_take() {
        // Requires an input device.
        if cpal::default_host().default_input_device().is_none() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(dir.path().to_path_buf());
        if recorder.start_microphone().is_ok() {
            assert_eq!(recorder.active_source(), Some(RecordingSource::Microphone));
            assert!(recorder.stop().is_ok());
        }
    }
}
