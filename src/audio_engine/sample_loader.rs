//! Audio file loading and decoding.
//!
//! Files are decoded with Symphonia, mapped to the engine channel layout and resampled to
//! the engine rate, so the mixer can play every buffer frame-for-frame.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::audio_engine::channels::{deinterleave, interleave, map_channels};
use crate::audio_engine::errors::DecodeError;
use crate::messages::SampleBuffer;

/// File extensions accepted by the importer. Anything else is skipped without a decode
/// attempt.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "wave", "mp3", "ogg", "oga", "opus", "flac", "m4a", "aac", "aif", "aiff", "aifc",
    "caf", "weba", "mka",
];

/// Frames per resampler pass.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Returns whether `path` names a file type the importer treats as audio.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Display name for an imported file: the file name without its extension.
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

/// Decodes an audio file into a sample buffer in the engine's channel layout and rate.
///
/// # Errors
///
/// - the file cannot be opened or is not a recognised audio format
/// - the stream lacks sample rate or channel information
/// - the file or the output reports zero channels
/// - the file contains no audio
pub fn decode_audio_file_to_sample_buffer(
    path: &Path,
    output_channels: usize,
    output_rate_hz: u32,
) -> Result<SampleBuffer, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoDefaultTrack)?;
    let track_id = track.id;
    let file_rate_hz = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingSampleRate)?;
    let file_channels = track
        .codec_params
        .channels
        .ok_or(DecodeError::MissingChannels)?
        .count();

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(DecodeError::Decode(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    if decoded.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mapped = map_channels(decoded, file_channels, output_channels)?;
    let resampled = resample_interleaved(mapped, output_channels, file_rate_hz, output_rate_hz)?;

    log::debug!(
        "Decoded {}: {} Hz x{} -> {} Hz x{}",
        path.display(),
        file_rate_hz,
        file_channels,
        output_rate_hz,
        output_channels
    );

    Ok(SampleBuffer {
        channels: output_channels,
        sample_rate_hz: output_rate_hz,
        samples: Arc::from(resampled.into_boxed_slice()),
    })
}

/// Converts interleaved audio from `from_hz` to `to_hz` with a windowed-sinc resampler.
///
/// The output is trimmed to exactly `round(frames * to_hz / from_hz)` frames with the
/// resampler delay removed, so a resampled clip keeps its duration.
pub fn resample_interleaved(
    samples: Vec<f32>,
    channels: usize,
    from_hz: u32,
    to_hz: u32,
) -> Result<Vec<f32>, DecodeError> {
    if from_hz == to_hz || channels == 0 || samples.is_empty() {
        return Ok(samples);
    }

    let ratio = f64::from(to_hz) / f64::from(from_hz);
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK_FRAMES, channels)?;

    let planes = deinterleave(&samples, channels);
    let frames = planes.first().map(Vec::len).unwrap_or(0);
    let expected_frames = (frames as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();

    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames + delay); channels];
    let mut pos = 0;
    while pos < frames {
        let end = (pos + RESAMPLE_CHUNK_FRAMES).min(frames);
        let chunk: Vec<Vec<f32>> = planes
            .iter()
            .map(|plane| {
                let mut block = plane[pos..end].to_vec();
                block.resize(RESAMPLE_CHUNK_FRAMES, 0.0);
                block
            })
            .collect();

        let processed = resampler.process(&chunk, None)?;
        for (dst, src) in out.iter_mut().zip(processed) {
            dst.extend(src);
        }
        pos += RESAMPLE_CHUNK_FRAMES;
    }

    let tail = resampler.process_partial::<Vec<f32>>(None, None)?;
    for (dst, src) in out.iter_mut().zip(tail) {
        dst.extend(src);
    }

    for plane in out.iter_mut() {
        let start = delay.min(plane.len());
        plane.drain(..start);
        plane.truncate(expected_frames);
    }

    Ok(interleave(&out))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_pcm16_wav(
        path: &Path,
        channels: u16,
        sample_rate_hz: u32,
        samples: &[i16],
    ) -> std::io::Result<()> {
        let bits_per_sample = 16u16;
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate_hz * u32::from(block_align);
        let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
        let chunk_size = 36 + data_len_bytes;

        let mut file = File::create(path)?;
        file.write_all(b"RIFF")?;
        file.write_all(&chunk_size.to_le_bytes())?;
        file.write_all(b"WAVE")?;

        file.write_all(b"fmt ")?;
        file.write_all(&16u32.to_le_bytes())?;
        file.write_all(&1u16.to_le_bytes())?; // PCM
        file.write_all(&channels.to_le_bytes())?;
        file.write_all(&sample_rate_hz.to_le_bytes())?;
        file.write_all(&byte_rate.to_le_bytes())?;
        file.write_all(&block_align.to_le_bytes())?;
        file.write_all(&bits_per_sample.to_le_bytes())?;

        file.write_all(b"data")?;
        file.write_all(&data_len_bytes.to_le_bytes())?;
        for sample in samples {
            file.write_all(&sample.to_le_bytes())?;
        }

        Ok(())
    }

    #[test]
    fn test_decode_wav_to_f32_buffer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        let samples = [0i16, 16_384i16, -16_384i16, 32_767i16];
        write_pcm16_wav(&path, 1, 44_100, &samples).unwrap();

        let decoded = decode_audio_file_to_sample_buffer(&path, 1, 44_100).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate_hz, 44_100);
        assert_eq!(decoded.samples.len(), samples.len());
        assert!(decoded.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_decode_channel_mapping_mono_to_stereo() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.wav");

        let samples = [0i16, 16_384i16, -16_384i16];
        write_pcm16_wav(&path, 1, 44_100, &samples).unwrap();

        let decoded = decode_audio_file_to_sample_buffer(&path, 2, 44_100).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), samples.len() * 2);
        for frame in decoded.samples.chunks_exact(2) {
            assert!((frame[0] - frame[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_stereo_file_on_quad_device() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stereo.wav");

        let samples = [16_384i16, -16_384i16, 8_192i16, -8_192i16];
        write_pcm16_wav(&path, 2, 48_000, &samples).unwrap();

        let decoded = decode_audio_file_to_sample_buffer(&path, 4, 48_000).unwrap();
        assert_eq!(decoded.channels, 4);
        assert_eq!(decoded.frames(), 2);
        assert!((decoded.samples[0] - 0.5).abs() < 1e-3);
        assert!((decoded.samples[1] + 0.5).abs() < 1e-3);
        assert_eq!(&decoded.samples[2..4], &[0.0, 0.0]);
    }

    #[test]
    fn test_decode_surround_file_on_stereo_device() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("surround.wav");

        // More than two channels needs the extensible header, which hound writes.
        let spec = hound::WavSpec {
            channels: 6,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            for s in [8_192i16, 0, 8_192, 0, 8_192, 0] {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();

        let decoded = decode_audio_file_to_sample_buffer(&path, 2, 48_000).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 10);
        for frame in decoded.samples.chunks_exact(2) {
            assert!((frame[0] - 0.25).abs() < 1e-3);
            assert!(frame[1].abs() < 1e-6);
        }
    }

    #[test]
    fn test_decode_resamples_to_output_rate() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("slow.wav");

        let samples: Vec<i16> = (0..2_205)
            .map(|i| ((i as f32 * 0.05).sin() * 8_000.0) as i16)
            .collect();
        write_pcm16_wav(&path, 1, 22_050, &samples).unwrap();

        let decoded = decode_audio_file_to_sample_buffer(&path, 2, 44_100).unwrap();
        assert_eq!(decoded.sample_rate_hz, 44_100);
        assert_eq!(decoded.frames(), 4_410);
        assert!(decoded.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let output = resample_interleaved(input.clone(), 2, 48_000, 48_000).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_decode_invalid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nonexistent.wav");

        let result = decode_audio_file_to_sample_buffer(&path, 1, 44_100);
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_decode_garbage_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        assert!(decode_audio_file_to_sample_buffer(&path, 2, 44_100).is_err());
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("Kick Drum.wav")));
        assert!(is_audio_file(Path::new("loop.MP3")));
        assert!(is_audio_file(Path::new("/tmp/take.flac")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("README")));
    }

    #[test]
    fn test_display_name_strips_extension() {
        assert_eq!(display_name(Path::new("Kick Drum.wav")), "Kick Drum");
        assert_eq!(display_name(Path::new("/samples/snare.v2.ogg")), "snare.v2");
        assert_eq!(display_name(Path::new("")), "Untitled");
    }
}
