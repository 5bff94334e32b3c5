use crate::audio_engine::errors::DecodeError;

/// Converts interleaved samples between channel layouts.
///
/// - Same channel count: returned untouched
/// - Mono source: the signal is copied to every output channel
/// - Fewer source channels: copied to the first outputs, the rest stay silent
/// - More source channels: source channel `c` folds into output `c % output_channels`,
///   each output averaging what landed in it (5.1 to stereo, stereo to mono)
pub fn map_channels(
    samples: Vec<f32>,
    file_channels: usize,
    output_channels: usize,
) -> Result<Vec<f32>, DecodeError> {
    if file_channels == 0 || output_channels == 0 {
        return Err(DecodeError::UnsupportedChannels {
            file_channels,
            output_channels,
        });
    }

    if file_channels == output_channels {
        return Ok(samples);
    }

    let frames = samples.len() / file_channels;
    let mut out = Vec::with_capacity(frames * output_channels);

    if file_channels == 1 {
        for &s in &samples {
            out.extend(std::iter::repeat_n(s, output_channels));
        }
        return Ok(out);
    }

    if file_channels < output_channels {
        for frame in samples.chunks_exact(file_channels) {
            out.extend_from_slice(frame);
            out.extend(std::iter::repeat_n(0.0, output_channels - file_channels));
        }
        return Ok(out);
    }

    let weights: Vec<f32> = (0..output_channels)
        .map(|o| {
            let folded = (o..file_channels).step_by(output_channels).count();
            1.0 / folded as f32
        })
        .collect();

    for frame in samples.chunks_exact(file_channels) {
        let start = out.len();
        out.extend(std::iter::repeat_n(0.0, output_channels));
        for (c, &s) in frame.iter().enumerate() {
            out[start + c % output_channels] += s;
        }
        for (s, w) in out[start..].iter_mut().zip(&weights) {
            *s *= w;
        }
    }
    Ok(out)
}

/// Splits an interleaved buffer into one `Vec` per channel.
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }

    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &s) in planes.iter_mut().zip(frame) {
            plane.push(s);
        }
    }
    planes
}

/// Joins per-channel planes back into one interleaved buffer, cut to the shortest plane.
pub fn interleave(planes: &[Vec<f32>]) -> Vec<f32> {
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planes.len());
    for i in 0..frames {
        out.extend(planes.iter().map(|plane| plane[i]));
    }
    out
}
