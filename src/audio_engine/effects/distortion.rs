//! Wave-shaping distortion.

use std::f32::consts::PI;
use std::sync::Arc;

use crate::audio_engine::eq::{
    BiquadCoeffs, BiquadState, biquad_low_pass_butterworth, biquad_process,
};

/// Resolution of the transfer curve.
pub const CURVE_SAMPLES: usize = 44_100;

/// Oversampling factor around the shaper.
pub const OVERSAMPLE: usize = 4;

/// Anti-alias corner as a fraction of the base sample rate.
const ANTI_ALIAS_CUTOFF: f32 = 0.45;

/// `f(x) = (13·x·20·π/180) / (π + 10·|x|)` sampled over `x ∈ [-1, 1)`.
pub fn make_distortion_curve(samples: usize) -> Vec<f32> {
    let deg = PI / 180.0;
    (0..samples)
        .map(|i| {
            let x = (i * 2) as f32 / samples as f32 - 1.0;
            ((3.0 + 10.0) * x * 20.0 * deg) / (PI + 10.0 * x.abs())
        })
        .collect()
}

/// Looks `x` up on the curve with linear interpolation, clamping outside `[-1, 1]`.
pub fn shape(curve: &[f32], x: f32) -> f32 {
    let Some(&last) = curve.last() else {
        return x;
    };
    if !x.is_finite() {
        return 0.0;
    }

    let v = (curve.len() - 1) as f32 * 0.5 * (x + 1.0);
    if v <= 0.0 {
        return curve[0];
    }
    if v >= (curve.len() - 1) as f32 {
        return last;
    }

    let i = v as usize;
    let frac = v - i as f32;
    curve[i] + (curve[i + 1] - curve[i]) * frac
}

#[derive(Clone, Copy, Default)]
struct ChannelState {
    previous: f32,
    anti_alias: [BiquadState; 2],
}

pub struct WaveShaper {
    channels: usize,
    curve: Arc<[f32]>,
    anti_alias: BiquadCoeffs,
    state: Vec<ChannelState>,
}

impl WaveShaper {
    pub fn new(sample_rate_hz: u32, channels: usize) -> Self {
        let curve: Arc<[f32]> = Arc::from(make_distortion_curve(CURVE_SAMPLES).into_boxed_slice());
        Self::with_curve(sample_rate_hz, channels, curve)
    }

    pub fn with_curve(sample_rate_hz: u32, channels: usize, curve: Arc<[f32]>) -> Self {
        let base_hz = sample_rate_hz as f32;
        let oversampled_hz = base_hz * OVERSAMPLE as f32;

        Self {
            channels,
            curve,
            anti_alias: biquad_low_pass_butterworth(oversampled_hz, base_hz * ANTI_ALIAS_CUTOFF),
            state: vec![ChannelState::default(); channels],
        }
    }

    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    /// Shapes an interleaved block in place at four times the base rate.
    pub fn process(&mut self, block: &mut [f32]) {
        if self.channels == 0 {
            return;
        }

        for frame in block.chunks_exact_mut(self.channels) {
            for (sample, state) in frame.iter_mut().zip(self.state.iter_mut()) {
                let x = *sample;
                let mut y = 0.0;
                for k in 1..=OVERSAMPLE {
                    let t = k as f32 / OVERSAMPLE as f32;
                    let u = state.previous + (x - state.previous) * t;
                    let mut s = shape(&self.curve, u);
                    for stage in state.anti_alias.iter_mut() {
                        s = biquad_process(self.anti_alias, stage, s);
                    }
                    y = s;
                }
                state.previous = x;
                *sample = y;
            }
        }
    }
}
