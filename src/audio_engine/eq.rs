//! Five-band shelving EQ shared by every pad voice.
//!
//! The coefficients live in one [`EqChain`] owned by the mixer; each voice keeps its own
//! [`EqChainState`], so summing the filtered voices is the same as filtering the sum.

use std::f32::consts::PI;

use crate::audio_engine::constants::{
    EQ_DB_MAX, EQ_DB_MIN, EQ_FREQUENCIES_HZ, HIGH_SHELF_FROM_HZ, NUM_EQ_BANDS,
};

const BUTTERWORTH_Q: f32 = 0.70710677;

/// Shelf slope used for every band (1.0 = steepest slope without overshoot).
const SHELF_SLOPE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    pub fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BiquadState {
    z1: f32,
    z2: f32,
}

impl BiquadState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub fn biquad_process(coeffs: BiquadCoeffs, state: &mut BiquadState, x: f32) -> f32 {
    let y = coeffs.b0 * x + state.z1;
    state.z1 = coeffs.b1 * x - coeffs.a1 * y + state.z2;
    state.z2 = coeffs.b2 * x - coeffs.a2 * y;
    y
}

fn clamp_freq_hz(fs_hz: f32, freq_hz: f32) -> f32 {
    if !fs_hz.is_finite() || fs_hz <= 0.0 {
        return freq_hz.max(1.0);
    }

    let nyquist = fs_hz * 0.5;
    let max_hz = (nyquist * 0.9).max(1.0);
    freq_hz.clamp(1.0, max_hz)
}

fn normalize_biquad(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoeffs {
    if !a0.is_finite() || a0.abs() < 1e-12 {
        return BiquadCoeffs::identity();
    }

    let inv_a0 = 1.0 / a0;
    let coeffs = BiquadCoeffs {
        b0: b0 * inv_a0,
        b1: b1 * inv_a0,
        b2: b2 * inv_a0,
        a1: a1 * inv_a0,
        a2: a2 * inv_a0,
    };

    if [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
        .iter()
        .all(|v| v.is_finite())
    {
        coeffs
    } else {
        BiquadCoeffs::identity()
    }
}

/// Second-order Butterworth low pass, used as the anti-alias stage of the wave shaper.
pub fn biquad_low_pass_butterworth(fs_hz: f32, freq_hz: f32) -> BiquadCoeffs {
    let freq_hz = clamp_freq_hz(fs_hz, freq_hz);
    let w0 = 2.0 * PI * freq_hz / fs_hz;
    let cos_w0 = w0.cos();
    let sin_w0 = w0.sin();
    let alpha = sin_w0 / (2.0 * BUTTERWORTH_Q);

    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = (1.0 - cos_w0) * 0.5;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

struct ShelfTerms {
    a: f32,
    cos_w0: f32,
    two_sqrt_a_alpha: f32,
}

fn shelf_terms(fs_hz: f32, freq_hz: f32, gain_db: f32) -> Option<ShelfTerms> {
    if !fs_hz.is_finite() || fs_hz <= 0.0 || !gain_db.is_finite() {
        return None;
    }

    let freq_hz = clamp_freq_hz(fs_hz, freq_hz);
    let a = 10.0_f32.powf(gain_db / 40.0);
    let w0 = 2.0 * PI * freq_hz / fs_hz;
    let alpha = w0.sin() / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt();

    Some(ShelfTerms {
        a,
        cos_w0: w0.cos(),
        two_sqrt_a_alpha: 2.0 * a.sqrt() * alpha,
    })
}

pub fn biquad_low_shelf(fs_hz: f32, freq_hz: f32, gain_db: f32) -> BiquadCoeffs {
    let Some(ShelfTerms {
        a,
        cos_w0: c,
        two_sqrt_a_alpha: k,
    }) = shelf_terms(fs_hz, freq_hz, gain_db)
    else {
        return BiquadCoeffs::identity();
    };

    let b0 = a * ((a + 1.0) - (a - 1.0) * c + k);
    let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * c);
    let b2 = a * ((a + 1.0) - (a - 1.0) * c - k);
    let a0 = (a + 1.0) + (a - 1.0) * c + k;
    let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * c);
    let a2 = (a + 1.0) + (a - 1.0) * c - k;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

pub fn biquad_high_shelf(fs_hz: f32, freq_hz: f32, gain_db: f32) -> BiquadCoeffs {
    let Some(ShelfTerms {
        a,
        cos_w0: c,
        two_sqrt_a_alpha: k,
    }) = shelf_terms(fs_hz, freq_hz, gain_db)
    else {
        return BiquadCoeffs::identity();
    };

    let b0 = a * ((a + 1.0) + (a - 1.0) * c + k);
    let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * c);
    let b2 = a * ((a + 1.0) + (a - 1.0) * c - k);
    let a0 = (a + 1.0) - (a - 1.0) * c + k;
    let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * c);
    let a2 = (a + 1.0) - (a - 1.0) * c - k;

    normalize_biquad(b0, b1, b2, a0, a1, a2)
}

/// Response shape of one EQ band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShelfKind {
    LowShelf,
    HighShelf,
}

impl ShelfKind {
    pub fn for_frequency(freq_hz: u32) -> Self {
        if freq_hz >= HIGH_SHELF_FROM_HZ {
            Self::HighShelf
        } else {
            Self::LowShelf
        }
    }
}

fn shelf_coeffs(kind: ShelfKind, fs_hz: f32, frequency_hz: u32, gain_db: f32) -> BiquadCoeffs {
    match kind {
        ShelfKind::LowShelf => biquad_low_shelf(fs_hz, frequency_hz as f32, gain_db),
        ShelfKind::HighShelf => biquad_high_shelf(fs_hz, frequency_hz as f32, gain_db),
    }
}

/// One shelving filter of the chain. The corner frequency never changes after construction.
#[derive(Clone, Copy, Debug)]
pub struct EqBand {
    frequency_hz: u32,
    kind: ShelfKind,
    gain_db: f32,
    coeffs: BiquadCoeffs,
}

impl EqBand {
    fn new(fs_hz: f32, frequency_hz: u32) -> Self {
        let kind = ShelfKind::for_frequency(frequency_hz);
        Self {
            frequency_hz,
            kind,
            gain_db: 0.0,
            coeffs: shelf_coeffs(kind, fs_hz, frequency_hz, 0.0),
        }
    }

    /// Unchanged gains keep their coefficients.
    fn set_gain_db(&mut self, fs_hz: f32, gain_db: f32) {
        let gain_db = if gain_db.is_finite() {
            gain_db.clamp(EQ_DB_MIN, EQ_DB_MAX)
        } else {
            0.0
        };
        if gain_db == self.gain_db {
            return;
        }

        self.gain_db = gain_db;
        self.coeffs = shelf_coeffs(self.kind, fs_hz, self.frequency_hz, gain_db);
    }

    #[cfg(test)]
    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    #[cfg(test)]
    pub fn kind(&self) -> ShelfKind {
        self.kind
    }

    #[cfg(test)]
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }
}

/// Per-voice filter memory for the whole chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct EqChainState {
    stages: [BiquadState; NUM_EQ_BANDS],
}

impl EqChainState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The fixed series of shelving filters, in ascending frequency order.
#[derive(Clone, Debug)]
pub struct EqChain {
    sample_rate_hz: f32,
    bands: [EqBand; NUM_EQ_BANDS],
}

impl EqChain {
    pub fn new(sample_rate_hz: u32) -> Self {
        let fs_hz = sample_rate_hz as f32;
        Self {
            sample_rate_hz: fs_hz,
            bands: EQ_FREQUENCIES_HZ.map(|freq| EqBand::new(fs_hz, freq)),
        }
    }

    /// Index of the band with the given centre frequency.
    pub fn band_index(frequency_hz: u32) -> Option<usize> {
        EQ_FREQUENCIES_HZ.iter().position(|&f| f == frequency_hz)
    }

    #[cfg(test)]
    pub fn bands(&self) -> &[EqBand] {
        &self.bands
    }

    /// Sets a band gain, clamped to the allowed dB range. Unknown bands are ignored.
    pub fn set_gain_db(&mut self, band: usize, gain_db: f32) {
        let fs_hz = self.sample_rate_hz;
        if let Some(band) = self.bands.get_mut(band) {
            band.set_gain_db(fs_hz, gain_db);
        }
    }

    pub fn process(&self, state: &mut EqChainState, x: f32) -> f32 {
        let mut y = x;
        for (band, stage) in self.bands.iter().zip(state.stages.iter_mut()) {
            y = biquad_process(band.coeffs, stage, y);
        }
        y
    }
}
