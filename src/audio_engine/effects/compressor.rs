//! Dynamics compressor running with stock settings.
//!
//! Nothing here is user-tunable: the parameters are the usual engine defaults (-24 dB
//! threshold, 30 dB knee, 12:1, 3 ms attack, 250 ms release) with automatic makeup gain.

pub const THRESHOLD_DB: f32 = -24.0;
pub const KNEE_DB: f32 = 30.0;
pub const RATIO: f32 = 12.0;
pub const ATTACK_SECONDS: f32 = 0.003;
pub const RELEASE_SECONDS: f32 = 0.25;

/// Fraction of the full-scale gain reduction given back as makeup gain.
const MAKEUP_EXPONENT: f32 = 0.6;

/// Floor for the level detector, keeps `log10` finite on silence.
const DETECTOR_FLOOR: f32 = 1e-6;

fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(DETECTOR_FLOOR).log10()
}

fn time_coefficient(seconds: f32, sample_rate_hz: u32) -> f32 {
    let samples = seconds * sample_rate_hz as f32;
    if !samples.is_finite() || samples <= 0.0 {
        return 0.0;
    }
    (-1.0 / samples).exp()
}

/// Static soft-knee curve: gain change in dB (always `<= 0`) for a detector level.
pub fn gain_reduction_db(input_db: f32) -> f32 {
    let over = input_db - THRESHOLD_DB;

    let output_db = if 2.0 * over < -KNEE_DB {
        input_db
    } else if 2.0 * over.abs() <= KNEE_DB {
        let k = over + KNEE_DB / 2.0;
        input_db + (1.0 / RATIO - 1.0) * k * k / (2.0 * KNEE_DB)
    } else {
        THRESHOLD_DB + over / RATIO
    };

    (output_db - input_db).min(0.0)
}

pub struct Compressor {
    channels: usize,
    attack_coeff: f32,
    release_coeff: f32,
    envelope_db: f32,
    makeup_gain: f32,
}

impl Compressor {
    pub fn new(sample_rate_hz: u32, channels: usize) -> Self {
        Self {
            channels,
            attack_coeff: time_coefficient(ATTACK_SECONDS, sample_rate_hz),
            release_coeff: time_coefficient(RELEASE_SECONDS, sample_rate_hz),
            envelope_db: 0.0,
            makeup_gain: db_to_linear(-gain_reduction_db(0.0) * MAKEUP_EXPONENT),
        }
    }

    #[cfg(test)]
    pub fn makeup_gain(&self) -> f32 {
        self.makeup_gain
    }

    /// Current smoothed gain reduction in dB.
    #[cfg(test)]
    pub fn reduction_db(&self) -> f32 {
        self.envelope_db
    }

    /// Compresses an interleaved block in place; channels share one detector.
    pub fn process(&mut self, block: &mut [f32]) {
        if self.channels == 0 {
            return;
        }

        for frame in block.chunks_exact_mut(self.channels) {
            let peak = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
            let target = gain_reduction_db(linear_to_db(peak));

            let coeff = if target < self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * target;

            let gain = db_to_linear(self.envelope_db) * self.makeup_gain;
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }
}
