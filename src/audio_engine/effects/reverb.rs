//! Convolution reverb with a synthetic, exponentially decaying noise impulse.
//!
//! The impulse is two seconds of stereo noise shaped by `(1 - t/T)^2`. Every reverb built
//! draws fresh noise, so two instances sound alike without being bit-identical.
//!
//! Convolution is uniformly partitioned overlap-save: the impulse is cut into
//! [`PARTITION_FRAMES`]-long partitions, each transformed once up front, and every input
//! block is multiplied against the whole frequency-domain delay line. Latency is one
//! partition.

use std::sync::Arc;

use rand::Rng;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};

/// Length of the impulse response.
pub const IMPULSE_SECONDS: f32 = 2.0;

/// Channels of the impulse response.
pub const IMPULSE_CHANNELS: usize = 2;

/// Partition (and latency) size of the convolver.
pub const PARTITION_FRAMES: usize = 512;

const GAIN_CALIBRATION_DB: f32 = -58.0;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44_100.0;
const MIN_POWER: f32 = 0.000_125;

/// Fills a stereo impulse with decaying white noise.
pub fn generate_impulse<R: Rng + ?Sized>(sample_rate_hz: u32, rng: &mut R) -> Vec<Vec<f32>> {
    let length = ((sample_rate_hz as f32) * IMPULSE_SECONDS) as usize;

    (0..IMPULSE_CHANNELS)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let decay = 1.0 - i as f32 / length as f32;
                    rng.gen_range(-1.0_f32..=1.0) * decay * decay
                })
                .collect()
        })
        .collect()
}

/// Loudness normalisation for an impulse, so a dense two second tail does not blow up
/// the mix. Mirrors the calibration browsers apply to convolver buffers.
pub fn normalization_scale(impulse: &[Vec<f32>], sample_rate_hz: u32) -> f32 {
    let total: usize = impulse.iter().map(Vec::len).sum();
    if total == 0 {
        return 1.0;
    }

    let energy: f32 = impulse
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|s| s * s)
        .sum();
    let power = (energy / total as f32).sqrt().max(MIN_POWER);

    let mut scale = 1.0 / power;
    scale *= 10.0_f32.powf(GAIN_CALIBRATION_DB * 0.05);
    if sample_rate_hz > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / sample_rate_hz as f32;
    }
    scale
}

struct PartitionedConvolver {
    block: usize,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    ir_spectra: Vec<Vec<Complex<f32>>>,
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_head: usize,
    window: Vec<f32>,
    input_block: Vec<f32>,
    output_block: Vec<f32>,
    pos: usize,
    fft_in: Vec<f32>,
    accum: Vec<Complex<f32>>,
    time_out: Vec<f32>,
    scratch_fwd: Vec<Complex<f32>>,
    scratch_inv: Vec<Complex<f32>>,
}

impl PartitionedConvolver {
    fn new(
        planner: &mut RealFftPlanner<f32>,
        impulse: &[f32],
        scale: f32,
        block: usize,
    ) -> Result<Self, FftError> {
        let fft_size = block * 2;
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);

        let partitions = impulse.len().div_ceil(block).max(1);
        let mut scratch_fwd = r2c.make_scratch_vec();
        let mut padded = r2c.make_input_vec();

        let ir_spectra = (0..partitions)
            .map(|p| {
                padded.fill(0.0);
                let start = p * block;
                let end = (start + block).min(impulse.len());
                for (dst, src) in padded.iter_mut().zip(&impulse[start..end]) {
                    *dst = src * scale;
                }

                let mut spectrum = r2c.make_output_vec();
                r2c.process_with_scratch(&mut padded, &mut spectrum, &mut scratch_fwd)?;
                Ok(spectrum)
            })
            .collect::<Result<Vec<_>, FftError>>()?;

        let fdl = (0..partitions).map(|_| r2c.make_output_vec()).collect();

        Ok(Self {
            block,
            ir_spectra,
            fdl,
            fdl_head: 0,
            window: vec![0.0; fft_size],
            input_block: vec![0.0; block],
            output_block: vec![0.0; block],
            pos: 0,
            fft_in: r2c.make_input_vec(),
            accum: r2c.make_output_vec(),
            time_out: c2r.make_output_vec(),
            scratch_inv: c2r.make_scratch_vec(),
            scratch_fwd,
            r2c,
            c2r,
        })
    }

    fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.output_block[self.pos];
        self.input_block[self.pos] = x;
        self.pos += 1;

        if self.pos == self.block {
            self.process_block();
            self.pos = 0;
        }

        y
    }

    fn process_block(&mut self) {
        let block = self.block;
        let partitions = self.fdl.len();

        self.window.copy_within(block.., 0);
        self.window[block..].copy_from_slice(&self.input_block);
        self.fft_in.copy_from_slice(&self.window);

        self.fdl_head = (self.fdl_head + partitions - 1) % partitions;
        let forward = self.r2c.process_with_scratch(
            &mut self.fft_in,
            &mut self.fdl[self.fdl_head],
            &mut self.scratch_fwd,
        );
        debug_assert!(forward.is_ok(), "reverb forward transform: {forward:?}");
        if forward.is_err() {
            self.output_block.fill(0.0);
            return;
        }

        self.accum.fill(Complex::new(0.0, 0.0));
        for (p, ir) in self.ir_spectra.iter().enumerate() {
            let x = &self.fdl[(self.fdl_head + p) % partitions];
            for ((acc, a), b) in self.accum.iter_mut().zip(x).zip(ir) {
                *acc += a * b;
            }
        }

        // The inverse real transform rejects non-zero imaginary parts at DC and Nyquist.
        if let Some(first) = self.accum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.accum.last_mut() {
            last.im = 0.0;
        }

        let inverse = self.c2r.process_with_scratch(
            &mut self.accum,
            &mut self.time_out,
            &mut self.scratch_inv,
        );
        debug_assert!(inverse.is_ok(), "reverb inverse transform: {inverse:?}");
        if inverse.is_err() {
            self.output_block.fill(0.0);
            return;
        }

        let norm = 1.0 / (block * 2) as f32;
        for (out, y) in self.output_block.iter_mut().zip(&self.time_out[block..]) {
            *out = y * norm;
        }
    }
}

/// Stereo convolution reverb. Output channel `c` is convolved with impulse channel `c % 2`.
pub struct Reverb {
    channels: usize,
    convolvers: Vec<PartitionedConvolver>,
}

impl Reverb {
    /// # Errors
    ///
    /// Returns the transform error if an impulse partition cannot be transformed.
    pub fn new(sample_rate_hz: u32, channels: usize) -> Result<Self, FftError> {
        Self::with_rng(sample_rate_hz, channels, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        sample_rate_hz: u32,
        channels: usize,
        rng: &mut R,
    ) -> Result<Self, FftError> {
        let impulse = generate_impulse(sample_rate_hz, rng);
        let scale = normalization_scale(&impulse, sample_rate_hz);

        let mut planner = RealFftPlanner::<f32>::new();
        let convolvers = (0..channels)
            .map(|c| {
                PartitionedConvolver::new(
                    &mut planner,
                    &impulse[c % IMPULSE_CHANNELS],
                    scale,
                    PARTITION_FRAMES,
                )
            })
            .collect::<Result<Vec<_>, FftError>>()?;

        Ok(Self {
            channels,
            convolvers,
        })
    }

    /// Convolves an interleaved block in place.
    pub fn process(&mut self, block: &mut [f32]) {
        if self.channels == 0 {
            return;
        }

        for frame in block.chunks_exact_mut(self.channels) {
            for (sample, convolver) in frame.iter_mut().zip(self.convolvers.iter_mut()) {
                *sample = convolver.process_sample(*sample);
            }
        }
    }
}
