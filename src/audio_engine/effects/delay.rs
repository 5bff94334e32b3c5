//! Feedback echo.
//!
//! The delay line feeds its own output back into its input through a fixed gain; the
//! wet tap sits on the loop output. Upstream audio enters the loop, downstream audio
//! leaves from the wet tap, which is why the handle exposes two different nodes.

/// Echo spacing.
pub const DELAY_TIME_SECONDS: f32 = 0.3;

/// Longest delay the line is allowed to hold.
pub const MAX_DELAY_SECONDS: f32 = 1.0;

/// Gain of the loop from the line output back into its input.
pub const FEEDBACK_GAIN: f32 = 0.4;

/// Gain of the tap that downstream nodes read from.
pub const WET_GAIN: f32 = 0.3;

/// A delay line closed into a loop through a feedback gain.
pub struct FeedbackDelay {
    channels: usize,
    delay_frames: usize,
    feedback_gain: f32,
    line: Vec<f32>,
    pos: usize,
}

impl FeedbackDelay {
    pub fn new(sample_rate_hz: u32, channels: usize, delay_seconds: f32, feedback_gain: f32) -> Self {
        let delay_seconds = delay_seconds.clamp(0.0, MAX_DELAY_SECONDS);
        let delay_frames = ((sample_rate_hz as f32) * delay_seconds).round().max(1.0) as usize;

        Self {
            channels,
            delay_frames,
            feedback_gain,
            line: vec![0.0; delay_frames * channels],
            pos: 0,
        }
    }

    #[cfg(test)]
    pub fn delay_frames(&self) -> usize {
        self.delay_frames
    }

    #[cfg(test)]
    pub fn feedback_gain(&self) -> f32 {
        self.feedback_gain
    }

    /// Replaces each interleaved sample with the line output and pushes the input plus
    /// the fed-back output into the line.
    pub fn process(&mut self, block: &mut [f32]) {
        if self.channels == 0 {
            return;
        }

        for frame in block.chunks_exact_mut(self.channels) {
            let base = self.pos * self.channels;
            for (c, sample) in frame.iter_mut().enumerate() {
                let delayed = self.line[base + c];
                self.line[base + c] = *sample + delayed * self.feedback_gain;
                *sample = delayed;
            }
            self.pos = (self.pos + 1) % self.delay_frames;
        }
    }
}

/// The delay effect: a feedback loop plus the wet gain downstream nodes connect from.
pub struct DelayHandle {
    pub feedback: FeedbackDelay,
    pub wet_gain: f32,
}

impl DelayHandle {
    pub fn new(sample_rate_hz: u32, channels: usize) -> Self {
        Self {
            feedback: FeedbackDelay::new(
                sample_rate_hz,
                channels,
                DELAY_TIME_SECONDS,
                FEEDBACK_GAIN,
            ),
            wet_gain: WET_GAIN,
        }
    }

    pub fn process(&mut self, block: &mut [f32]) {
        self.feedback.process(block);
        for sample in block.iter_mut() {
            *sample *= self.wet_gain;
        }
    }
}
