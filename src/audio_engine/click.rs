//! Sample-accurate metronome clicks.

use std::f32::consts::TAU;

/// Pitch of a click.
pub const CLICK_FREQUENCY_HZ: f32 = 800.0;

/// Gain at the start of a click.
pub const CLICK_START_GAIN: f32 = 0.3;

/// Gain the exponential ramp reaches when the click ends.
pub const CLICK_END_GAIN: f32 = 0.01;

/// Length of one click.
pub const CLICK_SECONDS: f32 = 0.1;

/// Frames between two ticks, never zero.
pub fn interval_frames(sample_rate_hz: u32, bpm: u32) -> usize {
    if bpm == 0 {
        return usize::MAX;
    }
    ((sample_rate_hz as f64 * 60.0 / f64::from(bpm)).round() as usize).max(1)
}

/// Click generator running inside the mixer.
///
/// The first tick lands on the first frame rendered after [`ClickTrack::start`]; later ticks
/// follow every [`interval_frames`]. Clicks are written straight onto the master bus.
pub struct ClickTrack {
    sample_rate_hz: u32,
    running: bool,
    interval_frames: usize,
    frames_until_tick: usize,
    next_index: u64,
    click_pos: Option<usize>,
    click_frames: usize,
    ramp_ratio: f32,
}

impl ClickTrack {
    pub fn new(sample_rate_hz: u32) -> Self {
        let click_frames = ((sample_rate_hz as f32) * CLICK_SECONDS).round().max(1.0) as usize;

        Self {
            sample_rate_hz,
            running: false,
            interval_frames: usize::MAX,
            frames_until_tick: 0,
            next_index: 0,
            click_pos: None,
            click_frames,
            ramp_ratio: CLICK_END_GAIN / CLICK_START_GAIN,
        }
    }

    pub fn start(&mut self, bpm: u32) {
        self.running = true;
        self.interval_frames = interval_frames(self.sample_rate_hz, bpm);
        self.frames_until_tick = 0;
        self.next_index = 0;
    }

    /// Cancels further ticks; a click already sounding plays out.
    pub fn stop(&mut self) {
        self.running = false;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[cfg(test)]
    pub fn interval(&self) -> usize {
        self.interval_frames
    }

    /// Adds clicks onto an interleaved block and reports each tick fired.
    pub fn render(&mut self, output: &mut [f32], channels: usize, mut on_tick: impl FnMut(u64)) {
        if channels == 0 {
            return;
        }

        for frame in output.chunks_exact_mut(channels) {
            if self.running {
                if self.frames_until_tick == 0 {
                    self.click_pos = Some(0);
                    on_tick(self.next_index);
                    self.next_index += 1;
                    self.frames_until_tick = self.interval_frames;
                }
                self.frames_until_tick -= 1;
            }

            let Some(pos) = self.click_pos else {
                continue;
            };

            let t = pos as f32 / self.click_frames as f32;
            let gain = CLICK_START_GAIN * self.ramp_ratio.powf(t);
            let phase = TAU * CLICK_FREQUENCY_HZ * pos as f32 / self.sample_rate_hz as f32;
            let s = phase.sin() * gain;
            for sample in frame.iter_mut() {
                *sample += s;
            }

            let next = pos + 1;
            self.click_pos = (next < self.click_frames).then_some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_ticks(track: &mut ClickTrack, frames: usize) -> Vec<u64> {
        let mut ticks = Vec::new();
        let mut block = vec![0.0; frames];
        track.render(&mut block, 1, |index| ticks.push(index));
        ticks
    }

    #[test]
    fn test_interval_frames() {
        assert_eq!(interval_frames(44_100, 120), 22_050);
        assert_eq!(interval_frames(48_000, 60), 48_000);
        assert_eq!(interval_frames(44_100, 0), usize::MAX);
    }

    #[test]
    fn test_ticks_at_120_bpm() {
        let mut track = ClickTrack::new(44_100);
        track.start(120);

        let mut fired = Vec::new();
        let mut block = vec![0.0; 44_101];
        track.render(&mut block, 1, |index| fired.push(index));
        assert_eq!(fired, vec![0, 1, 2]);

        // Ticks sit on frames 0, 22050 and 44100: the sample right after each is non-zero.
        assert_eq!(block[0], 0.0);
        assert!(block[1].abs() > 0.0);
        assert!(block[22_051].abs() > 0.0);
        assert!(block[44_100 - 1] == 0.0);
    }

    #[test]
    fn test_click_envelope() {
        let mut track = ClickTrack::new(44_100);
        track.start(60);

        let mut block = vec![0.0; 44_100];
        track.render(&mut block, 1, |_| {});

        let peak_head = block[..441].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        let peak_tail = block[3_969..4_410].iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak_head > 0.25 && peak_head <= 0.3 + 1e-6);
        assert!(peak_tail < 0.02);
        assert!(block[4_410..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stop_prevents_next_tick() {
        let mut track = ClickTrack::new(1_000);
        track.start(600);

        assert_eq!(render_ticks(&mut track, 250), vec![0, 1, 2]);

        track.stop();
        let mut fired = 0;
        let mut block = vec![0.0; 1_000];
        track.render(&mut block, 1, |_| fired += 1);
        assert_eq!(fired, 0);
        assert!(!track.is_running());
    }

    #[test]
    fn test_restart_resets_schedule() {
        let mut track = ClickTrack::new(1_000);
        track.start(60);
        let mut block = vec![0.0; 10];
        track.render(&mut block, 2, |_| {});

        track.start(120);
        assert_eq!(track.interval(), 500);
        let mut fired = Vec::new();
        track.render(&mut block, 2, |index| fired.push(index));
        assert_eq!(fired, vec![0]);
    }
}
