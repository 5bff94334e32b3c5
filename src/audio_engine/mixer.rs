//! Real-time audio mixer implementation.
//!
//! [`RtMixer`] owns everything the output callback touches: the voice slots, the shared EQ
//! coefficients, the master gain, the click track, the level meter and the optional capture
//! tap. One rendered block follows the graph
//!
//! ```text
//! voice → EQ chain ─┬──────────────────────────────┐
//!                   └→ effect 1 → … → effect n ────┴→ master gain → output / meter / capture
//! click track ─────────────────────────────────────────↗
//! ```
//!
//! Events for the controller (voice ended, tick, level) are collected in a pre-allocated
//! outbox that the engine drains after every call. Effect chains of freed voices are parked
//! the same way and travel back to the controller, which drops them off the audio thread.

use cpal::Sample;

use crate::audio_engine::click::ClickTrack;
use crate::audio_engine::constants::{
    DEFAULT_MASTER_VOLUME, EFFECT_TAIL_SECONDS, MAX_BLOCK_FRAMES, MAX_VOICES,
    METER_UPDATES_PER_SECOND, VOLUME_MAX, VOLUME_MIN,
};
use crate::audio_engine::effects::EffectHandle;
use crate::audio_engine::eq::EqChain;
use crate::audio_engine::voice_slot::VoiceSlot;
use crate::messages::{AudioMessage, SampleBuffer};
use crate::recorder::CaptureTap;

/// Events one render pass (or one burst of commands) can produce before the engine drains.
const OUTBOX_CAPACITY: usize = MAX_VOICES * 4 + 64;

/// Freed effect chains one render pass (or one burst of commands) can park.
const RETIRED_CAPACITY: usize = MAX_VOICES * 2;

fn emit(outbox: &mut Vec<AudioMessage>, message: AudioMessage) {
    if outbox.len() < outbox.capacity() {
        outbox.push(message);
    }
}

fn retire(retired: &mut Vec<Vec<EffectHandle>>, chain: Vec<EffectHandle>) {
    if chain.is_empty() {
        return;
    }
    if retired.len() < retired.capacity() {
        retired.push(chain);
    }
}

/// Peak/RMS of the master bus over fixed windows.
struct LevelMeter {
    window_frames: usize,
    frames: usize,
    samples: usize,
    peak: f32,
    sum_sq: f32,
}

impl LevelMeter {
    fn new(sample_rate_hz: u32) -> Self {
        Self {
            window_frames: (sample_rate_hz / METER_UPDATES_PER_SECOND).max(1) as usize,
            frames: 0,
            samples: 0,
            peak: 0.0,
            sum_sq: 0.0,
        }
    }

    fn feed(&mut self, block: &[f32], channels: usize, outbox: &mut Vec<AudioMessage>) {
        for frame in block.chunks_exact(channels) {
            for &s in frame {
                self.peak = self.peak.max(s.abs());
                self.sum_sq += s * s;
            }
            self.samples += frame.len();
            self.frames += 1;

            if self.frames >= self.window_frames {
                let rms = (self.sum_sq / self.samples.max(1) as f32).sqrt();
                emit(
                    outbox,
                    AudioMessage::MasterLevel {
                        peak: self.peak,
                        rms,
                    },
                );
                self.frames = 0;
                self.samples = 0;
                self.peak = 0.0;
                self.sum_sq = 0.0;
            }
        }
    }
}

/// Renders one voice into `mix` for `frames` frames.
///
/// Sets `source_ended` when a one-shot source runs out. Returns `true` once the slot can be
/// freed, which for a voice with effects is after its tail.
fn render_voice(
    voice: &mut VoiceSlot,
    eq: &EqChain,
    dry: &mut [f32],
    wet: &mut [f32],
    mix: &mut [f32],
    channels: usize,
    tail_frames: usize,
) -> bool {
    let Some(sample) = voice.sample.as_ref() else {
        voice.source_ended = true;
        return true;
    };

    let sample_frames = sample.frames();
    if sample_frames == 0 {
        voice.source_ended = true;
        return true;
    }

    let frames = mix.len() / channels;
    for frame in 0..frames {
        if voice.frame_pos >= sample_frames && voice.looping {
            voice.frame_pos = 0;
        }

        let base = frame * channels;
        if voice.frame_pos < sample_frames {
            let src = voice.frame_pos * channels;
            for (channel, state) in voice.eq_state.iter_mut().enumerate() {
                dry[base + channel] = eq.process(state, sample.samples[src + channel]);
            }
            voice.frame_pos += 1;
        } else {
            for (channel, state) in voice.eq_state.iter_mut().enumerate() {
                dry[base + channel] = eq.process(state, 0.0);
            }
        }
    }

    for (out, s) in mix.iter_mut().zip(dry.iter()) {
        *out += s;
    }

    if voice.has_effects() {
        wet.copy_from_slice(dry);
        for effect in voice.effects.iter_mut() {
            effect.process(wet);
        }
        for (out, s) in mix.iter_mut().zip(wet.iter()) {
            *out += s;
        }
    }

    if voice.looping || voice.frame_pos < sample_frames {
        return false;
    }

    voice.source_ended = true;
    if !voice.has_effects() {
        return true;
    }

    let remaining = voice
        .tail_remaining
        .map_or(tail_frames, |left| left.saturating_sub(frames));
    voice.tail_remaining = Some(remaining);
    remaining == 0
}

/// Real-time mixer for pad voices, the click track and the master bus.
///
/// All operations are lock-free and allocation-free once constructed.
pub struct RtMixer {
    /// Number of output channels (1 for mono, 2 for stereo).
    channels: usize,

    /// Master gain.
    volume: f32,

    /// Shared EQ coefficients.
    eq: EqChain,

    /// Active voices with MAX_VOICES slots.
    voices: [VoiceSlot; MAX_VOICES],

    click: ClickTrack,

    meter: LevelMeter,

    capture: Option<CaptureTap>,

    tail_frames: usize,

    dry: Vec<f32>,
    wet: Vec<f32>,
    mix: Vec<f32>,

    outbox: Vec<AudioMessage>,

    retired: Vec<Vec<EffectHandle>>,
}

impl RtMixer {
    /// Creates a mixer for `channels` interleaved output channels at `sample_rate_hz`.
    pub fn new(channels: usize, sample_rate_hz: u32) -> Self {
        let block = MAX_BLOCK_FRAMES * channels;

        Self {
            channels,
            volume: DEFAULT_MASTER_VOLUME,
            eq: EqChain::new(sample_rate_hz),
            voices: std::array::from_fn(|_| VoiceSlot::new(channels)),
            click: ClickTrack::new(sample_rate_hz),
            meter: LevelMeter::new(sample_rate_hz),
            capture: None,
            tail_frames: (sample_rate_hz as f32 * EFFECT_TAIL_SECONDS) as usize,
            dry: vec![0.0; block],
            wet: vec![0.0; block],
            mix: vec![0.0; block],
            outbox: Vec::with_capacity(OUTBOX_CAPACITY),
            retired: Vec::with_capacity(RETIRED_CAPACITY),
        }
    }

    /// Starts a voice in the first free slot.
    ///
    /// A sample with the wrong channel count, or a full voice table, drops the request and
    /// reports [`AudioMessage::VoiceDropped`].
    pub fn play_voice(
        &mut self,
        token: u64,
        sample: SampleBuffer,
        looping: bool,
        effects: Vec<EffectHandle>,
    ) {
        if sample.channels != self.channels {
            emit(&mut self.outbox, AudioMessage::VoiceDropped { token });
            retire(&mut self.retired, effects);
            return;
        }

        if let Some(slot) = self.voices.iter_mut().find(|v| !v.active) {
            slot.start(token, sample, looping, effects);
            return;
        }

        emit(&mut self.outbox, AudioMessage::VoiceDropped { token });
        retire(&mut self.retired, effects);
    }

    /// Cuts the voice with `token`, tail included. Unknown tokens are ignored.
    pub fn stop_voice(&mut self, token: u64) {
        for voice in &mut self.voices {
            if voice.is_playing_token(token) {
                retire(&mut self.retired, voice.stop());
            }
        }
    }

    /// Stops all active voices.
    pub fn stop_all(&mut self) {
        for voice in &mut self.voices {
            if voice.active {
                retire(&mut self.retired, voice.stop());
            }
        }
    }

    /// Sets the master gain.
    ///
    /// Invalid values (NaN, infinite, or out of range) are silently ignored.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() || !(VOLUME_MIN..=VOLUME_MAX).contains(&volume) {
            return;
        }

        self.volume = volume;
    }

    pub fn set_eq_gain(&mut self, band: usize, gain_db: f32) {
        self.eq.set_gain_db(band, gain_db);
    }

    pub fn start_metronome(&mut self, bpm: u32) {
        self.click.start(bpm);
    }

    pub fn stop_metronome(&mut self) {
        self.click.stop();
    }

    pub fn start_capture(&mut self, tap: CaptureTap) {
        self.capture = Some(tap);
    }

    pub fn stop_capture(&mut self) {
        self.capture = None;
    }

    /// Renders audio frames to the output buffer.
    ///
    /// The buffer holds interleaved samples with `channels` per frame; it is rendered in
    /// blocks of at most [`MAX_BLOCK_FRAMES`] frames.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(Sample::EQUILIBRIUM);

        if self.channels == 0 {
            return;
        }

        let block_len = MAX_BLOCK_FRAMES * self.channels;
        for chunk in output.chunks_mut(block_len) {
            let usable = chunk.len() - chunk.len() % self.channels;
            self.render_block(&mut chunk[..usable]);
        }
    }

    fn render_block(&mut self, output: &mut [f32]) {
        let n = output.len();
        if n == 0 {
            return;
        }

        let channels = self.channels;
        let mix = &mut self.mix[..n];
        let dry = &mut self.dry[..n];
        let wet = &mut self.wet[..n];
        mix.fill(0.0);

        for voice in &mut self.voices {
            if !voice.active {
                continue;
            }

            let was_ended = voice.source_ended;
            let done = render_voice(voice, &self.eq, dry, wet, mix, channels, self.tail_frames);
            if voice.source_ended && !was_ended {
                emit(
                    &mut self.outbox,
                    AudioMessage::VoiceEnded { token: voice.token },
                );
            }
            if done {
                retire(&mut self.retired, voice.stop());
            }
        }

        let outbox = &mut self.outbox;
        self.click.render(mix, channels, |index| {
            emit(outbox, AudioMessage::MetronomeTick { index });
        });

        for (out, s) in output.iter_mut().zip(mix.iter()) {
            *out = s * self.volume;
        }

        self.meter.feed(output, channels, &mut self.outbox);

        if let Some(tap) = self.capture.as_mut() {
            tap.push_block(output, |s| s);
        }
    }

    /// Takes the events produced since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, AudioMessage> {
        self.outbox.drain(..)
    }

    /// Takes the effect chains of voices freed since the last call.
    pub fn drain_retired(&mut self) -> std::vec::Drain<'_, Vec<EffectHandle>> {
        self.retired.drain(..)
    }

    /// Gets the number of channels configured for this mixer.
    #[cfg(test)]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[cfg(test)]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    #[cfg(test)]
    pub fn eq(&self) -> &EqChain {
        &self.eq
    }

    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Voices whose source is still playing, i.e. not ringing out an effect tail.
    #[cfg(test)]
    pub fn sounding_sources(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.active && !v.source_ended)
            .count()
    }

    #[cfg(test)]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio_engine::effects::{EffectKind, build_chain};
    use crate::recorder::capture_ring;

    const RATE: u32 = 1_000;

    fn create_test_sample(channels: usize, frames: usize, value: f32) -> SampleBuffer {
        SampleBuffer {
            channels,
            sample_rate_hz: RATE,
            samples: Arc::from(vec![value; channels * frames].into_boxed_slice()),
        }
    }

    fn events(mixer: &mut RtMixer) -> Vec<AudioMessage> {
        mixer.drain_events().collect()
    }

    fn voice_events(mixer: &mut RtMixer) -> Vec<AudioMessage> {
        events(mixer)
            .into_iter()
            .filter(|e| !matches!(e, AudioMessage::MasterLevel { .. }))
            .collect()
    }

    #[test]
    fn test_mixer_creation() {
        let mixer = RtMixer::new(2, RATE);
        assert_eq!(mixer.channels(), 2);
        assert!((mixer.volume() - DEFAULT_MASTER_VOLUME).abs() < f32::EPSILON);
        assert_eq!(mixer.eq().bands().len(), 5);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_play_voice() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.play_voice(1, create_test_sample(2, 100, 0.5), false, Vec::new());
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_play_voice_wrong_channels_is_dropped() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.play_voice(4, create_test_sample(1, 100, 0.5), false, Vec::new());

        assert_eq!(mixer.active_voices(), 0);
        assert_eq!(events(&mut mixer), vec![AudioMessage::VoiceDropped { token: 4 }]);
    }

    #[test]
    fn test_stop_all() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.play_voice(1, create_test_sample(2, 100, 0.5), true, Vec::new());
        mixer.play_voice(2, create_test_sample(2, 100, 0.5), false, Vec::new());
        assert_eq!(mixer.active_voices(), 2);

        mixer.stop_all();
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_stop_voice_only_hits_matching_token() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.play_voice(1, create_test_sample(2, 100, 0.5), false, Vec::new());
        mixer.play_voice(2, create_test_sample(2, 100, 0.3), false, Vec::new());

        mixer.stop_voice(1);
        assert_eq!(mixer.active_voices(), 1);
        assert!(mixer.voices.iter().any(|v| v.is_playing_token(2)));

        mixer.stop_voice(1);
        mixer.stop_voice(99);
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_render_silence() {
        let mut mixer = RtMixer::new(2, RATE);
        let mut output = vec![0.0; 200];

        mixer.render(&mut output);

        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_render_with_voice_applies_master_gain() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.set_volume(1.0);
        mixer.play_voice(1, create_test_sample(2, 10, 0.5), false, Vec::new());

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);
        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-5));

        mixer.stop_all();
        mixer.set_volume(0.5);
        mixer.play_voice(2, create_test_sample(2, 10, 0.5), false, Vec::new());
        mixer.render(&mut output);
        assert!(output.iter().all(|&s| (s - 0.25).abs() < 1e-5));
    }

    #[test]
    fn test_set_volume_rejects_out_of_range() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.set_volume(0.3);
        mixer.set_volume(1.5);
        mixer.set_volume(f32::NAN);
        mixer.set_volume(-0.1);
        assert!((mixer.volume() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_render_loop_sample() {
        let mut mixer = RtMixer::new(1, RATE);
        mixer.set_volume(1.0);
        mixer.play_voice(1, create_test_sample(1, 5, 0.5), true, Vec::new());

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);

        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-5));
        assert_eq!(mixer.active_voices(), 1);
        assert!(voice_events(&mut mixer).is_empty());
    }

    #[test]
    fn test_one_shot_reports_end() {
        let mut mixer = RtMixer::new(1, RATE);
        mixer.set_volume(1.0);
        mixer.play_voice(3, create_test_sample(1, 5, 0.5), false, Vec::new());

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);
        assert_eq!(mixer.sounding_sources(), 0);

        assert!(output[..5].iter().all(|&s| (s - 0.5).abs() < 1e-5));
        assert!(output[5..].iter().all(|&s| s.abs() < 1e-5));
        assert_eq!(mixer.active_voices(), 0);
        assert_eq!(
            voice_events(&mut mixer),
            vec![AudioMessage::VoiceEnded { token: 3 }]
        );
    }

    #[test]
    fn test_effect_tail_keeps_slot_alive_after_source_end() {
        let mut mixer = RtMixer::new(1, RATE);
        mixer.set_volume(1.0);
        let effects = build_chain(&[EffectKind::Delay], RATE, 1);
        mixer.play_voice(5, create_test_sample(1, 1, 1.0), false, effects);

        // The source is one frame long; the echo arrives 300 frames later.
        let mut output = vec![0.0; 400];
        mixer.render(&mut output);
        assert!((output[0] - 1.0).abs() < 1e-5);
        assert!((output[300] - 0.3).abs() < 1e-3);
        assert_eq!(mixer.active_voices(), 1);
        assert_eq!(mixer.sounding_sources(), 0);
        assert_eq!(
            voice_events(&mut mixer),
            vec![AudioMessage::VoiceEnded { token: 5 }]
        );
        assert_eq!(mixer.drain_retired().count(), 0);

        // Three seconds of tail at 1 kHz, then the slot is freed without another event.
        let mut rest = vec![0.0; 3_000];
        mixer.render(&mut rest);
        assert_eq!(mixer.active_voices(), 0);
        assert!(voice_events(&mut mixer).is_empty());
        let retired: Vec<_> = mixer.drain_retired().collect();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].len(), 1);
    }

    #[test]
    fn test_stopped_chains_are_handed_back() {
        let mut mixer = RtMixer::new(1, RATE);
        let chain = || build_chain(&[EffectKind::Reverb, EffectKind::Compressor], RATE, 1);
        mixer.play_voice(1, create_test_sample(1, 100, 0.5), false, chain());
        mixer.play_voice(2, create_test_sample(1, 100, 0.5), true, chain());
        mixer.play_voice(3, create_test_sample(1, 100, 0.5), false, Vec::new());
        mixer.play_voice(4, create_test_sample(2, 100, 0.5), false, chain());

        mixer.stop_voice(1);
        mixer.stop_all();

        let retired: Vec<_> = mixer.drain_retired().collect();
        assert_eq!(retired.len(), 3);
        assert!(retired.iter().all(|chain| chain.len() == 2));
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_multiple_voices_mixing() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.set_volume(1.0);
        mixer.play_voice(1, create_test_sample(2, 10, 0.3), false, Vec::new());
        mixer.play_voice(2, create_test_sample(2, 10, 0.2), false, Vec::new());

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);

        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_voice_limit() {
        let mut mixer = RtMixer::new(1, RATE);

        for token in 0..(MAX_VOICES as u64 + 5) {
            mixer.play_voice(token, create_test_sample(1, 10, 0.5), false, Vec::new());
        }

        assert_eq!(mixer.active_voices(), MAX_VOICES);
        let dropped = events(&mut mixer)
            .into_iter()
            .filter(|e| matches!(e, AudioMessage::VoiceDropped { .. }))
            .count();
        assert_eq!(dropped, 5);
    }

    #[test]
    fn test_eq_gain_changes_output() {
        let mut mixer = RtMixer::new(1, RATE);
        mixer.set_volume(1.0);
        mixer.set_eq_gain(0, 12.0);
        mixer.play_voice(1, create_test_sample(1, 2_000, 0.1), false, Vec::new());

        let mut output = vec![0.0; 2_000];
        mixer.render(&mut output);
        assert!(output[1_999] > 0.3);
    }

    #[test]
    fn test_metronome_ticks_and_stops() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.start_metronome(120);

        let mut output = vec![0.0; 2 * 1_200];
        mixer.render(&mut output);
        let ticks: Vec<AudioMessage> = voice_events(&mut mixer);
        assert_eq!(
            ticks,
            vec![
                AudioMessage::MetronomeTick { index: 0 },
                AudioMessage::MetronomeTick { index: 1 },
                AudioMessage::MetronomeTick { index: 2 },
            ]
        );
        assert!(output.iter().any(|&s| s != 0.0));

        mixer.stop_metronome();
        let mut more = vec![0.0; 2 * 1_000];
        mixer.render(&mut more);
        assert!(voice_events(&mut mixer).is_empty());
    }

    #[test]
    fn test_meter_reports_twenty_times_per_second() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.set_volume(1.0);
        mixer.play_voice(1, create_test_sample(2, 1_000, 0.5), true, Vec::new());

        let mut output = vec![0.0; 2 * 1_000];
        mixer.render(&mut output);

        let levels: Vec<(f32, f32)> = events(&mut mixer)
            .iter()
            .filter_map(AudioMessage::master_level)
            .collect();
        assert_eq!(levels.len(), 20);
        let (peak, rms) = levels[19];
        assert!((peak - 0.5).abs() < 1e-4);
        assert!((rms - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_capture_tap_receives_master_output() {
        let mut mixer = RtMixer::new(1, RATE);
        mixer.set_volume(0.5);
        let (tap, mut sink) = capture_ring(64);
        mixer.start_capture(tap);
        assert!(mixer.is_capturing());

        mixer.play_voice(1, create_test_sample(1, 8, 1.0), false, Vec::new());
        let mut output = vec![0.0; 8];
        mixer.render(&mut output);

        let captured: Vec<f32> = std::iter::from_fn(|| sink.pop()).collect();
        assert_eq!(captured, output);
        assert_eq!(sink.dropped(), 0);

        mixer.stop_capture();
        assert!(!mixer.is_capturing());
    }

    #[test]
    fn test_capture_overflow_is_counted() {
        let mut mixer = RtMixer::new(2, RATE);
        let (tap, sink) = capture_ring(6);
        mixer.start_capture(tap);

        let mut output = vec![0.0; 2 * 5];
        mixer.render(&mut output);
        assert_eq!(sink.dropped(), 4);
    }

    #[test]
    fn test_render_larger_than_block() {
        let mut mixer = RtMixer::new(2, RATE);
        mixer.set_volume(1.0);
        mixer.play_voice(1, create_test_sample(2, 10, 0.25), true, Vec::new());

        let mut output = vec![0.0; 2 * (MAX_BLOCK_FRAMES * 2 + 7)];
        mixer.render(&mut output);
        assert!(output.iter().all(|&s| (s - 0.25).abs() < 1e-5));
    }
}
