//! Audio engine configuration constants and limits.

/// Maximum number of voices that can be active simultaneously.
pub const MAX_VOICES: usize = 32;

/// Largest block the mixer renders in one pass.
///
/// The output callback may hand us more frames than this; the mixer then renders in
/// several passes so its scratch buffers never grow on the audio thread.
pub const MAX_BLOCK_FRAMES: usize = 512;

/// Fixed buffer size requested from the output device.
pub const STREAM_BUFFER_FRAMES: u32 = 512;

/// Capacity of the control and event ring buffers.
pub const MESSAGE_QUEUE_CAPACITY: usize = 1024;

/// Sample rate used for decoding when no output device is available.
pub const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Channel count used for decoding when no output device is available.
pub const FALLBACK_CHANNELS: usize = 2;

/// Minimum volume level (silence).
pub const VOLUME_MIN: f32 = 0.0;

/// Maximum volume level (100%).
pub const VOLUME_MAX: f32 = 1.0;

/// Master gain applied at startup.
pub const DEFAULT_MASTER_VOLUME: f32 = 0.75;

/// Centre frequencies of the shelving EQ, in chain order.
pub const EQ_FREQUENCIES_HZ: [u32; 5] = [60, 250, 1_000, 3_500, 10_000];

/// Number of EQ bands.
pub const NUM_EQ_BANDS: usize = EQ_FREQUENCIES_HZ.len();

/// Bands at or above this frequency use a high shelf, the rest a low shelf.
pub const HIGH_SHELF_FROM_HZ: u32 = 1_000;

/// Minimum per-band EQ gain in dB.
pub const EQ_DB_MIN: f32 = -15.0;

/// Maximum per-band EQ gain in dB.
pub const EQ_DB_MAX: f32 = 15.0;

/// How long effect tails keep rendering after a one-shot source ran out.
pub const EFFECT_TAIL_SECONDS: f32 = 3.0;

/// How many level reports the meter tap sends per second.
pub const METER_UPDATES_PER_SECOND: u32 = 20;

/// Slowest metronome tempo.
pub const BPM_MIN: u32 = 20;

/// Fastest metronome tempo.
pub const BPM_MAX: u32 = 300;

/// Metronome tempo used when the UI did not pick one.
pub const DEFAULT_BPM: u32 = 120;

/// Seconds of capture audio the recorder ring can hold between two polls.
pub const CAPTURE_BUFFER_SECONDS: usize = 4;
