//! The soundboard controller: all application state and the operations the UI calls.
//!
//! The controller runs on the caller's thread. It owns the pads, playlist, settings and the
//! controller end of the engine rings; the realtime engine only ever sees
//! [`ControlMessage`]s. Every operation handles its own failures: they are logged and
//! queued as [`Notification`]s instead of being returned to the UI as errors.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::audio_engine::constants::{
    DEFAULT_MASTER_VOLUME, EQ_DB_MAX, EQ_DB_MIN, EQ_FREQUENCIES_HZ, FALLBACK_CHANNELS,
    FALLBACK_SAMPLE_RATE, NUM_EQ_BANDS, VOLUME_MAX, VOLUME_MIN,
};
use crate::audio_engine::effects::build_chain;
use crate::audio_engine::eq::EqChain;
use crate::audio_engine::errors::RecordingError;
use crate::audio_engine::sample_loader::{
    decode_audio_file_to_sample_buffer, display_name, is_audio_file,
};
use crate::audio_engine::{
    AudioStreamHandle, EffectKind, EngineHandle, SignalRoute, create_audio_stream, setup_logger,
};
use crate::keyboard::{KeyAction, KeyInput, resolve_key};
use crate::messages::{AudioMessage, ControlMessage, SampleBuffer};
use crate::metronome::{Metronome, MetronomeCommand};
use crate::pads::{IdGenerator, Pad, PadRegistry, PadSpec};
use crate::persistence::{
    FileStorage, MemoryStorage, SavedData, Storage, load_data, load_settings, resolve_data_dir,
    save_data, save_settings,
};
use crate::playlist::{Playlist, PlaylistEntry};
use crate::recorder::{
    Recorder, RecordingSource, capture_ring, capture_ring_capacity, default_recordings_dir,
};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

impl NotificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// A user-visible, non-blocking message for the UI to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

pub struct SoundboardController {
    engine: Option<EngineHandle>,
    // Keeps the output device running.
    _stream: Option<cpal::Stream>,
    storage: Box<dyn Storage>,
    settings: Settings,
    pads: PadRegistry,
    playlist: Playlist,
    ids: IdGenerator,
    next_token: u64,
    active_effects: Vec<EffectKind>,
    eq_gains_db: [f32; NUM_EQ_BANDS],
    master_volume: f32,
    master_level: (f32, f32),
    last_route: Option<SignalRoute>,
    metronome: Metronome,
    recorder: Recorder,
    notifications: VecDeque<Notification>,
}

impl SoundboardController {
    /// Opens the default output device and the data directory.
    ///
    /// Without a usable device the controller runs in silent mode; without a data directory
    /// state lives in memory only. Both cases are logged and queued as notifications.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        setup_logger();

        let mut startup = Vec::new();

        let (storage, recordings_dir): (Box<dyn Storage>, PathBuf) =
            match resolve_data_dir(data_dir) {
                Ok(dir) => {
                    let recordings = default_recordings_dir(&dir);
                    let storage = FileStorage::new(dir);
                    log::info!("Data directory: {}", storage.dir().display());
                    (Box::new(storage) as Box<dyn Storage>, recordings)
                }
                Err(err) => {
                    log::warn!("{err}; settings and pads will not persist");
                    startup.push(Notification::error(format!("Storage unavailable: {err}")));
                    let recordings =
                        dirs::download_dir().unwrap_or_else(|| std::env::temp_dir().join("soundpad"));
                    (Box::new(MemoryStorage::new()) as Box<dyn Storage>, recordings)
                }
            };

        let (stream, engine) = match create_audio_stream() {
            Ok(AudioStreamHandle { stream, engine }) => (Some(stream), Some(engine)),
            Err(err) => {
                log::error!("Audio engine unavailable, running silent: {err}");
                startup.push(Notification::error(format!("Audio unavailable: {err}")));
                (None, None)
            }
        };

        let mut controller = Self::with_engine(engine, storage, recordings_dir);
        controller._stream = stream;
        controller.notifications.extend(startup);
        controller
    }

    /// Builds a controller around an existing engine handle (or none for silent mode) and
    /// restores settings and pads from `storage`.
    pub fn with_engine(
        engine: Option<EngineHandle>,
        storage: Box<dyn Storage>,
        recordings_dir: PathBuf,
    ) -> Self {
        let settings = match load_settings(storage.as_ref()) {
            Ok(settings) => settings.unwrap_or_default(),
            Err(err) => {
                log::error!("Failed to load settings: {err}");
                Settings::default()
            }
        };

        let saved = match load_data(storage.as_ref()) {
            Ok(saved) => saved,
            Err(err) => {
                log::error!("Failed to load saved data: {err}");
                None
            }
        };

        let mut ids = IdGenerator::default();
        let (pads, playlist) = match saved {
            Some(data) => {
                log::info!(
                    "Restored {} pads and {} playlist entries",
                    data.pads.len(),
                    data.playlist.len()
                );
                (
                    PadRegistry::from_records(data.pads),
                    Playlist::from_records(data.playlist),
                )
            }
            None => (PadRegistry::with_default_pads(&mut ids), Playlist::new()),
        };

        Self {
            engine,
            _stream: None,
            storage,
            settings,
            pads,
            playlist,
            ids,
            next_token: 0,
            active_effects: Vec::new(),
            eq_gains_db: [0.0; NUM_EQ_BANDS],
            master_volume: DEFAULT_MASTER_VOLUME,
            master_level: (0.0, 0.0),
            last_route: None,
            metronome: Metronome::new(),
            recorder: Recorder::new(recordings_dir),
            notifications: VecDeque::new(),
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    /// Sends a command to the engine. Returns `false` in silent mode or when the ring is full.
    fn send(&mut self, message: ControlMessage) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            log::debug!("Silent mode, command dropped");
            return false;
        };

        match engine.send(message) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("Failed to send command - buffer may be full");
                false
            }
        }
    }

    /// `(channels, sample rate)` samples must be decoded to.
    pub fn output_format(&self) -> (usize, u32) {
        self.engine
            .as_ref()
            .map(|e| (e.channels(), e.sample_rate_hz()))
            .unwrap_or((FALLBACK_CHANNELS, FALLBACK_SAMPLE_RATE))
    }

    pub fn is_silent(&self) -> bool {
        self.engine.is_none()
    }

    pub fn ping(&mut self) -> bool {
        self.send(ControlMessage::Ping())
    }

    // Playback

    /// Plays a pad from the start, stopping its running instance first.
    ///
    /// Returns whether a voice was started. Unknown pads, pads without a sample and silent
    /// mode are no-ops.
    pub fn play_pad(&mut self, id: &str) -> bool {
        let Some(pad) = self.pads.get(id) else {
            log::debug!("play_pad: unknown pad {id}");
            return false;
        };
        let Some(sample) = pad.sample.clone() else {
            log::debug!("play_pad: pad {id} has no sample");
            return false;
        };
        let looping = pad.looping;

        self.stop_pad(id);

        if self.engine.is_none() {
            log::info!("Silent mode, not playing {id}");
            return false;
        }

        let (channels, sample_rate_hz) = self.output_format();
        let effects = build_chain(&self.active_effects, sample_rate_hz, channels);
        let route = SignalRoute::from_chain(&effects);

        let token = self.next_token;
        self.next_token += 1;

        if !self.send(ControlMessage::PlayVoice {
            token,
            sample,
            looping,
            effects,
        }) {
            return false;
        }

        if let Some(pad) = self.pads.get_mut(id) {
            pad.playback = Some(token);
        }
        self.last_route = Some(route);
        true
    }

    /// Stops a pad's voice. Returns whether one was playing.
    pub fn stop_pad(&mut self, id: &str) -> bool {
        let Some(token) = self.pads.get_mut(id).and_then(|pad| pad.playback.take()) else {
            return false;
        };
        self.send(ControlMessage::StopVoice { token });
        true
    }

    pub fn stop_all_sounds(&mut self) {
        for pad in self.pads.iter_mut() {
            pad.playback = None;
        }
        self.send(ControlMessage::StopAll());
    }

    /// Flips a pad's loop flag; the running voice keeps its mode until retriggered.
    pub fn toggle_loop(&mut self, id: &str) -> Option<bool> {
        let looping = self.pads.toggle_loop(id)?;
        self.autosave();
        Some(looping)
    }

    /// Sets the master gain, clamped to `0..=1`. Non-finite input is ignored.
    pub fn set_master_volume(&mut self, volume: f32) -> Option<f32> {
        if !volume.is_finite() {
            log::warn!("Ignoring non-finite master volume");
            return None;
        }

        let volume = volume.clamp(VOLUME_MIN, VOLUME_MAX);
        self.master_volume = volume;
        self.send(ControlMessage::SetMasterVolume(volume));
        Some(volume)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Sets the gain of the band at `frequency_hz`, clamped to ±15 dB.
    ///
    /// Returns the applied gain, or `None` for a frequency that is not one of the bands.
    pub fn set_eq_gain(&mut self, frequency_hz: u32, gain_db: f32) -> Option<f32> {
        let Some(band) = EqChain::band_index(frequency_hz) else {
            log::warn!("No EQ band at {frequency_hz} Hz");
            return None;
        };
        if !gain_db.is_finite() {
            log::warn!("Ignoring non-finite EQ gain");
            return None;
        }

        let gain_db = gain_db.clamp(EQ_DB_MIN, EQ_DB_MAX);
        self.eq_gains_db[band] = gain_db;
        self.send(ControlMessage::SetEqGain { band, gain_db });
        Some(gain_db)
    }

    /// `(frequency, gain dB)` of every band, ascending.
    pub fn eq_gains(&self) -> Vec<(u32, f32)> {
        EQ_FREQUENCIES_HZ
            .iter()
            .copied()
            .zip(self.eq_gains_db.iter().copied())
            .collect()
    }

    /// Enables or disables an effect for future plays. Returns whether it is now active.
    pub fn toggle_effect(&mut self, kind: EffectKind) -> bool {
        if let Some(pos) = self.active_effects.iter().position(|k| *k == kind) {
            self.active_effects.remove(pos);
            false
        } else {
            self.active_effects.push(kind);
            true
        }
    }

    /// Active effects in the order they were enabled.
    pub fn active_effects(&self) -> &[EffectKind] {
        &self.active_effects
    }

    /// Topology of the most recent play.
    pub fn last_signal_route(&self) -> Option<&SignalRoute> {
        self.last_route.as_ref()
    }

    /// Latest `(peak, rms)` of the master bus.
    pub fn master_level(&self) -> (f32, f32) {
        self.master_level
    }

    // Pads and playlist

    pub fn pads(&self) -> impl Iterator<Item = &Pad> {
        self.pads.iter()
    }

    pub fn pad(&self, id: &str) -> Option<&Pad> {
        self.pads.get(id)
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Creates a pad from `spec` and returns its id.
    pub fn create_pad(&mut self, spec: PadSpec) -> String {
        let id = self.ids.next_id("pad");
        self.insert_pad(id.clone(), spec);
        id
    }

    fn insert_pad(&mut self, id: String, spec: PadSpec) {
        self.pads.insert(Pad::from_spec(id, spec));
        self.autosave();
    }

    pub fn delete_pad(&mut self, id: &str) -> bool {
        self.stop_pad(id);
        if self.pads.remove(id).is_none() {
            return false;
        }
        self.autosave();
        true
    }

    /// Stops everything and removes every pad.
    pub fn clear_all(&mut self) {
        self.stop_all_sounds();
        if !self.pads.is_empty() {
            log::info!("Clearing {} pads", self.pads.len());
        }
        self.pads.clear();
        self.autosave();
    }

    fn decode(&self, path: &Path) -> Result<SampleBuffer, crate::audio_engine::DecodeError> {
        let (channels, sample_rate_hz) = self.output_format();
        decode_audio_file_to_sample_buffer(path, channels, sample_rate_hz)
    }

    /// Imports audio files as new pads and playlist entries.
    ///
    /// Non-audio files are skipped silently. A file that fails to decode is reported and the
    /// rest of the batch continues. Returns the ids of the created pads.
    pub fn import_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Vec<String> {
        let mut created = Vec::new();

        for path in paths {
            let path = path.as_ref();
            if !is_audio_file(path) {
                log::debug!("Skipping non-audio file {}", path.display());
                continue;
            }

            let name = display_name(path);
            let sample = match self.decode(path) {
                Ok(sample) => sample,
                Err(err) => {
                    log::error!("Failed to load {}: {err}", path.display());
                    self.notify(Notification::error(format!("Failed to load {name}: {err}")));
                    continue;
                }
            };

            let entry_id = self.ids.next_id("playlist");
            self.playlist
                .push(PlaylistEntry::new(entry_id, name.clone(), sample.clone()));

            let pad_id = self.ids.next_id("pad");
            self.pads.insert(Pad::from_spec(
                pad_id.clone(),
                PadSpec {
                    name: Some(name),
                    sample: Some(sample),
                    audio_file: Some(path.to_string_lossy().into_owned()),
                    ..PadSpec::default()
                },
            ));
            created.push(pad_id);
        }

        if !created.is_empty() {
            self.autosave();
            self.notify(Notification::success(format!(
                "{} file(s) loaded",
                created.len()
            )));
        }
        created
    }

    /// Decodes `path` into an existing pad, e.g. to restore sound after a reload.
    pub fn assign_sample(&mut self, id: &str, path: &Path) -> bool {
        if self.pads.get(id).is_none() {
            log::debug!("assign_sample: unknown pad {id}");
            return false;
        }

        match self.decode(path) {
            Ok(sample) => {
                if let Some(pad) = self.pads.get_mut(id) {
                    pad.sample = Some(sample);
                    pad.audio_file = Some(path.to_string_lossy().into_owned());
                }
                true
            }
            Err(err) => {
                log::error!("Failed to load {}: {err}", path.display());
                self.notify(Notification::error(format!(
                    "Failed to load {}: {err}",
                    display_name(path)
                )));
                false
            }
        }
    }

    /// Plays a playlist entry through a new pad. Returns the pad id.
    pub fn play_from_playlist(&mut self, entry_id: &str) -> Option<String> {
        let entry = self.playlist.get(entry_id)?;
        let sample = entry.sample.clone()?;
        let spec = PadSpec {
            name: Some(entry.name.clone()),
            color: Some(entry.color.clone()),
            sample: Some(sample),
            ..PadSpec::default()
        };

        let pad_id = self.ids.next_id("temp");
        self.insert_pad(pad_id.clone(), spec);
        self.play_pad(&pad_id);
        Some(pad_id)
    }

    pub fn remove_from_playlist(&mut self, entry_id: &str) -> bool {
        let removed = self.playlist.remove(entry_id);
        self.autosave();
        removed
    }

    // Persistence

    fn saved_data(&self) -> SavedData {
        SavedData {
            pads: self.pads.records(),
            playlist: self.playlist.records(),
        }
    }

    /// Writes pads and playlist to storage.
    pub fn save(&mut self) -> bool {
        let data = self.saved_data();
        match save_data(self.storage.as_mut(), &data) {
            Ok(()) => {
                self.notify(Notification::success("Pads saved"));
                true
            }
            Err(err) => {
                log::error!("Failed to save pads: {err}");
                self.notify(Notification::error(format!("Failed to save: {err}")));
                false
            }
        }
    }

    fn autosave(&mut self) {
        if !self.settings.auto_save {
            return;
        }

        let data = self.saved_data();
        if let Err(err) = save_data(self.storage.as_mut(), &data) {
            log::error!("Autosave failed: {err}");
            self.notify(Notification::error(format!("Autosave failed: {err}")));
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: Settings) -> bool {
        self.settings = settings;
        match save_settings(self.storage.as_mut(), &settings) {
            Ok(()) => {
                self.notify(Notification::success("Settings saved"));
                true
            }
            Err(err) => {
                log::error!("Failed to save settings: {err}");
                self.notify(Notification::error(format!("Failed to save settings: {err}")));
                false
            }
        }
    }

    // Keyboard

    /// Resolves a key press and performs its action. `OpenFileDialog` is left to the UI.
    pub fn handle_key(&mut self, input: &KeyInput) -> KeyAction {
        let action = resolve_key(input, &self.pads);
        match &action {
            KeyAction::Save => {
                self.save();
            }
            KeyAction::ToggleRecording => {
                self.toggle_recording();
            }
            KeyAction::StopAll => self.stop_all_sounds(),
            KeyAction::TriggerPad(id) => {
                self.play_pad(id);
            }
            KeyAction::OpenFileDialog | KeyAction::None => {}
        }
        action
    }

    // Metronome

    fn apply_metronome(&mut self, commands: impl IntoIterator<Item = MetronomeCommand>) {
        for command in commands {
            let message = match command {
                MetronomeCommand::Start { bpm } => ControlMessage::StartMetronome { bpm },
                MetronomeCommand::Stop => ControlMessage::StopMetronome(),
            };
            self.send(message);
        }
    }

    pub fn start_metronome(&mut self, bpm: u32) {
        let commands = self.metronome.start(bpm);
        self.apply_metronome(commands);
    }

    pub fn stop_metronome(&mut self) {
        let command = self.metronome.stop();
        self.apply_metronome(command);
    }

    /// Returns whether the metronome runs afterwards.
    pub fn toggle_metronome(&mut self) -> bool {
        let commands = self.metronome.toggle();
        self.apply_metronome(commands);
        self.metronome.is_running()
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        let commands = self.metronome.set_bpm(bpm);
        self.apply_metronome(commands);
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    // Recording

    pub fn recording_source(&self) -> RecordingSource {
        self.recorder.source()
    }

    pub fn set_recording_source(&mut self, source: RecordingSource) {
        self.recorder.set_source(source);
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    fn start_master_capture(&mut self) -> Result<(), RecordingError> {
        if self.recorder.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        let Some(engine) = self.engine.as_ref() else {
            return Err(RecordingError::EngineUnavailable);
        };
        let (channels, sample_rate_hz) = (engine.channels(), engine.sample_rate_hz());

        let (tap, sink) = capture_ring(capture_ring_capacity(channels, sample_rate_hz));
        if !self.send(ControlMessage::StartCapture { tap }) {
            return Err(RecordingError::QueueFull);
        }
        self.recorder
            .start_with_sink(sink, channels as u16, sample_rate_hz)
    }

    /// Starts a take from the selected source. Returns whether recording started.
    pub fn start_recording(&mut self) -> bool {
        let result = match self.recorder.source() {
            RecordingSource::Microphone => self.recorder.start_microphone(),
            RecordingSource::MasterOutput => self.start_master_capture(),
        };

        match result {
            Ok(()) => {
                self.notify(Notification::info("Recording started"));
                true
            }
            Err(err) => {
                log::error!("Failed to start recording: {err}");
                self.notify(Notification::error(format!("Recording failed: {err}")));
                false
            }
        }
    }

    /// Ends the take and writes it out. Returns the file path on success.
    pub fn stop_recording(&mut self) -> Option<PathBuf> {
        if !self.recorder.is_recording() {
            return None;
        }

        if self.recorder.active_source() == Some(RecordingSource::MasterOutput) {
            self.send(ControlMessage::StopCapture());
        }

        match self.recorder.stop() {
            Ok(path) => {
                self.notify(Notification::success(format!(
                    "Recording saved to {}",
                    path.display()
                )));
                Some(path)
            }
            Err(err) => {
                log::error!("Failed to save recording: {err}");
                self.notify(Notification::error(format!("Recording failed: {err}")));
                None
            }
        }
    }

    /// Returns whether a take is running afterwards.
    pub fn toggle_recording(&mut self) -> bool {
        if self.recorder.is_recording() {
            self.stop_recording();
        } else {
            self.start_recording();
        }
        self.recorder.is_recording()
    }

    // Events

    /// Drains engine events and recorder input, updating pad state.
    ///
    /// Ended or dropped voices clear their pad only if the pad still holds that token. Effect
    /// chains of freed voices are dropped here, off the audio thread.
    pub fn poll_events(&mut self) -> Vec<AudioMessage> {
        self.recorder.pump();

        if let Some(engine) = self.engine.as_mut() {
            let released = engine.release_retired();
            if released > 0 {
                log::trace!("Released {released} effect chains");
            }
        }

        let mut events = Vec::new();
        while let Some(event) = self.engine.as_mut().and_then(EngineHandle::try_recv) {
            match event {
                AudioMessage::VoiceEnded { token } => {
                    if let Some(pad) = self.pads.find_by_token_mut(token) {
                        pad.playback = None;
                    }
                }
                AudioMessage::VoiceDropped { token } => {
                    log::warn!("Voice {token} dropped, no free slot");
                    if let Some(pad) = self.pads.find_by_token_mut(token) {
                        pad.playback = None;
                    }
                }
                AudioMessage::MasterLevel { peak, rms } => {
                    self.master_level = (peak, rms);
                }
                AudioMessage::Pong() | AudioMessage::MetronomeTick { .. } => {}
            }
            events.push(event);
        }
        events
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }
}
