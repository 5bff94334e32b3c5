//! Python surface over [`SoundboardController`].

use std::path::PathBuf;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::audio_engine::routing::GraphNode;
use crate::audio_engine::EffectKind;
use crate::controller::{Notification, SoundboardController};
use crate::keyboard::{KeyAction, KeyInput};
use crate::messages::AudioMessage;
use crate::metronome::interval_ms;
use crate::pads::{Pad, PadSpec, normalize_hotkey};
use crate::recorder::RecordingSource;
use crate::settings::{AudioQuality, Theme};

fn node_label(node: GraphNode) -> String {
    match node {
        GraphNode::Source => "source".to_string(),
        GraphNode::Eq { frequency_hz } => format!("eq{frequency_hz}"),
        GraphNode::Effect { position, kind } => format!("{kind}{position}"),
        GraphNode::DelayLine { position } => format!("delay{position}.line"),
        GraphNode::DelayWet { position } => format!("delay{position}.wet"),
        GraphNode::MasterGain => "master".to_string(),
        GraphNode::Destination => "destination".to_string(),
        GraphNode::Meter => "meter".to_string(),
    }
}

fn pad_dict(py: Python<'_>, pad: &Pad) -> PyResult<Py<PyAny>> {
    let dict = PyDict::new(py);
    dict.set_item("id", &pad.id)?;
    dict.set_item("name", &pad.name)?;
    dict.set_item("color", &pad.color)?;
    dict.set_item("icon", &pad.icon)?;
    dict.set_item("hotkey", pad.hotkey.map(String::from))?;
    dict.set_item("loop", pad.looping)?;
    dict.set_item("is_playing", pad.is_playing())?;
    dict.set_item("has_sample", pad.has_sample())?;
    dict.set_item("audio_file", pad.audio_file.as_deref())?;
    Ok(dict.into_any().unbind())
}

fn notification_dict(py: Python<'_>, notification: &Notification) -> PyResult<Py<PyAny>> {
    let dict = PyDict::new(py);
    dict.set_item("level", notification.level.as_str())?;
    dict.set_item("message", &notification.message)?;
    Ok(dict.into_any().unbind())
}

/// Soundboard controller exposed to Python.
///
/// Holds the output stream, so it stays on the thread that created it.
#[pyclass(unsendable)]
pub struct Soundboard {
    controller: SoundboardController,
}

#[pymethods]
impl Soundboard {
    /// Opens the default output device and restores the saved session.
    ///
    /// Without an output device the soundboard runs silently.
    #[new]
    #[pyo3(signature = (data_dir=None))]
    pub fn new(data_dir: Option<String>) -> Self {
        Soundboard {
            controller: SoundboardController::new(data_dir.map(PathBuf::from)),
        }
    }

    pub fn is_silent(&self) -> bool {
        self.controller.is_silent()
    }

    pub fn ping(&mut self) -> bool {
        self.controller.ping()
    }

    /// Plays a pad from the start. Returns whether a voice was started.
    pub fn play_pad(&mut self, pad_id: &str) -> bool {
        self.controller.play_pad(pad_id)
    }

    pub fn stop_pad(&mut self, pad_id: &str) -> bool {
        self.controller.stop_pad(pad_id)
    }

    pub fn stop_all_sounds(&mut self) {
        self.controller.stop_all_sounds();
    }

    pub fn toggle_loop(&mut self, pad_id: &str) -> PyResult<bool> {
        self.controller
            .toggle_loop(pad_id)
            .ok_or_else(|| PyValueError::new_err(format!("unknown pad: {pad_id}")))
    }

    /// Set the master volume (0.0 to 1.0).
    pub fn set_master_volume(&mut self, volume: f32) -> PyResult<()> {
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return Err(PyValueError::new_err("volume out of range"));
        }
        self.controller.set_master_volume(volume);
        Ok(())
    }

    pub fn master_volume(&self) -> f32 {
        self.controller.master_volume()
    }

    /// Set one EQ band. Returns the gain after clamping to ±15 dB.
    pub fn set_eq_gain(&mut self, frequency_hz: u32, gain_db: f32) -> PyResult<f32> {
        self.controller
            .set_eq_gain(frequency_hz, gain_db)
            .ok_or_else(|| {
                PyValueError::new_err(format!(
                    "invalid EQ setting ({frequency_hz} Hz, {gain_db} dB)"
                ))
            })
    }

    pub fn eq_gains(&self) -> Vec<(u32, f32)> {
        self.controller.eq_gains()
    }

    /// Toggle an effect by name. Returns whether it is now active.
    pub fn toggle_effect(&mut self, effect: &str) -> PyResult<bool> {
        let kind: EffectKind = effect
            .parse()
            .map_err(|e: crate::audio_engine::effects::UnknownEffect| {
                PyValueError::new_err(e.to_string())
            })?;
        Ok(self.controller.toggle_effect(kind))
    }

    pub fn active_effects(&self) -> Vec<String> {
        self.controller
            .active_effects()
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect()
    }

    /// Edges of the most recent play as `(from, to)` labels.
    pub fn last_signal_route(&self) -> Option<Vec<(String, String)>> {
        self.controller.last_signal_route().map(|route| {
            route
                .edges()
                .iter()
                .map(|&(from, to)| (node_label(from), node_label(to)))
                .collect()
        })
    }

    /// Effects of the most recent play, in chain order.
    pub fn last_route_effects(&self) -> Option<Vec<String>> {
        self.controller.last_signal_route().map(|route| {
            route
                .effects()
                .iter()
                .map(|kind| kind.as_str().to_string())
                .collect()
        })
    }

    pub fn master_level(&self) -> (f32, f32) {
        self.controller.master_level()
    }

    /// All pads in registration order, as dicts.
    pub fn pads(&self, py: Python<'_>) -> PyResult<Vec<Py<PyAny>>> {
        self.controller.pads().map(|pad| pad_dict(py, pad)).collect()
    }

    /// One pad as a dict, or `None` for an unknown id.
    pub fn pad(&self, py: Python<'_>, pad_id: &str) -> PyResult<Option<Py<PyAny>>> {
        self.controller
            .pad(pad_id)
            .map(|pad| pad_dict(py, pad))
            .transpose()
    }

    pub fn playlist(&self, py: Python<'_>) -> PyResult<Vec<Py<PyAny>>> {
        self.controller
            .playlist()
            .iter()
            .map(|entry| {
                let dict = PyDict::new(py);
                dict.set_item("id", &entry.id)?;
                dict.set_item("name", &entry.name)?;
                dict.set_item("color", &entry.color)?;
                dict.set_item("duration", &entry.duration)?;
                dict.set_item("has_sample", entry.sample.is_some())?;
                Ok(dict.into_any().unbind())
            })
            .collect()
    }

    /// Create a pad without a sample. Returns its id.
    #[pyo3(signature = (name=None, color=None, icon=None, hotkey=None, looping=false))]
    pub fn create_pad(
        &mut self,
        name: Option<String>,
        color: Option<String>,
        icon: Option<String>,
        hotkey: Option<String>,
        looping: bool,
    ) -> PyResult<String> {
        let hotkey = match hotkey.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(normalize_hotkey(raw).ok_or_else(|| {
                PyValueError::new_err(format!("hotkey must be a single character, got {raw:?}"))
            })?),
        };

        Ok(self.controller.create_pad(PadSpec {
            name,
            color,
            icon,
            hotkey,
            looping,
            ..PadSpec::default()
        }))
    }

    pub fn delete_pad(&mut self, pad_id: &str) -> bool {
        self.controller.delete_pad(pad_id)
    }

    pub fn clear_all(&mut self) {
        self.controller.clear_all();
    }

    /// Import audio files as pads. Failures are reported through notifications.
    pub fn import_files(&mut self, paths: Vec<String>) -> Vec<String> {
        let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
        self.controller.import_files(paths.as_slice())
    }

    pub fn assign_sample(&mut self, pad_id: &str, path: String) -> bool {
        self.controller.assign_sample(pad_id, &PathBuf::from(path))
    }

    pub fn play_from_playlist(&mut self, entry_id: &str) -> Option<String> {
        self.controller.play_from_playlist(entry_id)
    }

    pub fn remove_from_playlist(&mut self, entry_id: &str) -> bool {
        self.controller.remove_from_playlist(entry_id)
    }

    pub fn save(&mut self) -> bool {
        self.controller.save()
    }

    pub fn settings(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let settings = self.controller.settings();
        let dict = PyDict::new(py);
        dict.set_item("theme", settings.theme.as_str())?;
        dict.set_item("audioQuality", settings.audio_quality.as_str())?;
        dict.set_item("autoSave", settings.auto_save)?;
        dict.set_item("showTooltips", settings.show_tooltips)?;
        Ok(dict.into_any().unbind())
    }

    /// Change some settings; omitted ones keep their value.
    #[pyo3(signature = (theme=None, audio_quality=None, auto_save=None, show_tooltips=None))]
    pub fn update_settings(
        &mut self,
        theme: Option<&str>,
        audio_quality: Option<&str>,
        auto_save: Option<bool>,
        show_tooltips: Option<bool>,
    ) -> PyResult<bool> {
        let mut settings = *self.controller.settings();
        if let Some(theme) = theme {
            settings.theme = theme
                .parse::<Theme>()
                .map_err(|e| PyValueError::new_err(e.to_string()))?;
        }
        if let Some(quality) = audio_quality {
            settings.audio_quality = quality
                .parse::<AudioQuality>()
                .map_err(|e| PyValueError::new_err(e.to_string()))?;
        }
        if let Some(auto_save) = auto_save {
            settings.auto_save = auto_save;
        }
        if let Some(show_tooltips) = show_tooltips {
            settings.show_tooltips = show_tooltips;
        }
        Ok(self.controller.update_settings(settings))
    }

    /// Handle a key press. Returns the action as a dict with a `type` key.
    #[pyo3(signature = (key, ctrl=false, meta=false, in_text_input=false))]
    pub fn handle_key(
        &mut self,
        py: Python<'_>,
        key: String,
        ctrl: bool,
        meta: bool,
        in_text_input: bool,
    ) -> PyResult<Py<PyAny>> {
        let action = self.controller.handle_key(&KeyInput {
            key,
            ctrl,
            meta,
            in_text_input,
        });

        let dict = PyDict::new(py);
        match action {
            KeyAction::None => dict.set_item("type", "none")?,
            KeyAction::Save => dict.set_item("type", "save")?,
            KeyAction::OpenFileDialog => dict.set_item("type", "open_file_dialog")?,
            KeyAction::ToggleRecording => dict.set_item("type", "toggle_recording")?,
            KeyAction::StopAll => dict.set_item("type", "stop_all")?,
            KeyAction::TriggerPad(pad_id) => {
                dict.set_item("type", "trigger_pad")?;
                dict.set_item("pad_id", pad_id)?;
            }
        }
        Ok(dict.into_any().unbind())
    }

    pub fn start_metronome(&mut self, bpm: u32) {
        self.controller.start_metronome(bpm);
    }

    pub fn stop_metronome(&mut self) {
        self.controller.stop_metronome();
    }

    pub fn toggle_metronome(&mut self) -> bool {
        self.controller.toggle_metronome()
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        self.controller.set_bpm(bpm);
    }

    pub fn bpm(&self) -> u32 {
        self.controller.metronome().bpm()
    }

    pub fn metronome_running(&self) -> bool {
        self.controller.metronome().is_running()
    }

    pub fn metronome_interval_ms(&self) -> f64 {
        interval_ms(self.controller.metronome().bpm())
    }

    pub fn set_recording_source(&mut self, source: &str) -> PyResult<()> {
        let source: RecordingSource = source.parse().map_err(PyValueError::new_err)?;
        self.controller.set_recording_source(source);
        Ok(())
    }

    pub fn recording_source(&self) -> &'static str {
        self.controller.recording_source().as_str()
    }

    pub fn is_recording(&self) -> bool {
        self.controller.is_recording()
    }

    pub fn start_recording(&mut self) -> bool {
        self.controller.start_recording()
    }

    /// Stop recording. Returns the path of the written file.
    pub fn stop_recording(&mut self) -> Option<String> {
        self.controller
            .stop_recording()
            .map(|path| path.to_string_lossy().into_owned())
    }

    pub fn toggle_recording(&mut self) -> bool {
        self.controller.toggle_recording()
    }

    /// Drain pending engine events. Call regularly; it also updates pad state.
    pub fn poll_events(&mut self) -> Vec<AudioMessage> {
        self.controller.poll_events()
    }

    pub fn drain_notifications(&mut self, py: Python<'_>) -> PyResult<Vec<Py<PyAny>>> {
        self.controller
            .drain_notifications()
            .iter()
            .map(|n| notification_dict(py, n))
            .collect()
    }
}
