//! Pad registry: the ordered set of sound triggers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::messages::SampleBuffer;
use crate::persistence::PadRecord;

pub const DEFAULT_PAD_NAME: &str = "Untitled";
pub const DEFAULT_PAD_COLOR: &str = "#4ecdc4";
pub const DEFAULT_PAD_ICON: &str = "fa-music";

/// `(name, color, icon)` of the pads a fresh session starts with.
pub const DEFAULT_PADS: [(&str, &str, &str); 4] = [
    ("Kick", "#ff6b6b", "fa-drum"),
    ("Snare", "#4ecdc4", "fa-drum-steelpan"),
    ("Hi-Hat", "#45b7d1", "fa-compact-disc"),
    ("Clap", "#96ceb4", "fa-hands-clapping"),
];

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Produces `<prefix>-<unix-millis>-<counter>` ids, unique within one session.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: u64,
}

impl IdGenerator {
    pub fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}-{}", unix_millis(), self.counter);
        self.counter += 1;
        id
    }
}

/// Normalises a hotkey to one upper-case character. Empty or multi-character input is none.
pub fn normalize_hotkey(raw: &str) -> Option<char> {
    let mut chars = raw.trim().chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    first.to_uppercase().next()
}

/// Optional fields for a new pad; anything left `None` takes the pad defaults.
#[derive(Debug, Clone, Default)]
pub struct PadSpec {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub hotkey: Option<char>,
    pub looping: bool,
    pub sample: Option<SampleBuffer>,
    pub audio_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Pad {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub sample: Option<SampleBuffer>,
    /// Path the sample was decoded from.
    pub audio_file: Option<String>,
    pub hotkey: Option<char>,
    pub looping: bool,
    /// Token of the voice currently playing this pad.
    pub playback: Option<u64>,
}

impl Pad {
    pub fn from_spec(id: String, spec: PadSpec) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Self {
            id,
            name: non_empty(spec.name).unwrap_or_else(|| DEFAULT_PAD_NAME.to_string()),
            color: non_empty(spec.color).unwrap_or_else(|| DEFAULT_PAD_COLOR.to_string()),
            icon: non_empty(spec.icon).unwrap_or_else(|| DEFAULT_PAD_ICON.to_string()),
            sample: spec.sample,
            audio_file: spec.audio_file,
            hotkey: spec.hotkey.and_then(|c| c.to_uppercase().next()),
            looping: spec.looping,
            playback: None,
        }
    }

    pub fn from_record(record: PadRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            color: record.color,
            icon: record.icon,
            sample: None,
            audio_file: None,
            hotkey: normalize_hotkey(&record.hotkey),
            looping: record.looping,
            playback: None,
        }
    }

    pub fn to_record(&self) -> PadRecord {
        PadRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            icon: self.icon.clone(),
            hotkey: self.hotkey.map(String::from).unwrap_or_default(),
            looping: self.looping,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }
}

/// Pads in registration order.
#[derive(Debug, Default)]
pub struct PadRegistry {
    pads: Vec<Pad>,
}

impl PadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pad. A pad with the same id is replaced in place.
    pub fn insert(&mut self, pad: Pad) {
        match self.pads.iter_mut().find(|p| p.id == pad.id) {
            Some(existing) => *existing = pad,
            None => self.pads.push(pad),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Pad> {
        self.pads.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Pad> {
        self.pads.iter_mut().find(|p| p.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Pad> {
        let index = self.pads.iter().position(|p| p.id == id)?;
        Some(self.pads.remove(index))
    }

    pub fn clear(&mut self) {
        self.pads.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pad> {
        self.pads.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pad> {
        self.pads.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.pads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }

    /// The most recently registered pad bound to `key`, compared case-insensitively.
    pub fn find_by_hotkey(&self, key: char) -> Option<&Pad> {
        let key = key.to_uppercase().next()?;
        self.pads.iter().rev().find(|p| p.hotkey == Some(key))
    }

    /// The pad whose current voice carries `token`.
    pub fn find_by_token_mut(&mut self, token: u64) -> Option<&mut Pad> {
        self.pads.iter_mut().find(|p| p.playback == Some(token))
    }

    /// Flips the loop flag and returns the new value.
    pub fn toggle_loop(&mut self, id: &str) -> Option<bool> {
        let pad = self.get_mut(id)?;
        pad.looping = !pad.looping;
        Some(pad.looping)
    }

    pub fn records(&self) -> Vec<PadRecord> {
        self.pads.iter().map(Pad::to_record).collect()
    }

    /// Builds a registry from stored records; every pad comes back without a sample.
    pub fn from_records(records: Vec<PadRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            registry.insert(Pad::from_record(record));
        }
        registry
    }

    /// The pads a fresh session starts with.
    pub fn with_default_pads(ids: &mut IdGenerator) -> Self {
        let mut registry = Self::new();
        for (name, color, icon) in DEFAULT_PADS {
            let spec = PadSpec {
                name: Some(name.to_string()),
                color: Some(color.to_string()),
                icon: Some(icon.to_string()),
                ..PadSpec::default()
            };
            registry.insert(Pad::from_spec(ids.next_id("pad"), spec));
        }
        registry
    }
}
