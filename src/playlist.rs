//! Playlist of imported clips, in import order.

use crate::messages::SampleBuffer;
use crate::pads::DEFAULT_PAD_COLOR;
use crate::persistence::PlaylistRecord;

/// Formats a length in seconds as `m:ss`. Negative or non-finite input is `0:00`.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub id: String,
    pub name: String,
    pub color: String,
    pub sample: Option<SampleBuffer>,
    /// `m:ss` label.
    pub duration: String,
}

impl PlaylistEntry {
    pub fn new(id: String, name: String, sample: SampleBuffer) -> Self {
        let duration = format_duration(sample.duration_seconds());
        Self {
            id,
            name,
            color: DEFAULT_PAD_COLOR.to_string(),
            sample: Some(sample),
            duration,
        }
    }

    pub fn to_record(&self) -> PlaylistRecord {
        PlaylistRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            duration: self.duration.clone(),
        }
    }

    pub fn from_record(record: PlaylistRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            color: record.color,
            sample: None,
            duration: record.duration,
        }
    }
}

#[derive(Debug, Default)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PlaylistEntry) {
        self.entries.push(entry);
    }

    /// Removes the entry with `id`; returns whether one existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&PlaylistEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> Vec<PlaylistRecord> {
        self.entries.iter().map(PlaylistEntry::to_record).collect()
    }

    pub fn from_records(records: Vec<PlaylistRecord>) -> Self {
        Self {
            entries: records.into_iter().map(PlaylistEntry::from_record).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn sample(frames: usize, rate: u32) -> SampleBuffer {
        SampleBuffer {
            channels: 1,
            sample_rate_hz: rate,
            samples: Arc::from(vec![0.0; frames].into_boxed_slice()),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(2.9), "0:02");
        assert_eq!(format_duration(65.0), "1:05");
        assert_eq!(format_duration(600.5), "10:00");
        assert_eq!(format_duration(-1.0), "0:00");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }

    #[test]
    fn test_entry_duration_from_sample() {
        let entry = PlaylistEntry::new("p1".into(), "Loop".into(), sample(75_000, 1_000));
        assert_eq!(entry.duration, "1:15");
        assert_eq!(entry.color, "#4ecdc4");
    }

    #[test]
    fn test_push_remove_keeps_order() {
        let mut playlist = Playlist::new();
        for id in ["a", "b", "c"] {
            playlist.push(PlaylistEntry::new(id.into(), id.into(), sample(10, 1_000)));
        }

        assert!(playlist.remove("b"));
        assert!(!playlist.remove("b"));
        let ids: Vec<_> = playlist.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_records_roundtrip_drops_samples() {
        let mut playlist = Playlist::new();
        playlist.push(PlaylistEntry::new("a".into(), "Kick".into(), sample(2_000, 1_000)));

        let restored = Playlist::from_records(playlist.records());
        assert_eq!(restored.len(), 1);
        let entry = restored.get("a").unwrap();
        assert_eq!(entry.duration, "0:02");
        assert!(entry.sample.is_none());
    }
}
