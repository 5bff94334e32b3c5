//! Controller-side metronome state.
//!
//! The click itself is synthesised by the realtime engine; this state machine only decides
//! which start/stop commands to send.

use crate::audio_engine::constants::{BPM_MAX, BPM_MIN, DEFAULT_BPM};

pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(BPM_MIN, BPM_MAX)
}

/// Milliseconds between two ticks.
pub fn interval_ms(bpm: u32) -> f64 {
    60_000.0 / f64::from(clamp_bpm(bpm))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetronomeState {
    Idle,
    Running { bpm: u32 },
}

/// Engine command produced by a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetronomeCommand {
    Start { bpm: u32 },
    Stop,
}

#[derive(Debug)]
pub struct Metronome {
    state: MetronomeState,
    bpm: u32,
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}

impl Metronome {
    pub fn new() -> Self {
        Self {
            state: MetronomeState::Idle,
            bpm: DEFAULT_BPM,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> MetronomeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, MetronomeState::Running { .. })
    }

    /// Tempo used by the next start.
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Starts at `bpm`. Same tempo while running is a no-op; a new tempo stops then restarts.
    pub fn start(&mut self, bpm: u32) -> Vec<MetronomeCommand> {
        let bpm = clamp_bpm(bpm);
        self.bpm = bpm;

        match self.state {
            MetronomeState::Running { bpm: current } if current == bpm => Vec::new(),
            MetronomeState::Running { .. } => {
                self.state = MetronomeState::Running { bpm };
                vec![MetronomeCommand::Stop, MetronomeCommand::Start { bpm }]
            }
            MetronomeState::Idle => {
                self.state = MetronomeState::Running { bpm };
                vec![MetronomeCommand::Start { bpm }]
            }
        }
    }

    pub fn stop(&mut self) -> Option<MetronomeCommand> {
        match self.state {
            MetronomeState::Idle => None,
            MetronomeState::Running { .. } => {
                self.state = MetronomeState::Idle;
                Some(MetronomeCommand::Stop)
            }
        }
    }

    pub fn toggle(&mut self) -> Vec<MetronomeCommand> {
        if self.is_running() {
            self.stop().into_iter().collect()
        } else {
            self.start(self.bpm)
        }
    }

    /// Changes the tempo; a running metronome restarts at the new tempo.
    pub fn set_bpm(&mut self, bpm: u32) -> Vec<MetronomeCommand> {
        if self.is_running() {
            self.start(bpm)
        } else {
            self.bpm = clamp_bpm(bpm);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval() {
        assert_eq!(interval_ms(120), 500.0);
        assert_eq!(interval_ms(60), 1_000.0);
        assert_eq!(interval_ms(1), 3_000.0);
    }

    #[test]
    fn test_start_from_idle() {
        let mut metronome = Metronome::new();
        assert_eq!(metronome.start(120), vec![MetronomeCommand::Start { bpm: 120 }]);
        assert_eq!(metronome.state(), MetronomeState::Running { bpm: 120 });
    }

    #[test]
    fn test_same_bpm_is_noop_and_new_bpm_restarts() {
        let mut metronome = Metronome::new();
        metronome.start(100);
        assert!(metronome.start(100).is_empty());
        assert_eq!(
            metronome.start(140),
            vec![MetronomeCommand::Stop, MetronomeCommand::Start { bpm: 140 }]
        );
    }

    #[test]
    fn test_bpm_is_clamped() {
        let mut metronome = Metronome::new();
        assert_eq!(metronome.start(1_000), vec![MetronomeCommand::Start { bpm: 300 }]);
        metronome.stop();
        assert_eq!(metronome.start(0), vec![MetronomeCommand::Start { bpm: 20 }]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut metronome = Metronome::new();
        assert_eq!(metronome.stop(), None);
        metronome.start(120);
        assert_eq!(metronome.stop(), Some(MetronomeCommand::Stop));
        assert_eq!(metronome.stop(), None);
        assert!(!metronome.is_running());
    }

    #[test]
    fn test_set_bpm_only_restarts_when_running() {
        let mut metronome = Metronome::new();
        assert!(metronome.set_bpm(90).is_empty());
        assert_eq!(metronome.bpm(), 90);
        assert_eq!(metronome.toggle(), vec![MetronomeCommand::Start { bpm: 90 }]);
        assert_eq!(
            metronome.set_bpm(95),
            vec![MetronomeCommand::Stop, MetronomeCommand::Start { bpm: 95 }]
        );
        assert_eq!(metronome.toggle(), vec![MetronomeCommand::Stop]);
    }
}
