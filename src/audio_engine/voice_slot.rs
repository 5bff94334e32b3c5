use crate::audio_engine::effects::EffectHandle;
use crate::audio_engine::eq::EqChainState;
use crate::messages::SampleBuffer;

/// One playing instance of a pad, owned by the mixer.
pub struct VoiceSlot {
    pub active: bool,
    pub token: u64,
    pub sample: Option<SampleBuffer>,
    pub frame_pos: usize,
    pub looping: bool,
    pub eq_state: Vec<EqChainState>,
    pub effects: Vec<EffectHandle>,
    /// Set once a one-shot source has played out; the slot may still ring its effect tail.
    pub source_ended: bool,
    /// Frames of effect tail still to render once the source ran out.
    pub tail_remaining: Option<usize>,
}

impl VoiceSlot {
    pub fn new(channels: usize) -> Self {
        Self {
            active: false,
            token: 0,
            sample: None,
            frame_pos: 0,
            looping: false,
            eq_state: vec![EqChainState::default(); channels],
            effects: Vec::new(),
            source_ended: false,
            tail_remaining: None,
        }
    }

    pub fn start(
        &mut self,
        token: u64,
        sample: SampleBuffer,
        looping: bool,
        effects: Vec<EffectHandle>,
    ) {
        self.active = true;
        self.token = token;
        self.sample = Some(sample);
        self.frame_pos = 0;
        self.looping = looping;
        self.effects = effects;
        self.source_ended = false;
        self.tail_remaining = None;
        for state in &mut self.eq_state {
            state.reset();
        }
    }

    /// Frees the slot and hands back its effect chain, so the caller decides where the
    /// chain's buffers are dropped.
    pub fn stop(&mut self) -> Vec<EffectHandle> {
        self.active = false;
        self.sample = None;
        self.frame_pos = 0;
        self.looping = false;
        self.source_ended = false;
        self.tail_remaining = None;
        for state in &mut self.eq_state {
            state.reset();
        }
        std::mem::take(&mut self.effects)
    }

    pub fn is_playing_token(&self, token: u64) -> bool {
        self.active && self.token == token
    }

    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }
}
