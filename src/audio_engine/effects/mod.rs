//! Per-play effect processors.
//!
//! Every play builds its own chain with [`build_chain`]; instances are never shared between
//! voices. Construction happens on the controller thread (the reverb impulse and the
//! distortion curve are the expensive parts), processing happens on the audio thread.

pub mod compressor;
pub mod delay;
pub mod distortion;
pub mod reverb;

use std::fmt;
use std::str::FromStr;

pub use compressor::Compressor;
pub use delay::{DelayHandle, FeedbackDelay};
pub use distortion::WaveShaper;
pub use reverb::Reverb;

use crate::audio_engine::routing::GraphNode;

/// The effect kinds a user can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Reverb,
    Delay,
    Distortion,
    Compressor,
}

impl EffectKind {
    pub const ALL: [EffectKind; 4] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Distortion,
        EffectKind::Compressor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Distortion => "distortion",
            EffectKind::Compressor => "compressor",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown effect: {0}")]
pub struct UnknownEffect(pub String);

impl FromStr for EffectKind {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownEffect(s.to_string()))
    }
}

/// A single-node effect: audio enters and leaves the same processor.
pub enum EffectNode {
    Reverb(Reverb),
    Distortion(WaveShaper),
    Compressor(Compressor),
}

impl EffectNode {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectNode::Reverb(_) => EffectKind::Reverb,
            EffectNode::Distortion(_) => EffectKind::Distortion,
            EffectNode::Compressor(_) => EffectKind::Compressor,
        }
    }

    pub fn process(&mut self, block: &mut [f32]) {
        match self {
            EffectNode::Reverb(reverb) => reverb.process(block),
            EffectNode::Distortion(shaper) => shaper.process(block),
            EffectNode::Compressor(compressor) => compressor.process(block),
        }
    }
}

/// One built effect, ready to be inserted into a voice.
///
/// The delay is not a plain node: upstream audio is connected to its feedback loop while
/// downstream nodes read from its wet gain.
pub enum EffectHandle {
    Plain(EffectNode),
    Delay(DelayHandle),
}

impl EffectHandle {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectHandle::Plain(node) => node.kind(),
            EffectHandle::Delay(_) => EffectKind::Delay,
        }
    }

    /// Node the previous stage connects into when this effect sits at `position`.
    pub fn receiver(&self, position: usize) -> GraphNode {
        match self {
            EffectHandle::Plain(node) => GraphNode::Effect {
                position,
                kind: node.kind(),
            },
            EffectHandle::Delay(_) => GraphNode::DelayLine { position },
        }
    }

    /// Node the next stage connects from.
    pub fn emitter(&self, position: usize) -> GraphNode {
        match self {
            EffectHandle::Plain(node) => GraphNode::Effect {
                position,
                kind: node.kind(),
            },
            EffectHandle::Delay(_) => GraphNode::DelayWet { position },
        }
    }

    /// Connections inside the effect itself.
    pub fn internal_edges(&self, position: usize) -> Vec<(GraphNode, GraphNode)> {
        match self {
            EffectHandle::Plain(_) => Vec::new(),
            EffectHandle::Delay(_) => {
                let line = GraphNode::DelayLine { position };
                vec![(line, line), (line, GraphNode::DelayWet { position })]
            }
        }
    }

    pub fn process(&mut self, block: &mut [f32]) {
        match self {
            EffectHandle::Plain(node) => node.process(block),
            EffectHandle::Delay(delay) => delay.process(block),
        }
    }
}

/// Builds a fresh, independent instance of `kind`.
///
/// # Errors
///
/// Only the reverb can fail, when its impulse cannot be transformed.
pub fn build_effect(
    kind: EffectKind,
    sample_rate_hz: u32,
    channels: usize,
) -> Result<EffectHandle, realfft::FftError> {
    Ok(match kind {
        EffectKind::Reverb => EffectHandle::Plain(EffectNode::Reverb(Reverb::new(
            sample_rate_hz,
            channels,
        )?)),
        EffectKind::Delay => EffectHandle::Delay(DelayHandle::new(sample_rate_hz, channels)),
        EffectKind::Distortion => EffectHandle::Plain(EffectNode::Distortion(WaveShaper::new(
            sample_rate_hz,
            channels,
        ))),
        EffectKind::Compressor => EffectHandle::Plain(EffectNode::Compressor(Compressor::new(
            sample_rate_hz,
            channels,
        ))),
    })
}

/// Builds one instance per kind, in the given order. An effect that fails to build is
/// logged and left out of the chain.
pub fn build_chain(kinds: &[EffectKind], sample_rate_hz: u32, channels: usize) -> Vec<EffectHandle> {
    kinds
        .iter()
        .filter_map(|&kind| match build_effect(kind, sample_rate_hz, channels) {
            Ok(effect) => Some(effect),
            Err(err) => {
                log::error!("Failed to build {kind} effect, skipping it: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effect_kind() {
        assert_eq!("reverb".parse::<EffectKind>(), Ok(EffectKind::Reverb));
        assert_eq!(" Delay ".parse::<EffectKind>(), Ok(EffectKind::Delay));
        assert_eq!("COMPRESSOR".parse::<EffectKind>(), Ok(EffectKind::Compressor));
        assert!("chorus".parse::<EffectKind>().is_err());
        for kind in EffectKind::ALL {
            assert_eq!(kind.to_string().parse::<EffectKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_build_chain_keeps_order() {
        let kinds = [EffectKind::Compressor, EffectKind::Delay, EffectKind::Distortion];
        let chain = build_chain(&kinds, 8_000, 2);
        let built: Vec<EffectKind> = chain.iter().map(EffectHandle::kind).collect();
        assert_eq!(built, kinds);
    }

    #[test]
    fn test_delay_exposes_distinct_receiver_and_emitter() {
        let delay = build_effect(EffectKind::Delay, 8_000, 2).unwrap();
        assert!(matches!(delay, EffectHandle::Delay(_)));
        assert_eq!(delay.receiver(1), GraphNode::DelayLine { position: 1 });
        assert_eq!(delay.emitter(1), GraphNode::DelayWet { position: 1 });
        assert_eq!(delay.internal_edges(1).len(), 2);

        let comp = build_effect(EffectKind::Compressor, 8_000, 2).unwrap();
        assert_eq!(comp.receiver(0), comp.emitter(0));
        assert!(comp.internal_edges(0).is_empty());
    }

    #[test]
    fn test_instances_are_independent() {
        let mut a = build_effect(EffectKind::Delay, 1_000, 1).unwrap();
        let mut b = build_effect(EffectKind::Delay, 1_000, 1).unwrap();

        let mut block_a = vec![0.0; 400];
        block_a[0] = 1.0;
        a.process(&mut block_a);

        let mut block_b = vec![0.0; 400];
        b.process(&mut block_b);

        assert!(block_a[300] > 0.0);
        assert!(block_b.iter().all(|&s| s == 0.0));
    }
}
