//! Explicit topology of one play.
//!
//! The mixer does not walk this graph; it renders the same shape directly. The route exists
//! so callers (and tests) can inspect what a play is wired to.

use crate::audio_engine::constants::EQ_FREQUENCIES_HZ;
use crate::audio_engine::effects::{EffectHandle, EffectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Source,
    Eq { frequency_hz: u32 },
    Effect { position: usize, kind: EffectKind },
    DelayLine { position: usize },
    DelayWet { position: usize },
    MasterGain,
    Destination,
    Meter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRoute {
    effects: Vec<EffectKind>,
    edges: Vec<(GraphNode, GraphNode)>,
}

impl SignalRoute {
    /// Wires `Source → EQ… → MasterGain` plus a serial insert through `chain` after the last
    /// EQ band.
    pub fn from_chain(chain: &[EffectHandle]) -> Self {
        let mut edges = Vec::new();

        let mut previous = GraphNode::Source;
        for frequency_hz in EQ_FREQUENCIES_HZ {
            let band = GraphNode::Eq { frequency_hz };
            edges.push((previous, band));
            previous = band;
        }
        let eq_out = previous;
        edges.push((eq_out, GraphNode::MasterGain));

        if !chain.is_empty() {
            let mut upstream = eq_out;
            for (position, effect) in chain.iter().enumerate() {
                edges.push((upstream, effect.receiver(position)));
                edges.extend(effect.internal_edges(position));
                upstream = effect.emitter(position);
            }
            edges.push((upstream, GraphNode::MasterGain));
        }

        edges.push((GraphNode::MasterGain, GraphNode::Destination));
        edges.push((GraphNode::MasterGain, GraphNode::Meter));

        Self {
            effects: chain.iter().map(EffectHandle::kind).collect(),
            edges,
        }
    }

    pub fn edges(&self) -> &[(GraphNode, GraphNode)] {
        &self.edges
    }

    pub fn effects(&self) -> &[EffectKind] {
        &self.effects
    }

    #[cfg(test)]
    pub fn has_edge(&self, from: GraphNode, to: GraphNode) -> bool {
        self.edges.contains(&(from, to))
    }

    /// Nodes `from` feeds into, in wiring order.
    #[cfg(test)]
    pub fn downstream_of(&self, from: GraphNode) -> Vec<GraphNode> {
        self.edges
            .iter()
            .filter(|(a, _)| *a == from)
            .map(|(_, b)| *b)
            .collect()
    }
}
