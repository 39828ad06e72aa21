//! Filter stage — one resonant filter whose cutoff follows a second envelope.

use crate::config::{EnvelopeParams, EnvelopeParamsUpdate};

use super::envelope::Envelope;
use super::filter::{
    DEFAULT_Q, FilterMode, FilterType, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ, clamp_cutoff,
};
use super::graph::{AudioGraph, FilterNode, NodeId};

/// A voice's filter node plus the envelope sweeping its cutoff.
///
/// With [`FilterMode::None`] the node stays in the signal path but runs with
/// `Q = 0` (an identity stage) and its cutoff pinned at [`MAX_CUTOFF_HZ`].
#[derive(Debug)]
pub struct FilterStage {
    node: FilterNode,
    envelope: Envelope,
    mode: FilterMode,
    cutoff: f64,
    triggered: bool,
    released: bool,
}

impl FilterStage {
    pub fn new(
        graph: &mut AudioGraph,
        mode: FilterMode,
        cutoff: f64,
        envelope: EnvelopeParams,
    ) -> Self {
        let (frequency, q) = match mode {
            FilterMode::None => (MAX_CUTOFF_HZ, 0.0),
            _ => (MIN_CUTOFF_HZ, DEFAULT_Q),
        };
        let filter_type = mode.filter_type().unwrap_or(FilterType::Lowpass);
        FilterStage {
            node: graph.create_filter(filter_type, frequency, q),
            envelope: Envelope::exponential(envelope, MIN_CUTOFF_HZ),
            mode,
            cutoff: clamp_cutoff(cutoff),
            triggered: false,
            released: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn release_time(&self) -> f64 {
        self.envelope.release_time()
    }

    /// Cutoff frequency at `time`, in Hz.
    pub fn cutoff_at(&self, time: f64) -> f64 {
        self.node.frequency.value_at(time)
    }

    pub fn q_at(&self, time: f64) -> f64 {
        self.node.q.value_at(time)
    }

    /// Start the cutoff sweep at `at`.
    pub fn trigger(&mut self, at: f64) {
        self.triggered = true;
        self.released = false;
        match self.mode {
            FilterMode::None => self.pin(at),
            FilterMode::Lowpass | FilterMode::Highpass => {
                self.envelope.apply(&mut self.node.frequency, at, self.cutoff);
            }
        }
    }

    /// Sweep the cutoff back to its resting frequency.
    pub fn release(&mut self, at: f64) {
        self.released = true;
        if self.mode != FilterMode::None {
            self.envelope.release(&mut self.node.frequency, at);
        }
    }

    pub fn update_envelope(&mut self, update: &EnvelopeParamsUpdate, now: f64) {
        // an idle envelope (filter disabled) only stores the new values
        self.envelope.update(&mut self.node.frequency, update, now);
    }

    /// Switch mode and cutoff, continuing from the cutoff sounding at `now`.
    pub fn set_mode(&mut self, graph: &AudioGraph, mode: FilterMode, cutoff: f64, now: f64) {
        let previous = self.mode;
        self.mode = mode;
        self.cutoff = clamp_cutoff(cutoff);

        let Some(filter_type) = mode.filter_type() else {
            self.envelope.reset();
            self.pin(now);
            return;
        };

        graph.set_filter_type(self.node.id, filter_type);
        if previous == FilterMode::None {
            self.node.q.set_value_now(DEFAULT_Q, now);
            if !self.triggered {
                self.node.frequency.set_value_now(MIN_CUTOFF_HZ, now);
            } else if self.released {
                // sweep down from the open filter instead of snapping shut
                self.envelope.release(&mut self.node.frequency, now);
            } else {
                self.envelope.apply(&mut self.node.frequency, now, self.cutoff);
            }
        } else {
            self.envelope.retarget(&mut self.node.frequency, now, self.cutoff);
        }
    }

    pub fn dispose(&self, graph: &AudioGraph, time: f64) {
        graph.dispose(self.node.id, time);
    }

    fn pin(&mut self, at: f64) {
        self.node.q.set_value_now(0.0, at);
        self.node.frequency.set_value_now(MAX_CUTOFF_HZ, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::graph::GraphRenderer;

    fn stage(mode: FilterMode, cutoff: f64) -> (AudioGraph, GraphRenderer, FilterStage) {
        let (mut graph, renderer) = AudioGraph::new(44100.0);
        let stage = FilterStage::new(
            &mut graph,
            mode,
            cutoff,
            EnvelopeParams::new(0.03, 0.2, 0.5, 0.15),
        );
        (graph, renderer, stage)
    }

    #[test]
    fn disabled_filter_stays_pinned() {
        let (_graph, _renderer, mut stage) = stage(FilterMode::None, 500.0);
        stage.trigger(0.0);
        stage.update_envelope(
            &EnvelopeParamsUpdate {
                sustain: Some(0.1),
                attack: Some(1.0),
                ..Default::default()
            },
            0.1,
        );
        for time in [0.0, 0.01, 0.03, 0.1, 0.5] {
            assert_eq!(stage.cutoff_at(time), MAX_CUTOFF_HZ);
            assert_eq!(stage.q_at(time), 0.0);
        }
        stage.release(0.6);
        assert_eq!(stage.cutoff_at(0.7), MAX_CUTOFF_HZ);
        assert_eq!(stage.cutoff_at(2.0), MAX_CUTOFF_HZ);
    }

    #[test]
    fn lowpass_sweeps_up_and_settles() {
        let (_graph, _renderer, mut stage) = stage(FilterMode::Lowpass, 1020.0);
        stage.trigger(0.0);

        assert!((stage.cutoff_at(0.0) - MIN_CUTOFF_HZ).abs() < 1e-9);
        assert!((stage.cutoff_at(0.03) - 1020.0).abs() < 1e-6);
        assert!((stage.cutoff_at(0.23) - 520.0).abs() < 1e-6);
        assert_eq!(stage.q_at(0.1), DEFAULT_Q);

        stage.release(1.0);
        assert!((stage.cutoff_at(1.15) - MIN_CUTOFF_HZ).abs() < 1e-6);
    }

    #[test]
    fn switching_to_none_pins_immediately() {
        let (graph, _renderer, mut stage) = stage(FilterMode::Lowpass, 1020.0);
        stage.trigger(0.0);
        stage.set_mode(&graph, FilterMode::None, 1020.0, 0.1);

        assert_eq!(stage.cutoff_at(0.1), MAX_CUTOFF_HZ);
        assert_eq!(stage.cutoff_at(0.5), MAX_CUTOFF_HZ);
        assert_eq!(stage.q_at(0.2), 0.0);
    }

    #[test]
    fn cutoff_change_retargets_sustain() {
        let (graph, _renderer, mut stage) = stage(FilterMode::Lowpass, 1020.0);
        stage.trigger(0.0);
        stage.set_mode(&graph, FilterMode::Highpass, 2020.0, 1.0);

        assert!((stage.cutoff_at(1.0) - 520.0).abs() < 1e-6, "held");
        assert!((stage.cutoff_at(1.2) - 1020.0).abs() < 1e-6, "new sustain");
        assert_eq!(stage.mode(), FilterMode::Highpass);
    }

    #[test]
    fn enabling_on_a_sounding_voice_starts_the_sweep() {
        let (graph, _renderer, mut stage) = stage(FilterMode::None, 1020.0);
        stage.trigger(0.0);
        stage.set_mode(&graph, FilterMode::Lowpass, 1020.0, 1.0);

        assert!((stage.cutoff_at(1.03) - 1020.0).abs() < 1e-6);
        assert_eq!(stage.q_at(1.0), DEFAULT_Q);
    }

    #[test]
    fn cutoff_is_clamped() {
        let (graph, _renderer, mut stage) = stage(FilterMode::Lowpass, 90000.0);
        assert_eq!(stage.cutoff(), MAX_CUTOFF_HZ);
        stage.set_mode(&graph, FilterMode::Lowpass, 1.0, 0.0);
        assert_eq!(stage.cutoff(), MIN_CUTOFF_HZ);
    }
}
