//! Oscillator bank — four independently configured tone generators summed
//! into one signal.

use crate::config::{OSCILLATOR_COUNT, OscillatorParams, OscillatorParamsUpdate};
use crate::utils::{MINUS_INF_IN_DB, db_to_linear, linear_to_db};

use super::graph::{AudioGraph, GainNode, NodeId, OscillatorNode};

/// Decibel value for a linear volume. Uses a square law, so `0` maps to
/// silence and `1 -> 0 dB`.
pub fn volume_to_db(volume: f64) -> f64 {
    if volume.is_nan() {
        MINUS_INF_IN_DB
    } else {
        (2.0 * linear_to_db(volume.min(1.0))).max(MINUS_INF_IN_DB)
    }
}

/// Perceptual gain for a linear [0, 1] volume knob.
pub fn volume_to_gain(volume: f64) -> f64 {
    db_to_linear(volume_to_db(volume))
}

#[derive(Debug)]
struct OscillatorSlot {
    params: OscillatorParams,
    oscillator: OscillatorNode,
    gain: GainNode,
}

/// The four oscillators of a voice, each routed through its own gain.
#[derive(Debug)]
pub struct OscillatorBank {
    slots: Vec<OscillatorSlot>,
}

impl OscillatorBank {
    /// Create the oscillators at `frequency` and connect them to `output`.
    pub fn new(
        graph: &mut AudioGraph,
        params: &[OscillatorParams; OSCILLATOR_COUNT],
        frequency: f64,
        output: NodeId,
    ) -> Self {
        let slots = params
            .iter()
            .map(|params| {
                let params = params.clamped();
                let oscillator = graph.create_oscillator(params.waveform, frequency, params.detune);
                let gain = graph.create_gain(volume_to_gain(params.volume));
                graph.connect(oscillator.id, gain.id);
                graph.connect(gain.id, output);
                OscillatorSlot {
                    params,
                    oscillator,
                    gain,
                }
            })
            .collect();
        OscillatorBank { slots }
    }

    pub fn start(&self, graph: &AudioGraph, time: f64) {
        for slot in &self.slots {
            graph.start(slot.oscillator.id, time);
        }
    }

    pub fn stop(&self, graph: &AudioGraph, time: f64) {
        for slot in &self.slots {
            graph.stop(slot.oscillator.id, time);
        }
    }

    /// Release every node of the bank once `time` has passed.
    pub fn dispose(&self, graph: &AudioGraph, time: f64) {
        for slot in &self.slots {
            graph.dispose(slot.oscillator.id, time);
            graph.dispose(slot.gain.id, time);
        }
    }

    /// Apply the fields present in `update` to the oscillator at 0-based
    /// `index`, effective at `now`. The other oscillators are untouched.
    pub fn update(
        &mut self,
        graph: &AudioGraph,
        index: usize,
        update: &OscillatorParamsUpdate,
        now: f64,
    ) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        slot.params.merge(update);

        if update.waveform.is_some() {
            graph.set_waveform(slot.oscillator.id, slot.params.waveform);
        }
        if update.detune.is_some() {
            slot.oscillator.detune.set_value_now(slot.params.detune, now);
        }
        if update.volume.is_some() {
            slot.gain
                .gain
                .set_value_now(volume_to_gain(slot.params.volume), now);
        }
    }

    pub fn params(&self, index: usize) -> Option<OscillatorParams> {
        self.slots.get(index).map(|slot| slot.params)
    }

    /// Gain of the oscillator at `index` at `time`.
    pub fn gain_at(&self, index: usize, time: f64) -> Option<f64> {
        self.slots.get(index).map(|slot| slot.gain.gain.value_at(time))
    }

    /// Detune of the oscillator at `index` at `time`, in cents.
    pub fn detune_at(&self, index: usize, time: f64) -> Option<f64> {
        self.slots
            .get(index)
            .map(|slot| slot.oscillator.detune.value_at(time))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::oscillator::Waveform;

    #[test]
    fn volume_mapping_endpoints_and_monotonic() {
        assert_eq!(volume_to_gain(0.0), 0.0);
        assert_eq!(volume_to_gain(1.0), 1.0);
        assert_eq!(volume_to_db(0.0), MINUS_INF_IN_DB);
        assert_eq!(volume_to_db(1.0), 0.0);

        let mut previous = 0.0;
        for step in 0..=1000 {
            let gain = volume_to_gain(step as f64 / 1000.0);
            assert!(gain >= previous, "Mapping must not decrease at step {step}");
            previous = gain;
        }

        // non-linear: half volume is well below half gain
        let half = volume_to_gain(0.5);
        assert!((half - 0.25).abs() < 1e-12, "got {half}");
    }

    #[test]
    fn update_touches_only_one_oscillator() {
        let (mut graph, _renderer) = AudioGraph::new(44100.0);
        let destination = graph.destination();
        let params = [OscillatorParams::new(Waveform::Sine, 0.0, 0.5); OSCILLATOR_COUNT];
        let mut bank = OscillatorBank::new(&mut graph, &params, 440.0, destination);

        bank.update(
            &graph,
            1,
            &OscillatorParamsUpdate {
                volume: Some(0.0),
                detune: Some(-700.0),
                ..Default::default()
            },
            0.2,
        );

        assert_eq!(bank.gain_at(1, 0.2), Some(0.0));
        assert_eq!(bank.detune_at(1, 0.2), Some(-700.0));
        for index in [0, 2, 3] {
            assert_eq!(bank.gain_at(index, 0.2), Some(volume_to_gain(0.5)));
            assert_eq!(bank.detune_at(index, 0.2), Some(0.0));
        }
        assert_eq!(bank.params(1).map(|p| p.waveform), Some(Waveform::Sine));
        assert_eq!(bank.params(1).map(|p| p.volume), Some(0.0));
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let (mut graph, _renderer) = AudioGraph::new(44100.0);
        let destination = graph.destination();
        let params = [OscillatorParams::default(); OSCILLATOR_COUNT];
        let mut bank = OscillatorBank::new(&mut graph, &params, 440.0, destination);
        bank.update(&graph, 7, &OscillatorParamsUpdate::default(), 0.0);
        assert_eq!(bank.len(), OSCILLATOR_COUNT);
        for index in 0..OSCILLATOR_COUNT {
            assert_eq!(bank.gain_at(index, 0.0), Some(0.0));
        }
        assert_eq!(bank.gain_at(OSCILLATOR_COUNT, 0.0), None);
    }
}
