//! Audio Engine — the shared output bus every voice plays into.
//!
//! Owns the control half of the audio graph, the master gain and the output
//! limiter, and tracks whether the host is running. Voices connect to
//! [`AudioEngine::bus`].

use crate::error::SynthError;

use super::compressor::CompressorConfig;
use super::graph::{AudioGraph, GainNode, GraphRenderer, NodeId};

/// Master gain applied before the limiter.
pub const DEFAULT_MASTER_VOLUME: f64 = 0.8;

/// Standard concert pitch of A4 (MIDI 69).
pub const DEFAULT_TUNING_PITCH: f64 = 440.0;

/// Convert a MIDI note number to frequency using the given tuning pitch.
///
/// `tuning_pitch` is the frequency of A4 (MIDI 69).
/// Formula: `tuning_pitch * 2^((midi - 69) / 12)`
pub fn midi_to_frequency(midi: u8, tuning_pitch: f64) -> f64 {
    tuning_pitch * (2.0_f64).powf((f64::from(midi) - 69.0) / 12.0)
}

/// Control-side audio engine: graph, master bus and ready state.
#[derive(Debug)]
pub struct AudioEngine {
    graph: AudioGraph,
    master: GainNode,
    master_volume: f64,
}

impl AudioEngine {
    /// Build the master chain (gain → limiter → destination). Returns the
    /// renderer to hand to the audio callback. The engine starts suspended.
    pub fn new(sample_rate: f64) -> (AudioEngine, GraphRenderer) {
        let (mut graph, renderer) = AudioGraph::new(sample_rate);
        let destination = graph.destination();

        let limiter = graph.create_compressor(CompressorConfig::limiter());
        let master = graph.create_gain(DEFAULT_MASTER_VOLUME);
        graph.connect(master.id, limiter);
        graph.connect(limiter, destination);

        let engine = AudioEngine {
            graph,
            master,
            master_volume: DEFAULT_MASTER_VOLUME,
        };
        (engine, renderer)
    }

    /// Node every voice output connects to.
    pub fn bus(&self) -> NodeId {
        self.master.id
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    pub fn sample_rate(&self) -> f64 {
        self.graph.sample_rate()
    }

    /// Monotonic clock of the render side, in seconds.
    pub fn current_time(&self) -> f64 {
        self.graph.current_time()
    }

    /// Start (or continue) rendering.
    pub fn resume(&self) {
        if !self.graph.is_running() {
            self.graph.set_running(true);
            log::info!("Audio engine resumed at {:.3}s", self.current_time());
        }
    }

    /// Stop the clock. The renderer outputs silence until resumed.
    pub fn suspend(&self) {
        if self.graph.is_running() {
            self.graph.set_running(false);
            log::info!("Audio engine suspended at {:.3}s", self.current_time());
        }
    }

    pub fn is_ready(&self) -> bool {
        self.graph.is_running()
    }

    pub fn ensure_ready(&self) -> Result<(), SynthError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SynthError::NotReady)
        }
    }

    /// Set the master gain, clamped to [0, 1].
    pub fn set_master_volume(&mut self, volume: f64) {
        self.master_volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        let now = self.current_time();
        self.master.gain.set_value_now(self.master_volume, now);
    }

    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::oscillator::Waveform;

    #[test]
    fn tuning_default_a4_440() {
        let f = midi_to_frequency(69, DEFAULT_TUNING_PITCH);
        assert!((f - 440.0).abs() < 0.01, "A4@440 should be 440Hz, got {f}");
    }

    #[test]
    fn tuning_middle_c() {
        let f = midi_to_frequency(60, DEFAULT_TUNING_PITCH);
        assert!((f - 261.63).abs() < 0.01, "C4@440 should be ~261.63Hz, got {f}");
    }

    #[test]
    fn tuning_432_octaves() {
        let a3 = midi_to_frequency(57, 432.0);
        let a5 = midi_to_frequency(81, 432.0);
        assert!((a3 - 216.0).abs() < 0.01, "A3@432 should be 216Hz, got {a3}");
        assert!((a5 - 864.0).abs() < 0.01, "A5@432 should be 864Hz, got {a5}");
    }

    #[test]
    fn starts_suspended() {
        let (engine, _renderer) = AudioEngine::new(44100.0);
        assert!(!engine.is_ready());
        assert!(matches!(engine.ensure_ready(), Err(SynthError::NotReady)));

        engine.resume();
        assert!(engine.is_ready());
        assert!(engine.ensure_ready().is_ok());

        engine.suspend();
        assert!(!engine.is_ready());
    }

    #[test]
    fn clock_only_advances_while_resumed() {
        let (engine, mut renderer) = AudioEngine::new(1000.0);
        renderer.render_frames(100);
        assert_eq!(engine.current_time(), 0.0);

        engine.resume();
        renderer.render_frames(250);
        assert!((engine.current_time() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn master_volume_clamps() {
        let (mut engine, _renderer) = AudioEngine::new(44100.0);
        assert_eq!(engine.master_volume(), DEFAULT_MASTER_VOLUME);

        engine.set_master_volume(1.7);
        assert_eq!(engine.master_volume(), 1.0);
        engine.set_master_volume(-0.2);
        assert_eq!(engine.master_volume(), 0.0);
        engine.set_master_volume(0.5);
        assert_eq!(engine.master_volume(), 0.5);
    }

    #[test]
    fn bus_reaches_the_output() {
        let (mut engine, mut renderer) = AudioEngine::new(8000.0);
        engine.resume();
        let bus = engine.bus();
        let graph = engine.graph_mut();
        let osc = graph.create_oscillator(Waveform::Square, 100.0, 0.0);
        graph.connect(osc.id, bus);
        graph.start(osc.id, 0.0);

        let out = renderer.render_frames(800);
        let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.5, "Bus signal should pass, peak {peak}");
        assert!(peak < 1.0, "Master gain should attenuate, peak {peak}");

        engine.set_master_volume(0.0);
        let out = renderer.render_frames(800);
        assert!(out[400..].iter().all(|s| s.abs() < 1e-6), "Muted master");
    }
}
