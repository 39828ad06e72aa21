//! Voice — one sounding note: oscillator bank → filter stage → output gain.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::config::{EnvelopeParamsUpdate, OscillatorParamsUpdate, SynthConfig};
use crate::error::SynthError;

use super::bank::OscillatorBank;
use super::envelope::Envelope;
use super::filter::FilterMode;
use super::filter_stage::FilterStage;
use super::graph::{AudioGraph, GainNode, NodeId};

/// Extra time after the longest release before the generators halt, so the
/// release ramps finish even with scheduling jitter.
pub const RELEASE_GUARD: f64 = 0.1;

/// Unique handle of a voice: the note, the clock time it started at, and a
/// per-engine serial that keeps voices started in the same block apart.
///
/// The string form is `"{note}-{started_at}-{serial}"`.
#[derive(Debug, Clone, Copy)]
pub struct VoiceId {
    note: u8,
    started_at: f64,
    serial: u64,
}

impl VoiceId {
    pub fn new(note: u8, started_at: f64, serial: u64) -> Self {
        VoiceId {
            note,
            started_at,
            serial,
        }
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

// The serial alone is unique; the start time is informational.
impl PartialEq for VoiceId {
    fn eq(&self, other: &Self) -> bool {
        self.note == other.note && self.serial == other.serial
    }
}

impl Eq for VoiceId {}

impl Hash for VoiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.note.hash(state);
        self.serial.hash(state);
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.note, self.started_at, self.serial)
    }
}

impl FromStr for VoiceId {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SynthError::InvalidVoiceId(s.to_string());
        let mut parts = s.splitn(3, '-');
        let note = parts.next().and_then(|p| p.parse::<u8>().ok());
        let started_at = parts.next().and_then(|p| p.parse::<f64>().ok());
        let serial = parts.next().and_then(|p| p.parse::<u64>().ok());
        match (note, started_at, serial) {
            (Some(note), Some(started_at), Some(serial)) if note <= 127 => {
                Ok(VoiceId::new(note, started_at, serial))
            }
            _ => Err(invalid()),
        }
    }
}

/// Lifecycle of a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceState {
    /// Built, not started yet.
    Idle,
    Sounding,
    /// Released; generators halt at `stop_at`.
    Releasing { stop_at: f64 },
    Terminated,
}

/// A single note instance of the synthesis graph.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    frequency: f64,
    velocity: f64,
    bank: OscillatorBank,
    filter: FilterStage,
    output: GainNode,
    amp_envelope: Envelope,
    state: VoiceState,
}

impl Voice {
    /// Build the node graph for one note and connect it to `destination`.
    /// The output is silent until [`Voice::start`].
    pub fn new(
        graph: &mut AudioGraph,
        id: VoiceId,
        config: &SynthConfig,
        frequency: f64,
        velocity: f64,
        destination: NodeId,
    ) -> Self {
        let output = graph.create_gain(0.0);
        graph.connect(output.id, destination);

        let filter = FilterStage::new(
            graph,
            config.filter_mode,
            config.cutoff_freq,
            config.filter_envelope,
        );
        graph.connect(filter.id(), output.id);

        let bank = OscillatorBank::new(graph, &config.oscillators(), frequency, filter.id());

        Voice {
            id,
            frequency,
            velocity: if velocity.is_nan() {
                0.0
            } else {
                velocity.clamp(0.0, 1.0)
            },
            bank,
            filter,
            output,
            amp_envelope: Envelope::new(config.amp_envelope),
            state: VoiceState::Idle,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_sounding(&self) -> bool {
        self.state == VoiceState::Sounding
    }

    /// Live voices accept parameter changes.
    fn is_live(&self) -> bool {
        matches!(
            self.state,
            VoiceState::Sounding | VoiceState::Releasing { .. }
        )
    }

    /// Time the generators halt, once released.
    pub fn stop_time(&self) -> Option<f64> {
        match self.state {
            VoiceState::Releasing { stop_at } => Some(stop_at),
            _ => None,
        }
    }

    /// Whether the release has run out by `now`.
    pub fn is_finished(&self, now: f64) -> bool {
        match self.state {
            VoiceState::Releasing { stop_at } => now >= stop_at,
            VoiceState::Terminated => true,
            VoiceState::Idle | VoiceState::Sounding => false,
        }
    }

    /// Start the oscillators and trigger both envelopes at `time`.
    pub fn start(&mut self, graph: &AudioGraph, time: f64) {
        if self.state != VoiceState::Idle {
            return;
        }
        self.bank.start(graph, time);
        self.amp_envelope
            .apply(&mut self.output.gain, time, self.velocity);
        self.filter.trigger(time);
        self.state = VoiceState::Sounding;
        log::debug!(
            "Voice {} started at {time:.4}s ({:.2} Hz)",
            self.id,
            self.frequency
        );
    }

    /// Release both envelopes at `time` and schedule teardown.
    pub fn stop(&mut self, graph: &AudioGraph, time: f64) {
        if self.state != VoiceState::Sounding {
            return;
        }
        self.amp_envelope.release(&mut self.output.gain, time);
        self.filter.release(time);

        let tail = self
            .amp_envelope
            .release_time()
            .max(self.filter.release_time());
        let stop_at = time + tail + RELEASE_GUARD;

        self.bank.stop(graph, stop_at);
        self.bank.dispose(graph, stop_at);
        self.filter.dispose(graph, stop_at);
        graph.dispose(self.output.id, stop_at);

        self.state = VoiceState::Releasing { stop_at };
        log::debug!("Voice {} released at {time:.4}s, stops at {stop_at:.4}s", self.id);
    }

    /// Mark the voice as gone. Its nodes were already scheduled for disposal
    /// when it was released.
    pub fn terminate(&mut self) {
        self.state = VoiceState::Terminated;
    }

    /// Update oscillator `index` (0-based) in place.
    pub fn update_osc_params(
        &mut self,
        graph: &AudioGraph,
        index: usize,
        update: &OscillatorParamsUpdate,
        now: f64,
    ) {
        if self.is_live() {
            self.bank.update(graph, index, update, now);
        }
    }

    pub fn update_amp_envelope(&mut self, update: &EnvelopeParamsUpdate, now: f64) {
        if self.is_live() {
            self.amp_envelope.update(&mut self.output.gain, update, now);
        }
    }

    pub fn update_filter_envelope(&mut self, update: &EnvelopeParamsUpdate, now: f64) {
        if self.is_live() {
            self.filter.update_envelope(update, now);
        }
    }

    pub fn set_filter_mode(&mut self, graph: &AudioGraph, mode: FilterMode, cutoff: f64, now: f64) {
        if self.is_live() {
            self.filter.set_mode(graph, mode, cutoff, now);
        }
    }

    /// Output amplitude at `time`.
    pub fn amplitude_at(&self, time: f64) -> f64 {
        self.output.gain.value_at(time)
    }

    pub fn cutoff_at(&self, time: f64) -> f64 {
        self.filter.cutoff_at(time)
    }

    pub fn oscillators(&self) -> &OscillatorBank {
        &self.bank
    }

    pub fn filter(&self) -> &FilterStage {
        &self.filter
    }

    pub fn amp_envelope(&self) -> &Envelope {
        &self.amp_envelope
    }
}
