//! DSP — the audio graph and the synth voices built on it.
//!
//! Control code schedules automation on [`graph::AudioGraph`]; the render
//! side turns it into samples. Everything above the graph (envelopes,
//! oscillator banks, filter stages, voices) only schedules.

pub mod automation;
pub mod bank;
pub mod compressor;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod filter_stage;
pub mod graph;
pub mod oscillator;
pub mod registry;
pub mod voice;
