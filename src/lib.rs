pub mod config;
pub mod dsp;
pub mod error;
pub mod synth;
pub mod utils;
pub mod wasm;

use wasm_bindgen::prelude::*;

pub use crate::config::{
    EnvelopeParams, EnvelopeParamsUpdate, OscillatorParams, OscillatorParamsUpdate, SynthConfig,
};
pub use crate::dsp::filter::FilterMode;
pub use crate::dsp::graph::GraphRenderer;
pub use crate::dsp::oscillator::Waveform;
pub use crate::dsp::voice::VoiceId;
pub use crate::error::SynthError;
pub use crate::synth::SynthEngine;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the polysynth-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}
