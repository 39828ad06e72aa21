//! WASM bindings — a browser-facing synth driven from an AudioWorklet.
//!
//! The worklet owns one [`WasmSynth`], forwards UI events to it and calls
//! [`WasmSynth::render`] (or [`WasmSynth::render_into`]) for every block.

use wasm_bindgen::prelude::*;

use crate::config::{EnvelopeParamsUpdate, OscillatorParamsUpdate, SynthConfig};
use crate::dsp::filter::FilterMode;
use crate::dsp::graph::GraphRenderer;
use crate::dsp::voice::VoiceId;
use crate::synth::SynthEngine;

fn to_js<E: std::fmt::Display>(e: E) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// Synth engine plus its renderer, in one object for the worklet thread.
#[wasm_bindgen]
pub struct WasmSynth {
    synth: SynthEngine,
    renderer: GraphRenderer,
}

#[wasm_bindgen]
impl WasmSynth {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> WasmSynth {
        let (synth, renderer) = SynthEngine::new(sample_rate);
        WasmSynth { synth, renderer }
    }

    /// Create a synth from a JSON patch (camelCase keys, missing keys default).
    #[wasm_bindgen(js_name = fromConfig)]
    pub fn from_config(sample_rate: f64, json: &str) -> Result<WasmSynth, JsValue> {
        let config = SynthConfig::from_json(json).map_err(to_js)?;
        let (synth, renderer) = SynthEngine::with_config(sample_rate, config);
        Ok(WasmSynth { synth, renderer })
    }

    pub fn resume(&self) {
        self.synth.resume();
    }

    pub fn suspend(&self) {
        self.synth.suspend();
    }

    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.synth.is_ready()
    }

    #[wasm_bindgen(js_name = currentTime)]
    pub fn current_time(&self) -> f64 {
        self.synth.current_time()
    }

    /// Start a note and return its voice id string.
    #[wasm_bindgen(js_name = noteOn)]
    pub fn note_on(&mut self, note: u8, velocity: f64) -> Result<String, JsValue> {
        let id = self.synth.note_on(note, velocity).map_err(to_js)?;
        Ok(id.to_string())
    }

    /// Release `note`, or exactly the voice named by `voice_id`. An id that
    /// names no voice is ignored.
    #[wasm_bindgen(js_name = noteOff)]
    pub fn note_off(&mut self, note: u8, voice_id: Option<String>) -> Result<(), JsValue> {
        let voice_id = match voice_id.map(|id| id.parse::<VoiceId>()) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                log::debug!("Ignoring note off: {e}");
                return Ok(());
            }
            None => None,
        };
        self.synth.note_off(note, voice_id.as_ref()).map_err(to_js)
    }

    #[wasm_bindgen(js_name = allNotesOff)]
    pub fn all_notes_off(&mut self) {
        self.synth.all_notes_off();
    }

    /// Partial oscillator update, e.g. `{ volume: 0.5 }`. `index` is 1-based.
    #[wasm_bindgen(js_name = setOscillatorParams)]
    pub fn set_oscillator_params(&mut self, index: usize, params: JsValue) -> Result<(), JsValue> {
        let update: OscillatorParamsUpdate =
            serde_wasm_bindgen::from_value(params).map_err(to_js)?;
        self.synth.set_oscillator_params(index, &update);
        Ok(())
    }

    #[wasm_bindgen(js_name = setAmpEnvelope)]
    pub fn set_amp_envelope(&mut self, params: JsValue) -> Result<(), JsValue> {
        let update: EnvelopeParamsUpdate = serde_wasm_bindgen::from_value(params).map_err(to_js)?;
        self.synth.set_amp_envelope(&update);
        Ok(())
    }

    #[wasm_bindgen(js_name = setFilterEnvelope)]
    pub fn set_filter_envelope(&mut self, params: JsValue) -> Result<(), JsValue> {
        let update: EnvelopeParamsUpdate = serde_wasm_bindgen::from_value(params).map_err(to_js)?;
        self.synth.set_filter_envelope(&update);
        Ok(())
    }

    /// `mode` is `"none"`, `"lowpass"` or `"highpass"`. Unknown modes are
    /// ignored.
    #[wasm_bindgen(js_name = setFilterMode)]
    pub fn set_filter_mode(&mut self, mode: &str, cutoff: f64) {
        match mode.parse::<FilterMode>() {
            Ok(mode) => self.synth.set_filter_mode(mode, cutoff),
            Err(e) => log::warn!("Ignoring filter mode change: {e}"),
        }
    }

    #[wasm_bindgen(js_name = setMasterVolume)]
    pub fn set_master_volume(&mut self, volume: f64) {
        self.synth.set_master_volume(volume);
    }

    #[wasm_bindgen(js_name = masterVolume)]
    pub fn master_volume(&self) -> f64 {
        self.synth.master_volume()
    }

    #[wasm_bindgen(js_name = activeVoiceCount)]
    pub fn active_voice_count(&self) -> usize {
        self.synth.active_voice_count()
    }

    #[wasm_bindgen(js_name = voiceCount)]
    pub fn voice_count(&self) -> usize {
        self.synth.voice_count()
    }

    /// Current patch as a plain JS object.
    pub fn config(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.synth.config()).map_err(to_js)
    }

    /// Render `frames` mono samples.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        self.renderer.render_frames(frames)
    }

    /// Render into a caller-owned block, e.g. a worklet output channel.
    #[wasm_bindgen(js_name = renderInto)]
    pub fn render_into(&mut self, output: &mut [f32]) {
        self.renderer.render(output);
    }
}
