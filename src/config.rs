//! Synth configuration — parameter snapshots shared by the engine and its voices.
//!
//! Every setter clamps into the valid range; out-of-range input is never an
//! error. The JSON shape matches the state object of the web UI (camelCase
//! keys, lowercase enum values).

use serde::{Deserialize, Serialize};

use crate::dsp::filter::{FilterMode, MAX_CUTOFF_HZ, clamp_cutoff};
use crate::dsp::oscillator::Waveform;
use crate::error::SynthError;

/// Shortest envelope segment, in seconds. Zero-length ramps are rejected by
/// automation hosts.
pub const MIN_ENVELOPE_TIME: f64 = 0.001;
/// Detune range in cents (one octave either way).
pub const MAX_DETUNE_CENTS: f64 = 1200.0;
/// Number of oscillators per voice.
pub const OSCILLATOR_COUNT: usize = 4;

fn clamp_time(seconds: f64) -> f64 {
    if seconds.is_nan() {
        MIN_ENVELOPE_TIME
    } else {
        seconds.max(MIN_ENVELOPE_TIME)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn clamp_detune(cents: f64) -> f64 {
    if cents.is_nan() {
        0.0
    } else {
        cents.clamp(-MAX_DETUNE_CENTS, MAX_DETUNE_CENTS)
    }
}

// ── Envelope ────────────────────────────────────────────────

/// ADSR timing and level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,
}

impl EnvelopeParams {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        EnvelopeParams {
            attack,
            decay,
            sustain,
            release,
        }
        .clamped()
    }

    /// A copy with every field forced into range.
    pub fn clamped(self) -> Self {
        EnvelopeParams {
            attack: clamp_time(self.attack),
            decay: clamp_time(self.decay),
            sustain: clamp_unit(self.sustain),
            release: clamp_time(self.release),
        }
    }

    /// Apply the fields present in `update`, clamping them.
    pub fn merge(&mut self, update: &EnvelopeParamsUpdate) {
        if let Some(attack) = update.attack {
            self.attack = clamp_time(attack);
        }
        if let Some(decay) = update.decay {
            self.decay = clamp_time(decay);
        }
        if let Some(sustain) = update.sustain {
            self.sustain = clamp_unit(sustain);
        }
        if let Some(release) = update.release {
            self.release = clamp_time(release);
        }
    }
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        EnvelopeParams {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// A partial envelope change; absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParamsUpdate {
    pub attack: Option<f64>,
    pub decay: Option<f64>,
    pub sustain: Option<f64>,
    pub release: Option<f64>,
}

// ── Oscillator ──────────────────────────────────────────────

/// Settings of one oscillator in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorParams {
    pub waveform: Waveform,
    /// Detune in cents, [-1200, 1200].
    pub detune: f64,
    /// Linear volume [0, 1], mapped to gain through decibels.
    pub volume: f64,
}

impl OscillatorParams {
    pub fn new(waveform: Waveform, detune: f64, volume: f64) -> Self {
        OscillatorParams {
            waveform,
            detune: clamp_detune(detune),
            volume: clamp_unit(volume),
        }
    }

    pub fn clamped(self) -> Self {
        Self::new(self.waveform, self.detune, self.volume)
    }

    /// Apply the fields present in `update`, clamping them.
    pub fn merge(&mut self, update: &OscillatorParamsUpdate) {
        if let Some(waveform) = update.waveform {
            self.waveform = waveform;
        }
        if let Some(detune) = update.detune {
            self.detune = clamp_detune(detune);
        }
        if let Some(volume) = update.volume {
            self.volume = clamp_unit(volume);
        }
    }
}

impl Default for OscillatorParams {
    fn default() -> Self {
        OscillatorParams {
            waveform: Waveform::Sine,
            detune: 0.0,
            volume: 0.0,
        }
    }
}

/// A partial oscillator change; absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorParamsUpdate {
    pub waveform: Option<Waveform>,
    pub detune: Option<f64>,
    pub volume: Option<f64>,
}

// ── Synth ───────────────────────────────────────────────────

/// Full timbral configuration of the synth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthConfig {
    pub osc1: OscillatorParams,
    pub osc2: OscillatorParams,
    pub osc3: OscillatorParams,
    pub osc4: OscillatorParams,
    pub amp_envelope: EnvelopeParams,
    pub filter_envelope: EnvelopeParams,
    pub filter_mode: FilterMode,
    /// Cutoff frequency in Hz, [20, 20000].
    pub cutoff_freq: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            osc1: OscillatorParams::new(Waveform::Square, 0.0, 0.8),
            osc2: OscillatorParams::default(),
            osc3: OscillatorParams::default(),
            osc4: OscillatorParams::default(),
            amp_envelope: EnvelopeParams::new(0.01, 0.2, 0.7, 0.05),
            filter_envelope: EnvelopeParams::new(0.03, 0.2, 0.7, 0.15),
            filter_mode: FilterMode::None,
            cutoff_freq: MAX_CUTOFF_HZ,
        }
    }
}

impl SynthConfig {
    /// Parse a config from JSON. Missing fields take their defaults and every
    /// value is clamped.
    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        let config: SynthConfig = serde_json::from_str(json)?;
        Ok(config.clamped())
    }

    pub fn to_json(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn clamped(mut self) -> Self {
        for osc in self.oscillators_mut() {
            *osc = osc.clamped();
        }
        self.amp_envelope = self.amp_envelope.clamped();
        self.filter_envelope = self.filter_envelope.clamped();
        self.cutoff_freq = clamp_cutoff(self.cutoff_freq);
        self
    }

    /// The oscillator settings in bank order.
    pub fn oscillators(&self) -> [OscillatorParams; OSCILLATOR_COUNT] {
        [self.osc1, self.osc2, self.osc3, self.osc4]
    }

    fn oscillators_mut(&mut self) -> [&mut OscillatorParams; OSCILLATOR_COUNT] {
        [&mut self.osc1, &mut self.osc2, &mut self.osc3, &mut self.osc4]
    }

    /// Oscillator by 1-based index, as exposed to the UI.
    pub fn oscillator_mut(&mut self, index: usize) -> Option<&mut OscillatorParams> {
        match index {
            1 => Some(&mut self.osc1),
            2 => Some(&mut self.osc2),
            3 => Some(&mut self.osc3),
            4 => Some(&mut self.osc4),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_setters_clamp() {
        let params = EnvelopeParams::new(0.0, -1.0, 1.5, f64::NAN);
        assert_eq!(params.attack, MIN_ENVELOPE_TIME);
        assert_eq!(params.decay, MIN_ENVELOPE_TIME);
        assert_eq!(params.sustain, 1.0);
        assert_eq!(params.release, MIN_ENVELOPE_TIME);

        let mut params = EnvelopeParams::default();
        params.merge(&EnvelopeParamsUpdate {
            sustain: Some(-0.5),
            ..Default::default()
        });
        assert_eq!(params.sustain, 0.0);
        assert_eq!(params.attack, 0.01, "absent fields stay untouched");
    }

    #[test]
    fn oscillator_merge_touches_only_present_fields() {
        let mut osc = OscillatorParams::new(Waveform::Sawtooth, 5.0, 0.5);
        osc.merge(&OscillatorParamsUpdate {
            detune: Some(5000.0),
            ..Default::default()
        });
        assert_eq!(osc.waveform, Waveform::Sawtooth);
        assert_eq!(osc.detune, MAX_DETUNE_CENTS);
        assert_eq!(osc.volume, 0.5);
    }

    #[test]
    fn default_matches_initial_ui_state() {
        let config = SynthConfig::default();
        assert_eq!(config.osc1.waveform, Waveform::Square);
        assert_eq!(config.osc1.volume, 0.8);
        assert_eq!(config.osc2.volume, 0.0);
        assert_eq!(config.amp_envelope, EnvelopeParams::new(0.01, 0.2, 0.7, 0.05));
        assert_eq!(config.filter_mode, FilterMode::None);
        assert_eq!(config.cutoff_freq, 20000.0);
    }

    #[test]
    fn json_uses_ui_field_names_and_clamps() {
        let json = r#"{
            "osc2": { "waveform": "sawtooth", "detune": -3000, "volume": 0.4 },
            "ampEnvelope": { "attack": 0, "decay": 0.3, "sustain": 0.5, "release": 0.2 },
            "filterMode": "lowpass",
            "cutoffFreq": 5
        }"#;
        let config = SynthConfig::from_json(json).unwrap();
        assert_eq!(config.osc2.waveform, Waveform::Sawtooth);
        assert_eq!(config.osc2.detune, -MAX_DETUNE_CENTS);
        assert_eq!(config.amp_envelope.attack, MIN_ENVELOPE_TIME);
        assert_eq!(config.filter_mode, FilterMode::Lowpass);
        assert_eq!(config.cutoff_freq, 20.0);
        assert_eq!(config.osc1, SynthConfig::default().osc1, "missing fields default");

        let json = config.to_json().unwrap();
        assert!(json.contains("\"filterEnvelope\""));
        assert!(json.contains("\"lowpass\""));
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = SynthConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, SynthError::InvalidConfig(_)));
    }

    #[test]
    fn oscillator_index_is_one_based() {
        let mut config = SynthConfig::default();
        assert!(config.oscillator_mut(0).is_none());
        assert!(config.oscillator_mut(5).is_none());
        config.oscillator_mut(4).unwrap().volume = 0.3;
        assert_eq!(config.osc4.volume, 0.3);
    }
}
