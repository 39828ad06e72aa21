//! Synth engine — the public control surface of the polyphonic synth.
//!
//! Every call first reaps voices whose release has played out, then acts on
//! the live set. Parameter changes are stored in the config (so future notes
//! pick them up) and pushed to every live voice, releasing ones included.

use crate::config::{
    EnvelopeParamsUpdate, OSCILLATOR_COUNT, OscillatorParamsUpdate, SynthConfig,
};
use crate::dsp::engine::{AudioEngine, DEFAULT_TUNING_PITCH, midi_to_frequency};
use crate::dsp::filter::{FilterMode, clamp_cutoff};
use crate::dsp::graph::GraphRenderer;
use crate::dsp::registry::VoiceRegistry;
use crate::dsp::voice::{Voice, VoiceId};
use crate::error::SynthError;

/// Highest MIDI note number.
pub const MAX_NOTE: u8 = 127;

/// Polyphonic subtractive synth: four oscillators per voice, a filter with
/// its own envelope, and an amplitude envelope.
#[derive(Debug)]
pub struct SynthEngine {
    audio: AudioEngine,
    config: SynthConfig,
    registry: VoiceRegistry,
    next_serial: u64,
}

impl SynthEngine {
    /// Create a synth with the default patch. The returned renderer belongs
    /// to the audio callback.
    pub fn new(sample_rate: f64) -> (SynthEngine, GraphRenderer) {
        Self::with_config(sample_rate, SynthConfig::default())
    }

    pub fn with_config(sample_rate: f64, config: SynthConfig) -> (SynthEngine, GraphRenderer) {
        let (audio, renderer) = AudioEngine::new(sample_rate);
        let synth = SynthEngine {
            audio,
            config: config.clamped(),
            registry: VoiceRegistry::new(),
            next_serial: 0,
        };
        (synth, renderer)
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioEngine {
        &mut self.audio
    }

    /// Current patch. Changes go through the setters.
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn resume(&self) {
        self.audio.resume();
    }

    pub fn suspend(&self) {
        self.audio.suspend();
    }

    pub fn is_ready(&self) -> bool {
        self.audio.is_ready()
    }

    pub fn current_time(&self) -> f64 {
        self.audio.current_time()
    }

    /// Start a new voice for `note`. Notes above 127 are clamped and velocity
    /// is clamped to [0, 1].
    pub fn note_on(&mut self, note: u8, velocity: f64) -> Result<VoiceId, SynthError> {
        self.audio.ensure_ready()?;
        let now = self.reap();

        let note = note.min(MAX_NOTE);
        let velocity = if velocity.is_nan() {
            0.0
        } else {
            velocity.clamp(0.0, 1.0)
        };
        self.next_serial += 1;
        let id = VoiceId::new(note, now, self.next_serial);

        let frequency = midi_to_frequency(note, DEFAULT_TUNING_PITCH);
        let bus = self.audio.bus();
        let mut voice = Voice::new(
            self.audio.graph_mut(),
            id,
            &self.config,
            frequency,
            velocity,
            bus,
        );
        voice.start(self.audio.graph(), now);
        self.registry.insert(voice);
        Ok(id)
    }

    /// Release the voice named by `voice_id`, or else the most recently
    /// started voice of `note`. An id names its voice on its own, so `note`
    /// is only used without one. Releasing a note with nothing held is a
    /// no-op.
    pub fn note_off(&mut self, note: u8, voice_id: Option<&VoiceId>) -> Result<(), SynthError> {
        self.audio.ensure_ready()?;
        let now = self.reap();
        let note = note.min(MAX_NOTE);

        let id = match voice_id {
            Some(id) if self.registry.take(id) => Some(*id),
            Some(id) => {
                log::debug!("Note off for {id}: voice is not held");
                None
            }
            None => self.registry.pop_latest(note),
        };
        let Some(id) = id else {
            if voice_id.is_none() {
                log::debug!("Note off for {note}: nothing held");
            }
            return Ok(());
        };

        if let Some(voice) = self.registry.get_mut(&id) {
            voice.stop(self.audio.graph(), now);
        }
        Ok(())
    }

    /// Release every held voice.
    pub fn all_notes_off(&mut self) {
        let now = self.reap();
        let ids = self.registry.take_all();
        for id in &ids {
            if let Some(voice) = self.registry.get_mut(id) {
                voice.stop(self.audio.graph(), now);
            }
        }
        if !ids.is_empty() {
            log::debug!("Released {} held voice(s)", ids.len());
        }
    }

    /// Update oscillator `index` (1-based) in the patch and on every live
    /// voice. Out-of-range indices are ignored.
    pub fn set_oscillator_params(&mut self, index: usize, update: &OscillatorParamsUpdate) {
        let now = self.reap();
        let Some(params) = self.config.oscillator_mut(index) else {
            log::warn!("Ignoring oscillator update for index {index} (expected 1..={OSCILLATOR_COUNT})");
            return;
        };
        params.merge(update);

        let graph = self.audio.graph();
        for voice in self.registry.voices_mut() {
            voice.update_osc_params(graph, index - 1, update, now);
        }
    }

    pub fn set_amp_envelope(&mut self, update: &EnvelopeParamsUpdate) {
        let now = self.reap();
        self.config.amp_envelope.merge(update);
        for voice in self.registry.voices_mut() {
            voice.update_amp_envelope(update, now);
        }
    }

    pub fn set_filter_envelope(&mut self, update: &EnvelopeParamsUpdate) {
        let now = self.reap();
        self.config.filter_envelope.merge(update);
        for voice in self.registry.voices_mut() {
            voice.update_filter_envelope(update, now);
        }
    }

    /// Switch the filter type and base cutoff (clamped to 20 Hz - 20 kHz).
    pub fn set_filter_mode(&mut self, mode: FilterMode, cutoff: f64) {
        let now = self.reap();
        self.config.filter_mode = mode;
        self.config.cutoff_freq = clamp_cutoff(cutoff);

        let graph = self.audio.graph();
        for voice in self.registry.voices_mut() {
            voice.set_filter_mode(graph, mode, cutoff, now);
        }
    }

    pub fn set_master_volume(&mut self, volume: f64) {
        self.audio.set_master_volume(volume);
    }

    pub fn master_volume(&self) -> f64 {
        self.audio.master_volume()
    }

    /// Voices still held down.
    pub fn active_voice_count(&self) -> usize {
        self.registry.held_count()
    }

    /// Voices still producing sound, releasing ones included.
    pub fn voice_count(&self) -> usize {
        self.registry.len()
    }

    pub fn voice(&self, id: &VoiceId) -> Option<&Voice> {
        self.registry.get(id)
    }

    /// Held voices of `note`, oldest first.
    pub fn held_voices(&self, note: u8) -> &[VoiceId] {
        self.registry.stack(note)
    }

    /// Drop finished voices and return the clock time used.
    fn reap(&mut self) -> f64 {
        let now = self.audio.current_time();
        self.registry.reap(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvelopeParams, OscillatorParams};
    use crate::dsp::bank::volume_to_gain;
    use crate::dsp::filter::MAX_CUTOFF_HZ;
    use crate::dsp::oscillator::Waveform;
    use crate::dsp::voice::VoiceState;

    const SR: f64 = 8000.0;

    fn ready_synth(config: SynthConfig) -> (SynthEngine, GraphRenderer) {
        let (synth, renderer) = SynthEngine::with_config(SR, config);
        synth.resume();
        (synth, renderer)
    }

    fn scenario_config() -> SynthConfig {
        SynthConfig {
            amp_envelope: EnvelopeParams::new(0.01, 0.2, 0.7, 0.05),
            ..SynthConfig::default()
        }
    }

    fn advance_to(renderer: &mut GraphRenderer, time: f64) {
        let frames = (time * SR).round() as usize - (renderer.current_time() * SR).round() as usize;
        renderer.render_frames(frames);
    }

    #[test]
    fn suspended_engine_rejects_notes() {
        let (mut synth, _renderer) = SynthEngine::new(SR);
        assert!(matches!(synth.note_on(60, 1.0), Err(SynthError::NotReady)));
        assert!(matches!(synth.note_off(60, None), Err(SynthError::NotReady)));
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn repeated_note_releases_latest_first() {
        let (mut synth, mut renderer) = ready_synth(SynthConfig::default());
        let first = synth.note_on(60, 1.0).unwrap();
        renderer.render_frames(80);
        let second = synth.note_on(60, 1.0).unwrap();
        assert_ne!(first, second);
        assert_eq!(synth.voice_count(), 2);

        synth.note_off(60, None).unwrap();
        assert_eq!(synth.held_voices(60), &[first]);
        assert!(synth.voice(&first).is_some_and(Voice::is_sounding));
        assert!(matches!(
            synth.voice(&second).map(Voice::state),
            Some(VoiceState::Releasing { .. })
        ));
    }

    #[test]
    fn same_instant_notes_get_distinct_ids() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        let first = synth.note_on(60, 1.0).unwrap();
        let second = synth.note_on(60, 1.0).unwrap();
        assert_ne!(first, second);
        assert_ne!(first.to_string(), second.to_string());
    }

    #[test]
    fn explicit_id_releases_that_voice() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        let first = synth.note_on(60, 1.0).unwrap();
        let second = synth.note_on(60, 1.0).unwrap();

        synth.note_off(60, Some(&first)).unwrap();
        assert_eq!(synth.held_voices(60), &[second]);
        assert!(synth.voice(&second).is_some_and(Voice::is_sounding));

        // already released: no-op
        synth.note_off(60, Some(&first)).unwrap();
        assert_eq!(synth.held_voices(60), &[second]);
    }

    #[test]
    fn explicit_id_wins_over_the_note_argument() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        let id = synth.note_on(60, 1.0).unwrap();

        synth.note_off(61, Some(&id)).unwrap();
        assert!(matches!(
            synth.voice(&id).map(Voice::state),
            Some(VoiceState::Releasing { .. })
        ));
        assert!(synth.held_voices(60).is_empty());
    }

    #[test]
    fn envelope_changes_reach_held_filtered_notes() {
        let (mut synth, mut renderer) = ready_synth(SynthConfig {
            filter_mode: FilterMode::Lowpass,
            cutoff_freq: 1020.0,
            filter_envelope: EnvelopeParams::new(0.03, 0.2, 0.7, 0.15),
            ..scenario_config()
        });
        let id = synth.note_on(60, 1.0).unwrap();
        advance_to(&mut renderer, 0.5);

        let voice = synth.voice(&id).unwrap();
        assert!((voice.cutoff_at(0.5) - 720.0).abs() < 1e-6, "sustained cutoff");
        assert!((voice.amplitude_at(0.5) - 0.7).abs() < 1e-6, "sustained amplitude");

        let sustain = EnvelopeParamsUpdate {
            sustain: Some(0.2),
            ..Default::default()
        };
        synth.set_amp_envelope(&sustain);
        synth.set_filter_envelope(&sustain);

        // both sustains restart a full decay from the held value
        let voice = synth.voice(&id).unwrap();
        assert!((voice.cutoff_at(0.5) - 720.0).abs() < 1e-6, "no jump");
        assert!((voice.cutoff_at(0.8) - 220.0).abs() < 1e-6, "new cutoff sustain");
        assert!((voice.amplitude_at(0.8) - 0.2).abs() < 1e-6, "new amplitude sustain");
        assert!(voice.is_sounding());
    }

    #[test]
    fn note_off_without_voices_is_a_no_op() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        assert!(synth.note_off(64, None).is_ok());
        let stranger = VoiceId::new(64, 0.0, 99);
        assert!(synth.note_off(64, Some(&stranger)).is_ok());
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn disabled_filter_stays_open() {
        let (mut synth, mut renderer) = ready_synth(SynthConfig {
            filter_mode: FilterMode::None,
            cutoff_freq: 500.0,
            ..SynthConfig::default()
        });
        let id = synth.note_on(60, 1.0).unwrap();
        advance_to(&mut renderer, 0.1);
        synth.set_filter_envelope(&EnvelopeParamsUpdate {
            sustain: Some(0.2),
            ..Default::default()
        });

        let voice = synth.voice(&id).unwrap();
        for time in [0.0, 0.02, 0.1, 0.4, 1.0] {
            assert_eq!(voice.cutoff_at(time), MAX_CUTOFF_HZ);
        }
    }

    #[test]
    fn amplitude_scenario_for_middle_c() {
        let (mut synth, mut renderer) = ready_synth(scenario_config());
        let id = synth.note_on(60, 1.0).unwrap();
        assert_eq!(id.note(), 60);

        let voice = synth.voice(&id).unwrap();
        assert!((voice.frequency() - 261.6256).abs() < 1e-3);
        assert!((voice.amplitude_at(0.01) - 1.0).abs() < 1e-6);
        assert!((voice.amplitude_at(0.21) - 0.7).abs() < 1e-6);

        advance_to(&mut renderer, 0.5);
        synth.note_off(60, None).unwrap();

        let voice = synth.voice(&id).unwrap();
        assert!(voice.amplitude_at(0.55).abs() < 1e-6);
        let stop_at = voice.stop_time().unwrap();
        assert!(stop_at >= 0.55, "Oscillators stop at {stop_at}");

        // render past the teardown: the voice and its nodes are gone
        advance_to(&mut renderer, 1.0);
        assert_eq!(synth.active_voice_count(), 0);
        synth.note_off(60, None).unwrap();
        assert_eq!(synth.voice_count(), 0);
        assert_eq!(renderer.node_count(), 3, "Only the master chain remains");
    }

    #[test]
    fn oscillator_update_touches_only_its_slot() {
        let (mut synth, _renderer) = ready_synth(SynthConfig {
            osc2: OscillatorParams::new(Waveform::Sawtooth, 0.0, 0.5),
            ..SynthConfig::default()
        });
        let id = synth.note_on(60, 1.0).unwrap();

        synth.set_oscillator_params(
            2,
            &OscillatorParamsUpdate {
                volume: Some(0.0),
                ..Default::default()
            },
        );

        let bank = synth.voice(&id).unwrap().oscillators();
        assert_eq!(bank.gain_at(1, 0.0), Some(0.0));
        assert_eq!(bank.gain_at(0, 0.0), Some(volume_to_gain(0.8)));
        assert_eq!(synth.config().osc2.volume, 0.0);
        assert_eq!(synth.config().osc1.volume, 0.8);
    }

    #[test]
    fn bad_oscillator_index_is_ignored() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        let before = synth.config().clone();
        let update = OscillatorParamsUpdate {
            volume: Some(0.1),
            ..Default::default()
        };
        synth.set_oscillator_params(0, &update);
        synth.set_oscillator_params(5, &update);
        assert_eq!(synth.config(), &before);
    }

    #[test]
    fn new_notes_use_the_updated_patch() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        synth.set_amp_envelope(&EnvelopeParamsUpdate {
            attack: Some(0.5),
            ..Default::default()
        });
        synth.set_filter_mode(FilterMode::Lowpass, 50000.0);
        assert_eq!(synth.config().cutoff_freq, MAX_CUTOFF_HZ);

        let id = synth.note_on(72, 0.5).unwrap();
        let voice = synth.voice(&id).unwrap();
        assert_eq!(voice.amp_envelope().params().attack, 0.5);
        assert_eq!(voice.filter().mode(), FilterMode::Lowpass);
        assert!((voice.amplitude_at(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn filter_mode_fans_out_to_live_voices() {
        let (mut synth, mut renderer) = ready_synth(SynthConfig::default());
        let held = synth.note_on(60, 1.0).unwrap();
        let released = synth.note_on(64, 1.0).unwrap();
        advance_to(&mut renderer, 0.1);
        synth.note_off(64, None).unwrap();

        synth.set_filter_mode(FilterMode::Highpass, 1000.0);
        for id in [held, released] {
            assert_eq!(
                synth.voice(&id).map(|v| v.filter().mode()),
                Some(FilterMode::Highpass)
            );
        }
    }

    #[test]
    fn all_notes_off_releases_everything() {
        let (mut synth, mut renderer) = ready_synth(scenario_config());
        for note in [60, 64, 67] {
            synth.note_on(note, 0.8).unwrap();
        }
        assert_eq!(synth.active_voice_count(), 3);

        synth.all_notes_off();
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.voice_count(), 3);

        advance_to(&mut renderer, 0.5);
        synth.all_notes_off();
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn notes_and_velocity_are_clamped() {
        let (mut synth, _renderer) = ready_synth(SynthConfig::default());
        let id = synth.note_on(200, 3.0).unwrap();
        assert_eq!(id.note(), MAX_NOTE);
        assert_eq!(synth.voice(&id).map(Voice::velocity), Some(1.0));
    }
}
