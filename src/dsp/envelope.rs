//! ADSR envelope — schedules attack/decay/sustain/release ramps on an [`AudioParam`].
//!
//! The envelope doesn't produce samples itself. It arms automation on a
//! target parameter and keeps track of which phase that automation is in, so
//! later releases and parameter changes continue from the value currently
//! sounding instead of jumping.

use crate::config::{EnvelopeParams, EnvelopeParamsUpdate, MIN_ENVELOPE_TIME};

use super::automation::{MIN_EXPONENTIAL_VALUE, RampKind};
use super::graph::AudioParam;

/// Envelope phase at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Scheduled segment boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Active {
        attack_start: f64,
        attack_end: f64,
        decay_end: f64,
    },
    Releasing {
        release_end: f64,
    },
}

/// ADSR envelope generator.
///
/// The curve rises from `base` to a peak, settles at
/// `base + (peak - base) * sustain` and falls back to `base` on release. An
/// amplitude envelope uses a linear curve with base 0 and the note velocity
/// as peak. A filter envelope uses an exponential curve over frequencies.
#[derive(Debug, Clone)]
pub struct Envelope {
    params: EnvelopeParams,
    curve: RampKind,
    base: f64,
    peak: f64,
    stage: Stage,
}

impl Envelope {
    /// Linear envelope from 0, for amplitude.
    pub fn new(params: EnvelopeParams) -> Self {
        Envelope {
            params: params.clamped(),
            curve: RampKind::Linear,
            base: 0.0,
            peak: 1.0,
            stage: Stage::Idle,
        }
    }

    /// Exponential envelope resting at `base`, for frequencies.
    pub fn exponential(params: EnvelopeParams, base: f64) -> Self {
        Envelope {
            curve: RampKind::Exponential,
            base: base.max(MIN_EXPONENTIAL_VALUE),
            ..Self::new(params)
        }
    }

    pub fn params(&self) -> EnvelopeParams {
        self.params
    }

    pub fn set_attack(&mut self, seconds: f64) {
        self.params.merge(&EnvelopeParamsUpdate {
            attack: Some(seconds),
            ..Default::default()
        });
    }

    pub fn set_decay(&mut self, seconds: f64) {
        self.params.merge(&EnvelopeParamsUpdate {
            decay: Some(seconds),
            ..Default::default()
        });
    }

    pub fn set_sustain(&mut self, level: f64) {
        self.params.merge(&EnvelopeParamsUpdate {
            sustain: Some(level),
            ..Default::default()
        });
    }

    pub fn set_release(&mut self, seconds: f64) {
        self.params.merge(&EnvelopeParamsUpdate {
            release: Some(seconds),
            ..Default::default()
        });
    }

    /// Release duration, used to time voice teardown.
    pub fn release_time(&self) -> f64 {
        self.params.release
    }

    /// Level the decay settles on.
    pub fn sustain_level(&self) -> f64 {
        self.base + (self.peak - self.base) * self.params.sustain
    }

    pub fn phase_at(&self, time: f64) -> Phase {
        match self.stage {
            Stage::Idle => Phase::Idle,
            Stage::Active {
                attack_end,
                decay_end,
                ..
            } => {
                if time < attack_end {
                    Phase::Attack
                } else if time < decay_end {
                    Phase::Decay
                } else {
                    Phase::Sustain
                }
            }
            Stage::Releasing { release_end } => {
                if time < release_end {
                    Phase::Release
                } else {
                    Phase::Idle
                }
            }
        }
    }

    /// Trigger: from `base` at `at`, ramp to `peak` over the attack, then to
    /// the sustain level over the decay.
    pub fn apply(&mut self, target: &mut AudioParam, at: f64, peak: f64) {
        self.peak = match self.curve {
            RampKind::Linear => peak,
            RampKind::Exponential => peak.max(MIN_EXPONENTIAL_VALUE),
        };

        target.cancel_scheduled_values(at);
        target.set_value_at_time(self.base, at);
        self.schedule_attack(target, at, at, self.params.attack);
    }

    /// Release: hold the value sounding at `at`, then ramp to `base`.
    pub fn release(&mut self, target: &mut AudioParam, at: f64) {
        let held = self.hold(target, at);
        let release_end = at + self.params.release;
        target.ramp_to_value_at_time(self.curve, self.base, release_end);
        log::debug!("Envelope released from {held:.4} at {at:.4}s");
        self.stage = Stage::Releasing { release_end };
    }

    /// Change parameters while the envelope may be running.
    ///
    /// In attack the remaining attack and the decay are rescheduled. In
    /// decay the remaining ramp is scaled by the distance still left to the
    /// new sustain level. In sustain a changed level starts a fresh decay.
    /// Releasing or idle envelopes only store the new values.
    pub fn update(&mut self, target: &mut AudioParam, update: &EnvelopeParamsUpdate, now: f64) {
        let old_sustain_level = self.sustain_level();
        self.params.merge(update);

        match self.phase_at(now) {
            Phase::Attack => self.continue_attack(target, now),
            Phase::Decay => self.continue_decay(target, now),
            Phase::Sustain => {
                if (self.sustain_level() - old_sustain_level).abs() > f64::EPSILON {
                    self.restart_decay(target, now);
                }
            }
            Phase::Release | Phase::Idle => {}
        }
    }

    /// Move the peak (and with it the sustain level) of a running envelope.
    pub fn retarget(&mut self, target: &mut AudioParam, now: f64, peak: f64) {
        self.peak = match self.curve {
            RampKind::Linear => peak,
            RampKind::Exponential => peak.max(MIN_EXPONENTIAL_VALUE),
        };

        match self.phase_at(now) {
            Phase::Attack => self.continue_attack(target, now),
            Phase::Decay => self.continue_decay(target, now),
            Phase::Sustain => self.restart_decay(target, now),
            Phase::Release | Phase::Idle => {}
        }
    }

    /// Forget the schedule without touching the target.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
    }

    fn schedule_attack(&mut self, target: &mut AudioParam, attack_start: f64, from: f64, attack: f64) {
        let attack_end = from + attack;
        let decay_end = attack_end + self.params.decay;
        target.ramp_to_value_at_time(self.curve, self.peak, attack_end);
        target.ramp_to_value_at_time(self.curve, self.sustain_level(), decay_end);
        self.stage = Stage::Active {
            attack_start,
            attack_end,
            decay_end,
        };
    }

    fn continue_attack(&mut self, target: &mut AudioParam, now: f64) {
        let Stage::Active { attack_start, .. } = self.stage else {
            return;
        };
        if now < attack_start {
            // not started yet, re-arm the whole trigger
            let peak = self.peak;
            self.apply(target, attack_start, peak);
            return;
        }

        let remaining = (self.params.attack - (now - attack_start)).max(MIN_ENVELOPE_TIME);
        self.hold(target, now);
        self.schedule_attack(target, attack_start, now, remaining);
    }

    fn continue_decay(&mut self, target: &mut AudioParam, now: f64) {
        let Stage::Active {
            attack_start,
            attack_end,
            ..
        } = self.stage
        else {
            return;
        };

        let held = self.hold(target, now);
        let sustain_level = self.sustain_level();

        // distance left to the new sustain level, relative to a full decay
        let span = self.position(self.peak) - self.position(sustain_level);
        let fraction = if span.abs() <= f64::EPSILON {
            0.0
        } else {
            ((self.position(held) - self.position(sustain_level)) / span)
                .abs()
                .min(1.0)
        };
        let decay_end = now + (self.params.decay * fraction).max(MIN_ENVELOPE_TIME);

        target.ramp_to_value_at_time(self.curve, sustain_level, decay_end);
        self.stage = Stage::Active {
            attack_start,
            attack_end,
            decay_end,
        };
    }

    fn restart_decay(&mut self, target: &mut AudioParam, now: f64) {
        let Stage::Active {
            attack_start,
            attack_end,
            ..
        } = self.stage
        else {
            return;
        };

        self.hold(target, now);
        let decay_end = now + self.params.decay;
        target.ramp_to_value_at_time(self.curve, self.sustain_level(), decay_end);
        self.stage = Stage::Active {
            attack_start,
            attack_end,
            decay_end,
        };
    }

    /// Cancel pending automation and pin the target at its current value.
    fn hold(&self, target: &mut AudioParam, at: f64) -> f64 {
        let held = target.value_at(at);
        target.cancel_scheduled_values(at);
        target.set_value_at_time(held, at);
        held
    }

    /// Coordinate in which the curve is a straight line.
    fn position(&self, value: f64) -> f64 {
        match self.curve {
            RampKind::Linear => value,
            RampKind::Exponential => value.max(MIN_EXPONENTIAL_VALUE).ln(),
        }
    }
}
