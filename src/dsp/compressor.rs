//! Compressor — dynamics processing on the master bus.
//!
//! A feed-forward compressor with threshold, ratio, knee, attack, and release
//! matching the WebAudio DynamicsCompressorNode. With a high ratio and a
//! threshold just below 0 dB it acts as the output limiter.

use serde::{Deserialize, Serialize};

use crate::utils::{db_to_linear, linear_to_db};

/// Configuration for the compressor stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressorConfig {
    /// Threshold in dB.
    pub threshold: f64,
    /// Compression ratio.
    pub ratio: f64,
    /// Knee width in dB (0 = hard knee).
    pub knee: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,
    /// Makeup gain in dB.
    pub makeup_gain: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            ratio: 4.0,
            knee: 6.0,
            attack: 0.003,
            release: 0.25,
            makeup_gain: 0.0,
        }
    }
}

impl CompressorConfig {
    /// Brick-wall-ish settings for the master output bus.
    pub fn limiter() -> Self {
        Self {
            threshold: -1.0,
            ratio: 20.0,
            knee: 0.0,
            attack: 0.001,
            release: 0.1,
            makeup_gain: 0.0,
        }
    }
}

/// A mono dynamics compressor.
#[derive(Debug, Clone)]
pub struct Compressor {
    config: CompressorConfig,
    attack_coef: f64,
    release_coef: f64,
    envelope: f64, // current envelope level (linear)
}

impl Compressor {
    /// Create a compressor from a config, clamping every field into range.
    pub fn with_config(sample_rate: f64, config: CompressorConfig) -> Self {
        let config = CompressorConfig {
            threshold: config.threshold.clamp(-60.0, 0.0),
            ratio: config.ratio.clamp(1.0, 20.0),
            knee: config.knee.clamp(0.0, 40.0),
            attack: config.attack.clamp(0.0001, 1.0),
            release: config.release.clamp(0.001, 5.0),
            makeup_gain: config.makeup_gain,
        };
        Self {
            config,
            attack_coef: (-1.0 / (config.attack * sample_rate)).exp(),
            release_coef: (-1.0 / (config.release * sample_rate)).exp(),
            envelope: 0.0,
        }
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Gain change in dB for a given input level in dB.
    #[inline]
    fn compute_gain(&self, input_db: f64) -> f64 {
        let CompressorConfig {
            threshold,
            ratio,
            knee,
            ..
        } = self.config;
        let slope = 1.0 - 1.0 / ratio;

        if knee <= 0.0 {
            if input_db <= threshold {
                0.0
            } else {
                (threshold - input_db) * slope
            }
        } else {
            let half_knee = knee / 2.0;
            let knee_start = threshold - half_knee;
            let knee_end = threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold - input_db) * slope
            } else {
                // quadratic interpolation inside the knee
                let x = (input_db - knee_start) / knee;
                -x * x * slope * half_knee
            }
        }
    }

    /// Process a single sample.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let level = input.abs();
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let gain_db = self.compute_gain(linear_to_db(self.envelope)) + self.config.makeup_gain;
        input * db_to_linear(gain_db)
    }
}
