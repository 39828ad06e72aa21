//! Biquad filter — matches WebAudio BiquadFilterNode lowpass/highpass coefficients.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lowest cutoff the filter stage accepts, also the resting cutoff of the
/// filter envelope.
pub const MIN_CUTOFF_HZ: f64 = 20.0;
/// Audio-band ceiling. A disabled filter is pinned here.
pub const MAX_CUTOFF_HZ: f64 = 20000.0;
/// Resonance used while a filter mode is active (WebAudio's default Q).
pub const DEFAULT_Q: f64 = 1.0;

/// Filter type of a biquad node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
}

/// User-facing filter mode of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Filter envelope disabled, cutoff pinned at [`MAX_CUTOFF_HZ`].
    #[default]
    None,
    Lowpass,
    Highpass,
}

impl FilterMode {
    /// The biquad type this mode drives, if any.
    pub fn filter_type(self) -> Option<FilterType> {
        match self {
            FilterMode::None => None,
            FilterMode::Lowpass => Some(FilterType::Lowpass),
            FilterMode::Highpass => Some(FilterType::Highpass),
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FilterMode::None),
            "lowpass" => Ok(FilterMode::Lowpass),
            "highpass" => Ok(FilterMode::Highpass),
            other => Err(format!("unknown filter mode '{other}'")),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterMode::None => "none",
            FilterMode::Lowpass => "lowpass",
            FilterMode::Highpass => "highpass",
        };
        f.write_str(name)
    }
}

/// Clamp a cutoff frequency into the audio band.
pub fn clamp_cutoff(frequency: f64) -> f64 {
    if frequency.is_nan() {
        MAX_CUTOFF_HZ
    } else {
        frequency.clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ)
    }
}

/// A biquad IIR filter (2nd order).
///
/// Direct Form II Transposed. Coefficient formulas from the Audio EQ
/// Cookbook (Robert Bristow-Johnson). A `q` of zero or below turns the
/// filter into an identity stage.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        self.dirty = false;

        if self.q <= 0.0 {
            self.b0 = 1.0;
            self.b1 = 0.0;
            self.b2 = 0.0;
            self.a1 = 0.0;
            self.a2 = 0.0;
            return;
        }

        // stay below Nyquist, where the cookbook formulas fold over
        let frequency = self.frequency.clamp(1.0, self.sample_rate * 0.49);
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);

        let (b0, b1, b2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
        };
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn set_filter_type(&mut self, filter_type: FilterType) {
        if self.filter_type != filter_type {
            self.filter_type = filter_type;
            self.dirty = true;
        }
    }

    /// Set frequency and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        if self.frequency != freq {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set Q and mark coefficients dirty.
    pub fn set_q(&mut self, q: f64) {
        if self.q != q {
            self.q = q;
            self.dirty = true;
        }
    }
}
