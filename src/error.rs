use std::fmt;

/// Errors surfaced by the synth core.
///
/// Out-of-range parameters are clamped and missing voices are ignored, so the
/// only runtime condition reported here is a host that is not running.
#[derive(Debug)]
pub enum SynthError {
    /// The audio graph host is suspended or not yet resumed.
    NotReady,
    /// A config document failed to parse.
    InvalidConfig(serde_json::Error),
    /// A voice id string that does not name any voice.
    InvalidVoiceId(String),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::NotReady => write!(f, "Audio engine is not running; resume it first"),
            SynthError::InvalidConfig(e) => write!(f, "Invalid synth config: {e}"),
            SynthError::InvalidVoiceId(id) => write!(f, "Invalid voice id '{id}'"),
        }
    }
}

impl std::error::Error for SynthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SynthError::InvalidConfig(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SynthError {
    fn from(e: serde_json::Error) -> Self {
        SynthError::InvalidConfig(e)
    }
}
