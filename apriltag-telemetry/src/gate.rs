use serde::{Deserialize, Serialize};

/// Default maximum number of corrected bit errors for an accepted detection.
pub const DEFAULT_MAX_HAMMING: i32 = 0;

/// Default decision margin which an accepted detection must exceed.
///
/// See https://docs.photonvision.org/en/latest/docs/apriltag-pipelines/ for
/// tuning guidance.
pub const DEFAULT_MIN_DECISION_MARGIN: f32 = 30.0;

fn default_max_hamming() -> i32 {
    DEFAULT_MAX_HAMMING
}

fn default_min_decision_margin() -> f32 {
    DEFAULT_MIN_DECISION_MARGIN
}

/// Accept or reject a detection based on its signal quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityGate {
    /// Largest accepted hamming error. Defaults to [DEFAULT_MAX_HAMMING].
    #[serde(default = "default_max_hamming")]
    pub max_hamming: i32,
    /// The decision margin must be strictly greater than this. Defaults to
    /// [DEFAULT_MIN_DECISION_MARGIN].
    #[serde(default = "default_min_decision_margin")]
    pub min_decision_margin: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            max_hamming: DEFAULT_MAX_HAMMING,
            min_decision_margin: DEFAULT_MIN_DECISION_MARGIN,
        }
    }
}

impl QualityGate {
    pub fn accepts(&self, hamming: i32, decision_margin: f32) -> bool {
        (0..=self.max_hamming).contains(&hamming)
            && decision_margin.is_finite()
            && decision_margin > self.min_decision_margin
    }
}
