use serde::{Deserialize, Serialize};

use crate::RawDetection;

/// Rule choosing the single detection used for telemetry in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// The first detection reported by the detector.
    #[default]
    First,
    /// The detection with the largest decision margin.
    BestDecisionMargin,
    /// The detection with the smallest distance to the camera.
    Nearest,
}

impl SelectionStrategy {
    /// Pick one of `detections`, or `None` if there are none.
    ///
    /// Ties are resolved in favor of the earlier detection.
    pub fn select<'a>(&self, detections: &'a [RawDetection]) -> Option<&'a RawDetection> {
        match self {
            SelectionStrategy::First => detections.first(),
            SelectionStrategy::BestDecisionMargin => detections.iter().reduce(|best, d| {
                if d.decision_margin > best.decision_margin {
                    d
                } else {
                    best
                }
            }),
            SelectionStrategy::Nearest => detections.iter().reduce(|best, d| {
                // NaN distances never win.
                if d.translation.norm() < best.translation.norm() || best.translation.norm().is_nan()
                {
                    d
                } else {
                    best
                }
            }),
        }
    }
}
