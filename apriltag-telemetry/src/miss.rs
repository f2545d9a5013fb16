use serde::{Deserialize, Serialize};

/// Which frame outcomes count as a missed detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissPolicy {
    /// The counter is only ever reset.
    Never,
    /// Frames without any detection.
    Absent,
    /// Frames whose detection failed the quality gate or decomposition.
    Rejected,
    /// Both absent and rejected frames.
    #[default]
    AbsentOrRejected,
}

impl MissPolicy {
    pub fn counts_absent(&self) -> bool {
        matches!(self, MissPolicy::Absent | MissPolicy::AbsentOrRejected)
    }

    pub fn counts_rejected(&self) -> bool {
        matches!(self, MissPolicy::Rejected | MissPolicy::AbsentOrRejected)
    }
}

/// Number of consecutive frames without an accepted detection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MissTracker {
    count: u64,
}

impl MissTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_accepted(&mut self) {
        self.count = 0;
    }

    pub fn on_missed(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
