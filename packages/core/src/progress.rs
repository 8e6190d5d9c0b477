//! Reported completion of a running job.

use serde::{Deserialize, Serialize};

/// Completion of a job, either a fraction in `[0, 1]` or unknown.
///
/// Serialized as a plain number, with `-1` standing for indeterminate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "f64", from = "f64")]
pub enum Progress {
    /// The task has not reported a measurable amount of work.
    #[default]
    Indeterminate,
    /// Fraction of work done, clamped to `[0, 1]`.
    Fraction(f64),
}

impl Progress {
    /// Wire value for an indeterminate progress.
    pub const INDETERMINATE: f64 = -1.0;

    /// Build a progress value, clamping into range. NaN is indeterminate.
    pub fn fraction(value: f64) -> Self {
        if value.is_nan() {
            Progress::Indeterminate
        } else {
            Progress::Fraction(value.clamp(0.0, 1.0))
        }
    }

    /// Progress from processed/total counts. A zero total is indeterminate.
    pub fn from_counts(processed: u64, total: u64) -> Self {
        if total == 0 {
            Progress::Indeterminate
        } else {
            Self::fraction(processed as f64 / total as f64)
        }
    }

    /// The fraction, or `None` when indeterminate.
    pub fn as_fraction(&self) -> Option<f64> {
        match self {
            Progress::Indeterminate => None,
            Progress::Fraction(value) => Some(*value),
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Progress::Indeterminate)
    }
}

impl From<Progress> for f64 {
    fn from(progress: Progress) -> Self {
        progress.as_fraction().unwrap_or(Progress::INDETERMINATE)
    }
}

impl From<f64> for Progress {
    fn from(value: f64) -> Self {
        if value < 0.0 {
            Progress::Indeterminate
        } else {
            Progress::fraction(value)
        }
    }
}
