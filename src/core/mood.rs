//! Coarse mood classification from the latest inter-fix distance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the companion feels about the most recent movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    /// Moving fast
    Excited,
    /// Walking
    Content,
    /// Stationary, or no movement measured yet
    #[default]
    Calm,
}

impl Mood {
    /// Classify a single inter-fix distance.
    ///
    /// Depends on `distance_m` alone, never on history.
    pub fn classify(distance_m: f64, thresholds: &MoodThresholds) -> Self {
        if distance_m > thresholds.content_max_m {
            Mood::Excited
        } else if distance_m > thresholds.calm_max_m {
            Mood::Content
        } else {
            Mood::Calm
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mood::Excited => "excited",
            Mood::Content => "content",
            Mood::Calm => "calm",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Distance bounds between mood buckets, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodThresholds {
    /// Distances up to and including this are `Calm`
    pub calm_max_m: f64,
    /// Distances up to and including this (and above `calm_max_m`) are `Content`
    pub content_max_m: f64,
}

impl Default for MoodThresholds {
    fn default() -> Self {
        Self {
            calm_max_m: 10.0,
            content_max_m: 50.0,
        }
    }
}
