//! Decision gating for per-window cry classification.
//!
//! One `ScoreSet` goes in per audio window, one `GatingOutcome` comes out.
//! The engine fuses the primary decision with verifier scores, requires
//! N-of-M persistence before confirming, and lets cat dominance veto a
//! confirmation unless baby dominance is itself sustained. The cooldown
//! controller then debounces confirmed events.

mod cooldown;
mod engine;
mod scores;

pub use cooldown::CooldownController;
pub use engine::GatingEngine;
pub use scores::ScoreSet;

use serde::{Deserialize, Serialize};

/// Final classification of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Nothing cry-like in this window
    None,
    /// Passed the fused thresholds but persistence not yet met
    Candidate,
    /// Persistence met; an event should be emitted (subject to cooldown)
    Confirmed,
    /// Vetoed by cat dominance or cooldown
    Suppressed,
}

/// Outcome of gating one window
///
/// Produced fresh per window and consumed immediately by the caller; the
/// engine keeps no outcome history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingOutcome {
    pub verdict: Verdict,
    /// Human-readable reason code ("persisted", "cat_dominant", "cooldown", ...)
    pub reason: String,
    /// The score set that triggered this outcome
    pub scores: ScoreSet,
}

impl GatingOutcome {
    pub fn new(verdict: Verdict, reason: impl Into<String>, scores: ScoreSet) -> Self {
        Self {
            verdict,
            reason: reason.into(),
            scores,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.verdict == Verdict::Confirmed
    }
}

/// Compact outcome view published through the state channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub window_id: u64,
    pub timestamp_ms: u64,
    pub verdict: Verdict,
    pub reason: String,
    pub primary_score: f64,
    pub baby_score: f64,
    pub cat_score: f64,
}

impl From<&GatingOutcome> for OutcomeSummary {
    fn from(outcome: &GatingOutcome) -> Self {
        Self {
            window_id: outcome.scores.window_id,
            timestamp_ms: outcome.scores.timestamp_ms,
            verdict: outcome.verdict,
            reason: outcome.reason.clone(),
            primary_score: outcome.scores.primary_score,
            baby_score: outcome.scores.baby_score,
            cat_score: outcome.scores.cat_score,
        }
    }
}
