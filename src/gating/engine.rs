// GatingEngine: per-window score fusion with N-of-M persistence and
// cat-dominance suppression.
//
// Called exactly once per window, in arrival order, from a single thread.
// Past windows are never re-evaluated. Parameters can be swapped between
// windows (live calibration); the candidate history survives a resize by
// keeping its newest tail.

use std::collections::VecDeque;

use log::debug;

use crate::error::{log_gating_error, GatingError};
use crate::gating::{GatingOutcome, ScoreSet, Verdict};
use crate::params::EffectiveParams;

pub struct GatingEngine {
    params: EffectiveParams,
    /// Last CONFIRM_M raw candidate flags, oldest first
    history: VecDeque<bool>,
    /// Last `sustain_windows` margin values, for the sustained-dominance check
    margin_trail: VecDeque<f64>,
    sustain_windows: usize,
}

impl GatingEngine {
    /// Create an engine from a validated parameter set
    ///
    /// `sustain_windows` is the trailing-margin window length used to decide
    /// whether baby dominance is sustained enough to override cat
    /// suppression.
    pub fn new(params: EffectiveParams, sustain_windows: usize) -> Result<Self, GatingError> {
        params.validate()?;
        Ok(Self {
            params,
            history: VecDeque::new(),
            margin_trail: VecDeque::new(),
            sustain_windows: sustain_windows.max(1),
        })
    }

    pub fn params(&self) -> &EffectiveParams {
        &self.params
    }

    /// Number of candidate flags currently buffered (test hook)
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Swap in a new parameter set between windows
    ///
    /// Rejection leaves the engine on its prior valid configuration. A
    /// shrunken CONFIRM_M keeps the newest flags.
    pub fn apply_params(&mut self, params: EffectiveParams) -> Result<(), GatingError> {
        params.validate()?;
        while self.history.len() > params.confirm_m {
            self.history.pop_front();
        }
        self.params = params;
        Ok(())
    }

    /// Evaluate one window
    ///
    /// A malformed score set degrades to a `None` outcome with a diagnostic
    /// reason and does not disturb the candidate history.
    pub fn evaluate(&mut self, scores: &ScoreSet) -> GatingOutcome {
        if let Err(err) = scores.validate() {
            log_gating_error(&err, "evaluate");
            let reason = match &err {
                GatingError::Validation { reason } => format!("invalid_scores: {}", reason),
                GatingError::Configuration { reason } => format!("invalid_config: {}", reason),
            };
            return GatingOutcome::new(Verdict::None, reason, scores.clone());
        }

        let p = &self.params;
        let is_primary_candidate =
            scores.primary_decision || scores.primary_score >= p.primary_cry_threshold;
        let margin = scores.baby_score
            - p.cat_weight * scores.cat_score
            - p.non_cry_weight * scores.other_suppress_score;
        let is_verifier_candidate =
            scores.baby_score >= p.cry_threshold && margin >= p.margin_threshold;
        let raw_candidate = is_primary_candidate && is_verifier_candidate;

        push_capped(&mut self.history, raw_candidate, p.confirm_m);
        push_capped(&mut self.margin_trail, margin, self.sustain_windows);

        let persisted = self.history.iter().filter(|flag| **flag).count() >= p.confirm_n;
        let cat_dominant = scores.cat_score >= p.cat_threshold;
        let sustained_margin = self.margin_trail.len() == self.sustain_windows
            && self
                .margin_trail
                .iter()
                .all(|margin| *margin >= p.margin_threshold);

        debug!(
            "window {}: margin={:.3} candidate={} persisted={} cat_dominant={} sustained={}",
            scores.window_id, margin, raw_candidate, persisted, cat_dominant, sustained_margin
        );

        // Suppression takes precedence over confirmation: a cat-dominant
        // window vetoes even a persisted confirmation unless baby dominance
        // held across the whole margin trail.
        let (verdict, reason) = if cat_dominant && !(persisted && sustained_margin) {
            (Verdict::Suppressed, "cat_dominant")
        } else if persisted {
            if cat_dominant {
                (Verdict::Confirmed, "sustained_margin_override")
            } else {
                (Verdict::Confirmed, "persisted")
            }
        } else if raw_candidate {
            (Verdict::Candidate, "candidate")
        } else {
            (Verdict::None, "below_thresholds")
        };

        GatingOutcome::new(verdict, reason, scores.clone())
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, value: T, cap: usize) {
    buffer.push_back(value);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}
