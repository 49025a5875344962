// ScoreSet: the per-window classifier output consumed by the gating engine.

use serde::{Deserialize, Serialize};

use crate::error::GatingError;

/// Scores produced for one audio window by the external model collaborators
///
/// Immutable once produced; the engine owns it only for the duration of one
/// evaluation. `primary_*` comes from the first-stage model, the class
/// scores from the verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    /// First-stage binary cry decision
    pub primary_decision: bool,
    /// First-stage cry score in [0,1]
    pub primary_score: f64,
    /// Verifier baby-cry class score in [0,1]
    pub baby_score: f64,
    /// Verifier cat class score in [0,1]
    pub cat_score: f64,
    /// Verifier score for other suppressing classes in [0,1]
    #[serde(default)]
    pub other_suppress_score: f64,
    pub window_id: u64,
    pub timestamp_ms: u64,
}

impl ScoreSet {
    /// Check that every score is finite and inside [0,1]
    pub fn validate(&self) -> Result<(), GatingError> {
        for (name, value) in [
            ("primary_score", self.primary_score),
            ("baby_score", self.baby_score),
            ("cat_score", self.cat_score),
            ("other_suppress_score", self.other_suppress_score),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(GatingError::Validation {
                    reason: format!("{}={} out of range [0,1]", name, value),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(baby: f64, cat: f64) -> ScoreSet {
        ScoreSet {
            primary_decision: false,
            primary_score: 0.5,
            baby_score: baby,
            cat_score: cat,
            other_suppress_score: 0.0,
            window_id: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_validate_accepts_boundaries() {
        assert!(scores(0.0, 1.0).validate().is_ok());
        assert!(scores(1.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let err = scores(1.3, 0.0).validate().unwrap_err();
        assert!(matches!(err, GatingError::Validation { .. }));
        assert!(scores(-0.1, 0.0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(scores(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_missing_other_suppress_score_defaults_to_zero() {
        let json = r#"{
            "primary_decision": true,
            "primary_score": 0.8,
            "baby_score": 0.7,
            "cat_score": 0.1,
            "window_id": 3,
            "timestamp_ms": 960
        }"#;
        let parsed: ScoreSet = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.other_suppress_score, 0.0);
        assert!(parsed.validate().is_ok());
    }
}
