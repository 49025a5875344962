//! Parameter store for the gating thresholds.
//!
//! Thresholds have a base layer (process defaults loaded at startup) and an
//! optional override layer written by an active calibration session. The
//! effective value of a parameter is the override when present, else the
//! base. Parameter names form a closed enum rather than free strings, so an
//! unknown name is a parse error at the command edge and match arms over
//! keys are exhaustiveness-checked.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calibration::Phase;
use crate::error::{CalibrationError, GatingError};

/// Named tunable parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamKey {
    PrimaryCryThreshold,
    CryThreshold,
    CatThreshold,
    CatWeight,
    MarginThreshold,
    NonCryWeight,
    ConfirmN,
    ConfirmM,
    AlertCooldownSeconds,
}

impl ParamKey {
    /// Canonical uppercase name used in commands and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::PrimaryCryThreshold => "PRIMARY_CRY_THRESHOLD",
            ParamKey::CryThreshold => "CRY_THRESHOLD",
            ParamKey::CatThreshold => "CAT_THRESHOLD",
            ParamKey::CatWeight => "CAT_WEIGHT",
            ParamKey::MarginThreshold => "MARGIN_THRESHOLD",
            ParamKey::NonCryWeight => "NON_CRY_WEIGHT",
            ParamKey::ConfirmN => "CONFIRM_N",
            ParamKey::ConfirmM => "CONFIRM_M",
            ParamKey::AlertCooldownSeconds => "ALERT_COOLDOWN_SECONDS",
        }
    }

    /// Whether this parameter carries an integer value
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ParamKey::ConfirmN | ParamKey::ConfirmM | ParamKey::AlertCooldownSeconds
        )
    }

    /// Parse a raw value string into a typed value for this key
    pub fn parse_value(&self, raw: &str) -> Result<ParamValue, CalibrationError> {
        let text = raw.trim();
        if self.is_integer() {
            let value: u64 = text.parse().map_err(|_| CalibrationError::InvalidValue {
                param: self.as_str().to_string(),
                reason: format!("'{}' is not a non-negative integer", text),
            })?;
            Ok(ParamValue::Int(value))
        } else {
            let value: f64 = text.parse().map_err(|_| CalibrationError::InvalidValue {
                param: self.as_str().to_string(),
                reason: format!("'{}' is not a number", text),
            })?;
            if !value.is_finite() {
                return Err(CalibrationError::InvalidValue {
                    param: self.as_str().to_string(),
                    reason: "value must be finite".to_string(),
                });
            }
            Ok(ParamValue::Float(value))
        }
    }
}

impl FromStr for ParamKey {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRIMARY_CRY_THRESHOLD" => Ok(ParamKey::PrimaryCryThreshold),
            "CRY_THRESHOLD" => Ok(ParamKey::CryThreshold),
            "CAT_THRESHOLD" => Ok(ParamKey::CatThreshold),
            "CAT_WEIGHT" => Ok(ParamKey::CatWeight),
            "MARGIN_THRESHOLD" => Ok(ParamKey::MarginThreshold),
            "NON_CRY_WEIGHT" => Ok(ParamKey::NonCryWeight),
            "CONFIRM_N" => Ok(ParamKey::ConfirmN),
            "CONFIRM_M" => Ok(ParamKey::ConfirmM),
            "ALERT_COOLDOWN_SECONDS" => Ok(ParamKey::AlertCooldownSeconds),
            other => Err(CalibrationError::InvalidValue {
                param: other.to_string(),
                reason: "unknown parameter name".to_string(),
            }),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed parameter value
///
/// Integers and floats are kept apart so CONFIRM_N cannot silently become
/// 2.5. Serialized untagged: integer keys round-trip as JSON integers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(u64),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// The fully resolved parameter set the gating engine runs with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParams {
    /// First-stage model score threshold
    pub primary_cry_threshold: f64,
    /// Verifier baby-class score threshold
    pub cry_threshold: f64,
    /// Cat-class score above which a window is cat-dominant
    pub cat_threshold: f64,
    /// Weight of the cat score in the margin computation
    pub cat_weight: f64,
    /// Minimum margin for a verifier candidate
    pub margin_threshold: f64,
    /// Weight of the other-suppressing score in the margin computation
    pub non_cry_weight: f64,
    /// Candidates required out of the last confirm_m windows
    pub confirm_n: usize,
    /// Persistence window length
    pub confirm_m: usize,
    /// Minimum quiet interval between two confirmations
    pub alert_cooldown_seconds: u64,
}

impl Default for EffectiveParams {
    fn default() -> Self {
        Self {
            primary_cry_threshold: 0.5,
            cry_threshold: 0.45,
            cat_threshold: 0.45,
            cat_weight: 1.0,
            margin_threshold: 0.15,
            non_cry_weight: 1.0,
            confirm_n: 3,
            confirm_m: 5,
            alert_cooldown_seconds: 60,
        }
    }
}

impl EffectiveParams {
    /// Validate internal consistency
    ///
    /// Score-domain thresholds must lie in [0,1]; the weights and the margin
    /// threshold are unconstrained reals. CONFIRM_N > CONFIRM_M is rejected
    /// here rather than clamped, at load time and again whenever an override
    /// would change the persistence window.
    pub fn validate(&self) -> Result<(), GatingError> {
        for (name, value) in [
            ("PRIMARY_CRY_THRESHOLD", self.primary_cry_threshold),
            ("CRY_THRESHOLD", self.cry_threshold),
            ("CAT_THRESHOLD", self.cat_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(GatingError::Configuration {
                    reason: format!("{}={} out of range [0,1]", name, value),
                });
            }
        }
        for (name, value) in [
            ("CAT_WEIGHT", self.cat_weight),
            ("MARGIN_THRESHOLD", self.margin_threshold),
            ("NON_CRY_WEIGHT", self.non_cry_weight),
        ] {
            if !value.is_finite() {
                return Err(GatingError::Configuration {
                    reason: format!("{}={} is not finite", name, value),
                });
            }
        }
        if self.confirm_n == 0 || self.confirm_m == 0 {
            return Err(GatingError::Configuration {
                reason: format!(
                    "CONFIRM_N={} and CONFIRM_M={} must both be at least 1",
                    self.confirm_n, self.confirm_m
                ),
            });
        }
        if self.confirm_n > self.confirm_m {
            return Err(GatingError::Configuration {
                reason: format!(
                    "CONFIRM_N={} exceeds CONFIRM_M={}",
                    self.confirm_n, self.confirm_m
                ),
            });
        }
        Ok(())
    }

    /// Read one parameter as a typed value
    pub fn get(&self, key: ParamKey) -> ParamValue {
        match key {
            ParamKey::PrimaryCryThreshold => ParamValue::Float(self.primary_cry_threshold),
            ParamKey::CryThreshold => ParamValue::Float(self.cry_threshold),
            ParamKey::CatThreshold => ParamValue::Float(self.cat_threshold),
            ParamKey::CatWeight => ParamValue::Float(self.cat_weight),
            ParamKey::MarginThreshold => ParamValue::Float(self.margin_threshold),
            ParamKey::NonCryWeight => ParamValue::Float(self.non_cry_weight),
            ParamKey::ConfirmN => ParamValue::Int(self.confirm_n as u64),
            ParamKey::ConfirmM => ParamValue::Int(self.confirm_m as u64),
            ParamKey::AlertCooldownSeconds => ParamValue::Int(self.alert_cooldown_seconds),
        }
    }

    /// Write one parameter from a typed value
    ///
    /// Type mismatches are rejected; range consistency is checked by the
    /// caller via [`EffectiveParams::validate`] on the resulting set.
    pub fn set(&mut self, key: ParamKey, value: ParamValue) -> Result<(), CalibrationError> {
        let type_mismatch = || CalibrationError::InvalidValue {
            param: key.as_str().to_string(),
            reason: if key.is_integer() {
                "expected an integer".to_string()
            } else {
                "expected a number".to_string()
            },
        };

        match (key, value) {
            (ParamKey::PrimaryCryThreshold, ParamValue::Float(v)) => {
                self.primary_cry_threshold = v
            }
            (ParamKey::CryThreshold, ParamValue::Float(v)) => self.cry_threshold = v,
            (ParamKey::CatThreshold, ParamValue::Float(v)) => self.cat_threshold = v,
            (ParamKey::CatWeight, ParamValue::Float(v)) => self.cat_weight = v,
            (ParamKey::MarginThreshold, ParamValue::Float(v)) => self.margin_threshold = v,
            (ParamKey::NonCryWeight, ParamValue::Float(v)) => self.non_cry_weight = v,
            (ParamKey::ConfirmN, ParamValue::Int(v)) => self.confirm_n = v as usize,
            (ParamKey::ConfirmM, ParamValue::Int(v)) => self.confirm_m = v as usize,
            (ParamKey::AlertCooldownSeconds, ParamValue::Int(v)) => {
                self.alert_cooldown_seconds = v
            }
            _ => return Err(type_mismatch()),
        }
        Ok(())
    }

    /// Resolve this base layer against an override map
    ///
    /// Override entries that fail to apply (type mismatch from a hand-edited
    /// snapshot) are skipped; consistency of the result is the caller's
    /// concern.
    pub fn with_overrides(&self, overrides: &BTreeMap<ParamKey, ParamValue>) -> EffectiveParams {
        let mut effective = self.clone();
        for (key, value) in overrides {
            let _ = effective.set(*key, *value);
        }
        effective
    }
}

/// Base parameters plus the calibration override layer
///
/// Owned by the calibration manager in the command process. The audio
/// process never mutates overrides directly; it adopts them from the state
/// channel and resolves against its own base.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    base: EffectiveParams,
    overrides: BTreeMap<ParamKey, ParamValue>,
}

impl ParameterStore {
    /// Create a store from a validated base layer
    pub fn new(base: EffectiveParams) -> Result<Self, GatingError> {
        base.validate()?;
        Ok(Self {
            base,
            overrides: BTreeMap::new(),
        })
    }

    pub fn base(&self) -> &EffectiveParams {
        &self.base
    }

    pub fn overrides(&self) -> &BTreeMap<ParamKey, ParamValue> {
        &self.overrides
    }

    /// Effective value = override if present else base
    pub fn effective(&self) -> EffectiveParams {
        self.base.with_overrides(&self.overrides)
    }

    /// Install an override, validating phase ownership and the resulting set
    ///
    /// Rejection leaves the store untouched, so the engine keeps its prior
    /// valid configuration.
    pub fn set_override(
        &mut self,
        phase: Phase,
        key: ParamKey,
        value: ParamValue,
    ) -> Result<(), CalibrationError> {
        if !phase.owns(key) {
            return Err(CalibrationError::OutOfScopeParameter {
                param: key.as_str().to_string(),
                phase: phase.as_str().to_string(),
                allowed: phase.allowed_names().join(", "),
            });
        }

        let mut candidate = self.effective();
        candidate.set(key, value)?;
        candidate
            .validate()
            .map_err(|err| CalibrationError::Configuration {
                reason: match err {
                    GatingError::Configuration { reason } | GatingError::Validation { reason } => {
                        reason
                    }
                },
            })?;

        self.overrides.insert(key, value);
        Ok(())
    }

    /// Drop the whole override layer, restoring base values exactly
    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Replace the override layer wholesale (snapshot recovery path)
    ///
    /// Entries outside the phase's allowed set are dropped rather than
    /// rejected, mirroring tolerant snapshot reads.
    pub fn restore_overrides(&mut self, phase: Phase, raw: &BTreeMap<ParamKey, ParamValue>) {
        self.overrides = raw
            .iter()
            .filter(|(key, _)| phase.owns(**key))
            .map(|(key, value)| (*key, *value))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_key_round_trip_names() {
        for key in [
            ParamKey::PrimaryCryThreshold,
            ParamKey::CryThreshold,
            ParamKey::CatThreshold,
            ParamKey::CatWeight,
            ParamKey::MarginThreshold,
            ParamKey::NonCryWeight,
            ParamKey::ConfirmN,
            ParamKey::ConfirmM,
            ParamKey::AlertCooldownSeconds,
        ] {
            assert_eq!(key.as_str().parse::<ParamKey>().unwrap(), key);
        }
    }

    #[test]
    fn test_param_key_parse_is_case_insensitive() {
        assert_eq!(
            "confirm_n".parse::<ParamKey>().unwrap(),
            ParamKey::ConfirmN
        );
    }

    #[test]
    fn test_param_key_unknown_name_rejected() {
        assert!("WINDOW_SECONDS".parse::<ParamKey>().is_err());
    }

    #[test]
    fn test_parse_value_types() {
        assert_eq!(
            ParamKey::ConfirmN.parse_value("4").unwrap(),
            ParamValue::Int(4)
        );
        assert_eq!(
            ParamKey::CryThreshold.parse_value("0.6").unwrap(),
            ParamValue::Float(0.6)
        );
        assert!(ParamKey::ConfirmN.parse_value("2.5").is_err());
        assert!(ParamKey::ConfirmN.parse_value("-1").is_err());
        assert!(ParamKey::CryThreshold.parse_value("high").is_err());
        assert!(ParamKey::CatWeight.parse_value("inf").is_err());
    }

    #[test]
    fn test_validate_rejects_confirm_n_above_m() {
        let params = EffectiveParams {
            confirm_n: 6,
            confirm_m: 5,
            ..EffectiveParams::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(err, GatingError::Configuration { .. }));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let params = EffectiveParams {
            cry_threshold: 1.2,
            ..EffectiveParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_allows_unconstrained_weights() {
        let params = EffectiveParams {
            cat_weight: 2.5,
            margin_threshold: -0.1,
            ..EffectiveParams::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_effective_prefers_override() {
        let mut store = ParameterStore::new(EffectiveParams::default()).unwrap();
        store
            .set_override(
                Phase::Phase1,
                ParamKey::PrimaryCryThreshold,
                ParamValue::Float(0.7),
            )
            .unwrap();

        assert_eq!(store.effective().primary_cry_threshold, 0.7);
        assert_eq!(store.base().primary_cry_threshold, 0.5);
    }

    #[test]
    fn test_clear_overrides_restores_base_exactly() {
        let base = EffectiveParams::default();
        let mut store = ParameterStore::new(base.clone()).unwrap();
        store
            .set_override(Phase::Phase1, ParamKey::ConfirmN, ParamValue::Int(4))
            .unwrap();
        store.clear_overrides();

        assert_eq!(store.effective(), base);
        assert!(store.overrides().is_empty());
    }

    #[test]
    fn test_set_override_wrong_phase_rejected() {
        let mut store = ParameterStore::new(EffectiveParams::default()).unwrap();
        let err = store
            .set_override(
                Phase::Phase1,
                ParamKey::CryThreshold,
                ParamValue::Float(0.5),
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::OutOfScopeParameter { .. }));
        assert!(store.overrides().is_empty());
    }

    #[test]
    fn test_set_override_inconsistent_persistence_rejected() {
        let mut store = ParameterStore::new(EffectiveParams::default()).unwrap();
        // CONFIRM_M defaults to 5, so CONFIRM_N=6 would be inconsistent.
        let err = store
            .set_override(Phase::Phase1, ParamKey::ConfirmN, ParamValue::Int(6))
            .unwrap_err();
        assert!(matches!(err, CalibrationError::Configuration { .. }));
        assert!(store.overrides().is_empty());
        assert_eq!(store.effective().confirm_n, 3);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut params = EffectiveParams::default();
        assert!(params.set(ParamKey::ConfirmN, ParamValue::Float(2.5)).is_err());
        assert!(params
            .set(ParamKey::CryThreshold, ParamValue::Int(1))
            .is_err());
    }

    #[test]
    fn test_param_key_serde_uses_uppercase_names() {
        let json = serde_json::to_string(&ParamKey::ConfirmN).unwrap();
        assert_eq!(json, "\"CONFIRM_N\"");
        let mut map = BTreeMap::new();
        map.insert(ParamKey::AlertCooldownSeconds, ParamValue::Int(30));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, "{\"ALERT_COOLDOWN_SECONDS\":30}");
        let back: BTreeMap<ParamKey, ParamValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
