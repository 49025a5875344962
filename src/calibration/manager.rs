// CalibrationManager: the live-tuning session state machine.
//
// States: IDLE, ACTIVE(phase1), ACTIVE(phase2). The manager owns the
// parameter override layer and the session; it runs in the command process
// and publishes its state through the state channel for the audio loop to
// adopt. While IDLE the override layer is always empty, so no stale
// overrides can leak across sessions.

use std::collections::BTreeMap;

use log::info;

use crate::calibration::{clamp_interval, CalibrationSession, Phase};
use crate::channel::ControlSnapshot;
use crate::error::{log_calibration_error, CalibrationError, GatingError};
use crate::params::{EffectiveParams, ParamKey, ParamValue, ParameterStore};

/// Side-effect-free view of the manager, used for command replies
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSnapshot {
    pub active: bool,
    pub phase: Option<Phase>,
    pub interval_sec: Option<u64>,
    pub watch_active: bool,
    pub overrides: BTreeMap<ParamKey, ParamValue>,
    pub effective: EffectiveParams,
}

pub struct CalibrationManager {
    store: ParameterStore,
    session: Option<CalibrationSession>,
}

impl CalibrationManager {
    /// Create an idle manager over a validated base parameter set
    pub fn new(base: EffectiveParams) -> Result<Self, GatingError> {
        Ok(Self {
            store: ParameterStore::new(base)?,
            session: None,
        })
    }

    /// Recreate a manager from a persisted control snapshot
    ///
    /// Called at command-process startup so a restart resumes an active
    /// session instead of silently leaving the audio loop suppressed.
    /// Overrides outside the recovered phase's allowed set are dropped.
    pub fn restore(
        base: EffectiveParams,
        control: &ControlSnapshot,
    ) -> Result<Self, GatingError> {
        let mut manager = Self::new(base)?;
        if control.active {
            manager.session = Some(CalibrationSession {
                phase: control.phase,
                started_at_ms: control.started_at_ms.unwrap_or(control.updated_at_ms),
                interval_sec: clamp_interval(Some(control.interval_sec)),
                watch_active: control.watch_active,
            });
            manager
                .store
                .restore_overrides(control.phase, &control.overrides);
            info!(
                "restored active calibration session: phase={} overrides={}",
                control.phase,
                control.overrides.len()
            );
        }
        Ok(manager)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// While a session is active, confirmed events must not reach the
    /// notifier regardless of the gating outcome.
    pub fn alerts_suppressed(&self) -> bool {
        self.is_active()
    }

    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    pub fn effective(&self) -> EffectiveParams {
        self.store.effective()
    }

    /// Start a session; an already-active session is replaced outright
    ///
    /// Replacing clears the previous session's overrides, so parameters
    /// revert to base before the new phase begins tuning.
    pub fn start(
        &mut self,
        phase: Phase,
        interval: Option<u64>,
        now_ms: u64,
    ) -> CalibrationSnapshot {
        if let Some(prior) = &self.session {
            info!(
                "replacing active calibration session ({} -> {})",
                prior.phase, phase
            );
        }
        self.store.clear_overrides();
        self.session = Some(CalibrationSession::new(phase, interval, now_ms));
        self.status()
    }

    /// Install a parameter override for the active phase
    pub fn set(
        &mut self,
        param: &str,
        raw_value: &str,
    ) -> Result<(ParamKey, ParamValue), CalibrationError> {
        let session = self.session.as_ref().ok_or(CalibrationError::NotActive)?;
        let phase = session.phase;

        let key: ParamKey = param.parse().inspect_err(|err| {
            log_calibration_error(err, "set");
        })?;
        let value = key.parse_value(raw_value).inspect_err(|err| {
            log_calibration_error(err, "set");
        })?;

        self.store
            .set_override(phase, key, value)
            .inspect_err(|err| {
                log_calibration_error(err, "set");
            })?;
        info!("calibration override: {}={} ({})", key, value, phase);
        Ok((key, value))
    }

    /// Current state, effective parameters included; no side effects
    pub fn status(&self) -> CalibrationSnapshot {
        CalibrationSnapshot {
            active: self.session.is_some(),
            phase: self.session.as_ref().map(|s| s.phase),
            interval_sec: self.session.as_ref().map(|s| s.interval_sec),
            watch_active: self.session.as_ref().map(|s| s.watch_active).unwrap_or(false),
            overrides: self.store.overrides().clone(),
            effective: self.store.effective(),
        }
    }

    /// Enable periodic snapshot streaming; returns the streaming interval
    pub fn watch(&mut self, interval: Option<u64>) -> Result<u64, CalibrationError> {
        let session = self.session.as_mut().ok_or(CalibrationError::NotActive)?;
        if let Some(requested) = interval {
            session.interval_sec = clamp_interval(Some(requested));
        }
        session.watch_active = true;
        Ok(session.interval_sec)
    }

    /// Disable streaming; idempotent, legal in any state
    ///
    /// Returns whether a watch was actually active, so the caller can word
    /// its reply; calling twice leaves state identical to calling once.
    pub fn watch_stop(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) if session.watch_active => {
                session.watch_active = false;
                true
            }
            _ => false,
        }
    }

    /// Stop the session and discard the override layer
    ///
    /// Returns the final snapshot (as it was at stop time) so the caller can
    /// echo the applied overrides back for auditability. Parameters revert
    /// fully to the base values loaded at process start.
    pub fn stop(&mut self) -> Result<CalibrationSnapshot, CalibrationError> {
        if self.session.is_none() {
            return Err(CalibrationError::NotActive);
        }
        let final_snapshot = self.status();
        self.session = None;
        self.store.clear_overrides();
        info!(
            "calibration stopped; {} override(s) discarded, defaults restored",
            final_snapshot.overrides.len()
        );
        Ok(final_snapshot)
    }

    /// The control snapshot to publish after any mutation
    pub fn control_snapshot(&self, now_ms: u64) -> ControlSnapshot {
        match &self.session {
            Some(session) => ControlSnapshot {
                active: true,
                phase: session.phase,
                interval_sec: session.interval_sec,
                watch_active: session.watch_active,
                started_at_ms: Some(session.started_at_ms),
                overrides: self.store.overrides().clone(),
                updated_at_ms: now_ms,
            },
            None => ControlSnapshot::inactive(now_ms),
        }
    }
}
