//! Cross-process state channel.
//!
//! The audio-processing loop and the command process do not share memory;
//! they coordinate through two whole-document JSON snapshot files under the
//! artifact directory. `calibration_control.json` is written by the command
//! process (session + overrides) and polled by the audio loop once per
//! window; `monitor_status.json` is written by the audio loop after every
//! evaluation and read by the command process for status queries.
//!
//! Consistency is deliberately eventual: last writer wins at whole-snapshot
//! granularity, writes go through a temp file + rename so a reader never
//! sees a half-written document, and a torn or absent snapshot is "unknown,
//! retry" rather than an error the caller must handle specially. A stale
//! read is preferable to coupling the two processes synchronously.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::calibration::Phase;
use crate::error::ChannelError;
use crate::gating::OutcomeSummary;
use crate::params::{EffectiveParams, ParamKey, ParamValue};

const CONTROL_FILE: &str = "calibration_control.json";
const STATUS_FILE: &str = "monitor_status.json";

/// Calibration control snapshot, owned by the command process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub active: bool,
    pub phase: Phase,
    pub interval_sec: u64,
    pub watch_active: bool,
    pub started_at_ms: Option<u64>,
    #[serde(default)]
    pub overrides: BTreeMap<ParamKey, ParamValue>,
    pub updated_at_ms: u64,
}

impl ControlSnapshot {
    /// The snapshot written when no calibration has ever run
    pub fn inactive(now_ms: u64) -> Self {
        Self {
            active: false,
            phase: Phase::Phase1,
            interval_sec: crate::calibration::DEFAULT_CALIBRATION_INTERVAL_SECONDS,
            watch_active: false,
            started_at_ms: None,
            overrides: BTreeMap::new(),
            updated_at_ms: now_ms,
        }
    }
}

/// Live monitor status snapshot, owned by the audio-processing loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub updated_at_ms: u64,
    pub calibration_active: bool,
    pub phase: Option<Phase>,
    /// What kept the last confirmed window from alerting: "none",
    /// "cooldown", "cat", or "calibration"
    pub alert_blocked_by: String,
    pub outcome: Option<OutcomeSummary>,
    pub effective_params: EffectiveParams,
}

/// File-backed snapshot channel
#[derive(Debug, Clone)]
pub struct StateChannel {
    dir: PathBuf,
}

impl StateChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn control_path(&self) -> PathBuf {
        self.dir.join(CONTROL_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn publish_control(&self, snapshot: &ControlSnapshot) -> Result<(), ChannelError> {
        self.write_snapshot(&self.control_path(), snapshot)
    }

    pub fn read_control(&self) -> Result<Option<ControlSnapshot>, ChannelError> {
        self.read_snapshot(&self.control_path())
    }

    pub fn publish_status(&self, snapshot: &StatusSnapshot) -> Result<(), ChannelError> {
        self.write_snapshot(&self.status_path(), snapshot)
    }

    pub fn read_status(&self) -> Result<Option<StatusSnapshot>, ChannelError> {
        self.read_snapshot(&self.status_path())
    }

    fn write_snapshot<T: Serialize>(&self, path: &Path, snapshot: &T) -> Result<(), ChannelError> {
        fs::create_dir_all(&self.dir).map_err(|err| ChannelError::Unavailable {
            reason: format!("create {}: {}", self.dir.display(), err),
        })?;

        let payload =
            serde_json::to_vec_pretty(snapshot).map_err(|err| ChannelError::Unavailable {
                reason: format!("serialize snapshot: {}", err),
            })?;

        // Write-then-rename keeps the visible document whole; a reader sees
        // either the previous snapshot or this one, never a prefix.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &payload).map_err(|err| ChannelError::Unavailable {
            reason: format!("write {}: {}", tmp.display(), err),
        })?;
        fs::rename(&tmp, path).map_err(|err| ChannelError::Unavailable {
            reason: format!("rename {}: {}", path.display(), err),
        })?;
        Ok(())
    }

    fn read_snapshot<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, ChannelError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ChannelError::Unavailable {
                    reason: format!("read {}: {}", path.display(), err),
                })
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| ChannelError::Unavailable {
                reason: format!("parse {}: {}", path.display(), err),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::Verdict;

    fn status(now_ms: u64) -> StatusSnapshot {
        StatusSnapshot {
            updated_at_ms: now_ms,
            calibration_active: false,
            phase: None,
            alert_blocked_by: "none".to_string(),
            outcome: Some(OutcomeSummary {
                window_id: 7,
                timestamp_ms: now_ms,
                verdict: Verdict::Candidate,
                reason: "candidate".to_string(),
                primary_score: 0.6,
                baby_score: 0.5,
                cat_score: 0.1,
            }),
            effective_params: EffectiveParams::default(),
        }
    }

    #[test]
    fn test_absent_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        assert_eq!(channel.read_control().unwrap(), None);
        assert_eq!(channel.read_status().unwrap(), None);
    }

    #[test]
    fn test_control_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());

        let mut snapshot = ControlSnapshot::inactive(100);
        snapshot.active = true;
        snapshot.phase = Phase::Phase2;
        snapshot
            .overrides
            .insert(ParamKey::CatWeight, ParamValue::Float(1.5));

        channel.publish_control(&snapshot).unwrap();
        let back = channel.read_control().unwrap().unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        let snapshot = status(5_000);
        channel.publish_status(&snapshot).unwrap();
        assert_eq!(channel.read_status().unwrap().unwrap(), snapshot);
    }

    #[test]
    fn test_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        channel.publish_status(&status(1)).unwrap();
        channel.publish_status(&status(2)).unwrap();
        assert_eq!(channel.read_status().unwrap().unwrap().updated_at_ms, 2);
    }

    #[test]
    fn test_torn_snapshot_is_unavailable_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(channel.status_path(), "{\"updated_at_ms\": 1, ").unwrap();

        let err = channel.read_status().unwrap_err();
        assert!(matches!(err, ChannelError::Unavailable { .. }));
    }

    #[test]
    fn test_publish_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("artifacts").join("monitor");
        let channel = StateChannel::new(&nested);
        channel.publish_control(&ControlSnapshot::inactive(0)).unwrap();
        assert!(channel.read_control().unwrap().is_some());
    }
}
