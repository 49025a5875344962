//! Per-window monitor pipeline.
//!
//! The audio process runs this service single-threaded: each window is taken
//! to completion before the next one starts. Per window the service adopts
//! the latest calibration control from the state channel, scores the window,
//! gates it, applies the cooldown, emits the event artifacts and alert when
//! allowed, and publishes a status snapshot. Calibration control adoption is
//! therefore bounded by one window of latency.

use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::channel::{ControlSnapshot, StateChannel, StatusSnapshot};
use crate::collaborators::{
    ArtifactStore, AudioWindow, EventRecord, Notifier, RollingClipBuffer, ScoreSource,
};
use crate::config::MonitorConfig;
use crate::error::{log_channel_error, log_gating_error};
use crate::gating::{CooldownController, GatingEngine, GatingOutcome, OutcomeSummary, Verdict};
use crate::params::EffectiveParams;

/// Wall-clock milliseconds since the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// What one processed window amounted to
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub outcome: GatingOutcome,
    /// "none", "cooldown", "cat", or "calibration"
    pub alert_blocked_by: String,
    pub alerted: bool,
}

pub struct MonitorService<S, N, A>
where
    S: ScoreSource,
    N: Notifier,
    A: ArtifactStore,
{
    config: MonitorConfig,
    channel: StateChannel,
    engine: GatingEngine,
    cooldown: CooldownController,
    clip_buffer: RollingClipBuffer,
    scorer: S,
    notifier: N,
    artifacts: A,
    /// Last successfully read control snapshot; kept through torn reads
    last_control: Option<ControlSnapshot>,
}

impl<S, N, A> MonitorService<S, N, A>
where
    S: ScoreSource,
    N: Notifier,
    A: ArtifactStore,
{
    pub fn new(
        config: MonitorConfig,
        channel: StateChannel,
        scorer: S,
        notifier: N,
        artifacts: A,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let engine = GatingEngine::new(config.params.clone(), config.margin_sustain_windows)?;
        let cooldown = CooldownController::new(config.params.alert_cooldown_seconds);
        let clip_buffer =
            RollingClipBuffer::new(config.event_clip_seconds as f64, config.sample_rate);
        Ok(Self {
            config,
            channel,
            engine,
            cooldown,
            clip_buffer,
            scorer,
            notifier,
            artifacts,
            last_control: None,
        })
    }

    pub fn effective_params(&self) -> &EffectiveParams {
        self.engine.params()
    }

    fn calibration_active(&self) -> bool {
        self.last_control
            .as_ref()
            .map(|control| control.active)
            .unwrap_or(false)
    }

    /// Poll the control file and apply whatever calibration says
    ///
    /// A torn or unreadable snapshot keeps the last adopted state; the next
    /// window retries. A control set that fails validation is rejected and
    /// the engine keeps running on its previous parameters.
    fn adopt_control(&mut self) {
        match self.channel.read_control() {
            Ok(Some(control)) => self.last_control = Some(control),
            Ok(None) => self.last_control = None,
            Err(err) => {
                log_channel_error(&err, "adopt_control");
                // keep last known state
            }
        }

        let effective = match &self.last_control {
            Some(control) if control.active => {
                self.config.params.with_overrides(&control.overrides)
            }
            _ => self.config.params.clone(),
        };

        if *self.engine.params() != effective {
            match self.engine.apply_params(effective.clone()) {
                Ok(()) => {
                    self.cooldown
                        .set_cooldown_seconds(effective.alert_cooldown_seconds);
                    info!("adopted calibration parameters: {:?}", effective);
                }
                Err(err) => log_gating_error(&err, "adopt_control"),
            }
        }
    }

    /// Process one window to completion
    pub fn process_window(&mut self, window: &AudioWindow) -> anyhow::Result<WindowReport> {
        self.clip_buffer.append(&window.samples);
        self.adopt_control();

        let scores = self.scorer.score(window)?;
        let outcome = self.engine.evaluate(&scores);
        let admitted = self.cooldown.admit(outcome, scores.timestamp_ms);

        let mut alert_blocked_by = match (&admitted.verdict, admitted.reason.as_str()) {
            (Verdict::Suppressed, "cooldown") => "cooldown",
            (Verdict::Suppressed, "cat_dominant") => "cat",
            _ => "none",
        }
        .to_string();

        let mut alerted = false;
        if admitted.is_confirmed() {
            if self.calibration_active() {
                alert_blocked_by = "calibration".to_string();
                info!(
                    "confirmed window {} not alerted: calibration active",
                    scores.window_id
                );
            } else {
                self.emit_event(&admitted)?;
                alerted = true;
            }
        }

        let report = WindowReport {
            outcome: admitted,
            alert_blocked_by,
            alerted,
        };
        self.publish_status(&report, scores.timestamp_ms);
        Ok(report)
    }

    fn emit_event(&mut self, outcome: &GatingOutcome) -> anyhow::Result<()> {
        let stamp_ms = outcome.scores.timestamp_ms;
        let clip_reference = if self.clip_buffer.is_empty() {
            None
        } else {
            let clip = self.clip_buffer.snapshot();
            let path = self
                .artifacts
                .save_trigger_clip(&clip, self.config.sample_rate, stamp_ms)?;
            Some(path.display().to_string())
        };

        let event = EventRecord {
            event_id: format!("evt_{}", stamp_ms),
            timestamp_ms: stamp_ms,
            scores: outcome.scores.clone(),
            clip_reference,
        };
        self.artifacts.save_event(&event)?;
        self.notifier.send_alert(&event)?;
        info!(
            "alert sent (primary={:.2} baby={:.2} cat={:.2})",
            event.scores.primary_score, event.scores.baby_score, event.scores.cat_score
        );
        Ok(())
    }

    /// Published after every window; command-side readers tolerate staleness
    fn publish_status(&self, report: &WindowReport, now_ms: u64) {
        let snapshot = StatusSnapshot {
            updated_at_ms: now_ms,
            calibration_active: self.calibration_active(),
            phase: self
                .last_control
                .as_ref()
                .filter(|control| control.active)
                .map(|control| control.phase),
            alert_blocked_by: report.alert_blocked_by.clone(),
            outcome: Some(OutcomeSummary::from(&report.outcome)),
            effective_params: self.engine.params().clone(),
        };
        if let Err(err) = self.channel.publish_status(&snapshot) {
            log_channel_error(&err, "publish_status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Phase;
    use crate::gating::ScoreSet;
    use crate::params::{ParamKey, ParamValue};
    use std::collections::VecDeque;
    use std::path::PathBuf;

    struct QueueScorer {
        queue: VecDeque<ScoreSet>,
    }

    impl ScoreSource for QueueScorer {
        fn score(&mut self, _window: &AudioWindow) -> anyhow::Result<ScoreSet> {
            self.queue
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("queue exhausted"))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Vec<EventRecord>,
    }

    impl Notifier for RecordingNotifier {
        fn send_alert(&mut self, event: &EventRecord) -> anyhow::Result<()> {
            self.sent.push(event.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryArtifacts {
        events: Vec<EventRecord>,
        clips: Vec<u64>,
    }

    impl ArtifactStore for MemoryArtifacts {
        fn save_event(&mut self, event: &EventRecord) -> anyhow::Result<PathBuf> {
            self.events.push(event.clone());
            Ok(PathBuf::from(format!("event_{}.json", event.timestamp_ms)))
        }

        fn save_trigger_clip(
            &mut self,
            _samples: &[f32],
            _sample_rate: u32,
            stamp_ms: u64,
        ) -> anyhow::Result<PathBuf> {
            self.clips.push(stamp_ms);
            Ok(PathBuf::from(format!("trigger_{}.wav", stamp_ms)))
        }
    }

    fn cry_scores(window_id: u64) -> ScoreSet {
        ScoreSet {
            primary_decision: true,
            primary_score: 0.9,
            baby_score: 0.8,
            cat_score: 0.05,
            other_suppress_score: 0.0,
            window_id,
            timestamp_ms: window_id * 960,
        }
    }

    fn quiet_scores(window_id: u64) -> ScoreSet {
        ScoreSet {
            primary_decision: false,
            primary_score: 0.1,
            baby_score: 0.05,
            cat_score: 0.02,
            other_suppress_score: 0.0,
            window_id,
            timestamp_ms: window_id * 960,
        }
    }

    fn window(window_id: u64) -> AudioWindow {
        AudioWindow {
            window_id,
            timestamp_ms: window_id * 960,
            samples: vec![0.1; 64],
        }
    }

    fn service(
        scores: Vec<ScoreSet>,
        dir: &std::path::Path,
    ) -> MonitorService<QueueScorer, RecordingNotifier, MemoryArtifacts> {
        let mut config = MonitorConfig::default();
        config.artifact_dir = dir.to_path_buf();
        MonitorService::new(
            config,
            StateChannel::new(dir),
            QueueScorer {
                queue: scores.into(),
            },
            RecordingNotifier::default(),
            MemoryArtifacts::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_persistent_cry_confirms_and_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let scores: Vec<ScoreSet> = (1..=3).map(cry_scores).collect();
        let mut service = service(scores, dir.path());

        let mut last = None;
        for id in 1..=3 {
            last = Some(service.process_window(&window(id)).unwrap());
        }
        let report = last.unwrap();
        assert_eq!(report.outcome.verdict, Verdict::Confirmed);
        assert!(report.alerted);
        assert_eq!(report.alert_blocked_by, "none");
        assert_eq!(service.notifier.sent.len(), 1);
        assert_eq!(service.artifacts.events.len(), 1);
        assert_eq!(service.artifacts.clips.len(), 1);
        assert!(service.artifacts.events[0]
            .clip_reference
            .as_deref()
            .unwrap()
            .contains("trigger_"));
    }

    #[test]
    fn test_cooldown_blocks_second_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let scores: Vec<ScoreSet> = (1..=6).map(cry_scores).collect();
        let mut service = service(scores, dir.path());

        let mut reports = Vec::new();
        for id in 1..=6 {
            reports.push(service.process_window(&window(id)).unwrap());
        }
        assert_eq!(reports[2].outcome.verdict, Verdict::Confirmed);
        assert_eq!(reports[3].outcome.verdict, Verdict::Suppressed);
        assert_eq!(reports[3].alert_blocked_by, "cooldown");
        assert_eq!(service.notifier.sent.len(), 1);
    }

    #[test]
    fn test_calibration_suppresses_alert_but_reports_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        let mut control = ControlSnapshot::inactive(0);
        control.active = true;
        control.phase = Phase::Phase1;
        channel.publish_control(&control).unwrap();

        let scores: Vec<ScoreSet> = (1..=3).map(cry_scores).collect();
        let mut service = service(scores, dir.path());

        let mut last = None;
        for id in 1..=3 {
            last = Some(service.process_window(&window(id)).unwrap());
        }
        let report = last.unwrap();
        assert_eq!(report.outcome.verdict, Verdict::Confirmed);
        assert!(!report.alerted);
        assert_eq!(report.alert_blocked_by, "calibration");
        assert!(service.notifier.sent.is_empty());

        let status = channel.read_status().unwrap().unwrap();
        assert!(status.calibration_active);
        assert_eq!(status.phase, Some(Phase::Phase1));
        assert_eq!(status.alert_blocked_by, "calibration");
    }

    #[test]
    fn test_override_adopted_within_one_window() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        let mut control = ControlSnapshot::inactive(0);
        control.active = true;
        control.phase = Phase::Phase1;
        control
            .overrides
            .insert(ParamKey::ConfirmN, ParamValue::Int(1));
        channel.publish_control(&control).unwrap();

        let mut service = service(vec![cry_scores(1)], dir.path());
        let report = service.process_window(&window(1)).unwrap();
        // CONFIRM_N=1 confirms on the very first window.
        assert_eq!(report.outcome.verdict, Verdict::Confirmed);
        assert_eq!(service.effective_params().confirm_n, 1);
    }

    #[test]
    fn test_torn_control_keeps_last_adopted_state() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        let mut control = ControlSnapshot::inactive(0);
        control.active = true;
        control.phase = Phase::Phase1;
        control
            .overrides
            .insert(ParamKey::ConfirmN, ParamValue::Int(1));
        channel.publish_control(&control).unwrap();

        let mut service = service(vec![cry_scores(1), cry_scores(2)], dir.path());
        service.process_window(&window(1)).unwrap();
        assert_eq!(service.effective_params().confirm_n, 1);

        std::fs::write(channel.control_path(), "{ torn").unwrap();
        service.process_window(&window(2)).unwrap();
        assert_eq!(service.effective_params().confirm_n, 1);
    }

    #[test]
    fn test_status_published_every_window() {
        let dir = tempfile::tempdir().unwrap();
        let channel = StateChannel::new(dir.path());
        let mut service = service(vec![quiet_scores(1)], dir.path());
        service.process_window(&window(1)).unwrap();

        let status = channel.read_status().unwrap().unwrap();
        assert_eq!(status.updated_at_ms, 960);
        assert_eq!(status.outcome.as_ref().unwrap().verdict, Verdict::None);
        assert_eq!(status.alert_blocked_by, "none");
    }
}
