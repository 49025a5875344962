//! External collaborator seams.
//!
//! Capture, scoring models, and outbound delivery are not this crate's
//! business; the monitor service talks to them through narrow traits so the
//! binaries can plug in real backends and the tests can plug in fakes. The
//! file-backed implementations here cover what the crate does own: replaying
//! scored windows from a JSONL file and writing event artifacts.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::gating::ScoreSet;

/// One fixed-length mono audio window
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    pub window_id: u64,
    pub timestamp_ms: u64,
    pub samples: Vec<f32>,
}

/// Produces the next audio window, `None` at end of input
pub trait WindowSource {
    fn next_window(&mut self) -> anyhow::Result<Option<AudioWindow>>;
}

/// Scores one window; the models behind it are a black box
pub trait ScoreSource {
    fn score(&mut self, window: &AudioWindow) -> anyhow::Result<ScoreSet>;
}

/// Delivers a confirmed event to the outside world
pub trait Notifier {
    fn send_alert(&mut self, event: &EventRecord) -> anyhow::Result<()>;
}

/// Persists event artifacts (event record + trigger clip)
pub trait ArtifactStore {
    fn save_event(&mut self, event: &EventRecord) -> anyhow::Result<PathBuf>;
    fn save_trigger_clip(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        stamp_ms: u64,
    ) -> anyhow::Result<PathBuf>;
}

/// Confirmed-event record, serialized to `event_<stamp>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub timestamp_ms: u64,
    pub scores: ScoreSet,
    pub clip_reference: Option<String>,
}

/// Rolling buffer of the most recent audio, for trigger clips
///
/// Appended chunks are evicted oldest-first once the total exceeds the
/// configured clip length, so a snapshot always holds the trailing
/// `max_seconds` of audio.
pub struct RollingClipBuffer {
    max_samples: usize,
    chunks: VecDeque<Vec<f32>>,
    total_samples: usize,
}

impl RollingClipBuffer {
    pub fn new(max_seconds: f64, sample_rate: u32) -> Self {
        let max_samples = ((max_seconds * sample_rate as f64) as usize).max(1);
        Self {
            max_samples,
            chunks: VecDeque::new(),
            total_samples: 0,
        }
    }

    pub fn append(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        self.chunks.push_back(samples.to_vec());
        self.total_samples += samples.len();
        while self.total_samples > self.max_samples {
            match self.chunks.pop_front() {
                Some(dropped) => self.total_samples -= dropped.len(),
                None => break,
            }
        }
    }

    /// The trailing audio, trimmed to at most `max_samples`
    pub fn snapshot(&self) -> Vec<f32> {
        let mut merged: Vec<f32> = Vec::with_capacity(self.total_samples);
        for chunk in &self.chunks {
            merged.extend_from_slice(chunk);
        }
        if merged.len() > self.max_samples {
            merged.split_off(merged.len() - self.max_samples)
        } else {
            merged
        }
    }

    pub fn len(&self) -> usize {
        self.total_samples.min(self.max_samples)
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }
}

/// Replays pre-scored windows from a JSONL file, one `ScoreSet` per line
///
/// Blank lines are skipped; a malformed line is a hard error so a truncated
/// replay file fails loudly instead of silently dropping windows.
pub struct JsonlScoreSource {
    reader: BufReader<File>,
    path: PathBuf,
    line_no: usize,
}

impl JsonlScoreSource {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let file =
            File::open(&path).with_context(|| format!("open score file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
            line_no: 0,
        })
    }

    pub fn next_scores(&mut self) -> anyhow::Result<Option<ScoreSet>> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .with_context(|| format!("read {}", self.path.display()))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let scores: ScoreSet = serde_json::from_str(trimmed).with_context(|| {
                format!("parse {} line {}", self.path.display(), self.line_no)
            })?;
            return Ok(Some(scores));
        }
    }
}

impl WindowSource for JsonlScoreSource {
    /// Replay windows carry no samples; the scores already exist
    fn next_window(&mut self) -> anyhow::Result<Option<AudioWindow>> {
        Ok(self.next_scores()?.map(|scores| AudioWindow {
            window_id: scores.window_id,
            timestamp_ms: scores.timestamp_ms,
            samples: Vec::new(),
        }))
    }
}

/// Pairs with a replaying `WindowSource`: scores were read alongside the
/// window, so this source replays the same file in lockstep.
pub struct ReplayScoreSource {
    inner: JsonlScoreSource,
}

impl ReplayScoreSource {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self {
            inner: JsonlScoreSource::open(path)?,
        })
    }
}

impl ScoreSource for ReplayScoreSource {
    fn score(&mut self, window: &AudioWindow) -> anyhow::Result<ScoreSet> {
        match self.inner.next_scores()? {
            Some(scores) => Ok(scores),
            None => anyhow::bail!(
                "score replay exhausted at window {}",
                window.window_id
            ),
        }
    }
}

/// Notifier that only logs; stands in when no delivery transport is wired
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_alert(&mut self, event: &EventRecord) -> anyhow::Result<()> {
        info!(
            "ALERT {} baby={:.2} cat={:.2} clip={}",
            event.event_id,
            event.scores.baby_score,
            event.scores.cat_score,
            event.clip_reference.as_deref().unwrap_or("none")
        );
        Ok(())
    }
}

/// Writes event records and trigger clips into the artifact directory
pub struct JsonArtifactStore {
    dir: PathBuf,
}

impl JsonArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create artifact dir {}", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for JsonArtifactStore {
    fn save_event(&mut self, event: &EventRecord) -> anyhow::Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("event_{}.json", event.timestamp_ms));
        let payload = serde_json::to_vec_pretty(event).context("serialize event record")?;
        fs::write(&path, payload).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn save_trigger_clip(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        stamp_ms: u64,
    ) -> anyhow::Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("trigger_{}.wav", stamp_ms));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("create {}", path.display()))?;
        for sample in samples {
            writer.write_sample(*sample).context("write wav sample")?;
        }
        writer.finalize().context("finalize wav")?;
        Ok(path)
    }
}
