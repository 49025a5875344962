// CooldownController: debounce between confirmed events.
//
// One continuous crying episode spans many windows; without this, every
// persisted window after the first would emit its own notification.

use log::info;

use crate::gating::{GatingOutcome, Verdict};

pub struct CooldownController {
    cooldown_seconds: u64,
    last_confirmed_at_ms: Option<u64>,
}

impl CooldownController {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown_seconds,
            last_confirmed_at_ms: None,
        }
    }

    /// Adopt a new cooldown length (live calibration)
    pub fn set_cooldown_seconds(&mut self, cooldown_seconds: u64) {
        self.cooldown_seconds = cooldown_seconds;
    }

    pub fn last_confirmed_at_ms(&self) -> Option<u64> {
        self.last_confirmed_at_ms
    }

    /// Admit or downgrade an outcome
    ///
    /// A confirmation inside the cooldown window is downgraded to
    /// `Suppressed` with reason "cooldown" and does not refresh the stamp,
    /// so the quiet interval is measured from the last admitted
    /// confirmation. Everything else passes through unchanged.
    pub fn admit(&mut self, outcome: GatingOutcome, now_ms: u64) -> GatingOutcome {
        if outcome.verdict != Verdict::Confirmed {
            return outcome;
        }

        if let Some(last) = self.last_confirmed_at_ms {
            let elapsed_ms = now_ms.saturating_sub(last);
            if elapsed_ms < self.cooldown_seconds.saturating_mul(1000) {
                info!(
                    "confirmation at window {} suppressed by cooldown ({}ms of {}s elapsed)",
                    outcome.scores.window_id, elapsed_ms, self.cooldown_seconds
                );
                return GatingOutcome::new(Verdict::Suppressed, "cooldown", outcome.scores);
            }
        }

        self.last_confirmed_at_ms = Some(now_ms);
        outcome
    }
}
