//! Calibration command surface.
//!
//! Commands arrive as short slash-prefixed text lines (or as HTTP routes that
//! map 1:1 onto the same variants). Matching happens on a closed enum so an
//! unknown or malformed command is rejected at the parse boundary instead of
//! falling through string comparisons deep in a handler.

use std::fmt::Write as _;

use log::warn;

use crate::calibration::{CalibrationManager, CalibrationSnapshot, Phase};
use crate::calibration::DEFAULT_CALIBRATION_INTERVAL_SECONDS;
use crate::channel::StateChannel;
use crate::error::ChannelError;

#[derive(Debug, Clone, PartialEq)]
pub enum CalCommand {
    Help,
    Start { phase: Phase, interval: Option<u64> },
    Set { param: String, value: String },
    Params,
    Status,
    Watch { interval: Option<u64> },
    WatchStop,
    Stop,
}

/// Outcome of a dispatched command, ready to send back to the origin
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CommandReply {
    pub ok: bool,
    pub text: String,
}

impl CommandReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
        }
    }
}

/// Parse a text command line; `Err` is a ready usage reply
pub fn parse_command(text: &str) -> Result<CalCommand, CommandReply> {
    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("");

    match command {
        "/cal" => Ok(CalCommand::Help),
        "/cal_start" => {
            let phase = match parts.next() {
                Some(raw) => raw.parse::<Phase>().map_err(|err| {
                    CommandReply::error(format!("Calibration start: ERROR. {}", err))
                })?,
                None => {
                    return Err(CommandReply::error(
                        "Usage: /cal_start phase1|phase2 [interval_sec]",
                    ))
                }
            };
            let interval = match parts.next() {
                Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                    CommandReply::error("Interval must be an integer number of seconds.")
                })?),
                None => None,
            };
            Ok(CalCommand::Start { phase, interval })
        }
        "/cal_set" => {
            let param = parts.next();
            let value = parts.next();
            match (param, value) {
                (Some(param), Some(value)) => Ok(CalCommand::Set {
                    param: param.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(CommandReply::error("Usage: /cal_set <param> <value>")),
            }
        }
        "/cal_params" => Ok(CalCommand::Params),
        "/cal_status" => Ok(CalCommand::Status),
        "/cal_watch" => {
            let interval = match parts.next() {
                Some(raw) => Some(
                    raw.parse::<u64>()
                        .map_err(|_| CommandReply::error("Usage: /cal_watch [interval_sec]"))?,
                ),
                None => None,
            };
            Ok(CalCommand::Watch { interval })
        }
        "/cal_watch_stop" => Ok(CalCommand::WatchStop),
        "/cal_stop" => Ok(CalCommand::Stop),
        other => Err(CommandReply::error(format!(
            "Unknown command: {}. Send /cal for help.",
            other
        ))),
    }
}

/// Execute a command against the manager and publish the resulting control
/// snapshot so the audio loop adopts it on its next window.
pub fn dispatch(
    command: CalCommand,
    manager: &mut CalibrationManager,
    channel: &StateChannel,
    now_ms: u64,
) -> CommandReply {
    match command {
        CalCommand::Help => CommandReply::ok(help_text()),
        CalCommand::Start { phase, interval } => {
            let snapshot = manager.start(phase, interval, now_ms);
            if let Err(err) = publish(manager, channel, now_ms) {
                return publish_failure("start", err);
            }
            let allowed = phase.allowed_names().join(", ");
            CommandReply::ok(format!(
                "Calibration start: OK. active phase={} interval={}s alerts=disabled allowed_params={}",
                phase,
                snapshot.interval_sec.unwrap_or(DEFAULT_CALIBRATION_INTERVAL_SECONDS),
                allowed
            ))
        }
        CalCommand::Set { param, value } => match manager.set(&param, &value) {
            Ok((key, parsed)) => {
                if let Err(err) = publish(manager, channel, now_ms) {
                    return publish_failure("set", err);
                }
                let phase = match manager.session() {
                    Some(session) => session.phase.as_str(),
                    None => "unknown",
                };
                CommandReply::ok(format!(
                    "Calibration set: OK. phase={} set {}={}",
                    phase, key, parsed
                ))
            }
            Err(err) => CommandReply::error(format!("Calibration set: ERROR. {}", err)),
        },
        CalCommand::Params => {
            let snapshot = manager.status();
            if !snapshot.active {
                return CommandReply::error(inactive_text("Calibration params"));
            }
            CommandReply::ok(format!(
                "Calibration params: OK. phase={} interval={}s overrides={} effective_params={}",
                snapshot.phase.map(|p| p.as_str()).unwrap_or("unknown"),
                snapshot.interval_sec.unwrap_or(DEFAULT_CALIBRATION_INTERVAL_SECONDS),
                render_json(&snapshot.overrides),
                render_json(&snapshot.effective),
            ))
        }
        CalCommand::Status => status_reply(manager, channel),
        CalCommand::Watch { interval } => match manager.watch(interval) {
            Ok(effective_interval) => {
                if let Err(err) = publish(manager, channel, now_ms) {
                    return publish_failure("watch", err);
                }
                CommandReply::ok(format!(
                    "Calibration watch enabled every {}s. Use /cal_watch_stop to stop.",
                    effective_interval
                ))
            }
            Err(err) => CommandReply::error(format!("Calibration watch: ERROR. {}", err)),
        },
        CalCommand::WatchStop => {
            let was_active = manager.watch_stop();
            if let Err(err) = publish(manager, channel, now_ms) {
                return publish_failure("watch_stop", err);
            }
            if was_active {
                CommandReply::ok("Calibration watch stopped.")
            } else {
                CommandReply::ok("Calibration watch is not active.")
            }
        }
        CalCommand::Stop => match manager.stop() {
            Ok(final_snapshot) => {
                if let Err(err) = publish(manager, channel, now_ms) {
                    return publish_failure("stop", err);
                }
                CommandReply::ok(format!(
                    "Calibration stop: OK. {}",
                    stop_summary(&final_snapshot)
                ))
            }
            Err(err) => CommandReply::error(format!("Calibration stop: ERROR. {}", err)),
        },
    }
}

fn publish(
    manager: &CalibrationManager,
    channel: &StateChannel,
    now_ms: u64,
) -> Result<(), ChannelError> {
    channel.publish_control(&manager.control_snapshot(now_ms))
}

fn publish_failure(operation: &str, err: ChannelError) -> CommandReply {
    warn!("control publish failed after {}: {}", operation, err);
    CommandReply::error(format!(
        "Calibration {}: ERROR. state not published, retry: {}",
        operation, err
    ))
}

fn inactive_text(prefix: &str) -> String {
    format!(
        "{}: ERROR. calibration inactive. Use /cal_start phase1|phase2 [interval_sec].",
        prefix
    )
}

fn status_reply(manager: &CalibrationManager, channel: &StateChannel) -> CommandReply {
    let snapshot = manager.status();
    if !snapshot.active {
        return CommandReply::error(inactive_text("Calibration"));
    }
    let phase = snapshot.phase.map(|p| p.as_str()).unwrap_or("unknown");
    let interval = snapshot
        .interval_sec
        .unwrap_or(DEFAULT_CALIBRATION_INTERVAL_SECONDS);

    let status = match channel.read_status() {
        Ok(Some(status)) => status,
        Ok(None) => {
            return CommandReply::ok(format!(
                "Calibration: OK. phase={} active interval={}s waiting_for_live_status",
                phase, interval
            ))
        }
        Err(err) => {
            warn!("status snapshot unreadable: {}", err);
            return CommandReply::ok(format!(
                "Calibration: OK. phase={} active interval={}s status_unavailable_retry",
                phase, interval
            ));
        }
    };

    let mut text = format!(
        "Calibration: OK. phase={} interval={}s updated={}ms",
        phase, interval, status.updated_at_ms
    );
    if let Some(outcome) = &status.outcome {
        let _ = write!(
            text,
            " primary={:.2} baby={:.2} cat={:.2} verdict={:?} reason={}",
            outcome.primary_score,
            outcome.baby_score,
            outcome.cat_score,
            outcome.verdict,
            outcome.reason
        );
    }
    let _ = write!(
        text,
        " alert_blocked_by={} params={}",
        status.alert_blocked_by,
        render_json(&status.effective_params)
    );
    CommandReply::ok(text)
}

fn render_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn help_text() -> String {
    [
        "Calibration commands:",
        "/cal",
        "/cal_start phase1 [interval_sec]",
        "/cal_start phase2 [interval_sec]",
        "/cal_set <param> <value>",
        "/cal_params",
        "/cal_status",
        "/cal_watch [interval_sec]",
        "/cal_watch_stop",
        "/cal_stop",
        "",
        "phase1 params: PRIMARY_CRY_THRESHOLD, CONFIRM_N, CONFIRM_M, ALERT_COOLDOWN_SECONDS",
        "phase2 params: CRY_THRESHOLD, CAT_THRESHOLD, CAT_WEIGHT, MARGIN_THRESHOLD",
        &format!("default interval: {}s", DEFAULT_CALIBRATION_INTERVAL_SECONDS),
    ]
    .join("\n")
}

/// Echo the final session state as replayable commands
pub fn stop_summary(previous: &CalibrationSnapshot) -> String {
    let phase = previous.phase.map(|p| p.as_str()).unwrap_or("unknown");
    let mut lines = vec![
        format!(
            "Calibration stopped for {}. Alerts re-enabled and defaults restored.",
            phase
        ),
        "Final command state:".to_string(),
        format!(
            "/cal_start {} {}",
            phase,
            previous
                .interval_sec
                .unwrap_or(DEFAULT_CALIBRATION_INTERVAL_SECONDS)
        ),
    ];
    for (key, value) in &previous.overrides {
        lines.push(format!("/cal_set {} {}", key, value));
    }
    if previous.overrides.is_empty() {
        lines.push("(no parameter overrides were applied)".to_string());
    }
    lines.join("\n")
}
