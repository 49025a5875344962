//! Periodic calibration watch tasks.
//!
//! Each watch origin (an HTTP client, a chat id) gets its own tokio task that
//! emits a status snapshot at a fixed interval until stopped. Stop is
//! idempotent and synchronous with the task's exit: once `stop` returns, no
//! further emission from that origin can occur.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct WatchHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct WatchRegistry {
    tasks: Mutex<HashMap<String, WatchHandle>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the watch for an origin
    ///
    /// An existing task for the same origin is cancelled and awaited first,
    /// so at most one emitter per origin ever runs.
    pub async fn start<F>(&self, origin: &str, interval: Duration, mut emit: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop(origin).await;

        let (cancel, mut cancelled) = watch::channel(false);
        let origin_label = origin.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => emit(),
                    _ = cancelled.changed() => {
                        debug!("watch task for {} cancelled", origin_label);
                        break;
                    }
                }
            }
        });

        info!("watch started for {} every {:?}", origin, interval);
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.insert(origin.to_string(), WatchHandle { cancel, task });
    }

    /// Stop the watch for an origin; returns whether one was running
    pub async fn stop(&self, origin: &str) -> bool {
        let handle = {
            let mut tasks = self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            tasks.remove(origin)
        };
        match handle {
            Some(handle) => {
                let _ = handle.cancel.send(true);
                let _ = handle.task.await;
                info!("watch stopped for {}", origin);
                true
            }
            None => false,
        }
    }

    /// Cancel every running watch (shutdown path)
    pub async fn stop_all(&self) {
        let handles: Vec<WatchHandle> = {
            let mut tasks = self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            tasks.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.cancel.send(true);
            let _ = handle.task.await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
