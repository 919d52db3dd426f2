//! Long-poll loop: fetch updates, normalize them, write them to storage.
//!
//! The offset cursor lives only in memory. For each update the cursor is
//! advanced *before* the update is dispatched, so acknowledgment is
//! at-most-once: if the write fails, or the process dies between advancing
//! and committing, that update is never requested again. Gaps are accepted
//! in exchange for never stalling on a poison update.

use crate::api::{RawUpdate, UpdateSource};
use crate::config::Config;
use crate::logging::OperationLog;
use crate::model::IngestRecord;
use crate::normalize::normalize;
use crate::storage::Storage;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Polling,
    Dispatching,
    Stopped,
}

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Server-side long-poll wait, in seconds.
    pub poll_timeout: u64,
    /// Pause after a failed poll.
    pub retry_delay: Duration,
    /// Pause after a successful poll.
    pub idle_delay: Duration,
    /// Stop after this many poll cycles. `None` runs until cancelled.
    pub max_cycles: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_timeout: 30,
            retry_delay: Duration::from_secs(3),
            idle_delay: Duration::from_millis(100),
            max_cycles: None,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            poll_timeout: config.telegram.poll_timeout,
            retry_delay: Duration::from_secs(config.telegram.retry_delay_secs),
            idle_delay: Duration::from_millis(config.telegram.idle_delay_ms),
            max_cycles: None,
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSummary {
    pub cycles: u64,
    pub received: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
    pub transport_errors: u64,
    pub last_update_id: Option<i64>,
}

/// Per-update notifications for console output.
#[derive(Debug)]
pub enum MonitorEvent<'a> {
    Stored(&'a IngestRecord),
    Skipped { update_id: i64, reason: String },
    Failed { update_id: i64, error: String },
    TransportError { error: String },
}

type Observer = Box<dyn FnMut(MonitorEvent<'_>) + Send>;

/// The polling loop. Owns the update source, the writing storage handle
/// and the offset cursor.
pub struct Monitor<S> {
    source: S,
    storage: Storage,
    config: MonitorConfig,
    state: MonitorState,
    last_update_id: Option<i64>,
    log: Option<OperationLog>,
    observer: Option<Observer>,
}

impl<S: UpdateSource> Monitor<S> {
    pub const fn new(source: S, storage: Storage, config: MonitorConfig) -> Self {
        Self {
            source,
            storage,
            config,
            state: MonitorState::Idle,
            last_update_id: None,
            log: None,
            observer: None,
        }
    }

    /// Record session activity to an operation log.
    #[must_use]
    pub fn with_operation_log(mut self, log: OperationLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Receive an event for every dispatched update and failed poll.
    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(MonitorEvent<'_>) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    #[must_use]
    pub const fn state(&self) -> MonitorState {
        self.state
    }

    /// Id of the last update acknowledged in this process.
    #[must_use]
    pub const fn last_update_id(&self) -> Option<i64> {
        self.last_update_id
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run until `cancel` fires or `max_cycles` is reached.
    ///
    /// Cancellation is observed between cycles and during the long poll or
    /// a delay; an update that has started dispatching always finishes.
    pub async fn run(&mut self, cancel: &CancellationToken) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        self.state = MonitorState::Idle;
        self.record("monitor_start", &json!({ "poll_timeout": self.config.poll_timeout }));
        info!(poll_timeout = self.config.poll_timeout, "Monitoring started");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self
                .config
                .max_cycles
                .is_some_and(|max| summary.cycles >= max)
            {
                break;
            }

            self.state = MonitorState::Polling;
            summary.cycles += 1;
            let offset = self.last_update_id.map(|id| id + 1);
            debug!(?offset, cycle = summary.cycles, "Polling for updates");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.source.get_updates(offset, self.config.poll_timeout) => result,
            };

            let delay = match result {
                Ok(updates) => {
                    self.state = MonitorState::Dispatching;
                    for update in &updates {
                        summary.received += 1;
                        self.last_update_id = Some(update.update_id);
                        self.dispatch(update, &mut summary);
                    }
                    self.state = MonitorState::Polling;
                    self.config.idle_delay
                }
                Err(err) => {
                    summary.transport_errors += 1;
                    warn!(error = %err, ?offset, "Polling failed; retrying");
                    self.notify(MonitorEvent::TransportError {
                        error: err.to_string(),
                    });
                    self.config.retry_delay
                }
            };

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.state = MonitorState::Stopped;
        summary.last_update_id = self.last_update_id;
        info!(
            cycles = summary.cycles,
            stored = summary.stored,
            skipped = summary.skipped,
            failed = summary.failed,
            "Monitoring stopped"
        );
        self.record("monitor_stop", &json!(summary));
        summary
    }

    fn dispatch(&mut self, update: &RawUpdate, summary: &mut MonitorSummary) {
        let record = match normalize(update) {
            Ok(Some(record)) => record,
            Ok(None) => {
                summary.skipped += 1;
                debug!(update_id = update.update_id, "Update carries no message");
                self.notify(MonitorEvent::Skipped {
                    update_id: update.update_id,
                    reason: "no message".to_string(),
                });
                return;
            }
            Err(err) => {
                summary.skipped += 1;
                warn!(update_id = update.update_id, error = %err, "Skipping update");
                self.notify(MonitorEvent::Skipped {
                    update_id: update.update_id,
                    reason: err.to_string(),
                });
                return;
            }
        };

        match self.storage.ingest(&record) {
            Ok(()) => {
                summary.stored += 1;
                debug!(
                    update_id = update.update_id,
                    user_id = record.user.user_id,
                    chat_id = record.chat.chat_id,
                    "Stored message"
                );
                self.record(
                    "message_logged",
                    &json!({
                        "update_id": update.update_id,
                        "message_id": record.message.message_id,
                        "chat_id": record.chat.chat_id,
                        "chat_title": record.chat.title,
                        "user_id": record.user.user_id,
                        "username": record.user.username,
                        "media_type": record.message.media_type,
                    }),
                );
                self.notify(MonitorEvent::Stored(&record));
            }
            Err(err) => {
                summary.failed += 1;
                error!(update_id = update.update_id, error = %err, "Failed to store update");
                self.record(
                    "store_failed",
                    &json!({ "update_id": update.update_id, "error": err.to_string() }),
                );
                self.notify(MonitorEvent::Failed {
                    update_id: update.update_id,
                    error: err.to_string(),
                });
            }
        }
    }

    fn notify(&mut self, event: MonitorEvent<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }

    fn record(&self, operation: &str, data: &serde_json::Value) {
        let Some(log) = &self.log else {
            return;
        };
        if let Err(err) = log.record(operation, data) {
            warn!(error = %err, "Failed to write operation log");
        }
    }
}
