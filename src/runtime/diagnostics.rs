use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;

use crate::Result;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::LifecycleMetrics;

use super::observer::{LifecycleObserver, UnloadNotice};

/// Logs each lifecycle notification for observability/debugging.
pub struct LifecycleLoggerObserver {
    logger: Logger,
    level: LogLevel,
    log_ready: bool,
    log_unload_prompt: bool,
    log_unloaded: bool,
}

impl LifecycleLoggerObserver {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_ready: true,
            log_unload_prompt: true,
            log_unloaded: true,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_ready(mut self, enabled: bool) -> Self {
        self.log_ready = enabled;
        self
    }

    pub fn log_unload_prompt(mut self, enabled: bool) -> Self {
        self.log_unload_prompt = enabled;
        self
    }

    pub fn log_unloaded(mut self, enabled: bool) -> Self {
        self.log_unloaded = enabled;
        self
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, "helm::runtime.lifecycle", message, fields);
        let _ = self.logger.log_event(event);
    }
}

impl LifecycleObserver for LifecycleLoggerObserver {
    fn name(&self) -> &str {
        "diagnostics.lifecycle_logger"
    }

    fn application_ready(&mut self) -> Result<()> {
        if self.log_ready {
            self.emit("notification.application_ready", std::iter::empty());
        }
        Ok(())
    }

    fn about_to_unload(&mut self, notice: &mut UnloadNotice) -> Result<()> {
        if self.log_unload_prompt {
            self.emit(
                "notification.about_to_unload",
                [json_kv("prompting", json!(notice.response().is_some()))],
            );
        }
        Ok(())
    }

    fn unloaded(&mut self, notice: &UnloadNotice) -> Result<()> {
        if self.log_unloaded {
            self.emit(
                "notification.unloaded",
                [json_kv("detail", notice.detail().clone())],
            );
        }
        Ok(())
    }
}

/// Emits a lifecycle metrics snapshot when the application becomes ready and
/// again at unload.
pub struct MetricsSnapshotObserver {
    logger: Logger,
    metrics: Arc<Mutex<LifecycleMetrics>>,
    target: String,
    started_at: Instant,
}

impl MetricsSnapshotObserver {
    pub fn new(logger: Logger, metrics: Arc<Mutex<LifecycleMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "helm::runtime.metrics".to_string(),
            started_at: Instant::now(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&self) {
        if let Ok(guard) = self.metrics.lock() {
            let event = guard
                .snapshot(self.started_at.elapsed())
                .to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}

impl LifecycleObserver for MetricsSnapshotObserver {
    fn name(&self) -> &str {
        "diagnostics.metrics_snapshot"
    }

    fn application_ready(&mut self) -> Result<()> {
        self.emit_snapshot();
        Ok(())
    }

    fn unloaded(&mut self, _notice: &UnloadNotice) -> Result<()> {
        self.emit_snapshot();
        Ok(())
    }
}
