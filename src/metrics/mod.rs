use std::time::Duration;

use serde_json::json;

use crate::logging::{LogEvent, LogFields, LogLevel};

/// Saturating counters covering the controller's externally visible work.
#[derive(Debug, Default, Clone)]
pub struct LifecycleMetrics {
    signals: u64,
    duplicate_signals: u64,
    stages_started: u64,
    stages_finished: u64,
    images_requested: u64,
    faults: u64,
}

impl LifecycleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_signal(&mut self) {
        self.signals = self.signals.saturating_add(1);
    }

    pub fn record_duplicate_signal(&mut self) {
        self.duplicate_signals = self.duplicate_signals.saturating_add(1);
    }

    pub fn record_stage_started(&mut self, image_count: usize) {
        self.stages_started = self.stages_started.saturating_add(1);
        self.images_requested = self.images_requested.saturating_add(image_count as u64);
    }

    pub fn record_stage_finished(&mut self) {
        self.stages_finished = self.stages_finished.saturating_add(1);
    }

    pub fn record_fault(&mut self) {
        self.faults = self.faults.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            signals: self.signals,
            duplicate_signals: self.duplicate_signals,
            stages_started: self.stages_started,
            stages_finished: self.stages_finished,
            images_requested: self.images_requested,
            faults: self.faults,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub signals: u64,
    pub duplicate_signals: u64,
    pub stages_started: u64,
    pub stages_finished: u64,
    pub images_requested: u64,
    pub faults: u64,
}

impl MetricSnapshot {
    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("signals".to_string(), json!(self.signals));
        map.insert(
            "duplicate_signals".to_string(),
            json!(self.duplicate_signals),
        );
        map.insert("stages_started".to_string(), json!(self.stages_started));
        map.insert("stages_finished".to_string(), json!(self.stages_finished));
        map.insert("images_requested".to_string(), json!(self.images_requested));
        map.insert("faults".to_string(), json!(self.faults));
        map
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target,
            "lifecycle_metrics".to_string(),
            self.as_fields(),
        )
    }
}
