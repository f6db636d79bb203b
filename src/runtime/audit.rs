//! Lifecycle audit instrumentation hooks.
//!
//! Lightweight checkpoints so embedders can observe the controller's major
//! transitions. Records carry a stage identifier plus structured metadata,
//! leaving it to downstream code to log, buffer, or visualize the
//! progression without contorting the controller itself.

use std::time::SystemTime;

use serde_json::Value;

/// Distinct lifecycle checkpoints emitted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    /// A supported host; the controller wired itself up.
    RuntimeConstructed,
    /// The environment probe rejected the host; the controller stays inert.
    HostRejected,
    /// The "ready" handler body ran (first firing only).
    ReadyHandled,
    /// A preload stage started.
    PreloadStarted,
    /// A preload stage finished and was released.
    PreloadFinished,
    /// The application-ready notification fired.
    UiReady,
    /// The "about-to-unload" handler ran.
    AboutToUnloadHandled,
    /// The "unloaded" handler ran; teardown complete.
    UnloadHandled,
    /// A handler-body failure was absorbed at the boundary.
    FaultAbsorbed,
}

/// Structured audit entry.
#[derive(Debug, Clone)]
pub struct LifecycleAuditEvent {
    pub timestamp: SystemTime,
    pub stage: LifecycleStage,
    pub details: Vec<(String, Value)>,
}

/// Builder appending detail fields before the event is recorded.
pub struct LifecycleAuditEventBuilder {
    event: LifecycleAuditEvent,
}

impl LifecycleAuditEventBuilder {
    pub fn new(stage: LifecycleStage) -> Self {
        Self {
            event: LifecycleAuditEvent {
                timestamp: SystemTime::now(),
                stage,
                details: Vec::new(),
            },
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> LifecycleAuditEvent {
        self.event
    }
}

/// Trait implemented by any audit sink.
pub trait LifecycleAudit: Send + Sync {
    fn record(&self, event: LifecycleAuditEvent);
}

/// Default no-op implementation used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullLifecycleAudit;

impl LifecycleAudit for NullLifecycleAudit {
    fn record(&self, _event: LifecycleAuditEvent) {}
}
