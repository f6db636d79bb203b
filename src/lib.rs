//! Experimental pilot implementation of the Helm lifecycle controller MVP.
//!
//! Helm decides whether a rich client application may run in the current
//! host environment and sequences startup and shutdown so dependent
//! subsystems come up and go down in a deterministic order. The crate
//! orchestrates; rendering, input dispatch, image loading, and object
//! ownership stay behind the collaborator traits in `runtime`.

pub mod error;
pub mod logging;
pub mod metrics;
pub mod patch;
pub mod preload;
pub mod probe;
pub mod runtime;
pub mod scheduler;

pub use error::{HelmError, Result};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink, SharedMemorySink, event_with_fields, json_kv,
};
pub use metrics::{LifecycleMetrics, MetricSnapshot};
pub use patch::{
    FALLBACK_PATCH_TARGETS, MixinInstaller, RenderMixin, WidgetKind, apply_render_patches,
};
pub use preload::{
    ImageInventory, ImageRef, InstantPreloaderFactory, PreloadStage, Preloader, PreloaderFactory,
    StageCompletion, StageKind,
};
pub use probe::{EngineKind, HostProfile};
pub use runtime::audit::{
    LifecycleAudit, LifecycleAuditEvent, LifecycleAuditEventBuilder, LifecycleStage,
    NullLifecycleAudit,
};
pub use runtime::bridge::{BindingToken, HostSignal, SignalBridge, SignalRegistrar};
pub use runtime::diagnostics::{LifecycleLoggerObserver, MetricsSnapshotObserver};
pub use runtime::observer::{LifecycleObserver, UnloadNotice};
pub use runtime::{
    CompatShim, ContextMenuGate, DisposalRegistry, FaultReporter, GraphicsBackend, HelmRuntime,
    HostServices, InputDispatcher, MenuAuthority, RuntimeConfig, RuntimePhase, TeardownPhase,
    WidgetTree,
};
pub use scheduler::{SHORT_YIELD, SystemTask, TaskScheduler, YieldClass};
