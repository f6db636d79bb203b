//! The lifecycle controller.
//!
//! One `HelmRuntime` exists per process, created by the composition root and
//! handed to any collaborator that needs to observe readiness. Construction
//! branches on the environment probe: an unsupported host yields an inert,
//! unwired controller that ignores every signal for the rest of the process
//! lifetime. On supported hosts the controller owns the startup state
//! machine (ready signal, two staged preload passes, the application-ready
//! notification) and the teardown path (about-to-unload, unloaded), and
//! isolates every handler-body failure from the host.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::{Value, json};

use crate::error::{HelmError, Result};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::LifecycleMetrics;
use crate::patch::{MixinInstaller, apply_render_patches};
use crate::preload::{ImageInventory, PreloadStage, PreloaderFactory, StageKind};
use crate::probe::HostProfile;
use crate::scheduler::{SHORT_YIELD, SystemTask, TaskScheduler, YieldClass};

pub mod audit;
pub mod bridge;
pub mod diagnostics;
pub mod observer;

use audit::{LifecycleAuditEventBuilder, LifecycleStage};
use bridge::{SignalBridge, SignalRegistrar};
use observer::{LifecycleObserver, UnloadNotice};

/// Graphics subsystem entry points the controller drives at construction.
pub trait GraphicsBackend: Send {
    fn init(&mut self) -> Result<()>;
    fn is_supported(&self) -> bool;
}

/// The host's input-event dispatch facility.
pub trait InputDispatcher: Send {
    fn init(&mut self) -> Result<()>;
    fn attach_listeners(&mut self) -> Result<()>;
    fn detach_listeners(&mut self) -> Result<()>;
    fn clean_up(&mut self) -> Result<()>;
    fn set_context_menu_gate(&mut self, gate: ContextMenuGate) -> Result<()>;
    fn set_menu_authority(&mut self, authority: Arc<dyn MenuAuthority>) -> Result<()>;
}

/// Widget tree entry points: the singleton document root and the global
/// redraw queues.
pub trait WidgetTree: Send {
    /// Acquire the document-root widget, creating it if absent.
    fn ensure_root(&mut self) -> Result<()>;
    fn flush_redraw_queues(&mut self) -> Result<()>;
}

/// Global object-ownership registry disposed at the single teardown point.
pub trait DisposalRegistry: Send {
    fn dispose_all(&mut self) -> Result<()>;
}

/// Top-level error reporter for absorbed handler-body failures.
pub trait FaultReporter: Send {
    fn report(&mut self, error: &HelmError);
}

/// Mobile-browser compatibility shims initialized during the ready handler.
pub trait CompatShim: Send {
    fn init(&mut self) -> Result<()>;
}

/// Menu-management authority the controller forwards to the input
/// dispatcher at construction.
pub trait MenuAuthority: Send + Sync {
    fn dismiss_open_menus(&self);
}

/// Decides whether the host may show its native context menu.
pub type ContextMenuGate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Everything the controller consumes from its host, supplied once at
/// construction. All collaborators are exclusively owned.
pub struct HostServices {
    pub registrar: Box<dyn SignalRegistrar>,
    pub graphics: Box<dyn GraphicsBackend>,
    pub input: Box<dyn InputDispatcher>,
    pub widgets: Box<dyn WidgetTree>,
    pub images: Box<dyn ImageInventory>,
    pub preloaders: Box<dyn PreloaderFactory>,
    pub mixins: Box<dyn MixinInstaller>,
    pub shim: Box<dyn CompatShim>,
    pub objects: Box<dyn DisposalRegistry>,
    pub faults: Box<dyn FaultReporter>,
    pub context_menu_gate: ContextMenuGate,
    pub menu_authority: Arc<dyn MenuAuthority>,
}

/// Configuration knobs for the controller.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Duration of the short yield class (the delay before the hidden
    /// preload stage begins).
    pub short_yield: Duration,
    /// Optional structured logger used by the controller.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared with diagnostics observers.
    pub metrics: Option<Arc<Mutex<LifecycleMetrics>>>,
    /// Optional audit sink for lifecycle checkpoints.
    pub audit: Option<Arc<dyn audit::LifecycleAudit>>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            short_yield: SHORT_YIELD,
            logger: None,
            metrics: None,
            audit: None,
        }
    }
}

impl RuntimeConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(LifecycleMetrics::new())));
        }
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<LifecycleMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Startup progression. `Unsupported` is terminal and entered only at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePhase {
    Unsupported,
    Idle,
    Loading,
    VisiblePreload,
    Ready,
    HiddenPreload,
    Settled,
}

/// Teardown progression, driven independently of the startup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPhase {
    Running,
    Unloading,
    Disposed,
}

pub struct HelmRuntime {
    profile: HostProfile,
    services: HostServices,
    config: RuntimeConfig,
    scheduler: TaskScheduler,
    bridge: Option<SignalBridge>,
    observers: Vec<Box<dyn LifecycleObserver>>,
    phase: RuntimePhase,
    teardown: TeardownPhase,
    startup_time: SystemTime,
    ui_ready: bool,
    onload_handled: bool,
    stage: Option<PreloadStage>,
}

impl HelmRuntime {
    /// Construct the process-wide controller. On an unsupported host the
    /// controller comes back inert: no bridge, no collaborator touched, and
    /// every later signal is a no-op.
    pub fn new(profile: HostProfile, mut services: HostServices, config: RuntimeConfig) -> Result<Self> {
        let scheduler = TaskScheduler::new(config.short_yield);
        let startup_time = SystemTime::now();

        if !profile.is_supported() {
            let runtime = Self {
                profile,
                services,
                config,
                scheduler,
                bridge: None,
                observers: Vec::new(),
                phase: RuntimePhase::Unsupported,
                teardown: TeardownPhase::Running,
                startup_time,
                ui_ready: false,
                onload_handled: false,
                stage: None,
            };
            runtime.record_audit(LifecycleAuditEventBuilder::new(LifecycleStage::HostRejected));
            return Ok(runtime);
        }

        let bridge = SignalBridge::attach(&mut *services.registrar)?;
        services.graphics.init()?;
        apply_render_patches(&*services.graphics, profile.css_capable, &mut *services.mixins)?;
        services
            .input
            .set_context_menu_gate(Arc::clone(&services.context_menu_gate))?;
        services
            .input
            .set_menu_authority(Arc::clone(&services.menu_authority))?;

        let runtime = Self {
            profile,
            services,
            config,
            scheduler,
            bridge: Some(bridge),
            observers: Vec::new(),
            phase: RuntimePhase::Idle,
            teardown: TeardownPhase::Running,
            startup_time,
            ui_ready: false,
            onload_handled: false,
            stage: None,
        };
        runtime.log_lifecycle(
            LogLevel::Info,
            "runtime_constructed",
            [json_kv("engine", json!(format!("{:?}", runtime.profile.engine)))],
        );
        runtime.record_audit(LifecycleAuditEventBuilder::new(
            LifecycleStage::RuntimeConstructed,
        ));
        Ok(runtime)
    }

    pub fn register_observer<O>(&mut self, observer: O)
    where
        O: LifecycleObserver + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn profile(&self) -> &HostProfile {
        &self.profile
    }

    pub fn phase(&self) -> RuntimePhase {
        self.phase
    }

    pub fn teardown(&self) -> TeardownPhase {
        self.teardown
    }

    pub fn ui_ready(&self) -> bool {
        self.ui_ready
    }

    pub fn startup_time(&self) -> SystemTime {
        self.startup_time
    }

    /// Continuations parked in the scheduler, waiting for a pump.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    /// Host "ready" signal. Idempotent: the body runs once, later firings
    /// are ignored.
    pub fn handle_ready(&mut self) {
        if self.phase == RuntimePhase::Unsupported {
            return;
        }
        if let Err(err) = self.ready_body() {
            self.absorb_fault("ready", err);
        }
    }

    fn ready_body(&mut self) -> Result<()> {
        if self.onload_handled {
            self.with_metrics(|metrics| metrics.record_duplicate_signal());
            self.log_lifecycle(LogLevel::Debug, "duplicate_ready_ignored", std::iter::empty());
            return Ok(());
        }
        self.onload_handled = true;
        self.with_metrics(|metrics| metrics.record_signal());

        self.services.widgets.ensure_root()?;
        self.services.shim.init()?;
        // Defer past the host's own ready processing before any application
        // work begins.
        self.scheduler.schedule(
            YieldClass::Immediate,
            SystemTask::BeginPreload(StageKind::Visible),
        );
        self.phase = RuntimePhase::Loading;
        self.log_lifecycle(LogLevel::Info, "ready_handled", std::iter::empty());
        self.record_audit(LifecycleAuditEventBuilder::new(LifecycleStage::ReadyHandled));
        Ok(())
    }

    /// Advance the logical clock and run every continuation that came due.
    /// The embedder's pump; call with `Duration::ZERO` to drain immediate
    /// work only.
    pub fn pump(&mut self, dt: Duration) {
        if self.phase == RuntimePhase::Unsupported {
            return;
        }
        for task in self.scheduler.advance(dt) {
            if let Err(err) = self.run_task(task) {
                self.absorb_fault("task", err);
            }
        }
    }

    /// Pump until no scheduled continuation remains. Returns with work
    /// outstanding only when a stage is waiting on its preloader.
    pub fn pump_until_idle(&mut self) {
        while !self.scheduler.is_idle() {
            self.pump(self.scheduler.short_yield());
        }
    }

    fn run_task(&mut self, task: SystemTask) -> Result<()> {
        match task {
            SystemTask::BeginPreload(kind) => self.begin_preload(kind),
            SystemTask::FinishPreload(kind) => self.finish_preload(kind),
        }
    }

    fn begin_preload(&mut self, kind: StageKind) -> Result<()> {
        if let Some(active) = self.stage.as_ref() {
            return Err(HelmError::StageOverlap {
                active: active.kind(),
            });
        }
        let images = match kind {
            StageKind::Visible => self.services.images.visible_images(),
            StageKind::Hidden => self.services.images.hidden_images(),
        };
        let stage = PreloadStage::begin(kind, images, &*self.services.preloaders, &self.scheduler)?;
        self.with_metrics(|metrics| metrics.record_stage_started(stage.image_count()));
        self.log_lifecycle(
            LogLevel::Debug,
            "preload_started",
            [
                json_kv("stage", json!(kind.to_string())),
                json_kv("images", json!(stage.image_count())),
            ],
        );
        self.record_audit(
            LifecycleAuditEventBuilder::new(LifecycleStage::PreloadStarted)
                .detail("stage", json!(kind.to_string()))
                .detail("images", json!(stage.image_count())),
        );
        self.stage = Some(stage);
        self.phase = match kind {
            StageKind::Visible => RuntimePhase::VisiblePreload,
            StageKind::Hidden => RuntimePhase::HiddenPreload,
        };
        Ok(())
    }

    fn finish_preload(&mut self, kind: StageKind) -> Result<()> {
        let stage = self.stage.take().ok_or(HelmError::StageMissing(kind))?;
        stage.release()?;
        self.with_metrics(|metrics| metrics.record_stage_finished());
        self.log_lifecycle(
            LogLevel::Debug,
            "preload_finished",
            [json_kv("stage", json!(kind.to_string()))],
        );
        self.record_audit(
            LifecycleAuditEventBuilder::new(LifecycleStage::PreloadFinished)
                .detail("stage", json!(kind.to_string())),
        );

        match kind {
            StageKind::Visible => {
                self.services.input.init()?;
                self.services.input.attach_listeners()?;
                self.set_ui_ready()?;
                self.services.widgets.flush_redraw_queues()?;
                // Let ready-state consumers run before prefetching the
                // hidden set.
                self.scheduler.schedule(
                    YieldClass::Short,
                    SystemTask::BeginPreload(StageKind::Hidden),
                );
                self.phase = RuntimePhase::Ready;
            }
            StageKind::Hidden => {
                self.phase = RuntimePhase::Settled;
            }
        }
        Ok(())
    }

    fn set_ui_ready(&mut self) -> Result<()> {
        if self.ui_ready {
            return Ok(());
        }
        self.ui_ready = true;
        self.log_lifecycle(LogLevel::Info, "ui_ready", std::iter::empty());
        self.record_audit(LifecycleAuditEventBuilder::new(LifecycleStage::UiReady));
        self.dispatch_application_ready()
    }

    fn dispatch_application_ready(&mut self) -> Result<()> {
        for idx in 0..self.observers.len() {
            if let Err(source) = self.observers[idx].application_ready() {
                let name = self.observers[idx].name().to_string();
                return Err(HelmError::observer(name, source));
            }
        }
        Ok(())
    }

    /// Host "about-to-unload" signal. The returned text becomes the host's
    /// confirmation prompt; `None` allows the unload without prompting, and
    /// is also the definite answer produced when the handler body fails.
    pub fn handle_about_to_unload(&mut self, detail: Value) -> Option<String> {
        if self.phase == RuntimePhase::Unsupported {
            return None;
        }
        self.teardown = TeardownPhase::Unloading;
        match self.about_to_unload_body(detail) {
            Ok(response) => response,
            Err(err) => {
                self.absorb_fault("about_to_unload", err);
                None
            }
        }
    }

    fn about_to_unload_body(&mut self, detail: Value) -> Result<Option<String>> {
        self.with_metrics(|metrics| metrics.record_signal());
        let mut notice = UnloadNotice::cancelable(detail);
        for idx in 0..self.observers.len() {
            if let Err(source) = self.observers[idx].about_to_unload(&mut notice) {
                let name = self.observers[idx].name().to_string();
                return Err(HelmError::observer(name, source));
            }
        }
        let response = notice.into_response();
        self.log_lifecycle(
            LogLevel::Info,
            "about_to_unload_handled",
            [json_kv("prompting", json!(response.is_some()))],
        );
        self.record_audit(
            LifecycleAuditEventBuilder::new(LifecycleStage::AboutToUnloadHandled)
                .detail("prompting", json!(response.is_some())),
        );
        Ok(response)
    }

    /// Host "unloaded" signal: the single teardown point. Dispatches the
    /// terminal notification, then detaches and cleans up the input
    /// dispatcher and disposes every remaining managed object, in that
    /// order.
    pub fn handle_unloaded(&mut self, detail: Value) {
        if self.phase == RuntimePhase::Unsupported {
            return;
        }
        self.teardown = TeardownPhase::Disposed;
        if let Err(err) = self.unloaded_body(detail) {
            self.absorb_fault("unloaded", err);
        }
    }

    fn unloaded_body(&mut self, detail: Value) -> Result<()> {
        self.with_metrics(|metrics| metrics.record_signal());
        let notice = UnloadNotice::terminal(detail);
        for idx in 0..self.observers.len() {
            if let Err(source) = self.observers[idx].unloaded(&notice) {
                let name = self.observers[idx].name().to_string();
                return Err(HelmError::observer(name, source));
            }
        }
        self.services.input.detach_listeners()?;
        self.services.input.clean_up()?;
        self.services.objects.dispose_all()?;
        self.log_lifecycle(LogLevel::Info, "unload_handled", std::iter::empty());
        self.record_audit(LifecycleAuditEventBuilder::new(LifecycleStage::UnloadHandled));
        Ok(())
    }

    fn absorb_fault(&mut self, origin: &str, err: HelmError) {
        self.services.faults.report(&err);
        self.with_metrics(|metrics| metrics.record_fault());
        self.log_lifecycle(
            LogLevel::Warn,
            "fault_absorbed",
            [
                json_kv("origin", json!(origin)),
                json_kv("detail", json!(err.to_string())),
            ],
        );
        self.record_audit(
            LifecycleAuditEventBuilder::new(LifecycleStage::FaultAbsorbed)
                .detail("origin", json!(origin)),
        );
    }

    fn with_metrics(&self, apply: impl FnOnce(&mut LifecycleMetrics)) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                apply(&mut guard);
            }
        }
    }

    fn log_lifecycle<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, "helm::runtime", message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn record_audit(&self, builder: LifecycleAuditEventBuilder) {
        if let Some(audit) = self.config.audit.as_ref() {
            audit.record(builder.finish());
        }
    }
}

impl Drop for HelmRuntime {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            let _ = bridge.detach(&mut *self.services.registrar);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::bridge::{BindingToken, HostSignal};
    use super::*;
    use crate::patch::{RenderMixin, WidgetKind};
    use crate::preload::{ImageRef, InstantPreloaderFactory, Preloader, StageCompletion};
    use crate::probe::EngineKind;

    type CallLog = Arc<Mutex<Vec<String>>>;

    fn push(log: &CallLog, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    struct LogRegistrar {
        log: CallLog,
        added: Arc<Mutex<Vec<(HostSignal, BindingToken)>>>,
        removed: Arc<Mutex<Vec<(HostSignal, BindingToken)>>>,
    }

    impl SignalRegistrar for LogRegistrar {
        fn add_listener(&mut self, signal: HostSignal, token: BindingToken) -> Result<()> {
            push(&self.log, format!("registrar.add:{signal}"));
            self.added.lock().unwrap().push((signal, token));
            Ok(())
        }

        fn remove_listener(&mut self, signal: HostSignal, token: BindingToken) -> Result<()> {
            push(&self.log, format!("registrar.remove:{signal}"));
            self.removed.lock().unwrap().push((signal, token));
            Ok(())
        }
    }

    struct LogGraphics {
        log: CallLog,
    }

    impl GraphicsBackend for LogGraphics {
        fn init(&mut self) -> Result<()> {
            push(&self.log, "graphics.init");
            Ok(())
        }

        fn is_supported(&self) -> bool {
            true
        }
    }

    struct LogInput {
        log: CallLog,
    }

    impl InputDispatcher for LogInput {
        fn init(&mut self) -> Result<()> {
            push(&self.log, "input.init");
            Ok(())
        }

        fn attach_listeners(&mut self) -> Result<()> {
            push(&self.log, "input.attach_listeners");
            Ok(())
        }

        fn detach_listeners(&mut self) -> Result<()> {
            push(&self.log, "input.detach_listeners");
            Ok(())
        }

        fn clean_up(&mut self) -> Result<()> {
            push(&self.log, "input.clean_up");
            Ok(())
        }

        fn set_context_menu_gate(&mut self, _gate: ContextMenuGate) -> Result<()> {
            push(&self.log, "input.set_context_menu_gate");
            Ok(())
        }

        fn set_menu_authority(&mut self, _authority: Arc<dyn MenuAuthority>) -> Result<()> {
            push(&self.log, "input.set_menu_authority");
            Ok(())
        }
    }

    struct LogWidgets {
        log: CallLog,
    }

    impl WidgetTree for LogWidgets {
        fn ensure_root(&mut self) -> Result<()> {
            push(&self.log, "widgets.ensure_root");
            Ok(())
        }

        fn flush_redraw_queues(&mut self) -> Result<()> {
            push(&self.log, "widgets.flush_redraw_queues");
            Ok(())
        }
    }

    struct LogInventory {
        log: CallLog,
    }

    impl ImageInventory for LogInventory {
        fn visible_images(&self) -> Vec<ImageRef> {
            push(&self.log, "images.visible");
            vec!["v1.png".into(), "v2.png".into()]
        }

        fn hidden_images(&self) -> Vec<ImageRef> {
            push(&self.log, "images.hidden");
            vec!["h1.png".into()]
        }
    }

    struct HandoffPreloader {
        log: CallLog,
    }

    impl Preloader for HandoffPreloader {
        fn start(&mut self) -> Result<()> {
            push(&self.log, "preloader.start");
            Ok(())
        }

        fn dispose(&mut self) -> Result<()> {
            push(&self.log, "preloader.dispose");
            Ok(())
        }
    }

    /// Factory that parks each completion handle for the test to fire, the
    /// way a host image loader would finish asynchronously.
    struct HandoffFactory {
        log: CallLog,
        completions: Arc<Mutex<Vec<StageCompletion>>>,
    }

    impl PreloaderFactory for HandoffFactory {
        fn create(&self, images: Vec<ImageRef>, completion: StageCompletion) -> Box<dyn Preloader> {
            push(&self.log, format!("preloader.create:{}", images.len()));
            self.completions.lock().unwrap().push(completion);
            Box::new(HandoffPreloader {
                log: self.log.clone(),
            })
        }
    }

    struct LogMixins {
        log: CallLog,
    }

    impl MixinInstaller for LogMixins {
        fn attach(&mut self, widget: WidgetKind, mixin: RenderMixin) -> Result<()> {
            push(&self.log, format!("mixins.attach:{widget:?}:{mixin:?}"));
            Ok(())
        }
    }

    struct LogShim {
        log: CallLog,
    }

    impl CompatShim for LogShim {
        fn init(&mut self) -> Result<()> {
            push(&self.log, "shim.init");
            Ok(())
        }
    }

    struct LogObjects {
        log: CallLog,
    }

    impl DisposalRegistry for LogObjects {
        fn dispose_all(&mut self) -> Result<()> {
            push(&self.log, "objects.dispose_all");
            Ok(())
        }
    }

    struct CollectFaults {
        reports: Arc<Mutex<Vec<String>>>,
    }

    impl FaultReporter for CollectFaults {
        fn report(&mut self, error: &HelmError) {
            self.reports.lock().unwrap().push(error.to_string());
        }
    }

    struct InertMenus;

    impl MenuAuthority for InertMenus {
        fn dismiss_open_menus(&self) {}
    }

    struct Fixture {
        log: CallLog,
        completions: Arc<Mutex<Vec<StageCompletion>>>,
        faults: Arc<Mutex<Vec<String>>>,
        added: Arc<Mutex<Vec<(HostSignal, BindingToken)>>>,
        removed: Arc<Mutex<Vec<(HostSignal, BindingToken)>>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                completions: Arc::new(Mutex::new(Vec::new())),
                faults: Arc::new(Mutex::new(Vec::new())),
                added: Arc::new(Mutex::new(Vec::new())),
                removed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn services(&self) -> HostServices {
            HostServices {
                registrar: Box::new(LogRegistrar {
                    log: self.log.clone(),
                    added: self.added.clone(),
                    removed: self.removed.clone(),
                }),
                graphics: Box::new(LogGraphics {
                    log: self.log.clone(),
                }),
                input: Box::new(LogInput {
                    log: self.log.clone(),
                }),
                widgets: Box::new(LogWidgets {
                    log: self.log.clone(),
                }),
                images: Box::new(LogInventory {
                    log: self.log.clone(),
                }),
                preloaders: Box::new(HandoffFactory {
                    log: self.log.clone(),
                    completions: self.completions.clone(),
                }),
                mixins: Box::new(LogMixins {
                    log: self.log.clone(),
                }),
                shim: Box::new(LogShim {
                    log: self.log.clone(),
                }),
                objects: Box::new(LogObjects {
                    log: self.log.clone(),
                }),
                faults: Box::new(CollectFaults {
                    reports: self.faults.clone(),
                }),
                context_menu_gate: Arc::new(|| true),
                menu_authority: Arc::new(InertMenus),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.log.lock().unwrap().clear();
        }

        fn fire_completion(&self) {
            let completion = self
                .completions
                .lock()
                .unwrap()
                .pop()
                .expect("a stage is waiting on its preloader");
            completion.finish();
        }
    }

    fn supported_profile() -> HostProfile {
        HostProfile {
            engine: EngineKind::Gecko,
            engine_major: 100,
            document_mode: None,
            has_async_http: true,
            css_capable: true,
        }
    }

    fn unsupported_profile() -> HostProfile {
        HostProfile {
            engine: EngineKind::Trident,
            engine_major: 8,
            document_mode: Some(8),
            has_async_http: true,
            css_capable: false,
        }
    }

    struct TapObserver {
        log: CallLog,
        response: Option<String>,
        fail_on: Option<&'static str>,
    }

    impl TapObserver {
        fn new(log: CallLog) -> Self {
            Self {
                log,
                response: None,
                fail_on: None,
            }
        }
    }

    impl LifecycleObserver for TapObserver {
        fn name(&self) -> &str {
            "tap"
        }

        fn application_ready(&mut self) -> Result<()> {
            if self.fail_on == Some("application_ready") {
                return Err(HelmError::Host("observer refused".into()));
            }
            push(&self.log, "observer.application_ready");
            Ok(())
        }

        fn about_to_unload(&mut self, notice: &mut UnloadNotice) -> Result<()> {
            if self.fail_on == Some("about_to_unload") {
                return Err(HelmError::Host("observer refused".into()));
            }
            push(&self.log, "observer.about_to_unload");
            if let Some(response) = self.response.as_ref() {
                notice.set_response(response.clone());
            }
            Ok(())
        }

        fn unloaded(&mut self, _notice: &UnloadNotice) -> Result<()> {
            if self.fail_on == Some("unloaded") {
                return Err(HelmError::Host("observer refused".into()));
            }
            push(&self.log, "observer.unloaded");
            Ok(())
        }
    }

    #[test]
    fn unsupported_host_leaves_the_controller_inert() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            unsupported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");

        assert_eq!(runtime.phase(), RuntimePhase::Unsupported);
        assert!(fixture.calls().is_empty());

        runtime.handle_ready();
        runtime.pump(Duration::ZERO);
        assert_eq!(runtime.handle_about_to_unload(json!({})), None);
        runtime.handle_unloaded(json!({}));
        assert!(fixture.calls().is_empty());
        assert!(!runtime.ui_ready());

        drop(runtime);
        assert!(fixture.removed.lock().unwrap().is_empty());
    }

    #[test]
    fn construction_wires_collaborators_in_order() {
        let fixture = Fixture::new();
        let runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");

        assert_eq!(runtime.phase(), RuntimePhase::Idle);
        assert!(!runtime.ui_ready());
        assert_eq!(
            fixture.calls(),
            vec![
                "registrar.add:ready",
                "registrar.add:about-to-unload",
                "registrar.add:unloaded",
                "graphics.init",
                "mixins.attach:ProgressIndicator:NativeProgress",
                "input.set_context_menu_gate",
                "input.set_menu_authority",
            ]
        );
    }

    #[test]
    fn css_incapable_host_gets_the_fallback_patch_set() {
        let fixture = Fixture::new();
        let mut profile = supported_profile();
        profile.css_capable = false;
        let _runtime =
            HelmRuntime::new(profile, fixture.services(), RuntimeConfig::default()).expect("construct");

        let attaches: Vec<String> = fixture
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("mixins.attach"))
            .collect();
        assert_eq!(
            attaches,
            vec![
                "mixins.attach:Container:VectorFallback",
                "mixins.attach:BasicText:VectorFallback",
                "mixins.attach:GridRow:VectorFallback",
                "mixins.attach:CompositeCell:VectorFallback",
            ]
        );
    }

    #[test]
    fn startup_sequence_runs_in_the_specified_order() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        runtime.register_observer(TapObserver::new(fixture.log.clone()));
        fixture.clear_calls();

        runtime.handle_ready();
        assert_eq!(runtime.phase(), RuntimePhase::Loading);
        assert_eq!(fixture.calls(), vec!["widgets.ensure_root", "shim.init"]);

        runtime.pump(Duration::ZERO);
        assert_eq!(runtime.phase(), RuntimePhase::VisiblePreload);
        assert!(!runtime.ui_ready());

        fixture.fire_completion();
        runtime.pump(Duration::ZERO);
        assert_eq!(runtime.phase(), RuntimePhase::Ready);
        assert!(runtime.ui_ready());
        assert_eq!(
            fixture.calls(),
            vec![
                "widgets.ensure_root",
                "shim.init",
                "images.visible",
                "preloader.create:2",
                "preloader.start",
                "preloader.dispose",
                "input.init",
                "input.attach_listeners",
                "observer.application_ready",
                "widgets.flush_redraw_queues",
            ]
        );

        // The hidden stage waits out the short yield.
        runtime.pump(Duration::ZERO);
        assert_eq!(runtime.phase(), RuntimePhase::Ready);
        runtime.pump(SHORT_YIELD);
        assert_eq!(runtime.phase(), RuntimePhase::HiddenPreload);

        fixture.fire_completion();
        runtime.pump(Duration::ZERO);
        assert_eq!(runtime.phase(), RuntimePhase::Settled);

        let ready_notifications = fixture
            .calls()
            .iter()
            .filter(|call| *call == "observer.application_ready")
            .count();
        assert_eq!(ready_notifications, 1);
        assert!(fixture.faults.lock().unwrap().is_empty());
    }

    #[test]
    fn duplicate_ready_signal_runs_the_body_once() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        fixture.clear_calls();

        runtime.handle_ready();
        runtime.handle_ready();

        let roots = fixture
            .calls()
            .iter()
            .filter(|call| *call == "widgets.ensure_root")
            .count();
        assert_eq!(roots, 1);
        assert_eq!(runtime.pending_tasks(), 1);
    }

    #[test]
    fn scripted_run_with_instant_preloaders_settles() {
        let fixture = Fixture::new();
        let mut services = fixture.services();
        services.preloaders = Box::new(InstantPreloaderFactory);
        let mut runtime =
            HelmRuntime::new(supported_profile(), services, RuntimeConfig::default())
                .expect("construct");

        runtime.handle_ready();
        runtime.pump_until_idle();

        assert_eq!(runtime.phase(), RuntimePhase::Settled);
        assert!(runtime.ui_ready());
        assert!(fixture.faults.lock().unwrap().is_empty());
    }

    #[test]
    fn about_to_unload_returns_the_observer_response() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        let mut observer = TapObserver::new(fixture.log.clone());
        observer.response = Some("confirm".to_string());
        runtime.register_observer(observer);

        let response = runtime.handle_about_to_unload(json!({"reason": "navigation"}));
        assert_eq!(response.as_deref(), Some("confirm"));
        assert_eq!(runtime.teardown(), TeardownPhase::Unloading);
    }

    #[test]
    fn about_to_unload_without_a_response_allows_the_unload() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        runtime.register_observer(TapObserver::new(fixture.log.clone()));

        assert_eq!(runtime.handle_about_to_unload(json!({})), None);
    }

    #[test]
    fn about_to_unload_failure_still_produces_a_definite_answer() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        let mut observer = TapObserver::new(fixture.log.clone());
        observer.response = Some("confirm".to_string());
        observer.fail_on = Some("about_to_unload");
        runtime.register_observer(observer);

        assert_eq!(runtime.handle_about_to_unload(json!({})), None);
        let faults = fixture.faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert!(faults[0].contains("tap"));
    }

    #[test]
    fn unloaded_tears_down_in_the_exact_order() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        runtime.register_observer(TapObserver::new(fixture.log.clone()));
        fixture.clear_calls();

        runtime.handle_unloaded(json!({"final": true}));

        assert_eq!(
            fixture.calls(),
            vec![
                "observer.unloaded",
                "input.detach_listeners",
                "input.clean_up",
                "objects.dispose_all",
            ]
        );
        assert_eq!(runtime.teardown(), TeardownPhase::Disposed);
    }

    #[test]
    fn unloaded_failure_is_reported_and_skips_the_remaining_steps() {
        let fixture = Fixture::new();
        let mut runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");
        let mut observer = TapObserver::new(fixture.log.clone());
        observer.fail_on = Some("unloaded");
        runtime.register_observer(observer);
        fixture.clear_calls();

        runtime.handle_unloaded(json!({}));

        assert_eq!(fixture.faults.lock().unwrap().len(), 1);
        let calls = fixture.calls();
        assert!(!calls.contains(&"input.detach_listeners".to_string()));
        assert!(!calls.contains(&"objects.dispose_all".to_string()));
    }

    #[test]
    fn dropping_the_runtime_detaches_the_attached_tokens() {
        let fixture = Fixture::new();
        let runtime = HelmRuntime::new(
            supported_profile(),
            fixture.services(),
            RuntimeConfig::default(),
        )
        .expect("construct");

        let attached = fixture.added.lock().unwrap().clone();
        assert_eq!(attached.len(), 3);

        drop(runtime);

        let removed = fixture.removed.lock().unwrap().clone();
        assert_eq!(removed, attached);
    }

    #[test]
    fn metrics_and_logs_track_a_full_run() {
        let fixture = Fixture::new();
        let mut services = fixture.services();
        services.preloaders = Box::new(InstantPreloaderFactory);

        let sink = crate::logging::SharedMemorySink::new();
        let mut config = RuntimeConfig::default();
        config.logger = Some(sink.logger());
        config.enable_metrics();
        let metrics = config.metrics_handle().expect("metrics enabled");

        let mut runtime =
            HelmRuntime::new(supported_profile(), services, config).expect("construct");
        runtime.handle_ready();
        runtime.pump_until_idle();
        runtime.handle_unloaded(json!({}));

        let snapshot = metrics.lock().unwrap().snapshot(Duration::ZERO);
        assert_eq!(snapshot.signals, 2);
        assert_eq!(snapshot.stages_started, 2);
        assert_eq!(snapshot.stages_finished, 2);
        assert_eq!(snapshot.images_requested, 3);
        assert_eq!(snapshot.faults, 0);

        let messages: Vec<String> = sink.events().into_iter().map(|e| e.message).collect();
        for expected in [
            "runtime_constructed",
            "ready_handled",
            "ui_ready",
            "unload_handled",
        ] {
            assert!(messages.iter().any(|m| m == expected), "missing {expected}");
        }
    }
}
