//! Staged asset preloading.
//!
//! A stage is one bounded pass over a fixed image set: hand the set to the
//! host's preloader, wait for its single completion callback, release the
//! preloader. Image failures are absorbed by the preloader and never delay
//! completion; this is prefetch, not a hard dependency.

use std::fmt;

use crate::error::Result;
use crate::scheduler::{SystemTask, TaskScheduler, YieldClass};

/// Reference to one image asset known to the host's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for ImageRef {
    fn from(source: String) -> Self {
        Self(source)
    }
}

/// The two preload passes the controller runs, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Visible,
    Hidden,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Visible => "visible",
            StageKind::Hidden => "hidden",
        })
    }
}

/// Host image inventory. Which images count as visible is the host's call.
pub trait ImageInventory: Send {
    fn visible_images(&self) -> Vec<ImageRef>;
    fn hidden_images(&self) -> Vec<ImageRef>;
}

/// Host image preloader driving one stage. Implementations must invoke the
/// completion handle they were created with once every image in the set has
/// either loaded or failed, including when the set is empty.
pub trait Preloader: Send {
    fn start(&mut self) -> Result<()>;
    fn dispose(&mut self) -> Result<()>;
}

/// Creates one preloader per stage from the image set and completion handle.
pub trait PreloaderFactory: Send {
    fn create(&self, images: Vec<ImageRef>, completion: StageCompletion) -> Box<dyn Preloader>;
}

/// Single-shot completion handle handed to the preloader. Consuming `self`
/// makes a second invocation unrepresentable.
pub struct StageCompletion {
    scheduler: TaskScheduler,
    kind: StageKind,
}

impl StageCompletion {
    pub(crate) fn new(scheduler: TaskScheduler, kind: StageKind) -> Self {
        Self { scheduler, kind }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Report the stage finished. The controller picks the finish task up on
    /// its next pump.
    pub fn finish(self) {
        self.scheduler
            .schedule(YieldClass::Immediate, SystemTask::FinishPreload(self.kind));
    }
}

/// One live preload pass. The controller owns at most one at a time and
/// releases it when the finish task runs.
pub struct PreloadStage {
    kind: StageKind,
    image_count: usize,
    preloader: Box<dyn Preloader>,
}

impl PreloadStage {
    /// Construct the stage's preloader and start it.
    pub fn begin(
        kind: StageKind,
        images: Vec<ImageRef>,
        factory: &dyn PreloaderFactory,
        scheduler: &TaskScheduler,
    ) -> Result<Self> {
        let image_count = images.len();
        let completion = StageCompletion::new(scheduler.clone(), kind);
        let mut preloader = factory.create(images, completion);
        preloader.start()?;
        Ok(Self {
            kind,
            image_count,
            preloader,
        })
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// Dispose the preloader. Stages are never reused.
    pub fn release(mut self) -> Result<()> {
        self.preloader.dispose()
    }
}

/// Preloader that completes synchronously at `start()`. For hosts whose
/// image loading is already synchronous, and for scripted runs.
pub struct InstantPreloader {
    completion: Option<StageCompletion>,
}

impl Preloader for InstantPreloader {
    fn start(&mut self) -> Result<()> {
        if let Some(completion) = self.completion.take() {
            completion.finish();
        }
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InstantPreloaderFactory;

impl PreloaderFactory for InstantPreloaderFactory {
    fn create(&self, _images: Vec<ImageRef>, completion: StageCompletion) -> Box<dyn Preloader> {
        Box::new(InstantPreloader {
            completion: Some(completion),
        })
    }
}
