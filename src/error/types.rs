use thiserror::Error;

use crate::preload::StageKind;

/// Unified result type for the Helm MVP crate.
pub type Result<T> = std::result::Result<T, HelmError>;

/// Errors surfaced by the lifecycle controller and its collaborators.
#[derive(Debug, Error)]
pub enum HelmError {
    #[error("host collaborator failure: {0}")]
    Host(String),
    #[error("observer `{observer}` failed: {source}")]
    Observer {
        observer: String,
        #[source]
        source: Box<HelmError>,
    },
    #[error("no {0} preload stage is live")]
    StageMissing(StageKind),
    #[error("a {active} preload stage is already live")]
    StageOverlap { active: StageKind },
    #[error("host profile parse error: {0}")]
    Profile(#[from] serde_json::Error),
}

impl HelmError {
    /// Wrap an error raised inside an observer callback with the observer name.
    pub fn observer(observer: impl Into<String>, source: HelmError) -> Self {
        Self::Observer {
            observer: observer.into(),
            source: Box::new(source),
        }
    }
}
