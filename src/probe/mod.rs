//! Host environment capability detection.
//!
//! The embedder describes its environment once, before the runtime is
//! constructed; the support verdict derived here is final for the process
//! lifetime. The probe has no side effects and is never re-run.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Rendering engine family reported by the embedding host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Trident,
    Gecko,
    WebKit,
    Blink,
    Presto,
    Unknown,
}

/// Capability descriptor for the embedding host. Embedders may build one
/// directly or parse the JSON handshake blob with [`HostProfile::from_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostProfile {
    pub engine: EngineKind,
    pub engine_major: u32,
    /// Active document compatibility mode. Hosts that do not distinguish a
    /// document mode from the negotiated engine version omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_mode: Option<u32>,
    /// Whether an asynchronous HTTP facility exists in the host global scope.
    pub has_async_http: bool,
    /// Selects the capability patch branch; not part of the support verdict.
    #[serde(default)]
    pub css_capable: bool,
}

impl HostProfile {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// False only for legacy Trident engines below major version 9.
    pub fn engine_supported(&self) -> bool {
        !(self.engine == EngineKind::Trident && self.engine_major < 9)
    }

    /// False only when a Trident host reports a document mode below 9. A
    /// document can downgrade its mode independently of the engine version;
    /// an absent mode passes.
    pub fn document_mode_supported(&self) -> bool {
        !(self.engine == EngineKind::Trident && self.document_mode.is_some_and(|mode| mode < 9))
    }

    pub fn async_http_supported(&self) -> bool {
        self.has_async_http
    }

    /// The support verdict: all three predicates must hold.
    pub fn is_supported(&self) -> bool {
        self.engine_supported() && self.document_mode_supported() && self.async_http_supported()
    }
}
