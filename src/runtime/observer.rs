//! Notifications emitted by the controller and the subscriber contract.

use serde_json::Value;

use crate::error::Result;

/// Subscriber to the controller's lifecycle notifications. Hooks default to
/// no-ops so observers implement only what they care about. Dispatch follows
/// registration order; an error aborts the remaining steps of that handler
/// invocation only.
pub trait LifecycleObserver: Send {
    fn name(&self) -> &str {
        "lifecycle_observer"
    }

    /// Fired exactly once, after the visible preload stage completes and
    /// before the global redraw queues are flushed.
    fn application_ready(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fired when the host is about to leave the page. Cancelable: set a
    /// response to ask the host for a confirmation prompt.
    fn about_to_unload(&mut self, _notice: &mut UnloadNotice) -> Result<()> {
        Ok(())
    }

    /// Terminal notification; the process is ending.
    fn unloaded(&mut self, _notice: &UnloadNotice) -> Result<()> {
        Ok(())
    }
}

/// Wrapped host unload event carried to observers.
#[derive(Debug, Clone)]
pub struct UnloadNotice {
    detail: Value,
    cancelable: bool,
    response: Option<String>,
}

impl UnloadNotice {
    /// Notice for "about-to-unload": observers may set a response.
    pub fn cancelable(detail: Value) -> Self {
        Self {
            detail,
            cancelable: true,
            response: None,
        }
    }

    /// Notice for "unloaded": terminal, responses are ignored.
    pub fn terminal(detail: Value) -> Self {
        Self {
            detail,
            cancelable: false,
            response: None,
        }
    }

    /// Raw payload the host delivered with the signal.
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    /// Ask the host to show a confirmation prompt with the given text.
    /// Ignored on the terminal notice.
    pub fn set_response(&mut self, text: impl Into<String>) {
        if self.cancelable {
            self.response = Some(text.into());
        }
    }

    pub fn clear_response(&mut self) {
        self.response = None;
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn into_response(self) -> Option<String> {
        self.response
    }
}
