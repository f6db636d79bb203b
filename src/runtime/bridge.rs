//! Registration bridge between the controller and the host's lifecycle
//! signals.
//!
//! The bridge performs no buffering and no reordering: the host delivers
//! signals directly per its own semantics. What the bridge guarantees is
//! identity: the token registered for each signal at attach time is the one
//! used at detach time. Removing with a fresh token would silently no-op on
//! the host side, leaking the registration.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Host-level lifecycle signals the controller subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostSignal {
    Ready,
    AboutToUnload,
    Unloaded,
}

impl HostSignal {
    pub const ALL: [HostSignal; 3] = [
        HostSignal::Ready,
        HostSignal::AboutToUnload,
        HostSignal::Unloaded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostSignal::Ready => "ready",
            HostSignal::AboutToUnload => "about-to-unload",
            HostSignal::Unloaded => "unloaded",
        }
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identity of one attached handler. Minted once per registration;
/// process-unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingToken(u64);

static NEXT_BINDING: AtomicU64 = AtomicU64::new(1);

impl BindingToken {
    fn mint() -> Self {
        Self(NEXT_BINDING.fetch_add(1, Ordering::Relaxed))
    }
}

/// Host event-registration facility for the shared global target.
pub trait SignalRegistrar: Send {
    fn add_listener(&mut self, signal: HostSignal, token: BindingToken) -> Result<()>;
    fn remove_listener(&mut self, signal: HostSignal, token: BindingToken) -> Result<()>;
}

/// Owns the three registrations for the controller's lifetime.
#[derive(Debug)]
pub struct SignalBridge {
    bindings: Vec<(HostSignal, BindingToken)>,
}

impl SignalBridge {
    /// Register all three signals. If a registration fails partway, the ones
    /// already added are removed before the error is returned.
    pub fn attach(registrar: &mut dyn SignalRegistrar) -> Result<Self> {
        let mut bindings: Vec<(HostSignal, BindingToken)> = Vec::with_capacity(3);
        for signal in HostSignal::ALL {
            let token = BindingToken::mint();
            if let Err(err) = registrar.add_listener(signal, token) {
                for (added, added_token) in bindings {
                    let _ = registrar.remove_listener(added, added_token);
                }
                return Err(err);
            }
            bindings.push((signal, token));
        }
        Ok(Self { bindings })
    }

    /// Remove exactly the registrations made at attach time. Consumes the
    /// bridge so the handles are released exactly once.
    pub fn detach(self, registrar: &mut dyn SignalRegistrar) -> Result<()> {
        for (signal, token) in self.bindings {
            registrar.remove_listener(signal, token)?;
        }
        Ok(())
    }

    pub fn bindings(&self) -> &[(HostSignal, BindingToken)] {
        &self.bindings
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::HelmError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Add(HostSignal, BindingToken),
        Remove(HostSignal, BindingToken),
    }

    #[derive(Default)]
    struct RecordingRegistrar {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_on: Option<HostSignal>,
    }

    impl SignalRegistrar for RecordingRegistrar {
        fn add_listener(&mut self, signal: HostSignal, token: BindingToken) -> Result<()> {
            if self.fail_on == Some(signal) {
                return Err(HelmError::Host(format!("refused {signal}")));
            }
            self.calls.lock().unwrap().push(Call::Add(signal, token));
            Ok(())
        }

        fn remove_listener(&mut self, signal: HostSignal, token: BindingToken) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Remove(signal, token));
            Ok(())
        }
    }

    #[test]
    fn attach_registers_each_signal_once() {
        let mut registrar = RecordingRegistrar::default();
        let bridge = SignalBridge::attach(&mut registrar).expect("attach");

        let calls = registrar.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let signals: Vec<HostSignal> = bridge.bindings().iter().map(|(s, _)| *s).collect();
        assert_eq!(signals, HostSignal::ALL);

        let mut tokens: Vec<BindingToken> = bridge.bindings().iter().map(|(_, t)| *t).collect();
        tokens.dedup();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn detach_reuses_the_attach_tokens() {
        let mut registrar = RecordingRegistrar::default();
        let bridge = SignalBridge::attach(&mut registrar).expect("attach");
        let attached: Vec<(HostSignal, BindingToken)> = bridge.bindings().to_vec();

        bridge.detach(&mut registrar).expect("detach");

        let calls = registrar.calls.lock().unwrap().clone();
        let removed: Vec<Call> = calls
            .iter()
            .copied()
            .filter(|call| matches!(call, Call::Remove(..)))
            .collect();
        assert_eq!(
            removed,
            attached
                .into_iter()
                .map(|(s, t)| Call::Remove(s, t))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn failed_attach_rolls_back_earlier_registrations() {
        let mut registrar = RecordingRegistrar {
            fail_on: Some(HostSignal::Unloaded),
            ..RecordingRegistrar::default()
        };
        let err = SignalBridge::attach(&mut registrar).unwrap_err();
        assert!(matches!(err, HelmError::Host(_)));

        let calls = registrar.calls.lock().unwrap().clone();
        let adds: Vec<Call> = calls
            .iter()
            .copied()
            .filter(|call| matches!(call, Call::Add(..)))
            .collect();
        let removes: Vec<Call> = calls
            .iter()
            .copied()
            .filter(|call| matches!(call, Call::Remove(..)))
            .collect();
        assert_eq!(adds.len(), 2);
        assert_eq!(removes.len(), 2);
    }
}
