//! Per-modal open/close state machine.
//!
//! `Closed -> Open` on an open request, `Open -> Closing` on a close request,
//! and `Closing -> Closed` once the host reports that the closing frame has
//! been drawn. Local state is released on that last edge, never synchronously
//! with the close request.
//!
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use super::{Modal, ModalName, ModalRegistry, Subscription};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModalPhase {
    Closed,
    Open,
    Closing,
}

#[derive(Debug)]
pub struct ModalLifecycle<P> {
    phase: ModalPhase,
    payload: Option<P>,
    generation: u64,
}

impl<P> Default for ModalLifecycle<P> {
    fn default() -> Self {
        Self { phase: ModalPhase::Closed, payload: None, generation: 0 }
    }
}

impl<P> ModalLifecycle<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ModalPhase {
        self.phase
    }

    /// Still available while `Closing` so the closing frame can be drawn.
    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    /// Incremented on every open request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open from any phase. A second open replaces the payload.
    pub fn open(&mut self, payload: P) {
        self.phase = ModalPhase::Open;
        self.payload = Some(payload);
        self.generation += 1;
    }

    /// Returns `false` when not open.
    pub fn close(&mut self) -> bool {
        if self.phase != ModalPhase::Open {
            return false;
        }
        self.phase = ModalPhase::Closing;
        true
    }

    /// Complete a pending close, handing back the payload for cleanup.
    pub fn finish_transition(&mut self) -> Option<P> {
        if self.phase != ModalPhase::Closing {
            return None;
        }
        self.phase = ModalPhase::Closed;
        self.payload.take()
    }
}

struct HostState<P> {
    lifecycle: ModalLifecycle<P>,
    consumed: u64,
}

/// A mounted modal: a lifecycle fed by the registry's open and close events
/// for `M`. Dropping the host unmounts it.
pub struct ModalHost<M: Modal> {
    state: Arc<Mutex<HostState<M::Payload>>>,
    after_close: Option<Box<dyn FnMut(M::Payload) + Send>>,
    _open: Subscription,
    _close: Subscription,
}

impl<M: Modal> ModalHost<M>
where
    M::Payload: Clone,
{
    pub fn mount(registry: &ModalRegistry) -> Self {
        let state = Arc::new(Mutex::new(HostState { lifecycle: ModalLifecycle::new(), consumed: 0 }));
        let on_open = Arc::clone(&state);
        let open = registry.subscribe_open::<M, _>(move |payload| {
            on_open.lock().lifecycle.open(payload.clone());
        });
        let on_close = Arc::clone(&state);
        let close = registry.subscribe_close(M::NAME, move || {
            if !on_close.lock().lifecycle.close() {
                trace!(modal = M::NAME.as_str(), "close ignored: not open");
            }
        });
        Self { state, after_close: None, _open: open, _close: close }
    }

    /// Cleanup run once per close, after the closing transition ends.
    pub fn with_after_close(mut self, f: impl FnMut(M::Payload) + Send + 'static) -> Self {
        self.after_close = Some(Box::new(f));
        self
    }

    pub fn phase(&self) -> ModalPhase {
        self.state.lock().lifecycle.phase()
    }

    pub fn is_visible(&self) -> bool {
        self.phase() != ModalPhase::Closed
    }

    pub fn payload(&self) -> Option<M::Payload> {
        self.state.lock().lifecycle.payload().cloned()
    }

    /// Payload of an open request not yet consumed by the host, once.
    pub fn take_opened(&self) -> Option<M::Payload> {
        let mut state = self.state.lock();
        let generation = state.lifecycle.generation();
        if state.consumed == generation || state.lifecycle.phase() != ModalPhase::Open {
            return None;
        }
        state.consumed = generation;
        state.lifecycle.payload().cloned()
    }

    /// Finish a pending close. Returns `true` when a transition completed.
    pub fn finish_transition(&mut self) -> bool {
        let payload = self.state.lock().lifecycle.finish_transition();
        match payload {
            Some(payload) => {
                if let Some(cleanup) = self.after_close.as_mut() {
                    cleanup(payload);
                }
                true
            }
            None => false,
        }
    }
}

/// Type-erased view used by hosts that manage many modals at once.
pub trait HostControl {
    fn name(&self) -> ModalName;
    fn phase(&self) -> ModalPhase;
    fn finish_transition(&mut self) -> bool;
}

impl<M: Modal> HostControl for ModalHost<M>
where
    M::Payload: Clone,
{
    fn name(&self) -> ModalName {
        M::NAME
    }

    fn phase(&self) -> ModalPhase {
        ModalHost::phase(self)
    }

    fn finish_transition(&mut self) -> bool {
        ModalHost::finish_transition(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modal::{Notice, kinds};

    #[test]
    fn lifecycle_walks_open_closing_closed() {
        let mut lc = ModalLifecycle::new();
        assert!(!lc.close());
        lc.open(7);
        assert_eq!(lc.phase(), ModalPhase::Open);
        assert!(lc.close());
        assert_eq!(lc.phase(), ModalPhase::Closing);
        assert_eq!(lc.payload(), Some(&7));
        assert_eq!(lc.finish_transition(), Some(7));
        assert_eq!(lc.phase(), ModalPhase::Closed);
        assert_eq!(lc.finish_transition(), None);
    }

    #[test]
    fn reopen_replaces_payload() {
        let mut lc = ModalLifecycle::new();
        lc.open("first");
        lc.open("second");
        assert_eq!(lc.payload(), Some(&"second"));
        assert_eq!(lc.generation(), 2);
    }

    #[test]
    fn host_runs_after_close_once() {
        let registry = ModalRegistry::default();
        let cleaned = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cleaned);
        let mut host = ModalHost::<kinds::Notice>::mount(&registry)
            .with_after_close(move |n: Notice| sink.lock().push(n.message));

        registry.open::<kinds::Notice>(Notice::failure("oops"));
        assert_eq!(host.take_opened().map(|n| n.message), Some("oops".to_string()));
        assert_eq!(host.take_opened(), None);

        registry.close_modal::<kinds::Notice>();
        assert_eq!(host.phase(), ModalPhase::Closing);
        assert!(cleaned.lock().is_empty());

        assert!(host.finish_transition());
        assert!(!host.finish_transition());
        assert_eq!(*cleaned.lock(), vec!["oops".to_string()]);
    }
}
