use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use super::{Modal, ModalName};

/// Tracks which text input currently owns keystrokes.
///
/// Opening a modal clears it so the element underneath does not keep
/// receiving input while the modal is shown.
#[derive(Clone, Debug, Default)]
pub struct FocusTracker {
    current: Arc<Mutex<Option<&'static str>>>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self, id: &'static str) {
        *self.current.lock() = Some(id);
    }

    /// Clear focus, returning the id that held it.
    pub fn blur(&self) -> Option<&'static str> {
        self.current.lock().take()
    }

    pub fn current(&self) -> Option<&'static str> {
        *self.current.lock()
    }

    pub fn is_focused(&self, id: &str) -> bool {
        self.current() == Some(id)
    }
}

struct OpenHandler<P: 'static>(Box<dyn Fn(&P) + Send + Sync>);

type CloseHandler = dyn Fn() + Send + Sync;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Open,
    Close,
}

#[derive(Default)]
struct Channels {
    open: FxHashMap<ModalName, Vec<(u64, Arc<dyn Any + Send + Sync>)>>,
    close: FxHashMap<ModalName, Vec<(u64, Arc<CloseHandler>)>>,
}

struct Inner {
    channels: Mutex<Channels>,
    next_id: AtomicU64,
    focus: FocusTracker,
}

impl Inner {
    fn remove(&self, channel: Channel, name: ModalName, id: u64) {
        let mut channels = self.channels.lock();
        match channel {
            Channel::Open => {
                if let Some(slots) = channels.open.get_mut(&name) {
                    slots.retain(|(sid, _)| *sid != id);
                }
            }
            Channel::Close => {
                if let Some(slots) = channels.close.get_mut(&name) {
                    slots.retain(|(sid, _)| *sid != id);
                }
            }
        }
    }
}

/// Publish/subscribe dispatcher for modal open and close requests.
///
/// Delivery is synchronous, in registration order, to the subscribers present
/// at publish time. Nothing is buffered: a subscriber registered after an
/// event was published never sees it. Cloning yields another handle to the
/// same registry.
#[derive(Clone)]
pub struct ModalRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ModalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.inner.channels.lock();
        f.debug_struct("ModalRegistry")
            .field("open_names", &channels.open.len())
            .field("close_names", &channels.close.len())
            .finish()
    }
}

impl Default for ModalRegistry {
    fn default() -> Self {
        Self::new(FocusTracker::default())
    }
}

impl ModalRegistry {
    pub fn new(focus: FocusTracker) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: Mutex::new(Channels::default()),
                next_id: AtomicU64::new(1),
                focus,
            }),
        }
    }

    pub fn focus(&self) -> &FocusTracker {
        &self.inner.focus
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn subscription(&self, channel: Channel, name: ModalName, id: u64) -> Subscription {
        Subscription {
            inner: Arc::downgrade(&self.inner),
            channel,
            name,
            id,
        }
    }

    /// Run `handler` with the payload of every open request for `M`.
    pub fn subscribe_open<M, F>(&self, handler: F) -> Subscription
    where
        M: Modal,
        F: Fn(&M::Payload) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let erased: Arc<dyn Any + Send + Sync> = Arc::new(OpenHandler::<M::Payload>(Box::new(handler)));
        self.inner
            .channels
            .lock()
            .open
            .entry(M::NAME)
            .or_default()
            .push((id, erased));
        trace!(modal = M::NAME.as_str(), id, "open subscriber registered");
        self.subscription(Channel::Open, M::NAME, id)
    }

    /// Run `handler` on every close request for `name`.
    pub fn subscribe_close<F>(&self, name: ModalName, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.inner
            .channels
            .lock()
            .close
            .entry(name)
            .or_default()
            .push((id, Arc::new(handler) as Arc<CloseHandler>));
        trace!(modal = name.as_str(), id, "close subscriber registered");
        self.subscription(Channel::Close, name, id)
    }

    /// Ask the modal `M` to open with `payload`.
    ///
    /// Returns the number of subscribers that received the request; zero
    /// means no modal for `M` is mounted and the request was dropped.
    pub fn open<M: Modal>(&self, payload: M::Payload) -> usize {
        if let Some(prev) = self.inner.focus.blur() {
            trace!(modal = M::NAME.as_str(), focus = prev, "focus cleared before open");
        }
        let handlers: Vec<Arc<dyn Any + Send + Sync>> = {
            let channels = self.inner.channels.lock();
            channels
                .open
                .get(&M::NAME)
                .map(|slots| slots.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        if handlers.is_empty() {
            trace!(modal = M::NAME.as_str(), "open dropped: no subscribers");
            return 0;
        }

        let mut delivered = 0;
        for handler in handlers {
            let any: &(dyn Any + Send + Sync) = &*handler;
            match any.downcast_ref::<OpenHandler<M::Payload>>() {
                Some(OpenHandler(f)) => {
                    f(&payload);
                    delivered += 1;
                }
                None => warn!(
                    modal = M::NAME.as_str(),
                    payload = std::any::type_name::<M::Payload>(),
                    "open subscriber expects a different payload type; skipped"
                ),
            }
        }
        debug!(modal = M::NAME.as_str(), delivered, "modal open dispatched");
        delivered
    }

    /// [`open`](Self::open) for modals that carry no data.
    pub fn open_empty<M: Modal<Payload = ()>>(&self) -> usize {
        self.open::<M>(())
    }

    /// Ask the modal `name` to close. Returns the number of subscribers notified.
    pub fn close(&self, name: ModalName) -> usize {
        let handlers: Vec<Arc<CloseHandler>> = {
            let channels = self.inner.channels.lock();
            channels
                .close
                .get(&name)
                .map(|slots| slots.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in &handlers {
            handler();
        }
        debug!(modal = name.as_str(), delivered = handlers.len(), "modal close dispatched");
        handlers.len()
    }

    pub fn close_modal<M: Modal>(&self) -> usize {
        self.close(M::NAME)
    }

    /// Number of open and close subscribers currently registered for `name`.
    pub fn subscriber_count(&self, name: ModalName) -> (usize, usize) {
        let channels = self.inner.channels.lock();
        (
            channels.open.get(&name).map_or(0, Vec::len),
            channels.close.get(&name).map_or(0, Vec::len),
        )
    }
}

/// Handle for a registered handler; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    inner: Weak<Inner>,
    channel: Channel,
    name: ModalName,
    id: u64,
}

impl Subscription {
    pub fn name(&self) -> ModalName {
        self.name
    }

    pub fn unsubscribe(self) {}
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.channel, self.name, self.id);
            trace!(modal = self.name.as_str(), id = self.id, "subscriber removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Group;
    use crate::modal::kinds;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn open_handler_receives_payload_once() {
        let registry = ModalRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = registry.subscribe_open::<kinds::Notice, _>(move |n| sink.lock().push(n.message.clone()));

        let delivered = registry.open::<kinds::Notice>(crate::modal::Notice::failure("boom"));

        assert_eq!(delivered, 1);
        assert_eq!(*seen.lock(), vec!["boom".to_string()]);
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let registry = ModalRegistry::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let _a = registry.subscribe_open::<kinds::Notice, _>(move |_| first.lock().push("first"));
        let _b = registry.subscribe_open::<kinds::Notice, _>(move |_| second.lock().push("second"));

        assert_eq!(registry.open::<kinds::Notice>(crate::modal::Notice::failure("x")), 2);
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn subscriber_added_during_dispatch_misses_that_event() {
        let registry = ModalRegistry::default();
        let late_calls = Arc::new(AtomicUsize::new(0));
        let kept: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let inner = registry.clone();
        let counter = Arc::clone(&late_calls);
        let store = Arc::clone(&kept);
        let _sub = registry.subscribe_open::<kinds::Notice, _>(move |_| {
            if store.lock().is_empty() {
                let counter = Arc::clone(&counter);
                let late = inner.subscribe_open::<kinds::Notice, _>(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                store.lock().push(late);
            }
        });

        assert_eq!(registry.open::<kinds::Notice>(crate::modal::Notice::failure("one")), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscriber_count(ModalName::Notice), (2, 0));

        // The next request reaches both.
        assert_eq!(registry.open::<kinds::Notice>(crate::modal::Notice::failure("two")), 2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mismatched_handler_is_skipped() {
        let registry = ModalRegistry::default();
        // Bypass the typed API to register a handler with the wrong payload type.
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        let wrong: Arc<dyn Any + Send + Sync> = Arc::new(OpenHandler::<u32>(Box::new(move |_: &u32| {
            flag.fetch_add(1, Ordering::SeqCst);
        })));
        registry
            .inner
            .channels
            .lock()
            .open
            .entry(ModalName::EditGroupMembers)
            .or_default()
            .push((99, wrong));

        let group = Group { name: "staff".into(), members: vec![], is_admin: false };
        assert_eq!(registry.open::<kinds::EditGroupMembers>(group), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_may_reenter_registry() {
        let registry = ModalRegistry::default();
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let _close = registry.subscribe_close(ModalName::AddGroup, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let inner = registry.clone();
        let _open = registry.subscribe_open::<kinds::AddGroup, _>(move |_| {
            inner.close_modal::<kinds::AddGroup>();
        });

        registry.open_empty::<kinds::AddGroup>();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_clears_focus() {
        let focus = FocusTracker::new();
        let registry = ModalRegistry::new(focus.clone());
        focus.focus("page-search");
        registry.open_empty::<kinds::AddUser>();
        assert_eq!(focus.current(), None);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let registry = ModalRegistry::default();
        let sub = registry.subscribe_close(ModalName::Notice, || {});
        assert_eq!(registry.subscriber_count(ModalName::Notice), (0, 1));
        drop(sub);
        assert_eq!(registry.subscriber_count(ModalName::Notice), (0, 0));
    }
}
