//! Lifecycle Callbacks
//!
//! Ordered, detachable callback lists attached to a playback. Each callback
//! runs in isolation: a panic is caught, logged and does not stop the
//! callbacks registered after it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

/// Why a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackEndCause {
    /// Stopped by the caller, or interrupted by a new request on the same unit.
    Stop,
    /// Reached its natural end or exhausted its loop count.
    Finish,
    /// The unit was torn down while active.
    Destroy,
}

/// Identifies a registered callback so it can be detached later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

impl CallbackId {
    fn next() -> Self {
        Self(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered list of callbacks receiving an argument of type `A`.
pub struct CallbackList<A> {
    entries: Vec<(CallbackId, Rc<dyn Fn(A)>)>,
}

impl<A: Copy> CallbackList<A> {
    /// An empty list.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a callback; it runs after every callback already present.
    pub fn push(&mut self, callback: impl Fn(A) + 'static) -> CallbackId {
        let id = CallbackId::next();
        self.entries.push((id, Rc::new(callback)));
        id
    }

    /// Detach a callback. Returns `false` if it was not registered here.
    pub fn remove(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Append every callback of `other`, keeping their ids.
    pub fn extend(&mut self, other: &CallbackList<A>) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every callback.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Run every callback in registration order.
    ///
    /// A panicking callback is logged and skipped; the remaining callbacks
    /// still run.
    pub fn invoke(&self, arg: A) {
        for (id, callback) in &self.entries {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(arg)));
            if let Err(payload) = result {
                error!(
                    callback = id.0,
                    reason = panic_message(&*payload),
                    "playback callback panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<A: Copy> Default for CallbackList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for CallbackList<A> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<A> fmt::Debug for CallbackList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, _)| id))
            .finish()
    }
}

/// Every lifecycle hook a playback can carry.
#[derive(Debug, Clone, Default)]
pub struct PlaybackCallbacks {
    /// The device began producing audio.
    pub on_start: CallbackList<()>,
    /// The playback wrapped around its loop window.
    pub on_loop: CallbackList<()>,
    /// The playback ended with cause `Stop` or `Destroy`.
    pub on_stop: CallbackList<()>,
    /// The playback ended with cause `Finish`.
    pub on_complete: CallbackList<()>,
    /// The playback ended, with its cause.
    pub on_end: CallbackList<PlaybackEndCause>,
}

impl PlaybackCallbacks {
    /// Detach `id` from whichever list holds it.
    pub fn remove(&mut self, id: CallbackId) -> bool {
        self.on_start.remove(id)
            || self.on_loop.remove(id)
            || self.on_stop.remove(id)
            || self.on_complete.remove(id)
            || self.on_end.remove(id)
    }

    /// Fire the end-of-playback hooks for `cause`.
    pub(crate) fn fire_end(&self, cause: PlaybackEndCause) {
        match cause {
            PlaybackEndCause::Finish => self.on_complete.invoke(()),
            PlaybackEndCause::Stop | PlaybackEndCause::Destroy => self.on_stop.invoke(()),
        }
        self.on_end.invoke(cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_invoke_runs_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = CallbackList::new();
        for n in 0..3 {
            let log = Rc::clone(&log);
            list.push(move |()| log.borrow_mut().push(n));
        }
        list.invoke(());
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let hits = Rc::new(RefCell::new(0));
        let mut list = CallbackList::new();
        list.push(|()| panic!("boom"));
        let counter = Rc::clone(&hits);
        list.push(move |()| *counter.borrow_mut() += 1);

        list.invoke(());
        list.invoke(());
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn test_remove_detaches_only_that_callback() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut list = CallbackList::new();
        let a = {
            let hits = Rc::clone(&hits);
            list.push(move |cause: PlaybackEndCause| hits.borrow_mut().push(("a", cause)))
        };
        {
            let hits = Rc::clone(&hits);
            list.push(move |cause| hits.borrow_mut().push(("b", cause)));
        }

        assert!(list.remove(a));
        assert!(!list.remove(a));
        list.invoke(PlaybackEndCause::Finish);
        assert_eq!(*hits.borrow(), vec![("b", PlaybackEndCause::Finish)]);
    }

    #[test]
    fn test_fire_end_routes_by_cause() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut callbacks = PlaybackCallbacks::default();
        {
            let log = Rc::clone(&log);
            callbacks.on_stop.push(move |()| log.borrow_mut().push("stop"));
        }
        {
            let log = Rc::clone(&log);
            callbacks
                .on_complete
                .push(move |()| log.borrow_mut().push("complete"));
        }
        {
            let log = Rc::clone(&log);
            callbacks.on_end.push(move |_| log.borrow_mut().push("end"));
        }

        callbacks.fire_end(PlaybackEndCause::Finish);
        callbacks.fire_end(PlaybackEndCause::Destroy);
        assert_eq!(*log.borrow(), vec!["complete", "end", "stop", "end"]);
    }
}
