//! Cooperative Cancellation
//!
//! Single-threaded cancellation tokens that stop or pause a playback when
//! cancelled, plus a token that fires when a playback ends. Cancelling after
//! the playback already ended is a silent no-op.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callbacks::{CallbackId, CallbackList};
use crate::handle::Handle;
use crate::Result;

/// What a cancelled token does to a still-active playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationMode {
    /// Nothing.
    #[default]
    None,
    /// Stop it.
    Stop,
    /// Pause it.
    Pause,
}

#[derive(Default)]
struct TokenState {
    cancelled: bool,
    callbacks: CallbackList<()>,
}

/// Observer side of a [`CancellationSource`].
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Option<Rc<RefCell<TokenState>>>,
}

impl CancellationToken {
    /// A token that can never be cancelled.
    pub fn none() -> Self {
        Self { state: None }
    }

    /// Whether the source has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.borrow().cancelled)
    }

    /// Run `callback` on cancellation, or right away if already cancelled.
    ///
    /// Returns an id for [`unregister`](Self::unregister) while the
    /// callback is still pending.
    pub fn register(&self, callback: impl Fn(()) + 'static) -> Option<CallbackId> {
        let state = self.state.as_ref()?;
        if state.borrow().cancelled {
            let mut now = CallbackList::new();
            now.push(callback);
            now.invoke(());
            return None;
        }
        Some(state.borrow_mut().callbacks.push(callback))
    }

    /// Drop a pending callback.
    pub fn unregister(&self, id: CallbackId) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.borrow_mut().callbacks.remove(id))
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Owner side: cancels every token handed out.
#[derive(Clone)]
pub struct CancellationSource {
    state: Rc<RefCell<TokenState>>,
}

impl CancellationSource {
    /// A source that has not been cancelled.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(TokenState::default())),
        }
    }

    /// Token observing this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            state: Some(Rc::clone(&self.state)),
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    /// Cancel and run every registered callback once, in registration order.
    pub fn cancel(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };
        callbacks.invoke(());
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Handle {
    /// Stop or pause this playback when `token` is cancelled.
    pub fn with_cancellation(self, token: &CancellationToken, mode: CancellationMode) -> Self {
        let handle = self.clone();
        token.register(move |()| {
            if !handle.is_active() {
                return;
            }
            let _ = match mode {
                CancellationMode::None => Ok(()),
                CancellationMode::Stop => handle.stop(),
                CancellationMode::Pause => handle.pause(),
            };
        });
        self
    }

    /// A token cancelled when this playback ends, whatever the cause.
    pub fn end_token(&self) -> Result<CancellationToken> {
        let source = CancellationSource::new();
        let token = source.token();
        self.on_end(move |_| source.cancel())?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SnapBuilder, SnapBuilderPool};
    use crate::device::AudioClip;
    use crate::pool::{UnitPool, UnitState};
    use crate::settings::PoolSettings;
    use crate::virtual_device::VirtualBackend;
    use std::cell::Cell;

    fn play(pool: &UnitPool) -> Handle {
        let builders = SnapBuilderPool::new();
        SnapBuilder::rent(&builders)
            .with_clip(AudioClip::new("pad", 100_000, 1_000, 1))
            .and_then(|b| b.play(pool))
            .unwrap()
    }

    fn pool(backend: &VirtualBackend) -> UnitPool {
        let settings = PoolSettings {
            warn_on_missing_mixer_group: false,
            ..PoolSettings::default()
        };
        UnitPool::new(settings, backend.audio_backend())
    }

    #[test]
    fn test_cancel_stops_playback() {
        let backend = VirtualBackend::new();
        let pool = pool(&backend);
        let source = CancellationSource::new();
        let handle = play(&pool).with_cancellation(&source.token(), CancellationMode::Stop);
        source.cancel();
        assert!(!handle.is_active());
    }

    #[test]
    fn test_cancel_pauses_playback() {
        let backend = VirtualBackend::new();
        let pool = pool(&backend);
        let source = CancellationSource::new();
        let handle = play(&pool).with_cancellation(&source.token(), CancellationMode::Pause);
        source.cancel();
        assert_eq!(handle.state().unwrap(), UnitState::Paused);
    }

    #[test]
    fn test_cancel_after_end_is_noop() {
        let backend = VirtualBackend::new();
        let pool = pool(&backend);
        let source = CancellationSource::new();
        let handle = play(&pool).with_cancellation(&source.token(), CancellationMode::Stop);
        handle.stop().unwrap();
        let reused = play(&pool);
        source.cancel();
        assert!(reused.is_active());
    }

    #[test]
    fn test_register_after_cancel_runs_now() {
        let source = CancellationSource::new();
        source.cancel();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        assert!(source
            .token()
            .register(move |()| counter.set(counter.get() + 1))
            .is_none());
        assert_eq!(hits.get(), 1);
        assert!(!CancellationToken::none().is_cancelled());
    }

    #[test]
    fn test_end_token_fires_on_stop() {
        let backend = VirtualBackend::new();
        let pool = pool(&backend);
        let handle = play(&pool);
        let token = handle.end_token().unwrap();
        assert!(!token.is_cancelled());
        handle.stop().unwrap();
        assert!(token.is_cancelled());
    }
}
