//! Default Pool Provider
//!
//! Holds the pool that `play_default()` routes to. The state is
//! thread-confined: each thread sees its own backend, settings and default
//! pool, and nothing here is shared across threads.

use std::cell::RefCell;

use crate::device::AudioBackend;
use crate::pool::UnitPool;
use crate::settings::PoolSettings;
use crate::{Result, SoundSnapError};

#[derive(Default)]
struct ProviderState {
    backend: Option<AudioBackend>,
    settings: PoolSettings,
    pool: Option<UnitPool>,
}

thread_local! {
    static PROVIDER: RefCell<ProviderState> = RefCell::new(ProviderState::default());
}

/// Backend and settings used when the default pool is created on demand.
///
/// An already existing default pool is kept.
pub fn install_backend(backend: AudioBackend, settings: PoolSettings) {
    PROVIDER.with(|state| {
        let mut state = state.borrow_mut();
        state.backend = Some(backend);
        state.settings = settings;
    });
}

/// Replace the default pool.
pub fn set_default_pool(pool: UnitPool) {
    // The previous pool may end playbacks on drop; release the borrow first.
    let previous = PROVIDER.with(|state| state.borrow_mut().pool.replace(pool));
    drop(previous);
}

/// The default pool, created from the installed backend on first use when
/// the settings allow it.
pub fn default_pool() -> Result<UnitPool> {
    PROVIDER.with(|state| {
        let mut state = state.borrow_mut();
        if let Some(pool) = &state.pool {
            return Ok(pool.clone());
        }
        if !state.settings.auto_create_pool {
            return Err(SoundSnapError::NoDefaultPool);
        }
        let backend = state.backend.clone().ok_or(SoundSnapError::NoDefaultPool)?;
        tracing::debug!(
            initial = state.settings.initial_unit_count,
            max = state.settings.max_unit_count,
            "creating default pool"
        );
        let pool = UnitPool::new(state.settings.clone(), backend);
        state.pool = Some(pool.clone());
        Ok(pool)
    })
}

/// Whether a default pool currently exists.
pub fn has_default_pool() -> bool {
    PROVIDER.with(|state| state.borrow().pool.is_some())
}

/// Host context reload: drops the default pool unless the settings ask to
/// keep it.
pub fn reload_context() {
    let dropped = PROVIDER.with(|state| {
        let mut state = state.borrow_mut();
        if state.settings.persist_across_reload {
            None
        } else {
            state.pool.take()
        }
    });
    if dropped.is_some() {
        tracing::debug!("default pool released on reload");
    }
}

/// Forget the backend, settings and default pool.
pub fn reset() {
    let previous = PROVIDER.with(|state| std::mem::take(&mut *state.borrow_mut()));
    drop(previous);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SnapBuilder;
    use crate::device::AudioClip;
    use crate::virtual_device::VirtualBackend;

    #[test]
    fn test_no_backend_no_pool() {
        reset();
        assert!(matches!(default_pool(), Err(SoundSnapError::NoDefaultPool)));
    }

    #[test]
    fn test_auto_create_once() {
        reset();
        let backend = VirtualBackend::new();
        install_backend(backend.audio_backend(), PoolSettings::default());
        let first = default_pool().unwrap();
        let second = default_pool().unwrap();
        assert!(first.ptr_eq(&second));
        reset();
    }

    #[test]
    fn test_auto_create_disabled() {
        reset();
        let backend = VirtualBackend::new();
        let settings = PoolSettings {
            auto_create_pool: false,
            ..PoolSettings::default()
        };
        install_backend(backend.audio_backend(), settings.clone());
        assert!(default_pool().is_err());

        set_default_pool(UnitPool::new(settings, backend.audio_backend()));
        assert!(default_pool().is_ok());
        reset();
    }

    #[test]
    fn test_reload_respects_persistence() {
        reset();
        let backend = VirtualBackend::new();
        install_backend(backend.audio_backend(), PoolSettings::default());
        default_pool().unwrap();
        reload_context();
        assert!(has_default_pool());

        let settings = PoolSettings {
            persist_across_reload: false,
            ..PoolSettings::default()
        };
        install_backend(backend.audio_backend(), settings);
        reload_context();
        assert!(!has_default_pool());
        reset();
    }

    #[test]
    fn test_play_default_uses_provider() {
        reset();
        let backend = VirtualBackend::new();
        let settings = PoolSettings {
            warn_on_missing_mixer_group: false,
            ..PoolSettings::default()
        };
        install_backend(backend.audio_backend(), settings);
        let handle = SnapBuilder::get()
            .with_clip(AudioClip::new("ping", 1_000, 1_000, 1))
            .and_then(SnapBuilder::play_default)
            .unwrap();
        assert!(handle.is_active());

        reset();
        assert!(!handle.is_active());
    }
}
