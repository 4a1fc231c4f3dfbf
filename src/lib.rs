//! Pooled Sound Playback
//!
//! A bounded set of reusable playback units driven by a host tick loop.
//! Callers describe a playback with a pooled, allocation-free fluent builder,
//! hand the resulting request to a [`UnitPool`], and get back a [`Handle`]: a
//! version-stamped reference that becomes permanently stale the moment its
//! unit is stopped, finishes, or is reused.
//!
//! # Features
//! - Generational handles and builders with `StaleReference` detection
//! - Capacity-capped unit pool that degrades to an invalid handle under pressure
//! - Immediate, delayed and absolutely scheduled starts
//! - Native looping and sample-accurate loop windows with carry-over
//! - Overlap ducking for groups and identical clips
//! - Serde-backed pool settings and playback profiles (JSON or RON)
//!
//! The crate never renders audio: voices are supplied by the host through
//! [`PlaybackDevice`]. [`VirtualBackend`] is a headless implementation used by
//! the tests and the `soundsnap-sim` binary.
//!
//! # Crate feature flags
//! - `cli` (default): enables the `soundsnap-sim` simulator (`tracing-subscriber`, `anyhow`)
//!
//! # Quick start
//! ```no_run
//! use soundsnap::{AudioClip, PoolSettings, SnapBuilder, UnitPool, VirtualBackend};
//!
//! let backend = VirtualBackend::new();
//! let pool = UnitPool::new(PoolSettings::default(), backend.audio_backend());
//! let clip = AudioClip::new("click", 4_410, 44_100, 1);
//!
//! let handle = SnapBuilder::get()
//!     .with_clip(clip)?
//!     .with_volume(0.8)?
//!     .play(&pool)?;
//!
//! // once per frame
//! backend.advance(1.0 / 60.0);
//! pool.tick();
//! assert!(handle.is_active());
//! # Ok::<(), soundsnap::SoundSnapError>(())
//! ```

#![warn(missing_docs)]

pub mod builder; // Pooled Request Builders
pub mod callbacks; // Lifecycle Callbacks
pub mod cancel; // Cooperative Cancellation
pub mod device; // Device Abstraction
pub mod ducking; // Overlap Ducking
pub mod group; // Handle Groups
pub mod handle; // Playback Handles
pub mod pool; // Unit Pool
pub mod profile; // Serialized Profiles
pub mod provider; // Default Pool Provider
pub mod request; // Playback Requests
pub mod settings; // Pool Settings
pub mod slot; // Generational Slots
pub mod timing; // Start Timing
mod unit; // Playback Unit State Machine
pub mod virtual_device; // Headless Device

use std::fmt;

/// Which kind of version-checked reference went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// A playback handle.
    Handle,
    /// A parameter builder.
    Builder,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Handle => f.write_str("handle"),
            ReferenceKind::Builder => f.write_str("builder"),
        }
    }
}

/// Error types for pooled playback operations
#[derive(thiserror::Error, Debug)]
pub enum SoundSnapError {
    /// A handle or builder was used after its slot moved on to a new version
    #[error("Stale {0}: the referenced slot has been recycled")]
    StaleReference(ReferenceKind),

    /// `build()` was called without an audio clip
    #[error("Missing source: no audio clip was set")]
    MissingSource,

    /// Every unit is busy and the pool may not grow
    #[error("Capacity exceeded: all {max} playback units are in use")]
    CapacityExceeded {
        /// The configured ceiling.
        max: usize,
    },

    /// A raw timing-mode value outside the known modes
    #[error("Invalid timing mode: {0}")]
    InvalidTimingMode(i64),

    /// No default pool is installed and none may be created
    #[error("No default pool: install a backend or set a pool first")]
    NoDefaultPool,

    /// Invalid settings or profile data
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error while reading settings
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoundSnapError {
    /// Stale handle.
    pub fn stale_handle() -> Self {
        SoundSnapError::StaleReference(ReferenceKind::Handle)
    }

    /// Stale builder.
    pub fn stale_builder() -> Self {
        SoundSnapError::StaleReference(ReferenceKind::Builder)
    }

    /// Configuration error from any displayable cause.
    pub fn config(msg: impl fmt::Display) -> Self {
        SoundSnapError::Config(msg.to_string())
    }

    /// Whether this is a stale handle or builder.
    pub fn is_stale(&self) -> bool {
        matches!(self, SoundSnapError::StaleReference(_))
    }
}

impl From<String> for SoundSnapError {
    /// Converts a String into `SoundSnapError::Config`.
    fn from(msg: String) -> Self {
        SoundSnapError::Config(msg)
    }
}

impl From<&str> for SoundSnapError {
    /// Converts a string slice into `SoundSnapError::Config`.
    fn from(msg: &str) -> Self {
        SoundSnapError::Config(msg.to_string())
    }
}

/// Result type for pooled playback operations
pub type Result<T> = std::result::Result<T, SoundSnapError>;

// Public API exports
pub use builder::{RequestBuilder, SnapBuilder, SoundBuilder};
pub use callbacks::{CallbackId, CallbackList, PlaybackCallbacks, PlaybackEndCause};
pub use cancel::{CancellationMode, CancellationSource, CancellationToken};
pub use device::{AudioBackend, AudioClip, DeviceFactory, MixerGroup, PlaybackDevice, Vec3};
pub use ducking::{duck, overlap_volume_rate};
pub use group::{SnapGroup, SnapGroupMap};
pub use handle::Handle;
pub use pool::{PoolDiagnostics, UnitPool, UnitState};
pub use profile::{ClipLibrary, SnapProfile, SoundProfile};
pub use request::{LoopCount, LoopSettings, LoopWindow, PlaybackRequest, RequestParams};
pub use settings::PoolSettings;
pub use timing::{evaluate_dsp_time, DspClock, Timing, TimingMode};
pub use virtual_device::{VirtualBackend, VirtualClock, VirtualDeviceProbe};
