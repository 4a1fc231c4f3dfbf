//! Generational Slots
//!
//! A slot pairs a mutable value with a 16-bit version counter. References
//! into a pool (handles, builders) capture the version at the moment they are
//! issued and stay valid only while the slot still carries that version.
//!
//! A slot whose counter reaches [`RETIRED_VERSION`] is retired: a reference
//! captured at that version could never be told apart from a future one after
//! the counter wrapped, so the owning pool stops recycling the slot instead.

/// Version value at which a slot is permanently taken out of circulation.
pub const RETIRED_VERSION: u16 = u16::MAX;

/// Outcome of bumping a slot's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// The slot can go back to its free list.
    Recyclable,
    /// The slot reached [`RETIRED_VERSION`] and must not be handed out again.
    Retired,
}

/// A value guarded by a monotonically increasing version.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    value: T,
    version: u16,
}

impl<T> Versioned<T> {
    /// Wrap a value at version 0.
    pub fn new(value: T) -> Self {
        Self { value, version: 0 }
    }

    #[cfg(test)]
    pub(crate) fn with_version(value: T, version: u16) -> Self {
        Self { value, version }
    }

    #[cfg(test)]
    pub(crate) fn set_version(&mut self, version: u16) {
        self.version = version;
    }

    /// Current version of the slot.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Whether a reference captured at `captured` still points at the live value.
    #[inline]
    pub fn is_valid(&self, captured: u16) -> bool {
        self.version == captured
    }

    /// Whether the slot has been taken out of circulation.
    #[inline]
    pub fn is_retired(&self) -> bool {
        self.version == RETIRED_VERSION
    }

    /// Invalidate every outstanding reference by advancing the version.
    ///
    /// A retired slot stays retired; its version never wraps back to 0.
    pub fn bump(&mut self) -> SlotStatus {
        if self.version < RETIRED_VERSION {
            self.version += 1;
        }
        if self.is_retired() {
            SlotStatus::Retired
        } else {
            SlotStatus::Recyclable
        }
    }

    /// Borrow the value if `captured` matches the live version.
    #[inline]
    pub fn get(&self, captured: u16) -> Option<&T> {
        if self.is_valid(captured) {
            Some(&self.value)
        } else {
            None
        }
    }

    /// Mutably borrow the value if `captured` matches the live version.
    #[inline]
    pub fn get_mut(&mut self, captured: u16) -> Option<&mut T> {
        if self.is_valid(captured) {
            Some(&mut self.value)
        } else {
            None
        }
    }

    /// Borrow the value without a version check (owner access).
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Mutably borrow the value without a version check (owner access).
    #[inline]
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Index + version pair identifying one issue of a slot inside an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub(crate) index: u32,
    pub(crate) version: u16,
}

impl SlotKey {
    pub(crate) fn new(index: usize, version: u16) -> Self {
        Self {
            index: index as u32,
            version,
        }
    }

    /// Position of the slot inside its arena.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Version captured when the key was issued.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }
}
