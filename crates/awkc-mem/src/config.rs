//! Arena configuration.

/// Default growth size for new slabs (64 KiB).
pub const DEFAULT_SLAB_SIZE: usize = 64 * 1024;

/// Smallest slab size an arena will use (4 KiB).
pub const MIN_SLAB_SIZE: usize = 4 * 1024;

/// Settings for an [`Arena`](crate::Arena).
///
/// ```
/// use awkc_mem::{Arena, ArenaConfig};
///
/// let config = ArenaConfig::default()
///     .with_slab_size(16 * 1024)
///     .with_byte_limit(1 << 20);
/// let arena = Arena::with_config(config);
/// assert_eq!(arena.slab_size(), 16 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Capacity of each regular slab. Clamped to [`MIN_SLAB_SIZE`].
    pub slab_size: usize,
    /// Upper bound on the summed capacity of all live slabs.
    pub byte_limit: Option<usize>,
}

impl ArenaConfig {
    /// Creates a configuration with the given slab size and no byte limit.
    #[must_use]
    pub const fn new(slab_size: usize) -> Self {
        Self {
            slab_size,
            byte_limit: None,
        }
    }

    /// Sets the slab size.
    #[must_use]
    pub const fn with_slab_size(mut self, slab_size: usize) -> Self {
        self.slab_size = slab_size;
        self
    }

    /// Caps the total capacity of live slabs at `limit` bytes.
    #[must_use]
    pub const fn with_byte_limit(mut self, limit: usize) -> Self {
        self.byte_limit = Some(limit);
        self
    }

    /// Returns the slab size after applying the [`MIN_SLAB_SIZE`] floor.
    #[must_use]
    pub const fn effective_slab_size(&self) -> usize {
        if self.slab_size < MIN_SLAB_SIZE {
            MIN_SLAB_SIZE
        } else {
            self.slab_size
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SLAB_SIZE)
    }
}
