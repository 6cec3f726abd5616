//! Factory for per-pass and scratch arenas.
//!
//! `ArenaFactory` replaces an ambient global or thread-local scratch arena:
//! a compiler phase that needs temporary memory receives a factory (or an
//! arena) explicitly, and every arena it creates is independent and freed
//! when dropped.
//!
//! # Examples
//!
//! ```
//! use awkc_mem::{ArenaConfig, ArenaFactory};
//!
//! let factory = ArenaFactory::new(ArenaConfig::new(16 * 1024));
//!
//! // A long-lived arena for one compilation unit
//! let unit = factory.create_arena();
//! let name = unit.dup_str("main").unwrap();
//!
//! // A throwaway arena for one lowering step
//! let width = factory.with_scratch(|scratch| {
//!     let buf = scratch.alloc_zeroed(256, 16).unwrap();
//!     buf.len()
//! });
//!
//! assert_eq!(name, "main");
//! assert_eq!(width, 256);
//! ```

use crate::arena::Arena;
use crate::config::ArenaConfig;

/// Creates arenas sharing one [`ArenaConfig`].
///
/// The factory is `Copy` and allocates nothing itself; arenas are never
/// pooled or reused between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaFactory {
    config: ArenaConfig,
}

impl ArenaFactory {
    /// Creates a factory for arenas configured with `config`.
    #[must_use]
    pub const fn new(config: ArenaConfig) -> Self {
        Self { config }
    }

    /// Configuration applied to every arena.
    #[must_use]
    pub const fn config(&self) -> ArenaConfig {
        self.config
    }

    /// Creates a fresh, empty arena.
    #[must_use]
    pub fn create_arena(&self) -> Arena {
        Arena::with_config(self.config)
    }

    /// Runs `f` against a temporary arena that is dropped afterwards.
    ///
    /// Nothing allocated in the scratch arena can escape `f`.
    pub fn with_scratch<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Arena) -> R,
    {
        let scratch = self.create_arena();
        f(&scratch)
    }
}
