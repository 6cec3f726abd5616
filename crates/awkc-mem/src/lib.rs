//! `awkc` memory management infrastructure
//!
//! This crate provides the allocation layer every `awkc` compiler phase
//! builds on:
//!
//! - **Arena allocation**: slab-chained bump allocation with reset and
//!   scoped rollback ([`Arena`], [`ArenaScope`])
//! - **String interning**: canonical, address-comparable identifiers and
//!   literals stored in an arena (requires the `string-pool` feature)
//! - **Arena factory**: explicit creation of per-pass and scratch arenas
//!   (requires the `arena-factory` feature)
//!
//! ```
//! use awkc_mem::Arena;
//!
//! let mut arena = Arena::default();
//! let program = arena.dup_str("{ print NR }")?;
//! assert_eq!(program, "{ print NR }");
//!
//! arena.scoped(|scratch| scratch.alloc_zeroed(4096, 16).map(|buf| buf.len()))?;
//! assert_eq!(arena.stats().allocation_count, 1);
//! # Ok::<(), awkc_mem::Error>(())
//! ```

pub mod arena;
pub mod config;
pub mod error;

#[cfg(feature = "string-pool")]
pub mod interned;
#[cfg(feature = "string-pool")]
pub mod pool;

#[cfg(feature = "arena-factory")]
pub mod factory;

pub use arena::{Arena, ArenaMarker, ArenaScope, ArenaStats, DEFAULT_ALIGNMENT};
pub use config::{ArenaConfig, DEFAULT_SLAB_SIZE, MIN_SLAB_SIZE};
pub use error::{Error, Result};

#[cfg(feature = "string-pool")]
pub use interned::InternedStr;
#[cfg(feature = "string-pool")]
pub use pool::{DEFAULT_POOL_CAPACITY, PoolStats, StringPool};

#[cfg(feature = "arena-factory")]
pub use factory::ArenaFactory;
