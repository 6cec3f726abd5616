//! String interning over arena memory.
//!
//! A [`StringPool`] maps every distinct string to one canonical arena copy,
//! so identifiers and literals can be compared by address during symbol
//! resolution and flow analysis.
//!
//! # Design
//!
//! The pool is an open-addressing table with linear probing. Each slot holds
//! the canonical string and its 64-bit FNV-1a hash. Both the table and the
//! string bytes live in the bound [`Arena`]; the pool owns nothing itself.
//!
//! The table doubles before an insertion would take it to 75% occupancy.
//! Entries are reinserted by their stored hash, and the old table stays in
//! the arena as dead space until the arena is reset.
//!
//! # Examples
//!
//! ```
//! use awkc_mem::{Arena, StringPool};
//!
//! let arena = Arena::new(4096);
//! let mut pool = StringPool::new(&arena).unwrap();
//!
//! let hello = pool.intern("hello").unwrap();
//! assert_eq!(pool.intern("hello").unwrap(), hello);
//! pool.intern("world").unwrap();
//!
//! assert_eq!(pool.len(), 2);
//! ```
//!
//! Strings interned in a scoped region go away with it, and the compiler
//! makes sure the pool does too:
//!
//! ```
//! use awkc_mem::{Arena, StringPool};
//!
//! let mut arena = Arena::new(4096);
//! {
//!     let scope = arena.scope();
//!     let mut locals = StringPool::with_capacity(&scope, 16).unwrap();
//!     locals.intern("i").unwrap();
//! }
//! assert_eq!(arena.stats().total_allocated, 0);
//! ```
//!
//! # Performance
//!
//! - **Hit**: one hash, a short probe, zero allocation
//! - **Miss**: one hash, a probe, one arena copy of the bytes
//! - **Growth**: amortised O(1); reinsertion never rehashes bytes

use std::fmt;
use std::iter::FusedIterator;
use std::slice;

use awkc_log::debug;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::interned::InternedStr;

/// Slot count of a pool created with [`StringPool::new`].
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// One table slot. `text == None` marks an empty slot; the empty string is
/// never stored.
#[derive(Clone, Copy)]
struct Entry<'a> {
    text: Option<&'a str>,
    hash: u64,
}

impl Entry<'_> {
    const EMPTY: Entry<'static> = Entry {
        text: None,
        hash: 0,
    };
}

/// First empty slot on the probe sequence of `hash`.
///
/// The load factor keeps at least one slot free, so the probe terminates.
fn vacant_slot(table: &[Entry<'_>], hash: u64) -> usize {
    let mask = table.len() - 1;
    let mut index = (hash as usize) & mask;
    while table[index].text.is_some() {
        index = (index + 1) & mask;
    }
    index
}

/// Interning counters, cumulative over the pool's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Lookups answered by an existing entry.
    pub hits: u64,
    /// Strings copied into the arena as new entries.
    pub misses: u64,
    /// Times the table doubled.
    pub rehashes: u64,
}

/// Open-addressing string interning table bound to an [`Arena`].
///
/// Equal strings interned through the same pool yield the same address;
/// different strings never alias. See the [module docs](self) for the
/// table layout.
pub struct StringPool<'a> {
    arena: &'a Arena,
    table: &'a mut [Entry<'a>],
    count: usize,
    stats: PoolStats,
}

impl<'a> StringPool<'a> {
    /// Creates a pool with [`DEFAULT_POOL_CAPACITY`] slots.
    ///
    /// # Errors
    ///
    /// Returns the arena error if the table cannot be allocated.
    pub fn new(arena: &'a Arena) -> Result<Self> {
        Self::with_capacity(arena, DEFAULT_POOL_CAPACITY)
    }

    /// Creates a pool whose table starts with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub fn with_capacity(arena: &'a Arena, capacity: usize) -> Result<Self> {
        assert!(
            capacity.is_power_of_two(),
            "string pool capacity must be a power of two, got {capacity}"
        );

        let table = arena.alloc_array_with(capacity, |_| Entry::EMPTY)?;
        Ok(StringPool {
            arena,
            table,
            count: 0,
            stats: PoolStats::default(),
        })
    }

    /// Returns the canonical copy of `s`, copying it into the arena on first
    /// sight.
    ///
    /// The empty string is answered with [`InternedStr::EMPTY`] without
    /// touching the table.
    ///
    /// # Errors
    ///
    /// Returns the arena error if growing the table or copying the bytes
    /// fails. The pool is left as it was before the call.
    pub fn intern(&mut self, s: &str) -> Result<InternedStr<'a>> {
        if s.is_empty() {
            return Ok(InternedStr::EMPTY);
        }
        self.intern_hashed(s, fnv1a(s.as_bytes()))
    }

    fn intern_hashed(&mut self, s: &str, hash: u64) -> Result<InternedStr<'a>> {
        if let Some(text) = self.find(s, hash) {
            self.stats.hits += 1;
            return Ok(InternedStr::new(text));
        }

        if (self.count + 1) * 4 >= self.table.len() * 3 {
            self.grow()?;
        }

        let text = self.arena.dup_str(s)?;
        let index = vacant_slot(self.table, hash);
        self.table[index] = Entry {
            text: Some(text),
            hash,
        };
        self.count += 1;
        self.stats.misses += 1;

        Ok(InternedStr::new(text))
    }

    /// Looks `s` up without inserting it.
    ///
    /// The empty string is always present.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<InternedStr<'a>> {
        if s.is_empty() {
            return Some(InternedStr::EMPTY);
        }
        self.find(s, fnv1a(s.as_bytes())).map(InternedStr::new)
    }

    /// Returns true if `s` has been interned.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.get(s).is_some()
    }

    /// Empties every slot without shrinking or reallocating the table.
    ///
    /// The bytes of previously interned strings stay in the arena until the
    /// arena itself is reset or dropped. Handles obtained earlier remain
    /// readable but are no longer canonical: interning the same text again
    /// yields a new address.
    pub fn reset(&mut self) {
        self.table.fill(Entry::EMPTY);
        self.count = 0;
    }

    /// Number of interned (non-empty) strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if nothing has been interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots in the table.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    /// The arena holding the table and the strings.
    #[must_use]
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// Interning counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Iterates over the interned strings in table order.
    pub fn iter(&self) -> Iter<'_, 'a> {
        Iter {
            entries: self.table.iter(),
        }
    }

    fn find(&self, s: &str, hash: u64) -> Option<&'a str> {
        let mask = self.table.len() - 1;
        let mut index = (hash as usize) & mask;
        loop {
            let entry = self.table[index];
            match entry.text {
                None => return None,
                Some(text) if entry.hash == hash && text == s => return Some(text),
                Some(_) => index = (index + 1) & mask,
            }
        }
    }

    /// Moves every entry into a fresh table of twice the capacity.
    fn grow(&mut self) -> Result<()> {
        let old_capacity = self.table.len();
        let capacity = old_capacity
            .checked_mul(2)
            .ok_or(Error::CapacityOverflow {
                size: old_capacity,
                align: align_of::<Entry<'_>>(),
            })?;

        let table = self.arena.alloc_array_with(capacity, |_| Entry::EMPTY)?;
        for entry in self.table.iter().filter(|entry| entry.text.is_some()) {
            let index = vacant_slot(table, entry.hash);
            table[index] = *entry;
        }

        debug!(
            "string pool grew from {} to {} slots holding {} strings",
            old_capacity, capacity, self.count
        );

        self.table = table;
        self.stats.rehashes += 1;
        Ok(())
    }
}

impl<'a, 'p> IntoIterator for &'p StringPool<'a> {
    type Item = InternedStr<'a>;
    type IntoIter = Iter<'p, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the strings of a [`StringPool`], in table order.
#[derive(Clone)]
pub struct Iter<'p, 'a> {
    entries: slice::Iter<'p, Entry<'a>>,
}

impl<'a> Iterator for Iter<'_, 'a> {
    type Item = InternedStr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.find_map(|entry| entry.text.map(InternedStr::new))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entries.len()))
    }
}

impl FusedIterator for Iter<'_, '_> {}

impl fmt::Debug for Iter<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining_slots", &self.entries.len())
            .finish()
    }
}

impl fmt::Debug for StringPool<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringPool")
            .field("len", &self.count)
            .field("capacity", &self.table.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
