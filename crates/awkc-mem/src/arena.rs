//! Region allocator for compiler passes.
//!
//! An [`Arena`] hands out memory from a chain of slabs by bumping an offset,
//! and reclaims everything at once. It is the backing store for AST nodes,
//! symbol records, scratch buffers and the string pool.
//!
//! - **Stable addresses**: data is never moved or copied once allocated
//! - **Bulk reclamation**: [`Arena::reset`] rewinds every slab and keeps its
//!   memory for the next pass
//! - **Scoped rollback**: [`Arena::scope`] returns a guard that restores the
//!   arena to its state at creation when dropped
//!
//! # Lifetimes
//!
//! Allocation methods take `&self` and return borrows of the arena.
//! Operations that invalidate memory ([`reset`](Arena::reset),
//! [`restore`](Arena::restore), [`release`](Arena::release)) take
//! `&mut self`, so the borrow checker rejects any allocation that would be
//! used after its memory was reclaimed.
//!
//! ```compile_fail
//! use awkc_mem::Arena;
//!
//! let mut arena = Arena::new(4096);
//! let name = arena.dup_str("BEGIN").unwrap();
//! arena.reset();
//! println!("{name}");
//! ```
//!
//! Values placed in the arena are never dropped. Store types whose
//! destructors matter elsewhere.
//!
//! # Examples
//!
//! ```
//! use awkc_mem::Arena;
//!
//! let mut arena = Arena::new(4096);
//!
//! let field = arena.alloc_value(42u32).unwrap();
//! let name = arena.dup_str("NR").unwrap();
//! assert_eq!(*field, 42);
//! assert_eq!(name, "NR");
//!
//! {
//!     let scope = arena.scope();
//!     scope.alloc_zeroed(1024, 16).unwrap();
//! } // rolled back here
//!
//! assert_eq!(arena.stats().allocation_count, 2);
//! ```

use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::slice;

use awkc_log::{debug, trace, warn};

use crate::config::ArenaConfig;
use crate::error::{Error, Result};

/// Default alignment for raw byte allocations.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Alignment of every slab's data region.
const SLAB_ALIGNMENT: usize = 16;

/// Arena allocation statistics.
///
/// Diagnostic only; nothing in the allocator depends on these values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Sum of requested sizes since creation, the last reset, or the
    /// restored marker.
    pub total_allocated: usize,
    /// Summed capacity of all live slabs.
    pub total_capacity: usize,
    /// Number of live slabs.
    pub slab_count: usize,
    /// Number of successful allocations counted like `total_allocated`.
    pub allocation_count: usize,
    /// Highest `total_allocated` ever observed. Survives reset and restore.
    pub peak_usage: usize,
}

/// A contiguous block of system memory with a bump cursor.
///
/// # Safety
///
/// - `start` points to `capacity` bytes obtained from the global allocator
///   with `SLAB_ALIGNMENT`, released only in `Drop`
/// - `used <= capacity` at all times
struct Slab {
    start: NonNull<u8>,
    capacity: usize,
    used: usize,
    /// Creation order within the owning arena, never reused.
    id: u64,
}

impl Slab {
    fn new(capacity: usize, id: u64) -> Result<Self> {
        let layout = Layout::from_size_align(capacity, SLAB_ALIGNMENT).map_err(|_| {
            Error::CapacityOverflow {
                size: capacity,
                align: SLAB_ALIGNMENT,
            }
        })?;

        // SAFETY: capacity is never below MIN_SLAB_SIZE, so the layout is
        // non-zero sized.
        let start = unsafe { alloc::alloc(layout) };
        let start = NonNull::new(start).ok_or(Error::OutOfMemory {
            requested: capacity,
        })?;

        Ok(Slab {
            start,
            capacity,
            used: 0,
            id,
        })
    }

    /// Bumps the cursor past `size` bytes aligned to `align`.
    #[inline]
    fn try_alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.start.as_ptr().addr();
        let aligned = (base + self.used).checked_add(align - 1)? & !(align - 1);
        let offset = aligned - base;
        let end = offset.checked_add(size)?;
        if end > self.capacity {
            return None;
        }

        self.used = end;

        // SAFETY: offset + size <= capacity, so the result lies inside the
        // slab and is derived from `start`, keeping its provenance.
        Some(unsafe { NonNull::new_unchecked(self.start.as_ptr().add(offset)) })
    }

    fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: this is the layout `Slab::new` allocated with.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.capacity, SLAB_ALIGNMENT);
            alloc::dealloc(self.start.as_ptr(), layout);
        }
    }
}

// SAFETY: a slab exclusively owns its buffer; moving it to another thread
// moves that ownership.
unsafe impl Send for Slab {}

/// Mutable allocator state behind the arena's `RefCell`.
///
/// Slabs are kept in bump order. Every slab after `current` has `used == 0`.
#[derive(Default)]
struct ArenaState {
    slabs: Vec<Slab>,
    current: usize,
    next_slab_id: u64,
    total_capacity: usize,
    total_allocated: usize,
    allocation_count: usize,
    peak_usage: usize,
}

impl ArenaState {
    /// Allocates from the current slab, then from later empty slabs.
    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        for index in self.current..self.slabs.len() {
            if let Some(ptr) = self.slabs[index].try_alloc(size, align) {
                self.current = index;
                return Some(ptr);
            }
        }
        None
    }

    fn record(&mut self, size: usize) {
        self.total_allocated += size;
        self.allocation_count += 1;
        self.peak_usage = self.peak_usage.max(self.total_allocated);
    }
}

/// A checkpoint of an arena's allocation state.
///
/// Taken with [`Arena::mark`] and consumed by [`Arena::restore`]. Markers
/// must be restored in LIFO order; prefer [`Arena::scope`], which enforces
/// that order at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMarker {
    slab: usize,
    used: usize,
    slab_count: usize,
    next_slab_id: u64,
    allocated: usize,
    allocations: usize,
}

impl ArenaMarker {
    /// Logical bytes allocated when the marker was taken.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of slabs alive when the marker was taken.
    #[must_use]
    pub const fn slab_count(&self) -> usize {
        self.slab_count
    }
}

/// Single-owner region allocator built from chained slabs.
///
/// Slabs are created lazily: a fresh arena owns no memory. A request that
/// does not fit the current slab moves on to the next retained slab (after
/// a reset) or creates a new one of `max(slab_size, size + align)` bytes, so
/// oversized requests always get a slab of their own.
///
/// `Arena` is `Send` but not `Sync`: hand one to each worker instead of
/// sharing it.
///
/// # Examples
///
/// ```
/// use awkc_mem::Arena;
///
/// let arena = Arena::new(4096);
///
/// let a = arena.alloc(100, 16).unwrap().as_ptr();
/// let b = arena.alloc(200, 16).unwrap().as_ptr();
///
/// assert_ne!(a, b);
/// assert_eq!(arena.stats().slab_count, 1);
/// ```
pub struct Arena {
    state: RefCell<ArenaState>,
    slab_size: usize,
    byte_limit: Option<usize>,
}

impl Arena {
    /// Creates an empty arena growing by `slab_size` bytes.
    ///
    /// `slab_size` is clamped to at least 4 KiB. No memory is allocated
    /// until the first allocation.
    #[must_use]
    pub fn new(slab_size: usize) -> Self {
        Self::with_config(ArenaConfig::new(slab_size))
    }

    /// Creates an empty arena from a configuration.
    #[must_use]
    pub fn with_config(config: ArenaConfig) -> Self {
        Arena {
            state: RefCell::new(ArenaState::default()),
            slab_size: config.effective_slab_size(),
            byte_limit: config.byte_limit,
        }
    }

    /// Growth size of regular slabs.
    #[must_use]
    pub fn slab_size(&self) -> usize {
        self.slab_size
    }

    /// Limit on summed slab capacity, if configured.
    #[must_use]
    pub fn byte_limit(&self) -> Option<usize> {
        self.byte_limit
    }

    /// Allocates `size` uninitialised bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroSizedAllocation`] when `size == 0`; otherwise any error
    /// from creating a new slab.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc(&self, size: usize, align: usize) -> Result<&mut [MaybeUninit<u8>]> {
        let ptr = self.alloc_raw(size, align)?;

        // SAFETY: the region is `size` bytes, handed out exactly once, and
        // stays valid while `self` is borrowed.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr().cast(), size) })
    }

    /// Allocates `size` bytes with [`DEFAULT_ALIGNMENT`].
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_default(&self, size: usize) -> Result<&mut [MaybeUninit<u8>]> {
        self.alloc(size, DEFAULT_ALIGNMENT)
    }

    /// Allocates `size` zero-filled bytes aligned to `align`.
    ///
    /// Reused slab memory is cleared as well.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_zeroed(&self, size: usize, align: usize) -> Result<&mut [u8]> {
        let ptr = self.alloc_raw(size, align)?;

        // SAFETY: as in `alloc`; the bytes are initialised before the slice
        // is formed.
        unsafe {
            ptr.as_ptr().write_bytes(0, size);
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), size))
        }
    }

    /// Moves `value` into the arena.
    ///
    /// The value's destructor never runs.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_value<T>(&self, value: T) -> Result<&mut T> {
        let ptr = self.alloc_typed::<T>(1)?;

        // SAFETY: `ptr` is aligned and valid for one `T`.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Allocates uninitialised storage for `len` contiguous `T`s.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroSizedAllocation`] when `len == 0`,
    /// [`Error::CapacityOverflow`] when the array size overflows.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_array<T>(&self, len: usize) -> Result<&mut [MaybeUninit<T>]> {
        let ptr = self.alloc_typed::<T>(len)?;

        // SAFETY: `ptr` is aligned and valid for `len` elements;
        // `MaybeUninit` needs no initialisation.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr().cast(), len) })
    }

    /// Allocates `len` contiguous `T`s, constructing element `i` in place
    /// with `init(i)`.
    ///
    /// `init` may itself allocate from this arena.
    ///
    /// ```
    /// use awkc_mem::Arena;
    ///
    /// let arena = Arena::new(4096);
    /// let squares = arena.alloc_array_with(4, |i| i * i).unwrap();
    /// assert_eq!(squares, &[0, 1, 4, 9]);
    /// ```
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_array_with<T, F>(&self, len: usize, mut init: F) -> Result<&mut [T]>
    where
        F: FnMut(usize) -> T,
    {
        let ptr = self.alloc_typed::<T>(len)?;

        for index in 0..len {
            // SAFETY: index < len and the storage is not yet observed.
            unsafe { ptr.as_ptr().add(index).write(init(index)) };
        }

        // SAFETY: every element was initialised above.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }

    /// Copies `src` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> Result<&mut [T]> {
        let ptr = self.alloc_typed::<T>(src.len())?;

        // SAFETY: fresh arena storage cannot overlap `src`.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    /// Copies `bytes` into the arena followed by a NUL byte.
    ///
    /// The returned slice excludes the terminator; the byte right after it is
    /// always `0`, so `as_ptr()` can be handed to C. Empty input returns a
    /// static empty slice without allocating.
    pub fn dup_bytes(&self, bytes: &[u8]) -> Result<&[u8]> {
        if bytes.is_empty() {
            return Ok(&[]);
        }

        let len = bytes.len();
        let size = len.checked_add(1).ok_or(Error::CapacityOverflow {
            size: len,
            align: 1,
        })?;
        let ptr = self.alloc_raw(size, 1)?;

        // SAFETY: `ptr` is valid for len + 1 bytes and cannot overlap
        // `bytes`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), len);
            ptr.as_ptr().add(len).write(0);
            Ok(slice::from_raw_parts(ptr.as_ptr(), len))
        }
    }

    /// Copies `s` into the arena with a trailing NUL, see [`dup_bytes`].
    ///
    /// [`dup_bytes`]: Arena::dup_bytes
    pub fn dup_str(&self, s: &str) -> Result<&str> {
        if s.is_empty() {
            return Ok("");
        }
        let bytes = self.dup_bytes(s.as_bytes())?;

        // SAFETY: an exact copy of valid UTF-8.
        Ok(unsafe { std::str::from_utf8_unchecked(bytes) })
    }

    /// Rewinds every slab to empty while keeping its memory.
    ///
    /// Resets the allocated-bytes and allocation counters; `peak_usage` is
    /// kept.
    pub fn reset(&mut self) {
        let state = self.state.get_mut();
        for slab in &mut state.slabs {
            slab.used = 0;
        }
        state.current = 0;
        state.total_allocated = 0;
        state.allocation_count = 0;

        trace!(
            "arena reset, {} slabs ({} bytes) retained",
            state.slabs.len(),
            state.total_capacity
        );
    }

    /// Frees every slab, returning the arena to its freshly created state.
    pub fn release(&mut self) {
        let state = self.state.get_mut();
        let freed = state.total_capacity;
        *state = ArenaState {
            next_slab_id: state.next_slab_id,
            peak_usage: state.peak_usage,
            ..ArenaState::default()
        };

        debug!("arena released {} bytes of slab memory", freed);
    }

    /// Snapshots the current allocation state.
    #[must_use]
    pub fn mark(&self) -> ArenaMarker {
        let state = self.state.borrow();
        ArenaMarker {
            slab: state.current,
            used: state.slabs.get(state.current).map_or(0, |slab| slab.used),
            slab_count: state.slabs.len(),
            next_slab_id: state.next_slab_id,
            allocated: state.total_allocated,
            allocations: state.allocation_count,
        }
    }

    /// Rolls the arena back to `marker`.
    ///
    /// Slabs created after the marker are returned to the system, the marked
    /// slab is truncated to its recorded cursor, and the counters are
    /// restored. Markers taken after `marker` become invalid.
    ///
    /// # Panics
    ///
    /// Panics if a slab alive at the marker was already freed, by restoring
    /// an older marker first or by [`release`](Arena::release).
    pub fn restore(&mut self, marker: ArenaMarker) {
        let state = self.state.get_mut();
        let surviving = state
            .slabs
            .iter()
            .filter(|slab| slab.id < marker.next_slab_id)
            .count();
        assert!(
            surviving == marker.slab_count,
            "arena marker expects {} slabs but only {} remain; markers must be restored in LIFO order",
            marker.slab_count,
            surviving
        );

        let mut freed = 0;
        state.slabs.retain(|slab| {
            let keep = slab.id < marker.next_slab_id;
            if !keep {
                freed += slab.capacity;
            }
            keep
        });
        state.total_capacity -= freed;

        if let Some(slab) = state.slabs.get_mut(marker.slab) {
            assert!(
                marker.used <= slab.capacity,
                "arena marker cursor {} exceeds slab capacity {}",
                marker.used,
                slab.capacity
            );
            slab.used = marker.used;
        }
        for slab in state.slabs.iter_mut().skip(marker.slab + 1) {
            slab.used = 0;
        }

        state.current = marker.slab;
        state.total_allocated = marker.allocated;
        state.allocation_count = marker.allocations;

        trace!(
            "arena restored to slab {} offset {}, freed {} bytes",
            marker.slab, marker.used, freed
        );
    }

    /// Opens a scope that rolls the arena back when dropped.
    ///
    /// Allocations made through the scope borrow it, so none can outlive
    /// the rollback. Nested scopes borrow their parent mutably and therefore
    /// always close in reverse order.
    ///
    /// ```
    /// use awkc_mem::Arena;
    ///
    /// let mut arena = Arena::new(4096);
    /// arena.dup_str("kept").unwrap();
    /// let before = arena.stats().total_allocated;
    ///
    /// {
    ///     let mut outer = arena.scope();
    ///     outer.alloc(1000, 16).unwrap();
    ///     {
    ///         let inner = outer.scope();
    ///         inner.alloc(2000, 16).unwrap();
    ///     }
    ///     assert_eq!(outer.stats().total_allocated, before + 1000);
    /// }
    ///
    /// assert_eq!(arena.stats().total_allocated, before);
    /// ```
    pub fn scope(&mut self) -> ArenaScope<'_> {
        let marker = self.mark();
        ArenaScope {
            arena: self,
            marker,
        }
    }

    /// Runs `f` inside a [`scope`](Arena::scope) and rolls back afterwards.
    pub fn scoped<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&Arena) -> R,
    {
        let scope = self.scope();
        f(&scope)
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let state = self.state.borrow();
        ArenaStats {
            total_allocated: state.total_allocated,
            total_capacity: state.total_capacity,
            slab_count: state.slabs.len(),
            allocation_count: state.allocation_count,
            peak_usage: state.peak_usage,
        }
    }

    /// Bytes left in the current slab.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let state = self.state.borrow();
        state.slabs.get(state.current).map_or(0, Slab::remaining)
    }

    fn alloc_typed<T>(&self, len: usize) -> Result<NonNull<T>> {
        if len == 0 {
            return Err(Error::ZeroSizedAllocation);
        }

        let layout = Layout::array::<T>(len).map_err(|_| Error::CapacityOverflow {
            size: len.saturating_mul(size_of::<T>()),
            align: align_of::<T>(),
        })?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        Ok(self.alloc_raw(layout.size(), layout.align())?.cast())
    }

    fn alloc_raw(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
        assert!(
            align.is_power_of_two(),
            "arena alignment must be a power of two, got {align}"
        );
        if size == 0 {
            return Err(Error::ZeroSizedAllocation);
        }

        let mut state = self.state.borrow_mut();
        let ptr = match state.bump(size, align) {
            Some(ptr) => ptr,
            None => {
                self.grow(&mut state, size, align)?;
                state
                    .bump(size, align)
                    .ok_or(Error::CapacityOverflow { size, align })?
            }
        };

        state.record(size);
        Ok(ptr)
    }

    /// Adds a slab able to hold `size` bytes at `align` and makes it
    /// current.
    ///
    /// The slab goes in front of the retained empty slabs, taking the place
    /// of the current slab if that one is still empty, so later requests
    /// spill into retained memory before creating more.
    #[cold]
    fn grow(&self, state: &mut ArenaState, size: usize, align: usize) -> Result<()> {
        let needed = size
            .checked_add(align)
            .ok_or(Error::CapacityOverflow { size, align })?;
        let capacity = self.slab_size.max(needed);

        if let Some(limit) = self.byte_limit
            && state.total_capacity.saturating_add(capacity) > limit
        {
            warn!(
                "arena limit of {} bytes reached, refusing a {} byte slab",
                limit, capacity
            );
            return Err(Error::LimitExceeded {
                requested: capacity,
                limit,
            });
        }

        let slab =
            Slab::new(capacity, state.next_slab_id).inspect_err(|err| warn!("{}", err))?;
        state.next_slab_id += 1;

        let index = match state.slabs.get(state.current) {
            Some(current) if current.used == 0 => state.current,
            Some(_) => state.current + 1,
            None => state.slabs.len(),
        };
        state.slabs.insert(index, slab);
        state.current = index;
        state.total_capacity += capacity;

        debug!(
            "arena slab #{} created with {} bytes ({} bytes total)",
            state.slabs.len(),
            capacity,
            state.total_capacity
        );
        Ok(())
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::with_config(ArenaConfig::default())
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("slab_size", &self.slab_size)
            .field("byte_limit", &self.byte_limit)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Guard returned by [`Arena::scope`].
///
/// Dereferences to the arena for allocation and restores the arena to the
/// state it had when the scope was opened, exactly once, when dropped. This
/// includes early returns and unwinding.
pub struct ArenaScope<'a> {
    arena: &'a mut Arena,
    marker: ArenaMarker,
}

impl ArenaScope<'_> {
    /// Opens a nested scope.
    pub fn scope(&mut self) -> ArenaScope<'_> {
        self.arena.scope()
    }

    /// The checkpoint this scope restores on drop.
    #[must_use]
    pub fn marker(&self) -> ArenaMarker {
        self.marker
    }
}

impl Deref for ArenaScope<'_> {
    type Target = Arena;

    fn deref(&self) -> &Arena {
        &*self.arena
    }
}

impl Drop for ArenaScope<'_> {
    fn drop(&mut self) {
        self.arena.restore(self.marker);
    }
}

impl fmt::Debug for ArenaScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaScope")
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_SLAB_SIZE;

    fn addr<T>(slice: &[T]) -> usize {
        slice.as_ptr().addr()
    }

    #[test]
    fn test_new_arena_is_empty() {
        let arena = Arena::new(4096);
        assert_eq!(arena.stats(), ArenaStats::default());
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn test_slab_size_is_clamped() {
        assert_eq!(Arena::new(16).slab_size(), MIN_SLAB_SIZE);
        assert_eq!(Arena::default().slab_size(), 64 * 1024);
    }

    #[test]
    fn test_two_small_allocations_share_a_slab() {
        let arena = Arena::new(4096);

        let a = addr(arena.alloc(100, 16).unwrap());
        let b = addr(arena.alloc(200, 16).unwrap());

        assert_ne!(a, b);
        assert!(b >= a + 100);
        let stats = arena.stats();
        assert_eq!(stats.slab_count, 1);
        assert_eq!(stats.total_allocated, 300);
        assert_eq!(stats.allocation_count, 2);
    }

    #[test]
    fn test_large_alignment() {
        let arena = Arena::new(4096);
        arena.alloc(3, 1).unwrap();

        let ptr = addr(arena.alloc(1, 64).unwrap());
        assert_eq!(ptr % 64, 0);
    }

    #[test]
    fn test_alignment_larger_than_slab_alignment_in_fresh_slab() {
        let arena = Arena::new(4096);
        let ptr = addr(arena.alloc(4096, 4096).unwrap());
        assert_eq!(ptr % 4096, 0);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_non_power_of_two_alignment_panics() {
        let arena = Arena::new(4096);
        let _ = arena.alloc(8, 24);
    }

    #[test]
    fn test_zero_size_is_an_error() {
        let arena = Arena::new(4096);
        assert_eq!(arena.alloc(0, 16).unwrap_err(), Error::ZeroSizedAllocation);
        assert_eq!(
            arena.alloc_array::<u64>(0).unwrap_err(),
            Error::ZeroSizedAllocation
        );
        assert_eq!(arena.stats().slab_count, 0);
    }

    #[test]
    fn test_oversized_request_gets_own_slab() {
        let arena = Arena::new(4096);
        arena.alloc(10, 16).unwrap();

        let big = arena.alloc(100_000, 16).unwrap();
        assert_eq!(big.len(), 100_000);

        let stats = arena.stats();
        assert_eq!(stats.slab_count, 2);
        assert!(stats.total_capacity >= 4096 + 100_000);
    }

    #[test]
    fn test_capacity_overflow() {
        let arena = Arena::new(4096);
        assert!(matches!(
            arena.alloc(usize::MAX, 16),
            Err(Error::CapacityOverflow { .. })
        ));
        assert!(matches!(
            arena.alloc_array::<u64>(usize::MAX),
            Err(Error::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn test_byte_limit() {
        let arena = Arena::with_config(ArenaConfig::new(4096).with_byte_limit(8192));

        arena.alloc(4000, 16).unwrap();
        arena.alloc(4000, 16).unwrap();
        let err = arena.alloc(4000, 16).unwrap_err();

        assert_eq!(
            err,
            Error::LimitExceeded {
                requested: 4096,
                limit: 8192
            }
        );
        assert_eq!(arena.stats().allocation_count, 2);
    }

    #[test]
    fn test_alloc_zeroed_clears_reused_memory() {
        let mut arena = Arena::new(4096);
        let first = addr(arena.alloc_slice_copy(&[0xAAu8; 64]).unwrap());

        arena.reset();

        let zeroed = arena.alloc_zeroed(64, 1).unwrap();
        assert_eq!(addr(zeroed), first);
        assert!(zeroed.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_alloc_value_and_arrays() {
        let arena = Arena::new(4096);

        let value = arena.alloc_value(7u64).unwrap();
        *value += 1;
        assert_eq!(*value, 8);
        assert_eq!((value as *mut u64).addr() % align_of::<u64>(), 0);

        let uninit = arena.alloc_array::<u32>(16).unwrap();
        assert_eq!(uninit.len(), 16);

        let nodes = arena.alloc_array_with(3, |i| (i, i * 10)).unwrap();
        assert_eq!(nodes, &[(0, 0), (1, 10), (2, 20)]);
    }

    #[test]
    fn test_alloc_array_with_reentrant_init() {
        let arena = Arena::new(4096);
        let names = arena
            .alloc_array_with(3, |i| arena.dup_str(&format!("$%d{i}")).unwrap())
            .unwrap();
        assert_eq!(names, &["$%d0", "$%d1", "$%d2"]);
    }

    #[test]
    fn test_zero_sized_values() {
        let arena = Arena::new(4096);
        let _unit: &mut () = arena.alloc_value(()).unwrap();
        assert_eq!(arena.stats().slab_count, 0);
    }

    #[test]
    fn test_dup_str_is_nul_terminated() {
        let arena = Arena::new(4096);
        let s = arena.dup_str("printf").unwrap();

        assert_eq!(s, "printf");
        // SAFETY: dup_str writes a terminator right after the string.
        unsafe {
            assert_eq!(*s.as_ptr().add(s.len()), 0);
        }
    }

    #[test]
    fn test_dup_empty_does_not_allocate() {
        let arena = Arena::new(4096);
        assert_eq!(arena.dup_str("").unwrap(), "");
        assert!(arena.dup_bytes(b"").unwrap().is_empty());
        assert_eq!(arena.stats().allocation_count, 0);
        assert_eq!(arena.stats().slab_count, 0);
    }

    #[test]
    fn test_dup_bytes_with_interior_nul() {
        let arena = Arena::new(4096);
        let bytes = arena.dup_bytes(b"a\0b").unwrap();
        assert_eq!(bytes, b"a\0b");
    }

    #[test]
    fn test_reset_rewinds_and_reuses() {
        let mut arena = Arena::new(4096);
        let first = addr(arena.alloc(128, 16).unwrap());
        arena.alloc(100_000, 16).unwrap();
        let capacity = arena.stats().total_capacity;

        arena.reset();

        let stats = arena.stats();
        assert_eq!(stats.total_allocated, 0);
        assert_eq!(stats.allocation_count, 0);
        assert_eq!(stats.slab_count, 2);
        assert_eq!(stats.peak_usage, 100_128);

        assert_eq!(addr(arena.alloc(128, 16).unwrap()), first);
        assert_eq!(arena.stats().total_capacity, capacity);
    }

    #[test]
    fn test_reset_spills_into_retained_slabs() {
        let mut arena = Arena::new(4096);
        for _ in 0..4 {
            arena.alloc(3000, 16).unwrap();
        }
        assert_eq!(arena.stats().slab_count, 4);

        arena.reset();
        for _ in 0..4 {
            arena.alloc(3000, 16).unwrap();
        }
        assert_eq!(arena.stats().slab_count, 4);
    }

    #[test]
    fn test_mark_restore_within_slab() {
        let mut arena = Arena::new(64 * 1024);
        arena.alloc(10, 16).unwrap();
        let before = arena.stats();

        let marker = arena.mark();
        arena.alloc(1000, 16).unwrap();
        arena.alloc(2000, 16).unwrap();
        assert!(arena.stats().total_allocated >= before.total_allocated + 3000);

        arena.restore(marker);
        let after = arena.stats();
        assert_eq!(after.total_allocated, before.total_allocated);
        assert_eq!(after.allocation_count, before.allocation_count);
        assert_eq!(after.slab_count, before.slab_count);
    }

    #[test]
    fn test_restore_reuses_rolled_back_bytes() {
        let mut arena = Arena::new(4096);
        arena.alloc(8, 16).unwrap();

        let marker = arena.mark();
        let scratch = addr(arena.alloc(64, 16).unwrap());
        arena.restore(marker);

        assert_eq!(addr(arena.alloc(64, 16).unwrap()), scratch);
    }

    #[test]
    fn test_restore_frees_new_slabs() {
        let mut arena = Arena::new(4096);
        arena.alloc(100, 16).unwrap();
        let before = arena.stats();

        let marker = arena.mark();
        arena.alloc(50_000, 16).unwrap();
        arena.alloc(4000, 16).unwrap();
        assert_eq!(arena.stats().slab_count, 3);

        arena.restore(marker);
        let after = arena.stats();
        assert_eq!(after.slab_count, before.slab_count);
        assert_eq!(after.total_capacity, before.total_capacity);
        assert_eq!(after.total_allocated, before.total_allocated);
    }

    #[test]
    fn test_restore_to_empty_arena() {
        let mut arena = Arena::new(4096);
        let marker = arena.mark();
        arena.alloc(10, 16).unwrap();

        arena.restore(marker);
        assert_eq!(arena.stats().slab_count, 0);
        assert_eq!(arena.stats().total_capacity, 0);
        arena.alloc(10, 16).unwrap();
    }

    #[test]
    fn test_restore_after_reset_keeps_retained_slabs() {
        let mut arena = Arena::new(4096);
        for _ in 0..3 {
            arena.alloc(3000, 16).unwrap();
        }
        arena.reset();

        let marker = arena.mark();
        arena.alloc(3000, 16).unwrap();
        arena.alloc(3000, 16).unwrap();
        arena.restore(marker);

        let stats = arena.stats();
        assert_eq!(stats.slab_count, 3);
        assert_eq!(stats.total_allocated, 0);
        assert_eq!(arena.remaining(), 4096);
    }

    #[test]
    #[should_panic(expected = "LIFO")]
    fn test_out_of_order_restore_panics() {
        let mut arena = Arena::new(4096);
        let outer = arena.mark();
        arena.alloc(4000, 16).unwrap();
        arena.alloc(4000, 16).unwrap();
        let inner = arena.mark();

        arena.restore(outer);
        arena.restore(inner);
    }

    #[test]
    #[should_panic(expected = "LIFO")]
    fn test_restore_detects_replaced_slab() {
        let mut arena = Arena::new(4096);
        let outer = arena.mark();
        arena.alloc(100_000, 16).unwrap();
        let inner = arena.mark();

        arena.restore(outer);
        arena.alloc(10, 16).unwrap();
        arena.restore(inner);
    }

    #[test]
    #[should_panic(expected = "LIFO")]
    fn test_restore_after_release_panics() {
        let mut arena = Arena::new(4096);
        arena.alloc(10, 16).unwrap();
        let marker = arena.mark();
        arena.release();
        arena.alloc(10, 16).unwrap();

        arena.restore(marker);
    }

    #[test]
    fn test_oversized_request_after_reset_keeps_retained_slabs() {
        let mut arena = Arena::new(4096);
        for _ in 0..4 {
            arena.alloc(3000, 16).unwrap();
        }
        arena.reset();

        arena.alloc(10_000, 16).unwrap();
        for _ in 0..4 {
            arena.alloc(3000, 16).unwrap();
        }

        let stats = arena.stats();
        assert_eq!(stats.slab_count, 5);
        assert_eq!(stats.total_capacity, 4 * 4096 + 10_016);
    }

    #[test]
    fn test_restore_removes_slab_inserted_before_retained_ones() {
        let mut arena = Arena::new(4096);
        for _ in 0..2 {
            arena.alloc(3000, 16).unwrap();
        }
        arena.reset();
        let first = addr(arena.alloc(3000, 16).unwrap());
        arena.reset();

        let marker = arena.mark();
        arena.alloc(10_000, 16).unwrap();
        arena.restore(marker);

        let stats = arena.stats();
        assert_eq!(stats.slab_count, 2);
        assert_eq!(stats.total_capacity, 2 * 4096);
        assert_eq!(arena.remaining(), 4096);
        assert_eq!(addr(arena.alloc(3000, 16).unwrap()), first);
    }

    #[test]
    fn test_nested_scopes() {
        let mut arena = Arena::new(4096);
        arena.alloc(16, 16).unwrap();

        {
            let mut outer = arena.scope();
            outer.alloc(1000, 16).unwrap();
            {
                let inner = outer.scope();
                inner.alloc(8000, 16).unwrap();
                assert_eq!(inner.stats().slab_count, 2);
            }
            let stats = outer.stats();
            assert_eq!(stats.total_allocated, 1016);
            assert_eq!(stats.slab_count, 1);
        }

        assert_eq!(arena.stats().total_allocated, 16);
    }

    #[test]
    fn test_scope_restores_on_early_return() {
        fn lower(arena: &mut Arena, fail: bool) -> Result<usize> {
            let scope = arena.scope();
            scope.alloc(512, 16)?;
            if fail {
                return Err(Error::ZeroSizedAllocation);
            }
            Ok(scope.stats().total_allocated)
        }

        let mut arena = Arena::new(4096);
        assert_eq!(lower(&mut arena, false), Ok(512));
        assert!(lower(&mut arena, true).is_err());
        assert_eq!(arena.stats().total_allocated, 0);
    }

    #[test]
    fn test_scope_restores_on_unwind() {
        let mut arena = Arena::new(4096);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let scope = arena.scope();
            scope.alloc(256, 16).unwrap();
            panic!("lowering failed");
        }));

        assert!(result.is_err());
        assert_eq!(arena.stats().total_allocated, 0);
    }

    #[test]
    fn test_scoped_closure() {
        let mut arena = Arena::new(4096);
        let len = arena.scoped(|scratch| scratch.dup_str("tmp$1").unwrap().len());
        assert_eq!(len, 5);
        assert_eq!(arena.stats().allocation_count, 0);
    }

    #[test]
    fn test_peak_usage_survives_rollback() {
        let mut arena = Arena::new(4096);
        arena.scoped(|scratch| {
            scratch.alloc(3000, 16).unwrap();
        });
        assert_eq!(arena.stats().total_allocated, 0);
        assert_eq!(arena.stats().peak_usage, 3000);
    }

    #[test]
    fn test_release_frees_everything() {
        let mut arena = Arena::new(4096);
        arena.alloc(100_000, 16).unwrap();

        arena.release();
        let stats = arena.stats();
        assert_eq!(stats.slab_count, 0);
        assert_eq!(stats.total_capacity, 0);
        assert_eq!(stats.peak_usage, 100_000);

        arena.alloc(10, 16).unwrap();
        assert_eq!(arena.stats().slab_count, 1);
    }

    #[test]
    fn test_arena_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Arena>();

        let mut arena = Arena::new(4096);
        arena.dup_str("worker").unwrap();
        let handle = std::thread::spawn(move || {
            arena.reset();
            arena.dup_str("FS").unwrap().len()
        });
        assert_eq!(handle.join().unwrap(), 2);
    }
}
