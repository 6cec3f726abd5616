//! Canonical handles returned by the string pool.
//!
//! An [`InternedStr`] wraps the one arena copy of a string held by a
//! [`StringPool`](crate::StringPool). Equality and hashing look at the
//! address and length only, so comparing two identifiers is O(1) no matter
//! how long they are.
//!
//! # Examples
//!
//! ```
//! use awkc_mem::{Arena, StringPool};
//!
//! let arena = Arena::new(4096);
//! let mut pool = StringPool::new(&arena).unwrap();
//!
//! let a = pool.intern("length").unwrap();
//! let b = pool.intern("length").unwrap();
//! let c = pool.intern("substr").unwrap();
//!
//! assert_eq!(a, b); // same address
//! assert_ne!(a, c);
//! assert_eq!(a.as_str(), "length");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr;

/// A string interned in a [`StringPool`](crate::StringPool).
///
/// Handles are only comparable with handles from the same pool: two pools
/// hold separate copies of equal strings, and those copies compare unequal.
/// All empty strings compare equal.
#[derive(Clone, Copy)]
pub struct InternedStr<'a>(&'a str);

impl<'a> InternedStr<'a> {
    /// The canonical empty string, shared by every pool.
    pub const EMPTY: InternedStr<'static> = InternedStr("");

    pub(crate) const fn new(text: &'a str) -> Self {
        Self(text)
    }

    /// Returns the interned text with the lifetime of the backing arena.
    #[must_use]
    pub const fn as_str(self) -> &'a str {
        self.0
    }

    /// Address of the first byte. The byte after the last one is `0`.
    #[must_use]
    pub const fn as_ptr(self) -> *const u8 {
        self.0.as_ptr()
    }

    /// Length in bytes, excluding the NUL terminator.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty string.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0.is_empty()
    }

    fn identity(self) -> (usize, usize) {
        if self.0.is_empty() {
            (0, 0)
        } else {
            (self.0.as_ptr().addr(), self.0.len())
        }
    }
}

impl PartialEq for InternedStr<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && (self.0.is_empty() || ptr::eq(self.0.as_ptr(), other.0.as_ptr()))
    }
}

impl Eq for InternedStr<'_> {}

impl Hash for InternedStr<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Deref for InternedStr<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.0
    }
}

impl AsRef<str> for InternedStr<'_> {
    fn as_ref(&self) -> &str {
        self.0
    }
}

impl<'a> From<InternedStr<'a>> for &'a str {
    fn from(interned: InternedStr<'a>) -> Self {
        interned.0
    }
}

impl fmt::Debug for InternedStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternedStr({:?} @ {:p})", self.0, self.0.as_ptr())
    }
}

impl fmt::Display for InternedStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
