// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Fixed-capacity storage for the contents of a resource catalog.
//!
//! A catalog knows exactly how many descriptors, immutable samplers and name bytes it will hold
//! before it creates any of them. [`ArenaSizer`] accumulates those totals, [`ResourceArena`]
//! reserves all of the storage once, and [`StringPool`] hands out names that stay valid for the
//! lifetime of the pool because its buffer never grows.

use std::fmt::{Debug, Error as FmtError, Formatter};

/// A string stored in a [`StringPool`].
///
/// Resolve it with [`StringPool::get`] on the pool that returned it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PooledStr {
    offset: u32,
    len: u32,
}

impl PooledStr {
    /// Returns the length of the string in bytes, without the terminator.
    #[inline]
    pub fn len(self) -> usize {
        self.len as usize
    }
}

/// Stores null-terminated strings in one buffer that is allocated exactly once.
#[derive(Clone, Default)]
pub struct StringPool {
    buffer: String,
    capacity: usize,
}

impl StringPool {
    /// Returns the number of bytes needed to store `s` in a pool.
    #[inline]
    pub fn required_size(s: &str) -> usize {
        s.len() + 1
    }

    /// Creates a pool that can hold exactly `capacity` bytes, terminators included.
    pub fn with_capacity(capacity: usize) -> Self {
        StringPool {
            buffer: String::with_capacity(capacity),
            capacity,
        }
    }

    /// Copies `s` into the pool.
    ///
    /// # Panics
    ///
    /// - Panics if the pool does not have room for `s` and its terminator.
    pub fn copy_string(&mut self, s: &str) -> PooledStr {
        let required = Self::required_size(s);
        assert!(
            required <= self.remaining_capacity(),
            "string pool overflow: {} bytes requested, {} remaining",
            required,
            self.remaining_capacity(),
        );
        debug_assert!(!s.contains('\0'));

        let offset = self.buffer.len() as u32;
        self.buffer.push_str(s);
        self.buffer.push('\0');

        PooledStr {
            offset,
            len: s.len() as u32,
        }
    }

    /// Returns the string stored at `s`.
    #[inline]
    pub fn get(&self, s: PooledStr) -> &str {
        let start = s.offset as usize;
        &self.buffer[start..start + s.len as usize]
    }

    /// Returns the string stored at `s` with its terminator.
    #[inline]
    pub fn get_with_nul(&self, s: PooledStr) -> &str {
        let start = s.offset as usize;
        &self.buffer[start..start + s.len as usize + 1]
    }

    /// Returns the number of bytes that can still be stored.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Returns the total number of bytes the pool was created for.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Debug for StringPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("StringPool")
            .field("len", &self.buffer.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Accumulates the sizes of the three sequences of a [`ResourceArena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaSizer {
    /// The number of descriptors.
    pub descriptors: usize,

    /// The number of immutable samplers.
    pub samplers: usize,

    /// The number of bytes needed by the name pool.
    pub string_bytes: usize,
}

impl ArenaSizer {
    /// Counts one descriptor named `name`.
    #[inline]
    pub fn add_descriptor(&mut self, name: &str) {
        self.descriptors += 1;
        self.add_string(name);
    }

    /// Counts one string that is not attached to a descriptor.
    #[inline]
    pub fn add_string(&mut self, s: &str) {
        self.string_bytes += StringPool::required_size(s);
    }

    /// Counts one immutable sampler.
    #[inline]
    pub fn add_sampler(&mut self) {
        self.samplers += 1;
    }
}

/// Owns the descriptors, immutable samplers and names of a catalog. The size of every sequence
/// is frozen when the arena is created.
#[derive(Debug)]
pub struct ResourceArena<D, S> {
    sizes: ArenaSizer,
    descriptors: Vec<D>,
    samplers: Vec<S>,
    names: StringPool,
}

impl<D, S> ResourceArena<D, S> {
    /// Reserves storage for exactly the totals in `sizes`.
    pub fn new(sizes: ArenaSizer) -> Self {
        ResourceArena {
            sizes,
            descriptors: Vec::with_capacity(sizes.descriptors),
            samplers: Vec::with_capacity(sizes.samplers),
            names: StringPool::with_capacity(sizes.string_bytes),
        }
    }

    /// Appends a descriptor and returns its index.
    ///
    /// # Panics
    ///
    /// - Panics if all the descriptors the arena was sized for have already been pushed.
    pub fn push_descriptor(&mut self, descriptor: D) -> usize {
        assert!(
            self.descriptors.len() < self.sizes.descriptors,
            "resource arena overflow: more than {} descriptors",
            self.sizes.descriptors,
        );

        self.descriptors.push(descriptor);
        self.descriptors.len() - 1
    }

    /// Appends an immutable sampler and returns its index.
    ///
    /// # Panics
    ///
    /// - Panics if all the samplers the arena was sized for have already been pushed.
    pub fn push_sampler(&mut self, sampler: S) -> usize {
        assert!(
            self.samplers.len() < self.sizes.samplers,
            "resource arena overflow: more than {} samplers",
            self.sizes.samplers,
        );

        self.samplers.push(sampler);
        self.samplers.len() - 1
    }

    /// Returns the descriptor at `index` for modification.
    #[inline]
    pub fn descriptor_mut(&mut self, index: usize) -> &mut D {
        &mut self.descriptors[index]
    }

    /// Returns the descriptors pushed so far.
    #[inline]
    pub fn descriptors(&self) -> &[D] {
        &self.descriptors
    }

    /// Returns the name pool.
    #[inline]
    pub fn names(&self) -> &StringPool {
        &self.names
    }

    /// Returns the name pool for modification.
    #[inline]
    pub fn names_mut(&mut self) -> &mut StringPool {
        &mut self.names
    }

    /// Consumes the arena and returns its three sequences.
    ///
    /// # Panics
    ///
    /// - Panics if any of the sequences holds fewer elements than it was sized for.
    pub fn finish(self) -> (Box<[D]>, Box<[S]>, StringPool) {
        assert_eq!(self.descriptors.len(), self.sizes.descriptors);
        assert_eq!(self.samplers.len(), self.sizes.samplers);
        assert_eq!(self.names.remaining_capacity(), 0);

        (
            self.descriptors.into_boxed_slice(),
            self.samplers.into_boxed_slice(),
            self.names,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{ArenaSizer, PooledStr, ResourceArena, StringPool};

    #[test]
    fn pool_strings_are_stable() {
        let names = ["g_Buffer", "g_Texture", ""];
        let capacity = names.iter().map(|s| StringPool::required_size(s)).sum();
        let mut pool = StringPool::with_capacity(capacity);

        let stored: Vec<_> = names.iter().map(|s| pool.copy_string(s)).collect();
        assert_eq!(pool.remaining_capacity(), 0);

        for (name, s) in names.iter().zip(&stored) {
            assert_eq!(pool.get(*s), *name);
            assert!(pool.get_with_nul(*s).ends_with('\0'));
        }
    }

    #[test]
    #[should_panic(expected = "string pool overflow")]
    fn pool_overflow() {
        let mut pool = StringPool::with_capacity(4);
        pool.copy_string("abcd");
    }

    #[test]
    fn arena_fill() {
        let mut sizes = ArenaSizer::default();
        sizes.add_descriptor("a");
        sizes.add_descriptor("bb");
        sizes.add_sampler();
        assert_eq!(sizes.string_bytes, 5);

        let mut arena = ResourceArena::<(u32, PooledStr), u8>::new(sizes);
        let a = arena.names_mut().copy_string("a");
        arena.push_descriptor((0, a));
        let bb = arena.names_mut().copy_string("bb");
        arena.push_descriptor((1, bb));
        arena.descriptor_mut(0).0 = 7;
        arena.push_sampler(3);

        let (descriptors, samplers, names) = arena.finish();
        assert_eq!(descriptors[0].0, 7);
        assert_eq!(names.get(descriptors[1].1), "bb");
        assert_eq!(descriptors.len(), 2);
        assert_eq!(&*samplers, &[3]);
        assert_eq!(names.remaining_capacity(), 0);
    }

    #[test]
    #[should_panic]
    fn arena_underfilled() {
        let mut sizes = ArenaSizer::default();
        sizes.add_descriptor("a");

        let arena = ResourceArena::<u32, u8>::new(sizes);
        arena.finish();
    }
}
