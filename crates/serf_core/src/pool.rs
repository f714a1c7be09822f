//! Fixed-capacity entity pools.
//!
//! Each pool is an arena of records addressed by a stable slot index, with
//! an occupancy bitmap (8 slots per byte, most significant bit first) and a
//! high-water mark of the largest index ever handed out. Slot 0 holds a
//! permanent sentinel record meaning "no entity".
//!
//! Allocation always returns the lowest free slot. A cursor remembers the
//! lowest slot that might be free so repeated allocations do not rescan the
//! full bitmap.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entities::PoolRecord;
use crate::error::{GameError, Result};

/// Typed slot index into the pool of `T`.
///
/// A `Handle<Serf>` cannot be passed where a `Handle<Building>` is expected.
pub struct Handle<T> {
    index: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The sentinel slot.
    pub const NULL: Self = Self::from_raw(0);

    /// Wrap a raw slot index, e.g. one read from a save.
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self {
            index,
            _kind: PhantomData,
        }
    }

    /// Raw slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Whether this is the sentinel handle.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == 0
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.index).finish()
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Serialize for Handle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.index.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Handle<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        u32::deserialize(deserializer).map(Self::from_raw)
    }
}

/// Byte offset and bit mask of a slot in the occupancy bitmap.
#[inline]
const fn bit_position(index: u32) -> (usize, u8) {
    ((index >> 3) as usize, 0x80 >> (index & 7))
}

/// Bytes needed to hold one bit per slot.
const fn bitmap_len(capacity: u32) -> usize {
    ((capacity as usize).saturating_sub(1) / 8) + 1
}

/// Live contents of a pool in canonical enumeration order.
///
/// The sentinel is not included; it is recreated by the reset that precedes
/// every restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot<T> {
    /// Watermark at the time of the snapshot.
    pub max_ever_index: u32,
    /// Allocated records with their slot indices, ascending.
    pub records: Vec<(u32, T)>,
}

/// Fixed-capacity arena for one entity kind.
#[derive(Debug, Clone)]
pub struct EntityPool<T: PoolRecord> {
    records: Vec<T>,
    bitmap: Vec<u8>,
    max_ever_index: u32,
    /// No slot below this index is free.
    free_hint: u32,
    /// Allocated slots, sentinel excluded.
    live: u32,
}

impl<T: PoolRecord> EntityPool<T> {
    /// Create a pool with `capacity` slots, slot 0 reserved.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidCapacity`] when `capacity` is zero, since
    /// the pool could not hold its sentinel.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(GameError::InvalidCapacity {
                kind: T::KIND,
                capacity,
            });
        }
        let mut pool = Self {
            records: vec![T::default(); capacity as usize],
            bitmap: vec![0; bitmap_len(capacity)],
            max_ever_index: 0,
            free_hint: 1,
            live: 0,
        };
        pool.reset();
        Ok(pool)
    }

    /// Clear every slot and re-reserve the sentinel.
    pub fn reset(&mut self) {
        self.bitmap.fill(0);
        self.records.fill(T::default());
        self.max_ever_index = 0;
        self.live = 0;

        let (byte, mask) = bit_position(0);
        self.bitmap[byte] |= mask;
        self.records[0] = T::sentinel();
        self.free_hint = 1;

        tracing::debug!(kind = %T::KIND, capacity = self.capacity(), "Pool reset");
    }

    /// Allocate the lowest free slot and return it zero-initialised.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ResourceExhausted`] when every slot is taken.
    /// The pool is left unchanged in that case.
    pub fn allocate(&mut self) -> Result<(Handle<T>, &mut T)> {
        let Some(index) = self.find_free(self.free_hint) else {
            tracing::debug!(kind = %T::KIND, capacity = self.capacity(), "Pool exhausted");
            return Err(GameError::ResourceExhausted {
                kind: T::KIND,
                capacity: self.capacity(),
            });
        };

        let (byte, mask) = bit_position(index);
        self.bitmap[byte] |= mask;
        self.free_hint = index + 1;
        self.live += 1;
        self.max_ever_index = self.max_ever_index.max(index);

        tracing::trace!(kind = %T::KIND, index, "Allocated");

        let record = &mut self.records[index as usize];
        *record = T::default();
        Ok((Handle::from_raw(index), record))
    }

    /// Free a slot.
    ///
    /// The record is left in place and the watermark does not move.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidHandle`] for the sentinel, an index
    /// outside the pool, or a slot that is already free. With the
    /// `debug-validation` feature these cases panic instead.
    pub fn deallocate(&mut self, handle: Handle<T>) -> Result<()> {
        let index = handle.index();
        if index == 0 || !self.is_allocated(index) {
            return Err(self.contract_violation(index, "deallocate"));
        }

        let (byte, mask) = bit_position(index);
        self.bitmap[byte] &= !mask;
        self.free_hint = self.free_hint.min(index);
        self.live -= 1;

        tracing::trace!(kind = %T::KIND, index, "Deallocated");
        Ok(())
    }

    /// Record at `handle` without an occupancy check.
    ///
    /// # Panics
    ///
    /// Panics if the index lies outside the pool.
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> &T {
        &self.records[handle.index() as usize]
    }

    /// Mutable record at `handle` without an occupancy check.
    ///
    /// # Panics
    ///
    /// Panics if the index lies outside the pool.
    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.records[handle.index() as usize]
    }

    /// Record at `handle` if the slot is allocated.
    #[must_use]
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        if self.is_allocated(handle.index()) {
            self.records.get(handle.index() as usize)
        } else {
            None
        }
    }

    /// Mutable record at `handle` if the slot is allocated.
    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if self.is_allocated(handle.index()) {
            self.records.get_mut(handle.index() as usize)
        } else {
            None
        }
    }

    /// Occupancy bit of a slot. Indices outside the pool are free.
    #[must_use]
    pub fn is_allocated(&self, index: u32) -> bool {
        if index >= self.capacity() {
            return false;
        }
        let (byte, mask) = bit_position(index);
        self.bitmap[byte] & mask != 0
    }

    /// Whether `handle` refers to a live, non-sentinel record.
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        !handle.is_null() && self.is_allocated(handle.index())
    }

    /// Visit every allocated record in index order, sentinel excluded.
    pub fn for_each_allocated<F>(&self, mut visitor: F)
    where
        F: FnMut(Handle<T>, &T),
    {
        for index in 1..=self.max_ever_index {
            if self.is_allocated(index) {
                visitor(Handle::from_raw(index), &self.records[index as usize]);
            }
        }
    }

    /// Visit every allocated slot with mutable access to the whole pool.
    ///
    /// The upper bound is the watermark when the sweep starts: records the
    /// visitor allocates above it are not visited, and slots freed before
    /// they are reached are skipped.
    pub fn sweep<F>(&mut self, mut visitor: F)
    where
        F: FnMut(&mut Self, Handle<T>),
    {
        let bound = self.max_ever_index;
        for index in 1..=bound {
            if self.is_allocated(index) {
                visitor(self, Handle::from_raw(index));
            }
        }
    }

    /// Allocated records in index order, sentinel excluded.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        (1..=self.max_ever_index)
            .filter(|&index| self.is_allocated(index))
            .map(|index| (Handle::from_raw(index), &self.records[index as usize]))
    }

    /// Total slot count, sentinel included.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.records.len() as u32
    }

    /// Number of live records, sentinel excluded.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.live
    }

    /// Whether no record besides the sentinel is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Set bits in the occupancy bitmap, sentinel included.
    #[must_use]
    pub fn occupied_slots(&self) -> u32 {
        self.bitmap.iter().map(|byte| byte.count_ones()).sum()
    }

    /// Highest index ever allocated since the last reset.
    #[must_use]
    pub const fn max_ever_index(&self) -> u32 {
        self.max_ever_index
    }

    /// Raw occupancy bitmap.
    #[must_use]
    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    /// Capture the live records in canonical order.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot<T> {
        PoolSnapshot {
            max_ever_index: self.max_ever_index,
            records: self
                .iter()
                .map(|(handle, record)| (handle.index(), record.clone()))
                .collect(),
        }
    }

    /// Build a pool of `capacity` slots populated from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidCapacity`] for a zero capacity and
    /// [`GameError::InvalidState`] when the snapshot does not fit: indices
    /// out of range, not strictly ascending, or above its own watermark.
    pub fn from_snapshot(capacity: u32, snapshot: PoolSnapshot<T>) -> Result<Self> {
        let mut pool = Self::new(capacity)?;
        if snapshot.max_ever_index >= capacity {
            return Err(GameError::InvalidState(format!(
                "{} watermark {} exceeds capacity {}",
                T::KIND,
                snapshot.max_ever_index,
                capacity
            )));
        }

        let mut previous = 0;
        for (index, record) in snapshot.records {
            if index <= previous || index > snapshot.max_ever_index {
                return Err(GameError::InvalidState(format!(
                    "{} record index {} out of order or above watermark {}",
                    T::KIND,
                    index,
                    snapshot.max_ever_index
                )));
            }
            let (byte, mask) = bit_position(index);
            pool.bitmap[byte] |= mask;
            pool.records[index as usize] = record;
            pool.live += 1;
            previous = index;
        }
        pool.max_ever_index = snapshot.max_ever_index;

        tracing::debug!(kind = %T::KIND, live = pool.live, "Pool restored");
        Ok(pool)
    }

    fn find_free(&self, start: u32) -> Option<u32> {
        let capacity = self.capacity();
        if start >= capacity {
            return None;
        }
        let (first_byte, _) = bit_position(start);
        for (offset, &byte) in self.bitmap[first_byte..].iter().enumerate() {
            if byte == 0xff {
                continue;
            }
            let base = ((first_byte + offset) as u32) << 3;
            // Bits below `start` in the first byte are never free.
            let mut remaining = byte;
            if offset == 0 {
                remaining |= !(0xffu8 >> (start & 7));
            }
            let bit = remaining.leading_ones();
            if bit < 8 {
                let index = base + bit;
                return (index < capacity).then_some(index);
            }
        }
        None
    }

    fn contract_violation(&self, index: u32, operation: &str) -> GameError {
        tracing::error!(kind = %T::KIND, index, operation, "Invalid handle");
        #[cfg(feature = "debug-validation")]
        panic!("{operation} on invalid {} handle {index}", T::KIND);
        #[cfg(not(feature = "debug-validation"))]
        GameError::InvalidHandle {
            kind: T::KIND,
            index,
        }
    }
}
