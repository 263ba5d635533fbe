//! Self-managed byte arena.
//!
//! Every owner keeps its stat records, modifier lists and observer lists
//! in one `Arena`: a flat `Vec<u8>` used as a private heap, addressed only
//! through versioned [`Handle`]s.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────┬───────────────────────────┬──────────────────────┐
//! │ header (16 bytes)        │ metadata table            │ data region          │
//! │ layout_version u32 (LE)  │ slot_count × SlotRecord   │ data_len bytes       │
//! │ slot_count     u32 (LE)  │ {occupied, version,       │ offsets are relative │
//! │ data_len       u32 (LE)  │  offset, size} 16 bytes   │ to region start      │
//! │ reserved       u32 = 0   │                           │                      │
//! └──────────────────────────┴───────────────────────────┴──────────────────────┘
//! ```
//!
//! Slot 0 holds the free-slot range list and slot 1 the free-data range
//! list, both as `[len: u32][reserved: u32][FreeRange; capacity]` objects
//! in the data region, so a serialized arena is self-describing. Records
//! are written with `bytemuck` in native byte order (little-endian on every
//! supported target).
//!
//! Allocations are 8-byte aligned relative to the data region and free
//! bytes are always zero, so fresh allocations read as zeroed.
//!
//! Growing the metadata table shifts the data region right; since data
//! offsets are region-relative, no record changes. The table never
//! shrinks, so handles stay valid across [`Arena::trim_capacity`].

use crate::config::ArenaConfig;
use crate::error::StatError;
use crate::handle::{Handle, RawHandle};
use crate::ranges::{FreeRange, RangeSet};
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// Bumped whenever the byte layout changes.
pub const LAYOUT_VERSION: u32 = 1;

/// Size of the fixed header.
pub const HEADER_BYTES: usize = 16;

const SLOT_BYTES: usize = size_of::<SlotRecord>();
const DATA_ALIGN: u32 = 8;
const SLOT_FREE_LIST: u32 = 0;
const DATA_FREE_LIST: u32 = 1;
const RESERVED_SLOTS: u32 = 2;
const LIST_HEADER_BYTES: u32 = 8;
const MIN_LIST_BYTES: u32 = 64;

/// One metadata table entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SlotRecord {
    /// Non-zero when the slot is allocated.
    pub occupied: u32,
    /// Incremented on every free.
    pub version: u32,
    /// Offset into the data region.
    pub offset: u32,
    /// Allocation size in bytes.
    pub size: u32,
}

/// Occupancy summary of an arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Metadata table capacity, reserved slots included.
    pub slot_count: u32,
    /// Live user allocations.
    pub live_slots: u32,
    /// Size of the data region.
    pub data_len: u32,
    /// Free bytes in the data region.
    pub free_bytes: u64,
    /// Number of free data ranges (fragmentation).
    pub free_ranges: usize,
}

/// A live allocation as reported by [`Arena::allocations`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub handle: RawHandle,
    pub offset: u32,
    pub size: u32,
}

/// Byte-buffer heap with a free-range allocator and versioned handles.
///
/// # Examples
///
/// ```rust
/// use statarena::{Arena, ArenaConfig};
///
/// let mut arena = Arena::new(ArenaConfig::default());
/// let a = arena.allocate(&1.5f32).unwrap();
/// let b = arena.allocate(&2.5f32).unwrap();
///
/// arena.free(a).unwrap();
/// let c = arena.allocate(&3.5f32).unwrap();
///
/// // `c` reuses `a`'s slot but with a new version.
/// assert_eq!(c.index(), a.index());
/// assert_eq!(arena.read(a), None);
/// assert_eq!(arena.read(b), Some(2.5));
/// assert_eq!(arena.read(c), Some(3.5));
/// ```
#[derive(Clone, Debug)]
pub struct Arena {
    bytes: Vec<u8>,
    config: ArenaConfig,
    slot_count: u32,
    data_len: u32,
    // In-memory mirrors of the two range-list objects; written through
    // to slots 0 and 1 at the end of every mutating call.
    slot_free: RangeSet,
    data_free: RangeSet,
}

fn align_up(value: u32) -> Option<u32> {
    value
        .checked_add(DATA_ALIGN - 1)
        .map(|v| v & !(DATA_ALIGN - 1))
}

fn to_u32(value: usize) -> Result<u32, StatError> {
    u32::try_from(value).map_err(|_| StatError::AllocationExhausted {
        requested: value,
        capacity: u32::MAX as usize,
    })
}

impl Arena {
    /// Create an empty arena.
    pub fn new(config: ArenaConfig) -> Self {
        let slot_count = config.initial_slots.max(RESERVED_SLOTS + 1);
        let data_len = align_up(config.initial_data_bytes)
            .unwrap_or(u32::MAX & !(DATA_ALIGN - 1))
            .max(MIN_LIST_BYTES * 2);
        let total = HEADER_BYTES + slot_count as usize * SLOT_BYTES + data_len as usize;

        let mut arena = Self {
            bytes: vec![0; total],
            config,
            slot_count,
            data_len,
            slot_free: RangeSet::new(),
            data_free: RangeSet::new(),
        };
        arena.write_header();

        // The two list objects take the first bytes of the data region.
        for (index, offset) in [(SLOT_FREE_LIST, 0), (DATA_FREE_LIST, MIN_LIST_BYTES)] {
            arena.set_slot(
                index,
                SlotRecord {
                    occupied: 1,
                    version: 1,
                    offset,
                    size: MIN_LIST_BYTES,
                },
            );
        }
        arena.slot_free.insert(RESERVED_SLOTS, slot_count);
        arena.data_free.insert(MIN_LIST_BYTES * 2, data_len);
        arena.write_list(SLOT_FREE_LIST);
        arena.write_list(DATA_FREE_LIST);
        arena
    }

    /// The config this arena grows by.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Allocate `size` zeroed bytes.
    ///
    /// Takes the lowest free metadata slot (appending slots if none is
    /// free) and the first data range that fits (growing the region if
    /// none does).
    pub fn allocate_bytes<T: ?Sized>(&mut self, size: usize) -> Result<Handle<T>, StatError> {
        if size == 0 {
            return Err(StatError::InvalidSize);
        }
        let size = to_u32(size)?;
        let footprint = align_up(size).ok_or(StatError::AllocationExhausted {
            requested: size as usize,
            capacity: u32::MAX as usize,
        })?;

        let index = self.alloc_slot()?;
        let offset = match self.alloc_data(footprint, true) {
            Ok(offset) => offset,
            Err(e) => {
                // The slot table may have grown; the stored lists must follow.
                self.slot_free.insert(index, index + 1);
                self.commit_free_lists()?;
                return Err(e);
            }
        };

        let mut record = self.slot_at(index);
        record.occupied = 1;
        if record.version == 0 {
            record.version = 1;
        }
        record.offset = offset;
        record.size = size;
        self.set_slot(index, record);
        self.commit_free_lists()?;

        Ok(Handle::from_raw(RawHandle::new(index, record.version)))
    }

    /// Allocate and initialize a single value.
    pub fn allocate<T: Pod>(&mut self, value: &T) -> Result<Handle<T>, StatError> {
        let handle = self.allocate_bytes::<T>(size_of::<T>())?;
        self.write(handle, value)?;
        Ok(handle)
    }

    /// Free an allocation.
    ///
    /// Stale or null handles are rejected with `InvalidHandle` and leave
    /// the arena untouched.
    pub fn free<T: ?Sized>(&mut self, handle: Handle<T>) -> Result<(), StatError> {
        let mut record = self
            .resolve(handle.raw())
            .ok_or(StatError::InvalidHandle)?;
        let footprint = align_up(record.size).unwrap_or(record.size);
        self.free_data(record.offset, footprint);

        record.occupied = 0;
        record.version = record.version.wrapping_add(1).max(1);
        record.offset = 0;
        record.size = 0;
        self.set_slot(handle.index(), record);
        self.slot_free.insert(handle.index(), handle.index() + 1);
        self.commit_free_lists()
    }

    /// Change an allocation's size, keeping its handle.
    ///
    /// Shrinking truncates in place and frees the tail. Growing extends in
    /// place when the following range is free, and otherwise moves the
    /// bytes to a new range. Resizing to zero frees.
    pub fn resize<T: ?Sized>(
        &mut self,
        handle: Handle<T>,
        new_size: usize,
    ) -> Result<(), StatError> {
        if new_size == 0 {
            return self.free(handle);
        }
        let mut record = self
            .resolve(handle.raw())
            .ok_or(StatError::InvalidHandle)?;
        let new_size = to_u32(new_size)?;
        let old_footprint = align_up(record.size).unwrap_or(record.size);
        let new_footprint = align_up(new_size).ok_or(StatError::AllocationExhausted {
            requested: new_size as usize,
            capacity: u32::MAX as usize,
        })?;

        if new_footprint <= old_footprint {
            if new_size < record.size {
                let base = self.data_base() + record.offset as usize;
                self.bytes[base + new_size as usize..base + record.size as usize].fill(0);
            }
            if new_footprint < old_footprint {
                self.free_data(
                    record.offset + new_footprint,
                    old_footprint - new_footprint,
                );
            }
        } else if !self
            .data_free
            .take_at(record.offset + old_footprint, new_footprint - old_footprint)
        {
            let offset = self.alloc_data(new_footprint, true)?;
            let base = self.data_base();
            let src = base + record.offset as usize;
            self.bytes
                .copy_within(src..src + record.size as usize, base + offset as usize);
            self.free_data(record.offset, old_footprint);
            record.offset = offset;
        }

        record.size = new_size;
        self.set_slot(handle.index(), record);
        self.commit_free_lists()
    }

    /// Whether the handle resolves.
    pub fn contains<T: ?Sized>(&self, handle: Handle<T>) -> bool {
        self.resolve(handle.raw()).is_some()
    }

    /// Allocation size in bytes.
    pub fn size_of<T: ?Sized>(&self, handle: Handle<T>) -> Option<usize> {
        self.resolve(handle.raw()).map(|r| r.size as usize)
    }

    /// Read-only view of an allocation.
    pub fn bytes<T: ?Sized>(&self, handle: Handle<T>) -> Option<&[u8]> {
        let record = self.resolve(handle.raw())?;
        let start = self.data_base() + record.offset as usize;
        Some(&self.bytes[start..start + record.size as usize])
    }

    /// Mutable view of an allocation.
    ///
    /// The view is invalidated by any call that can move data (allocate,
    /// resize, trim); the handle is not.
    pub fn bytes_mut<T: ?Sized>(&mut self, handle: Handle<T>) -> Option<&mut [u8]> {
        let record = self.resolve(handle.raw())?;
        let start = self.data_base() + record.offset as usize;
        Some(&mut self.bytes[start..start + record.size as usize])
    }

    /// Read a value.
    pub fn read<T: Pod>(&self, handle: Handle<T>) -> Option<T> {
        let bytes = self.bytes(handle)?;
        bytes
            .get(..size_of::<T>())
            .and_then(|b| bytemuck::try_pod_read_unaligned(b).ok())
    }

    /// Overwrite a value.
    pub fn write<T: Pod>(&mut self, handle: Handle<T>, value: &T) -> Result<(), StatError> {
        let bytes = self.bytes_mut(handle).ok_or(StatError::InvalidHandle)?;
        let dst = bytes
            .get_mut(..size_of::<T>())
            .ok_or(StatError::InvalidSize)?;
        dst.copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }

    /// Number of whole `T` elements the allocation can hold.
    pub fn capacity_of<T: Pod>(&self, handle: Handle<[T]>) -> Option<usize> {
        let elem = size_of::<T>();
        if elem == 0 {
            return None;
        }
        self.size_of(handle).map(|size| size / elem)
    }

    /// Read element `index` of a list allocation.
    pub fn read_elem<T: Pod>(&self, handle: Handle<[T]>, index: usize) -> Option<T> {
        let elem = size_of::<T>();
        let start = index.checked_mul(elem)?;
        let bytes = self.bytes(handle)?.get(start..start + elem)?;
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }

    /// Overwrite element `index` of a list allocation.
    pub fn write_elem<T: Pod>(
        &mut self,
        handle: Handle<[T]>,
        index: usize,
        value: &T,
    ) -> Result<(), StatError> {
        let elem = size_of::<T>();
        let start = index.checked_mul(elem).ok_or(StatError::InvalidSize)?;
        let bytes = self.bytes_mut(handle).ok_or(StatError::InvalidHandle)?;
        let dst = bytes
            .get_mut(start..start + elem)
            .ok_or(StatError::InvalidSize)?;
        dst.copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }

    /// Iterate the first `count` elements of a list allocation.
    pub fn elems<T: Pod>(
        &self,
        handle: Handle<[T]>,
        count: usize,
    ) -> Option<impl Iterator<Item = T> + '_> {
        let elem = size_of::<T>();
        if elem == 0 {
            return None;
        }
        let bytes = self.bytes(handle)?;
        let len = count.checked_mul(elem)?.min(bytes.len() / elem * elem);
        Some(bytes[..len].chunks_exact(elem).map(bytemuck::pod_read_unaligned))
    }

    /// Live user allocations in slot order.
    pub fn allocations(&self) -> impl Iterator<Item = Allocation> + '_ {
        (RESERVED_SLOTS..self.slot_count).filter_map(move |index| {
            let record = self.slot_at(index);
            (record.occupied != 0).then_some(Allocation {
                handle: RawHandle::new(index, record.version),
                offset: record.offset,
                size: record.size,
            })
        })
    }

    /// Occupancy summary.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            slot_count: self.slot_count,
            live_slots: self.allocations().count() as u32,
            data_len: self.data_len,
            free_bytes: self.data_free.total(),
            free_ranges: self.data_free.len(),
        }
    }

    /// Compact the data region.
    ///
    /// Walks live allocations in offset order, packs them to the front,
    /// and truncates the region. Handles remain valid; byte views taken
    /// before the call do not. Returns the number of bytes released.
    ///
    /// Never called implicitly.
    pub fn trim_capacity(&mut self) -> Result<u32, StatError> {
        let mut live: Vec<(u32, SlotRecord)> = (0..self.slot_count)
            .map(|index| (index, self.slot_at(index)))
            .filter(|(_, record)| record.occupied != 0)
            .collect();
        live.sort_by_key(|(_, record)| record.offset);

        let base = self.data_base();
        let mut cursor = 0u32;
        for (index, record) in &mut live {
            let footprint = align_up(record.size).unwrap_or(record.size);
            if record.offset != cursor {
                let src = base + record.offset as usize;
                self.bytes
                    .copy_within(src..src + footprint as usize, base + cursor as usize);
                record.offset = cursor;
                self.set_slot(*index, *record);
            }
            cursor += footprint;
        }

        let released = self.data_len - cursor;
        self.bytes.truncate(base + cursor as usize);
        self.data_len = cursor;
        self.data_free.clear();
        self.write_header();
        self.commit_free_lists()?;

        tracing::debug!(released, data_len = cursor, "arena trimmed");
        Ok(released)
    }

    /// The serialized form: header, metadata table, data region.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Load a serialized arena.
    ///
    /// Fails with `CorruptArena` on a layout-version mismatch or any
    /// inconsistency between the header, the metadata table and the
    /// free-range lists.
    pub fn from_bytes(bytes: Vec<u8>, config: ArenaConfig) -> Result<Self, StatError> {
        if bytes.len() < HEADER_BYTES {
            return Err(StatError::corrupt("truncated header"));
        }
        let header =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let version = header(0);
        if version != LAYOUT_VERSION {
            return Err(StatError::corrupt(format!(
                "layout version {version}, expected {LAYOUT_VERSION}"
            )));
        }
        let slot_count = header(4);
        let data_len = header(8);
        let expected =
            HEADER_BYTES as u64 + slot_count as u64 * SLOT_BYTES as u64 + data_len as u64;
        if bytes.len() as u64 != expected || slot_count <= RESERVED_SLOTS {
            return Err(StatError::corrupt(format!(
                "length {} does not match header ({slot_count} slots, {data_len} data bytes)",
                bytes.len()
            )));
        }

        let mut arena = Self {
            bytes,
            config,
            slot_count,
            data_len,
            slot_free: RangeSet::new(),
            data_free: RangeSet::new(),
        };
        arena.slot_free = arena.load_list(SLOT_FREE_LIST, slot_count)?;
        arena.data_free = arena.load_list(DATA_FREE_LIST, data_len)?;
        arena.validate()?;
        Ok(arena)
    }

    /// Check every structural invariant.
    ///
    /// Live allocations and free data ranges must tile the data region
    /// exactly, and free slot ranges must cover exactly the unoccupied
    /// user slots.
    pub fn validate(&self) -> Result<(), StatError> {
        let mut extents: Vec<(u32, u32, bool)> = Vec::new();
        let mut unoccupied = 0u64;
        for index in 0..self.slot_count {
            let record = self.slot_at(index);
            if record.occupied == 0 {
                if index < RESERVED_SLOTS {
                    return Err(StatError::corrupt("reserved list slot is free"));
                }
                unoccupied += 1;
                continue;
            }
            let footprint = align_up(record.size)
                .ok_or_else(|| StatError::corrupt(format!("slot {index} size overflows")))?;
            let end = record
                .offset
                .checked_add(footprint)
                .filter(|&end| end <= self.data_len)
                .ok_or_else(|| StatError::corrupt(format!("slot {index} out of bounds")))?;
            if record.offset % DATA_ALIGN != 0 || record.size == 0 {
                return Err(StatError::corrupt(format!("slot {index} misaligned or empty")));
            }
            extents.push((record.offset, end, true));
        }
        extents.extend(self.data_free.as_slice().iter().map(|r| (r.start, r.end, false)));
        extents.sort_unstable();

        let mut cursor = 0u32;
        for (start, end, live) in extents {
            if start != cursor {
                let kind = if live { "allocation" } else { "free range" };
                return Err(StatError::corrupt(format!(
                    "{kind} at {start} does not continue from {cursor}"
                )));
            }
            cursor = end;
        }
        if cursor != self.data_len {
            return Err(StatError::corrupt("data region not fully accounted for"));
        }

        if self.slot_free.total() != unoccupied {
            return Err(StatError::corrupt("free slot list disagrees with table"));
        }
        for range in self.slot_free.as_slice() {
            if range.start < RESERVED_SLOTS
                || (range.start..range.end).any(|i| self.slot_at(i).occupied != 0)
            {
                return Err(StatError::corrupt("free slot list names an occupied slot"));
            }
        }

        for (index, bound, mirror) in [
            (SLOT_FREE_LIST, self.slot_count, &self.slot_free),
            (DATA_FREE_LIST, self.data_len, &self.data_free),
        ] {
            if self.load_list(index, bound)?.as_slice() != mirror.as_slice() {
                return Err(StatError::corrupt("stored free list is out of date"));
            }
        }
        Ok(())
    }

    fn data_base(&self) -> usize {
        HEADER_BYTES + self.slot_count as usize * SLOT_BYTES
    }

    fn write_header(&mut self) {
        let fields = [LAYOUT_VERSION, self.slot_count, self.data_len, 0];
        for (i, field) in fields.iter().enumerate() {
            self.bytes[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
    }

    fn slot_at(&self, index: u32) -> SlotRecord {
        let start = HEADER_BYTES + index as usize * SLOT_BYTES;
        bytemuck::pod_read_unaligned(&self.bytes[start..start + SLOT_BYTES])
    }

    fn set_slot(&mut self, index: u32, record: SlotRecord) {
        let start = HEADER_BYTES + index as usize * SLOT_BYTES;
        self.bytes[start..start + SLOT_BYTES].copy_from_slice(bytemuck::bytes_of(&record));
    }

    /// Resolve a user handle: in range, not reserved, occupied, and the
    /// version matches.
    fn resolve(&self, raw: RawHandle) -> Option<SlotRecord> {
        if raw.is_null() || raw.index < RESERVED_SLOTS || raw.index >= self.slot_count {
            return None;
        }
        let record = self.slot_at(raw.index);
        (record.occupied != 0 && record.version == raw.version).then_some(record)
    }

    fn alloc_slot(&mut self) -> Result<u32, StatError> {
        if let Some(index) = self.slot_free.take_first_fit(1) {
            return Ok(index);
        }
        self.grow_slots()?;
        self.slot_free
            .take_first_fit(1)
            .ok_or(StatError::AllocationExhausted {
                requested: self.slot_count as usize + 1,
                capacity: self.slot_count as usize,
            })
    }

    fn grow_slots(&mut self) -> Result<(), StatError> {
        let old = self.slot_count;
        let cap = self.config.max_slots.unwrap_or(u32::MAX / SLOT_BYTES as u32);
        if old >= cap {
            return Err(StatError::AllocationExhausted {
                requested: old as usize + 1,
                capacity: cap as usize,
            });
        }
        let geometric = (old as f64 * self.config.effective_growth() as f64).ceil() as u64;
        let new = geometric.max(old as u64 + 1).min(cap as u64) as u32;

        let at = self.data_base();
        let extra = (new - old) as usize * SLOT_BYTES;
        self.bytes.splice(at..at, std::iter::repeat(0u8).take(extra));
        self.slot_count = new;
        self.slot_free.insert(old, new);
        self.write_header();

        tracing::debug!(from = old, to = new, "arena metadata table grown");
        Ok(())
    }

    fn alloc_data(&mut self, footprint: u32, capped: bool) -> Result<u32, StatError> {
        if let Some(offset) = self.data_free.take_first_fit(footprint) {
            return Ok(offset);
        }
        self.grow_data(footprint, capped)?;
        self.data_free
            .take_first_fit(footprint)
            .ok_or(StatError::AllocationExhausted {
                requested: footprint as usize,
                capacity: self.data_len as usize,
            })
    }

    /// Grow the data region so that `footprint` bytes fit at its end.
    ///
    /// The free-range lists grow uncapped (`capped == false`): a full
    /// arena must still be able to record frees.
    fn grow_data(&mut self, footprint: u32, capped: bool) -> Result<(), StatError> {
        let old = self.data_len;
        let needed = footprint - self.data_free.len_ending_at(old).min(footprint);
        let limit = u32::MAX & !(DATA_ALIGN - 1);
        let cap = if capped {
            self.config
                .max_data_bytes
                .map_or(limit, |cap| cap & !(DATA_ALIGN - 1))
        } else {
            limit
        };
        let minimum = old as u64 + needed as u64;
        if minimum > cap as u64 {
            return Err(StatError::AllocationExhausted {
                requested: footprint as usize,
                capacity: cap as usize,
            });
        }
        let geometric = (old as f64 * self.config.effective_growth() as f64).ceil() as u64;
        let new = geometric.max(minimum).min(cap as u64) as u32 & !(DATA_ALIGN - 1);
        let new = new.max(minimum as u32);

        self.bytes.resize(self.bytes.len() + (new - old) as usize, 0);
        self.data_len = new;
        self.data_free.insert(old, new);
        self.write_header();

        tracing::debug!(from = old, to = new, "arena data region grown");
        Ok(())
    }

    fn free_data(&mut self, offset: u32, footprint: u32) {
        if footprint == 0 {
            return;
        }
        let start = self.data_base() + offset as usize;
        self.bytes[start..start + footprint as usize].fill(0);
        self.data_free.insert(offset, offset + footprint);
    }

    /// Make sure both list objects can hold their mirrors, then write them.
    ///
    /// Moving a list object frees its old range, which can change the
    /// other list's length, so this loops until neither moves.
    fn commit_free_lists(&mut self) -> Result<(), StatError> {
        loop {
            let slot_moved = self.ensure_list_capacity(SLOT_FREE_LIST, self.slot_free.len())?;
            let data_moved = self.ensure_list_capacity(DATA_FREE_LIST, self.data_free.len())?;
            if !slot_moved && !data_moved {
                break;
            }
        }
        self.write_list(SLOT_FREE_LIST);
        self.write_list(DATA_FREE_LIST);
        Ok(())
    }

    fn ensure_list_capacity(&mut self, index: u32, entries: usize) -> Result<bool, StatError> {
        let needed = to_u32(LIST_HEADER_BYTES as usize + entries * size_of::<FreeRange>())?;
        let mut record = self.slot_at(index);
        if record.size >= needed {
            return Ok(false);
        }
        let capacity = align_up(needed.saturating_mul(2).max(MIN_LIST_BYTES)).ok_or(
            StatError::AllocationExhausted {
                requested: needed as usize,
                capacity: u32::MAX as usize,
            },
        )?;
        let offset = self.alloc_data(capacity, false)?;
        self.free_data(record.offset, record.size);
        record.offset = offset;
        record.size = capacity;
        self.set_slot(index, record);
        Ok(true)
    }

    fn write_list(&mut self, index: u32) {
        let record = self.slot_at(index);
        let start = self.data_base() + record.offset as usize;
        let set = if index == SLOT_FREE_LIST {
            &self.slot_free
        } else {
            &self.data_free
        };
        let header = [set.len() as u32, 0u32];
        let mut cursor = start;
        for chunk in [
            bytemuck::cast_slice::<u32, u8>(&header),
            bytemuck::cast_slice(set.as_slice()),
        ] {
            self.bytes[cursor..cursor + chunk.len()].copy_from_slice(chunk);
            cursor += chunk.len();
        }
    }

    fn load_list(&self, index: u32, bound: u32) -> Result<RangeSet, StatError> {
        let record = self.slot_at(index);
        let end = record.offset as u64 + record.size as u64;
        if record.occupied == 0 || record.size < LIST_HEADER_BYTES || end > self.data_len as u64 {
            return Err(StatError::corrupt(format!("range list {index} is missing")));
        }
        let start = self.data_base() + record.offset as usize;
        let object = &self.bytes[start..start + record.size as usize];
        let len = bytemuck::pod_read_unaligned::<u32>(&object[..4]) as usize;
        let body = &object[LIST_HEADER_BYTES as usize..];
        let width = size_of::<FreeRange>();
        if len > body.len() / width {
            return Err(StatError::corrupt(format!("range list {index} overruns its object")));
        }
        let ranges = body[..len * width]
            .chunks_exact(width)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        RangeSet::from_sorted(ranges, bound)
            .ok_or_else(|| StatError::corrupt(format!("range list {index} is not ordered")))
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}
