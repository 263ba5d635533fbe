//! Arena-resident stat records and the lists hanging off them.
//!
//! A stat is one [`StatRecord`] plus two growable lists in the same arena:
//!
//! - the modifier list, entries `[id: u32][M::Packed]`, in insertion order;
//! - the observer list, [`ObserverEntry`] per observing stat.
//!
//! Lists grow geometrically through [`Arena::resize`], which keeps their
//! handles stable, and are compacted in place on removal.

use crate::arena::Arena;
use crate::error::StatError;
use crate::handle::{Handle, PackedStatHandle, RawHandle, StatHandle};
use crate::modifier::StatModifier;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

const MIN_LIST_ENTRIES: usize = 4;
const ID_BYTES: usize = size_of::<u32>();

/// Fixed-layout stat record.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StatRecord {
    pub base_value: f32,
    pub final_value: f32,
    /// Modifier list allocation, null until the first modifier.
    pub modifiers: RawHandle,
    /// Observer list allocation, null until the first observer.
    pub observers: RawHandle,
    pub modifier_count: u32,
    pub observer_count: u32,
}

impl StatRecord {
    /// A record with no modifiers, whose final value is its base.
    pub fn new(base_value: f32) -> Self {
        Self {
            base_value,
            final_value: base_value,
            modifiers: RawHandle::NULL,
            observers: RawHandle::NULL,
            modifier_count: 0,
            observer_count: 0,
        }
    }
}

/// One observer edge, stored on the observed stat.
///
/// `refs` counts the modifiers on `observer` that read this stat, so an
/// edge survives until the last of them is removed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ObserverEntry {
    pub observer: PackedStatHandle,
    pub refs: u32,
}

/// Grow the list behind `list` to hold `needed` entries of `stride` bytes.
fn reserve(
    arena: &mut Arena,
    list: &mut RawHandle,
    stride: usize,
    needed: usize,
) -> Result<(), StatError> {
    let handle = Handle::<[u8]>::from_raw(*list);
    let capacity = arena.size_of(handle).map_or(0, |size| size / stride);
    if needed <= capacity {
        return Ok(());
    }
    let new_capacity = needed.max(capacity * 2).max(MIN_LIST_ENTRIES);
    if arena.contains(handle) {
        arena.resize(handle, new_capacity * stride)?;
    } else {
        *list = arena.allocate_bytes::<[u8]>(new_capacity * stride)?.raw();
    }
    Ok(())
}

pub(crate) fn modifier_stride<M: StatModifier>() -> usize {
    ID_BYTES + size_of::<M::Packed>()
}

/// Decode the modifier list in insertion order.
///
/// Entries that fail to decode are skipped.
pub(crate) fn read_modifiers<M: StatModifier>(arena: &Arena, record: &StatRecord) -> Vec<(u32, M)> {
    let stride = modifier_stride::<M>();
    let len = record.modifier_count as usize * stride;
    let Some(bytes) = arena
        .bytes(Handle::<[u8]>::from_raw(record.modifiers))
        .and_then(|bytes| bytes.get(..len))
    else {
        return Vec::new();
    };
    bytes
        .chunks_exact(stride)
        .filter_map(|entry| {
            let id: u32 = bytemuck::pod_read_unaligned(&entry[..ID_BYTES]);
            let packed: M::Packed = bytemuck::pod_read_unaligned(&entry[ID_BYTES..]);
            M::unpack(packed).map(|m| (id, m))
        })
        .collect()
}

/// Append a modifier entry.
pub(crate) fn push_modifier<M: StatModifier>(
    arena: &mut Arena,
    record: &mut StatRecord,
    id: u32,
    modifier: &M,
) -> Result<(), StatError> {
    let stride = modifier_stride::<M>();
    let count = record.modifier_count as usize;
    reserve(arena, &mut record.modifiers, stride, count + 1)?;

    let bytes = arena
        .bytes_mut(Handle::<[u8]>::from_raw(record.modifiers))
        .ok_or(StatError::InvalidHandle)?;
    let entry = &mut bytes[count * stride..(count + 1) * stride];
    entry[..ID_BYTES].copy_from_slice(bytemuck::bytes_of(&id));
    entry[ID_BYTES..].copy_from_slice(bytemuck::bytes_of(&modifier.pack()));
    record.modifier_count += 1;
    Ok(())
}

/// Remove every entry whose id is in `ids`, compacting the list in place.
///
/// Returns the removed modifiers in list order.
pub(crate) fn remove_modifiers<M: StatModifier>(
    arena: &mut Arena,
    record: &mut StatRecord,
    ids: &[u32],
) -> Vec<(u32, M)> {
    let stride = modifier_stride::<M>();
    let count = record.modifier_count as usize;
    let Some(bytes) = arena.bytes_mut(Handle::<[u8]>::from_raw(record.modifiers)) else {
        return Vec::new();
    };

    let mut removed = Vec::new();
    let mut kept = 0;
    for index in 0..count {
        let start = index * stride;
        let id: u32 = bytemuck::pod_read_unaligned(&bytes[start..start + ID_BYTES]);
        if ids.contains(&id) {
            let packed: M::Packed =
                bytemuck::pod_read_unaligned(&bytes[start + ID_BYTES..start + stride]);
            if let Some(m) = M::unpack(packed) {
                removed.push((id, m));
            }
            continue;
        }
        if kept != index {
            bytes.copy_within(start..start + stride, kept * stride);
        }
        kept += 1;
    }
    bytes[kept * stride..count * stride].fill(0);
    record.modifier_count = kept as u32;
    removed
}

pub(crate) fn read_observers(arena: &Arena, record: &StatRecord) -> Vec<ObserverEntry> {
    arena
        .elems(
            Handle::<[ObserverEntry]>::from_raw(record.observers),
            record.observer_count as usize,
        )
        .map(|entries| entries.collect())
        .unwrap_or_default()
}

/// Record that `observer` reads this stat, bumping the edge's count if it
/// already exists.
pub(crate) fn add_observer(
    arena: &mut Arena,
    record: &mut StatRecord,
    observer: StatHandle,
) -> Result<(), StatError> {
    let packed = observer.pack();
    let list = Handle::<[ObserverEntry]>::from_raw(record.observers);
    let count = record.observer_count as usize;
    for index in 0..count {
        if let Some(mut entry) = arena.read_elem(list, index) {
            if entry.observer == packed {
                entry.refs += 1;
                return arena.write_elem(list, index, &entry);
            }
        }
    }

    reserve(
        arena,
        &mut record.observers,
        size_of::<ObserverEntry>(),
        count + 1,
    )?;
    let list = Handle::<[ObserverEntry]>::from_raw(record.observers);
    arena.write_elem(
        list,
        count,
        &ObserverEntry {
            observer: packed,
            refs: 1,
        },
    )?;
    record.observer_count += 1;
    Ok(())
}

/// Drop one reference to the `observer` edge; the edge goes away with its
/// last reference. Returns whether an edge was found.
pub(crate) fn release_observer(
    arena: &mut Arena,
    record: &mut StatRecord,
    observer: StatHandle,
) -> bool {
    let packed = observer.pack();
    let mut entries = read_observers(arena, record);
    let Some(entry) = entries.iter_mut().find(|e| e.observer == packed) else {
        return false;
    };
    entry.refs = entry.refs.saturating_sub(1);
    entries.retain(|e| e.refs > 0);
    rewrite_observers(arena, record, &entries);
    true
}

/// Keep only the edges for which `keep` holds. Returns how many were
/// dropped.
pub(crate) fn retain_observers(
    arena: &mut Arena,
    record: &mut StatRecord,
    mut keep: impl FnMut(StatHandle) -> bool,
) -> usize {
    let entries = read_observers(arena, record);
    let kept: Vec<ObserverEntry> = entries
        .iter()
        .copied()
        .filter(|e| keep(e.observer.unpack()))
        .collect();
    let dropped = entries.len() - kept.len();
    if dropped > 0 {
        rewrite_observers(arena, record, &kept);
    }
    dropped
}

fn rewrite_observers(arena: &mut Arena, record: &mut StatRecord, entries: &[ObserverEntry]) {
    let list = Handle::<[ObserverEntry]>::from_raw(record.observers);
    let old_count = record.observer_count as usize;
    if let Some(bytes) = arena.bytes_mut(list) {
        let width = size_of::<ObserverEntry>();
        let new_len = entries.len() * width;
        bytes[..new_len].copy_from_slice(bytemuck::cast_slice(entries));
        bytes[new_len..old_count * width].fill(0);
        record.observer_count = entries.len() as u32;
    }
}
