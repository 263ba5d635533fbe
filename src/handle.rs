//! Handles into arenas and the owner table.
//!
//! A handle is an index + version pair. The version is compared against
//! the slot it points at on every access, so a handle captured before a
//! free can never alias whatever reuses the slot afterwards.
//!
//! Handles carry no ownership. The arena owns all memory; dropping a
//! handle does nothing.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Untyped handle as stored inside arena bytes.
///
/// Version `0` is never handed out, so an all-zero record is null.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize,
    Deserialize,
)]
pub struct RawHandle {
    /// Slot index into the metadata table.
    pub index: u32,
    /// Slot version captured at allocation time.
    pub version: u32,
}

impl RawHandle {
    /// The canonical null handle.
    pub const NULL: RawHandle = RawHandle {
        index: u32::MAX,
        version: 0,
    };

    /// Create a raw handle from its parts.
    pub const fn new(index: u32, version: u32) -> Self {
        Self { index, version }
    }

    /// Whether this handle can never resolve.
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX || self.version == 0
    }
}

/// Typed handle to an arena allocation.
///
/// `T` is only a marker for what the bytes hold: `Handle<StatRecord>`
/// for a single record, `Handle<[ObserverEntry]>` for a list.
///
/// # Examples
///
/// ```rust
/// use statarena::{Arena, ArenaConfig};
///
/// let mut arena = Arena::new(ArenaConfig::default());
/// let h = arena.allocate(&7u32).unwrap();
/// assert_eq!(arena.read(h), Some(7));
///
/// arena.free(h).unwrap();
/// assert_eq!(arena.read(h), None);
/// ```
pub struct Handle<T: ?Sized> {
    raw: RawHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> Handle<T> {
    /// The null handle for this type.
    pub const NULL: Handle<T> = Handle {
        raw: RawHandle::NULL,
        _marker: PhantomData,
    };

    /// Wrap a raw handle.
    pub const fn from_raw(raw: RawHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The untyped form, as stored in records.
    pub const fn raw(self) -> RawHandle {
        self.raw
    }

    /// Slot index into the metadata table.
    pub const fn index(self) -> u32 {
        self.raw.index
    }

    /// Version captured at allocation time.
    pub const fn version(self) -> u32 {
        self.raw.version
    }

    /// Whether this handle can never resolve.
    pub const fn is_null(self) -> bool {
        self.raw.is_null()
    }

    /// Reinterpret the marker type.
    pub(crate) const fn cast<U: ?Sized>(self) -> Handle<U> {
        Handle::from_raw(self.raw)
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Handle<T> {}

impl<T: ?Sized> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: ?Sized> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T: ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.raw.index, self.raw.version)
    }
}

/// Identifier of a stats owner (e.g. a game entity) in a `StatGraph`.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize,
    Deserialize,
)]
pub struct OwnerId {
    index: u32,
    version: u32,
}

impl OwnerId {
    /// Create an owner id from its parts.
    pub const fn new(index: u32, version: u32) -> Self {
        Self { index, version }
    }

    /// Slot index in the owner table.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Version of the owner slot.
    pub const fn version(self) -> u32 {
        self.version
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}v{}", self.index, self.version)
    }
}

/// Handle to a stat: the owner whose arena holds it plus the record handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "PackedStatHandle", into = "PackedStatHandle")]
pub struct StatHandle {
    /// The owner whose arena holds the record.
    pub owner: OwnerId,
    /// The record handle inside that arena.
    pub slot: Handle<crate::record::StatRecord>,
}

impl StatHandle {
    /// Create a stat handle.
    pub const fn new(owner: OwnerId, slot: Handle<crate::record::StatRecord>) -> Self {
        Self { owner, slot }
    }

    /// Pack into the fixed-size form stored in arena bytes.
    pub const fn pack(self) -> PackedStatHandle {
        PackedStatHandle {
            owner_index: self.owner.index,
            owner_version: self.owner.version,
            slot_index: self.slot.index(),
            slot_version: self.slot.version(),
        }
    }
}

impl fmt::Display for StatHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}v{}",
            self.owner,
            self.slot.index(),
            self.slot.version()
        )
    }
}

/// Arena-resident form of a [`StatHandle`].
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct PackedStatHandle {
    pub owner_index: u32,
    pub owner_version: u32,
    pub slot_index: u32,
    pub slot_version: u32,
}

impl PackedStatHandle {
    pub const fn unpack(self) -> StatHandle {
        StatHandle {
            owner: OwnerId::new(self.owner_index, self.owner_version),
            slot: Handle::from_raw(RawHandle::new(self.slot_index, self.slot_version)),
        }
    }
}

impl From<PackedStatHandle> for StatHandle {
    fn from(packed: PackedStatHandle) -> Self {
        packed.unpack()
    }
}

impl From<StatHandle> for PackedStatHandle {
    fn from(handle: StatHandle) -> Self {
        handle.pack()
    }
}

/// Identifies one modifier on one stat.
///
/// Returned by `add_modifier`; removal goes by this id, never by list
/// position, so it survives removals of other modifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierHandle {
    /// The stat the modifier was added to.
    pub stat: StatHandle,
    /// Owner-unique modifier id.
    pub id: u32,
}

impl fmt::Display for ModifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stat, self.id)
    }
}
