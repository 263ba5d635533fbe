//! Stats owners and the owner table.
//!
//! An owner is the external aggregate (a game entity, a unit, a player)
//! whose stats live together in one private [`Arena`]. Destroying the
//! owner drops the arena, which frees every record and list at once.

use crate::arena::Arena;
use crate::config::ArenaConfig;
use crate::error::StatError;
use crate::handle::{Handle, OwnerId};
use crate::record::StatRecord;
use crate::stat_id::StatId;
use indexmap::IndexMap;

/// One owner's stats.
#[derive(Clone, Debug)]
pub struct StatsOwner {
    arena: Arena,
    stats: IndexMap<StatId, Handle<StatRecord>>,
    next_modifier_id: u32,
}

impl StatsOwner {
    pub(crate) fn new(config: ArenaConfig) -> Self {
        Self {
            arena: Arena::new(config),
            stats: IndexMap::new(),
            next_modifier_id: 1,
        }
    }

    /// The arena holding this owner's records and lists.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Number of declared stats.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Look up a stat by name.
    pub fn stat(&self, id: &str) -> Option<Handle<StatRecord>> {
        self.stats.get(id).copied()
    }

    /// Reverse lookup: the name a record was declared under.
    pub fn stat_id(&self, slot: Handle<StatRecord>) -> Option<&StatId> {
        self.stats
            .iter()
            .find_map(|(id, &handle)| (handle == slot).then_some(id))
    }

    /// Stats in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&StatId, Handle<StatRecord>)> + '_ {
        self.stats.iter().map(|(id, &handle)| (id, handle))
    }

    /// Read a record; `None` if the handle is stale.
    pub fn record(&self, slot: Handle<StatRecord>) -> Option<StatRecord> {
        self.arena.read(slot)
    }

    pub(crate) fn write_record(
        &mut self,
        slot: Handle<StatRecord>,
        record: &StatRecord,
    ) -> Result<(), StatError> {
        self.arena.write(slot, record)
    }

    /// Allocate a record for a new stat.
    pub(crate) fn create_stat(
        &mut self,
        id: StatId,
        base_value: f32,
    ) -> Result<Handle<StatRecord>, StatError> {
        if self.stats.contains_key(&id) {
            return Err(StatError::DuplicateStat(id));
        }
        let slot = self.arena.allocate(&StatRecord::new(base_value))?;
        self.stats.insert(id, slot);
        Ok(slot)
    }

    /// Next owner-unique modifier id. Zero is never issued.
    pub(crate) fn allocate_modifier_id(&mut self) -> u32 {
        let id = self.next_modifier_id;
        self.next_modifier_id = self.next_modifier_id.wrapping_add(1).max(1);
        id
    }
}

#[derive(Debug, Default)]
struct OwnerSlot {
    version: u32,
    owner: Option<StatsOwner>,
}

/// Generational table of live owners.
///
/// Freed slots are reused with a bumped version, so an `OwnerId` held
/// past `remove` never resolves to the next occupant.
#[derive(Debug, Default)]
pub(crate) struct OwnerTable {
    slots: Vec<OwnerSlot>,
    free: Vec<u32>,
    len: usize,
}

impl OwnerTable {
    pub(crate) fn insert(&mut self, owner: StatsOwner) -> OwnerId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.owner = Some(owner);
            return OwnerId::new(index, slot.version);
        }
        let index = self.slots.len() as u32;
        self.slots.push(OwnerSlot {
            version: 1,
            owner: Some(owner),
        });
        OwnerId::new(index, 1)
    }

    pub(crate) fn get(&self, id: OwnerId) -> Option<&StatsOwner> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.version == id.version())
            .and_then(|slot| slot.owner.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: OwnerId) -> Option<&mut StatsOwner> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.version == id.version())
            .and_then(|slot| slot.owner.as_mut())
    }

    pub(crate) fn remove(&mut self, id: OwnerId) -> Option<StatsOwner> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.version == id.version())?;
        let owner = slot.owner.take()?;
        slot.version = slot.version.wrapping_add(1).max(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(owner)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (OwnerId, &StatsOwner)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.owner
                .as_ref()
                .map(|owner| (OwnerId::new(index as u32, slot.version), owner))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
