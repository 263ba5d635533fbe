//! The stat graph.
//!
//! `StatGraph` owns every owner's arena and is the only way to mutate
//! stats. It is threaded explicitly through calls; there is no global
//! instance. All mutating methods take `&mut self`, which is the
//! single-writer discipline cascades need: a cascade may cross owner
//! boundaries, so it must have exclusive access to the whole graph.
//! Reads (`get_value`, `breakdown`, ...) take `&self` and may run in
//! parallel with each other.

use crate::arena::Arena;
use crate::cascade::CascadeReport;
use crate::config::{ArenaConfig, CyclePolicy, GraphConfig};
use crate::error::StatError;
use crate::graph::DependencyGraph;
use crate::handle::{ModifierHandle, OwnerId, StatHandle};
use crate::modifier::{ApplyOutcome, Modifier, ModifierStack, StatModifier, StatReader};
use crate::owner::{OwnerTable, StatsOwner};
use crate::record::{self, StatRecord};
use crate::resolved::ResolvedStat;
use crate::stat_id::StatId;
use std::marker::PhantomData;
use tracing::debug;

/// Owners, their stats, and the dependency edges between them.
///
/// # Examples
///
/// ```rust
/// use statarena::{Modifier, StatGraph};
///
/// let mut stats: StatGraph = StatGraph::default();
/// let hero = stats
///     .create_owner([("Strength", 10.0), ("Attack", 5.0)])
///     .unwrap();
/// let strength = stats.stat(hero, "Strength").unwrap();
/// let attack = stats.stat(hero, "Attack").unwrap();
///
/// // Attack gains half of Strength.
/// stats
///     .add_modifier(attack, Modifier::AddFromStat { stat: strength, factor: 0.5 })
///     .unwrap();
/// assert_eq!(stats.value(attack), Some(10.0));
///
/// // Changing Strength updates Attack.
/// stats.set_base_value(strength, 20.0).unwrap();
/// assert_eq!(stats.value(attack), Some(15.0));
/// ```
pub struct StatGraph<M: StatModifier = Modifier> {
    pub(crate) owners: OwnerTable,
    pub(crate) config: GraphConfig,
    pub(crate) cascade_count: u64,
    pub(crate) last_cascade: Option<CascadeReport>,
    _marker: PhantomData<M>,
}

impl<M: StatModifier> StatGraph<M> {
    /// Create an empty graph.
    pub fn new(config: GraphConfig) -> Self {
        Self {
            owners: OwnerTable::default(),
            config,
            cascade_count: 0,
            last_cascade: None,
            _marker: PhantomData,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of live owners.
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn contains_owner(&self, owner: OwnerId) -> bool {
        self.owners.get(owner).is_some()
    }

    pub fn owner(&self, owner: OwnerId) -> Option<&StatsOwner> {
        self.owners.get(owner)
    }

    /// The arena backing `owner`, e.g. for serialization via
    /// [`Arena::as_bytes`].
    pub fn owner_arena(&self, owner: OwnerId) -> Option<&Arena> {
        self.owners.get(owner).map(StatsOwner::arena)
    }

    /// Live owners.
    pub fn owners(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.owners.iter().map(|(id, _)| id)
    }

    /// Create an owner with its initial stat set. Each stat starts with
    /// `final_value == base_value` and no modifiers.
    ///
    /// # Errors
    ///
    /// `DuplicateStat` if an id appears twice; nothing is created.
    pub fn create_owner<I, K>(&mut self, stats: I) -> Result<OwnerId, StatError>
    where
        I: IntoIterator<Item = (K, f32)>,
        K: Into<StatId>,
    {
        let stats: Vec<(StatId, f32)> = stats
            .into_iter()
            .map(|(id, base)| (id.into(), base))
            .collect();

        let mut arena_config = self.config.arena.clone();
        let wanted = ArenaConfig::for_stats(stats.len() as u32).initial_slots;
        arena_config.initial_slots = arena_config.initial_slots.max(wanted);
        if let Some(max) = arena_config.max_slots {
            arena_config.initial_slots = arena_config.initial_slots.min(max);
        }

        let mut owner = StatsOwner::new(arena_config);
        for (id, base) in stats {
            owner.create_stat(id, base)?;
        }
        let count = owner.len();
        let id = self.owners.insert(owner);
        debug!(owner = %id, stats = count, "owner created");
        Ok(id)
    }

    /// Destroy an owner and everything in its arena.
    ///
    /// Observer edges that this owner's modifiers registered on other
    /// owners' stats are released first. Modifiers on other owners that
    /// read this owner's stats are not touched: they detach on their
    /// stat's next recompute.
    pub fn destroy_owner(&mut self, owner: OwnerId) -> Result<(), StatError> {
        let stats = self
            .owners
            .get(owner)
            .ok_or(StatError::UnknownOwner(owner))?;
        let mut edges = Vec::new();
        for (_, slot) in stats.iter() {
            let Some(record) = stats.record(slot) else {
                continue;
            };
            let observer = StatHandle::new(owner, slot);
            for (_, modifier) in record::read_modifiers::<M>(stats.arena(), &record) {
                edges.extend(
                    modifier
                        .observed()
                        .into_iter()
                        .filter(|target| target.owner != owner)
                        .map(|target| (target, observer)),
                );
            }
        }
        for &(observed, observer) in &edges {
            self.release_edge(observed, observer);
        }

        let removed = self
            .owners
            .remove(owner)
            .ok_or(StatError::UnknownOwner(owner))?;
        debug!(
            owner = %owner,
            stats = removed.len(),
            released_edges = edges.len(),
            "owner destroyed"
        );
        Ok(())
    }

    /// Declare a new stat on a live owner.
    pub fn add_stat(
        &mut self,
        owner: OwnerId,
        id: impl Into<StatId>,
        base_value: f32,
    ) -> Result<StatHandle, StatError> {
        let slot = self
            .owners
            .get_mut(owner)
            .ok_or(StatError::UnknownOwner(owner))?
            .create_stat(id.into(), base_value)?;
        Ok(StatHandle::new(owner, slot))
    }

    /// Look up a stat by name.
    pub fn stat(&self, owner: OwnerId, id: &str) -> Option<StatHandle> {
        let slot = self.owners.get(owner)?.stat(id)?;
        Some(StatHandle::new(owner, slot))
    }

    /// An owner's stats in declaration order. Empty for unknown owners.
    pub fn stats(&self, owner: OwnerId) -> impl Iterator<Item = (&StatId, StatHandle)> + '_ {
        self.owners.get(owner).into_iter().flat_map(move |o| {
            o.iter()
                .map(move |(id, slot)| (id, StatHandle::new(owner, slot)))
        })
    }

    /// Whether `stat` resolves.
    pub fn contains(&self, stat: StatHandle) -> bool {
        self.owners
            .get(stat.owner)
            .is_some_and(|owner| owner.record(stat.slot).is_some())
    }

    /// `(base, final)`, or `None` if the handle is stale.
    pub fn get_value(&self, stat: StatHandle) -> Option<(f32, f32)> {
        let record = self.owners.get(stat.owner)?.record(stat.slot)?;
        Some((record.base_value, record.final_value))
    }

    /// Final value only.
    pub fn value(&self, stat: StatHandle) -> Option<f32> {
        self.get_value(stat).map(|(_, value)| value)
    }

    /// Overwrite the base value and cascade.
    pub fn set_base_value(
        &mut self,
        stat: StatHandle,
        value: f32,
    ) -> Result<CascadeReport, StatError> {
        let owner = self
            .owners
            .get_mut(stat.owner)
            .ok_or(StatError::UnknownOwner(stat.owner))?;
        let mut record = owner.record(stat.slot).ok_or(StatError::InvalidHandle)?;
        record.base_value = value;
        owner.write_record(stat.slot, &record)?;
        Ok(self.cascade(stat))
    }

    /// `set_base_value(stat, base + delta)`.
    pub fn add_base_value(
        &mut self,
        stat: StatHandle,
        delta: f32,
    ) -> Result<CascadeReport, StatError> {
        let record = self.record(stat)?;
        self.set_base_value(stat, record.base_value + delta)
    }

    /// Append a modifier to `stat` and recompute it.
    ///
    /// The new modifier's effect is visible on `stat` immediately; its
    /// observers are reached only if the value actually changed. Every
    /// stat the modifier observes must resolve.
    ///
    /// # Errors
    ///
    /// - `InvalidHandle` / `UnknownOwner` for `stat` or an observed stat
    /// - `Cycle` if the new edge would close a cycle under
    ///   [`CyclePolicy::Reject`]; the graph is left untouched
    /// - `AllocationExhausted` if the arena is capped
    pub fn add_modifier(
        &mut self,
        stat: StatHandle,
        modifier: M,
    ) -> Result<ModifierHandle, StatError> {
        let id = self.attach(stat, &modifier)?;
        self.cascade(stat);
        Ok(ModifierHandle { stat, id })
    }

    /// Append several modifiers with a single cascade at the end.
    ///
    /// All or nothing: if any modifier is rejected, the ones already
    /// attached by this call are removed again and no cascade runs.
    pub fn add_modifiers_batch<I>(
        &mut self,
        stat: StatHandle,
        modifiers: I,
    ) -> Result<Vec<ModifierHandle>, StatError>
    where
        I: IntoIterator<Item = M>,
    {
        let mut ids = Vec::new();
        for modifier in modifiers {
            match self.attach(stat, &modifier) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    self.detach(stat, &ids);
                    return Err(e);
                }
            }
        }
        if !ids.is_empty() {
            self.cascade(stat);
        }
        Ok(ids
            .into_iter()
            .map(|id| ModifierHandle { stat, id })
            .collect())
    }

    /// Remove a modifier by handle, unregister its observer edges, and
    /// recompute. Returns the removed modifier.
    pub fn remove_modifier(&mut self, handle: ModifierHandle) -> Result<M, StatError> {
        self.record(handle.stat)?;
        let (_, modifier) = self
            .detach(handle.stat, &[handle.id])
            .into_iter()
            .next()
            .ok_or(StatError::UnknownModifier(handle))?;
        self.cascade(handle.stat);
        Ok(modifier)
    }

    /// Recompute `stat` and cascade, e.g. after destroying an owner it
    /// read from.
    pub fn recompute(&mut self, stat: StatHandle) -> Result<CascadeReport, StatError> {
        self.record(stat)?;
        Ok(self.cascade(stat))
    }

    /// Modifiers on `stat` in insertion order.
    pub fn modifiers(&self, stat: StatHandle) -> Option<Vec<(ModifierHandle, M)>> {
        let owner = self.owners.get(stat.owner)?;
        let record = owner.record(stat.slot)?;
        Some(
            record::read_modifiers::<M>(owner.arena(), &record)
                .into_iter()
                .map(|(id, m)| (ModifierHandle { stat, id }, m))
                .collect(),
        )
    }

    /// Stats observing `stat`, with the number of modifiers behind each
    /// edge. May include dangling edges not yet pruned.
    pub fn observers(&self, stat: StatHandle) -> Option<Vec<(StatHandle, u32)>> {
        let owner = self.owners.get(stat.owner)?;
        let record = owner.record(stat.slot)?;
        Some(
            record::read_observers(owner.arena(), &record)
                .into_iter()
                .map(|entry| (entry.observer.unpack(), entry.refs))
                .collect(),
        )
    }

    /// Step-by-step breakdown: each modifier with the value the stat would
    /// have if the list stopped after it.
    pub fn breakdown(&self, stat: StatHandle) -> Option<ResolvedStat> {
        let owner = self.owners.get(stat.owner)?;
        let record = owner.record(stat.slot)?;
        let mut resolved = ResolvedStat::new(
            stat,
            owner.stat_id(stat.slot).cloned(),
            record.base_value,
            record.final_value,
        );

        let reader = StatReader::new(&self.owners);
        let mut stack = M::Stack::default();
        stack.reset();
        for (_, modifier) in record::read_modifiers::<M>(owner.arena(), &record) {
            let mut description = modifier.describe();
            if modifier.apply(&mut stack, &reader) == ApplyOutcome::Detached {
                description.push_str(" (detached)");
            }
            resolved.add_modifier(description, stack.apply(record.base_value));
        }
        Some(resolved)
    }

    /// Snapshot of every live observer edge in the graph.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (owner_id, owner) in self.owners.iter() {
            for (_, slot) in owner.iter() {
                let stat = StatHandle::new(owner_id, slot);
                graph.add_node(stat);
                for observer in self.observer_handles(stat) {
                    if self.contains(observer) {
                        graph.add_edge(observer, stat);
                    }
                }
            }
        }
        graph
    }

    /// Compact one owner's data region. Returns bytes released.
    pub fn trim_capacity(&mut self, owner: OwnerId) -> Result<u32, StatError> {
        self.owners
            .get_mut(owner)
            .ok_or(StatError::UnknownOwner(owner))?
            .arena_mut()
            .trim_capacity()
    }

    /// Cascades run since creation.
    pub fn cascade_count(&self) -> u64 {
        self.cascade_count
    }

    /// Report of the most recent cascade.
    pub fn last_cascade(&self) -> Option<&CascadeReport> {
        self.last_cascade.as_ref()
    }

    fn record(&self, stat: StatHandle) -> Result<StatRecord, StatError> {
        self.owners
            .get(stat.owner)
            .ok_or(StatError::UnknownOwner(stat.owner))?
            .record(stat.slot)
            .ok_or(StatError::InvalidHandle)
    }

    /// Store a modifier and register its observer edges, without
    /// recomputing.
    fn attach(&mut self, stat: StatHandle, modifier: &M) -> Result<u32, StatError> {
        self.record(stat)?;
        let observed = modifier.observed();
        for &target in &observed {
            self.record(target)?;
        }
        if self.config.cycle_policy == CyclePolicy::Reject {
            for &target in &observed {
                if target == stat {
                    return Err(StatError::Cycle {
                        path: vec![stat, stat],
                    });
                }
                if let Some(mut path) = self.observer_path(stat, target) {
                    path.push(stat);
                    return Err(StatError::Cycle { path });
                }
            }
        }

        let owner = self
            .owners
            .get_mut(stat.owner)
            .ok_or(StatError::UnknownOwner(stat.owner))?;
        let mut record = owner.record(stat.slot).ok_or(StatError::InvalidHandle)?;
        let id = owner.allocate_modifier_id();
        record::push_modifier(owner.arena_mut(), &mut record, id, modifier)?;
        owner.write_record(stat.slot, &record)?;

        for (i, &target) in observed.iter().enumerate() {
            if let Err(e) = self.add_edge(target, stat) {
                for &done in &observed[..i] {
                    self.release_edge(done, stat);
                }
                self.remove_entries(stat, &[id]);
                return Err(e);
            }
        }
        Ok(id)
    }

    /// Remove modifiers by id and release their edges on stats that
    /// still resolve. Returns what was removed.
    pub(crate) fn detach(&mut self, stat: StatHandle, ids: &[u32]) -> Vec<(u32, M)> {
        let removed = self.remove_entries(stat, ids);
        for (_, modifier) in &removed {
            for target in modifier.observed() {
                self.release_edge(target, stat);
            }
        }
        removed
    }

    fn remove_entries(&mut self, stat: StatHandle, ids: &[u32]) -> Vec<(u32, M)> {
        let Some(owner) = self.owners.get_mut(stat.owner) else {
            return Vec::new();
        };
        let Some(mut record) = owner.record(stat.slot) else {
            return Vec::new();
        };
        let removed = record::remove_modifiers::<M>(owner.arena_mut(), &mut record, ids);
        if removed.is_empty() || owner.write_record(stat.slot, &record).is_err() {
            return Vec::new();
        }
        removed
    }

    fn add_edge(&mut self, observed: StatHandle, observer: StatHandle) -> Result<(), StatError> {
        let owner = self
            .owners
            .get_mut(observed.owner)
            .ok_or(StatError::UnknownOwner(observed.owner))?;
        let mut record = owner.record(observed.slot).ok_or(StatError::InvalidHandle)?;
        record::add_observer(owner.arena_mut(), &mut record, observer)?;
        owner.write_record(observed.slot, &record)
    }

    fn release_edge(&mut self, observed: StatHandle, observer: StatHandle) -> bool {
        let Some(owner) = self.owners.get_mut(observed.owner) else {
            return false;
        };
        let Some(mut record) = owner.record(observed.slot) else {
            return false;
        };
        record::release_observer(owner.arena_mut(), &mut record, observer)
            && owner.write_record(observed.slot, &record).is_ok()
    }
}

impl<M: StatModifier> Default for StatGraph<M> {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}
