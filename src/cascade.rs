//! Recompute cascade.
//!
//! One cascade, triggered by a mutation of a root stat:
//!
//! 1. Recompute the root: reset a fresh stack, apply the modifiers in
//!    insertion order, apply the stack to the base value and write the
//!    final value. Modifiers whose observed stat is gone are flagged.
//! 2. If the root's value changed (or `skip_unchanged` is off), walk the
//!    observer lists breadth-first to collect the downstream subgraph,
//!    pruning edges to stats that no longer resolve.
//! 3. Visit the subgraph's strongly-connected components in topological
//!    order and recompute a stat only if something it reads changed during
//!    this cascade. Every stat is evaluated at most once, so diamonds cost
//!    one recompute per stat and cycles terminate.
//! 4. Remove the flagged modifiers, compacting their lists.

use crate::engine::StatGraph;
use crate::graph::DependencyGraph;
use crate::handle::StatHandle;
use crate::modifier::{ApplyOutcome, ModifierStack, StatModifier, StatReader};
use crate::record;
use crate::StatError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// What one cascade did.
///
/// # Examples
///
/// ```rust
/// use statarena::{Modifier, StatGraph};
///
/// let mut stats: StatGraph = StatGraph::default();
/// let hero = stats.create_owner([("Strength", 10.0), ("Attack", 0.0)]).unwrap();
/// let strength = stats.stat(hero, "Strength").unwrap();
/// let attack = stats.stat(hero, "Attack").unwrap();
/// stats
///     .add_modifier(attack, Modifier::AddFromStat { stat: strength, factor: 1.0 })
///     .unwrap();
///
/// let report = stats.set_base_value(strength, 12.0).unwrap();
/// assert_eq!(report.recomputed, 2);
/// assert_eq!(report.changed, 2);
/// assert!(report.check().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Stats whose value was recomputed, root included.
    pub recomputed: usize,
    /// Stats whose final value changed.
    pub changed: usize,
    /// Dangling observer edges removed.
    pub pruned_edges: usize,
    /// Modifiers removed because an observed stat no longer resolves.
    pub detached_modifiers: usize,
    /// The downstream subgraph contained a cycle.
    pub cyclic: bool,
    /// The cascade stopped at the budget; some downstream stats are stale.
    pub truncated: bool,
    /// The budget in force.
    pub limit: Option<usize>,
}

impl CascadeReport {
    /// `Err(CycleBudgetExceeded)` if the cascade was truncated.
    pub fn check(&self) -> Result<(), StatError> {
        if self.truncated {
            return Err(StatError::CycleBudgetExceeded {
                limit: self.limit.unwrap_or(0),
            });
        }
        Ok(())
    }
}

impl<M: StatModifier> StatGraph<M> {
    /// Recompute `root` and everything downstream of it.
    pub(crate) fn cascade(&mut self, root: StatHandle) -> CascadeReport {
        self.cascade_count += 1;
        let skip_unchanged = self.config.skip_unchanged;
        let mut report = CascadeReport {
            limit: self.config.cascade_budget,
            ..CascadeReport::default()
        };
        let mut detached = Vec::new();

        if let Some(root_changed) = self.recompute_one(root, &mut detached) {
            report.recomputed += 1;
            if root_changed {
                report.changed += 1;
            }
            if root_changed || !skip_unchanged {
                self.propagate(root, &mut report, &mut detached);
            }
        }

        if !detached.is_empty() {
            report.detached_modifiers = self.drop_detached(&detached);
        }

        debug!(
            root = %root,
            recomputed = report.recomputed,
            changed = report.changed,
            pruned = report.pruned_edges,
            detached = report.detached_modifiers,
            "cascade complete"
        );
        self.last_cascade = Some(report.clone());
        report
    }

    fn propagate(
        &mut self,
        root: StatHandle,
        report: &mut CascadeReport,
        detached: &mut Vec<(StatHandle, u32)>,
    ) {
        let skip_unchanged = self.config.skip_unchanged;
        let graph = self.collect_downstream(root, report);
        let mut dirty = HashSet::from([root]);

        for component in graph.propagation_order() {
            let cyclic = component.len() > 1
                || component.first().is_some_and(|&s| graph.has_self_loop(s));
            if cyclic {
                report.cyclic = true;
                warn!(
                    stats = component.len(),
                    "cascade entered a dependency cycle, evaluating each stat once"
                );
            }

            for stat in component {
                if stat == root {
                    continue;
                }
                if skip_unchanged
                    && !graph
                        .observed_by(stat)
                        .iter()
                        .any(|upstream| dirty.contains(upstream))
                {
                    continue;
                }
                if let Some(changed) = self.recompute_one(stat, detached) {
                    report.recomputed += 1;
                    if changed {
                        report.changed += 1;
                        dirty.insert(stat);
                    }
                }
            }
        }
    }

    /// Breadth-first walk over observer lists, bounded by the cascade
    /// budget.
    fn collect_downstream(
        &mut self,
        root: StatHandle,
        report: &mut CascadeReport,
    ) -> DependencyGraph {
        let budget = self.config.cascade_budget.unwrap_or(usize::MAX);
        let mut graph = DependencyGraph::new();
        graph.add_node(root);
        let mut queue = VecDeque::from([root]);

        while let Some(stat) = queue.pop_front() {
            for observer in self.live_observers(stat, report) {
                if !graph.contains_node(observer) {
                    if graph.node_count() - 1 >= budget {
                        report.truncated = true;
                        continue;
                    }
                    queue.push_back(observer);
                }
                graph.add_edge(observer, stat);
            }
        }

        if report.truncated {
            warn!(budget, root = %root, "cascade budget exceeded, downstream stats left stale");
        }
        graph
    }

    /// Observers of `stat` that still resolve. Edges to stats that do not
    /// are removed from the list.
    fn live_observers(&mut self, stat: StatHandle, report: &mut CascadeReport) -> Vec<StatHandle> {
        let Some(owner) = self.owners.get(stat.owner) else {
            return Vec::new();
        };
        let Some(mut record) = owner.record(stat.slot) else {
            return Vec::new();
        };
        let (live, dead): (Vec<StatHandle>, Vec<StatHandle>) =
            record::read_observers(owner.arena(), &record)
                .into_iter()
                .map(|entry| entry.observer.unpack())
                .partition(|&observer| self.contains(observer));

        if !dead.is_empty() {
            if let Some(owner) = self.owners.get_mut(stat.owner) {
                let pruned = record::retain_observers(owner.arena_mut(), &mut record, |h| {
                    !dead.contains(&h)
                });
                if owner.write_record(stat.slot, &record).is_ok() {
                    report.pruned_edges += pruned;
                    warn!(stat = %stat, pruned, "pruned dangling observer edges");
                }
            }
        }
        live
    }

    /// Recompute one stat in place. `Some(changed)`, or `None` if the stat
    /// no longer resolves.
    fn recompute_one(
        &mut self,
        stat: StatHandle,
        detached: &mut Vec<(StatHandle, u32)>,
    ) -> Option<bool> {
        let owner = self.owners.get(stat.owner)?;
        let mut record = owner.record(stat.slot)?;
        let modifiers = record::read_modifiers::<M>(owner.arena(), &record);

        let reader = StatReader::new(&self.owners);
        let mut stack = M::Stack::default();
        stack.reset();
        for (id, modifier) in &modifiers {
            if modifier.apply(&mut stack, &reader) == ApplyOutcome::Detached {
                detached.push((stat, *id));
            }
        }
        let value = stack.apply(record.base_value);

        let changed = value.to_bits() != record.final_value.to_bits();
        if changed {
            record.final_value = value;
            self.owners
                .get_mut(stat.owner)?
                .write_record(stat.slot, &record)
                .ok()?;
        }
        trace!(stat = %stat, value, changed, "recomputed");
        Some(changed)
    }

    fn drop_detached(&mut self, detached: &[(StatHandle, u32)]) -> usize {
        let mut by_stat: HashMap<StatHandle, Vec<u32>> = HashMap::new();
        for &(stat, id) in detached {
            by_stat.entry(stat).or_default().push(id);
        }
        let mut removed = 0;
        for (stat, ids) in by_stat {
            let count = self.detach(stat, &ids).len();
            if count > 0 {
                warn!(stat = %stat, count, "removed modifiers whose observed stat is gone");
            }
            removed += count;
        }
        removed
    }

    /// Shortest observer path `from -> ... -> to`, if `to` is downstream
    /// of `from`.
    pub(crate) fn observer_path(
        &self,
        from: StatHandle,
        to: StatHandle,
    ) -> Option<Vec<StatHandle>> {
        let mut parents: HashMap<StatHandle, StatHandle> = HashMap::new();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(stat) = queue.pop_front() {
            for next in self.observer_handles(stat) {
                if !seen.insert(next) {
                    continue;
                }
                parents.insert(next, stat);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&parent) = parents.get(&cursor) {
                        path.push(parent);
                        cursor = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    pub(crate) fn observer_handles(&self, stat: StatHandle) -> Vec<StatHandle> {
        self.owners
            .get(stat.owner)
            .and_then(|owner| {
                let record = owner.record(stat.slot)?;
                Some(
                    record::read_observers(owner.arena(), &record)
                        .into_iter()
                        .map(|entry| entry.observer.unpack())
                        .collect(),
                )
            })
            .unwrap_or_default()
    }
}
