//! Deferred stat commands.
//!
//! Structural changes requested while the graph is being read (spawning
//! owners, attaching modifiers from parallel gameplay code) are recorded
//! into a [`StatCommandBuffer`] and applied later, in order, by
//! [`StatCommandBuffer::playback`] with exclusive access to the graph.
//!
//! Owners created by the buffer do not exist until playback, so commands
//! can target them through a [`PendingOwner`] token.

use crate::engine::StatGraph;
use crate::error::StatError;
use crate::handle::{ModifierHandle, OwnerId, StatHandle};
use crate::modifier::{Modifier, StatModifier};
use crate::stat_id::StatId;
use tracing::debug;

/// Placeholder for an owner created by a buffered `create_owner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingOwner(u32);

impl PendingOwner {
    /// Position of the creation command among the buffer's creations.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// An owner that exists now or will exist after playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerRef {
    Live(OwnerId),
    Pending(PendingOwner),
}

impl From<OwnerId> for OwnerRef {
    fn from(id: OwnerId) -> Self {
        OwnerRef::Live(id)
    }
}

impl From<PendingOwner> for OwnerRef {
    fn from(pending: PendingOwner) -> Self {
        OwnerRef::Pending(pending)
    }
}

/// A stat addressed by handle, or by name on a pending owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatRef {
    Live(StatHandle),
    Pending(PendingOwner, StatId),
}

impl From<StatHandle> for StatRef {
    fn from(stat: StatHandle) -> Self {
        StatRef::Live(stat)
    }
}

impl<K: Into<StatId>> From<(PendingOwner, K)> for StatRef {
    fn from((owner, id): (PendingOwner, K)) -> Self {
        StatRef::Pending(owner, id.into())
    }
}

/// One recorded operation.
#[derive(Clone, Debug, PartialEq)]
pub enum StatCommand<M> {
    CreateOwner {
        token: PendingOwner,
        stats: Vec<(StatId, f32)>,
    },
    DestroyOwner(OwnerRef),
    SetBaseValue { stat: StatRef, value: f32 },
    AddBaseValue { stat: StatRef, delta: f32 },
    AddModifier { stat: StatRef, modifier: M },
    AddModifiersBatch { stat: StatRef, modifiers: Vec<M> },
    RemoveModifier(ModifierHandle),
}

/// Outcome of [`StatCommandBuffer::playback`].
///
/// A failed command never aborts the rest of the buffer; its error is
/// recorded here with the command's position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaybackReport {
    /// Created owners, indexed by [`PendingOwner::index`]. `None` where
    /// creation failed.
    pub owners: Vec<Option<OwnerId>>,
    /// Handles of every modifier added, in command order.
    pub modifiers: Vec<ModifierHandle>,
    /// `(command_index, error)` for each failed command.
    pub errors: Vec<(usize, StatError)>,
}

impl PlaybackReport {
    /// The owner a pending token turned into.
    pub fn owner(&self, pending: PendingOwner) -> Option<OwnerId> {
        self.owners.get(pending.0 as usize).copied().flatten()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Ordered queue of deferred stat operations.
///
/// # Examples
///
/// ```rust
/// use statarena::{Modifier, StatCommandBuffer, StatGraph};
///
/// let mut stats: StatGraph = StatGraph::default();
/// let mut commands = StatCommandBuffer::new();
///
/// let goblin = commands.create_owner([("Health", 30.0)]);
/// commands.add_modifier((goblin, "Health"), Modifier::Multiply(0.5));
///
/// let report = commands.playback(&mut stats);
/// assert!(report.is_ok());
///
/// let owner = report.owner(goblin).unwrap();
/// let health = stats.stat(owner, "Health").unwrap();
/// assert_eq!(stats.value(health), Some(45.0));
/// ```
#[derive(Clone, Debug)]
pub struct StatCommandBuffer<M: StatModifier = Modifier> {
    commands: Vec<StatCommand<M>>,
    pending: u32,
}

impl<M: StatModifier> StatCommandBuffer<M> {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            pending: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[StatCommand<M>] {
        &self.commands
    }

    /// Record an owner creation. The returned token names the owner in
    /// later commands of this buffer.
    pub fn create_owner<I, K>(&mut self, stats: I) -> PendingOwner
    where
        I: IntoIterator<Item = (K, f32)>,
        K: Into<StatId>,
    {
        let token = PendingOwner(self.pending);
        self.pending += 1;
        self.commands.push(StatCommand::CreateOwner {
            token,
            stats: stats.into_iter().map(|(id, v)| (id.into(), v)).collect(),
        });
        token
    }

    pub fn destroy_owner(&mut self, owner: impl Into<OwnerRef>) {
        self.commands.push(StatCommand::DestroyOwner(owner.into()));
    }

    pub fn set_base_value(&mut self, stat: impl Into<StatRef>, value: f32) {
        self.commands.push(StatCommand::SetBaseValue {
            stat: stat.into(),
            value,
        });
    }

    pub fn add_base_value(&mut self, stat: impl Into<StatRef>, delta: f32) {
        self.commands.push(StatCommand::AddBaseValue {
            stat: stat.into(),
            delta,
        });
    }

    pub fn add_modifier(&mut self, stat: impl Into<StatRef>, modifier: M) {
        self.commands.push(StatCommand::AddModifier {
            stat: stat.into(),
            modifier,
        });
    }

    /// Recorded as one command; playback cascades once for the batch.
    pub fn add_modifiers_batch(&mut self, stat: impl Into<StatRef>, modifiers: Vec<M>) {
        self.commands.push(StatCommand::AddModifiersBatch {
            stat: stat.into(),
            modifiers,
        });
    }

    pub fn remove_modifier(&mut self, handle: ModifierHandle) {
        self.commands.push(StatCommand::RemoveModifier(handle));
    }

    /// Move every command of `other` to the end of this buffer.
    ///
    /// `other`'s pending tokens are renumbered; tokens it handed out
    /// earlier must be shifted with the returned offset
    /// (`PendingOwner::index() + offset`) to be looked up in the
    /// playback report.
    pub fn append(&mut self, other: StatCommandBuffer<M>) -> u32 {
        let offset = self.pending;
        let shift = |token: PendingOwner| PendingOwner(token.0 + offset);
        let shift_owner = |owner: OwnerRef| match owner {
            OwnerRef::Pending(token) => OwnerRef::Pending(shift(token)),
            live => live,
        };
        let shift_stat = |stat: StatRef| match stat {
            StatRef::Pending(token, id) => StatRef::Pending(shift(token), id),
            live => live,
        };

        self.commands
            .extend(other.commands.into_iter().map(|command| match command {
                StatCommand::CreateOwner { token, stats } => StatCommand::CreateOwner {
                    token: shift(token),
                    stats,
                },
                StatCommand::DestroyOwner(owner) => StatCommand::DestroyOwner(shift_owner(owner)),
                StatCommand::SetBaseValue { stat, value } => StatCommand::SetBaseValue {
                    stat: shift_stat(stat),
                    value,
                },
                StatCommand::AddBaseValue { stat, delta } => StatCommand::AddBaseValue {
                    stat: shift_stat(stat),
                    delta,
                },
                StatCommand::AddModifier { stat, modifier } => StatCommand::AddModifier {
                    stat: shift_stat(stat),
                    modifier,
                },
                StatCommand::AddModifiersBatch { stat, modifiers } => {
                    StatCommand::AddModifiersBatch {
                        stat: shift_stat(stat),
                        modifiers,
                    }
                }
                StatCommand::RemoveModifier(handle) => StatCommand::RemoveModifier(handle),
            }));
        self.pending += other.pending;
        offset
    }

    /// Apply every command in order.
    pub fn playback(self, graph: &mut StatGraph<M>) -> PlaybackReport {
        let mut report = PlaybackReport {
            owners: vec![None; self.pending as usize],
            ..PlaybackReport::default()
        };
        let total = self.commands.len();

        for (index, command) in self.commands.into_iter().enumerate() {
            if let Err(e) = apply(graph, command, &mut report) {
                report.errors.push((index, e));
            }
        }

        debug!(
            commands = total,
            owners = report.owners.iter().flatten().count(),
            failed = report.errors.len(),
            "command buffer played back"
        );
        report
    }
}

impl<M: StatModifier> Default for StatCommandBuffer<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_owner(owner: OwnerRef, report: &PlaybackReport) -> Result<OwnerId, StatError> {
    match owner {
        OwnerRef::Live(id) => Ok(id),
        OwnerRef::Pending(token) => report.owner(token).ok_or(StatError::InvalidHandle),
    }
}

fn resolve_stat<M: StatModifier>(
    graph: &StatGraph<M>,
    stat: StatRef,
    report: &PlaybackReport,
) -> Result<StatHandle, StatError> {
    match stat {
        StatRef::Live(handle) => Ok(handle),
        StatRef::Pending(token, id) => {
            let owner = resolve_owner(OwnerRef::Pending(token), report)?;
            graph
                .stat(owner, id.as_str())
                .ok_or(StatError::UnknownStat(id))
        }
    }
}

fn apply<M: StatModifier>(
    graph: &mut StatGraph<M>,
    command: StatCommand<M>,
    report: &mut PlaybackReport,
) -> Result<(), StatError> {
    match command {
        StatCommand::CreateOwner { token, stats } => {
            let id = graph.create_owner(stats)?;
            report.owners[token.0 as usize] = Some(id);
        }
        StatCommand::DestroyOwner(owner) => {
            graph.destroy_owner(resolve_owner(owner, report)?)?;
        }
        StatCommand::SetBaseValue { stat, value } => {
            let stat = resolve_stat(graph, stat, report)?;
            graph.set_base_value(stat, value)?;
        }
        StatCommand::AddBaseValue { stat, delta } => {
            let stat = resolve_stat(graph, stat, report)?;
            graph.add_base_value(stat, delta)?;
        }
        StatCommand::AddModifier { stat, modifier } => {
            let stat = resolve_stat(graph, stat, report)?;
            let handle = graph.add_modifier(stat, modifier)?;
            report.modifiers.push(handle);
        }
        StatCommand::AddModifiersBatch { stat, modifiers } => {
            let stat = resolve_stat(graph, stat, report)?;
            let handles = graph.add_modifiers_batch(stat, modifiers)?;
            report.modifiers.extend(handles);
        }
        StatCommand::RemoveModifier(handle) => {
            graph.remove_modifier(handle)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_in_order() {
        let mut graph: StatGraph = StatGraph::default();
        let mut buffer = StatCommandBuffer::new();
        let a = buffer.create_owner([("Power", 1.0)]);
        buffer.set_base_value((a, "Power"), 4.0);
        buffer.add_base_value((a, "Power"), 1.0);

        let report = buffer.playback(&mut graph);
        assert!(report.is_ok());
        let owner = report.owner(a).unwrap();
        let power = graph.stat(owner, "Power").unwrap();
        assert_eq!(graph.get_value(power), Some((5.0, 5.0)));
    }

    #[test]
    fn test_failures_do_not_abort() {
        let mut graph: StatGraph = StatGraph::default();
        let mut buffer = StatCommandBuffer::new();
        let dup = buffer.create_owner([("X", 1.0), ("X", 2.0)]);
        buffer.set_base_value((dup, "X"), 3.0);
        let ok = buffer.create_owner([("Y", 1.0)]);
        buffer.set_base_value((ok, "Missing"), 3.0);
        buffer.set_base_value((ok, "Y"), 9.0);

        let report = buffer.playback(&mut graph);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.errors[0].0, 0);
        assert_eq!(report.errors[1], (1, StatError::InvalidHandle));
        assert_eq!(report.errors[2], (3, StatError::UnknownStat("Missing".into())));
        assert_eq!(report.owner(dup), None);

        let y = graph.stat(report.owner(ok).unwrap(), "Y").unwrap();
        assert_eq!(graph.value(y), Some(9.0));
    }

    #[test]
    fn test_append_renumbers_tokens() {
        let mut graph: StatGraph = StatGraph::default();
        let mut first = StatCommandBuffer::new();
        first.create_owner([("A", 1.0)]);

        let mut second = StatCommandBuffer::new();
        let b = second.create_owner([("B", 2.0)]);
        second.add_modifier((b, "B"), Modifier::Add(1.0));

        let offset = first.append(second);
        assert_eq!(offset, 1);
        assert_eq!(first.len(), 3);
        assert!(matches!(
            &first.commands()[2],
            StatCommand::AddModifier {
                stat: StatRef::Pending(token, _),
                ..
            } if token.index() == 1
        ));

        let report = first.playback(&mut graph);
        assert!(report.is_ok());
        let owner = report.owner(PendingOwner(b.index() + offset)).unwrap();
        let stat = graph.stat(owner, "B").unwrap();
        assert_eq!(graph.value(stat), Some(3.0));
        assert_eq!(report.modifiers.len(), 1);
    }

    #[test]
    fn test_destroy_pending_owner() {
        let mut graph: StatGraph = StatGraph::default();
        let mut buffer = StatCommandBuffer::new();
        let temp = buffer.create_owner([("T", 1.0)]);
        buffer.destroy_owner(temp);

        let report = buffer.playback(&mut graph);
        assert!(report.is_ok());
        assert_eq!(graph.owner_count(), 0);
    }
}
