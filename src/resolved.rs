//! Stat breakdowns.
//!
//! Contains the `ResolvedStat` type, a read-only snapshot of one stat
//! with a step-by-step breakdown of its modifiers, for debugging and
//! tooltips.

use crate::handle::StatHandle;
use crate::stat_id::StatId;
use serde::{Deserialize, Serialize};

/// A stat's value with its modifier breakdown.
///
/// Plain data: serializable and detached from the graph it came from.
///
/// # Examples
///
/// ```rust
/// use statarena::{Modifier, StatGraph};
///
/// let mut stats: StatGraph = StatGraph::default();
/// let hero = stats.create_owner([("Armor", 20.0)]).unwrap();
/// let armor = stats.stat(hero, "Armor").unwrap();
/// stats.add_modifier(armor, Modifier::Add(10.0)).unwrap();
/// stats.add_modifier(armor, Modifier::Multiply(0.5)).unwrap();
///
/// let resolved = stats.breakdown(armor).unwrap();
/// assert_eq!(resolved.base, 20.0);
/// assert_eq!(resolved.value, 45.0);
/// assert_eq!(resolved.modifiers.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedStat {
    /// The stat.
    pub stat: StatHandle,

    /// The name it was declared under.
    pub stat_id: Option<StatId>,

    /// Base value.
    pub base: f32,

    /// Stored final value.
    pub value: f32,

    /// Each entry is `(modifier_description, value_after_modifier)`, in
    /// insertion order. The value is what the stat would be if the list
    /// ended at that modifier.
    pub modifiers: Vec<(String, f32)>,
}

impl ResolvedStat {
    /// Create a breakdown with no modifier entries.
    pub fn new(stat: StatHandle, stat_id: Option<StatId>, base: f32, value: f32) -> Self {
        Self {
            stat,
            stat_id,
            base,
            value,
            modifiers: Vec::new(),
        }
    }

    /// Append a modifier step.
    pub fn add_modifier(&mut self, description: impl Into<String>, value: f32) {
        self.modifiers.push((description.into(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Handle, OwnerId, RawHandle};

    fn stat() -> StatHandle {
        StatHandle::new(OwnerId::new(0, 1), Handle::from_raw(RawHandle::new(2, 1)))
    }

    #[test]
    fn test_resolved_stat_breakdown() {
        let mut resolved = ResolvedStat::new(stat(), Some("Armor".into()), 20.0, 45.0);
        resolved.add_modifier("Add(+10)", 30.0);
        resolved.add_modifier("Multiply(+50%)", 45.0);
        assert_eq!(resolved.modifiers.len(), 2);
        assert_eq!(resolved.modifiers[1].1, resolved.value);
    }

    #[test]
    fn test_resolved_stat_json() {
        let mut resolved = ResolvedStat::new(stat(), Some("Armor".into()), 20.0, 30.0);
        resolved.add_modifier("Add(+10)", 30.0);
        let json = serde_json::to_string(&resolved).unwrap();
        assert!(json.contains("\"stat_id\":\"Armor\""));
        let back: ResolvedStat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resolved);
    }
}
