//! Arena and graph configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a single owner's arena.
///
/// Growth is geometric: when no free range fits, the data region grows to
/// `max(len * growth_factor, len + requested)`. Caps are off by default;
/// with a cap set, growth past it fails with `AllocationExhausted`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Metadata slots reserved up front (including the two reserved for
    /// the free-range lists).
    pub initial_slots: u32,

    /// Bytes reserved for the data region up front.
    pub initial_data_bytes: u32,

    /// Multiplier applied when either region has to grow. Values below
    /// `1.0` are treated as `2.0`.
    pub growth_factor: f32,

    /// Upper bound on metadata slots.
    pub max_slots: Option<u32>,

    /// Upper bound on data region bytes.
    pub max_data_bytes: Option<u32>,
}

impl ArenaConfig {
    /// Default slot count: room for a handful of stats and their lists.
    pub const DEFAULT_INITIAL_SLOTS: u32 = 32;

    /// Default data region size.
    pub const DEFAULT_INITIAL_DATA_BYTES: u32 = 1024;

    /// Default growth factor.
    pub const DEFAULT_GROWTH_FACTOR: f32 = 2.0;

    /// Arena config sized for `stats` stat records.
    pub fn for_stats(stats: u32) -> Self {
        Self {
            initial_slots: (stats * 3 + 2).max(Self::DEFAULT_INITIAL_SLOTS),
            ..Self::default()
        }
    }

    pub(crate) fn effective_growth(&self) -> f32 {
        if self.growth_factor.is_finite() && self.growth_factor > 1.0 {
            self.growth_factor
        } else {
            Self::DEFAULT_GROWTH_FACTOR
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_slots: Self::DEFAULT_INITIAL_SLOTS,
            initial_data_bytes: Self::DEFAULT_INITIAL_DATA_BYTES,
            growth_factor: Self::DEFAULT_GROWTH_FACTOR,
            max_slots: None,
            max_data_bytes: None,
        }
    }
}

/// What `add_modifier` does when a new observer edge would close a cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePolicy {
    /// Refuse the modifier with `StatError::Cycle`.
    #[default]
    Reject,
    /// Accept it. Cascades evaluate each stat of a cycle once per
    /// propagation and log a warning.
    Allow,
}

/// Configuration for a `StatGraph`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Config used for every owner arena.
    pub arena: ArenaConfig,

    /// Cycle handling on `add_modifier`.
    pub cycle_policy: CyclePolicy,

    /// Maximum number of downstream stats one cascade may visit.
    /// `None` is unbounded.
    pub cascade_budget: Option<usize>,

    /// Stop propagating past stats whose final value did not change.
    pub skip_unchanged: bool,
}

impl GraphConfig {
    /// Default cascade budget.
    pub const DEFAULT_CASCADE_BUDGET: usize = 65_536;
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            cycle_policy: CyclePolicy::Reject,
            cascade_budget: Some(Self::DEFAULT_CASCADE_BUDGET),
            skip_unchanged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_factor_sanitized() {
        let mut config = ArenaConfig::default();
        config.growth_factor = 0.5;
        assert_eq!(config.effective_growth(), 2.0);
        config.growth_factor = f32::NAN;
        assert_eq!(config.effective_growth(), 2.0);
        config.growth_factor = 1.5;
        assert_eq!(config.effective_growth(), 1.5);
    }

    #[test]
    fn test_for_stats_reserves_slots() {
        assert_eq!(ArenaConfig::for_stats(1).initial_slots, 32);
        assert_eq!(ArenaConfig::for_stats(100).initial_slots, 302);
    }

    #[test]
    fn test_graph_config_json_round_trip() {
        let config = GraphConfig {
            cycle_policy: CyclePolicy::Allow,
            cascade_budget: None,
            ..GraphConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: GraphConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GraphConfig = serde_json::from_str(r#"{"skip_unchanged": false}"#).unwrap();
        assert!(!config.skip_unchanged);
        assert_eq!(config.cycle_policy, CyclePolicy::Reject);
        assert_eq!(config.arena, ArenaConfig::default());
    }
}
