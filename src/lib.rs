//! # statarena - Arena-backed stat engine with dependency propagation
//!
//! A numeric attribute ("stat") engine for games and simulations:
//! - **Arena storage**: each owner's stats, modifier lists and observer
//!   lists live in one flat byte buffer, addressed by versioned handles
//! - **Composable modifiers**: order-independent stacking (add, multiply,
//!   set, clamp) plus modifiers that read other stats
//! - **Dependency propagation**: changing a stat updates everything that
//!   depends on it, once per stat, before the call returns
//! - **Safe detachment**: destroyed owners never leave dangling reads
//!
//! ## Core Concepts
//!
//! ```text
//! [Arena] → [StatRecord + modifier list + observer list] → [StatGraph cascade]
//! ```
//!
//! 1. An **owner** (an entity) holds a private [`Arena`]
//! 2. A **stat** is a record in that arena: base value, final value, lists
//! 3. A **modifier** folds into a [`ModifierStack`]; the stack turns the
//!    base value into the final value
//! 4. A modifier that reads another stat registers an **observer edge** on
//!    it; changes cascade along those edges
//!
//! ## Example
//!
//! ```rust
//! use statarena::*;
//!
//! let mut stats: StatGraph = StatGraph::default();
//! let hero = stats
//!     .create_owner([("Strength", 10.0), ("Attack", 0.0)])
//!     .unwrap();
//! let strength = stats.stat(hero, "Strength").unwrap();
//! let attack = stats.stat(hero, "Attack").unwrap();
//!
//! stats.add_modifier(strength, Modifier::Add(5.0)).unwrap();
//! stats.add_modifier(strength, Modifier::Multiply(1.0)).unwrap();
//! stats
//!     .add_modifier(attack, Modifier::AddFromStat { stat: strength, factor: 1.0 })
//!     .unwrap();
//!
//! assert_eq!(stats.value(strength), Some(30.0)); // (10 + 5) * 2
//! assert_eq!(stats.value(attack), Some(30.0));
//!
//! stats.set_base_value(strength, 20.0).unwrap();
//! assert_eq!(stats.value(attack), Some(50.0));
//! ```
//!
//! ## Modules
//!
//! - [`arena`] - Byte-buffer heap with versioned handles
//! - [`ranges`] - Free-range lists
//! - [`handle`] - Handle and id types
//! - [`record`] - Arena-resident record layouts
//! - [`owner`] - Stats owners
//! - [`modifier`] - Modifier trait, stack protocol, built-in modifiers
//! - [`engine`] - The stat graph
//! - [`cascade`] - Recompute propagation
//! - [`graph`] - Dependency graph analysis
//! - [`command`] - Deferred command buffers
//! - [`resolved`] - Stat breakdowns
//! - [`config`] - Configuration
//! - [`stat_id`] - Stat names
//! - [`error`] - Error types

pub mod arena;
pub mod cascade;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod handle;
pub mod modifier;
pub mod owner;
pub mod ranges;
pub mod record;
pub mod resolved;
pub mod stat_id;

pub use arena::{Allocation, Arena, ArenaStats, LAYOUT_VERSION};
pub use cascade::CascadeReport;
pub use command::{OwnerRef, PendingOwner, PlaybackReport, StatCommand, StatCommandBuffer, StatRef};
pub use config::{ArenaConfig, CyclePolicy, GraphConfig};
pub use engine::StatGraph;
pub use error::StatError;
pub use graph::DependencyGraph;
pub use handle::{Handle, ModifierHandle, OwnerId, PackedStatHandle, RawHandle, StatHandle};
pub use modifier::{
    ApplyOutcome, Modifier, ModifierStack, PackedModifier, StandardStack, StatModifier, StatReader,
};
pub use owner::StatsOwner;
pub use record::{ObserverEntry, StatRecord};
pub use resolved::ResolvedStat;
pub use stat_id::StatId;
