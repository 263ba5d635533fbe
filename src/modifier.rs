//! Modifiers and the modifier stack protocol.
//!
//! A stat's final value is computed by folding its modifiers, in insertion
//! order, into a [`ModifierStack`] and then applying the stack once to the
//! base value. The graph is generic over the modifier type through
//! [`StatModifier`], which is the application's apply-callback seam; the
//! built-in [`Modifier`] enum with [`StandardStack`] covers the common
//! arithmetic kinds.

use crate::handle::{PackedStatHandle, StatHandle};
use crate::owner::OwnerTable;
use bytemuck::{Pod, Zeroable};
use smallvec::{smallvec, SmallVec};

/// Result of applying one modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The contribution was folded into the stack.
    Applied,
    /// A stat the modifier observes no longer resolves. The modifier
    /// contributed nothing and is removed once the cascade completes.
    Detached,
}

/// Accumulator that modifiers contribute to.
pub trait ModifierStack: Default {
    /// Return to the neutral state.
    fn reset(&mut self);

    /// Combine the accumulated contributions with `base`.
    fn apply(&self, base: f32) -> f32;
}

/// A modifier type the graph can store and evaluate.
///
/// Modifiers are stored in arena bytes in their [`Packed`](Self::Packed)
/// form, so `pack` / `unpack` must round-trip.
pub trait StatModifier: Copy + Send + Sync + 'static {
    /// Fixed-size arena representation.
    type Packed: Pod;

    /// The accumulator this modifier contributes to.
    type Stack: ModifierStack;

    fn pack(&self) -> Self::Packed;

    /// Decode; `None` for bytes that do not describe a modifier.
    fn unpack(packed: Self::Packed) -> Option<Self>;

    /// Stats whose values this modifier reads. Each one gets an observer
    /// edge back to the modified stat.
    fn observed(&self) -> SmallVec<[StatHandle; 2]>;

    /// Fold this modifier into `stack`.
    ///
    /// `stats` is read-only: the graph is mid-recompute.
    fn apply(&self, stack: &mut Self::Stack, stats: &StatReader<'_>) -> ApplyOutcome;

    /// Human-readable form used in breakdowns.
    fn describe(&self) -> String;
}

/// Read-only view of stat values handed to [`StatModifier::apply`].
#[derive(Clone, Copy)]
pub struct StatReader<'a> {
    owners: &'a OwnerTable,
}

impl<'a> StatReader<'a> {
    pub(crate) fn new(owners: &'a OwnerTable) -> Self {
        Self { owners }
    }

    /// Final value of `stat`, or `None` if it no longer resolves.
    pub fn try_get_value(&self, stat: StatHandle) -> Option<f32> {
        self.owners
            .get(stat.owner)?
            .record(stat.slot)
            .map(|record| record.final_value)
    }
}

/// The built-in modifier kinds.
///
/// # Examples
///
/// ```rust
/// use statarena::{Modifier, StatGraph};
///
/// let mut graph: StatGraph = StatGraph::default();
/// let hero = graph.create_owner([("Strength", 10.0)]).unwrap();
/// let strength = graph.stat(hero, "Strength").unwrap();
///
/// graph.add_modifier(strength, Modifier::Multiply(1.0)).unwrap();
/// graph.add_modifier(strength, Modifier::Add(5.0)).unwrap();
///
/// // (10 + 5) * (1 + 1)
/// assert_eq!(graph.value(strength), Some(30.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Modifier {
    /// Flat addition.
    Add(f32),
    /// Adds to the multiplier, which starts at 1. `Multiply(0.5)` is +50%.
    Multiply(f32),
    /// Replace the base value. Competing sets resolve to the smallest.
    Set(f32),
    /// Bound the final value. Competing clamps intersect.
    Clamp { min: f32, max: f32 },
    /// Add `factor` times another stat's final value.
    AddFromStat { stat: StatHandle, factor: f32 },
    /// Add `factor` times another stat's final value to the multiplier.
    MultiplyFromStat { stat: StatHandle, factor: f32 },
    /// Add `factor * lhs * rhs`.
    AddProduct {
        lhs: StatHandle,
        rhs: StatHandle,
        factor: f32,
    },
}

/// Arena form of [`Modifier`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PackedModifier {
    pub kind: u32,
    pub a: f32,
    pub b: f32,
    pub stats: [PackedStatHandle; 2],
}

const KIND_ADD: u32 = 1;
const KIND_MULTIPLY: u32 = 2;
const KIND_SET: u32 = 3;
const KIND_CLAMP: u32 = 4;
const KIND_ADD_FROM_STAT: u32 = 5;
const KIND_MULTIPLY_FROM_STAT: u32 = 6;
const KIND_ADD_PRODUCT: u32 = 7;

impl StatModifier for Modifier {
    type Packed = PackedModifier;
    type Stack = StandardStack;

    fn pack(&self) -> PackedModifier {
        let none = PackedStatHandle::default();
        let (kind, a, b, stats) = match *self {
            Modifier::Add(v) => (KIND_ADD, v, 0.0, [none; 2]),
            Modifier::Multiply(v) => (KIND_MULTIPLY, v, 0.0, [none; 2]),
            Modifier::Set(v) => (KIND_SET, v, 0.0, [none; 2]),
            Modifier::Clamp { min, max } => (KIND_CLAMP, min, max, [none; 2]),
            Modifier::AddFromStat { stat, factor } => {
                (KIND_ADD_FROM_STAT, factor, 0.0, [stat.pack(), none])
            }
            Modifier::MultiplyFromStat { stat, factor } => {
                (KIND_MULTIPLY_FROM_STAT, factor, 0.0, [stat.pack(), none])
            }
            Modifier::AddProduct { lhs, rhs, factor } => {
                (KIND_ADD_PRODUCT, factor, 0.0, [lhs.pack(), rhs.pack()])
            }
        };
        PackedModifier { kind, a, b, stats }
    }

    fn unpack(packed: PackedModifier) -> Option<Self> {
        let [first, second] = packed.stats.map(PackedStatHandle::unpack);
        Some(match packed.kind {
            KIND_ADD => Modifier::Add(packed.a),
            KIND_MULTIPLY => Modifier::Multiply(packed.a),
            KIND_SET => Modifier::Set(packed.a),
            KIND_CLAMP => Modifier::Clamp {
                min: packed.a,
                max: packed.b,
            },
            KIND_ADD_FROM_STAT => Modifier::AddFromStat {
                stat: first,
                factor: packed.a,
            },
            KIND_MULTIPLY_FROM_STAT => Modifier::MultiplyFromStat {
                stat: first,
                factor: packed.a,
            },
            KIND_ADD_PRODUCT => Modifier::AddProduct {
                lhs: first,
                rhs: second,
                factor: packed.a,
            },
            _ => return None,
        })
    }

    fn observed(&self) -> SmallVec<[StatHandle; 2]> {
        match *self {
            Modifier::AddFromStat { stat, .. } | Modifier::MultiplyFromStat { stat, .. } => {
                smallvec![stat]
            }
            Modifier::AddProduct { lhs, rhs, .. } => smallvec![lhs, rhs],
            _ => SmallVec::new(),
        }
    }

    fn apply(&self, stack: &mut StandardStack, stats: &StatReader<'_>) -> ApplyOutcome {
        match *self {
            Modifier::Add(v) => stack.add += v,
            Modifier::Multiply(v) => stack.multiply += v,
            Modifier::Set(v) => stack.push_set(v),
            Modifier::Clamp { min, max } => stack.push_clamp(min, max),
            Modifier::AddFromStat { stat, factor } => match stats.try_get_value(stat) {
                Some(v) => stack.add += v * factor,
                None => return ApplyOutcome::Detached,
            },
            Modifier::MultiplyFromStat { stat, factor } => match stats.try_get_value(stat) {
                Some(v) => stack.multiply += v * factor,
                None => return ApplyOutcome::Detached,
            },
            Modifier::AddProduct { lhs, rhs, factor } => {
                match (stats.try_get_value(lhs), stats.try_get_value(rhs)) {
                    (Some(l), Some(r)) => stack.add += l * r * factor,
                    _ => return ApplyOutcome::Detached,
                }
            }
        }
        ApplyOutcome::Applied
    }

    fn describe(&self) -> String {
        match self {
            Modifier::Add(v) => format!("Add({v:+})"),
            Modifier::Multiply(v) => format!("Multiply({:+}%)", v * 100.0),
            Modifier::Set(v) => format!("Set({v})"),
            Modifier::Clamp { min, max } => format!("Clamp({min}..={max})"),
            Modifier::AddFromStat { stat, factor } => format!("AddFromStat({stat} x{factor})"),
            Modifier::MultiplyFromStat { stat, factor } => {
                format!("MultiplyFromStat({stat} x{factor})")
            }
            Modifier::AddProduct { lhs, rhs, factor } => {
                format!("AddProduct({lhs} * {rhs} x{factor})")
            }
        }
    }
}

/// Accumulator for [`Modifier`].
///
/// Applied as `set.unwrap_or(base)`, then `+ add`, then `* multiply`,
/// then clamped. Every field combines commutatively, so insertion order
/// never changes the result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandardStack {
    pub add: f32,
    pub multiply: f32,
    pub set: Option<f32>,
    pub min: f32,
    pub max: f32,
}

impl StandardStack {
    /// Competing sets keep the smallest value.
    pub fn push_set(&mut self, value: f32) {
        self.set = Some(match self.set {
            Some(current) => current.min(value),
            None => value,
        });
    }

    /// Competing clamps intersect.
    pub fn push_clamp(&mut self, min: f32, max: f32) {
        self.min = self.min.max(min);
        self.max = self.max.min(max);
    }
}

impl Default for StandardStack {
    fn default() -> Self {
        Self {
            add: 0.0,
            multiply: 1.0,
            set: None,
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
        }
    }
}

impl ModifierStack for StandardStack {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn apply(&self, base: f32) -> f32 {
        let value = (self.set.unwrap_or(base) + self.add) * self.multiply;
        // Not `f32::clamp`: an empty intersection (min > max) must not
        // panic; the upper bound wins.
        value.max(self.min).min(self.max)
    }
}
