use proptest::prelude::*;
use smallvec::SmallVec;
use statarena::*;

fn graph() -> StatGraph {
    StatGraph::default()
}

/// A freshly created stat reports its base as both values.
#[test]
fn test_create_stat_round_trip() {
    let mut stats = graph();
    let owner = stats.create_owner([("Health", 10.0)]).unwrap();
    let health = stats.stat(owner, "Health").unwrap();
    assert_eq!(stats.get_value(health), Some((10.0, 10.0)));
}

/// Add then Multiply gives the same result in either insertion order.
#[test]
fn test_modifier_order_independence() {
    for order in [[0, 1], [1, 0]] {
        let mut stats = graph();
        let owner = stats.create_owner([("Power", 10.0)]).unwrap();
        let power = stats.stat(owner, "Power").unwrap();
        let modifiers = [Modifier::Add(5.0), Modifier::Multiply(1.0)];
        for i in order {
            stats.add_modifier(power, modifiers[i]).unwrap();
        }
        assert_eq!(stats.value(power), Some(30.0));
    }
}

/// Competing sets resolve to the smallest value.
#[test]
fn test_set_conflict_resolution() {
    for values in [[7.0, 3.0], [3.0, 7.0]] {
        let mut stats = graph();
        let owner = stats.create_owner([("Speed", 10.0)]).unwrap();
        let speed = stats.stat(owner, "Speed").unwrap();
        for v in values {
            stats.add_modifier(speed, Modifier::Set(v)).unwrap();
        }
        assert_eq!(stats.value(speed), Some(3.0));
    }
}

/// C -> B -> A: setting C updates B then A within one call.
#[test]
fn test_transitive_propagation() {
    let mut stats = graph();
    let owner = stats
        .create_owner([("A", 1.0), ("B", 10.0), ("C", 100.0)])
        .unwrap();
    let a = stats.stat(owner, "A").unwrap();
    let b = stats.stat(owner, "B").unwrap();
    let c = stats.stat(owner, "C").unwrap();

    stats
        .add_modifier(a, Modifier::AddFromStat { stat: b, factor: 1.0 })
        .unwrap();
    stats
        .add_modifier(b, Modifier::AddFromStat { stat: c, factor: 1.0 })
        .unwrap();
    // A was computed before B observed C; a value change on B reaches it.
    assert_eq!(stats.value(b), Some(110.0));
    assert_eq!(stats.value(a), Some(111.0));

    let report = stats.set_base_value(c, 1000.0).unwrap();
    assert_eq!(stats.value(b), Some(1010.0));
    assert_eq!(stats.value(a), Some(1011.0));
    assert_eq!(report.recomputed, 3);
}

/// Stats on different owners observe each other.
#[test]
fn test_cross_owner_propagation() {
    let mut stats = graph();
    let leader = stats.create_owner([("Aura", 4.0)]).unwrap();
    let follower = stats.create_owner([("Armor", 10.0)]).unwrap();
    let aura = stats.stat(leader, "Aura").unwrap();
    let armor = stats.stat(follower, "Armor").unwrap();

    stats
        .add_modifier(armor, Modifier::AddFromStat { stat: aura, factor: 2.0 })
        .unwrap();
    assert_eq!(stats.value(armor), Some(18.0));

    stats.add_modifier(aura, Modifier::Add(1.0)).unwrap();
    assert_eq!(stats.value(armor), Some(20.0));
}

/// Each stat of a diamond is recomputed exactly once and sees both
/// updated parents.
#[test]
fn test_diamond_recomputes_once() {
    let mut stats = graph();
    let owner = stats
        .create_owner([("Top", 1.0), ("Left", 0.0), ("Right", 0.0), ("Bottom", 0.0)])
        .unwrap();
    let top = stats.stat(owner, "Top").unwrap();
    let left = stats.stat(owner, "Left").unwrap();
    let right = stats.stat(owner, "Right").unwrap();
    let bottom = stats.stat(owner, "Bottom").unwrap();

    stats
        .add_modifier(left, Modifier::AddFromStat { stat: top, factor: 1.0 })
        .unwrap();
    stats
        .add_modifier(right, Modifier::AddFromStat { stat: top, factor: 2.0 })
        .unwrap();
    stats
        .add_modifier(
            bottom,
            Modifier::AddProduct {
                lhs: left,
                rhs: right,
                factor: 1.0,
            },
        )
        .unwrap();
    assert_eq!(stats.value(bottom), Some(2.0));

    let report = stats.set_base_value(top, 3.0).unwrap();
    assert_eq!(report.recomputed, 4);
    assert_eq!(report.changed, 4);
    assert_eq!(stats.value(bottom), Some(18.0));
    assert!(!report.cyclic);
}

/// Destroying the owner of an observed stat detaches the modifier on the
/// next recompute instead of failing.
#[test]
fn test_safe_detachment() {
    let mut stats = graph();
    let target = stats.create_owner([("C", 7.0)]).unwrap();
    let reader = stats.create_owner([("B", 1.0)]).unwrap();
    let c = stats.stat(target, "C").unwrap();
    let b = stats.stat(reader, "B").unwrap();

    stats
        .add_modifier(b, Modifier::AddFromStat { stat: c, factor: 1.0 })
        .unwrap();
    stats.add_modifier(b, Modifier::Add(2.0)).unwrap();
    assert_eq!(stats.value(b), Some(10.0));

    stats.destroy_owner(target).unwrap();
    assert_eq!(stats.get_value(c), None);

    let report = stats.recompute(b).unwrap();
    assert_eq!(report.detached_modifiers, 1);
    assert_eq!(stats.value(b), Some(3.0));

    let left: Vec<Modifier> = stats
        .modifiers(b)
        .unwrap()
        .into_iter()
        .map(|(_, m)| m)
        .collect();
    assert_eq!(left, vec![Modifier::Add(2.0)]);
}

/// Destroying an observer's owner releases the edges its modifiers held
/// on other owners' stats.
#[test]
fn test_destroy_owner_releases_observer_edges() {
    let mut stats = graph();
    let source = stats.create_owner([("Str", 5.0)]).unwrap();
    let doomed = stats.create_owner([("Atk", 0.0)]).unwrap();
    let strength = stats.stat(source, "Str").unwrap();
    let attack = stats.stat(doomed, "Atk").unwrap();
    stats
        .add_modifier(attack, Modifier::AddFromStat { stat: strength, factor: 1.0 })
        .unwrap();
    assert_eq!(stats.observers(strength), Some(vec![(attack, 1)]));

    stats.destroy_owner(doomed).unwrap();
    assert_eq!(stats.observers(strength), Some(vec![]));

    let report = stats.set_base_value(strength, 6.0).unwrap();
    assert_eq!(report.pruned_edges, 0);
    assert_eq!(report.recomputed, 1);
}

/// A handle to a destroyed owner's stat never resolves, even after the
/// owner slot is reused.
#[test]
fn test_stale_stat_handle_after_owner_reuse() {
    let mut stats = graph();
    let first = stats.create_owner([("Mana", 1.0)]).unwrap();
    let mana = stats.stat(first, "Mana").unwrap();
    stats.destroy_owner(first).unwrap();

    let second = stats.create_owner([("Mana", 2.0)]).unwrap();
    assert_eq!(second.index(), first.index());
    assert_eq!(stats.get_value(mana), None);
    assert_eq!(stats.set_base_value(mana, 3.0), Err(StatError::UnknownOwner(first)));
    assert_eq!(stats.destroy_owner(first), Err(StatError::UnknownOwner(first)));
}

/// A batch of three gives the same value as three single adds, with one
/// cascade instead of three.
#[test]
fn test_batch_equivalence() {
    let modifiers = [
        Modifier::Add(4.0),
        Modifier::Multiply(0.5),
        Modifier::Clamp { min: 0.0, max: 20.0 },
    ];

    let mut sequential = graph();
    let owner = sequential.create_owner([("Dmg", 10.0)]).unwrap();
    let dmg = sequential.stat(owner, "Dmg").unwrap();
    let before = sequential.cascade_count();
    for m in modifiers {
        sequential.add_modifier(dmg, m).unwrap();
    }
    assert_eq!(sequential.cascade_count() - before, 3);

    let mut batched = graph();
    let owner = batched.create_owner([("Dmg", 10.0)]).unwrap();
    let batch_dmg = batched.stat(owner, "Dmg").unwrap();
    let before = batched.cascade_count();
    let handles = batched.add_modifiers_batch(batch_dmg, modifiers).unwrap();
    assert_eq!(batched.cascade_count() - before, 1);
    assert_eq!(handles.len(), 3);

    assert_eq!(batched.value(batch_dmg), sequential.value(dmg));
    assert_eq!(batched.value(batch_dmg), Some(20.0));
}

/// Closing a cycle is rejected by default and accepted when allowed.
#[test]
fn test_cycle_policy() {
    let mut strict = graph();
    let owner = strict.create_owner([("A", 1.0), ("B", 1.0), ("C", 1.0)]).unwrap();
    let a = strict.stat(owner, "A").unwrap();
    let b = strict.stat(owner, "B").unwrap();
    let c = strict.stat(owner, "C").unwrap();
    strict
        .add_modifier(b, Modifier::AddFromStat { stat: a, factor: 1.0 })
        .unwrap();
    strict
        .add_modifier(c, Modifier::AddFromStat { stat: b, factor: 1.0 })
        .unwrap();
    let err = strict
        .add_modifier(a, Modifier::AddFromStat { stat: c, factor: 1.0 })
        .unwrap_err();
    assert_eq!(err, StatError::Cycle { path: vec![a, b, c, a] });
    assert!(strict.dependency_graph().detect_cycles().is_ok());

    let mut relaxed: StatGraph = StatGraph::new(GraphConfig {
        cycle_policy: CyclePolicy::Allow,
        ..GraphConfig::default()
    });
    let owner = relaxed.create_owner([("A", 1.0), ("B", 1.0)]).unwrap();
    let a = relaxed.stat(owner, "A").unwrap();
    let b = relaxed.stat(owner, "B").unwrap();
    relaxed
        .add_modifier(b, Modifier::AddFromStat { stat: a, factor: 0.5 })
        .unwrap();
    relaxed
        .add_modifier(a, Modifier::AddFromStat { stat: b, factor: 0.5 })
        .unwrap();
    assert!(relaxed.last_cascade().unwrap().cyclic);
    assert!(relaxed.dependency_graph().detect_cycles().is_err());
}

/// The owner arena survives a trip through its byte form.
#[test]
fn test_owner_arena_bytes_round_trip() {
    let mut stats = graph();
    let owner = stats.create_owner([("Str", 3.0), ("Dex", 4.0)]).unwrap();
    let strength = stats.stat(owner, "Str").unwrap();
    stats.add_modifier(strength, Modifier::Add(2.0)).unwrap();

    let arena = stats.owner_arena(owner).unwrap();
    let loaded = Arena::from_bytes(arena.as_bytes().to_vec(), arena.config().clone()).unwrap();
    let record = loaded.read(strength.slot).unwrap();
    assert_eq!(record.base_value, 3.0);
    assert_eq!(record.final_value, 5.0);
    assert_eq!(record.modifier_count, 1);
    assert_eq!(loaded.stats(), arena.stats());
}

/// A capped arena refuses to grow and leaves the stat untouched.
#[test]
fn test_capped_arena_exhausts() {
    let mut stats: StatGraph = StatGraph::new(GraphConfig {
        arena: ArenaConfig {
            initial_data_bytes: 256,
            max_data_bytes: Some(256),
            ..ArenaConfig::default()
        },
        ..GraphConfig::default()
    });
    let owner = stats.create_owner([("Hp", 1.0)]).unwrap();
    let hp = stats.stat(owner, "Hp").unwrap();

    let mut last = Ok(());
    for _ in 0..64 {
        last = stats.add_modifier(hp, Modifier::Add(1.0)).map(|_| ());
        if last.is_err() {
            break;
        }
    }
    assert!(matches!(last, Err(StatError::AllocationExhausted { .. })));
    let count = stats.modifiers(hp).unwrap().len();
    assert_eq!(stats.value(hp), Some(1.0 + count as f32));
}

/// Bulk creation through a command buffer, then wiring between the new
/// owners and an existing one.
#[test]
fn test_command_buffer_bulk_spawn() {
    let mut stats = graph();
    let boss = stats.create_owner([("Rage", 2.0)]).unwrap();
    let rage = stats.stat(boss, "Rage").unwrap();

    let mut commands = StatCommandBuffer::new();
    let minions: Vec<PendingOwner> = (0..100)
        .map(|_| commands.create_owner([("Attack", 1.0)]))
        .collect();
    for &minion in &minions {
        commands.add_modifier(
            (minion, "Attack"),
            Modifier::AddFromStat { stat: rage, factor: 1.0 },
        );
    }
    let report = commands.playback(&mut stats);
    assert!(report.is_ok());
    assert_eq!(report.modifiers.len(), 100);
    assert_eq!(stats.owner_count(), 101);

    let cascade = stats.set_base_value(rage, 5.0).unwrap();
    assert_eq!(cascade.recomputed, 101);
    for minion in minions {
        let owner = report.owner(minion).unwrap();
        let attack = stats.stat(owner, "Attack").unwrap();
        assert_eq!(stats.value(attack), Some(6.0));
    }
}

/// An application-defined modifier type with its own stack.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Percent(f32);

#[derive(Default)]
struct PercentStack {
    total: f32,
}

impl ModifierStack for PercentStack {
    fn reset(&mut self) {
        self.total = 0.0;
    }

    fn apply(&self, base: f32) -> f32 {
        base * (1.0 + self.total / 100.0)
    }
}

impl StatModifier for Percent {
    type Packed = f32;
    type Stack = PercentStack;

    fn pack(&self) -> f32 {
        self.0
    }

    fn unpack(packed: f32) -> Option<Self> {
        Some(Percent(packed))
    }

    fn observed(&self) -> SmallVec<[StatHandle; 2]> {
        SmallVec::new()
    }

    fn apply(&self, stack: &mut PercentStack, _stats: &StatReader<'_>) -> ApplyOutcome {
        stack.total += self.0;
        ApplyOutcome::Applied
    }

    fn describe(&self) -> String {
        format!("{:+}%", self.0)
    }
}

#[test]
fn test_custom_modifier_type() {
    let mut stats: StatGraph<Percent> = StatGraph::default();
    let owner = stats.create_owner([("Gold", 200.0)]).unwrap();
    let gold = stats.stat(owner, "Gold").unwrap();
    let bonus = stats.add_modifier(gold, Percent(25.0)).unwrap();
    stats.add_modifier(gold, Percent(25.0)).unwrap();
    assert_eq!(stats.value(gold), Some(300.0));

    assert_eq!(stats.remove_modifier(bonus), Ok(Percent(25.0)));
    assert_eq!(stats.value(gold), Some(250.0));
    assert_eq!(stats.breakdown(gold).unwrap().modifiers[0].0, "+25%");
}

fn modifier() -> impl Strategy<Value = Modifier> {
    prop_oneof![
        (-8i32..8).prop_map(|v| Modifier::Add(v as f32)),
        (0i32..4).prop_map(|v| Modifier::Multiply(v as f32 * 0.5)),
        (0i32..50).prop_map(|v| Modifier::Set(v as f32)),
    ]
}

proptest! {
    /// Insertion order never changes the final value.
    #[test]
    fn final_value_independent_of_order(
        (modifiers, shuffled) in proptest::collection::vec(modifier(), 1..12)
            .prop_flat_map(|m| (Just(m.clone()), Just(m).prop_shuffle())),
    ) {
        let mut a = graph();
        let mut b = graph();
        let oa = a.create_owner([("S", 10.0)]).unwrap();
        let ob = b.create_owner([("S", 10.0)]).unwrap();
        let sa = a.stat(oa, "S").unwrap();
        let sb = b.stat(ob, "S").unwrap();
        for m in modifiers {
            a.add_modifier(sa, m).unwrap();
        }
        for m in shuffled {
            b.add_modifier(sb, m).unwrap();
        }
        prop_assert_eq!(a.value(sa), b.value(sb));
    }

    /// Adding and removing modifiers keeps every owner arena consistent
    /// and observer counts in step with the modifiers that need them.
    #[test]
    fn arena_stays_consistent_under_churn(
        ops in proptest::collection::vec((any::<bool>(), 0usize..4, 0usize..4), 1..80),
    ) {
        let mut stats = graph();
        let owner = stats
            .create_owner([("S0", 1.0), ("S1", 2.0), ("S2", 3.0), ("S3", 4.0)])
            .unwrap();
        let handles: Vec<StatHandle> = (0..4)
            .map(|i| stats.stat(owner, &format!("S{i}")).unwrap())
            .collect();
        let mut added: Vec<ModifierHandle> = Vec::new();

        for (add, target, source) in ops {
            if add || added.is_empty() {
                // Edges only point from lower to higher index, so no cycles.
                let (lo, hi) = (target.min(source), target.max(source));
                let m = if lo == hi {
                    Modifier::Add(1.0)
                } else {
                    Modifier::AddFromStat { stat: handles[lo], factor: 1.0 }
                };
                added.push(stats.add_modifier(handles[hi], m).unwrap());
            } else {
                let h = added.swap_remove(target % added.len());
                prop_assert!(stats.remove_modifier(h).is_ok());
            }

            let arena = stats.owner_arena(owner).unwrap();
            prop_assert!(arena.validate().is_ok());

            let graph = stats.dependency_graph();
            prop_assert!(graph.detect_cycles().is_ok());
            for &h in &handles {
                let expected = added
                    .iter()
                    .filter(|m| {
                        matches!(
                            stats.modifiers(m.stat).unwrap().iter().find(|(x, _)| x == *m),
                            Some((_, Modifier::AddFromStat { stat, .. })) if *stat == h
                        )
                    })
                    .count() as u32;
                let refs: u32 = stats.observers(h).unwrap().iter().map(|(_, r)| r).sum();
                prop_assert_eq!(refs, expected);
            }
        }
    }
}
