//! Dependencies example: stats that read other stats
//!
//! This example demonstrates:
//! - Derived stats on the same owner and across owners
//! - Cascades after a base value change
//! - Safe detachment when an observed owner is destroyed
//! - Spawning owners through a command buffer
//!
//! Run with `RUST_LOG=statarena=debug` to see each cascade.

use statarena::*;
use tracing_subscriber::EnvFilter;

fn lookup(stats: &StatGraph, owner: OwnerId, id: &str) -> Result<StatHandle, StatError> {
    stats.stat(owner, id).ok_or(StatError::UnknownStat(id.into()))
}

fn main() -> Result<(), StatError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut stats: StatGraph = StatGraph::default();

    println!("=== Setting up base stats ===");
    let hero = stats.create_owner([("STR", 10.0), ("DEX", 15.0), ("ATK", 50.0), ("CRIT", 0.05)])?;
    let str_stat = lookup(&stats, hero, "STR")?;
    let dex = lookup(&stats, hero, "DEX")?;
    let atk = lookup(&stats, hero, "ATK")?;
    let crit = lookup(&stats, hero, "CRIT")?;
    println!("STR: 10, DEX: 15");

    println!("\n=== Setting up derived stats ===");
    stats.add_modifier(atk, Modifier::AddFromStat { stat: str_stat, factor: 2.0 })?;
    println!("ATK: 50 (base) + STR * 2.0");
    stats.add_modifier(crit, Modifier::AddFromStat { stat: dex, factor: 0.01 })?;
    println!("CRIT: 0.05 (base) + DEX * 0.01");
    println!("ATK = {:.2}, CRIT = {:.2}", value(&stats, atk), value(&stats, crit));

    println!("\n=== Raising STR to 20 ===");
    let report = stats.set_base_value(str_stat, 20.0)?;
    println!(
        "recomputed {} stats, {} changed",
        report.recomputed, report.changed
    );
    println!("ATK = {:.2}", value(&stats, atk));

    println!("\n=== Cross-owner aura ===");
    let banner = stats.create_owner([("Aura", 0.25)])?;
    let aura = lookup(&stats, banner, "Aura")?;
    stats.add_modifier(atk, Modifier::MultiplyFromStat { stat: aura, factor: 1.0 })?;
    println!("ATK with aura = {:.2}", value(&stats, atk));

    println!("\n=== Banner destroyed ===");
    stats.destroy_owner(banner)?;
    let report = stats.recompute(atk)?;
    println!(
        "detached {} modifier(s), ATK = {:.2}",
        report.detached_modifiers,
        value(&stats, atk)
    );

    println!("\n=== Spawning followers ===");
    let mut commands = StatCommandBuffer::new();
    let followers: Vec<PendingOwner> = (0..3)
        .map(|_| commands.create_owner([("ATK", 5.0)]))
        .collect();
    for &follower in &followers {
        commands.add_modifier(
            (follower, "ATK"),
            Modifier::AddFromStat { stat: atk, factor: 0.1 },
        );
    }
    let playback = commands.playback(&mut stats);
    for (i, follower) in followers.into_iter().enumerate() {
        if let Some(owner) = playback.owner(follower) {
            let follower_atk = lookup(&stats, owner, "ATK")?;
            println!("Follower {i} ATK = {:.2}", value(&stats, follower_atk));
        }
    }

    println!("\n=== Dependency graph ===");
    let graph = stats.dependency_graph();
    println!("{} stats, {} edges", graph.node_count(), graph.edge_count());
    graph.detect_cycles()?;
    println!("No cycles");

    Ok(())
}

fn value(stats: &StatGraph, stat: StatHandle) -> f32 {
    stats.value(stat).unwrap_or(f32::NAN)
}
