//! Basic example: one owner, stacked modifiers, breakdown
//!
//! This example demonstrates:
//! - Creating an owner with its stats
//! - Stacking add, multiply, set and clamp modifiers
//! - Removing a modifier by handle
//! - Printing a step-by-step breakdown
//!
//! Run with `RUST_LOG=statarena=debug` to see arena and cascade events.

use statarena::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), StatError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut stats: StatGraph = StatGraph::default();
    let hero = stats.create_owner([("HP", 100.0), ("Speed", 8.0)])?;
    let hp = stats.stat(hero, "HP").ok_or(StatError::UnknownStat("HP".into()))?;
    let speed = stats
        .stat(hero, "Speed")
        .ok_or(StatError::UnknownStat("Speed".into()))?;

    println!("Adding modifiers to HP:");
    stats.add_modifier(hp, Modifier::Add(50.0))?;
    println!("  - Item bonus: +50");
    let aura = stats.add_modifier(hp, Modifier::Multiply(0.2))?;
    println!("  - Aura: +20%");
    stats.add_modifier(hp, Modifier::Clamp { min: 0.0, max: 175.0 })?;
    println!("  - Cap: 175");

    println!("\n=== Resolved HP ===");
    print_breakdown(&stats, hp);

    println!("\nAura expires...");
    stats.remove_modifier(aura)?;
    print_breakdown(&stats, hp);

    println!("\n=== Competing sets on Speed ===");
    stats.add_modifier(speed, Modifier::Set(5.0))?;
    stats.add_modifier(speed, Modifier::Set(3.0))?;
    print_breakdown(&stats, speed);

    let arena = stats.owner_arena(hero).ok_or(StatError::UnknownOwner(hero))?;
    let usage = arena.stats();
    println!("\n=== Arena ===");
    println!("Bytes: {}", arena.as_bytes().len());
    println!("Live allocations: {}", usage.live_slots);
    println!("Free data bytes: {}", usage.free_bytes);

    Ok(())
}

fn print_breakdown(stats: &StatGraph, stat: StatHandle) {
    let Some(resolved) = stats.breakdown(stat) else {
        return;
    };
    let name = resolved.stat_id.as_ref().map_or("?", StatId::as_str);
    println!("{name}: base {:.2}", resolved.base);
    for (description, value) in &resolved.modifiers {
        println!("  {description}: {value:.2}");
    }
    println!("  = {:.2}", resolved.value);
}
