//! Diagnostic tool - Check configuration and snapshot health
//!
//! Run with: cargo run --bin diagnose [SNAPSHOT_FILE]

use std::env;

use dexgraph::cartographer::{load_snapshot_file, BlockTracker};
use dexgraph::controls::{derive_protocol_entries, derive_token_entries};
use dexgraph::Config;

fn main() -> eyre::Result<()> {
    println!("🔍 DEXGRAPH DIAGNOSTIC CHECK\n");

    let config = Config::from_env()?;

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("SNAPSHOT_PATH", "./data/pools.json", "Pool snapshot JSON file"),
        ("CHAIN", "ethereum", "Chain used until the snapshot names one"),
        ("PROTOCOL_ORDER", "sorted", "Protocol dropdown ordering"),
        ("BLOCK_DURATION_SECS", "12", "Assumed block time"),
        ("BLOCK_WINDOW", "32", "Blocks used for the block time estimate"),
        ("VIEW_LATCH_RENDERS", "0", "Renders to hold a graph that went empty"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    match config.validate() {
        Ok(()) => println!("  Config: ✅ Valid"),
        Err(e) => println!("  Config: ❌ {}", e),
    }

    let path = env::args().nth(1).unwrap_or_else(|| config.snapshot_path.clone());

    println!("\n═══════════════════════════════════════════════════");
    println!("                     SNAPSHOT                       ");
    println!("═══════════════════════════════════════════════════\n");

    println!("  File: {}", path);

    let loaded = match load_snapshot_file(&path) {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("  ❌ Could not load snapshot: {:#}", e);
            println!("     The graph view would show \"Unable to render graph.\"");
            return Ok(());
        }
    };

    let report = &loaded.report;
    println!("  Chain:        {}", loaded.chain.as_deref().unwrap_or("(not set)"));
    println!("  Pools seen:   {}", report.pools_seen);
    println!("  Accepted:     {}", report.pools_accepted);
    println!("  Skipped:      {}", report.pools_skipped());
    println!("  Bad tokens:   {}", report.tokens_skipped);
    println!("  Odd address:  {}", report.nonstandard_addresses);

    if !report.issues.is_empty() {
        println!("\n  Issues:");
        for issue in report.issues.iter().take(25) {
            println!("    • {}", issue);
        }
        if report.issues.len() > 25 {
            println!("    ... and {} more", report.issues.len() - 25);
        }
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                   CONTROL LISTS                    ");
    println!("═══════════════════════════════════════════════════\n");

    let tokens = derive_token_entries(loaded.pools.values());
    let protocols = derive_protocol_entries(loaded.pools.values(), config.protocol_order);
    println!("  Distinct tokens:    {}", tokens.len());
    println!("  Distinct protocols: {}", protocols.len());
    for protocol in &protocols {
        let count = loaded
            .pools
            .values()
            .filter(|p| &p.protocol_system == protocol)
            .count();
        println!("    • {:<24} {} pools", protocol, count);
    }

    let mut blocks = BlockTracker::new(config.block_window, config.default_block_duration());
    if let Some(stamp) = &loaded.block {
        blocks.observe_block(stamp.number, stamp.timestamp);
    }
    blocks.observe_pools(loaded.pools.values());
    let meta = blocks.metadata();
    println!("\n  Latest block:       {}", meta.current_block_number);
    match meta.last_block_timestamp {
        Some(ts) => println!("  Block timestamp:    {}", ts.to_rfc3339()),
        None => println!("  Block timestamp:    (unknown)"),
    }

    if report.is_clean() {
        println!("\n✅ Diagnostic complete, snapshot is clean!\n");
    } else {
        println!("\n⚠️  Diagnostic complete, invalid records were skipped.\n");
    }

    Ok(())
}
