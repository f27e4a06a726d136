//! dexgraph - Pool Graph View (terminal edition)
//!
//! Run with: cargo run -- --snapshot data/pools.json --token 0xC02a... --follow
//!
//! Loads a pool snapshot, applies token/protocol selections and prints the
//! controls plus either the graph or the empty prompt. In follow mode the
//! snapshot file is watched and selections can be toggled from stdin.

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dexgraph::cartographer::{LoadedSnapshot, PoolDataSource, SnapshotWatcher};
use dexgraph::controls::{FilterStateManager, ViewType};
use dexgraph::view::ViewBody;
use dexgraph::{Config, ControlAction, GraphViewModel, ViewComposer};

/// Entries printed per control list before collapsing the rest
const MAX_LISTED: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "dexgraph", version, about = "Token/pool relationship graph for DEX snapshots")]
struct Cli {
    /// TOML config file (environment variables are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pool snapshot JSON file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Chain to use when the snapshot does not name one
    #[arg(long)]
    chain: Option<String>,

    /// Token address to select (repeatable)
    #[arg(long = "token")]
    tokens: Vec<String>,

    /// Protocol to filter on (repeatable)
    #[arg(long = "protocol")]
    protocols: Vec<String>,

    /// Keep running: reload the snapshot on change and read commands from stdin
    #[arg(long)]
    follow: bool,

    /// Print each composed view as JSON
    #[arg(long)]
    json: bool,
}

/// A line typed on stdin in follow mode
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Action(ControlAction),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let arg = parts.next();

    match (verb, arg) {
        ("token" | "t", Some(address)) => Some(Command::Action(ControlAction::ToggleToken(address.to_string()))),
        ("protocol" | "p", Some(id)) => Some(Command::Action(ControlAction::ToggleProtocol(id.to_string()))),
        ("reset", None) => Some(Command::Action(ControlAction::Reset)),
        ("help" | "?", _) => Some(Command::Help),
        ("quit" | "q" | "exit", None) => Some(Command::Quit),
        _ => None,
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🕸️  DEXGRAPH - Token / Pool Relationship Graph").cyan().bold()
    );
    println!(
        "{}",
        style("    Snapshot Ingest | Token & Protocol Filters | Block Freshness").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_help() {
    println!("{}", style("Commands:").bold());
    println!("  token <address>    toggle a token");
    println!("  protocol <id>      toggle a protocol");
    println!("  reset              clear all selections");
    println!("  quit               exit");
}

fn render(model: &GraphViewModel, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(model)?);
        return Ok(());
    }

    let controls = &model.controls;

    println!();
    println!("{}", style("═══ CONTROLS ═══").blue().bold());

    let block = &controls.block;
    if block.current_block_number > 0 {
        let age = block
            .last_block_timestamp
            .map(|ts| format!("{}s ago", (Utc::now() - ts).num_seconds().max(0)))
            .unwrap_or_else(|| "time unknown".to_string());
        println!(
            "Block #{} ({}) | ~{:.1}s per block",
            block.current_block_number,
            age,
            block.estimated_block_duration.as_secs_f64()
        );
    } else {
        println!("{}", style("Waiting for first block...").dim());
    }

    println!(
        "Tokens ({}, {} selected):",
        controls.lists.token_list.len(),
        controls.selected_tokens.len()
    );
    for entry in controls.lists.token_list.iter().take(MAX_LISTED) {
        let selected = controls.selected_tokens.contains(&entry.address);
        let marker = if selected { style("[x]").green() } else { style("[ ]").dim() };
        println!("  {} {}", marker, entry.formatted_label);
    }
    if controls.lists.token_list.len() > MAX_LISTED {
        println!("  ... and {} more", controls.lists.token_list.len() - MAX_LISTED);
    }

    println!("Protocols:");
    for protocol in &controls.lists.protocols {
        let selected = controls.selected_protocols.contains(protocol);
        let marker = if selected { style("[x]").green() } else { style("[ ]").dim() };
        println!("  {} {}", marker, protocol);
    }

    println!();
    match &model.body {
        ViewBody::EmptyPrompt { message } => {
            println!("{}", style(message).dim().italic());
        }
        ViewBody::ShowingGraph(props) => {
            let graph = &props.graph;
            println!(
                "{}",
                style(format!(
                    "═══ GRAPH ({}: {} nodes, {} edges) ═══",
                    props.selected_chain,
                    graph.node_count(),
                    graph.edge_count()
                ))
                .magenta()
                .bold()
            );

            let labels: HashMap<&str, &str> = graph
                .nodes
                .iter()
                .map(|n| (n.id.as_str(), n.formatted_label.as_str()))
                .collect();

            for node in &graph.nodes {
                println!("  ● {} (degree {})", node.formatted_label, node.degree);
            }
            for edge in &graph.edges {
                let fresh = if edge.recently_updated { style("★").yellow() } else { style(" ") };
                println!(
                    "  {} {} ↔ {} via {} [{}]",
                    fresh,
                    labels.get(edge.source.as_str()).unwrap_or(&"?"),
                    labels.get(edge.target.as_str()).unwrap_or(&"?"),
                    edge.protocol_system,
                    edge.pool_id
                );
            }
        }
    }

    Ok(())
}

/// Publish a loaded snapshot and feed its block stamp to the composer
fn apply_snapshot(
    loaded: LoadedSnapshot,
    source: &PoolDataSource,
    composer: &mut ViewComposer,
    fallback_chain: &str,
) {
    if let Some(block) = &loaded.block {
        composer.observe_block(block.number, block.timestamp);
    }
    let chain = loaded.chain.unwrap_or_else(|| fallback_chain.to_string());
    source.publish(chain, loaded.pools);
    composer.set_source_failed(false);
}

/// Poll the snapshot file. Returns true when the view must be re-rendered
/// because the source just failed; successful publishes notify on their own.
fn refresh(
    watcher: &mut SnapshotWatcher,
    source: &PoolDataSource,
    composer: &mut ViewComposer,
    config: &Config,
) -> bool {
    match watcher.poll() {
        Ok(Some(loaded)) => {
            apply_snapshot(loaded, source, composer, &config.chain);
            false
        }
        Ok(None) => false,
        Err(e) => {
            if composer.source_failed() {
                return false;
            }
            error!("Snapshot refresh failed: {:#}", e);
            composer.set_source_failed(true);
            true
        }
    }
}

fn load_filters(config: &Config, chain: &str) -> FilterStateManager {
    if let Some(path) = &config.filter_state_path {
        match FilterStateManager::load_from_file(path, ViewType::Graph, chain) {
            Ok(filters) => {
                info!("Restored filter state from {}", path);
                return filters;
            }
            Err(e) => warn!("No saved filter state ({}), starting fresh", e),
        }
    }
    FilterStateManager::new(ViewType::Graph, chain)
}

fn save_filters(filters: &FilterStateManager, config: &Config) {
    if let Some(path) = &config.filter_state_path {
        match filters.save_to_file(path) {
            Ok(()) => info!("Saved filter state to {}", path),
            Err(e) => warn!("Could not save filter state: {:#}", e),
        }
    }
}

async fn follow(
    composer: &mut ViewComposer,
    source: &PoolDataSource,
    watcher: &mut SnapshotWatcher,
    config: &Config,
    json: bool,
) -> Result<()> {
    let mut snapshots = source.subscribe();
    let mut selections = composer.filters().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interval = tokio::time::interval(config.poll_interval());
    let mut stdin_open = true;

    info!(
        "Following {} (type 'help' for commands, Ctrl+C to exit)",
        watcher.path().display()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if refresh(watcher, source, composer, config) {
                    render(&composer.compose(), json)?;
                }
            }
            Ok(()) = snapshots.changed() => {
                snapshots.borrow_and_update();
                render(&composer.compose(), json)?;
            }
            Ok(()) = selections.changed() => {
                selections.borrow_and_update();
                render(&composer.compose(), json)?;
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(Command::Action(action)) => composer.dispatch(action),
                        Some(Command::Help) => print_help(),
                        Some(Command::Quit) => break,
                        None if line.trim().is_empty() => {}
                        None => warn!("Unknown command: {}", line.trim()),
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("Stopped reading stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dexgraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(path) = &cli.snapshot {
        config.snapshot_path = path.display().to_string();
    }
    if let Some(chain) = &cli.chain {
        config.chain = chain.clone();
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    if !cli.json {
        print_banner();
        config.print_summary();
    }

    // The first snapshot decides which chain's filter scope is active
    let mut watcher = SnapshotWatcher::new(&config.snapshot_path);
    let initial = match watcher.poll() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Initial snapshot load failed: {:#}", e);
            None
        }
    };
    let chain = initial
        .as_ref()
        .and_then(|l| l.chain.clone())
        .unwrap_or_else(|| config.chain.clone());

    let source = PoolDataSource::new(chain.clone());
    let mut filters = load_filters(&config, &chain);
    filters.select_tokens(config.default_tokens.iter().chain(cli.tokens.iter()));
    filters.select_protocols(&cli.protocols);

    let mut composer = ViewComposer::new(&source, filters, &config);
    match initial {
        Some(loaded) => apply_snapshot(loaded, &source, &mut composer, &config.chain),
        None => composer.set_source_failed(true),
    }

    render(&composer.compose(), cli.json)?;

    if cli.follow {
        follow(&mut composer, &source, &mut watcher, &config, cli.json).await?;
    }

    save_filters(composer.filters(), &config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("token 0xAA"),
            Some(Command::Action(ControlAction::ToggleToken("0xAA".into())))
        );
        assert_eq!(
            parse_command("  p uniswap_v3 "),
            Some(Command::Action(ControlAction::ToggleProtocol("uniswap_v3".into())))
        );
        assert_eq!(parse_command("reset"), Some(Command::Action(ControlAction::Reset)));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("help"), Some(Command::Help));
    }

    #[test]
    fn test_parse_rejects_incomplete_commands() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("token"), None);
        assert_eq!(parse_command("reset now"), None);
        assert_eq!(parse_command("dance"), None);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "dexgraph", "--snapshot", "pools.json", "--token", "0xAA", "--token", "0xBB",
            "--protocol", "uniswap_v2", "--json",
        ]);
        assert_eq!(cli.tokens, vec!["0xAA", "0xBB"]);
        assert_eq!(cli.protocols, vec!["uniswap_v2"]);
        assert!(cli.json);
        assert!(!cli.follow);
    }
}
