//! Configuration for the graph view
//!
//! Values come from environment variables (optionally via a `.env` file) or
//! from a TOML file. Missing TOML keys fall back to the defaults below.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::controls::ProtocolOrder;

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Data Source ==========
    /// JSON snapshot written by the pool indexer
    pub snapshot_path: String,

    /// Chain used until a snapshot names its own
    pub chain: String,

    /// How often the snapshot file is checked for changes in follow mode
    pub poll_interval_ms: u64,

    // ========== Controls ==========
    /// Ordering of the protocol dropdown
    pub protocol_order: ProtocolOrder,

    /// Tokens selected on startup
    pub default_tokens: Vec<String>,

    /// Where selections are persisted between runs (disabled if unset)
    pub filter_state_path: Option<String>,

    // ========== Blocks ==========
    /// Block time assumed until enough blocks have been seen
    pub default_block_duration_secs: u64,

    /// Number of timestamped blocks used for the block time estimate
    pub block_window: usize,

    // ========== View ==========
    /// Keep showing the last graph for this many empty renders while tokens
    /// are still selected. 0 switches immediately.
    pub view_latch_renders: u32,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            snapshot_path: env::var("SNAPSHOT_PATH").unwrap_or(defaults.snapshot_path),
            chain: env::var("CHAIN").unwrap_or(defaults.chain),
            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            protocol_order: match env::var("PROTOCOL_ORDER") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.protocol_order,
            },
            default_tokens: env::var("DEFAULT_TOKENS")
                .map(|s| Self::split_list(&s))
                .unwrap_or(defaults.default_tokens),
            filter_state_path: env::var("FILTER_STATE_PATH").ok().or(defaults.filter_state_path),
            default_block_duration_secs: env::var("BLOCK_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_block_duration_secs),
            block_window: env::var("BLOCK_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.block_window),
            view_latch_renders: env::var("VIEW_LATCH_RENDERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.view_latch_renders),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn split_list(s: &str) -> Vec<String> {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn default_block_duration(&self) -> Duration {
        Duration::from_secs(self.default_block_duration_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_path.trim().is_empty() {
            return Err(eyre::eyre!("SNAPSHOT_PATH must not be empty"));
        }
        if self.chain.trim().is_empty() {
            return Err(eyre::eyre!("CHAIN must not be empty"));
        }
        if self.default_block_duration_secs == 0 {
            return Err(eyre::eyre!("BLOCK_DURATION_SECS must be at least 1"));
        }
        if self.block_window < 2 {
            return Err(eyre::eyre!(
                "BLOCK_WINDOW must be at least 2 (currently {})",
                self.block_window
            ));
        }
        if self.poll_interval_ms < 50 {
            return Err(eyre::eyre!(
                "POLL_INTERVAL_MS below 50ms would spin on the file system (currently {})",
                self.poll_interval_ms
            ));
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                DEXGRAPH - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain:             {:^40} ║", self.chain);
        println!("║ Snapshot:          {:^40} ║", truncate(&self.snapshot_path, 40));
        println!("║ Poll Interval:     {:>37} ms ║", self.poll_interval_ms);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CONTROLS                                                   ║");
        println!("║ • Protocol Order:  {:^40} ║", self.protocol_order);
        println!("║ • Default Tokens:  {:^40} ║", self.default_tokens.len());
        println!("║ • Filter State:    {:^40} ║",
            self.filter_state_path
                .as_deref()
                .map(|p| truncate(p, 40))
                .unwrap_or_else(|| "✗ Not persisted".to_string())
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ BLOCKS                                                     ║");
        println!("║ • Block Time:      {:>38}s ║", self.default_block_duration_secs);
        println!("║ • Window:          {:^40} ║", self.block_window);
        println!("║ • View Latch:      {:^40} ║",
            if self.view_latch_renders == 0 {
                "✗ Disabled".to_string()
            } else {
                format!("{} renders", self.view_latch_renders)
            }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn truncate(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count - (max - 3)).collect();
        format!("...{}", tail)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: "./data/pools.json".to_string(),
            chain: "ethereum".to_string(),
            poll_interval_ms: 1000,
            protocol_order: ProtocolOrder::Sorted,
            default_tokens: vec![],
            filter_state_path: None,
            default_block_duration_secs: 12,
            block_window: 32,
            view_latch_renders: 0,
        }
    }
}

// ============================================
// TESTS
// ============================================
