//! Filter State Manager
//!
//! Owns the selected token addresses and protocol identifiers for each
//! `(view, chain)` scope. It is the only writer of selection state; every
//! change is versioned and broadcast on a watch channel.

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, info};

/// Dashboard view a selection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Graph,
    List,
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewType::Graph => write!(f, "graph"),
            ViewType::List => write!(f, "list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterScope {
    pub view: ViewType,
    pub chain: String,
}

impl FilterScope {
    pub fn new(view: ViewType, chain: impl Into<String>) -> Self {
        Self {
            view,
            chain: chain.into(),
        }
    }
}

/// Current selections of one scope. Both lists are duplicate-free and keep
/// the order in which items were selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSelection {
    pub selected_token_addresses: Vec<String>,
    pub selected_protocols: Vec<String>,
    /// Manager-wide change counter at the time this value was produced
    #[serde(skip)]
    pub version: u64,
}

impl FilterSelection {
    pub fn is_token_selected(&self, address: &str) -> bool {
        self.selected_token_addresses.iter().any(|a| a == address)
    }

    pub fn is_protocol_selected(&self, protocol: &str) -> bool {
        self.selected_protocols.iter().any(|p| p == protocol)
    }
}

/// On-disk form of one scope
#[derive(Debug, Serialize, Deserialize)]
struct PersistedScope {
    scope: FilterScope,
    selection: FilterSelection,
}

pub struct FilterStateManager {
    scope: FilterScope,
    scopes: HashMap<FilterScope, FilterSelection>,
    version: u64,
    tx: watch::Sender<FilterSelection>,
}

impl FilterStateManager {
    pub fn new(view: ViewType, chain: impl Into<String>) -> Self {
        Self::with_scopes(FilterScope::new(view, chain), HashMap::new())
    }

    fn with_scopes(scope: FilterScope, scopes: HashMap<FilterScope, FilterSelection>) -> Self {
        let initial = scopes.get(&scope).cloned().unwrap_or_default();
        let (tx, _rx) = watch::channel(initial);
        Self {
            scope,
            scopes,
            version: 0,
            tx,
        }
    }

    pub fn scope(&self) -> &FilterScope {
        &self.scope
    }

    /// Snapshot of the active scope's selection, stamped with the current version
    pub fn selection(&self) -> FilterSelection {
        let mut selection = self.scopes.get(&self.scope).cloned().unwrap_or_default();
        selection.version = self.version;
        selection
    }

    pub fn selected_token_addresses(&self) -> &[String] {
        self.scopes
            .get(&self.scope)
            .map(|s| s.selected_token_addresses.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_protocols(&self) -> &[String] {
        self.scopes
            .get(&self.scope)
            .map(|s| s.selected_protocols.as_slice())
            .unwrap_or(&[])
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterSelection> {
        self.tx.subscribe()
    }

    /// Select the token if absent, deselect it if present.
    /// Returns whether the token is selected afterwards.
    pub fn toggle_token(&mut self, address: &str) -> bool {
        let selected = toggle(&mut self.active_mut().selected_token_addresses, address);
        debug!(address, selected, "Token toggled");
        self.notify();
        selected
    }

    /// Select the protocol if absent, deselect it if present
    pub fn toggle_protocol(&mut self, protocol: &str) -> bool {
        let selected = toggle(&mut self.active_mut().selected_protocols, protocol);
        debug!(protocol, selected, "Protocol toggled");
        self.notify();
        selected
    }

    /// Ensure the given tokens are selected without deselecting anything
    pub fn select_tokens<I, S>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let active = self.active_mut();
        let mut changed = false;
        for address in addresses {
            let address = address.as_ref();
            if !active.selected_token_addresses.iter().any(|a| a == address) {
                active.selected_token_addresses.push(address.to_string());
                changed = true;
            }
        }
        if changed {
            self.notify();
        }
    }

    /// Ensure the given protocols are selected without deselecting anything
    pub fn select_protocols<I, S>(&mut self, protocols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let active = self.active_mut();
        let mut changed = false;
        for protocol in protocols {
            let protocol = protocol.as_ref();
            if !active.selected_protocols.iter().any(|p| p == protocol) {
                active.selected_protocols.push(protocol.to_string());
                changed = true;
            }
        }
        if changed {
            self.notify();
        }
    }

    /// Clear both selections of the active scope
    pub fn reset_filters(&mut self) {
        let active = self.active_mut();
        active.selected_token_addresses.clear();
        active.selected_protocols.clear();
        info!(view = %self.scope.view, chain = %self.scope.chain, "Filters reset");
        self.notify();
    }

    /// Switch to another chain's selection, creating it empty if needed
    pub fn set_chain(&mut self, chain: &str) {
        if self.scope.chain == chain {
            return;
        }
        info!(from = %self.scope.chain, to = chain, "Switching filter scope chain");
        self.scope.chain = chain.to_string();
        self.notify();
    }

    /// Write every scope to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut persisted: Vec<PersistedScope> = self
            .scopes
            .iter()
            .map(|(scope, selection)| PersistedScope {
                scope: scope.clone(),
                selection: selection.clone(),
            })
            .collect();
        persisted.sort_by(|a, b| a.scope.chain.cmp(&b.scope.chain));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&persisted)?;
        fs::write(path, json)
            .wrap_err_with(|| format!("Failed to write filter state {}", path.display()))?;
        Ok(())
    }

    /// Restore scopes from a JSON file and activate `(view, chain)`
    pub fn load_from_file<P: AsRef<Path>>(path: P, view: ViewType, chain: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read filter state {}", path.display()))?;
        let persisted: Vec<PersistedScope> = serde_json::from_str(&content)?;

        let scopes = persisted
            .into_iter()
            .map(|p| (p.scope, p.selection))
            .collect();

        Ok(Self::with_scopes(FilterScope::new(view, chain), scopes))
    }

    fn active_mut(&mut self) -> &mut FilterSelection {
        self.scopes.entry(self.scope.clone()).or_default()
    }

    fn notify(&mut self) {
        self.version += 1;
        self.tx.send_replace(self.selection());
    }
}

fn toggle(items: &mut Vec<String>, item: &str) -> bool {
    if let Some(pos) = items.iter().position(|i| i == item) {
        items.remove(pos);
        false
    } else {
        items.push(item.to_string());
        true
    }
}
