//! View Composer
//!
//! Decides between the empty prompt and the graph, and assembles the props
//! for the controls surface and the graph widget from the data source, the
//! filter state and the derivers.

use alloy_primitives::BlockNumber;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cartographer::{
    BlockMetadata, BlockTracker, GraphData, GraphDataDeriver, GraphNode, PoolDataSource,
    PoolSnapshot, SnapshotIdentity,
};
use crate::config::Config;
use crate::controls::{ControlListDeriver, ControlLists, FilterStateManager};
use crate::tokens::PoolMap;

pub const EMPTY_PROMPT_MESSAGE: &str = "Select tokens to display the graph.";
pub const UNAVAILABLE_MESSAGE: &str = "Unable to render graph.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewState {
    EmptyPrompt,
    ShowingGraph,
}

/// The graph is shown only when a token is selected and the derived graph
/// has at least one node.
pub fn decide_view(selected_token_addresses: &[String], graph_display_nodes: &[GraphNode]) -> ViewState {
    if selected_token_addresses.is_empty() || graph_display_nodes.is_empty() {
        ViewState::EmptyPrompt
    } else {
        ViewState::ShowingGraph
    }
}

/// Holds `ShowingGraph` across a bounded number of empty evaluations while
/// tokens stay selected. Clearing the selection always drops the graph.
#[derive(Debug, Clone)]
pub struct ViewLatch {
    hold: u32,
    remaining: u32,
    last: ViewState,
}

impl ViewLatch {
    pub fn new(hold: u32) -> Self {
        Self {
            hold,
            remaining: 0,
            last: ViewState::EmptyPrompt,
        }
    }

    pub fn apply(&mut self, has_selection: bool, decided: ViewState) -> ViewState {
        if decided == ViewState::ShowingGraph {
            self.remaining = self.hold;
            self.last = ViewState::ShowingGraph;
            return ViewState::ShowingGraph;
        }

        if has_selection && self.last == ViewState::ShowingGraph && self.remaining > 0 {
            self.remaining -= 1;
            return ViewState::ShowingGraph;
        }

        self.remaining = 0;
        self.last = ViewState::EmptyPrompt;
        ViewState::EmptyPrompt
    }
}

/// User intents coming from the controls surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    ToggleToken(String),
    ToggleProtocol(String),
    Reset,
}

/// Props for the controls surface. Always produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsProps {
    pub lists: Arc<ControlLists>,
    pub selected_tokens: Vec<String>,
    pub selected_protocols: Vec<String>,
    pub block: BlockMetadata,
}

/// Props for the graph widget
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphProps {
    pub graph: Arc<GraphData>,
    pub selected_chain: String,
}

impl GraphProps {
    pub fn raw_pools(&self) -> &Arc<PoolMap> {
        &self.graph.raw_pools
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewBody {
    EmptyPrompt { message: &'static str },
    ShowingGraph(GraphProps),
}

/// One fully composed render
#[derive(Debug, Clone, Serialize)]
pub struct GraphViewModel {
    pub controls: ControlsProps,
    pub body: ViewBody,
}

impl GraphViewModel {
    pub fn state(&self) -> ViewState {
        match self.body {
            ViewBody::EmptyPrompt { .. } => ViewState::EmptyPrompt,
            ViewBody::ShowingGraph(_) => ViewState::ShowingGraph,
        }
    }
}

pub struct ViewComposer {
    snapshots: watch::Receiver<Arc<PoolSnapshot>>,
    filters: FilterStateManager,
    controls: ControlListDeriver,
    graph: GraphDataDeriver,
    blocks: BlockTracker,
    latch: ViewLatch,
    last_shown: Option<Arc<GraphData>>,
    last_snapshot: Option<SnapshotIdentity>,
    source_failed: bool,
}

impl ViewComposer {
    pub fn new(source: &PoolDataSource, filters: FilterStateManager, config: &Config) -> Self {
        Self {
            snapshots: source.subscribe(),
            filters,
            controls: ControlListDeriver::new(config.protocol_order),
            graph: GraphDataDeriver::new(),
            blocks: BlockTracker::new(config.block_window, config.default_block_duration()),
            latch: ViewLatch::new(config.view_latch_renders),
            last_shown: None,
            last_snapshot: None,
            source_failed: false,
        }
    }

    pub fn filters(&self) -> &FilterStateManager {
        &self.filters
    }

    pub fn control_list_recomputes(&self) -> u64 {
        self.controls.recompute_count()
    }

    pub fn graph_recomputes(&self) -> u64 {
        self.graph.recompute_count()
    }

    /// Forward a control action to the filter state manager
    pub fn dispatch(&mut self, action: ControlAction) {
        debug!(?action, "Dispatching control action");
        match action {
            ControlAction::ToggleToken(address) => {
                self.filters.toggle_token(&address);
            }
            ControlAction::ToggleProtocol(protocol) => {
                self.filters.toggle_protocol(&protocol);
            }
            ControlAction::Reset => self.filters.reset_filters(),
        }
    }

    pub fn observe_block(&mut self, number: BlockNumber, timestamp: Option<DateTime<Utc>>) {
        if self.blocks.observe_block(number, timestamp) {
            info!(block = number, "New block");
        }
    }

    /// Mark whether the last attempt to refresh the data source failed.
    /// Only shown to the user while no snapshot has ever loaded.
    pub fn set_source_failed(&mut self, failed: bool) {
        self.source_failed = failed;
    }

    pub fn source_failed(&self) -> bool {
        self.source_failed
    }

    /// Build the props for one render
    pub fn compose(&mut self) -> GraphViewModel {
        let snapshot = Arc::clone(&self.snapshots.borrow_and_update());

        if snapshot.is_loaded() {
            self.filters.set_chain(&snapshot.chain);
        }

        let identity = snapshot.identity();
        if self.last_snapshot != Some(identity) {
            self.blocks.observe_pools(snapshot.iter());
            self.last_snapshot = Some(identity);
        }

        let lists = self.controls.lists(&snapshot);
        let selection = self.filters.selection();
        let block = self.blocks.metadata();
        let graph = self.graph.derive(&snapshot, &selection, block.clone());

        let decided = decide_view(&selection.selected_token_addresses, &graph.nodes);
        let has_selection = !selection.selected_token_addresses.is_empty();
        let state = self.latch.apply(has_selection, decided);

        let body = match state {
            ViewState::ShowingGraph => {
                let shown = if decided == ViewState::ShowingGraph {
                    Arc::clone(&graph)
                } else {
                    // Latched: keep the last non-empty graph on screen
                    self.last_shown.clone().unwrap_or_else(|| Arc::clone(&graph))
                };
                self.last_shown = Some(Arc::clone(&shown));
                ViewBody::ShowingGraph(GraphProps {
                    graph: shown,
                    selected_chain: snapshot.chain.clone(),
                })
            }
            ViewState::EmptyPrompt => {
                self.last_shown = None;
                let message = if self.source_failed && !snapshot.is_loaded() {
                    UNAVAILABLE_MESSAGE
                } else {
                    EMPTY_PROMPT_MESSAGE
                };
                ViewBody::EmptyPrompt { message }
            }
        };

        GraphViewModel {
            controls: ControlsProps {
                lists,
                selected_tokens: selection.selected_token_addresses,
                selected_protocols: selection.selected_protocols,
                block,
            },
            body,
        }
    }
}
