//! Graph Construction - display edition
//!
//! Turns the pools of a snapshot plus the current filter selection into the
//! node/edge collections the graph widget draws. Tokens are nodes, pools are
//! edges between every pair of selected tokens they hold.

use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::blocks::BlockMetadata;
use super::source::{PoolSnapshot, SnapshotIdentity};
use crate::controls::FilterSelection;
use crate::memo::Memo;
use crate::tokens::{PoolMap, Token};

/// A token drawn on the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub symbol: String,
    pub formatted_label: String,
    pub selected: bool,
    /// Number of pool edges touching this token
    pub degree: usize,
}

impl GraphNode {
    fn from_token(token: &Token) -> Self {
        Self {
            id: token.address.clone(),
            symbol: token.symbol.clone(),
            formatted_label: token.formatted_label(),
            selected: true,
            degree: 0,
        }
    }
}

/// A pool connecting two tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// `{pool_id}:{i}-{j}` with i, j the token positions inside the pool
    pub id: String,
    pub pool_id: String,
    pub source: String,
    pub target: String,
    pub protocol_system: String,
    pub last_updated_at_block: Option<u64>,
    /// Pool changed in the current block
    pub recently_updated: bool,
}

/// Everything the graph widget and the controls need from one derivation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Pool map the nodes and edges were derived from
    #[serde(rename = "rawPoolsData")]
    pub raw_pools: Arc<PoolMap>,
    pub block: BlockMetadata,
}

impl GraphData {
    pub fn empty(raw_pools: Arc<PoolMap>, block: BlockMetadata) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            raw_pools,
            block,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Build display graph data for a selection.
///
/// A pool takes part when `selected_protocols` is empty or contains its
/// protocol. Nodes are the selected tokens found in participating pools, in
/// first-seen order. Each participating pool adds one edge per pair of
/// distinct selected tokens it holds.
pub fn build_graph_data(
    pools: &Arc<PoolMap>,
    selected_tokens: &[String],
    selected_protocols: &[String],
    block: BlockMetadata,
) -> GraphData {
    if selected_tokens.is_empty() {
        return GraphData::empty(Arc::clone(pools), block);
    }

    let token_set: HashSet<&str> = selected_tokens.iter().map(String::as_str).collect();
    let protocol_set: HashSet<&str> = selected_protocols.iter().map(String::as_str).collect();

    let mut graph: UnGraph<GraphNode, GraphEdge> = UnGraph::default();
    let mut token_to_node: HashMap<&str, NodeIndex> = HashMap::new();
    let mut filtered_out = 0usize;

    for pool in pools.values() {
        if !protocol_set.is_empty() && !protocol_set.contains(pool.protocol_system.as_str()) {
            filtered_out += 1;
            continue;
        }

        let mut members: Vec<(usize, NodeIndex)> = Vec::new();
        for (position, token) in pool.tokens.iter().enumerate() {
            if !token_set.contains(token.address.as_str()) {
                continue;
            }
            let node = *token_to_node
                .entry(token.address.as_str())
                .or_insert_with(|| graph.add_node(GraphNode::from_token(token)));
            members.push((position, node));
        }

        for (k, &(i, node_i)) in members.iter().enumerate() {
            for &(j, node_j) in &members[k + 1..] {
                // Same address listed twice in one pool
                if node_i == node_j {
                    continue;
                }
                let edge = GraphEdge {
                    id: format!("{}:{}-{}", pool.id, i, j),
                    pool_id: pool.id.clone(),
                    source: graph[node_i].id.clone(),
                    target: graph[node_j].id.clone(),
                    protocol_system: pool.protocol_system.clone(),
                    last_updated_at_block: pool.last_updated_at_block,
                    recently_updated: block.current_block_number > 0
                        && pool.last_updated_at_block == Some(block.current_block_number),
                };
                graph.add_edge(node_i, node_j, edge);
            }
        }
    }

    let degrees: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.edges(n).count())
        .collect();

    let (raw_nodes, raw_edges) = graph.into_nodes_edges();

    let nodes: Vec<GraphNode> = raw_nodes
        .into_iter()
        .zip(degrees)
        .map(|(node, degree)| GraphNode {
            degree,
            ..node.weight
        })
        .collect();
    let edges: Vec<GraphEdge> = raw_edges.into_iter().map(|e| e.weight).collect();

    debug!(
        nodes = nodes.len(),
        edges = edges.len(),
        filtered_out,
        "Graph derived"
    );

    GraphData {
        nodes,
        edges,
        raw_pools: Arc::clone(pools),
        block,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GraphKey {
    snapshot: SnapshotIdentity,
    selection_version: u64,
    block: BlockMetadataKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockMetadataKey {
    number: u64,
    duration_ms: u128,
}

/// Memoized graph derivation
#[derive(Default)]
pub struct GraphDataDeriver {
    memo: Memo<GraphKey, GraphData>,
}

impl GraphDataDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive graph data, reusing the previous result when the snapshot,
    /// the selection and the block head are all unchanged.
    pub fn derive(
        &mut self,
        snapshot: &PoolSnapshot,
        selection: &FilterSelection,
        block: BlockMetadata,
    ) -> Arc<GraphData> {
        let key = GraphKey {
            snapshot: snapshot.identity(),
            selection_version: selection.version,
            block: BlockMetadataKey {
                number: block.current_block_number,
                duration_ms: block.estimated_block_duration.as_millis(),
            },
        };

        self.memo.get_or_compute(key, || {
            build_graph_data(
                &snapshot.pools,
                &selection.selected_token_addresses,
                &selection.selected_protocols,
                block,
            )
        })
    }

    pub fn recompute_count(&self) -> u64 {
        self.memo.computations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::Pool;

    fn pools() -> Arc<PoolMap> {
        let mut map = PoolMap::new();
        map.insert(
            "p1".into(),
            Pool::new("p1", "uniswap_v2", vec![Token::new("0xAA", "A"), Token::new("0xBB", "B")])
                .with_block(100),
        );
        map.insert(
            "p2".into(),
            Pool::new("p2", "uniswap_v3", vec![Token::new("0xAA", "A"), Token::new("0xCC", "C")])
                .with_block(99),
        );
        map.insert(
            "p3".into(),
            Pool::new(
                "p3",
                "curve",
                vec![Token::new("0xAA", "A"), Token::new("0xBB", "B"), Token::new("0xCC", "C")],
            ),
        );
        Arc::new(map)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn block(number: u64) -> BlockMetadata {
        BlockMetadata {
            current_block_number: number,
            ..BlockMetadata::default()
        }
    }

    #[test]
    fn test_empty_selection_yields_nothing() {
        let data = build_graph_data(&pools(), &[], &[], block(0));
        assert_eq!(data.node_count(), 0);
        assert_eq!(data.edge_count(), 0);
        assert_eq!(data.raw_pools.len(), 3);
    }

    #[test]
    fn test_edges_between_selected_tokens() {
        let data = build_graph_data(&pools(), &strings(&["0xAA", "0xBB"]), &[], block(100));

        let ids: Vec<&str> = data.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["0xAA", "0xBB"]);

        // p1 and p3 both connect A-B, p2 only has A selected
        let pool_ids: Vec<&str> = data.edges.iter().map(|e| e.pool_id.as_str()).collect();
        assert_eq!(pool_ids, vec!["p1", "p3"]);
        assert_eq!(data.edges[0].id, "p1:0-1");
        assert!(data.edges[0].recently_updated);
        assert!(!data.edges[1].recently_updated);

        assert!(data.nodes.iter().all(|n| n.degree == 2));
        assert_eq!(data.nodes[0].formatted_label, "A (0xAA..AA)");
    }

    #[test]
    fn test_multi_token_pool_pairs() {
        let data = build_graph_data(
            &pools(),
            &strings(&["0xAA", "0xBB", "0xCC"]),
            &strings(&["curve"]),
            block(0),
        );
        assert_eq!(data.node_count(), 3);
        let edge_ids: Vec<&str> = data.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(edge_ids, vec!["p3:0-1", "p3:0-2", "p3:1-2"]);
    }

    #[test]
    fn test_protocol_filter() {
        let data = build_graph_data(
            &pools(),
            &strings(&["0xAA", "0xCC"]),
            &strings(&["uniswap_v2"]),
            block(0),
        );
        // A is present in the v2 pool, C is not in any v2 pool
        assert_eq!(data.node_count(), 1);
        assert_eq!(data.edge_count(), 0);
        assert_eq!(data.nodes[0].degree, 0);
    }

    #[test]
    fn test_unknown_selection_has_no_nodes() {
        let data = build_graph_data(&pools(), &strings(&["0xDEAD"]), &[], block(0));
        assert_eq!(data.node_count(), 0);
    }

    #[test]
    fn test_duplicate_address_in_pool_no_self_loop() {
        let mut map = PoolMap::new();
        map.insert(
            "dup".into(),
            Pool::new("dup", "uniswap_v2", vec![Token::new("0xAA", "A"), Token::new("0xAA", "A")]),
        );
        let data = build_graph_data(&Arc::new(map), &strings(&["0xAA"]), &[], block(0));
        assert_eq!(data.node_count(), 1);
        assert_eq!(data.edge_count(), 0);
    }

    #[test]
    fn test_deriver_memoizes() {
        let snapshot = PoolSnapshot {
            chain: "ethereum".into(),
            pools: pools(),
            version: 1,
        };
        let mut selection = FilterSelection::default();
        selection.selected_token_addresses = strings(&["0xAA", "0xBB"]);
        selection.version = 1;

        let mut deriver = GraphDataDeriver::new();
        let a = deriver.derive(&snapshot, &selection, block(100));
        let b = deriver.derive(&snapshot, &selection, block(100));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(deriver.recompute_count(), 1);

        deriver.derive(&snapshot, &selection, block(101));
        assert_eq!(deriver.recompute_count(), 2);

        selection.version = 2;
        deriver.derive(&snapshot, &selection, block(101));
        assert_eq!(deriver.recompute_count(), 3);
    }
}
