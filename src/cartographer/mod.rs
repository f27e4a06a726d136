//! The Cartographer (Data Ingest + Graph)
//!
//! Reads pool snapshots, validates them at the boundary, tracks block height
//! and derives the display graph for the current filter selection.

mod blocks;
mod graph;
mod source;
mod validation;

pub use blocks::{BlockMetadata, BlockTracker, DEFAULT_BLOCK_DURATION};
pub use graph::{build_graph_data, GraphData, GraphDataDeriver, GraphEdge, GraphNode};
pub use source::{
    load_snapshot_file, parse_snapshot, BlockStamp, LoadedSnapshot, PoolDataSource, PoolSnapshot,
    SnapshotIdentity, SnapshotWatcher,
};
pub use validation::{parse_pool, parse_pools, RecordIssue, ValidationReport};
