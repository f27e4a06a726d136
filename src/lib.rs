//! dexgraph - token/pool relationship graph view model
//!
//! Reshapes in-memory pool snapshots for a dashboard graph view:
//!
//! - **cartographer**: snapshot ingest, validation, block tracking, graph derivation
//! - **controls**: token/protocol control lists and filter selection state
//! - **view**: empty-prompt vs graph decision and props assembly

pub mod cartographer;
pub mod config;
pub mod controls;
pub mod memo;
pub mod tokens;
pub mod view;

pub use config::Config;
pub use tokens::{format_token_label, Pool, PoolMap, Token};
pub use view::{ControlAction, GraphViewModel, ViewComposer, ViewState};
