//! Controls: dropdown lists and filter selection state
//!
//! - **ControlListDeriver**: available tokens and protocols from a snapshot
//! - **FilterStateManager**: what the user has selected, per view and chain

mod deriver;
mod filter;

pub use deriver::{
    derive_protocol_entries, derive_token_entries, ControlListDeriver, ControlLists,
    ProtocolOrder, TokenControlEntry,
};
pub use filter::{FilterScope, FilterSelection, FilterStateManager, ViewType};
