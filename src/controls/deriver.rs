//! Control-List Deriver
//!
//! Builds the token and protocol dropdown lists from the raw snapshot. Both
//! lists are deduplicated and recomputed only when the snapshot identity
//! changes, never on a plain re-render.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::cartographer::{PoolSnapshot, SnapshotIdentity};
use crate::memo::Memo;
use crate::tokens::{Pool, Token};

/// One selectable token in the controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenControlEntry {
    /// Same as `address`
    pub id: String,
    pub label: String,
    pub symbol: String,
    pub formatted_label: String,
    pub address: String,
}

impl TokenControlEntry {
    pub fn from_token(token: &Token) -> Self {
        Self {
            id: token.address.clone(),
            label: token.symbol.clone(),
            symbol: token.symbol.clone(),
            formatted_label: token.formatted_label(),
            address: token.address.clone(),
        }
    }
}

/// Ordering of the protocol list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolOrder {
    /// Lexicographic, stable across snapshots
    #[default]
    Sorted,
    /// Order of first appearance while walking the pools
    FirstSeen,
}

impl std::fmt::Display for ProtocolOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolOrder::Sorted => write!(f, "sorted"),
            ProtocolOrder::FirstSeen => write!(f, "first_seen"),
        }
    }
}

impl std::str::FromStr for ProtocolOrder {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sorted" => Ok(ProtocolOrder::Sorted),
            "first_seen" | "firstseen" | "insertion" => Ok(ProtocolOrder::FirstSeen),
            other => Err(eyre::eyre!("Unknown protocol order: {}", other)),
        }
    }
}

/// One entry per distinct token address, first occurrence wins.
/// Output keeps first-seen order across pools and their tokens.
pub fn derive_token_entries<'a>(pools: impl IntoIterator<Item = &'a Pool>) -> Vec<TokenControlEntry> {
    let mut seen: HashSet<&'a str> = HashSet::new();
    let mut entries = Vec::new();

    for pool in pools {
        for token in &pool.tokens {
            if seen.insert(token.address.as_str()) {
                entries.push(TokenControlEntry::from_token(token));
            }
        }
    }

    entries
}

/// Distinct protocol identifiers
pub fn derive_protocol_entries<'a>(
    pools: impl IntoIterator<Item = &'a Pool>,
    order: ProtocolOrder,
) -> Vec<String> {
    match order {
        ProtocolOrder::Sorted => pools
            .into_iter()
            .map(|p| p.protocol_system.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect(),
        ProtocolOrder::FirstSeen => {
            let mut seen: HashSet<&'a str> = HashSet::new();
            pools
                .into_iter()
                .filter(|p| seen.insert(p.protocol_system.as_str()))
                .map(|p| p.protocol_system.clone())
                .collect()
        }
    }
}

/// Both control lists for one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlLists {
    pub token_list: Vec<TokenControlEntry>,
    pub protocols: Vec<String>,
}

/// Memoized control-list derivation keyed by snapshot identity
pub struct ControlListDeriver {
    order: ProtocolOrder,
    memo: Memo<SnapshotIdentity, ControlLists>,
}

impl ControlListDeriver {
    pub fn new(order: ProtocolOrder) -> Self {
        Self {
            order,
            memo: Memo::new(),
        }
    }

    /// Control lists for `snapshot`. The same snapshot always yields the
    /// same `Arc`.
    pub fn lists(&mut self, snapshot: &PoolSnapshot) -> Arc<ControlLists> {
        let order = self.order;
        self.memo.get_or_compute(snapshot.identity(), || {
            let lists = ControlLists {
                token_list: derive_token_entries(snapshot.iter()),
                protocols: derive_protocol_entries(snapshot.iter(), order),
            };
            debug!(
                version = snapshot.version,
                tokens = lists.token_list.len(),
                protocols = lists.protocols.len(),
                "Recomputed control lists"
            );
            lists
        })
    }

    pub fn recompute_count(&self) -> u64 {
        self.memo.computations()
    }
}

impl Default for ControlListDeriver {
    fn default() -> Self {
        Self::new(ProtocolOrder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::PoolMap;
    use proptest::prelude::*;

    fn scenario() -> Vec<Pool> {
        vec![
            Pool::new("p1", "uniswap_v2", vec![Token::new("0xAA", "A"), Token::new("0xBB", "B")]),
            Pool::new("p2", "uniswap_v3", vec![Token::new("0xAA", "A"), Token::new("0xCC", "C")]),
        ]
    }

    fn snapshot(pools: Vec<Pool>, version: u64) -> PoolSnapshot {
        let map: PoolMap = pools.into_iter().map(|p| (p.id.clone(), p)).collect();
        PoolSnapshot {
            chain: "ethereum".into(),
            pools: Arc::new(map),
            version,
        }
    }

    #[test]
    fn test_two_pool_scenario() {
        let pools = scenario();
        let tokens = derive_token_entries(&pools);
        let ids: Vec<&str> = tokens.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["0xAA", "0xBB", "0xCC"]);

        let protocols = derive_protocol_entries(&pools, ProtocolOrder::Sorted);
        assert_eq!(protocols, vec!["uniswap_v2", "uniswap_v3"]);
    }

    #[test]
    fn test_first_seen_wins_on_symbol_conflict() {
        let pools = vec![
            Pool::new("p1", "x", vec![Token::new("0xAA", "OLD")]),
            Pool::new("p2", "x", vec![Token::new("0xAA", "NEW")]),
        ];
        let tokens = derive_token_entries(&pools);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol, "OLD");
        assert_eq!(tokens[0].label, "OLD");
    }

    #[test]
    fn test_empty_addresses_collapse() {
        let pools = vec![Pool::new(
            "p1",
            "x",
            vec![Token::new("", "ETH"), Token::new("", "OTHER")],
        )];
        let tokens = derive_token_entries(&pools);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].id, "");
        assert_eq!(tokens[0].formatted_label, "ETH");
    }

    #[test]
    fn test_entry_fields() {
        let entry = TokenControlEntry::from_token(&Token::new("0xABCDEF1234567890abcdef", "FOO"));
        assert_eq!(entry.id, entry.address);
        assert_eq!(entry.formatted_label, "FOO (0xAB..ef)");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["formattedLabel"], "FOO (0xAB..ef)");
    }

    #[test]
    fn test_protocol_orders() {
        let pools = vec![
            Pool::new("a", "vm:curve", vec![]),
            Pool::new("b", "balancer_v2", vec![]),
            Pool::new("c", "vm:curve", vec![]),
        ];
        assert_eq!(
            derive_protocol_entries(&pools, ProtocolOrder::FirstSeen),
            vec!["vm:curve", "balancer_v2"]
        );
        assert_eq!(
            derive_protocol_entries(&pools, ProtocolOrder::Sorted),
            vec!["balancer_v2", "vm:curve"]
        );
        assert_eq!("first_seen".parse::<ProtocolOrder>().unwrap(), ProtocolOrder::FirstSeen);
        assert!("random".parse::<ProtocolOrder>().is_err());
        assert_eq!(ProtocolOrder::default(), ProtocolOrder::Sorted);
    }

    #[test]
    fn test_empty_snapshot_gives_empty_lists() {
        let mut deriver = ControlListDeriver::default();
        let lists = deriver.lists(&PoolSnapshot::empty("ethereum"));
        assert!(lists.token_list.is_empty());
        assert!(lists.protocols.is_empty());
    }

    #[test]
    fn test_same_snapshot_is_referentially_stable() {
        let mut deriver = ControlListDeriver::default();
        let snap = snapshot(scenario(), 1);

        let a = deriver.lists(&snap);
        let b = deriver.lists(&snap);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(deriver.recompute_count(), 1);

        // New publish with equal content still recomputes: identity, not equality
        let next = snapshot(scenario(), 2);
        let c = deriver.lists(&next);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*a, *c);
        assert_eq!(deriver.recompute_count(), 2);
    }

    fn arb_pools() -> impl Strategy<Value = Vec<Pool>> {
        let token = ("[a-d]{0,2}", "[A-Z]{1,3}")
            .prop_map(|(addr, sym)| Token::new(if addr.is_empty() { addr } else { format!("0x{}", addr) }, sym));
        let pool = (prop::collection::vec(token, 0..4), "[a-c]")
            .prop_map(|(tokens, proto)| Pool::new("p", format!("proto_{}", proto), tokens));
        prop::collection::vec(pool, 0..12)
    }

    proptest! {
        #[test]
        fn prop_token_count_equals_distinct_addresses(pools in arb_pools()) {
            let distinct: HashSet<&str> = pools
                .iter()
                .flat_map(|p| p.tokens.iter().map(|t| t.address.as_str()))
                .collect();
            prop_assert_eq!(derive_token_entries(&pools).len(), distinct.len());
        }

        #[test]
        fn prop_protocol_count_equals_distinct_protocols(pools in arb_pools()) {
            let distinct: HashSet<&str> = pools.iter().map(|p| p.protocol_system.as_str()).collect();
            prop_assert_eq!(derive_protocol_entries(&pools, ProtocolOrder::Sorted).len(), distinct.len());
            prop_assert_eq!(derive_protocol_entries(&pools, ProtocolOrder::FirstSeen).len(), distinct.len());
        }
    }
}
