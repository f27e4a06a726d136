//! Record validation at the snapshot boundary
//!
//! Raw pool JSON is checked field by field. Broken records are skipped and
//! logged instead of failing the whole snapshot, so a single bad pool never
//! blanks the view.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::tokens::{Pool, PoolMap, Token};

/// Why a record was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordIssue {
    #[error("pool record #{index} is not an object")]
    PoolNotAnObject { index: usize },

    #[error("pool record #{index} has no id")]
    MissingPoolId { index: usize },

    #[error("pool {pool} has no tokens array")]
    MissingTokens { pool: String },

    #[error("pool {pool} has no protocol_system")]
    MissingProtocol { pool: String },

    #[error("token #{index} of pool {pool} is not an object")]
    TokenNotAnObject { pool: String, index: usize },

    #[error("token #{index} of pool {pool} has a non-string address")]
    NonStringAddress { pool: String, index: usize },

    #[error("token #{index} of pool {pool} has no symbol")]
    MissingSymbol { pool: String, index: usize },
}

/// Outcome of validating one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub pools_seen: usize,
    pub pools_accepted: usize,
    pub tokens_skipped: usize,
    /// Addresses kept as-is but not parseable as 20-byte hex
    pub nonstandard_addresses: usize,
    pub issues: Vec<RecordIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn pools_skipped(&self) -> usize {
        self.pools_seen - self.pools_accepted
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pools seen, {} accepted, {} skipped, {} tokens skipped, {} non-hex addresses",
            self.pools_seen,
            self.pools_accepted,
            self.pools_skipped(),
            self.tokens_skipped,
            self.nonstandard_addresses
        )
    }

    fn record(&mut self, issue: RecordIssue) {
        warn!("Skipping malformed record: {}", issue);
        self.issues.push(issue);
    }
}

/// Parse the `pools` field of a snapshot.
///
/// Accepts an object keyed by pool id or an array of pool objects. Later
/// records with an id already seen replace the earlier one.
pub fn parse_pools(raw: &Value, report: &mut ValidationReport) -> PoolMap {
    let mut pools = PoolMap::new();

    let records: Vec<(Option<&str>, &Value)> = match raw {
        Value::Object(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        other => {
            warn!("Snapshot pools field is neither object nor array: {}", type_name(other));
            return pools;
        }
    };

    for (index, (key, value)) in records.into_iter().enumerate() {
        report.pools_seen += 1;
        if let Some(pool) = parse_pool(key, index, value, report) {
            report.pools_accepted += 1;
            if pools.insert(pool.id.clone(), pool).is_some() {
                debug!("Duplicate pool id in snapshot, keeping the later record");
                report.pools_accepted -= 1;
            }
        }
    }

    pools
}

/// Validate a single pool record. `key` is the map key when the snapshot
/// stores pools keyed by id.
pub fn parse_pool(
    key: Option<&str>,
    index: usize,
    value: &Value,
    report: &mut ValidationReport,
) -> Option<Pool> {
    let Some(obj) = value.as_object() else {
        report.record(RecordIssue::PoolNotAnObject { index });
        return None;
    };

    let id = match obj.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => match key {
            Some(k) => k.to_string(),
            None => {
                report.record(RecordIssue::MissingPoolId { index });
                return None;
            }
        },
    };

    let Some(raw_tokens) = obj.get("tokens").and_then(Value::as_array) else {
        report.record(RecordIssue::MissingTokens { pool: id });
        return None;
    };

    let Some(protocol_system) = obj.get("protocol_system").and_then(Value::as_str) else {
        report.record(RecordIssue::MissingProtocol { pool: id });
        return None;
    };

    let mut tokens = Vec::with_capacity(raw_tokens.len());
    for (token_index, raw_token) in raw_tokens.iter().enumerate() {
        match parse_token(&id, token_index, raw_token) {
            Ok(token) => {
                if !token.address.is_empty() && !token.has_hex_address() {
                    report.nonstandard_addresses += 1;
                }
                tokens.push(token);
            }
            Err(issue) => {
                report.tokens_skipped += 1;
                report.record(issue);
            }
        }
    }

    let last_updated_at_block = match obj.get("lastUpdatedAtBlock") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let block = v.as_u64();
            if block.is_none() {
                debug!(pool = %id, "Ignoring non-integer lastUpdatedAtBlock");
            }
            block
        }
    };

    Some(Pool {
        id,
        tokens,
        protocol_system: protocol_system.to_string(),
        last_updated_at_block,
    })
}

fn parse_token(pool: &str, index: usize, value: &Value) -> Result<Token, RecordIssue> {
    let obj = value.as_object().ok_or_else(|| RecordIssue::TokenNotAnObject {
        pool: pool.to_string(),
        index,
    })?;

    // A missing address is a known-unknown and keys as the empty string
    let address = match obj.get("address") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(RecordIssue::NonStringAddress {
                pool: pool.to_string(),
                index,
            })
        }
    };

    let symbol = obj
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| RecordIssue::MissingSymbol {
            pool: pool.to_string(),
            index,
        })?;

    Ok(Token::new(address, symbol))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_and_array_forms() {
        let mut report = ValidationReport::default();
        let keyed = json!({
            "p1": {"tokens": [{"address": "0xAA", "symbol": "A"}], "protocol_system": "uniswap_v2"}
        });
        let pools = parse_pools(&keyed, &mut report);
        assert_eq!(pools["p1"].id, "p1");

        let listed = json!([
            {"id": "p2", "tokens": [], "protocol_system": "curve", "lastUpdatedAtBlock": 7}
        ]);
        let pools = parse_pools(&listed, &mut report);
        assert_eq!(pools["p2"].last_updated_at_block, Some(7));
        assert!(report.is_clean());
        assert_eq!(report.pools_accepted, 2);
    }

    #[test]
    fn test_malformed_pools_are_skipped() {
        let mut report = ValidationReport::default();
        let raw = json!([
            {"id": "ok", "tokens": [{"address": "0xAA", "symbol": "A"}], "protocol_system": "uniswap_v2"},
            {"id": "no_tokens", "protocol_system": "uniswap_v2"},
            {"id": "no_protocol", "tokens": []},
            {"tokens": [], "protocol_system": "uniswap_v2"},
            "garbage"
        ]);
        let pools = parse_pools(&raw, &mut report);

        assert_eq!(pools.len(), 1);
        assert!(pools.contains_key("ok"));
        assert_eq!(report.pools_seen, 5);
        assert_eq!(report.pools_skipped(), 4);
        assert!(report
            .issues
            .contains(&RecordIssue::MissingTokens { pool: "no_tokens".into() }));
        assert!(report.issues.contains(&RecordIssue::MissingPoolId { index: 3 }));
        assert!(report.issues.contains(&RecordIssue::PoolNotAnObject { index: 4 }));
    }

    #[test]
    fn test_malformed_tokens_are_skipped_pool_kept() {
        let mut report = ValidationReport::default();
        let raw = json!({
            "p1": {
                "tokens": [
                    {"address": 12, "symbol": "NUM"},
                    {"address": "0xBB"},
                    {"symbol": "NOADDR"},
                    {"address": null, "symbol": "NULLADDR"},
                    7
                ],
                "protocol_system": "uniswap_v3"
            }
        });
        let pools = parse_pools(&raw, &mut report);
        let pool = &pools["p1"];

        assert_eq!(pool.tokens.len(), 2);
        assert!(pool.tokens.iter().all(|t| t.address.is_empty()));
        assert_eq!(report.tokens_skipped, 3);
        assert_eq!(report.nonstandard_addresses, 0);
    }

    #[test]
    fn test_nonstandard_addresses_counted() {
        let mut report = ValidationReport::default();
        let raw = json!([{
            "id": "p1",
            "tokens": [
                {"address": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "symbol": "WETH"},
                {"address": "native", "symbol": "ETH"}
            ],
            "protocol_system": "vm:balancer"
        }]);
        parse_pools(&raw, &mut report);
        assert_eq!(report.nonstandard_addresses, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn test_non_collection_pools_field() {
        let mut report = ValidationReport::default();
        let pools = parse_pools(&json!("nope"), &mut report);
        assert!(pools.is_empty());
        assert_eq!(report.pools_seen, 0);
    }
}
