//! Token and pool records as delivered by the pool data source
//!
//! Pools arrive wholesale with every snapshot. Nothing in this crate mutates
//! them after validation; everything downstream is a projection.

use alloy_primitives::{Address, BlockNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Pools of one snapshot keyed by pool id
pub type PoolMap = BTreeMap<String, Pool>;

/// A tradable asset as referenced by a pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Token address. May be empty when the source does not know it.
    #[serde(default)]
    pub address: String,

    /// Ticker symbol, not unique across tokens
    pub symbol: String,
}

impl Token {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            symbol: symbol.into(),
        }
    }

    /// Symbol plus abbreviated address, e.g. `WETH (0xC0..c2)`
    pub fn formatted_label(&self) -> String {
        format_token_label(&self.symbol, &self.address)
    }

    /// True when the address parses as a 20-byte hex address
    pub fn has_hex_address(&self) -> bool {
        Address::from_str(&self.address).is_ok()
    }
}

/// A liquidity pool instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,

    /// Tokens in pool order. Usually two, not limited to two.
    pub tokens: Vec<Token>,

    /// Protocol / DEX implementation owning the pool (e.g. `uniswap_v3`)
    pub protocol_system: String,

    /// Block of the last observed state change
    #[serde(
        rename = "lastUpdatedAtBlock",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated_at_block: Option<BlockNumber>,
}

impl Pool {
    pub fn new(id: impl Into<String>, protocol_system: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            id: id.into(),
            tokens,
            protocol_system: protocol_system.into(),
            last_updated_at_block: None,
        }
    }

    pub fn with_block(mut self, block: BlockNumber) -> Self {
        self.last_updated_at_block = Some(block);
        self
    }
}

/// Build the display label for a token.
///
/// Takes the two characters after the `0x` prefix and the last two
/// characters of the address. When both are present the label is
/// `"{symbol} (0x{first}..{last})"`, otherwise just the symbol. Slicing is
/// clamped to the string bounds and counted in characters, so short or odd
/// addresses never panic.
pub fn format_token_label(symbol: &str, address: &str) -> String {
    if address.is_empty() {
        return symbol.to_string();
    }

    let chars: Vec<char> = address.chars().collect();
    let first: String = chars.iter().skip(2).take(2).collect();
    let last: String = chars[chars.len().saturating_sub(2)..].iter().collect();

    if !first.is_empty() && !last.is_empty() {
        format!("{} (0x{}..{})", symbol, first, last)
    } else {
        symbol.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_long_address() {
        assert_eq!(
            format_token_label("FOO", "0xABCDEF1234567890abcdef"),
            "FOO (0xAB..ef)"
        );
    }

    #[test]
    fn test_label_empty_address() {
        assert_eq!(format_token_label("BAR", ""), "BAR");
    }

    #[test]
    fn test_label_short_addresses() {
        // Nothing after the prefix
        assert_eq!(format_token_label("X", "0x"), "X");
        // Clamped slices overlap on tiny addresses
        assert_eq!(format_token_label("A", "0xAA"), "A (0xAA..AA)");
        assert_eq!(format_token_label("B", "0xB"), "B (0xB..xB)");
    }

    #[test]
    fn test_label_non_ascii_does_not_panic() {
        assert_eq!(format_token_label("Ω", "0xΩΩΩΩ"), "Ω (0xΩΩ..ΩΩ)");
    }

    #[test]
    fn test_hex_address_detection() {
        let weth = Token::new("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "WETH");
        assert!(weth.has_hex_address());
        assert_eq!(weth.formatted_label(), "WETH (0xC0..c2)");

        let odd = Token::new("native", "ETH");
        assert!(!odd.has_hex_address());
    }

    #[test]
    fn test_pool_json_field_names() {
        let json = r#"{
            "id": "p1",
            "tokens": [{"address": "0xAA", "symbol": "A"}, {"symbol": "B"}],
            "protocol_system": "uniswap_v2",
            "lastUpdatedAtBlock": 42
        }"#;
        let pool: Pool = serde_json::from_str(json).unwrap();
        assert_eq!(pool.last_updated_at_block, Some(42));
        assert_eq!(pool.tokens[1].address, "");
        assert_eq!(pool.tokens[0].address, "0xAA");
    }
}
