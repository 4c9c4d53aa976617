/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the configuration a chain connector supplies when it creates a [Mocknet](crate::Mocknet).

use serde::{Deserialize, Serialize};

/// Chain id used when the connector does not supply one.
pub const DEFAULT_CHAIN_ID: &str = "mocknet";

/// Bech32 prefix used when the connector does not supply one.
pub const DEFAULT_BECH32_PREFIX: &str = "secret";

/// Depth at which nested sub-messages stop being dispatched.
pub const DEFAULT_MAX_CALLBACK_DEPTH: usize = 16;

/// Depth at which nested `query_chain` calls stop being served.
pub const DEFAULT_MAX_QUERY_DEPTH: usize = 16;

/// Block time of the first block, in seconds since the epoch.
pub const DEFAULT_GENESIS_TIME: u64 = 1_600_000_000;

/// MocknetConfig holds the registry-wide settings of a mock chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MocknetConfig {
    /// Value of `env.block.chain_id`.
    pub chain_id: String,
    /// Human readable part of every address produced and accepted by the chain.
    pub bech32_prefix: String,
    /// Maximum nesting of sub-message dispatch.
    pub max_callback_depth: usize,
    /// Maximum nesting of cross-contract queries. Independent of sub-message dispatch.
    pub max_query_depth: usize,
    /// Upper bound of guest linear memory in bytes. Unbounded if None.
    pub memory_limit: Option<usize>,
    /// Height of the first block.
    pub genesis_height: u64,
    /// Time of the first block, in seconds.
    pub genesis_time: u64,
}

impl Default for MocknetConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            bech32_prefix: DEFAULT_BECH32_PREFIX.to_string(),
            max_callback_depth: DEFAULT_MAX_CALLBACK_DEPTH,
            max_query_depth: DEFAULT_MAX_QUERY_DEPTH,
            memory_limit: None,
            genesis_height: 1,
            genesis_time: DEFAULT_GENESIS_TIME,
        }
    }
}

impl MocknetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// specify the chain id exposed to contracts in `env.block.chain_id`.
    pub fn set_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    /// specify the bech32 prefix of addresses.
    pub fn set_bech32_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bech32_prefix = prefix.into();
        self
    }

    /// specify how deep sub-messages may recurse before dispatch fails.
    pub fn set_max_callback_depth(mut self, depth: usize) -> Self {
        self.max_callback_depth = depth;
        self
    }

    /// specify how deep contracts may query each other through `query_chain`.
    pub fn set_max_query_depth(mut self, depth: usize) -> Self {
        self.max_query_depth = depth;
        self
    }

    /// specify the limit to wasm linear memory in contract execution.
    pub fn set_memory_limit(mut self, memory_limit: usize) -> Self {
        self.memory_limit = Some(memory_limit);
        self
    }

    /// specify height and time of the first block.
    pub fn set_genesis(mut self, height: u64, time: u64) -> Self {
        self.genesis_height = height;
        self.genesis_time = time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: MocknetConfig =
            serde_json::from_str(r#"{"chain_id":"pulsar-3","max_callback_depth":4}"#).unwrap();
        assert_eq!(config.chain_id, "pulsar-3");
        assert_eq!(config.max_callback_depth, 4);
        assert_eq!(config.max_query_depth, DEFAULT_MAX_QUERY_DEPTH);
        assert_eq!(config.bech32_prefix, DEFAULT_BECH32_PREFIX);
        assert_eq!(config.memory_limit, None);
    }

    #[test]
    fn setters_chain() {
        let config = MocknetConfig::new()
            .set_bech32_prefix("terra")
            .set_memory_limit(1 << 24)
            .set_max_callback_depth(0)
            .set_max_query_depth(2)
            .set_genesis(100, 42);
        assert_eq!(config.bech32_prefix, "terra");
        assert_eq!(config.memory_limit, Some(1 << 24));
        assert_eq!((config.max_callback_depth, config.max_query_depth), (0, 2));
        assert_eq!((config.genesis_height, config.genesis_time), (100, 42));
    }
}
