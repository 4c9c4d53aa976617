/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines common data structures to be used inside this library, or from outside application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::AbiVersion;

/// Amount of a native token, as CosmWasm serializes it (the amount is a decimal string).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }
}

/// Height and time of the block every contract call is executed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    /// Seconds since the epoch.
    pub time: u64,
}

/// What the registry reports back after a successful upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedCodeInfo {
    pub code_id: u64,
    /// Hex encoded SHA-256 of the uploaded bytes.
    pub code_hash: String,
    pub abi: AbiVersion,
}

/// A contract created by a successful instantiate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: String,
    pub code_id: u64,
    pub code_hash: String,
    pub label: String,
    /// Sender of the instantiate. For contracts created by a sub-message, the emitting contract.
    pub init_by: String,
}

/// Parameters of an instantiate. Fields the registry cannot do without are optional so that
/// their absence is reported as an input error instead of being impossible to express.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstantiateRequest {
    pub code_id: Option<u64>,
    /// Code hash the caller expects. A mismatch is logged, not rejected.
    pub code_hash: Option<String>,
    pub label: String,
    pub init_msg: Option<Value>,
    #[serde(default)]
    pub funds: Vec<Coin>,
}

impl InstantiateRequest {
    pub fn new(code_id: u64, label: impl Into<String>, init_msg: Value) -> Self {
        Self {
            code_id: Some(code_id),
            code_hash: None,
            label: label.into(),
            init_msg: Some(init_msg),
            funds: Vec::new(),
        }
    }

    pub fn with_code_hash(mut self, code_hash: impl Into<String>) -> Self {
        self.code_hash = Some(code_hash.into());
        self
    }

    pub fn with_funds(mut self, funds: Vec<Coin>) -> Self {
        self.funds = funds;
        self
    }
}

/// Anything that can name a contract: a bare address, or a record carrying one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractRef {
    pub address: Option<String>,
    pub code_hash: Option<String>,
}

impl From<&str> for ContractRef {
    fn from(address: &str) -> Self {
        Self {
            address: Some(address.to_string()),
            code_hash: None,
        }
    }
}

impl From<String> for ContractRef {
    fn from(address: String) -> Self {
        Self {
            address: Some(address),
            code_hash: None,
        }
    }
}

impl From<&ContractRecord> for ContractRef {
    fn from(record: &ContractRecord) -> Self {
        Self {
            address: Some(record.address.clone()),
            code_hash: Some(record.code_hash.clone()),
        }
    }
}

impl ContractRef {
    /// the address, if one is present and non-empty.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref().filter(|address| !address.is_empty())
    }
}

/// Options of an execute.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub funds: Vec<Coin>,
}

/// A sub-message asking the host to instantiate or execute on behalf of the emitting contract.
/// It only lives as long as the dispatch loop that consumes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackMessage {
    Instantiate {
        code_id: u64,
        code_hash: String,
        label: Option<String>,
        msg: Vec<u8>,
        funds: Vec<Coin>,
    },
    Execute {
        contract_addr: String,
        code_hash: String,
        msg: Vec<u8>,
        funds: Vec<Coin>,
    },
}
