/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Mocknet is an in-process host for CosmWasm smart contracts. It loads compiled contract binaries
//! and executes them the way a node's WASM runtime would, without a network, consensus or a remote
//! node.
//!
//! ```text
//! upload(wasm)                 -> code id, code hash, ABI generation
//! instantiate(sender, request) -> contract record (address, code id, label, ...)
//! execute(sender, contract)    -> response, after its sub-messages were dispatched
//! query(contract)              -> decoded query result
//! ```
//!
//! ### Example
//!
//! ```rust
//! let mocknet = mocknet::Mocknet::new(mocknet::MocknetConfig::new());
//! let code = mocknet.upload(wasm).await?;
//! ```
//!
//! The [registry] owns the uploaded code and the live contracts. A [contract] is an instance of a
//! compiled module, linked against host functions for storage, cross-contract queries and the
//! [crypto] primitives, and exchanging data with the guest through regions of its linear memory.
//! Two ABI generations are supported ([AbiVersion]). Failures are reported as [MocknetError].

pub mod config;
pub use config::MocknetConfig;

pub mod contract;
pub use contract::{AbiVersion, ContractInstance};

pub mod crypto;

pub mod error;
pub use error::MocknetError;

pub mod registry;
pub use registry::Mocknet;

pub mod types;
pub use types::{BlockInfo, Coin, ContractRecord, ContractRef, ExecuteOptions, InstantiateRequest, UploadedCodeInfo};
