/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! error defines the errors a caller of the mock chain can observe.
//!
//! The variants are grouped the way they are produced: invalid input from the caller, ABI
//! violations by the guest module (or the host), errors returned by the guest itself, failed
//! lookups, and exceeded limits.

use serde_json::Value;

use crate::{contract::HostError, crypto::CryptoError};

/// Descriptive error definitions of a Mocknet operation.
#[derive(Debug, thiserror::Error)]
pub enum MocknetError {
    /// Upload was called with zero bytes.
    #[error("cannot upload an empty binary")]
    EmptyBinary,

    /// Instantiate request without a code id.
    #[error("instantiate requires a code id")]
    MissingCodeId,

    /// Instantiate request without an init message.
    #[error("instantiate requires an init message")]
    MissingInitMsg,

    /// A call that builds `env.message` or `info` was made without a sender.
    #[error("contract call requires a sender")]
    MissingSender,

    /// The contract has no code hash to put into `env`.
    #[error("contract call requires a code hash")]
    MissingCodeHash,

    /// No contract address could be resolved from the reference.
    #[error("no contract address could be resolved")]
    MissingAddress,

    /// The engine could not compile the binary (it is probably invalid WASM).
    #[error("module compilation failed: {0}")]
    ModuleCompilationFailed(String),

    /// The module exports neither `instantiate` nor `init`.
    #[error("module exports neither `instantiate` nor `init`")]
    UnknownAbiGeneration,

    /// The module does not export the entry point the ABI generation requires.
    #[error("module does not export entry point `{0}`")]
    MissingEntryPoint(String),

    /// Linking the module against the host imports failed.
    #[error("module instantiation failed: {0}")]
    InstantiationFailed(String),

    /// A host function failed while serving the guest.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The guest trapped for a reason the host did not cause.
    #[error("guest trapped: {0}")]
    Trap(String),

    /// The guest returned something that is not a `{"Ok": ..}` / `{"Err": ..}` envelope.
    #[error("invalid response from {address}: {reason}")]
    InvalidResponse { address: String, reason: String },

    /// The guest returned `{"Err": ..}`. The payload is kept verbatim.
    #[error("{action} on {address} failed: {payload}")]
    ContractExecutionFailed {
        address: String,
        action: String,
        payload: Value,
    },

    /// No code was uploaded under this id.
    #[error("no code with id {0}")]
    CodeNotFound(u64),

    /// Execute targeted an address with no contract.
    #[error("no contract at {0}")]
    ContractNotFound(String),

    /// Lookup of an address with no contract.
    #[error("unknown address {0}")]
    UnknownAddress(String),

    /// Nested sub-messages went deeper than the configured limit.
    #[error("callback depth exceeded the limit of {limit}")]
    CallbackDepthExceeded { limit: usize },

    /// Cross-contract queries issued through `query_chain` nested deeper than the configured limit.
    #[error("query depth exceeded the limit of {limit}")]
    QueryDepthExceeded { limit: usize },

    /// The module declares more linear memory than the chain allows.
    #[error("module requires {requested} pages of memory, the limit is {limit}")]
    MemoryLimitExceeded { requested: u32, limit: u32 },

    /// Address codec or signature scheme failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<wasmer::RuntimeError> for MocknetError {
    fn from(error: wasmer::RuntimeError) -> Self {
        // recover the host error that caused the trap, if any
        match error.downcast::<HostError>() {
            Ok(HostError::Nested(inner)) => *inner,
            Ok(host_error) => MocknetError::Host(host_error),
            Err(error) => MocknetError::Trap(error.message()),
        }
    }
}
