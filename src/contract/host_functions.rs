/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definition of host functions that are imported by CosmWasm contracts.
//!
//! Every argument is a pointer to a [region](crate::contract::wasmer::memory::Region) in guest
//! memory. Verification functions return `0` for a valid signature, `1` for an invalid one and an
//! error code otherwise. Functions producing bytes return a `u64` whose low half is a region pointer
//! on success and whose high half is an error code on failure. Address functions return `0` on
//! success, otherwise a pointer to a region holding the error message.

use wasmer::{Exports, Function, ImportObject, Store};

use crate::contract::{wasmer::memory::Region, AbiVersion, HostCall};
use crate::error::MocknetError;

pub trait HostFunctions<T>
where
    T: wasmer::WasmerEnv,
{
    /// Reads the value stored under the key in the contract's own storage. Returns `0` if the key is
    /// absent.
    fn db_read(env: &T, key_ptr: u32) -> Result<u32, HostError>;

    fn db_write(env: &T, key_ptr: u32, value_ptr: u32) -> Result<(), HostError>;

    fn db_remove(env: &T, key_ptr: u32) -> Result<(), HostError>;

    /// Serves a query request against another contract of the chain and returns a pointer to the
    /// serialized system result.
    fn query_chain(env: &T, request_ptr: u32) -> Result<u32, HostError>;

    /// Forwards a message of the guest to the host's log.
    fn debug(env: &T, message_ptr: u32) -> Result<(), HostError>;

    fn addr_validate(env: &T, source_ptr: u32) -> Result<u32, HostError>;

    fn addr_canonicalize(env: &T, source_ptr: u32, destination_ptr: u32) -> Result<u32, HostError>;

    fn addr_humanize(env: &T, source_ptr: u32, destination_ptr: u32) -> Result<u32, HostError>;

    fn secp256k1_verify(
        env: &T,
        hash_ptr: u32,
        signature_ptr: u32,
        public_key_ptr: u32,
    ) -> Result<u32, HostError>;

    fn secp256k1_recover_pubkey(
        env: &T,
        hash_ptr: u32,
        signature_ptr: u32,
        recovery_param: u32,
    ) -> Result<u64, HostError>;

    fn secp256k1_sign(env: &T, message_ptr: u32, private_key_ptr: u32) -> Result<u64, HostError>;

    fn ed25519_verify(
        env: &T,
        message_ptr: u32,
        signature_ptr: u32,
        public_key_ptr: u32,
    ) -> Result<u32, HostError>;

    /// Arguments are lists of byte arrays in the sections encoding.
    fn ed25519_batch_verify(
        env: &T,
        messages_ptr: u32,
        signatures_ptr: u32,
        public_keys_ptr: u32,
    ) -> Result<u32, HostError>;

    fn ed25519_sign(env: &T, message_ptr: u32, private_key_ptr: u32) -> Result<u64, HostError>;
}

/// builds the `env` import namespace of a contract. Which host functions are offered and under
/// which names is decided by the ABI generation.
pub(crate) fn create_importable<T, K>(store: &Store, env: &T, abi: AbiVersion) -> ImportObject
where
    T: wasmer::WasmerEnv + 'static,
    K: HostFunctions<T> + 'static,
{
    let mut exports = Exports::new();
    for (name, call) in abi.imports() {
        let function = match call {
            HostCall::DbRead => Function::new_native_with_env(store, env.clone(), K::db_read),
            HostCall::DbWrite => Function::new_native_with_env(store, env.clone(), K::db_write),
            HostCall::DbRemove => Function::new_native_with_env(store, env.clone(), K::db_remove),
            HostCall::QueryChain => Function::new_native_with_env(store, env.clone(), K::query_chain),
            HostCall::Debug => Function::new_native_with_env(store, env.clone(), K::debug),
            HostCall::AddrValidate => Function::new_native_with_env(store, env.clone(), K::addr_validate),
            HostCall::AddrCanonicalize => Function::new_native_with_env(store, env.clone(), K::addr_canonicalize),
            HostCall::AddrHumanize => Function::new_native_with_env(store, env.clone(), K::addr_humanize),
            HostCall::Secp256k1Verify => Function::new_native_with_env(store, env.clone(), K::secp256k1_verify),
            HostCall::Secp256k1RecoverPubkey => {
                Function::new_native_with_env(store, env.clone(), K::secp256k1_recover_pubkey)
            }
            HostCall::Secp256k1Sign => Function::new_native_with_env(store, env.clone(), K::secp256k1_sign),
            HostCall::Ed25519Verify => Function::new_native_with_env(store, env.clone(), K::ed25519_verify),
            HostCall::Ed25519BatchVerify => {
                Function::new_native_with_env(store, env.clone(), K::ed25519_batch_verify)
            }
            HostCall::Ed25519Sign => Function::new_native_with_env(store, env.clone(), K::ed25519_sign),
        };
        exports.insert(name, function);
    }

    let mut import_object = ImportObject::new();
    import_object.register("env", exports);
    import_object
}

/// Failures of a host function. Returning one traps the guest; the host recovers it from the
/// trap after the call.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{size} bytes do not fit into a region of capacity {capacity}")]
    RegionOverflow { size: usize, capacity: u32 },

    #[error("{len} bytes at {ptr} are out of guest memory bounds")]
    MemoryAccess { ptr: u32, len: u32 },

    #[error("region {0:?} is longer than its capacity")]
    MalformedRegion(Region),

    #[error("cannot pass an undefined value to the guest")]
    UndefinedValue,

    #[error("region does not hold valid UTF-8")]
    InvalidUtf8,

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("malformed sections encoding")]
    MalformedSections,

    #[error("guest does not export `{0}`")]
    MissingExport(&'static str),

    #[error("registry is no longer available")]
    ChainUnavailable,

    #[error("guest call failed: {0}")]
    Runtime(String),

    /// A nested contract call failed in a way that must abort the outer call as well.
    #[error(transparent)]
    Nested(Box<MocknetError>),
}

impl From<wasmer::RuntimeError> for HostError {
    fn from(error: wasmer::RuntimeError) -> Self {
        HostError::Runtime(error.message())
    }
}
