/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines environment used for constructing the Wasm (specifically Wasmer) instance of a contract.
//!
//! The environment (Env) is what every host function receives. It scopes storage access to the one
//! contract that owns it and carries a back-reference to the chain for cross-contract queries.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use wasmer::{LazyInit, Memory, NativeFunc};

use crate::contract::{AbiVersion, HostError};
use crate::registry::ChainState;

use super::memory::MemoryContext;

/// Key-value storage of a single contract.
pub type Storage = BTreeMap<Vec<u8>, Vec<u8>>;

/// Env provides the functions in the import table access to state that cannot cross the host-WASM
/// barrier. Wasmer clones it into every imported function and fills the lazily initialized exports
/// when the instance is created.
#[derive(wasmer::WasmerEnv, Clone)]
pub struct Env {
    /// Address of the contract the instance belongs to.
    pub address: String,

    /// Prefix of human readable addresses, shared by the whole chain.
    pub bech32_prefix: String,

    /// ABI generation of the contract, which decides the shape of replies written to it.
    pub abi: AbiVersion,

    /// Storage of this contract. Never shared with another instance.
    pub storage: Arc<Mutex<Storage>>,

    /// Chain the contract lives in. Weak so that instances do not keep the chain alive.
    pub chain: Weak<ChainState>,

    #[wasmer(export)]
    pub memory: LazyInit<Memory>,

    #[wasmer(export(name = "allocate"))]
    pub allocate: LazyInit<NativeFunc<u32, u32>>,

    #[wasmer(export(optional = true, name = "deallocate"))]
    pub deallocate: LazyInit<NativeFunc<u32, ()>>,
}

impl Env {
    pub fn new(address: String, bech32_prefix: String, abi: AbiVersion, chain: Weak<ChainState>) -> Env {
        Env {
            address,
            bech32_prefix,
            abi,
            storage: Arc::new(Mutex::new(Storage::new())),
            chain,
            memory: LazyInit::default(),
            allocate: LazyInit::default(),
            deallocate: LazyInit::default(),
        }
    }

    pub fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.storage.lock().unwrap().get(key).cloned()
    }

    pub fn storage_set(&self, key: Vec<u8>, value: Vec<u8>) {
        self.storage.lock().unwrap().insert(key, value);
    }

    pub fn storage_remove(&self, key: &[u8]) {
        self.storage.lock().unwrap().remove(key);
    }

    /// the chain, as long as the registry that created this contract is alive.
    pub fn chain(&self) -> Result<Arc<ChainState>, HostError> {
        self.chain.upgrade().ok_or(HostError::ChainUnavailable)
    }
}

impl MemoryContext for Env {
    fn get_memory(&self) -> Result<&Memory, HostError> {
        self.memory_ref().ok_or(HostError::MissingExport("memory"))
    }

    fn get_allocate(&self) -> Result<&NativeFunc<u32, u32>, HostError> {
        self.allocate_ref().ok_or(HostError::MissingExport("allocate"))
    }

    fn get_deallocate(&self) -> Option<&NativeFunc<u32, ()>> {
        self.deallocate_ref()
    }
}
