/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines [UploadedCode], a contract binary compiled by [wasmer] together with what the chain
//! learned about it at upload.

use sha2::{Digest, Sha256};

use crate::{
    contract::{
        self,
        wasmer::{env::Env, store, tunables::MemoryLimit},
        AbiVersion, MocknetHostFunctions,
    },
    error::MocknetError,
    types::UploadedCodeInfo,
};

/// UploadedCode is immutable once created. Every contract instantiated from it gets its own
/// [wasmer::Instance] of the same compiled module.
pub struct UploadedCode {
    code_id: u64,
    code_hash: String,
    bytes: Vec<u8>,
    abi: AbiVersion,
    module: wasmer::Module,
}

impl UploadedCode {
    /// compiles `bytes` and detects the ABI generation from the module's exported functions. With a
    /// `memory_limit`, a module exporting a memory that starts above the limit is refused.
    pub(crate) fn compile(
        code_id: u64,
        bytes: Vec<u8>,
        memory_limit: Option<usize>,
    ) -> Result<Self, MocknetError> {
        if bytes.is_empty() {
            return Err(MocknetError::EmptyBinary);
        }
        let memory_limit = memory_limit.map(MemoryLimit::from_bytes);
        let store = store::instantiate_store(memory_limit);
        let module = wasmer::Module::from_binary(&store, &bytes)
            .map_err(|e| MocknetError::ModuleCompilationFailed(e.to_string()))?;
        if let Some(limit) = memory_limit {
            for memory in module.exports().memories() {
                limit.admit(memory.ty())?;
            }
        }
        let exports: Vec<String> = module
            .exports()
            .functions()
            .map(|f| f.name().to_string())
            .collect();
        let abi = AbiVersion::detect(exports.iter().map(String::as_str))?;

        Ok(Self {
            code_id,
            code_hash: code_hash(&bytes),
            bytes,
            abi,
            module,
        })
    }

    pub fn code_id(&self) -> u64 {
        self.code_id
    }

    pub fn code_hash(&self) -> &str {
        &self.code_hash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn abi(&self) -> AbiVersion {
        self.abi
    }

    pub fn info(&self) -> UploadedCodeInfo {
        UploadedCodeInfo {
            code_id: self.code_id,
            code_hash: self.code_hash.clone(),
            abi: self.abi,
        }
    }

    /// links a new instance of the module against the host functions bound to `env`.
    pub(crate) fn instantiate(&self, env: &Env) -> Result<wasmer::Instance, MocknetError> {
        let importable = contract::create_importable::<Env, MocknetHostFunctions>(
            self.module.store(),
            env,
            self.abi,
        );
        wasmer::Instance::new(&self.module, &importable)
            .map_err(|e| MocknetError::InstantiationFailed(e.to_string()))
    }
}

/// hex encoded SHA-256 of a contract binary.
pub fn code_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
