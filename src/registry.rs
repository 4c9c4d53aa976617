/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines [Mocknet], the registry of uploaded code and live contracts of one mock chain.
//!
//! Instantiate and execute run the contract, then dispatch the instantiate and execute sub-messages
//! it returned, with the contract itself as sender. Dispatch recurses through [ChainState] with an
//! explicit depth, and fails with [MocknetError::CallbackDepthExceeded] once the depth goes beyond
//! [MocknetConfig::max_callback_depth]. Queries contracts issue to each other are counted separately
//! against [MocknetConfig::max_query_depth].
//!
//! Example:
//!
//! ```no_run
//! # async fn run(wasm: Vec<u8>) -> Result<(), mocknet::MocknetError> {
//! use mocknet::{InstantiateRequest, Mocknet, MocknetConfig};
//! use serde_json::json;
//!
//! let mocknet = Mocknet::new(MocknetConfig::new().set_chain_id("pulsar-3"));
//! let code = mocknet.upload(wasm).await?;
//! let contract = mocknet
//!     .instantiate("secret1sender", InstantiateRequest::new(code.code_id, "counter", json!({ "count": 0 })))
//!     .await?;
//! let count = mocknet.query(&contract, &json!({ "get_count": {} })).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    config::MocknetConfig,
    contract::{BlockEnv, ContractInstance, SubMessage, UploadedCode},
    crypto,
    error::MocknetError,
    types::{
        BlockInfo, CallbackMessage, Coin, ContractRecord, ContractRef, ExecuteOptions, InstantiateRequest,
        UploadedCodeInfo,
    },
};

/// Mocknet is the handle a chain connector drives. Clones share the same chain; separate calls to
/// [Mocknet::new] create chains that know nothing of each other.
#[derive(Clone)]
pub struct Mocknet {
    chain: Arc<ChainState>,
}

impl Default for Mocknet {
    fn default() -> Self {
        Self::new(MocknetConfig::default())
    }
}

impl Mocknet {
    pub fn new(config: MocknetConfig) -> Self {
        Self {
            chain: ChainState::new(config),
        }
    }

    pub fn config(&self) -> &MocknetConfig {
        &self.chain.config
    }

    /// compiles and stores a contract binary under a fresh code id.
    pub async fn upload(&self, bytes: impl Into<Vec<u8>>) -> Result<UploadedCodeInfo, MocknetError> {
        self.chain.upload(bytes.into())
    }

    /// creates a contract from uploaded code, runs its init entry point and dispatches the
    /// sub-messages it returns.
    pub async fn instantiate(
        &self,
        sender: &str,
        request: InstantiateRequest,
    ) -> Result<ContractRecord, MocknetError> {
        let code_id = request.code_id.ok_or(MocknetError::MissingCodeId)?;
        let init_msg = request.init_msg.ok_or(MocknetError::MissingInitMsg)?;
        let msg = init_msg.to_string().into_bytes();
        self.chain.instantiate(
            sender,
            code_id,
            request.code_hash.as_deref(),
            request.label,
            &msg,
            &request.funds,
            0,
        )
    }

    /// runs the execute entry point of a contract and dispatches the sub-messages it returns. The
    /// result is the contract's response with its `data` decoded.
    pub async fn execute(
        &self,
        sender: &str,
        contract: impl Into<ContractRef>,
        msg: &Value,
        options: ExecuteOptions,
    ) -> Result<Value, MocknetError> {
        let contract = contract.into();
        let address = contract.address().ok_or(MocknetError::MissingAddress)?;
        self.chain
            .execute(sender, address, &msg.to_string().into_bytes(), &options.funds, 0)
    }

    pub async fn query(&self, contract: impl Into<ContractRef>, msg: &Value) -> Result<Value, MocknetError> {
        let contract = contract.into();
        let address = contract.address().ok_or(MocknetError::MissingAddress)?;
        let instance = self.chain.contract(address)?;
        instance.query(self.chain.block_env(), &msg.to_string().into_bytes())
    }

    /// looks up a live contract.
    pub fn get_contract(&self, contract: impl Into<ContractRef>) -> Result<Arc<ContractInstance>, MocknetError> {
        let contract = contract.into();
        let address = contract.address().ok_or(MocknetError::MissingAddress)?;
        self.chain
            .contracts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| MocknetError::UnknownAddress(address.to_string()))
    }

    pub fn code(&self, code_id: u64) -> Option<UploadedCodeInfo> {
        self.chain.codes.lock().unwrap().get(&code_id).map(|code| code.info())
    }

    /// records of every contract, ordered by address.
    pub fn contracts(&self) -> Vec<ContractRecord> {
        self.chain.records.lock().unwrap().values().cloned().collect()
    }

    pub fn record(&self, address: &str) -> Option<ContractRecord> {
        self.chain.records.lock().unwrap().get(address).cloned()
    }

    pub fn block(&self) -> BlockInfo {
        *self.chain.block.lock().unwrap()
    }

    /// moves to the next block, `seconds` later than the current one.
    pub fn advance_block(&self, seconds: u64) -> BlockInfo {
        let mut block = self.chain.block.lock().unwrap();
        block.height += 1;
        block.time += seconds;
        *block
    }
}

/// ChainState holds the code and contracts of a chain. Locks are only held to look something up or
/// to insert it, never while a contract runs.
pub struct ChainState {
    this: Weak<ChainState>,
    config: MocknetConfig,
    block: Mutex<BlockInfo>,
    codes: Mutex<BTreeMap<u64, Arc<UploadedCode>>>,
    contracts: Mutex<BTreeMap<String, Arc<ContractInstance>>>,
    records: Mutex<BTreeMap<String, ContractRecord>>,
    next_code_id: AtomicU64,
    nonce: AtomicU64,
    /// Nesting of cross-contract queries currently running.
    query_depth: AtomicUsize,
}

impl ChainState {
    fn new(config: MocknetConfig) -> Arc<ChainState> {
        Arc::new_cyclic(|this| ChainState {
            this: this.clone(),
            block: Mutex::new(BlockInfo {
                height: config.genesis_height,
                time: config.genesis_time,
            }),
            config,
            codes: Mutex::new(BTreeMap::new()),
            contracts: Mutex::new(BTreeMap::new()),
            records: Mutex::new(BTreeMap::new()),
            next_code_id: AtomicU64::new(1),
            nonce: AtomicU64::new(0),
            query_depth: AtomicUsize::new(0),
        })
    }

    /// chain id and current block, as seen by a call starting now.
    fn block_env(&self) -> BlockEnv<'_> {
        let block = *self.block.lock().unwrap();
        BlockEnv {
            chain_id: &self.config.chain_id,
            height: block.height,
            time: block.time,
        }
    }

    fn upload(&self, bytes: Vec<u8>) -> Result<UploadedCodeInfo, MocknetError> {
        if bytes.is_empty() {
            return Err(MocknetError::EmptyBinary);
        }
        let code_id = self.next_code_id.fetch_add(1, Ordering::SeqCst);
        let code = UploadedCode::compile(code_id, bytes, self.config.memory_limit)?;
        let info = code.info();
        tracing::info!(code_id, code_hash = %info.code_hash, abi = ?info.abi, "uploaded code");
        self.codes.lock().unwrap().insert(code_id, Arc::new(code));
        Ok(info)
    }

    fn code(&self, code_id: u64) -> Result<Arc<UploadedCode>, MocknetError> {
        self.codes
            .lock()
            .unwrap()
            .get(&code_id)
            .cloned()
            .ok_or(MocknetError::CodeNotFound(code_id))
    }

    fn contract(&self, address: &str) -> Result<Arc<ContractInstance>, MocknetError> {
        self.contracts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| MocknetError::ContractNotFound(address.to_string()))
    }

    /// derives an address no contract of this chain has.
    fn new_address(&self, code_id: u64) -> Result<String, MocknetError> {
        loop {
            let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
            let digest = Sha256::new()
                .chain_update(b"mocknet/contract")
                .chain_update(code_id.to_be_bytes())
                .chain_update(nonce.to_be_bytes())
                .finalize();
            let address = crypto::humanize_address(&digest[..20], &self.config.bech32_prefix)?;
            if !self.contracts.lock().unwrap().contains_key(&address) {
                return Ok(address);
            }
        }
    }

    fn check_depth(&self, depth: usize) -> Result<(), MocknetError> {
        if depth > self.config.max_callback_depth {
            return Err(MocknetError::CallbackDepthExceeded {
                limit: self.config.max_callback_depth,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &self,
        sender: &str,
        code_id: u64,
        code_hash: Option<&str>,
        label: String,
        msg: &[u8],
        funds: &[Coin],
        depth: usize,
    ) -> Result<ContractRecord, MocknetError> {
        self.check_depth(depth)?;
        if sender.is_empty() {
            return Err(MocknetError::MissingSender);
        }
        let code = self.code(code_id)?;
        if let Some(expected) = code_hash {
            if !expected.eq_ignore_ascii_case(code.code_hash()) {
                tracing::warn!(
                    code_id,
                    expected,
                    actual = code.code_hash(),
                    "code hash does not match the uploaded code"
                );
            }
        }

        let address = self.new_address(code_id)?;
        let instance = Arc::new(ContractInstance::new(
            &code,
            address.clone(),
            label.clone(),
            self.config.bech32_prefix.clone(),
            self.this.clone(),
        )?);
        // reachable by its own sub-messages and queries while it initializes
        self.contracts.lock().unwrap().insert(address.clone(), instance.clone());

        let result = instance
            .init(self.block_env(), sender, msg, funds)
            .and_then(|response| self.dispatch(&address, response.messages, depth));
        if let Err(e) = result {
            self.contracts.lock().unwrap().remove(&address);
            return Err(e);
        }

        let record = ContractRecord {
            address: address.clone(),
            code_id,
            code_hash: code.code_hash().to_string(),
            label,
            init_by: sender.to_string(),
        };
        tracing::info!(address = %address, code_id, sender, depth, "instantiated contract");
        self.records.lock().unwrap().insert(address, record.clone());
        Ok(record)
    }

    fn execute(
        &self,
        sender: &str,
        address: &str,
        msg: &[u8],
        funds: &[Coin],
        depth: usize,
    ) -> Result<Value, MocknetError> {
        self.check_depth(depth)?;
        let instance = self.contract(address)?;
        let response = instance.execute(self.block_env(), sender, msg, funds)?;
        tracing::info!(address, sender, depth, "executed contract");
        self.dispatch(address, response.messages.clone(), depth)?;
        Ok(response.decoded())
    }

    /// runs every sub-message of `emitter`, in order, one level deeper.
    fn dispatch(&self, emitter: &str, messages: Vec<SubMessage>, depth: usize) -> Result<(), MocknetError> {
        for message in messages {
            match message {
                SubMessage::Callback(CallbackMessage::Instantiate {
                    code_id,
                    code_hash,
                    label,
                    msg,
                    funds,
                }) => {
                    self.instantiate(
                        emitter,
                        code_id,
                        Some(&code_hash),
                        label.unwrap_or_default(),
                        &msg,
                        &funds,
                        depth + 1,
                    )?;
                }
                SubMessage::Callback(CallbackMessage::Execute {
                    contract_addr,
                    code_hash,
                    msg,
                    funds,
                }) => {
                    if let Ok(target) = self.contract(&contract_addr) {
                        if !code_hash.eq_ignore_ascii_case(target.code_hash()) {
                            tracing::warn!(
                                address = %contract_addr,
                                expected = %code_hash,
                                "callback code hash does not match the target contract"
                            );
                        }
                    }
                    self.execute(emitter, &contract_addr, &msg, &funds, depth + 1)?;
                }
                SubMessage::Ignored(message) => {
                    tracing::warn!(emitter, %message, "ignoring sub-message the mock chain does not route");
                }
            }
        }
        Ok(())
    }

    /// serves a smart query issued by a running contract and returns the undecoded `Ok` payload.
    pub(crate) fn query_from_contract(&self, address: &str, msg: &[u8]) -> Result<Value, MocknetError> {
        let _guard = QueryDepthGuard::enter(&self.query_depth, self.config.max_query_depth)?;
        let instance = self.contract(address)?;
        instance.query_raw(self.block_env(), msg)
    }
}

/// Counts a nested query for as long as it lives.
struct QueryDepthGuard<'a>(&'a AtomicUsize);

impl<'a> QueryDepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize, limit: usize) -> Result<Self, MocknetError> {
        let guard = QueryDepthGuard(depth);
        if depth.fetch_add(1, Ordering::SeqCst) + 1 > limit {
            return Err(MocknetError::QueryDepthExceeded { limit });
        }
        Ok(guard)
    }
}

impl<'a> Drop for QueryDepthGuard<'a> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
