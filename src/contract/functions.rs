/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An implementation of the host functions imported by contracts running on the mock chain.

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    contract::{
        wasmer::{
            env::Env,
            memory::{decode_sections, MemoryContext},
        },
        HostError, HostFunctions, QueryOutcome,
    },
    crypto::{self, CryptoError},
    error::MocknetError,
};

/// [MocknetHostFunctions] implements trait [HostFunctions] over an [Env].
pub(crate) struct MocknetHostFunctions {}

impl HostFunctions<Env> for MocknetHostFunctions {
    fn db_read(env: &Env, key_ptr: u32) -> Result<u32, HostError> {
        let key = env.read_bytes(key_ptr)?;
        match env.storage_get(&key) {
            Some(value) => env.pass_bytes(&value),
            None => Ok(0),
        }
    }

    fn db_write(env: &Env, key_ptr: u32, value_ptr: u32) -> Result<(), HostError> {
        let key = env.read_bytes(key_ptr)?;
        let value = env.read_bytes(value_ptr)?;
        tracing::trace!(address = %env.address, key = %String::from_utf8_lossy(&key), "db_write");
        env.storage_set(key, value);
        Ok(())
    }

    fn db_remove(env: &Env, key_ptr: u32) -> Result<(), HostError> {
        let key = env.read_bytes(key_ptr)?;
        env.storage_remove(&key);
        Ok(())
    }

    fn query_chain(env: &Env, request_ptr: u32) -> Result<u32, HostError> {
        let request = env.read_bytes(request_ptr)?;
        let response = query_chain_response(env, &request)?;
        env.pass_json(Some(&response))
    }

    fn debug(env: &Env, message_ptr: u32) -> Result<(), HostError> {
        let message = env.read_bytes(message_ptr)?;
        tracing::debug!(address = %env.address, "{}", String::from_utf8_lossy(&message));
        Ok(())
    }

    fn addr_validate(env: &Env, source_ptr: u32) -> Result<u32, HostError> {
        let source = env.read_bytes(source_ptr)?;
        let result = std::str::from_utf8(&source)
            .map_err(|_| CryptoError::InvalidAddress("address is not UTF-8".to_string()))
            .and_then(|human| crypto::validate_address(human, &env.bech32_prefix));
        match result {
            Ok(()) => Ok(0),
            Err(e) => env.pass_bytes(e.to_string().as_bytes()),
        }
    }

    fn addr_canonicalize(env: &Env, source_ptr: u32, destination_ptr: u32) -> Result<u32, HostError> {
        let source = env.read_bytes(source_ptr)?;
        let result = std::str::from_utf8(&source)
            .map_err(|_| CryptoError::InvalidAddress("address is not UTF-8".to_string()))
            .and_then(|human| crypto::canonicalize_address(human, &env.bech32_prefix));
        match result {
            Ok(canonical) => {
                env.write_bytes(destination_ptr, &canonical)?;
                Ok(0)
            }
            Err(e) => env.pass_bytes(e.to_string().as_bytes()),
        }
    }

    fn addr_humanize(env: &Env, source_ptr: u32, destination_ptr: u32) -> Result<u32, HostError> {
        let source = env.read_bytes(source_ptr)?;
        match crypto::humanize_address(&source, &env.bech32_prefix) {
            Ok(human) => {
                env.write_bytes(destination_ptr, human.as_bytes())?;
                Ok(0)
            }
            Err(e) => env.pass_bytes(e.to_string().as_bytes()),
        }
    }

    fn secp256k1_verify(
        env: &Env,
        hash_ptr: u32,
        signature_ptr: u32,
        public_key_ptr: u32,
    ) -> Result<u32, HostError> {
        let hash = env.read_bytes(hash_ptr)?;
        let signature = env.read_bytes(signature_ptr)?;
        let public_key = env.read_bytes(public_key_ptr)?;
        Ok(verification_code(crypto::secp256k1_verify(&hash, &signature, &public_key)))
    }

    fn secp256k1_recover_pubkey(
        env: &Env,
        hash_ptr: u32,
        signature_ptr: u32,
        recovery_param: u32,
    ) -> Result<u64, HostError> {
        let hash = env.read_bytes(hash_ptr)?;
        let signature = env.read_bytes(signature_ptr)?;
        let result = u8::try_from(recovery_param)
            .map_err(|_| CryptoError::InvalidRecoveryParam)
            .and_then(|param| crypto::secp256k1_recover_pubkey(&hash, &signature, param));
        pass_or_code(env, result)
    }

    fn secp256k1_sign(env: &Env, message_ptr: u32, private_key_ptr: u32) -> Result<u64, HostError> {
        let message = env.read_bytes(message_ptr)?;
        let private_key = env.read_bytes(private_key_ptr)?;
        pass_or_code(env, crypto::secp256k1_sign(&message, &private_key))
    }

    fn ed25519_verify(
        env: &Env,
        message_ptr: u32,
        signature_ptr: u32,
        public_key_ptr: u32,
    ) -> Result<u32, HostError> {
        let message = env.read_bytes(message_ptr)?;
        let signature = env.read_bytes(signature_ptr)?;
        let public_key = env.read_bytes(public_key_ptr)?;
        Ok(verification_code(crypto::ed25519_verify(&message, &signature, &public_key)))
    }

    fn ed25519_batch_verify(
        env: &Env,
        messages_ptr: u32,
        signatures_ptr: u32,
        public_keys_ptr: u32,
    ) -> Result<u32, HostError> {
        let messages = decode_sections(&env.read_bytes(messages_ptr)?)?;
        let signatures = decode_sections(&env.read_bytes(signatures_ptr)?)?;
        let public_keys = decode_sections(&env.read_bytes(public_keys_ptr)?)?;
        Ok(verification_code(crypto::ed25519_batch_verify(
            &messages,
            &signatures,
            &public_keys,
        )))
    }

    fn ed25519_sign(env: &Env, message_ptr: u32, private_key_ptr: u32) -> Result<u64, HostError> {
        let message = env.read_bytes(message_ptr)?;
        let private_key = env.read_bytes(private_key_ptr)?;
        pass_or_code(env, crypto::ed25519_sign(&message, &private_key))
    }
}

fn verification_code(result: Result<bool, CryptoError>) -> u32 {
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            tracing::debug!("signature verification failed: {}", e);
            e.code()
        }
    }
}

/// region pointer in the low half on success, error code in the high half on failure.
fn pass_or_code(env: &Env, result: Result<Vec<u8>, CryptoError>) -> Result<u64, HostError> {
    match result {
        Ok(bytes) => Ok(u64::from(env.pass_bytes(&bytes)?)),
        Err(e) => {
            tracing::debug!(address = %env.address, "crypto host call failed: {}", e);
            Ok(u64::from(e.code()) << 32)
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum QueryRequest {
    Wasm(WasmQuery),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum WasmQuery {
    Smart {
        contract_addr: String,
        #[serde(alias = "callback_code_hash")]
        code_hash: Option<String>,
        msg: String,
    },
}

/// resolves a query request into the reply handed back to the guest, enveloped for its generation.
fn query_chain_response(env: &Env, request: &[u8]) -> Result<Value, HostError> {
    let outcome = query_chain_outcome(env, request)?;
    Ok(env.abi.query_chain_response(outcome))
}

fn query_chain_outcome(env: &Env, request: &[u8]) -> Result<QueryOutcome, HostError> {
    let invalid = |error: String| QueryOutcome::Invalid {
        error,
        request: request.to_vec(),
    };
    let parsed: Value = match serde_json::from_slice(request) {
        Ok(parsed) => parsed,
        Err(e) => return Ok(invalid(e.to_string())),
    };
    let (contract_addr, code_hash, msg) = match QueryRequest::deserialize(&parsed) {
        Ok(QueryRequest::Wasm(WasmQuery::Smart { contract_addr, code_hash, msg })) => (contract_addr, code_hash, msg),
        Err(_) => return Ok(QueryOutcome::Unsupported(request_kind(&parsed))),
    };
    let msg = match base64::engine::general_purpose::STANDARD.decode(&msg) {
        Ok(msg) => msg,
        Err(e) => return Ok(invalid(e.to_string())),
    };

    tracing::debug!(
        address = %env.address,
        target = %contract_addr,
        code_hash = code_hash.as_deref().unwrap_or_default(),
        "query_chain"
    );
    match env.chain()?.query_from_contract(&contract_addr, &msg) {
        Ok(data) => Ok(QueryOutcome::Answered(data)),
        Err(MocknetError::ContractExecutionFailed { payload, .. }) => Ok(QueryOutcome::Failed(payload)),
        Err(MocknetError::ContractNotFound(addr)) | Err(MocknetError::UnknownAddress(addr)) => {
            Ok(QueryOutcome::NoSuchContract(addr))
        }
        Err(e) => Err(HostError::Nested(Box::new(e))),
    }
}

/// the outer key of a request, e.g. `bank` for a bank query.
fn request_kind(request: &Value) -> String {
    match request.as_object().and_then(|object| object.keys().next()) {
        Some(kind) => kind.clone(),
        None => "unknown".to_string(),
    }
}
