/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines [ContractInstance], a live contract: one instance of an uploaded module, its storage and
//! the entry point calls into it.

use std::sync::Weak;

use base64::Engine;
use serde_json::Value;
use wasmer::{Val, WasmerEnv};

use crate::{
    contract::{
        wasmer::{
            env::{Env, Storage},
            memory::MemoryContext,
        },
        AbiVersion, Action, BlockEnv, CallContext, Param, SubMessage, UploadedCode,
    },
    error::MocknetError,
    registry::ChainState,
    types::Coin,
};

/// ContractInstance is created by the registry on instantiate and lives as long as the registry.
pub struct ContractInstance {
    address: String,
    code_id: u64,
    code_hash: String,
    label: String,
    abi: AbiVersion,
    /// Env bound to this instance's exports, used to pass parameters and read results.
    env: Env,
    instance: wasmer::Instance,
}

/// Unwrapped result of an instantiate or execute.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// The `Ok` payload as returned by the guest.
    pub payload: Value,
    pub messages: Vec<SubMessage>,
}

impl ContractInstance {
    pub(crate) fn new(
        code: &UploadedCode,
        address: String,
        label: String,
        bech32_prefix: String,
        chain: Weak<ChainState>,
    ) -> Result<Self, MocknetError> {
        let mut env = Env::new(address.clone(), bech32_prefix, code.abi(), chain);
        let instance = code.instantiate(&env)?;
        env.init_with_instance(&instance)
            .map_err(|e| MocknetError::InstantiationFailed(e.to_string()))?;

        Ok(Self {
            address,
            code_id: code.code_id(),
            code_hash: code.code_hash().to_string(),
            label,
            abi: code.abi(),
            env,
            instance,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn code_id(&self) -> u64 {
        self.code_id
    }

    pub fn code_hash(&self) -> &str {
        &self.code_hash
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn abi(&self) -> AbiVersion {
        self.abi
    }

    /// a copy of the contract's storage.
    pub fn storage(&self) -> Storage {
        self.env.storage.lock().unwrap().clone()
    }

    pub fn init(
        &self,
        block: BlockEnv,
        sender: &str,
        msg: &[u8],
        funds: &[Coin],
    ) -> Result<Response, MocknetError> {
        let ctx = self.context(block, Some(sender), funds);
        let payload = self.call(Action::Instantiate, &ctx, msg)?;
        self.response(payload)
    }

    pub fn execute(
        &self,
        block: BlockEnv,
        sender: &str,
        msg: &[u8],
        funds: &[Coin],
    ) -> Result<Response, MocknetError> {
        let ctx = self.context(block, Some(sender), funds);
        let payload = self.call(Action::Execute, &ctx, msg)?;
        self.response(payload)
    }

    /// runs a query and decodes its result. Query results are base64 encoded JSON, either bare or
    /// in the `data` field of an object.
    pub fn query(&self, block: BlockEnv, msg: &[u8]) -> Result<Value, MocknetError> {
        let payload = self.query_raw(block, msg)?;
        let encoded = match &payload {
            Value::String(encoded) => encoded,
            Value::Object(object) => match object.get("data") {
                Some(Value::String(encoded)) => encoded,
                _ => return Ok(payload),
            },
            _ => return Ok(payload),
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| self.invalid_response(format!("query result is not base64: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| self.invalid_response(format!("query result is not JSON: {}", e)))
    }

    /// runs a query and returns its `Ok` payload undecoded.
    pub fn query_raw(&self, block: BlockEnv, msg: &[u8]) -> Result<Value, MocknetError> {
        let ctx = self.context(block, None, &[]);
        self.call(Action::Query, &ctx, msg)
    }

    fn context<'a>(
        &'a self,
        block: BlockEnv<'a>,
        sender: Option<&'a str>,
        funds: &'a [Coin],
    ) -> CallContext<'a> {
        CallContext {
            block,
            address: &self.address,
            code_hash: &self.code_hash,
            sender,
            funds,
        }
    }

    /// calls the generation's entry point for `action` and unwraps its result.
    fn call(&self, action: Action, ctx: &CallContext, msg: &[u8]) -> Result<Value, MocknetError> {
        ctx.validate(action)?;
        let entry_point = self.abi.entry_point(action);
        let msg_text = String::from_utf8_lossy(msg);
        tracing::debug!(
            address = %self.address,
            action = action.name(),
            sender = ctx.sender.unwrap_or_default(),
            msg = %msg_text,
            "calling {}", entry_point
        );

        let result = self.call_entry_point(action, entry_point, ctx, msg);
        if let Err(e) = &result {
            match e {
                MocknetError::ContractExecutionFailed { .. } => tracing::info!(
                    address = %self.address,
                    action = action.name(),
                    "{}", e
                ),
                _ => tracing::error!(
                    address = %self.address,
                    action = action.name(),
                    sender = ctx.sender.unwrap_or_default(),
                    msg = %msg_text,
                    "contract call failed: {}", e
                ),
            }
        }
        result
    }

    fn call_entry_point(
        &self,
        action: Action,
        entry_point: &'static str,
        ctx: &CallContext,
        msg: &[u8],
    ) -> Result<Value, MocknetError> {
        let function = self
            .instance
            .exports
            .get_function(entry_point)
            .map_err(|_| MocknetError::MissingEntryPoint(entry_point.to_string()))?;

        let mut params = Vec::new();
        for param in self.abi.params(action) {
            let region_ptr = match param {
                Param::Env => self.env.pass_json(Some(&self.abi.env(ctx)))?,
                Param::Info => self.env.pass_json(self.abi.info(ctx).as_ref())?,
                Param::Msg => self.env.pass_bytes(msg)?,
            };
            params.push(Val::I32(region_ptr as i32));
        }

        let returned = function.call(&params)?;
        let result_ptr = match returned.first() {
            Some(Val::I32(ptr)) => *ptr as u32,
            _ => return Err(self.invalid_response(format!("`{}` returned {:?}", entry_point, returned))),
        };
        let text = self.env.read_text(result_ptr)?;
        let result: Value = serde_json::from_str(&text)
            .map_err(|e| self.invalid_response(format!("result is not JSON: {}", e)))?;
        self.unwrap_result(action, result)
    }

    /// `{"Ok": payload}` to the payload, `{"Err": payload}` to [MocknetError::ContractExecutionFailed].
    fn unwrap_result(&self, action: Action, result: Value) -> Result<Value, MocknetError> {
        if let Value::Object(mut object) = result {
            if object.len() == 1 {
                if let Some(payload) = object.remove("Ok").or_else(|| object.remove("ok")) {
                    return Ok(payload);
                }
                if let Some(payload) = object.remove("Err").or_else(|| object.remove("error")) {
                    return Err(MocknetError::ContractExecutionFailed {
                        address: self.address.clone(),
                        action: action.name().to_string(),
                        payload,
                    });
                }
            }
        }
        Err(self.invalid_response("result is neither Ok nor Err".to_string()))
    }

    fn response(&self, payload: Value) -> Result<Response, MocknetError> {
        let messages = self
            .abi
            .sub_messages(&payload)
            .map_err(|reason| self.invalid_response(reason))?;
        Ok(Response { payload, messages })
    }

    fn invalid_response(&self, reason: String) -> MocknetError {
        MocknetError::InvalidResponse {
            address: self.address.clone(),
            reason,
        }
    }
}

impl Response {
    /// the payload with a base64 `data` field replaced by the JSON it encodes, when it encodes JSON.
    pub fn decoded(self) -> Value {
        let mut payload = self.payload;
        let decoded = payload
            .get("data")
            .and_then(Value::as_str)
            .and_then(|data| base64::engine::general_purpose::STANDARD.decode(data).ok())
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());
        if let (Some(decoded), Value::Object(object)) = (decoded, &mut payload) {
            object.insert("data".to_string(), decoded);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn data_field_is_decoded_when_json() {
        let response = Response {
            payload: json!({ "messages": [], "data": "eyJjb3VudCI6M30=" }),
            messages: vec![],
        };
        assert_eq!(response.decoded(), json!({ "messages": [], "data": { "count": 3 } }));

        let response = Response {
            payload: json!({ "data": "bm90IGpzb24=" }),
            messages: vec![],
        };
        assert_eq!(response.decoded(), json!({ "data": "bm90IGpzb24=" }));

        let response = Response {
            payload: json!({ "data": null }),
            messages: vec![],
        };
        assert_eq!(response.decoded(), json!({ "data": null }));
    }
}
