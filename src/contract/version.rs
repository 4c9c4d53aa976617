/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the two supported generations of the contract ABI and everything that differs between
//! them: entry point names, parameter order, the shape of `env` and `info`, import names, where
//! sub-messages live in a response and how a `query_chain` reply is enveloped.
//!
//! Callers hold an [AbiVersion] and ask it; nothing outside this module matches on the variants.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{error::MocknetError, types::CallbackMessage, types::Coin};

/// AbiVersion classifies a compiled module by the entry points it exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbiVersion {
    /// Exports `init` / `handle` / `query`. Sender and funds are part of `env`.
    Legacy,
    /// Exports `instantiate` / `execute` / `query`. Sender and funds are passed as a separate `info`.
    Current,
}

/// The three things a contract can be asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Instantiate,
    Execute,
    Query,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Instantiate => "instantiate",
            Action::Execute => "execute",
            Action::Query => "query",
        }
    }
}

/// A parameter of an entry point. Each is passed as a pointer to a region holding JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Param {
    Env,
    Info,
    Msg,
}

/// Functions the host offers in the `env` import namespace. A generation decides which of them are
/// imported and under which name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCall {
    DbRead,
    DbWrite,
    DbRemove,
    QueryChain,
    Debug,
    AddrValidate,
    AddrCanonicalize,
    AddrHumanize,
    Secp256k1Verify,
    Secp256k1RecoverPubkey,
    Secp256k1Sign,
    Ed25519Verify,
    Ed25519BatchVerify,
    Ed25519Sign,
}

static COMMON_IMPORTS: [(&str, HostCall); 5] = [
    ("db_read", HostCall::DbRead),
    ("db_write", HostCall::DbWrite),
    ("db_remove", HostCall::DbRemove),
    ("query_chain", HostCall::QueryChain),
    ("debug", HostCall::Debug),
];

static LEGACY_IMPORTS: [(&str, HostCall); 3] = [
    ("canonicalize_address", HostCall::AddrCanonicalize),
    ("humanize_address", HostCall::AddrHumanize),
    ("debug_print", HostCall::Debug),
];

static CURRENT_IMPORTS: [(&str, HostCall); 9] = [
    ("addr_validate", HostCall::AddrValidate),
    ("addr_canonicalize", HostCall::AddrCanonicalize),
    ("addr_humanize", HostCall::AddrHumanize),
    ("secp256k1_verify", HostCall::Secp256k1Verify),
    ("secp256k1_recover_pubkey", HostCall::Secp256k1RecoverPubkey),
    ("secp256k1_sign", HostCall::Secp256k1Sign),
    ("ed25519_verify", HostCall::Ed25519Verify),
    ("ed25519_batch_verify", HostCall::Ed25519BatchVerify),
    ("ed25519_sign", HostCall::Ed25519Sign),
];

/// Chain data every call sees.
#[derive(Clone, Copy, Debug)]
pub struct BlockEnv<'a> {
    pub chain_id: &'a str,
    pub height: u64,
    /// Seconds since the epoch.
    pub time: u64,
}

/// Everything needed to build the `env` and `info` of one call.
#[derive(Clone, Copy, Debug)]
pub struct CallContext<'a> {
    pub block: BlockEnv<'a>,
    pub address: &'a str,
    pub code_hash: &'a str,
    /// None for queries.
    pub sender: Option<&'a str>,
    pub funds: &'a [Coin],
}

impl<'a> CallContext<'a> {
    /// checks that the fields `env` and `info` are built from are present.
    pub fn validate(&self, action: Action) -> Result<(), MocknetError> {
        if self.address.is_empty() {
            return Err(MocknetError::MissingAddress);
        }
        if self.code_hash.is_empty() {
            return Err(MocknetError::MissingCodeHash);
        }
        if action != Action::Query && self.sender.map_or(true, str::is_empty) {
            return Err(MocknetError::MissingSender);
        }
        Ok(())
    }
}

/// A sub-message found in a response.
#[derive(Clone, Debug, PartialEq)]
pub enum SubMessage {
    /// Instantiate or execute to be dispatched by the registry.
    Callback(CallbackMessage),
    /// Anything the mock chain does not route (bank, staking, migrate, ...). Kept for logging.
    Ignored(Value),
}

/// What became of a smart query a contract issued through `query_chain`.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    /// The queried contract answered. Holds its `Ok` payload, base64 encoded by the contract.
    Answered(Value),
    /// The queried contract returned an error payload.
    Failed(Value),
    NoSuchContract(String),
    /// The request is valid JSON but not a smart query. Holds the request kind, e.g. `bank`.
    Unsupported(String),
    Invalid { error: String, request: Vec<u8> },
}

impl AbiVersion {
    /// classifies a module by its exported function names. `instantiate` wins over `init`.
    pub fn detect<'a>(exports: impl IntoIterator<Item = &'a str>) -> Result<AbiVersion, MocknetError> {
        let mut has_init = false;
        for name in exports {
            match name {
                "instantiate" => return Ok(AbiVersion::Current),
                "init" => has_init = true,
                _ => {}
            }
        }
        if has_init {
            Ok(AbiVersion::Legacy)
        } else {
            Err(MocknetError::UnknownAbiGeneration)
        }
    }

    pub fn entry_point(&self, action: Action) -> &'static str {
        match (self, action) {
            (AbiVersion::Legacy, Action::Instantiate) => "init",
            (AbiVersion::Legacy, Action::Execute) => "handle",
            (AbiVersion::Current, Action::Instantiate) => "instantiate",
            (AbiVersion::Current, Action::Execute) => "execute",
            (_, Action::Query) => "query",
        }
    }

    /// parameters of the entry point for `action`, in call order.
    pub fn params(&self, action: Action) -> &'static [Param] {
        match (self, action) {
            (AbiVersion::Legacy, Action::Query) => &[Param::Msg],
            (AbiVersion::Legacy, _) => &[Param::Env, Param::Msg],
            (AbiVersion::Current, Action::Query) => &[Param::Env, Param::Msg],
            (AbiVersion::Current, _) => &[Param::Env, Param::Info, Param::Msg],
        }
    }

    /// the `env` record of a call.
    pub fn env(&self, ctx: &CallContext) -> Value {
        match self {
            AbiVersion::Legacy => serde_json::json!(LegacyEnv {
                block: LegacyBlock {
                    height: ctx.block.height,
                    time: ctx.block.time,
                    chain_id: ctx.block.chain_id,
                },
                message: LegacyMessage {
                    sender: ctx.sender.unwrap_or_default(),
                    sent_funds: ctx.funds,
                },
                contract: LegacyContract { address: ctx.address },
                contract_key: "",
                contract_code_hash: ctx.code_hash,
            }),
            AbiVersion::Current => serde_json::json!(CurrentEnv {
                block: CurrentBlock {
                    height: ctx.block.height,
                    time: (ctx.block.time as u128 * 1_000_000_000).to_string(),
                    chain_id: ctx.block.chain_id,
                },
                transaction: TransactionInfo { index: 0 },
                contract: CurrentContract {
                    address: ctx.address,
                    code_hash: ctx.code_hash,
                },
            }),
        }
    }

    /// the `info` record of a call, for generations that pass one.
    pub fn info(&self, ctx: &CallContext) -> Option<Value> {
        match self {
            AbiVersion::Legacy => None,
            AbiVersion::Current => Some(serde_json::json!(MessageInfo {
                sender: ctx.sender.unwrap_or_default(),
                funds: ctx.funds,
            })),
        }
    }

    /// names under which host functions are imported, common ones first.
    pub fn imports(&self) -> impl Iterator<Item = (&'static str, HostCall)> {
        let specific: &'static [(&'static str, HostCall)] = match self {
            AbiVersion::Legacy => &LEGACY_IMPORTS,
            AbiVersion::Current => &CURRENT_IMPORTS,
        };
        COMMON_IMPORTS.iter().chain(specific).copied()
    }

    /// the reply written back to a guest for a `query_chain` call. Legacy guests decode a
    /// capitalised `Ok`/`Err` envelope and take a contract error as is. Current guests decode
    /// `ok`/`error` and take a contract error as a string.
    pub fn query_chain_response(&self, outcome: QueryOutcome) -> Value {
        let (ok, err) = match self {
            AbiVersion::Legacy => ("Ok", "Err"),
            AbiVersion::Current => ("ok", "error"),
        };
        let system_error = match outcome {
            QueryOutcome::Answered(data) => return envelope(ok, envelope(ok, data)),
            QueryOutcome::Failed(payload) => {
                let payload = match (self, payload) {
                    (AbiVersion::Current, Value::String(message)) => Value::String(message),
                    (AbiVersion::Current, payload) => Value::String(payload.to_string()),
                    (AbiVersion::Legacy, payload) => payload,
                };
                return envelope(ok, envelope(err, payload));
            }
            QueryOutcome::NoSuchContract(addr) => json!({ "no_such_contract": { "addr": addr } }),
            QueryOutcome::Unsupported(kind) => json!({ "unsupported_request": { "kind": kind } }),
            QueryOutcome::Invalid { error, request } => json!({ "invalid_request": {
                "error": error,
                "request": base64::engine::general_purpose::STANDARD.encode(request),
            } }),
        };
        envelope(err, system_error)
    }

    /// extracts the sub-messages of an unwrapped instantiate or execute response.
    pub fn sub_messages(&self, response: &Value) -> Result<Vec<SubMessage>, String> {
        let messages = match response.get("messages") {
            Some(Value::Array(messages)) => messages,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => return Err("`messages` is not a list".to_string()),
        };
        messages
            .iter()
            .map(|message| {
                let wasm = match self {
                    AbiVersion::Legacy => message.get("wasm"),
                    AbiVersion::Current => message.get("msg").and_then(|msg| msg.get("wasm")),
                };
                match wasm {
                    Some(wasm) if wasm.get("instantiate").is_some() || wasm.get("execute").is_some() => {
                        self.callback(wasm).map(SubMessage::Callback)
                    }
                    _ => Ok(SubMessage::Ignored(message.clone())),
                }
            })
            .collect()
    }

    fn callback(&self, wasm: &Value) -> Result<CallbackMessage, String> {
        let invalid = |e: serde_json::Error| format!("invalid wasm sub-message: {}", e);
        match self {
            AbiVersion::Legacy => match LegacyWasmMsg::deserialize(wasm).map_err(invalid)? {
                LegacyWasmMsg::Instantiate { code_id, callback_code_hash, msg, send, label } => {
                    Ok(CallbackMessage::Instantiate {
                        code_id,
                        code_hash: callback_code_hash,
                        label,
                        msg: decode_binary(&msg)?,
                        funds: send,
                    })
                }
                LegacyWasmMsg::Execute { contract_addr, callback_code_hash, msg, send } => {
                    Ok(CallbackMessage::Execute {
                        contract_addr,
                        code_hash: callback_code_hash,
                        msg: decode_binary(&msg)?,
                        funds: send,
                    })
                }
            },
            AbiVersion::Current => match CurrentWasmMsg::deserialize(wasm).map_err(invalid)? {
                CurrentWasmMsg::Instantiate { code_id, code_hash, msg, funds, label } => {
                    Ok(CallbackMessage::Instantiate {
                        code_id,
                        code_hash,
                        label,
                        msg: decode_binary(&msg)?,
                        funds,
                    })
                }
                CurrentWasmMsg::Execute { contract_addr, code_hash, msg, funds } => {
                    Ok(CallbackMessage::Execute {
                        contract_addr,
                        code_hash,
                        msg: decode_binary(&msg)?,
                        funds,
                    })
                }
            },
        }
    }
}

fn envelope(key: &str, value: Value) -> Value {
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), value);
    Value::Object(object)
}

fn decode_binary(encoded: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("sub-message is not base64: {}", e))
}

#[derive(Serialize)]
struct LegacyEnv<'a> {
    block: LegacyBlock<'a>,
    message: LegacyMessage<'a>,
    contract: LegacyContract<'a>,
    contract_key: &'a str,
    contract_code_hash: &'a str,
}

#[derive(Serialize)]
struct LegacyBlock<'a> {
    height: u64,
    time: u64,
    chain_id: &'a str,
}

#[derive(Serialize)]
struct LegacyMessage<'a> {
    sender: &'a str,
    sent_funds: &'a [Coin],
}

#[derive(Serialize)]
struct LegacyContract<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct CurrentEnv<'a> {
    block: CurrentBlock<'a>,
    transaction: TransactionInfo,
    contract: CurrentContract<'a>,
}

#[derive(Serialize)]
struct CurrentBlock<'a> {
    height: u64,
    /// nanoseconds, as a decimal string
    time: String,
    chain_id: &'a str,
}

#[derive(Serialize)]
struct TransactionInfo {
    index: u32,
}

#[derive(Serialize)]
struct CurrentContract<'a> {
    address: &'a str,
    code_hash: &'a str,
}

#[derive(Serialize)]
struct MessageInfo<'a> {
    sender: &'a str,
    funds: &'a [Coin],
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum LegacyWasmMsg {
    Instantiate {
        code_id: u64,
        callback_code_hash: String,
        msg: String,
        #[serde(default)]
        send: Vec<Coin>,
        label: Option<String>,
    },
    Execute {
        contract_addr: String,
        callback_code_hash: String,
        msg: String,
        #[serde(default)]
        send: Vec<Coin>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum CurrentWasmMsg {
    Instantiate {
        code_id: u64,
        code_hash: String,
        msg: String,
        #[serde(default)]
        funds: Vec<Coin>,
        label: Option<String>,
    },
    Execute {
        contract_addr: String,
        code_hash: String,
        msg: String,
        #[serde(default)]
        funds: Vec<Coin>,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context<'a>(sender: Option<&'a str>, funds: &'a [Coin]) -> CallContext<'a> {
        CallContext {
            block: BlockEnv {
                chain_id: "mocknet",
                height: 12,
                time: 1_700_000_000,
            },
            address: "secret1contract",
            code_hash: "abcd",
            sender,
            funds,
        }
    }

    #[test]
    fn detection_by_exports() {
        assert_eq!(
            AbiVersion::detect(["memory", "allocate", "instantiate", "execute", "query"]).unwrap(),
            AbiVersion::Current
        );
        assert_eq!(AbiVersion::detect(["init", "handle", "query"]).unwrap(), AbiVersion::Legacy);
        assert_eq!(AbiVersion::detect(["init", "instantiate"]).unwrap(), AbiVersion::Current);
        assert!(matches!(
            AbiVersion::detect(["execute", "query"]),
            Err(MocknetError::UnknownAbiGeneration)
        ));
    }

    #[test]
    fn entry_points_and_params() {
        assert_eq!(AbiVersion::Legacy.entry_point(Action::Execute), "handle");
        assert_eq!(AbiVersion::Current.entry_point(Action::Instantiate), "instantiate");
        assert_eq!(AbiVersion::Legacy.entry_point(Action::Query), "query");
        assert_eq!(AbiVersion::Legacy.params(Action::Query), &[Param::Msg]);
        assert_eq!(
            AbiVersion::Current.params(Action::Execute),
            &[Param::Env, Param::Info, Param::Msg]
        );
    }

    #[test]
    fn legacy_env_embeds_sender() {
        let funds = [Coin::new(5, "uscrt")];
        let ctx = context(Some("secret1sender"), &funds);
        let env = AbiVersion::Legacy.env(&ctx);
        assert_eq!(env["message"]["sender"], "secret1sender");
        assert_eq!(env["message"]["sent_funds"][0]["amount"], "5");
        assert_eq!(env["block"]["time"], 1_700_000_000u64);
        assert_eq!(env["contract"]["address"], "secret1contract");
        assert_eq!(env["contract_code_hash"], "abcd");
        assert!(AbiVersion::Legacy.info(&ctx).is_none());
    }

    #[test]
    fn current_env_splits_info() {
        let ctx = context(Some("secret1sender"), &[]);
        let env = AbiVersion::Current.env(&ctx);
        assert_eq!(env["block"]["time"], "1700000000000000000");
        assert_eq!(env["transaction"]["index"], 0);
        assert_eq!(env["contract"]["code_hash"], "abcd");
        assert!(env.get("message").is_none());
        let info = AbiVersion::Current.info(&ctx).unwrap();
        assert_eq!(info, json!({ "sender": "secret1sender", "funds": [] }));
    }

    #[test]
    fn context_requires_sender_except_for_queries() {
        let ctx = context(None, &[]);
        assert!(matches!(ctx.validate(Action::Execute), Err(MocknetError::MissingSender)));
        assert!(ctx.validate(Action::Query).is_ok());
        let ctx = CallContext { code_hash: "", ..context(Some("a"), &[]) };
        assert!(matches!(ctx.validate(Action::Query), Err(MocknetError::MissingCodeHash)));
    }

    #[test]
    fn import_sets_differ() {
        let legacy: Vec<_> = AbiVersion::Legacy.imports().map(|(name, _)| name).collect();
        let current: Vec<_> = AbiVersion::Current.imports().map(|(name, _)| name).collect();
        assert!(legacy.contains(&"canonicalize_address"));
        assert!(!legacy.contains(&"secp256k1_verify"));
        assert!(current.contains(&"addr_validate"));
        assert!(current.contains(&"ed25519_batch_verify"));
        assert!(!current.contains(&"humanize_address"));
        assert!(legacy.contains(&"db_read") && current.contains(&"db_read"));
    }

    #[test]
    fn sub_messages_at_generation_specific_paths() {
        let legacy = json!({
            "messages": [
                { "wasm": { "execute": {
                    "contract_addr": "secret1other", "callback_code_hash": "ff",
                    "msg": "eyJwaW5nIjp7fX0=", "send": []
                } } },
                { "bank": { "send": { "to_address": "x", "amount": [] } } }
            ]
        });
        let messages = AbiVersion::Legacy.sub_messages(&legacy).unwrap();
        assert_eq!(
            messages[0],
            SubMessage::Callback(CallbackMessage::Execute {
                contract_addr: "secret1other".to_string(),
                code_hash: "ff".to_string(),
                msg: br#"{"ping":{}}"#.to_vec(),
                funds: vec![],
            })
        );
        assert!(matches!(messages[1], SubMessage::Ignored(_)));

        let current = json!({
            "messages": [{ "id": 0, "reply_on": "never", "msg": { "wasm": { "instantiate": {
                "code_id": 3, "code_hash": "ee", "msg": "e30=", "funds": [], "label": "child"
            } } } }]
        });
        let messages = AbiVersion::Current.sub_messages(&current).unwrap();
        assert_eq!(
            messages,
            vec![SubMessage::Callback(CallbackMessage::Instantiate {
                code_id: 3,
                code_hash: "ee".to_string(),
                label: Some("child".to_string()),
                msg: b"{}".to_vec(),
                funds: vec![],
            })]
        );

        // the same payload at the other generation's path is not a callback
        assert!(matches!(
            AbiVersion::Legacy.sub_messages(&current).unwrap()[0],
            SubMessage::Ignored(_)
        ));
        assert!(AbiVersion::Current.sub_messages(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn query_chain_replies_per_generation() {
        let answered = QueryOutcome::Answered(json!("e30="));
        assert_eq!(
            AbiVersion::Legacy.query_chain_response(answered.clone()),
            json!({ "Ok": { "Ok": "e30=" } })
        );
        assert_eq!(
            AbiVersion::Current.query_chain_response(answered),
            json!({ "ok": { "ok": "e30=" } })
        );

        let failed = QueryOutcome::Failed(json!({ "generic_err": { "msg": "boom" } }));
        assert_eq!(
            AbiVersion::Legacy.query_chain_response(failed.clone()),
            json!({ "Ok": { "Err": { "generic_err": { "msg": "boom" } } } })
        );
        assert_eq!(
            AbiVersion::Current.query_chain_response(failed),
            json!({ "ok": { "error": r#"{"generic_err":{"msg":"boom"}}"# } })
        );

        let missing = QueryOutcome::NoSuchContract("secret1gone".to_string());
        assert_eq!(
            AbiVersion::Current.query_chain_response(missing),
            json!({ "error": { "no_such_contract": { "addr": "secret1gone" } } })
        );
        let invalid = QueryOutcome::Invalid {
            error: "expected value".to_string(),
            request: b"{".to_vec(),
        };
        assert_eq!(
            AbiVersion::Legacy.query_chain_response(invalid),
            json!({ "Err": { "invalid_request": { "error": "expected value", "request": "ew==" } } })
        );
    }

    #[test]
    fn malformed_callback_is_rejected() {
        let response = json!({ "messages": [{ "wasm": { "execute": { "contract_addr": "a" } } }] });
        assert!(AbiVersion::Legacy.sub_messages(&response).is_err());
    }
}
