#[cfg(test)]
#[allow(dead_code)]
pub mod contract;
pub use contract::*;

use base64::Engine;
use serde_json::{json, Value};

/// routes `tracing` output of the library to the test harness. Filtered by `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn b64(value: &Value) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.to_string())
}

pub fn ok(payload: Value) -> Value {
    json!({ "Ok": payload })
}

/// successful instantiate / execute result of the current generation.
pub fn current_response(messages: Vec<Value>) -> Value {
    ok(json!({ "messages": messages, "attributes": [], "events": [], "data": null }))
}

/// successful init / handle result of the legacy generation.
pub fn legacy_response(messages: Vec<Value>) -> Value {
    ok(json!({ "messages": messages, "log": [], "data": null }))
}

pub fn current_instantiate_msg(code_id: u64, code_hash: &str, msg: &Value, label: &str) -> Value {
    json!({
        "id": 0,
        "reply_on": "never",
        "gas_limit": null,
        "msg": { "wasm": { "instantiate": {
            "code_id": code_id,
            "code_hash": code_hash,
            "msg": b64(msg),
            "funds": [],
            "label": label
        } } }
    })
}

pub fn current_execute_msg(contract_addr: &str, code_hash: &str, msg: &Value) -> Value {
    json!({
        "id": 0,
        "reply_on": "never",
        "gas_limit": null,
        "msg": { "wasm": { "execute": {
            "contract_addr": contract_addr,
            "code_hash": code_hash,
            "msg": b64(msg),
            "funds": []
        } } }
    })
}

pub fn legacy_execute_msg(contract_addr: &str, code_hash: &str, msg: &Value) -> Value {
    json!({
        "wasm": { "execute": {
            "contract_addr": contract_addr,
            "callback_code_hash": code_hash,
            "msg": b64(msg),
            "send": []
        } }
    })
}

pub fn current_bank_msg(to_address: &str) -> Value {
    json!({
        "id": 0,
        "reply_on": "never",
        "gas_limit": null,
        "msg": { "bank": { "send": { "to_address": to_address, "amount": [{ "denom": "uscrt", "amount": "1" }] } } }
    })
}

pub fn smart_query(contract_addr: &str, code_hash: &str, msg: &Value) -> Value {
    json!({ "wasm": { "smart": { "contract_addr": contract_addr, "code_hash": code_hash, "msg": b64(msg) } } })
}
