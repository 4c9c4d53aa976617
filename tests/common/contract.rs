//! Builds small contracts in WebAssembly text that speak the region protocol of either ABI
//! generation. Their behavior is fixed at build time:
//!
//! - init returns the configured response and logs its message through `debug`,
//! - execute stores its `msg`, `env` (and `info`) under those keys, optionally forwards a query
//!   through `query_chain` and stores the answer under `query`, optionally canonicalizes an address
//!   and stores the result under `canonical`, then returns the configured response,
//! - query returns one response while nothing is stored under `msg` and another once something is,
//!   or, when built with [ContractWat::forward_queries], sends whatever is stored under `msg` to
//!   `query_chain` and returns the reply as its own result.

use mocknet::AbiVersion;
use serde_json::{json, Value};

use super::{b64, current_response, legacy_response, ok};

/// start of the data segments holding static regions
const STATIC_BASE: u32 = 1024;
/// start of the bump allocator, one page in
const HEAP_BASE: u32 = 65536;

pub struct ContractWat {
    abi: AbiVersion,
    deallocate: bool,
    init_response: Value,
    execute_response: Value,
    query_empty: Value,
    query_stored: Value,
    query_chain_request: Option<Value>,
    canonicalize: Option<String>,
    forward_queries: bool,
}

impl ContractWat {
    pub fn current() -> Self {
        Self::new(AbiVersion::Current, current_response(vec![]))
    }

    pub fn legacy() -> Self {
        Self::new(AbiVersion::Legacy, legacy_response(vec![]))
    }

    fn new(abi: AbiVersion, empty_response: Value) -> Self {
        Self {
            abi,
            deallocate: true,
            init_response: empty_response.clone(),
            execute_response: empty_response,
            query_empty: ok(json!(b64(&json!({ "stored": false })))),
            query_stored: ok(json!(b64(&json!({ "stored": true })))),
            query_chain_request: None,
            canonicalize: None,
            forward_queries: false,
        }
    }

    pub fn without_deallocate(mut self) -> Self {
        self.deallocate = false;
        self
    }

    /// the full result of init, including the Ok / Err envelope.
    pub fn init_response(mut self, response: Value) -> Self {
        self.init_response = response;
        self
    }

    pub fn execute_response(mut self, response: Value) -> Self {
        self.execute_response = response;
        self
    }

    pub fn query_responses(mut self, empty: Value, stored: Value) -> Self {
        self.query_empty = empty;
        self.query_stored = stored;
        self
    }

    pub fn query_chain(mut self, request: Value) -> Self {
        self.query_chain_request = Some(request);
        self
    }

    pub fn canonicalize(mut self, address: &str) -> Self {
        self.canonicalize = Some(address.to_string());
        self
    }

    /// query forwards the stored execute message as a `query_chain` request.
    pub fn forward_queries(mut self) -> Self {
        self.forward_queries = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        wat::parse_str(self.wat()).expect("test contract must be valid WAT")
    }

    pub fn wat(&self) -> String {
        let mut data = StaticData::new();
        let init_response = data.region(self.init_response.to_string().as_bytes());
        let execute_response = data.region(self.execute_response.to_string().as_bytes());
        let query_empty = data.region(self.query_empty.to_string().as_bytes());
        let query_stored = data.region(self.query_stored.to_string().as_bytes());
        let key_msg = data.region(b"msg");
        let key_env = data.region(b"env");
        let key_info = data.region(b"info");
        let key_query = data.region(b"query");
        let key_canonical = data.region(b"canonical");

        let (init, execute, call_params, query_params, canonicalize_import) = match self.abi {
            AbiVersion::Current => (
                "instantiate",
                "execute",
                "(param $env i32) (param $info i32) (param $msg i32)",
                "(param $env i32) (param $msg i32)",
                "addr_canonicalize",
            ),
            AbiVersion::Legacy => (
                "init",
                "handle",
                "(param $env i32) (param $msg i32)",
                "(param $msg i32)",
                "canonicalize_address",
            ),
        };

        let store_info = match self.abi {
            AbiVersion::Current => format!("(call $db_write (i32.const {}) (local.get $info))", key_info),
            AbiVersion::Legacy => String::new(),
        };
        let forward_query = match &self.query_chain_request {
            Some(request) => format!(
                "(call $db_write (i32.const {}) (call $query_chain (i32.const {})))",
                key_query,
                data.region(request.to_string().as_bytes())
            ),
            None => String::new(),
        };
        let canonicalize = match &self.canonicalize {
            Some(address) => format!(
                r#"(local.set $destination (call $allocate (i32.const 64)))
                (drop (call $canonicalize (i32.const {}) (local.get $destination)))
                (call $db_write (i32.const {}) (local.get $destination))"#,
                data.region(address.as_bytes()),
                key_canonical
            ),
            None => String::new(),
        };
        let query_body = if self.forward_queries {
            format!("(call $query_chain (call $db_read (i32.const {})))", key_msg)
        } else {
            format!(
                r#"(if (result i32) (i32.eqz (call $db_read (i32.const {})))
            (then (i32.const {}))
            (else (i32.const {})))"#,
                key_msg, query_empty, query_stored
            )
        };
        let deallocate = if self.deallocate {
            r#"(func (export "deallocate") (param i32))"#
        } else {
            ""
        };
        assert!(data.cursor < HEAP_BASE, "static data overlaps the heap");

        format!(
            r#"(module
    (import "env" "db_read" (func $db_read (param i32) (result i32)))
    (import "env" "db_write" (func $db_write (param i32 i32)))
    (import "env" "query_chain" (func $query_chain (param i32) (result i32)))
    (import "env" "debug" (func $debug (param i32)))
    (import "env" "{canonicalize_import}" (func $canonicalize (param i32 i32) (result i32)))
    (memory (export "memory") 8)
    (global $heap (mut i32) (i32.const {heap}))
    (func $allocate (export "allocate") (param $size i32) (result i32)
        (local $region i32)
        (local.set $region (global.get $heap))
        (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 16)))
        (i32.store offset=4 (local.get $region) (local.get $size))
        (i32.store offset=8 (local.get $region) (i32.const 0))
        (global.set $heap
            (i32.and
                (i32.add (i32.add (local.get $region) (i32.const 23)) (local.get $size))
                (i32.const -8)))
        (local.get $region))
    {deallocate}
    (func (export "{init}") {call_params} (result i32)
        (call $debug (local.get $msg))
        (i32.const {init_response}))
    (func (export "{execute}") {call_params} (result i32)
        (local $destination i32)
        (call $db_write (i32.const {key_msg}) (local.get $msg))
        (call $db_write (i32.const {key_env}) (local.get $env))
        {store_info}
        {forward_query}
        {canonicalize}
        (i32.const {execute_response}))
    (func (export "query") {query_params} (result i32)
        {query_body})
{segments})"#,
            heap = HEAP_BASE,
            segments = data.segments,
        )
    }
}

/// Regions baked into the data section. Each is a 16 byte descriptor followed by its bytes.
struct StaticData {
    segments: String,
    cursor: u32,
}

impl StaticData {
    fn new() -> Self {
        Self {
            segments: String::new(),
            cursor: STATIC_BASE,
        }
    }

    fn region(&mut self, bytes: &[u8]) -> u32 {
        let region_ptr = self.cursor;
        let len = bytes.len() as u32;
        let mut blob = Vec::new();
        blob.extend_from_slice(&(region_ptr + 16).to_le_bytes());
        blob.extend_from_slice(&len.to_le_bytes());
        blob.extend_from_slice(&len.to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes());
        blob.extend_from_slice(bytes);

        let escaped: String = blob.iter().map(|b| format!("\\{:02x}", b)).collect();
        self.segments
            .push_str(&format!("    (data (i32.const {}) \"{}\")\n", region_ptr, escaped));
        self.cursor = (region_ptr + 16 + len + 7) & !7;
        region_ptr
    }
}
