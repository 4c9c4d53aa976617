/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implementation of Store instantiation, optionally bounded by a guest [MemoryLimit].

use wasmer::{BaseTunables, Store, Target};
use wasmer_compiler_singlepass::Singlepass;
use wasmer_engine_universal::Universal;

use super::tunables::{BoundedTunables, MemoryLimit};

/// Instantiate a Store that represents the states that can be manipulated by WASM program.
pub fn instantiate_store(memory_limit: Option<MemoryLimit>) -> Store {
    // use the Singlepass compiler which is optimised for fast compilation
    let engine = Universal::new(Singlepass::new()).engine();

    match memory_limit {
        Some(limit) => {
            let base_tunables = BaseTunables::for_target(&Target::default());
            Store::new_with_tunables(&engine, BoundedTunables::new(base_tunables, limit))
        }
        None => Store::new(&engine),
    }
}
