/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines types and functions that provide a convenient and succinct object-oriented interface for loading,
//! introspecting and executing (WASM) CosmWasm smart contracts.
//!
//! A contract is compiled into a WASM [module] whose exports decide its ABI generation ([version]).
//! The registry builds an [instance] from the module together with the import table of [host_functions]
//! (implemented in [functions]) and drives its entry points through the region protocol of
//! [wasmer::memory].

pub mod functions;
pub(crate) use functions::*;

pub mod host_functions;
pub use host_functions::*;

pub mod instance;
pub use instance::*;

pub mod module;
pub use module::*;

pub mod version;
pub use version::*;

pub mod wasmer;
