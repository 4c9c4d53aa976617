/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Wasmer specific pieces of the contract host: the environment handed to host functions, the region
//! protocol over guest memory, and construction of the compilation store.

pub mod env;

pub mod memory;

pub mod store;

pub mod tunables;
