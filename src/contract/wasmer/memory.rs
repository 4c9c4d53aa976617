/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the region protocol used to exchange byte buffers with the guest's linear memory.
//!
//! A region is a descriptor living inside guest memory at a location chosen by the guest's own
//! allocator:
//!
//! ```text
//! region_ptr + 0   offset     u32 LE   start of the buffer
//! region_ptr + 4   capacity   u32 LE   bytes reserved for the buffer
//! region_ptr + 8   length     u32 LE   bytes in use
//! region_ptr + 12  reserved   (never touched by the host)
//! ```
//!
//! A guest call may grow the linear memory, which invalidates every view taken before it. Each
//! function here therefore takes a fresh view of the memory right before touching it and never
//! keeps one around.

use std::cell::Cell;

use serde::Serialize;
use wasmer::{Memory, NativeFunc};

use crate::contract::HostError;

/// Number of bytes of a region descriptor the host reads and writes.
pub const REGION_SIZE: u32 = 12;

/// Descriptor of a span of guest memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub offset: u32,
    pub capacity: u32,
    pub length: u32,
}

/// Interprets the descriptor at `region_ptr`.
pub fn read_region(memory: &Memory, region_ptr: u32) -> Result<Region, HostError> {
    let bytes = read_memory(memory, region_ptr, REGION_SIZE)?;
    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    Ok(Region {
        offset: word(0),
        capacity: word(4),
        length: word(8),
    })
}

/// Copies the `length` bytes the region at `region_ptr` denotes.
pub fn read_bytes(memory: &Memory, region_ptr: u32) -> Result<Vec<u8>, HostError> {
    let region = read_region(memory, region_ptr)?;
    if region.length > region.capacity {
        return Err(HostError::MalformedRegion(region));
    }
    read_memory(memory, region.offset, region.length)
}

/// Copies `data` into the region at `region_ptr` and sets its length. The region is left as it
/// was if the data does not fit.
pub fn write_bytes(memory: &Memory, region_ptr: u32, data: &[u8]) -> Result<(), HostError> {
    let region = read_region(memory, region_ptr)?;
    if data.len() > region.capacity as usize {
        return Err(HostError::RegionOverflow {
            size: data.len(),
            capacity: region.capacity,
        });
    }
    write_memory(memory, region.offset, data)?;
    write_memory(memory, region_ptr + 8, &(data.len() as u32).to_le_bytes())
}

fn read_memory(memory: &Memory, ptr: u32, len: u32) -> Result<Vec<u8>, HostError> {
    let view = memory.view::<u8>();
    let cells = cells(&view, ptr, len)?;
    Ok(cells.iter().map(Cell::get).collect())
}

fn write_memory(memory: &Memory, ptr: u32, data: &[u8]) -> Result<(), HostError> {
    let view = memory.view::<u8>();
    let cells = cells(&view, ptr, data.len() as u32)?;
    for (cell, byte) in cells.iter().zip(data) {
        cell.set(*byte);
    }
    Ok(())
}

fn cells<'a>(view: &'a [Cell<u8>], ptr: u32, len: u32) -> Result<&'a [Cell<u8>], HostError> {
    let start = ptr as usize;
    start
        .checked_add(len as usize)
        .and_then(|end| view.get(start..end))
        .ok_or(HostError::MemoryAccess { ptr, len })
}

/// MemoryContext is implemented by everything that can reach a guest's memory and allocator.
/// The provided methods are the host half of the region protocol.
pub trait MemoryContext {
    fn get_memory(&self) -> Result<&Memory, HostError>;
    fn get_allocate(&self) -> Result<&NativeFunc<u32, u32>, HostError>;
    /// The guest's `deallocate` export. Guests are not required to have one.
    fn get_deallocate(&self) -> Option<&NativeFunc<u32, ()>>;

    fn read_region(&self, region_ptr: u32) -> Result<Region, HostError> {
        read_region(self.get_memory()?, region_ptr)
    }

    fn read_bytes(&self, region_ptr: u32) -> Result<Vec<u8>, HostError> {
        read_bytes(self.get_memory()?, region_ptr)
    }

    /// reads the region as UTF-8 and hands it back to the guest allocator.
    fn read_text(&self, region_ptr: u32) -> Result<String, HostError> {
        let bytes = self.read_bytes(region_ptr)?;
        self.release(region_ptr);
        String::from_utf8(bytes).map_err(|_| HostError::InvalidUtf8)
    }

    fn write_bytes(&self, region_ptr: u32, data: &[u8]) -> Result<(), HostError> {
        write_bytes(self.get_memory()?, region_ptr, data)
    }

    /// allocates a fresh region through the guest and fills it with `data`.
    fn pass_bytes(&self, data: &[u8]) -> Result<u32, HostError> {
        let len = u32::try_from(data.len()).map_err(|_| HostError::RegionOverflow {
            size: data.len(),
            capacity: u32::MAX,
        })?;
        let region_ptr = self.get_allocate()?.call(len)?;
        tracing::trace!(region_ptr, len, "allocated region");
        // allocate may have grown the memory, write_bytes resolves a new view
        self.write_bytes(region_ptr, data)?;
        Ok(region_ptr)
    }

    /// allocates a fresh region holding the JSON encoding of `value`.
    fn pass_json<T: Serialize + ?Sized>(&self, value: Option<&T>) -> Result<u32, HostError> {
        let value = value.ok_or(HostError::UndefinedValue)?;
        let json = serde_json::to_vec(value).map_err(|e| HostError::Serialization(e.to_string()))?;
        self.pass_bytes(&json)
    }

    /// frees a region if the guest exports `deallocate`. Failures are ignored.
    fn release(&self, region_ptr: u32) {
        if let Some(deallocate) = self.get_deallocate() {
            if let Err(e) = deallocate.call(region_ptr) {
                tracing::debug!(region_ptr, "deallocate failed: {}", e);
            }
        }
    }
}

/// Splits the "sections" encoding used to pass a list of byte arrays in one region: every
/// section is followed by its length as a big-endian u32.
pub fn decode_sections(data: &[u8]) -> Result<Vec<Vec<u8>>, HostError> {
    let mut sections = Vec::new();
    let mut remaining = data;
    while !remaining.is_empty() {
        if remaining.len() < 4 {
            return Err(HostError::MalformedSections);
        }
        let (rest, len) = remaining.split_at(remaining.len() - 4);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if len > rest.len() {
            return Err(HostError::MalformedSections);
        }
        let (rest, section) = rest.split_at(rest.len() - len);
        sections.push(section.to_vec());
        remaining = rest;
    }
    sections.reverse();
    Ok(sections)
}
