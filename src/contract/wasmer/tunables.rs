/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bounds the linear memory of contracts by [MocknetConfig::memory_limit](crate::MocknetConfig).
//!
//! The limit is applied twice. [UploadedCode](crate::contract::UploadedCode) checks the memories a
//! module exports at upload, so a module that can never run is refused with
//! [MocknetError::MemoryLimitExceeded]. [BoundedTunables] then clamps every memory the engine
//! creates, so that `memory.grow` past the limit fails inside the guest.

use loupe::MemoryUsage;
use std::convert::TryFrom;
use std::ptr::NonNull;
use std::sync::Arc;
use wasmer::{
    vm::{self, MemoryError, MemoryStyle, TableStyle, VMMemoryDefinition, VMTableDefinition},
    MemoryType, Pages, TableType, Tunables, WASM_PAGE_SIZE,
};

use crate::error::MocknetError;

/// Linear memory can have at most 65536 pages of 64 KiB.
const MAX_PAGES: u32 = 65536;

/// A guest memory limit in whole WASM pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, MemoryUsage)]
pub struct MemoryLimit {
    pages: Pages,
}

impl MemoryLimit {
    /// rounds `bytes` down to whole pages.
    pub fn from_bytes(bytes: usize) -> Self {
        let pages = u32::try_from(bytes / WASM_PAGE_SIZE).unwrap_or(MAX_PAGES).min(MAX_PAGES);
        Self { pages: Pages(pages) }
    }

    pub fn pages(&self) -> Pages {
        self.pages
    }

    /// the memory a guest gets: its maximum is never above the limit.
    fn clamp(&self, declared: &MemoryType) -> MemoryType {
        let mut clamped = *declared;
        clamped.maximum = Some(match declared.maximum {
            Some(maximum) if maximum < self.pages => maximum,
            _ => self.pages,
        });
        clamped
    }

    /// accepts a memory whose initial size fits under the limit and returns it clamped.
    pub fn admit(&self, declared: &MemoryType) -> Result<MemoryType, MocknetError> {
        if declared.minimum > self.pages {
            return Err(MocknetError::MemoryLimitExceeded {
                requested: declared.minimum.0,
                limit: self.pages.0,
            });
        }
        Ok(self.clamp(declared))
    }
}

/// BoundedTunables creates every guest memory through [MemoryLimit::admit] and leaves everything
/// else to `base`.
#[derive(MemoryUsage)]
pub struct BoundedTunables<T: Tunables> {
    limit: MemoryLimit,
    base: T,
}

impl<T: Tunables> BoundedTunables<T> {
    pub fn new(base: T, limit: MemoryLimit) -> Self {
        Self { limit, base }
    }

    fn admit(&self, ty: &MemoryType) -> Result<MemoryType, MemoryError> {
        self.limit.admit(ty).map_err(|e| MemoryError::Generic(e.to_string()))
    }
}

impl<T: Tunables> Tunables for BoundedTunables<T> {
    fn memory_style(&self, memory: &MemoryType) -> MemoryStyle {
        self.base.memory_style(&self.limit.clamp(memory))
    }

    fn table_style(&self, table: &TableType) -> TableStyle {
        self.base.table_style(table)
    }

    fn create_host_memory(
        &self,
        ty: &MemoryType,
        style: &MemoryStyle,
    ) -> Result<Arc<dyn vm::Memory>, MemoryError> {
        let admitted = self.admit(ty)?;
        self.base.create_host_memory(&admitted, style)
    }

    unsafe fn create_vm_memory(
        &self,
        ty: &MemoryType,
        style: &MemoryStyle,
        vm_definition_location: NonNull<VMMemoryDefinition>,
    ) -> Result<Arc<dyn vm::Memory>, MemoryError> {
        let admitted = self.admit(ty)?;
        self.base.create_vm_memory(&admitted, style, vm_definition_location)
    }

    fn create_host_table(&self, ty: &TableType, style: &TableStyle) -> Result<Arc<dyn vm::Table>, String> {
        self.base.create_host_table(ty, style)
    }

    unsafe fn create_vm_table(
        &self,
        ty: &TableType,
        style: &TableStyle,
        vm_definition_location: NonNull<VMTableDefinition>,
    ) -> Result<Arc<dyn vm::Table>, String> {
        self.base.create_vm_table(ty, style, vm_definition_location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_rounded_down_to_pages() {
        assert_eq!(MemoryLimit::from_bytes(WASM_PAGE_SIZE * 3 + 1).pages(), Pages(3));
        assert_eq!(MemoryLimit::from_bytes(usize::MAX).pages(), Pages(MAX_PAGES));
    }

    #[test]
    fn maximum_is_clamped_to_the_limit() {
        let limit = MemoryLimit::from_bytes(WASM_PAGE_SIZE * 4);
        let unbounded = MemoryType::new(Pages(1), None, false);
        assert_eq!(limit.admit(&unbounded).unwrap().maximum, Some(Pages(4)));

        let above = MemoryType::new(Pages(1), Some(Pages(100)), false);
        assert_eq!(limit.admit(&above).unwrap().maximum, Some(Pages(4)));

        let below = MemoryType::new(Pages(1), Some(Pages(2)), false);
        assert_eq!(limit.admit(&below).unwrap(), below);
    }

    #[test]
    fn oversized_initial_memory_is_refused() {
        let limit = MemoryLimit::from_bytes(WASM_PAGE_SIZE * 4);
        let declared = MemoryType::new(Pages(8), None, false);
        assert!(matches!(
            limit.admit(&declared),
            Err(MocknetError::MemoryLimitExceeded { requested: 8, limit: 4 })
        ));
    }
}
