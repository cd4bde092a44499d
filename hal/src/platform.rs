//! # PCI Platform Services
//!
//! Resource acquisition that a driver performs during bring-up: reserving
//! physical regions, mapping them, and registering interrupt handlers.
//!
//! Discovery of BARs and allocation of IRQ vectors happen before a driver
//! runs, so this trait only covers what a driver asks of the platform once
//! it knows its addresses.

use crate::interrupts::IrqHandler;
use crate::mmio::Mmio;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A physical memory range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemRegion {
    /// Physical base address
    pub base: u64,
    /// Length in bytes
    pub len: u64,
}

impl MemRegion {
    pub const fn new(base: u64, len: u64) -> Self {
        Self { base, len }
    }

    /// Returns the sub-range starting `offset` bytes into this region
    pub const fn offset(self, offset: u64, len: u64) -> Self {
        Self {
            base: self.base + offset,
            len,
        }
    }
}

impl fmt::Display for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}..{:#x})", self.base, self.base + self.len)
    }
}

/// Platform errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("region {0} is already reserved")]
    RegionBusy(MemRegion),

    #[error("failed to map region {0}")]
    MapFailed(MemRegion),

    #[error("failed to register handler on IRQ {0}")]
    IrqUnavailable(u32),
}

/// Platform services trait
///
/// Every successful `request_*`/`map` call must be mirrored by the matching
/// release call during teardown, in reverse order.
pub trait PciPlatform {
    /// Reserves a physical region for exclusive use under `name`
    fn request_mem_region(&mut self, region: MemRegion, name: &str) -> Result<(), PlatformError>;

    /// Releases a reservation made by `request_mem_region`
    fn release_mem_region(&mut self, region: MemRegion);

    /// Maps a reserved region for register access
    fn map(&mut self, region: MemRegion) -> Result<Arc<dyn Mmio>, PlatformError>;

    /// Unmaps a region mapped by `map`
    fn unmap(&mut self, region: MemRegion);

    /// Registers a handler on a (possibly shared) interrupt line
    fn request_irq(
        &mut self,
        irq: u32,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<(), PlatformError>;

    /// Removes the handler registered on `irq`
    fn free_irq(&mut self, irq: u32);
}
