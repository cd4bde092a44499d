//! Simulated PCI platform
//!
//! Hands out the simulated BAR4 and SPM window and records every resource
//! call so tests can check that bring-up and teardown balance.

use crate::registers::SimRegisters;
use hal::{IrqHandler, MemRegion, Mmio, PciPlatform, PlatformError, RamMmio};
use std::collections::HashSet;
use std::sync::Arc;

/// One resource call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Reserve(MemRegion, String),
    Release(MemRegion),
    Map(MemRegion),
    Unmap(MemRegion),
    RequestIrq(u32, String),
    FreeIrq(u32),
}

/// A step to fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    /// Reserving the region with this name
    Reserve(String),
    Map,
    Irq,
}

pub struct SimPlatform {
    spm: Arc<RamMmio>,
    spm_region: MemRegion,
    regs: Arc<SimRegisters>,
    reserved: HashSet<MemRegion>,
    mapped: HashSet<MemRegion>,
    irqs: HashSet<u32>,
    calls: Vec<PlatformCall>,
    fail: Option<FailPoint>,
}

impl SimPlatform {
    /// `spm_region` is the only range [`PciPlatform::map`] accepts
    pub fn new(spm: Arc<RamMmio>, spm_region: MemRegion, regs: Arc<SimRegisters>) -> Self {
        Self {
            spm,
            spm_region,
            regs,
            reserved: HashSet::new(),
            mapped: HashSet::new(),
            irqs: HashSet::new(),
            calls: Vec::new(),
            fail: None,
        }
    }

    /// Makes one step fail until cleared
    pub fn fail_at(&mut self, point: Option<FailPoint>) {
        self.fail = point;
    }

    pub fn calls(&self) -> &[PlatformCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Nothing reserved, mapped or registered
    pub fn is_clean(&self) -> bool {
        self.reserved.is_empty() && self.mapped.is_empty() && self.irqs.is_empty()
    }
}

impl PciPlatform for SimPlatform {
    fn request_mem_region(&mut self, region: MemRegion, name: &str) -> Result<(), PlatformError> {
        self.calls.push(PlatformCall::Reserve(region, name.to_string()));
        if matches!(&self.fail, Some(FailPoint::Reserve(failing)) if failing == name) {
            return Err(PlatformError::RegionBusy(region));
        }
        if !self.reserved.insert(region) {
            return Err(PlatformError::RegionBusy(region));
        }
        Ok(())
    }

    fn release_mem_region(&mut self, region: MemRegion) {
        self.calls.push(PlatformCall::Release(region));
        if !self.reserved.remove(&region) {
            log::warn!("sim: releasing unreserved region {}", region);
        }
    }

    fn map(&mut self, region: MemRegion) -> Result<Arc<dyn Mmio>, PlatformError> {
        self.calls.push(PlatformCall::Map(region));
        if self.fail == Some(FailPoint::Map) || region != self.spm_region {
            return Err(PlatformError::MapFailed(region));
        }
        self.mapped.insert(region);
        Ok(self.spm.clone() as Arc<dyn Mmio>)
    }

    fn unmap(&mut self, region: MemRegion) {
        self.calls.push(PlatformCall::Unmap(region));
        self.mapped.remove(&region);
    }

    fn request_irq(
        &mut self,
        irq: u32,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<(), PlatformError> {
        self.calls.push(PlatformCall::RequestIrq(irq, name.to_string()));
        if self.fail == Some(FailPoint::Irq) || self.irqs.contains(&irq) {
            return Err(PlatformError::IrqUnavailable(irq));
        }
        self.irqs.insert(irq);
        self.regs.attach(handler);
        Ok(())
    }

    fn free_irq(&mut self, irq: u32) {
        self.calls.push(PlatformCall::FreeIrq(irq));
        if self.irqs.remove(&irq) {
            self.regs.detach();
        }
    }
}
