//! Device bring-up and teardown
//!
//! The ICC registers live in BAR4 of the southbridge's main PCI function,
//! but the frames live in a window of SPM, which is BAR5 of a different
//! function. Bring-up reserves both, maps the window, hooks the interrupt,
//! publishes the mailbox in the [registry](crate::registry) and finally
//! unmasks the interrupt sources. A failure at any step releases what was
//! acquired before it, in reverse order.

use crate::config::IccConfig;
use crate::error::InitError;
use crate::layout::{Slot, SouthbridgeVariant, ICC_REGION_SIZE, SPM_ICC_BASE, SPM_ICC_SIZE};
use crate::mailbox::Mailbox;
use crate::registry;
use hal::{MemRegion, Mmio, PciPlatform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Name under which the register region is reserved
pub const ICC_REGION_NAME: &str = "apcie.icc";
/// Name under which the SPM window is reserved
pub const SPM_REGION_NAME: &str = "spm.icc";
/// Name under which the interrupt handler is registered
pub const IRQ_NAME: &str = "icc";

/// Identity of one brought-up ICC device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IccDeviceId(Uuid);

impl IccDeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IccDeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IccDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "icc-{}", self.0)
    }
}

/// What the PCI layer hands the ICC driver
#[derive(Clone)]
pub struct IccResources {
    /// BAR4 of the main function, already mapped by the parent driver
    pub bar4: Arc<dyn Mmio>,
    /// Physical range of BAR4
    pub bar4_region: MemRegion,
    /// Physical range of BAR5 of the memory function
    pub spm_bar: MemRegion,
    /// Interrupt line of the ICC subfunction
    pub irq: u32,
}

impl IccResources {
    /// Physical range of the ICC register block
    pub fn icc_region(&self, variant: SouthbridgeVariant) -> MemRegion {
        self.bar4_region
            .offset(variant.icc_region_base(), ICC_REGION_SIZE)
    }

    /// Physical range of the ICC window in SPM
    pub fn spm_region(&self) -> MemRegion {
        self.spm_bar.offset(SPM_ICC_BASE, SPM_ICC_SIZE)
    }
}

/// Resources acquired so far; released in reverse on drop unless disarmed
struct Acquired<'a, P: PciPlatform + ?Sized> {
    platform: &'a mut P,
    icc_region: Option<MemRegion>,
    spm_region: Option<MemRegion>,
    mapped: Option<MemRegion>,
    irq: Option<u32>,
}

impl<'a, P: PciPlatform + ?Sized> Acquired<'a, P> {
    fn new(platform: &'a mut P) -> Self {
        Self {
            platform,
            icc_region: None,
            spm_region: None,
            mapped: None,
            irq: None,
        }
    }

    fn disarm(mut self) {
        self.icc_region = None;
        self.spm_region = None;
        self.mapped = None;
        self.irq = None;
    }
}

impl<P: PciPlatform + ?Sized> Drop for Acquired<'_, P> {
    fn drop(&mut self) {
        if let Some(irq) = self.irq.take() {
            self.platform.free_irq(irq);
        }
        if let Some(region) = self.mapped.take() {
            self.platform.unmap(region);
        }
        if let Some(region) = self.spm_region.take() {
            self.platform.release_mem_region(region);
        }
        if let Some(region) = self.icc_region.take() {
            self.platform.release_mem_region(region);
        }
    }
}

/// A brought-up ICC device
///
/// Owns every resource acquired by [`IccDevice::probe`]; hand them back
/// with [`IccDevice::remove`].
pub struct IccDevice {
    id: IccDeviceId,
    mailbox: Arc<Mailbox>,
    icc_region: MemRegion,
    spm_region: MemRegion,
    irq: u32,
}

impl IccDevice {
    /// Brings up the ICC mailbox
    pub fn probe<P: PciPlatform + ?Sized>(
        platform: &mut P,
        resources: &IccResources,
        config: &IccConfig,
    ) -> Result<Self, InitError> {
        let icc_region = resources.icc_region(config.variant);
        let spm_region = resources.spm_region();
        let mut acquired = Acquired::new(platform);

        acquired
            .platform
            .request_mem_region(icc_region, ICC_REGION_NAME)
            .map_err(|source| {
                log::error!("icc: failed to request ICC register region {}", icc_region);
                InitError::Reserve {
                    name: ICC_REGION_NAME,
                    source,
                }
            })?;
        acquired.icc_region = Some(icc_region);

        acquired
            .platform
            .request_mem_region(spm_region, SPM_REGION_NAME)
            .map_err(|source| {
                log::error!("icc: failed to request ICC SPM region {}", spm_region);
                InitError::Reserve {
                    name: SPM_REGION_NAME,
                    source,
                }
            })?;
        acquired.spm_region = Some(spm_region);

        let spm = acquired.platform.map(spm_region).map_err(|err| {
            log::error!("icc: failed to map ICC portion of SPM");
            InitError::Map(err)
        })?;
        acquired.mapped = Some(spm_region);

        let mailbox = Arc::new(Mailbox::new(spm, resources.bar4.clone(), config));
        mailbox.clear_status();

        acquired
            .platform
            .request_irq(resources.irq, IRQ_NAME, mailbox.clone())
            .map_err(|err| {
                log::error!("icc: could not request IRQ {}: {}", resources.irq, err);
                InitError::Irq(err)
            })?;
        acquired.irq = Some(resources.irq);

        let slot = Slot::Request.state(mailbox.spm.as_ref());
        if !slot.is_idle() {
            log::error!(
                "icc: request buffer is busy: empty={} full={}",
                slot.empty,
                slot.full
            );
            return Err(InitError::SlotBusy {
                empty: slot.empty,
                full: slot.full,
            });
        }

        let id = IccDeviceId::new();
        registry::install(id, mailbox.clone());
        mailbox.set_irq_enabled(true);
        acquired.disarm();

        log::info!(
            "icc: {} up ({:?}, regs {}, spm {}, irq {})",
            id,
            config.variant,
            icc_region,
            spm_region,
            resources.irq
        );

        Ok(Self {
            id,
            mailbox,
            icc_region,
            spm_region,
            irq: resources.irq,
        })
    }

    pub fn id(&self) -> IccDeviceId {
        self.id
    }

    /// The device's mailbox, usable as an [`IccTransport`](crate::IccTransport)
    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    /// Tears the device down, releasing everything `probe` acquired
    pub fn remove<P: PciPlatform + ?Sized>(self, platform: &mut P) {
        registry::uninstall(self.id);
        self.mailbox.set_irq_enabled(false);
        platform.free_irq(self.irq);
        platform.unmap(self.spm_region);
        platform.release_mem_region(self.spm_region);
        platform.release_mem_region(self.icc_region);
        log::info!("icc: {} removed", self.id);
    }
}
