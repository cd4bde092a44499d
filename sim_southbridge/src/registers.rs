//! Simulated BAR4 register block
//!
//! Only the three ICC registers are backed. The status register is
//! write-one-to-clear, doorbell writes are queued for the firmware thread,
//! and raising a status bit that is unmasked runs the registered interrupt
//! handler on the raising thread.

use hal::{IrqHandler, IrqReturn, Mmio};
use icc::layout::RegisterLayout;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Size of the simulated BAR4
pub const BAR4_SIZE: usize = 0x20_0000;

/// What wakes the firmware thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The host wrote the doorbell
    Doorbell(u32),
    /// Work was queued from the test side
    Poke,
}

#[derive(Default)]
struct RegisterState {
    status: u32,
    irq_mask: u32,
    wakes: VecDeque<Wake>,
    doorbell_log: Vec<u32>,
    interrupts: usize,
}

pub struct SimRegisters {
    layout: RegisterLayout,
    state: Mutex<RegisterState>,
    woken: Condvar,
    handler: Mutex<Option<Arc<dyn IrqHandler>>>,
}

impl SimRegisters {
    pub fn new(layout: RegisterLayout) -> Self {
        Self {
            layout,
            state: Mutex::new(RegisterState::default()),
            woken: Condvar::new(),
            handler: Mutex::new(None),
        }
    }

    pub fn layout(&self) -> RegisterLayout {
        self.layout
    }

    pub fn status(&self) -> u32 {
        self.lock().status
    }

    pub fn irq_mask(&self) -> u32 {
        self.lock().irq_mask
    }

    /// Every value the host wrote to the doorbell, oldest first
    pub fn doorbell_log(&self) -> Vec<u32> {
        self.lock().doorbell_log.clone()
    }

    /// Interrupts delivered so far
    pub fn interrupts(&self) -> usize {
        self.lock().interrupts
    }

    /// Connects the interrupt line
    pub fn attach(&self, handler: Arc<dyn IrqHandler>) {
        *self.lock_handler() = Some(handler);
    }

    pub fn detach(&self) {
        *self.lock_handler() = None;
    }

    /// Sets status bits and delivers the interrupt if any of them is unmasked
    pub fn raise(&self, bits: u32) -> Option<IrqReturn> {
        let fire = {
            let mut state = self.lock();
            state.status |= bits;
            state.irq_mask & bits != 0
        };
        if fire {
            self.deliver()
        } else {
            None
        }
    }

    /// Runs the interrupt handler regardless of status, as a shared line would
    pub fn deliver(&self) -> Option<IrqReturn> {
        let handler = self.lock_handler().clone()?;
        self.lock().interrupts += 1;
        Some(handler.handle_irq())
    }

    /// Queues a wake-up without a doorbell write
    pub fn poke(&self) {
        self.lock().wakes.push_back(Wake::Poke);
        self.woken.notify_all();
    }

    /// Waits for the next doorbell write or poke
    pub fn wait_wake(&self, timeout: Duration) -> Option<Wake> {
        let guard = self.lock();
        let (mut state, _) = self
            .woken
            .wait_timeout_while(guard, timeout, |state| state.wakes.is_empty())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.wakes.pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, RegisterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_handler(&self) -> MutexGuard<'_, Option<Arc<dyn IrqHandler>>> {
        self.handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Mmio for SimRegisters {
    fn len(&self) -> usize {
        BAR4_SIZE
    }

    fn read8(&self, offset: usize) -> u8 {
        let aligned = offset & !3;
        self.read32(aligned).to_le_bytes()[offset - aligned]
    }

    fn write8(&self, offset: usize, _value: u8) {
        log::warn!("sim: ignoring byte write to BAR4 at {:#x}", offset);
    }

    fn read32(&self, offset: usize) -> u32 {
        let state = self.lock();
        if offset == self.layout.status {
            state.status
        } else if offset == self.layout.irq_mask {
            state.irq_mask
        } else {
            0
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.lock();
        if offset == self.layout.status {
            state.status &= !value;
        } else if offset == self.layout.irq_mask {
            state.irq_mask = value;
        } else if offset == self.layout.doorbell {
            state.doorbell_log.push(value);
            state.wakes.push_back(Wake::Doorbell(value));
            drop(state);
            self.woken.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icc::layout::{SouthbridgeVariant, ICC_ACK, ICC_SEND};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count(AtomicUsize);

    impl IrqHandler for Count {
        fn handle_irq(&self) -> IrqReturn {
            self.0.fetch_add(1, Ordering::SeqCst);
            IrqReturn::Handled
        }
    }

    fn registers() -> SimRegisters {
        SimRegisters::new(SouthbridgeVariant::Aeolia.registers())
    }

    #[test]
    fn test_status_is_write_one_to_clear() {
        let regs = registers();
        regs.raise(ICC_SEND | ICC_ACK);
        regs.write32(regs.layout().status, ICC_ACK);
        assert_eq!(regs.read32(regs.layout().status), ICC_SEND);
    }

    #[test]
    fn test_masked_bits_do_not_interrupt() {
        let regs = registers();
        let count = Arc::new(Count(AtomicUsize::new(0)));
        regs.attach(count.clone());

        assert_eq!(regs.raise(ICC_SEND), None);
        regs.write32(regs.layout().irq_mask, ICC_SEND);
        assert_eq!(regs.raise(ICC_SEND), Some(IrqReturn::Handled));
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
        assert_eq!(regs.interrupts(), 1);
    }

    #[test]
    fn test_doorbell_wakes_in_order() {
        let regs = registers();
        regs.write32(regs.layout().doorbell, ICC_SEND);
        regs.poke();
        regs.write32(regs.layout().doorbell, ICC_ACK);

        let timeout = Duration::from_millis(10);
        assert_eq!(regs.wait_wake(timeout), Some(Wake::Doorbell(ICC_SEND)));
        assert_eq!(regs.wait_wake(timeout), Some(Wake::Poke));
        assert_eq!(regs.wait_wake(timeout), Some(Wake::Doorbell(ICC_ACK)));
        assert_eq!(regs.wait_wake(timeout), None);
        assert_eq!(regs.doorbell_log(), vec![ICC_SEND, ICC_ACK]);
    }

    #[test]
    fn test_byte_reads_see_registers() {
        let regs = registers();
        regs.raise(0x0102);
        let status = regs.layout().status;
        assert_eq!(regs.read8(status), 0x02);
        assert_eq!(regs.read8(status + 1), 0x01);
        assert_eq!(regs.read8(0x10), 0);
    }
}
