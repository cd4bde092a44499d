//! # Memory-Mapped I/O
//!
//! Abstraction over register blocks and shared-memory windows reached
//! through PCI BARs.
//!
//! ## Philosophy
//!
//! **Registers are accessed through a trait, never through raw pointers in
//! protocol code.**
//!
//! Protocol crates see only offsets relative to the start of a region. The
//! real implementation ([`VolatileMmio`]) turns those into volatile loads and
//! stores; the test implementation ([`RamMmio`]) backs the region with plain
//! memory so protocol code runs under `cargo test`.
//!
//! All accessors take `&self`: device memory is shared between the CPU
//! paths that touch it (callers, interrupt handler) and the device itself,
//! so the region behaves like interior-mutable state.

use core::ptr::{read_volatile, write_volatile};
use std::sync::Mutex;

/// Memory-mapped region trait
///
/// Offsets are byte offsets from the start of the region. Multi-byte
/// accesses are little-endian, matching PCI.
///
/// ## Implementation Notes
///
/// Implementations must guarantee:
/// - 32-bit accesses are performed as single accesses (not split)
/// - Accesses complete before the call returns
/// - Out-of-range offsets panic rather than touching foreign memory
pub trait Mmio: Send + Sync {
    /// Size of the region in bytes
    fn len(&self) -> usize;

    /// Returns true for a zero-sized region
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a byte
    fn read8(&self, offset: usize) -> u8;

    /// Writes a byte
    fn write8(&self, offset: usize, value: u8);

    /// Reads a 32-bit word
    fn read32(&self, offset: usize) -> u32;

    /// Writes a 32-bit word
    fn write32(&self, offset: usize, value: u32);

    /// Copies `buf.len()` bytes out of the region
    fn copy_from(&self, offset: usize, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read8(offset + i);
        }
    }

    /// Copies `data` into the region
    fn copy_to(&self, offset: usize, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write8(offset + i, *byte);
        }
    }

    /// Fills `len` bytes with `value`
    fn fill(&self, offset: usize, value: u8, len: usize) {
        for i in 0..len {
            self.write8(offset + i, value);
        }
    }
}

/// Real mapped device memory
///
/// Uses volatile loads and stores on a mapped virtual address.
#[derive(Debug)]
pub struct VolatileMmio {
    base: usize,
    len: usize,
}

impl VolatileMmio {
    /// Wraps an already-mapped region
    ///
    /// # Safety
    /// The caller must ensure:
    /// - `base..base + len` is mapped, uncached device memory
    /// - The mapping outlives this value
    /// - No other code treats the region as ordinary Rust memory
    pub unsafe fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    fn check(&self, offset: usize, width: usize) {
        assert!(
            offset + width <= self.len,
            "mmio access at {:#x}+{} outside region of {:#x} bytes",
            offset,
            width,
            self.len
        );
    }
}

// SAFETY: the region is device memory; every access is a single volatile
// operation and the struct holds no Rust-managed data.
unsafe impl Send for VolatileMmio {}
unsafe impl Sync for VolatileMmio {}

impl Mmio for VolatileMmio {
    fn len(&self) -> usize {
        self.len
    }

    fn read8(&self, offset: usize) -> u8 {
        self.check(offset, 1);
        // SAFETY: bounds checked above; mapping validity is a constructor contract.
        unsafe { read_volatile((self.base + offset) as *const u8) }
    }

    fn write8(&self, offset: usize, value: u8) {
        self.check(offset, 1);
        // SAFETY: bounds checked above; mapping validity is a constructor contract.
        unsafe { write_volatile((self.base + offset) as *mut u8, value) }
    }

    fn read32(&self, offset: usize) -> u32 {
        self.check(offset, 4);
        // SAFETY: bounds checked above; 32-bit registers are naturally aligned.
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    fn write32(&self, offset: usize, value: u32) {
        self.check(offset, 4);
        // SAFETY: bounds checked above; 32-bit registers are naturally aligned.
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// RAM-backed region
///
/// Useful for testing and for simulated devices. The region starts zeroed.
#[derive(Debug)]
pub struct RamMmio {
    bytes: Mutex<Vec<u8>>,
}

impl RamMmio {
    /// Creates a zeroed region of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; len]),
        }
    }

    /// Returns a copy of `len` bytes starting at `offset`
    pub fn snapshot(&self, offset: usize, len: usize) -> Vec<u8> {
        let bytes = self.lock();
        bytes[offset..offset + len].to_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Mmio for RamMmio {
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn read8(&self, offset: usize) -> u8 {
        self.lock()[offset]
    }

    fn write8(&self, offset: usize, value: u8) {
        self.lock()[offset] = value;
    }

    fn read32(&self, offset: usize) -> u32 {
        let bytes = self.lock();
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.lock()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn copy_from(&self, offset: usize, buf: &mut [u8]) {
        let bytes = self.lock();
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
    }

    fn copy_to(&self, offset: usize, data: &[u8]) {
        self.lock()[offset..offset + data.len()].copy_from_slice(data);
    }

    fn fill(&self, offset: usize, value: u8, len: usize) {
        self.lock()[offset..offset + len].fill(value);
    }
}
