//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the hardware traits the southbridge drivers are
//! written against.
//!
//! ## Philosophy
//!
//! **Protocol code never touches hardware directly.**
//!
//! Register blocks, shared-memory windows, interrupt lines and resource
//! reservation all go through traits. Real implementations wrap mapped
//! device memory; test implementations back the same traits with RAM.
//!
//! ## Design Principles
//!
//! 1. **Offsets, not pointers**: Drivers address registers relative to a region
//! 2. **Trait-based**: All hardware operations go through traits
//! 3. **Minimal unsafe**: Only [`VolatileMmio`] dereferences raw addresses
//! 4. **Testable**: Every trait has an in-memory implementation or is easy to fake

pub mod interrupts;
pub mod mmio;
pub mod platform;

pub use interrupts::{IrqHandler, IrqReturn};
pub use mmio::{Mmio, RamMmio, VolatileMmio};
pub use platform::{MemRegion, PciPlatform, PlatformError};
