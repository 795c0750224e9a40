//! Memory-mapped register access.
//!
//! The driver manipulates the distributor and redistributor exclusively
//! through [`MmioBus`], so the register-level logic can be exercised on the
//! host against a fake bus. [`DeviceMmio`] is the real implementation used
//! on hardware.

use core::ptr;

/// Typed access to 32- and 64-bit memory-mapped device registers.
///
/// Every call performs an actual bus access; implementations must not
/// combine or elide accesses. There are no error paths: an unmapped address
/// is a platform-description bug, not a runtime condition.
pub trait MmioBus {
    /// Read a 32-bit register.
    fn read32(&self, addr: usize) -> u32;
    /// Write a 32-bit register.
    fn write32(&self, addr: usize, value: u32);
    /// Read a 64-bit register.
    fn read64(&self, addr: usize) -> u64;
    /// Write a 64-bit register.
    fn write64(&self, addr: usize, value: u64);

    /// Read-modify-write OR of a 32-bit register.
    fn or32(&self, addr: usize, mask: u32) {
        let value = self.read32(addr);
        self.write32(addr, value | mask);
    }

    /// Read-modify-write `(value & and_mask) | or_mask` of a 32-bit
    /// register.
    fn and_then_or32(&self, addr: usize, and_mask: u32, or_mask: u32) {
        let value = self.read32(addr);
        self.write32(addr, (value & and_mask) | or_mask);
    }
}

/// Volatile MMIO access to device memory.
///
/// Addresses handed to this bus come from the platform memory map recorded
/// at GIC init time and are mapped device memory by construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceMmio;

impl MmioBus for DeviceMmio {
    fn read32(&self, addr: usize) -> u32 {
        // SAFETY: `addr` is a register inside the GIC MMIO regions supplied
        // by the platform at init. Volatile read is required for MMIO to
        // prevent compiler reordering/elision.
        unsafe { ptr::read_volatile(addr as *const u32) }
    }

    fn write32(&self, addr: usize, value: u32) {
        // SAFETY: `addr` is a register inside the GIC MMIO regions supplied
        // by the platform at init. Volatile write is required for MMIO to
        // ensure the write reaches the device.
        unsafe { ptr::write_volatile(addr as *mut u32, value) }
    }

    fn read64(&self, addr: usize) -> u64 {
        // SAFETY: As for `read32`; the 64-bit GIC registers are naturally
        // aligned within the mapped regions.
        unsafe { ptr::read_volatile(addr as *const u64) }
    }

    fn write64(&self, addr: usize, value: u64) {
        // SAFETY: As for `write32`; the 64-bit GIC registers are naturally
        // aligned within the mapped regions.
        unsafe { ptr::write_volatile(addr as *mut u64, value) }
    }
}
