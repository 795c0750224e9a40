//! Halcyon Kernel Library
//!
//! This library provides the interrupt-controller core of the Halcyon
//! kernel: the ARM GICv3 driver, the IRQ dispatch tables, and the small
//! synchronization primitives they depend on.
//!
//! Board bring-up (memory map, UART, FDT), the generic timer, and the
//! scheduler live outside this crate and consume it through the public
//! functions in [`gic`].

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod gic;
pub mod irq;
pub mod sync;

// Re-export the types the trap path and drivers interact with.
pub use error::{KernelError, KernelResult};
pub use irq::{IrqHandler, IrqNumber, IrqReturn};
