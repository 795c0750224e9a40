//! GICv3 register map.
//!
//! Offsets and field layouts follow the ARM GICv3 architecture
//! specification and must be reproduced exactly for hardware and emulator
//! compatibility.

use bitflags::bitflags;

// ---------------------------------------------------------------------------
// Distributor (GICD) register offsets
// ---------------------------------------------------------------------------

/// Distributor Control Register.
pub const GICD_CTLR: usize = 0x0000;
/// Interrupt Controller Type Register -- reports number of interrupt lines.
pub const GICD_TYPER: usize = 0x0004;
/// Interrupt Group Registers (one bit per interrupt).
pub const GICD_IGROUPR: usize = 0x0080;
/// Interrupt Set-Enable Registers (write-1-to-set, one bit per interrupt).
pub const GICD_ISENABLER: usize = 0x0100;
/// Interrupt Clear-Enable Registers (write-1-to-clear).
pub const GICD_ICENABLER: usize = 0x0180;
/// Interrupt Priority Registers (one byte per interrupt).
pub const GICD_IPRIORITYR: usize = 0x0400;
/// Interrupt Routing Registers. One 64-bit register per SPI, starting at
/// INTID 32 (`GICD_IROUTER + (intid - 32) * 8`).
pub const GICD_IROUTER: usize = 0x6100;

bitflags! {
    /// GICD_CTLR fields for a GIC with affinity routing.
    ///
    /// The meaning of the low enable bits depends on whether affinity
    /// routing is active; the distributor-enable path checks ARE before
    /// choosing which bit to set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GicdCtlr: u32 {
        /// Legacy single-group enable (ARE clear).
        const ENABLE_GRP0 = 1 << 0;
        /// Enable non-secure Group 1 interrupts (ARE set).
        const ENABLE_GRP1_NS = 1 << 1;
        /// Affinity Routing Enable.
        const ARE = 1 << 4;
        /// Disable Security -- the GIC has a single security state.
        const DS = 1 << 6;
    }
}

// ---------------------------------------------------------------------------
// Redistributor (GICR) registers
// ---------------------------------------------------------------------------

/// Redistributor Type Register (64-bit), in the RD_base control frame.
pub const GICR_TYPER: usize = 0x0008;

/// Each redistributor page is 64 KiB.
pub const GICR_FRAME_SIZE: usize = 0x1_0000;

/// GICv3 redistributor granularity: RD_base control frame plus the SGI/PPI
/// control and generation frame.
pub const GICR_V3_STRIDE: usize = 2 * GICR_FRAME_SIZE;

/// GICv4 adds a VLPI frame and a reserved page on top of the GICv3 pair.
pub const GICR_V4_STRIDE: usize = 4 * GICR_FRAME_SIZE;

/// SGI/PPI frame registers, relative to `frame + GICR_FRAME_SIZE`. They use
/// the same layout as the corresponding distributor registers, restricted
/// to the first 32 vectors.
pub const GICR_IGROUPR0: usize = 0x0080;
/// Set-enable for SGIs/PPIs (write-1-to-set).
pub const GICR_ISENABLER0: usize = 0x0100;
/// Clear-enable for SGIs/PPIs (write-1-to-clear).
pub const GICR_ICENABLER0: usize = 0x0180;
/// Priority bytes for SGIs/PPIs.
pub const GICR_IPRIORITYR: usize = 0x0400;

bitflags! {
    /// GICR_TYPER fields the frame walk cares about. The owning core's
    /// affinity lives in bits [63:32].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GicrTyper: u64 {
        /// The redistributor supports virtual LPIs (GICv4 frame layout).
        const VLPIS = 1 << 1;
        /// This is the last redistributor frame in the region.
        const LAST = 1 << 4;
    }
}

/// Extract the affinity key encoded in a `GICR_TYPER` value.
#[inline]
pub fn gicr_typer_affinity(typer: u64) -> u64 {
    typer >> 32
}

// ---------------------------------------------------------------------------
// Architectural constants
// ---------------------------------------------------------------------------

/// Reset priority for every vector during controller bring-up.
pub const DEFAULT_PRIORITY: u8 = 0x80;

/// Binary point value disabling preemption grouping.
pub const NO_PREEMPTION_BPR: u8 = 0x7;

/// Acknowledge register INTID field mask.
pub const INTID_MASK: u32 = 0x3ff;

/// Acknowledged IDs at or above this are spurious (1022, 1023) and must
/// neither be dispatched nor EOI'd.
pub const SPURIOUS_THRESHOLD: u32 = 0x3fe;
