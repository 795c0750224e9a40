//! Redistributor frame location.
//!
//! Each core owns one redistributor, found by walking the platform's
//! redistributor region and comparing the affinity encoded in every frame's
//! `GICR_TYPER` against the running core's. The walk is stateless and
//! re-run on every per-core register access; it reads only hardware-owned
//! memory, so it is safe on all cores concurrently.

use super::{
    mmio::MmioBus,
    regs::{self, GicrTyper},
};

/// MPIDR affinity field masks.
const AFF0_AFF1_AFF2: u64 = 0x00ff_ffff;
const AFF3: u64 = 0xff_0000_0000;

/// Repack a core's MPIDR into the canonical affinity comparison key.
///
/// The key layout is Aff0[7:0], Aff1[15:8], Aff2[23:16], Aff3[31:24];
/// MPIDR keeps Aff3 at bits [39:32], so it is shifted down over the gap.
/// This matches the encoding of `GICR_TYPER[63:32]`.
#[inline]
pub fn cpu_affinity(mpidr: u64) -> u64 {
    (mpidr & AFF0_AFF1_AFF2) | ((mpidr & AFF3) >> 8)
}

/// Locate the redistributor frame owned by the core with the given MPIDR.
///
/// Returns the frame's base address. The stride to the next frame is
/// decided per frame from its own VLPIS bit: the GIC specification does
/// not forbid mixing redistributors with and without virtual-LPI support,
/// so heterogeneous granularities are tolerated. Frames are assumed
/// adjacent for all cores, which may not hold on NUMA systems.
///
/// # Panics
///
/// Panics if the frame marked last is reached without a match; a core
/// without a redistributor is a platform-description bug the boot cannot
/// continue past.
pub fn locate<B: MmioBus>(bus: &B, gicr_base: usize, mpidr: u64) -> usize {
    let affinity = cpu_affinity(mpidr);
    let mut frame = gicr_base;

    loop {
        let typer = bus.read64(frame + regs::GICR_TYPER);
        if regs::gicr_typer_affinity(typer) == affinity {
            return frame;
        }

        if GicrTyper::from_bits_truncate(typer).contains(GicrTyper::LAST) {
            panic!(
                "no redistributor frame for core affinity {:#010x} in region {:#x}",
                affinity, gicr_base
            );
        }

        frame += if GicrTyper::from_bits_truncate(typer).contains(GicrTyper::VLPIS) {
            regs::GICR_V4_STRIDE
        } else {
            regs::GICR_V3_STRIDE
        };
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::FakeBus;
    use super::*;

    const GICR_BASE: usize = 0x0808_0000;

    #[test]
    fn affinity_key_repacks_aff3() {
        // Aff3 = 0x12 at MPIDR[39:32], Aff2/1/0 = 0x34/0x56/0x78.
        let mpidr = 0x0000_0012_0034_5678u64 | (1 << 31);
        assert_eq!(cpu_affinity(mpidr), 0x1234_5678);
    }

    #[test]
    fn walk_finds_matching_frame() {
        let bus = FakeBus::new();
        // Frames for affinities A, B, C; only C carries the Last bit.
        bus.preset64(GICR_BASE + regs::GICR_TYPER, 0xAA << 32);
        bus.preset64(
            GICR_BASE + regs::GICR_V3_STRIDE + regs::GICR_TYPER,
            0xBB << 32,
        );
        bus.preset64(
            GICR_BASE + 2 * regs::GICR_V3_STRIDE + regs::GICR_TYPER,
            (0xCC << 32) | GicrTyper::LAST.bits(),
        );

        let frame = locate(&bus, GICR_BASE, 0xBB);
        assert_eq!(frame, GICR_BASE + regs::GICR_V3_STRIDE);
    }

    #[test]
    fn vlpis_frame_advances_with_gicv4_stride() {
        let bus = FakeBus::new();
        // First frame advertises virtual LPIs, so the second frame sits a
        // GICv4 stride away.
        bus.preset64(
            GICR_BASE + regs::GICR_TYPER,
            (0xAA << 32) | GicrTyper::VLPIS.bits(),
        );
        bus.preset64(
            GICR_BASE + regs::GICR_V4_STRIDE + regs::GICR_TYPER,
            (0xBB << 32) | GicrTyper::LAST.bits(),
        );

        let frame = locate(&bus, GICR_BASE, 0xBB);
        assert_eq!(frame, GICR_BASE + regs::GICR_V4_STRIDE);
    }

    #[test]
    fn last_frame_itself_can_match() {
        let bus = FakeBus::new();
        bus.preset64(
            GICR_BASE + regs::GICR_TYPER,
            (0xAA << 32) | GicrTyper::LAST.bits(),
        );
        assert_eq!(locate(&bus, GICR_BASE, 0xAA), GICR_BASE);
    }

    #[test]
    #[should_panic(expected = "no redistributor frame")]
    fn missing_frame_is_fatal() {
        let bus = FakeBus::new();
        bus.preset64(GICR_BASE + regs::GICR_TYPER, 0xAA << 32);
        bus.preset64(
            GICR_BASE + regs::GICR_V3_STRIDE + regs::GICR_TYPER,
            (0xBB << 32) | GicrTyper::LAST.bits(),
        );
        locate(&bus, GICR_BASE, 0xDD);
    }
}
