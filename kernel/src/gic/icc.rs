//! GIC CPU interface and core identity.
//!
//! GICv3 moved the CPU interface from MMIO into system registers; this
//! module wraps the `ICC_*` accesses (and the `MPIDR_EL1` read the
//! redistributor walk needs) behind [`CpuInterface`] so the dispatch logic
//! can be driven by a scripted implementation in tests.

/// Per-core side of the interrupt controller.
pub trait CpuInterface {
    /// Read the running core's hardware identifier (MPIDR).
    fn mpidr(&self) -> u64;

    /// Linear index of the running core, used to key the per-core handler
    /// table. Derived from Aff0; assumes the platform numbers cores
    /// linearly at affinity level 0.
    fn current_cpu(&self) -> usize {
        (self.mpidr() & 0xff) as usize
    }

    /// Set the priority mask; interrupts with priority values at or above
    /// the mask are not signaled to this core.
    fn set_priority_mask(&self, mask: u8);

    /// Set the binary point controlling preemption grouping for Group 1.
    fn set_binary_point(&self, bpr: u8);

    /// Enable signaling of Group 1 interrupts to this core.
    fn enable_group1(&self);

    /// Acknowledge the highest-priority pending interrupt, marking it
    /// active, and return the raw acknowledge value.
    fn acknowledge(&self) -> u32;

    /// Signal completion of the interrupt with the acknowledged ID.
    fn end_of_interrupt(&self, intid: u32);
}

/// The real CPU interface, via `ICC_*_EL1` system registers.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct IccSysregs;

#[cfg(target_arch = "aarch64")]
impl CpuInterface for IccSysregs {
    fn mpidr(&self) -> u64 {
        let mpidr: u64;
        // SAFETY: MPIDR_EL1 is a read-only identification register,
        // readable at EL1 with no side effects.
        unsafe {
            core::arch::asm!("mrs {}, MPIDR_EL1", out(reg) mpidr, options(nomem, nostack));
        }
        mpidr
    }

    fn set_priority_mask(&self, mask: u8) {
        // SAFETY: ICC_PMR_EL1 is writable at EL1; changing the mask only
        // filters which interrupts are signaled to this core.
        unsafe {
            core::arch::asm!(
                "msr ICC_PMR_EL1, {}",
                in(reg) mask as u64,
                options(nomem, nostack)
            );
        }
    }

    fn set_binary_point(&self, bpr: u8) {
        // SAFETY: ICC_BPR1_EL1 is writable at EL1 and only affects
        // preemption grouping for Group 1 interrupts on this core.
        unsafe {
            core::arch::asm!(
                "msr ICC_BPR1_EL1, {}",
                in(reg) bpr as u64,
                options(nomem, nostack)
            );
        }
    }

    fn enable_group1(&self) {
        // SAFETY: Writing 1 to ICC_IGRPEN1_EL1 enables Group 1 interrupt
        // signaling; the distributor state is already configured when the
        // initializer reaches this point. The ISB makes the enable visible
        // before any subsequent instruction.
        unsafe {
            core::arch::asm!(
                "msr ICC_IGRPEN1_EL1, {}",
                "isb",
                in(reg) 1u64,
                options(nomem, nostack)
            );
        }
    }

    fn acknowledge(&self) -> u32 {
        let iar: u64;
        // SAFETY: Reading ICC_IAR1_EL1 is the architectural acknowledge
        // for Group 1 interrupts; it atomically returns the pending INTID
        // and marks it active. The DSB orders the read against the
        // handler's device accesses.
        unsafe {
            core::arch::asm!(
                "mrs {}, ICC_IAR1_EL1",
                "dsb sy",
                out(reg) iar,
                options(nomem, nostack)
            );
        }
        iar as u32
    }

    fn end_of_interrupt(&self, intid: u32) {
        // SAFETY: Writing the acknowledged INTID to ICC_EOIR1_EL1 drops
        // its active state; the value written always comes from a prior
        // `acknowledge` on this core.
        unsafe {
            core::arch::asm!(
                "msr ICC_EOIR1_EL1, {}",
                in(reg) intid as u64,
                options(nomem, nostack)
            );
        }
    }
}

/// Mask IRQs and FIQs on this core, returning the previous DAIF state.
///
/// Held around handler-table mutation so an interrupt delivered mid-update
/// on the registering core cannot deadlock against the table lock.
#[cfg(target_arch = "aarch64")]
pub fn local_irq_save() -> u64 {
    let daif: u64;
    // SAFETY: Reading DAIF and masking I+F is a core-local state change,
    // undone by `local_irq_restore` with the returned value.
    unsafe {
        core::arch::asm!(
            "mrs {}, DAIF",
            "msr DAIFSet, #3",
            out(reg) daif,
            options(nomem, nostack)
        );
    }
    daif
}

/// Restore the DAIF state saved by [`local_irq_save`].
#[cfg(target_arch = "aarch64")]
pub fn local_irq_restore(daif: u64) {
    // SAFETY: Restores exactly the DAIF bits captured by the paired
    // `local_irq_save` on this core.
    unsafe {
        core::arch::asm!("msr DAIF, {}", in(reg) daif, options(nomem, nostack));
    }
}
