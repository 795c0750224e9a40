//! ARM GICv3 interrupt controller driver.
//!
//! The GICv3 splits interrupt delivery across three blocks:
//!
//! - **Distributor (GICD)**: one per system, routes shared peripheral
//!   interrupts (SPIs, INTIDs 32-1019) and holds their enable, priority,
//!   group, and affinity-routing state.
//! - **Redistributor (GICR)**: one per core, holds the same state for that
//!   core's SGIs (0-15) and PPIs (16-31). Located by walking the
//!   redistributor region and matching each frame's affinity against the
//!   running core's (see [`redistributor`]).
//! - **CPU interface**: system registers (`ICC_*_EL1`) for acknowledge,
//!   priority masking, and end-of-interrupt (see [`icc`]).
//!
//! The driver core ([`Gic`]) is generic over the register bus and the CPU
//! interface so it runs identically against hardware and against the fakes
//! in the test suite. The bottom of this module pins the generics to the
//! real implementations and exposes the free-function API the rest of the
//! kernel calls.

pub mod icc;
pub mod mmio;
pub mod redistributor;
pub mod regs;
#[cfg(test)]
pub(crate) mod testutil;

use icc::CpuInterface;
use mmio::MmioBus;
use regs::GicdCtlr;

use crate::{
    error::{KernelError, KernelResult},
    irq::{HandlerTable, IrqNumber, IrqReturn, MAX_PER_CPU_INT},
};

/// The affinity fields of an MPIDR value, in `GICD_IROUTER` layout
/// (Aff0-Aff2 at [23:0], Aff3 at [39:32] -- no repacking).
const IROUTER_AFFINITY: u64 = 0x0000_00ff_00ff_ffff;

/// GICv3 controller state.
///
/// Holds the distributor and redistributor-region base addresses and the
/// interrupt count discovered from `GICD_TYPER`. Set once during boot and
/// immutable afterwards; every operation is `&self`.
pub struct Gic<B: MmioBus, C: CpuInterface> {
    /// Base address of the distributor registers.
    gicd_base: usize,
    /// Base address of the redistributor region (first frame).
    gicr_base: usize,
    /// Total number of interrupt IDs supported (reserved IDs excluded).
    num_irqs: u32,
    bus: B,
    cpu: C,
}

impl<B: MmioBus, C: CpuInterface> Gic<B, C> {
    /// Record the controller topology and discover the interrupt count.
    ///
    /// `GICD_TYPER.ITLinesNumber` encodes the count as `32 * (N + 1)`; the
    /// all-ones field value means the full architectural range, of which
    /// IDs 1020-1023 are reserved.
    pub fn new(bus: B, cpu: C, gicd_base: usize, gicr_base: usize) -> Self {
        let it_lines = bus.read32(gicd_base + regs::GICD_TYPER) & 0x1f;
        let num_irqs = if it_lines == 0x1f {
            1020
        } else {
            32 * (it_lines + 1)
        };

        Self {
            gicd_base,
            gicr_base,
            num_irqs,
            bus,
            cpu,
        }
    }

    /// Number of interrupt IDs this controller implements.
    pub fn num_irqs(&self) -> u32 {
        self.num_irqs
    }

    pub(crate) fn cpu(&self) -> &C {
        &self.cpu
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> &B {
        &self.bus
    }

    /// Shared peripheral interrupts live in the distributor; everything
    /// below 32 is banked in the owning core's redistributor.
    fn is_spi(vector: u32) -> bool {
        (MAX_PER_CPU_INT..crate::irq::GIC_MAX_INT).contains(&vector)
    }

    /// SGI/PPI control page of this core's redistributor.
    ///
    /// Re-walks the region on every call rather than caching the frame;
    /// the walk is cheap, stateless, and always correct for the core it
    /// runs on.
    fn sgi_frame(&self) -> usize {
        redistributor::locate(&self.bus, self.gicr_base, self.cpu.mpidr()) + regs::GICR_FRAME_SIZE
    }

    fn enable_vector(&self, vector: u32) {
        let offset = (vector / 32) as usize;
        let bit = 1u32 << (vector % 32);

        if Self::is_spi(vector) {
            self.bus
                .write32(self.gicd_base + regs::GICD_ISENABLER + 4 * offset, bit);
        } else {
            self.bus
                .write32(self.sgi_frame() + regs::GICR_ISENABLER0 + 4 * offset, bit);
        }
    }

    fn disable_vector(&self, vector: u32) {
        let offset = (vector / 32) as usize;
        let bit = 1u32 << (vector % 32);

        // Write-1-to-clear: the zero bits leave other vectors untouched.
        if Self::is_spi(vector) {
            self.bus
                .write32(self.gicd_base + regs::GICD_ICENABLER + 4 * offset, bit);
        } else {
            self.bus
                .write32(self.sgi_frame() + regs::GICR_ICENABLER0 + 4 * offset, bit);
        }
    }

    fn set_vector_priority(&self, vector: u32, priority: u8) {
        let offset = (vector / 4) as usize;
        let shift = (vector % 4) * 8;

        let addr = if Self::is_spi(vector) {
            self.gicd_base + regs::GICD_IPRIORITYR + 4 * offset
        } else {
            self.sgi_frame() + regs::GICR_IPRIORITYR + 4 * offset
        };
        self.bus
            .and_then_or32(addr, !(0xffu32 << shift), (priority as u32) << shift);
    }

    /// Enable the distributor.
    ///
    /// The meaning of the low `GICD_CTLR` enable bits depends on whether
    /// affinity routing is active: with ARE set, bit 1 enables non-secure
    /// Group 1; without it, bit 0 is the legacy single-group enable.
    fn enable_distributor(&self) {
        let ctlr = GicdCtlr::from_bits_truncate(self.bus.read32(self.gicd_base + regs::GICD_CTLR));
        let enable = if ctlr.contains(GicdCtlr::ARE) {
            GicdCtlr::ENABLE_GRP1_NS
        } else {
            GicdCtlr::ENABLE_GRP0
        };
        self.bus.or32(self.gicd_base + regs::GICD_CTLR, enable.bits());
    }

    /// One-shot controller bring-up. Runs on the boot core before any
    /// interrupt is unmasked; not re-entrant.
    pub fn init(&self) {
        // Drive the GIC with affinity routing, out of compat mode.
        self.bus
            .or32(self.gicd_base + regs::GICD_CTLR, GicdCtlr::ARE.bits());

        // Clear whatever enable/priority state prior firmware left behind.
        for vector in 0..self.num_irqs {
            self.disable_vector(vector);
            self.set_vector_priority(vector, regs::DEFAULT_PRIORITY);
        }

        let ctlr = GicdCtlr::from_bits_truncate(self.bus.read32(self.gicd_base + regs::GICD_CTLR));
        if ctlr.contains(GicdCtlr::DS) {
            // Single security state. Assume we are the only state running
            // and no earlier firmware configured interrupt grouping, and
            // move every vector into non-secure Group 1. The SGI/PPI group
            // register is written in the region's first frame, the boot
            // core's. Known limitation: if earlier firmware did configure
            // grouping, this clobbers it.
            self.bus.write32(
                self.gicr_base + regs::GICR_FRAME_SIZE + regs::GICR_IGROUPR0,
                0xffff_ffff,
            );

            let mut index = MAX_PER_CPU_INT;
            while index < self.num_irqs {
                self.bus.write32(
                    self.gicd_base + regs::GICD_IGROUPR + (index / 8) as usize,
                    0xffff_ffff,
                );
                index += 32;
            }
        }

        // Route every SPI to the boot core.
        let target = self.cpu.mpidr() & IROUTER_AFFINITY;
        for spi in 0..(self.num_irqs - MAX_PER_CPU_INT) {
            self.bus.write64(
                self.gicd_base + regs::GICD_IROUTER + (spi as usize) * 8,
                target,
            );
        }

        // CPU interface: no preemption grouping, admit all priorities,
        // then enable Group 1 signaling.
        self.cpu.set_binary_point(regs::NO_PREEMPTION_BPR);
        self.cpu.set_priority_mask(0xff);
        self.cpu.enable_group1();

        self.enable_distributor();

        log::debug!("GICv3 initialized: {} interrupt lines", self.num_irqs);
    }

    fn check_vector(&self, vector: IrqNumber) -> KernelResult<()> {
        if vector.as_u32() >= self.num_irqs {
            return Err(KernelError::InvalidVector {
                vector: vector.as_u32(),
                max: self.num_irqs,
            });
        }
        Ok(())
    }

    /// Prevent `vector` from being delivered.
    pub fn mask(&self, vector: IrqNumber) -> KernelResult<()> {
        self.check_vector(vector)?;
        self.disable_vector(vector.as_u32());
        Ok(())
    }

    /// Allow `vector` to be delivered.
    pub fn unmask(&self, vector: IrqNumber) -> KernelResult<()> {
        self.check_vector(vector)?;
        self.enable_vector(vector.as_u32());
        Ok(())
    }

    /// Set the priority byte for `vector`. Lower values are more urgent.
    pub fn set_priority(&self, vector: IrqNumber, priority: u8) -> KernelResult<()> {
        self.check_vector(vector)?;
        self.set_vector_priority(vector.as_u32(), priority);
        Ok(())
    }

    /// One complete interrupt transaction: acknowledge, dispatch, EOI.
    ///
    /// Runs in interrupt context with this core's interrupts masked; must
    /// not block, so the handler lookup is wait-free. The returned value
    /// tells the trap path whether to run the scheduler on the way out.
    pub fn handle_irq(&self, table: &HandlerTable) -> IrqReturn {
        let iar = self.cpu.acknowledge();
        let vector = iar & regs::INTID_MASK;

        if vector >= regs::SPURIOUS_THRESHOLD {
            // Spurious acknowledge: nothing was pending. Never EOI'd.
            return IrqReturn::NoReschedule;
        }

        let cpu = self.cpu.current_cpu();
        log::trace!("irq: iar {:#x} vector {} core {}", iar, vector, cpu);

        let mut ret = IrqReturn::NoReschedule;
        let (handler, arg) = table.lookup(IrqNumber(vector), cpu);
        if let Some(handler) = handler {
            ret = handler(arg);
        }

        // Once acknowledged the interrupt must be completed in hardware,
        // whether or not anything was registered for it.
        self.cpu.end_of_interrupt(vector);

        ret
    }
}

// ---------------------------------------------------------------------------
// Platform singleton and free-function API
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
mod platform {
    use super::{
        icc::{self, IccSysregs},
        mmio::DeviceMmio,
        Gic,
    };
    use crate::{
        error::{KernelError, KernelResult},
        irq::{HandlerTable, IrqHandler, IrqNumber, IrqReturn, GIC_MAX_INT},
        sync::OnceLock,
    };

    /// Global controller instance, initialized once during boot.
    ///
    /// `OnceLock` publishes the fully-constructed state, so a reader on
    /// another core either sees nothing or sees base addresses and the
    /// interrupt count together.
    static GIC: OnceLock<Gic<DeviceMmio, IccSysregs>> = OnceLock::new();

    /// Registered interrupt handlers. Lock-free for the dispatch path.
    static HANDLERS: HandlerTable = HandlerTable::new();

    /// Initialize the GICv3 controller.
    ///
    /// Must be called once on the boot core, with the platform-supplied
    /// distributor and redistributor-region base addresses, before any
    /// interrupt is unmasked.
    pub fn init(gicd_base: usize, gicr_base: usize) -> KernelResult<()> {
        if GIC.is_initialized() {
            return Err(KernelError::AlreadyInitialized { subsystem: "GIC" });
        }

        let gic = Gic::new(DeviceMmio, IccSysregs, gicd_base, gicr_base);
        gic.init();

        GIC.set(gic)
            .map_err(|_| KernelError::AlreadyInitialized { subsystem: "GIC" })
    }

    /// Whether [`init`] has completed.
    pub fn is_initialized() -> bool {
        GIC.is_initialized()
    }

    /// Number of interrupt IDs discovered at init.
    pub fn num_irqs() -> KernelResult<u32> {
        GIC.get()
            .map(|gic| gic.num_irqs())
            .ok_or(KernelError::NotInitialized { subsystem: "GIC" })
    }

    /// Install or replace the handler for `vector`.
    ///
    /// Private vectors register for the calling core; shared vectors are
    /// global. Registering `None` unregisters. Local interrupts are masked
    /// while the table lock is held so a delivery on this core cannot
    /// deadlock against the registration.
    ///
    /// # Panics
    ///
    /// Panics on a vector outside the discovered range, or if called
    /// before [`init`]; both are boot-sequencing bugs.
    pub fn register_handler(vector: IrqNumber, handler: Option<IrqHandler>, arg: usize) {
        let Some(gic) = GIC.get() else {
            panic!("register_handler: GIC not initialized");
        };
        if vector.as_u32() >= GIC_MAX_INT || vector.as_u32() >= gic.num_irqs() {
            panic!("register_handler: vector out of range: {}", vector);
        }

        let cpu = gic.cpu().current_cpu();
        let daif = icc::local_irq_save();
        HANDLERS.register(vector, cpu, handler, arg);
        icc::local_irq_restore(daif);
    }

    /// Prevent delivery of `vector`.
    pub fn mask_irq(vector: IrqNumber) -> KernelResult<()> {
        GIC.get()
            .ok_or(KernelError::NotInitialized { subsystem: "GIC" })?
            .mask(vector)
    }

    /// Allow delivery of `vector`.
    pub fn unmask_irq(vector: IrqNumber) -> KernelResult<()> {
        GIC.get()
            .ok_or(KernelError::NotInitialized { subsystem: "GIC" })?
            .unmask(vector)
    }

    /// Set the priority byte for `vector`. Lower values are more urgent.
    pub fn set_irq_priority(vector: IrqNumber, priority: u8) -> KernelResult<()> {
        GIC.get()
            .ok_or(KernelError::NotInitialized { subsystem: "GIC" })?
            .set_priority(vector, priority)
    }

    /// IRQ entry point, called from the exception vector.
    pub fn handle_irq() -> IrqReturn {
        let Some(gic) = GIC.get() else {
            panic!("IRQ taken before GIC initialization");
        };
        gic.handle_irq(&HANDLERS)
    }

    /// FIQ entry point. FIQ routing is a known gap in this driver; nothing
    /// is ever configured to deliver one.
    pub fn handle_fiq() -> ! {
        panic!("unexpected FIQ");
    }
}

#[cfg(target_arch = "aarch64")]
pub use platform::{
    handle_fiq, handle_irq, init, is_initialized, mask_irq, num_irqs, register_handler,
    set_irq_priority, unmask_irq,
};
