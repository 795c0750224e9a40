//! IRQ dispatch tables and handler registry.
//!
//! The registry mirrors the architectural split of the GICv3: vectors 0-31
//! (SGIs and PPIs) are banked per core and stored in a `[vector][core]`
//! table, while shared peripheral interrupts live in a single table indexed
//! by `vector - 32`. Keeping the two containers separate avoids accidental
//! cross-indexing between the ranges.
//!
//! Registration is rare (boot and driver init) and runs under an exclusive
//! spinlock. Dispatch runs in interrupt context and must never block, so
//! lookups are wait-free: every slot is a tiny seqlock, and a reader racing
//! a replacement observes either the complete old pair or the complete new
//! pair, never a torn (handler, argument) combination.

use core::{
    cell::UnsafeCell,
    ptr,
    sync::atomic::{fence, AtomicUsize, Ordering},
};

use spin::Mutex;

/// Maximum number of cores the per-core handler table is sized for.
pub const MAX_CPUS: usize = 8;

/// Vectors 0-31 are banked per core (SGIs 0-15, PPIs 16-31).
pub const MAX_PER_CPU_INT: u32 = 32;

/// Architectural ceiling on interrupt IDs; 1020-1023 are reserved.
pub const GIC_MAX_INT: u32 = 1020;

const SHARED_VECTORS: usize = (GIC_MAX_INT - MAX_PER_CPU_INT) as usize;

// ---------------------------------------------------------------------------
// IRQ number newtype
// ---------------------------------------------------------------------------

/// Interrupt vector number as delivered by the GIC.
///
/// Wraps a `u32` to provide type safety and prevent accidental misuse of
/// raw integer values as vector numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrqNumber(pub u32);

impl IrqNumber {
    /// Create a new IRQ number.
    pub const fn new(irq: u32) -> Self {
        Self(irq)
    }

    /// Get the raw vector number as a `u32`.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Whether this vector is banked per core (SGI or PPI).
    #[inline]
    pub fn is_private(self) -> bool {
        self.0 < MAX_PER_CPU_INT
    }
}

impl From<u32> for IrqNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<IrqNumber> for u32 {
    fn from(irq: IrqNumber) -> u32 {
        irq.0
    }
}

impl core::fmt::Display for IrqNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "IRQ#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Handler types
// ---------------------------------------------------------------------------

/// Value returned by an interrupt handler to the trap path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// Resume the interrupted context directly.
    NoReschedule,
    /// The handler woke something up; run the scheduler on the way out.
    Reschedule,
}

/// Interrupt handler function.
///
/// The `usize` argument is the opaque value stored at registration time,
/// typically a pointer to driver state.
pub type IrqHandler = fn(arg: usize) -> IrqReturn;

/// A (handler, argument) registration. `None` is the unregistered state.
type Entry = (Option<IrqHandler>, usize);

// ---------------------------------------------------------------------------
// Seqlocked handler slot
// ---------------------------------------------------------------------------

/// One registration slot, readable without locking.
///
/// Writers (which already hold the table's registration lock) bump the
/// sequence to an odd value, publish the pair, then bump it even again.
/// Readers retry while the sequence is odd or changed across the read, so
/// the pair they return is always one complete registration.
struct HandlerSlot {
    seq: AtomicUsize,
    entry: UnsafeCell<Entry>,
}

// SAFETY: The entry is only mutated by `store` (serialized by the table's
// registration lock) and concurrent readers detect in-flight writes through
// the sequence counter.
unsafe impl Sync for HandlerSlot {}

impl HandlerSlot {
    const fn new() -> Self {
        Self {
            seq: AtomicUsize::new(0),
            entry: UnsafeCell::new((None, 0)),
        }
    }

    /// Publish a new (handler, argument) pair. Caller holds the table lock.
    fn store(&self, handler: Option<IrqHandler>, arg: usize) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: The registration lock serializes writers; readers observe
        // the odd sequence value and retry instead of trusting this write.
        unsafe { ptr::write_volatile(self.entry.get(), (handler, arg)) };
        fence(Ordering::Release);
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Wait-free read of the current pair.
    fn load(&self) -> Entry {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 0 {
                // SAFETY: A torn read is detected by the sequence check
                // below and discarded; the entry type is Copy.
                let entry = unsafe { ptr::read_volatile(self.entry.get()) };
                fence(Ordering::Acquire);
                if self.seq.load(Ordering::Relaxed) == before {
                    return entry;
                }
            }
            core::hint::spin_loop();
        }
    }
}

// ---------------------------------------------------------------------------
// Handler table
// ---------------------------------------------------------------------------

/// Policy hook: whether the configuration of `vector` may be changed.
///
/// Reserved for a future security policy; everything is allowed today.
fn registration_allowed(_vector: IrqNumber) -> bool {
    true
}

/// Fixed-capacity registry of interrupt handlers.
///
/// Private vectors are keyed by (vector, core); shared vectors by vector
/// alone. A later registration for the same key overwrites the earlier one,
/// and registering `None` returns the slot to the unregistered state.
pub struct HandlerTable {
    per_cpu: [[HandlerSlot; MAX_CPUS]; MAX_PER_CPU_INT as usize],
    shared: [HandlerSlot; SHARED_VECTORS],
    write_lock: Mutex<()>,
}

impl HandlerTable {
    /// Create an empty table. All slots start unregistered.
    pub const fn new() -> Self {
        const SLOT: HandlerSlot = HandlerSlot::new();
        const ROW: [HandlerSlot; MAX_CPUS] = [SLOT; MAX_CPUS];
        Self {
            per_cpu: [ROW; MAX_PER_CPU_INT as usize],
            shared: [SLOT; SHARED_VECTORS],
            write_lock: Mutex::new(()),
        }
    }

    fn slot(&self, vector: u32, cpu: usize) -> &HandlerSlot {
        if vector < MAX_PER_CPU_INT {
            &self.per_cpu[vector as usize][cpu]
        } else {
            &self.shared[(vector - MAX_PER_CPU_INT) as usize]
        }
    }

    /// Install or replace the handler for `vector` on `cpu`.
    ///
    /// For shared vectors the `cpu` argument only validates the caller; the
    /// registration is global. Registering `None` unregisters the slot.
    ///
    /// # Panics
    ///
    /// A vector at or beyond the architectural maximum, or a core index
    /// beyond [`MAX_CPUS`], is a boot-sequencing bug and panics.
    pub fn register(
        &self,
        vector: IrqNumber,
        cpu: usize,
        handler: Option<IrqHandler>,
        arg: usize,
    ) {
        if vector.as_u32() >= GIC_MAX_INT {
            panic!("register: vector out of range: {}", vector);
        }
        if cpu >= MAX_CPUS {
            panic!("register: core index out of range: {}", cpu);
        }

        let _guard = self.write_lock.lock();
        if registration_allowed(vector) {
            self.slot(vector.as_u32(), cpu).store(handler, arg);
        }
    }

    /// Look up the registration for `vector` on `cpu`.
    ///
    /// Wait-free; safe to call from interrupt context. Vectors outside the
    /// table (the reserved IDs 1020-1021 can reach here through the 10-bit
    /// acknowledge mask) report as unregistered rather than faulting.
    pub fn lookup(&self, vector: IrqNumber, cpu: usize) -> Entry {
        if vector.as_u32() >= GIC_MAX_INT || cpu >= MAX_CPUS {
            return (None, 0);
        }
        self.slot(vector.as_u32(), cpu).load()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler_a(_arg: usize) -> IrqReturn {
        IrqReturn::Reschedule
    }

    fn handler_b(_arg: usize) -> IrqReturn {
        IrqReturn::NoReschedule
    }

    #[test]
    fn register_and_lookup_shared() {
        let table = HandlerTable::new();
        assert_eq!(table.lookup(IrqNumber(33), 0), (None, 0));

        table.register(IrqNumber(33), 0, Some(handler_a), 0x1234);
        let (handler, arg) = table.lookup(IrqNumber(33), 0);
        assert_eq!(arg, 0x1234);
        assert_eq!(handler.unwrap()(arg), IrqReturn::Reschedule);

        // Shared registrations are visible from any core.
        let (handler, arg) = table.lookup(IrqNumber(33), 3);
        assert_eq!(arg, 0x1234);
        assert!(handler.is_some());
    }

    #[test]
    fn private_vectors_are_banked_per_core() {
        let table = HandlerTable::new();
        table.register(IrqNumber(30), 0, Some(handler_a), 0xA);
        table.register(IrqNumber(30), 1, Some(handler_b), 0xB);

        assert_eq!(table.lookup(IrqNumber(30), 0).1, 0xA);
        assert_eq!(table.lookup(IrqNumber(30), 1).1, 0xB);
        assert_eq!(table.lookup(IrqNumber(30), 2), (None, 0));
    }

    #[test]
    fn later_registration_overwrites() {
        let table = HandlerTable::new();
        table.register(IrqNumber(40), 0, Some(handler_a), 1);
        table.register(IrqNumber(40), 0, Some(handler_b), 2);

        let (handler, arg) = table.lookup(IrqNumber(40), 0);
        assert_eq!(arg, 2);
        assert_eq!(handler.unwrap()(arg), IrqReturn::NoReschedule);
    }

    #[test]
    fn registering_none_unregisters() {
        let table = HandlerTable::new();
        table.register(IrqNumber(40), 0, Some(handler_a), 1);
        table.register(IrqNumber(40), 0, None, 0);
        assert_eq!(table.lookup(IrqNumber(40), 0), (None, 0));
    }

    #[test]
    fn reserved_ids_report_unregistered() {
        let table = HandlerTable::new();
        assert_eq!(table.lookup(IrqNumber(1020), 0), (None, 0));
        assert_eq!(table.lookup(IrqNumber(1021), 0), (None, 0));
    }

    #[test]
    #[should_panic(expected = "vector out of range")]
    fn register_out_of_range_vector_panics() {
        let table = HandlerTable::new();
        table.register(IrqNumber(GIC_MAX_INT), 0, Some(handler_a), 0);
    }

    #[test]
    #[should_panic(expected = "core index out of range")]
    fn register_out_of_range_cpu_panics() {
        let table = HandlerTable::new();
        table.register(IrqNumber(33), MAX_CPUS, Some(handler_a), 0);
    }

    /// A reader racing a replacement must never observe handler_a paired
    /// with handler_b's argument or vice versa.
    #[test]
    fn concurrent_registration_never_tears() {
        let table = HandlerTable::new();
        let vector = IrqNumber(64);
        table.register(vector, 0, Some(handler_a), 0xAAAA);

        std::thread::scope(|s| {
            let writer = s.spawn(|| {
                for i in 0..50_000u32 {
                    if i % 2 == 0 {
                        table.register(vector, 0, Some(handler_b), 0xBBBB);
                    } else {
                        table.register(vector, 0, Some(handler_a), 0xAAAA);
                    }
                }
            });

            for _ in 0..50_000 {
                let (handler, arg) = table.lookup(vector, 0);
                let handler = handler.expect("slot never becomes empty");
                // handler_a always returns Reschedule and is only ever
                // paired with 0xAAAA; handler_b with 0xBBBB.
                match handler(arg) {
                    IrqReturn::Reschedule => assert_eq!(arg, 0xAAAA),
                    IrqReturn::NoReschedule => assert_eq!(arg, 0xBBBB),
                }
            }

            writer.join().unwrap();
        });
    }
}
