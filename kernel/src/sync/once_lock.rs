//! Safe one-time global initialization.
//!
//! Provides a safe alternative to `static mut` for global state that is set
//! exactly once at boot. The cell stores its value inline rather than behind
//! a heap pointer so it is usable before any allocator exists (the GIC is
//! brought up well before the heap).

use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const INITIALIZED: u8 = 2;

/// A cell that can be written to only once.
///
/// Similar to `std::sync::OnceLock` but inline and allocation-free. The
/// state word is published with release ordering after the value is fully
/// written, so a reader that observes `INITIALIZED` through [`get`] also
/// observes every field of the stored value (no torn reads of partially
/// initialized state).
///
/// [`get`]: OnceLock::get
pub struct OnceLock<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> OnceLock<T> {
    /// Create a new empty OnceLock
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Get the value if initialized
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == INITIALIZED {
            // SAFETY: INITIALIZED is only stored (with release ordering)
            // after the value has been completely written, and the value is
            // never written again afterwards.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Whether the cell has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == INITIALIZED
    }

    /// Initialize the cell with a value.
    ///
    /// Returns `Ok(())` if initialization succeeds, `Err(value)` if another
    /// caller already initialized (or is initializing) the cell.
    pub fn set(&self, value: T) -> Result<(), T> {
        match self.state.compare_exchange(
            UNINIT,
            INITIALIZING,
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                // SAFETY: The CAS above grants this thread exclusive write
                // access; no reader sees the value until INITIALIZED is
                // published below.
                unsafe { (*self.value.get()).write(value) };
                self.state.store(INITIALIZED, Ordering::Release);
                Ok(())
            }
            Err(_) => Err(value),
        }
    }
}

// SAFETY: The value is written once under an exclusive claim and only shared
// by reference afterwards, so the usual container rules apply.
unsafe impl<T: Send> Send for OnceLock<T> {}
// SAFETY: See above; `&OnceLock<T>` only hands out `&T`.
unsafe impl<T: Send + Sync> Sync for OnceLock<T> {}

impl<T> Drop for OnceLock<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == INITIALIZED {
            // SAFETY: Exclusive access via &mut self; the value was
            // initialized and is dropped exactly once here.
            unsafe { (*self.value.get()).assume_init_drop() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_lock_set_and_get() {
        let lock = OnceLock::new();
        assert!(lock.get().is_none());
        assert!(!lock.is_initialized());

        assert!(lock.set(42).is_ok());
        assert_eq!(*lock.get().unwrap(), 42);
        assert!(lock.is_initialized());

        // Second set should fail and hand the value back.
        assert_eq!(lock.set(100), Err(100));
        assert_eq!(*lock.get().unwrap(), 42);
    }

    #[test]
    fn once_lock_first_writer_wins_across_threads() {
        static CELL: OnceLock<usize> = OnceLock::new();

        std::thread::scope(|s| {
            for i in 0..8 {
                s.spawn(move || {
                    let _ = CELL.set(i);
                });
            }
        });

        let won = *CELL.get().unwrap();
        assert!(won < 8);
        assert_eq!(CELL.set(99), Err(99));
        assert_eq!(*CELL.get().unwrap(), won);
    }

    #[test]
    fn once_lock_drops_value() {
        struct Flagged<'a>(&'a core::cell::Cell<bool>);
        impl Drop for Flagged<'_> {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = core::cell::Cell::new(false);
        {
            let lock = OnceLock::new();
            lock.set(Flagged(&dropped)).ok();
        }
        assert!(dropped.get());
    }
}
