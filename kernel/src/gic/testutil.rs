//! Fake hardware for host tests.
//!
//! `FakeBus` is a sparse register file that additionally models the
//! write-1-to-set / write-1-to-clear pairing of the GIC enable registers,
//! so enable-status round-trips are observable. `FakeIcc` is a scripted
//! CPU interface that records everything the driver does to it.

use std::collections::{BTreeMap, VecDeque};

use spin::Mutex;

use super::{icc::CpuInterface, mmio::MmioBus};

/// One set/clear-enable register bank (a run of 32-bit status words).
struct EnableBank {
    set_base: usize,
    clear_base: usize,
    state: Vec<u32>,
}

impl EnableBank {
    fn word_index(&self, addr: usize) -> Option<(usize, bool)> {
        let span = self.state.len() * 4;
        if (self.set_base..self.set_base + span).contains(&addr) {
            Some(((addr - self.set_base) / 4, true))
        } else if (self.clear_base..self.clear_base + span).contains(&addr) {
            Some(((addr - self.clear_base) / 4, false))
        } else {
            None
        }
    }
}

#[derive(Default)]
struct FakeBusState {
    mem: BTreeMap<usize, u32>,
    banks: Vec<EnableBank>,
}

/// In-memory register file implementing [`MmioBus`].
pub struct FakeBus {
    state: Mutex<FakeBusState>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeBusState::default()),
        }
    }

    /// Model a set-enable/clear-enable register pair of `words` 32-bit
    /// status words. Writes to either alias OR into / clear from the same
    /// backing state; reads of either return the state.
    pub fn add_enable_bank(&self, set_base: usize, clear_base: usize, words: usize) {
        self.state.lock().banks.push(EnableBank {
            set_base,
            clear_base,
            state: vec![0; words],
        });
    }

    /// Preload a 64-bit register value (e.g. a `GICR_TYPER`).
    pub fn preset64(&self, addr: usize, value: u64) {
        self.write64(addr, value);
    }
}

impl MmioBus for FakeBus {
    fn read32(&self, addr: usize) -> u32 {
        let state = self.state.lock();
        for bank in &state.banks {
            if let Some((idx, _)) = bank.word_index(addr) {
                return bank.state[idx];
            }
        }
        state.mem.get(&addr).copied().unwrap_or(0)
    }

    fn write32(&self, addr: usize, value: u32) {
        let mut state = self.state.lock();
        for bank in &mut state.banks {
            if let Some((idx, is_set)) = bank.word_index(addr) {
                if is_set {
                    bank.state[idx] |= value;
                } else {
                    bank.state[idx] &= !value;
                }
                return;
            }
        }
        state.mem.insert(addr, value);
    }

    fn read64(&self, addr: usize) -> u64 {
        let lo = self.read32(addr) as u64;
        let hi = self.read32(addr + 4) as u64;
        (hi << 32) | lo
    }

    fn write64(&self, addr: usize, value: u64) {
        self.write32(addr, value as u32);
        self.write32(addr + 4, (value >> 32) as u32);
    }
}

#[derive(Default)]
struct FakeIccState {
    pending: VecDeque<u32>,
    eois: Vec<u32>,
    priority_mask: Option<u8>,
    binary_point: Option<u8>,
    group1_enabled: bool,
}

/// Scripted CPU interface implementing [`CpuInterface`].
///
/// `acknowledge` pops the next scripted ID, or the spurious ID 1023 when
/// nothing is pending, matching hardware behavior.
pub struct FakeIcc {
    mpidr: u64,
    state: Mutex<FakeIccState>,
}

impl FakeIcc {
    pub fn new(mpidr: u64) -> Self {
        Self {
            mpidr,
            state: Mutex::new(FakeIccState::default()),
        }
    }

    /// Queue a raw acknowledge value for a later `acknowledge` call.
    pub fn push_pending(&self, iar: u32) {
        self.state.lock().pending.push_back(iar);
    }

    pub fn eois(&self) -> Vec<u32> {
        self.state.lock().eois.clone()
    }

    pub fn priority_mask(&self) -> Option<u8> {
        self.state.lock().priority_mask
    }

    pub fn binary_point(&self) -> Option<u8> {
        self.state.lock().binary_point
    }

    pub fn group1_enabled(&self) -> bool {
        self.state.lock().group1_enabled
    }
}

impl CpuInterface for FakeIcc {
    fn mpidr(&self) -> u64 {
        self.mpidr
    }

    fn set_priority_mask(&self, mask: u8) {
        self.state.lock().priority_mask = Some(mask);
    }

    fn set_binary_point(&self, bpr: u8) {
        self.state.lock().binary_point = Some(bpr);
    }

    fn enable_group1(&self) {
        self.state.lock().group1_enabled = true;
    }

    fn acknowledge(&self) -> u32 {
        self.state.lock().pending.pop_front().unwrap_or(1023)
    }

    fn end_of_interrupt(&self, intid: u32) {
        self.state.lock().eois.push(intid);
    }
}
