//! Mock HAL implementation for testing the granule monitor
//!
//! This provides a mock implementation of the HAL trait that can be used
//! for unit testing the granule core without hardware: a heap buffer stands
//! in for the managed physical range, and every simulated CPU owns its own
//! set of slot windows.

#![no_std]
extern crate alloc;

pub mod logger;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use rmm_hal::{BufferSlot, HalError, PhysAddr, GRANULE_SIZE, HAL, MAX_CPUS, NR_CPU_SLOTS};
use spin::Mutex;

/// Slot windows of one simulated CPU (granule mapped in each window, if any)
type CpuSlots = [Option<PhysAddr>; NR_CPU_SLOTS];

/// Mock HAL for unit testing
///
/// Provides simulated physical memory, per-CPU slot windows, a selectable
/// current CPU and captured debug output.
pub struct MockHal {
    /// First physical address backed by `memory`
    base: PhysAddr,
    /// Number of granules backed by `memory`
    nr_granules: usize,
    /// Simulated physical memory
    memory: Box<[UnsafeCell<u8>]>,
    /// Number of simulated CPUs
    nr_cpus: usize,
    /// CPU reported by `cpu_id`
    current_cpu: AtomicUsize,
    /// Slot windows per CPU
    slots: Mutex<Vec<CpuSlots>>,
    /// Successful `map_granule` calls
    map_count: AtomicU64,
    /// Captured debug messages
    debug_log: Mutex<Vec<String>>,
    /// Random seed for deterministic testing
    random_seed: AtomicU64,
}

impl MockHal {
    /// Create a mock platform backing `nr_granules` granules from `base`
    /// with `nr_cpus` CPUs.
    pub fn new(base: PhysAddr, nr_granules: usize, nr_cpus: usize) -> Self {
        assert!(base.is_granule_aligned(), "mock memory base must be aligned");
        assert!(
            (1..=MAX_CPUS).contains(&nr_cpus),
            "mock CPU count must be in 1..={}",
            MAX_CPUS
        );

        let memory = (0..nr_granules * GRANULE_SIZE)
            .map(|_| UnsafeCell::new(0u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            base,
            nr_granules,
            memory,
            nr_cpus,
            current_cpu: AtomicUsize::new(0),
            slots: Mutex::new(vec![[None; NR_CPU_SLOTS]; nr_cpus]),
            map_count: AtomicU64::new(0),
            debug_log: Mutex::new(Vec::new()),
            random_seed: AtomicU64::new(12345), // Deterministic seed
        }
    }

    /// Select the CPU reported by `cpu_id`
    pub fn set_cpu_id(&self, cpu: usize) {
        assert!(cpu < self.nr_cpus, "cpu {} out of range", cpu);
        self.current_cpu.store(cpu, Ordering::SeqCst);
    }

    fn offset_of(&self, addr: PhysAddr) -> Option<usize> {
        if !addr.is_granule_aligned() || addr < self.base {
            return None;
        }
        let offset = usize::try_from(addr.0 - self.base.0).ok()?;
        if offset / GRANULE_SIZE >= self.nr_granules {
            return None;
        }
        Some(offset)
    }

    fn granule_ptr(&self, addr: PhysAddr) -> *mut u8 {
        let offset = self
            .offset_of(addr)
            .unwrap_or_else(|| panic!("granule {} not backed by mock memory", addr));
        // UnsafeCell<u8> has the layout of u8, so the cell slice is a byte buffer.
        (self.memory.as_ptr() as *mut u8).wrapping_add(offset)
    }

    /// Fill a whole granule with `byte`, bypassing the slot windows
    pub fn fill_granule(&self, addr: PhysAddr, byte: u8) {
        let ptr = self.granule_ptr(addr);
        // SAFETY: `ptr` starts a granule inside `memory`, and the cells permit
        // writes through a shared reference.
        unsafe { core::ptr::write_bytes(ptr, byte, GRANULE_SIZE) };
    }

    /// Copy out the content of a granule
    pub fn read_granule(&self, addr: PhysAddr) -> Vec<u8> {
        let ptr = self.granule_ptr(addr);
        // SAFETY: `ptr` starts a granule inside `memory`.
        unsafe { core::slice::from_raw_parts(ptr, GRANULE_SIZE) }.to_vec()
    }

    /// True if every byte of the granule reads as zero
    pub fn is_zeroed(&self, addr: PhysAddr) -> bool {
        self.read_granule(addr).iter().all(|&b| b == 0)
    }

    /// Granule currently mapped in `cpu`'s `slot` window
    pub fn mapped(&self, slot: BufferSlot, cpu: usize) -> Option<PhysAddr> {
        self.slots
            .lock()
            .get(cpu)
            .and_then(|slots| slots[slot.index()])
    }

    /// Number of successful mappings since creation
    pub fn map_count(&self) -> u64 {
        self.map_count.load(Ordering::SeqCst)
    }

    /// Get all captured debug messages
    pub fn get_debug_log(&self) -> Vec<String> {
        self.debug_log.lock().clone()
    }

    /// Clear the debug log
    pub fn clear_debug_log(&self) {
        self.debug_log.lock().clear();
    }

    /// Check if a specific message was logged
    pub fn has_log_containing(&self, substr: &str) -> bool {
        self.debug_log.lock().iter().any(|msg| msg.contains(substr))
    }

    /// Set the random seed for deterministic testing
    pub fn set_random_seed(&self, seed: u64) {
        self.random_seed.store(seed, Ordering::SeqCst);
    }

    /// Fill buffer with deterministic pseudo-random bytes
    pub fn random_bytes(&self, buf: &mut [u8]) {
        // Simple LCG for deterministic "random" bytes in tests
        let mut seed = self.random_seed.load(Ordering::SeqCst);
        for byte in buf.iter_mut() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            *byte = (seed >> 33) as u8;
        }
        self.random_seed.store(seed, Ordering::SeqCst);
    }

    /// Deterministic pseudo-random value in `lo..=hi`
    pub fn random_in_range(&self, lo: usize, hi: usize) -> usize {
        assert!(lo <= hi, "empty range {}..={}", lo, hi);
        let mut buf = [0u8; 8];
        self.random_bytes(&mut buf);
        let span = (hi - lo) as u64 + 1;
        lo + (u64::from_le_bytes(buf) % span) as usize
    }
}

// SAFETY: `memory` is only written through raw pointers handed out by
// `map_granule` (exclusive to one CPU's slot until unmapped) or by the test
// helpers above; all other state is atomic or behind a spin mutex.
unsafe impl Sync for MockHal {}

impl HAL for MockHal {
    fn cpu_id(&self) -> usize {
        self.current_cpu.load(Ordering::SeqCst)
    }

    fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    fn map_granule(
        &self,
        addr: PhysAddr,
        slot: BufferSlot,
        cpu: usize,
    ) -> Result<NonNull<u8>, HalError> {
        if cpu >= self.nr_cpus {
            return Err(HalError::InvalidCpu);
        }
        let offset = self.offset_of(addr).ok_or(HalError::OutOfRange)?;

        let mut slots = self.slots.lock();
        let window = &mut slots[cpu][slot.index()];
        if window.is_some() {
            return Err(HalError::SlotBusy);
        }
        *window = Some(addr);
        drop(slots);

        self.map_count.fetch_add(1, Ordering::SeqCst);
        let ptr = (self.memory.as_ptr() as *mut u8).wrapping_add(offset);
        NonNull::new(ptr).ok_or(HalError::OutOfRange)
    }

    fn unmap_slot(&self, slot: BufferSlot, cpu: usize) {
        let mut slots = self.slots.lock();
        match slots.get_mut(cpu) {
            Some(windows) => windows[slot.index()] = None,
            None => {
                drop(slots);
                self.debug_write(&alloc::format!(
                    "[mock-hal] unmap on invalid cpu {} slot {:?}",
                    cpu,
                    slot
                ));
            }
        }
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.lock().push(String::from(msg));
    }
}
