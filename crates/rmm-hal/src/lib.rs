//! Platform abstraction for the granule monitor
//!
//! This crate defines the contract between the granule core and the
//! platform it runs on:
//!
//! - **Geometry**: granule size and the `PhysAddr` type
//! - **Slots**: the bounded set of per-CPU transient mapping windows
//! - **HAL trait**: CPU enumeration, slot mapping and debug output
//!
//! # Platform Implementations
//!
//! - **Bare metal**: per-CPU translation table entries reserved for each slot
//! - **Host**: `rmm-hal-mock` backs physical memory with a heap buffer

#![no_std]

use core::fmt;
use core::ptr::NonNull;
use serde::{Deserialize, Serialize};

/// log2 of the granule size
pub const GRANULE_SHIFT: u32 = 12;

/// Size in bytes of one granule
pub const GRANULE_SIZE: usize = 1 << GRANULE_SHIFT;

/// Upper bound on the number of CPUs a platform may report
pub const MAX_CPUS: usize = 16;

// ============================================================================
// Physical addresses
// ============================================================================

/// A physical address
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Wrap a raw physical address
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Raw address value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset of this address inside its granule
    pub const fn granule_offset(self) -> u64 {
        self.0 & (GRANULE_SIZE as u64 - 1)
    }

    /// True if the address sits on a granule boundary
    pub const fn is_granule_aligned(self) -> bool {
        self.granule_offset() == 0
    }

    /// Address `bytes` above this one, or `None` on overflow
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }

    /// Address `bytes` below this one, or `None` on underflow
    pub fn checked_sub(self, bytes: u64) -> Option<Self> {
        self.0.checked_sub(bytes).map(Self)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ============================================================================
// Slot windows
// ============================================================================

/// Number of transient mapping windows each CPU owns
pub const NR_CPU_SLOTS: usize = 10;

/// Per-CPU transient mapping windows
///
/// Every CPU owns one window of each kind, so two CPUs mapping the same slot
/// kind never share a virtual address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BufferSlot {
    /// Non-secure memory supplied by the host (foreign content)
    Ns = 0,
    /// Delegated granule being scrubbed or initialised
    Delegated = 1,
    /// Realm descriptor
    Rd = 2,
    /// Realm execution context
    Rec = 3,
    /// Second realm execution context
    Rec2 = 4,
    /// Target context of an inter-context operation
    RecTarget = 5,
    /// First auxiliary page of an execution context
    RecAux0 = 6,
    /// Translation table
    Rtt = 7,
    /// Second translation table (walks touching two levels)
    Rtt2 = 8,
    /// Call arguments shared with a running realm
    RsiCall = 9,
}

impl BufferSlot {
    /// Every slot, in discriminant order
    pub const ALL: [BufferSlot; NR_CPU_SLOTS] = [
        BufferSlot::Ns,
        BufferSlot::Delegated,
        BufferSlot::Rd,
        BufferSlot::Rec,
        BufferSlot::Rec2,
        BufferSlot::RecTarget,
        BufferSlot::RecAux0,
        BufferSlot::Rtt,
        BufferSlot::Rtt2,
        BufferSlot::RsiCall,
    ];

    /// Convert from u8
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Position of this slot in a per-CPU slot array
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The window reserved for non-secure content
    pub const fn is_foreign(self) -> bool {
        matches!(self, BufferSlot::Ns)
    }
}

// ============================================================================
// HAL trait
// ============================================================================

/// Hardware Abstraction Layer trait
///
/// Implementations provide platform-specific functionality for:
/// - CPU enumeration (how many, which one is running)
/// - Transient mapping of granules into per-CPU slot windows
/// - Debug output
pub trait HAL: Send + Sync + 'static {
    // === CPU enumeration ===

    /// Index of the CPU executing the caller, in `0..nr_cpus()`
    fn cpu_id(&self) -> usize;

    /// Number of CPUs brought up by the platform
    fn nr_cpus(&self) -> usize;

    // === Slot mapping ===

    /// Map the granule at `addr` into `cpu`'s `slot` window
    ///
    /// The returned pointer addresses `GRANULE_SIZE` bytes that stay valid
    /// and exclusive to the caller until `unmap_slot(slot, cpu)`.
    ///
    /// # Returns
    /// * `Ok(ptr)` - Start of the mapped window
    /// * `Err(HalError::InvalidCpu)` - `cpu` is not a valid CPU index
    /// * `Err(HalError::SlotBusy)` - The window already maps a granule
    /// * `Err(HalError::OutOfRange)` - `addr` is not backed by memory
    fn map_granule(
        &self,
        addr: PhysAddr,
        slot: BufferSlot,
        cpu: usize,
    ) -> Result<NonNull<u8>, HalError>;

    /// Tear down the mapping installed in `cpu`'s `slot` window
    fn unmap_slot(&self, slot: BufferSlot, cpu: usize);

    // === Debug ===

    /// Write a debug message to the platform's console/log
    fn debug_write(&self, msg: &str);
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// CPU index outside `0..nr_cpus()`
    InvalidCpu,
    /// Slot window is already in use on that CPU
    SlotBusy,
    /// Address is unaligned or not backed by memory
    OutOfRange,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::InvalidCpu => write!(f, "invalid CPU index"),
            HalError::SlotBusy => write!(f, "slot window already mapped"),
            HalError::OutOfRange => write!(f, "address not backed by memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granule_alignment() {
        assert!(PhysAddr::new(0).is_granule_aligned());
        assert!(PhysAddr::new(0x8000_0000).is_granule_aligned());
        assert!(!PhysAddr::new(0x8000_0001).is_granule_aligned());
        assert_eq!(PhysAddr::new(0x8000_0fff).granule_offset(), 0xfff);
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(PhysAddr::new(u64::MAX).checked_add(1), None);
        assert_eq!(PhysAddr::new(0).checked_sub(1), None);
        assert_eq!(
            PhysAddr::new(0x1000).checked_add(GRANULE_SIZE as u64),
            Some(PhysAddr::new(0x2000))
        );
    }

    #[test]
    fn test_slot_from_u8() {
        for slot in BufferSlot::ALL {
            assert_eq!(BufferSlot::from_u8(slot as u8), Some(slot));
            assert_eq!(BufferSlot::ALL[slot.index()], slot);
        }
        assert_eq!(BufferSlot::from_u8(NR_CPU_SLOTS as u8), None);
    }

    #[test]
    fn test_only_ns_is_foreign() {
        let foreign: usize = BufferSlot::ALL.iter().filter(|s| s.is_foreign()).count();
        assert_eq!(foreign, 1);
        assert!(BufferSlot::Ns.is_foreign());
    }
}
