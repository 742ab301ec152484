//! Managed range configuration and address translation
//!
//! A `TableConfig` names the managed physical range. The translation between
//! a granule address and its descriptor index is pure arithmetic on the base
//! address and the granule size, so it lives here rather than on the table.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{PhysAddr, GRANULE_SHIFT, GRANULE_SIZE};

/// The managed physical range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Address of the first managed granule
    pub base: PhysAddr,
    /// Number of managed granules
    pub nr_granules: usize,
}

impl TableConfig {
    /// Describe `nr_granules` granules starting at `base`
    pub const fn new(base: PhysAddr, nr_granules: usize) -> Self {
        Self { base, nr_granules }
    }

    /// Check the range is usable for a descriptor table
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base.is_granule_aligned() {
            return Err(ConfigError::UnalignedBase);
        }
        if self.nr_granules == 0 {
            return Err(ConfigError::Empty);
        }
        self.end().ok_or(ConfigError::RangeOverflow)?;
        Ok(())
    }

    /// Size of the managed range in bytes, or `None` if it does not fit in
    /// the address space
    pub fn size(&self) -> Option<u64> {
        u64::try_from(self.nr_granules)
            .ok()?
            .checked_mul(GRANULE_SIZE as u64)
    }

    /// First address past the managed range, or `None` if the range runs off
    /// the top of the address space
    pub fn end(&self) -> Option<PhysAddr> {
        self.base.checked_add(self.size()?)
    }

    /// Descriptor index for `addr`, or `None` if `addr` is misaligned or
    /// outside the managed range.
    pub fn index_of(&self, addr: PhysAddr) -> Option<usize> {
        if !addr.is_granule_aligned() {
            return None;
        }
        let offset = addr.0.checked_sub(self.base.0)?;
        let idx = usize::try_from(offset >> GRANULE_SHIFT).ok()?;
        (idx < self.nr_granules).then_some(idx)
    }

    /// Physical address of descriptor `idx`.
    ///
    /// Panics if `idx` is not a descriptor of this range.
    pub fn addr_of(&self, idx: usize) -> PhysAddr {
        assert!(
            idx < self.nr_granules,
            "granule index {} outside table of {}",
            idx,
            self.nr_granules
        );
        let offset = (idx as u64).checked_mul(GRANULE_SIZE as u64);
        match offset.and_then(|offset| self.base.checked_add(offset)) {
            Some(addr) => addr,
            None => panic!("granule index {} overflows range at {}", idx, self.base),
        }
    }

    /// True if `addr` is a managed granule address
    pub fn contains(&self, addr: PhysAddr) -> bool {
        self.index_of(addr).is_some()
    }
}
