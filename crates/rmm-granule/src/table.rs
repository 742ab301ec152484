//! Granule descriptor table
//!
//! One descriptor per managed granule, laid out as an arena indexed by
//! `(addr - base) >> GRANULE_SHIFT`. Callers hold `GranuleRef` handles, which
//! pair the table with an index and so cannot name a descriptor that does
//! not exist.
//!
//! # Lookups
//!
//! | Operation          | Validates addr | Locks | Failure               |
//! |--------------------|----------------|-------|-----------------------|
//! | `addr_to_granule`  | panics         | no    | contract violation    |
//! | `find`             | yes            | no    | `None`                |
//! | `lock_find`        | yes            | yes   | `None`, lock free     |
//! | `lock_find_two`    | yes            | yes   | `None`, no lock held  |
//! | `lock_find_unused` | yes            | yes   | `LookupError`         |
//!
//! Multi-granule locking acquires descriptors in ascending physical address
//! order whatever order the caller names them in.

use alloc::vec::Vec;
use core::fmt;
use core::ops::Deref;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::config::TableConfig;
use crate::error::{ConfigError, LookupError};
use crate::granule::Granule;
use crate::types::{GranuleState, PhysAddr, NR_GRANULE_STATES};

/// Descriptor table for a managed physical range
pub struct GranuleTable {
    config: TableConfig,
    /// First address past the range, fixed once the config is validated
    end: PhysAddr,
    granules: Vec<Granule>,
}

/// Handle to one descriptor of a table
#[derive(Clone, Copy)]
pub struct GranuleRef<'t> {
    table: &'t GranuleTable,
    idx: usize,
}

impl<'t> GranuleRef<'t> {
    /// Physical address of the granule this descriptor tracks
    pub fn addr(&self) -> PhysAddr {
        self.table.config.addr_of(self.idx)
    }

    /// Position of the descriptor in its table
    pub fn index(&self) -> usize {
        self.idx
    }

    /// The descriptor itself, borrowed for the table's lifetime
    pub fn granule(&self) -> &'t Granule {
        &self.table.granules[self.idx]
    }
}

impl Deref for GranuleRef<'_> {
    type Target = Granule;

    fn deref(&self) -> &Granule {
        self.granule()
    }
}

impl PartialEq for GranuleRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.table, other.table) && self.idx == other.idx
    }
}

impl Eq for GranuleRef<'_> {}

impl fmt::Debug for GranuleRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GranuleRef")
            .field("addr", &self.addr())
            .field("granule", self.granule())
            .finish()
    }
}

/// Snapshot of descriptor usage across a table
///
/// Taken without locks, so counts may be stale while other cores run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetrics {
    /// Granules in each state, indexed by `GranuleState::index`
    pub per_state: [usize; NR_GRANULE_STATES],
    /// Descriptors whose lock was held
    pub locked: usize,
    /// Descriptors with a nonzero reference count
    pub referenced: usize,
}

impl TableMetrics {
    /// Granules observed in `state`
    pub fn count(&self, state: GranuleState) -> usize {
        self.per_state[state.index()]
    }
}

impl GranuleTable {
    /// Create a table covering `config`, every descriptor at the baseline.
    pub fn new(config: TableConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let end = config.end().ok_or(ConfigError::RangeOverflow)?;
        let mut granules = Vec::with_capacity(config.nr_granules);
        granules.resize_with(config.nr_granules, Granule::new);
        info!(
            "granule table: {} granules at [{}, {})",
            config.nr_granules,
            config.base,
            end
        );
        Ok(Self {
            config,
            end,
            granules,
        })
    }

    /// The managed range
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// First address past the managed range
    pub fn end(&self) -> PhysAddr {
        self.end
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.granules.len()
    }

    /// Always false for a constructed table
    pub fn is_empty(&self) -> bool {
        self.granules.is_empty()
    }

    /// Return every descriptor to the baseline.
    ///
    /// Exclusive access guarantees no core holds a lock or a handle.
    pub fn reset(&mut self) {
        for g in &self.granules {
            g.reset();
        }
        debug!("granule table reset: {} granules", self.granules.len());
    }

    /// Handle for descriptor `idx`. Panics if `idx` is outside the table.
    pub fn granule(&self, idx: usize) -> GranuleRef<'_> {
        assert!(
            idx < self.granules.len(),
            "granule index {} outside table of {}",
            idx,
            self.granules.len()
        );
        GranuleRef { table: self, idx }
    }

    /// Every descriptor, in address order
    pub fn iter(&self) -> impl Iterator<Item = GranuleRef<'_>> + '_ {
        (0..self.granules.len()).map(move |idx| GranuleRef { table: self, idx })
    }

    // ========================================================================
    // Address translation
    // ========================================================================

    /// Descriptor for a granule address known to be managed.
    ///
    /// Panics if `addr` is misaligned or outside the managed range.
    pub fn addr_to_granule(&self, addr: PhysAddr) -> GranuleRef<'_> {
        assert!(
            addr.is_granule_aligned(),
            "granule address {} is not aligned",
            addr
        );
        match self.config.index_of(addr) {
            Some(idx) => GranuleRef { table: self, idx },
            None => panic!(
                "granule address {} outside managed range [{}, {})",
                addr,
                self.config.base,
                self.end
            ),
        }
    }

    /// Physical address tracked by `granule`.
    ///
    /// Panics if the handle belongs to another table.
    pub fn granule_addr(&self, granule: GranuleRef<'_>) -> PhysAddr {
        assert!(
            core::ptr::eq(self, granule.table),
            "granule handle from another table"
        );
        self.config.addr_of(granule.idx)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Descriptor for `addr`, unlocked, or `None` if `addr` is misaligned or
    /// not managed.
    pub fn find(&self, addr: PhysAddr) -> Option<GranuleRef<'_>> {
        match self.config.index_of(addr) {
            Some(idx) => Some(GranuleRef { table: self, idx }),
            None => {
                trace!("find: {} is not a managed granule", addr);
                None
            }
        }
    }

    /// Descriptor for `addr`, locked, if it is managed and in `expected`.
    ///
    /// On any failure the descriptor's lock is left free.
    pub fn lock_find(&self, addr: PhysAddr, expected: GranuleState) -> Option<GranuleRef<'_>> {
        let granule = self.find(addr)?;
        if !granule.lock_if_state_matches(expected) {
            trace!("lock_find: {} not in state {:?}", addr, expected);
            return None;
        }
        Some(granule)
    }

    /// Lock two distinct granules, each in its expected state, or neither.
    ///
    /// Results come back in argument order.
    pub fn lock_find_two(
        &self,
        addr1: PhysAddr,
        expected1: GranuleState,
        addr2: PhysAddr,
        expected2: GranuleState,
    ) -> Option<(GranuleRef<'_>, GranuleRef<'_>)> {
        let [g1, g2] = self.lock_find_set([(addr1, expected1), (addr2, expected2)])?;
        Some((g1, g2))
    }

    /// Lock `N` distinct granules, each in its expected state, or none.
    ///
    /// Fails if two requests name the same address, if any address is
    /// misaligned or not managed, or if any state mismatches. Locks are
    /// taken in ascending address order; results come back in request order.
    pub fn lock_find_set<const N: usize>(
        &self,
        requests: [(PhysAddr, GranuleState); N],
    ) -> Option<[GranuleRef<'_>; N]> {
        let mut order: [usize; N] = core::array::from_fn(|i| i);
        order.sort_unstable_by_key(|&i| requests[i].0);

        // Locking the same descriptor twice would self-deadlock
        if let Some(pair) = order
            .windows(2)
            .find(|pair| requests[pair[0]].0 == requests[pair[1]].0)
        {
            debug!("lock_find_set: {} requested twice", requests[pair[0]].0);
            return None;
        }

        let mut indices = [0usize; N];
        for (slot, &(addr, _)) in indices.iter_mut().zip(requests.iter()) {
            *slot = match self.config.index_of(addr) {
                Some(idx) => idx,
                None => {
                    trace!("lock_find_set: {} is not a managed granule", addr);
                    return None;
                }
            };
        }

        for (taken, &i) in order.iter().enumerate() {
            let (addr, expected) = requests[i];
            if !self.granules[indices[i]].lock_if_state_matches(expected) {
                for &j in &order[..taken] {
                    self.granules[indices[j]].unlock();
                }
                trace!("lock_find_set: {} not in state {:?}", addr, expected);
                return None;
            }
        }

        Some(core::array::from_fn(|i| GranuleRef {
            table: self,
            idx: indices[i],
        }))
    }

    /// Lock the granule at `addr` if it is in `expected` and unreferenced.
    ///
    /// `InvalidInput` covers bad addresses and state mismatch. `InUse` means
    /// the state matched but references remain; the lock is released again.
    pub fn lock_find_unused(
        &self,
        addr: PhysAddr,
        expected: GranuleState,
    ) -> Result<GranuleRef<'_>, LookupError> {
        let granule = self
            .lock_find(addr, expected)
            .ok_or(LookupError::InvalidInput)?;
        let refcount = granule.refcount_read_acquire();
        if refcount != 0 {
            granule.unlock();
            debug!("lock_find_unused: {} has {} references", addr, refcount);
            return Err(LookupError::InUse);
        }
        Ok(granule)
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Count descriptors by state, lock and reference usage
    pub fn metrics(&self) -> TableMetrics {
        let mut metrics = TableMetrics::default();
        for g in &self.granules {
            metrics.per_state[g.state().index()] += 1;
            if g.is_locked() {
                metrics.locked += 1;
            }
            if g.refcount_read_relaxed() != 0 {
                metrics.referenced += 1;
            }
        }
        metrics
    }
}

impl fmt::Debug for GranuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GranuleTable")
            .field("config", &self.config)
            .field("len", &self.granules.len())
            .finish()
    }
}
