//! Granule descriptor: lock protocol and reference counting
//!
//! # Layout
//!
//! The ownership state and the lock flag share one 16-bit atomic word:
//!
//! ```text
//!  15        9   8   7             0
//! ┌───────────┬────┬───────────────┐
//! │  (zero)   │LOCK│     state     │
//! └───────────┴────┴───────────────┘
//! ```
//!
//! Acquiring the lock is a compare-and-swap from "free, state S" to
//! "held, state S", so a state-conditional acquisition observes and claims
//! the state in one atomic step. Releasing with a transition writes the new
//! state and clears the lock with a single release store: a core that sees
//! the lock free also sees the new state.
//!
//! The lock is a bare flag, not a guard. Whoever holds a reference to the
//! descriptor may release it, which the object layer relies on when a lock
//! taken in one call frame is released by another.
//!
//! # Reference counts
//!
//! `refcount` is accessed under two disciplines:
//!
//! - **Lock-protected** (`refcount_get`, `refcount_put`, `refcount_inc`,
//!   `refcount_dec`): a relaxed load followed by a relaxed store, with no
//!   read-modify-write. The descriptor lock excludes other lock-protected
//!   writers, and these calls must not overlap atomic updates of the same
//!   granule.
//! - **Atomic** (`atomic_get`, `atomic_put`, `atomic_put_release`): usable
//!   without the lock by holders that already own a reference and only pin
//!   the granule against reclamation.
//!
//! `atomic_put_release` pairs with `refcount_read_acquire`: content written
//! before the release decrement is visible to a core whose acquire read
//! observes the decremented count.

use core::fmt;

use crate::sync::{spin_loop, AtomicU16, AtomicU64, Ordering};
use crate::types::{GranuleState, NR_GRANULE_STATES};

/// Lock flag in the descriptor word
const LOCK_BIT: u16 = 1 << 8;

/// State discriminant in the descriptor word
const STATE_MASK: u16 = 0x00ff;

static_assertions::const_assert!(NR_GRANULE_STATES <= STATE_MASK as usize + 1);
static_assertions::const_assert_eq!(LOCK_BIT & STATE_MASK, 0);
#[cfg(not(feature = "loom"))]
static_assertions::const_assert!(core::mem::size_of::<Granule>() <= 16);

/// Metadata for one granule of managed physical memory
pub struct Granule {
    /// State in the low byte, lock flag in `LOCK_BIT`
    descriptor: AtomicU16,
    /// Active uses of the granule
    refcount: AtomicU64,
}

impl Granule {
    /// A descriptor at the baseline: state `Ns`, unlocked, no references.
    pub fn new() -> Self {
        Self {
            descriptor: AtomicU16::new(GranuleState::Ns as u16),
            refcount: AtomicU64::new(0),
        }
    }

    /// Return to the baseline. Only valid while no other core can reach the
    /// descriptor.
    pub(crate) fn reset(&self) {
        self.descriptor
            .store(GranuleState::Ns as u16, Ordering::Relaxed);
        self.refcount.store(0, Ordering::Relaxed);
    }

    // ========================================================================
    // Lock protocol
    // ========================================================================

    /// Acquire the lock of a granule whose state the caller already knows.
    ///
    /// Spins until the lock is free. Panics if the state found under the lock
    /// is not `expected`: the caller's knowledge was wrong, which is a bug in
    /// the monitor rather than bad input.
    pub fn lock(&self, expected: GranuleState) {
        loop {
            let cur = self.descriptor.load(Ordering::Relaxed);
            if cur & LOCK_BIT == 0
                && self
                    .descriptor
                    .compare_exchange_weak(cur, cur | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                let actual = GranuleState::decode((cur & STATE_MASK) as u8);
                assert!(
                    actual == expected,
                    "granule locked in state {:?}, caller expected {:?}",
                    actual,
                    expected
                );
                return;
            }
            spin_loop();
        }
    }

    /// Acquire the lock only if the granule is in `state`.
    ///
    /// Waits while another core holds the lock, then either claims it (state
    /// matches) or returns `false` leaving the descriptor untouched.
    pub fn lock_if_state_matches(&self, state: GranuleState) -> bool {
        let unlocked = state as u16;
        loop {
            let cur = self.descriptor.load(Ordering::Relaxed);
            if cur & LOCK_BIT != 0 {
                spin_loop();
                continue;
            }
            if cur != unlocked {
                return false;
            }
            if self
                .descriptor
                .compare_exchange_weak(cur, cur | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Release the lock, keeping the current state.
    pub fn unlock(&self) {
        let cur = self.descriptor.load(Ordering::Relaxed);
        self.descriptor.store(cur & STATE_MASK, Ordering::Release);
    }

    /// Move to `next` and release the lock in one release store.
    pub fn unlock_transition(&self, next: GranuleState) {
        self.descriptor.store(next as u16, Ordering::Release);
    }

    /// Current state. Caller holds the lock.
    pub fn state(&self) -> GranuleState {
        let cur = self.descriptor.load(Ordering::Relaxed);
        GranuleState::decode((cur & STATE_MASK) as u8)
    }

    /// Overwrite the state, keeping the lock as it is. Caller holds the lock.
    pub fn set_state(&self, state: GranuleState) {
        let cur = self.descriptor.load(Ordering::Relaxed);
        self.descriptor
            .store((cur & LOCK_BIT) | state as u16, Ordering::Relaxed);
    }

    /// Raw state byte, for checks that must not panic on a corrupt descriptor
    pub(crate) fn state_bits(&self) -> u8 {
        (self.descriptor.load(Ordering::Relaxed) & STATE_MASK) as u8
    }

    /// Snapshot of the lock flag
    pub fn is_locked(&self) -> bool {
        self.descriptor.load(Ordering::Relaxed) & LOCK_BIT != 0
    }

    // ========================================================================
    // Lock-protected reference counting
    // ========================================================================

    /// Take one reference. Caller holds the lock.
    pub fn refcount_get(&self) {
        self.refcount_inc(1);
    }

    /// Drop one reference. Caller holds the lock.
    pub fn refcount_put(&self) {
        self.refcount_dec(1);
    }

    /// Take `n` references. Caller holds the lock.
    pub fn refcount_inc(&self, n: u64) {
        let cur = self.refcount.load(Ordering::Relaxed);
        let next = match cur.checked_add(n) {
            Some(next) => next,
            None => panic!("granule refcount overflow: {} + {}", cur, n),
        };
        self.refcount.store(next, Ordering::Relaxed);
    }

    /// Drop `n` references. Caller holds the lock.
    ///
    /// Panics if fewer than `n` references are held.
    pub fn refcount_dec(&self, n: u64) {
        let cur = self.refcount.load(Ordering::Relaxed);
        assert!(n <= cur, "granule refcount underflow: {} - {}", cur, n);
        self.refcount.store(cur - n, Ordering::Relaxed);
    }

    // ========================================================================
    // Atomic reference counting
    // ========================================================================

    /// Take one reference without the lock.
    pub fn atomic_get(&self) {
        self.refcount.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one reference without the lock.
    pub fn atomic_put(&self) {
        self.atomic_sub_one(Ordering::Relaxed);
    }

    /// Drop one reference without the lock, publishing prior writes to the
    /// granule's content to any core that acquire-reads the new count.
    pub fn atomic_put_release(&self) {
        self.atomic_sub_one(Ordering::Release);
    }

    /// Underflow panics without modifying the counter.
    fn atomic_sub_one(&self, success: Ordering) {
        let mut cur = self.refcount.load(Ordering::Relaxed);
        loop {
            assert!(cur != 0, "granule refcount underflow: 0 - 1");
            match self.refcount.compare_exchange_weak(
                cur,
                cur - 1,
                success,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Snapshot of the reference count, no ordering.
    pub fn refcount_read_relaxed(&self) -> u64 {
        self.refcount.load(Ordering::Relaxed)
    }

    /// Reference count with acquire ordering.
    pub fn refcount_read_acquire(&self) -> u64 {
        self.refcount.load(Ordering::Acquire)
    }
}

impl Default for Granule {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Granule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cur = self.descriptor.load(Ordering::Relaxed);
        f.debug_struct("Granule")
            .field("state", &GranuleState::from_u8((cur & STATE_MASK) as u8))
            .field("locked", &(cur & LOCK_BIT != 0))
            .field("refcount", &self.refcount.load(Ordering::Relaxed))
            .finish()
    }
}
