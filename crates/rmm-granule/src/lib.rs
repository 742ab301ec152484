//! RMM Granule Core - Descriptor Table and Locking Protocol
//!
//! This crate tracks every granule of the physical range managed by the
//! realm monitor: its ownership state, a per-granule spin lock and a
//! reference count. Object-layer code (realm descriptors, execution contexts,
//! translation tables) builds on the operations here to move granules between
//! states safely while many CPUs run in parallel.
//!
//! # Design Principles
//!
//! 1. **No global state**: the caller owns the `GranuleTable`
//! 2. **Validation or panic**: bad caller input is a returned value,
//!    broken monitor contracts are panics
//! 3. **Locks are flags**: no guard objects, any path may release a lock
//! 4. **Verifiable**: invariants checkable at runtime, with Kani and with loom
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       rmm-granule                           │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                    │
//! │   │ GranuleTable  │    │    Granule    │                    │
//! │   │  - config     │───▶│  - state+lock │                    │
//! │   │  - lookups    │    │  - refcount   │                    │
//! │   └───────────────┘    └───────────────┘                    │
//! │           │                                                 │
//! │           ▼                                                 │
//! │   ┌───────────────┐    ┌───────────────┐                    │
//! │   │ zero_granule  │    │  Invariants   │                    │
//! │   └───────────────┘    └───────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//!             │
//!             │ maps slots through
//!             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  rmm-hal (HAL trait)                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Verification Strategy
//!
//! - **Unit and property tests**: lookup rejection, refcount arithmetic
//! - **Kani proofs**: translation bijection, state transition post-conditions
//! - **Loom tests**: lock exclusion, deadlock freedom, release/acquire
//!   publication
//!
//! # Module Organization
//!
//! - `types` - Granule states and geometry
//! - `config` - Managed range and address translation
//! - `granule` - Descriptor lock protocol and reference counting
//! - `table` - Descriptor table, lookups and multi-granule locking
//! - `zero` - Zero-fill through a per-CPU slot
//! - `invariants` - Table invariant checks

#![no_std]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod config;
pub mod error;
pub mod granule;
pub mod invariants;
mod sync;
pub mod table;
pub mod types;
pub mod zero;

// Re-export all public types for convenient access
pub use config::TableConfig;
pub use error::{ConfigError, LookupError};
pub use granule::Granule;
pub use invariants::{assert_invariants, check_all_invariants, check_baseline, InvariantViolation};
pub use rmm_hal::{BufferSlot, HalError, HAL};
pub use table::{GranuleRef, GranuleTable, TableMetrics};
pub use types::{GranuleState, PhysAddr, GRANULE_SHIFT, GRANULE_SIZE, NR_GRANULE_STATES};
pub use zero::{zero_granule, zero_mapped};
