//! Atomic primitives used by granule descriptors
//!
//! Descriptors only touch atomics through this module so the `loom` feature
//! can swap in loom's model-checked types.

#[cfg(feature = "loom")]
pub(crate) use loom::hint::spin_loop;
#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicU16, AtomicU64, Ordering};

#[cfg(not(feature = "loom"))]
pub(crate) use core::hint::spin_loop;
#[cfg(not(feature = "loom"))]
pub(crate) use core::sync::atomic::{AtomicU16, AtomicU64, Ordering};
