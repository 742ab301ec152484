//! Error types for granule lookups and table configuration
//!
//! These cover caller-recoverable conditions only. Contract violations by
//! code inside the monitor panic instead.

use core::fmt;

/// Why a lookup that distinguishes failure causes did not return a granule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupError {
    /// Address misaligned, outside the managed range, or state mismatch
    InvalidInput,
    /// State matched but the granule still has active references
    InUse,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::InvalidInput => write!(f, "invalid granule address or state"),
            LookupError::InUse => write!(f, "granule in use"),
        }
    }
}

/// Errors rejecting a managed-range configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Base address is not granule aligned
    UnalignedBase,
    /// Range covers no granules
    Empty,
    /// Range extends past the top of the physical address space
    RangeOverflow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnalignedBase => write!(f, "managed range base is not granule aligned"),
            ConfigError::Empty => write!(f, "managed range is empty"),
            ConfigError::RangeOverflow => write!(f, "managed range overflows the address space"),
        }
    }
}
