//! Core granule types
//!
//! The ownership state set and the geometry re-exported from the HAL.
//! All types here are pure data.

use serde::{Deserialize, Serialize};

pub use rmm_hal::{PhysAddr, GRANULE_SHIFT, GRANULE_SIZE};

/// Number of members in the granule state set
pub const NR_GRANULE_STATES: usize = 7;

/// Ownership state of a granule
///
/// The granule core assigns no meaning to these values; it only compares
/// them. Which transitions are legal is decided by the object layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GranuleState {
    /// Non-secure, not tracked by the monitor (baseline)
    #[default]
    Ns = 0,
    /// Delegated to the monitor, no object type yet
    Delegated = 1,
    /// Realm descriptor
    Rd = 2,
    /// Realm execution context
    Rec = 3,
    /// Auxiliary page of an execution context
    RecAux = 4,
    /// Realm data page
    Data = 5,
    /// Realm translation table
    Rtt = 6,
}

impl GranuleState {
    /// Highest member of the state set
    pub const LAST: GranuleState = GranuleState::Rtt;

    /// Every state, in discriminant order
    pub const ALL: [GranuleState; NR_GRANULE_STATES] = [
        GranuleState::Ns,
        GranuleState::Delegated,
        GranuleState::Rd,
        GranuleState::Rec,
        GranuleState::RecAux,
        GranuleState::Data,
        GranuleState::Rtt,
    ];

    /// Convert from u8
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Decode a discriminant read back from a descriptor.
    ///
    /// Descriptors only ever store members of the set, so anything else is a
    /// corrupted descriptor.
    pub(crate) fn decode(v: u8) -> Self {
        match Self::from_u8(v) {
            Some(state) => state,
            None => panic!("granule state {} outside the state set", v),
        }
    }

    /// Position of this state in a per-state array
    pub const fn index(self) -> usize {
        self as usize
    }
}
