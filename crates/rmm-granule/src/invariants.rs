//! Table invariants
//!
//! Runtime-checkable properties of a descriptor table, used for assertion
//! checking in tests, property-based testing with proptest and Kani proofs.
//!
//! # Invariants
//!
//! 1. **Translation Bijection**: descriptor `i` tracks `base + i * GRANULE_SIZE`
//!    and that address translates back to `i`
//! 2. **Range Bounds**: one descriptor per managed granule, none outside
//! 3. **State Validity**: every descriptor holds a member of the state set
//! 4. **Quiescence**: no lock is held (only meaningful between operations)

use alloc::string::String;
use alloc::vec::Vec;

use crate::table::GranuleTable;
use crate::types::{GranuleState, GRANULE_SIZE};

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all table invariants for a table no core is operating on.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(table: &GranuleTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_translation_bijection(table));
    violations.extend(check_range_bounds(table));
    violations.extend(check_state_validity(table));
    violations.extend(check_quiescence(table));

    violations
}

/// All invariants plus the post-construction baseline: every granule `Ns`
/// with no references.
pub fn check_baseline(table: &GranuleTable) -> Vec<InvariantViolation> {
    let mut violations = check_all_invariants(table);

    for g in table.iter() {
        if GranuleState::from_u8(g.state_bits()) != Some(GranuleState::Ns) {
            violations.push(InvariantViolation {
                invariant: "baseline",
                description: alloc::format!(
                    "Granule {} has state {} after construction",
                    g.addr(),
                    g.state_bits()
                ),
            });
        }
        let refcount = g.refcount_read_relaxed();
        if refcount != 0 {
            violations.push(InvariantViolation {
                invariant: "baseline",
                description: alloc::format!(
                    "Granule {} has {} references after construction",
                    g.addr(),
                    refcount
                ),
            });
        }
    }

    violations
}

/// Invariant 1: Address translation is a bijection over the table
fn check_translation_bijection(table: &GranuleTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let config = table.config();

    for g in table.iter() {
        let addr = g.addr();
        if config.index_of(addr) != Some(g.index()) {
            violations.push(InvariantViolation {
                invariant: "translation_bijection",
                description: alloc::format!(
                    "Descriptor {} tracks {} which translates to {:?}",
                    g.index(),
                    addr,
                    config.index_of(addr)
                ),
            });
        }
        let expected = config.base.0 + (g.index() * GRANULE_SIZE) as u64;
        if addr.0 != expected {
            violations.push(InvariantViolation {
                invariant: "translation_bijection",
                description: alloc::format!(
                    "Descriptor {} tracks {} instead of {:#x}",
                    g.index(),
                    addr,
                    expected
                ),
            });
        }
    }

    violations
}

/// Invariant 2: One descriptor per managed granule
fn check_range_bounds(table: &GranuleTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let config = table.config();

    if table.len() != config.nr_granules {
        violations.push(InvariantViolation {
            invariant: "range_bounds",
            description: alloc::format!(
                "Table has {} descriptors for {} managed granules",
                table.len(),
                config.nr_granules
            ),
        });
    }

    // Neighbours of the range must not translate
    if let Some(below) = config.base.checked_sub(GRANULE_SIZE as u64) {
        if config.index_of(below).is_some() {
            violations.push(InvariantViolation {
                invariant: "range_bounds",
                description: alloc::format!("Address {} below base translates", below),
            });
        }
    }
    if config.end() != Some(table.end()) {
        violations.push(InvariantViolation {
            invariant: "range_bounds",
            description: alloc::format!(
                "Table ends at {} but its range ends at {:?}",
                table.end(),
                config.end()
            ),
        });
    }
    if config.index_of(table.end()).is_some() {
        violations.push(InvariantViolation {
            invariant: "range_bounds",
            description: alloc::format!("End address {} translates", table.end()),
        });
    }

    violations
}

/// Invariant 3: Descriptors only hold members of the state set
fn check_state_validity(table: &GranuleTable) -> Vec<InvariantViolation> {
    table
        .iter()
        .filter(|g| GranuleState::from_u8(g.state_bits()).is_none())
        .map(|g| InvariantViolation {
            invariant: "state_validity",
            description: alloc::format!(
                "Granule {} holds state discriminant {}",
                g.addr(),
                g.state_bits()
            ),
        })
        .collect()
}

/// Invariant 4: No lock outlives the operation that took it
fn check_quiescence(table: &GranuleTable) -> Vec<InvariantViolation> {
    table
        .iter()
        .filter(|g| g.is_locked())
        .map(|g| InvariantViolation {
            invariant: "quiescence",
            description: alloc::format!("Granule {} is still locked", g.addr()),
        })
        .collect()
}

/// Assert all invariants hold (panic if not)
pub fn assert_invariants(table: &GranuleTable) {
    if let Some(v) = check_all_invariants(table).first() {
        panic!("Invariant violated: {}: {}", v.invariant, v.description);
    }
}


// ============================================================================
// Kani proofs
// ============================================================================

#[cfg(kani)]
mod proofs {
    use crate::config::TableConfig;
    use crate::granule::Granule;
    use crate::types::{GranuleState, PhysAddr, GRANULE_SHIFT};

    /// Proof: translation is a bijection for any index of any table
    #[kani::proof]
    fn translation_is_bijective() {
        let base_frame: u32 = kani::any();
        let nr_granules: u16 = kani::any();
        let idx: usize = kani::any();
        kani::assume(nr_granules > 0);
        kani::assume(idx < nr_granules as usize);

        let config = TableConfig::new(
            PhysAddr((base_frame as u64) << GRANULE_SHIFT),
            nr_granules as usize,
        );
        kani::assume(config.validate().is_ok());

        let addr = config.addr_of(idx);
        kani::assert(addr.is_granule_aligned(), "Descriptor address is aligned");
        kani::assert(
            config.index_of(addr) == Some(idx),
            "Descriptor address translates back to its index",
        );
    }

    /// Proof: unlock_transition frees the lock and installs the new state
    #[kani::proof]
    fn unlock_transition_frees_lock() {
        let from = GranuleState::from_u8(kani::any());
        let to = GranuleState::from_u8(kani::any());
        kani::assume(from.is_some() && to.is_some());
        let (from, to) = (from.unwrap(), to.unwrap());

        let g = Granule::new();
        g.lock(GranuleState::Ns);
        g.unlock_transition(from);
        g.lock(from);
        kani::assert(g.is_locked(), "lock holds after acquisition");

        g.unlock_transition(to);
        kani::assert(!g.is_locked(), "Lock is free after unlock_transition");
        kani::assert(g.state() == to, "State is the requested one");
    }

    /// Proof: a mismatched conditional lock leaves the descriptor untouched
    #[kani::proof]
    fn mismatched_lock_is_noop() {
        let have = GranuleState::from_u8(kani::any());
        let want = GranuleState::from_u8(kani::any());
        kani::assume(have.is_some() && want.is_some());
        let (have, want) = (have.unwrap(), want.unwrap());
        kani::assume(have != want);

        let g = Granule::new();
        g.lock(GranuleState::Ns);
        g.unlock_transition(have);

        kani::assert(!g.lock_if_state_matches(want), "Mismatch is refused");
        kani::assert(!g.is_locked(), "Lock stays free");
        kani::assert(g.state() == have, "State is unchanged");
    }
}
