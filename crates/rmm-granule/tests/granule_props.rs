//! Property-based tests for the granule table
//!
//! - Translation round trips for any range and index
//! - lock_find_two is symmetric in its arguments and all-or-nothing
//! - Lock-protected and atomic refcount arithmetic
//! - Random transition sequences keep the table invariants and agree with a
//!   plain state model

#![cfg(not(feature = "loom"))]

use proptest::prelude::*;
use rmm_granule::{
    check_all_invariants, GranuleState, GranuleTable, PhysAddr, TableConfig, GRANULE_SHIFT,
    GRANULE_SIZE, NR_GRANULE_STATES,
};

const BASE: PhysAddr = PhysAddr(0x1_0000_0000);
const NR_GRANULES: usize = 16;

fn arb_state() -> impl Strategy<Value = GranuleState> {
    (0..NR_GRANULE_STATES as u8).prop_map(|v| GranuleState::from_u8(v).unwrap())
}

fn addr(idx: usize) -> PhysAddr {
    PhysAddr(BASE.0 + (idx * GRANULE_SIZE) as u64)
}

fn table_with(states: &[GranuleState]) -> GranuleTable {
    let table = GranuleTable::new(TableConfig::new(BASE, states.len())).unwrap();
    for (idx, &state) in states.iter().enumerate() {
        let g = table.granule(idx);
        g.lock(GranuleState::Ns);
        g.unlock_transition(state);
    }
    table
}

#[derive(Clone, Copy, Debug)]
enum Op {
    /// Conditionally lock, then move to a new state
    Transition { idx: usize, from: GranuleState, to: GranuleState },
    /// Lock two granules, then release both unchanged
    Pair { a: usize, sa: GranuleState, b: usize, sb: GranuleState },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NR_GRANULES, arb_state(), arb_state())
            .prop_map(|(idx, from, to)| Op::Transition { idx, from, to }),
        (0..NR_GRANULES, arb_state(), 0..NR_GRANULES, arb_state())
            .prop_map(|(a, sa, b, sb)| Op::Pair { a, sa, b, sb }),
    ]
}

proptest! {
    #[test]
    fn translation_round_trip(frame in 0u64..(1 << 36), nr in 1usize..4096, pick in any::<usize>()) {
        let config = TableConfig::new(PhysAddr(frame << GRANULE_SHIFT), nr);
        let table = GranuleTable::new(config).unwrap();
        let idx = pick % nr;
        let g = table.granule(idx);
        prop_assert_eq!(table.addr_to_granule(g.addr()), g);
        prop_assert_eq!(table.granule_addr(g), config.addr_of(idx));
    }

    #[test]
    fn misaligned_never_found(idx in 0..NR_GRANULES, offset in 1u64..GRANULE_SIZE as u64) {
        let table = table_with(&[GranuleState::Ns; NR_GRANULES]);
        let a = PhysAddr(addr(idx).0 + offset);
        prop_assert!(table.find(a).is_none());
        prop_assert!(table.lock_find(a, GranuleState::Ns).is_none());
    }

    #[test]
    fn lock_find_two_symmetric(
        states in proptest::collection::vec(arb_state(), NR_GRANULES),
        a in 0..NR_GRANULES + 2,
        sa in arb_state(),
        b in 0..NR_GRANULES + 2,
        sb in arb_state(),
    ) {
        let table = table_with(&states);
        let expect = a != b
            && a < NR_GRANULES
            && b < NR_GRANULES
            && states[a] == sa
            && states[b] == sb;

        match table.lock_find_two(addr(a), sa, addr(b), sb) {
            Some((ga, gb)) => {
                prop_assert!(expect);
                prop_assert_eq!((ga.index(), gb.index()), (a, b));
                ga.unlock();
                gb.unlock();
            }
            None => prop_assert!(!expect),
        }
        prop_assert!(check_all_invariants(&table).is_empty());

        match table.lock_find_two(addr(b), sb, addr(a), sa) {
            Some((gb, ga)) => {
                prop_assert!(expect);
                prop_assert_eq!((gb.index(), ga.index()), (b, a));
                gb.unlock();
                ga.unlock();
            }
            None => prop_assert!(!expect),
        }
        prop_assert!(check_all_invariants(&table).is_empty());
    }

    #[test]
    fn locked_refcount_arithmetic(n in 1u64..10_000) {
        let table = table_with(&[GranuleState::Rd]);
        let g = table.granule(0);
        g.lock(GranuleState::Rd);
        g.refcount_inc(n);
        g.refcount_dec(n);
        prop_assert_eq!(g.refcount_read_relaxed(), 0);
        g.refcount_inc(n);
        g.refcount_dec(n - 1);
        prop_assert_eq!(g.refcount_read_relaxed(), 1);
        g.refcount_put();
        g.unlock();
    }

    #[test]
    fn atomic_refcount_arithmetic(n in 1u64..500) {
        let table = table_with(&[GranuleState::Data]);
        let g = table.granule(0);
        for _ in 0..n {
            g.atomic_get();
        }
        g.atomic_put();
        prop_assert_eq!(g.refcount_read_acquire(), n - 1);
    }

    #[test]
    fn transitions_match_model(ops in proptest::collection::vec(arb_op(), 1..64)) {
        let table = table_with(&[GranuleState::Ns; NR_GRANULES]);
        let mut model = [GranuleState::Ns; NR_GRANULES];

        for op in ops {
            match op {
                Op::Transition { idx, from, to } => {
                    let locked = table.granule(idx).lock_if_state_matches(from);
                    prop_assert_eq!(locked, model[idx] == from);
                    if locked {
                        table.granule(idx).unlock_transition(to);
                        model[idx] = to;
                    }
                }
                Op::Pair { a, sa, b, sb } => {
                    let expect = a != b && model[a] == sa && model[b] == sb;
                    let pair = table.lock_find_two(addr(a), sa, addr(b), sb);
                    prop_assert_eq!(pair.is_some(), expect);
                    if let Some((ga, gb)) = pair {
                        ga.unlock();
                        gb.unlock();
                    }
                }
            }
            prop_assert!(check_all_invariants(&table).is_empty());
        }

        for (idx, &state) in model.iter().enumerate() {
            prop_assert_eq!(table.granule(idx).state(), state);
        }
        let metrics = table.metrics();
        for state in GranuleState::ALL {
            prop_assert_eq!(
                metrics.count(state),
                model.iter().filter(|&&s| s == state).count()
            );
        }
    }
}
