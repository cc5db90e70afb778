#![forbid(unsafe_code)]

//! Property-based invariant tests for observable and computed cells.
//!
//! 1. Observable version counts exactly the value-changing writes.
//! 2. A computed chain never returns a stale value after any write sequence.
//! 3. A batch of writes notifies each subscriber at most once.

use std::cell::Cell;
use std::rc::Rc;

use formcell_reactive::{BatchScope, Computed, Observable};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

/// Write sequences over a tiny domain so repeated values are common.
fn writes() -> impl Strategy<Value = Vec<i32>> {
    proptest::collection::vec(0i32..4, 0..64)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Version counts value-changing writes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn version_counts_changes(seq in writes()) {
        let obs = Observable::new(0);
        let mut expected = 0u64;
        let mut current = 0;
        for v in seq {
            if v != current {
                expected += 1;
                current = v;
            }
            obs.set(v);
        }
        prop_assert_eq!(obs.version(), expected);
        prop_assert_eq!(obs.get(), current);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Computed chains are never stale
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn computed_chain_tracks_sources(a_seq in writes(), b_seq in writes()) {
        let a = Observable::new(0);
        let b = Observable::new(0);
        let sum = Computed::from2(&a, &b, |x, y| x + y);
        let label = Computed::from_computed(&sum, |s| format!("sum={s}"));

        for (i, (x, y)) in a_seq.iter().zip(b_seq.iter()).enumerate() {
            a.set(*x);
            if i % 2 == 0 {
                prop_assert_eq!(label.get(), format!("sum={}", x + b.get()));
            }
            b.set(*y);
            prop_assert_eq!(sum.get(), x + y);
            prop_assert_eq!(label.get(), format!("sum={}", x + y));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Batched writes notify at most once
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn batch_notifies_at_most_once(seq in writes()) {
        let obs = Observable::new(0);
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        let _sub = obs.subscribe(move |_| c.set(c.get() + 1));

        let before = obs.version();
        {
            let _batch = BatchScope::new();
            for v in &seq {
                obs.set(*v);
            }
        }
        let changed = obs.version() != before;
        prop_assert_eq!(calls.get(), u32::from(changed));
    }
}
